use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::sns as sns_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes notification topics: subscriptions and delivery failures.
pub struct SnsSpecialist;

#[async_trait]
impl Specialist for SnsSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let topic_arn = resource
            .arn
            .clone()
            .unwrap_or_else(|| resource.name.clone());

        let raw = sns_tools::get_sns_topic_config(&ctx.tools, &topic_arn).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let pending = config
                    .get("subscriptions_pending")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                let confirmed = config
                    .get("subscriptions_confirmed")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                facts.push(Fact::new(
                    "sns_topic_config",
                    format!(
                        "Topic {topic_arn}: {confirmed} confirmed subscriptions, {pending} pending"
                    ),
                    0.8,
                ));
                if confirmed == 0 {
                    facts.push(Fact::new(
                        "sns_topic_config",
                        format!("Topic {topic_arn} has no confirmed subscriptions"),
                        0.9,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "sns_topic_config",
                format!("Could not load topic config for {topic_arn}: {error}"),
            ),
        }

        let raw = sns_tools::get_sns_subscriptions(&ctx.tools, &topic_arn).await;
        if let Ok(listing) = parse_tool_document(&raw) {
            let pending: Vec<String> = listing
                .get("subscriptions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .iter()
                .filter(|s| {
                    s.get("subscription_arn").and_then(Value::as_str) == Some("PendingConfirmation")
                })
                .filter_map(|s| s.get("endpoint").and_then(Value::as_str).map(String::from))
                .collect();
            if !pending.is_empty() {
                facts.push(Fact::new(
                    "sns_subscriptions",
                    format!(
                        "Unconfirmed subscriptions on {topic_arn}: {}",
                        pending.join(", ")
                    ),
                    0.85,
                ));
            }
        }

        let topic_name = topic_arn.rsplit(':').next().unwrap_or(&topic_arn);
        let raw = sns_tools::get_sns_topic_metrics(&ctx.tools, topic_name, 24).await;
        if let Ok(metrics) = parse_tool_document(&raw) {
            let failed = sum_datapoints(
                metrics
                    .get("metrics")
                    .and_then(|m| m.get("NumberOfNotificationsFailed")),
            );
            if failed > 0.0 {
                facts.push(Fact::new(
                    "sns_topic_metrics",
                    format!("{failed:.0} notifications failed to deliver from {topic_name} in the last 24h"),
                    0.9,
                ));
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["sns"]
    }

    fn name(&self) -> &'static str {
        "sns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn pending_subscriptions_and_delivery_failures_become_facts() {
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "sns",
                    "get-topic-attributes",
                    json!({"Attributes": {
                        "DisplayName": "order-events",
                        "SubscriptionsConfirmed": "0",
                        "SubscriptionsPending": "2"
                    }}),
                )
                .with_response(
                    "sns",
                    "list-subscriptions-by-topic",
                    json!({"Subscriptions": [
                        {"Protocol": "sqs", "Endpoint": "arn:aws:sqs:eu-west-1:123:orders-queue", "SubscriptionArn": "PendingConfirmation"}
                    ]}),
                )
                .with_response(
                    "cloudwatch",
                    "get-metric-statistics",
                    json!({"Datapoints": [{"Sum": 3.0}]}),
                ),
        );
        let ctx = SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        };
        let mut resource = Resource::new("sns", "order-events", "eu-west-1");
        resource.arn = Some("arn:aws:sns:eu-west-1:123:order-events".to_string());

        let facts = SnsSpecialist.analyze(&resource, &ctx).await;
        assert!(facts
            .iter()
            .any(|f| f.source == "sns_topic_config"
                && f.content.contains("no confirmed subscriptions")
                && f.confidence == 0.9));
        assert!(facts
            .iter()
            .any(|f| f.source == "sns_subscriptions"
                && f.content.contains("arn:aws:sqs:eu-west-1:123:orders-queue")));
        assert!(facts
            .iter()
            .any(|f| f.source == "sns_topic_metrics"
                && f.content.contains("3 notifications failed to deliver")));
    }

    #[tokio::test]
    async fn tool_errors_yield_single_explanatory_fact() {
        let backend = Arc::new(
            MockBackend::new()
                .with_failure("sns", "get-topic-attributes", "AuthorizationError")
                .with_failure("sns", "list-subscriptions-by-topic", "AuthorizationError")
                .with_failure("cloudwatch", "get-metric-statistics", "AuthorizationError"),
        );
        let ctx = SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        };
        let resource = Resource::new("sns", "order-events", "eu-west-1");

        let facts = SnsSpecialist.analyze(&resource, &ctx).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].confidence, 0.7);
    }
}
