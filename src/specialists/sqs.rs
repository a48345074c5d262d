use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, ErrorFactGuard, Specialist, SpecialistContext, MAX_FACTS_PER_RESOURCE,
};
use crate::tools::sqs as sqs_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes queues: depth, redrive wiring and dead-letter accumulation.
pub struct SqsSpecialist;

#[async_trait]
impl Specialist for SqsSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let queue_name = resource.name.as_str();

        let raw = sqs_tools::get_sqs_queue_config(&ctx.tools, queue_name).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let depth = config
                    .get("approximate_messages")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                let in_flight = config
                    .get("approximate_messages_not_visible")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                facts.push(Fact::new(
                    "sqs_queue_config",
                    format!(
                        "Queue {queue_name}: {depth} visible messages, {in_flight} in flight"
                    ),
                    0.85,
                ));
                if config.get("redrive_policy").map(Value::is_null).unwrap_or(true) {
                    facts.push(Fact::new(
                        "sqs_queue_config",
                        format!("Queue {queue_name} has no dead-letter redrive policy"),
                        0.8,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "sqs_queue_config",
                format!("Could not load queue config for {queue_name}: {error}"),
            ),
        }

        let raw = sqs_tools::get_sqs_dead_letter_queue(&ctx.tools, queue_name).await;
        if let Ok(dlq) = parse_tool_document(&raw) {
            let configured = dlq
                .get("dlq_configured")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if configured {
                let depth = dlq
                    .get("dlq_depth")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                if depth > 0 {
                    facts.push(Fact::new(
                        "sqs_dlq_config",
                        format!(
                            "Dead-letter queue for {queue_name} contains {depth} messages"
                        ),
                        0.9,
                    ));
                }
            }
        }

        let raw = sqs_tools::get_sqs_queue_metrics(&ctx.tools, queue_name, 24).await;
        if let Ok(metrics) = parse_tool_document(&raw) {
            let max_age = metrics
                .get("metrics")
                .and_then(|m| m.get("ApproximateAgeOfOldestMessage"))
                .and_then(Value::as_array)
                .map(|points| {
                    points
                        .iter()
                        .filter_map(|p| p.get("Maximum").and_then(Value::as_f64))
                        .fold(0.0_f64, f64::max)
                })
                .unwrap_or(0.0);
            if max_age > 3600.0 {
                facts.push(Fact::new(
                    "sqs_queue_metrics",
                    format!(
                        "Oldest message in {queue_name} is {:.0} minutes old; consumers may be stalled",
                        max_age / 60.0
                    ),
                    0.85,
                ));
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["sqs"]
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
