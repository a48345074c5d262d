use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::s3 as s3_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes object-store buckets: configuration, access policy and error
/// rates.
pub struct S3Specialist;

#[async_trait]
impl Specialist for S3Specialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let bucket = resource.name.as_str();

        let raw = s3_tools::get_s3_bucket_config(&ctx.tools, bucket).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let versioning = config
                    .get("versioning")
                    .and_then(Value::as_str)
                    .unwrap_or("Disabled");
                let encryption = config
                    .get("encryption")
                    .and_then(Value::as_str)
                    .unwrap_or("none");
                facts.push(Fact::new(
                    "s3_config",
                    format!("Bucket {bucket}: versioning {versioning}, encryption {encryption}"),
                    0.8,
                ));
            }
            Err(error) => errors.report(
                &mut facts,
                "s3_config",
                format!("Could not load bucket config for {bucket}: {error}"),
            ),
        }

        let raw = s3_tools::get_s3_bucket_policy(&ctx.tools, bucket).await;
        if let Ok(policy) = parse_tool_document(&raw) {
            let statements = policy
                .get("policy")
                .and_then(|p| p.get("Statement"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let deny_count = statements
                .iter()
                .filter(|s| s.get("Effect").and_then(Value::as_str) == Some("Deny"))
                .count();
            if deny_count > 0 {
                facts.push(Fact::new(
                    "s3_config",
                    format!("Bucket {bucket} policy contains {deny_count} explicit Deny statements"),
                    0.85,
                ));
            }
        }

        let raw = s3_tools::get_s3_bucket_metrics(&ctx.tools, bucket, 24).await;
        if let Ok(metrics) = parse_tool_document(&raw) {
            let client_errors =
                sum_datapoints(metrics.get("metrics").and_then(|m| m.get("4xxErrors")));
            let server_errors =
                sum_datapoints(metrics.get("metrics").and_then(|m| m.get("5xxErrors")));
            if client_errors > 0.0 {
                facts.push(Fact::new(
                    "s3_metrics",
                    format!("Bucket {bucket} returned {client_errors:.0} 4xx errors in the last 24h"),
                    0.85,
                ));
            }
            if server_errors > 0.0 {
                facts.push(Fact::new(
                    "s3_metrics",
                    format!("Bucket {bucket} returned {server_errors:.0} 5xx errors in the last 24h"),
                    0.9,
                ));
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["s3"]
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn policy_denies_and_server_errors_become_facts() {
        let policy = json!({
            "Statement": [
                {"Effect": "Allow", "Action": "s3:GetObject", "Resource": "*"},
                {"Effect": "Deny", "Action": "s3:PutObject", "Resource": "*"}
            ]
        });
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "s3api",
                    "get-bucket-location",
                    json!({"LocationConstraint": "eu-west-1"}),
                )
                .with_response("s3api", "get-bucket-versioning", json!({"Status": "Enabled"}))
                .with_failure("s3api", "get-bucket-encryption", "ServerSideEncryptionConfigurationNotFoundError")
                .with_response(
                    "s3api",
                    "get-bucket-policy",
                    json!({"Policy": policy.to_string()}),
                )
                .with_response(
                    "cloudwatch",
                    "get-metric-statistics",
                    json!({"Datapoints": [{"Sum": 8.0}]}),
                ),
        );
        let ctx = SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        };
        let resource = Resource::new("s3", "uploads-bucket", "eu-west-1");

        let facts = S3Specialist.analyze(&resource, &ctx).await;
        assert!(facts
            .iter()
            .any(|f| f.source == "s3_config"
                && f.content.contains("versioning Enabled, encryption none")));
        assert!(facts
            .iter()
            .any(|f| f.content.contains("1 explicit Deny statements") && f.confidence == 0.85));
        assert!(facts
            .iter()
            .any(|f| f.source == "s3_metrics"
                && f.content.contains("8 5xx errors")
                && f.confidence == 0.9));
    }

    #[tokio::test]
    async fn unreadable_bucket_yields_single_explanatory_fact() {
        let backend = Arc::new(
            MockBackend::new()
                .with_failure("s3api", "get-bucket-location", "AccessDenied")
                .with_failure("s3api", "get-bucket-policy", "AccessDenied")
                .with_failure("cloudwatch", "get-metric-statistics", "AccessDenied"),
        );
        let ctx = SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        };
        let resource = Resource::new("s3", "uploads-bucket", "eu-west-1");

        let facts = S3Specialist.analyze(&resource, &ctx).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].confidence, 0.7);
    }
}
