use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::lambda as lambda_tools;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Analyzes compute functions: configuration, metrics, failed invocations
/// and recent deployments.
pub struct LambdaSpecialist;

#[async_trait]
impl Specialist for LambdaSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let function_name = resource.name.as_str();

        let mut configured_timeout: Option<i64> = None;

        let raw = lambda_tools::get_lambda_config(&ctx.tools, function_name).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let timeout = config.get("timeout").and_then(Value::as_i64).unwrap_or(0);
                let memory = config.get("memory_size").and_then(Value::as_i64).unwrap_or(0);
                let runtime = config
                    .get("runtime")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                configured_timeout = Some(timeout);
                let mut metadata = serde_json::Map::new();
                metadata.insert("timeout".to_string(), json!(timeout));
                metadata.insert("memory_size".to_string(), json!(memory));
                metadata.insert("runtime".to_string(), json!(runtime));
                facts.push(
                    Fact::new(
                        "lambda_config",
                        format!(
                            "Lambda {function_name}: timeout={timeout}s, memory={memory}MB, runtime={runtime}"
                        ),
                        0.9,
                    )
                    .with_metadata(metadata),
                );
                if memory > 0 && memory <= 128 {
                    facts.push(Fact::new(
                        "lambda_config",
                        format!("Lambda {function_name} runs with low memory allocation ({memory}MB)"),
                        0.85,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "lambda_config",
                format!("Could not load config for {function_name}: {error}"),
            ),
        }

        let raw = lambda_tools::get_lambda_metrics(&ctx.tools, function_name, 24).await;
        match parse_tool_document(&raw) {
            Ok(metrics) => {
                let errors_sum =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("Errors")));
                let throttles_sum =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("Throttles")));
                if errors_sum > 0.0 {
                    facts.push(Fact::new(
                        "lambda_metrics",
                        format!(
                            "Lambda {function_name} reported {errors_sum:.0} errors in the last 24h"
                        ),
                        0.85,
                    ));
                }
                if throttles_sum > 0.0 {
                    facts.push(Fact::new(
                        "lambda_metrics",
                        format!(
                            "Lambda {function_name} was throttled {throttles_sum:.0} times in the last 24h"
                        ),
                        0.85,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "lambda_metrics",
                format!("Could not load metrics for {function_name}: {error}"),
            ),
        }

        let raw =
            lambda_tools::get_lambda_failed_invocations(&ctx.tools, function_name, 24, 5).await;
        match parse_tool_document(&raw) {
            Ok(failures) => {
                let count = failures
                    .get("failure_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if count > 0 {
                    facts.push(Fact::new(
                        "lambda_logs",
                        format!("Found {count} failed invocations for {function_name} in the last 24h"),
                        0.85,
                    ));
                    // Surface the first failure message verbatim; explicit
                    // error text is the strongest evidence we collect.
                    if let Some(message) = failures
                        .get("failed_invocations")
                        .and_then(Value::as_array)
                        .and_then(|f| f.first())
                        .and_then(|f| f.get("message"))
                        .and_then(Value::as_str)
                    {
                        facts.push(Fact::new(
                            "lambda_logs",
                            format!("Lambda {function_name} failure: {message}"),
                            0.9,
                        ));
                        if let Some(timeout) = configured_timeout {
                            if timeout > 0 && message.contains("timed out") {
                                facts.push(Fact::new(
                                    "lambda_logs",
                                    format!(
                                        "Lambda {function_name} hit its configured timeout of {timeout}s"
                                    ),
                                    0.9,
                                ));
                            }
                        }
                    }
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "lambda_logs",
                format!("Could not load failed invocations for {function_name}: {error}"),
            ),
        }

        let raw = lambda_tools::get_lambda_version_history(&ctx.tools, function_name, 5).await;
        if let Ok(versions) = parse_tool_document(&raw) {
            let count = versions
                .get("version_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if count > 1 {
                facts.push(Fact::new(
                    "lambda_config",
                    format!("Lambda {function_name} has {count} recently published versions"),
                    0.7,
                ));
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["lambda"]
    }

    fn name(&self) -> &'static str {
        "lambda"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use std::sync::Arc;

    async fn context(backend: Arc<MockBackend>) -> SpecialistContext {
        SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        }
    }

    #[tokio::test]
    async fn timeout_failure_produces_correlated_fact() {
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "lambda",
                    "get-function-configuration",
                    json!({"Timeout": 3, "MemorySize": 256, "Runtime": "python3.12"}),
                )
                .with_response("cloudwatch", "get-metric-statistics", json!({"Datapoints": []}))
                .with_response(
                    "logs",
                    "filter-log-events",
                    json!({"events": [{
                        "timestamp": 1700000000000u64,
                        "message": "Task timed out after 3.00 seconds",
                        "logStreamName": "2026/01/01"
                    }]}),
                )
                .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
        );
        let ctx = context(backend).await;
        let resource = Resource::new("lambda", "payment-processor", "eu-west-1");

        let facts = LambdaSpecialist.analyze(&resource, &ctx).await;
        assert!(facts.iter().any(|f| f.content.contains("timeout=3s")));
        assert!(facts
            .iter()
            .any(|f| f.content.contains("Task timed out after 3.00 seconds")));
        assert!(facts
            .iter()
            .any(|f| f.content.contains("hit its configured timeout of 3s")));
        assert!(facts.len() <= MAX_FACTS_PER_RESOURCE);
    }

    #[tokio::test]
    async fn tool_errors_yield_single_explanatory_fact() {
        let backend = Arc::new(
            MockBackend::new()
                .with_failure("lambda", "get-function-configuration", "AccessDenied")
                .with_failure("cloudwatch", "get-metric-statistics", "AccessDenied")
                .with_failure("logs", "filter-log-events", "AccessDenied")
                .with_failure("lambda", "list-versions-by-function", "AccessDenied"),
        );
        let ctx = context(backend).await;
        let resource = Resource::new("lambda", "payment-processor", "eu-west-1");

        let facts = LambdaSpecialist.analyze(&resource, &ctx).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].confidence, 0.7);
    }
}
