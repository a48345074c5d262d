use crate::config;
use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::{apigateway as apigw_tools, iam as iam_tools};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Analyzes API gateway stages: configuration, error metrics, execution logs
/// and the integration role's permissions.
pub struct ApiGatewaySpecialist;

#[async_trait]
impl Specialist for ApiGatewaySpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let api_id = resource.name.as_str();
        let stage = resource
            .metadata
            .get("stage")
            .and_then(Value::as_str)
            .unwrap_or("prod")
            .to_string();

        let raw = apigw_tools::get_api_gateway_stage_config(&ctx.tools, api_id, &stage).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let tracing_enabled = config
                    .get("xray_tracing_enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                facts.push(Fact::new(
                    "apigateway_config",
                    format!(
                        "API {api_id} stage {stage} config loaded (tracing {})",
                        if tracing_enabled { "enabled" } else { "disabled" }
                    ),
                    0.8,
                ));
            }
            Err(error) => errors.report(
                &mut facts,
                "apigateway_config",
                format!("Could not load stage config for {api_id}/{stage}: {error}"),
            ),
        }

        let raw = apigw_tools::get_api_gateway_metrics(&ctx.tools, api_id, &stage, 24).await;
        match parse_tool_document(&raw) {
            Ok(metrics) => {
                let server_errors =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("5XXError")));
                let client_errors =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("4XXError")));
                if server_errors > 0.0 {
                    facts.push(Fact::new(
                        "apigateway_metrics",
                        format!(
                            "API {api_id} returned {server_errors:.0} 5XX errors in the last 24h"
                        ),
                        0.9,
                    ));
                }
                if client_errors > 0.0 {
                    facts.push(Fact::new(
                        "apigateway_metrics",
                        format!(
                            "API {api_id} returned {client_errors:.0} 4XX errors in the last 24h"
                        ),
                        0.8,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "apigateway_metrics",
                format!("Could not load metrics for {api_id}: {error}"),
            ),
        }

        self.check_integration_role(api_id, ctx, &mut facts).await;

        for trace_id in &ctx.trace_ids {
            let raw = apigw_tools::query_apigateway_logs_by_trace(
                &ctx.tools, api_id, &stage, trace_id, 1,
            )
            .await;
            let Ok(logs) = parse_tool_document(&raw) else {
                continue;
            };
            let entries = logs
                .get("log_entries")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                let Some(message) = entry.get("message").and_then(Value::as_str) else {
                    continue;
                };
                if message.contains("AccessDeniedException") || message.contains("not authorized") {
                    facts.push(Fact::new(
                        "apigateway_logs",
                        format!(
                            "API Gateway execution log shows permission error: {}",
                            truncate(message, 200)
                        ),
                        0.95,
                    ));
                } else if message.contains("HTTP 502") || message.contains("Internal server error")
                {
                    facts.push(Fact::new(
                        "apigateway_logs",
                        format!(
                            "API Gateway execution log shows internal error: {}",
                            truncate(message, 200)
                        ),
                        0.9,
                    ));
                }
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["apigateway"]
    }

    fn name(&self) -> &'static str {
        "apigateway"
    }
}

impl ApiGatewaySpecialist {
    /// Probe candidate execution-role names and substring-check their policy
    /// documents for workflow-start permission. Substring matching is blind
    /// to condition blocks and NotAction, so findings stay at or below 0.95
    /// and carry a marker for the policy simulator to supersede.
    async fn check_integration_role(
        &self,
        api_id: &str,
        ctx: &SpecialistContext,
        facts: &mut Vec<Fact>,
    ) {
        for role_name in config::role_name_candidates(api_id) {
            let raw = iam_tools::get_iam_role_config(&ctx.tools, &role_name).await;
            let Ok(role) = parse_tool_document(&raw) else {
                continue;
            };

            let documents = serde_json::to_string(&role).unwrap_or_default();
            let granted = documents.contains("states:StartSyncExecution")
                || documents.contains("states:*");

            let mut metadata = serde_json::Map::new();
            metadata.insert("role".to_string(), json!(role_name));
            metadata.insert("permission".to_string(), json!("states:StartSyncExecution"));
            metadata.insert("analysis".to_string(), json!("substring_match"));

            if granted {
                metadata.insert("status".to_string(), json!("granted"));
                facts.push(
                    Fact::new(
                        "iam_analysis",
                        format!(
                            "API Gateway role {role_name} has states:StartSyncExecution permission"
                        ),
                        0.9,
                    )
                    .with_metadata(metadata),
                );
            } else {
                metadata.insert("status".to_string(), json!("missing"));
                facts.push(
                    Fact::new(
                        "iam_analysis",
                        format!(
                            "API Gateway role {role_name} lacks states:StartSyncExecution permission"
                        ),
                        0.95,
                    )
                    .with_metadata(metadata),
                );
            }
            break;
        }
    }
}

fn truncate(message: &str, max: usize) -> &str {
    if message.len() <= max {
        return message;
    }
    let mut cut = max;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    &message[..cut]
}
