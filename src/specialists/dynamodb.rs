use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::dynamodb as ddb_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes database tables for capacity pressure and throttling.
pub struct DynamoDbSpecialist;

#[async_trait]
impl Specialist for DynamoDbSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let table_name = resource.name.as_str();

        let raw = ddb_tools::get_dynamodb_table_config(&ctx.tools, table_name).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let status = config
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                let billing = config
                    .get("billing_mode")
                    .and_then(Value::as_str)
                    .unwrap_or("PROVISIONED");
                facts.push(Fact::new(
                    "dynamodb_config",
                    format!("Table {table_name} is {status} (billing {billing})"),
                    0.85,
                ));
                if status != "ACTIVE" {
                    facts.push(Fact::new(
                        "dynamodb_config",
                        format!("Table {table_name} is not in ACTIVE state: {status}"),
                        0.9,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "dynamodb_config",
                format!("Could not load table config for {table_name}: {error}"),
            ),
        }

        let raw = ddb_tools::get_dynamodb_table_metrics(&ctx.tools, table_name, 24).await;
        match parse_tool_document(&raw) {
            Ok(metrics) => {
                let throttled =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("ThrottledRequests")));
                let system_errors =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("SystemErrors")));
                if throttled > 0.0 {
                    facts.push(Fact::new(
                        "dynamodb_metrics",
                        format!(
                            "Table {table_name} throttled {throttled:.0} requests in the last 24h"
                        ),
                        0.9,
                    ));
                }
                if system_errors > 0.0 {
                    facts.push(Fact::new(
                        "dynamodb_metrics",
                        format!(
                            "Table {table_name} reported {system_errors:.0} system errors in the last 24h"
                        ),
                        0.9,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "dynamodb_metrics",
                format!("Could not load metrics for {table_name}: {error}"),
            ),
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["dynamodb"]
    }

    fn name(&self) -> &'static str {
        "dynamodb"
    }
}
