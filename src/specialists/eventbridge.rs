use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::eventbridge as events_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes event-bus rules: state, targets and delivery failures.
pub struct EventBridgeSpecialist;

#[async_trait]
impl Specialist for EventBridgeSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();
        let rule_name = resource.name.as_str();
        let event_bus = resource.metadata.get("event_bus").and_then(Value::as_str);

        let raw =
            events_tools::get_eventbridge_rule_config(&ctx.tools, rule_name, event_bus).await;
        match parse_tool_document(&raw) {
            Ok(config) => {
                let state = config
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                facts.push(Fact::new(
                    "eventbridge_config",
                    format!("Rule {rule_name} is {state}"),
                    0.8,
                ));
                if state == "DISABLED" {
                    facts.push(Fact::new(
                        "eventbridge_config",
                        format!("Rule {rule_name} is DISABLED and will not route events"),
                        0.9,
                    ));
                }
            }
            Err(error) => errors.report(
                &mut facts,
                "eventbridge_config",
                format!("Could not load rule config for {rule_name}: {error}"),
            ),
        }

        let raw = events_tools::get_eventbridge_targets(&ctx.tools, rule_name, event_bus).await;
        if let Ok(listing) = parse_tool_document(&raw) {
            let count = listing
                .get("target_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if count == 0 {
                facts.push(Fact::new(
                    "eventbridge_targets",
                    format!("Rule {rule_name} has no targets configured"),
                    0.9,
                ));
            }
        }

        let raw = events_tools::get_eventbridge_metrics(&ctx.tools, rule_name, 24).await;
        if let Ok(metrics) = parse_tool_document(&raw) {
            let failed =
                sum_datapoints(metrics.get("metrics").and_then(|m| m.get("FailedInvocations")));
            if failed > 0.0 {
                facts.push(Fact::new(
                    "eventbridge_metrics",
                    format!("Rule {rule_name} had {failed:.0} failed invocations in the last 24h"),
                    0.9,
                ));
            }
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["eventbridge"]
    }

    fn name(&self) -> &'static str {
        "eventbridge"
    }
}
