use crate::config;
use crate::models::{Fact, ParsedInputs, Resource};
use crate::specialists::{trace, SpecialistContext, SpecialistRegistry, MAX_FACTS_PER_RESOURCE};
use crate::tools::{health as health_tools, ToolContext};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

/// Hard global cap on collected facts.
pub const MAX_GLOBAL_FACTS: usize = 50;

/// How many resources get an audit-trail lookup in the enrichment pass.
const AUDIT_RESOURCE_LIMIT: usize = 5;

/// Deterministic, bounded, parallel evidence collection.
///
/// One task per resource specialist plus one per trace run concurrently;
/// results are appended in completion order. The collector owns the only
/// shared mutable state (its aggregate list) and enforces the per-resource
/// and global caps.
pub struct EvidenceCollector {
    registry: SpecialistRegistry,
}

impl EvidenceCollector {
    pub fn new() -> Self {
        Self {
            registry: SpecialistRegistry::new(),
        }
    }

    pub fn with_registry(registry: SpecialistRegistry) -> Self {
        Self { registry }
    }

    pub async fn collect(
        &self,
        tools: &ToolContext,
        resources: &[Resource],
        parsed: &ParsedInputs,
    ) -> Vec<Fact> {
        let deadline = Instant::now() + config::collector_deadline();
        let mut facts: Vec<Fact> = Vec::new();

        if config::enrichment_enabled() {
            let enrichment = self.collect_enrichment(tools, resources, &mut facts);
            if tokio::time::timeout_at(deadline, enrichment).await.is_err() {
                warn!("enrichment pass hit the collection deadline");
            }
        }

        let ctx = Arc::new(SpecialistContext {
            tools: tools.clone(),
            trace_ids: parsed.trace_ids.clone(),
        });

        let mut tasks: JoinSet<Vec<Fact>> = JoinSet::new();

        for resource in resources {
            let Some(specialist) = self.registry.for_resource_type(&resource.kind) else {
                info!("no specialist for resource type {}", resource.kind);
                continue;
            };
            let resource = resource.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let mut facts = specialist.analyze(&resource, &ctx).await;
                facts.truncate(MAX_FACTS_PER_RESOURCE);
                facts
            });
        }

        for trace_id in &parsed.trace_ids {
            let trace_id = trace_id.clone();
            let tools = tools.clone();
            tasks.spawn(async move { trace::analyze_trace_deep(&tools, &trace_id).await });
        }

        let mut timed_out = false;
        loop {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            };
            match joined {
                Some(Ok(task_facts)) => facts.extend(task_facts),
                Some(Err(e)) => warn!("evidence task failed: {e}"),
                None => break,
            }
        }

        if timed_out {
            // In-flight specialists stop at their next suspension point;
            // whatever completed so far is kept.
            tasks.abort_all();
            warn!("evidence collection hit its deadline, returning partial facts");
            facts.push(Fact::new(
                "evidence_collector",
                format!(
                    "Evidence collection stopped at the {}s deadline; results are partial",
                    config::collector_deadline().as_secs()
                ),
                0.9,
            ));
        }

        facts.truncate(MAX_GLOBAL_FACTS);
        facts
    }

    /// Optional pre-checks: provider-side health per unique service type and
    /// recent audit-trail changes for the leading resources. Unavailability
    /// is logged and skipped, never surfaced as evidence.
    async fn collect_enrichment(
        &self,
        tools: &ToolContext,
        resources: &[Resource],
        facts: &mut Vec<Fact>,
    ) {
        let service_types: BTreeSet<&str> =
            resources.iter().map(|r| r.kind.as_str()).collect();

        let mut health_checks_succeeded = 0usize;
        for service_type in service_types {
            let Some(service_key) = config::health_service_key(service_type) else {
                continue;
            };
            let raw =
                health_tools::check_aws_service_health(tools, service_key, tools.region()).await;
            let Ok(document) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            if document.get("error").is_some() {
                info!("service health unavailable for {service_key} - skipped");
                continue;
            }
            health_checks_succeeded += 1;
            if document
                .get("aws_service_issue_detected")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                let count = document
                    .get("active_events_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                facts.push(Fact::new(
                    "aws_health",
                    format!(
                        "AWS service issue: {service_key} has {count} active events in {}",
                        tools.region()
                    ),
                    1.0,
                ));
            }
        }
        if health_checks_succeeded == 0 {
            info!("service health checks not available for this account");
        }

        for resource in resources.iter().take(AUDIT_RESOURCE_LIMIT) {
            let raw =
                health_tools::get_recent_cloudtrail_events(tools, &resource.name, 24).await;
            let Ok(document) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            if document.get("error").is_some() {
                info!("audit trail unavailable for {} - skipped", resource.name);
                continue;
            }
            if document
                .get("configuration_changes_detected")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                let count = document
                    .get("configuration_change_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                facts.push(Fact::new(
                    "cloudtrail",
                    format!(
                        "Configuration changes detected: {count} changes to {} in last 24h",
                        resource.name
                    ),
                    0.9,
                ));
            }
        }
    }
}

impl Default for EvidenceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use serial_test::serial;

    fn many_events(count: usize) -> Value {
        let events: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "timestamp": 1700000000000u64 + i as u64,
                    "message": format!("ERROR invocation {i} failed"),
                    "logStreamName": "s"
                })
            })
            .collect();
        json!({"events": events})
    }

    fn resource(kind: &str, name: &str) -> Resource {
        Resource::new(kind, name, "eu-west-1")
    }

    #[tokio::test]
    #[serial]
    async fn caps_are_enforced_across_many_resources() {
        std::env::set_var("CLOUDPILOT_ENRICHMENT", "false");
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "lambda",
                    "get-function-configuration",
                    json!({"Timeout": 3, "MemorySize": 128, "Runtime": "python3.12"}),
                )
                .with_response(
                    "cloudwatch",
                    "get-metric-statistics",
                    json!({"Datapoints": [{"Sum": 10.0}]}),
                )
                .with_response("logs", "filter-log-events", many_events(20))
                .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
        );
        let tools = tool_context(backend).await;

        let resources: Vec<Resource> = (0..8)
            .map(|i| resource("lambda", &format!("fn-{i}")))
            .collect();
        let parsed = ParsedInputs::default();

        let facts = EvidenceCollector::new()
            .collect(&tools, &resources, &parsed)
            .await;

        assert!(facts.len() <= MAX_GLOBAL_FACTS);
        for i in 0..8 {
            let per_resource = facts
                .iter()
                .filter(|f| f.content.contains(&format!("fn-{i}")))
                .count();
            assert!(per_resource <= MAX_FACTS_PER_RESOURCE);
        }
        std::env::remove_var("CLOUDPILOT_ENRICHMENT");
    }

    #[tokio::test]
    #[serial]
    async fn unavailable_health_tool_emits_no_facts() {
        std::env::remove_var("CLOUDPILOT_ENRICHMENT");
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "health",
                    "describe-events",
                    json!({"error": "not subscribed"}),
                )
                .with_failure("cloudtrail", "lookup-events", "AccessDenied")
                .with_failure("lambda", "get-function-configuration", "AccessDenied")
                .with_failure("cloudwatch", "get-metric-statistics", "AccessDenied")
                .with_failure("logs", "filter-log-events", "AccessDenied")
                .with_failure("lambda", "list-versions-by-function", "AccessDenied"),
        );
        let tools = tool_context(backend.clone()).await;
        let resources = vec![resource("lambda", "payment-processor")];
        let parsed = ParsedInputs::default();

        let facts = EvidenceCollector::new()
            .collect(&tools, &resources, &parsed)
            .await;

        assert!(facts.iter().all(|f| f.source != "aws_health"));
        assert!(facts.iter().all(|f| f.source != "cloudtrail"));
    }

    #[tokio::test]
    #[serial]
    async fn audit_changes_add_one_fact_per_resource() {
        std::env::remove_var("CLOUDPILOT_ENRICHMENT");
        let backend = Arc::new(
            MockBackend::new()
                .with_failure("health", "describe-events", "SubscriptionRequiredException")
                .with_response(
                    "cloudtrail",
                    "lookup-events",
                    json!({"Events": [
                        {"EventName": "UpdateFunctionConfiguration", "EventTime": "2026-01-01T00:00:00Z", "Username": "deployer"}
                    ]}),
                )
                .with_failure("lambda", "get-function-configuration", "AccessDenied")
                .with_failure("cloudwatch", "get-metric-statistics", "AccessDenied")
                .with_failure("logs", "filter-log-events", "AccessDenied")
                .with_failure("lambda", "list-versions-by-function", "AccessDenied"),
        );
        let tools = tool_context(backend).await;
        let resources = vec![resource("lambda", "payment-processor")];
        let parsed = ParsedInputs::default();

        let facts = EvidenceCollector::new()
            .collect(&tools, &resources, &parsed)
            .await;

        let audit_facts: Vec<&Fact> =
            facts.iter().filter(|f| f.source == "cloudtrail").collect();
        assert_eq!(audit_facts.len(), 1);
        assert!(audit_facts[0].content.contains("Configuration changes detected"));
    }
}
