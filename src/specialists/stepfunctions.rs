use crate::models::{Fact, Resource};
use crate::specialists::{
    parse_tool_document, sum_datapoints, ErrorFactGuard, Specialist, SpecialistContext,
    MAX_FACTS_PER_RESOURCE,
};
use crate::tools::stepfunctions as sfn_tools;
use async_trait::async_trait;
use serde_json::Value;

/// Analyzes workflow state machines: definitions, recent executions and
/// failure details.
pub struct StepFunctionsSpecialist;

#[async_trait]
impl Specialist for StepFunctionsSpecialist {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact> {
        let mut facts = Vec::new();
        let mut errors = ErrorFactGuard::new();

        // A trace-discovered workflow carries the execution ARN; an explicit
        // target carries the state machine ARN.
        let execution_arn = resource
            .metadata
            .get("execution_arn")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let state_machine_arn = resource.arn.clone().filter(|arn| arn.contains(":stateMachine:"));

        if let Some(execution_arn) = &execution_arn {
            let raw =
                sfn_tools::get_stepfunctions_execution_details(&ctx.tools, execution_arn).await;
            match parse_tool_document(&raw) {
                Ok(details) => {
                    let status = details
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("UNKNOWN");
                    if status != "SUCCEEDED" && status != "RUNNING" {
                        facts.push(Fact::new(
                            "stepfunctions_execution",
                            format!("Workflow execution {execution_arn} finished with status {status}"),
                            0.9,
                        ));
                    }
                    for event in details
                        .get("failure_events")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default()
                    {
                        if let Some((error, cause)) = failure_details(&event) {
                            facts.push(Fact::new(
                                "stepfunctions_execution",
                                format!("Workflow failure {error}: {cause}"),
                                0.95,
                            ));
                        }
                    }
                }
                Err(error) => errors.report(
                    &mut facts,
                    "stepfunctions_execution",
                    format!("Could not load execution {execution_arn}: {error}"),
                ),
            }
        }

        if let Some(state_machine_arn) = &state_machine_arn {
            let raw = sfn_tools::get_stepfunctions_definition(&ctx.tools, state_machine_arn).await;
            match parse_tool_document(&raw) {
                Ok(definition) => {
                    let status = definition
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("UNKNOWN");
                    let machine_type = definition
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("STANDARD");
                    facts.push(Fact::new(
                        "stepfunctions_execution",
                        format!(
                            "State machine {state_machine_arn} is {status} (type {machine_type})"
                        ),
                        0.8,
                    ));
                }
                Err(error) => errors.report(
                    &mut facts,
                    "stepfunctions_execution",
                    format!("Could not load definition for {state_machine_arn}: {error}"),
                ),
            }

            let raw = sfn_tools::list_stepfunctions_executions(
                &ctx.tools,
                state_machine_arn,
                Some("FAILED"),
                5,
            )
            .await;
            if let Ok(listing) = parse_tool_document(&raw) {
                let count = listing
                    .get("execution_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if count > 0 {
                    facts.push(Fact::new(
                        "stepfunctions_execution",
                        format!("{count} recent failed executions on {state_machine_arn}"),
                        0.9,
                    ));
                }
            }

            let raw =
                sfn_tools::get_stepfunctions_metrics(&ctx.tools, state_machine_arn, 24).await;
            if let Ok(metrics) = parse_tool_document(&raw) {
                let failed =
                    sum_datapoints(metrics.get("metrics").and_then(|m| m.get("ExecutionsFailed")));
                let timed_out = sum_datapoints(
                    metrics.get("metrics").and_then(|m| m.get("ExecutionsTimedOut")),
                );
                if failed > 0.0 {
                    facts.push(Fact::new(
                        "stepfunctions_execution",
                        format!("{failed:.0} workflow executions failed in the last 24h"),
                        0.85,
                    ));
                }
                if timed_out > 0.0 {
                    facts.push(Fact::new(
                        "stepfunctions_execution",
                        format!("{timed_out:.0} workflow executions timed out in the last 24h"),
                        0.85,
                    ));
                }
            }
        }

        if execution_arn.is_none() && state_machine_arn.is_none() {
            errors.report(
                &mut facts,
                "stepfunctions_execution",
                format!(
                    "No execution or state machine ARN available for workflow resource {}",
                    resource.name
                ),
            );
        }

        facts.truncate(MAX_FACTS_PER_RESOURCE);
        facts
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["stepfunctions"]
    }

    fn name(&self) -> &'static str {
        "stepfunctions"
    }
}

/// Pull `error`/`cause` out of whichever event-details object is present.
fn failure_details(event: &Value) -> Option<(String, String)> {
    let object = event.as_object()?;
    for (key, details) in object {
        if !key.ends_with("EventDetails") {
            continue;
        }
        let error = details.get("error").and_then(Value::as_str);
        let cause = details.get("cause").and_then(Value::as_str);
        if error.is_some() || cause.is_some() {
            return Some((
                error.unwrap_or("unknown").to_string(),
                cause.unwrap_or("no cause recorded").to_string(),
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn failed_execution_yields_cause_fact() {
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "stepfunctions",
                    "describe-execution",
                    json!({"status": "FAILED", "startDate": "2026-01-01T00:00:00Z"}),
                )
                .with_response(
                    "stepfunctions",
                    "get-execution-history",
                    json!({"events": [{
                        "type": "ExecutionFailed",
                        "executionFailedEventDetails": {
                            "error": "States.TaskFailed",
                            "cause": "Lambda function returned error"
                        }
                    }]}),
                ),
        );
        let ctx = SpecialistContext {
            tools: tool_context(backend).await,
            trace_ids: vec![],
        };
        let mut resource = Resource::new("stepfunctions", "STEPFUNCTIONS", "eu-west-1");
        resource.metadata.insert(
            "execution_arn".to_string(),
            json!("arn:aws:states:eu-west-1:123:execution:checkout:run-1"),
        );

        let facts = StepFunctionsSpecialist.analyze(&resource, &ctx).await;
        assert!(facts.iter().any(|f| f.content.contains("status FAILED")));
        assert!(facts
            .iter()
            .any(|f| f.content.contains("States.TaskFailed") && f.confidence == 0.95));
    }
}
