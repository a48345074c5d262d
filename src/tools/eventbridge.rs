use crate::tools::{error_envelope, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get the configuration of one rule on one event bus.
pub async fn get_eventbridge_rule_config(
    ctx: &ToolContext,
    rule_name: &str,
    event_bus: Option<&str>,
) -> String {
    let mut params = json!({"Name": rule_name});
    if let Some(bus) = event_bus {
        params["EventBusName"] = Value::String(bus.to_string());
    }
    match ctx.call("events", "describe-rule", params).await {
        Ok(response) => json!({
            "rule": rule_name,
            "event_bus": response.get("EventBusName").cloned().unwrap_or(json!("default")),
            "state": response.get("State").cloned().unwrap_or(Value::Null),
            "schedule_expression": response
                .get("ScheduleExpression")
                .cloned()
                .unwrap_or(Value::Null),
            "event_pattern": response
                .get("EventPattern")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or(Value::Null),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("rule", rule_name)]),
    }
}

/// List the targets wired to one rule.
pub async fn get_eventbridge_targets(
    ctx: &ToolContext,
    rule_name: &str,
    event_bus: Option<&str>,
) -> String {
    let mut params = json!({"Rule": rule_name});
    if let Some(bus) = event_bus {
        params["EventBusName"] = Value::String(bus.to_string());
    }
    match ctx.call("events", "list-targets-by-rule", params).await {
        Ok(response) => {
            let targets: Vec<Value> = response
                .get("Targets")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|t| {
                    json!({
                        "id": t.get("Id").cloned().unwrap_or(Value::Null),
                        "arn": t.get("Arn").cloned().unwrap_or(Value::Null),
                        "dead_letter_config": t.get("DeadLetterConfig").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "rule": rule_name,
                "target_count": targets.len(),
                "targets": targets,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("rule", rule_name)]),
    }
}

/// Get invocation/failure series for one rule.
pub async fn get_eventbridge_metrics(ctx: &ToolContext, rule_name: &str, hours_back: i64) -> String {
    let mut metrics = serde_json::Map::new();
    for metric in ["Invocations", "FailedInvocations", "ThrottledRules"] {
        match fetch_metric_series(
            ctx,
            "AWS/Events",
            metric,
            "RuleName",
            rule_name,
            "Sum",
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("rule", rule_name)]),
        }
    }
    json!({
        "rule": rule_name,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}

/// Get the configuration of one event bus.
pub async fn get_eventbridge_bus_config(ctx: &ToolContext, event_bus: &str) -> String {
    match ctx
        .call("events", "describe-event-bus", json!({"Name": event_bus}))
        .await
    {
        Ok(response) => json!({
            "event_bus": event_bus,
            "arn": response.get("Arn").cloned().unwrap_or(Value::Null),
            "policy": response
                .get("Policy")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or(Value::Null),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("event_bus", event_bus)]),
    }
}
