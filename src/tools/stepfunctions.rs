use crate::tools::{error_envelope, fetch_log_events, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get a state machine definition and its execution role.
pub async fn get_stepfunctions_definition(ctx: &ToolContext, state_machine_arn: &str) -> String {
    match ctx
        .call(
            "stepfunctions",
            "describe-state-machine",
            json!({"stateMachineArn": state_machine_arn}),
        )
        .await
    {
        Ok(response) => json!({
            "state_machine_arn": state_machine_arn,
            "name": response.get("name").cloned().unwrap_or(Value::Null),
            "status": response.get("status").cloned().unwrap_or(Value::Null),
            "type": response.get("type").cloned().unwrap_or(Value::Null),
            "role_arn": response.get("roleArn").cloned().unwrap_or(Value::Null),
            "definition": response.get("definition").cloned().unwrap_or(Value::Null),
            "logging_configuration": response
                .get("loggingConfiguration")
                .cloned()
                .unwrap_or(Value::Null),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("state_machine_arn", state_machine_arn)]),
    }
}

/// Get the status and failure details of one execution.
pub async fn get_stepfunctions_execution_details(
    ctx: &ToolContext,
    execution_arn: &str,
) -> String {
    let response = match ctx
        .call(
            "stepfunctions",
            "describe-execution",
            json!({"executionArn": execution_arn}),
        )
        .await
    {
        Ok(response) => response,
        Err(e) => return error_envelope(e, &[("execution_arn", execution_arn)]),
    };

    let status = response
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();

    // Failure cause lives in the execution history, not in describe-execution.
    let mut failure_events: Vec<Value> = Vec::new();
    if status == "FAILED" || status == "TIMED_OUT" || status == "ABORTED" {
        if let Ok(history) = ctx
            .call(
                "stepfunctions",
                "get-execution-history",
                json!({
                    "executionArn": execution_arn,
                    "reverseOrder": true,
                    "maxResults": 10,
                }),
            )
            .await
        {
            failure_events = history
                .get("events")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|event| {
                    event
                        .get("type")
                        .and_then(Value::as_str)
                        .map(|t| t.contains("Failed") || t.contains("TimedOut") || t.contains("Aborted"))
                        .unwrap_or(false)
                })
                .collect();
        }
    }

    json!({
        "execution_arn": execution_arn,
        "status": status,
        "start_date": response.get("startDate").cloned().unwrap_or(Value::Null),
        "stop_date": response.get("stopDate").cloned().unwrap_or(Value::Null),
        "input": response.get("input").cloned().unwrap_or(Value::Null),
        "failure_events": failure_events,
    })
    .to_string()
}

/// List recent executions, optionally filtered by status.
pub async fn list_stepfunctions_executions(
    ctx: &ToolContext,
    state_machine_arn: &str,
    status_filter: Option<&str>,
    limit: u64,
) -> String {
    let mut params = json!({
        "stateMachineArn": state_machine_arn,
        "maxResults": limit,
    });
    if let Some(status) = status_filter {
        params["statusFilter"] = Value::String(status.to_string());
    }
    match ctx.call("stepfunctions", "list-executions", params).await {
        Ok(response) => {
            let executions: Vec<Value> = response
                .get("executions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|e| {
                    json!({
                        "execution_arn": e.get("executionArn").cloned().unwrap_or(Value::Null),
                        "status": e.get("status").cloned().unwrap_or(Value::Null),
                        "start_date": e.get("startDate").cloned().unwrap_or(Value::Null),
                        "stop_date": e.get("stopDate").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "state_machine_arn": state_machine_arn,
                "status_filter": status_filter,
                "execution_count": executions.len(),
                "executions": executions,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("state_machine_arn", state_machine_arn)]),
    }
}

/// Get failure/timeout/start series for one state machine.
pub async fn get_stepfunctions_metrics(
    ctx: &ToolContext,
    state_machine_arn: &str,
    hours_back: i64,
) -> String {
    let mut metrics = serde_json::Map::new();
    for metric in ["ExecutionsStarted", "ExecutionsFailed", "ExecutionsTimedOut"] {
        match fetch_metric_series(
            ctx,
            "AWS/States",
            metric,
            "StateMachineArn",
            state_machine_arn,
            "Sum",
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("state_machine_arn", state_machine_arn)]),
        }
    }
    json!({
        "state_machine_arn": state_machine_arn,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}

/// Get log events from the state machine's configured log destination.
pub async fn get_stepfunctions_logs(
    ctx: &ToolContext,
    state_machine_arn: &str,
    hours_back: i64,
) -> String {
    let definition = match ctx
        .call(
            "stepfunctions",
            "describe-state-machine",
            json!({"stateMachineArn": state_machine_arn}),
        )
        .await
    {
        Ok(response) => response,
        Err(e) => return error_envelope(e, &[("state_machine_arn", state_machine_arn)]),
    };

    let log_group = definition
        .get("loggingConfiguration")
        .and_then(|c| c.get("destinations"))
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|d| d.get("cloudWatchLogsLogGroup"))
        .and_then(|g| g.get("logGroupArn"))
        .and_then(Value::as_str)
        .and_then(|arn| arn.split(":log-group:").nth(1))
        .map(|tail| tail.trim_end_matches(":*").to_string());

    let Some(log_group) = log_group else {
        return error_envelope(
            "State machine has no log destination configured",
            &[("state_machine_arn", state_machine_arn)],
        );
    };

    match fetch_log_events(ctx, &log_group, None, hours_back, 50).await {
        Ok(events) => json!({
            "state_machine_arn": state_machine_arn,
            "log_group": log_group,
            "event_count": events.len(),
            "events": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("state_machine_arn", state_machine_arn)]),
    }
}
