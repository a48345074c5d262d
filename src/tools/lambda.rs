use crate::tools::{error_envelope, fetch_log_events, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get the configuration of a compute function.
pub async fn get_lambda_config(ctx: &ToolContext, function_name: &str) -> String {
    match ctx
        .call(
            "lambda",
            "get-function-configuration",
            json!({"FunctionName": function_name}),
        )
        .await
    {
        Ok(response) => json!({
            "function_name": function_name,
            "runtime": response.get("Runtime").cloned().unwrap_or(Value::Null),
            "handler": response.get("Handler").cloned().unwrap_or(Value::Null),
            "timeout": response.get("Timeout").cloned().unwrap_or(Value::Null),
            "memory_size": response.get("MemorySize").cloned().unwrap_or(Value::Null),
            "last_modified": response.get("LastModified").cloned().unwrap_or(Value::Null),
            "state": response.get("State").cloned().unwrap_or(Value::Null),
            "role": response.get("Role").cloned().unwrap_or(Value::Null),
            "environment_variable_count": response
                .get("Environment")
                .and_then(|e| e.get("Variables"))
                .and_then(Value::as_object)
                .map(|v| v.len())
                .unwrap_or(0),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("function_name", function_name)]),
    }
}

/// Get invocation/error/throttle/duration series for a function.
pub async fn get_lambda_metrics(ctx: &ToolContext, function_name: &str, hours_back: i64) -> String {
    let mut metrics = serde_json::Map::new();
    for (metric, statistic) in [
        ("Invocations", "Sum"),
        ("Errors", "Sum"),
        ("Throttles", "Sum"),
        ("Duration", "Average"),
    ] {
        match fetch_metric_series(
            ctx,
            "AWS/Lambda",
            metric,
            "FunctionName",
            function_name,
            statistic,
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("function_name", function_name)]),
        }
    }
    json!({
        "function_name": function_name,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}

/// Get recent log events for a function.
pub async fn get_lambda_logs(
    ctx: &ToolContext,
    function_name: &str,
    hours_back: i64,
    limit: u64,
) -> String {
    let log_group = format!("/aws/lambda/{function_name}");
    match fetch_log_events(ctx, &log_group, None, hours_back, limit).await {
        Ok(events) => json!({
            "function_name": function_name,
            "log_group": log_group,
            "event_count": events.len(),
            "events": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("function_name", function_name)]),
    }
}

/// Get failed invocations by scanning the function's error log lines.
pub async fn get_lambda_failed_invocations(
    ctx: &ToolContext,
    function_name: &str,
    hours_back: i64,
    limit: u64,
) -> String {
    let log_group = format!("/aws/lambda/{function_name}");
    let pattern = "?ERROR ?Exception ?\"Task timed out\"";
    match fetch_log_events(ctx, &log_group, Some(pattern), hours_back, limit).await {
        Ok(events) => {
            let failures: Vec<Value> = events
                .iter()
                .filter_map(|event| {
                    let message = event.get("message").and_then(Value::as_str)?;
                    Some(json!({
                        "timestamp": event.get("timestamp").cloned().unwrap_or(Value::Null),
                        "message": message.trim(),
                    }))
                })
                .collect();
            json!({
                "function_name": function_name,
                "log_group": log_group,
                "failure_count": failures.len(),
                "failed_invocations": failures,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("function_name", function_name)]),
    }
}

/// Get recent published versions of a function.
pub async fn get_lambda_version_history(
    ctx: &ToolContext,
    function_name: &str,
    limit: usize,
) -> String {
    match ctx
        .call(
            "lambda",
            "list-versions-by-function",
            json!({"FunctionName": function_name}),
        )
        .await
    {
        Ok(response) => {
            let versions: Vec<Value> = response
                .get("Versions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .rev()
                .take(limit)
                .map(|version| {
                    json!({
                        "version": version.get("Version").cloned().unwrap_or(Value::Null),
                        "last_modified": version.get("LastModified").cloned().unwrap_or(Value::Null),
                        "description": version.get("Description").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "function_name": function_name,
                "version_count": versions.len(),
                "versions": versions,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("function_name", function_name)]),
    }
}
