use crate::tools::{error_envelope, fetch_log_events, metric_window, ToolContext};
use serde_json::{json, Value};

/// Get recent events from one log group.
pub async fn get_log_events(
    ctx: &ToolContext,
    log_group: &str,
    hours_back: i64,
    limit: u64,
) -> String {
    match fetch_log_events(ctx, log_group, None, hours_back, limit).await {
        Ok(events) => json!({
            "log_group": log_group,
            "event_count": events.len(),
            "events": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("log_group", log_group)]),
    }
}

/// Get log entries containing one trace id.
pub async fn query_logs_by_trace_id(
    ctx: &ToolContext,
    log_group: &str,
    trace_id: &str,
    hours_back: i64,
) -> String {
    let pattern = format!("\"{trace_id}\"");
    match fetch_log_events(ctx, log_group, Some(&pattern), hours_back, 50).await {
        Ok(events) => json!({
            "log_group": log_group,
            "trace_id": trace_id,
            "entry_count": events.len(),
            "log_entries": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("log_group", log_group), ("trace_id", trace_id)]),
    }
}

/// Get statistics for an arbitrary metric.
pub async fn get_metric_statistics(
    ctx: &ToolContext,
    namespace: &str,
    metric_name: &str,
    dimensions: &[(&str, &str)],
    hours_back: i64,
) -> String {
    let (start, end) = metric_window(hours_back);
    let dimension_values: Vec<Value> = dimensions
        .iter()
        .map(|(name, value)| json!({"Name": name, "Value": value}))
        .collect();
    match ctx
        .call(
            "cloudwatch",
            "get-metric-statistics",
            json!({
                "Namespace": namespace,
                "MetricName": metric_name,
                "Dimensions": dimension_values,
                "StartTime": start.to_rfc3339(),
                "EndTime": end.to_rfc3339(),
                "Period": 300,
                "Statistics": ["Sum", "Average"],
            }),
        )
        .await
    {
        Ok(response) => json!({
            "namespace": namespace,
            "metric_name": metric_name,
            "datapoints": response.get("Datapoints").cloned().unwrap_or(json!([])),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("namespace", namespace), ("metric_name", metric_name)]),
    }
}

/// List alarms currently in ALARM state, optionally filtered by name prefix.
pub async fn get_cloudwatch_alarms(ctx: &ToolContext, name_prefix: Option<&str>) -> String {
    let mut params = json!({"StateValue": "ALARM"});
    if let Some(prefix) = name_prefix {
        params["AlarmNamePrefix"] = Value::String(prefix.to_string());
    }
    match ctx.call("cloudwatch", "describe-alarms", params).await {
        Ok(response) => {
            let alarms: Vec<Value> = response
                .get("MetricAlarms")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|a| {
                    json!({
                        "alarm_name": a.get("AlarmName").cloned().unwrap_or(Value::Null),
                        "state": a.get("StateValue").cloned().unwrap_or(Value::Null),
                        "metric_name": a.get("MetricName").cloned().unwrap_or(Value::Null),
                        "state_reason": a.get("StateReason").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "alarm_count": alarms.len(),
                "alarms": alarms,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("name_prefix", name_prefix.unwrap_or(""))]),
    }
}
