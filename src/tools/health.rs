use crate::tools::{error_envelope, metric_window, ToolContext};
use serde_json::{json, Value};

/// Check for open provider-side incidents on one service in one region.
///
/// Requires a support plan that includes the health API; callers treat the
/// error envelope as "unavailable", not as a finding.
pub async fn check_aws_service_health(ctx: &ToolContext, service_key: &str, region: &str) -> String {
    match ctx
        .call(
            "health",
            "describe-events",
            json!({
                "filter": {
                    "services": [service_key],
                    "regions": [region],
                    "eventStatusCodes": ["open"],
                }
            }),
        )
        .await
    {
        Ok(response) => {
            let events = response
                .get("events")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            json!({
                "service": service_key,
                "region": region,
                "active_events_count": events.len(),
                "aws_service_issue_detected": !events.is_empty(),
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("service", service_key), ("region", region)]),
    }
}

const CONFIG_CHANGE_PREFIXES: [&str; 6] = ["Update", "Put", "Delete", "Create", "Modify", "Attach"];

/// Look up recent audit-trail events touching one resource and flag
/// configuration changes.
pub async fn get_recent_cloudtrail_events(
    ctx: &ToolContext,
    resource_name: &str,
    hours_back: i64,
) -> String {
    let (start, end) = metric_window(hours_back);
    match ctx
        .call(
            "cloudtrail",
            "lookup-events",
            json!({
                "LookupAttributes": [
                    {"AttributeKey": "ResourceName", "AttributeValue": resource_name}
                ],
                "StartTime": start.to_rfc3339(),
                "EndTime": end.to_rfc3339(),
                "MaxResults": 50,
            }),
        )
        .await
    {
        Ok(response) => {
            let events: Vec<Value> = response
                .get("Events")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|e| {
                    json!({
                        "event_name": e.get("EventName").cloned().unwrap_or(Value::Null),
                        "event_time": e.get("EventTime").cloned().unwrap_or(Value::Null),
                        "username": e.get("Username").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            let change_count = events
                .iter()
                .filter(|e| {
                    e.get("event_name")
                        .and_then(Value::as_str)
                        .map(|name| CONFIG_CHANGE_PREFIXES.iter().any(|p| name.starts_with(p)))
                        .unwrap_or(false)
                })
                .count();
            json!({
                "resource_name": resource_name,
                "hours_back": hours_back,
                "total_events": events.len(),
                "configuration_changes_detected": change_count > 0,
                "configuration_change_count": change_count,
                "events": events,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("resource_name", resource_name)]),
    }
}
