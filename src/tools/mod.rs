pub mod apigateway;
pub mod cloudwatch;
pub mod dynamodb;
pub mod eventbridge;
pub mod health;
pub mod iam;
pub mod lambda;
pub mod s3;
pub mod sns;
pub mod sqs;
pub mod stepfunctions;
pub mod vpc;
pub mod xray;

use crate::aws::{BackendError, CloudClient};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Call-scoped handle passed to tools and specialists.
///
/// Wraps the investigation's [`CloudClient`]; tools never reach for globals.
#[derive(Clone)]
pub struct ToolContext {
    client: Arc<CloudClient>,
}

impl ToolContext {
    pub fn new(client: Arc<CloudClient>) -> Self {
        Self { client }
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        self.client.service(service).call(operation, params).await
    }
}

/// Serialize a tool failure as the fixed error envelope. The arguments are
/// echoed back for traceability.
pub fn error_envelope(message: impl ToString, args: &[(&str, &str)]) -> String {
    let mut object = Map::new();
    object.insert("error".to_string(), Value::String(message.to_string()));
    for (key, value) in args {
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    Value::Object(object).to_string()
}

/// Whether a parsed tool document signals failure.
pub fn is_error_document(document: &Value) -> bool {
    document.get("error").is_some()
}

/// Time window ending now, expressed as RFC 3339 bounds.
pub fn metric_window(hours_back: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    let start = end - Duration::hours(hours_back.max(1));
    (start, end)
}

/// Fetch one CloudWatch metric series. Shared by the per-service metric
/// tools so they stay thin.
pub async fn fetch_metric_series(
    ctx: &ToolContext,
    namespace: &str,
    metric_name: &str,
    dimension_name: &str,
    dimension_value: &str,
    statistic: &str,
    hours_back: i64,
) -> Result<Value, BackendError> {
    let (start, end) = metric_window(hours_back);
    let response = ctx
        .call(
            "cloudwatch",
            "get-metric-statistics",
            json!({
                "Namespace": namespace,
                "MetricName": metric_name,
                "Dimensions": [{"Name": dimension_name, "Value": dimension_value}],
                "StartTime": start.to_rfc3339(),
                "EndTime": end.to_rfc3339(),
                "Period": 300,
                "Statistics": [statistic],
            }),
        )
        .await?;
    Ok(response.get("Datapoints").cloned().unwrap_or(json!([])))
}

/// Fetch log events from one log group, optionally filtered.
pub async fn fetch_log_events(
    ctx: &ToolContext,
    log_group: &str,
    filter_pattern: Option<&str>,
    hours_back: i64,
    limit: u64,
) -> Result<Vec<Value>, BackendError> {
    let (start, end) = metric_window(hours_back);
    let mut params = json!({
        "logGroupName": log_group,
        "startTime": start.timestamp_millis(),
        "endTime": end.timestamp_millis(),
        "limit": limit,
    });
    if let Some(pattern) = filter_pattern {
        params["filterPattern"] = Value::String(pattern.to_string());
    }
    let response = ctx.call("logs", "filter-log-events", params).await?;
    let events = response
        .get("events")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(events
        .into_iter()
        .map(|event| {
            json!({
                "timestamp": event.get("timestamp").cloned().unwrap_or(Value::Null),
                "message": event.get("message").cloned().unwrap_or(Value::Null),
                "log_stream": event.get("logStreamName").cloned().unwrap_or(Value::Null),
            })
        })
        .collect())
}

/// Parsed ARN components.
/// Format: `arn:partition:service:region:account-id:resource`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArnParts {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

pub fn parse_arn(arn: &str) -> Option<ArnParts> {
    if !arn.starts_with("arn:") {
        return None;
    }
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() < 6 {
        return None;
    }
    Some(ArnParts {
        partition: parts[1].to_string(),
        service: parts[2].to_string(),
        region: parts[3].to_string(),
        account_id: parts[4].to_string(),
        resource: parts[5].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_echoes_arguments() {
        let envelope = error_envelope("Trace not found", &[("trace_id", "1-abc")]);
        let parsed: Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["error"], "Trace not found");
        assert_eq!(parsed["trace_id"], "1-abc");
    }

    #[test]
    fn parses_full_arn() {
        let parts =
            parse_arn("arn:aws:states:eu-west-1:123456789012:stateMachine:checkout").unwrap();
        assert_eq!(parts.service, "states");
        assert_eq!(parts.region, "eu-west-1");
        assert_eq!(parts.resource, "stateMachine:checkout");
    }

    #[test]
    fn rejects_non_arn() {
        assert!(parse_arn("payment-processor").is_none());
        assert!(parse_arn("arn:aws:lambda").is_none());
    }
}
