use crate::tools::{error_envelope, fetch_log_events, fetch_metric_series, ToolContext};
use regex::Regex;
use serde_json::{json, Value};

/// Whether a string already has the shape of an API id (10 lowercase
/// alphanumerics), as opposed to a human-friendly API name.
pub fn looks_like_api_id(name: &str) -> bool {
    let re = Regex::new(r"^[a-z0-9]{10}$").expect("static regex");
    re.is_match(name)
}

/// Resolve a human API name to its id. Ids pass through unchanged.
pub async fn resolve_api_gateway_id(ctx: &ToolContext, name_or_id: &str) -> String {
    if looks_like_api_id(name_or_id) {
        return json!({"name": name_or_id, "api_id": name_or_id}).to_string();
    }
    match ctx.call("apigateway", "get-rest-apis", json!({})).await {
        Ok(response) => {
            let found = response
                .get("items")
                .and_then(Value::as_array)
                .and_then(|items| {
                    items.iter().find(|api| {
                        api.get("name").and_then(Value::as_str) == Some(name_or_id)
                    })
                })
                .and_then(|api| api.get("id"))
                .and_then(Value::as_str);
            match found {
                Some(api_id) => json!({"name": name_or_id, "api_id": api_id}).to_string(),
                None => error_envelope("API not found", &[("name", name_or_id)]),
            }
        }
        Err(e) => error_envelope(e, &[("name", name_or_id)]),
    }
}

/// Get the configuration of one API stage.
pub async fn get_api_gateway_stage_config(ctx: &ToolContext, api_id: &str, stage: &str) -> String {
    match ctx
        .call(
            "apigateway",
            "get-stage",
            json!({"restApiId": api_id, "stageName": stage}),
        )
        .await
    {
        Ok(response) => {
            let method_settings = response.get("methodSettings").cloned().unwrap_or(json!({}));
            json!({
                "api_id": api_id,
                "stage": stage,
                "xray_tracing_enabled": response
                    .get("tracingEnabled")
                    .cloned()
                    .unwrap_or(json!(false)),
                "cache_cluster_enabled": response
                    .get("cacheClusterEnabled")
                    .cloned()
                    .unwrap_or(json!(false)),
                "deployment_id": response.get("deploymentId").cloned().unwrap_or(Value::Null),
                "last_updated": response.get("lastUpdatedDate").cloned().unwrap_or(Value::Null),
                "method_settings": method_settings,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("api_id", api_id), ("stage", stage)]),
    }
}

/// Get 4xx/5xx/latency series for one API stage.
pub async fn get_api_gateway_metrics(
    ctx: &ToolContext,
    api_id: &str,
    stage: &str,
    hours_back: i64,
) -> String {
    let mut metrics = serde_json::Map::new();
    for (metric, statistic) in [
        ("5XXError", "Sum"),
        ("4XXError", "Sum"),
        ("Count", "Sum"),
        ("Latency", "Average"),
    ] {
        match fetch_metric_series(
            ctx,
            "AWS/ApiGateway",
            metric,
            "ApiName",
            api_id,
            statistic,
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("api_id", api_id), ("stage", stage)]),
        }
    }
    json!({
        "api_id": api_id,
        "stage": stage,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}

/// Get parsed execution-log entries for one API stage.
pub async fn get_apigateway_access_logs(
    ctx: &ToolContext,
    api_id: &str,
    stage: &str,
    hours_back: i64,
    limit: u64,
) -> String {
    let log_group = format!("API-Gateway-Execution-Logs_{api_id}/{stage}");
    match fetch_log_events(ctx, &log_group, None, hours_back, limit).await {
        Ok(events) => json!({
            "api_id": api_id,
            "stage": stage,
            "log_group": log_group,
            "entry_count": events.len(),
            "log_entries": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("api_id", api_id), ("stage", stage)]),
    }
}

/// Get execution-log entries for one trace id on one API stage.
pub async fn query_apigateway_logs_by_trace(
    ctx: &ToolContext,
    api_id: &str,
    stage: &str,
    trace_id: &str,
    hours_back: i64,
) -> String {
    let log_group = format!("API-Gateway-Execution-Logs_{api_id}/{stage}");
    let pattern = format!("\"{trace_id}\"");
    match fetch_log_events(ctx, &log_group, Some(&pattern), hours_back, 50).await {
        Ok(events) => json!({
            "api_id": api_id,
            "stage": stage,
            "trace_id": trace_id,
            "log_group": log_group,
            "log_entries": events,
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("api_id", api_id), ("trace_id", trace_id)]),
    }
}

/// Get recent deployments of one API.
pub async fn get_api_gateway_deployment_history(
    ctx: &ToolContext,
    api_id: &str,
    limit: usize,
) -> String {
    match ctx
        .call("apigateway", "get-deployments", json!({"restApiId": api_id}))
        .await
    {
        Ok(response) => {
            let deployments: Vec<Value> = response
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .take(limit)
                .map(|d| {
                    json!({
                        "id": d.get("id").cloned().unwrap_or(Value::Null),
                        "created_date": d.get("createdDate").cloned().unwrap_or(Value::Null),
                        "description": d.get("description").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "api_id": api_id,
                "deployment_count": deployments.len(),
                "deployments": deployments,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("api_id", api_id)]),
    }
}
