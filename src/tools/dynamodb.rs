use crate::tools::{error_envelope, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get table status, capacity mode and stream settings.
pub async fn get_dynamodb_table_config(ctx: &ToolContext, table_name: &str) -> String {
    match ctx
        .call("dynamodb", "describe-table", json!({"TableName": table_name}))
        .await
    {
        Ok(response) => {
            let table = response.get("Table").cloned().unwrap_or(json!({}));
            json!({
                "table_name": table_name,
                "status": table.get("TableStatus").cloned().unwrap_or(Value::Null),
                "billing_mode": table
                    .get("BillingModeSummary")
                    .and_then(|b| b.get("BillingMode"))
                    .cloned()
                    .unwrap_or(json!("PROVISIONED")),
                "read_capacity": table
                    .get("ProvisionedThroughput")
                    .and_then(|t| t.get("ReadCapacityUnits"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "write_capacity": table
                    .get("ProvisionedThroughput")
                    .and_then(|t| t.get("WriteCapacityUnits"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "item_count": table.get("ItemCount").cloned().unwrap_or(Value::Null),
                "stream_enabled": table
                    .get("StreamSpecification")
                    .and_then(|s| s.get("StreamEnabled"))
                    .cloned()
                    .unwrap_or(json!(false)),
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("table_name", table_name)]),
    }
}

/// Get throttle/error/capacity series for one table.
pub async fn get_dynamodb_table_metrics(
    ctx: &ToolContext,
    table_name: &str,
    hours_back: i64,
) -> String {
    let mut metrics = serde_json::Map::new();
    for (metric, statistic) in [
        ("ThrottledRequests", "Sum"),
        ("SystemErrors", "Sum"),
        ("ConsumedReadCapacityUnits", "Sum"),
        ("ConsumedWriteCapacityUnits", "Sum"),
    ] {
        match fetch_metric_series(
            ctx,
            "AWS/DynamoDB",
            metric,
            "TableName",
            table_name,
            statistic,
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("table_name", table_name)]),
        }
    }
    json!({
        "table_name": table_name,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}
