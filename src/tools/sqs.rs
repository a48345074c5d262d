use crate::tools::{error_envelope, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

async fn queue_url(ctx: &ToolContext, queue_name: &str) -> Result<String, String> {
    match ctx
        .call("sqs", "get-queue-url", json!({"QueueName": queue_name}))
        .await
    {
        Ok(response) => response
            .get("QueueUrl")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| "Queue URL missing from response".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Get queue attributes: visibility, retention, redrive policy, depth.
pub async fn get_sqs_queue_config(ctx: &ToolContext, queue_name: &str) -> String {
    let url = match queue_url(ctx, queue_name).await {
        Ok(url) => url,
        Err(e) => return error_envelope(e, &[("queue_name", queue_name)]),
    };
    match ctx
        .call(
            "sqs",
            "get-queue-attributes",
            json!({"QueueUrl": url, "AttributeNames": ["All"]}),
        )
        .await
    {
        Ok(response) => {
            let attributes = response.get("Attributes").cloned().unwrap_or(json!({}));
            let redrive_policy = attributes
                .get("RedrivePolicy")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or(Value::Null);
            json!({
                "queue_name": queue_name,
                "queue_url": url,
                "visibility_timeout": attributes.get("VisibilityTimeout").cloned().unwrap_or(Value::Null),
                "message_retention_period": attributes
                    .get("MessageRetentionPeriod")
                    .cloned()
                    .unwrap_or(Value::Null),
                "approximate_messages": attributes
                    .get("ApproximateNumberOfMessages")
                    .cloned()
                    .unwrap_or(Value::Null),
                "approximate_messages_not_visible": attributes
                    .get("ApproximateNumberOfMessagesNotVisible")
                    .cloned()
                    .unwrap_or(Value::Null),
                "redrive_policy": redrive_policy,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("queue_name", queue_name)]),
    }
}

/// Get the dead-letter queue wired to a queue's redrive policy, with depth.
pub async fn get_sqs_dead_letter_queue(ctx: &ToolContext, queue_name: &str) -> String {
    let config_raw = get_sqs_queue_config(ctx, queue_name).await;
    let config: Value = match serde_json::from_str(&config_raw) {
        Ok(v) => v,
        Err(_) => return config_raw,
    };
    if config.get("error").is_some() {
        return config_raw;
    }

    let Some(dlq_arn) = config
        .get("redrive_policy")
        .and_then(|p| p.get("deadLetterTargetArn"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
    else {
        return json!({
            "queue_name": queue_name,
            "dlq_configured": false,
        })
        .to_string();
    };

    let dlq_name = dlq_arn.rsplit(':').next().unwrap_or("").to_string();
    let depth = match queue_url(ctx, &dlq_name).await {
        Ok(url) => ctx
            .call(
                "sqs",
                "get-queue-attributes",
                json!({"QueueUrl": url, "AttributeNames": ["ApproximateNumberOfMessages"]}),
            )
            .await
            .ok()
            .and_then(|r| {
                r.get("Attributes")
                    .and_then(|a| a.get("ApproximateNumberOfMessages"))
                    .cloned()
            })
            .unwrap_or(Value::Null),
        Err(e) => return error_envelope(e, &[("queue_name", queue_name), ("dlq_name", &dlq_name)]),
    };

    json!({
        "queue_name": queue_name,
        "dlq_configured": true,
        "dlq_arn": dlq_arn,
        "dlq_name": dlq_name,
        "dlq_depth": depth,
    })
    .to_string()
}

/// Get message age and throughput series for one queue.
pub async fn get_sqs_queue_metrics(ctx: &ToolContext, queue_name: &str, hours_back: i64) -> String {
    let mut metrics = serde_json::Map::new();
    for (metric, statistic) in [
        ("ApproximateAgeOfOldestMessage", "Maximum"),
        ("NumberOfMessagesSent", "Sum"),
        ("NumberOfMessagesDeleted", "Sum"),
    ] {
        match fetch_metric_series(
            ctx,
            "AWS/SQS",
            metric,
            "QueueName",
            queue_name,
            statistic,
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("queue_name", queue_name)]),
        }
    }
    json!({
        "queue_name": queue_name,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}
