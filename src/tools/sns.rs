use crate::tools::{error_envelope, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get topic attributes: display name, subscription counts, policy.
pub async fn get_sns_topic_config(ctx: &ToolContext, topic_arn: &str) -> String {
    match ctx
        .call(
            "sns",
            "get-topic-attributes",
            json!({"TopicArn": topic_arn}),
        )
        .await
    {
        Ok(response) => {
            let attributes = response.get("Attributes").cloned().unwrap_or(json!({}));
            json!({
                "topic_arn": topic_arn,
                "display_name": attributes.get("DisplayName").cloned().unwrap_or(Value::Null),
                "subscriptions_confirmed": attributes
                    .get("SubscriptionsConfirmed")
                    .cloned()
                    .unwrap_or(Value::Null),
                "subscriptions_pending": attributes
                    .get("SubscriptionsPending")
                    .cloned()
                    .unwrap_or(Value::Null),
                "effective_delivery_policy": attributes
                    .get("EffectiveDeliveryPolicy")
                    .cloned()
                    .unwrap_or(Value::Null),
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("topic_arn", topic_arn)]),
    }
}

/// List subscriptions on one topic.
pub async fn get_sns_subscriptions(ctx: &ToolContext, topic_arn: &str) -> String {
    match ctx
        .call(
            "sns",
            "list-subscriptions-by-topic",
            json!({"TopicArn": topic_arn}),
        )
        .await
    {
        Ok(response) => {
            let subscriptions: Vec<Value> = response
                .get("Subscriptions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|s| {
                    json!({
                        "protocol": s.get("Protocol").cloned().unwrap_or(Value::Null),
                        "endpoint": s.get("Endpoint").cloned().unwrap_or(Value::Null),
                        "subscription_arn": s.get("SubscriptionArn").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "topic_arn": topic_arn,
                "subscription_count": subscriptions.len(),
                "subscriptions": subscriptions,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("topic_arn", topic_arn)]),
    }
}

/// Get publish/failure series for one topic.
pub async fn get_sns_topic_metrics(ctx: &ToolContext, topic_name: &str, hours_back: i64) -> String {
    let mut metrics = serde_json::Map::new();
    for metric in ["NumberOfMessagesPublished", "NumberOfNotificationsFailed"] {
        match fetch_metric_series(
            ctx,
            "AWS/SNS",
            metric,
            "TopicName",
            topic_name,
            "Sum",
            hours_back,
        )
        .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("topic_name", topic_name)]),
        }
    }
    json!({
        "topic_name": topic_name,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}
