use crate::tools::{error_envelope, fetch_metric_series, ToolContext};
use serde_json::{json, Value};

/// Get bucket location, versioning and encryption settings.
pub async fn get_s3_bucket_config(ctx: &ToolContext, bucket: &str) -> String {
    let location = match ctx
        .call("s3api", "get-bucket-location", json!({"Bucket": bucket}))
        .await
    {
        Ok(response) => response
            .get("LocationConstraint")
            .cloned()
            .unwrap_or(Value::Null),
        Err(e) => return error_envelope(e, &[("bucket", bucket)]),
    };

    let versioning = ctx
        .call("s3api", "get-bucket-versioning", json!({"Bucket": bucket}))
        .await
        .ok()
        .and_then(|r| r.get("Status").cloned())
        .unwrap_or(json!("Disabled"));

    // Unencrypted buckets return an error for this call; report that as a
    // plain "none" rather than a tool failure.
    let encryption = ctx
        .call("s3api", "get-bucket-encryption", json!({"Bucket": bucket}))
        .await
        .ok()
        .and_then(|r| {
            r.get("ServerSideEncryptionConfiguration")
                .and_then(|c| c.get("Rules"))
                .and_then(Value::as_array)
                .and_then(|rules| rules.first())
                .and_then(|rule| rule.get("ApplyServerSideEncryptionByDefault"))
                .and_then(|d| d.get("SSEAlgorithm"))
                .cloned()
        })
        .unwrap_or(json!("none"));

    json!({
        "bucket": bucket,
        "location": location,
        "versioning": versioning,
        "encryption": encryption,
    })
    .to_string()
}

/// Get the bucket policy document.
pub async fn get_s3_bucket_policy(ctx: &ToolContext, bucket: &str) -> String {
    match ctx
        .call("s3api", "get-bucket-policy", json!({"Bucket": bucket}))
        .await
    {
        Ok(response) => {
            // The policy arrives as a JSON-encoded string.
            let policy = response
                .get("Policy")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .unwrap_or(Value::Null);
            json!({"bucket": bucket, "policy": policy}).to_string()
        }
        Err(e) => error_envelope(e, &[("bucket", bucket)]),
    }
}

/// Get client/server error series for one bucket.
pub async fn get_s3_bucket_metrics(ctx: &ToolContext, bucket: &str, hours_back: i64) -> String {
    let mut metrics = serde_json::Map::new();
    for metric in ["4xxErrors", "5xxErrors"] {
        match fetch_metric_series(ctx, "AWS/S3", metric, "BucketName", bucket, "Sum", hours_back)
            .await
        {
            Ok(datapoints) => {
                metrics.insert(metric.to_string(), datapoints);
            }
            Err(e) => return error_envelope(e, &[("bucket", bucket)]),
        }
    }
    json!({
        "bucket": bucket,
        "hours_back": hours_back,
        "metrics": metrics,
    })
    .to_string()
}
