use crate::tools::{error_envelope, metric_window, parse_arn, ToolContext};
use serde_json::{json, Value};

/// Get X-Ray trace details as a single JSON document.
pub async fn get_xray_trace(ctx: &ToolContext, trace_id: &str) -> String {
    match ctx
        .call("xray", "batch-get-traces", json!({"TraceIds": [trace_id]}))
        .await
    {
        Ok(response) => {
            let traces = response.get("Traces").and_then(Value::as_array);
            match traces.and_then(|t| t.first()) {
                Some(trace) => json!({
                    "trace_id": trace_id,
                    "duration": trace.get("Duration").cloned().unwrap_or(Value::Null),
                    "segments": trace.get("Segments").cloned().unwrap_or(json!([])),
                    "is_partial": trace.get("IsPartial").cloned().unwrap_or(json!(false)),
                })
                .to_string(),
                None => error_envelope("Trace not found", &[("trace_id", trace_id)]),
            }
        }
        Err(e) => error_envelope(e, &[("trace_id", trace_id)]),
    }
}

/// Extract every AWS resource involved in a trace: compute functions,
/// workflow executions, API gateway stages and data stores reached through
/// subsegments.
pub async fn get_all_resources_from_trace(ctx: &ToolContext, trace_id: &str) -> String {
    let response = match ctx
        .call("xray", "batch-get-traces", json!({"TraceIds": [trace_id]}))
        .await
    {
        Ok(response) => response,
        Err(e) => return error_envelope(e, &[("trace_id", trace_id)]),
    };

    let Some(trace) = response
        .get("Traces")
        .and_then(Value::as_array)
        .and_then(|t| t.first())
    else {
        return error_envelope("Trace not found", &[("trace_id", trace_id)]);
    };

    let mut resources: Vec<Value> = Vec::new();
    let mut discovered: Vec<String> = Vec::new();

    let segments = trace
        .get("Segments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for segment in &segments {
        let Some(document) = decode_segment_document(segment) else {
            continue;
        };
        if let Some(resource) = resource_from_segment(&document, &mut discovered) {
            resources.push(resource);
        }
        // Downstream calls show up as subsegments.
        if let Some(subsegments) = document.get("subsegments").and_then(Value::as_array) {
            for subsegment in subsegments {
                if let Some(resource) = resource_from_segment(subsegment, &mut discovered) {
                    resources.push(resource);
                }
            }
        }
    }

    json!({
        "trace_id": trace_id,
        "duration": trace.get("Duration").cloned().unwrap_or(Value::Null),
        "is_partial": trace.get("IsPartial").cloned().unwrap_or(json!(false)),
        "resource_count": resources.len(),
        "resources": resources,
    })
    .to_string()
}

/// Segment documents arrive either embedded as objects or as JSON strings.
pub fn decode_segment_document(segment: &Value) -> Option<Value> {
    match segment.get("Document") {
        Some(Value::String(raw)) => serde_json::from_str(raw).ok(),
        Some(doc @ Value::Object(_)) => Some(doc.clone()),
        _ => {
            // Tool-format traces carry the segment fields inline.
            if segment.get("name").is_some() {
                Some(segment.clone())
            } else {
                None
            }
        }
    }
}

fn resource_from_segment(document: &Value, discovered: &mut Vec<String>) -> Option<Value> {
    let name = document.get("name").and_then(Value::as_str).unwrap_or("");
    let origin = document.get("origin").and_then(Value::as_str).unwrap_or("");
    let resource_arn = document.get("resource_arn").and_then(Value::as_str);
    let arn_parts = resource_arn.and_then(parse_arn);
    let arn_service = arn_parts.as_ref().map(|p| p.service.as_str()).unwrap_or("");

    // Compute function
    if origin.contains("AWS::Lambda") || name.to_lowercase().contains("lambda") || arn_service == "lambda" {
        let mut function_name = name.to_string();
        if let Some(arn) = resource_arn {
            if let Some(tail) = arn.split("function:").nth(1) {
                function_name = tail.to_string();
            }
        }
        if function_name.is_empty() || discovered.contains(&function_name) {
            return None;
        }
        discovered.push(function_name.clone());
        return Some(json!({
            "type": "lambda",
            "name": function_name,
            "arn": resource_arn,
        }));
    }

    // Workflow engine
    if origin.contains("AWS::STEPFUNCTIONS") || name == "STEPFUNCTIONS" || arn_service == "states" {
        let execution_arn = document
            .get("aws")
            .and_then(|aws| aws.get("execution_arn"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .or_else(|| resource_arn.map(|s| s.to_string()));
        let key = execution_arn.clone().unwrap_or_else(|| "STEPFUNCTIONS".to_string());
        if discovered.contains(&key) {
            return None;
        }
        discovered.push(key.clone());
        return Some(json!({
            "type": "stepfunctions",
            "name": "STEPFUNCTIONS",
            "arn": resource_arn,
            "metadata": {"execution_arn": execution_arn},
        }));
    }

    // API gateway stages show up as "api-id/stage" segment names.
    if origin.contains("AWS::ApiGateway") || (name.contains('/') && !name.contains("arn:")) {
        let mut api_id = None;
        let mut stage = "unknown".to_string();
        if let Some(arn) = resource_arn {
            if arn.contains("/restapis/") {
                let parts: Vec<&str> = arn.split('/').collect();
                if parts.len() >= 3 {
                    api_id = Some(parts[2].to_string());
                }
                if parts.len() >= 5 {
                    stage = parts[4].to_string();
                }
            }
        }
        if api_id.is_none() {
            let mut parts = name.split('/');
            api_id = parts.next().map(|s| s.to_string()).filter(|s| !s.is_empty());
            if let Some(s) = parts.next() {
                stage = s.to_string();
            }
        }
        let api_id = api_id?;
        let key = format!("{api_id}:{stage}");
        if discovered.contains(&key) {
            return None;
        }
        discovered.push(key);
        return Some(json!({
            "type": "apigateway",
            "name": api_id,
            "arn": resource_arn,
            "metadata": {"stage": stage},
        }));
    }

    // Data stores and queues referenced by downstream subsegments.
    let mapped = match arn_service {
        "dynamodb" => Some("dynamodb"),
        "sqs" => Some("sqs"),
        "sns" => Some("sns"),
        "s3" => Some("s3"),
        "events" => Some("eventbridge"),
        _ => None,
    }?;
    let resource_name = arn_parts
        .as_ref()
        .map(|p| p.resource.rsplit([':', '/']).next().unwrap_or("").to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| name.to_string());
    if resource_name.is_empty() {
        return None;
    }
    let key = format!("{mapped}:{resource_name}");
    if discovered.contains(&key) {
        return None;
    }
    discovered.push(key);
    Some(json!({
        "type": mapped,
        "name": resource_name,
        "arn": resource_arn,
    }))
}

/// Get the X-Ray service graph for a recent window.
pub async fn get_xray_service_graph(ctx: &ToolContext, hours_back: i64) -> String {
    let (start, end) = metric_window(hours_back);
    match ctx
        .call(
            "xray",
            "get-service-graph",
            json!({
                "StartTime": start.to_rfc3339(),
                "EndTime": end.to_rfc3339(),
            }),
        )
        .await
    {
        Ok(response) => json!({
            "time_range": {"start": start.to_rfc3339(), "end": end.to_rfc3339()},
            "services": response.get("Services").cloned().unwrap_or(json!([])),
        })
        .to_string(),
        Err(e) => error_envelope(e, &[("hours_back", &hours_back.to_string())]),
    }
}

/// Get trace summaries matching an optional filter expression.
pub async fn get_xray_trace_summaries(
    ctx: &ToolContext,
    hours_back: i64,
    filter_expression: Option<&str>,
) -> String {
    let (start, end) = metric_window(hours_back);
    let mut params = json!({
        "StartTime": start.to_rfc3339(),
        "EndTime": end.to_rfc3339(),
    });
    if let Some(filter) = filter_expression {
        params["FilterExpression"] = Value::String(filter.to_string());
    }
    match ctx.call("xray", "get-trace-summaries", params).await {
        Ok(response) => {
            let summaries = response
                .get("TraceSummaries")
                .cloned()
                .unwrap_or(json!([]));
            json!({
                "time_range": {"start": start.to_rfc3339(), "end": end.to_rfc3339()},
                "filter_expression": filter_expression,
                "trace_count": summaries.as_array().map(|a| a.len()).unwrap_or(0),
                "trace_summaries": summaries,
            })
            .to_string()
        }
        Err(e) => error_envelope(e, &[("hours_back", &hours_back.to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stringified_segment_documents() {
        let segment = json!({"Id": "1", "Document": "{\"name\": \"payment-api/prod\"}"});
        let document = decode_segment_document(&segment).unwrap();
        assert_eq!(document["name"], "payment-api/prod");
    }

    #[test]
    fn extracts_lambda_from_function_arn() {
        let mut discovered = Vec::new();
        let document = json!({
            "name": "payment-processor",
            "origin": "AWS::Lambda::Function",
            "resource_arn": "arn:aws:lambda:eu-west-1:123:function:payment-processor"
        });
        let resource = resource_from_segment(&document, &mut discovered).unwrap();
        assert_eq!(resource["type"], "lambda");
        assert_eq!(resource["name"], "payment-processor");
        // Second sighting is deduplicated.
        assert!(resource_from_segment(&document, &mut discovered).is_none());
    }

    #[test]
    fn extracts_api_gateway_from_segment_name() {
        let mut discovered = Vec::new();
        let document = json!({"name": "a1b2c3d4e5/prod", "origin": "AWS::ApiGateway::Stage"});
        let resource = resource_from_segment(&document, &mut discovered).unwrap();
        assert_eq!(resource["type"], "apigateway");
        assert_eq!(resource["name"], "a1b2c3d4e5");
        assert_eq!(resource["metadata"]["stage"], "prod");
    }

    #[test]
    fn maps_downstream_queue_subsegment() {
        let mut discovered = Vec::new();
        let document = json!({
            "name": "SQS",
            "resource_arn": "arn:aws:sqs:eu-west-1:123:orders-queue"
        });
        let resource = resource_from_segment(&document, &mut discovered).unwrap();
        assert_eq!(resource["type"], "sqs");
        assert_eq!(resource["name"], "orders-queue");
    }
}
