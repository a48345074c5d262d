use crate::models::Fact;
use crate::tools::xray::{self, decode_segment_document};
use crate::tools::ToolContext;
use serde_json::{json, Value};
use tracing::debug;

/// Deep analysis of one distributed trace.
///
/// Extracts duration, per-segment HTTP failures, exception causes,
/// service-to-service calls and summary fault/error lists. Tolerates both
/// the batch (`Traces`/`Segments`) and single-trace (`trace_id`/`segments`)
/// document shapes.
pub async fn analyze_trace_deep(ctx: &ToolContext, trace_id: &str) -> Vec<Fact> {
    let mut facts = Vec::new();

    let raw = xray::get_xray_trace(ctx, trace_id).await;
    let trace_data: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            facts.push(fact_for_trace_failure(trace_id, &format!("unparseable trace: {e}")));
            return facts;
        }
    };

    if let Some(error) = trace_data.get("error").and_then(Value::as_str) {
        facts.push(fact_for_trace_failure(trace_id, error));
        return facts;
    }

    let Some((duration, segments)) = normalize_trace(&trace_data) else {
        debug!("no usable segment list in trace {trace_id}");
        return facts;
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("trace_id".to_string(), json!(trace_id));
    metadata.insert("duration".to_string(), json!(duration));
    metadata.insert("segment_count".to_string(), json!(segments.len()));
    facts.push(
        Fact::new(
            "xray_trace",
            format!("Trace {trace_id} duration: {duration:.3}s"),
            0.9,
        )
        .with_metadata(metadata),
    );

    let mut fault_segments: Vec<String> = Vec::new();
    let mut error_segments: Vec<String> = Vec::new();

    for segment in &segments {
        let Some(document) = decode_segment_document(segment) else {
            continue;
        };
        let segment_name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        if document.get("fault").and_then(Value::as_bool).unwrap_or(false) {
            fault_segments.push(segment_name.clone());
        }
        if document.get("error").and_then(Value::as_bool).unwrap_or(false) {
            error_segments.push(segment_name.clone());
        }

        if let Some(status) = http_status(&document) {
            if status >= 400 {
                facts.push(Fact::new(
                    "xray_trace",
                    format!("Service {segment_name} returned HTTP {status}"),
                    0.95,
                ));
            }
        }

        if let Some(message) = cause_message(&document) {
            facts.push(Fact::new(
                "xray_trace",
                format!("Service {segment_name} error: {message}"),
                0.95,
            ));
        }

        for subsegment in document
            .get("subsegments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
        {
            analyze_subsegment(&segment_name, &subsegment, &mut facts);
        }
    }

    if !fault_segments.is_empty() {
        facts.push(Fact::new(
            "xray_trace",
            format!("Faulted services in trace: {}", fault_segments.join(", ")),
            0.95,
        ));
    }
    if !error_segments.is_empty() {
        facts.push(Fact::new(
            "xray_trace",
            format!(
                "Services with errors in trace: {}",
                error_segments.join(", ")
            ),
            0.95,
        ));
    }

    facts
}

fn fact_for_trace_failure(trace_id: &str, error: &str) -> Fact {
    let mut metadata = serde_json::Map::new();
    metadata.insert("trace_id".to_string(), json!(trace_id));
    metadata.insert("error".to_string(), json!(true));
    Fact::new(
        "xray_trace",
        format!("Failed to retrieve trace {trace_id}: {error}"),
        0.8,
    )
    .with_metadata(metadata)
}

/// Accept both trace document shapes and return (duration, segment list).
fn normalize_trace(trace_data: &Value) -> Option<(f64, Vec<Value>)> {
    if let Some(traces) = trace_data.get("Traces").and_then(Value::as_array) {
        let trace = traces.first()?;
        return Some((
            trace.get("Duration").and_then(Value::as_f64).unwrap_or(0.0),
            trace
                .get("Segments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        ));
    }
    if trace_data.get("trace_id").is_some() {
        return Some((
            trace_data.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
            trace_data
                .get("segments")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        ));
    }
    None
}

fn analyze_subsegment(parent_name: &str, subsegment: &Value, facts: &mut Vec<Fact>) {
    let sub_name = subsegment
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    // A downstream call carries an operation name or a request URL.
    let action = subsegment
        .get("aws")
        .and_then(|aws| aws.get("operation"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| {
            subsegment
                .get("http")
                .and_then(|h| h.get("request"))
                .and_then(|r| r.get("url"))
                .and_then(Value::as_str)
                .and_then(|url| url.rsplit('/').next().map(|s| s.to_string()))
        });

    let status = http_status(subsegment);

    if let Some(action) = &action {
        match status {
            Some(status) if status >= 400 => {
                facts.push(Fact::new(
                    "xray_trace",
                    format!(
                        "Service {parent_name} called {sub_name} ({action}) and received HTTP {status}"
                    ),
                    0.95,
                ));
            }
            Some(status) => {
                facts.push(Fact::new(
                    "xray_trace",
                    format!(
                        "Service {parent_name} called {sub_name} ({action}), HTTP {status}"
                    ),
                    0.9,
                ));
            }
            None => {}
        }
    }

    let failed = subsegment.get("fault").and_then(Value::as_bool).unwrap_or(false)
        || subsegment.get("error").and_then(Value::as_bool).unwrap_or(false);
    if failed {
        if let Some(message) = cause_message(subsegment) {
            facts.push(Fact::new(
                "xray_trace",
                format!("Subsegment {sub_name} error: {message}"),
                0.95,
            ));
        }
    }

    // Nested downstream hops.
    for nested in subsegment
        .get("subsegments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
    {
        analyze_subsegment(&sub_name, &nested, facts);
    }
}

fn http_status(document: &Value) -> Option<i64> {
    document
        .get("http")
        .and_then(|h| h.get("response"))
        .and_then(|r| r.get("status"))
        .and_then(Value::as_i64)
}

fn cause_message(document: &Value) -> Option<String> {
    let cause = document.get("cause")?;
    if let Some(message) = cause.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    // The cause may be a list of exceptions instead of a flat message.
    cause
        .get("exceptions")
        .and_then(Value::as_array)
        .and_then(|exceptions| exceptions.first())
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}
