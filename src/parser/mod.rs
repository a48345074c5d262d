use crate::llm::{self, Llm};
use crate::models::{ParsedInputs, Resource, TimeRange};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Trace id shape, with the optional `Root=` prefix used in log lines.
const TRACE_ID_PATTERN: &str = r"(?:Root=)?(1-[0-9a-f]{8}-[0-9a-f]{24})";

/// Lines with any of these markers are kept as error messages.
const ERROR_MARKERS: [&str; 5] = ["Error", "Exception", "AccessDenied", "timed out", "denied"];

/// Parses free text and structured payloads into typed investigation inputs.
///
/// Parsing is deterministic-first; the LLM is only consulted when the
/// deterministic pass finds nothing to investigate, and then with a low
/// temperature and a tight token cap.
pub struct InputParser {
    llm: Option<Arc<dyn Llm>>,
    trace_re: Regex,
    http_error_re: Regex,
}

impl InputParser {
    pub fn new(llm: Option<Arc<dyn Llm>>) -> Self {
        Self {
            llm,
            trace_re: Regex::new(TRACE_ID_PATTERN).expect("static regex"),
            http_error_re: Regex::new(r"HTTP[ /]?[45]\d\d").expect("static regex"),
        }
    }

    /// Parse any accepted input shape into [`ParsedInputs`].
    pub async fn parse(&self, inputs: &Value, region: &str) -> ParsedInputs {
        match inputs {
            Value::String(text) => self.parse_free_text(text, region).await,
            Value::Object(object) => {
                if let Some(structured) = object.get("investigation_inputs") {
                    return self.parse_structured(structured, region);
                }
                if object.contains_key("function_name")
                    || object.contains_key("xray_trace_id")
                    || object.contains_key("investigation_target")
                {
                    return self.parse_legacy(object, region);
                }
                if let Some(text) = object.get("free_text_input").and_then(Value::as_str) {
                    let mut parsed = self.parse_free_text(text, region).await;
                    // An explicit trace id may ride along with free text.
                    if let Some(trace_id) = object.get("xray_trace_id").and_then(Value::as_str) {
                        if !trace_id.is_empty() && !parsed.trace_ids.contains(&trace_id.to_string())
                        {
                            parsed.trace_ids.push(trace_id.to_string());
                        }
                    }
                    return parsed;
                }
                self.parse_structured(inputs, region)
            }
            _ => ParsedInputs::default(),
        }
    }

    fn parse_structured(&self, inputs: &Value, region: &str) -> ParsedInputs {
        let mut parsed = ParsedInputs::default();

        if let Some(targets) = inputs.get("primary_targets").and_then(Value::as_array) {
            for target in targets {
                let kind = target
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let name = target.get("name").and_then(Value::as_str).unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                let target_region = target
                    .get("region")
                    .and_then(Value::as_str)
                    .unwrap_or(region);
                let mut resource = Resource::new(kind, name, target_region);
                resource.arn = target
                    .get("arn")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string());
                if let Some(metadata) = target.get("metadata").and_then(Value::as_object) {
                    resource.metadata = metadata.clone();
                }
                resource
                    .metadata
                    .insert("source".to_string(), Value::String("explicit_target".to_string()));
                parsed.primary_targets.push(resource);
            }
        }

        if let Some(trace_ids) = inputs.get("trace_ids").and_then(Value::as_array) {
            parsed.trace_ids = trace_ids
                .iter()
                .filter_map(|id| id.as_str().map(|s| s.to_string()))
                .filter(|id| !id.is_empty())
                .collect();
        }

        if let Some(errors) = inputs.get("error_messages").and_then(Value::as_array) {
            parsed.error_messages = errors
                .iter()
                .filter_map(|e| e.as_str().map(|s| s.to_string()))
                .collect();
        }

        if let Some(context) = inputs.get("business_context").and_then(Value::as_object) {
            parsed.business_context = context.clone();
        }

        if let Some(range) = inputs.get("time_range").and_then(Value::as_object) {
            parsed.time_range = Some(TimeRange {
                start: range.get("start").and_then(Value::as_str).map(|s| s.to_string()),
                end: range.get("end").and_then(Value::as_str).map(|s| s.to_string()),
            });
        }

        parsed
    }

    fn parse_legacy(&self, object: &Map<String, Value>, region: &str) -> ParsedInputs {
        debug!("converting legacy input keys to structured form");
        let mut parsed = ParsedInputs::default();

        if let Some(trace_id) = object.get("xray_trace_id").and_then(Value::as_str) {
            if !trace_id.is_empty() {
                parsed.trace_ids.push(trace_id.to_string());
            }
        }

        if let Some(function_name) = object.get("function_name").and_then(Value::as_str) {
            let mut resource = Resource::new("lambda", function_name, region);
            resource
                .metadata
                .insert("source".to_string(), Value::String("explicit_target".to_string()));
            parsed.primary_targets.push(resource);
        }

        if let Some(target) = object.get("investigation_target").and_then(Value::as_object) {
            let kind = target.get("type").and_then(Value::as_str).unwrap_or("unknown");
            let name = target.get("name").and_then(Value::as_str).unwrap_or("");
            if !name.is_empty() {
                let target_region = target.get("region").and_then(Value::as_str).unwrap_or(region);
                let mut resource = Resource::new(kind, name, target_region);
                if let Some(metadata) = target.get("metadata").and_then(Value::as_object) {
                    resource.metadata = metadata.clone();
                }
                resource
                    .metadata
                    .insert("source".to_string(), Value::String("explicit_target".to_string()));
                parsed.primary_targets.push(resource);
            }
        }

        parsed
    }

    async fn parse_free_text(&self, text: &str, region: &str) -> ParsedInputs {
        let mut parsed = ParsedInputs::default();

        for capture in self.trace_re.captures_iter(text) {
            let trace_id = capture[1].to_string();
            if !parsed.trace_ids.contains(&trace_id) {
                parsed.trace_ids.push(trace_id);
            }
        }

        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_ascii_graphic() || c == '"' || c == ',');
            if let Some(resource) = resource_from_arn(token, region) {
                if !parsed
                    .primary_targets
                    .iter()
                    .any(|r| r.dedup_key() == resource.dedup_key())
                {
                    parsed.primary_targets.push(resource);
                }
            }
        }

        for line in text.lines() {
            let is_error = ERROR_MARKERS.iter().any(|marker| line.contains(marker))
                || self.http_error_re.is_match(line);
            if is_error {
                parsed.error_messages.push(line.trim().to_string());
            }
        }

        if parsed.primary_targets.is_empty() && parsed.trace_ids.is_empty() {
            if let Some(llm) = &self.llm {
                self.classify_with_llm(llm.as_ref(), text, region, &mut parsed)
                    .await;
            }
        }

        parsed
    }

    /// Ask the model to classify remaining targets from ambiguous prose.
    async fn classify_with_llm(
        &self,
        llm: &dyn Llm,
        text: &str,
        region: &str,
        parsed: &mut ParsedInputs,
    ) {
        let prompt = format!(
            "Extract AWS resources to investigate from this incident description. \
             Known types: lambda, apigateway, stepfunctions, dynamodb, s3, sqs, sns, \
             eventbridge, vpc, iam. Use \"unknown\" when unsure.\n\n\
             DESCRIPTION:\n{text}\n\n\
             Respond with ONLY a JSON object: {{\"targets\": [{{\"type\": \"...\", \"name\": \"...\"}}]}}"
        );

        let response = match llm.complete(&prompt, 0.1, 256).await {
            Ok(response) => response,
            Err(e) => {
                warn!("parser LLM classification failed: {e}");
                return;
            }
        };

        let Some(raw) = llm::extract_json_object(&response) else {
            warn!("parser LLM returned no JSON, keeping deterministic result");
            return;
        };
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            return;
        };

        if let Some(targets) = value.get("targets").and_then(Value::as_array) {
            for target in targets {
                let name = target.get("name").and_then(Value::as_str).unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                let kind = target
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let mut resource = Resource::new(kind, name, region);
                resource
                    .metadata
                    .insert("source".to_string(), Value::String("parser".to_string()));
                parsed.primary_targets.push(resource);
            }
        }
    }
}

/// Build a resource from an ARN token, mapping the ARN service to a resource
/// type. Unknown services are carried through as `unknown`.
fn resource_from_arn(token: &str, fallback_region: &str) -> Option<Resource> {
    let parts = crate::tools::parse_arn(token)?;
    let kind = match parts.service.as_str() {
        "lambda" => "lambda",
        "states" => "stepfunctions",
        "apigateway" | "execute-api" => "apigateway",
        "dynamodb" => "dynamodb",
        "s3" => "s3",
        "sqs" => "sqs",
        "sns" => "sns",
        "events" => "eventbridge",
        "ec2" => "vpc",
        "iam" => "iam",
        _ => "unknown",
    };
    let name = parts
        .resource
        .rsplit([':', '/'])
        .next()
        .unwrap_or("")
        .to_string();
    if name.is_empty() {
        return None;
    }
    let region = if parts.region.is_empty() {
        fallback_region.to_string()
    } else {
        parts.region.clone()
    };
    let mut resource = Resource::new(kind, &name, &region);
    resource.arn = Some(token.to_string());
    resource
        .metadata
        .insert("source".to_string(), Value::String("parser".to_string()));
    Some(resource)
}
