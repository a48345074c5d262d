use crate::models::{ParsedInputs, Resource};
use crate::tools::{self, ToolContext};
use serde_json::Value;
use tracing::{info, warn};

/// Discover the resources to investigate: explicit targets first, then
/// everything reachable from the supplied traces, deduplicated in first-seen
/// order.
pub async fn discover_resources(ctx: &ToolContext, parsed: &ParsedInputs) -> Vec<Resource> {
    let mut resources: Vec<Resource> = Vec::new();

    for target in &parsed.primary_targets {
        resources.push(target.clone());
    }

    for trace_id in &parsed.trace_ids {
        info!("extracting resources from trace {trace_id}");
        let raw = tools::xray::get_all_resources_from_trace(ctx, trace_id).await;
        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!("unparseable trace resource listing for {trace_id}: {e}");
                continue;
            }
        };
        if let Some(error) = document.get("error").and_then(Value::as_str) {
            warn!("failed to extract resources from trace {trace_id}: {error}");
            continue;
        }
        let Some(found) = document.get("resources").and_then(Value::as_array) else {
            continue;
        };
        for entry in found {
            let kind = entry.get("type").and_then(Value::as_str).unwrap_or("unknown");
            let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            let mut resource = Resource::new(kind, name, ctx.region());
            resource.arn = entry
                .get("arn")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            if let Some(metadata) = entry.get("metadata").and_then(Value::as_object) {
                resource.metadata = metadata.clone();
            }
            resource
                .metadata
                .insert("source".to_string(), Value::String("trace".to_string()));
            resources.push(resource);
        }
    }

    let mut deduplicated: Vec<Resource> = Vec::new();
    for resource in resources {
        if !deduplicated
            .iter()
            .any(|existing| existing.dedup_key() == resource.dedup_key())
        {
            deduplicated.push(resource);
        }
    }

    for resource in &mut deduplicated {
        if resource.kind == "apigateway" && !tools::apigateway::looks_like_api_id(&resource.name) {
            resolve_api_name(ctx, resource).await;
        }
    }

    deduplicated
}

/// Replace a human API name with its id; on failure keep the original and
/// mark it so downstream consumers know resolution was attempted.
async fn resolve_api_name(ctx: &ToolContext, resource: &mut Resource) {
    let raw = tools::apigateway::resolve_api_gateway_id(ctx, &resource.name).await;
    let document: Value = serde_json::from_str(&raw).unwrap_or_default();
    match document.get("api_id").and_then(Value::as_str) {
        Some(api_id) => {
            resource
                .metadata
                .insert("api_name".to_string(), Value::String(resource.name.clone()));
            resource.name = api_id.to_string();
        }
        None => {
            warn!("could not resolve API id for {}", resource.name);
            resource
                .metadata
                .insert("resolution_failed".to_string(), Value::Bool(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{tool_context, MockBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn trace_response() -> Value {
        json!({
            "Traces": [{
                "Id": "1-68e904af-484b173354fff9607ee41871",
                "Duration": 1.2,
                "Segments": [
                    {"Id": "a", "Document": "{\"name\": \"payment-processor\", \"origin\": \"AWS::Lambda::Function\", \"resource_arn\": \"arn:aws:lambda:eu-west-1:123:function:payment-processor\"}"},
                    {"Id": "b", "Document": "{\"name\": \"a1b2c3d4e5/prod\", \"origin\": \"AWS::ApiGateway::Stage\"}"}
                ]
            }]
        })
    }

    #[tokio::test]
    async fn merges_targets_and_trace_resources() {
        let backend = Arc::new(
            MockBackend::new().with_response("xray", "batch-get-traces", trace_response()),
        );
        let ctx = tool_context(backend).await;
        let parsed = ParsedInputs {
            primary_targets: vec![Resource::new("lambda", "payment-processor", "eu-west-1")],
            trace_ids: vec!["1-68e904af-484b173354fff9607ee41871".to_string()],
            ..Default::default()
        };

        let resources = discover_resources(&ctx, &parsed).await;
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"payment-processor"));
        assert!(names.contains(&"a1b2c3d4e5"));
    }

    #[tokio::test]
    async fn preserves_first_seen_order_and_dedupes() {
        let backend = Arc::new(
            MockBackend::new().with_response("xray", "batch-get-traces", trace_response()),
        );
        let ctx = tool_context(backend).await;
        let mut target = Resource::new("lambda", "payment-processor", "eu-west-1");
        target.arn = Some("arn:aws:lambda:eu-west-1:123:function:payment-processor".to_string());
        let parsed = ParsedInputs {
            primary_targets: vec![target],
            trace_ids: vec!["1-68e904af-484b173354fff9607ee41871".to_string()],
            ..Default::default()
        };

        let resources = discover_resources(&ctx, &parsed).await;
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "payment-processor");
        assert_eq!(resources[0].metadata["source"], "explicit_target");
    }

    #[tokio::test]
    async fn resolves_api_names_to_ids() {
        let backend = Arc::new(MockBackend::new().with_response(
            "apigateway",
            "get-rest-apis",
            json!({"items": [{"id": "a1b2c3d4e5", "name": "payments-api"}]}),
        ));
        let ctx = tool_context(backend.clone()).await;
        let parsed = ParsedInputs {
            primary_targets: vec![Resource::new("apigateway", "payments-api", "eu-west-1")],
            ..Default::default()
        };

        let resources = discover_resources(&ctx, &parsed).await;
        assert_eq!(resources[0].name, "a1b2c3d4e5");
        assert_eq!(resources[0].metadata["api_name"], "payments-api");
        assert_eq!(backend.calls_to("apigateway", "get-rest-apis"), 1);
    }

    #[tokio::test]
    async fn failed_resolution_keeps_original_name() {
        let backend = Arc::new(MockBackend::new().with_failure(
            "apigateway",
            "get-rest-apis",
            "AccessDenied",
        ));
        let ctx = tool_context(backend).await;
        let parsed = ParsedInputs {
            primary_targets: vec![Resource::new("apigateway", "payments-api", "eu-west-1")],
            ..Default::default()
        };

        let resources = discover_resources(&ctx, &parsed).await;
        assert_eq!(resources[0].name, "payments-api");
        assert_eq!(resources[0].metadata["resolution_failed"], true);
    }
}
