pub mod apigateway;
pub mod dynamodb;
pub mod eventbridge;
pub mod iam;
pub mod lambda;
pub mod s3;
pub mod sns;
pub mod sqs;
pub mod stepfunctions;
pub mod trace;
pub mod vpc;

use crate::models::{Fact, Resource};
use crate::tools::ToolContext;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on facts a single resource may contribute.
pub const MAX_FACTS_PER_RESOURCE: usize = 10;

/// Context handed to specialists for one analysis pass.
#[derive(Clone)]
pub struct SpecialistContext {
    pub tools: ToolContext,
    pub trace_ids: Vec<String>,
}

impl SpecialistContext {
    pub fn region(&self) -> &str {
        self.tools.region()
    }
}

/// A per-resource-type analysis routine.
///
/// Specialists call a small fixed set of tools (each at most once per
/// resource), map observations to facts with stable source names, and never
/// touch the LLM.
#[async_trait]
pub trait Specialist: Send + Sync {
    async fn analyze(&self, resource: &Resource, ctx: &SpecialistContext) -> Vec<Fact>;

    /// Resource types this specialist handles.
    fn resource_types(&self) -> &'static [&'static str];

    fn name(&self) -> &'static str;
}

/// Resource-type → specialist dispatch table.
pub struct SpecialistRegistry {
    specialists: HashMap<&'static str, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            specialists: HashMap::new(),
        };
        registry.register(Arc::new(lambda::LambdaSpecialist));
        registry.register(Arc::new(apigateway::ApiGatewaySpecialist));
        registry.register(Arc::new(stepfunctions::StepFunctionsSpecialist));
        registry.register(Arc::new(dynamodb::DynamoDbSpecialist));
        registry.register(Arc::new(s3::S3Specialist));
        registry.register(Arc::new(sqs::SqsSpecialist));
        registry.register(Arc::new(sns::SnsSpecialist));
        registry.register(Arc::new(eventbridge::EventBridgeSpecialist));
        registry.register(Arc::new(vpc::VpcSpecialist));
        registry.register(Arc::new(iam::IamSpecialist));
        registry
    }

    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        for &resource_type in specialist.resource_types() {
            self.specialists.insert(resource_type, specialist.clone());
        }
    }

    pub fn for_resource_type(&self, resource_type: &str) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(resource_type).cloned()
    }

    pub fn supported_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.specialists.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a tool document; an `error` key or unparseable output yields `Err`
/// with the message to report.
pub(crate) fn parse_tool_document(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(document) => match document.get("error").and_then(Value::as_str) {
            Some(error) => Err(error.to_string()),
            None => Ok(document),
        },
        Err(_) => Err("unparseable tool output".to_string()),
    }
}

/// Tracks the single explanatory error fact a specialist may emit.
pub(crate) struct ErrorFactGuard {
    reported: bool,
}

impl ErrorFactGuard {
    pub fn new() -> Self {
        Self { reported: false }
    }

    /// Emit at most one tool-error fact per resource; later failures are
    /// only logged.
    pub fn report(&mut self, facts: &mut Vec<Fact>, source: &str, detail: String) {
        if self.reported {
            tracing::debug!("suppressing repeated tool error from {source}: {detail}");
            return;
        }
        self.reported = true;
        facts.push(Fact::new(source, detail, 0.7));
    }
}

/// Sum the `Sum` statistics of a CloudWatch datapoint array.
pub(crate) fn sum_datapoints(datapoints: Option<&Value>) -> f64 {
    datapoints
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .filter_map(|p| p.get("Sum").and_then(Value::as_f64))
                .sum()
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_by_type() {
        let registry = SpecialistRegistry::new();
        assert!(registry.for_resource_type("lambda").is_some());
        assert!(registry.for_resource_type("apigateway").is_some());
        assert!(registry.for_resource_type("unknown").is_none());
        assert!(registry.supported_types().len() >= 10);
    }

    #[test]
    fn error_guard_reports_once() {
        let mut guard = ErrorFactGuard::new();
        let mut facts = Vec::new();
        guard.report(&mut facts, "lambda_config", "AccessDenied".to_string());
        guard.report(&mut facts, "lambda_metrics", "AccessDenied".to_string());
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].confidence, 0.7);
    }

    #[test]
    fn tool_documents_with_error_keys_are_rejected() {
        assert!(parse_tool_document("{\"error\": \"nope\"}").is_err());
        assert!(parse_tool_document("not json").is_err());
        assert!(parse_tool_document("{\"ok\": 1}").is_ok());
    }
}
