use crate::aws::{AwsCliBackend, CloudClient, ServiceBackend};
use crate::collector::EvidenceCollector;
use crate::config;
use crate::discovery;
use crate::llm::{Llm, LlmConfig, OpenAiLlm, Phase};
use crate::models::{InvestigationReport, ParsedInputs};
use crate::parser::InputParser;
use crate::phases::{advice, HypothesisPhase, RootCausePhase, SeverityPhase};
use crate::report;
use crate::telemetry::InvestigationSpan;
use crate::tools::ToolContext;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One investigation request, extracted from the wire payload.
#[derive(Debug, Clone)]
pub struct InvestigationRequest {
    /// Free text or structured investigation inputs.
    pub input: Value,
    pub xray_trace_id: Option<String>,
    pub region: Option<String>,
    pub role_arn: Option<String>,
    pub external_id: Option<String>,
}

impl InvestigationRequest {
    /// Validate and extract the wire payload. Errors here are input errors;
    /// the pipeline never starts.
    pub fn from_payload(payload: &Value) -> Result<Self, String> {
        let investigation = payload
            .get("investigation")
            .ok_or("Missing required 'investigation' key in payload")?;
        let input = investigation
            .get("input")
            .cloned()
            .unwrap_or(Value::Null);
        let is_empty = match &input {
            Value::String(s) => s.trim().is_empty(),
            Value::Null => true,
            _ => false,
        };
        if is_empty {
            return Err("Missing required 'investigation.input' field".to_string());
        }

        let service_config = payload.get("service_config").cloned().unwrap_or(Value::Null);
        let string_at = |value: &Value, key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        Ok(Self {
            input,
            xray_trace_id: string_at(investigation, "xray_trace_id"),
            region: string_at(investigation, "region").or_else(|| string_at(&service_config, "region")),
            role_arn: string_at(&service_config, "role_arn"),
            external_id: string_at(&service_config, "external_id"),
        })
    }
}

/// The investigation pipeline: parse → discover → collect → hypothesize →
/// root-cause → severity → assemble.
///
/// Orchestration is plain code; the model is consulted only inside the three
/// reasoning phases (and optionally by the input parser).
pub struct Investigator {
    backend: Arc<dyn ServiceBackend>,
    llm: Option<Arc<dyn Llm>>,
    llm_config: LlmConfig,
    region: String,
}

impl Investigator {
    pub fn new(
        backend: Arc<dyn ServiceBackend>,
        llm: Option<Arc<dyn Llm>>,
        llm_config: LlmConfig,
        region: String,
    ) -> Self {
        Self {
            backend,
            llm,
            llm_config,
            region,
        }
    }

    /// Wire up the production investigator from the environment. A missing
    /// LLM configuration is not fatal; the reasoning phases fall back to
    /// their deterministic paths.
    pub fn from_env() -> Self {
        let llm_config = LlmConfig::from_env();
        let llm: Option<Arc<dyn Llm>> = match &llm_config {
            Ok(config) => match OpenAiLlm::new(config.clone()) {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    warn!("LLM service unavailable ({e}), deterministic fallbacks only");
                    None
                }
            },
            Err(e) => {
                warn!("LLM not configured ({e}), deterministic fallbacks only");
                None
            }
        };
        Self {
            backend: Arc::new(AwsCliBackend::new()),
            llm,
            llm_config: llm_config.unwrap_or_default(),
            region: config::get_region(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run one investigation to completion. Always returns a report; fatal
    /// conditions are encoded in `status`.
    pub async fn investigate(&self, request: InvestigationRequest) -> InvestigationReport {
        let started_at = Utc::now();
        let region = request.region.clone().unwrap_or_else(|| self.region.clone());
        let run_id = report::generate_run_id(started_at, &request.input);

        let mut span = InvestigationSpan::start(
            &run_id,
            &region,
            "code_orchestration",
            request.role_arn.as_deref(),
            request.external_id.as_deref(),
        );
        span.record_input(&request.input);

        info!("investigation {run_id} started in {region}");

        let deadline = config::investigation_deadline();
        let outcome = tokio::time::timeout(
            deadline,
            self.run_pipeline(&request, &run_id, started_at, &region),
        )
        .await;

        let report = match outcome {
            Ok(report) => report,
            Err(_) => {
                error!("investigation {run_id} exceeded its {}s deadline", deadline.as_secs());
                let error = format!("investigation deadline of {}s exceeded", deadline.as_secs());
                report::error_report(
                    run_id.clone(),
                    started_at,
                    &error,
                    advice::failure_advice(&error),
                )
            }
        };

        let status = serde_json::to_value(report.status)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();
        span.record_output(&report.to_response(), &status);
        if matches!(report.status, crate::models::InvestigationStatus::Failed) {
            span.record_error("investigation_failed", &report.summary);
        }
        span.end();

        info!(
            "investigation {run_id} finished: {status} in {:.2}s",
            report.duration_seconds
        );
        report
    }

    async fn run_pipeline(
        &self,
        request: &InvestigationRequest,
        run_id: &str,
        started_at: chrono::DateTime<Utc>,
        region: &str,
    ) -> InvestigationReport {
        // Credential acquisition failure is fatal for the investigation.
        let client = match CloudClient::connect(
            self.backend.clone(),
            region,
            request.role_arn.as_deref(),
            request.external_id.as_deref(),
        )
        .await
        {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("credential acquisition failed: {e}");
                let message = e.to_string();
                return report::error_report(
                    run_id.to_string(),
                    started_at,
                    &message,
                    advice::failure_advice(&message),
                );
            }
        };
        let tools = ToolContext::new(client);

        let parsed = self.parse_inputs(request, region).await;
        info!(
            "parsed {} targets, {} trace ids, {} error messages",
            parsed.primary_targets.len(),
            parsed.trace_ids.len(),
            parsed.error_messages.len()
        );

        let resources = discovery::discover_resources(&tools, &parsed).await;
        info!("discovered {} resources", resources.len());

        if resources.is_empty() && parsed.trace_ids.is_empty() {
            warn!("nothing to investigate, short-circuiting");
            return report::insufficient_data_report(
                run_id.to_string(),
                started_at,
                "No resources or trace IDs identified",
                region,
            );
        }

        let facts = EvidenceCollector::new()
            .collect(&tools, &resources, &parsed)
            .await;
        info!("collected {} facts", facts.len());

        let hypothesis_phase = HypothesisPhase::new(
            self.llm.clone(),
            self.llm_config.for_phase(Phase::Hypothesis),
        );
        let hypotheses = hypothesis_phase.generate(&facts).await;
        info!("generated {} hypotheses", hypotheses.len());

        let root_cause_phase = RootCausePhase::new(
            self.llm.clone(),
            self.llm_config.for_phase(Phase::RootCause),
        );
        let root_cause = root_cause_phase.analyze(&hypotheses, &facts).await;
        info!(
            "root cause confidence: {:.2}",
            root_cause.confidence_score
        );

        let affected_resources = report::build_affected_resources(&resources, &facts, region);

        let severity_phase = SeverityPhase::new(
            self.llm.clone(),
            self.llm_config.for_phase(Phase::Severity),
        );
        let severity = severity_phase
            .assess(&facts, &affected_resources, &hypotheses)
            .await;

        let advice = advice::build_advice(&root_cause);

        report::assemble_report(
            run_id.to_string(),
            started_at,
            &parsed,
            facts,
            hypotheses,
            advice,
            root_cause,
            severity,
            affected_resources,
            region,
        )
    }

    async fn parse_inputs(&self, request: &InvestigationRequest, region: &str) -> ParsedInputs {
        let parser = InputParser::new(self.llm.clone());
        let mut parsed = parser.parse(&request.input, region).await;
        if let Some(trace_id) = &request.xray_trace_id {
            if !parsed.trace_ids.contains(trace_id) {
                parsed.trace_ids.push(trace_id.clone());
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_validation_rejects_missing_keys() {
        assert!(InvestigationRequest::from_payload(&json!({})).is_err());
        assert!(InvestigationRequest::from_payload(&json!({
            "investigation": {"input": ""}
        }))
        .is_err());
    }

    #[test]
    fn region_precedence_prefers_investigation_over_service_config() {
        let request = InvestigationRequest::from_payload(&json!({
            "investigation": {"input": "something broke", "region": "us-east-1"},
            "service_config": {"region": "eu-west-1", "role_arn": "arn:aws:iam::123:role/r"}
        }))
        .unwrap();
        assert_eq!(request.region.as_deref(), Some("us-east-1"));
        assert_eq!(request.role_arn.as_deref(), Some("arn:aws:iam::123:role/r"));
    }

    #[test]
    fn service_config_region_is_the_fallback() {
        let request = InvestigationRequest::from_payload(&json!({
            "investigation": {"input": "something broke"},
            "service_config": {"region": "eu-central-1"}
        }))
        .unwrap();
        assert_eq!(request.region.as_deref(), Some("eu-central-1"));
    }
}
