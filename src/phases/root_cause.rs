use crate::llm::config::PhaseSettings;
use crate::llm::{self, Llm};
use crate::models::{Fact, Hypothesis, RootCauseAnalysis};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Types that name an actual cause rather than an observed effect.
const ROOT_CAUSE_TYPES: [&str; 6] = [
    "permission_issue",
    "configuration_error",
    "code_bug",
    "infrastructure_issue",
    "integration_failure",
    "network_issue",
];

/// Types that describe symptoms.
const SYMPTOM_TYPES: [&str; 5] = [
    "timeout",
    "error_rate",
    "throttling",
    "high_latency",
    "resource_constraint",
];

/// Selects the primary root cause and contributing factors from ranked
/// hypotheses.
pub struct RootCausePhase {
    llm: Option<Arc<dyn Llm>>,
    settings: PhaseSettings,
}

impl RootCausePhase {
    pub fn new(llm: Option<Arc<dyn Llm>>, settings: PhaseSettings) -> Self {
        Self { llm, settings }
    }

    pub async fn analyze(&self, hypotheses: &[Hypothesis], facts: &[Fact]) -> RootCauseAnalysis {
        if hypotheses.is_empty() {
            warn!("no hypotheses provided for root cause analysis");
            return RootCauseAnalysis {
                primary_root_cause: None,
                contributing_factors: Vec::new(),
                confidence_score: 0.0,
                analysis_summary: "No hypotheses generated - unable to determine root cause"
                    .to_string(),
            };
        }

        let mut sorted: Vec<Hypothesis> = hypotheses.to_vec();
        sorted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let outcome = match &self.llm {
            Some(llm) => match self.classify_with_llm(llm.as_ref(), &sorted, facts).await {
                Ok(outcome) => Some(outcome),
                Err(reason) => {
                    warn!("root cause model path failed ({reason}), using fallback");
                    None
                }
            },
            None => None,
        };

        let (primary, contributing, summary) =
            outcome.unwrap_or_else(|| classify_fallback(&sorted));

        let confidence_score = primary.as_ref().map(|h| h.confidence).unwrap_or(0.0);
        RootCauseAnalysis {
            primary_root_cause: primary,
            contributing_factors: contributing,
            confidence_score,
            analysis_summary: summary,
        }
    }

    async fn classify_with_llm(
        &self,
        llm: &dyn Llm,
        sorted: &[Hypothesis],
        facts: &[Fact],
    ) -> Result<(Option<Hypothesis>, Vec<Hypothesis>, String), String> {
        let prompt = build_prompt(sorted, facts);
        let response = llm
            .complete(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await
            .map_err(|e| e.to_string())?;

        let raw = llm::extract_json_object(&response).ok_or("no JSON object in response")?;
        let parsed: Value =
            serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {e}"))?;

        // The primary index is mandatory and must be in range.
        let primary_index = parsed
            .get("primary_root_cause_index")
            .and_then(Value::as_u64)
            .ok_or("missing primary_root_cause_index")? as usize;
        if primary_index >= sorted.len() {
            return Err(format!("primary index {primary_index} out of range"));
        }

        let contributing: Vec<Hypothesis> = parsed
            .get("contributing_factor_indices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_u64)
            .map(|i| i as usize)
            .filter(|&i| i != primary_index && i < sorted.len())
            .map(|i| sorted[i].clone())
            .collect();

        let summary = parsed
            .get("analysis_summary")
            .and_then(Value::as_str)
            .unwrap_or("Model classification completed")
            .to_string();

        let primary = sorted[primary_index].clone();
        info!("model selected {} as primary root cause", primary.kind);
        Ok((Some(primary), contributing, summary))
    }
}

fn build_prompt(sorted: &[Hypothesis], facts: &[Fact]) -> String {
    let hypotheses_text: Vec<String> = sorted
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "{i}. [{}] {} (confidence: {:.2}, evidence items: {})",
                h.kind,
                h.description,
                h.confidence,
                h.evidence.len()
            )
        })
        .collect();
    let sample_facts: Vec<String> = facts
        .iter()
        .take(5)
        .map(|f| format!("- {}", f.content))
        .collect();

    format!(
        "You are an expert incident analyst. Select the PRIMARY root cause from these \
hypotheses about an AWS incident, distinguishing underlying causes from symptoms.\n\n\
HYPOTHESES (0-based index, ranked by confidence):\n{}\n\n\
KEY FACTS:\n{}\n\n\
GUIDANCE:\n\
- Root causes: permission_issue, configuration_error, code_bug, infrastructure_issue\n\
- Symptoms: timeout, error_rate, throttling, resource_constraint\n\
- Prefer a root cause over a symptom when confidence is similar\n\
- Contributing factors must be distinct from the primary\n\n\
Respond with ONLY a JSON object:\n\
{{\"primary_root_cause_index\": 0, \"contributing_factor_indices\": [1, 2], \"analysis_summary\": \"...\"}}",
        hypotheses_text.join("\n"),
        sample_facts.join("\n")
    )
}

/// Deterministic classification: prefer true causes, degrade symptom-only
/// selections, keep unknowns last.
fn classify_fallback(sorted: &[Hypothesis]) -> (Option<Hypothesis>, Vec<Hypothesis>, String) {
    info!("using fallback root cause classification");

    let root_causes: Vec<&Hypothesis> = sorted
        .iter()
        .filter(|h| ROOT_CAUSE_TYPES.contains(&h.kind.as_str()))
        .collect();
    let symptoms: Vec<&Hypothesis> = sorted
        .iter()
        .filter(|h| SYMPTOM_TYPES.contains(&h.kind.as_str()))
        .collect();
    let unknown: Vec<&Hypothesis> = sorted
        .iter()
        .filter(|h| {
            !ROOT_CAUSE_TYPES.contains(&h.kind.as_str()) && !SYMPTOM_TYPES.contains(&h.kind.as_str())
        })
        .collect();

    if let Some(primary) = root_causes.first() {
        let mut contributing: Vec<Hypothesis> = root_causes
            .iter()
            .skip(1)
            .take(2)
            .map(|h| (*h).clone())
            .collect();
        if let Some(symptom) = symptoms.first() {
            contributing.push((*symptom).clone());
        }
        let mut summary = format!(
            "Identified {} as primary root cause (confidence: {:.2})",
            primary.kind, primary.confidence
        );
        if !symptoms.is_empty() {
            let symptom_types: Vec<&str> =
                symptoms.iter().take(3).map(|s| s.kind.as_str()).collect();
            summary.push_str(&format!(". Observed symptoms: {}", symptom_types.join(", ")));
        }
        return (Some((*primary).clone()), contributing, summary);
    }

    if let Some(symptom) = symptoms.first() {
        let original_confidence = symptom.confidence;
        // Symptoms alone cannot pinpoint a cause; degrade and say so.
        let primary = Hypothesis {
            kind: symptom.kind.clone(),
            description: format!("{} (symptom - root cause unclear)", symptom.description),
            confidence: symptom.confidence * 0.7,
            evidence: symptom.evidence.clone(),
            metadata: symptom.metadata.clone(),
        };
        let contributing: Vec<Hypothesis> =
            symptoms.iter().skip(1).take(2).map(|h| (*h).clone()).collect();
        let summary = format!(
            "Only symptoms identified, no clear root cause. Primary symptom: {} \
(adjusted confidence: {:.2}, original: {:.2})",
            primary.kind, primary.confidence, original_confidence
        );
        return (Some(primary), contributing, summary);
    }

    if let Some(primary) = unknown.first() {
        let contributing: Vec<Hypothesis> =
            unknown.iter().skip(1).take(2).map(|h| (*h).clone()).collect();
        let summary = format!(
            "Identified {} as potential root cause (type classification unclear)",
            primary.kind
        );
        return (Some((*primary).clone()), contributing, summary);
    }

    (
        None,
        Vec::new(),
        "No hypotheses available for root cause analysis".to_string(),
    )
}
