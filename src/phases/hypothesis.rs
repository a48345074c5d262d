use crate::llm::config::PhaseSettings;
use crate::llm::{self, Llm};
use crate::models::{Fact, Hypothesis};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Hypothesis types the model is asked to choose from.
const HYPOTHESIS_TYPES: &str = "permission_issue, configuration_error, code_bug, timeout, \
resource_constraint, integration_failure, infrastructure_issue, error_rate, throttling, \
network_issue";

/// Generates ranked, evidence-backed hypotheses from the collected facts.
///
/// The model path enforces the output contract strictly; anything that fails
/// validation is dropped. When the model is unavailable or unparseable a
/// deterministic keyword heuristic takes over.
pub struct HypothesisPhase {
    llm: Option<Arc<dyn Llm>>,
    settings: PhaseSettings,
}

impl HypothesisPhase {
    pub fn new(llm: Option<Arc<dyn Llm>>, settings: PhaseSettings) -> Self {
        Self { llm, settings }
    }

    pub async fn generate(&self, facts: &[Fact]) -> Vec<Hypothesis> {
        if facts.is_empty() {
            warn!("no facts provided for hypothesis generation");
            return Vec::new();
        }

        let mut hypotheses = match &self.llm {
            Some(llm) => match self.generate_with_llm(llm.as_ref(), facts).await {
                Ok(hypotheses) => hypotheses,
                Err(reason) => {
                    warn!("hypothesis model path failed ({reason}), using heuristics");
                    heuristic_hypotheses(facts)
                }
            },
            None => {
                info!("no model configured, using heuristic hypothesis generation");
                heuristic_hypotheses(facts)
            }
        };

        // Descending by confidence; ties keep input order.
        hypotheses.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hypotheses
    }

    async fn generate_with_llm(
        &self,
        llm: &dyn Llm,
        facts: &[Fact],
    ) -> Result<Vec<Hypothesis>, String> {
        let prompt = build_prompt(facts);
        let response = llm
            .complete(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await
            .map_err(|e| e.to_string())?;

        let raw = llm::extract_json_array(&response).ok_or("no JSON array in response")?;
        let items: Vec<Value> =
            serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {e}"))?;

        let mut hypotheses = Vec::new();
        for item in items {
            if let Some(hypothesis) = validate_hypothesis(&item, facts) {
                hypotheses.push(hypothesis);
            }
        }
        info!("model produced {} validated hypotheses", hypotheses.len());
        Ok(hypotheses)
    }
}

fn build_prompt(facts: &[Fact]) -> String {
    let facts_text: Vec<String> = facts
        .iter()
        .map(|f| format!("- [{}] {} (confidence: {:.2})", f.source, f.content, f.confidence))
        .collect();

    format!(
        "You are an expert incident analyst. Analyze these facts from an AWS incident \
investigation and generate evidence-based hypotheses about the root cause.\n\n\
FACTS:\n{}\n\n\
CONFIDENCE CALIBRATION:\n\
- 0.95-1.0: explicit error message with error code or stack trace\n\
- 0.85-0.94: configuration mismatch directly observed\n\
- 0.70-0.84: strong correlation between 2+ facts\n\
- below 0.70: do NOT create a hypothesis, the evidence is insufficient\n\n\
HYPOTHESIS TYPES: {HYPOTHESIS_TYPES}\n\n\
RULES:\n\
- Every hypothesis MUST cite fact content verbatim in its evidence list\n\
- Do NOT invent scenarios that are not in the facts\n\
- Rank by confidence, highest first\n\n\
Respond with ONLY a JSON array:\n\
[{{\"type\": \"...\", \"description\": \"...\", \"confidence\": 0.0, \"evidence\": [\"fact content\"]}}]",
        facts_text.join("\n")
    )
}

/// Validate one model-proposed hypothesis: evidence entries must substring-match
/// collected fact content, confidence is clamped, the type is normalized.
fn validate_hypothesis(item: &Value, facts: &[Fact]) -> Option<Hypothesis> {
    let evidence_raw = item.get("evidence").and_then(Value::as_array)?;
    let evidence: Vec<String> = evidence_raw
        .iter()
        .filter_map(Value::as_str)
        .filter(|entry| {
            !entry.is_empty()
                && facts
                    .iter()
                    .any(|f| f.content.contains(entry) || entry.contains(&f.content))
        })
        .map(|s| s.to_string())
        .collect();

    if evidence.is_empty() {
        warn!(
            "dropping hypothesis without grounded evidence: {:?}",
            item.get("description")
        );
        return None;
    }

    let confidence = item
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let kind = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_lowercase()
        .replace([' ', '-'], "_");

    Some(Hypothesis {
        kind,
        description: item
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        confidence,
        evidence,
        metadata: serde_json::Map::new(),
    })
}

/// Keyword patterns for the deterministic fallback, with fixed confidences.
const HEURISTIC_PATTERNS: &[(&str, &[&str], &str, f64)] = &[
    (
        "timeout",
        &["timeout", "timed out"],
        "Execution timeout caused by resource limits or slow downstream calls",
        0.80,
    ),
    (
        "error_rate",
        &["error rate", "errors"],
        "Increased error rate indicates an infrastructure or code issue",
        0.70,
    ),
    (
        "resource_constraint",
        &["low memory"],
        "Low memory allocation is causing performance issues or failures",
        0.85,
    ),
    (
        "code_bug",
        &["division by zero"],
        "Division by zero in code, likely from unvalidated input",
        0.95,
    ),
    (
        "code_bug_empty_input",
        &["empty list"],
        "Code does not handle empty input collections",
        0.85,
    ),
    (
        "code_bug_error_handling",
        &["missing error handling"],
        "Missing error handling around critical operations",
        0.80,
    ),
    (
        "permission_issue",
        &["accessdenied", "not authorized", "explicit deny", "deny"],
        "A principal lacks permission for an operation it attempted",
        0.92,
    ),
];

/// Deterministic keyword-scan fallback; each mapped issue is emitted once.
pub fn heuristic_hypotheses(facts: &[Fact]) -> Vec<Hypothesis> {
    info!("using heuristic hypothesis generation");
    let mut hypotheses: Vec<Hypothesis> = Vec::new();
    let mut identified: Vec<&str> = Vec::new();

    for fact in facts {
        let content = fact.content.to_lowercase();
        for &(key, keywords, description, confidence) in HEURISTIC_PATTERNS {
            if identified.contains(&key) {
                continue;
            }
            if keywords.iter().any(|k| content.contains(k)) {
                let kind = match key {
                    "code_bug_empty_input" | "code_bug_error_handling" => "code_bug",
                    other => other,
                };
                let mut metadata = serde_json::Map::new();
                metadata.insert("heuristic".to_string(), json!(true));
                hypotheses.push(Hypothesis {
                    kind: kind.to_string(),
                    description: description.to_string(),
                    confidence,
                    evidence: vec![fact.content.clone()],
                    metadata,
                });
                identified.push(key);
            }
        }
    }

    hypotheses
}
