use crate::llm::config::PhaseSettings;
use crate::llm::{self, Llm};
use crate::models::{
    AffectedResource, Fact, HealthStatus, Hypothesis, ImpactScope, Severity, SeverityAssessment,
    UserImpact,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const CRITICAL_KEYWORDS: [&str; 6] = ["error", "failed", "exception", "timeout", "denied", "unauthorized"];
const HIGH_KEYWORDS: [&str; 4] = ["warning", "degraded", "slow", "latency"];
const SYSTEM_WIDE_KEYWORDS: [&str; 5] = ["system", "platform", "infrastructure", "network", "database"];

const SEVERE_IMPACT: [&str; 5] = ["down", "unavailable", "outage", "complete failure", "service unavailable"];
const MODERATE_IMPACT: [&str; 5] = ["slow", "degraded", "intermittent", "timeout", "error"];
const MINIMAL_IMPACT: [&str; 4] = ["warning", "minor", "temporary", "brief"];

/// Assesses incident severity from a deterministic score, with an optional
/// model pass for the final classification. The model result is used when it
/// parses; otherwise the score mapping applies.
pub struct SeverityPhase {
    llm: Option<Arc<dyn Llm>>,
    settings: PhaseSettings,
}

impl SeverityPhase {
    pub fn new(llm: Option<Arc<dyn Llm>>, settings: PhaseSettings) -> Self {
        Self { llm, settings }
    }

    pub async fn assess(
        &self,
        facts: &[Fact],
        affected_resources: &[AffectedResource],
        hypotheses: &[Hypothesis],
    ) -> SeverityAssessment {
        let score = heuristic_score(facts, affected_resources);
        let impact_scope = impact_scope(facts, affected_resources);
        let user_impact = user_impact(facts, impact_scope);

        let model_result = match &self.llm {
            Some(model) => self
                .assess_with_llm(model.as_ref(), facts, affected_resources, hypotheses, score)
                .await
                .map_err(|reason| {
                    warn!("severity model path failed ({reason}), using score mapping");
                })
                .ok(),
            None => None,
        };

        let (severity, confidence, reasoning) =
            model_result.unwrap_or_else(|| fallback_from_score(score));

        SeverityAssessment {
            severity,
            impact_scope,
            affected_resource_count: affected_resources.len(),
            user_impact,
            confidence,
            reasoning,
        }
    }

    async fn assess_with_llm(
        &self,
        model: &dyn Llm,
        facts: &[Fact],
        affected_resources: &[AffectedResource],
        hypotheses: &[Hypothesis],
        score: u32,
    ) -> Result<(Severity, f64, String), String> {
        let failed = affected_resources
            .iter()
            .filter(|r| r.health_status == HealthStatus::Failed)
            .count();
        let degraded = affected_resources
            .iter()
            .filter(|r| r.health_status == HealthStatus::Degraded)
            .count();
        let sample_facts: Vec<String> =
            facts.iter().take(5).map(|f| format!("- {}", f.content)).collect();
        let sample_hypotheses: Vec<String> = hypotheses
            .iter()
            .take(3)
            .map(|h| format!("- {}", h.description))
            .collect();

        let prompt = format!(
            "You are an expert incident response analyst. Assess the severity of this AWS incident.\n\n\
CONTEXT:\n\
- Heuristic severity score: {score}/20\n\
- Affected resources: {} (failed: {failed}, degraded: {degraded})\n\
- Facts discovered: {}\n\
- Hypotheses generated: {}\n\n\
KEY FACTS:\n{}\n\n\
KEY HYPOTHESES:\n{}\n\n\
Severity guidelines:\n\
- critical: service unavailable, data loss risk, customer-facing outage\n\
- high: significant degradation, errors affecting many users\n\
- medium: isolated issues, performance degradation\n\
- low: minor issues, warnings, potential future problems\n\n\
Respond with ONLY a JSON object:\n\
{{\"severity\": \"high\", \"confidence\": 0.85, \"reasoning\": \"...\"}}",
            affected_resources.len(),
            facts.len(),
            hypotheses.len(),
            sample_facts.join("\n"),
            sample_hypotheses.join("\n"),
        );

        let response = model
            .complete(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await
            .map_err(|e| e.to_string())?;

        let raw = llm::extract_json_object(&response).ok_or("no JSON object in response")?;
        let parsed: Value =
            serde_json::from_str(&raw).map_err(|e| format!("invalid JSON: {e}"))?;

        let severity = parsed
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse)
            .ok_or("severity outside the allowed set")?;
        let confidence = parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.7)
            .clamp(0.0, 1.0);
        let reasoning = parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("Model severity assessment")
            .to_string();

        info!("model assessed severity as {}", severity.as_str());
        Ok((severity, confidence, reasoning))
    }
}

/// Deterministic severity score.
pub fn heuristic_score(facts: &[Fact], affected_resources: &[AffectedResource]) -> u32 {
    let mut score = 0u32;

    for fact in facts {
        let content = fact.content.to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|k| content.contains(k)) {
            score += 3;
        }
        if HIGH_KEYWORDS.iter().any(|k| content.contains(k)) {
            score += 1;
        }
    }

    for resource in affected_resources {
        match resource.health_status {
            HealthStatus::Failed => score += 4,
            HealthStatus::Degraded => score += 2,
            _ => {}
        }
    }

    let count = affected_resources.len();
    if count > 5 {
        score += 3;
    } else if count > 2 {
        score += 2;
    } else if count > 0 {
        score += 1;
    }

    score
}

pub fn impact_scope(facts: &[Fact], affected_resources: &[AffectedResource]) -> ImpactScope {
    let count = affected_resources.len();
    if count == 0 {
        return ImpactScope::Unknown;
    }
    if count > 5 {
        return ImpactScope::SystemWide;
    }
    if count > 3 {
        let system_wide = facts.iter().any(|fact| {
            let content = fact.content.to_lowercase();
            SYSTEM_WIDE_KEYWORDS.iter().any(|k| content.contains(k))
        });
        if system_wide {
            return ImpactScope::SystemWide;
        }
    }
    if count > 2 {
        return ImpactScope::Service;
    }
    ImpactScope::SingleResource
}

pub fn user_impact(facts: &[Fact], scope: ImpactScope) -> UserImpact {
    let mut max_impact = UserImpact::None;

    for fact in facts {
        let content = fact.content.to_lowercase();
        if SEVERE_IMPACT.iter().any(|k| content.contains(k)) {
            return UserImpact::Severe;
        }
        if MODERATE_IMPACT.iter().any(|k| content.contains(k)) && max_impact < UserImpact::Moderate
        {
            max_impact = UserImpact::Moderate;
        }
        if MINIMAL_IMPACT.iter().any(|k| content.contains(k)) && max_impact < UserImpact::Minimal {
            max_impact = UserImpact::Minimal;
        }
    }

    if max_impact == UserImpact::None {
        match scope {
            ImpactScope::SystemWide => max_impact = UserImpact::Moderate,
            ImpactScope::Service => max_impact = UserImpact::Minimal,
            _ => {}
        }
    }

    max_impact
}

fn fallback_from_score(score: u32) -> (Severity, f64, String) {
    info!("using score-mapped severity assessment");
    if score >= 15 {
        (
            Severity::Critical,
            0.80,
            "High heuristic score indicates critical severity".to_string(),
        )
    } else if score >= 10 {
        (
            Severity::High,
            0.75,
            "Elevated heuristic score indicates high severity".to_string(),
        )
    } else if score >= 5 {
        (
            Severity::Medium,
            0.70,
            "Moderate heuristic score indicates medium severity".to_string(),
        )
    } else {
        (
            Severity::Low,
            0.65,
            "Low heuristic score indicates low severity".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::config::Phase;
    use crate::llm::LlmConfig;
    use crate::testutil::MockLlm;
    use serde_json::Map;

    fn settings() -> PhaseSettings {
        LlmConfig::default().for_phase(Phase::Severity)
    }

    fn resource(status: HealthStatus) -> AffectedResource {
        AffectedResource {
            resource_type: "lambda".to_string(),
            resource_id: "fn".to_string(),
            resource_name: "fn".to_string(),
            health_status: status,
            detected_issues: vec![],
            metadata: Map::new(),
        }
    }

    #[test]
    fn score_counts_keywords_once_per_fact() {
        let facts = vec![
            Fact::new("a", "error error error failed", 0.9),
            Fact::new("b", "a slow warning", 0.9),
        ];
        // 3 for the error fact, 1 for the warning fact, 1 for one resource.
        assert_eq!(heuristic_score(&facts, &[resource(HealthStatus::Unknown)]), 5);
    }

    #[test]
    fn score_weighs_failed_resources() {
        let resources = vec![resource(HealthStatus::Failed), resource(HealthStatus::Degraded)];
        assert_eq!(heuristic_score(&[], &resources), 4 + 2 + 1);
    }

    #[test]
    fn scope_rules() {
        assert_eq!(impact_scope(&[], &[]), ImpactScope::Unknown);
        let one = vec![resource(HealthStatus::Unknown)];
        assert_eq!(impact_scope(&[], &one), ImpactScope::SingleResource);
        let four = vec![
            resource(HealthStatus::Unknown),
            resource(HealthStatus::Unknown),
            resource(HealthStatus::Unknown),
            resource(HealthStatus::Unknown),
        ];
        assert_eq!(impact_scope(&[], &four), ImpactScope::Service);
        let network_fact = vec![Fact::new("a", "network partition detected", 0.9)];
        assert_eq!(impact_scope(&network_fact, &four), ImpactScope::SystemWide);
        let seven: Vec<AffectedResource> =
            (0..7).map(|_| resource(HealthStatus::Unknown)).collect();
        assert_eq!(impact_scope(&[], &seven), ImpactScope::SystemWide);
    }

    #[test]
    fn user_impact_promotion() {
        assert_eq!(user_impact(&[], ImpactScope::SystemWide), UserImpact::Moderate);
        assert_eq!(user_impact(&[], ImpactScope::Service), UserImpact::Minimal);
        let outage = vec![Fact::new("a", "full outage reported", 0.9)];
        assert_eq!(user_impact(&outage, ImpactScope::SingleResource), UserImpact::Severe);
    }

    #[tokio::test]
    async fn model_result_wins_when_parseable() {
        let llm = Arc::new(MockLlm::new(vec![
            r#"{"severity": "critical", "confidence": 0.9, "reasoning": "customer-facing outage"}"#,
        ]));
        let phase = SeverityPhase::new(Some(llm), settings());
        let assessment = phase.assess(&[], &[], &[]).await;
        assert_eq!(assessment.severity, Severity::Critical);
        assert_eq!(assessment.confidence, 0.9);
    }

    #[tokio::test]
    async fn invalid_model_severity_falls_back_to_score() {
        let llm = Arc::new(MockLlm::new(vec![
            r#"{"severity": "catastrophic", "confidence": 0.9, "reasoning": "??"}"#,
        ]));
        let phase = SeverityPhase::new(Some(llm), settings());
        let facts = vec![
            Fact::new("a", "error", 0.9),
            Fact::new("b", "failed", 0.9),
            Fact::new("c", "exception", 0.9),
            Fact::new("d", "denied", 0.9),
        ];
        let resources = vec![resource(HealthStatus::Failed)];
        // Score: 4*3 + 4 + 1 = 17 -> critical / 0.80.
        let assessment = phase.assess(&facts, &resources, &[]).await;
        assert_eq!(assessment.severity, Severity::Critical);
        assert_eq!(assessment.confidence, 0.80);
        assert_eq!(assessment.affected_resource_count, 1);
    }
}
