use crate::models::{Advice, AdvicePriority, RootCauseAnalysis};

/// Deterministic remediation advice derived from the classified root cause
/// and contributing factors.
pub fn build_advice(analysis: &RootCauseAnalysis) -> Vec<Advice> {
    let mut advice = Vec::new();
    let mut seen_kinds: Vec<String> = Vec::new();

    let hypotheses = analysis
        .primary_root_cause
        .iter()
        .chain(analysis.contributing_factors.iter());

    for hypothesis in hypotheses {
        let kind = hypothesis.kind.clone();
        if seen_kinds.contains(&kind) {
            continue;
        }
        seen_kinds.push(kind.clone());
        if let Some(entry) = advice_for_kind(&kind) {
            advice.push(entry);
        }
    }

    advice
}

/// Single advice entry attached to failed investigations.
pub fn failure_advice(error: &str) -> Vec<Advice> {
    vec![Advice {
        title: "Investigation Failed".to_string(),
        description: format!("Investigation failed due to: {error}"),
        priority: AdvicePriority::Medium,
        category: "general".to_string(),
    }]
}

fn advice_for_kind(kind: &str) -> Option<Advice> {
    let (title, description, priority, category) = match kind {
        "permission_issue" => (
            "Review IAM permissions",
            "Inspect the policies attached to the failing principal and grant the denied \
             action explicitly. Validate the change with the IAM policy simulator before \
             deploying.",
            AdvicePriority::High,
            "security",
        ),
        "timeout" => (
            "Raise or tune the timeout",
            "Increase the configured timeout or reduce the work done per invocation. \
             Check downstream latency before raising limits blindly.",
            AdvicePriority::High,
            "performance",
        ),
        "configuration_error" => (
            "Audit recent configuration changes",
            "Compare the current configuration against the last known-good deployment \
             and roll back the divergent settings.",
            AdvicePriority::High,
            "configuration",
        ),
        "code_bug" => (
            "Fix the failing code path",
            "Reproduce the recorded error locally, add a regression test, and deploy a \
             fix. Input validation around the failing operation is the usual gap.",
            AdvicePriority::High,
            "code",
        ),
        "resource_constraint" => (
            "Increase resource allocation",
            "Raise the memory or capacity allocation for the affected resource and \
             re-check utilization after the change.",
            AdvicePriority::Medium,
            "capacity",
        ),
        "throttling" => (
            "Address throttling",
            "Request a quota increase or add client-side backoff to smooth the request \
             rate.",
            AdvicePriority::Medium,
            "capacity",
        ),
        "error_rate" => (
            "Investigate elevated error rate",
            "Correlate the error spike with deployments and upstream changes; alarms on \
             the error metric prevent silent regressions.",
            AdvicePriority::Medium,
            "reliability",
        ),
        "integration_failure" => (
            "Verify service integration",
            "Check the integration configuration between the calling and called service, \
             including request/response mappings and retry policies.",
            AdvicePriority::High,
            "integration",
        ),
        "infrastructure_issue" => (
            "Check infrastructure health",
            "Review provider status and the health of the underlying infrastructure; \
             consider failing over if the issue persists.",
            AdvicePriority::High,
            "infrastructure",
        ),
        "network_issue" => (
            "Inspect network configuration",
            "Verify security groups, route tables and NAT gateways on the path between \
             the affected services.",
            AdvicePriority::High,
            "network",
        ),
        _ => return None,
    };

    Some(Advice {
        title: title.to_string(),
        description: description.to_string(),
        priority,
        category: category.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hypothesis;

    fn analysis(primary: &str, contributing: &[&str]) -> RootCauseAnalysis {
        let hypothesis = |kind: &str| Hypothesis {
            kind: kind.to_string(),
            description: String::new(),
            confidence: 0.9,
            evidence: vec!["e".to_string()],
            metadata: serde_json::Map::new(),
        };
        RootCauseAnalysis {
            primary_root_cause: Some(hypothesis(primary)),
            contributing_factors: contributing.iter().map(|k| hypothesis(k)).collect(),
            confidence_score: 0.9,
            analysis_summary: String::new(),
        }
    }

    #[test]
    fn advice_follows_hypothesis_kinds_without_duplicates() {
        let advice = build_advice(&analysis("permission_issue", &["timeout", "permission_issue"]));
        assert_eq!(advice.len(), 2);
        assert_eq!(advice[0].category, "security");
        assert_eq!(advice[0].priority, AdvicePriority::High);
    }

    #[test]
    fn unknown_kinds_produce_no_advice() {
        let advice = build_advice(&analysis("mystery", &[]));
        assert!(advice.is_empty());
    }
}
