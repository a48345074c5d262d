use crate::models::{
    AffectedResource, Advice, EventTimeline, Fact, HealthStatus, Hypothesis, ImpactScope,
    InvestigationReport, InvestigationStatus, ParsedInputs, Resource, RootCauseAnalysis, Severity,
    SeverityAssessment, UserImpact,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

const FAILED_KEYWORDS: [&str; 5] = ["error", "failed", "exception", "denied", "timed out"];
const DEGRADED_KEYWORDS: [&str; 4] = ["warning", "degraded", "slow", "throttl"];

/// Derive the per-process-unique run id from the start time and input hash.
pub fn generate_run_id(started_at: DateTime<Utc>, input: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    input.to_string().hash(&mut hasher);
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!(
        "{}.{:04}.{}",
        started_at.timestamp_millis(),
        hasher.finish() % 10_000,
        sequence
    )
}

/// Build the affected-resource list, deriving health status and detected
/// issues from the facts that mention each resource.
pub fn build_affected_resources(
    resources: &[Resource],
    facts: &[Fact],
    region: &str,
) -> Vec<AffectedResource> {
    resources
        .iter()
        .map(|resource| {
            let mut health = HealthStatus::Unknown;
            let mut detected_issues = Vec::new();

            for fact in facts {
                if !fact.content.contains(&resource.name) {
                    continue;
                }
                let content = fact.content.to_lowercase();
                if FAILED_KEYWORDS.iter().any(|k| content.contains(k)) {
                    health = HealthStatus::Failed;
                    if detected_issues.len() < 3 {
                        detected_issues.push(fact.content.clone());
                    }
                } else if DEGRADED_KEYWORDS.iter().any(|k| content.contains(k)) {
                    if health == HealthStatus::Unknown {
                        health = HealthStatus::Degraded;
                    }
                    if detected_issues.len() < 3 {
                        detected_issues.push(fact.content.clone());
                    }
                }
            }

            let mut metadata = Map::new();
            metadata.insert("region".to_string(), json!(region));
            if let Some(source) = resource.metadata.get("source") {
                metadata.insert("source".to_string(), source.clone());
            }

            AffectedResource {
                resource_type: resource.kind.clone(),
                resource_id: resource
                    .arn
                    .clone()
                    .unwrap_or_else(|| resource.name.clone()),
                resource_name: resource.name.clone(),
                health_status: health,
                detected_issues,
                metadata,
            }
        })
        .collect()
}

/// Assemble the final report for a completed pipeline run.
#[allow(clippy::too_many_arguments)]
pub fn assemble_report(
    run_id: String,
    started_at: DateTime<Utc>,
    parsed: &ParsedInputs,
    facts: Vec<Fact>,
    hypotheses: Vec<Hypothesis>,
    advice: Vec<Advice>,
    root_cause: RootCauseAnalysis,
    severity: SeverityAssessment,
    affected_resources: Vec<AffectedResource>,
    region: &str,
) -> InvestigationReport {
    let completed_at = Utc::now();

    let mut timeline = vec![EventTimeline {
        timestamp: started_at,
        event_type: "investigation_start".to_string(),
        component: "orchestrator".to_string(),
        description: "Investigation started".to_string(),
        metadata: {
            let mut metadata = Map::new();
            metadata.insert("target_count".to_string(), json!(parsed.primary_targets.len()));
            metadata.insert(
                "targets".to_string(),
                json!(parsed
                    .primary_targets
                    .iter()
                    .map(|t| format!("{}:{}", t.kind, t.name))
                    .collect::<Vec<_>>()),
            );
            metadata.insert("trace_count".to_string(), json!(parsed.trace_ids.len()));
            metadata.insert("error_count".to_string(), json!(parsed.error_messages.len()));
            metadata
        },
    }];
    for trace_id in &parsed.trace_ids {
        timeline.push(EventTimeline {
            timestamp: started_at,
            event_type: "trace_analysis".to_string(),
            component: "trace_analyzer".to_string(),
            description: format!("Analyzed trace {trace_id}"),
            metadata: {
                let mut metadata = Map::new();
                metadata.insert("trace_id".to_string(), json!(trace_id));
                metadata
            },
        });
    }
    timeline.push(EventTimeline {
        timestamp: completed_at,
        event_type: "investigation_complete".to_string(),
        component: "orchestrator".to_string(),
        description: "Investigation completed".to_string(),
        metadata: Map::new(),
    });

    let summary = json!({
        "investigation_type": "code_orchestration",
        "target_count": parsed.primary_targets.len(),
        "trace_count": parsed.trace_ids.len(),
        "error_count": parsed.error_messages.len(),
        "facts": facts.len(),
        "hypotheses": hypotheses.len(),
        "advice": advice.len(),
        "region": region,
    });

    InvestigationReport {
        run_id,
        status: InvestigationStatus::Completed,
        started_at,
        completed_at,
        duration_seconds: duration_seconds(started_at, completed_at),
        affected_resources,
        severity_assessment: Some(severity),
        facts,
        root_cause_analysis: Some(root_cause),
        hypotheses,
        advice,
        timeline,
        summary: summary.to_string(),
    }
}

/// Report for an investigation that found nothing to investigate.
pub fn insufficient_data_report(
    run_id: String,
    started_at: DateTime<Utc>,
    reason: &str,
    region: &str,
) -> InvestigationReport {
    let completed_at = Utc::now();
    let summary = json!({
        "investigation_type": "code_orchestration",
        "reason": reason,
        "facts": 0,
        "hypotheses": 0,
        "advice": 0,
        "region": region,
    });

    InvestigationReport {
        run_id,
        status: InvestigationStatus::InsufficientData,
        started_at,
        completed_at,
        duration_seconds: duration_seconds(started_at, completed_at),
        affected_resources: Vec::new(),
        severity_assessment: Some(SeverityAssessment {
            severity: Severity::Low,
            impact_scope: ImpactScope::Unknown,
            affected_resource_count: 0,
            user_impact: UserImpact::Unknown,
            confidence: 0.0,
            reasoning: reason.to_string(),
        }),
        facts: Vec::new(),
        root_cause_analysis: Some(RootCauseAnalysis {
            primary_root_cause: None,
            contributing_factors: Vec::new(),
            confidence_score: 0.0,
            analysis_summary: reason.to_string(),
        }),
        hypotheses: Vec::new(),
        advice: Vec::new(),
        timeline: Vec::new(),
        summary: summary.to_string(),
    }
}

/// Report for a fatally failed investigation.
pub fn error_report(
    run_id: String,
    started_at: DateTime<Utc>,
    error: &str,
    advice: Vec<Advice>,
) -> InvestigationReport {
    let completed_at = Utc::now();

    InvestigationReport {
        run_id,
        status: InvestigationStatus::Failed,
        started_at,
        completed_at,
        duration_seconds: duration_seconds(started_at, completed_at),
        affected_resources: Vec::new(),
        severity_assessment: Some(SeverityAssessment {
            severity: Severity::Low,
            impact_scope: ImpactScope::Unknown,
            affected_resource_count: 0,
            user_impact: UserImpact::Unknown,
            confidence: 0.0,
            reasoning: "Investigation failed".to_string(),
        }),
        facts: vec![Fact::new(
            "orchestrator",
            format!("Investigation failed: {error}"),
            1.0,
        )],
        root_cause_analysis: Some(RootCauseAnalysis {
            primary_root_cause: None,
            contributing_factors: Vec::new(),
            confidence_score: 0.0,
            analysis_summary: format!("Investigation failed: {error}"),
        }),
        hypotheses: Vec::new(),
        advice,
        timeline: Vec::new(),
        summary: json!({"error": error, "investigation_success": false}).to_string(),
    }
}

fn duration_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> f64 {
    ((completed_at - started_at).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_within_a_process() {
        let now = Utc::now();
        let input = json!({"investigation": {"input": "x"}});
        let a = generate_run_id(now, &input);
        let b = generate_run_id(now, &input);
        assert_ne!(a, b);
    }

    #[test]
    fn affected_resources_derive_health_from_facts() {
        let resources = vec![
            Resource::new("lambda", "payment-processor", "eu-west-1"),
            Resource::new("sqs", "orders-queue", "eu-west-1"),
        ];
        let facts = vec![
            Fact::new("lambda_logs", "Lambda payment-processor failure: Task timed out", 0.9),
            Fact::new("sqs_queue_metrics", "Oldest message in orders-queue is slow to drain", 0.8),
        ];
        let affected = build_affected_resources(&resources, &facts, "eu-west-1");
        assert_eq!(affected[0].health_status, HealthStatus::Failed);
        assert!(!affected[0].detected_issues.is_empty());
        assert_eq!(affected[1].health_status, HealthStatus::Degraded);
    }

    #[test]
    fn assembled_report_keeps_counts_consistent() {
        let parsed = ParsedInputs {
            trace_ids: vec!["1-68e904af-484b173354fff9607ee41871".to_string()],
            ..Default::default()
        };
        let severity = SeverityAssessment {
            severity: Severity::Medium,
            impact_scope: ImpactScope::SingleResource,
            affected_resource_count: 1,
            user_impact: UserImpact::Minimal,
            confidence: 0.7,
            reasoning: "r".to_string(),
        };
        let root_cause = RootCauseAnalysis {
            primary_root_cause: None,
            contributing_factors: vec![],
            confidence_score: 0.0,
            analysis_summary: "s".to_string(),
        };
        let resources = vec![Resource::new("lambda", "fn", "eu-west-1")];
        let affected = build_affected_resources(&resources, &[], "eu-west-1");

        let report = assemble_report(
            "run-1".to_string(),
            Utc::now(),
            &parsed,
            vec![Fact::new("a", "b", 0.9)],
            vec![],
            vec![],
            root_cause,
            severity,
            affected,
            "eu-west-1",
        );

        assert_eq!(report.status, InvestigationStatus::Completed);
        assert_eq!(
            report.severity_assessment.as_ref().unwrap().affected_resource_count,
            report.affected_resources.len()
        );
        assert!(report.duration_seconds >= 0.0);
        assert_eq!(report.timeline.len(), 3);
        assert_eq!(report.timeline[1].event_type, "trace_analysis");
        let summary: Value = serde_json::from_str(&report.summary).unwrap();
        assert_eq!(summary["facts"], 1);
        assert_eq!(summary["trace_count"], 1);
    }

    #[test]
    fn insufficient_data_report_references_reason() {
        let report = insufficient_data_report(
            "run-2".to_string(),
            Utc::now(),
            "No resources or trace IDs identified",
            "eu-west-1",
        );
        assert_eq!(report.status, InvestigationStatus::InsufficientData);
        assert!(report.facts.is_empty());
        assert!(report.hypotheses.is_empty());
        assert!(report.summary.contains("No resources or trace IDs identified"));
        assert_eq!(
            report.root_cause_analysis.as_ref().unwrap().confidence_score,
            0.0
        );
    }
}
