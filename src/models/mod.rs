use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Maximum length of a single fact content, in bytes.
pub const MAX_FACT_CONTENT_BYTES: usize = 1024;

/// An atomic observation discovered during an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Component that discovered this fact (e.g. `lambda_config`, `xray_trace`).
    pub source: String,
    pub content: String,
    /// Confidence in this fact, 0.0 to 1.0.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Fact {
    pub fn new(source: &str, content: impl Into<String>, confidence: f64) -> Self {
        let mut content = content.into();
        if content.len() > MAX_FACT_CONTENT_BYTES {
            let mut cut = MAX_FACT_CONTENT_BYTES;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }
        Self {
            source: source.to_string(),
            content,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A confidence-weighted claim about a possible cause, backed by evidence facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Hypothesis type, e.g. `permission_issue`, `timeout`, `code_bug`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub confidence: f64,
    /// Fact contents supporting this hypothesis. Never empty in a final report.
    pub evidence: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Actionable remediation advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub title: String,
    pub description: String,
    pub priority: AdvicePriority,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvicePriority {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "critical")]
    Critical,
}

/// An AWS resource involved in the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedResource {
    pub resource_type: String,
    /// ARN when known, otherwise the resource name.
    pub resource_id: String,
    pub resource_name: String,
    pub health_status: HealthStatus,
    pub detected_issues: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "critical")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactScope {
    #[serde(rename = "single_resource")]
    SingleResource,
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "system_wide")]
    SystemWide,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserImpact {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "minimal")]
    Minimal,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "severe")]
    Severe,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Severity and impact assessment for the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityAssessment {
    pub severity: Severity,
    pub impact_scope: ImpactScope,
    pub affected_resource_count: usize,
    pub user_impact: UserImpact,
    pub confidence: f64,
    pub reasoning: String,
}

/// Root cause analysis outcome.
///
/// `confidence_score` equals the primary hypothesis confidence, or 0.0 when
/// no primary root cause was identified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    pub primary_root_cause: Option<Hypothesis>,
    pub contributing_factors: Vec<Hypothesis>,
    pub confidence_score: f64,
    pub analysis_summary: String,
}

/// One entry in the investigation event timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTimeline {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub component: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestigationStatus {
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "insufficient_data")]
    InsufficientData,
}

/// Complete investigation report with all findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub run_id: String,
    pub status: InvestigationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub affected_resources: Vec<AffectedResource>,
    pub severity_assessment: Option<SeverityAssessment>,
    pub facts: Vec<Fact>,
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    pub hypotheses: Vec<Hypothesis>,
    pub advice: Vec<Advice>,
    pub timeline: Vec<EventTimeline>,
    /// JSON-encoded summary object produced by the report assembler.
    pub summary: String,
}

impl InvestigationReport {
    /// Shape the report into the structured wire response.
    pub fn to_response(&self) -> Value {
        let severity = match &self.severity_assessment {
            Some(s) => serde_json::to_value(s).unwrap_or(Value::Null),
            None => json!({
                "severity": "unknown",
                "impact_scope": "unknown",
                "affected_resource_count": 0,
                "user_impact": "unknown",
                "confidence": 0.0,
                "reasoning": "Investigation failed"
            }),
        };

        let root_cause = match &self.root_cause_analysis {
            Some(r) => serde_json::to_value(r).unwrap_or(Value::Null),
            None => json!({
                "primary_root_cause": null,
                "contributing_factors": [],
                "confidence_score": 0.0,
                "analysis_summary": "Investigation failed"
            }),
        };

        // The summary field holds a JSON-encoded object; surface it decoded.
        let summary = serde_json::from_str::<Value>(&self.summary)
            .unwrap_or_else(|_| Value::String(self.summary.clone()));

        json!({
            "success": matches!(self.status, InvestigationStatus::Completed | InvestigationStatus::InsufficientData),
            "investigation": {
                "id": self.run_id,
                "status": self.status,
                "started_at": self.started_at.to_rfc3339(),
                "completed_at": self.completed_at.to_rfc3339(),
                "duration_seconds": self.duration_seconds,
            },
            "severity": severity,
            "affected_resources": {
                "count": self.affected_resources.len(),
                "resources": self.affected_resources,
            },
            "root_cause": root_cause,
            "timeline": self.timeline,
            "facts": {
                "count": self.facts.len(),
                "items": self.facts,
            },
            "hypotheses": {
                "count": self.hypotheses.len(),
                "items": self.hypotheses,
            },
            "remediation": {
                "count": self.advice.len(),
                "recommendations": self.advice,
            },
            "summary": summary,
        })
    }
}

/// A cloud resource identified for investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Lowercased resource type, e.g. `lambda`, `apigateway`, `stepfunctions`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub arn: Option<String>,
    pub region: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Resource {
    pub fn new(kind: &str, name: &str, region: &str) -> Self {
        Self {
            kind: kind.to_lowercase(),
            name: name.to_string(),
            arn: None,
            region: region.to_string(),
            metadata: Map::new(),
        }
    }

    /// Deduplication key: ARN when present, otherwise `type:name`.
    pub fn dedup_key(&self) -> String {
        match &self.arn {
            Some(arn) if !arn.is_empty() => arn.clone(),
            _ => format!("{}:{}", self.kind, self.name),
        }
    }
}

/// Optional investigation time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Typed result of input parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInputs {
    pub primary_targets: Vec<Resource>,
    pub trace_ids: Vec<String>,
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub business_context: Map<String, Value>,
    pub time_range: Option<TimeRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_content_is_capped() {
        let long = "x".repeat(4096);
        let fact = Fact::new("lambda_logs", long, 0.9);
        assert_eq!(fact.content.len(), MAX_FACT_CONTENT_BYTES);
    }

    #[test]
    fn fact_confidence_is_clamped() {
        assert_eq!(Fact::new("a", "b", 1.7).confidence, 1.0);
        assert_eq!(Fact::new("a", "b", -0.2).confidence, 0.0);
    }

    #[test]
    fn resource_dedup_key_prefers_arn() {
        let mut r = Resource::new("lambda", "payment-processor", "eu-west-1");
        assert_eq!(r.dedup_key(), "lambda:payment-processor");
        r.arn = Some("arn:aws:lambda:eu-west-1:123:function:payment-processor".to_string());
        assert_eq!(
            r.dedup_key(),
            "arn:aws:lambda:eu-west-1:123:function:payment-processor"
        );
    }

    #[test]
    fn report_round_trip_is_byte_stable() {
        let report = InvestigationReport {
            run_id: "1700000000000.0042.1".to_string(),
            status: InvestigationStatus::Completed,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.5,
            affected_resources: vec![AffectedResource {
                resource_type: "lambda".to_string(),
                resource_id: "payment-processor".to_string(),
                resource_name: "payment-processor".to_string(),
                health_status: HealthStatus::Degraded,
                detected_issues: vec!["timeout".to_string()],
                metadata: Map::new(),
            }],
            severity_assessment: Some(SeverityAssessment {
                severity: Severity::High,
                impact_scope: ImpactScope::Service,
                affected_resource_count: 1,
                user_impact: UserImpact::Moderate,
                confidence: 0.8,
                reasoning: "elevated error rate".to_string(),
            }),
            facts: vec![Fact::new("lambda_config", "timeout=3s", 0.9)],
            root_cause_analysis: None,
            hypotheses: vec![],
            advice: vec![],
            timeline: vec![],
            summary: "{\"facts\":1}".to_string(),
        };

        let first = serde_json::to_string(&report).unwrap();
        let decoded: InvestigationReport = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&decoded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn response_shape_has_sections() {
        let report = InvestigationReport {
            run_id: "r".to_string(),
            status: InvestigationStatus::Failed,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 0.0,
            affected_resources: vec![],
            severity_assessment: None,
            facts: vec![],
            root_cause_analysis: None,
            hypotheses: vec![],
            advice: vec![],
            timeline: vec![],
            summary: "{\"error\":\"boom\"}".to_string(),
        };
        let response = report.to_response();
        assert_eq!(response["success"], Value::Bool(false));
        assert_eq!(response["severity"]["severity"], "unknown");
        assert_eq!(response["root_cause"]["confidence_score"], 0.0);
        assert_eq!(response["facts"]["count"], 0);
        assert_eq!(response["summary"]["error"], "boom");
    }
}
