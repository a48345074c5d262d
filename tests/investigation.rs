mod common;

use cloudpilot::collector::{EvidenceCollector, MAX_GLOBAL_FACTS};
use cloudpilot::llm::LlmConfig;
use cloudpilot::models::{
    Fact, InvestigationStatus, ParsedInputs, Resource, Severity,
};
use cloudpilot::orchestrator::{InvestigationRequest, Investigator};
use cloudpilot::specialists::{
    Specialist, SpecialistContext, SpecialistRegistry, MAX_FACTS_PER_RESOURCE,
};
use common::{MockBackend, MockLlm};
use serde_json::{json, Value};
use std::sync::Arc;

fn investigator(backend: Arc<MockBackend>, llm: Option<Arc<MockLlm>>) -> Investigator {
    Investigator::new(
        backend,
        llm.map(|l| l as Arc<dyn cloudpilot::llm::Llm>),
        LlmConfig::default(),
        "eu-west-1".to_string(),
    )
}

fn permission_denied_trace() -> Value {
    let gateway_doc = json!({
        "name": "a1b2c3d4e5/prod",
        "origin": "AWS::ApiGateway::Stage",
        "fault": true,
        "http": {"response": {"status": 502}},
        "cause": {
            "message": "User: arn:aws:iam::123456789012:role/api-role is not authorized to perform: states:StartSyncExecution on resource: arn:aws:states:eu-west-1:123456789012:stateMachine:foo with an explicit deny"
        },
        "subsegments": [{
            "name": "STEPFUNCTIONS",
            "fault": true,
            "aws": {"operation": "StartSyncExecution"},
            "http": {"response": {"status": 400}},
            "cause": {"message": "AccessDeniedException"}
        }]
    });
    json!({
        "Traces": [{
            "Id": "1-68e915e7-7a2c7c6d1427db5e5b97c431",
            "Duration": 0.412,
            "Segments": [{"Id": "seg1", "Document": gateway_doc.to_string()}]
        }]
    })
}

#[tokio::test]
async fn permission_error_on_workflow_invocation() {
    let backend = Arc::new(
        MockBackend::new()
            .with_response("xray", "batch-get-traces", permission_denied_trace())
            .with_response(
                "apigateway",
                "get-stage",
                json!({"tracingEnabled": true, "deploymentId": "d1"}),
            )
            .with_response(
                "cloudwatch",
                "get-metric-statistics",
                json!({"Datapoints": [{"Sum": 14.0}]}),
            )
            .with_failure("iam", "get-role", "NoSuchEntity")
            .with_response(
                "logs",
                "filter-log-events",
                json!({"events": [{
                    "timestamp": 1700000000000u64,
                    "message": "Execution failed due to configuration error: API Gateway is not authorized to perform: states:StartSyncExecution",
                    "logStreamName": "s"
                }]}),
            ),
    );
    let llm = Arc::new(MockLlm::new(vec![
        r#"[{"type": "permission_issue", "description": "The API Gateway integration role is denied states:StartSyncExecution", "confidence": 0.93, "evidence": ["not authorized to perform"]}]"#,
        r#"{"primary_root_cause_index": 0, "contributing_factor_indices": [], "analysis_summary": "Explicit deny on states:StartSyncExecution blocks the workflow invocation"}"#,
        r#"{"severity": "high", "confidence": 0.85, "reasoning": "Customer-facing 502 responses"}"#,
    ]));

    let request = InvestigationRequest::from_payload(&json!({
        "investigation": {"input": "Gateway returning 502. Trace: 1-68e915e7-7a2c7c6d1427db5e5b97c431"},
        "service_config": {}
    }))
    .unwrap();

    let report = investigator(backend, Some(llm)).investigate(request).await;

    assert_eq!(report.status, InvestigationStatus::Completed);
    assert!(report.facts.iter().any(|f| f.content.contains("HTTP 502")));
    assert!(report
        .facts
        .iter()
        .any(|f| f.content.contains("not authorized to perform")));

    let root_cause = report.root_cause_analysis.as_ref().unwrap();
    let primary = root_cause.primary_root_cause.as_ref().unwrap();
    assert_eq!(primary.kind, "permission_issue");
    assert!(primary.confidence >= 0.90);
    assert_eq!(root_cause.confidence_score, primary.confidence);

    let severity = report.severity_assessment.as_ref().unwrap();
    assert!(matches!(severity.severity, Severity::High | Severity::Critical));
    assert_eq!(severity.affected_resource_count, report.affected_resources.len());

    // Ranked output with grounded evidence.
    for window in report.hypotheses.windows(2) {
        assert!(window[0].confidence >= window[1].confidence);
    }
    for hypothesis in &report.hypotheses {
        assert!(!hypothesis.evidence.is_empty());
        for entry in &hypothesis.evidence {
            assert!(report
                .facts
                .iter()
                .any(|f| f.content.contains(entry.as_str()) || entry.contains(&f.content)));
        }
    }
}

#[tokio::test]
async fn compute_function_timeout_is_classified_as_symptom() {
    let backend = Arc::new(
        MockBackend::new()
            .with_response(
                "lambda",
                "get-function-configuration",
                json!({"Timeout": 3, "MemorySize": 256, "Runtime": "python3.12"}),
            )
            .with_response("cloudwatch", "get-metric-statistics", json!({"Datapoints": []}))
            .with_response(
                "logs",
                "filter-log-events",
                json!({"events": [{
                    "timestamp": 1700000000000u64,
                    "message": "Task timed out after 3.00 seconds",
                    "logStreamName": "2026/01/01/[$LATEST]abc"
                }]}),
            )
            .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
    );
    // One scripted hypothesis response; later phases fail to parse it and
    // fall back to their deterministic classification.
    let llm = Arc::new(MockLlm::new(vec![
        r#"[{"type": "timeout", "description": "Configured 3s timeout is exceeded by the workload", "confidence": 0.88, "evidence": ["Task timed out after 3.00 seconds"]}]"#,
    ]));

    let request = InvestigationRequest {
        input: json!({
            "investigation_inputs": {
                "primary_targets": [{"type": "lambda", "name": "payment-processor"}]
            }
        }),
        xray_trace_id: None,
        region: None,
        role_arn: None,
        external_id: None,
    };

    let report = investigator(backend, Some(llm)).investigate(request).await;

    assert_eq!(report.status, InvestigationStatus::Completed);
    let timeout_hypothesis = report
        .hypotheses
        .iter()
        .find(|h| h.kind == "timeout")
        .expect("timeout hypothesis");
    assert!((0.85..=0.95).contains(&timeout_hypothesis.confidence));

    // No true-cause hypothesis exists, so the summary flags a symptom.
    let root_cause = report.root_cause_analysis.as_ref().unwrap();
    assert!(root_cause.analysis_summary.contains("symptom"));
    let primary = root_cause.primary_root_cause.as_ref().unwrap();
    assert!(primary.description.contains("(symptom - root cause unclear)"));
}

#[tokio::test]
async fn empty_inputs_short_circuit_without_tool_calls() {
    let backend = Arc::new(MockBackend::new());
    let request = InvestigationRequest::from_payload(&json!({
        "investigation": {"input": "something is wrong"},
        "service_config": {}
    }))
    .unwrap();

    let report = investigator(backend.clone(), None).investigate(request).await;

    assert_eq!(report.status, InvestigationStatus::InsufficientData);
    assert!(report.facts.is_empty());
    assert!(report.hypotheses.is_empty());
    assert!(report.summary.contains("No resources or trace IDs identified"));
    assert_eq!(backend.call_count(), 0);
}

struct NoisySpecialist;

#[async_trait::async_trait]
impl Specialist for NoisySpecialist {
    async fn analyze(&self, resource: &Resource, _ctx: &SpecialistContext) -> Vec<Fact> {
        (0..20)
            .map(|i| {
                Fact::new(
                    "noise",
                    format!("observation {i} about {}", resource.name),
                    0.8,
                )
            })
            .collect()
    }

    fn resource_types(&self) -> &'static [&'static str] {
        &["lambda", "apigateway", "dynamodb", "sqs"]
    }

    fn name(&self) -> &'static str {
        "noisy"
    }
}

#[tokio::test]
async fn parallel_fan_out_enforces_caps() {
    let backend = Arc::new(MockBackend::new());
    let tools = common::tool_context(backend).await;

    let mut registry = SpecialistRegistry::new();
    registry.register(Arc::new(NoisySpecialist));

    let kinds = ["lambda", "apigateway", "dynamodb", "sqs"];
    let resources: Vec<Resource> = (0..8)
        .map(|i| Resource::new(kinds[i % 4], &format!("resource-{i}"), "eu-west-1"))
        .collect();

    let facts = EvidenceCollector::with_registry(registry)
        .collect(&tools, &resources, &ParsedInputs::default())
        .await;

    assert_eq!(facts.len(), MAX_GLOBAL_FACTS);
    for i in 0..8 {
        let per_resource = facts
            .iter()
            .filter(|f| f.content.ends_with(&format!("resource-{i}")))
            .count();
        assert!(per_resource <= MAX_FACTS_PER_RESOURCE);
    }
}

#[tokio::test]
async fn unavailable_health_tool_does_not_degrade_analysis() {
    let backend = Arc::new(
        MockBackend::new()
            .with_failure("health", "describe-events", "not subscribed")
            .with_failure("cloudtrail", "lookup-events", "AccessDenied")
            .with_response(
                "lambda",
                "get-function-configuration",
                json!({"Timeout": 3, "MemorySize": 256, "Runtime": "python3.12"}),
            )
            .with_response("cloudwatch", "get-metric-statistics", json!({"Datapoints": []}))
            .with_response(
                "logs",
                "filter-log-events",
                json!({"events": [{
                    "timestamp": 1700000000000u64,
                    "message": "Task timed out after 3.00 seconds",
                    "logStreamName": "s"
                }]}),
            )
            .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
    );

    let request = InvestigationRequest {
        input: json!({
            "investigation_inputs": {
                "primary_targets": [{"type": "lambda", "name": "payment-processor"}]
            }
        }),
        xray_trace_id: None,
        region: None,
        role_arn: None,
        external_id: None,
    };

    let report = investigator(backend, None).investigate(request).await;

    assert_eq!(report.status, InvestigationStatus::Completed);
    assert!(report.facts.iter().all(|f| f.source != "aws_health"));
    assert!(!report.hypotheses.is_empty());
}

#[tokio::test]
async fn unparseable_llm_output_falls_back_to_heuristics() {
    let backend = Arc::new(
        MockBackend::new()
            .with_response(
                "lambda",
                "get-function-configuration",
                json!({"Timeout": 3, "MemorySize": 256, "Runtime": "python3.12"}),
            )
            .with_response("cloudwatch", "get-metric-statistics", json!({"Datapoints": []}))
            .with_response(
                "logs",
                "filter-log-events",
                json!({"events": [{
                    "timestamp": 1700000000000u64,
                    "message": "Task timed out after 3.00 seconds",
                    "logStreamName": "s"
                }]}),
            )
            .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
    );
    let llm = Arc::new(MockLlm::new(vec!["I cannot comply."]));

    let request = InvestigationRequest {
        input: json!({
            "investigation_inputs": {
                "primary_targets": [{"type": "lambda", "name": "payment-processor"}]
            }
        }),
        xray_trace_id: None,
        region: None,
        role_arn: None,
        external_id: None,
    };

    let report = investigator(backend, Some(llm)).investigate(request).await;

    assert!(!report.hypotheses.is_empty());
    for hypothesis in &report.hypotheses {
        assert_eq!(hypothesis.metadata["heuristic"], true);
    }
}

#[tokio::test]
async fn identical_runs_produce_identical_analysis() {
    let build = || {
        let backend = Arc::new(
            MockBackend::new()
                .with_response(
                    "lambda",
                    "get-function-configuration",
                    json!({"Timeout": 3, "MemorySize": 256, "Runtime": "python3.12"}),
                )
                .with_response("cloudwatch", "get-metric-statistics", json!({"Datapoints": []}))
                .with_response(
                    "logs",
                    "filter-log-events",
                    json!({"events": [{
                        "timestamp": 1700000000000u64,
                        "message": "Task timed out after 3.00 seconds",
                        "logStreamName": "s"
                    }]}),
                )
                .with_response("lambda", "list-versions-by-function", json!({"Versions": []})),
        );
        let llm = Arc::new(MockLlm::new(vec![
            r#"[{"type": "timeout", "description": "low timeout", "confidence": 0.88, "evidence": ["Task timed out after 3.00 seconds"]}]"#,
        ]));
        (backend, llm)
    };
    let request = || InvestigationRequest {
        input: json!({
            "investigation_inputs": {
                "primary_targets": [{"type": "lambda", "name": "payment-processor"}]
            }
        }),
        xray_trace_id: None,
        region: None,
        role_arn: None,
        external_id: None,
    };

    let (backend_a, llm_a) = build();
    let report_a = investigator(backend_a, Some(llm_a)).investigate(request()).await;
    let (backend_b, llm_b) = build();
    let report_b = investigator(backend_b, Some(llm_b)).investigate(request()).await;

    assert_eq!(report_a.facts, report_b.facts);
    assert_eq!(report_a.hypotheses, report_b.hypotheses);
    assert_eq!(
        report_a.root_cause_analysis.as_ref().unwrap().analysis_summary,
        report_b.root_cause_analysis.as_ref().unwrap().analysis_summary
    );
}

#[tokio::test]
async fn credential_failure_fails_the_investigation() {
    let backend = Arc::new(MockBackend::new().with_failure("sts", "assume-role", "AccessDenied"));
    let request = InvestigationRequest::from_payload(&json!({
        "investigation": {"input": "Gateway returning 502"},
        "service_config": {"role_arn": "arn:aws:iam::123456789012:role/investigator", "external_id": "tenant-1"}
    }))
    .unwrap();

    let report = investigator(backend, None).investigate(request).await;

    assert_eq!(report.status, InvestigationStatus::Failed);
    let response = report.to_response();
    assert_eq!(response["success"], false);
    assert_eq!(response["severity"]["severity"], "low");
}
