use base64::Engine;
use opentelemetry::global::{self, BoxedSpan};
use opentelemetry::sdk::{trace as sdktrace, Resource};
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, warn};

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);
static EXPORTER_SETUPS: AtomicU64 = AtomicU64::new(0);

/// Observability backend inferred from the OTLP endpoint and credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    BasicAuth,
    Xray,
    Generic,
}

fn detect_backend(endpoint: &str, public_key: Option<&str>, secret_key: Option<&str>) -> Backend {
    let endpoint_lower = endpoint.to_lowercase();
    if public_key.is_some() && secret_key.is_some() && endpoint_lower.contains("langfuse") {
        return Backend::BasicAuth;
    }
    if endpoint_lower.contains("xray") {
        return Backend::Xray;
    }
    Backend::Generic
}

/// Set up the OTLP trace exporter from the environment.
///
/// Idempotent: only the first call per process performs the exporter setup.
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is unset the setup is skipped entirely
/// and a later call may still initialize.
pub fn init_telemetry() {
    if TELEMETRY_INITIALIZED.load(Ordering::SeqCst) {
        tracing::debug!("telemetry already initialized, skipping duplicate setup");
        return;
    }

    let Ok(endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, skipping telemetry setup");
        return;
    };
    let service_name = env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "cloudpilot".to_string());

    let public_key = env::var("LANGFUSE_PUBLIC_KEY").ok();
    let secret_key = env::var("LANGFUSE_SECRET_KEY").ok();

    let mut headers: HashMap<String, String> = HashMap::new();
    match detect_backend(&endpoint, public_key.as_deref(), secret_key.as_deref()) {
        Backend::BasicAuth => {
            let credentials = format!(
                "{}:{}",
                public_key.unwrap_or_default(),
                secret_key.unwrap_or_default()
            );
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
        Backend::Xray => {}
        Backend::Generic => {
            // Generic backends take custom headers as "key1=value1,key2=value2".
            if let Ok(raw) = env::var("OTEL_EXPORTER_OTLP_HEADERS") {
                for pair in raw.split(',') {
                    if let Some((key, value)) = pair.split_once('=') {
                        headers.insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
            }
        }
    }

    let mut exporter = opentelemetry_otlp::new_exporter().http().with_endpoint(&endpoint);
    if !headers.is_empty() {
        exporter = exporter.with_headers(headers);
    }

    let result = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.clone()),
        ])))
        .install_batch(opentelemetry::runtime::Tokio);

    match result {
        Ok(_) => {
            EXPORTER_SETUPS.fetch_add(1, Ordering::SeqCst);
            TELEMETRY_INITIALIZED.store(true, Ordering::SeqCst);
            info!("telemetry configured: {} -> {}", service_name, endpoint);
        }
        Err(e) => {
            warn!("failed to set up telemetry: {e}");
        }
    }
}

/// Whether the exporter has been set up in this process.
pub fn telemetry_initialized() -> bool {
    TELEMETRY_INITIALIZED.load(Ordering::SeqCst)
}

/// Allow re-initialization. Test use only.
pub fn reset_telemetry_initialization() {
    TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
}

fn exporter_setups() -> u64 {
    EXPORTER_SETUPS.load(Ordering::SeqCst)
}

/// Span covering a single investigation, with input/output recorded both as
/// span attributes (for trace UIs) and as span events (for standards
/// compliance).
pub struct InvestigationSpan {
    span: BoxedSpan,
}

impl InvestigationSpan {
    pub fn start(
        investigation_id: &str,
        region: &str,
        investigation_type: &str,
        role_arn: Option<&str>,
        external_id: Option<&str>,
    ) -> Self {
        let tracer = global::tracer("cloudpilot");
        let span = tracer
            .span_builder("cloudpilot.investigation")
            .with_attributes(vec![
                KeyValue::new("investigation.id", investigation_id.to_string()),
                KeyValue::new("investigation.region", region.to_string()),
                KeyValue::new("investigation.type", investigation_type.to_string()),
                KeyValue::new(
                    "investigation.assume_role_arn",
                    role_arn.unwrap_or("").to_string(),
                ),
                KeyValue::new(
                    "investigation.external_id",
                    external_id.unwrap_or("").to_string(),
                ),
            ])
            .start(&tracer);
        Self { span }
    }

    pub fn record_input(&mut self, input: &serde_json::Value) {
        let data = input.to_string();
        self.span
            .set_attribute(KeyValue::new("investigation.input", data.clone()));
        self.span
            .add_event("investigation.input", vec![KeyValue::new("data", data)]);
    }

    pub fn record_output(&mut self, output: &serde_json::Value, status: &str) {
        let data = output.to_string();
        self.span
            .set_attribute(KeyValue::new("investigation.output", data.clone()));
        self.span
            .add_event("investigation.output", vec![KeyValue::new("data", data)]);
        self.span
            .set_attribute(KeyValue::new("output.status", status.to_string()));
    }

    pub fn record_error(&mut self, error_type: &str, message: &str) {
        self.span.set_attribute(KeyValue::new("error", true));
        self.span
            .set_attribute(KeyValue::new("error.type", error_type.to_string()));
        self.span
            .set_attribute(KeyValue::new("error.message", message.to_string()));
        self.span.set_status(Status::error(message.to_string()));
    }

    pub fn end(mut self) {
        self.span.end();
    }
}
