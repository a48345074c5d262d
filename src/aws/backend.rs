use crate::aws::client::Credentials;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

/// Errors surfaced by the service transport.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("service call failed: {0}")]
    Call(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("call timed out after {0} seconds")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One cloud-SDK call: service, operation and API-shaped parameters.
#[derive(Debug, Clone)]
pub struct ServiceCall<'a> {
    pub service: &'a str,
    /// CLI-style operation name, e.g. `get-function-configuration`.
    pub operation: &'a str,
    pub params: Value,
    pub region: &'a str,
    pub credentials: Option<&'a Credentials>,
}

/// Transport boundary for all cloud-SDK calls.
///
/// Implementations must be safe for concurrent use; every tool call goes
/// through this single seam, so tests can swap in a scripted backend.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn invoke(&self, call: ServiceCall<'_>) -> Result<Value, BackendError>;
}

/// Production transport driving the AWS CLI as a subprocess.
///
/// The CLI handles request signing and pagination defaults; parameters are
/// passed via `--cli-input-json` so operation inputs keep their API shape.
pub struct AwsCliBackend {
    cli_path: String,
}

impl AwsCliBackend {
    pub fn new() -> Self {
        Self {
            cli_path: "aws".to_string(),
        }
    }

    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }
}

impl Default for AwsCliBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceBackend for AwsCliBackend {
    async fn invoke(&self, call: ServiceCall<'_>) -> Result<Value, BackendError> {
        let input = call.params.to_string();

        let mut command = Command::new(&self.cli_path);
        command
            .arg("--region")
            .arg(call.region)
            .arg("--output")
            .arg("json")
            .arg(call.service)
            .arg(call.operation);
        if call.params.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            command.arg("--cli-input-json").arg(&input);
        }

        // Assumed-role credentials are scoped to the investigation and passed
        // to the child process only.
        if let Some(credentials) = call.credentials {
            command
                .env("AWS_ACCESS_KEY_ID", &credentials.access_key_id)
                .env("AWS_SECRET_ACCESS_KEY", &credentials.secret_access_key);
            if let Some(token) = &credentials.session_token {
                command.env("AWS_SESSION_TOKEN", token);
            }
        }

        tracing::debug!(
            service = call.service,
            operation = call.operation,
            "invoking cloud backend"
        );

        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::NotConfigured(format!("failed to launch aws cli: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Call(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&stdout)
            .map_err(|e| BackendError::InvalidResponse(format!("non-JSON CLI output: {e}")))
    }
}
