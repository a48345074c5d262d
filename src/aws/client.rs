use crate::aws::backend::{BackendError, ServiceBackend, ServiceCall};
use crate::config;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("credential acquisition failed: {0}")]
    Credentials(String),
}

/// Temporary credentials from a role-assumption handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<String>,
}

/// Per-investigation cloud client.
///
/// Holds the region and, when a role ARN was supplied, the temporary
/// credentials from the assume-role handshake. All service handles vended by
/// [`CloudClient::service`] share the same credentials; the region is
/// immutable for the client lifetime.
pub struct CloudClient {
    region: String,
    backend: Arc<dyn ServiceBackend>,
    credentials: Option<Credentials>,
    role_arn: Option<String>,
}

impl CloudClient {
    /// Construct the client, performing the role-assumption handshake when a
    /// role ARN is supplied. Credential failure is fatal to the
    /// investigation and is surfaced to the caller.
    pub async fn connect(
        backend: Arc<dyn ServiceBackend>,
        region: &str,
        role_arn: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<Self, ClientError> {
        let credentials = match role_arn {
            Some(role_arn) => Some(assume_role(backend.as_ref(), region, role_arn, external_id).await?),
            None => None,
        };

        if let Some(role_arn) = role_arn {
            info!("assumed role {role_arn} for investigation");
        }

        Ok(Self {
            region: region.to_string(),
            backend,
            credentials,
            role_arn: role_arn.map(|s| s.to_string()),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    /// Vend a handle for one service. Handles are cheap and share the
    /// client's credentials.
    pub fn service<'a>(&'a self, name: &'a str) -> ServiceHandle<'a> {
        ServiceHandle {
            client: self,
            service: name,
        }
    }
}

/// Call handle for one service, enforcing the per-call I/O timeout.
pub struct ServiceHandle<'a> {
    client: &'a CloudClient,
    service: &'a str,
}

impl ServiceHandle<'_> {
    pub async fn call(&self, operation: &str, params: Value) -> Result<Value, BackendError> {
        let timeout = config::tool_timeout();
        let call = ServiceCall {
            service: self.service,
            operation,
            params,
            region: &self.client.region,
            credentials: self.client.credentials.as_ref(),
        };
        tokio::time::timeout(timeout, self.client.backend.invoke(call))
            .await
            .map_err(|_| BackendError::Timeout(timeout.as_secs()))?
    }
}

async fn assume_role(
    backend: &dyn ServiceBackend,
    region: &str,
    role_arn: &str,
    external_id: Option<&str>,
) -> Result<Credentials, ClientError> {
    let session_name = format!("cloudpilot-{}", uuid::Uuid::new_v4().simple());
    let mut params = json!({
        "RoleArn": role_arn,
        "RoleSessionName": session_name,
    });
    if let Some(external_id) = external_id {
        params["ExternalId"] = Value::String(external_id.to_string());
    }

    let call = ServiceCall {
        service: "sts",
        operation: "assume-role",
        params,
        region,
        credentials: None,
    };
    let response = backend
        .invoke(call)
        .await
        .map_err(|e| ClientError::Credentials(e.to_string()))?;

    let creds = response
        .get("Credentials")
        .ok_or_else(|| ClientError::Credentials("assume-role response missing Credentials".to_string()))?;

    let field = |key: &str| -> Result<String, ClientError> {
        creds
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| ClientError::Credentials(format!("assume-role response missing {key}")))
    };

    Ok(Credentials {
        access_key_id: field("AccessKeyId")?,
        secret_access_key: field("SecretAccessKey")?,
        session_token: creds
            .get("SessionToken")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        expiration: creds
            .get("Expiration")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedSts {
        response: Value,
    }

    #[async_trait]
    impl ServiceBackend for ScriptedSts {
        async fn invoke(&self, call: ServiceCall<'_>) -> Result<Value, BackendError> {
            assert_eq!(call.service, "sts");
            assert_eq!(call.operation, "assume-role");
            if self.response.get("deny").is_some() {
                return Err(BackendError::Call("AccessDenied".to_string()));
            }
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn connect_without_role_needs_no_handshake() {
        let backend = Arc::new(ScriptedSts {
            response: json!({"deny": true}),
        });
        let client = CloudClient::connect(backend, "eu-west-1", None, None)
            .await
            .unwrap();
        assert_eq!(client.region(), "eu-west-1");
        assert!(client.role_arn().is_none());
    }

    #[tokio::test]
    async fn connect_assumes_role_and_caches_credentials() {
        let backend = Arc::new(ScriptedSts {
            response: json!({
                "Credentials": {
                    "AccessKeyId": "AKIA123",
                    "SecretAccessKey": "secret",
                    "SessionToken": "token",
                    "Expiration": "2026-01-01T00:00:00Z"
                }
            }),
        });
        let client = CloudClient::connect(
            backend,
            "eu-west-1",
            Some("arn:aws:iam::123456789012:role/investigator"),
            Some("tenant-42"),
        )
        .await
        .unwrap();
        assert_eq!(
            client.credentials.as_ref().unwrap().access_key_id,
            "AKIA123"
        );
    }

    #[tokio::test]
    async fn credential_failure_is_fatal() {
        let backend = Arc::new(ScriptedSts {
            response: json!({"deny": true}),
        });
        let result = CloudClient::connect(
            backend,
            "eu-west-1",
            Some("arn:aws:iam::123456789012:role/investigator"),
            None,
        )
        .await;
        assert!(matches!(result, Err(ClientError::Credentials(_))));
    }
}
