//! Shared doubles for the end-to-end investigation tests.
#![allow(dead_code)]

use async_trait::async_trait;
use cloudpilot::aws::{BackendError, CloudClient, ServiceBackend, ServiceCall};
use cloudpilot::llm::{Llm, LlmError};
use cloudpilot::tools::ToolContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Backend double keyed by `(service, operation)`.
#[derive(Default)]
pub struct MockBackend {
    responses: Mutex<HashMap<(String, String), Value>>,
    failures: Mutex<HashMap<(String, String), String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, service: &str, operation: &str, response: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((service.to_string(), operation.to_string()), response);
        self
    }

    pub fn with_failure(self, service: &str, operation: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((service.to_string(), operation.to_string()), message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ServiceBackend for MockBackend {
    async fn invoke(&self, call: ServiceCall<'_>) -> Result<Value, BackendError> {
        let key = (call.service.to_string(), call.operation.to_string());
        self.calls.lock().unwrap().push(key.clone());
        if let Some(message) = self.failures.lock().unwrap().get(&key) {
            return Err(BackendError::Call(message.clone()));
        }
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                BackendError::Call(format!("no scripted response for {}/{}", key.0, key.1))
            })
    }
}

#[allow(dead_code)]
pub async fn tool_context(backend: Arc<MockBackend>) -> ToolContext {
    let client = CloudClient::connect(backend, "eu-west-1", None, None)
        .await
        .expect("no handshake without role");
    ToolContext::new(Arc::new(client))
}

/// LLM double that replays canned responses in order, repeating the last.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().rev().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn complete(
        &self,
        _prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => Err(LlmError::Parse("no scripted response".to_string())),
            1 => Ok(responses[0].clone()),
            _ => Ok(responses.pop().unwrap()),
        }
    }
}
