//! Scripted backend and LLM doubles for unit tests.
#![allow(dead_code)]

use crate::aws::{BackendError, CloudClient, ServiceBackend, ServiceCall};
use crate::llm::{Llm, LlmError};
use crate::tools::ToolContext;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Backend double keyed by `(service, operation)`.
#[derive(Default)]
pub struct MockBackend {
    responses: Mutex<HashMap<(String, String), Value>>,
    failures: Mutex<HashMap<(String, String), String>>,
    calls: Mutex<Vec<(String, String, Value)>>,
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

    pub fn calls_to(&self, service: &str, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, o, _)| s == service && o == operation)
            .count()
    }
}

#[async_trait]
impl ServiceBackend for MockBackend {
    async fn invoke(&self, call: ServiceCall<'_>) -> Result<Value, BackendError> {
        let key = (call.service.to_string(), call.operation.to_string());
        self.calls
            .lock()
            .unwrap()
            .push((key.0.clone(), key.1.clone(), call.params.clone()));
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

/// Build a tool context over a mock backend without a role handshake.
pub async fn tool_context(backend: Arc<MockBackend>) -> ToolContext {
    let client = CloudClient::connect(backend, "eu-west-1", None, None)
        .await
        .expect("no handshake without role");
    ToolContext::new(Arc::new(client))
}

/// LLM double that replays canned responses in order, then repeats the last.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn complete(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(LlmError::Api("scripted failure".to_string()));
        }
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => Err(LlmError::Parse("no scripted response".to_string())),
            1 => Ok(responses[0].clone()),
            _ => Ok(responses.pop().unwrap()),
        }
    }
}
