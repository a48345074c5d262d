pub mod config;
pub mod service;

pub use config::{LlmConfig, Phase};
pub use service::{LlmError, OpenAiLlm};

use async_trait::async_trait;

/// Stateless completion interface used by the reasoning phases.
///
/// The model is never given tools; it receives a closed prompt and is
/// expected to return JSON, which the caller extracts and validates.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

/// Extract a JSON object from a model response.
///
/// Two passes: a fenced code block (```json or ```), then a brace-balancing
/// scan from the first `{` to its matching close.
pub fn extract_json_object(response: &str) -> Option<String> {
    if let Some(block) = fenced_block(response) {
        if block.trim_start().starts_with('{') {
            return Some(block);
        }
    }
    balanced_scan(response, '{', '}')
}

/// Extract a JSON array from a model response. Same passes as
/// [`extract_json_object`] but anchored on `[`.
pub fn extract_json_array(response: &str) -> Option<String> {
    if let Some(block) = fenced_block(response) {
        if block.trim_start().starts_with('[') {
            return Some(block);
        }
    }
    balanced_scan(response, '[', ']')
}

fn fenced_block(response: &str) -> Option<String> {
    let start = if let Some(idx) = response.find("```json") {
        idx + "```json".len()
    } else if let Some(idx) = response.find("```") {
        idx + "```".len()
    } else {
        return None;
    };
    let rest = &response[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Scan from the first `open` to its matching `close`, tracking string
/// literals and escapes so brackets inside strings do not confuse the count.
fn balanced_scan(response: &str, open: char, close: char) -> Option<String> {
    let start = response.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in response[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
