use serde::{Deserialize, Serialize};
use std::env;

/// Reasoning phases with dedicated model/temperature overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parser,
    Hypothesis,
    RootCause,
    Severity,
}

impl Phase {
    fn env_infix(&self) -> &'static str {
        match self {
            Phase::Parser => "PARSER",
            Phase::Hypothesis => "HYPOTHESIS",
            Phase::RootCause => "ROOT_CAUSE",
            Phase::Severity => "SEVERITY",
        }
    }
}

/// Per-phase model settings resolved from the global configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Configuration for the LLM service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI API key
    pub api_key: String,

    /// Model to use (e.g., "gpt-4-turbo-preview", "gpt-3.5-turbo")
    pub model: String,

    /// Optional API base URL for custom endpoints
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for creativity (0.0-1.0)
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4-turbo-preview".to_string(),
            api_base: None,
            timeout_secs: 60,
            max_tokens: 1500,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        let _ = dotenv::dotenv();

        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY not found in environment. Please set it in .env file or environment variables.".to_string())?;

        if api_key.is_empty() {
            return Err("OPENAI_API_KEY is empty".to_string());
        }

        let mut config = Self {
            api_key,
            ..Default::default()
        };

        if let Ok(model) = env::var("OPENAI_MODEL") {
            config.model = model;
        }

        if let Ok(api_base) = env::var("OPENAI_API_BASE") {
            config.api_base = Some(api_base);
        }

        if let Ok(timeout) = env::var("LLM_REQUEST_TIMEOUT") {
            if let Ok(timeout_secs) = timeout.parse::<u64>() {
                config.timeout_secs = timeout_secs;
            }
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse::<u32>() {
                config.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse::<f32>() {
                if (0.0..=1.0).contains(&temp) {
                    config.temperature = temp;
                }
            }
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("API key is empty".to_string());
        }

        if self.temperature < 0.0 || self.temperature > 1.0 {
            return Err(format!(
                "Temperature must be between 0.0 and 1.0, got {}",
                self.temperature
            ));
        }

        if self.max_tokens == 0 {
            return Err("Max tokens must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolve the model settings for one reasoning phase.
    ///
    /// Precedence: `LLM_<PHASE>_MODEL` / `LLM_<PHASE>_TEMPERATURE` over the
    /// global values. The parser phase is forced to a tight token cap
    /// (temperature 0.1, 256 tokens) unless explicitly overridden.
    pub fn for_phase(&self, phase: Phase) -> PhaseSettings {
        let infix = phase.env_infix();

        let model = env::var(format!("LLM_{infix}_MODEL")).unwrap_or_else(|_| self.model.clone());

        let default_temperature = match phase {
            Phase::Parser => 0.1,
            _ => self.temperature,
        };
        let temperature = env::var(format!("LLM_{infix}_TEMPERATURE"))
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|t| (0.0..=1.0).contains(t))
            .unwrap_or(default_temperature);

        let max_tokens = match phase {
            Phase::Parser => 256,
            _ => self.max_tokens,
        };

        PhaseSettings {
            model,
            temperature,
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn parser_phase_has_tight_limits() {
        std::env::remove_var("LLM_PARSER_TEMPERATURE");
        std::env::remove_var("LLM_PARSER_MODEL");
        let config = LlmConfig {
            api_key: "k".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            ..Default::default()
        };
        let settings = config.for_phase(Phase::Parser);
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.max_tokens, 256);
    }

    #[test]
    #[serial]
    fn phase_overrides_take_precedence() {
        std::env::set_var("LLM_HYPOTHESIS_TEMPERATURE", "0.05");
        std::env::set_var("LLM_HYPOTHESIS_MODEL", "gpt-4o-mini");
        let config = LlmConfig {
            api_key: "k".to_string(),
            ..Default::default()
        };
        let settings = config.for_phase(Phase::Hypothesis);
        assert_eq!(settings.temperature, 0.05);
        assert_eq!(settings.model, "gpt-4o-mini");
        std::env::remove_var("LLM_HYPOTHESIS_TEMPERATURE");
        std::env::remove_var("LLM_HYPOTHESIS_MODEL");
    }

    #[test]
    fn validation_rejects_bad_temperature() {
        let config = LlmConfig {
            api_key: "k".to_string(),
            temperature: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
