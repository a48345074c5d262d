use std::env;
use std::time::Duration;

/// Fallback region when no environment override is present.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Overall investigation deadline (matches the serverless function limit).
pub const DEFAULT_INVESTIGATION_DEADLINE_SECS: u64 = 900;

/// Inner deadline for the evidence collection fan-out.
pub const DEFAULT_COLLECTOR_DEADLINE_SECS: u64 = 120;

/// Per-tool-call I/O timeout.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 15;

/// Resolve the AWS region: `AWS_REGION`, then `AWS_DEFAULT_REGION`, then the
/// compiled default.
pub fn get_region() -> String {
    env::var("AWS_REGION")
        .or_else(|_| env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| DEFAULT_REGION.to_string())
}

fn duration_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

pub fn investigation_deadline() -> Duration {
    duration_from_env("CLOUDPILOT_DEADLINE_SECS", DEFAULT_INVESTIGATION_DEADLINE_SECS)
}

pub fn collector_deadline() -> Duration {
    duration_from_env(
        "CLOUDPILOT_COLLECTOR_DEADLINE_SECS",
        DEFAULT_COLLECTOR_DEADLINE_SECS,
    )
}

pub fn tool_timeout() -> Duration {
    duration_from_env("CLOUDPILOT_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)
}

/// Whether the optional service-health / audit-trail enrichment runs before
/// the specialists. On by default.
pub fn enrichment_enabled() -> bool {
    match env::var("CLOUDPILOT_ENRICHMENT") {
        Ok(v) => {
            let v = v.to_lowercase();
            !(v == "false" || v == "0" || v == "off")
        }
        Err(_) => true,
    }
}

/// Candidate execution-role names probed when an API gateway integration is
/// suspected of missing permissions. `{api_id}` expands to the API id.
/// Overridable via `CLOUDPILOT_ROLE_PATTERNS` (comma-separated).
pub fn role_name_candidates(api_id: &str) -> Vec<String> {
    let patterns: Vec<String> = match env::var("CLOUDPILOT_ROLE_PATTERNS") {
        Ok(raw) => raw
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Err(_) => vec![
            "{api_id}-role".to_string(),
            "{api_id}-execution-role".to_string(),
            "apigateway-{api_id}-role".to_string(),
            "{api_id}-apigateway-role".to_string(),
        ],
    };
    patterns
        .into_iter()
        .map(|p| p.replace("{api_id}", api_id))
        .collect()
}

/// Map a resource type to the service key used by the health API.
pub fn health_service_key(resource_type: &str) -> Option<&'static str> {
    match resource_type {
        "lambda" => Some("LAMBDA"),
        "apigateway" => Some("APIGATEWAY"),
        "stepfunctions" => Some("STATES"),
        "dynamodb" => Some("DYNAMODB"),
        "s3" => Some("S3"),
        "sqs" => Some("SQS"),
        "sns" => Some("SNS"),
        "eventbridge" => Some("EVENTS"),
        "vpc" => Some("EC2"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn region_falls_back_to_default() {
        std::env::remove_var("AWS_REGION");
        std::env::remove_var("AWS_DEFAULT_REGION");
        assert_eq!(get_region(), DEFAULT_REGION);

        std::env::set_var("AWS_DEFAULT_REGION", "us-east-2");
        assert_eq!(get_region(), "us-east-2");

        std::env::set_var("AWS_REGION", "eu-central-1");
        assert_eq!(get_region(), "eu-central-1");

        std::env::remove_var("AWS_REGION");
        std::env::remove_var("AWS_DEFAULT_REGION");
    }

    #[test]
    #[serial]
    fn enrichment_flag_parses() {
        std::env::remove_var("CLOUDPILOT_ENRICHMENT");
        assert!(enrichment_enabled());
        std::env::set_var("CLOUDPILOT_ENRICHMENT", "false");
        assert!(!enrichment_enabled());
        std::env::set_var("CLOUDPILOT_ENRICHMENT", "1");
        assert!(enrichment_enabled());
        std::env::remove_var("CLOUDPILOT_ENRICHMENT");
    }

    #[test]
    #[serial]
    fn role_candidates_expand_api_id() {
        std::env::remove_var("CLOUDPILOT_ROLE_PATTERNS");
        let candidates = role_name_candidates("abc123defg");
        assert!(candidates.contains(&"abc123defg-role".to_string()));
        assert!(candidates.contains(&"apigateway-abc123defg-role".to_string()));
    }

    #[test]
    fn health_keys_cover_known_services() {
        assert_eq!(health_service_key("stepfunctions"), Some("STATES"));
        assert_eq!(health_service_key("vpc"), Some("EC2"));
        assert_eq!(health_service_key("unknown"), None);
    }
}
