use crate::orchestrator::{InvestigationRequest, Investigator};
use crate::telemetry;
use anyhow::Result;
use colored::Colorize;
use serde_json::{json, Value};

pub async fn handle_investigate_command(
    input: String,
    trace_id: Option<String>,
    region: Option<String>,
    role_arn: Option<String>,
    external_id: Option<String>,
) -> Result<()> {
    telemetry::init_telemetry();

    let investigator = Investigator::from_env();
    let request = InvestigationRequest {
        input: Value::String(input),
        xray_trace_id: trace_id,
        region,
        role_arn,
        external_id,
    };

    eprintln!("{} investigation...", "Running".green().bold());
    let report = investigator.investigate(request).await;

    let status = json!(report.status);
    eprintln!(
        "{} with status {} in {:.2}s",
        "Finished".green().bold(),
        status.as_str().unwrap_or("unknown"),
        report.duration_seconds
    );

    println!("{}", serde_json::to_string_pretty(&report.to_response())?);
    Ok(())
}
