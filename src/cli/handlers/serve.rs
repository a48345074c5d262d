use crate::orchestrator::Investigator;
use crate::server::{self, AppState};
use crate::telemetry;
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

pub async fn handle_serve_command(host: String, port: u16) -> Result<()> {
    telemetry::init_telemetry();

    let investigator = Investigator::from_env();
    println!(
        "{} investigation service on {}:{} (region {})",
        "Starting".green().bold(),
        host,
        port,
        investigator.region()
    );

    let state = Arc::new(AppState { investigator });
    server::serve(state, &host, port).await
}
