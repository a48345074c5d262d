use anyhow::Result;
use clap::Parser;
use cloudpilot::cli::commands::{Cli, Commands};
use cloudpilot::cli::handlers::{handle_investigate_command, handle_serve_command};
use cloudpilot::cli::utils::{init_logging, print_info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, &cli.log_format);

    match cli.command {
        Commands::Serve { host, port } => handle_serve_command(host, port).await,

        Commands::Investigate {
            input,
            trace_id,
            region,
            role_arn,
            external_id,
        } => handle_investigate_command(input, trace_id, region, role_arn, external_id).await,

        Commands::Info => {
            print_info();
            Ok(())
        }
    }
}
