use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cloudpilot")]
#[command(about = "AI-assisted root cause analysis for AWS infrastructure incidents")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP investigation service
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bind port
        #[arg(short, long, default_value_t = 8080, env = "PORT")]
        port: u16,
    },

    /// Run a single investigation and print the report
    Investigate {
        /// Free-text incident description
        input: String,

        /// Distributed trace id to analyze
        #[arg(long)]
        trace_id: Option<String>,

        /// Region override
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,

        /// Role to assume for the investigation
        #[arg(long)]
        role_arn: Option<String>,

        /// External id for the role-assumption handshake
        #[arg(long)]
        external_id: Option<String>,
    },

    /// Show tool information
    Info,
}
