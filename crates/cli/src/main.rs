// Taskgrid CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Engine runs on its own threads; tokio is only used to
// race the run against Ctrl-C.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use taskgrid_engine::telemetry::{init_tracing, TelemetryConfig};

#[derive(Parser)]
#[command(name = "taskgrid")]
#[command(about = "Taskgrid CLI - Run batches of tasks on a worker pool")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Suppress the progress bar and per-task warnings
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sum-of-squares demo application
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut telemetry = TelemetryConfig::from_env();
    if telemetry.log_filter.is_none() {
        // Keep the progress bar readable unless asked otherwise
        telemetry = telemetry.with_log_filter("warn");
    }
    init_tracing(telemetry);

    match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.output, cli.quiet).await,
    }
}
