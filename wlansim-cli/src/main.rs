//! ## wlansim-cli
//! Simulator entrypoint: builds an AP/client population and joins it
//! against a simulated controller.

use clap::Parser;
use wlansim_telemetry::logging::EventLogger;
use wlansim_telemetry::metrics::MetricsRecorder;

mod commands;

use commands::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    EventLogger::init();
    let metrics = MetricsRecorder::new();
    let cli = Cli::parse();

    match cli.command {
        Commands::Join(join_args) => commands::run_join(join_args, metrics),
        Commands::CheckConfig(check_args) => commands::check_config(check_args),
    }
}
