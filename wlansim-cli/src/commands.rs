use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use wlansim_config::WlansimConfig;
use wlansim_manager::{Manager, SimController};
use wlansim_telemetry::metrics::MetricsRecorder;
use wlansim_traffic::memory_wire_pair;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a population and join it against the simulated controller
    Join(JoinArgs),
    /// Load and validate a configuration file
    CheckConfig(CheckConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct JoinArgs {
    /// Configuration file; defaults apply if not provided.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// APs to create (overrides the config value)
    #[arg(long)]
    pub aps: Option<usize>,
    /// Clients per AP (overrides the config value)
    #[arg(long)]
    pub clients_per_ap: Option<usize>,
    /// Concurrent joins across the population
    #[arg(long)]
    pub max_concurrent: Option<usize>,
    /// Give clients static addresses instead of DHCP
    #[arg(long, default_value_t = false)]
    pub static_ips: bool,
    /// Print gathered metrics on exit
    #[arg(long, default_value_t = false)]
    pub print_metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    pub config: PathBuf,
}

fn load_config(path: &Option<PathBuf>) -> Result<WlansimConfig, wlansim_config::ConfigError> {
    match path {
        Some(path) => WlansimConfig::load_from_path(path),
        None => WlansimConfig::load(),
    }
}

pub fn run_join(
    args: JoinArgs,
    metrics: MetricsRecorder,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config(&args.config)?;
    let num_aps = args.aps.unwrap_or(config.population.num_aps);
    let clients_per_ap = args.clients_per_ap.unwrap_or(config.population.clients_per_ap);
    let max_concurrent = args.max_concurrent.unwrap_or(config.population.max_concurrent);

    let (near, far) = memory_wire_pair();
    let stop = Arc::new(AtomicBool::new(false));
    let controller_stop = Arc::clone(&stop);
    let controller = thread::Builder::new()
        .name("controller".into())
        .spawn(move || {
            let mut controller = SimController::new(far);
            while !controller_stop.load(Ordering::Acquire) {
                if !controller.poll() {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })?;

    let mut manager = Manager::new(0, near, &config, metrics.clone())?;
    manager.create_aps(num_aps)?;
    let ap_report = manager
        .join_aps(max_concurrent, true)?
        .unwrap_or_default();
    info!(
        succeeded = ap_report.succeeded,
        failed = ap_report.failed,
        "ap join finished"
    );

    let num_clients = num_aps * clients_per_ap;
    if num_clients > 0 {
        manager.create_clients(num_clients, args.static_ips)?;
        let client_report = manager
            .join_clients(max_concurrent, true)?
            .unwrap_or_default();
        info!(
            succeeded = client_report.succeeded,
            failed = client_report.failed,
            "client join finished"
        );
    }

    manager.stop()?;
    stop.store(true, Ordering::Release);
    let _ = controller.join();

    if args.print_metrics {
        println!("{}", metrics.gather_metrics()?);
    }
    Ok(())
}

pub fn check_config(
    args: CheckConfigArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = WlansimConfig::load_from_path(&args.config)?;
    println!(
        "ok: {} port(s), {} worker(s), {} ap(s), {} client(s)/ap",
        config.traffic.ports.len(),
        config.traffic.num_workers,
        config.population.num_aps,
        config.population.clients_per_ap,
    );
    Ok(())
}
