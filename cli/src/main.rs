//! netroute simulator
//!
//! Wires the dispatcher, the delayer and a resource manager to a simulated
//! backend, submits a batch of API queries and file downloads, and reports
//! what happened.

mod simulation;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use netroute_core::core::config::{self, Config};
use netroute_core::system::metrics;
use netroute_core::{log_info, log_warn, ResourceMode};

use crate::simulation::SimulationParams;

fn cli() -> Command {
    Command::new("netroute")
        .version(netroute_core::VERSION)
        .about("Query routing and resource scheduling simulator")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("queries")
                .short('q')
                .long("queries")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("200")
                .help("API queries to submit"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("4")
                .help("Concurrent download workers"),
        )
        .arg(
            Arg::new("dcs")
                .long("dcs")
                .value_name("N")
                .value_parser(clap::value_parser!(i32).range(1..=16))
                .default_value("5")
                .help("Datacenters in the simulated backend"),
        )
        .arg(
            Arg::new("session-count")
                .long("session-count")
                .value_name("N")
                .value_parser(clap::value_parser!(i32))
                .help("Override network.session_count"),
        )
        .arg(
            Arg::new("use-pfs")
                .long("use-pfs")
                .action(ArgAction::SetTrue)
                .help("Require perfect-forward-secrecy sessions"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_parser(["baseline", "greedy"])
                .help("Override resources.mode"),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .value_name("BYTES")
                .value_parser(clap::value_parser!(i64))
                .help("Override resources.max_resource_limit"),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .action(ArgAction::SetTrue)
                .help("Print Prometheus metrics on exit"),
        )
}

fn apply_overrides(config: &mut Config, matches: &clap::ArgMatches) {
    if let Some(&count) = matches.get_one::<i32>("session-count") {
        config.network.session_count = count;
    }
    if matches.get_flag("use-pfs") {
        config.network.use_pfs = true;
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.resources.mode = match mode.as_str() {
            "baseline" => ResourceMode::Baseline,
            _ => ResourceMode::Greedy,
        };
    }
    if let Some(&budget) = matches.get_one::<i64>("budget") {
        config.resources.max_resource_limit = budget;
    }
    if matches.get_flag("metrics") {
        config.metrics.enable_prometheus = true;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = config::load_config_or_default(config_path);
    apply_overrides(&mut config, &matches);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate().context("invalid configuration")?;
    metrics::init_registry();

    let params = SimulationParams {
        queries: matches.get_one::<usize>("queries").copied().unwrap_or(200),
        workers: matches.get_one::<usize>("workers").copied().unwrap_or(4),
        dc_count: matches.get_one::<i32>("dcs").copied().unwrap_or(5),
    };
    log_info!("Starting netroute simulation: {:?}", params);

    let report = tokio::select! {
        report = simulation::run(&config, params) => Some(report?),
        _ = signal::ctrl_c() => {
            log_warn!("Received shutdown signal");
            None
        }
    };

    if let Some(report) = report {
        println!("{}", report);
    }
    if config.metrics.enable_prometheus {
        println!("{}", metrics::collect_metrics());
    }
    log_info!("Shutdown complete");
    Ok(())
}
