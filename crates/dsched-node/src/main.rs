//! Long-lived scheduler process: resolves layered configuration, assembles
//! the Resource Store / Persistent-Cache Store / Evaluator / Scheduler /
//! Replica Planner graph, and runs the supervised GC sweeper until a
//! shutdown signal arrives (§9, §10.3, §10.6). The announce transport that
//! would feed [`dsched_scheduler::Scheduler::schedule`] is out of scope
//! (§1 Non-goals) and is not wired up here.

use clap::Parser;
use dsched_node::config::NodeConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dsched-node", about = "P2P content-distribution scheduler node")]
struct Cli {
    /// Optional TOML or YAML config file, applied over the compiled-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match NodeConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config file {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();

    init_logging(&config.log_level);
    log::info!(
        "starting dsched-node, cluster={}",
        config.scheduler_cluster_id
    );

    let node = match dsched_node::build_node(&config) {
        Ok(n) => n,
        Err(e) => {
            log::error!("failed to assemble node components: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let gc_handle = dsched_node::gc::spawn_gc_sweeper(
        node.persistent_cache.clone(),
        config.gc_sweep_interval(),
        shutdown_rx,
    );

    log::info!("dsched-node ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
    }
    log::info!("shutdown requested, stopping gc sweeper");
    let _ = shutdown_tx.send(true);
    let _ = gc_handle.await;
}
