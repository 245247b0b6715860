//! Neuraxis control-loop binary
//!
//! Runs the budget-constrained decision loop over a comma-separated action
//! list, training the reinforcement policy first and exporting metrics and
//! cycle snapshots under `artifacts/`.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neuraxis_common::VERSION;
use neuraxis_runtime::{ControlSystem, SystemConfig};

fn parse_actions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Neuraxis v{}", VERSION);

    let config = SystemConfig::load()?;
    info!(seed = config.seed, pool = config.global_resource_pool, "configuration loaded");

    let actions_raw = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NEURAXIS_ACTIONS").ok())
        .unwrap_or_else(|| "move_arm,plan_route,stop".to_string());
    let actions = parse_actions(&actions_raw);

    let epochs: usize = std::env::var("NEURAXIS_TRAIN_EPOCHS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let mut system = ControlSystem::new(config)?;
    system.run_loop(&actions, epochs).await?;

    info!("run complete");
    Ok(())
}
