//! Process wiring for the `hubscaled` subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Notify, watch};
use tracing::{error, info, warn};

use hubscale_arm::{ArmEndpoints, ClientSecretCredential};
use hubscale_autoscale::{CycleOutcome, DecisionEngine, EngineSettings};
use hubscale_core::HubScaleConfig;
use hubscale_orchestrator::{
    Clock, DurableHost, INSTANCE_ID, Launcher, ORCHESTRATOR_NAME, OrchestrationHost, Orchestrator,
    SystemClock,
};
use hubscale_state::StateStore;

const DB_FILE: &str = "hubscale.redb";

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)
        .with_context(|| format!("open checkpoint store {}", db_path.display()))?;
    info!(path = ?db_path, "checkpoint store opened");
    Ok(store)
}

fn build_engine(config: &HubScaleConfig) -> anyhow::Result<DecisionEngine> {
    let credential = ClientSecretCredential::new(&config.credentials, ArmEndpoints::default())?;
    Ok(DecisionEngine::new(
        EngineSettings::from(config),
        Arc::new(credential),
    ))
}

/// Run the launcher and the orchestrator until Ctrl-C.
pub async fn run(config_path: &Path, data_dir: PathBuf) -> anyhow::Result<()> {
    let config = HubScaleConfig::from_file(config_path)?;
    info!(
        hub = %config.resource.name,
        resource_group = %config.resource.resource_group,
        job_frequency_minutes = config.job_frequency_minutes,
        threshold_percent = config.threshold_percent,
        "hubscale daemon starting"
    );

    let store = open_store(&data_dir)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let wake = Arc::new(Notify::new());

    let host: Arc<dyn OrchestrationHost> =
        Arc::new(DurableHost::new(store.clone(), clock.clone(), wake.clone()));
    let launcher = Launcher::new(host, ORCHESTRATOR_NAME, INSTANCE_ID);

    let engine = build_engine(&config)?;
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(engine),
        clock,
        config.job_frequency(),
        INSTANCE_ID,
        wake,
    );

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let launcher_interval = config.launcher_interval();
    let launcher_shutdown = shutdown_rx.clone();
    let launcher_handle = tokio::spawn(async move {
        launcher.run(launcher_interval, launcher_shutdown).await;
    });
    let orchestrator_handle = tokio::spawn(async move {
        orchestrator.run(shutdown_rx).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C, shutting down");
    } else {
        info!("shutdown signal received");
    }
    let _ = shutdown_tx.send(true);

    let _ = launcher_handle.await;
    let _ = orchestrator_handle.await;

    info!("hubscale daemon stopped");
    Ok(())
}

pub fn print_status(data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    match store.get_checkpoint(INSTANCE_ID)? {
        Some(cp) => println!("{}", serde_json::to_string_pretty(&cp)?),
        None => println!("{}", serde_json::json!({ "instance_id": INSTANCE_ID, "status": "not_found" })),
    }
    Ok(())
}

pub fn terminate(data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    if store.terminate(INSTANCE_ID, SystemClock.now_ms())? {
        info!(instance_id = INSTANCE_ID, "instance terminated");
    } else {
        warn!(instance_id = INSTANCE_ID, "no running instance to terminate");
    }
    Ok(())
}

/// One decision cycle, without touching the checkpoint store.
pub async fn evaluate_once(config_path: &Path) -> anyhow::Result<()> {
    let config = HubScaleConfig::from_file(config_path)?;
    let engine = build_engine(&config)?;
    match engine.run_cycle().await? {
        CycleOutcome::BelowThreshold {
            utilization,
            threshold,
        } => println!("no change: utilization {utilization} below threshold {threshold}"),
        CycleOutcome::Scaled { tier, from, to, .. } => {
            println!("scaled {tier} from {from} to {to} units")
        }
    }
    Ok(())
}
