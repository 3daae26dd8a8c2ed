//! courierd - local courier backend daemon
//!
//! Opens the record store, seeds it, then runs maintenance until interrupted:
//! expired chat snapshots are pruned on an interval and every committed
//! change is logged.

use std::sync::Arc;

use courier_backend::{seed, Backend, BackendConfig};
use courier_core::time;
use courier_store::RocksStore;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courier=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting courier backend");

    // Load configuration from environment
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./courier-data".to_string());
    let mut config = BackendConfig::default();
    if let Ok(interval) = std::env::var("PRUNE_INTERVAL_SECONDS") {
        config.prune_interval_seconds = interval.parse()?;
    }

    // Initialize store; nothing works without it
    let store = match RocksStore::open(&data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(data_dir = %data_dir, error = %e, "storage unavailable");
            return Err(e.into());
        }
    };
    tracing::info!(data_dir = %data_dir, "Initialized RocksDB store");

    let backend = Backend::new(store, config);
    seed::run(&backend)?;

    let mut changes = backend.changes().receiver();
    let mut prune_timer = tokio::time::interval(backend.config().prune_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(
        prune_interval_seconds = backend.config().prune_interval_seconds,
        "courierd running"
    );

    loop {
        tokio::select! {
            _ = prune_timer.tick() => {
                let worker = backend.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    worker.snapshots().prune_expired(time::now_millis())
                })
                .await?;

                match outcome {
                    Ok(report) => {
                        for (snapshot_id, error) in &report.failed {
                            tracing::warn!(%snapshot_id, %error, "snapshot left for next pass");
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "storage lost, shutting down");
                        return Err(e.into());
                    }
                    Err(e) => tracing::warn!(error = %e, "snapshot pruning failed"),
                }
            }
            change = changes.recv() => match change {
                Ok(change) => tracing::debug!(
                    collection = %change.collection,
                    key = %change.key,
                    parent = ?change.parent,
                    "change committed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change log lagging");
                }
                Err(RecvError::Closed) => break,
            },
            result = &mut shutdown => {
                result?;
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
