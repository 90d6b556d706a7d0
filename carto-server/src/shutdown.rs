//! Process signals: SIGTERM/SIGINT stop the server, SIGHUP reloads liveness
//! settings.

use crate::config::{ConfigError, ConfigLoader};
use carto_core::config::{ConfigStore, LivenessConfig};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Resolves on the first SIGTERM or SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let name = tokio::select! {
        name = next_signal(SignalKind::terminate(), "SIGTERM") => name,
        name = next_signal(SignalKind::interrupt(), "SIGINT") => name,
    };
    tracing::info!("Received {}, initiating graceful shutdown", name);
}

/// Waits for one delivery of `kind`. Never resolves if the handler cannot be
/// installed.
async fn next_signal(kind: SignalKind, name: &'static str) -> &'static str {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to install {} handler: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
    name
}

/// Re-read the configuration and publish its liveness section.
///
/// Sessions opened after this call use the new timing; open sessions keep
/// the values they started with.
pub fn reload_liveness(
    store: &ConfigStore<LivenessConfig>,
    loader: &ConfigLoader,
) -> Result<LivenessConfig, ConfigError> {
    let liveness = loader.reload()?.liveness;
    store.update(liveness);
    Ok(liveness)
}

/// Spawns a task that reloads liveness settings on every SIGHUP until
/// `shutdown` flips to `true`.
pub fn spawn_config_reload_handler(
    liveness: ConfigStore<LivenessConfig>,
    config_loader: Arc<ConfigLoader>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to install SIGHUP handler, reload disabled: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match reload_liveness(&liveness, &config_loader) {
                        Ok(reloaded) => tracing::info!(
                            write_wait = ?reloaded.write_wait,
                            pong_wait = ?reloaded.pong_wait,
                            version = liveness.version(),
                            "Liveness settings reloaded"
                        ),
                        Err(e) => tracing::error!("Failed to reload configuration: {}", e),
                    }
                }
                _ = shutdown.wait_for(|stopping| *stopping) => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    })
}
