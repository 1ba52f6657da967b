//! `FleetSupervisor`: the single dispatcher task that owns camera-worker
//! lifecycle decisions.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Grounded on `spec.md` §4.4 and the channel/`select!`-driven dispatch loop
//! in `server/src/main.rs`'s SSE handlers (`select!` racing a channel
//! receive against a shutdown future). The open question in `spec.md` §9
//! ("non-blocking poll... a blocking receive with a select-on-shutdown is
//! the more disciplined choice") is resolved here in favor of the
//! disciplined choice: `run` blocks on `tokio::select!` between the event
//! channel and the shutdown signal instead of spinning.

use tokio::sync::mpsc;

use crate::config::{AppConfig, EVENT_CHANNEL_CAPACITY};
use crate::error::AppError;
use crate::model::{CameraConfig, CameraStatus};
use crate::registry::WorkerRegistry;
use crate::shutdown::ShutdownSignal;
use crate::store::CameraStore;

/// The single dispatcher owning the fleet's event channel and registry
/// (`spec.md` §4.4).
pub struct FleetSupervisor {
    registry: WorkerRegistry,
    tx: mpsc::Sender<CameraConfig>,
    rx: tokio::sync::Mutex<mpsc::Receiver<CameraConfig>>,
}

impl FleetSupervisor {
    /// Creates a supervisor with an empty registry and a fresh event
    /// channel of capacity `EVENT_CHANNEL_CAPACITY`.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: WorkerRegistry::new(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Exposes the registry for diagnostics/tests. Callers other than the
    /// supervisor must not invoke `init`/`run`/`update`/`stop` on any handle
    /// obtained this way (`spec.md` §4.4 invariant).
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Enqueues `config` for dispatch. Blocks the caller once the channel's
    /// 50,000-entry buffer is full (`spec.md` §6, "Overflow behaviour is
    /// producer-blocking").
    pub async fn post(&self, config: CameraConfig) {
        if self.tx.send(config).await.is_err() {
            error!("fleet supervisor: event channel closed, dropping post");
        }
    }

    /// Non-blocking variant for callers (e.g. synchronous HTTP handlers)
    /// that cannot await; fails only if the channel is at capacity or
    /// closed.
    pub fn try_post(&self, config: CameraConfig) -> Result<(), AppError> {
        self.tx
            .try_send(config)
            .map_err(|e| AppError::InvalidInput(format!("event channel unavailable: {e}")))
    }

    /// One-time boot: enumerates every persisted camera whose status is
    /// `streaming`, constructs and initializes a worker for each, and calls
    /// `run` on it (`spec.md` §4.4). On any single camera's init error, the
    /// handle is removed and the remaining cameras are still attempted.
    pub async fn startup(
        &self,
        store: &dyn CameraStore,
        app_config: &AppConfig,
    ) -> Result<(), AppError> {
        let cameras = store.enumerate_all_cameras().await?;
        for config in cameras {
            if !matches!(config.status, CameraStatus::Streaming) {
                continue;
            }

            let (handle, _created) = match self.registry.get_or_create(&config) {
                Ok(pair) => pair,
                Err(e) => {
                    error!(
                        "fleet supervisor startup: could not register {}: {e}",
                        config.name
                    );
                    continue;
                }
            };

            if let Err(e) = handle.init(&config, app_config).await {
                error!(
                    "fleet supervisor startup: init failed for {}: {e}",
                    config.name
                );
                self.registry.remove(&config.name);
                continue;
            }

            handle.run();
            info!("fleet supervisor startup: started {}", config.name);
        }

        Ok(())
    }

    /// The dispatcher task. Loops applying one event per iteration until
    /// `shutdown` fires, at which point every worker is stopped and the
    /// loop returns.
    pub async fn run(&self, app_config: &AppConfig, mut shutdown: ShutdownSignal) {
        let mut rx = self.rx.lock().await;
        loop {
            if shutdown.is_shutting_down() {
                self.stop_all();
                return;
            }

            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    self.stop_all();
                    return;
                }
                event = rx.recv() => {
                    match event {
                        Some(config) => self.dispatch(config, app_config).await,
                        None => {
                            warn!("fleet supervisor: event channel closed, shutting down");
                            self.stop_all();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch logic for one event (`spec.md` §4.4).
    async fn dispatch(&self, config: CameraConfig, app_config: &AppConfig) {
        let name = config.name.clone();

        let (handle, created) = match self.registry.get_or_create(&config) {
            Ok(pair) => pair,
            Err(e) => {
                error!("fleet supervisor: rejecting event for {name}: {e}");
                return;
            }
        };

        if !created {
            if !matches!(config.status, CameraStatus::Streaming) {
                if let Err(e) = handle.stop() {
                    error!("fleet supervisor: stop failed for {name}: {e}");
                }
                if matches!(config.status, CameraStatus::Deleted) {
                    self.registry.remove(&name);
                    info!("fleet supervisor: removed {name}");
                }
            } else {
                handle.update(&config).await;
            }
            return;
        }

        if let Err(e) = handle.init(&config, app_config).await {
            error!("fleet supervisor: init failed for {name}: {e}");
            self.registry.remove(&name);
            return;
        }

        if !matches!(config.status, CameraStatus::Streaming) {
            info!("fleet supervisor: registered {name} idle (status != streaming)");
            return;
        }

        handle.run();
        info!("fleet supervisor: started {name}");
    }

    /// Iterates the registry; for each handle, calls `stop` and removes the
    /// entry on success; logs and leaves the entry on failure (`spec.md`
    /// §4.4).
    pub fn stop_all(&self) {
        let mut names = Vec::new();
        self.registry.for_each(|handle| names.push(handle.name().to_string()));

        for name in names {
            let Some(handle) = self.registry.get(&name) else {
                continue;
            };
            match handle.stop() {
                Ok(()) => self.registry.remove(&name),
                Err(e) => error!("fleet supervisor: stop failed for {name}: {e}"),
            }
        }
    }
}

impl Default for FleetSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticCameraStore;
    use std::sync::Arc;

    fn config(name: &str, status: CameraStatus) -> CameraConfig {
        CameraConfig {
            name: name.to_string(),
            host: "10.0.0.1".into(),
            port: "554".into(),
            username: None,
            password: None,
            description: None,
            protocol: "rtsp".into(),
            status,
            session_length_s: 120,
            interval_s: 60,
        }
    }

    fn tempdir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "camera-fleet-supervisor-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir
    }

    #[tokio::test]
    async fn duplicate_streaming_posts_produce_one_worker() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let supervisor = FleetSupervisor::new();

        supervisor
            .dispatch(config("cam1", CameraStatus::Streaming), &app_config)
            .await;
        supervisor
            .dispatch(config("cam1", CameraStatus::Streaming), &app_config)
            .await;

        assert_eq!(supervisor.registry().len(), 1);
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn off_then_streaming_keeps_one_worker_registered() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let supervisor = FleetSupervisor::new();

        supervisor
            .dispatch(config("cam1", CameraStatus::Streaming), &app_config)
            .await;
        supervisor
            .dispatch(config("cam1", CameraStatus::Off), &app_config)
            .await;
        supervisor
            .dispatch(config("cam1", CameraStatus::Streaming), &app_config)
            .await;

        assert_eq!(supervisor.registry().len(), 1);
        assert!(supervisor.registry().contains("cam1"));
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn delete_unknown_name_is_a_noop() {
        let app_config = AppConfig::default();
        let supervisor = FleetSupervisor::new();

        supervisor
            .dispatch(config("ghost", CameraStatus::Deleted), &app_config)
            .await;

        assert_eq!(supervisor.registry().len(), 0);
    }

    #[tokio::test]
    async fn delete_removes_handle() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let supervisor = FleetSupervisor::new();

        supervisor
            .dispatch(config("cam1", CameraStatus::Streaming), &app_config)
            .await;
        supervisor
            .dispatch(config("cam1", CameraStatus::Deleted), &app_config)
            .await;

        assert!(!supervisor.registry().contains("cam1"));
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn invalid_config_leaves_registry_unchanged() {
        let app_config = AppConfig::default();
        let supervisor = FleetSupervisor::new();

        supervisor
            .dispatch(config("", CameraStatus::Streaming), &app_config)
            .await;

        assert_eq!(supervisor.registry().len(), 0);
    }

    #[tokio::test]
    async fn startup_recovers_streaming_cameras() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let store = StaticCameraStore::new(vec![
            config("cam1", CameraStatus::Streaming),
            config("cam2", CameraStatus::Streaming),
            config("cam3", CameraStatus::Off),
        ]);
        let supervisor = FleetSupervisor::new();

        supervisor.startup(&store, &app_config).await.unwrap();

        assert_eq!(supervisor.registry().len(), 3);
        assert!(supervisor.registry().contains("cam1"));
        assert!(supervisor.registry().contains("cam2"));
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn post_then_run_until_shutdown_dispatches_queued_event() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let supervisor = Arc::new(FleetSupervisor::new());
        let (shutdown_handle, shutdown_signal) = crate::shutdown::channel();

        supervisor
            .post(config("cam1", CameraStatus::Streaming))
            .await;

        let sup = supervisor.clone();
        let app_config_clone = app_config.clone();
        let run_task = tokio::spawn(async move {
            sup.run(&app_config_clone, shutdown_signal).await;
        });

        // Give the dispatcher a moment to drain the queued event, then shut
        // down; `run` should observe both and return.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown_handle.trigger();
        run_task.await.unwrap();

        assert!(supervisor.registry().contains("cam1"));
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }
}
