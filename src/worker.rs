//! `CameraWorker`: the per-camera capture state machine.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Grounded on `camera_hub::ip::ip_camera::IpCamera`'s session/frame-queue
//! pattern, adapted to `spec.md` §4.2's narrower per-snapshot session model
//! (one native input/output pair opened and closed per snapshot tick,
//! instead of one long-lived RTSP session feeding a frame queue).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::av::{self, FormatHint, ReadOutcome};
use crate::config::{AppConfig, SESSION_DIR_FORMAT, SNAPSHOT_FRAME_LEN};
use crate::error::AppError;
use crate::model::CameraConfig;

/// The fields a running session actually needs, snapshotted out of
/// `CameraConfig` at `init`/`update` time.
#[derive(Clone)]
struct AppliedConfig {
    host: String,
    port: String,
    username: Option<String>,
    password: Option<String>,
    session_length_s: u64,
    interval_s: u64,
}

impl AppliedConfig {
    fn from_camera_config(config: &CameraConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            session_length_s: config.session_length_s,
            interval_s: config.interval_s.min(config.session_length_s).max(1),
        }
    }

    fn rtsp_url(&self) -> String {
        crate::model::build_rtsp_url(
            &self.host,
            &self.port,
            self.username.as_deref(),
            self.password.as_deref(),
        )
    }
}

/// Reader-writer-locked worker state: the applied configuration (read by
/// the capture loop and snapshot builder every tick) and a staged update
/// (written by `update()`, adopted atomically at the next session reset).
struct WorkerState {
    applied: AppliedConfig,
    pending: Option<AppliedConfig>,
}

/// The transient per-worker state covering one full time-lapse cycle
/// (`spec.md` §3, `CaptureSession`).
struct CaptureSession {
    camera_dir: PathBuf,
    session_start: chrono::DateTime<Local>,
    snapshot_index: u64,
    elapsed_s: u64,
    frames_produced: u64,
    frame_budget: u64,
    interval_s: u64,
}

impl CaptureSession {
    fn new(camera_dir: PathBuf, applied: &AppliedConfig) -> Self {
        let frame_budget = (applied.session_length_s / applied.interval_s) * SNAPSHOT_FRAME_LEN;
        Self {
            camera_dir,
            session_start: Local::now(),
            snapshot_index: 0,
            elapsed_s: 0,
            frames_produced: 0,
            frame_budget,
            interval_s: applied.interval_s,
        }
    }

    fn session_dir(&self) -> PathBuf {
        self.camera_dir
            .join(self.session_start.format(SESSION_DIR_FORMAT).to_string())
    }
}

/// The per-camera long-lived capture worker (`spec.md` §4.2).
pub struct CameraWorker {
    name: String,
    app_config: StdMutex<Option<AppConfig>>,
    state: RwLock<Option<WorkerState>>,
    cancel_tx: StdMutex<Option<oneshot::Sender<()>>>,
    task: StdMutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl CameraWorker {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            app_config: StdMutex::new(None),
            state: RwLock::new(None),
            cancel_tx: StdMutex::new(None),
            task: StdMutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn camera_dir(&self, app_config: &AppConfig) -> PathBuf {
        Path::new(&app_config.video_root).join(&self.name)
    }

    /// One-time preparation (`spec.md` §4.2). Creates `<root>/<camera>/` if
    /// absent. Returns an error only on I/O failure.
    pub async fn init(&self, config: &CameraConfig, app_config: &AppConfig) -> Result<(), AppError> {
        let dir = self.camera_dir(app_config);
        ensure_dir(&dir).await?;

        *self.state.write().await = Some(WorkerState {
            applied: AppliedConfig::from_camera_config(config),
            pending: None,
        });
        *self.app_config.lock().unwrap() = Some(app_config.clone());

        info!("worker {}: initialized (root={})", self.name, dir.display());
        Ok(())
    }

    /// Starts the capture task. Non-blocking; the task runs until cancelled.
    pub fn run(self: &std::sync::Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("worker {}: run() called while already running", self.name);
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.cancel_tx.lock().unwrap() = Some(cancel_tx);

        let worker = self.clone();
        let handle = tokio::spawn(async move {
            worker.capture_loop(cancel_rx).await;
        });
        *self.task.lock().unwrap() = Some(handle);

        info!("worker {}: started", self.name);
    }

    /// Delivered while running; new values are staged and take effect no
    /// later than the next session boundary (`spec.md` §4.2, §9 Open
    /// Questions — resolved as option (a)).
    pub async fn update(&self, new_config: &CameraConfig) {
        let mut guard = self.state.write().await;
        if let Some(state) = guard.as_mut() {
            state.pending = Some(AppliedConfig::from_camera_config(new_config));
            info!("worker {}: update staged for next session boundary", self.name);
        }
    }

    /// Cooperative cancellation. Returns once the signal has been accepted,
    /// not after full teardown.
    pub fn stop(&self) -> Result<(), AppError> {
        match self.cancel_tx.lock().unwrap().take() {
            Some(tx) => {
                let _ = tx.send(());
                info!("worker {}: stop signalled", self.name);
                Ok(())
            }
            None => {
                // Never started, or already stopped: nothing to signal.
                Ok(())
            }
        }
    }

    async fn current_applied(&self) -> AppliedConfig {
        self.state
            .read()
            .await
            .as_ref()
            .expect("worker state initialized before capture_loop runs")
            .applied
            .clone()
    }

    /// Adopts any staged update into `applied` and returns a fresh session.
    async fn reset_session(&self, camera_dir: &Path) -> CaptureSession {
        let mut guard = self.state.write().await;
        let state = guard
            .as_mut()
            .expect("worker state initialized before capture_loop runs");
        if let Some(pending) = state.pending.take() {
            state.applied = pending;
        }
        CaptureSession::new(camera_dir.to_path_buf(), &state.applied)
    }

    async fn capture_loop(self: std::sync::Arc<Self>, mut cancel_rx: oneshot::Receiver<()>) {
        let app_config = self
            .app_config
            .lock()
            .unwrap()
            .clone()
            .expect("init() called before run()");
        let camera_dir = self.camera_dir(&app_config);

        let mut session = {
            let applied = self.current_applied().await;
            CaptureSession::new(camera_dir.clone(), &applied)
        };

        loop {
            if matches!(
                cancel_rx.try_recv(),
                Ok(()) | Err(oneshot::error::TryRecvError::Closed)
            ) {
                break;
            }

            if session.frames_produced >= session.frame_budget {
                self.spawn_timelapse_assembly(session.session_dir());
                session = self.reset_session(&camera_dir).await;
                continue;
            }

            if session.elapsed_s >= session.interval_s {
                let applied = self.current_applied().await;
                let candidate_index = session.snapshot_index + 1;
                if self.take_snapshot(&session, &applied, candidate_index).await {
                    session.snapshot_index = candidate_index;
                    session.frames_produced += SNAPSHOT_FRAME_LEN;
                }
                session.elapsed_s = 0;
            }

            let default_sleep = session.interval_s.min(1).max(1);
            tokio::time::sleep(Duration::from_secs(default_sleep)).await;
            session.elapsed_s += default_sleep;
        }

        info!("worker {}: terminated", self.name);
    }

    /// Produces one snapshot MP4 at `index` (`spec.md` §4.2, "Snapshot
    /// production"). Returns `true` only once the session directory and both
    /// native contexts opened successfully and the snapshot was actually
    /// attempted; the caller only advances `snapshot_index`/`frames_produced`
    /// on `true`. Any failure is logged and reported as `false` so the
    /// counters stay put and the next tick retries at the same index
    /// (`spec.md` §4.2 Failure Semantics: "log, return from the current
    /// snapshot tick without changing counters"; §8: "indices are dense from
    /// 1").
    async fn take_snapshot(&self, session: &CaptureSession, applied: &AppliedConfig, index: u64) -> bool {
        let session_dir = session.session_dir();
        if let Err(e) = ensure_dir(&session_dir).await {
            error!(
                "worker {}: could not create session dir {}: {e}",
                self.name,
                session_dir.display()
            );
            return false;
        }

        let url = applied.rtsp_url();
        let input = match av::open_input(FormatHint::Rtsp, url).await {
            Ok(i) => i,
            Err(e) => {
                error!("worker {}: open_input failed: {e}", self.name);
                return false;
            }
        };

        let out_path = session_dir
            .join(format!("{index}.mp4"))
            .to_string_lossy()
            .into_owned();
        let output = match av::open_output(out_path, &input).await {
            Ok(o) => o,
            Err(e) => {
                error!("worker {}: open_output failed: {e}", self.name);
                av::close_input(&input).await;
                return false;
            }
        };

        let mut dispatched: u64 = 0;
        while dispatched < SNAPSHOT_FRAME_LEN {
            match av::read_packet(&input).await {
                ReadOutcome::End => break,
                ReadOutcome::Empty => continue,
                ReadOutcome::Packet(pkt) => {
                    dispatched += 1;
                    // Acquired synchronously, before the writer activity is
                    // spawned: a concurrent close_output must never observe
                    // an idle gate while this write is merely queued to run.
                    let guard = output.enter_write();
                    let input = input.clone();
                    let output = output.clone();
                    let name = self.name.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = av::write_packet(&input, &output, pkt).await {
                            error!("worker {name}: write_packet failed: {e}");
                        }
                    });
                }
            }
        }

        // Detached close-output: waits for outstanding writers, off the
        // main capture loop, so the next tick isn't blocked on it.
        let output_for_close = output.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            if let Err(e) = av::close_output(&output_for_close).await {
                error!("worker {name}: close_output failed: {e}");
            }
        });

        av::close_input(&input).await;

        info!(
            "worker {}: snapshot {} written to {}",
            self.name,
            index,
            session_dir.display()
        );
        true
    }

    /// Triggers time-lapse assembly for a finished session, off the main
    /// capture thread so the next session may start immediately
    /// (`spec.md` §4.2, "Time-lapse assembly").
    fn spawn_timelapse_assembly(&self, session_dir: PathBuf) {
        let name = self.name.clone();
        tokio::spawn(async move {
            if let Err(e) = assemble_timelapse(&session_dir).await {
                error!("worker {name}: time-lapse assembly failed for {}: {e}", session_dir.display());
            }
        });
    }
}

/// Lists `session_dir`, concatenates every snapshot it finds into
/// `timeLapse/timeLapse.mp4`, and unlinks the snapshots afterward.
async fn assemble_timelapse(session_dir: &Path) -> Result<(), AppError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(session_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("mp4") {
            let modified = entry.metadata().await?.modified()?;
            entries.push((path, modified));
        }
    }

    if entries.is_empty() {
        info!(
            "time-lapse assembly: no snapshots found in {}",
            session_dir.display()
        );
        return Ok(());
    }

    entries.sort_by_key(|(_, modified)| *modified);

    let timelapse_dir = session_dir.join("timeLapse");
    ensure_dir(&timelapse_dir).await?;

    let list_path = session_dir.join("timelapseList.txt");
    let mut descriptor = String::new();
    for (path, _) in &entries {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        descriptor.push_str(&format!("file '{basename}'\n"));
    }
    tokio::fs::write(&list_path, descriptor).await?;

    let input = av::open_input(FormatHint::Concat, list_path.to_string_lossy().into_owned()).await?;
    let output_path = timelapse_dir.join("timeLapse.mp4");
    let output = av::open_output(output_path.to_string_lossy().into_owned(), &input).await?;

    loop {
        match av::read_packet(&input).await {
            ReadOutcome::End => break,
            ReadOutcome::Empty => continue,
            ReadOutcome::Packet(pkt) => {
                if let Err(e) = av::write_packet(&input, &output, pkt).await {
                    error!("time-lapse assembly: write error, continuing: {e}");
                }
            }
        }
    }

    av::close_output(&output).await?;
    av::close_input(&input).await;

    for (path, _) in &entries {
        if let Err(e) = tokio::fs::remove_file(path).await {
            error!("time-lapse assembly: failed to unlink {}: {e}", path.display());
        }
    }

    info!(
        "time-lapse assembly: wrote {}",
        output_path.display()
    );
    Ok(())
}

/// Creates `dir` (and any missing parents) if it does not already exist.
/// Tolerates operator deletion between ticks (`spec.md` §4.2, "stat-then-
/// mkdir each tick").
async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if tokio::fs::metadata(dir).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    set_dir_mode(dir).await;
    Ok(())
}

#[cfg(unix)]
async fn set_dir_mode(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(crate::config::CAMERA_CREATION_DIR_MODE);
    let _ = tokio::fs::set_permissions(dir, perms).await;
}

#[cfg(not(unix))]
async fn set_dir_mode(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CameraStatus;

    fn config() -> CameraConfig {
        CameraConfig {
            name: "cam1".into(),
            host: "10.0.0.1".into(),
            port: "554".into(),
            username: None,
            password: None,
            description: None,
            protocol: "rtsp".into(),
            status: CameraStatus::Streaming,
            session_length_s: 120,
            interval_s: 60,
        }
    }

    #[test]
    fn frame_budget_math() {
        let applied = AppliedConfig::from_camera_config(&config());
        let session = CaptureSession::new(PathBuf::from("/tmp"), &applied);
        assert_eq!(session.frame_budget, (120 / 60) * SNAPSHOT_FRAME_LEN);
        assert_eq!(session.frame_budget, 2 * SNAPSHOT_FRAME_LEN);
    }

    #[test]
    fn interval_equal_to_session_length_yields_one_snapshot() {
        let mut c = config();
        c.session_length_s = 120;
        c.interval_s = 120;
        let applied = AppliedConfig::from_camera_config(&c);
        let session = CaptureSession::new(PathBuf::from("/tmp"), &applied);
        assert_eq!(session.frame_budget, SNAPSHOT_FRAME_LEN);
    }

    #[test]
    fn interval_greater_than_session_length_is_clamped() {
        let mut c = config();
        c.session_length_s = 120;
        c.interval_s = 999;
        let applied = AppliedConfig::from_camera_config(&c);
        assert_eq!(applied.interval_s, 120);
    }

    #[tokio::test]
    async fn init_creates_camera_directory() {
        let tmp = tempdir();
        let app_config = AppConfig {
            video_root: tmp.to_string_lossy().into_owned(),
        };
        let worker = CameraWorker::new("cam1".to_string());
        worker.init(&config(), &app_config).await.unwrap();
        assert!(tokio::fs::metadata(tmp.join("cam1")).await.is_ok());
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn stop_before_run_is_a_noop() {
        let worker = CameraWorker::new("cam1".to_string());
        assert!(worker.stop().is_ok());
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "camera-fleet-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir
    }
}
