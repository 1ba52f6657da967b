//! The authoritative map from camera name to worker handle.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Per `spec.md` §4.3: the registry only owns the mapping. It never starts
//! or stops workers itself — the supervisor is the only caller of
//! `init`/`run`/`update`/`stop` on a handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::model::CameraConfig;
use crate::worker::CameraWorker;

/// The supervisor-visible facade for one running worker.
///
/// `spec.md` §3 describes `WorkerHandle` as a thin facade exclusively owned
/// by the registry; here that facade *is* `Arc<CameraWorker>` — the worker
/// struct already exposes exactly the `init`/`run`/`update`/`stop` surface
/// the supervisor is allowed to call.
pub type WorkerHandle = Arc<CameraWorker>;

/// The process-wide camera-name -> worker-handle map.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing handle for `config.name`, or constructs and
    /// inserts a fresh, un-initialized one. The `bool` is `true` iff a new
    /// handle was created.
    pub fn get_or_create(&self, config: &CameraConfig) -> Result<(WorkerHandle, bool), AppError> {
        if config.name.trim().is_empty() {
            return Err(AppError::InvalidInput("camera name must not be empty".into()));
        }

        let mut workers = self.workers.lock().unwrap();
        if let Some(existing) = workers.get(&config.name) {
            return Ok((existing.clone(), false));
        }

        if !config.is_rtsp() {
            return Err(AppError::InvalidInput(format!(
                "unsupported protocol: {}",
                config.protocol
            )));
        }

        let worker = Arc::new(CameraWorker::new(config.name.clone()));
        workers.insert(config.name.clone(), worker.clone());
        Ok((worker, true))
    }

    /// Returns the handle for `name`, if one is currently registered.
    pub fn get(&self, name: &str) -> Option<WorkerHandle> {
        self.workers.lock().unwrap().get(name).cloned()
    }

    /// Removes the entry for `name` if present; a no-op otherwise.
    pub fn remove(&self, name: &str) {
        self.workers.lock().unwrap().remove(name);
    }

    /// `true` if a handle for `name` currently exists. Test/diagnostic use.
    pub fn contains(&self, name: &str) -> bool {
        self.workers.lock().unwrap().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates every handle in arbitrary order, holding the lock for the
    /// scope of the iteration. `f` must not call back into the registry.
    pub fn for_each<F: FnMut(&WorkerHandle)>(&self, mut f: F) {
        let workers = self.workers.lock().unwrap();
        for handle in workers.values() {
            f(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CameraStatus;

    fn config(name: &str) -> CameraConfig {
        CameraConfig {
            name: name.to_string(),
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
    fn get_or_create_creates_once() {
        let registry = WorkerRegistry::new();
        let (h1, created1) = registry.get_or_create(&config("cam1")).unwrap();
        assert!(created1);
        let (h2, created2) = registry.get_or_create(&config("cam1")).unwrap();
        assert!(!created2);
        assert!(Arc::ptr_eq(&h1, &h2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_or_create_rejects_empty_name() {
        let registry = WorkerRegistry::new();
        let err = registry.get_or_create(&config("")).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn get_or_create_rejects_unknown_protocol() {
        let registry = WorkerRegistry::new();
        let mut cfg = config("cam1");
        cfg.protocol = "onvif".into();
        let err = registry.get_or_create(&cfg).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn remove_is_noop_for_unknown_name() {
        let registry = WorkerRegistry::new();
        registry.remove("does-not-exist");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_drops_entry() {
        let registry = WorkerRegistry::new();
        registry.get_or_create(&config("cam1")).unwrap();
        registry.remove("cam1");
        assert!(!registry.contains("cam1"));
    }
}
