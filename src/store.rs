//! The persistent camera store, as seen from the core.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Out of scope per `spec.md` §1: the SQL schema and its queries. This is
//! only the narrow interface the core's startup path calls into
//! (`spec.md` §6, "Persistent store. Supplies `enumerate_all_cameras()`").

use async_trait::async_trait;

use crate::error::AppError;
use crate::model::CameraConfig;

/// The core's view of the persistent camera store.
#[async_trait]
pub trait CameraStore: Send + Sync {
    /// Returns every persisted camera, in arbitrary order. Failures are
    /// returned as errors per `spec.md` §6.
    async fn enumerate_all_cameras(&self) -> Result<Vec<CameraConfig>, AppError>;
}

/// A fixed in-memory `CameraStore`, useful for tests and for the demo
/// binary. The real implementation (SQLite or similar) is out of scope.
pub struct StaticCameraStore {
    cameras: Vec<CameraConfig>,
}

impl StaticCameraStore {
    pub fn new(cameras: Vec<CameraConfig>) -> Self {
        Self { cameras }
    }
}

#[async_trait]
impl CameraStore for StaticCameraStore {
    async fn enumerate_all_cameras(&self) -> Result<Vec<CameraConfig>, AppError> {
        Ok(self.cameras.clone())
    }
}
