//! Error taxonomy for the CameraFleet core.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// The seven-member error taxonomy the core distinguishes between.
///
/// Invalid-input and not-found errors are meant to surface synchronously to
/// whatever external collaborator called into the core (the HTTP layer turns
/// them into a client-side error); the rest are logged and swallowed at the
/// point they occur, per the failure semantics in `CameraWorker`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("already present: {0}")]
    AlreadyPresent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("native open failed: {0}")]
    NativeOpenFailed(String),

    #[error("native io failed: {0}")]
    NativeIoFailed(String),

    #[error("filesystem operation failed: {0}")]
    FilesystemFailed(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AppError>;
