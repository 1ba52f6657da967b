//! Process-wide configuration and fixed constants.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! `AppConfig` is constructed by the excluded CLI-parsing / config-file
//! layer and handed to the supervisor at startup; the core never parses
//! flags or config files itself (see `spec.md` §1, "Explicitly out of
//! scope"). It derives `serde::Deserialize` purely so that an external
//! loader (e.g. a `serde_yaml2` or `toml` file, as `camera_hub` does for
//! `cameras.yaml`) can produce one.

use serde::{Deserialize, Serialize};

/// Number of packets that make up one snapshot MP4.
pub const SNAPSHOT_FRAME_LEN: u64 = 48;

/// `strftime`-equivalent layout for a session directory name.
pub const SESSION_DIR_FORMAT: &str = "%Y%m%d%H%M%S";

/// Default total time-lapse session length, in seconds, used when a
/// `CameraConfig` does not specify one explicitly.
pub const DEFAULT_TIMELAPSE_SEC: u64 = 3600;

/// Capacity of the supervisor's inbound configuration-change event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 50_000;

/// Directory mode applied to `<root>/<camera-name>/` on creation.
pub const CAMERA_CREATION_DIR_MODE: u32 = 0o744;

/// Process-wide application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filesystem root under which every camera's snapshot/time-lapse tree
    /// is rooted (`<root>/<camera-name>/...`).
    pub video_root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_root: "video".to_string(),
        }
    }
}
