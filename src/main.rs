//! CameraFleet supervisor demo binary.
//!
//! Copyright (C) 2024  Ardalan Amiri Sani
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.
//!
//! Wires the core (`FleetSupervisor` + `WorkerRegistry` + `CameraWorker`)
//! to stand-ins for the excluded collaborators (`spec.md` §1): a fixed
//! in-memory `StaticCameraStore` instead of the real SQL-backed store, and
//! `tokio::signal::ctrl_c` instead of the real process-signal layer. A real
//! deployment would swap both for the excluded HTTP/SQL/signal stack
//! without touching anything under `src/` save `main.rs` itself.

#[macro_use]
extern crate log;

use std::sync::Arc;

use anyhow::Result;
use camera_fleet_supervisor::{AppConfig, CameraConfig, CameraStatus, FleetSupervisor, StaticCameraStore};

fn demo_cameras() -> Vec<CameraConfig> {
    vec![CameraConfig {
        name: "front-door".to_string(),
        host: "192.168.1.50".to_string(),
        port: "554".to_string(),
        username: Some("admin".to_string()),
        password: Some("changeme".to_string()),
        description: Some("front door camera".to_string()),
        protocol: "rtsp".to_string(),
        status: CameraStatus::Streaming,
        session_length_s: 600,
        interval_s: 60,
    }]
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!(
        "{}, version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let app_config = AppConfig::default();
    let store = StaticCameraStore::new(demo_cameras());
    let supervisor = Arc::new(FleetSupervisor::new());
    let (shutdown_handle, shutdown_signal) = camera_fleet_supervisor::shutdown::channel();

    supervisor.startup(&store, &app_config).await?;

    let dispatcher = {
        let supervisor = supervisor.clone();
        let app_config = app_config.clone();
        tokio::spawn(async move {
            supervisor.run(&app_config, shutdown_signal).await;
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown_handle.trigger();
    dispatcher.await?;

    Ok(())
}
