//! CameraFleet supervisor.
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
//! Ingests RTSP video from a fleet of IP cameras and periodically emits
//! time-lapse MP4 artifacts. See `FleetSupervisor` for the entry point.

#[macro_use]
extern crate log;

pub mod av;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use config::AppConfig;
pub use error::AppError;
pub use model::{CameraConfig, CameraStatus};
pub use registry::WorkerRegistry;
pub use shutdown::ShutdownSignal;
pub use store::{CameraStore, StaticCameraStore};
pub use supervisor::FleetSupervisor;
