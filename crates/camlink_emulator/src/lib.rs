//! # camlink emulator
//!
//! A reference camera that speaks the camlink property protocol.
//!
//! This crate provides:
//! - HTTP resources (`/system`, `/video/autoExposure`,
//!   `/video/whiteBalance/doAuto`)
//! - The event WebSocket (`listProperties`, `subscribe`, `setProperty`)
//! - Hooks to drive the device from tests (sensor readings, control
//!   changes, dropping every client)
//!
//! # Architecture
//!
//! One [`Device`] holds the property values. Every change is merged into it
//! and broadcast to all connected clients as a `propertyValueChanged` event.
//! Requests on the WebSocket get direct replies from the [`RequestHandler`]:
//! the property list for `listProperties`, and one change event per name for
//! `subscribe`.
//!
//! ```rust,ignore
//! use camlink_emulator::{Emulator, EmulatorConfig};
//!
//! let handle = Emulator::new(EmulatorConfig::ephemeral()).start().await?;
//! println!("camera at {}", handle.base_url());
//! handle.device().simulate_sensor(6.0, 2000, 5600)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod device;
mod error;
mod handler;
mod server;

pub use config::EmulatorConfig;
pub use device::Device;
pub use error::{EmulatorError, EmulatorResult};
pub use handler::RequestHandler;
pub use server::{Emulator, EmulatorHandle};
