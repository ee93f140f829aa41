//! Hardware backends implementing the servo execution hook

mod serial;
mod simulated;

pub use serial::SerialServos;
pub use simulated::SimulatedServos;

use crate::config::{BackendKind, ServiceConfig};
use anyhow::{Context, Result};
use servo_core::ServoExecutor;
use std::sync::Arc;

/// Rest position of every simulated servo
pub const SIMULATED_REST_POSITION: i32 = 0;

/// Open the backend selected by the configuration
pub fn open(config: &ServiceConfig) -> Result<Arc<dyn ServoExecutor>> {
    let backend: Arc<dyn ServoExecutor> = match config.backend {
        BackendKind::Simulated => Arc::new(SimulatedServos::new(
            config.channel_count,
            SIMULATED_REST_POSITION,
        )),
        BackendKind::Serial => Arc::new(
            SerialServos::open(&config.serial, config.channel_count)
                .context("failed to open serial servo controller")?,
        ),
    };
    Ok(backend)
}
