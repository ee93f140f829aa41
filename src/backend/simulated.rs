//! In-memory servo bank for development and tests

use servo_core::{ExecutorError, Position, ServoExecutor};
use std::sync::Mutex;
use tracing::trace;

/// A servo bank that moves instantly to every commanded position
pub struct SimulatedServos {
    positions: Mutex<Vec<Position>>,
}

impl SimulatedServos {
    /// Create a bank of `channel_count` servos resting at `initial`
    pub fn new(channel_count: usize, initial: Position) -> Self {
        Self {
            positions: Mutex::new(vec![initial; channel_count]),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Position>> {
        // A panic mid-update leaves plain integers behind, still usable
        self.positions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ServoExecutor for SimulatedServos {
    fn apply_and_report(
        &self,
        mask: &[bool],
        positions: &[Position],
    ) -> Result<Vec<Position>, ExecutorError> {
        let mut current = self.lock();
        if mask.len() != current.len() || positions.len() != current.len() {
            return Err(ExecutorError::Protocol(format!(
                "command for {} channels sent to a {}-channel bank",
                mask.len(),
                current.len()
            )));
        }

        for (channel, (&set, &target)) in mask.iter().zip(positions).enumerate() {
            if set {
                trace!("Simulated servo {} -> {}", channel, target);
                current[channel] = target;
            }
        }

        Ok(current.clone())
    }
}
