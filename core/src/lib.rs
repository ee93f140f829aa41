//! Servo command core
//!
//! Translates position requests for a fixed bank of servo channels into the
//! dense mask + position pair a hardware backend applies in one call, and
//! provides the wire codec the service speaks.

pub mod codec;
pub mod error;
pub mod mask;
pub mod operation;
pub mod protocol;
pub mod translator;

use std::collections::HashMap;

pub use error::{ExecutorError, ServoError};
pub use mask::ChannelMaskTable;
pub use operation::{Device, Operation, Parameter, ServoCommand};
pub use protocol::{ErrorKind, Reply, Request, MAX_CHANNELS};
pub use translator::{CommandTranslator, ServoExecutor};

/// Index of a servo channel
pub type ChannelId = usize;

/// Target or reported servo position
pub type Position = i32;

/// Sparse channel → target position request
pub type SparseUpdate = HashMap<ChannelId, Position>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Fake bank that keeps positions between calls
    struct FakeBank {
        positions: Mutex<Vec<Position>>,
    }

    impl ServoExecutor for FakeBank {
        fn apply_and_report(
            &self,
            mask: &[bool],
            positions: &[Position],
        ) -> Result<Vec<Position>, ExecutorError> {
            let mut current = self.positions.lock().unwrap();
            for (i, _) in mask.iter().enumerate().filter(|&(_, &set)| set) {
                current[i] = positions[i];
            }
            Ok(current.clone())
        }
    }

    #[test]
    fn test_writes_survive_between_calls() {
        let masks = Arc::new(ChannelMaskTable::new(4));
        let bank = FakeBank {
            positions: Mutex::new(vec![500; 4]),
        };
        let translator = CommandTranslator::new(masks, bank);

        translator.set_position(0, 100).unwrap();
        translator
            .set_positions(&SparseUpdate::from([(2, 300)]))
            .unwrap();
        translator.set_positions_flat(&[3, 400]).unwrap();

        // Channel 1 was never written; the zero in its position slot is masked off
        assert_eq!(translator.get_positions().unwrap(), vec![100, 500, 300, 400]);
    }
}
