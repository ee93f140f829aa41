//! Command translator
//!
//! Turns every supported request shape into exactly one dense
//! `(mask, positions)` pair of channel-count length and hands it to the
//! injected [`ServoExecutor`] in a single call.

use std::sync::Arc;

use tracing::debug;

use crate::mask::ChannelMaskTable;
use crate::operation::{Operation, ServoCommand};
use crate::{ChannelId, ExecutorError, Position, ServoError, SparseUpdate};

/// Hardware capability that applies a dense command
///
/// Implementations write `positions[i]` to every channel where `mask[i]` is
/// set, leave the other channels untouched, and report the resulting
/// position of every channel.
pub trait ServoExecutor: Send + Sync {
    fn apply_and_report(
        &self,
        mask: &[bool],
        positions: &[Position],
    ) -> Result<Vec<Position>, ExecutorError>;
}

impl<T: ServoExecutor + ?Sized> ServoExecutor for Arc<T> {
    fn apply_and_report(
        &self,
        mask: &[bool],
        positions: &[Position],
    ) -> Result<Vec<Position>, ExecutorError> {
        (**self).apply_and_report(mask, positions)
    }
}

impl<T: ServoExecutor + ?Sized> ServoExecutor for Box<T> {
    fn apply_and_report(
        &self,
        mask: &[bool],
        positions: &[Position],
    ) -> Result<Vec<Position>, ExecutorError> {
        (**self).apply_and_report(mask, positions)
    }
}

/// Translates servo requests into dense hardware commands
pub struct CommandTranslator<H> {
    masks: Arc<ChannelMaskTable>,
    executor: H,
}

impl<H: ServoExecutor> CommandTranslator<H> {
    /// Create a translator over a shared mask table
    pub fn new(masks: Arc<ChannelMaskTable>, executor: H) -> Self {
        Self { masks, executor }
    }

    /// Number of channels commands are sized to
    pub fn channel_count(&self) -> usize {
        self.masks.channel_count()
    }

    /// The shared mask table
    pub fn masks(&self) -> &Arc<ChannelMaskTable> {
        &self.masks
    }

    /// The injected execution backend
    pub fn executor(&self) -> &H {
        &self.executor
    }

    /// Execute a generic operation
    ///
    /// Only the set-position operation is recognized. Resulting positions are
    /// not returned.
    pub fn execute_operation(&self, operation: &Operation) -> Result<(), ServoError> {
        let command = operation.resolve()?;
        self.execute(command).map(|_| ())
    }

    /// Execute a typed command, returning positions for queries
    pub fn execute(&self, command: ServoCommand) -> Result<Option<Vec<Position>>, ServoError> {
        match command {
            ServoCommand::SetPositions(update) => self.set_positions(&update).map(|_| None),
            ServoCommand::SetPositionsFlat(flat) => self.set_positions_flat(&flat).map(|_| None),
            ServoCommand::SetPosition { id, position } => {
                self.set_position(id, position).map(|_| None)
            }
            ServoCommand::GetPositions => self.get_positions().map(Some),
        }
    }

    /// Apply a sparse channel → position update
    ///
    /// Channels outside the table are dropped without error.
    pub fn set_positions(&self, update: &SparseUpdate) -> Result<(), ServoError> {
        let (mask, positions) = self.densify(update.iter().map(|(&id, &pos)| (id, pos)));
        self.apply(&mask, &positions)?;
        Ok(())
    }

    /// Apply a flat `id, position, id, position, ...` list
    ///
    /// An empty list is a no-op. An odd-length list is rejected before any
    /// hardware call. Ids outside the table (including negative ids) are
    /// dropped, and a repeated id keeps its last position.
    pub fn set_positions_flat(&self, ids_and_positions: &[i32]) -> Result<(), ServoError> {
        if ids_and_positions.is_empty() {
            return Ok(());
        }
        if ids_and_positions.len() % 2 != 0 {
            return Err(ServoError::OddArgumentCount(ids_and_positions.len()));
        }

        let pairs = ids_and_positions
            .chunks_exact(2)
            .filter_map(|pair| match ChannelId::try_from(pair[0]) {
                Ok(id) => Some((id, pair[1])),
                Err(_) => {
                    debug!("Dropping negative channel id {}", pair[0]);
                    None
                }
            });

        let (mask, positions) = self.densify(pairs);
        self.apply(&mask, &positions)?;
        Ok(())
    }

    /// Set a single channel
    pub fn set_position(&self, id: ChannelId, position: Position) -> Result<(), ServoError> {
        let mask = self
            .masks
            .mask_for(id)
            .ok_or_else(|| ServoError::ChannelOutOfRange {
                id,
                channel_count: self.channel_count(),
            })?;

        let mut positions = self.masks.zeros().to_vec();
        positions[id] = position;
        debug!("Setting servo {} to {}", id, position);

        self.apply(mask, &positions)?;
        Ok(())
    }

    /// Current position of every channel, without moving any of them
    pub fn get_positions(&self) -> Result<Vec<Position>, ServoError> {
        self.apply(self.masks.all_off(), self.masks.zeros())
    }

    /// Build a dense mask/position pair from sparse entries
    fn densify(
        &self,
        entries: impl IntoIterator<Item = (ChannelId, Position)>,
    ) -> (Vec<bool>, Vec<Position>) {
        let channel_count = self.channel_count();
        let mut mask = vec![false; channel_count];
        let mut positions = vec![0; channel_count];

        for (id, position) in entries {
            if self.masks.contains(id) {
                mask[id] = true;
                positions[id] = position;
                debug!("Setting servo {} to {}", id, position);
            } else {
                debug!(
                    "Dropping servo {} (channel count: {})",
                    id, channel_count
                );
            }
        }

        (mask, positions)
    }

    /// Single hardware call, with the reported vector checked for length
    fn apply(&self, mask: &[bool], positions: &[Position]) -> Result<Vec<Position>, ServoError> {
        let reported = self.executor.apply_and_report(mask, positions)?;
        if reported.len() != self.channel_count() {
            return Err(ExecutorError::mismatch(self.channel_count(), &reported).into());
        }
        Ok(reported)
    }
}
