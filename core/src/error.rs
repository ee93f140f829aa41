//! Error types for command translation and hardware execution

use std::num::ParseIntError;

use thiserror::Error;

use crate::{ChannelId, Position};

/// Errors raised while translating a request into a hardware command
#[derive(Error, Debug)]
pub enum ServoError {
    #[error("Unsupported operation: {0:?}")]
    UnsupportedOperation(String),

    #[error("Argument count must be even (got {0})")]
    OddArgumentCount(usize),

    #[error("Invalid position {value:?} for channel {channel}: {source}")]
    InvalidPosition {
        channel: ChannelId,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Channel {id} out of range (channel count: {channel_count})")]
    ChannelOutOfRange { id: ChannelId, channel_count: usize },

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Errors reported by a hardware execution backend
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Backend reported {actual} positions, expected {expected}")]
    ChannelCountMismatch { expected: usize, actual: usize },
}

impl ExecutorError {
    /// Build a length mismatch error from a reported position vector
    pub fn mismatch(expected: usize, reported: &[Position]) -> Self {
        ExecutorError::ChannelCountMismatch {
            expected,
            actual: reported.len(),
        }
    }
}
