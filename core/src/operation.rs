//! Generic operation model and its resolution into typed servo commands
//!
//! Operations arrive as a name plus a set of device entries, each carrying
//! string name/value parameters. Names are matched case-insensitively once,
//! here, and everything downstream works with [`ServoCommand`].

use std::str::FromStr;

use tracing::debug;

use crate::{ChannelId, Position, ServoError, SparseUpdate};

/// Operation name for setting servo positions
pub const OPERATION_NAME_SET_POSITION: &str = "set_position";

/// Parameter name carrying a target position
pub const PARAMETER_NAME_POSITION: &str = "position";

/// A named parameter attached to a device entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A target device entry of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: ChannelId,
    pub parameters: Vec<Parameter>,
}

impl Device {
    pub fn new(id: ChannelId, parameters: Vec<Parameter>) -> Self {
        Self { id, parameters }
    }

    /// Device entry carrying a single position parameter
    pub fn with_position(id: ChannelId, position: Position) -> Self {
        Self::new(
            id,
            vec![Parameter::new(PARAMETER_NAME_POSITION, position.to_string())],
        )
    }

    /// Target position for this device
    ///
    /// The last `position` parameter wins; a device without one targets 0.
    pub fn target_position(&self) -> Result<Position, ServoError> {
        let mut position = 0;
        for param in &self.parameters {
            if ParameterKind::from_name(&param.name) == ParameterKind::Position {
                position = param
                    .value
                    .parse()
                    .map_err(|source| ServoError::InvalidPosition {
                        channel: self.id,
                        value: param.value.clone(),
                        source,
                    })?;
            }
        }
        Ok(position)
    }
}

/// A generic, string-keyed operation on a set of devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub devices: Vec<Device>,
}

impl Operation {
    pub fn new(name: impl Into<String>, devices: Vec<Device>) -> Self {
        Self {
            name: name.into(),
            devices,
        }
    }

    /// Resolve the raw operation into a typed command
    pub fn resolve(&self) -> Result<ServoCommand, ServoError> {
        match self.name.parse::<OperationKind>()? {
            OperationKind::SetPosition => {
                let mut update = SparseUpdate::with_capacity(self.devices.len());
                for device in &self.devices {
                    update.insert(device.id, device.target_position()?);
                }
                Ok(ServoCommand::SetPositions(update))
            }
        }
    }
}

/// Recognized operation names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    SetPosition,
}

impl FromStr for OperationKind {
    type Err = ServoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.eq_ignore_ascii_case(OPERATION_NAME_SET_POSITION) {
            Ok(OperationKind::SetPosition)
        } else {
            debug!("Rejecting unsupported operation {:?}", name);
            Err(ServoError::UnsupportedOperation(name.to_string()))
        }
    }
}

/// Recognized parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Position,
    Other,
}

impl ParameterKind {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(PARAMETER_NAME_POSITION) {
            ParameterKind::Position
        } else {
            ParameterKind::Other
        }
    }
}

/// A typed servo command, ready for densification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServoCommand {
    /// Sparse channel → position update
    SetPositions(SparseUpdate),
    /// Flat alternating id/position list
    SetPositionsFlat(Vec<i32>),
    /// Single channel set
    SetPosition { id: ChannelId, position: Position },
    /// Read-only snapshot of every channel
    GetPositions,
}
