//! Request and reply messages exchanged with the servo service
//!
//! Every body starts with a one-byte tag. Integers are big-endian, strings
//! are a u16 byte length followed by UTF-8, channel ids travel as u16.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{self, CodecError, Message};
use crate::operation::{Device, Operation, Parameter, ServoCommand};
use crate::{ChannelId, Position, ServoError, SparseUpdate};

mod tag {
    pub const OPERATION: u8 = 1;
    pub const SET_POSITIONS: u8 = 2;
    pub const SET_POSITIONS_FLAT: u8 = 3;
    pub const SET_POSITION: u8 = 4;
    pub const GET_POSITIONS: u8 = 5;

    pub const REPLY_OK: u8 = 1;
    pub const REPLY_POSITIONS: u8 = 2;
    pub const REPLY_ERROR: u8 = 3;
}

/// A request sent to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Generic string-keyed operation
    Operation(Operation),
    SetPositions(SparseUpdate),
    SetPositionsFlat(Vec<i32>),
    SetPosition { id: ChannelId, position: Position },
    GetPositions,
}

impl Request {
    /// Resolve the request into a typed command
    ///
    /// Generic operations are resolved here, so an unsupported name or a bad
    /// position fails before any hardware is touched.
    pub fn into_command(self) -> Result<ServoCommand, ServoError> {
        Ok(match self {
            Request::Operation(operation) => operation.resolve()?,
            Request::SetPositions(update) => ServoCommand::SetPositions(update),
            Request::SetPositionsFlat(flat) => ServoCommand::SetPositionsFlat(flat),
            Request::SetPosition { id, position } => ServoCommand::SetPosition { id, position },
            Request::GetPositions => ServoCommand::GetPositions,
        })
    }
}

/// Largest channel count whose positions fit in one reply frame
///
/// A positions reply is a tag byte, a u16 count and one i32 per channel.
pub const MAX_CHANNELS: usize = (codec::MAX_MESSAGE_SIZE as usize - 3) / 4;

/// Error category carried by an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    UnsupportedOperation = 1,
    IllegalArgument = 2,
    InvalidPosition = 3,
    ChannelOutOfRange = 4,
    Executor = 5,
    Malformed = 6,
}

impl TryFrom<u8> for ErrorKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => ErrorKind::UnsupportedOperation,
            2 => ErrorKind::IllegalArgument,
            3 => ErrorKind::InvalidPosition,
            4 => ErrorKind::ChannelOutOfRange,
            5 => ErrorKind::Executor,
            6 => ErrorKind::Malformed,
            tag => {
                return Err(CodecError::UnknownTag {
                    kind: "error kind",
                    tag,
                })
            }
        })
    }
}

impl From<&ServoError> for ErrorKind {
    fn from(error: &ServoError) -> Self {
        match error {
            ServoError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            ServoError::OddArgumentCount(_) => ErrorKind::IllegalArgument,
            ServoError::InvalidPosition { .. } => ErrorKind::InvalidPosition,
            ServoError::ChannelOutOfRange { .. } => ErrorKind::ChannelOutOfRange,
            ServoError::Executor(_) => ErrorKind::Executor,
        }
    }
}

/// The service's answer to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Positions(Vec<Position>),
    Error { kind: ErrorKind, message: String },
}

impl Reply {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Reply::Error {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ServoError> for Reply {
    fn from(error: &ServoError) -> Self {
        Reply::error(ErrorKind::from(error), error.to_string())
    }
}

impl Message for Request {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Request::Operation(operation) => {
                buf.put_u8(tag::OPERATION);
                codec::put_string(buf, "operation name", &operation.name)?;
                codec::put_u16_field(buf, "device count", operation.devices.len())?;
                for device in &operation.devices {
                    codec::put_u16_field(buf, "device id", device.id)?;
                    codec::put_u16_field(buf, "parameter count", device.parameters.len())?;
                    for param in &device.parameters {
                        codec::put_string(buf, "parameter name", &param.name)?;
                        codec::put_string(buf, "parameter value", &param.value)?;
                    }
                }
            }
            Request::SetPositions(update) => {
                buf.put_u8(tag::SET_POSITIONS);
                codec::put_u16_field(buf, "update count", update.len())?;

                // Sorted so equal updates encode identically
                let mut entries: Vec<_> = update.iter().collect();
                entries.sort_unstable_by_key(|&(&id, _)| id);
                for (&id, &position) in entries {
                    codec::put_u16_field(buf, "channel id", id)?;
                    buf.put_i32(position);
                }
            }
            Request::SetPositionsFlat(flat) => {
                buf.put_u8(tag::SET_POSITIONS_FLAT);
                codec::put_u16_field(buf, "argument count", flat.len())?;
                for &value in flat {
                    buf.put_i32(value);
                }
            }
            Request::SetPosition { id, position } => {
                buf.put_u8(tag::SET_POSITION);
                codec::put_u16_field(buf, "channel id", *id)?;
                buf.put_i32(*position);
            }
            Request::GetPositions => buf.put_u8(tag::GET_POSITIONS),
        }
        Ok(())
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, CodecError> {
        let request = match codec::get_u8(buf)? {
            tag::OPERATION => {
                let name = codec::get_string(buf)?;
                let device_count = codec::get_u16(buf)?;
                let mut devices = Vec::with_capacity(device_count as usize);
                for _ in 0..device_count {
                    let id = codec::get_u16(buf)? as ChannelId;
                    let param_count = codec::get_u16(buf)?;
                    let mut parameters = Vec::with_capacity(param_count as usize);
                    for _ in 0..param_count {
                        let name = codec::get_string(buf)?;
                        let value = codec::get_string(buf)?;
                        parameters.push(Parameter { name, value });
                    }
                    devices.push(Device { id, parameters });
                }
                Request::Operation(Operation { name, devices })
            }
            tag::SET_POSITIONS => {
                let count = codec::get_u16(buf)?;
                let mut update = SparseUpdate::with_capacity(count as usize);
                for _ in 0..count {
                    let id = codec::get_u16(buf)? as ChannelId;
                    update.insert(id, codec::get_i32(buf)?);
                }
                Request::SetPositions(update)
            }
            tag::SET_POSITIONS_FLAT => {
                let count = codec::get_u16(buf)?;
                let flat = (0..count)
                    .map(|_| codec::get_i32(buf))
                    .collect::<Result<Vec<_>, _>>()?;
                Request::SetPositionsFlat(flat)
            }
            tag::SET_POSITION => {
                let id = codec::get_u16(buf)? as ChannelId;
                let position = codec::get_i32(buf)?;
                Request::SetPosition { id, position }
            }
            tag::GET_POSITIONS => Request::GetPositions,
            tag => return Err(CodecError::UnknownTag { kind: "request", tag }),
        };
        Ok(request)
    }
}

impl Message for Reply {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Reply::Ok => buf.put_u8(tag::REPLY_OK),
            Reply::Positions(positions) => {
                buf.put_u8(tag::REPLY_POSITIONS);
                codec::put_u16_field(buf, "position count", positions.len())?;
                for &position in positions {
                    buf.put_i32(position);
                }
            }
            Reply::Error { kind, message } => {
                buf.put_u8(tag::REPLY_ERROR);
                buf.put_u8(*kind as u8);
                codec::put_string(buf, "error message", message)?;
            }
        }
        Ok(())
    }

    fn decode_body(buf: &mut Bytes) -> Result<Self, CodecError> {
        let reply = match codec::get_u8(buf)? {
            tag::REPLY_OK => Reply::Ok,
            tag::REPLY_POSITIONS => {
                let count = codec::get_u16(buf)?;
                let positions = (0..count)
                    .map(|_| codec::get_i32(buf))
                    .collect::<Result<Vec<_>, _>>()?;
                Reply::Positions(positions)
            }
            tag::REPLY_ERROR => {
                let kind = ErrorKind::try_from(codec::get_u8(buf)?)?;
                let message = codec::get_string(buf)?;
                Reply::Error { kind, message }
            }
            tag => return Err(CodecError::UnknownTag { kind: "reply", tag }),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn roundtrip_request(request: &Request) -> Request {
        let encoded = encode(request).expect("encode failed");
        let mut buf = BytesMut::from(&encoded[..]);
        decode(&mut buf).expect("decode failed").expect("no message")
    }

    #[test]
    fn test_operation_request() {
        let request = Request::Operation(Operation::new(
            "SET_POSITION",
            vec![
                Device::new(0, vec![Parameter::new("Position", "10")]),
                Device::new(7, vec![]),
            ],
        ));
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_sparse_update_encoding_is_ordered() {
        let a = Request::SetPositions(SparseUpdate::from([(3, 45), (1, 90), (2, -5)]));
        let b = Request::SetPositions(SparseUpdate::from([(2, -5), (3, 45), (1, 90)]));
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        assert_eq!(roundtrip_request(&a), a);
    }

    #[test]
    fn test_channel_id_overflow() {
        let result = encode(&Request::SetPosition {
            id: 70_000,
            position: 1,
        });
        assert!(matches!(
            result,
            Err(CodecError::FieldOverflow {
                field: "channel id",
                value: 70_000
            })
        ));
    }

    #[test]
    fn test_unknown_request_tag() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 1, 42][..]);
        let result = decode::<Request>(&mut buf);
        assert!(matches!(
            result,
            Err(CodecError::UnknownTag {
                kind: "request",
                tag: 42
            })
        ));
    }

    #[test]
    fn test_truncated_body() {
        // SetPosition tag with only the channel id
        let mut buf = BytesMut::from(&[0u8, 0, 0, 3, 4, 0, 1][..]);
        let result = decode::<Request>(&mut buf);
        assert!(matches!(
            result,
            Err(CodecError::NotEnoughData {
                needed: 4,
                available: 0
            })
        ));
    }

    #[test]
    fn test_error_reply_from_servo_error() {
        let reply = Reply::from(&ServoError::OddArgumentCount(3));
        match &reply {
            Reply::Error { kind, message } => {
                assert_eq!(*kind, ErrorKind::IllegalArgument);
                assert!(message.contains("must be even"));
            }
            other => panic!("expected error reply, got {:?}", other),
        }

        let encoded = encode(&reply).unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        assert_eq!(decode::<Reply>(&mut buf).unwrap(), Some(reply));
    }

    #[test]
    fn test_request_into_command() {
        assert_eq!(
            Request::SetPosition { id: 1, position: 2 }.into_command().unwrap(),
            ServoCommand::SetPosition { id: 1, position: 2 }
        );
        assert_eq!(
            Request::GetPositions.into_command().unwrap(),
            ServoCommand::GetPositions
        );

        let op = Operation::new("Set_Position", vec![Device::with_position(4, -12)]);
        assert_eq!(
            Request::Operation(op).into_command().unwrap(),
            ServoCommand::SetPositions(SparseUpdate::from([(4, -12)]))
        );

        let op = Operation::new("home", vec![]);
        assert!(matches!(
            Request::Operation(op).into_command(),
            Err(ServoError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_largest_positions_reply_fits() {
        let encoded = encode(&Reply::Positions(vec![i32::MAX; MAX_CHANNELS])).unwrap();
        assert!(encoded.len() - 4 <= codec::MAX_MESSAGE_SIZE as usize);

        let result = encode(&Reply::Positions(vec![0; MAX_CHANNELS + 1]));
        assert!(matches!(result, Err(CodecError::MessageTooLarge(_))));
    }
}
