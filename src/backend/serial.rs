//! Multi-channel servo controller on a serial port
//!
//! One transaction per command. The host sends a sync-write frame carrying
//! the channel mask and every target, the controller answers with the
//! position of every channel:
//!
//! ```text
//! command: FF FF | N | mask bitmap (ceil(N/8) bytes, LSB first) | N x i32 BE | checksum
//! status:  FF FF | N | N x i32 BE | checksum
//! ```
//!
//! The checksum is the bitwise NOT of the byte sum after the header.

use crate::config::SerialConfig;
use bytes::{Buf, BufMut, BytesMut};
use servo_core::{ExecutorError, Position, ServoExecutor};
use std::io::{Read, Write};
use std::sync::Mutex;
use tracing::{debug, info};

pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Channels addressable by the one-byte count field
pub const MAX_CHANNELS: usize = u8::MAX as usize;

fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Size of a status frame for `channel_count` channels
pub fn status_frame_len(channel_count: usize) -> usize {
    HEADER.len() + 1 + 4 * channel_count + 1
}

/// Build the sync-write frame for one command
pub fn encode_command(mask: &[bool], positions: &[Position]) -> Result<BytesMut, ExecutorError> {
    let channel_count = mask.len();
    if positions.len() != channel_count {
        return Err(ExecutorError::Protocol(format!(
            "mask covers {} channels but {} positions given",
            channel_count,
            positions.len()
        )));
    }
    let count = u8::try_from(channel_count).map_err(|_| {
        ExecutorError::Protocol(format!("{} channels exceed the frame limit", channel_count))
    })?;

    let mut frame = BytesMut::with_capacity(4 + channel_count.div_ceil(8) + 4 * channel_count);
    frame.put_slice(&HEADER);
    frame.put_u8(count);

    for chunk in mask.chunks(8) {
        let bits = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, &set)| if set { acc | (1 << bit) } else { acc });
        frame.put_u8(bits);
    }
    for &position in positions {
        frame.put_i32(position);
    }

    let sum = checksum(&frame[HEADER.len()..]);
    frame.put_u8(sum);
    Ok(frame)
}

/// Parse a status frame into per-channel positions
pub fn decode_status(frame: &[u8], channel_count: usize) -> Result<Vec<Position>, ExecutorError> {
    let expected_len = status_frame_len(channel_count);
    if frame.len() != expected_len {
        return Err(ExecutorError::Protocol(format!(
            "status frame is {} bytes, expected {}",
            frame.len(),
            expected_len
        )));
    }
    if frame[..HEADER.len()] != HEADER {
        return Err(ExecutorError::Protocol(format!(
            "bad status header {:02X?}",
            &frame[..HEADER.len()]
        )));
    }

    let (body, sum) = frame[HEADER.len()..].split_at(frame.len() - HEADER.len() - 1);
    if checksum(body) != sum[0] {
        return Err(ExecutorError::Protocol("bad status checksum".into()));
    }

    let mut body = body;
    let reported = body.get_u8() as usize;
    if reported != channel_count {
        return Err(ExecutorError::ChannelCountMismatch {
            expected: channel_count,
            actual: reported,
        });
    }

    Ok((0..channel_count).map(|_| body.get_i32()).collect())
}

/// Servo bank behind a serial controller
pub struct SerialServos<P> {
    port: Mutex<P>,
    channel_count: usize,
}

impl SerialServos<Box<dyn tokio_serial::SerialPort>> {
    /// Open the configured port in blocking mode
    pub fn open(config: &SerialConfig, channel_count: usize) -> Result<Self, ExecutorError> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|e| ExecutorError::Serial(format!("{}: {}", config.port, e)))?;

        info!(
            "Opened servo controller on {} at {} baud",
            config.port, config.baud_rate
        );
        Self::new(port, channel_count)
    }
}

impl<P: Read + Write + Send> SerialServos<P> {
    /// Wrap an already open byte stream
    pub fn new(port: P, channel_count: usize) -> Result<Self, ExecutorError> {
        if channel_count > MAX_CHANNELS {
            return Err(ExecutorError::Protocol(format!(
                "{} channels exceed the frame limit of {}",
                channel_count, MAX_CHANNELS
            )));
        }
        Ok(Self {
            port: Mutex::new(port),
            channel_count,
        })
    }
}

impl<P: Read + Write + Send> ServoExecutor for SerialServos<P> {
    fn apply_and_report(
        &self,
        mask: &[bool],
        positions: &[Position],
    ) -> Result<Vec<Position>, ExecutorError> {
        if mask.len() != self.channel_count {
            return Err(ExecutorError::ChannelCountMismatch {
                expected: self.channel_count,
                actual: mask.len(),
            });
        }
        let frame = encode_command(mask, positions)?;

        let mut port = self
            .port
            .lock()
            .map_err(|_| ExecutorError::Serial("port lock poisoned".into()))?;

        debug!("Sending {} byte command frame", frame.len());
        port.write_all(&frame)?;
        port.flush()?;

        let mut status = vec![0u8; status_frame_len(self.channel_count)];
        port.read_exact(&mut status)?;
        decode_status(&status, self.channel_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Captures written bytes and replays a canned status frame
    struct FakePort {
        written: Vec<u8>,
        reply: Cursor<Vec<u8>>,
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reply.read(buf)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn status_frame(positions: &[Position]) -> Vec<u8> {
        let mut frame = BytesMut::new();
        frame.put_slice(&HEADER);
        frame.put_u8(positions.len() as u8);
        for &p in positions {
            frame.put_i32(p);
        }
        let sum = checksum(&frame[2..]);
        frame.put_u8(sum);
        frame.to_vec()
    }

    #[test]
    fn test_encode_command() {
        let frame = encode_command(&[false, true, false, true], &[0, 90, 0, 45]).unwrap();

        assert_eq!(&frame[..3], &[0xFF, 0xFF, 4]);
        assert_eq!(frame[3], 0b0000_1010);
        assert_eq!(&frame[4..8], &0i32.to_be_bytes());
        assert_eq!(&frame[8..12], &90i32.to_be_bytes());
        assert_eq!(&frame[16..20], &45i32.to_be_bytes());
        assert_eq!(frame.len(), 21);
        assert_eq!(frame[20], checksum(&frame[2..20]));
    }

    #[test]
    fn test_mask_bitmap_spans_bytes() {
        let mut mask = vec![false; 10];
        mask[0] = true;
        mask[9] = true;
        let frame = encode_command(&mask, &[0; 10]).unwrap();
        assert_eq!(&frame[3..5], &[0b0000_0001, 0b0000_0010]);
    }

    #[test]
    fn test_decode_status() {
        let frame = status_frame(&[100, -20, 3]);
        assert_eq!(decode_status(&frame, 3).unwrap(), vec![100, -20, 3]);
    }

    #[test]
    fn test_decode_status_bad_checksum() {
        let mut frame = status_frame(&[1, 2]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decode_status(&frame, 2),
            Err(ExecutorError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_status_wrong_count() {
        // A 2-channel status padded to the 3-channel length
        let mut frame = status_frame(&[1, 2]);
        frame.splice(frame.len() - 1..frame.len() - 1, [0, 0, 0, 0]);
        let last = frame.len() - 1;
        frame[last] = checksum(&frame[2..last]);

        assert!(matches!(
            decode_status(&frame, 3),
            Err(ExecutorError::ChannelCountMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_transaction() {
        let port = FakePort {
            written: Vec::new(),
            reply: Cursor::new(status_frame(&[10, 20])),
        };
        let servos = SerialServos::new(port, 2).unwrap();

        let reported = servos.apply_and_report(&[true, false], &[10, 0]).unwrap();
        assert_eq!(reported, vec![10, 20]);

        let port = servos.port.lock().unwrap();
        assert_eq!(
            port.written,
            encode_command(&[true, false], &[10, 0]).unwrap().to_vec()
        );
    }

    #[test]
    fn test_short_reply_is_io_error() {
        let port = FakePort {
            written: Vec::new(),
            reply: Cursor::new(vec![0xFF, 0xFF]),
        };
        let servos = SerialServos::new(port, 2).unwrap();
        assert!(matches!(
            servos.apply_and_report(&[false, false], &[0, 0]),
            Err(ExecutorError::Io(_))
        ));
    }

    #[test]
    fn test_too_many_channels() {
        let port = FakePort {
            written: Vec::new(),
            reply: Cursor::new(Vec::new()),
        };
        assert!(SerialServos::new(port, 300).is_err());
    }
}
