//! CAN data frames exchanged with the motors.
//!
//! [`CommandFrame`]s are produced by [`crate::protocol::Command::encode`] and handed to a
//! [`crate::transport::Bus`]; [`FeedbackFrame`]s come back from the bus and are decoded with
//! [`crate::protocol::decode`]. Both carry at most 8 data bytes (classic CAN).

use std::fmt;

use itertools::Itertools;

use crate::FrameParseError;

/// Maximum number of data bytes in a classic CAN frame.
pub const MAX_PAYLOAD: usize = 8;

/// Up to 8 data bytes stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Payload {
    bytes: [u8; MAX_PAYLOAD],
    len: u8,
}

impl Payload {
    /// Builds a payload from a fixed size array. Arrays longer than 8 bytes do not compile.
    pub fn from_array<const N: usize>(data: [u8; N]) -> Self {
        const { assert!(N <= MAX_PAYLOAD, "CAN payloads are at most 8 bytes") };
        let mut bytes = [0; MAX_PAYLOAD];
        bytes[..N].copy_from_slice(&data);
        Payload {
            bytes,
            len: N as u8,
        }
    }

    /// Copies a received slice, rejecting anything longer than 8 bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, FrameParseError> {
        if data.len() > MAX_PAYLOAD {
            return Err(FrameParseError::Oversized(data.len()));
        }
        let mut bytes = [0; MAX_PAYLOAD];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Payload {
            bytes,
            len: data.len() as u8,
        })
    }

    /// The used bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Declared length (DLC).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` for a zero length payload.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::ops::Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.as_slice()
                .iter()
                .map(|b| format!("{:02X}", b))
                .join(" ")
        )
    }
}

/// An outgoing frame: the CAN id it is sent to and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    destination: u16,
    payload: Payload,
}

impl CommandFrame {
    pub(crate) fn new<const N: usize>(destination: u16, data: [u8; N]) -> Self {
        CommandFrame {
            destination,
            payload: Payload::from_array(data),
        }
    }

    /// The CAN id this frame is addressed to.
    pub fn destination(&self) -> u16 {
        self.destination
    }

    /// The data bytes.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// A received frame: the CAN id it came from and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackFrame {
    source: u16,
    payload: Payload,
}

impl FeedbackFrame {
    /// Wraps raw bytes received from `source`.
    pub fn new(source: u16, data: &[u8]) -> Result<Self, FrameParseError> {
        Ok(FeedbackFrame {
            source,
            payload: Payload::from_slice(data)?,
        })
    }

    /// The CAN id this frame was sent from.
    pub fn source(&self) -> u16 {
        self.source
    }

    /// The data bytes.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn payload_from_array() {
        let p = Payload::from_array([0x61, 0x00, 0x64]);
        assert_eq!(p.len(), 3);
        assert_eq!(p.as_slice(), &[0x61, 0x00, 0x64]);
        assert_eq!(format!("{}", p), "61 00 64");
    }

    #[test]
    fn oversized_feedback_is_rejected() {
        let err = FeedbackFrame::new(1, &[0; 9]).unwrap_err();
        assert_eq!(err, FrameParseError::Oversized(9));
    }

    #[test]
    fn empty_payload() {
        let frame = FeedbackFrame::new(0x7FF, &[]).unwrap();
        assert!(frame.payload().is_empty());
        assert_eq!(frame.source(), 0x7FF);
    }
}
