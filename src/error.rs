use thiserror::Error;

use crate::protocol::AckType;

/// Errors that can occur when interacting with an ENCOS motor.
#[derive(Error, Debug)]
pub enum Error {
    /// A physical range was misconfigured when building [`crate::protocol::Limits`].
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// A command failed validation. Nothing was transmitted.
    #[error("encode rejected: {0}")]
    EncodeRejected(#[from] EncodeError),
    /// The bus collaborator failed. Propagated unchanged, never retried.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// A frame arrived from an id other than the one this session listens on.
    #[error("address mismatch: expected {expected:#05x}, received {received:#05x}")]
    AddressMismatch {
        /// The CAN id the session expected feedback from.
        expected: u16,
        /// The CAN id the frame was sent from.
        received: u16,
    },
    /// FrameParse errors occur when decoding a feedback payload.
    #[error("frame parse error: {0}")]
    FrameParse(#[from] FrameParseError),
    /// No response was received within the retry budget.
    #[error("no response")]
    NoResponse,
    /// The motors answered an ID query with the failure pattern.
    #[error("id query failed")]
    IdQueryFailed,
    /// A reply was decoded but does not answer the request that was sent.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// A [`crate::protocol::PhysicalRange`] that cannot map values onto fixed-point codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    /// `min == max`, every value would map to the same code.
    #[error("range is empty (min == max)")]
    EmptyRange,
    /// `min > max`.
    #[error("range is inverted (min > max)")]
    InvertedRange,
    /// Bit widths must be within `1..=16`.
    #[error("unsupported bit width: {0}")]
    BitWidth(u8),
    /// A bound is NaN or infinite.
    #[error("range bound is not finite")]
    NonFinite,
}

/// Parameter validation failures raised while encoding a command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The ack type cannot be requested by this command.
    #[error("ack type {0:?} not allowed for this command")]
    AckType(AckType),
    /// Parameter codes are `1..=9`.
    #[error("invalid parameter code: {0}")]
    ParameterCode(u8),
    /// Group current commands address between 1 and 8 motors.
    #[error("group current command needs 1..=8 motors, got {0}")]
    GroupSize(usize),
    /// Motor ids must fit the 11-bit standard identifier space and not collide with the configuration channel.
    #[error("motor address out of range: {0:#06x}")]
    AddressOutOfRange(u16),
    /// Only motors 1 to 8 have an automatic feedback slot.
    #[error("motor {0:#05x} has no automatic feedback slot")]
    NoFeedbackSlot(u16),
}

/// Errors raised while turning a received payload into a [`crate::protocol::Feedback`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// The top three bits of byte 0 select no known frame layout.
    #[error("unknown frame tag: {0}")]
    UnknownFrameTag(u8),
    /// The declared length does not match the layout selected by the tag.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length the frame layout requires.
        expected: usize,
        /// Length that was received.
        actual: usize,
    },
    /// A parameter reply carried an instruction code outside `1..=9`.
    #[error("unknown parameter code: {0}")]
    UnknownParameter(u8),
    /// A configuration channel frame that is not a feedback instruction (`data[2] != 0x01`).
    #[error("not a feedback instruction: {0:#04x}")]
    NotFeedback(u8),
    /// More than 8 bytes were handed to the decoder.
    #[error("payload of {0} bytes exceeds the CAN limit of 8")]
    Oversized(usize),
    /// Automatic feedback arrived from an id outside the feedback slot range.
    #[error("unexpected automatic feedback source: {0:#05x}")]
    UnexpectedSource(u16),
}

/// An opaque failure reported by a [`crate::transport::Bus`] implementation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct BusError(Box<dyn std::error::Error + Send + Sync>);

impl BusError {
    /// Wraps any transport error.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BusError(error.into())
    }

    /// Creates a bus error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        BusError(message.into().into())
    }

    /// Returns the wrapped transport error.
    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync> {
        self.0
    }
}

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        BusError(Box::new(e))
    }
}
