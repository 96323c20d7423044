//! The ENCOS motor protocol: addressing, wire constants, command encoding and feedback decoding.

mod command;
mod feedback;
mod scaling;

pub use command::{group_current_frames, Command, HybridControl};
pub use feedback::{decode, AutoFeedback, Feedback, MotorParameter, StateFeedback};
pub use scaling::{from_fixed, to_fixed, Limits, PhysicalRange};

use num_derive::FromPrimitive;

use crate::EncodeError;

/// CAN id of the configuration channel. Zeroing, id management and mode queries are sent here,
/// and the motors answer them from here.
pub const CONFIG_CAN_ID: u16 = 0x7FF;
/// In automatic feedback mode, motor `n` streams its state from `AUTO_FEEDBACK_BASE + n - 1`.
pub const AUTO_FEEDBACK_BASE: u16 = 0x205;
/// Number of automatic feedback slots.
pub const AUTO_FEEDBACK_SLOTS: u16 = 8;
/// Group current command for automatic feedback slots 0 to 3.
pub const GROUP_CURRENT_LOW_ID: u16 = 0x1FF;
/// Group current command for automatic feedback slots 4 to 7.
pub const GROUP_CURRENT_HIGH_ID: u16 = 0x2FF;

/// Marks a configuration channel reply as motor feedback (byte 2).
pub(crate) const FEEDBACK_INSTRUCTION: u8 = 0x01;

/// A 16-bit motor id, transmitted as a high and a low byte.
///
/// Valid motor ids are `1..=0x7FE`: the id doubles as the CAN id of the control channel and
/// `0x7FF` is taken by the configuration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MotorAddress(u16);

impl MotorAddress {
    /// Payload sentinel used by the broadcast id reset.
    pub const RESET_SENTINEL: MotorAddress = MotorAddress(0x7F7F);
    /// Payload sentinel used by the id query.
    pub const QUERY_SENTINEL: MotorAddress = MotorAddress(0xFFFF);
    /// Payload sentinel returned when an id query fails.
    pub const QUERY_FAILED_SENTINEL: MotorAddress = MotorAddress(0x8080);
    /// Id every motor takes after a broadcast id reset.
    pub const DEFAULT: MotorAddress = MotorAddress(1);

    /// Creates an address from a motor id in `1..=0x7FE`.
    pub fn new(id: u16) -> Result<Self, EncodeError> {
        if id == 0 || id >= CONFIG_CAN_ID {
            return Err(EncodeError::AddressOutOfRange(id));
        }
        Ok(MotorAddress(id))
    }

    /// Builds an address from its wire bytes.
    pub fn from_bytes(high: u8, low: u8) -> Result<Self, EncodeError> {
        MotorAddress::new(u16::from_be_bytes([high, low]))
    }

    /// The raw id.
    pub fn id(&self) -> u16 {
        self.0
    }

    /// `[high, low]` as transmitted.
    pub fn to_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// The automatic feedback slot (`id - 1`) if the motor has one.
    pub fn feedback_slot(&self) -> Option<u16> {
        let slot = self.0.checked_sub(1)?;
        (slot < AUTO_FEEDBACK_SLOTS).then_some(slot)
    }
}

impl std::fmt::Display for MotorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// Which reply a motor sends after a control command. Byte 0 of response mode feedback carries
/// the same number in its top three bits.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum AckType {
    NoAck = 0x00,
    Type1 = 0x01,
    Type2 = 0x02,
    Type3 = 0x03,
    Type4 = 0x04,
    Type5 = 0x05,
}

/// How a motor reports its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum CommunicationMode {
    /// The motor streams fixed layout state frames without being asked.
    Automatic = 0x01,
    /// The motor answers each control command with a tagged feedback frame.
    Response = 0x02,
}

/// Control modes of the current/torque command.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ControlMode {
    Current = 0x00,
    Torque = 0x01,
    VariableDampingBrake = 0x02,
    EnergyConsumptionBrake = 0x03,
    RegenerativeBrake = 0x04,
}

/// Error codes reported in the low five bits of response mode feedback.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    NoError = 0x00,
    Overheat = 0x01,
    Overcurrent = 0x02,
    LowVoltage = 0x03,
    EncoderError = 0x04,
    IndicatesError = 0x05,
    BrakeHighVoltage = 0x06,
    DrvDriverError = 0x07,
}

/// Instruction codes of the parameter read command and its reply.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum ParameterCode {
    Position = 1,
    Speed = 2,
    Current = 3,
    Power = 4,
    Acceleration = 5,
    LinkageKp = 6,
    SpeedKi = 7,
    FeedbackKp = 8,
    FeedbackKd = 9,
}

impl ParameterCode {
    /// Length of the reply frame for this parameter: float parameters take 6 bytes, integer ones 4.
    pub fn reply_len(&self) -> usize {
        match self {
            ParameterCode::Position
            | ParameterCode::Speed
            | ParameterCode::Current
            | ParameterCode::Power => 6,
            _ => 4,
        }
    }
}
