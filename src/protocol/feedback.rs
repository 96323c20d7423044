use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;

use super::scaling::{from_fixed, Limits};
use super::{
    CommunicationMode, ErrorCode, MotorAddress, ParameterCode, AUTO_FEEDBACK_BASE,
    AUTO_FEEDBACK_SLOTS, CONFIG_CAN_ID, FEEDBACK_INSTRUCTION,
};
use crate::frame::FeedbackFrame;
use crate::FrameParseError;

const STATE_FRAME_LEN: usize = 8;
const INSTRUCTION_ACK_LEN: usize = 3;
const AUTO_FRAME_LEN: usize = 8;

/// Motor state carried by response frames of type 1 to 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateFeedback {
    /// Low five bits of byte 0, see [`ErrorCode`].
    pub error_code: u8,
    /// Position in rad. Type 3 frames carry no position.
    pub position: Option<f32>,
    /// Speed in rad/s. Type 2 frames carry no speed.
    pub speed: Option<f32>,
    /// Current in A.
    pub current: f32,
    /// Motor winding temperature in °C.
    pub motor_temperature: i16,
    /// Driver MOSFET temperature in °C, only reported by type 1 frames.
    pub mos_temperature: Option<i16>,
}

impl StateFeedback {
    /// The reported error, if the code is known.
    pub fn error(&self) -> Option<ErrorCode> {
        ErrorCode::from_u8(self.error_code)
    }
}

/// Motor state streamed in automatic feedback mode. Values are the raw counts sent by the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFeedback {
    /// Feedback slot, `source - 0x205`. Motor id is `slot + 1`.
    pub slot: u16,
    /// Encoder angle count.
    pub angle: u16,
    /// Speed count.
    pub speed: i16,
    /// Current count.
    pub current: i16,
    /// Motor temperature in °C.
    pub temperature: u8,
    /// Error code.
    pub error_code: u8,
}

impl AutoFeedback {
    /// The motor that streamed this frame.
    pub fn address(&self) -> Option<MotorAddress> {
        MotorAddress::new(self.slot + 1).ok()
    }
}

/// A parameter read back with [`crate::protocol::Command::GetParameter`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorParameter {
    Position(f32),
    Speed(f32),
    Current(f32),
    Power(f32),
    Acceleration(u16),
    LinkageKp(u16),
    SpeedKi(u16),
    FeedbackKp(u16),
    FeedbackKd(u16),
}

impl MotorParameter {
    /// Instruction code of the parameter.
    pub fn code(&self) -> ParameterCode {
        match self {
            MotorParameter::Position(_) => ParameterCode::Position,
            MotorParameter::Speed(_) => ParameterCode::Speed,
            MotorParameter::Current(_) => ParameterCode::Current,
            MotorParameter::Power(_) => ParameterCode::Power,
            MotorParameter::Acceleration(_) => ParameterCode::Acceleration,
            MotorParameter::LinkageKp(_) => ParameterCode::LinkageKp,
            MotorParameter::SpeedKi(_) => ParameterCode::SpeedKi,
            MotorParameter::FeedbackKp(_) => ParameterCode::FeedbackKp,
            MotorParameter::FeedbackKd(_) => ParameterCode::FeedbackKd,
        }
    }
}

/// A decoded feedback frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feedback {
    /// Response frame type 1, 2 or 3.
    State(StateFeedback),
    /// Automatic feedback mode state frame.
    Auto(AutoFeedback),
    /// Response frame type 4: echo of a parameter setting instruction.
    InstructionAck {
        /// Low five bits of byte 0.
        error_code: u8,
        /// Instruction that was executed.
        instruction: u8,
        /// Execution status, `1` on success.
        status: u8,
    },
    /// Response frame type 5.
    Parameter {
        /// Low five bits of byte 0.
        error_code: u8,
        /// The value read back.
        parameter: MotorParameter,
    },
    /// A motor answered an id query.
    IdQueryReply {
        /// Id reported by the motor.
        id: u16,
    },
    /// An id query failed.
    IdQueryFailed,
    /// Every motor reset its id to [`MotorAddress::DEFAULT`].
    IdResetAck,
    /// Echo of a configuration instruction (zeroing, id change, mode switch or mode query).
    InstructionEcho {
        /// Id of the answering motor.
        id: u16,
        /// Instruction status, or the communication mode for a mode query.
        status: u8,
    },
}

/// Decodes a received frame.
///
/// Frames from the configuration channel are decoded as configuration replies whatever the mode.
/// Otherwise `mode` selects between the tagged response frames and the fixed automatic feedback
/// layout; `limits` scales type 1 frames.
pub fn decode(
    frame: &FeedbackFrame,
    mode: CommunicationMode,
    limits: &Limits,
) -> Result<Feedback, FrameParseError> {
    let data = frame.payload().as_slice();
    if frame.source() == CONFIG_CAN_ID {
        return decode_config(data);
    }
    match mode {
        CommunicationMode::Response => decode_response(data, limits),
        CommunicationMode::Automatic => decode_auto(frame.source(), data),
    }
}

fn decode_config(data: &[u8]) -> Result<Feedback, FrameParseError> {
    expect_at_least(data, 4)?;
    if data[2] != FEEDBACK_INSTRUCTION {
        return Err(FrameParseError::NotFeedback(data[2]));
    }
    let id = u16::from_be_bytes([data[0], data[1]]);
    match MotorAddress(id) {
        MotorAddress::QUERY_SENTINEL => {
            expect_at_least(data, 5)?;
            Ok(Feedback::IdQueryReply {
                id: BigEndian::read_u16(&data[3..5]),
            })
        }
        MotorAddress::QUERY_FAILED_SENTINEL => Ok(Feedback::IdQueryFailed),
        MotorAddress::RESET_SENTINEL => Ok(Feedback::IdResetAck),
        _ => Ok(Feedback::InstructionEcho {
            id,
            status: data[3],
        }),
    }
}

fn decode_response(data: &[u8], limits: &Limits) -> Result<Feedback, FrameParseError> {
    expect_at_least(data, 1)?;
    let tag = data[0] >> 5;
    let error_code = data[0] & 0x1F;
    match tag {
        1 => {
            expect_len(data, STATE_FRAME_LEN)?;
            let position = BigEndian::read_u16(&data[1..3]) as u32;
            let speed = (data[3] as u32) << 4 | (data[4] as u32) >> 4;
            let current = ((data[4] & 0x0F) as u32) << 8 | data[5] as u32;
            Ok(Feedback::State(StateFeedback {
                error_code,
                position: Some(from_fixed(position, limits.position)),
                speed: Some(from_fixed(speed, limits.speed)),
                current: from_fixed(current, limits.current),
                motor_temperature: temperature(data[6]),
                mos_temperature: Some(temperature(data[7])),
            }))
        }
        2 | 3 => {
            expect_len(data, STATE_FRAME_LEN)?;
            let value = BigEndian::read_f32(&data[1..5]);
            let current = BigEndian::read_i16(&data[5..7]) as f32 / 100.0;
            let (position, speed) = if tag == 2 {
                (Some(value), None)
            } else {
                (None, Some(value))
            };
            Ok(Feedback::State(StateFeedback {
                error_code,
                position,
                speed,
                current,
                motor_temperature: temperature(data[7]),
                mos_temperature: None,
            }))
        }
        4 => {
            expect_len(data, INSTRUCTION_ACK_LEN)?;
            Ok(Feedback::InstructionAck {
                error_code,
                instruction: data[1],
                status: data[2],
            })
        }
        5 => {
            expect_at_least(data, 2)?;
            let code =
                ParameterCode::from_u8(data[1]).ok_or(FrameParseError::UnknownParameter(data[1]))?;
            expect_len(data, code.reply_len())?;
            let float = || BigEndian::read_f32(&data[2..6]);
            let integer = || BigEndian::read_u16(&data[2..4]);
            let parameter = match code {
                ParameterCode::Position => MotorParameter::Position(float()),
                ParameterCode::Speed => MotorParameter::Speed(float()),
                ParameterCode::Current => MotorParameter::Current(float()),
                ParameterCode::Power => MotorParameter::Power(float()),
                ParameterCode::Acceleration => MotorParameter::Acceleration(integer()),
                ParameterCode::LinkageKp => MotorParameter::LinkageKp(integer()),
                ParameterCode::SpeedKi => MotorParameter::SpeedKi(integer()),
                ParameterCode::FeedbackKp => MotorParameter::FeedbackKp(integer()),
                ParameterCode::FeedbackKd => MotorParameter::FeedbackKd(integer()),
            };
            Ok(Feedback::Parameter {
                error_code,
                parameter,
            })
        }
        _ => Err(FrameParseError::UnknownFrameTag(tag)),
    }
}

fn decode_auto(source: u16, data: &[u8]) -> Result<Feedback, FrameParseError> {
    let slot = source
        .checked_sub(AUTO_FEEDBACK_BASE)
        .filter(|slot| *slot < AUTO_FEEDBACK_SLOTS)
        .ok_or(FrameParseError::UnexpectedSource(source))?;
    expect_len(data, AUTO_FRAME_LEN)?;
    Ok(Feedback::Auto(AutoFeedback {
        slot,
        angle: BigEndian::read_u16(&data[0..2]),
        speed: BigEndian::read_i16(&data[2..4]),
        current: BigEndian::read_i16(&data[4..6]),
        temperature: data[6],
        error_code: data[7],
    }))
}

/// Temperatures are sent with a +50 offset at half degree resolution. Division truncates toward
/// zero, so raw values below 50 round up (`49` decodes to `0`).
fn temperature(raw: u8) -> i16 {
    (raw as i16 - 50) / 2
}

fn expect_len(data: &[u8], expected: usize) -> Result<(), FrameParseError> {
    if data.len() != expected {
        return Err(FrameParseError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn expect_at_least(data: &[u8], expected: usize) -> Result<(), FrameParseError> {
    if data.len() < expected {
        return Err(FrameParseError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::protocol::{to_fixed, PhysicalRange};

    fn response(source: u16, data: &[u8]) -> Result<Feedback, FrameParseError> {
        decode(
            &FeedbackFrame::new(source, data).unwrap(),
            CommunicationMode::Response,
            &Limits::default(),
        )
    }

    fn auto(source: u16, data: &[u8]) -> Result<Feedback, FrameParseError> {
        decode(
            &FeedbackFrame::new(source, data).unwrap(),
            CommunicationMode::Automatic,
            &Limits::default(),
        )
    }

    #[test]
    fn state_frame_type_1() {
        let position = to_fixed(1.0, PhysicalRange::POSITION) as u16;
        let speed = to_fixed(-2.0, PhysicalRange::SPEED) as u16;
        let current = to_fixed(3.0, PhysicalRange::CURRENT) as u16;
        let [p_hi, p_lo] = position.to_be_bytes();
        let data = [
            0x20 | 0x02,
            p_hi,
            p_lo,
            (speed >> 4) as u8,
            ((speed & 0x0F) << 4) as u8 | (current >> 8) as u8,
            current as u8,
            110,
            91,
        ];
        let Feedback::State(state) = response(1, &data).unwrap() else {
            panic!("expected a state frame");
        };
        assert_eq!(state.error_code, 2);
        assert_eq!(state.error(), Some(ErrorCode::Overcurrent));
        assert!((state.position.unwrap() - 1.0).abs() <= PhysicalRange::POSITION.step());
        assert!((state.speed.unwrap() + 2.0).abs() <= PhysicalRange::SPEED.step());
        assert!((state.current - 3.0).abs() <= PhysicalRange::CURRENT.step());
        assert_eq!(state.motor_temperature, 30);
        assert_eq!(state.mos_temperature, Some(20));
    }

    #[test]
    fn temperature_truncates_toward_zero() {
        assert_eq!(temperature(50), 0);
        assert_eq!(temperature(49), 0);
        assert_eq!(temperature(47), -1);
        assert_eq!(temperature(0), -25);
        assert_eq!(temperature(255), 102);
    }

    #[test]
    fn state_frame_type_2_carries_raw_position() {
        let mut data = [0x40, 0, 0, 0, 0, 0xFF, 0x38, 80];
        data[1..5].copy_from_slice(&1.5f32.to_be_bytes());
        let Feedback::State(state) = response(3, &data).unwrap() else {
            panic!("expected a state frame");
        };
        assert_eq!(state.position, Some(1.5));
        assert_eq!(state.speed, None);
        assert_eq!(state.current, -2.0);
        assert_eq!(state.motor_temperature, 15);
        assert_eq!(state.mos_temperature, None);
    }

    #[test]
    fn state_frame_type_3_carries_raw_speed() {
        let mut data = [0x61, 0, 0, 0, 0, 0x01, 0xF4, 50];
        data[1..5].copy_from_slice(&(-4.25f32).to_be_bytes());
        let Feedback::State(state) = response(3, &data).unwrap() else {
            panic!("expected a state frame");
        };
        assert_eq!(state.error_code, 1);
        assert_eq!(state.position, None);
        assert_eq!(state.speed, Some(-4.25));
        assert_eq!(state.current, 5.0);
        assert_eq!(state.motor_temperature, 0);
    }

    #[test]
    fn state_frames_must_be_complete() {
        assert_eq!(
            response(1, &[0x20, 0, 0, 0]),
            Err(FrameParseError::LengthMismatch {
                expected: 8,
                actual: 4
            })
        );
    }

    #[test]
    fn instruction_ack() {
        assert_eq!(
            response(1, &[0x80, 0x01, 0x01]).unwrap(),
            Feedback::InstructionAck {
                error_code: 0,
                instruction: 1,
                status: 1
            }
        );
        assert_eq!(
            response(1, &[0x80, 0x01, 0x01, 0x00]),
            Err(FrameParseError::LengthMismatch {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn acceleration_parameter_reply() {
        assert_eq!(
            response(2, &[0xA0, 0x05, 0x03, 0xE8]).unwrap(),
            Feedback::Parameter {
                error_code: 0,
                parameter: MotorParameter::Acceleration(1000)
            }
        );
    }

    #[test]
    fn float_parameter_reply() {
        let mut data = [0xA0, 0x04, 0, 0, 0, 0];
        data[2..6].copy_from_slice(&12.5f32.to_be_bytes());
        assert_eq!(
            response(2, &data).unwrap(),
            Feedback::Parameter {
                error_code: 0,
                parameter: MotorParameter::Power(12.5)
            }
        );
    }

    #[test]
    fn parameter_reply_length_is_checked_per_code() {
        assert_eq!(
            response(2, &[0xA0, 0x01, 0x00, 0x00]),
            Err(FrameParseError::LengthMismatch {
                expected: 6,
                actual: 4
            })
        );
        assert_eq!(
            response(2, &[0xA0, 0x09, 0x00, 0x00, 0x00, 0x00]),
            Err(FrameParseError::LengthMismatch {
                expected: 4,
                actual: 6
            })
        );
        assert_eq!(
            response(2, &[0xA0, 0x0A, 0x00, 0x00]),
            Err(FrameParseError::UnknownParameter(0x0A))
        );
    }

    #[test]
    fn unknown_tags() {
        for byte in [0x00, 0xC0, 0xE3] {
            assert_eq!(
                response(1, &[byte, 0, 0, 0, 0, 0, 0, 0]),
                Err(FrameParseError::UnknownFrameTag(byte >> 5))
            );
        }
        assert_eq!(
            response(1, &[]),
            Err(FrameParseError::LengthMismatch {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn config_channel_replies() {
        assert_eq!(
            response(0x7FF, &[0xFF, 0xFF, 0x01, 0x00, 0x05]).unwrap(),
            Feedback::IdQueryReply { id: 5 }
        );
        assert_eq!(
            response(0x7FF, &[0x80, 0x80, 0x01, 0x00]).unwrap(),
            Feedback::IdQueryFailed
        );
        assert_eq!(
            response(0x7FF, &[0x7F, 0x7F, 0x01, 0x01, 0x7F, 0x7F]).unwrap(),
            Feedback::IdResetAck
        );
        assert_eq!(
            response(0x7FF, &[0x00, 0x03, 0x01, 0x02]).unwrap(),
            Feedback::InstructionEcho { id: 3, status: 2 }
        );
        assert_eq!(
            response(0x7FF, &[0x00, 0x03, 0x00, 0x02]),
            Err(FrameParseError::NotFeedback(0x00))
        );
    }

    #[test]
    fn config_channel_ignores_mode() {
        assert_eq!(
            auto(0x7FF, &[0x80, 0x80, 0x01, 0x00]).unwrap(),
            Feedback::IdQueryFailed
        );
    }

    #[test]
    fn automatic_feedback() {
        let feedback = auto(0x207, &[0x12, 0x34, 0xFF, 0xFE, 0x00, 0x64, 40, 3]).unwrap();
        let Feedback::Auto(state) = feedback else {
            panic!("expected automatic feedback");
        };
        assert_eq!(
            state,
            AutoFeedback {
                slot: 2,
                angle: 0x1234,
                speed: -2,
                current: 100,
                temperature: 40,
                error_code: 3,
            }
        );
        assert_eq!(state.address().unwrap().id(), 3);
    }

    #[test]
    fn automatic_feedback_slots() {
        assert_eq!(
            auto(0x204, &[0; 8]),
            Err(FrameParseError::UnexpectedSource(0x204))
        );
        assert_eq!(
            auto(0x20D, &[0; 8]),
            Err(FrameParseError::UnexpectedSource(0x20D))
        );
        assert!(auto(0x20C, &[0; 8]).is_ok());
    }
}
