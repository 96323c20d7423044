use byteorder::{BigEndian, ByteOrder};
use itertools::Itertools;

use super::scaling::{from_fixed, to_fixed, Limits, PhysicalRange};
use super::{
    AckType, CommunicationMode, ControlMode, MotorAddress, ParameterCode, CONFIG_CAN_ID,
    GROUP_CURRENT_HIGH_ID, GROUP_CURRENT_LOW_ID,
};
use crate::frame::CommandFrame;
use crate::{EncodeError, FrameParseError};

const TAG_POSITION: u8 = 0x20;
const TAG_SPEED: u8 = 0x40;
const TAG_CURRENT: u8 = 0x60;
const TAG_SET_PARAMETER: u8 = 0xC0;
const TAG_GET_PARAMETER: u8 = 0xE0;

const CMD_SET_ZERO: u8 = 0x03;
const CMD_RESET_ID: u8 = 0x04;
const CMD_RESET_ID_BROADCAST: u8 = 0x05;
const CMD_QUERY_MODE: u8 = 0x81;
const CMD_QUERY_ID: u8 = 0x82;

const SUB_ACCELERATION: u8 = 0x01;
const SUB_LINKAGE_SPEED_KI: u8 = 0x02;
const SUB_FEEDBACK_KP_KD: u8 = 0x03;

/// Speed limit of the position command.
const POSITION_SPEED_MAX: u16 = 18000;
/// Current limit of the position and speed commands.
const COMMAND_CURRENT_MAX: u16 = 3000;
const CURRENT_MODE_MAX: i16 = 2000;
const TORQUE_MODE_MAX: i16 = 3000;
const TORQUE_UNITS_PER_NM: f32 = 100.0;

/// Setpoints of the hybrid (impedance) control command.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct HybridControl {
    /// Position gain.
    pub kp: f32,
    /// Damping gain.
    pub kd: f32,
    /// Target position, rad.
    pub position: f32,
    /// Target speed, rad/s.
    pub speed: f32,
    /// Feedforward current, A.
    pub current: f32,
}

impl HybridControl {
    /// Packs the five setpoints MSB first: a zero 3-bit tag, kp (12), kd (9), position (16),
    /// speed (12) and current (12), 64 bits with no padding.
    pub fn pack(&self, limits: &Limits) -> [u8; 8] {
        let kp = to_fixed(self.kp, limits.kp) as u64;
        let kd = to_fixed(self.kd, limits.kd) as u64;
        let position = to_fixed(self.position, limits.position) as u64;
        let speed = to_fixed(self.speed, limits.speed) as u64;
        let current = to_fixed(self.current, limits.current) as u64;
        let word = kp << 49 | kd << 40 | position << 24 | speed << 12 | current;
        let mut buf = [0; 8];
        BigEndian::write_u64(&mut buf, word);
        buf
    }

    /// Recovers the setpoints from a packed payload, within one quantization step.
    pub fn unpack(data: &[u8], limits: &Limits) -> Result<Self, FrameParseError> {
        if data.len() != 8 {
            return Err(FrameParseError::LengthMismatch {
                expected: 8,
                actual: data.len(),
            });
        }
        let word = BigEndian::read_u64(data);
        let field = |shift: u32, range: PhysicalRange| {
            from_fixed((word >> shift) as u32 & range.max_code(), range)
        };
        Ok(HybridControl {
            kp: field(49, limits.kp),
            kd: field(40, limits.kd),
            position: field(24, limits.position),
            speed: field(12, limits.speed),
            current: field(0, limits.current),
        })
    }
}

/// Every command a controller can send to a motor.
///
/// Commands are plain values; [`Command::encode`] turns one into a [`CommandFrame`] without
/// side effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Make the current position the zero position.
    SetZero {
        /// Target motor.
        address: MotorAddress,
    },
    /// Switch between automatic feedback and response mode.
    SetCommunicationMode {
        /// Target motor.
        address: MotorAddress,
        /// Mode to switch to.
        mode: CommunicationMode,
    },
    /// Reset every motor on the bus to [`MotorAddress::DEFAULT`].
    ResetIdBroadcast,
    /// Give a motor a new id.
    ResetId {
        /// Target motor.
        address: MotorAddress,
        /// Id the motor takes.
        new_address: MotorAddress,
    },
    /// Ask a motor for its communication mode.
    QueryCommunicationMode {
        /// Target motor.
        address: MotorAddress,
    },
    /// Ask the motors on the bus for their id.
    QueryId,
    /// Impedance control with scaled setpoints.
    HybridControl {
        /// Target motor.
        address: MotorAddress,
        /// Setpoints.
        control: HybridControl,
    },
    /// Move to a position given as a raw float.
    SetPosition {
        /// Target motor.
        address: MotorAddress,
        /// Target position, transmitted as its IEEE-754 bits.
        position: f32,
        /// Speed limit, saturated to 18000.
        speed: u16,
        /// Current limit, saturated to 3000.
        current: u16,
        /// Reply requested.
        ack: AckType,
    },
    /// Run at a speed given as a raw float.
    SetSpeed {
        /// Target motor.
        address: MotorAddress,
        /// Target speed, transmitted as its IEEE-754 bits.
        speed: f32,
        /// Current limit, saturated to 3000.
        current: u16,
        /// Reply requested.
        ack: AckType,
    },
    /// Current, torque or braking control.
    ControlWithMode {
        /// Target motor.
        address: MotorAddress,
        /// Control mode.
        mode: ControlMode,
        /// Current or torque code, saturated to ±2000 in current mode and ±3000 otherwise.
        value: i16,
        /// Reply requested.
        ack: AckType,
    },
    /// Set the acceleration parameter.
    SetAcceleration {
        /// Target motor.
        address: MotorAddress,
        /// Acceleration, saturated to 2000.
        acceleration: u16,
        /// Reply requested, at most [`AckType::Type2`].
        ack: AckType,
    },
    /// Set the linkage gain and the speed loop KI.
    SetLinkageSpeedKi {
        /// Target motor.
        address: MotorAddress,
        /// Linkage gain, saturated to 10000.
        linkage: u16,
        /// Speed loop KI, saturated to 10000.
        speed_ki: u16,
        /// Reply requested, at most [`AckType::Type2`].
        ack: AckType,
    },
    /// Set the feedback KP and KD.
    SetFeedbackKpKd {
        /// Target motor.
        address: MotorAddress,
        /// Feedback KP, saturated to 10000.
        kp: u16,
        /// Feedback KD, saturated to 10000.
        kd: u16,
        /// Reply requested, at most [`AckType::Type2`].
        ack: AckType,
    },
    /// Read one parameter; the motor answers with a type 5 frame.
    GetParameter {
        /// Target motor.
        address: MotorAddress,
        /// Parameter to read.
        parameter: ParameterCode,
    },
}

impl Command {
    /// Current control, the [`ControlMode::Current`] flavour of [`Command::ControlWithMode`].
    pub fn set_current(address: MotorAddress, current: i16, ack: AckType) -> Self {
        Command::ControlWithMode {
            address,
            mode: ControlMode::Current,
            value: current,
            ack,
        }
    }

    /// Torque control in N·m, the [`ControlMode::Torque`] flavour of [`Command::ControlWithMode`].
    ///
    /// The torque is saturated to [`PhysicalRange::TORQUE`] and sent in units of 0.01 N·m.
    pub fn set_torque(address: MotorAddress, torque: f32, ack: AckType) -> Self {
        let value = (PhysicalRange::TORQUE.clamp(torque) * TORQUE_UNITS_PER_NM).round() as i16;
        Command::ControlWithMode {
            address,
            mode: ControlMode::Torque,
            value,
            ack,
        }
    }

    /// Builds a parameter read from a raw instruction code.
    pub fn get_parameter(address: MotorAddress, code: u8) -> Result<Self, EncodeError> {
        use num_traits::FromPrimitive;
        let parameter = ParameterCode::from_u8(code).ok_or(EncodeError::ParameterCode(code))?;
        Ok(Command::GetParameter { address, parameter })
    }

    /// Encodes the command. Fails when an argument cannot be expressed on the wire; nothing is
    /// transmitted in that case.
    pub fn encode(&self, limits: &Limits) -> Result<CommandFrame, EncodeError> {
        let frame = match *self {
            Command::SetZero { address } => config_frame(address, CMD_SET_ZERO),
            Command::SetCommunicationMode { address, mode } => config_frame(address, mode as u8),
            Command::ResetIdBroadcast => {
                let [hi, lo] = MotorAddress::RESET_SENTINEL.to_bytes();
                CommandFrame::new(
                    CONFIG_CAN_ID,
                    [hi, lo, 0x00, CMD_RESET_ID_BROADCAST, hi, lo],
                )
            }
            Command::ResetId {
                address,
                new_address,
            } => {
                let [hi, lo] = address.to_bytes();
                let [new_hi, new_lo] = new_address.to_bytes();
                CommandFrame::new(
                    CONFIG_CAN_ID,
                    [hi, lo, 0x00, CMD_RESET_ID, new_hi, new_lo],
                )
            }
            Command::QueryCommunicationMode { address } => config_frame(address, CMD_QUERY_MODE),
            Command::QueryId => {
                let [hi, lo] = MotorAddress::QUERY_SENTINEL.to_bytes();
                CommandFrame::new(CONFIG_CAN_ID, [hi, lo, 0x00, CMD_QUERY_ID])
            }
            Command::HybridControl { address, control } => {
                CommandFrame::new(address.id(), control.pack(limits))
            }
            Command::SetPosition {
                address,
                position,
                speed,
                current,
                ack,
            } => {
                let ack = control_ack(ack)?;
                let speed = speed.min(POSITION_SPEED_MAX) as u64;
                let current = current.min(COMMAND_CURRENT_MAX) as u64;
                // tag (3) | position bits (32) | speed (15) | current (12) | ack (2)
                let word = (TAG_POSITION as u64) << 56
                    | (position.to_bits() as u64) << 29
                    | (speed & 0x7FFF) << 14
                    | (current & 0xFFF) << 2
                    | ack as u64;
                let mut data = [0; 8];
                BigEndian::write_u64(&mut data, word);
                CommandFrame::new(address.id(), data)
            }
            Command::SetSpeed {
                address,
                speed,
                current,
                ack,
            } => {
                let ack = control_ack(ack)?;
                let mut data = [TAG_SPEED | ack, 0, 0, 0, 0, 0, 0];
                BigEndian::write_u32(&mut data[1..5], speed.to_bits());
                BigEndian::write_u16(&mut data[5..7], current.min(COMMAND_CURRENT_MAX));
                CommandFrame::new(address.id(), data)
            }
            Command::ControlWithMode {
                address,
                mode,
                value,
                ack,
            } => {
                let ack = control_ack(ack)?;
                let max = match mode {
                    ControlMode::Current => CURRENT_MODE_MAX,
                    _ => TORQUE_MODE_MAX,
                };
                let mut data = [TAG_CURRENT | (mode as u8) << 2 | ack, 0, 0];
                BigEndian::write_i16(&mut data[1..3], value.clamp(-max, max));
                CommandFrame::new(address.id(), data)
            }
            Command::SetAcceleration {
                address,
                acceleration,
                ack,
            } => {
                let ack = parameter_ack(ack)?;
                let mut data = [TAG_SET_PARAMETER | ack, SUB_ACCELERATION, 0, 0];
                BigEndian::write_u16(
                    &mut data[2..4],
                    PhysicalRange::ACCELERATION.limit_u16(acceleration),
                );
                CommandFrame::new(address.id(), data)
            }
            Command::SetLinkageSpeedKi {
                address,
                linkage,
                speed_ki,
                ack,
            } => {
                let ack = parameter_ack(ack)?;
                let mut data = [TAG_SET_PARAMETER | ack, SUB_LINKAGE_SPEED_KI, 0, 0, 0, 0];
                BigEndian::write_u16(&mut data[2..4], PhysicalRange::LINKAGE.limit_u16(linkage));
                BigEndian::write_u16(&mut data[4..6], PhysicalRange::SPEED_KI.limit_u16(speed_ki));
                CommandFrame::new(address.id(), data)
            }
            Command::SetFeedbackKpKd {
                address,
                kp,
                kd,
                ack,
            } => {
                let ack = parameter_ack(ack)?;
                let mut data = [TAG_SET_PARAMETER | ack, SUB_FEEDBACK_KP_KD, 0, 0, 0, 0];
                BigEndian::write_u16(&mut data[2..4], PhysicalRange::FEEDBACK_KP.limit_u16(kp));
                BigEndian::write_u16(&mut data[4..6], PhysicalRange::FEEDBACK_KD.limit_u16(kd));
                CommandFrame::new(address.id(), data)
            }
            Command::GetParameter { address, parameter } => {
                CommandFrame::new(address.id(), [TAG_GET_PARAMETER, parameter as u8])
            }
        };
        Ok(frame)
    }
}

/// Builds the automatic feedback mode current command for up to eight motors.
///
/// `currents[n]` drives the motor in feedback slot `n`. Slots 0 to 3 go out on `0x1FF`; a second
/// frame on `0x2FF` carries slots 4 to 7 when more than four currents are given.
pub fn group_current_frames(currents: &[i16]) -> Result<Vec<CommandFrame>, EncodeError> {
    if currents.is_empty() || currents.len() > 8 {
        return Err(EncodeError::GroupSize(currents.len()));
    }
    let banks = if currents.len() > 4 { 2 } else { 1 };
    let slots = currents
        .iter()
        .copied()
        .pad_using(banks * 4, |_| 0)
        .collect::<Vec<_>>();
    Ok(slots
        .chunks(4)
        .zip([GROUP_CURRENT_LOW_ID, GROUP_CURRENT_HIGH_ID])
        .map(|(bank, id)| {
            let mut data = [0; 8];
            BigEndian::write_i16_into(bank, &mut data);
            CommandFrame::new(id, data)
        })
        .collect())
}

fn config_frame(address: MotorAddress, command: u8) -> CommandFrame {
    let [hi, lo] = address.to_bytes();
    CommandFrame::new(CONFIG_CAN_ID, [hi, lo, 0x00, command])
}

fn control_ack(ack: AckType) -> Result<u8, EncodeError> {
    match ack {
        AckType::NoAck | AckType::Type1 | AckType::Type2 | AckType::Type3 => Ok(ack as u8),
        _ => Err(EncodeError::AckType(ack)),
    }
}

fn parameter_ack(ack: AckType) -> Result<u8, EncodeError> {
    match ack {
        AckType::NoAck | AckType::Type1 | AckType::Type2 => Ok(ack as u8),
        _ => Err(EncodeError::AckType(ack)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn motor(id: u16) -> MotorAddress {
        MotorAddress::new(id).unwrap()
    }

    fn encode(command: Command) -> (u16, Vec<u8>) {
        let frame = command.encode(&Limits::default()).unwrap();
        (frame.destination(), frame.payload().to_vec())
    }

    #[test]
    fn set_zero() {
        let (id, data) = encode(Command::SetZero {
            address: motor(0x0102),
        });
        assert_eq!(id, 0x7FF);
        assert_eq!(data, vec![0x01, 0x02, 0x00, 0x03]);
    }

    #[test]
    fn set_communication_mode() {
        let (_, data) = encode(Command::SetCommunicationMode {
            address: motor(3),
            mode: CommunicationMode::Automatic,
        });
        assert_eq!(data, vec![0x00, 0x03, 0x00, 0x01]);
    }

    #[test]
    fn reset_ids() {
        let (id, data) = encode(Command::ResetIdBroadcast);
        assert_eq!(id, 0x7FF);
        assert_eq!(data, vec![0x7F, 0x7F, 0x00, 0x05, 0x7F, 0x7F]);

        let (id, data) = encode(Command::ResetId {
            address: motor(1),
            new_address: motor(0x0203),
        });
        assert_eq!(id, 0x7FF);
        assert_eq!(data, vec![0x00, 0x01, 0x00, 0x04, 0x02, 0x03]);
    }

    #[test]
    fn queries() {
        let (_, data) = encode(Command::QueryCommunicationMode { address: motor(5) });
        assert_eq!(data, vec![0x00, 0x05, 0x00, 0x81]);
        let (id, data) = encode(Command::QueryId);
        assert_eq!(id, 0x7FF);
        assert_eq!(data, vec![0xFF, 0xFF, 0x00, 0x82]);
    }

    #[test]
    fn hybrid_control_midpoints() {
        let (id, data) = encode(Command::HybridControl {
            address: motor(2),
            control: HybridControl {
                kp: 250.0,
                kd: 2.5,
                position: 0.0,
                speed: 0.0,
                current: 0.0,
            },
        });
        assert_eq!(id, 2);
        assert_eq!(data, vec![0x10, 0x01, 0x00, 0x80, 0x00, 0x80, 0x08, 0x00]);
    }

    #[test]
    fn hybrid_control_saturates() {
        let control = HybridControl {
            kp: 1000.0,
            kd: 50.0,
            position: 20.0,
            speed: 100.0,
            current: 40.0,
        };
        assert_eq!(
            control.pack(&Limits::default()),
            [0x1F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        let control = HybridControl {
            kp: -1.0,
            kd: -1.0,
            position: -20.0,
            speed: -100.0,
            current: -40.0,
        };
        assert_eq!(control.pack(&Limits::default()), [0; 8]);
    }

    #[test]
    fn hybrid_control_round_trip() {
        let limits = Limits::default();
        let control = HybridControl {
            kp: 123.4,
            kd: 1.7,
            position: -3.14,
            speed: 7.5,
            current: -12.25,
        };
        let back = HybridControl::unpack(&control.pack(&limits), &limits).unwrap();
        assert!((back.kp - control.kp).abs() <= limits.kp.step());
        assert!((back.kd - control.kd).abs() <= limits.kd.step());
        assert!((back.position - control.position).abs() <= limits.position.step());
        assert!((back.speed - control.speed).abs() <= limits.speed.step());
        assert!((back.current - control.current).abs() <= limits.current.step());
    }

    #[test]
    fn hybrid_unpack_needs_eight_bytes() {
        assert_eq!(
            HybridControl::unpack(&[0; 7], &Limits::default()),
            Err(FrameParseError::LengthMismatch {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn set_position() {
        let (id, data) = encode(Command::SetPosition {
            address: motor(1),
            position: 1.0,
            speed: 100,
            current: 200,
            ack: AckType::Type1,
        });
        assert_eq!(id, 1);
        assert_eq!(data, vec![0x27, 0xF0, 0x00, 0x00, 0x00, 0x19, 0x03, 0x21]);

        let (_, data) = encode(Command::SetPosition {
            address: motor(1),
            position: -3.25,
            speed: 20000,
            current: 5000,
            ack: AckType::Type3,
        });
        assert_eq!(data, vec![0x38, 0x0A, 0x00, 0x00, 0x11, 0x94, 0x2E, 0xE3]);
    }

    #[test]
    fn set_position_rejects_feedback_only_acks() {
        let err = Command::SetPosition {
            address: motor(1),
            position: 0.0,
            speed: 0,
            current: 0,
            ack: AckType::Type4,
        }
        .encode(&Limits::default())
        .unwrap_err();
        assert_eq!(err, EncodeError::AckType(AckType::Type4));
    }

    #[test]
    fn set_speed() {
        let (_, data) = encode(Command::SetSpeed {
            address: motor(1),
            speed: 1.0,
            current: 500,
            ack: AckType::Type2,
        });
        assert_eq!(data, vec![0x42, 0x3F, 0x80, 0x00, 0x00, 0x01, 0xF4]);
    }

    #[test]
    fn set_current() {
        let (id, data) = encode(Command::set_current(motor(4), 100, AckType::Type1));
        assert_eq!(id, 4);
        assert_eq!(data, vec![0x61, 0x00, 0x64]);

        let (_, data) = encode(Command::set_current(motor(4), 2500, AckType::NoAck));
        assert_eq!(data, vec![0x60, 0x07, 0xD0]);
    }

    #[test]
    fn set_torque() {
        let (_, data) = encode(Command::set_torque(motor(1), 1.5, AckType::Type1));
        assert_eq!(data, vec![0x65, 0x00, 0x96]);

        let (_, data) = encode(Command::set_torque(motor(1), -35.0, AckType::Type2));
        assert_eq!(data, vec![0x66, 0xF4, 0x48]);

        let (_, data) = encode(Command::set_torque(motor(1), f32::NAN, AckType::NoAck));
        assert_eq!(data, vec![0x64, 0xF4, 0x48]);
    }

    #[test]
    fn control_with_mode() {
        let (_, data) = encode(Command::ControlWithMode {
            address: motor(1),
            mode: ControlMode::Torque,
            value: -3500,
            ack: AckType::Type2,
        });
        assert_eq!(data, vec![0x66, 0xF4, 0x48]);

        let (_, data) = encode(Command::ControlWithMode {
            address: motor(1),
            mode: ControlMode::RegenerativeBrake,
            value: 0,
            ack: AckType::Type3,
        });
        assert_eq!(data, vec![0x73, 0x00, 0x00]);
    }

    #[test]
    fn parameter_setters() {
        let (_, data) = encode(Command::SetAcceleration {
            address: motor(1),
            acceleration: 3000,
            ack: AckType::Type1,
        });
        assert_eq!(data, vec![0xC1, 0x01, 0x07, 0xD0]);

        let (_, data) = encode(Command::SetLinkageSpeedKi {
            address: motor(1),
            linkage: 500,
            speed_ki: 20000,
            ack: AckType::NoAck,
        });
        assert_eq!(data, vec![0xC0, 0x02, 0x01, 0xF4, 0x27, 0x10]);

        let (_, data) = encode(Command::SetFeedbackKpKd {
            address: motor(1),
            kp: 1,
            kd: 2,
            ack: AckType::Type2,
        });
        assert_eq!(data, vec![0xC2, 0x03, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn parameter_setters_reject_type3() {
        let err = Command::SetAcceleration {
            address: motor(1),
            acceleration: 10,
            ack: AckType::Type3,
        }
        .encode(&Limits::default())
        .unwrap_err();
        assert_eq!(err, EncodeError::AckType(AckType::Type3));
    }

    #[test]
    fn get_parameter() {
        let (_, data) = encode(Command::get_parameter(motor(1), 5).unwrap());
        assert_eq!(data, vec![0xE0, 0x05]);
        assert_eq!(
            Command::get_parameter(motor(1), 10).unwrap_err(),
            EncodeError::ParameterCode(10)
        );
    }

    #[test]
    fn group_current() {
        let frames = group_current_frames(&[1, -1, 256]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].destination(), 0x1FF);
        assert_eq!(
            frames[0].payload().to_vec(),
            vec![0x00, 0x01, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00]
        );

        let frames = group_current_frames(&[0, 0, 0, 0, 7]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].destination(), 0x2FF);
        assert_eq!(
            frames[1].payload().to_vec(),
            vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );

        assert_eq!(
            group_current_frames(&[]).unwrap_err(),
            EncodeError::GroupSize(0)
        );
        assert_eq!(
            group_current_frames(&[0; 9]).unwrap_err(),
            EncodeError::GroupSize(9)
        );
    }
}
