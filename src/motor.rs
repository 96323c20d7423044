//! A session bound to one motor: addressing, command verbs and the cached motor state.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use num_traits::FromPrimitive;

use crate::frame::CommandFrame;
use crate::protocol::{
    decode, group_current_frames, AckType, AutoFeedback, Command, CommunicationMode,
    ControlMode, ErrorCode, Feedback, HybridControl, Limits, MotorAddress, MotorParameter,
    ParameterCode, StateFeedback, AUTO_FEEDBACK_BASE, CONFIG_CAN_ID,
};
use crate::transport::Bus;
use crate::{EncodeError, Error};

/// Session settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    /// How the motor reports its state. Selects the feedback decoder.
    pub comm_mode: CommunicationMode,
    /// Extra attempts made by the request/reply verbs when no reply arrives.
    pub max_retry_times: u8,
    /// How long to wait for a frame.
    ///
    /// Buses that cannot bound a single read, such as the fdcanusb adapter, wait for their own
    /// device timeout instead.
    pub receive_timeout: Duration,
    /// Ranges used for hybrid control and type 1 feedback.
    pub limits: Limits,
}

impl Default for MotorConfig {
    fn default() -> Self {
        MotorConfig {
            comm_mode: CommunicationMode::Response,
            max_retry_times: 3,
            receive_timeout: Duration::from_millis(10),
            limits: Limits::default(),
        }
    }
}

impl MotorConfig {
    /// Use a closure to adjust the configuration.
    ///
    /// ```rust
    /// let config = encos::MotorConfig::default().configure(|c| {
    ///     c.max_retry_times = 5;
    ///     Ok(())
    /// })?;
    /// # Ok::<(), encos::Error>(())
    /// ```
    pub fn configure<F>(mut self, f: F) -> Result<Self, Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        f(&mut self)?;
        Ok(self)
    }
}

/// The last known state of a motor.
///
/// Replaced as a whole by every decoded state frame. Fields a frame does not carry keep their
/// previous value. Automatic feedback frames only refresh the error code and the motor
/// temperature; their raw counts are kept apart, see [`Motor::auto_feedback`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MotorTelemetry {
    /// Error code reported with the last state frame.
    pub error_code: u8,
    /// Position in rad.
    pub position: f32,
    /// Speed in rad/s.
    pub speed: f32,
    /// Current in A.
    pub current: f32,
    /// Motor temperature in °C.
    pub motor_temperature: i16,
    /// Driver MOSFET temperature in °C.
    pub mos_temperature: i16,
}

impl MotorTelemetry {
    /// The reported error, if the code is known.
    pub fn error(&self) -> Option<ErrorCode> {
        ErrorCode::from_u8(self.error_code)
    }

    fn merge_state(&self, state: &StateFeedback) -> Self {
        MotorTelemetry {
            error_code: state.error_code,
            position: state.position.unwrap_or(self.position),
            speed: state.speed.unwrap_or(self.speed),
            current: state.current,
            motor_temperature: state.motor_temperature,
            mos_temperature: state.mos_temperature.unwrap_or(self.mos_temperature),
        }
    }

    fn merge_auto(&self, state: &AutoFeedback) -> Self {
        MotorTelemetry {
            error_code: state.error_code,
            motor_temperature: state.temperature as i16,
            ..*self
        }
    }
}

/// Parameters read back from the motor, `None` until the first reply.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MotorParameters {
    pub position: Option<f32>,
    pub speed: Option<f32>,
    pub current: Option<f32>,
    pub power: Option<f32>,
    pub acceleration: Option<u16>,
    pub linkage_kp: Option<u16>,
    pub speed_ki: Option<u16>,
    pub feedback_kp: Option<u16>,
    pub feedback_kd: Option<u16>,
}

impl MotorParameters {
    fn store(&mut self, parameter: MotorParameter) {
        match parameter {
            MotorParameter::Position(v) => self.position = Some(v),
            MotorParameter::Speed(v) => self.speed = Some(v),
            MotorParameter::Current(v) => self.current = Some(v),
            MotorParameter::Power(v) => self.power = Some(v),
            MotorParameter::Acceleration(v) => self.acceleration = Some(v),
            MotorParameter::LinkageKp(v) => self.linkage_kp = Some(v),
            MotorParameter::SpeedKi(v) => self.speed_ki = Some(v),
            MotorParameter::FeedbackKp(v) => self.feedback_kp = Some(v),
            MotorParameter::FeedbackKd(v) => self.feedback_kd = Some(v),
        }
    }

    /// The cached value of one parameter.
    pub fn get(&self, code: ParameterCode) -> Option<MotorParameter> {
        match code {
            ParameterCode::Position => self.position.map(MotorParameter::Position),
            ParameterCode::Speed => self.speed.map(MotorParameter::Speed),
            ParameterCode::Current => self.current.map(MotorParameter::Current),
            ParameterCode::Power => self.power.map(MotorParameter::Power),
            ParameterCode::Acceleration => self.acceleration.map(MotorParameter::Acceleration),
            ParameterCode::LinkageKp => self.linkage_kp.map(MotorParameter::LinkageKp),
            ParameterCode::SpeedKi => self.speed_ki.map(MotorParameter::SpeedKi),
            ParameterCode::FeedbackKp => self.feedback_kp.map(MotorParameter::FeedbackKp),
            ParameterCode::FeedbackKd => self.feedback_kd.map(MotorParameter::FeedbackKd),
        }
    }
}

/// Outcome of a parameter setting instruction, from a type 4 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionStatus {
    /// Instruction that was executed.
    pub instruction: u8,
    /// Execution status.
    pub status: u8,
}

/// One motor on a shared [`Bus`].
///
/// Command verbs encode and transmit without waiting. Replies are picked up with
/// [`Motor::update_info`], which keeps only the newest buffered frame.
pub struct Motor<'a, B>
where
    B: Bus + ?Sized,
{
    bus: &'a B,
    address: MotorAddress,
    config: MotorConfig,
    telemetry: MotorTelemetry,
    parameters: MotorParameters,
    last_instruction: Option<InstructionStatus>,
    auto_feedback: Option<AutoFeedback>,
}

impl<'a, B> Motor<'a, B>
where
    B: Bus + ?Sized,
{
    /// Create a new [`Motor`] session with the default configuration.
    pub fn new(bus: &'a B, address: MotorAddress) -> Self {
        Self::with_config(bus, address, MotorConfig::default())
    }

    /// Create a new [`Motor`] session with a custom configuration.
    pub fn with_config(bus: &'a B, address: MotorAddress, config: MotorConfig) -> Self {
        Motor {
            bus,
            address,
            config,
            telemetry: MotorTelemetry::default(),
            parameters: MotorParameters::default(),
            last_instruction: None,
            auto_feedback: None,
        }
    }

    /// The motor this session talks to.
    pub fn address(&self) -> MotorAddress {
        self.address
    }

    /// The session settings.
    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// The last known motor state.
    pub fn telemetry(&self) -> &MotorTelemetry {
        &self.telemetry
    }

    /// Parameters read back so far.
    pub fn parameters(&self) -> &MotorParameters {
        &self.parameters
    }

    /// The last type 4 reply.
    pub fn last_instruction(&self) -> Option<InstructionStatus> {
        self.last_instruction
    }

    /// The last automatic feedback frame, in raw counts.
    pub fn auto_feedback(&self) -> Option<AutoFeedback> {
        self.auto_feedback
    }

    /// Sets the number of extra attempts made by the request/reply verbs.
    pub fn set_max_retry_times(&mut self, times: u8) {
        self.config.max_retry_times = times;
    }

    /// The CAN id this motor's feedback arrives from in the current communication mode.
    /// `None` in automatic feedback mode for motors without a feedback slot.
    pub fn expected_feedback_id(&self) -> Option<u16> {
        match self.config.comm_mode {
            CommunicationMode::Response => Some(self.address.id()),
            CommunicationMode::Automatic => self
                .address
                .feedback_slot()
                .map(|slot| AUTO_FEEDBACK_BASE + slot),
        }
    }

    /// Encodes and transmits a command. Nothing is sent if encoding fails.
    pub fn send(&self, command: Command) -> Result<(), Error> {
        let frame = command.encode(&self.config.limits)?;
        transmit(self.bus, &frame)
    }

    /// Makes the current position the zero position.
    pub fn set_zero(&self) -> Result<(), Error> {
        self.send(Command::SetZero {
            address: self.address,
        })
    }

    /// Switches the motor's communication mode, and the session's decoder with it.
    ///
    /// Automatic feedback is refused for motors without a feedback slot (ids above 8).
    pub fn set_communication_mode(&mut self, mode: CommunicationMode) -> Result<(), Error> {
        if mode == CommunicationMode::Automatic && self.address.feedback_slot().is_none() {
            return Err(EncodeError::NoFeedbackSlot(self.address.id()).into());
        }
        self.send(Command::SetCommunicationMode {
            address: self.address,
            mode,
        })?;
        self.config.comm_mode = mode;
        Ok(())
    }

    /// Gives the motor a new id. The session follows the motor to its new address.
    pub fn reset_id(&mut self, new_address: MotorAddress) -> Result<(), Error> {
        self.send(Command::ResetId {
            address: self.address,
            new_address,
        })?;
        debug!("motor {} renamed to {}", self.address, new_address);
        self.address = new_address;
        Ok(())
    }

    /// Resets every motor on the bus to [`MotorAddress::DEFAULT`] and waits for the acknowledgement.
    pub fn reset_all_ids(&mut self) -> Result<(), Error> {
        request(self.bus, &self.config, Command::ResetIdBroadcast, |reply| {
            matches!(reply, Feedback::IdResetAck).then_some(Ok(()))
        })?;
        self.address = MotorAddress::DEFAULT;
        Ok(())
    }

    /// Asks the motor for its communication mode.
    pub fn query_communication_mode(&self) -> Result<CommunicationMode, Error> {
        let address = self.address;
        request(
            self.bus,
            &self.config,
            Command::QueryCommunicationMode { address },
            |reply| match reply {
                Feedback::InstructionEcho { id, status } if id == address.id() => Some(
                    CommunicationMode::from_u8(status).ok_or_else(|| {
                        Error::UnexpectedReply(format!("unknown communication mode {:#04x}", status))
                    }),
                ),
                _ => None,
            },
        )
    }

    /// Asks the bus for a motor id. See [`Motor::discover`].
    pub fn query_id(&self) -> Result<MotorAddress, Error> {
        Self::discover(self.bus, &self.config)
    }

    /// Asks the motors on `bus` for their id and returns the first answer.
    pub fn discover(bus: &B, config: &MotorConfig) -> Result<MotorAddress, Error> {
        request(bus, config, Command::QueryId, |reply| match reply {
            Feedback::IdQueryReply { id } => Some(
                MotorAddress::new(id)
                    .map_err(|_| Error::UnexpectedReply(format!("invalid motor id {:#06x}", id))),
            ),
            Feedback::IdQueryFailed => Some(Err(Error::IdQueryFailed)),
            _ => None,
        })
    }

    /// Impedance control.
    pub fn hybrid_control(&self, control: HybridControl) -> Result<(), Error> {
        self.send(Command::HybridControl {
            address: self.address,
            control,
        })
    }

    /// Position control. `speed` and `current` are limits, saturated to 18000 and 3000.
    pub fn set_position(
        &self,
        position: f32,
        speed: u16,
        current: u16,
        ack: AckType,
    ) -> Result<(), Error> {
        self.send(Command::SetPosition {
            address: self.address,
            position,
            speed,
            current,
            ack,
        })
    }

    /// Speed control with a current limit.
    pub fn set_speed(&self, speed: f32, current: u16, ack: AckType) -> Result<(), Error> {
        self.send(Command::SetSpeed {
            address: self.address,
            speed,
            current,
            ack,
        })
    }

    /// Current control.
    pub fn set_current(&self, current: i16, ack: AckType) -> Result<(), Error> {
        self.send(Command::set_current(self.address, current, ack))
    }

    /// Torque control in N·m.
    pub fn set_torque(&self, torque: f32, ack: AckType) -> Result<(), Error> {
        self.send(Command::set_torque(self.address, torque, ack))
    }

    /// Current, torque or braking control.
    pub fn control_with_mode(&self, mode: ControlMode, value: i16, ack: AckType) -> Result<(), Error> {
        self.send(Command::ControlWithMode {
            address: self.address,
            mode,
            value,
            ack,
        })
    }

    /// Sets the acceleration parameter.
    pub fn set_acceleration(&self, acceleration: u16, ack: AckType) -> Result<(), Error> {
        self.send(Command::SetAcceleration {
            address: self.address,
            acceleration,
            ack,
        })
    }

    /// Sets the linkage gain and the speed loop KI.
    pub fn set_linkage_speed_ki(&self, linkage: u16, speed_ki: u16, ack: AckType) -> Result<(), Error> {
        self.send(Command::SetLinkageSpeedKi {
            address: self.address,
            linkage,
            speed_ki,
            ack,
        })
    }

    /// Sets the feedback KP and KD.
    pub fn set_feedback_kp_kd(&self, kp: u16, kd: u16, ack: AckType) -> Result<(), Error> {
        self.send(Command::SetFeedbackKpKd {
            address: self.address,
            kp,
            kd,
            ack,
        })
    }

    /// Requests one parameter. The reply is stored by [`Motor::update_info`].
    pub fn get_parameter(&self, parameter: ParameterCode) -> Result<(), Error> {
        self.send(Command::GetParameter {
            address: self.address,
            parameter,
        })
    }

    /// Receives the newest buffered frame and applies it to the session.
    ///
    /// Returns `Ok(None)` when nothing arrived within the receive timeout. A frame from another
    /// id or one that fails to decode is reported as an error and leaves the cached state as it
    /// was.
    pub fn update_info(&mut self) -> Result<Option<Feedback>, Error> {
        let expected = self
            .expected_feedback_id()
            .ok_or(EncodeError::NoFeedbackSlot(self.address.id()))?;
        let Some(frame) = self.bus.receive_newest(self.config.receive_timeout)? else {
            trace!("motor {}: no data", self.address);
            return Ok(None);
        };
        if frame.source() != expected {
            warn!(
                "motor {}: frame from {:#05x}, expected {:#05x}",
                self.address,
                frame.source(),
                expected
            );
            return Err(Error::AddressMismatch {
                expected,
                received: frame.source(),
            });
        }
        let feedback = decode(&frame, self.config.comm_mode, &self.config.limits).map_err(|e| {
            warn!(
                "motor {}: dropping {}: {}",
                self.address,
                hex::encode_upper(frame.payload().as_slice()),
                e
            );
            e
        })?;
        debug!("motor {}: {:?}", self.address, feedback);
        self.apply(&feedback);
        Ok(Some(feedback))
    }

    fn apply(&mut self, feedback: &Feedback) {
        match feedback {
            Feedback::State(state) => self.telemetry = self.telemetry.merge_state(state),
            Feedback::Auto(state) => {
                self.telemetry = self.telemetry.merge_auto(state);
                self.auto_feedback = Some(*state);
            }
            Feedback::InstructionAck {
                instruction,
                status,
                ..
            } => {
                self.last_instruction = Some(InstructionStatus {
                    instruction: *instruction,
                    status: *status,
                })
            }
            Feedback::Parameter { parameter, .. } => {
                self.parameters.store(*parameter);
                let mut telemetry = self.telemetry;
                match *parameter {
                    MotorParameter::Position(v) => telemetry.position = v,
                    MotorParameter::Speed(v) => telemetry.speed = v,
                    MotorParameter::Current(v) => telemetry.current = v,
                    _ => {}
                }
                self.telemetry = telemetry;
            }
            Feedback::IdQueryReply { .. }
            | Feedback::IdQueryFailed
            | Feedback::IdResetAck
            | Feedback::InstructionEcho { .. } => {}
        }
    }
}

/// Sends one current code per automatic feedback slot, starting at slot 0.
///
/// Every frame is encoded before the first one is transmitted.
pub fn send_group_current<B>(bus: &B, currents: &[i16]) -> Result<(), Error>
where
    B: Bus + ?Sized,
{
    for frame in group_current_frames(currents)? {
        transmit(bus, &frame)?;
    }
    Ok(())
}

fn transmit<B>(bus: &B, frame: &CommandFrame) -> Result<(), Error>
where
    B: Bus + ?Sized,
{
    debug!(
        "tx {:#05x}: {}",
        frame.destination(),
        hex::encode_upper(frame.payload().as_slice())
    );
    bus.send(frame)?;
    Ok(())
}

/// Sends `command` on the configuration channel and waits for a reply `accept` recognises.
/// The command is re-sent up to `max_retry_times` times when the wait runs out.
fn request<B, T, F>(
    bus: &B,
    config: &MotorConfig,
    command: Command,
    mut accept: F,
) -> Result<T, Error>
where
    B: Bus + ?Sized,
    F: FnMut(Feedback) -> Option<Result<T, Error>>,
{
    let frame = command.encode(&config.limits)?;
    for attempt in 0..=config.max_retry_times {
        if attempt > 0 {
            debug!(
                "no reply to {:?}, retry {}/{}",
                command, attempt, config.max_retry_times
            );
        }
        transmit(bus, &frame)?;
        let deadline = Instant::now() + config.receive_timeout;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let Some(reply) = bus.receive(wait)? else {
                break;
            };
            if reply.source() != CONFIG_CAN_ID {
                trace!("ignoring frame from {:#05x} while waiting", reply.source());
            } else {
                match decode(&reply, config.comm_mode, &config.limits) {
                    Ok(feedback) => {
                        if let Some(result) = accept(feedback) {
                            return result;
                        }
                        trace!("ignoring {:?} while waiting", feedback);
                    }
                    Err(e) => warn!(
                        "undecodable reply {}: {}",
                        hex::encode_upper(reply.payload().as_slice()),
                        e
                    ),
                }
            }
            if wait.is_zero() {
                break;
            }
        }
    }
    Err(Error::NoResponse)
}
