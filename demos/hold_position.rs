//! Holds motor #1 at its zero position with hybrid control and prints its state.
//!
//! The motor is switched to response mode first, so every command is answered with a type 1
//! state frame.
mod _logging;

use std::time::Duration;

use encos::protocol::{CommunicationMode, HybridControl, MotorAddress};
use encos::transport::FdCanUsbBus;
use encos::Motor;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    _logging::init("hold_position", 0);

    let bus = FdCanUsbBus::serial2("/dev/fdcanusb", fdcanusb::serial2::KeepSettings)?;
    let mut motor = Motor::new(&bus, MotorAddress::new(1)?);
    motor.set_communication_mode(CommunicationMode::Response)?;

    let hold = HybridControl {
        kp: 20.0,
        kd: 0.5,
        ..HybridControl::default()
    };
    loop {
        motor.hybrid_control(hold)?;
        match motor.update_info() {
            Ok(Some(_)) => {
                let state = motor.telemetry();
                log::info!(
                    "position {:.3} rad, speed {:.3} rad/s, current {:.2} A, {} °C",
                    state.position,
                    state.speed,
                    state.current,
                    state.motor_temperature
                );
                if let Some(error) = state.error().filter(|e| *e != encos::protocol::ErrorCode::NoError) {
                    log::warn!("motor reports {:?}", error);
                }
            }
            Ok(None) => log::warn!("no feedback"),
            Err(e) => log::warn!("{}", e),
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
