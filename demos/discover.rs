//! Finds the motor on the bus, reports its communication mode and reads its tuning parameters.
mod _logging;

use std::time::Duration;

use encos::protocol::ParameterCode;
use encos::transport::FdCanUsbBus;
use encos::{Motor, MotorConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    _logging::init("discover", 1);

    let bus = FdCanUsbBus::serial2("/dev/fdcanusb", fdcanusb::serial2::KeepSettings)?;
    let config = MotorConfig::default().configure(|c| {
        c.receive_timeout = Duration::from_millis(50);
        c.max_retry_times = 5;
        Ok(())
    })?;

    let address = Motor::discover(&bus, &config)?;
    log::info!("found motor {}", address);

    let mut motor = Motor::with_config(&bus, address, config);
    log::info!("communication mode: {:?}", motor.query_communication_mode()?);

    for code in [
        ParameterCode::Acceleration,
        ParameterCode::LinkageKp,
        ParameterCode::SpeedKi,
        ParameterCode::FeedbackKp,
        ParameterCode::FeedbackKd,
    ] {
        motor.get_parameter(code)?;
        motor.update_info()?;
        match motor.parameters().get(code) {
            Some(value) => log::info!("{:?}", value),
            None => log::warn!("no reply for {:?}", code),
        }
    }
    Ok(())
}
