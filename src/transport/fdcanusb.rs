use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use ::fdcanusb::{CanFdFrame, FdCanUSB};
use log::debug;

use crate::frame::{CommandFrame, FeedbackFrame};
use crate::transport::Bus;
use crate::BusError;

/// A [`Bus`] over an [fdcanusb](https://mjbots.com/products/fdcanusb) adapter.
///
/// The adapter has to be configured for classic CAN at the bitrate of the motors. Receive waits
/// are bounded by the serial port timeout; the `wait` argument is not forwarded.
pub struct FdCanUsbBus<T>
where
    T: Read + Write,
{
    transport: Mutex<FdCanUSB<T>>,
}

impl FdCanUsbBus<::fdcanusb::serial2::SerialPort> {
    /// Opens the adapter at `path`.
    ///
    /// ```no_run
    /// # fn main() -> std::io::Result<()> {
    /// let bus = encos::transport::FdCanUsbBus::serial2(
    ///     "/dev/fdcanusb",
    ///     fdcanusb::serial2::KeepSettings,
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn serial2(
        path: impl AsRef<std::path::Path>,
        serial_settings: impl ::fdcanusb::serial2::IntoSettings,
    ) -> Result<Self, std::io::Error> {
        Ok(Self::new(FdCanUSB::open(path, serial_settings)?))
    }
}

impl<T> FdCanUsbBus<T>
where
    T: Read + Write,
{
    /// Wraps an opened adapter.
    pub fn new(transport: FdCanUSB<T>) -> Self {
        FdCanUsbBus {
            transport: Mutex::new(transport),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FdCanUSB<T>>, BusError> {
        self.transport
            .lock()
            .map_err(|_| BusError::msg("fdcanusb transport lock poisoned"))
    }
}

impl<T> Bus for FdCanUsbBus<T>
where
    T: Read + Write,
{
    fn send(&self, frame: &CommandFrame) -> Result<(), BusError> {
        let can_frame = CanFdFrame::new(frame.destination(), frame.payload().as_slice())
            .map_err(|e| BusError::msg(format!("invalid frame: {:?}", e)))?;
        self.lock()?
            .write(can_frame)
            .map_err(|e| BusError::msg(format!("fdcanusb write failed: {:?}", e)))
    }

    fn receive(&self, _wait: Duration) -> Result<Option<FeedbackFrame>, BusError> {
        match self.lock()?.read() {
            Ok(frame) => {
                debug!("fdcanusb rx {:#05x}", frame.arbitration_id);
                FeedbackFrame::new(frame.arbitration_id, &frame.data)
                    .map(Some)
                    .map_err(BusError::new)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
