//! A trait for writing and reading CAN frames over an interface.

use std::time::Duration;

use log::trace;

use crate::frame::{CommandFrame, FeedbackFrame};
use crate::BusError;

#[cfg(feature = "fdcanusb")]
mod fdcanusb;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "fdcanusb")]
pub use self::fdcanusb::FdCanUsbBus;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBus;

/// The CAN interface the motors are attached to.
///
/// Methods take `&self` so one bus can be shared by every [`crate::Motor`] on it. Implementations
/// serialize access to the device themselves.
pub trait Bus {
    /// Transmits one frame.
    fn send(&self, frame: &CommandFrame) -> Result<(), BusError>;

    /// Returns the oldest buffered frame, waiting up to `wait` for one to arrive.
    /// `Ok(None)` means nothing arrived in time.
    fn receive(&self, wait: Duration) -> Result<Option<FeedbackFrame>, BusError>;

    /// Returns the newest buffered frame and discards the older ones without decoding them.
    ///
    /// Waits up to `wait` for a first frame, then drains the buffer without waiting.
    fn receive_newest(&self, wait: Duration) -> Result<Option<FeedbackFrame>, BusError> {
        let Some(mut newest) = self.receive(wait)? else {
            return Ok(None);
        };
        while let Some(frame) = self.receive(Duration::ZERO)? {
            trace!(
                "dropping stale frame from {:#05x}: {}",
                newest.source(),
                hex::encode(newest.payload().as_slice())
            );
            newest = frame;
        }
        Ok(Some(newest))
    }
}
