//! A rust implementation of the ENCOS joint motor CAN protocol.
//!
//! Commands are built with [`protocol::Command`] and encoded into [`frame::CommandFrame`]s;
//! received [`frame::FeedbackFrame`]s are decoded with [`protocol::decode`]. A [`Motor`] ties both
//! to one motor on a shared [`transport::Bus`] and keeps its last known state.
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # fn main() -> Result<(), encos::Error> {
//! use encos::protocol::{AckType, MotorAddress};
//! use encos::transport::MockBus;
//!
//! let bus = MockBus::new();
//! let motor = encos::Motor::new(&bus, MotorAddress::new(1)?);
//! motor.set_position(1.0, 100, 200, AckType::Type1)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mock"))]
//! # fn main() {}
//! ```

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]
#![deny(
// missing_debug_implementations,
missing_docs,
trivial_casts,
trivial_numeric_casts,
unused_extern_crates,
unused_import_braces,
unused_qualifications,
// unused_results
)]
#![warn(clippy::unwrap_used)]

mod error;
pub mod frame;
mod motor;
pub mod protocol;
pub mod transport;

pub use error::*;
#[cfg(feature = "fdcanusb")]
pub use fdcanusb;
pub use motor::{
    send_group_current, InstructionStatus, Motor, MotorConfig, MotorParameters, MotorTelemetry,
};
