//! Fixed-point scaling between physical quantities and the unsigned codes packed into frames.

use crate::DomainError;

/// A physical interval `[min, max]` mapped linearly onto the codes `0..=2^bits - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalRange {
    min: f32,
    max: f32,
    bits: u8,
}

impl PhysicalRange {
    /// Proportional gain of hybrid control.
    pub const KP: PhysicalRange = PhysicalRange::constant(0.0, 500.0, 12);
    /// Derivative gain of hybrid control.
    pub const KD: PhysicalRange = PhysicalRange::constant(0.0, 5.0, 9);
    /// Position in rad.
    pub const POSITION: PhysicalRange = PhysicalRange::constant(-12.5, 12.5, 16);
    /// Speed in rad/s.
    pub const SPEED: PhysicalRange = PhysicalRange::constant(-18.0, 18.0, 12);
    /// Current in A.
    pub const CURRENT: PhysicalRange = PhysicalRange::constant(-30.0, 30.0, 12);
    /// Torque in N·m.
    pub const TORQUE: PhysicalRange = PhysicalRange::constant(-30.0, 30.0, 12);
    /// Acceleration parameter.
    pub const ACCELERATION: PhysicalRange = PhysicalRange::constant(0.0, 2000.0, 16);
    /// Linkage gain parameter.
    pub const LINKAGE: PhysicalRange = PhysicalRange::constant(0.0, 10000.0, 16);
    /// Speed loop KI parameter.
    pub const SPEED_KI: PhysicalRange = PhysicalRange::constant(0.0, 10000.0, 16);
    /// Feedback KP parameter.
    pub const FEEDBACK_KP: PhysicalRange = PhysicalRange::constant(0.0, 10000.0, 16);
    /// Feedback KD parameter.
    pub const FEEDBACK_KD: PhysicalRange = PhysicalRange::constant(0.0, 10000.0, 16);

    const fn constant(min: f32, max: f32, bits: u8) -> Self {
        PhysicalRange { min, max, bits }
    }

    /// Registers a custom range. Fails unless `min < max` and `bits` is within `1..=16`.
    pub fn new(min: f32, max: f32, bits: u8) -> Result<Self, DomainError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(DomainError::NonFinite);
        }
        if !(1..=16).contains(&bits) {
            return Err(DomainError::BitWidth(bits));
        }
        if min == max {
            return Err(DomainError::EmptyRange);
        }
        if min > max {
            return Err(DomainError::InvertedRange);
        }
        Ok(PhysicalRange { min, max, bits })
    }

    /// Lower bound.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Width of the code in bits.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Largest code, `2^bits - 1`.
    pub fn max_code(&self) -> u32 {
        (1u32 << self.bits) - 1
    }

    /// Size of one code step in physical units.
    pub fn step(&self) -> f32 {
        (self.max - self.min) / self.max_code() as f32
    }

    /// Saturates `value` into the range. NaN saturates to `min`.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Saturates an integer parameter to the upper bound of the range.
    pub fn limit_u16(&self, value: u16) -> u16 {
        let max = self.max.min(u16::MAX as f32) as u16;
        value.min(max)
    }
}

/// Converts a physical value to its fixed-point code, saturating at the range edges.
pub fn to_fixed(value: f32, range: PhysicalRange) -> u32 {
    let span = range.max - range.min;
    if span <= 0.0 {
        return 0;
    }
    let normalized = (range.clamp(value) - range.min) / span;
    let code = (normalized * range.max_code() as f32).round() as u32;
    code.min(range.max_code())
}

/// Converts a fixed-point code back to a physical value. Bits above `range.bits` are ignored.
pub fn from_fixed(code: u32, range: PhysicalRange) -> f32 {
    let span = range.max - range.min;
    if span <= 0.0 {
        return range.min;
    }
    let code = code & range.max_code();
    code as f32 * span / range.max_code() as f32 + range.min
}

/// The ranges used to pack hybrid control commands and unpack type 1 feedback.
///
/// The defaults are the vendor limits. Motors flashed with other limits need a matching table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Proportional gain.
    pub kp: PhysicalRange,
    /// Derivative gain.
    pub kd: PhysicalRange,
    /// Position.
    pub position: PhysicalRange,
    /// Speed.
    pub speed: PhysicalRange,
    /// Current.
    pub current: PhysicalRange,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            kp: PhysicalRange::KP,
            kd: PhysicalRange::KD,
            position: PhysicalRange::POSITION,
            speed: PhysicalRange::SPEED,
            current: PhysicalRange::CURRENT,
        }
    }
}

impl Limits {
    /// Replaces the position, speed and current ranges, keeping the bit widths of the wire format.
    pub fn with_motion(
        self,
        position: (f32, f32),
        speed: (f32, f32),
        current: (f32, f32),
    ) -> Result<Self, DomainError> {
        Ok(Limits {
            position: PhysicalRange::new(position.0, position.1, self.position.bits)?,
            speed: PhysicalRange::new(speed.0, speed.1, self.speed.bits)?,
            current: PhysicalRange::new(current.0, current.1, self.current.bits)?,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn edges_map_to_extreme_codes() {
        for range in [
            PhysicalRange::KP,
            PhysicalRange::KD,
            PhysicalRange::POSITION,
            PhysicalRange::SPEED,
            PhysicalRange::CURRENT,
        ] {
            assert_eq!(to_fixed(range.min(), range), 0);
            assert_eq!(to_fixed(range.max(), range), range.max_code());
        }
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let range = PhysicalRange::POSITION;
        assert_eq!(to_fixed(-100.0, range), 0);
        assert_eq!(to_fixed(100.0, range), 0xFFFF);
        assert_eq!(to_fixed(f32::INFINITY, range), 0xFFFF);
        assert_eq!(to_fixed(f32::NEG_INFINITY, range), 0);
        assert_eq!(to_fixed(f32::NAN, range), 0);
    }

    #[test]
    fn round_trip_within_one_step() {
        for range in [
            PhysicalRange::KP,
            PhysicalRange::KD,
            PhysicalRange::POSITION,
            PhysicalRange::SPEED,
            PhysicalRange::CURRENT,
        ] {
            let span = range.max() - range.min();
            for i in 0..=1000 {
                let value = range.min() + span * i as f32 / 1000.0;
                let back = from_fixed(to_fixed(value, range), range);
                assert!(
                    (back - value).abs() <= range.step(),
                    "{:?}: {} -> {} exceeds {}",
                    range,
                    value,
                    back,
                    range.step()
                );
            }
        }
    }

    #[test]
    fn monotonic() {
        let range = PhysicalRange::KD;
        let mut last = 0;
        for i in 0..=500 {
            let code = to_fixed(i as f32 * 0.01, range);
            assert!(code >= last);
            last = code;
        }
    }

    #[test]
    fn midpoint() {
        // 12 bit speed: 0.0 rad/s sits between codes 2047 and 2048.
        assert_eq!(to_fixed(0.0, PhysicalRange::SPEED), 2048);
        assert_eq!(to_fixed(0.0, PhysicalRange::POSITION), 0x8000);
    }

    #[test]
    fn from_fixed_masks_extra_bits() {
        let range = PhysicalRange::KD;
        assert_eq!(from_fixed(0x1FF, range), from_fixed(0xFFFF, range));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert_eq!(PhysicalRange::new(1.0, 1.0, 12), Err(DomainError::EmptyRange));
        assert_eq!(PhysicalRange::new(2.0, 1.0, 12), Err(DomainError::InvertedRange));
        assert_eq!(PhysicalRange::new(0.0, 1.0, 0), Err(DomainError::BitWidth(0)));
        assert_eq!(PhysicalRange::new(0.0, 1.0, 17), Err(DomainError::BitWidth(17)));
        assert_eq!(
            PhysicalRange::new(f32::NAN, 1.0, 8),
            Err(DomainError::NonFinite)
        );
        assert!(Limits::default()
            .with_motion((-3.0, 3.0), (5.0, 5.0), (-1.0, 1.0))
            .is_err());
    }

    #[test]
    fn integer_parameters_saturate() {
        assert_eq!(PhysicalRange::ACCELERATION.limit_u16(5000), 2000);
        assert_eq!(PhysicalRange::LINKAGE.limit_u16(9999), 9999);
        assert_eq!(PhysicalRange::FEEDBACK_KD.limit_u16(u16::MAX), 10000);
    }
}
