//! Signal line levels shared by the bit-banged bus drivers.

/// Pin logic level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinLevel {
    /// Logic low (0V or ground).
    Low,
    /// Logic high (VDD).
    High,
}

impl PinLevel {
    pub const fn is_high(self) -> bool {
        matches!(self, PinLevel::High)
    }

    pub const fn is_low(self) -> bool {
        matches!(self, PinLevel::Low)
    }
}

impl From<bool> for PinLevel {
    fn from(value: bool) -> Self {
        if value {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl From<PinLevel> for bool {
    fn from(level: PinLevel) -> bool {
        matches!(level, PinLevel::High)
    }
}
