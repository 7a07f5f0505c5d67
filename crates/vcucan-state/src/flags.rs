use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Sticky module error bits reported on the status segment.
///
/// A raised bit stays raised until whoever owns the condition clears it.
/// Bit 0 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ModuleError {
    /// A transmit timed out or the peripheral refused a frame.
    Transport = 1 << 1,
    /// A broadcast cycle failed to send at least one segment.
    Broadcast = 1 << 2,
    /// The inverter stopped broadcasting.
    InverterTimeout = 1 << 3,
    /// The inverter reports a POST or run fault.
    InverterFault = 1 << 4,
    /// The transport was stopped by an emergency stop.
    EmergencyStop = 1 << 5,
}

impl ModuleError {
    pub const ALL: [ModuleError; 5] = [
        ModuleError::Transport,
        ModuleError::Broadcast,
        ModuleError::InverterTimeout,
        ModuleError::InverterFault,
        ModuleError::EmergencyStop,
    ];

    pub const fn bit(self) -> u32 {
        self as u32
    }

    pub const fn name(self) -> &'static str {
        match self {
            ModuleError::Transport => "TRANSPORT",
            ModuleError::Broadcast => "BROADCAST",
            ModuleError::InverterTimeout => "INVERTER_TIMEOUT",
            ModuleError::InverterFault => "INVERTER_FAULT",
            ModuleError::EmergencyStop => "EMERGENCY_STOP",
        }
    }
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic bitmask of [`ModuleError`] flags.
#[derive(Debug, Default)]
pub struct ModuleErrors {
    bits: AtomicU32,
}

impl ModuleErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a flag. Returns `true` if it was not already set.
    pub fn raise(&self, flag: ModuleError) -> bool {
        let previous = self.bits.fetch_or(flag.bit(), Ordering::AcqRel);
        previous & flag.bit() == 0
    }

    /// Clear a flag. Returns `true` if it was set.
    pub fn clear(&self, flag: ModuleError) -> bool {
        let previous = self.bits.fetch_and(!flag.bit(), Ordering::AcqRel);
        previous & flag.bit() != 0
    }

    pub fn contains(&self, flag: ModuleError) -> bool {
        self.bits() & flag.bit() != 0
    }

    /// Raw bitmask as transmitted on the status segment.
    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    pub fn is_clear(&self) -> bool {
        self.bits() == 0
    }

    /// Currently raised flags, lowest bit first.
    pub fn active(&self) -> Vec<ModuleError> {
        let bits = self.bits();
        ModuleError::ALL
            .iter()
            .copied()
            .filter(|flag| bits & flag.bit() != 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_sticky_until_cleared() {
        let errors = ModuleErrors::new();
        assert!(errors.is_clear());

        assert!(errors.raise(ModuleError::Transport));
        assert!(!errors.raise(ModuleError::Transport));
        assert!(errors.contains(ModuleError::Transport));
        assert_eq!(errors.bits(), 0b10);

        assert!(errors.clear(ModuleError::Transport));
        assert!(!errors.clear(ModuleError::Transport));
        assert!(errors.is_clear());
    }

    #[test]
    fn active_lists_raised_flags_in_bit_order() {
        let errors = ModuleErrors::new();
        errors.raise(ModuleError::InverterFault);
        errors.raise(ModuleError::Transport);
        assert_eq!(
            errors.active(),
            vec![ModuleError::Transport, ModuleError::InverterFault]
        );
    }

    #[test]
    fn bits_are_distinct() {
        let all = ModuleError::ALL.iter().fold(0u32, |acc, f| {
            assert_eq!(acc & f.bit(), 0, "{f} overlaps");
            acc | f.bit()
        });
        assert_eq!(all.count_ones() as usize, ModuleError::ALL.len());
    }
}
