//! Config register probing.
//!
//! The config register reports the actual source, target and priority counts
//! of the device. Each field is validated on its own: a rejected field keeps
//! the value already held by the instance and only produces a warning.

use axaddrspace::{device::AccessWidth, HostPhysAddr};
use axerrno::AxResult;

use crate::consts::*;
use crate::utils::MmioBus;
use crate::ControllerInstance;

/// Raw value of the 64-bit config register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRegister(pub u64);

impl ConfigRegister {
    /// Read the register as two 32-bit halves, low word first.
    pub fn read<B: MmioBus>(bus: &B, base: HostPhysAddr) -> AxResult<Self> {
        let lo = bus.read(base, AccessWidth::Dword)? as u32;
        let hi = bus.read(HostPhysAddr::from_usize(base.as_usize() + 4), AccessWidth::Dword)? as u32;
        Ok(Self((hi as u64) << 32 | lo as u64))
    }

    pub const fn source_count(&self) -> u32 {
        ((self.0 & PLIC_CONFIG_SOURCES_MASK) >> PLIC_CONFIG_SOURCES_SHIFT) as u32
    }

    pub const fn target_count(&self) -> u32 {
        ((self.0 & PLIC_CONFIG_TARGETS_MASK) >> PLIC_CONFIG_TARGETS_SHIFT) as u32
    }

    pub const fn priority_count(&self) -> u32 {
        ((self.0 & PLIC_CONFIG_PRIORITIES_MASK) >> PLIC_CONFIG_PRIORITIES_SHIFT) as u32
    }

    pub const fn has_threshold(&self) -> bool {
        self.0 & PLIC_CONFIG_HAS_THRESHOLD_MASK != 0
    }

    /// Copy every valid field into `instance`, keep the current value otherwise.
    pub fn apply(&self, instance: &mut ControllerInstance) {
        let targets = self.target_count();
        if is_valid_target_count(targets) {
            instance.target_count = targets;
        } else {
            warn!(
                "IRQCHIP: invalid target count {} in config register, keeping {}",
                targets, instance.target_count
            );
        }

        let sources = self.source_count();
        if is_valid_source_count(sources) {
            instance.source_count = sources;
        } else {
            warn!(
                "IRQCHIP: invalid source count {} in config register, keeping {}",
                sources, instance.source_count
            );
        }

        let priorities = self.priority_count();
        if is_valid_priority_count(priorities) {
            if !priorities.is_power_of_two() {
                warn!(
                    "IRQCHIP: priority count {} is not a power of two, {} bits per source",
                    priorities,
                    crate::layout::priority_bits_per_source(priorities)
                );
            }
            instance.priority_count = priorities;
        } else {
            warn!(
                "IRQCHIP: invalid priority count {} in config register, keeping {}",
                priorities, instance.priority_count
            );
        }

        instance.has_threshold = self.has_threshold();
    }
}

/// Multiple of 4, at least 4, power of two, at most [`PLIC_MAX_TARGET_COUNT`].
pub const fn is_valid_target_count(count: u32) -> bool {
    !(count % 4 != 0 || count < 4)
        && count.is_power_of_two()
        && count as usize <= PLIC_MAX_TARGET_COUNT
}

/// At least 2, at most what the 16-bit config field can report.
pub const fn is_valid_source_count(count: u32) -> bool {
    count >= 2 && count <= PLIC_MAX_SOURCE_COUNT
}

pub const fn is_valid_priority_count(count: u32) -> bool {
    !(count % 4 != 0 || count < 2)
}

/// Read the config register of `instance` and update its counts in place.
///
/// Never fails: a bus error leaves every count untouched.
pub fn probe<B: MmioBus>(instance: &mut ControllerInstance, bus: &B) {
    match ConfigRegister::read(bus, instance.base) {
        Ok(reg) => {
            debug!("IRQCHIP: config register {:#018x}", reg.0);
            reg.apply(instance);
        }
        Err(err) => warn!("IRQCHIP: cannot read config register: {:?}, using defaults", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::FakeBus;

    const BASE: usize = 0x0c00_0000;

    fn encode(sources: u64, targets: u64, priorities: u64, threshold: bool) -> u64 {
        sources | targets << 16 | priorities << 32 | (threshold as u64) << 48
    }

    fn instance() -> ControllerInstance {
        ControllerInstance::new(HostPhysAddr::from_usize(BASE), 0x1000, 40, 4)
    }

    #[test]
    fn decode_fields() {
        let reg = ConfigRegister(encode(64, 8, 32, true));
        assert_eq!(reg.source_count(), 64);
        assert_eq!(reg.target_count(), 8);
        assert_eq!(reg.priority_count(), 32);
        assert!(reg.has_threshold());

        // Bits 46 and 47 are not part of the priority field.
        let reg = ConfigRegister(0xc004 << 32);
        assert_eq!(reg.priority_count(), 4);
        assert!(!reg.has_threshold());
    }

    #[test]
    fn probe_accepts_valid_config() {
        let bus = FakeBus::new();
        bus.poke_config(BASE, encode(100, 8, 32, true));

        let mut ic = instance();
        probe(&mut ic, &bus);
        assert_eq!(ic.source_count, 100);
        assert_eq!(ic.target_count, 8);
        assert_eq!(ic.priority_count, 32);
        assert!(ic.has_threshold);
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn invalid_target_count_keeps_default() {
        let bus = FakeBus::new();
        bus.poke_config(BASE, encode(64, 3, 8, false));

        let mut ic = instance();
        probe(&mut ic, &bus);
        assert_eq!(ic.target_count, 4);
        // The other fields are still taken.
        assert_eq!(ic.source_count, 64);
        assert_eq!(ic.priority_count, 8);
    }

    #[test]
    fn every_field_is_validated_independently() {
        let bus = FakeBus::new();
        bus.poke_config(BASE, encode(1, 16, 6, false));

        let mut ic = instance();
        probe(&mut ic, &bus);
        assert_eq!(ic.target_count, 16);
        assert_eq!(ic.source_count, 40);
        assert_eq!(ic.priority_count, PLIC_DEFAULT_PRIORITY_COUNT);
    }

    #[test]
    fn zeroed_register_keeps_everything() {
        let bus = FakeBus::new();
        let mut ic = instance();
        probe(&mut ic, &bus);
        assert_eq!(
            (ic.source_count, ic.target_count, ic.priority_count),
            (40, 4, 16)
        );
    }

    #[test]
    fn source_count_rules() {
        assert!(is_valid_source_count(2));
        assert!(is_valid_source_count(PLIC_MAX_SOURCE_COUNT));
        assert!(!is_valid_source_count(1));
        assert!(!is_valid_source_count(PLIC_MAX_SOURCE_COUNT + 1));
        assert!(!is_valid_source_count(u32::MAX));
    }

    #[test]
    fn target_count_rules() {
        assert!(is_valid_target_count(4));
        assert!(is_valid_target_count(32));
        assert!(!is_valid_target_count(0));
        assert!(!is_valid_target_count(3));
        assert!(!is_valid_target_count(12));
        assert!(!is_valid_target_count(64));
    }

    #[test]
    fn priority_count_rules() {
        assert!(is_valid_priority_count(4));
        assert!(is_valid_priority_count(12));
        assert!(!is_valid_priority_count(0));
        assert!(!is_valid_priority_count(2));
        assert!(!is_valid_priority_count(6));
    }
}
