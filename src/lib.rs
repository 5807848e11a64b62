//! Firmware driver for a PLIC whose geometry is only known at run time.
//!
//! The number of interrupt sources, targets and priority levels is read from
//! the config register of the device at boot. Every register address is then
//! derived from those counts (see [`layout`]). Harts are bound to their
//! machine and supervisor contexts from the `interrupts-extended` routing of
//! the controller node (see [`hart`]).
//!
//! Cold-init runs once on the boot hart, warm-init then runs on every hart:
//!
//! ```ignore
//! let plic = IRQCHIP_REGISTRY.cold_init(&fdt, &platform)?;
//! // on each hart
//! plic.warm_init(hart_id)?;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

mod consts;
mod utils;

pub mod config;
pub mod driver;
pub mod hart;
pub mod layout;
pub mod regs;
pub mod topology;

pub use consts::*;
pub use driver::{
    external_irqfn, InitState, IrqChip, IrqchipMatch, IrqchipRegistry, PlatformFixup, PlicDriver,
    IRQCHIP_REGISTRY, PLIC,
};
pub use hart::{HartContext, HartContextBinding, HartContextTable, HartContexts, PrivilegeMode};
pub use layout::RuntimeLayout;
pub use regs::{ContextState, PlicRegs};
pub use topology::{DeviceDescriptor, MemRegion, MemRegionFlags, NodeRef, Platform, Topology};
pub use utils::{Mmio, MmioBus};

use axaddrspace::HostPhysAddr;

/// One controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInstance {
    /// The host physical address of the register space.
    pub base: HostPhysAddr,
    /// The size of the register space in bytes.
    pub size: usize,
    pub source_count: u32,
    /// Always a power of two, at most [`PLIC_MAX_TARGET_COUNT`].
    pub target_count: u32,
    pub priority_count: u32,
    /// Whether the config register reports programmable thresholds.
    pub has_threshold: bool,
}

impl ControllerInstance {
    pub fn new(base: HostPhysAddr, size: usize, source_count: u32, target_count: u32) -> Self {
        Self {
            base,
            size,
            source_count,
            target_count,
            priority_count: PLIC_DEFAULT_PRIORITY_COUNT,
            has_threshold: false,
        }
    }

    /// Layout for the current counts.
    pub fn layout(&self) -> RuntimeLayout {
        RuntimeLayout::new(self.source_count, self.target_count, self.priority_count)
    }

    /// The register space as a shared MMIO region of the root domain.
    pub fn mem_region(&self) -> MemRegion {
        MemRegion {
            base: self.base,
            size: self.size,
            align_order: PLIC_REGION_ALIGN_ORDER,
            flags: MemRegionFlags::MMIO | MemRegionFlags::SHARED_SURW_MRW,
        }
    }
}

/// Counts from the descriptor that break the instance invariants are replaced
/// by the compiled-in defaults.
impl From<DeviceDescriptor> for ControllerInstance {
    fn from(desc: DeviceDescriptor) -> Self {
        let mut source_count = desc.source_count;
        if !config::is_valid_source_count(source_count) {
            warn!("IRQCHIP: descriptor source count {} invalid", source_count);
            source_count = PLIC_DEFAULT_SOURCE_COUNT;
        }
        let mut target_count = desc.target_count;
        if !config::is_valid_target_count(target_count) {
            warn!("IRQCHIP: descriptor target count {} invalid", target_count);
            target_count = PLIC_DEFAULT_TARGET_COUNT;
        }
        Self::new(desc.base, desc.size, source_count, target_count)
    }
}
