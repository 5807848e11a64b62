//! Interfaces to the device topology description and the firmware around the driver.
//!
//! Parsing the device tree and keeping memory domains is not the business of
//! this crate. The driver only needs the handful of queries below.

use axaddrspace::HostPhysAddr;
use axerrno::AxResult;

/// Opaque reference to a node of the topology description.
pub type NodeRef = usize;

/// Identifies one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub base: HostPhysAddr,
    pub size: usize,
    pub source_count: u32,
    pub target_count: u32,
}

/// Read-only queries on the topology description.
pub trait Topology {
    /// First node whose compatible list contains `compatible`.
    fn find_compatible(&self, compatible: &str) -> Option<NodeRef>;

    /// Address, size and counts of a controller node.
    ///
    /// Fails with `InvalidInput` when a required property is missing or malformed.
    fn parse_plic_node(&self, node: NodeRef) -> AxResult<DeviceDescriptor>;

    /// Raw `interrupts-extended` property of `node`: big-endian 32-bit cells.
    fn interrupts_extended(&self, node: NodeRef) -> Option<&[u8]>;

    fn node_by_phandle(&self, phandle: u32) -> Option<NodeRef>;

    fn parent(&self, node: NodeRef) -> Option<NodeRef>;

    /// Hart id of a cpu node.
    fn hart_id(&self, cpu: NodeRef) -> Option<usize>;

    /// Resolve the phandle of a per-hart interrupt controller to its hart id.
    fn phandle_to_hart(&self, phandle: u32) -> Option<usize> {
        let intc = self.node_by_phandle(phandle)?;
        let cpu = self.parent(intc)?;
        self.hart_id(cpu)
    }
}

bitflags::bitflags! {
    /// Access flags of a memory region added to the root domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemRegionFlags: u32 {
        /// The region is device memory.
        const MMIO = 1 << 0;
        /// Readable and writable from S/U-mode.
        const SU_READ = 1 << 1;
        const SU_WRITE = 1 << 2;
        /// Readable and writable from M-mode.
        const M_READ = 1 << 3;
        const M_WRITE = 1 << 4;
        /// Shared between M-mode and S/U-mode, both read-write.
        const SHARED_SURW_MRW =
            Self::SU_READ.bits() | Self::SU_WRITE.bits() | Self::M_READ.bits() | Self::M_WRITE.bits();
    }
}

/// A memory range handed to the root domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    pub base: HostPhysAddr,
    pub size: usize,
    /// log2 of the alignment of the region.
    pub align_order: u32,
    pub flags: MemRegionFlags,
}

/// Services of the surrounding firmware used during cold-init.
pub trait Platform {
    /// Add `region` to the root domain.
    fn add_root_memrange(&self, region: MemRegion) -> AxResult;

    /// Number of hart slots. Hart ids at or above it cannot be bound.
    fn hart_count(&self) -> usize;
}

/// Decode a property made of big-endian 32-bit cells.
pub fn be32_cells(prop: &[u8]) -> impl Iterator<Item = u32> + '_ {
    prop.chunks_exact(4)
        .map(|cell| u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
}
