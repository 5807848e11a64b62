// Compiled-in defaults and fixed register fields of the dynamically configured PLIC.

/// Device identity string matched against the topology description.
pub const PLIC_COMPATIBLE: &str = "tubitak,plic-1.0.0";

// --- Default parameters (used until the config register says otherwise) ---

/// Default number of interrupt sources.
pub const PLIC_DEFAULT_SOURCE_COUNT: u32 = 40;

/// Default number of delivery targets (contexts).
pub const PLIC_DEFAULT_TARGET_COUNT: u32 = 4;

/// Default number of priority levels.
pub const PLIC_DEFAULT_PRIORITY_COUNT: u32 = 16;

/// Upper bound on the number of sources, the width of the config field.
pub const PLIC_MAX_SOURCE_COUNT: u32 = 0xffff;

/// Upper bound on the number of targets. Must be a power of two.
pub const PLIC_MAX_TARGET_COUNT: usize = 32;

/// Threshold written to every bound context on warm-init.
pub const PLIC_DEFAULT_THRESHOLD: u32 = 0x7;

// --- Config register (offset 0, 64 bits) ---

/// Length in bytes of the config register.
pub const PLIC_CONFIG_LEN: usize = 0x8;

pub const PLIC_CONFIG_SOURCES_SHIFT: u32 = 0;
pub const PLIC_CONFIG_TARGETS_SHIFT: u32 = 16;
pub const PLIC_CONFIG_PRIORITIES_SHIFT: u32 = 32;
pub const PLIC_CONFIG_HAS_THRESHOLD_SHIFT: u32 = 48;

pub const PLIC_CONFIG_SOURCES_MASK: u64 = 0xffff << PLIC_CONFIG_SOURCES_SHIFT;
pub const PLIC_CONFIG_TARGETS_MASK: u64 = 0xffff << PLIC_CONFIG_TARGETS_SHIFT;
/// Only 14 bits of the priority field are implemented.
pub const PLIC_CONFIG_PRIORITIES_MASK: u64 = 0x3fff << PLIC_CONFIG_PRIORITIES_SHIFT;
pub const PLIC_CONFIG_HAS_THRESHOLD_MASK: u64 = 1 << PLIC_CONFIG_HAS_THRESHOLD_SHIFT;

// --- Interrupt routing ---

/// Irq-line identity of the machine-mode external interrupt.
pub const IRQ_M_EXT: u32 = 11;

/// Irq-line identity of the supervisor-mode external interrupt.
pub const IRQ_S_EXT: u32 = 9;

/// Alignment order (log2) used when registering the MMIO window.
pub const PLIC_REGION_ALIGN_ORDER: u32 = 20;
