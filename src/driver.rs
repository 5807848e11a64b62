//! Cold and warm initialization of the controller, and the driver registry.

use core::sync::atomic::{AtomicU8, Ordering};

use axerrno::{AxError, AxResult};
use spin::Once;

use crate::config;
use crate::consts::{PLIC_COMPATIBLE, PLIC_DEFAULT_THRESHOLD};
use crate::hart::{HartContext, HartContextBinding, HartContextTable};
use crate::regs::PlicRegs;
use crate::topology::{NodeRef, Platform, Topology};
use crate::utils::{Mmio, MmioBus};
use crate::ControllerInstance;

/// Interface every interrupt controller driver offers to the firmware.
pub trait IrqChip: Sync {
    /// One-time setup, run on the boot hart before any warm-init.
    fn cold_init(&self, topo: &dyn Topology, node: NodeRef, platform: &dyn Platform) -> AxResult;

    /// Per-hart setup, run on every hart at each boot and resume.
    fn warm_init(&self, hart_id: usize) -> AxResult;

    fn exit(&self) {}

    /// Claim the pending external interrupt of `hart_id`.
    fn external_irq(&self, hart_id: usize) -> AxResult;
}

/// Board-specific hook applied to the instance before probing.
pub type PlatformFixup = fn(&mut ControllerInstance);

/// Lifecycle of a driver, see [`PlicDriver::hart_state`] for the per-hart part.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized = 0,
    ColdInitInProgress = 1,
    ColdInitDone = 2,
    WarmInitDone = 3,
}

impl InitState {
    const fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::ColdInitInProgress,
            2 => Self::ColdInitDone,
            3 => Self::WarmInitDone,
            _ => Self::Uninitialized,
        }
    }
}

struct ColdState {
    instance: ControllerInstance,
    harts: HartContextTable,
}

/// Driver of one dynamically configured PLIC.
pub struct PlicDriver<B: MmioBus> {
    bus: B,
    fixup: Option<PlatformFixup>,
    state: AtomicU8,
    cold: Once<ColdState>,
}

impl<B: MmioBus> PlicDriver<B> {
    pub const fn new(bus: B, fixup: Option<PlatformFixup>) -> Self {
        Self {
            bus,
            fixup,
            state: AtomicU8::new(InitState::Uninitialized as u8),
            cold: Once::new(),
        }
    }

    pub fn state(&self) -> InitState {
        InitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Like [`Self::state`], but `WarmInitDone` once `hart_id` ran warm-init.
    pub fn hart_state(&self, hart_id: usize) -> InitState {
        match self.cold.get() {
            Some(cold) if cold.harts.is_warm(hart_id) => InitState::WarmInitDone,
            _ => self.state(),
        }
    }

    /// The controller instance, once cold-init succeeded.
    pub fn instance(&self) -> Option<&ControllerInstance> {
        self.cold.get().map(|cold| &cold.instance)
    }

    /// Register view of the controller, once cold-init succeeded.
    pub fn regs(&self) -> AxResult<PlicRegs<'_, B>> {
        let cold = self.cold.get().ok_or(AxError::BadState)?;
        Ok(PlicRegs::new(&cold.instance, &self.bus))
    }

    /// Per-hart handle of `hart_id`.
    pub fn hart(&self, hart_id: usize) -> AxResult<HartContext<'_, B>> {
        let cold = self.cold.get().ok_or(AxError::BadState)?;
        let binding = HartContextBinding {
            controller: &cold.instance,
            contexts: cold.harts.contexts(hart_id),
        };
        Ok(HartContext::new(hart_id, binding, &self.bus))
    }

    /// Reset the contexts of `hart` to disabled sources and the default threshold.
    pub fn warm_init_hart(&self, hart: &HartContext<'_, B>) -> AxResult {
        let cold = self.cold.get().ok_or(AxError::BadState)?;
        hart.warm_init(PLIC_DEFAULT_THRESHOLD)?;
        cold.harts.mark_warm(hart.hart_id());
        Ok(())
    }

    fn build(
        &self,
        topo: &dyn Topology,
        node: NodeRef,
        platform: &dyn Platform,
    ) -> AxResult<ColdState> {
        let mut instance = ControllerInstance::from(topo.parse_plic_node(node)?);
        if let Some(fixup) = self.fixup {
            fixup(&mut instance);
        }
        config::probe(&mut instance, &self.bus);

        let layout = instance.layout();
        if layout.size() > instance.size {
            warn!(
                "IRQCHIP: register space {:#x} exceeds region size {:#x}",
                layout.size(),
                instance.size
            );
            return Err(AxError::InvalidInput);
        }

        // Everything the topology can reject is checked before the device or
        // the root domain is touched.
        let harts =
            HartContextTable::build(topo, node, instance.target_count, platform.hart_count())?;

        platform.add_root_memrange(instance.mem_region())?;

        // Priority 0 disables a source.
        let regs = PlicRegs::new(&instance, &self.bus);
        for word in 0..layout.priority_words() {
            regs.set_priority_word(word, 0)?;
        }

        Ok(ColdState { instance, harts })
    }
}

impl<B: MmioBus + Sync + Send> IrqChip for PlicDriver<B> {
    /// Runs at most once successfully. Later calls return `Ok` without touching
    /// the device, a failed call leaves the driver uninitialized.
    fn cold_init(&self, topo: &dyn Topology, node: NodeRef, platform: &dyn Platform) -> AxResult {
        if self.cold.is_completed() {
            debug!("IRQCHIP: cold-init already done");
            return Ok(());
        }

        let result = self.cold.try_call_once(|| {
            self.state
                .store(InitState::ColdInitInProgress as u8, Ordering::Release);
            self.build(topo, node, platform)
        });

        match result {
            Ok(cold) => {
                self.state
                    .store(InitState::ColdInitDone as u8, Ordering::Release);
                let ic = &cold.instance;
                info!(
                    "IRQCHIP: PLIC at {:#x} size {:#x}: {} sources, {} targets, {} priorities, threshold: {}",
                    ic.base.as_usize(),
                    ic.size,
                    ic.source_count,
                    ic.target_count,
                    ic.priority_count,
                    ic.has_threshold
                );
                Ok(())
            }
            Err(err) => {
                self.state
                    .store(InitState::Uninitialized as u8, Ordering::Release);
                warn!("IRQCHIP: cold-init failed: {:?}", err);
                Err(err)
            }
        }
    }

    fn warm_init(&self, hart_id: usize) -> AxResult {
        let hart = self.hart(hart_id)?;
        self.warm_init_hart(&hart)
    }

    fn external_irq(&self, _hart_id: usize) -> AxResult {
        Err(AxError::Unsupported)
    }
}

/// Maps a device identity string to the driver handling it.
#[derive(Clone, Copy)]
pub struct IrqchipMatch<'a> {
    pub compatible: &'a str,
    pub driver: &'a dyn IrqChip,
}

/// Set of known interrupt controller drivers.
#[derive(Clone, Copy)]
pub struct IrqchipRegistry<'a> {
    entries: &'a [IrqchipMatch<'a>],
}

impl<'a> IrqchipRegistry<'a> {
    pub const fn new(entries: &'a [IrqchipMatch<'a>]) -> Self {
        Self { entries }
    }

    /// First registered driver with a matching node in `topo`.
    pub fn discover(&self, topo: &dyn Topology) -> Option<(&'a dyn IrqChip, NodeRef)> {
        self.entries.iter().find_map(|entry| {
            topo.find_compatible(entry.compatible)
                .map(|node| (entry.driver, node))
        })
    }

    /// Discover the driver and cold-init it. The driver is returned for the
    /// warm-init and claim entry points.
    pub fn cold_init(
        &self,
        topo: &dyn Topology,
        platform: &dyn Platform,
    ) -> AxResult<&'a dyn IrqChip> {
        let (driver, node) = self.discover(topo).ok_or(AxError::NotFound)?;
        driver.cold_init(topo, node, platform)?;
        Ok(driver)
    }
}

/// The platform PLIC.
pub static PLIC: PlicDriver<Mmio> = PlicDriver::new(Mmio, None);

static IRQCHIP_MATCHES: [IrqchipMatch<'static>; 1] = [IrqchipMatch {
    compatible: PLIC_COMPATIBLE,
    driver: &PLIC,
}];

/// Registry of the drivers in this crate.
pub static IRQCHIP_REGISTRY: IrqchipRegistry<'static> = IrqchipRegistry::new(&IRQCHIP_MATCHES);

/// External interrupt handler of the active hart. Claiming is not supported.
pub fn external_irqfn(hart_id: usize) -> AxResult {
    PLIC.external_irq(hart_id)
}
