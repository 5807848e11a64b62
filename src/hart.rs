//! Hart to context binding.
//!
//! Each hart can own one machine-mode and one supervisor-mode context on the
//! controller. The binding is rebuilt once at cold-init from the
//! `interrupts-extended` routing list of the controller node, where the pair
//! at cell `i` (stepping by 2) describes context `i / 2`.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use axerrno::{AxError, AxResult};

use crate::consts::{IRQ_M_EXT, IRQ_S_EXT};
use crate::regs::PlicRegs;
use crate::topology::{be32_cells, NodeRef, Topology};
use crate::utils::MmioBus;
use crate::ControllerInstance;

/// Privilege mode an external interrupt context delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeMode {
    Machine,
    Supervisor,
}

impl PrivilegeMode {
    /// Classify an irq-line identity of the routing list.
    pub const fn from_irq_line(hwirq: u32) -> Option<Self> {
        match hwirq {
            IRQ_M_EXT => Some(Self::Machine),
            IRQ_S_EXT => Some(Self::Supervisor),
            _ => None,
        }
    }
}

/// Context ids of one hart. `None` means the hart has no context of that mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HartContexts {
    pub machine: Option<u32>,
    pub supervisor: Option<u32>,
}

impl HartContexts {
    pub const fn get(&self, mode: PrivilegeMode) -> Option<u32> {
        match mode {
            PrivilegeMode::Machine => self.machine,
            PrivilegeMode::Supervisor => self.supervisor,
        }
    }

    fn set(&mut self, mode: PrivilegeMode, context: u32) -> Option<u32> {
        match mode {
            PrivilegeMode::Machine => self.machine.replace(context),
            PrivilegeMode::Supervisor => self.supervisor.replace(context),
        }
    }
}

#[derive(Debug, Default)]
struct HartSlot {
    contexts: HartContexts,
    warm: AtomicBool,
}

/// Per-hart context ids, indexed by hart id. Read-only once built.
#[derive(Debug)]
pub struct HartContextTable {
    slots: Vec<HartSlot>,
}

impl HartContextTable {
    /// Build the table from the routing list of `node`.
    ///
    /// Entries whose phandle does not lead to a hart slot, whose irq line is
    /// not an external interrupt or whose context id is out of range are
    /// skipped. Context ids are positions in the list, so no two harts share
    /// one. Only a missing or empty routing list and a failed allocation abort
    /// the build.
    pub fn build<T: Topology + ?Sized>(
        topo: &T,
        node: NodeRef,
        target_count: u32,
        hart_count: usize,
    ) -> AxResult<Self> {
        let prop = match topo.interrupts_extended(node) {
            Some(prop) if prop.len() >= 4 => prop,
            _ => {
                warn!("IRQCHIP: controller node has no interrupts-extended property");
                return Err(AxError::InvalidInput);
            }
        };

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(hart_count)
            .map_err(|_| AxError::NoMemory)?;
        slots.resize_with(hart_count, HartSlot::default);

        let mut cells = be32_cells(prop);
        let mut context = 0u32;
        while let (Some(phandle), Some(hwirq)) = (cells.next(), cells.next()) {
            let this = context;
            context += 1;

            let Some(hart_id) = topo.phandle_to_hart(phandle) else {
                debug!("IRQCHIP: context {}: phandle {:#x} has no hart", this, phandle);
                continue;
            };
            let Some(slot) = slots.get_mut(hart_id) else {
                debug!("IRQCHIP: context {}: hart {} has no slot", this, hart_id);
                continue;
            };
            let Some(mode) = PrivilegeMode::from_irq_line(hwirq) else {
                continue;
            };
            if this >= target_count {
                warn!(
                    "IRQCHIP: context {} of hart {} exceeds {} targets, skipped",
                    this, hart_id, target_count
                );
                continue;
            }
            if let Some(old) = slot.contexts.set(mode, this) {
                warn!(
                    "IRQCHIP: hart {} {:?} context {} replaced by {}",
                    hart_id, mode, old, this
                );
            }
            trace!("IRQCHIP: hart {} {:?} -> context {}", hart_id, mode, this);
        }

        Ok(Self { slots })
    }

    /// Context ids of `hart_id`. Unknown harts have no context.
    pub fn contexts(&self, hart_id: usize) -> HartContexts {
        self.slots
            .get(hart_id)
            .map(|slot| slot.contexts)
            .unwrap_or_default()
    }

    pub fn hart_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn mark_warm(&self, hart_id: usize) {
        if let Some(slot) = self.slots.get(hart_id) {
            slot.warm.store(true, Ordering::Release);
        }
    }

    pub fn is_warm(&self, hart_id: usize) -> bool {
        self.slots
            .get(hart_id)
            .is_some_and(|slot| slot.warm.load(Ordering::Acquire))
    }
}

/// Binding of one hart to a controller instance.
#[derive(Debug, Clone, Copy)]
pub struct HartContextBinding<'a> {
    pub controller: &'a ControllerInstance,
    pub contexts: HartContexts,
}

/// Explicit per-hart handle passed to warm-init and to every
/// context-scoped operation.
pub struct HartContext<'a, B: MmioBus> {
    hart_id: usize,
    binding: HartContextBinding<'a>,
    bus: &'a B,
}

impl<'a, B: MmioBus> HartContext<'a, B> {
    pub fn new(hart_id: usize, binding: HartContextBinding<'a>, bus: &'a B) -> Self {
        Self {
            hart_id,
            binding,
            bus,
        }
    }

    pub fn hart_id(&self) -> usize {
        self.hart_id
    }

    pub fn binding(&self) -> &HartContextBinding<'a> {
        &self.binding
    }

    pub fn regs(&self) -> PlicRegs<'a, B> {
        PlicRegs::new(self.binding.controller, self.bus)
    }

    fn context(&self, mode: PrivilegeMode) -> AxResult<u32> {
        self.binding.contexts.get(mode).ok_or(AxError::NotFound)
    }

    /// Disable every source of both contexts and set the default threshold.
    ///
    /// A hart without any context performs no register access.
    pub fn warm_init(&self, threshold: u32) -> AxResult {
        let regs = self.regs();
        if let Some(context) = self.binding.contexts.machine {
            regs.context_init(context, false, threshold)?;
        }
        if let Some(context) = self.binding.contexts.supervisor {
            regs.context_init(context, false, threshold)?;
        }
        debug!(
            "IRQCHIP: hart {} warm-init, contexts {:?}",
            self.hart_id, self.binding.contexts
        );
        Ok(())
    }

    pub fn priority_save(&self, priority: &mut [u32]) -> AxResult<usize> {
        self.regs().priority_save(priority)
    }

    pub fn priority_restore(&self, priority: &[u32]) -> AxResult<usize> {
        self.regs().priority_restore(priority)
    }

    /// Save the context of `mode`, returns its threshold.
    pub fn context_save(&self, mode: PrivilegeMode, enable: &mut [u32]) -> AxResult<u32> {
        self.regs().context_save(self.context(mode)?, enable)
    }

    pub fn context_restore(&self, mode: PrivilegeMode, enable: &[u32], threshold: u32) -> AxResult {
        self.regs()
            .context_restore(self.context(mode)?, enable, threshold)
    }
}
