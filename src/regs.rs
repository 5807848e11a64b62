//! Word-granular access to the priority, enable and threshold registers.
//!
//! All addresses come from a [`RuntimeLayout`] rebuilt from the instance
//! counts on every call. Word-indexed save and restore clamp the requested
//! count to the words that actually exist, so a larger caller buffer never
//! spills into the next region.

use axaddrspace::{device::AccessWidth, HostPhysAddr};
use axerrno::{AxError, AxResult};

use crate::layout::RuntimeLayout;
use crate::utils::MmioBus;
use crate::ControllerInstance;

/// Snapshot of one context, owned by the caller across a power transition.
///
/// `N` is the capacity of the caller buffer; only the first
/// `enable_words_per_target` words are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextState<const N: usize> {
    pub enable_words: [u32; N],
    pub threshold: u32,
}

impl<const N: usize> Default for ContextState<N> {
    fn default() -> Self {
        Self {
            enable_words: [0; N],
            threshold: 0,
        }
    }
}

impl<const N: usize> ContextState<N> {
    /// Capture `context` into a new snapshot.
    pub fn save<B: MmioBus>(regs: &PlicRegs<'_, B>, context: u32) -> AxResult<Self> {
        let mut state = Self::default();
        state.threshold = regs.context_save(context, &mut state.enable_words)?;
        Ok(state)
    }

    /// Write the snapshot back to `context`.
    pub fn restore<B: MmioBus>(&self, regs: &PlicRegs<'_, B>, context: u32) -> AxResult {
        regs.context_restore(context, &self.enable_words, self.threshold)
    }
}

/// Register view of one controller instance.
pub struct PlicRegs<'a, B: MmioBus> {
    instance: &'a ControllerInstance,
    bus: &'a B,
}

impl<'a, B: MmioBus> PlicRegs<'a, B> {
    pub fn new(instance: &'a ControllerInstance, bus: &'a B) -> Self {
        Self { instance, bus }
    }

    pub fn instance(&self) -> &'a ControllerInstance {
        self.instance
    }

    fn layout(&self) -> RuntimeLayout {
        self.instance.layout()
    }

    fn addr(&self, offset: usize) -> HostPhysAddr {
        HostPhysAddr::from_usize(self.instance.base.as_usize() + offset)
    }

    fn read_word(&self, offset: usize) -> AxResult<u32> {
        self.bus
            .read(self.addr(offset), AccessWidth::Dword)
            .map(|val| val as u32)
    }

    fn write_word(&self, offset: usize, val: u32) -> AxResult {
        self.bus.write(self.addr(offset), AccessWidth::Dword, val as usize)
    }

    fn check_context(&self, layout: &RuntimeLayout, context: u32) -> AxResult {
        if layout.is_valid_target(context) {
            Ok(())
        } else {
            warn!(
                "IRQCHIP: context {} out of range, {} targets",
                context, self.instance.target_count
            );
            Err(AxError::InvalidInput)
        }
    }

    // --- priority ---

    pub fn priority_word(&self, word: usize) -> AxResult<u32> {
        let layout = self.layout();
        if word >= layout.priority_words() {
            return Err(AxError::InvalidInput);
        }
        self.read_word(layout.priority_word_offset(word))
    }

    pub fn set_priority_word(&self, word: usize, val: u32) -> AxResult {
        let layout = self.layout();
        if word >= layout.priority_words() {
            return Err(AxError::InvalidInput);
        }
        self.write_word(layout.priority_word_offset(word), val)
    }

    /// Save up to `priority.len()` priority words. Returns the number saved.
    pub fn priority_save(&self, priority: &mut [u32]) -> AxResult<usize> {
        let layout = self.layout();
        let num = priority.len().min(layout.priority_words());
        for (word, slot) in priority[..num].iter_mut().enumerate() {
            *slot = self.read_word(layout.priority_word_offset(word))?;
        }
        Ok(num)
    }

    /// Restore up to `priority.len()` priority words. Returns the number written.
    pub fn priority_restore(&self, priority: &[u32]) -> AxResult<usize> {
        let layout = self.layout();
        let num = priority.len().min(layout.priority_words());
        for (word, val) in priority[..num].iter().enumerate() {
            self.write_word(layout.priority_word_offset(word), *val)?;
        }
        Ok(num)
    }

    /// Priority of `source`, extracted from its packed word.
    pub fn priority(&self, source: u32) -> AxResult<u32> {
        let layout = self.layout();
        let pos = layout.priority_field(source).ok_or(AxError::InvalidInput)?;
        let word = self.read_word(layout.priority_word_offset(pos.word))?;
        Ok((word & pos.mask) >> pos.shift)
    }

    /// Update the priority field of `source` without touching its neighbours.
    pub fn set_priority(&self, source: u32, priority: u32) -> AxResult {
        let layout = self.layout();
        let pos = layout.priority_field(source).ok_or(AxError::InvalidInput)?;
        let offset = layout.priority_word_offset(pos.word);
        let word = self.read_word(offset)?;
        self.write_word(offset, (word & !pos.mask) | ((priority << pos.shift) & pos.mask))
    }

    // --- enable-latch ---

    pub fn is_latched(&self, source: u32) -> AxResult<bool> {
        let layout = self.layout();
        let pos = layout.source_bit(source).ok_or(AxError::InvalidInput)?;
        let word = self.read_word(layout.enable_latch_word_offset(pos.word))?;
        Ok(word & pos.mask != 0)
    }

    pub fn set_latched(&self, source: u32, latched: bool) -> AxResult {
        let layout = self.layout();
        let pos = layout.source_bit(source).ok_or(AxError::InvalidInput)?;
        let offset = layout.enable_latch_word_offset(pos.word);
        let word = self.read_word(offset)?;
        self.write_word(offset, set_bits(word, pos.mask, latched))
    }

    // --- per-context enable ---

    pub fn enable_word(&self, context: u32, word: usize) -> AxResult<u32> {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        if word >= layout.enable_words_per_target() {
            return Err(AxError::InvalidInput);
        }
        self.read_word(layout.enable_word_offset(context, word))
    }

    pub fn set_enable_word(&self, context: u32, word: usize, val: u32) -> AxResult {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        if word >= layout.enable_words_per_target() {
            return Err(AxError::InvalidInput);
        }
        self.write_word(layout.enable_word_offset(context, word), val)
    }

    pub fn is_enabled(&self, context: u32, source: u32) -> AxResult<bool> {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        let pos = layout.source_bit(source).ok_or(AxError::InvalidInput)?;
        let word = self.read_word(layout.enable_word_offset(context, pos.word))?;
        Ok(word & pos.mask != 0)
    }

    pub fn set_enabled(&self, context: u32, source: u32, enabled: bool) -> AxResult {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        let pos = layout.source_bit(source).ok_or(AxError::InvalidInput)?;
        let offset = layout.enable_word_offset(context, pos.word);
        let word = self.read_word(offset)?;
        self.write_word(offset, set_bits(word, pos.mask, enabled))
    }

    // --- per-context threshold ---

    pub fn threshold(&self, context: u32) -> AxResult<u32> {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        self.read_word(layout.threshold_offset(context))
    }

    pub fn set_threshold(&self, context: u32, threshold: u32) -> AxResult {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        self.write_word(layout.threshold_offset(context), threshold)
    }

    // --- whole context ---

    /// Save the enable words and threshold of `context`.
    ///
    /// At most `enable_words_per_target` words are read, whatever the length
    /// of `enable`. Returns the threshold.
    pub fn context_save(&self, context: u32, enable: &mut [u32]) -> AxResult<u32> {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        let num = enable.len().min(layout.enable_words_per_target());
        for (word, slot) in enable[..num].iter_mut().enumerate() {
            *slot = self.read_word(layout.enable_word_offset(context, word))?;
        }
        self.read_word(layout.threshold_offset(context))
    }

    /// Restore the enable words and threshold of `context`.
    pub fn context_restore(&self, context: u32, enable: &[u32], threshold: u32) -> AxResult {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        let num = enable.len().min(layout.enable_words_per_target());
        for (word, val) in enable[..num].iter().enumerate() {
            self.write_word(layout.enable_word_offset(context, word), *val)?;
        }
        self.write_word(layout.threshold_offset(context), threshold)
    }

    /// Enable or disable every source of `context` and set its threshold.
    pub fn context_init(&self, context: u32, enable: bool, threshold: u32) -> AxResult {
        let layout = self.layout();
        self.check_context(&layout, context)?;
        let val = if enable { u32::MAX } else { 0 };
        for word in 0..layout.enable_words_per_target() {
            self.write_word(layout.enable_word_offset(context, word), val)?;
        }
        self.write_word(layout.threshold_offset(context), threshold)
    }
}

#[inline]
fn set_bits(word: u32, mask: u32, set: bool) -> u32 {
    if set {
        word | mask
    } else {
        word & !mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::FakeBus;

    const BASE: usize = 0x0c00_0000;

    fn instance(sources: u32) -> ControllerInstance {
        ControllerInstance::new(HostPhysAddr::from_usize(BASE), 0x1000, sources, 4)
    }

    #[test]
    fn priority_fields_share_words() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.set_priority(1, 0x3).unwrap();
        regs.set_priority(8, 0xa).unwrap();
        regs.set_priority(9, 0x5).unwrap();

        // Priority region starts at 16 for the default counts.
        assert_eq!(bus.peek(BASE + 16), 0xa000_0003);
        assert_eq!(bus.peek(BASE + 20), 0x0000_0005);
        assert_eq!(regs.priority(1).unwrap(), 0x3);
        assert_eq!(regs.priority(8).unwrap(), 0xa);
        assert_eq!(regs.priority(2).unwrap(), 0);

        // Values wider than the field are truncated to it.
        regs.set_priority(2, 0x1f).unwrap();
        assert_eq!(regs.priority(2).unwrap(), 0xf);
        assert_eq!(regs.priority(1).unwrap(), 0x3);

        assert_eq!(regs.set_priority(0, 1), Err(AxError::InvalidInput));
        assert_eq!(regs.set_priority(41, 1), Err(AxError::InvalidInput));
    }

    #[test]
    fn priority_save_restore_is_clamped() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        let words = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(regs.priority_restore(&words).unwrap(), 5);
        // The first per-target enable word follows the priority region.
        assert_eq!(bus.peek(BASE + 36), 0);
        assert_eq!(bus.write_count(), 5);

        let mut saved = [0u32; 8];
        assert_eq!(regs.priority_save(&mut saved).unwrap(), 5);
        assert_eq!(saved, [1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn context_init_save_restore() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.context_init(1, false, 7).unwrap();
        let mut enable = [0xdead_beef; 2];
        assert_eq!(regs.context_save(1, &mut enable).unwrap(), 7);
        assert_eq!(enable, [0, 0]);

        regs.context_restore(1, &[0x8000_0001, 0xff], 3).unwrap();
        let mut enable = [0; 2];
        assert_eq!(regs.context_save(1, &mut enable).unwrap(), 3);
        assert_eq!(enable, [0x8000_0001, 0xff]);

        // Context 0 and 2 are untouched.
        let mut other = [0; 2];
        assert_eq!(regs.context_save(0, &mut other).unwrap(), 0);
        assert_eq!(other, [0, 0]);
        assert_eq!(regs.context_save(2, &mut other).unwrap(), 0);
        assert_eq!(other, [0, 0]);
    }

    #[test]
    fn context_save_restore_is_clamped() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.context_restore(0, &[0xffff_ffff; 16], 1).unwrap();
        // Two enable words and the threshold.
        assert_eq!(bus.write_count(), 3);
        assert_eq!(bus.peek(BASE + 44), 0, "context 1 must not be touched");

        let mut enable = [0x5555_5555; 16];
        regs.context_save(0, &mut enable).unwrap();
        assert_eq!(&enable[..2], &[0xffff_ffff; 2]);
        assert!(enable[2..].iter().all(|w| *w == 0x5555_5555));
    }

    #[test]
    fn context_state_round_trip() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.context_init(2, true, 1).unwrap();
        let state = ContextState::<4>::save(&regs, 2).unwrap();
        assert_eq!(state.enable_words, [u32::MAX, u32::MAX, 0, 0]);
        assert_eq!(state.threshold, 1);

        regs.context_init(2, false, 7).unwrap();
        state.restore(&regs, 2).unwrap();
        assert_eq!(ContextState::<4>::save(&regs, 2).unwrap(), state);
    }

    #[test]
    fn enable_bits() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.set_enabled(3, 33, true).unwrap();
        regs.set_enabled(3, 1, true).unwrap();
        assert!(regs.is_enabled(3, 33).unwrap());
        assert!(!regs.is_enabled(3, 32).unwrap());
        assert_eq!(regs.enable_word(3, 0).unwrap(), 1);
        assert_eq!(regs.enable_word(3, 1).unwrap(), 1);

        regs.set_enabled(3, 1, false).unwrap();
        assert_eq!(regs.enable_word(3, 0).unwrap(), 0);
        assert_eq!(regs.enable_word(3, 2), Err(AxError::InvalidInput));
    }

    #[test]
    fn enable_latch_bits() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        regs.set_latched(32, true).unwrap();
        regs.set_latched(33, true).unwrap();
        assert_eq!(bus.peek(BASE + 8), 1 << 31);
        assert_eq!(bus.peek(BASE + 12), 1);
        assert!(regs.is_latched(33).unwrap());
        assert!(!regs.is_latched(1).unwrap());
    }

    #[test]
    fn out_of_range_context() {
        let bus = FakeBus::new();
        let ic = instance(40);
        let regs = PlicRegs::new(&ic, &bus);

        assert_eq!(regs.set_threshold(4, 0), Err(AxError::InvalidInput));
        assert_eq!(regs.context_init(4, false, 7), Err(AxError::InvalidInput));
        let mut enable = [0; 2];
        assert_eq!(regs.context_save(9, &mut enable), Err(AxError::InvalidInput));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn larger_source_count_widens_context() {
        let bus = FakeBus::new();
        let ic = instance(100);
        let regs = PlicRegs::new(&ic, &bus);

        regs.context_init(0, true, 0).unwrap();
        // ceil(100 / 32) enable words plus the threshold.
        assert_eq!(bus.write_count(), 5);
    }
}
