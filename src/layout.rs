//! Register space layout.
//!
//! The register map of the controller is not fixed: every region length is
//! derived from the source, target and priority counts reported by the device.
//! Regions are packed back to back, each one ending on a 4-byte boundary:
//!
//! ```text
//! +----------------------+ 0x0
//! | config (8B)          |
//! +----------------------+
//! | enable-latch         | ceil(sources / 8)
//! +----------------------+
//! | priority             | ceil(sources * priority_bits / 8)
//! +----------------------+
//! | per-target enable    | targets * 4 * ceil(sources / 32)
//! +----------------------+
//! | per-target threshold | targets * 4
//! +----------------------+
//! | per-target claim id  | targets * ceil(id_bits / 8), one 4-byte slot each
//! +----------------------+
//! ```
//!
//! Nothing here is cached: a [`RuntimeLayout`] is rebuilt from the counts for
//! every operation that needs it.

use crate::consts::PLIC_CONFIG_LEN;
use crate::utils::{log2_ceil, log2_floor, round_up_4};

/// A byte range of the register space, relative to the controller base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    const fn after(prev: Region, len: usize) -> Self {
        Self {
            offset: prev.end(),
            len: round_up_4(len),
        }
    }

    /// First byte past the region.
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Number of 32-bit words in the region.
    pub const fn words(&self) -> usize {
        self.len / 4
    }
}

/// Location of a sub-word field inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPos {
    /// Word index inside the region.
    pub word: usize,
    /// Bit offset inside the word.
    pub shift: u32,
    /// Mask of the field, already shifted.
    pub mask: u32,
}

/// Byte layout derived from one set of counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLayout {
    source_count: u32,
    target_count: u32,
    priority_bits: u32,
    id_bits: u32,
    pub config: Region,
    pub enable_latch: Region,
    pub priority: Region,
    pub enable: Region,
    pub threshold: Region,
    pub claim_id: Region,
}

impl RuntimeLayout {
    pub const fn new(source_count: u32, target_count: u32, priority_count: u32) -> Self {
        let priority_bits = priority_bits_per_source(priority_count);
        let id_bits = id_bits_per_target(source_count);
        let sources = source_count as usize;
        let targets = target_count as usize;

        let config = Region {
            offset: 0,
            len: PLIC_CONFIG_LEN,
        };
        let enable_latch = Region::after(config, sources.div_ceil(8));
        let priority = Region::after(
            enable_latch,
            (sources * priority_bits as usize).div_ceil(8),
        );
        let enable = Region::after(priority, targets * enable_stride(source_count));
        let threshold = Region::after(enable, targets * 4);
        let claim_id = Region::after(
            threshold,
            targets * round_up_4((id_bits as usize).div_ceil(8)),
        );

        Self {
            source_count,
            target_count,
            priority_bits,
            id_bits,
            config,
            enable_latch,
            priority,
            enable,
            threshold,
            claim_id,
        }
    }

    /// Regions in address order.
    pub const fn regions(&self) -> [Region; 6] {
        [
            self.config,
            self.enable_latch,
            self.priority,
            self.enable,
            self.threshold,
            self.claim_id,
        ]
    }

    /// Total size of the register space.
    pub const fn size(&self) -> usize {
        self.claim_id.end()
    }

    pub const fn priority_bits(&self) -> u32 {
        self.priority_bits
    }

    pub const fn id_bits(&self) -> u32 {
        self.id_bits
    }

    /// Priority fields packed into one 32-bit word.
    pub const fn priorities_per_word(&self) -> u32 {
        32 / self.priority_bits
    }

    /// Number of 32-bit priority words backed by the priority region.
    pub const fn priority_words(&self) -> usize {
        self.priority.words()
    }

    /// Number of 32-bit enable words of each target.
    pub const fn enable_words_per_target(&self) -> usize {
        self.source_count.div_ceil(32) as usize
    }

    /// Position of the priority field of `source` (1-based).
    ///
    /// Returns `None` for source 0, sources past `source_count` and fields that
    /// would land outside the priority region (possible when the priority
    /// width does not divide 32).
    pub const fn priority_field(&self, source: u32) -> Option<FieldPos> {
        if source == 0 || source > self.source_count {
            return None;
        }
        let index = source - 1;
        let per_word = self.priorities_per_word();
        let word = (index / per_word) as usize;
        if word >= self.priority_words() {
            return None;
        }
        let shift = (index % per_word) * self.priority_bits;
        Some(FieldPos {
            word,
            shift,
            mask: field_mask(self.priority_bits) << shift,
        })
    }

    /// Position of the enable (or enable-latch) bit of `source` (1-based).
    pub const fn source_bit(&self, source: u32) -> Option<FieldPos> {
        if source == 0 || source > self.source_count {
            return None;
        }
        let index = source - 1;
        let shift = index % 32;
        Some(FieldPos {
            word: (index / 32) as usize,
            shift,
            mask: 1 << shift,
        })
    }

    /// Byte offset of priority word `word`.
    pub const fn priority_word_offset(&self, word: usize) -> usize {
        self.priority.offset + 4 * word
    }

    /// Byte offset of enable-latch word `word`.
    pub const fn enable_latch_word_offset(&self, word: usize) -> usize {
        self.enable_latch.offset + 4 * word
    }

    /// Byte offset of enable word `word` of `target`.
    pub const fn enable_word_offset(&self, target: u32, word: usize) -> usize {
        self.enable.offset + target as usize * enable_stride(self.source_count) + 4 * word
    }

    /// Byte offset of the threshold register of `target`.
    pub const fn threshold_offset(&self, target: u32) -> usize {
        self.threshold.offset + 4 * target as usize
    }

    /// Byte offset of the claim id register of `target`.
    pub const fn claim_id_offset(&self, target: u32) -> usize {
        self.claim_id.offset + target as usize * round_up_4((self.id_bits as usize).div_ceil(8))
    }

    pub const fn is_valid_target(&self, target: u32) -> bool {
        target < self.target_count
    }
}

/// `log2(priority_count)`, at least one bit.
pub const fn priority_bits_per_source(priority_count: u32) -> u32 {
    if priority_count < 2 {
        1
    } else {
        log2_floor(priority_count)
    }
}

/// Bits needed to encode ids `0..=source_count`.
pub const fn id_bits_per_target(source_count: u32) -> u32 {
    log2_ceil(source_count.saturating_add(1))
}

/// Bytes between the enable words of two consecutive targets.
const fn enable_stride(source_count: u32) -> usize {
    4 * source_count.div_ceil(32) as usize
}

const fn field_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_packed(layout: &RuntimeLayout) {
        let regions = layout.regions();
        assert_eq!(regions[0].offset, 0);
        for pair in regions.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].len);
            assert!(pair[1].offset > pair[0].offset);
        }
        for region in regions {
            assert_eq!(region.offset % 4, 0);
            assert_eq!(region.len % 4, 0);
        }
    }

    #[test]
    fn regions_are_packed_and_aligned() {
        for sources in (2..=300).chain([1023, 1024, 0xffff]) {
            for targets in [4, 8, 16, 32] {
                for priorities in [4, 8, 12, 16, 32, 64, 0x3ffc] {
                    check_packed(&RuntimeLayout::new(sources, targets, priorities));
                }
            }
        }
    }

    #[test]
    fn default_layout() {
        let layout = RuntimeLayout::new(40, 4, 16);
        assert_eq!(layout.priority_bits(), 4);
        assert_eq!(layout.id_bits(), 6);
        assert_eq!(layout.config, Region { offset: 0, len: 8 });
        assert_eq!(layout.enable_latch, Region { offset: 8, len: 8 });
        assert_eq!(layout.priority, Region { offset: 16, len: 20 });
        assert_eq!(layout.enable, Region { offset: 36, len: 32 });
        assert_eq!(layout.threshold, Region { offset: 68, len: 16 });
        assert_eq!(layout.claim_id, Region { offset: 84, len: 16 });
        assert_eq!(layout.size(), 100);
        assert_eq!(layout.enable_words_per_target(), 2);
        assert_eq!(layout.priority_words(), 5);
    }

    #[test]
    fn priority_fields_are_sub_word_packed() {
        let layout = RuntimeLayout::new(40, 4, 16);
        assert_eq!(layout.priorities_per_word(), 8);

        let first = layout.priority_field(1).unwrap();
        assert_eq!((first.word, first.shift, first.mask), (0, 0, 0x0000_000f));

        let eighth = layout.priority_field(8).unwrap();
        assert_eq!((eighth.word, eighth.shift, eighth.mask), (0, 28, 0xf000_0000));

        let ninth = layout.priority_field(9).unwrap();
        assert_eq!((ninth.word, ninth.shift, ninth.mask), (1, 0, 0x0000_000f));

        let last = layout.priority_field(40).unwrap();
        assert_eq!((last.word, last.shift), (4, 28));

        assert_eq!(layout.priority_field(0), None);
        assert_eq!(layout.priority_field(41), None);
    }

    #[test]
    fn odd_priority_width_never_leaves_the_region() {
        // 3 bits per source: 10 fields per word, 2 bits of padding.
        let layout = RuntimeLayout::new(64, 4, 12);
        assert_eq!(layout.priority_bits(), 3);
        assert_eq!(layout.priority_words(), 6);
        for source in 1..=64 {
            if let Some(pos) = layout.priority_field(source) {
                assert!(pos.word < layout.priority_words());
            }
        }
        assert!(layout.priority_field(60).is_some());
        assert_eq!(layout.priority_field(61), None);
    }

    #[test]
    fn id_bits_do_not_overflow() {
        assert_eq!(id_bits_per_target(40), 6);
        assert_eq!(id_bits_per_target(0xffff), 16);
        assert_eq!(id_bits_per_target(u32::MAX), 32);
    }

    #[test]
    fn source_bits() {
        let layout = RuntimeLayout::new(40, 4, 16);
        assert_eq!(layout.source_bit(1).unwrap().word, 0);
        assert_eq!(layout.source_bit(32).unwrap().mask, 1 << 31);
        let pos = layout.source_bit(33).unwrap();
        assert_eq!((pos.word, pos.shift), (1, 0));
        assert_eq!(layout.source_bit(0), None);
        assert_eq!(layout.source_bit(41), None);
    }

    #[test]
    fn per_target_offsets() {
        let layout = RuntimeLayout::new(40, 4, 16);
        assert_eq!(layout.enable_word_offset(0, 0), 36);
        assert_eq!(layout.enable_word_offset(0, 1), 40);
        assert_eq!(layout.enable_word_offset(1, 0), 44);
        assert_eq!(layout.enable_word_offset(3, 1), 64);
        assert!(layout.enable_word_offset(3, 1) + 4 <= layout.enable.end());
        assert_eq!(layout.threshold_offset(0), 68);
        assert_eq!(layout.threshold_offset(3), 80);
        assert_eq!(layout.claim_id_offset(3), 96);
        assert!(layout.is_valid_target(3));
        assert!(!layout.is_valid_target(4));
    }

    #[test]
    fn last_target_stays_inside_enable_region() {
        for sources in [2, 31, 32, 33, 63, 64, 65, 1000] {
            for targets in [4, 8, 32] {
                let layout = RuntimeLayout::new(sources, targets, 16);
                let last = layout.enable_words_per_target() - 1;
                assert_eq!(
                    layout.enable_word_offset(targets - 1, last) + 4,
                    layout.enable.end()
                );
            }
        }
    }
}
