use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 8.6.2 Sync Sample Box (ISO/IEC 14496-12:2015(E))
    ///
    /// Entries are one-based sample numbers, sorted ascending.
    #[derive(Default)]
    SyncSampleBox {
        entries:        ArraySized32<u32>,
    },
    fourcc => b"stss",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl SyncSampleBox {
    /// The sync sample at or before `sample` (both one-based).
    pub fn nearest_keyframe(&self, sample: u32) -> u32 {
        let mut keyframe = 1;
        for &entry in &self.entries {
            if entry > sample {
                break;
            }
            keyframe = entry;
        }
        keyframe
    }

    /// Check that the table is strictly increasing and within bounds.
    pub fn is_valid(&self, sample_count: u32) -> bool {
        let mut prev = 0;
        for &entry in &self.entries {
            if entry <= prev || entry > sample_count {
                return false;
            }
            prev = entry;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stss(entries: &[u32]) -> SyncSampleBox {
        SyncSampleBox {
            entries: entries.iter().copied().collect(),
        }
    }

    #[test]
    fn nearest_keyframe_rounds_down() {
        let s = stss(&[1, 15, 29]);
        assert_eq!(s.nearest_keyframe(1), 1);
        assert_eq!(s.nearest_keyframe(14), 1);
        assert_eq!(s.nearest_keyframe(15), 15);
        assert_eq!(s.nearest_keyframe(16), 15);
        assert_eq!(s.nearest_keyframe(40), 29);
    }

    #[test]
    fn nearest_keyframe_is_idempotent_on_entries() {
        let s = stss(&[1, 15, 29]);
        for &e in &[1, 15, 29] {
            assert_eq!(s.nearest_keyframe(e), e);
        }
    }

    #[test]
    fn validity() {
        assert!(stss(&[1, 15, 29]).is_valid(30));
        assert!(!stss(&[1, 15, 15]).is_valid(30));
        assert!(!stss(&[1, 15, 31]).is_valid(30));
        assert!(!stss(&[0]).is_valid(30));
    }
}
