use std::io;

use crate::boxes::prelude::*;

/// 8.7.5 Chunk Offset Box (ISO/IEC 14496-12:2015(E))
///
/// Implements both `stco` and `co64`; offsets are held as 64 bit
/// values either way. An extra offset can be applied at serialization
/// time; if any resulting value no longer fits in 32 bits the box is
/// written as `co64`.
#[derive(Clone, Debug)]
pub struct ChunkOffsetBox {
    pub entries: Vec<u64>,
    offset:      i64,
    large:       bool,
}
pub type ChunkLargeOffsetBox = ChunkOffsetBox;

impl ChunkOffsetBox {
    /// Add a global extra offset to all entries in this box.
    ///
    /// The offset is applied when serializing. If any entry then
    /// exceeds 32 bits, the box is serialized as `co64`.
    pub fn add_offset(&mut self, offset: i64) {
        self.offset = offset;
        self.check_offsets();
    }

    /// Is this box going to be written as `co64`?
    pub fn is_large(&self) -> bool {
        self.large
    }

    /// Final value of entry `index` with the extra offset applied.
    pub fn final_offset(&self, index: usize) -> u64 {
        (self.entries[index] as i64 + self.offset) as u64
    }

    /// The final 32-bit offset values, or `None` when any does not fit
    /// and the box must become `co64`.
    pub fn try_stco_values(&self) -> Option<Vec<u32>> {
        let mut v = Vec::with_capacity(self.entries.len());
        for idx in 0..self.entries.len() {
            let entry = self.final_offset(idx);
            if entry > u32::MAX as u64 {
                return None;
            }
            v.push(entry as u32);
        }
        Some(v)
    }

    fn check_offsets(&mut self) {
        let offset = self.offset;
        if self
            .entries
            .iter()
            .any(|&e| e as i64 + offset > u32::MAX as i64)
        {
            self.large = true;
        }
    }

    pub fn push(&mut self, offset: u64) {
        if offset as i64 + self.offset > u32::MAX as i64 {
            self.large = true;
        }
        self.entries.push(offset);
    }
}

impl Default for ChunkOffsetBox {
    fn default() -> Self {
        ChunkOffsetBox {
            entries: Vec::new(),
            offset:  0,
            large:   false,
        }
    }
}

impl FromBytes for ChunkOffsetBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ChunkOffsetBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;

        let large = stream.fourcc() == b"co64";
        let count = u32::from_bytes(stream)?;
        let entry_size = if large { 8 } else { 4 };
        if count as u64 * entry_size > stream.left() {
            return Err(ioerr!(
                InvalidData,
                "{}: {} entries do not fit payload",
                stream.fourcc(),
                count
            ));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if large {
                entries.push(u64::from_bytes(stream)?);
            } else {
                entries.push(u32::from_bytes(stream)? as u64);
            }
        }

        Ok(ChunkOffsetBox {
            entries,
            offset: 0,
            large,
        })
    }

    fn min_size() -> usize {
        16
    }
}

impl ToBytes for ChunkOffsetBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        (self.entries.len() as u32).to_bytes(stream)?;
        for idx in 0..self.entries.len() {
            let entry = self.final_offset(idx);
            if self.large {
                entry.to_bytes(stream)?;
            } else {
                (entry as u32).to_bytes(stream)?;
            }
        }

        writer.finalize()
    }
}

impl BoxInfo for ChunkOffsetBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        if self.large {
            FourCC::new(b"co64")
        } else {
            FourCC::new(b"stco")
        }
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for ChunkOffsetBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn co64_reads_into_the_same_table() {
        let wire: Vec<u8> = vec![
            0, 0, 0, 24, b'c', b'o', b'6', b'4', 0, 0, 0, 0, //
            0, 0, 0, 1, //
            0, 0, 0, 1, 0, 0, 0, 0, // 1 << 32
        ];
        let mut rd = SliceReader::new(&wire);
        let co = ChunkOffsetBox::from_bytes(&mut rd).unwrap();
        assert!(co.is_large());
        assert_eq!(co.entries, vec![1u64 << 32]);
    }

    #[test]
    fn widening_on_offset_overflow() {
        let mut stco = ChunkOffsetBox::default();
        stco.push(0x8000_0000);
        assert!(!stco.is_large());
        assert!(stco.try_stco_values().is_some());

        stco.add_offset(0x8000_0010);
        assert!(stco.is_large());
        assert!(stco.try_stco_values().is_none());

        let mut buf = MemBuffer::new();
        stco.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(&v[4..8], b"co64");
        assert_eq!(&v[16..24], &(0x1_0000_0010u64).to_be_bytes()[..]);
    }
}
