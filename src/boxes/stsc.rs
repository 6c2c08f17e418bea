use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 8.7.4 Sample To Chunk Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    SampleToChunkBox {
        entries:        ArraySized32<SampleToChunkEntry>,
    },
    fourcc => b"stsc",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

/// Entry in SampleToChunkBox.
///
/// `first_chunk` is one-based on the wire; it is kept zero-based here
/// and the writer adds the one back.
#[derive(Clone, Debug, Default)]
pub struct SampleToChunkEntry {
    pub first_chunk:              u32,
    pub samples_per_chunk:        u32,
    pub sample_description_index: u32,
}

impl FromBytes for SampleToChunkEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<Self> {
        Ok(SampleToChunkEntry {
            first_chunk:              u32::from_bytes(stream)?.saturating_sub(1),
            samples_per_chunk:        u32::from_bytes(stream)?,
            sample_description_index: u32::from_bytes(stream)?,
        })
    }
    fn min_size() -> usize {
        12
    }
}

impl ToBytes for SampleToChunkEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        (self.first_chunk + 1).to_bytes(stream)?;
        self.samples_per_chunk.to_bytes(stream)?;
        self.sample_description_index.to_bytes(stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn chunk_index_is_rebased() {
        // one entry: first_chunk=1 (on the wire), 10 samples, stsd 1.
        let wire: Vec<u8> = vec![
            0, 0, 0, 28, b's', b't', b's', b'c', 0, 0, 0, 0, // header + version/flags
            0, 0, 0, 1, // entry count
            0, 0, 0, 1, 0, 0, 0, 10, 0, 0, 0, 1,
        ];
        let mut rd = SliceReader::new(&wire);
        let stsc = SampleToChunkBox::from_bytes(&mut rd).unwrap();
        assert_eq!(stsc.entries.len(), 1);
        assert_eq!(stsc.entries[0].first_chunk, 0);
        assert_eq!(stsc.entries[0].samples_per_chunk, 10);

        let mut buf = MemBuffer::new();
        stsc.to_bytes(&mut buf).unwrap();
        assert_eq!(buf.into_vec(), wire);
    }
}
