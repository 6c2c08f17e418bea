use std::io;

use crate::boxes::prelude::*;

/// 8.1.1 Media Data Box (ISO/IEC 14496-12:2015(E))
///
/// Only the extent is recorded; the payload is never loaded. Sample
/// data is referenced by absolute file offset and copied out at write
/// time through file-range buckets.
#[derive(Clone, Debug, Default)]
pub struct MediaDataBox {
    /// Absolute file position of the payload.
    pub pos:  u64,
    /// Size of the payload.
    pub size: u64,
}

impl MediaDataBox {
    /// Does the byte range `[pos, pos+size)` fall inside this mdat?
    pub fn contains(&self, pos: u64, size: u64) -> bool {
        pos >= self.pos && pos + size <= self.pos + self.size
    }
}

impl FromBytes for MediaDataBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<MediaDataBox> {
        let mut reader = BoxReader::new(stream)?;
        let pos = reader.pos();
        let size = reader.left();
        reader.skip(size)?;
        Ok(MediaDataBox { pos, size })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for MediaDataBox {
    fn to_bytes<W: WriteBytes>(&self, _stream: &mut W) -> io::Result<()> {
        // The payload was never read; emitting the box again would
        // produce a header with no data behind it.
        Err(ioerr!(InvalidInput, "mdat: payload is not buffered"))
    }
}

impl BoxInfo for MediaDataBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"mdat")
    }
}

impl FullBox for MediaDataBox {}

/// Serialize an `mdat` header for `payload_size` bytes of payload.
///
/// Uses the 16-byte large-size form when the total would not fit the
/// 32-bit size field.
pub fn mdat_header(payload_size: u64) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    if payload_size + 8 > u32::MAX as u64 {
        v.extend_from_slice(&1u32.to_be_bytes());
        v.extend_from_slice(b"mdat");
        v.extend_from_slice(&(payload_size + 16).to_be_bytes());
    } else {
        v.extend_from_slice(&((payload_size + 8) as u32).to_be_bytes());
        v.extend_from_slice(b"mdat");
    }
    v
}
