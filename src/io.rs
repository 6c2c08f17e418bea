//! File read/write.
//!
//! `Mp4File` maps every top-level box of the input except `mdat` payloads,
//! which are only ever referenced as file ranges and copied out at write
//! time through a [`DataSource`].
use std::convert::TryInto;
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use memmap::{Mmap, MmapOptions};

use crate::serialize::{BoxBytes, ReadBytes, WriteBytes};

struct FileSegment {
    start: u64,
    len:   u64,
    map:   Mmap,
}

/// Reads an MP4 file.
///
/// Implements `ReadBytes`, so it can be passed to `MP4::read`.
pub struct Mp4File {
    file:           Arc<fs::File>,
    pos:            u64,
    size:           u64,
    segments:       Vec<FileSegment>,
    input_filename: Option<String>,
}

impl Mp4File {
    /// Open an mp4 file.
    ///
    /// The contents are read through `mmap`, except for the payload of
    /// `mdat` boxes which stays unmapped.
    pub fn open(path: impl AsRef<str>) -> io::Result<Mp4File> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let size = file.metadata()?.len();

        // Create a list of segments that leaves out the payload of mdat
        // boxes.
        let mut segs = Vec::<(u64, u64)>::new();
        segs.push((0, 0));
        let mut pos = 0;
        while let Some((boxtype, boxpos, boxsize)) = next_box(&file, &mut pos, size)? {
            if &boxtype == b"mdat" {
                segs.last_mut().unwrap().1 += 16;
                segs.push((boxpos + boxsize, 0));
            } else {
                segs.last_mut().unwrap().1 += boxsize;
            }
        }

        // A box with a zero size field extends to the end of the file and
        // stops the forward scan. If an `mfra` trails it anyway, the
        // `mfro` trailer is the only way to locate it.
        if let Some((mfra_pos, mfra_size)) = mfra_extent(&file, size)? {
            let covered = segs
                .iter()
                .any(|&(s, l)| mfra_pos >= s && mfra_pos + mfra_size <= s + l);
            if !covered {
                segs.push((mfra_pos, mfra_size));
            }
        }

        let mut segments = Vec::new();
        for &(start, len) in &segs {
            // The mdat header slot may run past a trailing mdat.
            let len = std::cmp::min(len, size.saturating_sub(start));
            if len == 0 {
                continue;
            }
            let map = unsafe {
                MmapOptions::new()
                    .offset(start)
                    .len(len as usize)
                    .map(&file)?
            };
            segments.push(FileSegment { start, len, map });
        }

        Ok(Mp4File {
            segments,
            file: Arc::new(file),
            pos: 0,
            size,
            input_filename: Some(path.to_string()),
        })
    }

    /// Get a clone of the file handle.
    pub fn file(&self) -> Arc<fs::File> {
        self.file.clone()
    }

    pub fn input_filename(&self) -> Option<&str> {
        self.input_filename.as_deref()
    }

    #[inline]
    fn map(&self, amount: u64) -> io::Result<(usize, usize)> {
        for (idx, seg) in self.segments.iter().enumerate() {
            if self.pos >= seg.start && self.pos < seg.start + seg.len {
                if self.pos + amount > seg.start + seg.len {
                    return Err(ioerr!(
                        InvalidInput,
                        "read of {} bytes at {} crosses a mapped segment boundary",
                        amount,
                        self.pos
                    ));
                }
                return Ok((idx, (self.pos - seg.start) as usize));
            }
        }
        Err(ioerr!(
            InvalidInput,
            "read at {} outside of any mapped segment",
            self.pos
        ))
    }
}

// Read one box header and hop over the box.
fn next_box(file: &fs::File, pos: &mut u64, filesize: u64) -> io::Result<Option<([u8; 4], u64, u64)>> {
    if *pos + 15 >= filesize {
        return Ok(None);
    }
    let mut buf = [0u8; 16];
    file.read_exact_at(&mut buf[..], *pos)?;
    let boxtype = &buf[4..8];
    let mut boxsize = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as u64;
    if boxsize == 0 {
        boxsize = filesize - *pos;
    } else if boxsize == 1 {
        boxsize = u64::from_be_bytes(buf[8..16].try_into().unwrap());
    }
    if boxsize < 8 {
        return Err(ioerr!(InvalidData, "box at {}: impossible size {}", *pos, boxsize));
    }
    let xpos = *pos;
    *pos += boxsize;
    Ok(Some((boxtype.try_into().unwrap(), xpos, boxsize)))
}

/// Locate the `mfra` box through the `mfro` trailer at the end of the file.
///
/// Returns the `(offset, size)` of the `mfra` box, or `None` when the file
/// does not end in a valid `mfro`.
pub fn mfra_extent(file: &fs::File, filesize: u64) -> io::Result<Option<(u64, u64)>> {
    if filesize < 16 {
        return Ok(None);
    }
    let mut mfro = [0u8; 16];
    file.read_exact_at(&mut mfro[..], filesize - 16)?;
    if &mfro[4..8] != b"mfro" {
        return Ok(None);
    }
    let mfra_size = u32::from_be_bytes(mfro[12..16].try_into().unwrap()) as u64;
    if mfra_size < 16 || mfra_size > filesize {
        return Ok(None);
    }
    let mfra_pos = filesize - mfra_size;
    let mut hdr = [0u8; 8];
    file.read_exact_at(&mut hdr[..], mfra_pos)?;
    if &hdr[4..8] != b"mfra" {
        log::warn!("mfro points at {} but no mfra box is there", mfra_pos);
        return Ok(None);
    }
    Ok(Some((mfra_pos, mfra_size)))
}

impl ReadBytes for Mp4File {
    #[inline]
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        let (seg, offset) = self.map(amount)?;
        self.pos += amount;
        Ok(&self.segments[seg].map[offset..offset + amount as usize])
    }

    #[inline]
    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        let (seg, offset) = self.map(amount)?;
        Ok(&self.segments[seg].map[offset..offset + amount as usize])
    }

    #[inline]
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        if self.pos + amount > self.size {
            return Err(ioerr!(UnexpectedEof, "skip past end of file"));
        }
        self.pos += amount;
        Ok(())
    }

    #[inline]
    fn left(&mut self) -> u64 {
        self.size.saturating_sub(self.pos)
    }
}

/// ReadBytes over an in-memory buffer, with a real position and size.
///
/// `MP4::parse` uses this so that box extents (`mdat`) record correct
/// absolute offsets, which a plain `&[u8]` reader cannot provide.
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos:  u64,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> SliceReader<'a> {
        SliceReader { data, pos: 0 }
    }
}

impl<'a> ReadBytes for SliceReader<'a> {
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        let amount = if amount == 0 { self.left() } else { amount };
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "read past end of buffer"));
        }
        let start = self.pos as usize;
        self.pos += amount;
        Ok(&self.data[start..start + amount as usize])
    }

    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "peek past end of buffer"));
        }
        let start = self.pos as usize;
        Ok(&self.data[start..start + amount as usize])
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        if self.pos + amount > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "skip past end of buffer"));
        }
        self.pos += amount;
        Ok(())
    }

    fn left(&mut self) -> u64 {
        (self.data.len() as u64).saturating_sub(self.pos)
    }
}

impl<'a> BoxBytes for SliceReader<'a> {
    fn pos(&mut self) -> u64 {
        self.pos
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.data.len() as u64 {
            return Err(ioerr!(UnexpectedEof, "seek past end of buffer"));
        }
        self.pos = pos;
        Ok(())
    }
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl BoxBytes for Mp4File {
    #[inline]
    fn pos(&mut self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.size {
            return Err(ioerr!(UnexpectedEof, "seek past end of file"));
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

/// Where the payload bytes of the input live.
///
/// Sample data is never copied into the parsed model; fragment and
/// sub-clip builders fetch the few bytes they must inspect (NAL length
/// prefixes) through this, and the bucket writer drains `FileRange`
/// buckets from it.
#[derive(Clone)]
pub enum DataSource {
    File(Arc<fs::File>),
    Memory(Arc<Vec<u8>>),
    None,
}

impl DataSource {
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        match self {
            DataSource::File(file) => file.read_exact_at(buf, offset),
            DataSource::Memory(data) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > data.len() {
                    return Err(ioerr!(UnexpectedEof, "read at {} past end of data", offset));
                }
                buf.copy_from_slice(&data[start..end]);
                Ok(())
            },
            DataSource::None => Err(ioerr!(NotFound, "no data source attached")),
        }
    }

    /// Hint the kernel that a byte range is about to be read.
    pub fn readahead(&self, offset: u64, len: u64) {
        if let DataSource::File(file) = self {
            readahead(file, offset, len);
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataSource::File(_) => write!(f, "DataSource::File"),
            DataSource::Memory(d) => write!(f, "DataSource::Memory({} bytes)", d.len()),
            DataSource::None => write!(f, "DataSource::None"),
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn readahead(file: &fs::File, offset: u64, len: u64) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            offset as libc::off_t,
            len as libc::off_t,
            libc::POSIX_FADV_WILLNEED,
        );
    }
}

#[cfg(target_os = "macos")]
fn readahead(file: &fs::File, offset: u64, len: u64) {
    use std::os::unix::io::AsRawFd;
    if offset < i64::MAX as u64 && len < i32::MAX as u64 {
        let ra = libc::radvisory {
            ra_offset: offset as i64,
            ra_count: len as i32,
        };
        unsafe {
            libc::fcntl(file.as_raw_fd(), libc::F_RDADVISE, &ra);
        }
    }
}

/// Count bytes, don't actually write.
#[derive(Debug, Default)]
pub struct CountBytes {
    pos: usize,
    max: usize,
}

impl CountBytes {
    pub fn new() -> CountBytes {
        CountBytes { pos: 0, max: 0 }
    }

    pub fn size(&self) -> u64 {
        self.max as u64
    }
}

impl WriteBytes for CountBytes {
    fn write(&mut self, newdata: &[u8]) -> io::Result<()> {
        self.pos += newdata.len();
        if self.max < self.pos {
            self.max = self.pos;
        }
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        self.pos += amount as usize;
        if self.max < self.pos {
            self.max = self.pos;
        }
        Ok(())
    }
}

impl BoxBytes for CountBytes {
    fn pos(&mut self) -> u64 {
        self.pos as u64
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        Ok(())
    }
    fn size(&self) -> u64 {
        self.max as u64
    }
}

/// Memory buffer that implements WriteBytes.
#[derive(Debug, Default)]
pub struct MemBuffer {
    data: Vec<u8>,
    pos:  usize,
}

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer {
            data: Vec::new(),
            pos:  0,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl WriteBytes for MemBuffer {
    fn write(&mut self, newdata: &[u8]) -> io::Result<()> {
        let mut newdata = newdata;
        if self.pos < self.data.len() {
            let len = std::cmp::min(self.data.len() - self.pos, newdata.len());
            self.data[self.pos..self.pos + len].copy_from_slice(&newdata[..len]);
            newdata = &newdata[len..];
            self.pos += len;
        }
        if !newdata.is_empty() {
            self.data.extend_from_slice(newdata);
            self.pos = self.data.len();
        }
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> io::Result<()> {
        self.pos += amount as usize;
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        Ok(())
    }
}

impl BoxBytes for MemBuffer {
    fn pos(&mut self) -> u64 {
        self.pos as u64
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        Ok(())
    }
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl<'a, B: ?Sized + ReadBytes + 'a> ReadBytes for Box<B> {
    fn read(&mut self, amount: u64) -> io::Result<&[u8]> {
        B::read(&mut *self, amount)
    }
    fn peek(&mut self, amount: u64) -> io::Result<&[u8]> {
        B::peek(&mut *self, amount)
    }
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        B::skip(&mut *self, amount)
    }
    fn left(&mut self) -> u64 {
        B::left(&mut *self)
    }
}

impl<'a, B: ?Sized + WriteBytes + 'a> WriteBytes for Box<B> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        B::write(&mut *self, data)
    }
    fn skip(&mut self, amount: u64) -> io::Result<()> {
        B::skip(&mut *self, amount)
    }
}

impl<'a, B: ?Sized + BoxBytes + 'a> BoxBytes for Box<B> {
    fn pos(&mut self) -> u64 {
        B::pos(&mut *self)
    }
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        B::seek(&mut *self, pos)
    }
    fn size(&self) -> u64 {
        B::size(&*self)
    }
    fn version(&self) -> u8 {
        B::version(&*self)
    }
    fn flags(&self) -> u32 {
        B::flags(&*self)
    }
    fn fourcc(&self) -> crate::types::FourCC {
        B::fourcc(&*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::ToBytes;

    #[test]
    fn membuffer_seek_and_patch() {
        let mut buf = MemBuffer::new();
        0u32.to_bytes(&mut buf).unwrap();
        buf.write(b"mdat").unwrap();
        buf.write(&[0xaa; 4]).unwrap();
        buf.seek(0).unwrap();
        12u32.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(&v[0..4], &[0, 0, 0, 12]);
        assert_eq!(&v[4..8], b"mdat");
        assert_eq!(v.len(), 12);
    }

    #[test]
    fn countbytes_tracks_high_water_mark() {
        let mut cb = CountBytes::new();
        cb.write(&[0u8; 100]).unwrap();
        cb.seek(10).unwrap();
        cb.write(&[0u8; 10]).unwrap();
        assert_eq!(cb.size(), 100);
    }

    #[test]
    fn memory_data_source() {
        let src = DataSource::Memory(Arc::new(vec![1, 2, 3, 4, 5]));
        let mut buf = [0u8; 2];
        src.read_exact_at(&mut buf, 2).unwrap();
        assert_eq!(buf, [3, 4]);
        assert!(src.read_exact_at(&mut buf, 4).is_err());
    }

    #[test]
    fn mmap_open_and_mfro_discovery() {
        use crate::fragmenter::fragment_file;
        use crate::sample_map::MovieMap;
        use crate::test_fixtures::*;

        let mut patches = Vec::new();
        for i in 0..4u64 {
            let mut v = vec![0, 0, 0, 8];
            v.extend_from_slice(&[i as u8; 8]);
            patches.push((4096 + i * 12, v));
        }
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(4, 100)],
                stss: Some(vec![1, 3]),
                sample_sizes: SampleSizes::Constant(12),
                chunks: vec![(4096, 4)],
                ..FixtureTrack::default()
            }],
            patches,
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();
        let frag = fragment_file(&mp4, &map).unwrap();
        let bytes = frag.to_vec(mp4.data_source()).unwrap();

        let path =
            std::env::temp_dir().join(format!("mp4split-io-{}.ismv", std::process::id()));
        fs::write(&path, &bytes).unwrap();

        // Bottom-up discovery through the mfro trailer.
        let f = fs::File::open(&path).unwrap();
        let (mfra_pos, mfra_size) = mfra_extent(&f, bytes.len() as u64).unwrap().unwrap();
        assert_eq!(&bytes[mfra_pos as usize + 4..mfra_pos as usize + 8], b"mfra");
        assert_eq!(mfra_pos + mfra_size, bytes.len() as u64);

        // And the full mmap-backed read path.
        let file = Mp4File::open(path.to_str().unwrap()).unwrap();
        let parsed = crate::mp4box::MP4::read(file).unwrap();
        assert!(parsed.fragment_index().is_some());
        assert_eq!(parsed.movie().tracks().len(), 1);

        fs::remove_file(&path).unwrap();
    }
}
