//! Movie fragment random access index.
use std::io;

use crate::boxes::prelude::*;

/// 8.8.9 Movie Fragment Random Access Box (ISO/IEC 14496-12:2015(E))
///
/// Serializing always appends a fresh `mfro` carrying the total `mfra`
/// size, so a parsed `mfro` child is not re-emitted.
#[derive(Clone, Debug, Default)]
pub struct MovieFragmentRandomAccessBox {
    pub boxes: Vec<MP4Box>,
}

impl MovieFragmentRandomAccessBox {
    /// Find the `tfra` for a track.
    pub fn tfra_for_track(&self, track_id: u32) -> Option<&TrackFragmentRandomAccessBox> {
        iter_box!(&self.boxes, TrackFragmentRandomAccessBox).find(|t| t.track_id == track_id)
    }
}

impl FromBytes for MovieFragmentRandomAccessBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<MovieFragmentRandomAccessBox> {
        let mut reader = BoxReader::new(stream)?;
        let boxes = Vec::<MP4Box>::from_bytes(&mut reader)?;
        Ok(MovieFragmentRandomAccessBox { boxes })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for MovieFragmentRandomAccessBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let start = stream.pos();
        let mut writer = BoxWriter::new(stream, self)?;

        for b in &self.boxes {
            if let MP4Box::MovieFragmentRandomAccessOffsetBox(_) = b {
                continue;
            }
            b.to_bytes(&mut writer)?;
        }

        // The trailing mfro records the size of the whole mfra so that
        // it can be found from the end of the file.
        let mfra_size = (writer.pos() - start + 16) as u32;
        let mfro = MovieFragmentRandomAccessOffsetBox { mfra_size };
        mfro.to_bytes(&mut writer)?;

        writer.finalize()
    }
}

impl BoxInfo for MovieFragmentRandomAccessBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"mfra")
    }
}

impl FullBox for MovieFragmentRandomAccessBox {}

/// One entry in a `tfra`: where to find the fragment that starts at
/// `time`.
#[derive(Clone, Debug, Default)]
pub struct TfraEntry {
    pub time:          u64,
    pub moof_offset:   u64,
    /// Zero-based; stored one-based on the wire.
    pub traf_number:   u32,
    pub trun_number:   u32,
    pub sample_number: u32,
}

/// 8.8.10 Track Fragment Random Access Box (ISO/IEC 14496-12:2015(E))
#[derive(Clone, Debug)]
pub struct TrackFragmentRandomAccessBox {
    pub version:  u8,
    pub track_id: u32,
    length_size_of_traf_num:   u8,
    length_size_of_trun_num:   u8,
    length_size_of_sample_num: u8,
    pub entries:  Vec<TfraEntry>,
}

impl Default for TrackFragmentRandomAccessBox {
    fn default() -> Self {
        TrackFragmentRandomAccessBox {
            version: 1,
            track_id: 0,
            length_size_of_traf_num: 1,
            length_size_of_trun_num: 1,
            length_size_of_sample_num: 1,
            entries: Vec::new(),
        }
    }
}

impl TrackFragmentRandomAccessBox {
    /// The entry whose time matches exactly, if any.
    pub fn entry_at_time(&self, time: u64) -> Option<&TfraEntry> {
        self.entries.iter().find(|e| e.time == time)
    }
}

// Integers of 1..=4 bytes, used for the traf/trun/sample numbers.
fn read_n<R: ReadBytes>(stream: &mut R, size: u8) -> io::Result<u32> {
    let data = stream.read(size as u64)?;
    let mut v = 0u32;
    for &b in data {
        v = (v << 8) | b as u32;
    }
    Ok(v)
}

fn write_n<W: WriteBytes>(stream: &mut W, size: u8, value: u32) -> io::Result<()> {
    let bytes = value.to_be_bytes();
    stream.write(&bytes[4 - size as usize..])
}

impl FromBytes for TrackFragmentRandomAccessBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackFragmentRandomAccessBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;

        let track_id = u32::from_bytes(stream)?;
        let length_fields = u32::from_bytes(stream)?;
        let length_size_of_traf_num = ((length_fields >> 4) & 3) as u8 + 1;
        let length_size_of_trun_num = ((length_fields >> 2) & 3) as u8 + 1;
        let length_size_of_sample_num = (length_fields & 3) as u8 + 1;
        let count = u32::from_bytes(stream)?;

        let entry_size = (if version == 0 { 8 } else { 16 })
            + length_size_of_traf_num as u64
            + length_size_of_trun_num as u64
            + length_size_of_sample_num as u64;
        if count as u64 * entry_size > stream.left() {
            return Err(ioerr!(InvalidData, "tfra: {} entries do not fit payload", count));
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (time, moof_offset) = if version == 0 {
                (u32::from_bytes(stream)? as u64, u32::from_bytes(stream)? as u64)
            } else {
                (u64::from_bytes(stream)?, u64::from_bytes(stream)?)
            };
            entries.push(TfraEntry {
                time,
                moof_offset,
                traf_number: read_n(stream, length_size_of_traf_num)?.saturating_sub(1),
                trun_number: read_n(stream, length_size_of_trun_num)?.saturating_sub(1),
                sample_number: read_n(stream, length_size_of_sample_num)?.saturating_sub(1),
            });
        }

        Ok(TrackFragmentRandomAccessBox {
            version,
            track_id,
            length_size_of_traf_num,
            length_size_of_trun_num,
            length_size_of_sample_num,
            entries,
        })
    }

    fn min_size() -> usize {
        24
    }
}

impl ToBytes for TrackFragmentRandomAccessBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        self.track_id.to_bytes(stream)?;
        let length_fields = ((self.length_size_of_traf_num as u32 - 1) << 4)
            | ((self.length_size_of_trun_num as u32 - 1) << 2)
            | (self.length_size_of_sample_num as u32 - 1);
        length_fields.to_bytes(stream)?;
        (self.entries.len() as u32).to_bytes(stream)?;

        for entry in &self.entries {
            if self.version == 0 {
                (entry.time as u32).to_bytes(stream)?;
                (entry.moof_offset as u32).to_bytes(stream)?;
            } else {
                entry.time.to_bytes(stream)?;
                entry.moof_offset.to_bytes(stream)?;
            }
            write_n(stream, self.length_size_of_traf_num, entry.traf_number + 1)?;
            write_n(stream, self.length_size_of_trun_num, entry.trun_number + 1)?;
            write_n(stream, self.length_size_of_sample_num, entry.sample_number + 1)?;
        }

        writer.finalize()
    }
}

impl BoxInfo for TrackFragmentRandomAccessBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"tfra")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for TrackFragmentRandomAccessBox {
    fn version(&self) -> Option<u8> {
        Some(self.version)
    }
}

def_box! {
    /// 8.8.11 Movie Fragment Random Access Offset Box.
    #[derive(Default)]
    MovieFragmentRandomAccessOffsetBox {
        mfra_size:  u32,
    },
    fourcc => b"mfro",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn tfra_roundtrip_and_lookup() {
        let mut tfra = TrackFragmentRandomAccessBox::default();
        tfra.track_id = 1;
        tfra.entries.push(TfraEntry {
            time: 0,
            moof_offset: 1024,
            ..TfraEntry::default()
        });
        tfra.entries.push(TfraEntry {
            time: 20_000_000,
            moof_offset: 9000,
            ..TfraEntry::default()
        });

        let mut buf = MemBuffer::new();
        tfra.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();

        let mut rd = SliceReader::new(&v);
        let back = TrackFragmentRandomAccessBox::from_bytes(&mut rd).unwrap();
        assert_eq!(back.track_id, 1);
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.entry_at_time(20_000_000).unwrap().moof_offset, 9000);
        assert!(back.entry_at_time(1).is_none());
    }

    #[test]
    fn mfra_appends_mfro_with_total_size() {
        let mut mfra = MovieFragmentRandomAccessBox::default();
        let mut tfra = TrackFragmentRandomAccessBox::default();
        tfra.track_id = 1;
        mfra.boxes.push(tfra.to_mp4box());

        let mut buf = MemBuffer::new();
        mfra.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();

        let total = u32::from_be_bytes([v[0], v[1], v[2], v[3]]) as usize;
        assert_eq!(total, v.len());
        // trailing mfro carries the same size.
        assert_eq!(&v[v.len() - 12..v.len() - 8], b"mfro");
        let mfro_size = u32::from_be_bytes([
            v[v.len() - 4],
            v[v.len() - 3],
            v[v.len() - 2],
            v[v.len() - 1],
        ]);
        assert_eq!(mfro_size as usize, v.len());
    }
}
