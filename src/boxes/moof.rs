//! Movie fragment boxes.
//!
//! The tfhd / trun defaults and flag values written here are exactly
//! the ones Smooth Streaming clients expect; see the fragment builder.
use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 8.8.4 Movie Fragment Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    MovieFragmentBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"moof",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

def_box! {
    /// 8.8.6 Track Fragment Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    TrackFragmentBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"traf",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

/// 8.8.7 Track Fragment Header Box (ISO/IEC 14496-12:2015(E))
#[derive(Clone, Debug, Default)]
pub struct TrackFragmentHeaderBox {
    pub track_id:                 u32,
    pub duration_is_empty:        bool,
    pub default_base_is_moof:     bool,
    pub base_data_offset:         Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration:  Option<u32>,
    pub default_sample_size:      Option<u32>,
    pub default_sample_flags:     Option<u32>,
}

fn opt<T>(flag: bool, f: impl FnOnce() -> io::Result<T>) -> io::Result<Option<T>> {
    if flag {
        f().map(Some)
    } else {
        Ok(None)
    }
}

impl FromBytes for TrackFragmentHeaderBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackFragmentHeaderBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;

        let flags = stream.flags();
        let track_id = u32::from_bytes(stream)?;

        Ok(TrackFragmentHeaderBox {
            track_id,
            duration_is_empty: flags & 0x010000 > 0,
            default_base_is_moof: flags & 0x020000 > 0,
            base_data_offset: opt(flags & 0x01 > 0, || u64::from_bytes(stream))?,
            sample_description_index: opt(flags & 0x02 > 0, || u32::from_bytes(stream))?,
            default_sample_duration: opt(flags & 0x08 > 0, || u32::from_bytes(stream))?,
            default_sample_size: opt(flags & 0x10 > 0, || u32::from_bytes(stream))?,
            default_sample_flags: opt(flags & 0x20 > 0, || u32::from_bytes(stream))?,
        })
    }

    fn min_size() -> usize {
        16
    }
}

impl ToBytes for TrackFragmentHeaderBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        self.track_id.to_bytes(stream)?;
        self.base_data_offset.map_or(Ok(()), |x| x.to_bytes(stream))?;
        self.sample_description_index.map_or(Ok(()), |x| x.to_bytes(stream))?;
        self.default_sample_duration.map_or(Ok(()), |x| x.to_bytes(stream))?;
        self.default_sample_size.map_or(Ok(()), |x| x.to_bytes(stream))?;
        self.default_sample_flags.map_or(Ok(()), |x| x.to_bytes(stream))?;

        writer.finalize()
    }
}

impl BoxInfo for TrackFragmentHeaderBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"tfhd")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for TrackFragmentHeaderBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
    fn flags(&self) -> u32 {
        self.base_data_offset.is_some() as u32 * 0x01
            | self.sample_description_index.is_some() as u32 * 0x02
            | self.default_sample_duration.is_some() as u32 * 0x08
            | self.default_sample_size.is_some() as u32 * 0x10
            | self.default_sample_flags.is_some() as u32 * 0x20
            | self.duration_is_empty as u32 * 0x010000
            | self.default_base_is_moof as u32 * 0x020000
    }
}

/// 8.8.8 Track Fragment Run Box (ISO/IEC 14496-12:2015(E))
#[derive(Clone, Debug, Default)]
pub struct TrackRunBox {
    pub data_offset:        Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub entries:            Vec<TrackRunEntry>,
}

/// One sample in a TrackRunBox.
#[derive(Clone, Debug, Default)]
pub struct TrackRunEntry {
    pub sample_duration:                Option<u32>,
    pub sample_size:                    Option<u32>,
    pub sample_flags:                   Option<u32>,
    pub sample_composition_time_offset: Option<i32>,
}

impl TrackRunEntry {
    fn field_flags(&self) -> u32 {
        self.sample_duration.is_some() as u32 * 0x0100
            | self.sample_size.is_some() as u32 * 0x0200
            | self.sample_flags.is_some() as u32 * 0x0400
            | self.sample_composition_time_offset.is_some() as u32 * 0x0800
    }
}

impl FromBytes for TrackRunBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<TrackRunBox> {
        let mut reader = BoxReader::new(stream)?;
        let version = reader.header.version.unwrap_or(0);
        let stream = &mut reader;

        let flags = stream.flags();
        let sample_count = u32::from_bytes(stream)?;

        let data_offset = opt(flags & 0x01 > 0, || i32::from_bytes(stream))?;
        let first_sample_flags = opt(flags & 0x04 > 0, || u32::from_bytes(stream))?;

        let mut entries = Vec::with_capacity(std::cmp::min(sample_count, 65536) as usize);
        for _ in 0..sample_count {
            entries.push(TrackRunEntry {
                sample_duration: opt(flags & 0x0100 > 0, || u32::from_bytes(stream))?,
                sample_size: opt(flags & 0x0200 > 0, || u32::from_bytes(stream))?,
                sample_flags: opt(flags & 0x0400 > 0, || u32::from_bytes(stream))?,
                sample_composition_time_offset: opt(flags & 0x0800 > 0, || {
                    if version == 0 {
                        Ok(std::cmp::min(u32::from_bytes(stream)?, 0x7fffffff) as i32)
                    } else {
                        i32::from_bytes(stream)
                    }
                })?,
            });
        }

        Ok(TrackRunBox {
            data_offset,
            first_sample_flags,
            entries,
        })
    }

    fn min_size() -> usize {
        16
    }
}

impl ToBytes for TrackRunBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        (self.entries.len() as u32).to_bytes(stream)?;
        self.data_offset.map_or(Ok(()), |x| x.to_bytes(stream))?;
        self.first_sample_flags.map_or(Ok(()), |x| x.to_bytes(stream))?;

        for entry in &self.entries {
            entry.sample_duration.map_or(Ok(()), |x| x.to_bytes(stream))?;
            entry.sample_size.map_or(Ok(()), |x| x.to_bytes(stream))?;
            entry.sample_flags.map_or(Ok(()), |x| x.to_bytes(stream))?;
            entry
                .sample_composition_time_offset
                .map_or(Ok(()), |x| x.to_bytes(stream))?;
        }

        writer.finalize()
    }
}

impl BoxInfo for TrackRunBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"trun")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(1)
    }
}

impl FullBox for TrackRunBox {
    fn version(&self) -> Option<u8> {
        let negative = self
            .entries
            .iter()
            .any(|e| e.sample_composition_time_offset.unwrap_or(0) < 0);
        Some(negative as u8)
    }
    fn flags(&self) -> u32 {
        self.data_offset.is_some() as u32 * 0x01
            | self.first_sample_flags.is_some() as u32 * 0x04
            | self.entries.first().map(|e| e.field_flags()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    #[test]
    fn trun_flags_follow_field_presence() {
        let trun = TrackRunBox {
            data_offset: None,
            first_sample_flags: Some(0x40),
            entries: vec![
                TrackRunEntry {
                    sample_duration: Some(333),
                    sample_size: Some(1000),
                    sample_flags: None,
                    sample_composition_time_offset: Some(50),
                },
                TrackRunEntry {
                    sample_duration: Some(333),
                    sample_size: Some(900),
                    sample_flags: None,
                    sample_composition_time_offset: Some(0),
                },
            ],
        };
        assert_eq!(trun.flags(), 0x0b04);

        let mut buf = MemBuffer::new();
        trun.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        // size 12 (header) + 4 (count) + 4 (fsf) + 2 * 12 entries
        assert_eq!(v.len(), 44);
        assert_eq!(&v[4..8], b"trun");
        assert_eq!(v[8], 0); // version
        assert_eq!(&v[9..12], &[0x00, 0x0b, 0x04]);

        let mut rd = SliceReader::new(&v);
        let back = TrackRunBox::from_bytes(&mut rd).unwrap();
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.first_sample_flags, Some(0x40));
        assert_eq!(back.entries[0].sample_size, Some(1000));
        assert_eq!(back.entries[1].sample_composition_time_offset, Some(0));
    }

    #[test]
    fn tfhd_default_flags_layout() {
        let tfhd = TrackFragmentHeaderBox {
            track_id: 2,
            default_sample_flags: Some(0xc0),
            ..TrackFragmentHeaderBox::default()
        };
        assert_eq!(tfhd.flags(), 0x20);

        let mut buf = MemBuffer::new();
        tfhd.to_bytes(&mut buf).unwrap();
        let v = buf.into_vec();
        assert_eq!(v.len(), 20);
        assert_eq!(&v[9..12], &[0, 0, 0x20]);
        assert_eq!(&v[16..20], &[0, 0, 0, 0xc0]);
    }
}
