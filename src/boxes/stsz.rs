use std::io;

use crate::boxes::prelude::*;

/// 8.7.3 Sample Size Box (ISO/IEC 14496-12:2015(E))
///
/// Either a constant `sample_size` for every sample, or a per-sample
/// size table. A `stz2` (compact) table is normalized into the same
/// representation at parse time and always re-emitted as `stsz`.
#[derive(Clone, Debug, Default)]
pub struct SampleSizeBox {
    pub sample_size:  u32,
    pub sample_sizes: Vec<u32>,
}
pub type CompactSampleSizeBox = SampleSizeBox;

impl SampleSizeBox {
    /// Number of per-sample entries (zero for constant-size tracks).
    pub fn entries(&self) -> u32 {
        self.sample_sizes.len() as u32
    }

    /// Size of a zero-based sample.
    pub fn size_of_sample(&self, sample: u32) -> u32 {
        if self.sample_size > 0 {
            self.sample_size
        } else {
            self.sample_sizes.get(sample as usize).copied().unwrap_or(0)
        }
    }
}

impl FromBytes for SampleSizeBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<SampleSizeBox> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;

        if stream.fourcc() == b"stz2" {
            // stz2: 3 reserved bytes, 1 byte field size, then packed sizes.
            stream.skip(3)?;
            let field_size = u8::from_bytes(stream)?;
            let count = u32::from_bytes(stream)?;
            let mut sample_sizes = Vec::with_capacity(count as usize);
            match field_size {
                4 => {
                    for _ in 0..(count + 1) / 2 {
                        let b = u8::from_bytes(stream)?;
                        sample_sizes.push((b >> 4) as u32);
                        if sample_sizes.len() < count as usize {
                            sample_sizes.push((b & 0xf) as u32);
                        }
                    }
                },
                8 => {
                    for _ in 0..count {
                        sample_sizes.push(u8::from_bytes(stream)? as u32);
                    }
                },
                16 => {
                    for _ in 0..count {
                        sample_sizes.push(u16::from_bytes(stream)? as u32);
                    }
                },
                sz => {
                    return Err(ioerr!(InvalidData, "stz2: bad field size {}", sz));
                },
            }
            return Ok(SampleSizeBox {
                sample_size: 0,
                sample_sizes,
            });
        }

        let sample_size = u32::from_bytes(stream)?;
        let mut entries = u32::from_bytes(stream)?;

        // Some encoders write a constant size _and_ an entry count.
        if sample_size > 0 && entries > 0 {
            log::warn!("stsz: both sample_size and entry count set, ignoring entries");
            entries = 0;
        }

        if entries as u64 * 4 > stream.left() {
            return Err(ioerr!(
                InvalidData,
                "stsz: {} entries do not fit payload",
                entries
            ));
        }

        let mut sample_sizes = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            sample_sizes.push(u32::from_bytes(stream)?);
        }

        Ok(SampleSizeBox {
            sample_size,
            sample_sizes,
        })
    }

    fn min_size() -> usize {
        20
    }
}

impl ToBytes for SampleSizeBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        self.sample_size.to_bytes(stream)?;
        if self.sample_size > 0 {
            0u32.to_bytes(stream)?;
        } else {
            (self.sample_sizes.len() as u32).to_bytes(stream)?;
            for sz in &self.sample_sizes {
                sz.to_bytes(stream)?;
            }
        }

        writer.finalize()
    }
}

impl BoxInfo for SampleSizeBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"stsz")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for SampleSizeBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;

    #[test]
    fn constant_size_with_spurious_entries_is_fixed_up() {
        let wire: Vec<u8> = vec![
            0, 0, 0, 20, b's', b't', b's', b'z', 0, 0, 0, 0, //
            0, 0, 0, 188, // sample_size
            0, 0, 0, 1, // bogus entry count, no entries follow
        ];
        let mut rd = SliceReader::new(&wire);
        let stsz = SampleSizeBox::from_bytes(&mut rd).unwrap();
        assert_eq!(stsz.sample_size, 188);
        assert_eq!(stsz.entries(), 0);
        assert_eq!(stsz.size_of_sample(7), 188);
    }

    #[test]
    fn stz2_is_normalized() {
        let wire: Vec<u8> = vec![
            0, 0, 0, 23, b's', b't', b'z', b'2', 0, 0, 0, 0, //
            0, 0, 0, 8, // reserved + field_size 8
            0, 0, 0, 3, // count
            10, 20, 30,
        ];
        let mut rd = SliceReader::new(&wire);
        let stsz = CompactSampleSizeBox::from_bytes(&mut rd).unwrap();
        assert_eq!(stsz.sample_size, 0);
        assert_eq!(stsz.sample_sizes, vec![10, 20, 30]);
        assert_eq!(stsz.fourcc(), FourCC::new(b"stsz"));
    }
}
