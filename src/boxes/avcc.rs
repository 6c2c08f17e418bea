//! AVC decoder configuration.
use std::io;

use crate::boxes::prelude::*;

/// AvcConfigurationBox (ISO/IEC 14496-15).
///
/// The raw payload is kept for byte-exact re-emission; the SPS / PPS
/// lists and the NAL length size are parsed views into it.
//
// aligned(8) class AVCDecoderConfigurationRecord {
//     unsigned int(8) configurationVersion = 1;
//     unsigned int(8) AVCProfileIndication;
//     unsigned int(8) profile_compatibility;
//     unsigned int(8) AVCLevelIndication;
//     bit(6) reserved; unsigned int(2) lengthSizeMinusOne;
//     bit(3) reserved; unsigned int(5) numOfSequenceParameterSets;
//     for (i=0; i<numOfSequenceParameterSets; i++) {
//       unsigned int(16) sequenceParameterSetLength;
//       bit(8*sequenceParameterSetLength) sequenceParameterSetNALUnit;
//     }
//     unsigned int(8) numOfPictureParameterSets;
//     for (i=0; i<numOfPictureParameterSets; i++) {
//       unsigned int(16) pictureParameterSetLength;
//       bit(8*pictureParameterSetLength) pictureParameterSetNALUnit;
//     }
// }
#[derive(Clone)]
pub struct AvcConfigurationBox {
    pub data:                  Data,
    pub configuration_version: u8,
    pub profile_indication:    u8,
    pub profile_compatibility: u8,
    pub level_indication:      u8,
    /// 1..4 bytes of length in front of every NAL unit.
    pub nal_unit_length:       u8,
    pub sps:                   Vec<Vec<u8>>,
    pub pps:                   Vec<Vec<u8>>,
}

impl AvcConfigurationBox {
    /// Build a configuration record from its parts.
    pub fn new(
        profile: u8,
        compatibility: u8,
        level: u8,
        nal_unit_length: u8,
        sps: Vec<Vec<u8>>,
        pps: Vec<Vec<u8>>,
    ) -> AvcConfigurationBox {
        let mut data = vec![
            1,
            profile,
            compatibility,
            level,
            0xfc | (nal_unit_length - 1),
            0xe0 | sps.len() as u8,
        ];
        for set in &sps {
            data.extend_from_slice(&(set.len() as u16).to_be_bytes());
            data.extend_from_slice(set);
        }
        data.push(pps.len() as u8);
        for set in &pps {
            data.extend_from_slice(&(set.len() as u16).to_be_bytes());
            data.extend_from_slice(set);
        }
        AvcConfigurationBox {
            data: Data(data),
            configuration_version: 1,
            profile_indication: profile,
            profile_compatibility: compatibility,
            level_indication: level,
            nal_unit_length,
            sps,
            pps,
        }
    }

    pub(crate) fn parse(data: &[u8]) -> io::Result<AvcConfigurationBox> {
        if data.len() < 7 {
            return Err(ioerr!(UnexpectedEof, "avcC: truncated configuration record"));
        }
        let mut idx = 6;

        let nal_unit_length = (data[4] & 3) + 1;
        let num_sps = data[5] & 0x1f;

        let mut read_set = |idx: &mut usize| -> io::Result<Vec<u8>> {
            if *idx + 2 > data.len() {
                return Err(ioerr!(UnexpectedEof, "avcC: truncated parameter set"));
            }
            let len = u16::from_be_bytes([data[*idx], data[*idx + 1]]) as usize;
            *idx += 2;
            if *idx + len > data.len() {
                return Err(ioerr!(UnexpectedEof, "avcC: truncated parameter set"));
            }
            let set = data[*idx..*idx + len].to_vec();
            *idx += len;
            Ok(set)
        };

        let mut sps = Vec::new();
        for _ in 0..num_sps {
            sps.push(read_set(&mut idx)?);
        }

        if idx >= data.len() {
            return Err(ioerr!(UnexpectedEof, "avcC: truncated configuration record"));
        }
        let num_pps = data[idx];
        idx += 1;

        let mut pps = Vec::new();
        for _ in 0..num_pps {
            pps.push(read_set(&mut idx)?);
        }

        Ok(AvcConfigurationBox {
            data: Data(data.to_vec()),
            configuration_version: data[0],
            profile_indication: data[1],
            profile_compatibility: data[2],
            level_indication: data[3],
            nal_unit_length,
            sps,
            pps,
        })
    }

    /// The Smooth Streaming codec private data: every SPS and PPS with
    /// a 2-byte length in front.
    pub fn codec_private_data(&self) -> Vec<u8> {
        let mut v = Vec::new();
        for set in self.sps.iter().chain(self.pps.iter()) {
            v.extend_from_slice(&(set.len() as u16).to_be_bytes());
            v.extend_from_slice(set);
        }
        v
    }

    /// Codec id as `avc1.4d401f`.
    pub fn codec_id(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }
}

impl FromBytes for AvcConfigurationBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<AvcConfigurationBox> {
        let mut reader = BoxReader::new(stream)?;
        let left = reader.left();
        let data = reader.read(left)?;
        AvcConfigurationBox::parse(data)
    }
    fn min_size() -> usize {
        15
    }
}

impl ToBytes for AvcConfigurationBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        self.data.to_bytes(&mut writer)?;
        writer.finalize()
    }
}

impl BoxInfo for AvcConfigurationBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"avcC")
    }
}

impl FullBox for AvcConfigurationBox {}

impl std::fmt::Debug for AvcConfigurationBox {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AvcConfigurationBox")
            .field("codec_id", &self.codec_id())
            .field("nal_unit_length", &self.nal_unit_length)
            .field("sps", &self.sps.iter().map(|s| s.len()).collect::<Vec<_>>())
            .field("pps", &self.pps.iter().map(|p| p.len()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemBuffer, SliceReader};

    pub fn avcc_bytes() -> Vec<u8> {
        let mut v = vec![
            0, 0, 0, 0, b'a', b'v', b'c', b'C', // size patched below
            1, 0x64, 0x00, 0x1f, // version, profile, compat, level
            0xff, // nal length size 4
            0xe1, // 1 sps
            0, 4, 0x67, 0x64, 0x00, 0x1f, // sps
            1, // 1 pps
            0, 3, 0x68, 0xee, 0x3c, // pps
        ];
        let sz = v.len() as u32;
        v[0..4].copy_from_slice(&sz.to_be_bytes());
        v
    }

    #[test]
    fn parses_sps_pps() {
        let wire = avcc_bytes();
        let mut rd = SliceReader::new(&wire);
        let avcc = AvcConfigurationBox::from_bytes(&mut rd).unwrap();
        assert_eq!(avcc.nal_unit_length, 4);
        assert_eq!(avcc.sps, vec![vec![0x67, 0x64, 0x00, 0x1f]]);
        assert_eq!(avcc.pps, vec![vec![0x68, 0xee, 0x3c]]);
        assert_eq!(avcc.codec_id(), "avc1.64001f");
        assert_eq!(
            avcc.codec_private_data(),
            vec![0, 4, 0x67, 0x64, 0x00, 0x1f, 0, 3, 0x68, 0xee, 0x3c]
        );

        // and it round-trips byte-exact.
        let mut buf = MemBuffer::new();
        avcc.to_bytes(&mut buf).unwrap();
        assert_eq!(buf.into_vec(), wire);
    }
}
