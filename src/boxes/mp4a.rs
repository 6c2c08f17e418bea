//! MPEG-4 and WMA audio sample entries, and the ESDescriptor.
use std::io;

use crate::bitreader::BitReader;
use crate::boxes::prelude::*;

// ADTS sampling_frequency_index table.
pub(crate) const AAC_SAMPLERATES: [u32; 16] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0, 0,
    0,
];

// Index into AAC_SAMPLERATES, defaulting to 44100.
pub(crate) fn samplerate_index(rate: u32) -> u8 {
    AAC_SAMPLERATES[..13]
        .iter()
        .position(|&r| r == rate)
        .unwrap_or(4) as u8
}

/// AAC sample entry (AudioSampleEntry).
///
/// The first 28 bytes are the QuickTime sound sample description;
/// version 1 adds 16 bytes of compression info, version 2 adds 36.
/// The `esds` (possibly inside a `wave`) follows as a child box.
#[derive(Clone, Debug)]
pub struct AudioSampleEntry {
    pub data_reference_index: u16,
    pub qt_version:           u16,
    pub revision:             u16,
    pub vendor:               u32,
    /// mono = 1, stereo = 2. A value of 3 stands for 6 (5.1).
    pub channel_count:        u16,
    pub sample_size:          u16,
    pub compression_id:       u16,
    pub packet_size:          u16,
    pub sample_rate_hi:       u16,
    pub sample_rate_lo:       u16,
    // the 16 (v1) or 36 (v2) bytes of compression info.
    pub compression_info:     Data,
    pub boxes:                Vec<MP4Box>,
}

impl FromBytes for AudioSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<AudioSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        let stream = &mut reader;

        if stream.left() < 28 - 8 {
            return Err(ioerr!(InvalidData, "mp4a: invalid sample description size"));
        }

        stream.skip(6)?;
        let data_reference_index = u16::from_bytes(stream)?;
        let qt_version = u16::from_bytes(stream)?;
        let revision = u16::from_bytes(stream)?;
        let vendor = u32::from_bytes(stream)?;
        let channel_count = u16::from_bytes(stream)?;
        let sample_size = u16::from_bytes(stream)?;
        let compression_id = u16::from_bytes(stream)?;
        let packet_size = u16::from_bytes(stream)?;
        let sample_rate_hi = u16::from_bytes(stream)?;
        let sample_rate_lo = u16::from_bytes(stream)?;

        let compression_info = match qt_version {
            0 => Data::default(),
            1 => Data::read(stream, 16)?,
            2 => Data::read(stream, 36)?,
            v => return Err(ioerr!(InvalidData, "mp4a: unknown sound description version {}", v)),
        };

        let boxes = Vec::<MP4Box>::from_bytes(stream)?;

        Ok(AudioSampleEntry {
            data_reference_index,
            qt_version,
            revision,
            vendor,
            channel_count,
            sample_size,
            compression_id,
            packet_size,
            sample_rate_hi,
            sample_rate_lo,
            compression_info,
            boxes,
        })
    }
    fn min_size() -> usize {
        36
    }
}

impl ToBytes for AudioSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        let stream = &mut writer;

        stream.skip(6)?;
        self.data_reference_index.to_bytes(stream)?;
        self.qt_version.to_bytes(stream)?;
        self.revision.to_bytes(stream)?;
        self.vendor.to_bytes(stream)?;
        self.channel_count.to_bytes(stream)?;
        self.sample_size.to_bytes(stream)?;
        self.compression_id.to_bytes(stream)?;
        self.packet_size.to_bytes(stream)?;
        self.sample_rate_hi.to_bytes(stream)?;
        self.sample_rate_lo.to_bytes(stream)?;
        self.compression_info.to_bytes(stream)?;
        self.boxes.to_bytes(stream)?;

        writer.finalize()
    }
}

impl BoxInfo for AudioSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"mp4a")
    }
}

impl FullBox for AudioSampleEntry {}

impl AudioSampleEntry {
    /// The ESDescriptor, either a direct child or inside a `wave` box.
    pub fn esds(&self) -> Option<&ESDescriptorBox> {
        if let Some(esds) = first_box!(&self.boxes, ESDescriptorBox) {
            return Some(esds);
        }
        first_box!(&self.boxes, WaveBox).and_then(|wave| first_box!(&wave.boxes, ESDescriptorBox))
    }

    /// Build the WAVEFORMATEX-shaped view of this entry.
    pub fn wave_format(&self) -> io::Result<WaveFormat> {
        // A QuickTime channel count of 3 means 5.1.
        let channels = if self.channel_count == 3 {
            6
        } else {
            self.channel_count
        };
        let samples_per_sec = self.sample_rate_hi as u32;
        let bits_per_sample = self.sample_size;

        let mut wf = WaveFormat {
            format_tag: 0,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: 0,
            block_align: 0,
            bits_per_sample,
            codec_private_data: Vec::new(),
            avg_bitrate: 0,
            max_bitrate: 0,
        };

        if self.qt_version >= 1 && self.compression_info.len() >= 16 {
            let b = &self.compression_info.0;
            let samples_per_packet = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            let bytes_per_packet = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
            let bytes_per_frame = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
            if samples_per_packet > 0 {
                wf.avg_bytes_per_sec = (channels as u32 * samples_per_sec * bytes_per_packet
                    + samples_per_packet / 2)
                    / samples_per_packet;
                wf.block_align = bytes_per_frame as u16;
            } else {
                wf.avg_bytes_per_sec =
                    channels as u32 * samples_per_sec * bits_per_sample as u32 / 8;
            }
        }

        let esds = self
            .esds()
            .ok_or_else(|| ioerr!(InvalidData, "mp4a: no esds present"))?;

        wf.format_tag = match esds.object_type {
            // MPEG-4 audio, MPEG-2 AAC profiles: raw AAC.
            0x40 | 0x66 | 0x67 | 0x68 => 0x00ff,
            // MPEG-1 / MPEG-2 layer 3.
            0x6b | 0x69 => 0x0055,
            other => {
                return Err(ioerr!(InvalidData, "esds: unknown object type {:#x}", other));
            },
        };
        wf.avg_bitrate = esds.avg_bitrate;
        wf.max_bitrate = esds.max_bitrate;
        if wf.avg_bytes_per_sec == 0 {
            wf.avg_bytes_per_sec = std::cmp::max(esds.avg_bitrate, esds.max_bitrate) / 8;
        }
        wf.codec_private_data = esds.decoder_specific.0.clone();

        Ok(wf)
    }
}

/// The WAVEFORMATEX-shaped view of an audio sample entry.
#[derive(Clone, Debug, Default)]
pub struct WaveFormat {
    pub format_tag:         u16,
    pub channels:           u16,
    pub samples_per_sec:    u32,
    pub avg_bytes_per_sec:  u32,
    pub block_align:        u16,
    pub bits_per_sample:    u16,
    /// AudioSpecificConfig for AAC.
    pub codec_private_data: Vec<u8>,
    pub avg_bitrate:        u32,
    pub max_bitrate:        u32,
}

impl WaveFormat {
    /// Serialize as a little-endian WAVEFORMATEX with `cbSize` set to
    /// the length of the codec private data (which is not appended).
    pub fn to_waveformatex(&self) -> [u8; 18] {
        let mut b = [0u8; 18];
        b[0..2].copy_from_slice(&self.format_tag.to_le_bytes());
        b[2..4].copy_from_slice(&self.channels.to_le_bytes());
        b[4..8].copy_from_slice(&self.samples_per_sec.to_le_bytes());
        b[8..12].copy_from_slice(&self.avg_bytes_per_sec.to_le_bytes());
        b[12..14].copy_from_slice(&std::cmp::max(self.block_align, 1).to_le_bytes());
        b[14..16].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        b[16..18].copy_from_slice(&(self.codec_private_data.len() as u16).to_le_bytes());
        b
    }
}

def_box! {
    /// QuickTime `wave` extension box, usually wrapping an `esds`.
    WaveBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"wave",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

/// WMA sample entry.
///
/// `owma` is immediately followed by the codec private data (which
/// already starts with a WAVEFORMATEX), *not* by child boxes.
#[derive(Clone, Debug)]
pub struct OwmaSampleEntry {
    pub data_reference_index: u16,
    pub channel_count:        u16,
    pub sample_size:          u16,
    pub sample_rate_hi:       u16,
    pub sample_rate_lo:       u16,
    pub head:                 Data,
    pub codec_private_data:   Data,
}

impl FromBytes for OwmaSampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<OwmaSampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        // The 28-byte QuickTime sound sample description (6 reserved,
        // dref index, version/revision/vendor, channels, bits,
        // compression/packet, rate hi/lo), then the codec private data.
        if reader.left() < 28 {
            return Err(ioerr!(InvalidData, "owma: invalid sample description size"));
        }
        let head = Data::read(&mut reader, 28)?;
        let b = &head.0;
        let codec_private_data = Data::from_bytes(&mut reader)?;
        Ok(OwmaSampleEntry {
            data_reference_index: u16::from_be_bytes([b[6], b[7]]),
            channel_count: u16::from_be_bytes([b[16], b[17]]),
            sample_size: u16::from_be_bytes([b[18], b[19]]),
            sample_rate_hi: u16::from_be_bytes([b[24], b[25]]),
            sample_rate_lo: u16::from_be_bytes([b[26], b[27]]),
            head,
            codec_private_data,
        })
    }
    fn min_size() -> usize {
        28
    }
}

impl ToBytes for OwmaSampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        self.head.to_bytes(&mut writer)?;
        self.codec_private_data.to_bytes(&mut writer)?;
        writer.finalize()
    }
}

impl BoxInfo for OwmaSampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"owma")
    }
}

impl FullBox for OwmaSampleEntry {}

/// MPEG-4 ESDescriptor, tag soup and all.
///
/// The raw payload is kept and re-emitted verbatim; the fields this
/// crate needs (object type, bitrates, AudioSpecificConfig) are parsed
/// views into it.
#[derive(Clone)]
pub struct ESDescriptorBox {
    pub data:             Data,
    pub es_id:            u16,
    pub object_type:      u8,
    pub stream_type:      u8,
    pub buffer_size_db:   u32,
    pub max_bitrate:      u32,
    pub avg_bitrate:      u32,
    /// DecoderSpecificInfo: the AudioSpecificConfig for AAC.
    pub decoder_specific: Data,
}

const ESDESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

// Expandable length field: 1-4 bytes, 7 bits each, MSB is the
// continuation bit.
fn read_desc_len(data: &[u8], idx: &mut usize) -> io::Result<usize> {
    let mut len = 0usize;
    for count in 1..=4 {
        if *idx >= data.len() {
            return Err(ioerr!(UnexpectedEof, "esds: truncated descriptor length"));
        }
        let c = data[*idx];
        *idx += 1;
        len = (len << 7) | (c & 0x7f) as usize;
        if c & 0x80 == 0 {
            break;
        }
        if count == 4 {
            return Err(ioerr!(InvalidData, "esds: descriptor length field > 4 bytes"));
        }
    }
    Ok(len)
}

fn read_u8(data: &[u8], idx: &mut usize) -> io::Result<u8> {
    if *idx >= data.len() {
        return Err(ioerr!(UnexpectedEof, "esds: truncated descriptor"));
    }
    let v = data[*idx];
    *idx += 1;
    Ok(v)
}

fn read_u16(data: &[u8], idx: &mut usize) -> io::Result<u16> {
    if *idx + 2 > data.len() {
        return Err(ioerr!(UnexpectedEof, "esds: truncated descriptor"));
    }
    let v = u16::from_be_bytes([data[*idx], data[*idx + 1]]);
    *idx += 2;
    Ok(v)
}

fn read_u32(data: &[u8], idx: &mut usize) -> io::Result<u32> {
    if *idx + 4 > data.len() {
        return Err(ioerr!(UnexpectedEof, "esds: truncated descriptor"));
    }
    let v = u32::from_be_bytes([
        data[*idx],
        data[*idx + 1],
        data[*idx + 2],
        data[*idx + 3],
    ]);
    *idx += 4;
    Ok(v)
}

impl ESDescriptorBox {
    pub(crate) fn parse(data: &[u8]) -> io::Result<ESDescriptorBox> {
        let mut idx = 0;

        // ES_Descriptor. Some files skip the tag and start with the ES id.
        let tag = read_u8(data, &mut idx)?;
        let es_id;
        if tag == ESDESCRIPTOR_TAG {
            let _len = read_desc_len(data, &mut idx)?;
            es_id = read_u16(data, &mut idx)?;
            let _stream_priority = read_u8(data, &mut idx)?;
        } else {
            es_id = read_u16(data, &mut idx)?;
        }

        // DecoderConfigDescriptor.
        let tag = read_u8(data, &mut idx)?;
        let _len = read_desc_len(data, &mut idx)?;
        if tag != DECODER_CONFIG_DESCRIPTOR_TAG {
            return Err(ioerr!(InvalidData, "esds: expected DecoderConfig, got tag {}", tag));
        }
        let object_type = read_u8(data, &mut idx)?;
        let stream_type = read_u8(data, &mut idx)? >> 2;
        let b = read_u8(data, &mut idx)?;
        let buffer_size_db = ((b as u32) << 16)
            | ((read_u8(data, &mut idx)? as u32) << 8)
            | read_u8(data, &mut idx)? as u32;
        let max_bitrate = read_u32(data, &mut idx)?;
        let avg_bitrate = read_u32(data, &mut idx)?;

        // DecoderSpecificInfo.
        let tag = read_u8(data, &mut idx)?;
        let len = read_desc_len(data, &mut idx)?;
        if tag != DECODER_SPECIFIC_INFO_TAG {
            return Err(ioerr!(InvalidData, "esds: expected DecoderSpecificInfo, got tag {}", tag));
        }
        if idx + len > data.len() {
            return Err(ioerr!(UnexpectedEof, "esds: truncated DecoderSpecificInfo"));
        }
        let decoder_specific = Data(data[idx..idx + len].to_vec());

        Ok(ESDescriptorBox {
            data: Data(data.to_vec()),
            es_id,
            object_type,
            stream_type,
            buffer_size_db,
            max_bitrate,
            avg_bitrate,
            decoder_specific,
        })
    }

    /// Parse the AudioSpecificConfig bits of the DecoderSpecificInfo.
    pub fn audio_specific_config(&self) -> Option<AudioSpecificConfig> {
        let data = &self.decoder_specific.0;
        if data.len() < 2 {
            return None;
        }
        let mut b = BitReader::new(data);
        let mut profile = b.read_bits(5).ok()? as u8;
        if profile == 31 {
            profile = 32 + b.read_bits(6).ok()? as u8;
        }
        let frequency_index = b.read_bits(4).ok()? as u8;
        let frequency = if frequency_index == 0xf {
            b.read_bits(24).ok()?
        } else {
            AAC_SAMPLERATES[frequency_index as usize]
        };
        let channel_config = b.read_bits(4).ok()? as u8;
        Some(AudioSpecificConfig {
            profile,
            frequency_index,
            frequency,
            channel_config,
        })
    }
}

impl FromBytes for ESDescriptorBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<ESDescriptorBox> {
        let mut reader = BoxReader::new(stream)?;
        let left = reader.left();
        let data = reader.read(left)?;
        ESDescriptorBox::parse(data)
    }
    fn min_size() -> usize {
        12
    }
}

impl ToBytes for ESDescriptorBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        self.data.to_bytes(&mut writer)?;
        writer.finalize()
    }
}

impl BoxInfo for ESDescriptorBox {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"esds")
    }
    #[inline]
    fn max_version() -> Option<u8> {
        Some(0)
    }
}

impl FullBox for ESDescriptorBox {
    fn version(&self) -> Option<u8> {
        Some(0)
    }
}

impl std::fmt::Debug for ESDescriptorBox {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ESDescriptorBox")
            .field("object_type", &format_args!("{:#x}", self.object_type))
            .field("stream_type", &self.stream_type)
            .field("max_bitrate", &self.max_bitrate)
            .field("avg_bitrate", &self.avg_bitrate)
            .field("decoder_specific", &self.decoder_specific)
            .finish()
    }
}

/// For mp4a.40.&lt;profile&gt;.
///
/// Common profiles: 2 AAC-LC, 5 HE-AAC, 29 HE-AACv2.
#[derive(Clone, Debug, Default)]
pub struct AudioSpecificConfig {
    pub profile:         u8,
    pub frequency_index: u8,
    pub frequency:       u32,
    pub channel_config:  u8,
}
