use std::io;

use crate::boxes::avcc::AvcConfigurationBox;
use crate::boxes::prelude::*;

def_box! {
    /// AVC sample entry (VideoSampleEntry).
    ///
    /// The first 78 bytes are the QuickTime visual sample description;
    /// the child boxes (avcC, pasp, ...) follow.
    AvcSampleEntry {
        skip:                   6,
        data_reference_index:   u16,
        skip:                   16,
        width:                  u16,
        height:                 u16,
        // defaults to 72, 72
        _video_horizontal_dpi:  FixedFloat16_16,
        _video_vertical_dpi:    FixedFloat16_16,
        skip:                   4,
        // defaults to 1
        _video_frame_count:     u16,
        // video encoder name is a fixed-size pascal string.
        skip:                   32,
        // defaults to 0x0018
        video_pixel_depth:      u16,
        // always -1
        _pre_defined:           u16,
        boxes:                  Vec<MP4Box>,
    },
    fourcc => b"avc1",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl AvcSampleEntry {
    /// The AVC decoder configuration, if present.
    pub fn configuration(&self) -> Option<&AvcConfigurationBox> {
        first_box!(&self.boxes, AvcConfigurationBox)
    }
}

impl Default for AvcSampleEntry {
    fn default() -> Self {
        AvcSampleEntry {
            data_reference_index: 1,
            width: 1280,
            height: 720,
            _video_horizontal_dpi: FixedFloat16_16(72 << 16),
            _video_vertical_dpi: FixedFloat16_16(72 << 16),
            _video_frame_count: 1,
            video_pixel_depth: 24,
            _pre_defined: 0xffff,
            boxes: Vec::new(),
        }
    }
}

/// VC-1 sample entry.
///
/// `ovc1` is immediately followed by additional data and ends with the
/// codec private data, *not* with child boxes. The payload is carried
/// through opaquely.
#[derive(Clone)]
pub struct Ovc1SampleEntry {
    pub data: Data,
}

impl FromBytes for Ovc1SampleEntry {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<Ovc1SampleEntry> {
        let mut reader = BoxReader::new(stream)?;
        if reader.left() < 78 {
            return Err(ioerr!(InvalidData, "ovc1: invalid sample description size"));
        }
        let data = Data::from_bytes(&mut reader)?;
        Ok(Ovc1SampleEntry { data })
    }
    fn min_size() -> usize {
        86
    }
}

impl ToBytes for Ovc1SampleEntry {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        self.data.to_bytes(&mut writer)?;
        writer.finalize()
    }
}

impl BoxInfo for Ovc1SampleEntry {
    #[inline]
    fn fourcc(&self) -> FourCC {
        FourCC::new(b"ovc1")
    }
}

impl FullBox for Ovc1SampleEntry {}

impl std::fmt::Debug for Ovc1SampleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Ovc1SampleEntry")
            .field("data", &self.data)
            .finish()
    }
}
