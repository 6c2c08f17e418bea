use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{AudioSampleEntry, AvcSampleEntry, Ovc1SampleEntry, OwmaSampleEntry};

def_box! {
    /// 8.5.2 Sample Description Box (ISO/IEC 14496-12:2015(E))
    SampleDescriptionBox {
        entries:    ArraySized32<MP4Box>,
    },
    fourcc => b"stsd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

impl SampleDescriptionBox {
    /// FourCC of the first sample description.
    pub fn first_fourcc(&self) -> Option<FourCC> {
        self.entries.iter().next().map(|e| e.fourcc())
    }

    /// The first entry, when it is an AVC video entry.
    pub fn avc_entry(&self) -> Option<&AvcSampleEntry> {
        match self.entries.iter().next() {
            Some(MP4Box::AvcSampleEntry(e)) => Some(e),
            _ => None,
        }
    }

    /// The first entry, when it is a VC-1 video entry.
    pub fn ovc1_entry(&self) -> Option<&Ovc1SampleEntry> {
        match self.entries.iter().next() {
            Some(MP4Box::Ovc1SampleEntry(e)) => Some(e),
            _ => None,
        }
    }

    /// The first entry, when it is an MPEG-4 audio entry.
    pub fn audio_entry(&self) -> Option<&AudioSampleEntry> {
        match self.entries.iter().next() {
            Some(MP4Box::AudioSampleEntry(e)) => Some(e),
            _ => None,
        }
    }

    /// The first entry, when it is a WMA audio entry.
    pub fn owma_entry(&self) -> Option<&OwmaSampleEntry> {
        match self.entries.iter().next() {
            Some(MP4Box::OwmaSampleEntry(e)) => Some(e),
            _ => None,
        }
    }
}
