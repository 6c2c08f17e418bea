//! All the boxes we know.
//!
//! Every box this crate consumes or produces has a typed definition in
//! one of the submodules; anything else is carried through opaquely as
//! a [`GenericBox`](crate::mp4box::GenericBox).
use std::fmt::Debug;
use std::io;

pub(crate) mod misc;
pub(crate) mod prelude;

pub use self::misc::*;
use self::prelude::*;

use crate::mp4box::{BoxHeader, GenericBox};

def_boxes! {
    FileTypeBox, b"ftyp";
    MovieHeaderBox, b"mvhd";
    MediaHeaderBox, b"mdhd";
    SoundMediaHeaderBox, b"smhd";
    VideoMediaHeaderBox, b"vmhd";
    MovieFragmentHeaderBox, b"mfhd";

    // Below are boxes that are defined in boxes/ *.rs
    MovieBox, b"moov" => moov;
    TrackBox, b"trak" => trak;
    MediaBox, b"mdia";
    MediaInformationBox, b"minf";
    HandlerBox, b"hdlr" => hdlr;
    TrackHeaderBox, b"tkhd" => tkhd;

    DataInformationBox, b"dinf" => dinf;
    DataReferenceBox, b"dref";
    DataEntryUrlBox, b"url ";
    DataEntryUrnBox, b"urn ";

    SampleTableBox, b"stbl" => stbl;
    SampleDescriptionBox, b"stsd" => stsd;
    TimeToSampleBox, b"stts" => stts;
    SyncSampleBox, b"stss" => stss;
    SampleToChunkBox, b"stsc" => stsc;
    SampleSizeBox, b"stsz" => stsz;
    CompactSampleSizeBox, b"stz2";
    ChunkOffsetBox, b"stco" => stco;
    ChunkLargeOffsetBox, b"co64";
    CompositionOffsetBox, b"ctts" => ctts;

    AvcSampleEntry, b"avc1" => avc1;
    AvcConfigurationBox, b"avcC" => avcc;
    Ovc1SampleEntry, b"ovc1";
    AudioSampleEntry, b"mp4a" => mp4a;
    OwmaSampleEntry, b"owma";
    ESDescriptorBox, b"esds";
    WaveBox, b"wave";

    MediaDataBox, b"mdat" => mdat;

    MovieFragmentBox, b"moof" => moof;
    TrackFragmentBox, b"traf";
    TrackFragmentHeaderBox, b"tfhd";
    TrackRunBox, b"trun";

    MovieFragmentRandomAccessBox, b"mfra" => mfra;
    TrackFragmentRandomAccessBox, b"tfra";
    MovieFragmentRandomAccessOffsetBox, b"mfro";
}
