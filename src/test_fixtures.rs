//! Synthetic movies for the unit tests.
//!
//! A `FixtureMovie` is serialized through the real box writers into a
//! 64 KiB in-memory file (moov up front, one `mdat` covering the rest)
//! and parsed back with `MP4::parse`, so every test also exercises the
//! reader/writer pair.
use crate::boxes::*;
use crate::io::MemBuffer;
use crate::mp4box::{BoxInfo, GenericBox, MP4};
use crate::serialize::{BoxBytes, ToBytes, WriteBytes};
use crate::types::*;

pub const FIXTURE_FILE_SIZE: u64 = 65536;

#[derive(Clone)]
pub enum SampleSizes {
    Constant(u32),
    PerSample(Vec<u32>),
}

impl Default for SampleSizes {
    fn default() -> Self {
        SampleSizes::Constant(100)
    }
}

#[derive(Clone)]
pub enum FixtureEntry {
    /// By handler: AVC for video, AAC-LC stereo 44100 for audio.
    Default,
    Avc {
        sps: Vec<u8>,
        pps: Vec<u8>,
    },
    Aac {
        channels:    u16,
        sample_rate: u16,
        object_type: u8,
        asc:         Vec<u8>,
    },
    Owma {
        codec_private_data: Vec<u8>,
    },
    Ovc1,
}

impl Default for FixtureEntry {
    fn default() -> Self {
        FixtureEntry::Default
    }
}

#[derive(Clone, Default)]
pub struct FixtureTrack {
    pub handler:      [u8; 4],
    pub timescale:    u32,
    /// (count, delta) runs.
    pub stts:         Vec<(u32, u32)>,
    pub stss:         Option<Vec<u32>>,
    pub ctts:         Option<Vec<(u32, i32)>>,
    pub sample_sizes: SampleSizes,
    /// (file position, samples in chunk).
    pub chunks:       Vec<(u64, u32)>,
    pub entry:        FixtureEntry,
}

#[derive(Default)]
pub struct FixtureMovie {
    /// mvhd timescale; 0 means 1000.
    pub timescale: u32,
    pub tracks:    Vec<FixtureTrack>,
    /// Bytes to place into the file at absolute positions.
    pub patches:   Vec<(u64, Vec<u8>)>,
    /// Extra top-level boxes inside the moov (unknown-children tests).
    pub extra_moov_boxes: Vec<MP4Box>,
}

pub fn default_avcc() -> AvcConfigurationBox {
    AvcConfigurationBox::new(
        0x64,
        0,
        0x1f,
        4,
        vec![vec![0x67, 0x64, 0x00, 0x1f]],
        vec![vec![0x68, 0xee, 0x3c]],
    )
}

pub fn esds_payload(object_type: u8, avg_bitrate: u32, max_bitrate: u32, asc: &[u8]) -> Vec<u8> {
    let mut payload: Vec<u8> = Vec::new();
    payload.push(0x03);
    payload.push((3 + 2 + 13 + 2 + 2 + asc.len()) as u8);
    payload.extend_from_slice(&[0, 1, 0]);
    payload.push(0x04);
    payload.push((13 + 2 + asc.len()) as u8);
    payload.push(object_type);
    payload.push(0x15);
    payload.extend_from_slice(&[0, 0, 0]);
    payload.extend_from_slice(&max_bitrate.to_be_bytes());
    payload.extend_from_slice(&avg_bitrate.to_be_bytes());
    payload.push(0x05);
    payload.push(asc.len() as u8);
    payload.extend_from_slice(asc);
    payload
}

pub fn aac_entry(channels: u16, sample_rate: u16, object_type: u8, asc: &[u8]) -> AudioSampleEntry {
    let esds =
        ESDescriptorBox::parse(&esds_payload(object_type, 96_000, 128_000, asc)).unwrap();
    AudioSampleEntry {
        data_reference_index: 1,
        qt_version: 0,
        revision: 0,
        vendor: 0,
        channel_count: channels,
        sample_size: 16,
        compression_id: 0,
        packet_size: 0,
        sample_rate_hi: sample_rate,
        sample_rate_lo: 0,
        compression_info: Data::default(),
        boxes: vec![esds.to_mp4box()],
    }
}

impl FixtureTrack {
    fn sample_entry(&self) -> MP4Box {
        match &self.entry {
            FixtureEntry::Default => {
                if &self.handler == b"vide" {
                    let mut avc = AvcSampleEntry::default();
                    avc.boxes.push(default_avcc().to_mp4box());
                    avc.to_mp4box()
                } else {
                    aac_entry(2, 44100, 0x40, &[0x12, 0x10]).to_mp4box()
                }
            },
            FixtureEntry::Avc { sps, pps } => {
                let filter = |set: &Vec<u8>| {
                    if set.is_empty() {
                        Vec::new()
                    } else {
                        vec![set.clone()]
                    }
                };
                let mut avc = AvcSampleEntry::default();
                avc.boxes.push(
                    AvcConfigurationBox::new(0x64, 0, 0x1f, 4, filter(sps), filter(pps))
                        .to_mp4box(),
                );
                avc.to_mp4box()
            },
            FixtureEntry::Aac {
                channels,
                sample_rate,
                object_type,
                asc,
            } => aac_entry(*channels, *sample_rate, *object_type, asc).to_mp4box(),
            FixtureEntry::Owma { codec_private_data } => {
                let mut head = vec![0u8; 28];
                head[6..8].copy_from_slice(&1u16.to_be_bytes()); // dref index
                head[16..18].copy_from_slice(&2u16.to_be_bytes()); // channels
                head[18..20].copy_from_slice(&16u16.to_be_bytes()); // bits
                head[24..26].copy_from_slice(&44100u16.to_be_bytes());
                OwmaSampleEntry {
                    data_reference_index: 1,
                    channel_count: 2,
                    sample_size: 16,
                    sample_rate_hi: 44100,
                    sample_rate_lo: 0,
                    head: Data(head),
                    codec_private_data: Data(codec_private_data.clone()),
                }
                .to_mp4box()
            },
            FixtureEntry::Ovc1 => Ovc1SampleEntry {
                data: Data(vec![0u8; 100]),
            }
            .to_mp4box(),
        }
    }

    fn sample_count(&self) -> u32 {
        self.stts.iter().map(|&(c, _)| c).sum()
    }

    fn build(&self, track_id: u32) -> TrackBox {
        let duration: u64 = self
            .stts
            .iter()
            .map(|&(c, d)| c as u64 * d as u64)
            .sum();

        let mut tkhd = TrackHeaderBox::default();
        tkhd.track_id = track_id;
        tkhd.duration = Duration_(duration);
        tkhd.flags.set_enabled(true);
        tkhd.flags.set_in_movie(true);
        if &self.handler == b"vide" {
            tkhd.width = FixedFloat16_16(1280 << 16);
            tkhd.height = FixedFloat16_16(720 << 16);
        }

        let mut mdhd = MediaHeaderBox::default();
        mdhd.timescale = self.timescale;
        mdhd.duration = Duration_(duration);

        let hdlr = HandlerBox {
            handler_type: FourCC::new(&self.handler),
            name:         ZString::from("fixture\0"),
        };

        // Sample table.
        let mut stbl_boxes = Vec::new();

        let mut stsd_entries = ArraySized32::new();
        stsd_entries.push(self.sample_entry());
        stbl_boxes.push(SampleDescriptionBox { entries: stsd_entries }.to_mp4box());

        let stts = TimeToSampleBox {
            entries: self
                .stts
                .iter()
                .map(|&(count, delta)| TimeToSampleEntry { count, delta })
                .collect(),
        };
        stbl_boxes.push(stts.to_mp4box());

        if let Some(stss) = &self.stss {
            stbl_boxes.push(
                SyncSampleBox {
                    entries: stss.iter().copied().collect(),
                }
                .to_mp4box(),
            );
        }

        if let Some(ctts) = &self.ctts {
            stbl_boxes.push(
                CompositionOffsetBox {
                    entries: ctts
                        .iter()
                        .map(|&(count, offset)| CompositionOffsetEntry { count, offset })
                        .collect(),
                }
                .to_mp4box(),
            );
        }

        // stsc: run-length encode the chunk sample counts.
        let mut stsc_entries: ArraySized32<SampleToChunkEntry> = ArraySized32::new();
        for (idx, &(_, samples)) in self.chunks.iter().enumerate() {
            if stsc_entries
                .iter()
                .last()
                .map(|e: &SampleToChunkEntry| e.samples_per_chunk != samples)
                .unwrap_or(true)
            {
                stsc_entries.push(SampleToChunkEntry {
                    first_chunk:              idx as u32,
                    samples_per_chunk:        samples,
                    sample_description_index: 1,
                });
            }
        }
        stbl_boxes.push(SampleToChunkBox { entries: stsc_entries }.to_mp4box());

        let stsz = match &self.sample_sizes {
            SampleSizes::Constant(size) => SampleSizeBox {
                sample_size:  *size,
                sample_sizes: Vec::new(),
            },
            SampleSizes::PerSample(sizes) => {
                assert_eq!(sizes.len() as u32, self.sample_count());
                SampleSizeBox {
                    sample_size:  0,
                    sample_sizes: sizes.clone(),
                }
            },
        };
        stbl_boxes.push(stsz.to_mp4box());

        let mut stco = ChunkOffsetBox::default();
        for &(pos, _) in &self.chunks {
            stco.push(pos);
        }
        stbl_boxes.push(stco.to_mp4box());

        let mut minf_boxes = Vec::new();
        if &self.handler == b"vide" {
            minf_boxes.push(
                VideoMediaHeaderBox {
                    flags:         Flags(1),
                    graphics_mode: 0,
                    opcolor_r:     0,
                    opcolor_g:     0,
                    opcolor_b:     0,
                }
                .to_mp4box(),
            );
        } else {
            minf_boxes.push(SoundMediaHeaderBox::default().to_mp4box());
        }
        minf_boxes.push(DataInformationBox::default().to_mp4box());
        minf_boxes.push(SampleTableBox { boxes: stbl_boxes }.to_mp4box());

        let mdia_boxes = vec![
            mdhd.to_mp4box(),
            hdlr.to_mp4box(),
            MediaInformationBox { boxes: minf_boxes }.to_mp4box(),
        ];

        TrackBox {
            boxes: vec![
                tkhd.to_mp4box(),
                MediaBox { boxes: mdia_boxes }.to_mp4box(),
            ],
        }
    }
}

impl FixtureMovie {
    /// Serialize to an in-memory file and parse it back.
    pub fn build(self) -> MP4 {
        MP4::parse(self.build_bytes()).unwrap()
    }

    pub fn build_bytes(self) -> Vec<u8> {
        let timescale = if self.timescale == 0 { 1000 } else { self.timescale };

        let duration = self
            .tracks
            .iter()
            .map(|t| {
                let d: u64 = t.stts.iter().map(|&(c, dl)| c as u64 * dl as u64).sum();
                rescale(d, t.timescale, timescale)
            })
            .max()
            .unwrap_or(0);

        let mut mvhd = MovieHeaderBox::default();
        mvhd.timescale = timescale;
        mvhd.duration = Duration_(duration);
        mvhd.pref_rate = FixedFloat16_16(1 << 16);
        mvhd.pref_vol = FixedFloat8_8(1 << 8);
        mvhd.next_track_id = self.tracks.len() as u32 + 1;

        let mut moov_boxes = vec![mvhd.to_mp4box()];
        moov_boxes.extend(self.extra_moov_boxes);
        for (idx, track) in self.tracks.iter().enumerate() {
            moov_boxes.push(track.build(idx as u32 + 1).to_mp4box());
        }
        let moov = MovieBox { boxes: moov_boxes };

        let ftyp = FileTypeBox {
            major_brand:       FourCC::new(b"isom"),
            minor_version:     512,
            compatible_brands: vec![FourCC::new(b"isom"), FourCC::new(b"avc1")],
        };

        let mut buf = MemBuffer::new();
        ftyp.to_bytes(&mut buf).unwrap();
        moov.to_bytes(&mut buf).unwrap();

        let pos = buf.pos();
        assert!(pos + 16 < FIXTURE_FILE_SIZE, "fixture moov too large");
        buf.write(&mdat_header(FIXTURE_FILE_SIZE - pos - 8)).unwrap();
        let remaining = FIXTURE_FILE_SIZE - buf.pos();
        buf.skip(remaining).unwrap();

        for (patch_pos, bytes) in &self.patches {
            buf.seek(*patch_pos).unwrap();
            buf.write(bytes).unwrap();
        }

        buf.into_vec()
    }
}

/// An opaque box with a given (unknown) fourcc, for unknown-children
/// tests.
pub fn unknown_box(fourcc: &[u8; 4], payload: &[u8]) -> MP4Box {
    use crate::serialize::FromBytes;

    let mut wire = Vec::new();
    wire.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    wire.extend_from_slice(fourcc);
    wire.extend_from_slice(payload);
    let mut rd = crate::io::SliceReader::new(&wire);
    let b = MP4Box::from_bytes(&mut rd).unwrap();
    match &b {
        MP4Box::GenericBox(GenericBox { .. }) => b,
        other => panic!("{:?} is not an unknown box", other.fourcc()),
    }
}
