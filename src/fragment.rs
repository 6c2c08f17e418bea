//! Build a `moof` + `mdat` for a sample range of one track.
//!
//! The payload is emitted as buckets: synthesized headers (SPS/PPS,
//! Annex-B start codes, ADTS) are owned blobs, the sample bytes are
//! ranges into the input file. The declared sample sizes in the `trun`
//! are adjusted for every inserted header so they always match the
//! bytes that actually end up in the `mdat`.
use crate::boxes::*;
use crate::bucket::BucketList;
use crate::error::{Error, Result};
use crate::io::MemBuffer;
use crate::mp4box::MP4;
use crate::sample_map::MovieMap;
use crate::serialize::ToBytes;
use crate::split::{plan, SampleRange, TimeRange};
use crate::types::{rescale, FourCC, SMOOTH_TIMESCALE};

/// What kind of byte stream to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// `moof` + `mdat`.
    Mp4,
    /// Raw elementary stream: Annex-B H.264, ADTS AAC.
    Raw,
}

/// Which track a fragment request addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub(crate) fn handler(&self) -> FourCC {
        match self {
            TrackKind::Video => FourCC::new(b"vide"),
            TrackKind::Audio => FourCC::new(b"soun"),
        }
    }
}

// 7-byte ADTS header for one raw AAC frame.
fn adts_header(sample_size: u32, samplerate_index: u8, channels: u16) -> [u8; 7] {
    let syncword = 0xfffu64;
    let protection_absent = 1u64;
    // Low Complexity profile.
    let profile = 1u64;
    let aac_frame_length = 7 + sample_size as u64;
    let adts_buffer_fullness = 0x7ffu64;

    let mut adts = 0u64;
    adts = (adts << 12) | syncword;
    adts <<= 1; // ID: MPEG-4
    adts <<= 2; // layer
    adts = (adts << 1) | protection_absent;
    adts = (adts << 2) | profile;
    adts = (adts << 4) | samplerate_index as u64;
    adts <<= 1; // private
    adts = (adts << 3) | channels as u64;
    adts <<= 4; // original/copy, home, copyright id bit + start
    adts = (adts << 13) | aac_frame_length;
    adts = (adts << 11) | adts_buffer_fullness;
    adts <<= 2; // raw data blocks - 1

    let bytes = adts.to_be_bytes();
    [bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

/// Build the output for samples `[range.start, range.end)` of one track.
///
/// For [`OutputFormat::Mp4`] this is `moof` + `mdat`; for
/// [`OutputFormat::Raw`] only the payload stream is produced.
pub fn build_fragment(
    mp4: &MP4,
    map: &MovieMap,
    track_idx: usize,
    range: SampleRange,
    format: OutputFormat,
) -> Result<BucketList> {
    let movie = mp4.movie();
    let trak = movie.tracks()[track_idx];
    let track = &map.tracks[track_idx];
    let stsd = trak.media().media_info().sample_table().sample_description();
    let data = mp4.data_source();

    let is_video = trak.is_video();
    let is_avc = stsd.avc_entry().is_some();
    let avc = stsd.avc_entry().and_then(|e| e.configuration());
    let has_ctts = trak
        .media()
        .media_info()
        .sample_table()
        .composition_time_to_sample()
        .is_some();
    let timescale = track.timescale;

    // The WAVEFORMATEX view is only needed to decide on ADTS headers.
    let adts = if !is_video && format == OutputFormat::Raw {
        let wf = stsd
            .audio_entry()
            .map(|e| e.wave_format())
            .transpose()?;
        match wf {
            Some(wf) if wf.format_tag == 0x00ff => {
                Some((samplerate_index(wf.samples_per_sec), wf.channels))
            },
            _ => None,
        }
    } else {
        None
    };

    if range.end > track.sample_count() || range.start > range.end {
        return Err(Error::EmptyRange);
    }

    if let (Some(first), Some(last)) = (
        track.samples.get(range.start as usize),
        range.end.checked_sub(1).map(|e| &track.samples[e as usize]),
    ) {
        data.readahead(first.pos, last.pos + last.size as u64 - first.pos);
    }

    let mut payload = BucketList::new();
    let mut entries: Vec<TrackRunEntry> = Vec::with_capacity((range.end - range.start) as usize);
    let mut first_sample = true;

    for s in range.start..range.end {
        let sample = &track.samples[s as usize];
        let next = &track.samples[s as usize + 1];

        let duration = rescale(next.pts, timescale, SMOOTH_TIMESCALE)
            - rescale(sample.pts, timescale, SMOOTH_TIMESCALE);
        let cto = rescale(sample.cto as u64, timescale, SMOOTH_TIMESCALE) as i32;
        let mut size = sample.size;

        if is_video {
            if is_avc {
                let avcc = avc.ok_or_else(|| {
                    log::error!("trak(id {}): avc1 without avcC", track.track_id);
                    Error::MissingSpsPps
                })?;
                if first_sample {
                    // Lead the fragment with the parameter sets.
                    let mut sets = Vec::new();
                    for set in avcc.sps.iter().chain(avcc.pps.iter()) {
                        sets.extend_from_slice(&[0, 0, 0, 1]);
                        sets.extend_from_slice(set);
                    }
                    if sets.is_empty() {
                        log::error!("trak(id {}): no SPS or PPS available", track.track_id);
                        return Err(Error::MissingSpsPps);
                    }
                    size += sets.len() as u32;
                    payload.push_memory(sets);
                }

                // Rewrite the length-prefixed NAL units to Annex-B.
                let nal_len = avcc.nal_unit_length as u64;
                let mut pos = sample.pos;
                let end = sample.pos + sample.size as u64;
                while pos != end {
                    if pos + nal_len > end {
                        return Err(Error::MalformedBox(format!(
                            "trak(id {}): truncated NAL length at {}",
                            track.track_id, pos
                        )));
                    }
                    let mut buf = [0u8; 8];
                    data.read_exact_at(&mut buf[..nal_len as usize], pos)?;
                    let mut nal_size = 0u64;
                    for &b in &buf[..nal_len as usize] {
                        nal_size = (nal_size << 8) | b as u64;
                    }
                    if nal_size == 0 || pos + nal_len + nal_size > end {
                        return Err(Error::MalformedBox(format!(
                            "trak(id {}): invalid NAL size {} at {}",
                            track.track_id, nal_size, pos
                        )));
                    }
                    payload.push_memory(vec![0, 0, 0, 1]);
                    payload.push_file_range(pos + nal_len, nal_size);
                    // A start code replaces the length prefix.
                    size = size + 4 - nal_len as u32;
                    pos += nal_len + nal_size;
                }
            } else {
                payload.push_file_range(sample.pos, sample.size as u64);
            }
        } else {
            if let Some((sfi, channels)) = adts {
                payload.push_memory(adts_header(sample.size, sfi, channels).to_vec());
                size += 7;
            }
            payload.push_file_range(sample.pos, sample.size as u64);
        }

        entries.push(TrackRunEntry {
            sample_duration: Some(duration as u32),
            sample_size: Some(size),
            sample_flags: None,
            sample_composition_time_offset: if has_ctts { Some(cto) } else { None },
        });

        first_sample = false;
    }

    if format == OutputFormat::Raw {
        return Ok(payload);
    }

    let moof = build_moof(track.track_id, entries);
    let mut buf = MemBuffer::new();
    moof.to_bytes(&mut buf).map_err(Error::from)?;

    let mut out = BucketList::new();
    out.push_memory(buf.into_vec());
    out.push_memory(mdat_header(payload.total_size()));
    out.append(payload);
    Ok(out)
}

// The moof layout Smooth Streaming clients expect: a fixed sequence
// number, default sample flags in the tfhd, per-sample duration/size
// (and composition offset when the track has a ctts) in the trun.
fn build_moof(track_id: u32, entries: Vec<TrackRunEntry>) -> MovieFragmentBox {
    let mfhd = MovieFragmentHeaderBox { sequence_number: 1 };

    let tfhd = TrackFragmentHeaderBox {
        track_id,
        default_sample_flags: Some(0x0000c0),
        ..TrackFragmentHeaderBox::default()
    };

    let trun = TrackRunBox {
        data_offset: None,
        first_sample_flags: Some(0x000040),
        entries,
    };

    let traf = TrackFragmentBox {
        boxes: vec![tfhd.to_mp4box(), trun.to_mp4box()],
    };

    MovieFragmentBox {
        boxes: vec![mfhd.to_mp4box(), traf.to_mp4box()],
    }
}

/// Build the Smooth Streaming fragment of a track at `fragment_start`
/// (in 10 MHz ticks): from the sync sample at that time up to the next
/// smooth sync sample.
pub fn smooth_fragment(
    mp4: &MP4,
    map: &MovieMap,
    kind: TrackKind,
    fragment_start: u64,
    format: OutputFormat,
) -> Result<BucketList> {
    // A file that already carries an mfra can answer from the index.
    if format == OutputFormat::Mp4 {
        if let Some(out) = fragment_from_index(mp4, kind, fragment_start)? {
            return Ok(out);
        }
    }

    let track_idx = map.track_idx_by_handler(kind.handler()).ok_or_else(|| {
        log::error!("requested {:?} track not found in moov", kind);
        Error::MissingMandatory("trak")
    })?;

    let range = TimeRange::new(fragment_start as f64 / SMOOTH_TIMESCALE as f64, 0.0);
    let ranges = plan(mp4, map, range)?;

    let start = ranges[track_idx].start;
    let end = map.tracks[track_idx].next_smooth_sync(start);

    build_fragment(mp4, map, track_idx, SampleRange { start, end }, format)
}

/// Answer a fragment request straight from the `mfra` index: look up
/// the exact start time and emit the stored `moof` + `mdat` as a
/// single file range.
///
/// Returns `None` when the file has no usable index entry, so the
/// caller can fall back to [`smooth_fragment`].
pub fn fragment_from_index(
    mp4: &MP4,
    kind: TrackKind,
    fragment_start: u64,
) -> Result<Option<BucketList>> {
    let mfra = match mp4.fragment_index() {
        Some(mfra) => mfra,
        None => return Ok(None),
    };
    let movie = mp4.movie();
    let track_idx = match movie.track_idx_by_handler(kind.handler()) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    let track_id = movie.tracks()[track_idx].track_id();

    let tfra = match mfra.tfra_for_track(track_id) {
        Some(tfra) => tfra,
        None => {
            log::error!(
                "requested {:?} track (id {}) not found in mfra",
                kind,
                track_id
            );
            return Ok(None);
        },
    };
    let entry = match tfra.entry_at_time(fragment_start) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let moof_size = read_box_size(mp4, entry.moof_offset, b"moof")?;
    let mdat_size = read_box_size(mp4, entry.moof_offset + moof_size, b"mdat")?;

    let mut out = BucketList::new();
    out.push_file_range(entry.moof_offset, moof_size + mdat_size);
    Ok(Some(out))
}

// Read one box header at an absolute offset and return the box size.
fn read_box_size(mp4: &MP4, offset: u64, expect: &[u8; 4]) -> Result<u64> {
    let mut hdr = [0u8; 16];
    mp4.data_source().read_exact_at(&mut hdr[..8], offset)?;
    if &hdr[4..8] != expect {
        return Err(Error::MalformedBox(format!(
            "expected {} at {}",
            FourCC::new(expect),
            offset
        )));
    }
    let mut size = u32::from_be_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]) as u64;
    if size == 1 {
        mp4.data_source().read_exact_at(&mut hdr[8..16], offset + 8)?;
        size = u64::from_be_bytes([
            hdr[8], hdr[9], hdr[10], hdr[11], hdr[12], hdr[13], hdr[14], hdr[15],
        ]);
    }
    if size < 8 {
        return Err(Error::MalformedBox(format!(
            "{} at {}: impossible size {}",
            FourCC::new(expect),
            offset,
            size
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::io::SliceReader;
    use crate::serialize::FromBytes;
    use crate::test_fixtures::*;

    fn avc_movie() -> (MP4, MovieMap) {
        // 3 samples; each one NAL of 12 bytes (4-byte length prefix + 8).
        let mut patches = Vec::new();
        for i in 0..3u64 {
            let mut v = vec![0, 0, 0, 8];
            v.extend_from_slice(&[i as u8; 8]);
            patches.push((4096 + i * 12, v));
        }
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(3, 100)],
                stss: Some(vec![1, 3]),
                sample_sizes: SampleSizes::Constant(12),
                chunks: vec![(4096, 3)],
                ..FixtureTrack::default()
            }],
            patches,
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();
        (mp4, map)
    }

    #[test]
    fn adts_header_for_a_183_byte_frame() {
        let hdr = adts_header(183, samplerate_index(44100), 2);
        assert_eq!(hdr, [0xff, 0xf1, 0x50, 0x80, 0x17, 0xdf, 0xfc]);
    }

    #[test]
    fn raw_audio_gets_an_adts_header_per_sample() {
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"soun",
                timescale: 44100,
                stts: vec![(2, 1024)],
                stss: None,
                sample_sizes: SampleSizes::PerSample(vec![183, 184]),
                chunks: vec![(4096, 2)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();

        let out = build_fragment(
            &mp4,
            &map,
            0,
            SampleRange { start: 0, end: 2 },
            OutputFormat::Raw,
        )
        .unwrap();

        let bytes = out.to_vec(mp4.data_source()).unwrap();
        assert_eq!(&bytes[0..2], &[0xff, 0xf1]);
        // aac_frame_length = 190 for the first frame.
        let frame_len = ((bytes[3] as u32 & 3) << 11) | ((bytes[4] as u32) << 3)
            | ((bytes[5] as u32) >> 5);
        assert_eq!(frame_len, 190);
        // total: two headers plus both frames.
        assert_eq!(bytes.len(), 7 + 183 + 7 + 184);
    }

    #[test]
    fn avc_fragment_rewrites_nals_and_leads_with_parameter_sets() {
        let (mp4, map) = avc_movie();
        let out = build_fragment(
            &mp4,
            &map,
            0,
            SampleRange { start: 0, end: 2 },
            OutputFormat::Mp4,
        )
        .unwrap();

        let buckets: Vec<_> = out.iter().cloned().collect();
        // moof, mdat header, sps/pps, then per-NAL start code + body.
        assert!(matches!(buckets[0], Bucket::Memory(_)));
        match &buckets[1] {
            Bucket::Memory(hdr) => assert_eq!(&hdr[4..8], b"mdat"),
            b => panic!("expected mdat header, got {:?}", b),
        }

        let bytes = out.to_vec(mp4.data_source()).unwrap();
        let moof_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

        // Parse the moof back and check the trun.
        let mut rd = SliceReader::new(&bytes[..moof_size]);
        let moof = MovieFragmentBox::from_bytes(&mut rd).unwrap();
        let traf = first_box!(&moof.boxes, TrackFragmentBox).unwrap();
        let trun = first_box!(&traf.boxes, TrackRunBox).unwrap();
        assert_eq!(trun.entries.len(), 2);

        // sps+pps with start codes: 4+4 + 4+3 = 15 bytes on sample 0.
        let sps_pps = 15;
        assert_eq!(trun.entries[0].sample_size, Some(12 + sps_pps));
        assert_eq!(trun.entries[1].sample_size, Some(12));
        // no ctts in this movie.
        assert_eq!(trun.entries[0].sample_composition_time_offset, None);
        // duration 100 ticks at 1000 Hz = 1_000_000 at 10 MHz.
        assert_eq!(trun.entries[0].sample_duration, Some(1_000_000));

        let tfhd = first_box!(&traf.boxes, TrackFragmentHeaderBox).unwrap();
        assert_eq!(tfhd.default_sample_flags, Some(0xc0));
        let mfhd = first_box!(&moof.boxes, MovieFragmentHeaderBox).unwrap();
        assert_eq!(mfhd.sequence_number, 1);

        // mdat contents: declared size matches the payload.
        let mdat_size = u32::from_be_bytes([
            bytes[moof_size],
            bytes[moof_size + 1],
            bytes[moof_size + 2],
            bytes[moof_size + 3],
        ]) as usize;
        assert_eq!(moof_size + mdat_size, bytes.len());
        // payload: sps/pps + 2 * (start code + 8 bytes nal).
        assert_eq!(mdat_size, 8 + 15 + 2 * 12);
        // first NAL body follows the parameter sets.
        let p = moof_size + 8 + 15;
        assert_eq!(&bytes[p..p + 4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[p + 4..p + 12], &[0u8; 8]);
    }

    #[test]
    fn smooth_fragment_runs_to_the_next_boundary() {
        let (mp4, map) = avc_movie();
        // fragment at t=0: samples [0, 2) (next smooth sync is sample 2).
        let out = smooth_fragment(&mp4, &map, TrackKind::Video, 0, OutputFormat::Mp4).unwrap();
        let bytes = out.to_vec(mp4.data_source()).unwrap();
        let moof_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let mut rd = SliceReader::new(&bytes[..moof_size]);
        let moof = MovieFragmentBox::from_bytes(&mut rd).unwrap();
        let traf = first_box!(&moof.boxes, TrackFragmentBox).unwrap();
        let trun = first_box!(&traf.boxes, TrackRunBox).unwrap();
        assert_eq!(trun.entries.len(), 2);
    }

    #[test]
    fn missing_sps_pps_is_an_error() {
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(2, 100)],
                stss: Some(vec![1]),
                sample_sizes: SampleSizes::Constant(12),
                chunks: vec![(4096, 2)],
                entry: FixtureEntry::Avc {
                    sps: vec![],
                    pps: vec![],
                },
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();

        match build_fragment(&mp4, &map, 0, SampleRange { start: 0, end: 2 }, OutputFormat::Mp4) {
            Err(Error::MissingSpsPps) => {},
            other => panic!("expected MissingSpsPps, got {:?}", other.map(|_| ())),
        }
    }
}
