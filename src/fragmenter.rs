//! Turn a progressive MP4 into a fully fragmented file.
//!
//! Layout: `ftyp` + a fragmented `moov` on a 10 MHz timescale + one
//! `moof`+`mdat` per smooth-sync run per track + `mfra`/`mfro`.
use crate::boxes::*;
use crate::bucket::BucketList;
use crate::error::Result;
use crate::fragment::{build_fragment, OutputFormat};
use crate::io::MemBuffer;
use crate::mp4box::MP4;
use crate::sample_map::MovieMap;
use crate::serialize::ToBytes;
use crate::split::SampleRange;
use crate::types::{rescale, Duration_, SMOOTH_TIMESCALE};

/// Produce the fragmented version of the whole file.
pub fn fragment_file(mp4: &MP4, map: &MovieMap) -> Result<BucketList> {
    let movie = mp4.movie();
    let mut out = BucketList::new();
    let mut filepos = 0u64;

    let ftyp = FileTypeBox::fragmented();
    let mut buf = MemBuffer::new();
    ftyp.to_bytes(&mut buf)?;
    let bytes = buf.into_vec();
    filepos += bytes.len() as u64;
    out.push_memory(bytes);

    let fmoov = fragmented_moov(movie);
    let mut buf = MemBuffer::new();
    fmoov.to_bytes(&mut buf)?;
    let bytes = buf.into_vec();
    filepos += bytes.len() as u64;
    out.push_memory(bytes);

    // One moof+mdat per run between smooth sync samples, per track,
    // with a tfra entry pointing at each moof.
    let mut mfra = MovieFragmentRandomAccessBox::default();
    for (idx, track) in map.tracks.iter().enumerate() {
        let mut tfra = TrackFragmentRandomAccessBox::default();
        tfra.track_id = track.track_id;

        let count = track.sample_count();
        let mut start = 0u32;
        while start != count {
            let end = track.next_smooth_sync(start);
            let frag = build_fragment(mp4, map, idx, SampleRange { start, end }, OutputFormat::Mp4)?;

            tfra.entries.push(TfraEntry {
                time: rescale(
                    track.samples[start as usize].pts,
                    track.timescale,
                    SMOOTH_TIMESCALE,
                ),
                moof_offset: filepos,
                ..TfraEntry::default()
            });

            filepos += frag.total_size();
            out.append(frag);
            start = end;
        }

        log::debug!(
            "fragment_file: track {}: {} fragments",
            track.track_id,
            tfra.entries.len()
        );
        mfra.boxes.push(tfra.to_mp4box());
    }

    let mut buf = MemBuffer::new();
    mfra.to_bytes(&mut buf)?;
    out.push_memory(buf.into_vec());

    Ok(out)
}

// The moov of a fragmented file: mvhd and per-track headers are
// copied, the sample tables shrink to just the sample description
// plus empty stts/ctts - all actual sample information lives in the
// fragments.
fn fragmented_moov(movie: &MovieBox) -> MovieBox {
    let mut moov_boxes: Vec<MP4Box> = Vec::new();
    moov_boxes.push(movie.movie_header().clone().to_mp4box());

    for trak in movie.tracks() {
        let mdia = trak.media();
        let minf = mdia.media_info();

        let mut mdhd = mdia.media_header().clone();
        let timescale = mdhd.timescale;
        mdhd.duration = Duration_(rescale(mdhd.duration.0, timescale, SMOOTH_TIMESCALE));
        mdhd.timescale = SMOOTH_TIMESCALE;

        let mut stbl_boxes: Vec<MP4Box> = Vec::new();
        stbl_boxes.push(minf.sample_table().sample_description().clone().to_mp4box());
        stbl_boxes.push(TimeToSampleBox::default().to_mp4box());
        stbl_boxes.push(CompositionOffsetBox::default().to_mp4box());

        let mut minf_boxes: Vec<MP4Box> = Vec::new();
        if let Some(vmhd) = minf.video_header() {
            minf_boxes.push(vmhd.clone().to_mp4box());
        }
        if let Some(smhd) = minf.sound_header() {
            minf_boxes.push(smhd.clone().to_mp4box());
        }
        if let Some(dinf) = first_box!(&minf.boxes, DataInformationBox) {
            minf_boxes.push(dinf.clone().to_mp4box());
        }
        minf_boxes.push(SampleTableBox { boxes: stbl_boxes }.to_mp4box());

        let mdia_boxes = vec![
            mdhd.to_mp4box(),
            mdia.handler().clone().to_mp4box(),
            MediaInformationBox { boxes: minf_boxes }.to_mp4box(),
        ];

        let trak_boxes = vec![
            trak.track_header().clone().to_mp4box(),
            MediaBox { boxes: mdia_boxes }.to_mp4box(),
        ];
        moov_boxes.push(TrackBox { boxes: trak_boxes }.to_mp4box());
    }

    MovieBox { boxes: moov_boxes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{fragment_from_index, TrackKind};
    use crate::test_fixtures::*;

    fn fragmented_fixture() -> (MP4, Vec<u8>) {
        let mut patches = Vec::new();
        for i in 0..4u64 {
            let mut v = vec![0, 0, 0, 8];
            v.extend_from_slice(&[i as u8; 8]);
            patches.push((4096 + i * 12, v));
        }
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(4, 100)],
                stss: Some(vec![1, 3]),
                sample_sizes: SampleSizes::Constant(12),
                chunks: vec![(4096, 4)],
                ..FixtureTrack::default()
            }],
            patches,
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();
        let out = fragment_file(&mp4, &map).unwrap();
        let bytes = out.to_vec(mp4.data_source()).unwrap();
        (mp4, bytes)
    }

    #[test]
    fn produces_ftyp_moov_fragments_and_index() {
        let (_, bytes) = fragmented_fixture();

        // Fixed ftyp: avc1 major brand, isom/iso2 compatible.
        assert_eq!(&bytes[4..8], b"ftyp");
        assert_eq!(&bytes[8..12], b"avc1");
        assert_eq!(&bytes[16..20], b"isom");
        assert_eq!(&bytes[20..24], b"iso2");

        // The whole thing parses back as an MP4.
        let frag = MP4::parse(bytes.clone()).unwrap();
        let movie = frag.movie();
        let trak = movie.tracks()[0];
        let mdhd = trak.media().media_header();
        assert_eq!(mdhd.timescale, 10_000_000);
        // 4 samples x 100 ticks at 1000 Hz = 4_000_000 ticks at 10 MHz.
        assert_eq!(mdhd.duration.0, 4_000_000);

        // The stripped stbl: stsd + empty stts + empty ctts.
        let stbl = trak.media().media_info().sample_table();
        assert_eq!(stbl.time_to_sample().entries.len(), 0);
        assert_eq!(
            stbl.composition_time_to_sample().map(|c| c.entries.len()),
            Some(0)
        );

        // Two fragments, indexed.
        let mfra = frag.fragment_index().unwrap();
        let tfra = mfra.tfra_for_track(1).unwrap();
        assert_eq!(tfra.entries.len(), 2);
        assert_eq!(tfra.entries[0].time, 0);
        // second fragment starts at sample 2 = 200 ticks = 2_000_000.
        assert_eq!(tfra.entries[1].time, 2_000_000);

        // tfra offsets point at real moof headers.
        for entry in &tfra.entries {
            let off = entry.moof_offset as usize;
            assert_eq!(&bytes[off + 4..off + 8], b"moof");
        }

        // mfro trailer carries the mfra size.
        let mfro_size = u32::from_be_bytes([
            bytes[bytes.len() - 4],
            bytes[bytes.len() - 3],
            bytes[bytes.len() - 2],
            bytes[bytes.len() - 1],
        ]) as usize;
        assert_eq!(&bytes[bytes.len() - 12..bytes.len() - 8], b"mfro");
        let mfra_start = bytes.len() - mfro_size;
        assert_eq!(&bytes[mfra_start + 4..mfra_start + 8], b"mfra");
    }

    #[test]
    fn fragment_request_is_served_from_the_index() {
        let (_, bytes) = fragmented_fixture();
        let frag = MP4::parse(bytes.clone()).unwrap();

        let out = fragment_from_index(&frag, TrackKind::Video, 2_000_000)
            .unwrap()
            .expect("index entry for t=2_000_000");
        // One contiguous range covering moof + mdat.
        let slice = out.to_vec(frag.data_source()).unwrap();
        assert_eq!(&slice[4..8], b"moof");
        let moof_size = u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]) as usize;
        assert_eq!(&slice[moof_size + 4..moof_size + 8], b"mdat");
        assert_eq!(slice.len(), {
            let mdat_size = u32::from_be_bytes([
                slice[moof_size],
                slice[moof_size + 1],
                slice[moof_size + 2],
                slice[moof_size + 3],
            ]) as usize;
            moof_size + mdat_size
        });

        // No entry at an unknown time: fall back to the live builder.
        assert!(fragment_from_index(&frag, TrackKind::Video, 123)
            .unwrap()
            .is_none());
    }
}
