//! Cut a time range out of a movie into a new progressive MP4.
//!
//! The moov is rewritten with trimmed sample tables; the payload goes
//! into a fresh `mdat` as ranges into the input file, per track, in
//! order. Chunk offsets are final only once the ftyp/moov sizes are
//! known, so the layout is computed first with a counting writer and
//! the offset tables are filled in before serialization; a table that
//! no longer fits 32 bits becomes a `co64`.
use crate::boxes::*;
use crate::bucket::BucketList;
use crate::error::{Error, Result};
use crate::io::{CountBytes, MemBuffer};
use crate::mp4box::MP4;
use crate::sample_map::{MovieMap, TrackMap};
use crate::serialize::ToBytes;
use crate::split::SampleRange;
use crate::types::{rescale, Duration_};

// The rewritten tables of one track plus its payload ranges.
struct ClippedTrack {
    boxes:        Vec<MP4Box>,
    // (file offset, size) per new chunk, in order.
    payload:      Vec<(u64, u64)>,
    payload_size: u64,
    duration:     u64,
}

/// Build the sub-clip for previously planned per-track sample ranges.
pub fn clip(mp4: &MP4, map: &MovieMap, ranges: &[SampleRange]) -> Result<BucketList> {
    let movie = mp4.movie();
    let tracks = movie.tracks();
    assert_eq!(tracks.len(), ranges.len());

    let movie_timescale = movie.movie_header().timescale;

    let mut clipped = Vec::new();
    for (idx, trak) in tracks.iter().enumerate() {
        clipped.push(clip_track(trak, &map.tracks[idx], ranges[idx])?);
    }

    // Rebuild the moov with the new tables and durations.
    let mut new_movie = movie.clone();
    let movie_duration = clipped
        .iter()
        .zip(map.tracks.iter())
        .map(|(c, t)| rescale(c.duration, t.timescale, movie_timescale))
        .max()
        .unwrap_or(0);

    for (idx, trak) in new_movie.tracks_mut().into_iter().enumerate() {
        let track_timescale = map.tracks[idx].timescale;
        trak.track_header_mut().duration = Duration_(rescale(
            clipped[idx].duration,
            track_timescale,
            movie_timescale,
        ));
        let mdia = trak.media_mut();
        mdia.media_header_mut().duration = Duration_(clipped[idx].duration);
        let stbl = mdia.media_info_mut().sample_table_mut();
        stbl.boxes = std::mem::take(&mut clipped[idx].boxes);
    }
    for mvhd in iter_box_mut!(&mut new_movie.boxes, MovieHeaderBox) {
        mvhd.duration = Duration_(movie_duration);
    }

    // The input's ftyp is carried over.
    let ftyp_bytes = match first_box!(&mp4.boxes, FileTypeBox) {
        Some(ftyp) => {
            let mut buf = MemBuffer::new();
            ftyp.to_bytes(&mut buf)?;
            buf.into_vec()
        },
        None => Vec::new(),
    };

    let payload_total: u64 = clipped.iter().map(|c| c.payload_size).sum();
    let mdat_hdr = mdat_header(payload_total);

    // Now the layout. Applying the chunk offsets can flip a table to
    // co64, which grows the moov, which moves the payload; iterate
    // until the sizes settle.
    loop {
        let mut cb = CountBytes::new();
        new_movie.to_bytes(&mut cb)?;
        let moov_size = cb.size();

        let payload_start = ftyp_bytes.len() as u64 + moov_size + mdat_hdr.len() as u64;

        let mut track_base = payload_start;
        let mut widened = false;
        for (idx, trak) in new_movie.tracks_mut().into_iter().enumerate() {
            let stbl = trak.media_mut().media_info_mut().sample_table_mut();
            // The clipped tables always carry a ChunkOffsetBox; it
            // serializes itself as co64 when it has to.
            let stco = first_box_mut!(&mut stbl.boxes, ChunkOffsetBox).unwrap();
            let was_large = stco.is_large();
            stco.add_offset(track_base as i64);
            if stco.is_large() && !was_large {
                log::debug!("clip: track {}: widening stco to co64", idx + 1);
                widened = true;
            }
            track_base += clipped[idx].payload_size;
        }

        if !widened {
            break;
        }
    }

    let mut buf = MemBuffer::new();
    new_movie.to_bytes(&mut buf)?;

    let mut out = BucketList::new();
    out.push_memory(ftyp_bytes);
    out.push_memory(buf.into_vec());
    out.push_memory(mdat_hdr);
    for track in &clipped {
        for &(offset, size) in &track.payload {
            out.push_file_range(offset, size);
        }
    }
    Ok(out)
}

fn clip_track(trak: &TrackBox, map: &TrackMap, range: SampleRange) -> Result<ClippedTrack> {
    let stbl = trak.media().media_info().sample_table();
    if range.end > map.sample_count() || range.start > range.end {
        return Err(Error::EmptyRange);
    }
    let (s0, s1) = (range.start as usize, range.end as usize);

    // stts: run-length encode the durations again.
    let mut stts = TimeToSampleBox::default();
    for s in s0..s1 {
        let delta = (map.samples[s + 1].pts - map.samples[s].pts) as u32;
        match stts.entries.last_mut() {
            Some(entry) if entry.delta == delta => entry.count += 1,
            _ => stts.entries.push(TimeToSampleEntry { count: 1, delta }),
        }
    }

    // ctts, only when the source had one.
    let ctts = stbl.composition_time_to_sample().map(|_| {
        let mut ctts = CompositionOffsetBox::default();
        for s in s0..s1 {
            let offset = map.samples[s].cto;
            match ctts.entries.last_mut() {
                Some(entry) if entry.offset == offset => entry.count += 1,
                _ => ctts.entries.push(CompositionOffsetEntry { count: 1, offset }),
            }
        }
        ctts
    });

    // stss, re-based to the clip.
    let stss = stbl.sync_samples().map(|_| SyncSampleBox {
        entries: (s0..s1)
            .filter(|&s| map.samples[s].is_sync)
            .map(|s| (s - s0 + 1) as u32)
            .collect(),
    });

    // stsz: keep a constant size constant.
    let stsz = match stbl.sample_size() {
        Some(src) if src.sample_size > 0 => SampleSizeBox {
            sample_size:  src.sample_size,
            sample_sizes: Vec::new(),
        },
        _ => SampleSizeBox {
            sample_size:  0,
            sample_sizes: map.samples[s0..s1].iter().map(|s| s.size).collect(),
        },
    };

    // Chunks: the in-range part of every source chunk becomes a chunk,
    // at a relative offset inside the new mdat for now.
    let mut stsc = SampleToChunkBox::default();
    let mut stco = ChunkOffsetBox::default();
    let mut payload = Vec::new();
    let mut payload_size = 0u64;

    for chunk in &map.chunks {
        let first = std::cmp::max(chunk.first_sample as usize, s0);
        let end = std::cmp::min((chunk.first_sample + chunk.sample_count) as usize, s1);
        if first >= end {
            continue;
        }
        let size: u64 = map.samples[first..end].iter().map(|s| s.size as u64).sum();

        stco.push(payload_size);
        let samples_per_chunk = (end - first) as u32;
        let new_chunk = (stco.entries.len() - 1) as u32;
        match stsc.entries.last_mut() {
            Some(e)
                if e.samples_per_chunk == samples_per_chunk
                    && e.sample_description_index == chunk.stsd_index => {},
            _ => stsc.entries.push(SampleToChunkEntry {
                first_chunk:              new_chunk,
                samples_per_chunk,
                sample_description_index: chunk.stsd_index,
            }),
        }

        payload.push((map.samples[first].pos, size));
        payload_size += size;
    }

    // stbl child order: opaque unknown children first, then the known
    // tables.
    let mut boxes: Vec<MP4Box> = stbl
        .boxes
        .iter()
        .filter(|b| matches!(b, MP4Box::GenericBox(_)))
        .cloned()
        .collect();
    boxes.push(stbl.sample_description().clone().to_mp4box());
    boxes.push(stts.to_mp4box());
    if let Some(stss) = stss {
        boxes.push(stss.to_mp4box());
    }
    boxes.push(stsc.to_mp4box());
    boxes.push(stsz.to_mp4box());
    boxes.push(stco.to_mp4box());
    if let Some(ctts) = ctts {
        boxes.push(ctts.to_mp4box());
    }

    let duration = map.samples[s1].pts - map.samples[s0].pts;

    Ok(ClippedTrack {
        boxes,
        payload,
        payload_size,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_map::MovieMap;
    use crate::split::{plan, TimeRange};
    use crate::test_fixtures::*;

    fn movie() -> MP4 {
        FixtureMovie {
            tracks: vec![
                FixtureTrack {
                    handler: *b"vide",
                    timescale: 1000,
                    stts: vec![(30, 1000)],
                    stss: Some(vec![1, 15, 29]),
                    sample_sizes: SampleSizes::Constant(100),
                    chunks: vec![(4096, 10), (8192, 10), (16384, 10)],
                    ..FixtureTrack::default()
                },
                FixtureTrack {
                    handler: *b"soun",
                    timescale: 500,
                    stts: vec![(60, 250)],
                    stss: None,
                    sample_sizes: SampleSizes::Constant(10),
                    chunks: vec![(32768, 60)],
                    ..FixtureTrack::default()
                },
            ],
            ..FixtureMovie::default()
        }
        .build()
    }

    #[test]
    fn full_range_clip_is_a_valid_movie() {
        let mp4 = movie();
        let map = MovieMap::build(&mp4).unwrap();
        let ranges = plan(&mp4, &map, TimeRange::new(0.0, 0.0)).unwrap();

        let out = clip(&mp4, &map, &ranges).unwrap();
        let bytes = out.to_vec(mp4.data_source()).unwrap();

        let clipped = MP4::parse(bytes.clone()).unwrap();
        let cmap = MovieMap::build(&clipped).unwrap();
        assert_eq!(cmap.tracks[0].sample_count(), 30);
        assert_eq!(cmap.tracks[1].sample_count(), 60);

        // All chunk offsets point into the new mdat, and the payload
        // is exactly the sum of the sample sizes.
        let mdat = iter_box!(&clipped.boxes, MediaDataBox).next().unwrap();
        for t in &cmap.tracks {
            for s in &t.samples[..t.sample_count() as usize] {
                assert!(mdat.contains(s.pos, s.size as u64));
            }
        }
        assert_eq!(mdat.size, 30 * 100 + 60 * 10);

        // Durations survive.
        assert_eq!(clipped.movie().movie_header().duration.0, 30_000);
    }

    #[test]
    fn partial_clip_rebases_the_tables() {
        let mp4 = movie();
        let map = MovieMap::build(&mp4).unwrap();
        let ranges = plan(&mp4, &map, TimeRange::new(15.5, 0.0)).unwrap();
        // video starts at keyframe sample 14, audio at 14s.
        assert_eq!(ranges[0].start, 14);

        let out = clip(&mp4, &map, &ranges).unwrap();
        let bytes = out.to_vec(mp4.data_source()).unwrap();

        let clipped = MP4::parse(bytes).unwrap();
        let cmap = MovieMap::build(&clipped).unwrap();

        assert_eq!(cmap.tracks[0].sample_count(), 16);
        // keyframes 15, 29 -> rebased to 1, 15.
        let stss: Vec<u32> = clipped.movie().tracks()[0]
            .media()
            .media_info()
            .sample_table()
            .sync_samples()
            .unwrap()
            .entries
            .iter()
            .copied()
            .collect();
        assert_eq!(stss, vec![1, 15]);

        // The video payload of the clip: samples 14..30 of the source,
        // sizes preserved.
        let total: u64 = cmap.tracks[0].samples[..16].iter().map(|s| s.size as u64).sum();
        assert_eq!(total, 16 * 100);

        // mdhd duration is the clipped length: 16 samples x 1000.
        assert_eq!(
            clipped.movie().tracks()[0].media().media_header().duration.0,
            16_000
        );
    }

    #[test]
    fn payload_bytes_are_copied_from_the_source_positions() {
        let mut patches = Vec::new();
        patches.push((4096, vec![0xde, 0xad, 0xbe, 0xef]));
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(10, 100)],
                stss: Some(vec![1]),
                sample_sizes: SampleSizes::Constant(100),
                chunks: vec![(4096, 10)],
                ..FixtureTrack::default()
            }],
            patches,
            ..FixtureMovie::default()
        }
        .build();
        let map = MovieMap::build(&mp4).unwrap();
        let ranges = plan(&mp4, &map, TimeRange::new(0.0, 0.0)).unwrap();

        let out = clip(&mp4, &map, &ranges).unwrap();
        let bytes = out.to_vec(mp4.data_source()).unwrap();

        let clipped = MP4::parse(bytes.clone()).unwrap();
        let cmap = MovieMap::build(&clipped).unwrap();
        let first = &cmap.tracks[0].samples[0];
        assert_eq!(
            &bytes[first.pos as usize..first.pos as usize + 4],
            &[0xde, 0xad, 0xbe, 0xef]
        );
    }
}
