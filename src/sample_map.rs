//! Per-track sample and chunk maps.
//!
//! The compressed `stbl` tables are expanded once into flat arrays:
//! one record per sample with decode time, composition offset, file
//! position, size and sync markers, and one record per chunk. All
//! split, fragment and manifest operations work from these.
use crate::boxes::TrackBox;
use crate::error::{Error, Result};
use crate::mp4box::MP4;
use crate::types::{rescale, FourCC};

/// One media sample.
///
/// The sample array of a track has one extra trailing element carrying
/// the terminal `pts`, so the duration of the last real sample is
/// always `samples[i + 1].pts - samples[i].pts`.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    /// Decode time, in the track's timescale.
    pub pts:            u64,
    /// Composition time offset.
    pub cto:            i32,
    /// Absolute file position.
    pub pos:            u64,
    pub size:           u32,
    /// Sync sample (keyframe).
    pub is_sync:        bool,
    /// Sync sample selected as a Smooth Streaming fragment boundary.
    pub is_smooth_sync: bool,
}

/// One chunk of samples.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub pos:          u64,
    pub first_sample: u32,
    pub sample_count: u32,
    pub stsd_index:   u32,
}

/// The expanded sample map of one track.
#[derive(Debug)]
pub struct TrackMap {
    pub track_id:  u32,
    pub timescale: u32,
    pub handler:   FourCC,
    /// `sample_count() + 1` entries, see [`Sample`].
    pub samples:   Vec<Sample>,
    pub chunks:    Vec<Chunk>,
}

impl TrackMap {
    /// Number of real samples.
    pub fn sample_count(&self) -> u32 {
        (self.samples.len() - 1) as u32
    }

    /// The next smooth sync sample strictly after `sample`, or the
    /// terminal index when there is none.
    pub fn next_smooth_sync(&self, sample: u32) -> u32 {
        let count = self.sample_count();
        let mut s = sample;
        if s >= count {
            return count;
        }
        s += 1;
        while s < count && !self.samples[s as usize].is_smooth_sync {
            s += 1;
        }
        s
    }

    /// Number of smooth sync samples (fragment boundaries).
    pub fn smooth_sync_count(&self) -> u32 {
        self.samples[..self.samples.len() - 1]
            .iter()
            .filter(|s| s.is_smooth_sync)
            .count() as u32
    }

    fn build(trak: &TrackBox, file_size: u64) -> Result<TrackMap> {
        let mdia = trak.media();
        let stbl = mdia.media_info().sample_table();
        let track_id = trak.track_id();
        let timescale = mdia.media_header().timescale;
        let handler = mdia.handler().handler_type;

        // A movie without chunk/size tables (a fragmented one) has an
        // empty sample index: just the terminal element.
        let tables = (stbl.chunk_offset(), stbl.sample_to_chunk(), stbl.sample_size());
        let (stco, stsc, stsz) = match tables {
            (Some(stco), Some(stsc), Some(stsz)) => (stco, stsc, stsz),
            _ => {
                return Ok(TrackMap {
                    track_id,
                    timescale,
                    handler,
                    samples: vec![Sample {
                        is_sync: true,
                        is_smooth_sync: true,
                        ..Sample::default()
                    }],
                    chunks: Vec::new(),
                });
            },
        };

        // Expand the chunk table: positions from stco, then walk stsc
        // backwards so every run is filled up to the next entry.
        let mut chunks: Vec<Chunk> = stco
            .entries
            .iter()
            .map(|&pos| Chunk {
                pos,
                ..Chunk::default()
            })
            .collect();
        let mut last = chunks.len();
        for entry in stsc.entries.iter().rev() {
            for chunk in chunks
                .iter_mut()
                .take(last)
                .skip(entry.first_chunk as usize)
            {
                chunk.sample_count = entry.samples_per_chunk;
                chunk.stsd_index = entry.sample_description_index;
            }
            last = std::cmp::min(last, entry.first_chunk as usize);
        }

        let mut chunk_samples = 0u64;
        for chunk in chunks.iter_mut() {
            chunk.first_sample = chunk_samples as u32;
            chunk_samples += chunk.sample_count as u64;
        }

        // Total sample count comes from stsz, or from the chunk table
        // when the sample size is constant.
        let count = if stsz.sample_size == 0 {
            stsz.entries() as usize
        } else {
            chunk_samples as usize
        };

        let mut samples = vec![Sample::default(); count + 1];

        for (i, sample) in samples[..count].iter_mut().enumerate() {
            sample.size = stsz.size_of_sample(i as u32);
        }

        // Decode times from the stts runs, plus the terminal pts.
        let stts = stbl.time_to_sample();
        let stts_samples = stts.sample_count();
        if stts_samples as usize != count {
            log::warn!(
                "trak(id {}): stts covers {} samples, sample table has {}",
                track_id,
                stts_samples,
                count
            );
        }
        let mut s = 0;
        let mut pts = 0u64;
        for entry in &stts.entries {
            for _ in 0..entry.count {
                if s > count {
                    break;
                }
                samples[s].pts = pts;
                s += 1;
                pts += entry.delta as u64;
            }
        }
        if s <= count {
            samples[s].pts = pts;
        }

        // Composition offsets. A ctts that covers more samples than we
        // have is tolerated.
        if let Some(ctts) = stbl.composition_time_to_sample() {
            let mut s = 0;
            let mut offset = 0;
            'ctts: for entry in &ctts.entries {
                offset = entry.offset;
                for _ in 0..entry.count {
                    if s == count {
                        log::warn!(
                            "trak(id {}): ctts covers {} samples, sample table has {}",
                            track_id,
                            ctts.sample_count(),
                            count
                        );
                        break 'ctts;
                    }
                    samples[s].cto = offset;
                    s += 1;
                }
            }
            samples[count].cto = offset;
        }

        // File positions; samples are contiguous within a chunk.
        let mut s = 0;
        for chunk in &chunks {
            let mut pos = chunk.pos;
            for _ in 0..chunk.sample_count {
                if s >= count {
                    break;
                }
                samples[s].pos = pos;
                pos += samples[s].size as u64;
                s += 1;
            }
        }

        if file_size > 0 {
            for (i, sample) in samples[..count].iter().enumerate() {
                if sample.pos + sample.size as u64 > file_size {
                    log::error!(
                        "trak(id {}): sample {} at {}+{} lies outside the file",
                        track_id,
                        i,
                        sample.pos,
                        sample.size
                    );
                    return Err(Error::MalformedBox(format!(
                        "trak(id {}): sample data outside the mdat",
                        track_id
                    )));
                }
            }
        }

        // Sync markers. No stss means every sample is a sync sample.
        match stbl.sync_samples() {
            Some(stss) => {
                if !stss.is_valid(count as u32) {
                    return Err(Error::MalformedBox(format!(
                        "trak(id {}): stss entries out of range or not increasing",
                        track_id
                    )));
                }
                for &n in &stss.entries {
                    samples[n as usize - 1].is_sync = true;
                    samples[n as usize - 1].is_smooth_sync = true;
                }
            },
            None => {
                for sample in samples[..count].iter_mut() {
                    sample.is_sync = true;
                }
            },
        }
        samples[count].is_sync = true;
        samples[count].is_smooth_sync = true;

        Ok(TrackMap {
            track_id,
            timescale,
            handler,
            samples,
            chunks,
        })
    }

}

/// The expanded sample maps of all tracks of a movie, in track order.
#[derive(Debug)]
pub struct MovieMap {
    pub tracks: Vec<TrackMap>,
}

impl MovieMap {
    /// Expand the sample tables of every track.
    ///
    /// Audio tracks without their own sync sample table get smooth
    /// sync markers projected from the video track, or on a 2-second
    /// grid when the movie has no video.
    pub fn build(mp4: &MP4) -> Result<MovieMap> {
        mp4.check()?;

        let movie = mp4.movie();
        let mut tracks = Vec::new();
        let mut audio_idx = None;
        let mut video_idx = None;

        for (idx, trak) in movie.tracks().iter().enumerate() {
            if trak.is_audio() {
                audio_idx = Some(idx);
            } else if trak.is_video() {
                video_idx = Some(idx);
            }
            let has_stss = trak
                .media()
                .media_info()
                .sample_table()
                .sync_samples()
                .is_some();
            let map = TrackMap::build(trak, mp4.input_size())?;
            tracks.push((map, has_stss));
        }

        if let Some(audio) = audio_idx {
            if !tracks[audio].1 {
                match video_idx {
                    Some(video) => {
                        let (video_map, audio_map) = if video < audio {
                            let (a, b) = tracks.split_at_mut(audio);
                            (&a[video].0, &mut b[0].0)
                        } else {
                            let (a, b) = tracks.split_at_mut(video);
                            (&b[0].0, &mut a[audio].0)
                        };
                        copy_sync_samples_to_audio_track(video_map, audio_map);
                    },
                    None => mark_audio_syncs_on_grid(&mut tracks[audio].0),
                }
            }
        }

        Ok(MovieMap {
            tracks: tracks.into_iter().map(|(map, _)| map).collect(),
        })
    }

    /// Index of the first track of the given handler type.
    pub fn track_idx_by_handler(&self, handler: FourCC) -> Option<usize> {
        self.tracks.iter().position(|t| t.handler == handler)
    }
}

// For every smooth sync sample of the video track, mark the first
// audio sample at or after the same presentation time.
fn copy_sync_samples_to_audio_track(video: &TrackMap, audio: &mut TrackMap) {
    let audio_count = audio.sample_count() as usize;
    for v in &video.samples[..video.samples.len() - 1] {
        if !v.is_smooth_sync {
            continue;
        }
        let pts = rescale(v.pts, video.timescale, audio.timescale);
        if let Some(a) = audio.samples[..audio_count]
            .iter_mut()
            .find(|a| a.pts >= pts)
        {
            a.is_smooth_sync = true;
        }
    }
}

// No video track to take the boundaries from: every 2 seconds.
fn mark_audio_syncs_on_grid(audio: &mut TrackMap) {
    let increment = 2 * audio.timescale as u64;
    let mut pts = 0;
    let count = audio.sample_count() as usize;
    for sample in audio.samples[..count].iter_mut() {
        if sample.pts >= pts {
            sample.is_smooth_sync = true;
            pts += increment;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;

    #[test]
    fn constant_size_positions() {
        // stsz.sample_size = 188, stco = [1000], stsc = [(0, 10, 1)].
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(10, 100)],
                stss: None,
                sample_sizes: SampleSizes::Constant(188),
                chunks: vec![(1000, 10)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();

        let map = MovieMap::build(&mp4).unwrap();
        let t = &map.tracks[0];
        assert_eq!(t.sample_count(), 10);
        assert_eq!(t.samples[0].pos, 1000);
        assert_eq!(t.samples[5].pos, 1940);
        assert_eq!(t.samples[9].pos, 2692);
        // no stss: every sample is sync.
        assert!(t.samples.iter().all(|s| s.is_sync));
    }

    #[test]
    fn terminal_pts_and_ctos() {
        // stts = [(5, 100)], ctts = [(5, 50)].
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(5, 100)],
                ctts: Some(vec![(5, 50)]),
                sample_sizes: SampleSizes::PerSample(vec![10, 10, 10, 10, 10]),
                chunks: vec![(1000, 5)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();

        let map = MovieMap::build(&mp4).unwrap();
        let t = &map.tracks[0];
        assert_eq!(t.samples[5].pts, 500);
        assert!(t.samples[..5].iter().all(|s| s.cto == 50));
        assert_eq!(t.samples[5].cto, 50);
        assert!(t.samples[5].is_sync && t.samples[5].is_smooth_sync);
    }

    #[test]
    fn stss_marks_sync_samples() {
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(30, 1000)],
                stss: Some(vec![1, 15, 29]),
                sample_sizes: SampleSizes::Constant(100),
                chunks: vec![(1000, 30)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();

        let map = MovieMap::build(&mp4).unwrap();
        let t = &map.tracks[0];
        assert!(t.samples[0].is_sync);
        assert!(t.samples[14].is_sync);
        assert!(t.samples[28].is_sync);
        assert!(!t.samples[1].is_sync);
        assert_eq!(t.smooth_sync_count(), 3);
        assert_eq!(t.next_smooth_sync(0), 14);
        assert_eq!(t.next_smooth_sync(14), 28);
        assert_eq!(t.next_smooth_sync(28), 30);
    }

    #[test]
    fn audio_sync_propagation_from_video() {
        let mp4 = FixtureMovie {
            tracks: vec![
                FixtureTrack {
                    handler: *b"vide",
                    timescale: 1000,
                    stts: vec![(30, 1000)],
                    stss: Some(vec![1, 15, 29]),
                    sample_sizes: SampleSizes::Constant(100),
                    chunks: vec![(1000, 30)],
                    ..FixtureTrack::default()
                },
                FixtureTrack {
                    handler: *b"soun",
                    timescale: 500,
                    stts: vec![(60, 250)],
                    stss: None,
                    sample_sizes: SampleSizes::Constant(10),
                    chunks: vec![(8000, 60)],
                    ..FixtureTrack::default()
                },
            ],
            ..FixtureMovie::default()
        }
        .build();

        let map = MovieMap::build(&mp4).unwrap();
        let a = &map.tracks[1];
        // video syncs at pts 0, 14000, 28000 (ts 1000) = 0, 7000, 14000 (ts 500).
        let marked: Vec<_> = a.samples[..60]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_smooth_sync)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(marked, vec![0, 28, 56]);
    }

    #[test]
    fn audio_only_grid_every_two_seconds() {
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"soun",
                timescale: 1000,
                stts: vec![(50, 100)],
                stss: None,
                sample_sizes: SampleSizes::Constant(10),
                chunks: vec![(1000, 50)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();

        let map = MovieMap::build(&mp4).unwrap();
        let marked: Vec<_> = map.tracks[0].samples[..50]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_smooth_sync)
            .map(|(i, _)| i)
            .collect();
        // every 2000 ticks: samples 0, 20, 40.
        assert_eq!(marked, vec![0, 20, 40]);
    }

    #[test]
    fn bad_stss_is_rejected() {
        let mp4 = FixtureMovie {
            tracks: vec![FixtureTrack {
                handler: *b"vide",
                timescale: 1000,
                stts: vec![(10, 100)],
                stss: Some(vec![1, 99]),
                sample_sizes: SampleSizes::Constant(10),
                chunks: vec![(1000, 10)],
                ..FixtureTrack::default()
            }],
            ..FixtureMovie::default()
        }
        .build();

        match MovieMap::build(&mp4) {
            Err(Error::MalformedBox(_)) => {},
            other => panic!("expected MalformedBox, got {:?}", other.map(|_| ())),
        }
    }
}
