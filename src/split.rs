//! Map a time interval onto per-track sample ranges.
//!
//! Start and end are aligned to sync samples in two passes: the first
//! pass rounds on the tracks that have a sync sample table (video) and
//! rewrites the interval to the rounded times, the second pass resolves
//! the remaining tracks (audio) against the rewritten interval. That
//! way audio is cut at the time of the video keyframe actually used,
//! not at the requested time.
use crate::error::{Error, Result};
use crate::mp4box::MP4;
use crate::sample_map::MovieMap;
use crate::types::rescale;

/// A time interval in seconds. An `end` of zero means "to the end".
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeRange {
    pub start: f64,
    pub end:   f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> TimeRange {
        TimeRange { start, end }
    }

    /// Apply a virtual clip window.
    ///
    /// `start` and `end` are relative to the window; they are shifted
    /// by `vbegin`, `end` defaults to `vend`, and the result must stay
    /// inside the window.
    pub fn with_virtual_clip(mut self, vbegin: Option<f64>, vend: Option<f64>) -> Result<TimeRange> {
        let begin = vbegin.unwrap_or(0.0);
        self.start += begin;
        if self.end != 0.0 {
            self.end += begin;
        } else if let Some(vend) = vend {
            self.end = vend;
        }

        if let Some(vbegin) = vbegin {
            if self.start < vbegin || (self.end != 0.0 && self.end < vbegin) {
                return Err(Error::EmptyRange);
            }
        }
        if let Some(vend) = vend {
            if self.start > vend || (self.end != 0.0 && self.end > vend) {
                return Err(Error::EmptyRange);
            }
        }
        Ok(self)
    }
}

/// A `[start, end)` range of zero-based sample indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleRange {
    pub start: u32,
    pub end:   u32,
}

/// Resolve a time interval to one sample range per track.
///
/// The returned ranges are in track order, matching `map.tracks`.
pub fn plan(mp4: &MP4, map: &MovieMap, range: TimeRange) -> Result<Vec<SampleRange>> {
    let movie = mp4.movie();
    let movie_timescale = movie.movie_header().timescale;
    let tracks = movie.tracks();

    let mut start = (range.start * movie_timescale as f64 + 0.5) as u64;
    let mut end = (range.end * movie_timescale as f64 + 0.5) as u64;

    let mut ranges = vec![SampleRange::default(); tracks.len()];

    // Pass 0: tracks with an stss. Pass 1: the others, working on the
    // start/end values the first pass rounded.
    for pass in 0..2 {
        for (idx, trak) in tracks.iter().enumerate() {
            let stbl = trak.media().media_info().sample_table();
            let has_stss = stbl.sync_samples().is_some();
            if (pass == 0) != has_stss {
                continue;
            }

            let track_timescale = trak.media().media_header().timescale;
            let stts = stbl.time_to_sample();
            let sample_count = map.tracks[idx].sample_count();

            if start == 0 {
                ranges[idx].start = 0;
            } else {
                let mut s = stts.sample_at_time(rescale(start, movie_timescale, track_timescale));
                s = stbl.nearest_keyframe(s + 1) - 1;
                log::debug!("plan: track {}: start sample {}", trak.track_id(), s);
                ranges[idx].start = s;
                start = rescale(stts.time_of_sample(s), track_timescale, movie_timescale);
            }

            if end == 0 {
                ranges[idx].end = sample_count;
            } else {
                let mut e = stts.sample_at_time(rescale(end, movie_timescale, track_timescale));
                if e >= sample_count {
                    e = sample_count;
                } else {
                    e = stbl.nearest_keyframe(e + 1) - 1;
                }
                log::debug!("plan: track {}: end sample {}", trak.track_id(), e);
                ranges[idx].end = e;
                end = rescale(stts.time_of_sample(e), track_timescale, movie_timescale);
            }
        }
    }

    if end != 0 && start >= end {
        return Err(Error::EmptyRange);
    }

    Ok(ranges)
}
