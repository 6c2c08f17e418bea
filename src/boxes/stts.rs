use std::io;

use crate::boxes::prelude::*;

def_box! {
    /// 8.6.1.2 Decoding Time to Sample Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    TimeToSampleBox {
        entries:        ArraySized32<TimeToSampleEntry>,
    },
    fourcc => b"stts",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_struct! {
    /// Entry in TimeToSampleBox.
    #[derive(Default)]
    TimeToSampleEntry,
        count:  u32,
        delta:  u32,
}

impl TimeToSampleBox {
    /// Total number of samples covered by the table.
    pub fn sample_count(&self) -> u32 {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Total duration of the track in its own timescale.
    pub fn total_duration(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.count as u64 * e.delta as u64)
            .sum()
    }

    /// Zero-based index of the sample that starts at or right after
    /// `time` (track timescale).
    pub fn sample_at_time(&self, time: u64) -> u32 {
        let mut sample = 0u32;
        let mut time_count = 0u64;
        for entry in &self.entries {
            let run = entry.count as u64 * entry.delta as u64;
            if entry.delta > 0 && time_count + run >= time {
                let count = (time - time_count + entry.delta as u64 - 1) / entry.delta as u64;
                return sample + count as u32;
            }
            time_count += run;
            sample += entry.count;
        }
        sample
    }

    /// Decode time of a zero-based sample index (track timescale).
    pub fn time_of_sample(&self, sample: u32) -> u64 {
        let mut time = 0u64;
        let mut count = 0u32;
        for entry in &self.entries {
            if count + entry.count > sample {
                return time + (sample - count) as u64 * entry.delta as u64;
            }
            count += entry.count;
            time += entry.count as u64 * entry.delta as u64;
        }
        time
    }

    /// Return an iterator that yields `(delta, decode_time)` per sample.
    pub fn iter(&self) -> TimeToSampleIterator<'_> {
        let mut iter = TimeToSampleIterator {
            entries:    &self.entries,
            entry:      TimeToSampleEntry::default(),
            index:      0,
            cumulative: 0,
        };
        if !iter.entries.is_empty() {
            iter.entry = iter.entries[0].clone();
        }
        iter
    }
}

#[derive(Clone)]
pub struct TimeToSampleIterator<'a> {
    entries:    &'a [TimeToSampleEntry],
    entry:      TimeToSampleEntry,
    index:      usize,
    cumulative: u64,
}

impl<'a> Iterator for TimeToSampleIterator<'a> {
    type Item = (u32, u64);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.entry.count > 0 {
                self.entry.count -= 1;
                let cumulative = self.cumulative;
                self.cumulative += self.entry.delta as u64;
                return Some((self.entry.delta, cumulative));
            }
            self.index += 1;
            if self.index >= self.entries.len() {
                return None;
            }
            self.entry = self.entries[self.index].clone();
        }
    }
}
