//! The ordered list of output segments.
//!
//! Every derived output (sub-clip, fragment, fragmented file, manifest)
//! is produced as a bucket list: owned byte blobs for synthesized
//! boxes and headers, file ranges for payload bytes that are copied
//! straight from the input at write time.
use std::collections::VecDeque;
use std::io::{self, Write};

use crate::io::DataSource;

/// One output segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bucket {
    /// Owned bytes.
    Memory(Vec<u8>),
    /// A byte range of the input file.
    FileRange { offset: u64, size: u64 },
}

impl Bucket {
    pub fn len(&self) -> u64 {
        match self {
            Bucket::Memory(data) => data.len() as u64,
            Bucket::FileRange { size, .. } => *size,
        }
    }
}

/// Ordered segments; append-only apart from `push_front`.
#[derive(Debug, Default)]
pub struct BucketList {
    buckets: VecDeque<Bucket>,
}

impl BucketList {
    pub fn new() -> BucketList {
        BucketList::default()
    }

    /// Append an owned blob.
    pub fn push_memory(&mut self, data: Vec<u8>) {
        if !data.is_empty() {
            self.buckets.push_back(Bucket::Memory(data));
        }
    }

    /// Append a file range, merging with the previous bucket when the
    /// ranges are contiguous.
    pub fn push_file_range(&mut self, offset: u64, size: u64) {
        if size == 0 {
            return;
        }
        if let Some(Bucket::FileRange {
            offset: prev_offset,
            size: prev_size,
        }) = self.buckets.back_mut()
        {
            if *prev_offset + *prev_size == offset {
                *prev_size += size;
                return;
            }
        }
        self.buckets.push_back(Bucket::FileRange { offset, size });
    }

    /// Prepend an owned blob.
    pub fn push_front(&mut self, data: Vec<u8>) {
        self.buckets.push_front(Bucket::Memory(data));
    }

    /// Move all buckets of `other` to the end of this list.
    pub fn append(&mut self, mut other: BucketList) {
        while let Some(bucket) = other.buckets.pop_front() {
            match bucket {
                Bucket::Memory(data) => self.push_memory(data),
                Bucket::FileRange { offset, size } => self.push_file_range(offset, size),
            }
        }
    }

    /// Total number of output bytes.
    pub fn total_size(&self) -> u64 {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Drain the list in order into a writer, copying file ranges from
    /// the data source.
    pub fn write_to<W: Write>(&self, source: &DataSource, out: &mut W) -> io::Result<u64> {
        let mut written = 0u64;
        let mut buf = vec![0u8; 128 * 1024];
        for bucket in &self.buckets {
            match bucket {
                Bucket::Memory(data) => {
                    out.write_all(data)?;
                    written += data.len() as u64;
                },
                Bucket::FileRange { offset, size } => {
                    source.readahead(*offset, *size);
                    let mut pos = *offset;
                    let end = offset + size;
                    while pos < end {
                        let chunk = std::cmp::min(buf.len() as u64, end - pos) as usize;
                        source.read_exact_at(&mut buf[..chunk], pos)?;
                        out.write_all(&buf[..chunk])?;
                        pos += chunk as u64;
                        written += chunk as u64;
                    }
                },
            }
        }
        Ok(written)
    }

    /// Collect into one owned buffer (tests, small outputs).
    pub fn to_vec(&self, source: &DataSource) -> io::Result<Vec<u8>> {
        let mut v = Vec::with_capacity(self.total_size() as usize);
        self.write_to(source, &mut v)?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn contiguous_file_ranges_coalesce() {
        let mut list = BucketList::new();
        list.push_file_range(100, 10);
        list.push_file_range(110, 5);
        list.push_file_range(120, 5);
        let v: Vec<_> = list.iter().cloned().collect();
        assert_eq!(
            v,
            vec![
                Bucket::FileRange { offset: 100, size: 15 },
                Bucket::FileRange { offset: 120, size: 5 },
            ]
        );
        assert_eq!(list.total_size(), 20);
    }

    #[test]
    fn memory_buckets_break_coalescing() {
        let mut list = BucketList::new();
        list.push_file_range(100, 10);
        list.push_memory(vec![1, 2, 3]);
        list.push_file_range(110, 5);
        assert_eq!(list.iter().count(), 3);
    }

    #[test]
    fn writer_drains_in_order() {
        let data: Vec<u8> = (0..=255).collect();
        let source = DataSource::Memory(Arc::new(data));

        let mut list = BucketList::new();
        list.push_memory(vec![0xaa, 0xbb]);
        list.push_file_range(10, 4);
        list.push_front(vec![0x01]);

        let out = list.to_vec(&source).unwrap();
        assert_eq!(out, vec![0x01, 0xaa, 0xbb, 10, 11, 12, 13]);
    }
}
