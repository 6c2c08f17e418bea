//! Error type for the public operations.
//!
//! The parse and serialization layers below this run on `std::io::Result`;
//! errors coming out of them are classified here when they cross the
//! public API boundary.
use std::io;

use thiserror::Error;

/// Maximum number of tracks a movie may carry.
pub const MAX_TRACKS: usize = 8;

/// Everything that can go wrong while splitting or repackaging a movie.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying read or seek failed.
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    /// A box size was impossible, overran its container, had an unknown
    /// version, or declared more entries than its payload holds.
    #[error("malformed box: {0}")]
    MalformedBox(String),

    /// A mandatory child box is absent.
    #[error("missing mandatory box: {0}")]
    MissingMandatory(&'static str),

    /// A chunk offset does not fit in 32 bits where `stco` is required.
    #[error("chunk offset does not fit in 32 bits")]
    OffsetOverflow,

    /// An AVC fragment was requested but the track has no SPS/PPS.
    #[error("avc track has no sps/pps codec private data")]
    MissingSpsPps,

    /// The planner produced an empty or inverted interval.
    #[error("empty or inverted time range")]
    EmptyRange,

    /// Bitrate variants disagree on the number of chunks per stream.
    #[error("bitrate variants disagree on chunk count ({0} != {1})")]
    ManifestMismatch(u32, u32),

    /// More than [`MAX_TRACKS`] usable tracks.
    #[error("too many tracks (maximum is {MAX_TRACKS})")]
    TrackCapacity,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Error::MalformedBox(e.to_string())
            },
            _ => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
