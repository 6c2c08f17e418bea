//! Split, fragment and repackage ISO BMFF (`.mp4` / `.ismv`) files.
//!
//! The payload is never transcoded: every operation reads the `moov`
//! (and `mfra`) into a typed box tree, expands the sample tables into
//! flat per-sample maps, and emits its output as a list of buckets -
//! owned bytes for synthesized boxes, byte ranges into the input file
//! for sample data.
//!
//! The derived outputs:
//!
//! - a time-range sub-clip, realigned to the nearest video keyframe
//!   ([`subclip::clip`]);
//! - a single Smooth Streaming fragment for one track
//!   ([`fragment::smooth_fragment`]);
//! - the fully fragmented version of the file
//!   ([`fragmenter::fragment_file`]);
//! - a Smooth Streaming client manifest, optionally merged over
//!   multiple bitrate variants ([`manifest::build_manifest`]);
//! - raw elementary streams and FLV tag streams as sub-clip format
//!   variants ([`fragment::OutputFormat::Raw`], [`flv::write_flv`]).
//!
//! ```no_run
//! use mp4split::sample_map::MovieMap;
//! use mp4split::split::{plan, TimeRange};
//!
//! fn main() -> mp4split::Result<()> {
//!     let mp4 = mp4split::open("video.mp4")?;
//!     let map = MovieMap::build(&mp4)?;
//!     let ranges = plan(&mp4, &map, TimeRange::new(10.0, 30.0))?;
//!     let clip = mp4split::subclip::clip(&mp4, &map, &ranges)?;
//!     let mut out = std::fs::File::create("clip.mp4")?;
//!     clip.write_to(mp4.data_source(), &mut out)?;
//!     Ok(())
//! }
//! ```
#[macro_use]
mod ioerr;
#[macro_use]
pub mod serialize;
#[macro_use]
mod macros;
#[macro_use]
pub mod types;
mod bitreader;
pub mod boxes;
pub mod bucket;
pub mod error;
pub mod flv;
pub mod fragment;
pub mod fragmenter;
pub mod io;
pub mod manifest;
pub mod mp4box;
pub mod sample_map;
pub mod scanfiles;
pub mod split;
pub mod subclip;
pub mod track;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use crate::error::{Error, Result};
pub use crate::io::Mp4File;
pub use crate::mp4box::MP4;

/// Open and parse an MP4 file, validating the model invariants.
pub fn open(path: impl AsRef<str>) -> Result<MP4> {
    let file = Mp4File::open(path)?;
    let mp4 = MP4::read(file)?;
    mp4.check()?;
    Ok(mp4)
}
