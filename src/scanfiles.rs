//! Enumerate the bitrate variants that belong to an input file.
//!
//! For `video.mp4` or `video.ism`, the variants live in the sibling
//! directory `video.ism/` as `*_<bitrate>.ismv`.
use std::io;
use std::path::{Path, PathBuf};

/// List the `.ismv` bitrate variants for an input file, sorted by name.
///
/// Returns an empty list when the input has no variant directory.
pub fn scan_bitrate_variants(input_file: &str) -> io::Result<Vec<PathBuf>> {
    let path = Path::new(input_file);
    let stem = match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") | Some("ism") => path.with_extension("ism"),
        _ => return Ok(Vec::new()),
    };

    let mut v = Vec::new();
    let dir = match std::fs::read_dir(&stem) {
        Ok(dir) => dir,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    log::debug!("scanning dir: {}", stem.display());

    for entry in dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().map(|n| n.ends_with(".ismv")).unwrap_or(false) {
            v.push(entry.path());
        }
    }
    v.sort();
    Ok(v)
}
