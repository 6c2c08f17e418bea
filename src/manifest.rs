//! Smooth Streaming client manifest.
//!
//! One `<StreamIndex>` per stream type with a `<QualityLevel>` per
//! bitrate variant and a `<c>` element per chunk. Chunk boundaries are
//! the smooth sync samples; all times are 10 MHz ticks.
use std::fmt::{self, Display, Write};

use crate::boxes::*;
use crate::error::{Error, Result};
use crate::fragment::TrackKind;
use crate::mp4box::MP4;
use crate::sample_map::{MovieMap, TrackMap};
use crate::types::{rescale, SMOOTH_TIMESCALE};

/// One movie (bitrate variant) feeding the manifest.
pub struct ManifestSource<'a> {
    pub mp4:     &'a MP4,
    pub map:     &'a MovieMap,
    /// Overrides every QualityLevel bitrate of this variant, typically
    /// taken from the `_<bitrate>.ismv` file name.
    pub bitrate: Option<u32>,
}

/// The bitrate suffix convention: `video_1394000.ismv` -> 1394000.
pub fn bitrate_from_filename(name: &str) -> Option<u32> {
    let tail = &name[name.rfind('_')? + 1..];
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for b in data {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

struct QualityLevel {
    bitrate:            u32,
    fourcc:             String,
    width:              u32,
    height:             u32,
    codec_private_data: String,
}

impl Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<QualityLevel Bitrate=\"{}\" FourCC=\"{}\"", self.bitrate, self.fourcc)?;
        if self.width > 0 && self.height > 0 {
            write!(
                f,
                " Width=\"{}\" Height=\"{}\" CodecPrivateData=\"{}\"",
                self.width, self.height, self.codec_private_data
            )?;
        } else {
            write!(f, " WaveFormatEx=\"{}\"", self.codec_private_data)?;
        }
        writeln!(f, " />")
    }
}

struct Stream {
    kind:           TrackKind,
    subtype:        String,
    url_prefix:     String,
    quality_levels: Vec<QualityLevel>,
    /// Chunk durations in 10 MHz ticks; the chunk count of the stream.
    durations:      Vec<u64>,
}

impl Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_ = match self.kind {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        };
        writeln!(
            f,
            "<StreamIndex Type=\"{}\" Subtype=\"{}\" Chunks=\"{}\" Url=\"{}Fragments({}={{start time}})\">",
            type_,
            self.subtype,
            self.durations.len(),
            self.url_prefix,
            type_
        )?;
        for ql in &self.quality_levels {
            ql.fmt(f)?;
        }
        for (n, d) in self.durations.iter().enumerate() {
            writeln!(f, "<c n=\"{}\" d=\"{}\" />", n, d)?;
        }
        writeln!(f, "</StreamIndex>")
    }
}

struct SmoothStreamingMedia {
    duration: u64,
    streams:  Vec<Stream>,
}

impl Display for SmoothStreamingMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<?xml version=\"1.0\" encoding=\"utf-8\"?>")?;
        writeln!(
            f,
            "<!--Created with {}({})-->",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(
            f,
            "<SmoothStreamingMedia MajorVersion=\"1\" MinorVersion=\"0\" Duration=\"{}\">",
            self.duration
        )?;
        for stream in &self.streams {
            stream.fmt(f)?;
        }
        writeln!(f, "</SmoothStreamingMedia>")
    }
}

impl SmoothStreamingMedia {
    fn stream_idx(&self, kind: TrackKind) -> Option<usize> {
        self.streams.iter().position(|s| s.kind == kind)
    }
}

/// Build the manifest XML, merging all bitrate variants.
pub fn build_manifest(sources: &[ManifestSource]) -> Result<String> {
    let is_mbr = sources.len() > 1;
    let mut manifest: Option<SmoothStreamingMedia> = None;

    for source in sources {
        let mut media = create_manifest(source.mp4, source.map, is_mbr)?;

        if let Some(bitrate) = source.bitrate {
            for stream in &mut media.streams {
                for ql in &mut stream.quality_levels {
                    ql.bitrate = bitrate;
                }
            }
        }

        match manifest {
            None => manifest = Some(media),
            Some(ref mut m) => merge(m, media, source.mp4.input_filename())?,
        }
    }

    let manifest = manifest.ok_or(Error::MissingMandatory("moov"))?;
    Ok(manifest.to_string())
}

// Union the streams of a new variant into the manifest: same type
// means extra quality levels, a type we don't have yet is appended.
fn merge(
    manifest: &mut SmoothStreamingMedia,
    media: SmoothStreamingMedia,
    filename: Option<&str>,
) -> Result<()> {
    for stream in media.streams {
        match manifest.stream_idx(stream.kind) {
            None => manifest.streams.push(stream),
            Some(idx) => {
                let existing = &mut manifest.streams[idx];
                if existing.durations.len() != stream.durations.len() {
                    log::error!(
                        "incompatible number of chunks ({}) in {}",
                        stream.durations.len(),
                        filename.unwrap_or("variant")
                    );
                    return Err(Error::ManifestMismatch(
                        existing.durations.len() as u32,
                        stream.durations.len() as u32,
                    ));
                }
                existing.quality_levels.extend(stream.quality_levels);
            },
        }
    }
    Ok(())
}

fn create_manifest(mp4: &MP4, map: &MovieMap, is_mbr: bool) -> Result<SmoothStreamingMedia> {
    let movie = mp4.movie();
    let mvhd = movie.movie_header();

    let mut media = SmoothStreamingMedia {
        duration: rescale(mvhd.duration.0, mvhd.timescale, SMOOTH_TIMESCALE),
        streams:  Vec::new(),
    };

    for (idx, trak) in movie.tracks().iter().enumerate() {
        let track = &map.tracks[idx];
        let kind = if trak.is_video() {
            TrackKind::Video
        } else {
            TrackKind::Audio
        };
        let stsd = trak.media().media_info().sample_table().sample_description();

        let url_prefix = if is_mbr {
            "QualityLevels({bitrate})/".to_string()
        } else {
            String::new()
        };

        let (subtype, quality_level) = match kind {
            TrackKind::Video => video_quality_level(trak, stsd)?,
            TrackKind::Audio => audio_quality_level(track, stsd)?,
        };

        media.streams.push(Stream {
            kind,
            subtype,
            url_prefix,
            quality_levels: vec![quality_level],
            durations: chunk_durations(track),
        });
    }

    Ok(media)
}

// Duration of every chunk: time between successive smooth sync
// samples, the terminal element closing the last chunk.
fn chunk_durations(track: &TrackMap) -> Vec<u64> {
    let mut durations = Vec::new();
    let mut begin = None;
    for sample in &track.samples {
        if !sample.is_smooth_sync {
            continue;
        }
        let pts = rescale(sample.pts, track.timescale, SMOOTH_TIMESCALE);
        if let Some(begin) = begin {
            durations.push(pts - begin);
        }
        begin = Some(pts);
    }
    durations
}

fn video_quality_level(
    trak: &TrackBox,
    stsd: &SampleDescriptionBox,
) -> Result<(String, QualityLevel)> {
    let tkhd = trak.track_header();
    let is_avc = stsd.avc_entry().is_some();
    let subtype = if is_avc { "H264" } else { "WVC1" };

    let codec_private_data = match stsd.avc_entry().and_then(|e| e.configuration()) {
        Some(avcc) => hex(&avcc.codec_private_data()),
        None => {
            log::warn!("trak(id {}): no codec private data found", tkhd.track_id);
            String::new()
        },
    };

    Ok((
        subtype.to_string(),
        QualityLevel {
            bitrate: 4500 * 1000,
            fourcc: subtype.to_string(),
            width: (f64::from(tkhd.width)) as u32,
            height: (f64::from(tkhd.height)) as u32,
            codec_private_data,
        },
    ))
}

fn audio_quality_level(
    track: &TrackMap,
    stsd: &SampleDescriptionBox,
) -> Result<(String, QualityLevel)> {
    // owma carries a ready-made WAVEFORMATEX as its codec private data.
    if let Some(owma) = stsd.owma_entry() {
        if owma.codec_private_data.is_empty() {
            log::warn!("trak(id {}): no codec private data found", track.track_id);
        }
        return Ok((
            "WmaPro".to_string(),
            QualityLevel {
                bitrate: 0,
                fourcc: "owma".to_string(),
                width: 0,
                height: 0,
                codec_private_data: hex(&owma.codec_private_data.0),
            },
        ));
    }

    let entry = stsd
        .audio_entry()
        .ok_or(Error::MissingMandatory("mp4a"))?;
    let mut wf = entry.wave_format()?;

    // When the AudioSpecificConfig disagrees with the sample entry on
    // the channel count, the AudioSpecificConfig wins.
    if let Some(esds) = entry.esds() {
        if let Some(asc) = esds.audio_specific_config() {
            if asc.channel_config as u16 != wf.channels {
                log::warn!(
                    "trak(id {}): setting channels in WAVEFORMATEX to {}",
                    track.track_id,
                    asc.channel_config
                );
                wf.channels = asc.channel_config as u16;
            }
        }
    }

    if wf.codec_private_data.is_empty() {
        log::warn!("trak(id {}): no codec private data found", track.track_id);
    }

    let bitrate = if wf.avg_bitrate > 0 {
        wf.avg_bitrate
    } else {
        wf.max_bitrate
    };

    let mut cpd = hex(&wf.to_waveformatex());
    cpd.push_str(&hex(&wf.codec_private_data));

    let fourcc = stsd
        .first_fourcc()
        .map(|f| f.to_string())
        .unwrap_or_default();

    Ok((
        fourcc.clone(),
        QualityLevel {
            bitrate,
            fourcc,
            width: 0,
            height: 0,
            codec_private_data: cpd,
        },
    ))
}
