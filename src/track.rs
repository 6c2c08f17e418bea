//! General information about the tracks in a movie.
use serde::Serialize;

use crate::boxes::*;
use crate::mp4box::MP4;

/// General track information, serializable to JSON.
#[derive(Debug, Default, Serialize)]
pub struct TrackInfo {
    pub id:         u32,
    pub track_type: String,
    /// Duration in seconds.
    pub duration:   f64,
    pub language:   String,
    pub codec_id:   String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width:      Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height:     Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels:   Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
}

/// Collect the details of every track.
pub fn track_info(mp4: &MP4) -> Vec<TrackInfo> {
    let movie = mp4.movie();
    let mut v = Vec::new();

    for trak in movie.tracks() {
        let mdia = trak.media();
        let mdhd = mdia.media_header();
        let tkhd = trak.track_header();
        let stsd = mdia.media_info().sample_table().sample_description();

        let mut info = TrackInfo {
            id: tkhd.track_id,
            track_type: mdia.handler().handler_type.to_string(),
            duration: mdhd.duration.0 as f64 / mdhd.timescale as f64,
            language: mdhd.language.to_string(),
            ..TrackInfo::default()
        };

        if let Some(avc) = stsd.avc_entry() {
            info.codec_id = avc
                .configuration()
                .map(|c| c.codec_id())
                .unwrap_or_else(|| "avc1".to_string());
            info.width = Some(avc.width as u32);
            info.height = Some(avc.height as u32);
        } else if let Some(audio) = stsd.audio_entry() {
            info.channels = Some(audio.channel_count);
            info.sample_rate = Some(audio.sample_rate_hi as u32);
            match audio.esds() {
                Some(esds) => {
                    info.codec_id = match esds.audio_specific_config() {
                        Some(asc) => {
                            format!("mp4a.{:02x}.{}", esds.object_type, asc.profile)
                        },
                        None => format!("mp4a.{:02x}", esds.object_type),
                    };
                    info.avg_bitrate = Some(esds.avg_bitrate);
                    info.max_bitrate = Some(esds.max_bitrate);
                },
                None => info.codec_id = "mp4a".to_string(),
            }
        } else if let Some(owma) = stsd.owma_entry() {
            info.codec_id = "owma".to_string();
            info.channels = Some(owma.channel_count);
            info.sample_rate = Some(owma.sample_rate_hi as u32);
        } else if stsd.ovc1_entry().is_some() {
            info.codec_id = "ovc1".to_string();
            info.width = Some(f64::from(tkhd.width) as u32);
            info.height = Some(f64::from(tkhd.height) as u32);
        } else if let Some(fourcc) = stsd.first_fourcc() {
            info.codec_id = fourcc.to_string();
        }

        v.push(info);
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;

    #[test]
    fn video_and_audio_details() {
        let mp4 = FixtureMovie {
            tracks: vec![
                FixtureTrack {
                    handler: *b"vide",
                    timescale: 1000,
                    stts: vec![(30, 1000)],
                    stss: Some(vec![1]),
                    sample_sizes: SampleSizes::Constant(100),
                    chunks: vec![(4096, 30)],
                    ..FixtureTrack::default()
                },
                FixtureTrack {
                    handler: *b"soun",
                    timescale: 44100,
                    stts: vec![(10, 44100)],
                    stss: None,
                    sample_sizes: SampleSizes::Constant(10),
                    chunks: vec![(8192, 10)],
                    ..FixtureTrack::default()
                },
            ],
            ..FixtureMovie::default()
        }
        .build();

        let info = track_info(&mp4);
        assert_eq!(info.len(), 2);

        assert_eq!(info[0].track_type, "vide");
        assert_eq!(info[0].codec_id, "avc1.64001f");
        assert_eq!(info[0].width, Some(1280));
        assert_eq!(info[0].duration, 30.0);

        assert_eq!(info[1].track_type, "soun");
        assert_eq!(info[1].codec_id, "mp4a.40.2");
        assert_eq!(info[1].channels, Some(2));
        assert_eq!(info[1].sample_rate, Some(44100));

        // and it serializes.
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"codec_id\":\"mp4a.40.2\""));
        assert!(!json.contains("\"width\":null"));
    }
}
