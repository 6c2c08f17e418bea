//! Flash Video output.
//!
//! Emits FLV tag bodies: an AVC / AAC sequence header per track, then
//! one tag per sample with the composition time delta in milliseconds.
use crate::bucket::BucketList;
use crate::error::Result;
use crate::mp4box::MP4;
use crate::sample_map::MovieMap;
use crate::split::SampleRange;
use crate::types::rescale;

const FLV_TIMESCALE: u32 = 1000;

const RTMP_SEQUENCE_HEADER: u8 = 0;
const RTMP_BODY: u8 = 1;

/// Produce the FLV tag stream for previously planned sample ranges.
pub fn write_flv(mp4: &MP4, map: &MovieMap, ranges: &[SampleRange]) -> Result<BucketList> {
    let movie = mp4.movie();
    let mut out = BucketList::new();

    for (idx, trak) in movie.tracks().iter().enumerate() {
        let track = &map.tracks[idx];
        let range = ranges[idx];
        let stsd = trak.media().media_info().sample_table().sample_description();
        let is_video = trak.is_video();

        if is_video {
            // AVC sequence header: the decoder configuration record.
            let mut header = vec![0x17, RTMP_SEQUENCE_HEADER, 0, 0, 0];
            match stsd.avc_entry().and_then(|e| e.configuration()) {
                Some(avcc) => header.extend_from_slice(&avcc.data.0),
                None => log::warn!("trak(id {}): no codec private data found", track.track_id),
            }
            out.push_memory(header);
        } else {
            // AAC sequence header: the AudioSpecificConfig.
            let mut header = vec![0xaf, RTMP_SEQUENCE_HEADER];
            match stsd.audio_entry().and_then(|e| e.esds()) {
                Some(esds) => header.extend_from_slice(&esds.decoder_specific.0),
                None => log::warn!("trak(id {}): no codec private data found", track.track_id),
            }
            out.push_memory(header);
        }

        for s in range.start..range.end {
            let sample = &track.samples[s as usize];
            let composition_time =
                rescale(sample.cto as u64, track.timescale, FLV_TIMESCALE) as u32;

            if is_video {
                // VIDEODATA: frame type + codec id 7 (AVC).
                let frame_type = if sample.is_sync { 1 } else { 2 };
                let header = [
                    (frame_type << 4) | 7,
                    RTMP_BODY,
                    (composition_time >> 16) as u8,
                    (composition_time >> 8) as u8,
                    composition_time as u8,
                ];
                out.push_memory(header.to_vec());
            } else {
                // AUDIODATA + AACAUDIODATA.
                out.push_memory(vec![0xaf, RTMP_BODY]);
            }
            out.push_file_range(sample.pos, sample.size as u64);
        }
    }

    Ok(out)
}
