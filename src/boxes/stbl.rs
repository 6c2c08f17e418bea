use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{
    ChunkLargeOffsetBox, ChunkOffsetBox, CompactSampleSizeBox, CompositionOffsetBox,
    SampleDescriptionBox, SampleSizeBox, SampleToChunkBox, SyncSampleBox, TimeToSampleBox,
};
use crate::error::Error;

def_box! {
    /// 8.1.1 Sample Table Box (ISO/IEC 14496-12:2015(E))
    ///
    /// Contains:
    ///
    /// - SampleDescriptionBox, stsd
    /// - TimeToSampleBox, stts
    /// - SampleToChunkBox, stsc
    /// - SampleSizeBox, stsz, or CompactSampleSizeBox, stz2
    /// - ChunkOffsetBox, stco, or ChunkLargeOffsetBox, co64
    ///
    /// Optionally:
    ///
    /// - SyncSampleBox, stss
    /// - CompositionOffsetBox, ctts
    #[derive(Default)]
    SampleTableBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"stbl",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl SampleTableBox {
    declare_box_methods!(SampleDescriptionBox, sample_description, sample_description_mut);
    declare_box_methods!(TimeToSampleBox, time_to_sample, time_to_sample_mut);
    declare_box_methods_opt!(SampleToChunkBox, sample_to_chunk, sample_to_chunk_mut);
    declare_box_methods_opt!(CompositionOffsetBox, composition_time_to_sample, composition_time_to_sample_mut);
    declare_box_methods_opt!(SyncSampleBox, sync_samples, sync_samples_mut);

    /// Get a reference to the SampleSizeBox (`stz2` is normalized to
    /// `stsz` at parse time).
    ///
    /// Fragmented movies carry none; their sample index is empty.
    pub fn sample_size(&self) -> Option<&SampleSizeBox> {
        first_box!(&self.boxes, SampleSizeBox)
            .or_else(|| first_box!(&self.boxes, CompactSampleSizeBox))
    }

    /// Get a reference to the ChunkOffsetBox or ChunkLargeOffsetBox.
    pub fn chunk_offset(&self) -> Option<&ChunkOffsetBox> {
        first_box!(&self.boxes, ChunkOffsetBox)
            .or_else(|| first_box!(&self.boxes, ChunkLargeOffsetBox))
    }

    /// Nearest sync sample at or before `sample` (one-based).
    ///
    /// Without a SyncSampleBox every sample is a sync sample.
    pub fn nearest_keyframe(&self, sample: u32) -> u32 {
        match self.sync_samples() {
            Some(stss) => stss.nearest_keyframe(sample),
            None => sample,
        }
    }

    /// Check that the mandatory children are present and not empty.
    pub fn check(&self, track_id: u32) -> Result<(), Error> {
        let stsd = match first_box!(&self.boxes, SampleDescriptionBox) {
            Some(stsd) => stsd,
            None => {
                log::error!("trak(id {}): stbl: no SampleDescriptionBox present", track_id);
                return Err(Error::MissingMandatory("stsd"));
            },
        };
        if stsd.entries.is_empty() {
            log::error!("trak(id {}): stbl: SampleDescriptionBox has no entries", track_id);
            return Err(Error::MalformedBox(format!("trak(id {}): empty stsd", track_id)));
        }
        if first_box!(&self.boxes, TimeToSampleBox).is_none() {
            log::error!("trak(id {}): stbl: no TimeToSampleBox present", track_id);
            return Err(Error::MissingMandatory("stts"));
        }
        Ok(())
    }
}
