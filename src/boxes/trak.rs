use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{
    HandlerBox, MediaHeaderBox, SampleTableBox, SoundMediaHeaderBox, TrackHeaderBox,
    VideoMediaHeaderBox,
};
use crate::error::Error;

def_box! {
    /// 8.3.1 Track Box (ISO/IEC 14496-12:2015(E))
    TrackBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"trak",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl TrackBox {
    /// Get a reference to this track's TrackHeaderBox.
    pub fn track_header(&self) -> &TrackHeaderBox {
        first_box!(&self.boxes, TrackHeaderBox).unwrap()
    }

    /// Get a mutable reference to this track's TrackHeaderBox.
    pub fn track_header_mut(&mut self) -> &mut TrackHeaderBox {
        first_box_mut!(&mut self.boxes, TrackHeaderBox).unwrap()
    }

    /// Get a reference to this track's MediaBox.
    pub fn media(&self) -> &MediaBox {
        first_box!(&self.boxes, MediaBox).unwrap()
    }

    /// Get a mutable reference to this track's MediaBox.
    pub fn media_mut(&mut self) -> &mut MediaBox {
        first_box_mut!(&mut self.boxes, MediaBox).unwrap()
    }

    /// Get the track id.
    pub fn track_id(&self) -> u32 {
        self.track_header().track_id
    }

    /// Is this a video track.
    pub fn is_video(&self) -> bool {
        self.media().handler().is_video()
    }

    /// Is this an audio track.
    pub fn is_audio(&self) -> bool {
        self.media().handler().is_audio()
    }

    // Tracks we keep at load time: audio or video, not empty.
    pub(crate) fn is_usable(&self) -> bool {
        let mdia = match first_box!(&self.boxes, MediaBox) {
            Some(mdia) => mdia,
            None => return false,
        };
        let hdlr = match first_box!(&mdia.boxes, HandlerBox) {
            Some(hdlr) => hdlr,
            None => return false,
        };
        if !hdlr.is_video() && !hdlr.is_audio() {
            log::info!(
                "trak ignored (handler_type={}, name={})",
                hdlr.handler_type,
                hdlr.name
            );
            return false;
        }
        match first_box!(&mdia.boxes, MediaHeaderBox) {
            Some(mdhd) if mdhd.duration.0 == 0 => {
                log::info!("trak ignored (empty, handler_type={})", hdlr.handler_type);
                false
            },
            Some(_) => true,
            None => false,
        }
    }

    /// Check that the mandatory children are present.
    pub fn check(&self) -> Result<(), Error> {
        let track_id = match first_box!(&self.boxes, TrackHeaderBox) {
            Some(tkhd) => tkhd.track_id,
            None => {
                log::error!("TrackBox: no TrackHeaderBox present");
                return Err(Error::MissingMandatory("tkhd"));
            },
        };
        let mdia = match first_box!(&self.boxes, MediaBox) {
            Some(mdia) => mdia,
            None => {
                log::error!("TrackBox(id {}): no MediaBox present", track_id);
                return Err(Error::MissingMandatory("mdia"));
            },
        };
        mdia.check(track_id)
    }
}

def_box! {
    /// 8.4.1 Media Box (ISO/IEC 14496-12:2015(E))
    MediaBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"mdia",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MediaBox {
    declare_box_methods!(MediaHeaderBox, media_header, media_header_mut);
    declare_box_methods!(HandlerBox, handler, handler_mut);
    declare_box_methods!(MediaInformationBox, media_info, media_info_mut);

    fn check(&self, track_id: u32) -> Result<(), Error> {
        let mdhd = match first_box!(&self.boxes, MediaHeaderBox) {
            Some(mdhd) => mdhd,
            None => {
                log::error!("TrackBox(id {}): no MediaHeaderBox present", track_id);
                return Err(Error::MissingMandatory("mdhd"));
            },
        };
        if mdhd.timescale == 0 {
            return Err(Error::MalformedBox(format!(
                "trak(id {}): mdhd timescale is zero",
                track_id
            )));
        }
        if first_box!(&self.boxes, HandlerBox).is_none() {
            log::error!("TrackBox(id {}): no HandlerBox present", track_id);
            return Err(Error::MissingMandatory("hdlr"));
        }
        let minf = match first_box!(&self.boxes, MediaInformationBox) {
            Some(minf) => minf,
            None => {
                log::error!("TrackBox(id {}): no MediaInformationBox present", track_id);
                return Err(Error::MissingMandatory("minf"));
            },
        };
        let stbl = match first_box!(&minf.boxes, SampleTableBox) {
            Some(stbl) => stbl,
            None => {
                log::error!("TrackBox(id {}): no SampleTableBox present", track_id);
                return Err(Error::MissingMandatory("stbl"));
            },
        };
        stbl.check(track_id)
    }
}

def_box! {
    /// 8.4.4 Media Information Box (ISO/IEC 14496-12:2015(E))
    MediaInformationBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"minf",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl MediaInformationBox {
    declare_box_methods!(SampleTableBox, sample_table, sample_table_mut);
    declare_box_methods_opt!(VideoMediaHeaderBox, video_header, video_header_mut);
    declare_box_methods_opt!(SoundMediaHeaderBox, sound_header, sound_header_mut);
}
