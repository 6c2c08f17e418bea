use std::io;

use crate::boxes::prelude::*;

def_box! {
    FileTypeBox {
        major_brand:        FourCC,
        minor_version:      u32,
        compatible_brands:  Vec<FourCC>,
    },
    fourcc => b"ftyp",
    version => [],
    impls => [ basebox, boxinfo, debug, fromtobytes ],
}

impl FileTypeBox {
    /// The fixed `ftyp` that fragmented output starts with.
    pub fn fragmented() -> FileTypeBox {
        FileTypeBox {
            major_brand:       FourCC::new(b"avc1"),
            minor_version:     0,
            compatible_brands: vec![FourCC::new(b"isom"), FourCC::new(b"iso2")],
        }
    }
}

def_box! {
    /// 8.2.2 Movie Header Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    MovieHeaderBox {
        cr_time:    Time,
        mod_time:   Time,
        timescale:  u32,
        duration:   Duration_,
        pref_rate:  FixedFloat16_16,
        pref_vol:   FixedFloat8_8,
        skip:       10,
        matrix:     Matrix,
        // "pre_defined" in the standard, in practice:
        preview_time:       u32,
        preview_duration:   u32,
        poster_time:        u32,
        selection_time:     u32,
        selection_duration: u32,
        current_time:       u32,
        //
        next_track_id: u32,
    },
    fourcc => b"mvhd",
    version => [1, cr_time, mod_time, duration],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 8.4.2 Media Header Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    MediaHeaderBox {
        cr_time:    Time,
        mod_time:   Time,
        timescale:  u32,
        duration:   Duration_,
        language:   IsoLanguageCode,
        quality:    u16,
    },
    fourcc => b"mdhd",
    version => [1, cr_time, mod_time, duration],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    #[derive(Default)]
    SoundMediaHeaderBox {
        balance:        u16,
        skip:           2,
    },
    fourcc => b"smhd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    VideoMediaHeaderBox {
        // flag bit 0 is always set for vmhd.
        flags:          Flags,
        graphics_mode:  u16,
        opcolor_r:      u16,
        opcolor_g:      u16,
        opcolor_b:      u16,
    },
    fourcc => b"vmhd",
    version => [0, flags],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}

def_box! {
    /// 8.8.5 Movie Fragment Header Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    MovieFragmentHeaderBox {
        sequence_number:    u32,
    },
    fourcc => b"mfhd",
    version => [0],
    impls => [ boxinfo, debug, fromtobytes, fullbox ],
}
