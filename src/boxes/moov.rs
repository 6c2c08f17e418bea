use std::io;

use crate::boxes::prelude::*;
use crate::boxes::{MovieHeaderBox, TrackBox};
use crate::error::Error;

def_box! {
    /// 8.2.1 Movie Box (ISO/IEC 14496-12:2015(E))
    #[derive(Default)]
    MovieBox {
        boxes:      Vec<MP4Box>,
    },
    fourcc => b"moov",
    version => [],
    impls => [ basebox, boxinfo, debug ],
}

impl MovieBox {
    /// Get a reference to the list of tracks.
    pub fn tracks(&self) -> Vec<&TrackBox> {
        iter_box!(&self.boxes, TrackBox).collect()
    }

    /// Get a mutable reference to the list of tracks.
    pub fn tracks_mut(&mut self) -> Vec<&mut TrackBox> {
        iter_box_mut!(&mut self.boxes, TrackBox).collect()
    }

    /// Get a reference to the MovieHeaderBox.
    pub fn movie_header(&self) -> &MovieHeaderBox {
        first_box!(&self.boxes, MovieHeaderBox).unwrap()
    }

    /// Get the track index by id.
    pub fn track_idx_by_id(&self, track_id: u32) -> Option<usize> {
        self.tracks()
            .iter()
            .position(|t| t.track_id() == track_id)
    }

    /// Get the index of the first track with this handler.
    pub fn track_idx_by_handler(&self, handler: FourCC) -> Option<usize> {
        self.tracks()
            .iter()
            .position(|t| t.media().handler().handler_type == handler)
    }

    /// Validate the mandatory structure of the movie.
    pub fn check(&self) -> Result<(), Error> {
        let mvhd = match first_box!(&self.boxes, MovieHeaderBox) {
            Some(mvhd) => mvhd,
            None => {
                log::error!("MovieBox: no MovieHeaderBox present");
                return Err(Error::MissingMandatory("mvhd"));
            },
        };
        if mvhd.timescale == 0 {
            return Err(Error::MalformedBox("mvhd: timescale is zero".to_string()));
        }
        let tracks = self.tracks();
        if tracks.is_empty() {
            log::error!("MovieBox: no TrackBoxes present");
            return Err(Error::MissingMandatory("trak"));
        }
        for t in &tracks {
            t.check()?;
        }
        Ok(())
    }
}

impl FromBytes for MovieBox {
    fn from_bytes<R: ReadBytes>(stream: &mut R) -> io::Result<MovieBox> {
        let mut reader = BoxReader::new(stream)?;
        let mut boxes = Vec::<MP4Box>::from_bytes(&mut reader)?;

        // Tracks that are not audio or video, or that are empty, are of
        // no use to any of the operations - drop them here.
        boxes.retain(|b| {
            let trak = match b {
                MP4Box::TrackBox(trak) => trak,
                _ => return true,
            };
            trak.is_usable()
        });

        Ok(MovieBox { boxes })
    }
    fn min_size() -> usize {
        8
    }
}

impl ToBytes for MovieBox {
    fn to_bytes<W: WriteBytes>(&self, stream: &mut W) -> io::Result<()> {
        let mut writer = BoxWriter::new(stream, self)?;
        self.boxes.to_bytes(&mut writer)?;
        writer.finalize()
    }
}
