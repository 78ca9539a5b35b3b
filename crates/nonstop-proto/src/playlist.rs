//! Playlist for playlist-driven playback: every playable file of one folder,
//! optionally shuffled once when built, with a wrapping cursor.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::library::{playable_files, PlayableExtensions};

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    files: Vec<PathBuf>,
    cursor: usize,
}

impl Playlist {
    /// Enumerate `folder`, sort by path, shuffle when asked.  Always starts
    /// at the first entry.
    pub fn build<R: Rng + ?Sized>(
        folder: &Path,
        exts: &PlayableExtensions,
        shuffle: bool,
        rng: &mut R,
    ) -> Self {
        Self::from_files(playable_files(folder, exts), shuffle, rng)
    }

    pub fn from_files<R: Rng + ?Sized>(mut files: Vec<PathBuf>, shuffle: bool, rng: &mut R) -> Self {
        files.sort();
        if shuffle {
            files.shuffle(rng);
        }
        debug!("playlist: {} files (shuffle={})", files.len(), shuffle);
        Self { files, cursor: 0 }
    }

    pub fn current(&self) -> Option<&Path> {
        self.files.get(self.cursor).map(PathBuf::as_path)
    }

    /// Step to the next file, wrapping at the end.  `None` when empty.
    pub fn advance(&mut self) -> Option<&Path> {
        if self.files.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.files.len();
        self.current()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}
