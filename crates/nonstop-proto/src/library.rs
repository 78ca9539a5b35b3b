//! Media discovery on the removable drive.
//!
//! A folder qualifies when anything below it, at any depth, has a playable
//! extension.  Unreadable entries are skipped so one broken folder never
//! hides the rest of the drive.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lowercase extensions (without the dot) that the player can handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableExtensions {
    exts: Vec<String>,
}

impl PlayableExtensions {
    pub fn new<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exts: Vec<String> = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        exts.sort();
        exts.dedup();
        Self { exts }
    }

    /// Video and audio lists merged into one set.
    pub fn from_config(media: &crate::config::MediaConfig) -> Self {
        Self::new(
            media
                .video_extensions
                .iter()
                .chain(media.audio_extensions.iter()),
        )
    }

    pub fn matches(&self, path: &Path) -> bool {
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) => self.exts.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exts.is_empty()
    }
}

/// Sorted names of the immediate subdirectories of `root` that contain at
/// least one playable file.  An unavailable root yields an empty list.
pub fn scan(root: &Path, exts: &PlayableExtensions) -> Vec<String> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("library: cannot read {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut folders = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("library: skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };

        match entry.file_type() {
            Ok(ft) if ft.is_dir() => {}
            _ => continue,
        }

        // Non-UTF-8 names can't round-trip through the state file.
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("library: skipping non-UTF-8 folder name {:?}", entry.file_name());
            continue;
        };
        // .Trashes, .Spotlight-V100 and friends
        if name.starts_with('.') {
            continue;
        }

        if contains_playable(&entry.path(), exts) {
            folders.push(name);
        } else {
            debug!("library: {} has no playable files", name);
        }
    }

    folders.sort();
    folders.dedup();
    folders
}

/// True as soon as one playable file is found below `dir`.
pub fn contains_playable(dir: &Path, exts: &PlayableExtensions) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("library: walk error under {}: {}", dir.display(), e);
                None
            }
        })
        .any(|entry| entry.file_type().is_file() && exts.matches(entry.path()))
}

/// Every playable file below `dir`, sorted by full path.
pub fn playable_files(dir: &Path, exts: &PlayableExtensions) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && exts.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn video() -> PlayableExtensions {
        PlayableExtensions::new(["avi", ".MOV", "mkv", "mp4"])
    }

    #[test]
    fn test_extensions_are_normalised() {
        let exts = video();
        assert!(exts.matches(Path::new("a/b/clip.MP4")));
        assert!(exts.matches(Path::new("clip.mov")));
        assert!(!exts.matches(Path::new("notes.txt")));
        assert!(!exts.matches(Path::new("mp4")));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Simpsons/Season 1")).unwrap();
        fs::write(root.join("Simpsons/Season 1/e01.MKV"), b"x").unwrap();
        fs::create_dir_all(root.join("Cartoons")).unwrap();
        fs::write(root.join("Cartoons/a.mp4"), b"x").unwrap();
        fs::create_dir_all(root.join("Empty")).unwrap();
        fs::create_dir_all(root.join("Docs")).unwrap();
        fs::write(root.join("Docs/readme.txt"), b"x").unwrap();
        fs::create_dir_all(root.join(".Trashes")).unwrap();
        fs::write(root.join(".Trashes/old.mp4"), b"x").unwrap();
        fs::write(root.join("loose.mp4"), b"x").unwrap();

        let folders = scan(root, &video());
        assert_eq!(folders, vec!["Cartoons".to_string(), "Simpsons".to_string()]);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(&dir.path().join("not-mounted"), &video()).is_empty());
    }

    #[test]
    fn test_playable_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("b/2.mp4"), b"x").unwrap();
        fs::write(root.join("c.avi"), b"x").unwrap();
        fs::write(root.join("a.mkv"), b"x").unwrap();
        fs::write(root.join("cover.jpg"), b"x").unwrap();

        let files = playable_files(root, &video());
        assert_eq!(
            files,
            vec![root.join("a.mkv"), root.join("b/2.mp4"), root.join("c.avi")]
        );
    }
}
