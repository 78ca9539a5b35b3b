//! Persisted playback state: a plain `key=value` file that survives reboots
//! and stays hand-editable on the boot partition.
//!
//! Comment (`#`) and blank lines are kept verbatim on rewrite.  Writes go to
//! a sibling temp file that is renamed into place, so a power cut mid-write
//! leaves either the old or the new file, never a truncated one.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub const KEY_FOLDER: &str = "folder";
pub const KEY_RANDOM: &str = "random";
pub const KEY_VOLUME: &str = "volume";
pub const KEY_BRIGHTNESS: &str = "ledbrightness";

pub const DEFAULT_BRIGHTNESS: u8 = 50;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comments, blanks and anything without `=`; written back untouched.
    Raw(String),
    /// `raw` is what gets written; it only changes when the value does.
    Entry {
        key: String,
        value: String,
        raw: String,
    },
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    lines: Vec<Line>,
}

impl StateStore {
    /// Read `path`.  A missing file is an empty store; any other read error is
    /// reported so the caller can log it and carry on with defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let lines = match std::fs::read_to_string(&path) {
            Ok(content) => parse_lines(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StateError::Read { path, source }),
        };
        Ok(Self { path, lines })
    }

    /// Like `open`, but falls back to an empty store on read errors.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                warn!("state: {}", e);
                Self {
                    path,
                    lines: Vec::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .map(str::to_owned)
            .unwrap_or_else(|| default.to_string())
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Store `value` under `key` and rewrite the file.
    ///
    /// The in-memory value is updated even when the write fails, so the
    /// current run keeps using it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StateError> {
        let value = sanitize_value(value);
        if self.lookup(key) == Some(value.as_str()) {
            return Ok(());
        }

        let mut replaced = false;
        for line in self.lines.iter_mut() {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k == key {
                    *v = value.clone();
                    *raw = format!("{}={}", key, value);
                    replaced = true;
                }
            }
        }
        if !replaced {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                raw: format!("{}={}", key, value),
                value,
            });
        }

        self.write()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Raw(raw) | Line::Entry { raw, .. } => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    fn write(&self) -> Result<(), StateError> {
        let tmp = tmp_path(&self.path);
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(self.render().as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp, &self.path)
        })();

        match result {
            Ok(()) => {
                debug!("state: wrote {}", self.path.display());
                Ok(())
            }
            Err(source) => {
                let _ = std::fs::remove_file(&tmp);
                Err(StateError::Write {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }
}

fn parse_lines(content: &str) -> Vec<Line> {
    content
        .lines()
        .map(|raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return Line::Raw(raw.to_string());
            }
            // trailing whitespace belongs to the value
            match raw.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                    key: key.trim().to_string(),
                    value: value.trim_start().to_string(),
                    raw: raw.to_string(),
                },
                _ => Line::Raw(raw.to_string()),
            }
        })
        .collect()
}

/// One line, no leading whitespace: exactly what a reopen reads back.
fn sanitize_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim_start().to_string()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Parse the loose boolean spellings people type into the ini file.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Integer percentage in 0..=100.
pub fn parse_percent(value: &str) -> Option<u8> {
    value.trim().parse::<u8>().ok().filter(|v| *v <= 100)
}

/// Map a 0..=100 percentage onto a device range `0..=native_max`.
pub fn scale_brightness(percent: u8, native_max: u8) -> u8 {
    let percent = u32::from(percent.min(100));
    let scaled = (percent * u32::from(native_max) + 50) / 100;
    scaled as u8
}

/// Typed view of the persisted settings, validated on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Last selected folder; may no longer exist on the drive.
    pub folder: Option<String>,
    pub shuffle: bool,
    pub volume: u8,
    pub brightness: u8,
}

impl Settings {
    /// Read every key with its default, re-writing values that are missing
    /// or out of range.  Write failures are logged, not returned.
    pub fn load(store: &mut StateStore, default_volume: u8) -> Self {
        let folder = store
            .lookup(KEY_FOLDER)
            .filter(|f| !f.is_empty())
            .map(str::to_owned);

        let shuffle = load_typed(store, KEY_RANDOM, parse_bool, true, |v| v.to_string());
        let volume = load_typed(store, KEY_VOLUME, parse_percent, default_volume.min(100), |v| {
            v.to_string()
        });
        let brightness = load_typed(
            store,
            KEY_BRIGHTNESS,
            parse_percent,
            DEFAULT_BRIGHTNESS,
            |v| v.to_string(),
        );

        info!(
            "state: folder={:?} random={} volume={} ledbrightness={}",
            folder, shuffle, volume, brightness
        );

        Self {
            folder,
            shuffle,
            volume,
            brightness,
        }
    }
}

fn load_typed<T: Copy>(
    store: &mut StateStore,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
    default: T,
    render: impl Fn(T) -> String,
) -> T {
    let raw = store.lookup(key).map(str::to_owned);
    match raw.as_deref().and_then(&parse) {
        Some(value) => value,
        None => {
            if let Some(raw) = raw {
                warn!("state: invalid {}={:?}, resetting", key, raw);
            }
            if let Err(e) = store.set(key, &render(default)) {
                warn!("state: {}", e);
            }
            default
        }
    }
}
