//! VLC `rc` interface: command names and reply parsing.
//!
//! The rc interface answers in loosely formatted text that changes with the
//! player's state (stopped, playing, between two items), so every parser here
//! is best-effort and returns `None` when nothing recognisable is present.
//! Callers treat `None` as "unknown", never as an error.

use percent_encoding::percent_decode_str;

pub const CMD_STATUS: &str = "status";
pub const CMD_INFO: &str = "info";
pub const CMD_PLAYLIST: &str = "playlist";
pub const CMD_PAUSE: &str = "pause";
pub const CMD_NEXT: &str = "next";
pub const CMD_GET_TIME: &str = "get_time";
/// Hotkey action cycling through the audio tracks of the current item.
pub const CMD_CYCLE_AUDIO_TRACK: &str = "key key-audio-track";

pub fn seek_command(position_secs: i64) -> String {
    format!("seek {}", position_secs.max(0))
}

/// Status keys that carry the current item, most specific first.
const STATUS_KEYS: &[&str] = &["new input:", "input:", "filename:"];
const INFO_KEYS: &[&str] = &["filename:", "location:"];

/// Strip the prompt and the `( ... )` / `| ...` decoration rc puts around
/// every line.
fn normalize_line(line: &str) -> &str {
    let line = line.trim_start_matches(|c: char| c == '>' || c.is_whitespace()).trim_end();
    let line = line.strip_prefix('|').unwrap_or(line).trim();
    match line.strip_prefix('(') {
        Some(inner) => inner.strip_suffix(')').unwrap_or(inner).trim(),
        None => line,
    }
}

fn find_field(reply: &str, keys: &[&str]) -> Option<String> {
    for line in reply.lines() {
        let line = normalize_line(line);
        for key in keys {
            if let Some(idx) = line.find(key) {
                let value = line[idx + key.len()..].trim();
                if let Some(name) = file_name_from_location(value) {
                    return Some(name);
                }
            }
        }
    }
    None
}

/// Current item from a `status` reply.
pub fn parse_status_file_name(reply: &str) -> Option<String> {
    find_field(reply, STATUS_KEYS)
}

/// Current item from an `info` reply.
pub fn parse_info_file_name(reply: &str) -> Option<String> {
    find_field(reply, INFO_KEYS)
}

/// Current item from a `playlist` reply: the entry carrying the `*` marker,
/// e.g. `|   *5 - ep 2.mp4 (00:21:00) [played 1 time]`.
pub fn parse_playlist_file_name(reply: &str) -> Option<String> {
    for line in reply.lines() {
        let Some((_, rest)) = line.split_once('*') else {
            continue;
        };
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start();
        let rest = rest.strip_prefix('-').unwrap_or(rest).trim();

        let rest = match rest.rfind(" [played") {
            Some(idx) => &rest[..idx],
            None => rest,
        };
        let rest = strip_duration(rest.trim_end());

        if let Some(name) = file_name_from_location(rest) {
            return Some(name);
        }
    }
    None
}

/// Drop a trailing ` (HH:MM:SS)` duration.
fn strip_duration(entry: &str) -> &str {
    if let Some(open) = entry.rfind(" (") {
        let inner = &entry[open + 2..];
        if let Some(inner) = inner.strip_suffix(')') {
            if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit() || c == ':') {
                return &entry[..open];
            }
        }
    }
    entry
}

/// `Some(true)` for `state paused`, `Some(false)` for `state playing`.
pub fn parse_pause_state(reply: &str) -> Option<bool> {
    for line in reply.lines() {
        let line = normalize_line(line);
        let Some(state) = line.strip_prefix("state") else {
            continue;
        };
        match state.trim() {
            "paused" => return Some(true),
            "playing" => return Some(false),
            _ => {}
        }
    }
    None
}

/// Playback position in whole seconds from a `get_time` reply.
pub fn parse_time(reply: &str) -> Option<i64> {
    reply
        .lines()
        .map(normalize_line)
        .find_map(|line| line.parse::<i64>().ok())
}

/// Final path segment of a `file://` URL or plain path, percent-decoded.
pub fn file_name_from_location(location: &str) -> Option<String> {
    let location = location.trim();
    let location = location
        .strip_prefix("file://")
        .map(|rest| rest.strip_prefix("localhost").unwrap_or(rest))
        .unwrap_or(location);

    let decoded = percent_decode_str(location).decode_utf8_lossy();
    let normalized = decoded.replace('\\', "/");
    let name = normalized.trim_end_matches('/').rsplit('/').next()?.trim();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
