//! Shared building blocks for the nonstop kiosk daemon: configuration,
//! platform paths, the persisted key=value state, media discovery, playlists
//! and the VLC remote-control reply parsers.

pub mod config;
pub mod library;
pub mod platform;
pub mod playlist;
pub mod protocol;
pub mod state;
