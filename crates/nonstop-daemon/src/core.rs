//! KioskCore: single-owner playback loop.
//!
//! Owns the folder list, the persisted state, the playlist, the player
//! supervisor, the display and the buttons.  Nothing else mutates them.
//!
//! One iteration, every `tick_ms`:
//!
//! ```text
//!   display tick → overlay expiry → player check (throttled) → buttons
//! ```
//!
//! A failed player check is logged and never keeps the buttons from being
//! read.  A failed button action is logged and the loop resumes after
//! `error_backoff_ms`.  Only the shutdown future ends the loop.
//!
//! When an automatic (re)start of the player fails, the poll stops retrying
//! until a button starts playback again.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::bail;
use nonstop_proto::config::{Config, PlaybackMode};
use nonstop_proto::library::{self, PlayableExtensions};
use nonstop_proto::playlist::Playlist;
use nonstop_proto::state::{Settings, StateStore, KEY_FOLDER};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::display::DisplayController;
use crate::input::{Button, Debouncer, InputSource};
use crate::player::PlayerControl;

const PAUSE_TEXT: &str = "PAUSE";

/// Index of the persisted folder, or 0 when it is gone from the drive.
pub fn resolve_folder(folders: &[String], persisted: Option<&str>) -> usize {
    persisted
        .and_then(|name| folders.iter().position(|f| f == name))
        .unwrap_or(0)
}

/// File name without its extension, for the display.
fn display_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(file_name)
}

// ── KioskCore ─────────────────────────────────────────────────────────────────

pub struct KioskCore<P: PlayerControl> {
    media_root: PathBuf,
    exts: PlayableExtensions,
    mode: PlaybackMode,
    folders: Vec<String>,
    index: usize,
    store: StateStore,
    settings: Settings,
    playlist: Playlist,
    rng: StdRng,
    player: P,
    display: DisplayController,
    input: Box<dyn InputSource>,
    debouncers: Vec<(Button, Debouncer)>,
    /// Last file name the player reported.
    now_playing: Option<String>,
    paused: bool,
    /// Cleared when a start fails; set again by the next successful one.
    auto_restart: bool,
    last_poll: Option<Instant>,
    poll_interval: Duration,
    overlay: Duration,
    seek_seconds: i64,
    tick: Duration,
    error_backoff: Duration,
    kill_player_on_exit: bool,
}

impl<P: PlayerControl> KioskCore<P> {
    pub fn new(
        config: &Config,
        folders: Vec<String>,
        mut store: StateStore,
        settings: Settings,
        player: P,
        display: DisplayController,
        input: Box<dyn InputSource>,
    ) -> Self {
        let index = resolve_folder(&folders, settings.folder.as_deref());
        if let Some(folder) = folders.get(index) {
            if settings.folder.as_deref() != Some(folder.as_str()) {
                info!(
                    "KioskCore: folder {:?} not on drive, starting with {}",
                    settings.folder, folder
                );
                if let Err(e) = store.set(KEY_FOLDER, folder) {
                    warn!("KioskCore: {}", e);
                }
            }
        }

        let debounce = Duration::from_millis(config.buttons.debounce_ms);
        Self {
            media_root: config.paths.media_root.clone(),
            exts: PlayableExtensions::from_config(&config.media),
            mode: config.player.mode,
            folders,
            index,
            store,
            settings,
            playlist: Playlist::default(),
            rng: StdRng::from_entropy(),
            player,
            display,
            input,
            debouncers: Button::ALL
                .iter()
                .map(|b| (*b, Debouncer::new(debounce)))
                .collect(),
            now_playing: None,
            paused: false,
            auto_restart: true,
            last_poll: None,
            poll_interval: Duration::from_millis(config.event_loop.poll_interval_ms),
            overlay: Duration::from_millis(config.display.overlay_ms),
            seek_seconds: config.event_loop.seek_seconds,
            tick: Duration::from_millis(config.event_loop.tick_ms),
            error_backoff: Duration::from_millis(config.event_loop.error_backoff_ms),
            kill_player_on_exit: config.player.kill_player_on_exit,
        }
    }

    pub fn current_folder(&self) -> Option<&str> {
        self.folders.get(self.index).map(String::as_str)
    }

    /// Apply the persisted brightness, show the folder and start playing it.
    pub async fn start(&mut self, now: Instant) {
        self.display.set_brightness(self.settings.brightness);
        self.show_folder(now);
        if let Err(e) = self.start_player().await {
            error!("KioskCore: initial start failed: {:#}", e);
        }
    }

    /// Run until `shutdown` resolves, then release the display and, if
    /// configured, the player.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> anyhow::Result<()> {
        info!("KioskCore: starting event loop");
        tokio::pin!(shutdown);

        loop {
            let delay = match self.iterate(Instant::now()).await {
                Ok(()) => self.tick,
                Err(e) => {
                    error!("KioskCore: iteration failed: {:#}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("KioskCore: shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.cleanup().await;
        Ok(())
    }

    pub async fn iterate(&mut self, now: Instant) -> anyhow::Result<()> {
        self.display.tick(now);

        if self.display.overlay_expired(now) {
            self.display.clear_overlay();
            self.show_steady(now);
        }

        let poll_due = self
            .last_poll
            .map_or(true, |last| now.duration_since(last) >= self.poll_interval);
        if poll_due {
            self.last_poll = Some(now);
            if let Err(e) = self.check_player(now).await {
                error!("KioskCore: player check failed: {:#}", e);
            }
        }

        let mut pressed = Vec::new();
        for (button, debouncer) in self.debouncers.iter_mut() {
            if debouncer.update(self.input.is_pressed(*button), now) {
                pressed.push(*button);
            }
        }
        for button in pressed {
            info!("KioskCore: button {}", button.label());
            self.handle_button(button, now).await?;
        }

        Ok(())
    }

    // ── player supervision ────────────────────────────────────────────────────

    async fn start_player(&mut self) -> anyhow::Result<()> {
        let Some(folder) = self.current_folder() else {
            self.auto_restart = false;
            bail!("no folders to play");
        };
        let path = self.media_root.join(folder);
        self.now_playing = None;
        self.paused = false;

        let result = match self.mode {
            PlaybackMode::Folder => {
                self.player
                    .start_folder(&path, self.settings.shuffle)
                    .await
            }
            PlaybackMode::Playlist => {
                self.playlist =
                    Playlist::build(&path, &self.exts, self.settings.shuffle, &mut self.rng);
                match self.playlist.current().map(Path::to_path_buf) {
                    Some(file) => self.player.start_file(&file).await,
                    None => Err(anyhow::anyhow!("{} has no playable files", path.display())),
                }
            }
        };
        self.auto_restart = result.is_ok();
        result
    }

    async fn advance_playlist(&mut self) -> anyhow::Result<()> {
        let Some(file) = self.playlist.advance().map(Path::to_path_buf) else {
            return self.start_player().await;
        };
        debug!(
            "KioskCore: playlist {}/{}",
            self.playlist.position() + 1,
            self.playlist.len()
        );
        self.now_playing = None;
        self.paused = false;
        let result = self.player.start_file(&file).await;
        self.auto_restart = result.is_ok();
        result
    }

    async fn check_player(&mut self, now: Instant) -> anyhow::Result<()> {
        if !self.player.is_alive() {
            if !self.auto_restart {
                debug!("KioskCore: player down, waiting for a button");
                return Ok(());
            }
            return match self.mode {
                PlaybackMode::Playlist => self.advance_playlist().await,
                PlaybackMode::Folder => {
                    warn!("KioskCore: player not running, restarting");
                    self.start_player().await
                }
            };
        }

        let status = self.player.status().await;
        let mut changed = false;
        if let Some(name) = status.file_name {
            if self.now_playing.as_deref() != Some(name.as_str()) {
                info!("KioskCore: now playing {}", name);
                self.now_playing = Some(name);
                changed = true;
            }
        }
        if let Some(paused) = status.paused {
            if paused != self.paused {
                info!("KioskCore: player reports paused={}", paused);
                self.paused = paused;
                changed = true;
            }
        }
        if changed {
            self.show_steady(now);
        }
        Ok(())
    }

    // ── buttons ───────────────────────────────────────────────────────────────

    async fn handle_button(&mut self, button: Button, now: Instant) -> anyhow::Result<()> {
        match button {
            Button::NextFolder => self.next_folder(now).await,
            Button::NextTrack => match self.mode {
                PlaybackMode::Folder => {
                    self.player.next_item().await;
                    Ok(())
                }
                PlaybackMode::Playlist => self.advance_playlist().await,
            },
            Button::Pause => {
                // the local flip stands only when the player does not answer
                self.player.toggle_pause().await;
                self.paused = self.player.status().await.paused.unwrap_or(!self.paused);
                self.show_steady(now);
                Ok(())
            }
            Button::AudioTrack => {
                self.player.cycle_audio_track().await;
                Ok(())
            }
            Button::SeekForward => {
                self.seek(self.seek_seconds, now).await;
                Ok(())
            }
            Button::SeekBack => {
                self.seek(-self.seek_seconds, now).await;
                Ok(())
            }
        }
    }

    async fn seek(&mut self, secs: i64, now: Instant) {
        self.player.seek_relative(secs).await;
        self.display
            .show_temporary(&format!("{:+}", secs), self.overlay, now);
    }

    async fn next_folder(&mut self, now: Instant) -> anyhow::Result<()> {
        self.rescan();
        if self.folders.is_empty() {
            return Ok(());
        }
        self.index = (self.index + 1) % self.folders.len();

        if let Some(folder) = self.current_folder().map(str::to_owned) {
            info!("KioskCore: folder {}", folder);
            if let Err(e) = self.store.set(KEY_FOLDER, &folder) {
                warn!("KioskCore: {}", e);
            }
        }
        self.show_folder(now);
        self.start_player().await
    }

    /// Pick up folders added or removed since startup, keeping the cursor on
    /// the current folder (or just before where it used to sort).
    fn rescan(&mut self) {
        let folders = library::scan(&self.media_root, &self.exts);
        if folders.is_empty() {
            warn!("KioskCore: rescan found nothing, keeping {} folders", self.folders.len());
            return;
        }
        if let Some(current) = self.current_folder().map(str::to_owned) {
            self.index = match folders.binary_search(&current) {
                Ok(i) => i,
                Err(insert) => (insert + folders.len() - 1) % folders.len(),
            };
        }
        if folders != self.folders {
            info!("KioskCore: folders now {:?}", folders);
        }
        self.folders = folders;
    }

    // ── display ───────────────────────────────────────────────────────────────

    fn show_folder(&mut self, now: Instant) {
        if let Some(folder) = self.current_folder().map(str::to_owned) {
            self.display.show(&folder, now);
        }
    }

    /// File name or PAUSE, unless an overlay owns the display.
    fn show_steady(&mut self, now: Instant) {
        if self.display.is_overlay_active(now) {
            return;
        }
        let text = if self.paused {
            PAUSE_TEXT.to_string()
        } else if let Some(name) = self.now_playing.as_deref() {
            display_name(name).to_string()
        } else if let Some(folder) = self.current_folder() {
            folder.to_string()
        } else {
            return;
        };
        self.display.show(&text, now);
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn cleanup(&mut self) {
        info!("KioskCore: cleanup");
        self.display.blank();
        if self.kill_player_on_exit {
            self.player.shutdown().await;
        } else {
            info!("KioskCore: leaving player running");
        }
    }
}
