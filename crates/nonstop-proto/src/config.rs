use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub buttons: ButtonsConfig,
    #[serde(default, rename = "loop")]
    pub event_loop: LoopConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Mount point of the removable drive.
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    /// key=value file holding the selected folder and settings.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Player stdout/stderr.  Relative paths are resolved against `media_root`.
    #[serde(default = "default_player_log")]
    pub player_log: PathBuf,
}

/// Which side owns the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// VLC gets the whole folder and loops/shuffles it itself.
    #[default]
    Folder,
    /// We build the playlist and start VLC once per file.
    Playlist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_binary")]
    pub binary: String,
    #[serde(default = "default_rc_port")]
    pub rc_port: u16,
    /// VLC interface module serving the text protocol (`rc` on VLC 3).
    #[serde(default = "default_rc_interface")]
    pub rc_interface: String,
    #[serde(default)]
    pub mode: PlaybackMode,
    /// Pause between killing the old player and spawning the new one.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default)]
    pub kill_player_on_exit: bool,
    /// Appended before the media path on every spawn.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_control_timeout_ms")]
    pub control_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default)]
    pub audio_extensions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    #[default]
    Ht16k33,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub backend: DisplayBackend,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: PathBuf,
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
    /// Characters the device shows at once.
    #[serde(default = "default_display_width")]
    pub width: usize,
    #[serde(default = "default_scroll_ms")]
    pub scroll_ms: u64,
    #[serde(default = "default_overlay_ms")]
    pub overlay_ms: u64,
}

/// BCM line offsets for each button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonPins {
    #[serde(default = "default_pin_next_folder")]
    pub next_folder: u32,
    #[serde(default = "default_pin_next_track")]
    pub next_track: u32,
    #[serde(default = "default_pin_pause")]
    pub pause: u32,
    #[serde(default = "default_pin_audio_track")]
    pub audio_track: u32,
    #[serde(default = "default_pin_seek_forward")]
    pub seek_forward: u32,
    #[serde(default = "default_pin_seek_back")]
    pub seek_back: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonsConfig {
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: PathBuf,
    /// Minimum time between two accepted presses of the same button.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub pins: ButtonPins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// How often the player is asked what it is playing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_seek_seconds")]
    pub seek_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// ALSA simple mixer control passed to `amixer set`.
    #[serde(default = "default_mixer_control")]
    pub mixer_control: String,
    #[serde(default = "default_volume")]
    pub default_volume: u8,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            state_file: default_state_file(),
            player_log: default_player_log(),
        }
    }
}

impl PathsConfig {
    pub fn player_log_path(&self) -> PathBuf {
        if self.player_log.is_absolute() {
            self.player_log.clone()
        } else {
            self.media_root.join(&self.player_log)
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: default_player_binary(),
            rc_port: default_rc_port(),
            rc_interface: default_rc_interface(),
            mode: PlaybackMode::default(),
            restart_delay_ms: default_restart_delay_ms(),
            kill_player_on_exit: false,
            extra_args: Vec::new(),
            control_timeout_ms: default_control_timeout_ms(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_extensions: default_video_extensions(),
            audio_extensions: Vec::new(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: DisplayBackend::default(),
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
            width: default_display_width(),
            scroll_ms: default_scroll_ms(),
            overlay_ms: default_overlay_ms(),
        }
    }
}

impl Default for ButtonPins {
    fn default() -> Self {
        Self {
            next_folder: default_pin_next_folder(),
            next_track: default_pin_next_track(),
            pause: default_pin_pause(),
            audio_track: default_pin_audio_track(),
            seek_forward: default_pin_seek_forward(),
            seek_back: default_pin_seek_back(),
        }
    }
}

impl Default for ButtonsConfig {
    fn default() -> Self {
        Self {
            gpio_chip: default_gpio_chip(),
            debounce_ms: default_debounce_ms(),
            pins: ButtonPins::default(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            seek_seconds: default_seek_seconds(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mixer_control: default_mixer_control(),
            default_volume: default_volume(),
        }
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("/media/pi/USB")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/boot/nonstoptv.ini")
}

fn default_player_log() -> PathBuf {
    PathBuf::from("nonstoptv_vlc.log")
}

fn default_player_binary() -> String {
    platform::vlc_binary_name().to_string()
}

fn default_rc_port() -> u16 {
    platform::DEFAULT_RC_PORT
}

fn default_rc_interface() -> String {
    "rc".to_string()
}

fn default_restart_delay_ms() -> u64 {
    1000
}

fn default_control_timeout_ms() -> u64 {
    300
}

fn default_video_extensions() -> Vec<String> {
    ["avi", "mov", "mkv", "mp4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_i2c_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_i2c_address() -> u8 {
    0x70
}

fn default_display_width() -> usize {
    4
}

fn default_scroll_ms() -> u64 {
    300
}

fn default_overlay_ms() -> u64 {
    2000
}

fn default_gpio_chip() -> PathBuf {
    PathBuf::from("/dev/gpiochip0")
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_pin_next_folder() -> u32 {
    21
}

fn default_pin_next_track() -> u32 {
    26
}

fn default_pin_pause() -> u32 {
    20
}

fn default_pin_audio_track() -> u32 {
    19
}

fn default_pin_seek_forward() -> u32 {
    16
}

fn default_pin_seek_back() -> u32 {
    13
}

fn default_tick_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_seek_seconds() -> i64 {
    10
}

fn default_mixer_control() -> String {
    "PCM".to_string()
}

fn default_volume() -> u8 {
    25
}

impl Config {
    /// Load the config file, writing the defaults out on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &std::path::Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => platform::config_dir().join("config.toml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.player.rc_port, 4212);
        assert_eq!(config.player.mode, PlaybackMode::Folder);
        assert!(!config.player.kill_player_on_exit);
        assert_eq!(config.display.width, 4);
        assert_eq!(config.buttons.pins.next_folder, 21);
        assert_eq!(config.audio.default_volume, 25);
        assert_eq!(
            config.paths.player_log_path(),
            PathBuf::from("/media/pi/USB/nonstoptv_vlc.log")
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [player]
            mode = "playlist"

            [loop]
            tick_ms = 50

            [media]
            audio_extensions = ["mp3"]
            "#,
        )
        .unwrap();
        assert_eq!(config.player.mode, PlaybackMode::Playlist);
        assert_eq!(config.player.binary, "vlc");
        assert_eq!(config.event_loop.tick_ms, 50);
        assert_eq!(config.event_loop.poll_interval_ms, 1000);
        assert_eq!(config.media.audio_extensions, vec!["mp3".to_string()]);
        assert_eq!(config.media.video_extensions.len(), 4);
    }

    #[test]
    fn test_load_writes_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.display.backend, DisplayBackend::Ht16k33);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.paths.media_root, config.paths.media_root);
    }
}
