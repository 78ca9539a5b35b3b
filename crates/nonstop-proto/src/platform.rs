use std::path::{Path, PathBuf};

/// Loopback host VLC's rc interface listens on.
pub const RC_HOST: &str = "127.0.0.1";

/// Default rc interface port.
pub const DEFAULT_RC_PORT: u16 = 4212;

/// Loopback port held for the lifetime of the daemon so a second instance
/// fails fast instead of fighting over the player and the GPIO lines.
pub const INSTANCE_LOCK_PORT: u16 = 9877;

/// Environment override for the config file location.
pub const CONFIG_ENV: &str = "NONSTOP_CONFIG";

pub fn rc_address(port: u16) -> String {
    format!("{}:{}", RC_HOST, port)
}

pub fn data_dir() -> PathBuf {
    // ~/.local/share/nonstop (XDG), falling back to /tmp when HOME is unset
    // (e.g. started from an init script before the session exists)
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("nonstop")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("nonstop")
}

pub fn vlc_binary_name() -> &'static str {
    "vlc"
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Resolve the player binary.
///
/// An absolute or relative path containing a separator is used as-is when it
/// exists; a bare name is searched on `PATH`.
pub fn find_player_binary(configured: &str) -> Option<PathBuf> {
    let name = if configured.is_empty() {
        vlc_binary_name()
    } else {
        configured
    };

    if name.contains('/') {
        let p = PathBuf::from(name);
        return p.exists().then_some(p);
    }

    find_on_path(name)
}

/// X11 socket for a `DISPLAY` value like `:0` or `:0.0`.
///
/// Returns `None` for remote or malformed displays, in which case there is
/// nothing local to wait for.
pub fn x11_socket_for(display: &str) -> Option<PathBuf> {
    let rest = display.strip_prefix(':')?;
    let number = rest.split('.').next()?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(Path::new("/tmp/.X11-unix").join(format!("X{}", number)))
}
