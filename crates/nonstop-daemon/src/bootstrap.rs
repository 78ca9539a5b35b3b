//! Startup gates run before the event loop: the drive, the folders on it,
//! the X session the player renders into, and the mixer volume.

use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use nonstop_proto::library::{self, PlayableExtensions};
use nonstop_proto::platform;
use tracing::{debug, info, warn};

pub const MEDIA_RETRY: Duration = Duration::from_secs(1);
pub const FOLDER_RETRY: Duration = Duration::from_secs(2);
pub const DISPLAY_SESSION_TIMEOUT: Duration = Duration::from_secs(20);

/// Held for the daemon's lifetime; dropping it releases the port.
pub struct InstanceLock {
    _listener: TcpListener,
}

impl InstanceLock {
    pub fn acquire(port: u16) -> anyhow::Result<Self> {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                debug!("bootstrap: instance lock on port {}", port);
                Ok(Self {
                    _listener: listener,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                bail!("another instance is already running (port {} in use)", port)
            }
            Err(e) => bail!("instance lock on port {}: {}", port, e),
        }
    }
}

/// Mounted and non-empty.
pub fn media_ready(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub async fn wait_for_media(root: &Path, retry: Duration) {
    let mut announced = false;
    while !media_ready(root) {
        if !announced {
            info!("bootstrap: waiting for media at {}", root.display());
            announced = true;
        }
        tokio::time::sleep(retry).await;
    }
    info!("bootstrap: media at {}", root.display());
}

/// Rescan until at least one folder holds playable files.
pub async fn wait_for_folders(
    root: &Path,
    exts: &PlayableExtensions,
    retry: Duration,
) -> Vec<String> {
    loop {
        let folders = library::scan(root, exts);
        if !folders.is_empty() {
            info!("bootstrap: {} folders: {:?}", folders.len(), folders);
            return folders;
        }
        warn!(
            "bootstrap: no playable folders under {}, retrying in {:?}",
            root.display(),
            retry
        );
        tokio::time::sleep(retry).await;
    }
}

/// Wait up to `limit` for the local X socket named by `DISPLAY`.  Returns
/// false on timeout; the player is started anyway.
pub async fn wait_for_display_session(limit: Duration) -> bool {
    let Some(socket) = std::env::var("DISPLAY")
        .ok()
        .and_then(|d| platform::x11_socket_for(&d))
    else {
        debug!("bootstrap: no local DISPLAY to wait for");
        return true;
    };

    let step = Duration::from_millis(500);
    let mut waited = Duration::ZERO;
    while !socket.exists() {
        if waited >= limit {
            warn!("bootstrap: {} missing after {:?}", socket.display(), limit);
            return false;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    true
}

pub async fn set_mixer_volume(control: &str, percent: u8) {
    let result = tokio::process::Command::new("amixer")
        .args(["-q", "set", control, &format!("{}%", percent.min(100))])
        .status()
        .await;
    match result {
        Ok(status) if status.success() => info!("bootstrap: {} volume {}%", control, percent),
        Ok(status) => warn!("bootstrap: amixer exited with {}", status),
        Err(e) => warn!("bootstrap: amixer unavailable: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_lock_is_exclusive() {
        let held = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        let err = InstanceLock::acquire(port).err().unwrap();
        assert!(err.to_string().contains("already running"), "{}", err);

        drop(held);
        assert!(InstanceLock::acquire(port).is_ok());
    }

    #[test]
    fn test_media_ready() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!media_ready(&dir.path().join("missing")));
        assert!(!media_ready(dir.path()));
        std::fs::create_dir(dir.path().join("Cartoons")).unwrap();
        assert!(media_ready(dir.path()));
    }

    #[tokio::test]
    async fn test_wait_for_folders_returns_once_populated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Movies")).unwrap();
        std::fs::write(dir.path().join("Movies/film.mp4"), b"x").unwrap();
        let exts = PlayableExtensions::new(["mp4"]);
        let folders = wait_for_folders(dir.path(), &exts, Duration::from_millis(10)).await;
        assert_eq!(folders, vec!["Movies".to_string()]);
    }
}
