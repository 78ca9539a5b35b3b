//! VLC process supervisor and rc-interface client.
//!
//! ```text
//!   VlcDriver
//!     ├── process      ← at most one vlc child, killed before every respawn
//!     └── send_command ← short-lived loopback TCP connection per command:
//!                          connect → "<cmd>\nlogout\n" → read until EOF/timeout
//! ```
//!
//! Every control-socket failure degrades to an empty reply; the event loop
//! treats that as "unknown" and asks again on its next poll.  A multi-command
//! query (status, seek) runs under one overall budget of twice the control
//! timeout, so a stalled player costs the loop at most that long per poll.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nonstop_proto::config::PlayerConfig;
use nonstop_proto::platform;
use nonstop_proto::protocol::{
    self, CMD_CYCLE_AUDIO_TRACK, CMD_GET_TIME, CMD_INFO, CMD_NEXT, CMD_PAUSE, CMD_PLAYLIST,
    CMD_STATUS,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// What a status poll could learn.  `None` means the player did not say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub file_name: Option<String>,
    pub paused: Option<bool>,
}

/// What the event loop needs from the player.  Implemented by [`VlcDriver`]
/// and by the fake player in the loop tests.
#[allow(async_fn_in_trait)]
pub trait PlayerControl {
    /// Loop every playable file of `folder`, optionally shuffled by the player.
    async fn start_folder(&mut self, folder: &Path, shuffle: bool) -> anyhow::Result<()>;
    /// Play a single file and exit when it ends.
    async fn start_file(&mut self, file: &Path) -> anyhow::Result<()>;
    fn is_alive(&mut self) -> bool;
    async fn status(&self) -> PlayerStatus;
    async fn current_file_name(&self) -> Option<String> {
        self.status().await.file_name
    }
    /// Not paused unless the player says so.
    async fn is_paused(&self) -> bool {
        self.status().await.paused.unwrap_or(false)
    }
    async fn toggle_pause(&self);
    /// Skip to the next item of the player's own playlist.
    async fn next_item(&self);
    async fn cycle_audio_track(&self);
    async fn seek_relative(&self, secs: i64);
    async fn shutdown(&mut self);
}

pub struct VlcDriver {
    binary: String,
    rc_interface: String,
    rc_addr: String,
    extra_args: Vec<String>,
    restart_delay: Duration,
    control_timeout: Duration,
    log_path: PathBuf,
    process: Option<tokio::process::Child>,
}

impl VlcDriver {
    pub fn new(config: &PlayerConfig, log_path: PathBuf) -> Self {
        Self {
            binary: config.binary.clone(),
            rc_interface: config.rc_interface.clone(),
            rc_addr: platform::rc_address(config.rc_port),
            extra_args: config.extra_args.clone(),
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            control_timeout: Duration::from_millis(config.control_timeout_ms),
            log_path,
            process: None,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--fullscreen",
            "--no-video-title-show",
            "--extraintf",
            self.rc_interface.as_str(),
            "--rc-host",
            self.rc_addr.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn folder_args(&self, folder: &Path, shuffle: bool) -> Vec<String> {
        let mut args = vec!["--loop".to_string()];
        if shuffle {
            args.push("--random".to_string());
        }
        args.extend(self.base_args());
        args.push(folder.display().to_string());
        args
    }

    pub fn file_args(&self, file: &Path) -> Vec<String> {
        let mut args = vec!["--play-and-exit".to_string()];
        args.extend(self.base_args());
        args.push(file.display().to_string());
        args
    }

    /// Stop whatever is playing and give the OS time to release the rc port
    /// and the video device.
    async fn terminate(&mut self) {
        let stopped = match self.process.take() {
            Some(mut child) => {
                debug!("player: killing pid={:?}", child.id());
                if let Err(e) = child.kill().await {
                    warn!("player: kill failed: {}", e);
                }
                true
            }
            // A player left running by a previous daemon run still owns the
            // rc port; ask it to quit.
            None => self.quit_orphan().await,
        };
        if stopped {
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    async fn quit_orphan(&self) -> bool {
        let Ok(Ok(mut stream)) =
            timeout(self.control_timeout, TcpStream::connect(&self.rc_addr)).await
        else {
            return false;
        };
        info!("player: asking orphaned player on {} to quit", self.rc_addr);
        stream.write_all(b"quit\n").await.is_ok()
    }

    async fn spawn(&mut self, args: Vec<String>) -> anyhow::Result<()> {
        self.terminate().await;

        let binary = platform::find_player_binary(&self.binary)
            .ok_or_else(|| anyhow::anyhow!("player binary {:?} not found", self.binary))?;

        let (stdout, stderr) = self.open_log(&binary, &args);
        let child = tokio::process::Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn {}: {}", binary.display(), e))?;

        info!("player: started pid={:?}", child.id());
        self.process = Some(child);
        Ok(())
    }

    /// Append a header to the player log and hand out its stdio handles.
    /// Falls back to discarding output when the log can't be opened.
    fn open_log(&self, binary: &Path, args: &[String]) -> (Stdio, Stdio) {
        use std::io::Write;

        let opened = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut log| {
                let header = format!(
                    "\n--- {} START VLC: {} {} ---\n",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    binary.display(),
                    args.join(" ")
                );
                log.write_all(header.as_bytes())?;
                let err = log.try_clone()?;
                Ok((Stdio::from(log), Stdio::from(err)))
            });

        match opened {
            Ok(handles) => handles,
            Err(e) => {
                warn!("player: cannot open log {}: {}", self.log_path.display(), e);
                (Stdio::null(), Stdio::null())
            }
        }
    }

    fn query_budget(&self) -> Duration {
        self.control_timeout * 2
    }

    /// Name from `status`, then `info`, then `playlist`.  An empty reply
    /// means the player is unreachable or silent, so the chain stops there.
    async fn query_status(&self) -> PlayerStatus {
        let status = self.send_command(CMD_STATUS, true).await;
        let paused = protocol::parse_pause_state(&status);
        let mut file_name = protocol::parse_status_file_name(&status);
        if file_name.is_none() && !status.is_empty() {
            let info = self.send_command(CMD_INFO, true).await;
            file_name = protocol::parse_info_file_name(&info);
            if file_name.is_none() && !info.is_empty() {
                let playlist = self.send_command(CMD_PLAYLIST, true).await;
                file_name = protocol::parse_playlist_file_name(&playlist);
            }
        }
        PlayerStatus { file_name, paused }
    }

    /// Send one rc command.  Returns the collected reply, or an empty string
    /// when no reply was expected or the player could not be reached.
    pub async fn send_command(&self, cmd: &str, expect_reply: bool) -> String {
        match self.exchange(cmd, expect_reply).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!("player: rc {:?} failed: {}", cmd, e);
                String::new()
            }
        }
    }

    async fn exchange(&self, cmd: &str, expect_reply: bool) -> anyhow::Result<String> {
        let mut stream = timeout(self.control_timeout, TcpStream::connect(&self.rc_addr))
            .await
            .map_err(|_| anyhow::anyhow!("connect timeout"))??;

        // `logout` makes vlc close the socket once the command is answered,
        // so the read below ends on EOF instead of the timeout.
        stream
            .write_all(format!("{}\nlogout\n", cmd).as_bytes())
            .await?;
        if !expect_reply {
            return Ok(String::new());
        }

        let deadline = Instant::now() + self.control_timeout;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) if buf.is_empty() => return Err(e.into()),
                Ok(Err(_)) | Err(_) => break,
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl PlayerControl for VlcDriver {
    async fn start_folder(&mut self, folder: &Path, shuffle: bool) -> anyhow::Result<()> {
        info!("player: folder {} (shuffle={})", folder.display(), shuffle);
        let args = self.folder_args(folder, shuffle);
        self.spawn(args).await
    }

    async fn start_file(&mut self, file: &Path) -> anyhow::Result<()> {
        info!("player: file {}", file.display());
        let args = self.file_args(file);
        self.spawn(args).await
    }

    fn is_alive(&mut self) -> bool {
        match self.process.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("player: exited with {}", status);
                self.process = None;
                false
            }
            Some(Err(e)) => {
                error!("player: try_wait failed: {}", e);
                false
            }
            None => false,
        }
    }

    async fn status(&self) -> PlayerStatus {
        match timeout(self.query_budget(), self.query_status()).await {
            Ok(status) => status,
            Err(_) => {
                debug!("player: status query exceeded {:?}", self.query_budget());
                PlayerStatus::default()
            }
        }
    }

    async fn toggle_pause(&self) {
        self.send_command(CMD_PAUSE, false).await;
    }

    async fn next_item(&self) {
        self.send_command(CMD_NEXT, false).await;
    }

    async fn cycle_audio_track(&self) {
        self.send_command(CMD_CYCLE_AUDIO_TRACK, false).await;
    }

    async fn seek_relative(&self, secs: i64) {
        let seek = async {
            let reply = self.send_command(CMD_GET_TIME, true).await;
            match protocol::parse_time(&reply) {
                Some(now) => {
                    self.send_command(&protocol::seek_command(now + secs), false)
                        .await;
                }
                None => debug!("player: position unknown, seek {:+} dropped", secs),
            }
        };
        if timeout(self.query_budget(), seek).await.is_err() {
            debug!("player: seek {:+} exceeded {:?}", secs, self.query_budget());
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut child) = self.process.take() {
            info!("player: stopping pid={:?}", child.id());
            if let Err(e) = child.kill().await {
                warn!("player: kill failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal rc server: answers each command from `replies`, closes on
    /// `logout`, and records everything it was sent.
    async fn fake_rc(
        replies: Vec<(&'static str, &'static str)>,
    ) -> (u16, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let _ = write.write_all(b"VLC media player 3.0.18 Vetinari\n> ").await;
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send(line.clone());
                    if line == "logout" {
                        break;
                    }
                    if let Some((_, reply)) = replies.iter().find(|(c, _)| *c == line) {
                        let _ = write.write_all(reply.as_bytes()).await;
                    }
                }
            }
        });
        (port, rx)
    }

    fn driver(port: u16) -> VlcDriver {
        let config = PlayerConfig {
            rc_port: port,
            restart_delay_ms: 0,
            control_timeout_ms: 300,
            ..PlayerConfig::default()
        };
        VlcDriver::new(&config, PathBuf::from("/tmp/nonstop-test-player.log"))
    }

    #[test]
    fn test_folder_args() {
        let d = driver(4212);
        let args = d.folder_args(Path::new("/media/pi/USB/Simpsons"), true);
        assert_eq!(
            args,
            vec![
                "--loop",
                "--random",
                "--fullscreen",
                "--no-video-title-show",
                "--extraintf",
                "rc",
                "--rc-host",
                "127.0.0.1:4212",
                "/media/pi/USB/Simpsons",
            ]
        );
        assert!(!d.folder_args(Path::new("/x"), false).contains(&"--random".to_string()));
    }

    #[test]
    fn test_file_args() {
        let d = driver(4212);
        let args = d.file_args(Path::new("/media/pi/USB/Show/ep 1.mp4"));
        assert_eq!(args.first().map(String::as_str), Some("--play-and-exit"));
        assert_eq!(args.last().map(String::as_str), Some("/media/pi/USB/Show/ep 1.mp4"));
    }

    #[tokio::test]
    async fn test_current_file_name_from_status() {
        let (port, _rx) = fake_rc(vec![(
            "status",
            "( new input: file:///media/pi/USB/Show/ep%201.mp4 )\n( state playing )\n> ",
        )])
        .await;
        let d = driver(port);
        assert_eq!(d.current_file_name().await.as_deref(), Some("ep 1.mp4"));
        assert!(!d.is_paused().await);
        assert_eq!(
            d.status().await,
            PlayerStatus {
                file_name: Some("ep 1.mp4".to_string()),
                paused: Some(false),
            }
        );
    }

    #[tokio::test]
    async fn test_paused_state_from_status() {
        let (port, _rx) = fake_rc(vec![(
            "status",
            "( new input: file:///media/pi/USB/Show/ep2.mp4 )\n( state paused )\n> ",
        )])
        .await;
        let d = driver(port);
        assert!(d.is_paused().await);
        assert_eq!(d.status().await.paused, Some(true));
    }

    #[tokio::test]
    async fn test_silent_player_query_is_bounded() {
        // accepts connections but never writes a byte
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let d = driver(port);

        let started = std::time::Instant::now();
        assert_eq!(d.status().await, PlayerStatus::default());
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(700), "took {:?}", elapsed);

        let started = std::time::Instant::now();
        d.seek_relative(10).await;
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_current_file_name_falls_back_to_playlist() {
        let (port, _rx) = fake_rc(vec![
            ("status", "( state stopped )\n"),
            ("info", "+----[ end of stream info ]\n"),
            ("playlist", "| 1 - Playlist\n|   *2 - Folge 3.mkv (00:24:00)\n"),
        ])
        .await;
        let d = driver(port);
        assert_eq!(d.current_file_name().await.as_deref(), Some("Folge 3.mkv"));
    }

    #[tokio::test]
    async fn test_unreachable_player_is_unknown() {
        // bind and drop to get a port nobody listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let d = driver(port);
        assert_eq!(d.send_command("status", true).await, "");
        assert_eq!(d.current_file_name().await, None);
        assert!(!d.is_paused().await);
    }

    #[tokio::test]
    async fn test_seek_relative_uses_current_time() {
        let (port, mut rx) = fake_rc(vec![("get_time", "> 95\n")]).await;
        let d = driver(port);
        d.seek_relative(-10).await;

        let mut seen = Vec::new();
        while let Ok(Some(line)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            seen.push(line);
            if seen.iter().any(|l| l.starts_with("seek")) {
                break;
            }
        }
        assert!(seen.contains(&"seek 85".to_string()), "{:?}", seen);
    }

    #[tokio::test]
    async fn test_shutdown_kills_child() {
        let mut d = driver(4212);
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        d.process = Some(child);
        assert!(d.is_alive());
        d.shutdown().await;
        assert!(d.process.is_none());
        assert!(!d.is_alive());
        // nothing left to stop
        d.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_driver_idle() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let config = PlayerConfig {
            binary: "/nonexistent/vlc".to_string(),
            rc_port: port,
            restart_delay_ms: 0,
            ..PlayerConfig::default()
        };
        let mut d = VlcDriver::new(&config, PathBuf::from("/tmp/nonstop-test-player.log"));
        assert!(d.start_folder(Path::new("/tmp"), false).await.is_err());
        assert!(!d.is_alive());
    }
}
