mod bootstrap;
mod core;
mod display;
mod ht16k33;
mod input;
mod player;

use std::time::{Duration, Instant};

use nonstop_proto::config::{ButtonsConfig, Config, DisplayBackend, DisplayConfig};
use nonstop_proto::library::PlayableExtensions;
use nonstop_proto::platform;
use nonstop_proto::state::{Settings, StateStore};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::display::{DisplayController, LogDisplay, SegmentDisplay};
use crate::input::{InputSource, NoButtons};
use crate::player::VlcDriver;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // File log under the data dir, mirrored to stderr for the journal
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("nonstop.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nonstop=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let _lock = bootstrap::InstanceLock::acquire(platform::INSTANCE_LOCK_PORT)?;

    let media_root = config.paths.media_root.clone();
    let exts = PlayableExtensions::from_config(&config.media);
    bootstrap::wait_for_media(&media_root, bootstrap::MEDIA_RETRY).await;
    let folders = bootstrap::wait_for_folders(&media_root, &exts, bootstrap::FOLDER_RETRY).await;

    let mut store = StateStore::open_or_empty(&config.paths.state_file);
    let settings = Settings::load(&mut store, config.audio.default_volume);

    bootstrap::wait_for_display_session(bootstrap::DISPLAY_SESSION_TIMEOUT).await;
    bootstrap::set_mixer_volume(&config.audio.mixer_control, settings.volume).await;

    let display = DisplayController::new(
        open_display(&config.display),
        Duration::from_millis(config.display.scroll_ms),
    );
    let player = VlcDriver::new(&config.player, config.paths.player_log_path());

    let mut kiosk = core::KioskCore::new(
        &config,
        folders,
        store,
        settings,
        player,
        display,
        open_buttons(&config.buttons),
    );
    kiosk.start(Instant::now()).await;

    info!("Kiosk initialised, running event loop");
    kiosk.run(shutdown_signal()).await
}

fn open_display(config: &DisplayConfig) -> Box<dyn SegmentDisplay> {
    match config.backend {
        DisplayBackend::Log => Box::new(LogDisplay::new(config.width)),
        DisplayBackend::Ht16k33 => match open_ht16k33(config) {
            Ok(display) => display,
            Err(e) => {
                warn!("display: {:#}, logging frames instead", e);
                Box::new(LogDisplay::new(config.width))
            }
        },
    }
}

#[cfg(target_os = "linux")]
fn open_ht16k33(config: &DisplayConfig) -> anyhow::Result<Box<dyn SegmentDisplay>> {
    use anyhow::Context;

    let bus = linux_embedded_hal::I2cdev::new(&config.i2c_bus)
        .with_context(|| format!("open {}", config.i2c_bus.display()))?;
    let device = ht16k33::Ht16k33::new(bus, config.i2c_address).map_err(|e| {
        anyhow::anyhow!("HT16K33 at {:#04x} not responding: {:?}", config.i2c_address, e)
    })?;
    info!(
        "display: HT16K33 at {:#04x} on {}",
        config.i2c_address,
        config.i2c_bus.display()
    );
    Ok(Box::new(device))
}

#[cfg(not(target_os = "linux"))]
fn open_ht16k33(_config: &DisplayConfig) -> anyhow::Result<Box<dyn SegmentDisplay>> {
    anyhow::bail!("I2C displays are only supported on Linux")
}

#[cfg(target_os = "linux")]
fn open_buttons(config: &ButtonsConfig) -> Box<dyn InputSource> {
    match input::GpioButtons::open(&config.gpio_chip, &config.pins) {
        Ok(buttons) => Box::new(buttons),
        Err(e) => {
            warn!("input: {:#}, buttons disabled", e);
            Box::new(NoButtons)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn open_buttons(_config: &ButtonsConfig) -> Box<dyn InputSource> {
    warn!("input: GPIO is only supported on Linux, buttons disabled");
    Box::new(NoButtons)
}

/// Resolves on SIGTERM (systemd stop) or Ctrl-C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot install SIGTERM handler: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
