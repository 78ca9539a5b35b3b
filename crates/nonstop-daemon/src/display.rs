//! Text on a narrow segment display.
//!
//! ```text
//!   show("SIMPSONS")          width 4, padded "    SIMPSONS    "
//!
//!   pos 0  "    "   pos 4  "SIMP"   pos 11 "S   "
//!   pos 1  "   S"   ...             pos 12 → wraps to 0
//! ```
//!
//! Text that fits is shown steady.  Longer text scrolls one character per
//! cadence interval through a buffer padded with `width` blanks on each side.
//! A temporary overlay (seek feedback) replaces the text until its deadline;
//! the event loop then puts the steady text back.

use std::time::{Duration, Instant};

use nonstop_proto::state::scale_brightness;
use tracing::{debug, info, warn};

/// A fixed-width character device.
pub trait SegmentDisplay {
    fn width(&self) -> usize;
    /// `frame` always has exactly `width()` characters.
    fn write_frame(&mut self, frame: &str) -> anyhow::Result<()>;
    /// Highest native brightness level.
    fn max_brightness(&self) -> u8;
    fn set_brightness(&mut self, level: u8) -> anyhow::Result<()>;
}

/// Fallback backend that only logs frame changes.
pub struct LogDisplay {
    width: usize,
}

impl LogDisplay {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }
}

impl SegmentDisplay for LogDisplay {
    fn width(&self) -> usize {
        self.width
    }

    fn write_frame(&mut self, frame: &str) -> anyhow::Result<()> {
        debug!("display: [{}]", frame);
        Ok(())
    }

    fn max_brightness(&self) -> u8 {
        15
    }

    fn set_brightness(&mut self, level: u8) -> anyhow::Result<()> {
        debug!("display: brightness {}", level);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Steady,
    Scrolling {
        padded: Vec<char>,
        position: usize,
        next_step: Instant,
    },
}

pub struct DisplayController {
    device: Box<dyn SegmentDisplay>,
    width: usize,
    cadence: Duration,
    text: String,
    mode: Mode,
    overlay_until: Option<Instant>,
    frame: String,
    device_failed: bool,
}

impl DisplayController {
    pub fn new(device: Box<dyn SegmentDisplay>, cadence: Duration) -> Self {
        let width = device.width().max(1);
        Self {
            device,
            width,
            cadence,
            text: String::new(),
            mode: Mode::Steady,
            overlay_until: None,
            frame: String::new(),
            device_failed: false,
        }
    }

    /// Replace the text.  Clears any overlay.
    pub fn show(&mut self, text: &str, now: Instant) {
        self.overlay_until = None;
        self.set_text(text, now);
    }

    /// Show `text` until `now + duration`.
    pub fn show_temporary(&mut self, text: &str, duration: Duration, now: Instant) {
        self.set_text(text, now);
        self.overlay_until = Some(now + duration);
    }

    fn set_text(&mut self, text: &str, now: Instant) {
        let text = text.to_uppercase();
        let len = text.chars().count();
        self.mode = if len <= self.width {
            Mode::Steady
        } else {
            let blanks = std::iter::repeat(' ').take(self.width);
            Mode::Scrolling {
                padded: blanks.clone().chain(text.chars()).chain(blanks).collect(),
                position: 0,
                next_step: now + self.cadence,
            }
        };
        self.text = text;
        self.render();
    }

    /// Advance the scroll by at most one step.
    pub fn tick(&mut self, now: Instant) {
        let width = self.width;
        let cadence = self.cadence;
        let Mode::Scrolling {
            padded,
            position,
            next_step,
        } = &mut self.mode
        else {
            return;
        };
        if now < *next_step {
            return;
        }
        *position = (*position + 1) % (padded.len() - width);
        *next_step = now + cadence;
        self.render();
    }

    pub fn is_overlay_active(&self, now: Instant) -> bool {
        self.overlay_until.is_some_and(|until| now < until)
    }

    /// True once an overlay has passed its deadline and has not been
    /// cleared yet.
    pub fn overlay_expired(&self, now: Instant) -> bool {
        self.overlay_until.is_some_and(|until| now >= until)
    }

    pub fn clear_overlay(&mut self) {
        self.overlay_until = None;
    }

    /// Uppercased logical text.
    #[cfg(test)]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// What the device currently shows.
    #[cfg(test)]
    pub fn frame(&self) -> &str {
        &self.frame
    }

    #[cfg(test)]
    pub fn is_scrolling(&self) -> bool {
        matches!(self.mode, Mode::Scrolling { .. })
    }

    /// `percent` in 0..=100, scaled to the device range.
    pub fn set_brightness(&mut self, percent: u8) {
        let level = scale_brightness(percent, self.device.max_brightness());
        info!("display: brightness {}% -> {}", percent, level);
        if let Err(e) = self.device.set_brightness(level) {
            warn!("display: set brightness failed: {:#}", e);
        }
    }

    pub fn blank(&mut self) {
        self.overlay_until = None;
        self.set_text("", Instant::now());
    }

    fn render(&mut self) {
        let frame: String = match &self.mode {
            Mode::Steady => format!("{:<width$}", self.text, width = self.width),
            Mode::Scrolling {
                padded, position, ..
            } => padded[*position..*position + self.width].iter().collect(),
        };
        if frame == self.frame {
            return;
        }

        match self.device.write_frame(&frame) {
            Ok(()) => {
                if self.device_failed {
                    info!("display: device recovered");
                    self.device_failed = false;
                }
            }
            Err(e) if !self.device_failed => {
                warn!("display: write failed: {:#}", e);
                self.device_failed = true;
            }
            Err(e) => debug!("display: write failed: {:#}", e),
        }
        self.frame = frame;
    }
}
