//! Front-panel buttons: GPIO lines sampled once per loop tick, with
//! per-button debouncing.

use std::time::{Duration, Instant};

use nonstop_proto::config::ButtonPins;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    NextFolder,
    NextTrack,
    Pause,
    AudioTrack,
    SeekForward,
    SeekBack,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::NextFolder,
        Button::NextTrack,
        Button::Pause,
        Button::AudioTrack,
        Button::SeekForward,
        Button::SeekBack,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Button::NextFolder => "next-folder",
            Button::NextTrack => "next-track",
            Button::Pause => "pause",
            Button::AudioTrack => "audio-track",
            Button::SeekForward => "seek-forward",
            Button::SeekBack => "seek-back",
        }
    }

    pub fn pin(self, pins: &ButtonPins) -> u32 {
        match self {
            Button::NextFolder => pins.next_folder,
            Button::NextTrack => pins.next_track,
            Button::Pause => pins.pause,
            Button::AudioTrack => pins.audio_track,
            Button::SeekForward => pins.seek_forward,
            Button::SeekBack => pins.seek_back,
        }
    }
}

/// Raw line levels.  `true` means the button is held down.
pub trait InputSource {
    fn is_pressed(&mut self, button: Button) -> bool;
}

/// Used when no GPIO chip is available; nothing is ever pressed.
pub struct NoButtons;

impl InputSource for NoButtons {
    fn is_pressed(&mut self, _button: Button) -> bool {
        false
    }
}

#[cfg(target_os = "linux")]
pub use gpio::GpioButtons;

#[cfg(target_os = "linux")]
mod gpio {
    use std::path::Path;

    use anyhow::Context;
    use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};
    use tracing::{debug, info};

    use super::{Button, ButtonPins, InputSource};

    /// Buttons wired between the GPIO line and ground with the internal
    /// pull-up enabled, so the lines are requested active-low.
    pub struct GpioButtons {
        lines: Vec<(Button, LineHandle)>,
    }

    impl GpioButtons {
        pub fn open(chip_path: &Path, pins: &ButtonPins) -> anyhow::Result<Self> {
            let mut chip = Chip::new(chip_path)
                .with_context(|| format!("open gpio chip {}", chip_path.display()))?;

            let mut lines = Vec::with_capacity(Button::ALL.len());
            for button in Button::ALL {
                let offset = button.pin(pins);
                let handle = chip
                    .get_line(offset)
                    .and_then(|line| {
                        line.request(
                            LineRequestFlags::INPUT | LineRequestFlags::ACTIVE_LOW,
                            0,
                            "nonstop",
                        )
                    })
                    .with_context(|| format!("request line {} for {}", offset, button.label()))?;
                lines.push((button, handle));
            }

            info!("input: {} buttons on {}", lines.len(), chip_path.display());
            Ok(Self { lines })
        }
    }

    impl InputSource for GpioButtons {
        fn is_pressed(&mut self, button: Button) -> bool {
            let Some((_, handle)) = self.lines.iter().find(|(b, _)| *b == button) else {
                return false;
            };
            match handle.get_value() {
                Ok(value) => value == 1,
                Err(e) => {
                    debug!("input: read {} failed: {}", button.label(), e);
                    false
                }
            }
        }
    }
}

/// Turns sampled levels into press events.
///
/// A press fires on the released-to-held edge, at most once per `window`,
/// and never within `window` of the previous release, which swallows the
/// contact bounce on both edges.  The first sample only primes the state,
/// so a button stuck down at boot does not fire.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pressed: Option<bool>,
    last_accepted: Option<Instant>,
    last_release: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pressed: None,
            last_accepted: None,
            last_release: None,
        }
    }

    /// Feed one sample; returns `true` when it completes a press.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        let Some(was) = self.pressed.replace(pressed) else {
            return false;
        };
        if was && !pressed {
            self.last_release = Some(now);
            return false;
        }
        if was || !pressed {
            return false;
        }

        let quiet = [self.last_accepted, self.last_release]
            .into_iter()
            .flatten()
            .all(|t| now.duration_since(t) >= self.window);
        if quiet {
            self.last_accepted = Some(now);
        }
        quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(400);

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    #[test]
    fn test_first_sample_primes() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        assert!(!d.update(true, t0));
        assert!(!d.update(true, ms(t0, 100)));
        assert!(!d.update(false, ms(t0, 200)));
        assert!(d.update(true, ms(t0, 700)));
    }

    #[test]
    fn test_bouncy_press_fires_once() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.update(false, t0);

        let samples = [
            (100, true),
            (105, false),
            (110, true),
            (115, false),
            (120, true),
            (300, true),
            (1000, true),
            (1100, false),
            (1105, true),
            (1110, false),
            (1200, false),
            (1300, false),
        ];
        let fired = samples
            .iter()
            .filter(|(t, level)| d.update(*level, ms(t0, *t)))
            .count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_held_button_does_not_repeat() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.update(false, t0);
        assert!(d.update(true, ms(t0, 100)));
        for t in (200..3000).step_by(100) {
            assert!(!d.update(true, ms(t0, t)));
        }
    }

    #[test]
    fn test_separate_presses_both_fire() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.update(false, t0);
        assert!(d.update(true, ms(t0, 100)));
        assert!(!d.update(false, ms(t0, 200)));
        assert!(d.update(true, ms(t0, 700)));
        assert!(!d.update(false, ms(t0, 800)));
        // too soon after the release
        assert!(!d.update(true, ms(t0, 900)));
    }

    #[test]
    fn test_no_buttons_never_pressed() {
        let mut input = NoButtons;
        assert!(Button::ALL.iter().all(|b| !input.is_pressed(*b)));
    }

    #[test]
    fn test_default_pins() {
        let pins = ButtonPins::default();
        assert_eq!(Button::NextFolder.pin(&pins), 21);
        assert_eq!(Button::SeekBack.pin(&pins), 13);
    }
}
