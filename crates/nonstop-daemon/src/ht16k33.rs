//! HT16K33 driving a 4-digit 14-segment alphanumeric backpack over I2C.

use embedded_hal::i2c::I2c;

use crate::display::SegmentDisplay;

pub const DIGITS: usize = 4;
pub const MAX_BRIGHTNESS: u8 = 15;

const CMD_OSCILLATOR_ON: u8 = 0x21;
const CMD_DISPLAY_ON: u8 = 0x81;
const CMD_DIMMING: u8 = 0xE0;

/// Segment bits: A..F = 0..5, G1 = 6, G2 = 7, H..N = 8..13, DP = 14.
pub fn glyph(c: char) -> u16 {
    match c.to_ascii_uppercase() {
        '0' => 0x0C3F,
        '1' => 0x0006,
        '2' => 0x00DB,
        '3' => 0x008F,
        '4' => 0x00E6,
        '5' => 0x2069,
        '6' => 0x00FD,
        '7' => 0x0007,
        '8' => 0x00FF,
        '9' => 0x00EF,
        'A' => 0x00F7,
        'B' => 0x128F,
        'C' => 0x0039,
        'D' => 0x120F,
        'E' => 0x00F9,
        'F' => 0x0071,
        'G' => 0x00BD,
        'H' => 0x00F6,
        'I' => 0x1209,
        'J' => 0x001E,
        'K' => 0x2470,
        'L' => 0x0038,
        'M' => 0x0536,
        'N' => 0x2136,
        'O' => 0x003F,
        'P' => 0x00F3,
        'Q' => 0x203F,
        'R' => 0x20F3,
        'S' => 0x00ED,
        'T' => 0x1201,
        'U' => 0x003E,
        'V' => 0x0C30,
        'W' => 0x2836,
        'X' => 0x2D00,
        'Y' => 0x1500,
        'Z' => 0x0C09,
        '+' => 0x12C0,
        '-' => 0x00C0,
        '.' => 0x4000,
        '/' => 0x0C00,
        '_' => 0x0008,
        _ => 0x0000,
    }
}

pub struct Ht16k33<B> {
    bus: B,
    address: u8,
}

impl<B: I2c> Ht16k33<B> {
    /// Start the oscillator and switch the display on (no blink).
    pub fn new(mut bus: B, address: u8) -> Result<Self, B::Error> {
        bus.write(address, &[CMD_OSCILLATOR_ON])?;
        bus.write(address, &[CMD_DISPLAY_ON])?;
        Ok(Self { bus, address })
    }

    /// Display RAM image for up to four characters, starting at address 0.
    fn encode(frame: &str) -> [u8; 1 + 2 * DIGITS] {
        let mut buf = [0u8; 1 + 2 * DIGITS];
        for (i, c) in frame.chars().take(DIGITS).enumerate() {
            let [lo, hi] = glyph(c).to_le_bytes();
            buf[1 + 2 * i] = lo;
            buf[2 + 2 * i] = hi;
        }
        buf
    }
}

impl<B> SegmentDisplay for Ht16k33<B>
where
    B: I2c,
    B::Error: std::fmt::Debug,
{
    fn width(&self) -> usize {
        DIGITS
    }

    fn write_frame(&mut self, frame: &str) -> anyhow::Result<()> {
        self.bus
            .write(self.address, &Self::encode(frame))
            .map_err(|e| anyhow::anyhow!("i2c write: {:?}", e))
    }

    fn max_brightness(&self) -> u8 {
        MAX_BRIGHTNESS
    }

    fn set_brightness(&mut self, level: u8) -> anyhow::Result<()> {
        self.bus
            .write(self.address, &[CMD_DIMMING | level.min(MAX_BRIGHTNESS)])
            .map_err(|e| anyhow::anyhow!("i2c write: {:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, Operation};

    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for RecordingBus {
        type Error = std::convert::Infallible;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_init_sequence() {
        let dev = Ht16k33::new(RecordingBus::default(), 0x70).unwrap();
        assert_eq!(
            dev.bus.writes,
            vec![(0x70, vec![0x21]), (0x70, vec![0x81])]
        );
    }

    #[test]
    fn test_frame_encoding() {
        let mut dev = Ht16k33::new(RecordingBus::default(), 0x71).unwrap();
        dev.write_frame("A1- ").unwrap();
        let (addr, bytes) = dev.bus.writes.last().unwrap().clone();
        assert_eq!(addr, 0x71);
        assert_eq!(bytes, vec![0x00, 0xF7, 0x00, 0x06, 0x00, 0xC0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_brightness_is_clamped() {
        let mut dev = Ht16k33::new(RecordingBus::default(), 0x70).unwrap();
        dev.set_brightness(8).unwrap();
        dev.set_brightness(200).unwrap();
        let tail: Vec<_> = dev.bus.writes[2..].iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(tail, vec![vec![0xE8], vec![0xEF]]);
    }

    #[test]
    fn test_unknown_characters_blank() {
        assert_eq!(glyph('é'), 0);
        assert_eq!(glyph('?'), 0);
        assert_eq!(glyph('s'), glyph('S'));
    }
}
