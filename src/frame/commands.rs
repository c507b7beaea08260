//! ESC/POS style opcodes used by the built-in print jobs.
//!
//! Each helper returns operands rather than bytes so that callers can mix them with text and
//! numeric fields in a single frame.

use crate::frame::operand::Operand;
use crate::operands;

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const BEL: u8 = 0x07;

/// Line terminator expected by the firmware.
pub const CRLF: &str = "\r\n";

/// `ESC @`: reset the printer to its power-on state.
pub fn init() -> Vec<Operand> {
    operands![ESC, 0x40]
}

/// `GS a n`: automatic status back; `0xff` enables every report.
pub fn status_back(mask: u8) -> Vec<Operand> {
    operands![GS, 0x61, mask]
}

/// `ESC STX`: leave page mode.
pub fn standard_mode() -> Vec<Operand> {
    operands![ESC, 0x02]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left = 0,
    Center = 1,
    Right = 2,
}

/// `ESC a n`
pub fn align(alignment: Alignment) -> Vec<Operand> {
    operands![ESC, 0x61, alignment as u8]
}

/// `GS ! n`: character size, width multiplier in the high nibble, height in the low nibble.
/// Both multipliers are 1-based and limited to 8.
pub fn char_size(width: u8, height: u8) -> Vec<Operand> {
    let width = width.clamp(1, 8) - 1;
    let height = height.clamp(1, 8) - 1;
    operands![GS, 0x21, (width << 4) | height]
}

/// `ESC J n`: print the buffer and feed `dots` dot lines.
pub fn feed_dots(dots: u8) -> Vec<Operand> {
    operands![ESC, 0x4A, dots]
}

/// `ESC m`: partial cut.
pub fn partial_cut() -> Vec<Operand> {
    operands![ESC, "m"]
}

/// `GS BEL t n m`: sound the buzzer `count` times with on/off times in 100 ms units.
pub fn buzzer(count: u8, on: u8, off: u8) -> Vec<Operand> {
    operands![GS, BEL, count, on, off]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;

    #[test]
    fn char_size_packs_nibbles() {
        assert_eq!(encode(&char_size(1, 1)).unwrap(), vec![GS, 0x21, 0x00]);
        assert_eq!(encode(&char_size(2, 2)).unwrap(), vec![GS, 0x21, 0x11]);
        assert_eq!(encode(&char_size(5, 5)).unwrap(), vec![GS, 0x21, 0x44]);
        assert_eq!(encode(&char_size(0, 9)).unwrap(), vec![GS, 0x21, 0x07]);
    }

    #[test]
    fn partial_cut_is_esc_m() {
        assert_eq!(encode(&partial_cut()).unwrap(), vec![0x1B, b'm']);
    }

    #[test]
    fn buzzer_frame() {
        assert_eq!(encode(&buzzer(1, 1, 1)).unwrap(), vec![0x1d, 0x07, 1, 1, 1]);
    }
}
