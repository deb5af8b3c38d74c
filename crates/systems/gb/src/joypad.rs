//! Joypad (0xFF00)
//!
//! The game selects a button group by clearing bit 5 (A/B/Select/Start) or
//! bit 4 (directions); pressed buttons in the selected groups read as 0 in
//! bits 0-3. Any bit going from 1 to 0 requests the joypad interrupt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buttons {
    pub start: bool,
    pub select: bool,
    pub b: bool,
    pub a: bool,
    pub down: bool,
    pub up: bool,
    pub left: bool,
    pub right: bool,
    /// Host asked to stop the emulator
    pub quit: bool,
    /// Host asked to run unthrottled
    pub turbo: bool,
}

/// Supplies the current button state; polled on JOYP writes and once per frame.
pub trait InputSource: Send {
    fn poll(&mut self) -> Buttons;
}

/// No controller attached: nothing is ever pressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll(&mut self) -> Buttons {
        Buttons::default()
    }
}

impl InputSource for Buttons {
    fn poll(&mut self) -> Buttons {
        *self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joypad {
    pub buttons: Buttons,
}

impl Joypad {
    /// New JOYP value for the select bits in `joyp`, and whether the joypad
    /// interrupt fires.
    pub fn refresh(&self, joyp: u8) -> (u8, bool) {
        let select = joyp & 0x30;
        let mut state = select | 0x0F;
        let b = &self.buttons;

        if select & 0x20 == 0 {
            for (pressed, mask) in [(b.start, 0x08), (b.select, 0x04), (b.b, 0x02), (b.a, 0x01)] {
                if pressed {
                    state &= !mask;
                }
            }
        }
        if select & 0x10 == 0 {
            for (pressed, mask) in [(b.down, 0x08), (b.up, 0x04), (b.left, 0x02), (b.right, 0x01)] {
                if pressed {
                    state &= !mask;
                }
            }
        }

        let fell = joyp & !state & 0x0F != 0;
        (state, fell)
    }
}
