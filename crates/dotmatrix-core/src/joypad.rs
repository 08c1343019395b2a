use serde::{Deserialize, Serialize};

/// Host-facing button bits for [`Joypad::set_inputs`].
pub mod buttons {
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const UP: u8 = 0x04;
    pub const DOWN: u8 = 0x08;
    pub const A: u8 = 0x10;
    pub const B: u8 = 0x20;
    pub const SELECT: u8 = 0x40;
    pub const START: u8 = 0x80;
}

const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

/// P1/JOYP register (gbdev.io/pandocs/Joypad_Input.html).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joypad {
    /// Pressed buttons, 1 = pressed, host bit order.
    pressed: u8,
    /// Selection bits 4-5 as last written (active low).
    select: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            pressed: 0,
            select: 0x30,
        }
    }

    pub fn pressed(&self) -> u8 {
        self.pressed
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | (!self.selected_lines() & 0x0F)
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Replace the pressed set. Returns true when a newly pressed button
    /// sits in a selected group, which requests the joypad interrupt.
    pub fn set_inputs(&mut self, mask: u8) -> bool {
        let before = self.selected_lines();
        self.pressed = mask;
        let after = self.selected_lines();
        after & !before != 0
    }

    /// Active-high view of the four input lines as the selection exposes them.
    fn selected_lines(&self) -> u8 {
        let mut lines = 0;
        if self.select & SELECT_DIRECTIONS == 0 {
            lines |= self.pressed & 0x0F;
        }
        if self.select & SELECT_BUTTONS == 0 {
            lines |= self.pressed >> 4;
        }
        lines
    }
}
