//! Color palettes
//!
//! Color hardware keeps 8 palettes of 4 entries for the background and 8 for
//! objects, each entry a little-endian BGR555 word. They live in 64-byte
//! memories reached through BCPS/BCPD (0xFF68/69) and OCPS/OCPD (0xFF6A/6B).
//! Monochrome output instead picks one of a fixed set of 4-shade presets.

use serde::{Deserialize, Serialize};

/// 64 bytes of palette memory plus the ARGB expansion of every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    pub data: [u8; 64],
    pub argb: [u32; 32],
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorPalette {
    pub fn new() -> Self {
        Self {
            data: [0; 64],
            argb: [0xFF00_0000; 32],
        }
    }

    /// Store a byte and refresh the entry it belongs to.
    pub fn write(&mut self, index: u8, val: u8) {
        let index = (index & 0x3F) as usize;
        self.data[index] = val;
        self.expand(index / 2);
    }

    pub fn read(&self, index: u8) -> u8 {
        self.data[(index & 0x3F) as usize]
    }

    /// Install raw ARGB shades for one 4-entry palette. Used to seed
    /// compatibility mode when no boot ROM sets the palettes.
    pub fn seed(&mut self, palette: usize, shades: [u32; 4]) {
        let base = (palette & 7) * 4;
        self.argb[base..base + 4].copy_from_slice(&shades);
    }

    fn expand(&mut self, entry: usize) {
        let lo = self.data[entry * 2] as u32;
        let hi = self.data[entry * 2 + 1] as u32;
        let r = lo & 0x1F;
        let g = ((lo & 0xE0) >> 5) | ((hi & 0x03) << 3);
        let b = (hi & 0x7C) >> 2;
        self.argb[entry] = 0xFF00_0000 | (r << 19) | (g << 11) | (b << 3);
    }
}

/// Four ARGB shades, lightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmgPalette(pub [u32; 4]);

impl DmgPalette {
    pub const PRESETS: [DmgPalette; 11] = [
        DmgPalette([0xffb0c0a0, 0xff889878, 0xff607050, 0xff283818]),
        DmgPalette([0xff9bbc0f, 0xff8bac0f, 0xff306230, 0xff0f380f]),
        DmgPalette([0xfffff6d3, 0xfff9a875, 0xffeb6b6f, 0xff7c3f58]),
        DmgPalette([0xffe9efec, 0xffa0a08b, 0xff555568, 0xff211e20]),
        DmgPalette([0xffe2f3e4, 0xff94e344, 0xff46878f, 0xff332c50]),
        DmgPalette([0xffedb4a1, 0xffa96868, 0xff764462, 0xff2c2137]),
        DmgPalette([0xffc4f0c2, 0xff5ab9a8, 0xff1e606e, 0xff2d1b00]),
        DmgPalette([0xff8be5ff, 0xff608fcf, 0xff7550e8, 0xff622e4c]),
        DmgPalette([0xfff8e3c4, 0xffcc3495, 0xff6b1fb1, 0xff0b0630]),
        DmgPalette([0xffcfab51, 0xff9d654c, 0xff4d222c, 0xff210b1b]),
        DmgPalette([0xffe8d6c0, 0xff92938d, 0xffa1281c, 0xff000000]),
    ];

    pub fn preset(index: usize) -> Self {
        Self::PRESETS
            .get(index)
            .copied()
            .unwrap_or(Self::PRESETS[0])
    }

    pub fn shade(&self, index: u8) -> u32 {
        self.0[(index & 3) as usize]
    }
}
