//! Machine configuration

use serde::{Deserialize, Serialize};

use crate::palette::DmgPalette;

/// Options fixed at power-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbConfig {
    /// Run as Game Boy Color hardware. Monochrome cartridges then run in
    /// compatibility mode.
    pub color_mode: bool,
    /// Index into [`DmgPalette::PRESETS`] used for monochrome shading.
    pub dmg_palette: usize,
    /// Start at 0x0100 with post-boot register values even if a boot ROM
    /// is mounted.
    pub skip_boot: bool,
}

impl Default for GbConfig {
    fn default() -> Self {
        Self {
            color_mode: false,
            dmg_palette: 0,
            skip_boot: false,
        }
    }
}

impl GbConfig {
    /// The selected monochrome shades; out-of-range indices fall back to the first preset.
    pub fn palette(&self) -> DmgPalette {
        DmgPalette::preset(self.dmg_palette)
    }
}
