//! Game Boy PPU (LCD Controller) implementation
//!
//! The PPU is a per-dot state machine over four modes. A visible line is
//! 80 dots of OAM scan, 160 dots of pixel transfer and H-blank until the
//! line's 456 dots are used up; lines 144-153 are V-blank.
//!
//! Objects are composited into per-pixel line buffers during OAM scan, as
//! soon as they are found. Mode 3 then draws one background/window pixel
//! per dot and merges it with the object buffers.
//!
//! All register and memory access goes through [`VideoBus`], so the PPU
//! can be driven by the real bus or by a test fixture.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::Frame;

use crate::interrupts::Interrupt;
use crate::palette::DmgPalette;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
pub const DOTS_PER_FRAME: u32 = 70224;

const OAM_SCAN_DOTS: u32 = 80;
/// H-blank ends this many dots after mode 3 started
const TRANSFER_AND_HBLANK_DOTS: u32 = 376;
const LINE_DOTS: u32 = 456;
const LINES_PER_FRAME: u8 = 154;
const OBJECTS_PER_LINE: usize = 10;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_WIN_TILEMAP: u8 = 0x40;
const LCDC_WIN_ENABLE: u8 = 0x20;
const LCDC_BG_WIN_TILES: u8 = 0x10;
const LCDC_BG_TILEMAP: u8 = 0x08;
const LCDC_OBJ_SIZE: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_WIN_ENABLE: u8 = 0x01;

// STAT bits
const STAT_LYC_INT: u8 = 0x40;
const STAT_OAM_INT: u8 = 0x20;
const STAT_VBLANK_INT: u8 = 0x10;
const STAT_HBLANK_INT: u8 = 0x08;
const STAT_LYC_EQUAL: u8 = 0x04;

const LCDC: u16 = 0xFF40;
const STAT: u16 = 0xFF41;
const SCY: u16 = 0xFF42;
const SCX: u16 = 0xFF43;
const LYC: u16 = 0xFF45;
const BGP: u16 = 0xFF47;
const OBP0: u16 = 0xFF48;
const OBP1: u16 = 0xFF49;
const WY: u16 = 0xFF4A;
const WX: u16 = 0xFF4B;

/// What the PPU needs from the rest of the machine.
pub trait VideoBus {
    fn read_io(&self, addr: u16) -> u8;
    /// Publish LY (0xFF44); guest writes to LY never reach it
    fn set_ly(&mut self, ly: u8);
    /// Replace STAT without the write mask the CPU sees
    fn override_stat(&mut self, stat: u8);
    fn request_interrupt(&mut self, irq: Interrupt);
    /// `addr` in 0x8000-0x9FFF, `bank` 0 or 1
    fn read_vram(&self, addr: u16, bank: usize) -> u8;
    /// Byte offset into OAM
    fn read_oam(&self, offset: usize) -> u8;
    /// Expanded color of background palette entry `index` (0-31)
    fn bg_color(&self, index: usize) -> u32;
    /// Expanded color of object palette entry `index` (0-31)
    fn obj_color(&self, index: usize) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

impl Mode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamScan,
            _ => Mode::Transfer,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sprite {
    y: u8,
    x: u8,
    tile: u8,
    flags: u8,
}

/// Mapping from 2-bit color ids to shades as described by a BGP/OBP byte.
fn palette_mapping(descr: u8, object: bool) -> [u8; 4] {
    let mut mapping = [0; 4];
    for (i, m) in mapping.iter_mut().enumerate() {
        *m = (descr >> (2 * i)) & 0x03;
    }
    if object {
        mapping[0] = 0;
    }
    mapping
}

pub struct Ppu {
    /// Color hardware
    color: bool,
    /// Color hardware running a monochrome cartridge
    compat: bool,
    shades: DmgPalette,

    pub mode: Mode,
    pub dot: u32,
    pub ly: u8,
    cur_x: usize,
    pub frame_ready: bool,
    frame: Frame,

    // Registers latched at mode 2/3 entry
    lcdc: u8,
    obj_height: u8,
    scy: u8,
    scx: u8,
    wy: u8,
    wx: u8,

    bgp_map: [u8; 4],
    obp0_map: [u8; 4],
    obp1_map: [u8; 4],

    objects_found: usize,
    obj_color: [u8; SCREEN_WIDTH],
    /// X of the object that owns the pixel, `None` if no object drew there
    obj_owner: [Option<i16>; SCREEN_WIDTH],
    obj_priority: [bool; SCREEN_WIDTH],
}

impl Ppu {
    pub fn new(color: bool, compat: bool, shades: DmgPalette) -> Self {
        Self {
            color,
            compat: color && compat,
            shades,
            mode: Mode::HBlank,
            dot: 0,
            ly: 0,
            cur_x: 0,
            frame_ready: false,
            frame: Frame::filled(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, shades.shade(0)),
            lcdc: 0,
            obj_height: 8,
            scy: 0,
            scx: 0,
            wy: 0,
            wx: 0,
            bgp_map: [0; 4],
            obp0_map: [0; 4],
            obp1_map: [0; 4],
            objects_found: 0,
            obj_color: [0; SCREEN_WIDTH],
            obj_owner: [None; SCREEN_WIDTH],
            obj_priority: [false; SCREEN_WIDTH],
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Hand out the finished frame and clear the ready flag.
    pub fn take_frame(&mut self) -> Frame {
        self.frame_ready = false;
        self.frame.clone()
    }

    /// Color shown while the LCD is off
    pub fn blank_color(&self) -> u32 {
        if self.color {
            0xFFFF_FFFF
        } else {
            self.shades.shade(0)
        }
    }

    /// Restore the position within the frame, as captured in a save state.
    pub fn restore_position(&mut self, mode: Mode, dot: u32, ly: u8) {
        self.mode = mode;
        self.dot = dot;
        self.ly = ly;
        self.cur_x = 0;
    }

    /// Advance by `dots` dots. Nothing happens while the LCD is off.
    pub fn step<B: VideoBus>(&mut self, dots: u32, bus: &mut B) {
        if bus.read_io(LCDC) & LCDC_ENABLE == 0 {
            return;
        }
        for _ in 0..dots {
            match self.mode {
                Mode::OamScan => self.oam_scan_dot(bus),
                Mode::Transfer => self.transfer_dot(bus),
                Mode::HBlank => self.hblank_dot(bus),
                Mode::VBlank => self.vblank_dot(bus),
            }
        }
    }

    fn oam_scan_dot<B: VideoBus>(&mut self, bus: &mut B) {
        if self.dot % 2 == 0 && self.objects_found < OBJECTS_PER_LINE {
            let base = (self.dot * 2) as usize;
            let y = bus.read_oam(base);
            let line = self.ly as u16 + 16;
            if line >= y as u16 && line < y as u16 + self.obj_height as u16 {
                let sprite = Sprite {
                    y,
                    x: bus.read_oam(base + 1),
                    tile: bus.read_oam(base + 2),
                    flags: bus.read_oam(base + 3),
                };
                self.objects_found += 1;
                self.composite_object(sprite, bus);
            }
        }

        self.dot += 1;
        if self.dot >= OAM_SCAN_DOTS {
            self.dot = 0;
            self.enter_mode(Mode::Transfer, bus);
            self.lcdc = bus.read_io(LCDC);
            self.obj_height = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };
            self.scy = bus.read_io(SCY);
            self.scx = bus.read_io(SCX);
            self.wy = bus.read_io(WY);
            self.wx = bus.read_io(WX);
            self.bgp_map = palette_mapping(bus.read_io(BGP), false);
        }
    }

    fn transfer_dot<B: VideoBus>(&mut self, bus: &mut B) {
        self.dot += 1;
        let x = self.cur_x;
        let argb = self.pixel(x, self.ly as usize, bus);
        self.frame.set_pixel(x as u32, self.ly as u32, argb);
        self.cur_x += 1;

        if self.cur_x >= SCREEN_WIDTH {
            self.enter_mode(Mode::HBlank, bus);
            self.stat_interrupt(STAT_HBLANK_INT, bus);
        }
    }

    fn hblank_dot<B: VideoBus>(&mut self, bus: &mut B) {
        self.dot += 1;
        if self.dot < TRANSFER_AND_HBLANK_DOTS {
            return;
        }

        self.ly += 1;
        bus.set_ly(self.ly);
        self.dot = 0;
        self.cur_x = 0;
        self.compare_lyc(bus);

        if self.ly as usize >= SCREEN_HEIGHT {
            self.enter_mode(Mode::VBlank, bus);
            self.frame_ready = true;
            self.stat_interrupt(STAT_VBLANK_INT, bus);
            bus.request_interrupt(Interrupt::VBlank);
        } else {
            self.begin_line(bus);
        }
    }

    fn vblank_dot<B: VideoBus>(&mut self, bus: &mut B) {
        self.dot += 1;
        if self.dot < LINE_DOTS {
            return;
        }

        self.ly += 1;
        self.dot = 0;
        self.objects_found = 0;
        if self.ly >= LINES_PER_FRAME {
            self.ly = 0;
            self.obp0_map = palette_mapping(bus.read_io(OBP0), true);
            self.obp1_map = palette_mapping(bus.read_io(OBP1), true);
            self.begin_line(bus);
            log(LogCategory::PPU, LogLevel::Trace, || "frame start".to_string());
        }
        bus.set_ly(self.ly);
        self.compare_lyc(bus);
    }

    /// Enter OAM scan for the current line.
    fn begin_line<B: VideoBus>(&mut self, bus: &mut B) {
        self.objects_found = 0;
        self.obj_color = [0; SCREEN_WIDTH];
        self.obj_owner = [None; SCREEN_WIDTH];
        self.obj_priority = [false; SCREEN_WIDTH];
        self.lcdc = bus.read_io(LCDC);
        self.obj_height = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };
        self.enter_mode(Mode::OamScan, bus);
        self.stat_interrupt(STAT_OAM_INT, bus);
    }

    fn enter_mode<B: VideoBus>(&mut self, mode: Mode, bus: &mut B) {
        self.mode = mode;
        let stat = bus.read_io(STAT);
        bus.override_stat((stat & !0x03) | mode as u8);
    }

    fn stat_interrupt<B: VideoBus>(&self, source: u8, bus: &mut B) {
        if bus.read_io(STAT) & source != 0 {
            bus.request_interrupt(Interrupt::Stat);
        }
    }

    fn compare_lyc<B: VideoBus>(&self, bus: &mut B) {
        let stat = bus.read_io(STAT);
        if bus.read_io(LYC) == self.ly {
            bus.override_stat(stat | STAT_LYC_EQUAL);
            if stat & STAT_LYC_INT != 0 {
                bus.request_interrupt(Interrupt::Stat);
            }
        } else {
            bus.override_stat(stat & !STAT_LYC_EQUAL);
        }
    }

    fn composite_object<B: VideoBus>(&mut self, sprite: Sprite, bus: &B) {
        let true_x = sprite.x as i16 - 8;
        let true_y = sprite.y as i16 - 16;
        let mut sub_row = (self.ly as i16 - true_y) as u16;
        if sprite.flags & 0x40 != 0 {
            sub_row = self.obj_height as u16 - sub_row - 1;
        }

        let mut tile = sprite.tile;
        if self.obj_height == 16 {
            if sub_row >= 8 {
                tile |= 0x01;
                sub_row -= 8;
            } else {
                tile &= 0xFE;
            }
        }

        let bank = usize::from(self.color && sprite.flags & 0x08 != 0);
        let addr = 0x8000 + ((tile as u16) << 4) + 2 * sub_row;
        let lo = bus.read_vram(addr, bank);
        let hi = bus.read_vram(addr + 1, bank);

        let start = (-true_x).max(0);
        for i in start..8 {
            let x = true_x + i;
            if x >= SCREEN_WIDTH as i16 {
                break;
            }
            let px = x as usize;
            let writable = match self.obj_owner[px] {
                None => true,
                Some(owner) => !self.color && owner > true_x,
            };
            if !writable {
                continue;
            }

            let bit = if sprite.flags & 0x20 != 0 { i } else { 7 - i };
            let id = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
            if id == 0 {
                continue;
            }

            // OBP1 is attribute bit 4; bit 3 is the VRAM bank on color hardware
            let use_obp1 = sprite.flags & 0x10 != 0;
            self.obj_color[px] = if !self.color {
                if use_obp1 {
                    self.obp1_map[id as usize]
                } else {
                    self.obp0_map[id as usize]
                }
            } else if self.compat {
                if use_obp1 {
                    self.obp1_map[id as usize] + 4
                } else {
                    self.obp0_map[id as usize]
                }
            } else {
                (sprite.flags & 0x07) * 4 + id
            };
            self.obj_owner[px] = Some(true_x);
            self.obj_priority[px] = sprite.flags & 0x80 != 0;
        }
    }

    /// Color id of a background or window pixel and whether its tile
    /// attributes give it priority over objects.
    fn tile_color_id<B: VideoBus>(&self, map: u16, tx: usize, ty: usize, bus: &B) -> (u8, bool) {
        let map_addr = map + (tx / 8) as u16 + 0x20 * (ty / 8) as u16;
        let tile = bus.read_vram(map_addr, 0);
        let mut sub_x = (tx % 8) as u16;
        let mut sub_y = (ty % 8) as u16;

        let attr = if self.color { bus.read_vram(map_addr, 1) } else { 0 };
        if attr & 0x40 != 0 {
            sub_y = 7 - sub_y;
        }
        if attr & 0x20 != 0 {
            sub_x = 7 - sub_x;
        }

        let offset = if self.lcdc & LCDC_BG_WIN_TILES != 0 || tile >= 0x80 {
            0x0000
        } else {
            0x1000
        };
        let bank = usize::from(attr & 0x08 != 0);
        let addr = 0x8000 + ((tile as u16) << 4) + 2 * sub_y + offset;
        let lo = bus.read_vram(addr, bank);
        let hi = bus.read_vram(addr + 1, bank);
        let bit = 7 - sub_x;
        let id = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
        let priority = attr & 0x80 != 0 && id != 0;

        // Compatibility mode sends window pixels through BGP as well as background
        let id = if self.compat {
            self.bgp_map[id as usize]
        } else if self.color {
            ((attr & 0x07) << 2) + id
        } else {
            id
        };
        (id, priority)
    }

    fn background_color_id<B: VideoBus>(&self, x: usize, y: usize, bus: &B) -> (u8, bool) {
        let tx = (x + self.scx as usize) % 256;
        let ty = (y + self.scy as usize) % 256;
        let map = if self.lcdc & LCDC_BG_TILEMAP != 0 { 0x9C00 } else { 0x9800 };
        self.tile_color_id(map, tx, ty, bus)
    }

    fn window_color_id<B: VideoBus>(&self, x: usize, y: usize, bus: &B) -> (u8, bool) {
        let tx = x + 7 - self.wx as usize;
        let ty = y - self.wy as usize;
        let map = if self.lcdc & LCDC_WIN_TILEMAP != 0 { 0x9C00 } else { 0x9800 };
        self.tile_color_id(map, tx, ty, bus)
    }

    fn window_covers(&self, x: usize, y: usize) -> bool {
        self.lcdc & LCDC_WIN_ENABLE != 0 && x + 7 >= self.wx as usize && y >= self.wy as usize
    }

    fn pixel<B: VideoBus>(&self, x: usize, y: usize, bus: &B) -> u32 {
        let (id, bg_priority) = if self.window_covers(x, y) {
            self.window_color_id(x, y, bus)
        } else {
            self.background_color_id(x, y, bus)
        };

        let has_object = self.obj_owner[x].is_some() && self.lcdc & LCDC_OBJ_ENABLE != 0;
        if has_object {
            let obj = self.obj_color[x];
            if self.color {
                let obj_wins = id % 4 == 0
                    || self.lcdc & LCDC_BG_WIN_ENABLE == 0
                    || (!self.obj_priority[x] && !bg_priority);
                return if obj_wins {
                    bus.obj_color(obj as usize)
                } else {
                    bus.bg_color(id as usize)
                };
            }
            if !self.obj_priority[x] {
                return self.shades.shade(obj);
            }
            let shade = self.bgp_map[id as usize];
            return if shade != 0 {
                self.shades.shade(shade)
            } else {
                self.shades.shade(obj)
            };
        }

        if self.color {
            bus.bg_color(id as usize)
        } else if self.lcdc & LCDC_BG_WIN_ENABLE == 0 {
            self.shades.shade(0)
        } else {
            self.shades.shade(self.bgp_map[id as usize])
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FakeVideo {
        pub io: [u8; 0x80],
        pub vram: [[u8; 0x2000]; 2],
        pub oam: [u8; 0xA0],
        pub bg: [u32; 32],
        pub obj: [u32; 32],
        pub irqs: Vec<Interrupt>,
    }

    impl FakeVideo {
        pub fn new() -> Self {
            let mut video = Self {
                io: [0; 0x80],
                vram: [[0; 0x2000]; 2],
                oam: [0; 0xA0],
                bg: [0; 32],
                obj: [0; 32],
                irqs: Vec::new(),
            };
            for i in 0..32 {
                video.bg[i] = 0xFF00_0000 | i as u32;
                video.obj[i] = 0xFF00_0100 | i as u32;
            }
            video.io[0x40] = 0x91;
            video.io[0x47] = 0xE4;
            video.io[0x48] = 0xE4;
            video.io[0x49] = 0x1B;
            video
        }

        pub fn set(&mut self, addr: u16, val: u8) {
            self.io[(addr - 0xFF00) as usize] = val;
        }

        /// Tile `id` filled with color id `color` in every pixel
        pub fn solid_tile(&mut self, bank: usize, id: usize, color: u8) {
            let lo = if color & 1 != 0 { 0xFF } else { 0x00 };
            let hi = if color & 2 != 0 { 0xFF } else { 0x00 };
            for row in 0..8 {
                self.vram[bank][id * 16 + row * 2] = lo;
                self.vram[bank][id * 16 + row * 2 + 1] = hi;
            }
        }
    }

    impl VideoBus for FakeVideo {
        fn read_io(&self, addr: u16) -> u8 {
            self.io[(addr - 0xFF00) as usize]
        }
        fn set_ly(&mut self, ly: u8) {
            self.io[0x44] = ly;
        }
        fn override_stat(&mut self, stat: u8) {
            self.io[0x41] = stat;
        }
        fn request_interrupt(&mut self, irq: Interrupt) {
            self.irqs.push(irq);
        }
        fn read_vram(&self, addr: u16, bank: usize) -> u8 {
            self.vram[bank][(addr - 0x8000) as usize]
        }
        fn read_oam(&self, offset: usize) -> u8 {
            self.oam[offset]
        }
        fn bg_color(&self, index: usize) -> u32 {
            self.bg[index]
        }
        fn obj_color(&self, index: usize) -> u32 {
            self.obj[index]
        }
    }

    fn dmg() -> Ppu {
        Ppu::new(false, false, DmgPalette::preset(0))
    }

    fn shade(i: u8) -> u32 {
        DmgPalette::preset(0).shade(i)
    }

    /// Run until the first frame is done, then through the next one so every
    /// line has been drawn with the current VRAM.
    fn render(ppu: &mut Ppu, video: &mut FakeVideo) {
        for _ in 0..2 {
            ppu.frame_ready = false;
            while !ppu.frame_ready {
                ppu.step(1, video);
            }
        }
    }

    #[test]
    fn test_lcd_off_is_inert() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x11;
        ppu.step(DOTS_PER_FRAME, &mut video);
        assert_eq!(ppu.dot, 0);
        assert_eq!(ppu.ly, 0);
        assert!(video.irqs.is_empty());
    }

    #[test]
    fn test_frame_is_70224_dots() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        render(&mut ppu, &mut video);
        assert_eq!(ppu.mode, Mode::VBlank);
        assert_eq!(ppu.ly, 144);

        ppu.frame_ready = false;
        ppu.step(DOTS_PER_FRAME - 1, &mut video);
        assert!(!ppu.frame_ready);
        ppu.step(1, &mut video);
        assert!(ppu.frame_ready);
    }

    #[test]
    fn test_line_timing_and_stat_mode() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        render(&mut ppu, &mut video);

        // Run to the start of line 0
        while ppu.ly != 0 {
            ppu.step(1, &mut video);
        }
        assert_eq!(ppu.mode, Mode::OamScan);
        assert_eq!(video.io[0x41] & 3, 2);
        assert_eq!(video.io[0x44], 0);

        ppu.step(80, &mut video);
        assert_eq!(ppu.mode, Mode::Transfer);
        assert_eq!(video.io[0x41] & 3, 3);

        ppu.step(160, &mut video);
        assert_eq!(ppu.mode, Mode::HBlank);
        assert_eq!(video.io[0x41] & 3, 0);

        ppu.step(215, &mut video);
        assert_eq!(ppu.ly, 0);
        ppu.step(1, &mut video);
        assert_eq!(ppu.ly, 1);
        assert_eq!(ppu.mode, Mode::OamScan);
    }

    #[test]
    fn test_vblank_and_stat_interrupts() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x41] = STAT_VBLANK_INT;
        render(&mut ppu, &mut video);
        assert!(video.irqs.contains(&Interrupt::VBlank));
        assert!(video.irqs.contains(&Interrupt::Stat));
        assert_eq!(video.irqs.iter().filter(|&&i| i == Interrupt::VBlank).count(), 2);
    }

    #[test]
    fn test_lyc_coincidence() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x45] = 10;
        video.io[0x41] = STAT_LYC_INT;
        while ppu.ly != 10 {
            ppu.step(1, &mut video);
        }
        assert_ne!(video.io[0x41] & STAT_LYC_EQUAL, 0);
        assert_eq!(video.irqs, vec![Interrupt::Stat]);

        while ppu.ly != 11 {
            ppu.step(1, &mut video);
        }
        assert_eq!(video.io[0x41] & STAT_LYC_EQUAL, 0);
    }

    #[test]
    fn test_background_uses_bgp() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        // Tile 1 at map position (0,0), color id 3; BGP maps 3 -> shade 1
        video.solid_tile(0, 1, 3);
        video.vram[0][0x1800] = 1;
        video.io[0x47] = 0b0100_0000;
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(7, 7), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(8, 0), Some(shade(0)));
    }

    #[test]
    fn test_background_scroll_wraps() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.solid_tile(0, 1, 3);
        video.vram[0][0x1800] = 1;
        video.set(0xFF43, 252);
        render(&mut ppu, &mut video);
        // Pixels 4..12 show map column 0 after wrapping
        assert_eq!(ppu.frame().pixel(3, 0), Some(shade(0)));
        assert_eq!(ppu.frame().pixel(4, 0), Some(shade(3)));
        assert_eq!(ppu.frame().pixel(11, 0), Some(shade(3)));
    }

    #[test]
    fn test_signed_tile_addressing() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        // LCDC bit 4 clear: tile 1 lives at 0x9010
        video.io[0x40] = 0x81;
        video.solid_tile(0, 0x101, 2);
        video.vram[0][0x1800] = 1;
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(2)));
    }

    #[test]
    fn test_window_overrides_background() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x91 | LCDC_WIN_ENABLE | LCDC_WIN_TILEMAP;
        video.solid_tile(0, 2, 1);
        video.vram[0][0x1C00] = 2;
        video.set(0xFF4A, 8);
        video.set(0xFF4B, 7 + 16);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(15, 8), Some(shade(0)));
        assert_eq!(ppu.frame().pixel(16, 8), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(16, 7), Some(shade(0)));
        assert_eq!(ppu.frame().pixel(23, 15), Some(shade(1)));
    }

    fn place_sprite(video: &mut FakeVideo, slot: usize, x: u8, y: u8, tile: u8, flags: u8) {
        video.oam[slot * 4..slot * 4 + 4].copy_from_slice(&[y, x, tile, flags]);
    }

    #[test]
    fn test_sprite_rendering_and_palettes() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 5, 1);
        place_sprite(&mut video, 0, 8, 16, 5, 0x00);
        place_sprite(&mut video, 1, 40, 16, 5, 0x10);
        render(&mut ppu, &mut video);
        // OBP0 = E4 maps 1 -> 1, OBP1 = 1B maps 1 -> 2
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(32, 0), Some(shade(2)));
        assert_eq!(ppu.frame().pixel(8, 0), Some(shade(0)));
        assert_eq!(ppu.frame().pixel(0, 8), Some(shade(0)));
    }

    #[test]
    fn test_sprite_hidden_when_disabled() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.solid_tile(0, 5, 3);
        place_sprite(&mut video, 0, 8, 16, 5, 0x00);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(0)));
    }

    #[test]
    fn test_sprite_flip() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        // Leftmost column only, top row only
        video.vram[0][5 * 16] = 0x80;
        place_sprite(&mut video, 0, 8, 16, 5, 0x00);
        place_sprite(&mut video, 1, 24, 16, 5, 0x20);
        place_sprite(&mut video, 2, 40, 16, 5, 0x40);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(23, 0), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(16, 0), Some(shade(0)));
        assert_eq!(ppu.frame().pixel(32, 7), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(32, 0), Some(shade(0)));
    }

    #[test]
    fn test_tall_sprites() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x97;
        video.solid_tile(0, 6, 1);
        video.solid_tile(0, 7, 2);
        // Odd tile number is rounded down for the top half
        place_sprite(&mut video, 0, 8, 16, 7, 0x00);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(1)));
        assert_eq!(ppu.frame().pixel(0, 8), Some(shade(2)));
        assert_eq!(ppu.frame().pixel(0, 16), Some(shade(0)));
    }

    #[test]
    fn test_dmg_smallest_x_wins() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 1, 1);
        video.solid_tile(0, 2, 3);
        place_sprite(&mut video, 0, 12, 16, 1, 0x00);
        place_sprite(&mut video, 1, 8, 16, 2, 0x00);
        render(&mut ppu, &mut video);
        // Overlap at x 4..8 belongs to the sprite further left
        assert_eq!(ppu.frame().pixel(5, 0), Some(shade(3)));
        assert_eq!(ppu.frame().pixel(9, 0), Some(shade(1)));
    }

    #[test]
    fn test_ten_sprites_per_line() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 1, 3);
        for slot in 0..11 {
            place_sprite(&mut video, slot, 8 + 8 * slot as u8, 16, 1, 0x00);
        }
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(72, 0), Some(shade(3)));
        assert_eq!(ppu.frame().pixel(80, 0), Some(shade(0)));
    }

    #[test]
    fn test_dmg_bg_priority() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 1, 2);
        video.solid_tile(0, 3, 3);
        video.vram[0][0x1800] = 1;
        place_sprite(&mut video, 0, 8, 16, 3, 0x80);
        place_sprite(&mut video, 1, 16, 16, 3, 0x80);
        render(&mut ppu, &mut video);
        // Behind a non-zero background pixel
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(2)));
        // Background color 0 lets the sprite through
        assert_eq!(ppu.frame().pixel(8, 0), Some(shade(3)));
    }

    #[test]
    fn test_color_background_attributes() {
        let mut ppu = Ppu::new(true, false, DmgPalette::preset(0));
        let mut video = FakeVideo::new();
        // Tile 1 in bank 1, palette 3, color id 2
        video.solid_tile(1, 1, 2);
        video.vram[0][0x1800] = 1;
        video.vram[1][0x1800] = 0x08 | 0x03;
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(video.bg[3 * 4 + 2]));
        assert_eq!(ppu.frame().pixel(8, 0), Some(video.bg[0]));
    }

    #[test]
    fn test_color_oam_order_wins() {
        let mut ppu = Ppu::new(true, false, DmgPalette::preset(0));
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 1, 1);
        video.solid_tile(0, 2, 3);
        place_sprite(&mut video, 0, 12, 16, 1, 0x02);
        place_sprite(&mut video, 1, 8, 16, 2, 0x05);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(5, 0), Some(video.obj[2 * 4 + 1]));
        assert_eq!(ppu.frame().pixel(1, 0), Some(video.obj[5 * 4 + 3]));
    }

    #[test]
    fn test_color_bg_attribute_priority() {
        let mut ppu = Ppu::new(true, false, DmgPalette::preset(0));
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 1, 1);
        video.solid_tile(0, 2, 3);
        video.vram[0][0x1800] = 1;
        video.vram[1][0x1800] = 0x80;
        place_sprite(&mut video, 0, 8, 16, 2, 0x00);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(video.bg[1]));

        // Master priority off: objects always on top
        video.io[0x40] = 0x92;
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(video.obj[3]));
    }

    #[test]
    fn test_compat_mode_maps_through_dmg_registers() {
        let mut ppu = Ppu::new(true, true, DmgPalette::preset(0));
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.io[0x47] = 0b0000_1100; // id 1 -> shade 3
        video.solid_tile(0, 1, 1);
        video.vram[0][0x1800] = 1;
        video.solid_tile(0, 2, 1);
        place_sprite(&mut video, 0, 16, 16, 2, 0x10);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(video.bg[3]));
        // OBP1 = 1B maps 1 -> 2, second object palette
        assert_eq!(ppu.frame().pixel(8, 0), Some(video.obj[4 + 2]));
    }

    #[test]
    fn test_compat_mode_window_uses_bgp() {
        let mut ppu = Ppu::new(true, true, DmgPalette::preset(0));
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x91 | LCDC_WIN_ENABLE | LCDC_WIN_TILEMAP;
        video.io[0x47] = 0b0000_1100; // id 1 -> shade 3
        video.solid_tile(0, 2, 1);
        video.vram[0][0x1C00] = 2;
        video.set(0xFF4A, 0);
        video.set(0xFF4B, 7);
        render(&mut ppu, &mut video);
        assert_eq!(ppu.frame().pixel(0, 0), Some(video.bg[3]));
        assert_eq!(ppu.frame().pixel(8, 0), Some(video.bg[0]));
    }

    #[test]
    fn test_dmg_bank_bit_does_not_select_obp1() {
        let mut ppu = dmg();
        let mut video = FakeVideo::new();
        video.io[0x40] = 0x93;
        video.solid_tile(0, 5, 1);
        place_sprite(&mut video, 0, 8, 16, 5, 0x08);
        render(&mut ppu, &mut video);
        // Still OBP0 = E4
        assert_eq!(ppu.frame().pixel(0, 0), Some(shade(1)));
    }
}
