//! Game Boy / Game Boy Color system implementation
//!
//! [`GbSystem`] owns the whole machine: the CPU, which in turn owns the
//! [`bus::GbBus`], and the [`ppu::Ppu`]. Everything is advanced one CPU
//! instruction at a time by [`GbSystem::step`]; [`System::step_frame`] repeats
//! that until the PPU finishes a frame.
//!
//! The machine is single-threaded. `GbSystem` is `Send`, but every method
//! takes `&mut self`, so a frontend running it on another thread has to own
//! it there.

use emu_core::cpu_lr35902::CpuLr35902;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{types::Frame, MountPointInfo, System};

pub mod bus;
pub mod cartridge;
pub mod config;
pub mod dma;
pub mod interrupts;
pub mod joypad;
pub mod mbc;
pub mod palette;
pub mod ppu;
pub mod timer;

use bus::GbBus;
use cartridge::{Cartridge, CartridgeError};
pub use config::GbConfig;
use joypad::{Buttons, InputSource};
use ppu::{Mode, Ppu, DOTS_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH};

const CARTRIDGE: &str = "Cartridge";
const BOOT_ROM: &str = "BootROM";

pub struct GbSystem {
    config: GbConfig,
    cpu: CpuLr35902<GbBus>,
    ppu: Ppu,
    boot_rom: Option<Vec<u8>>,
    /// Dots owed to the peripherals, carried from one step to the next
    backlog: u32,
    /// Buttons seen at the last frame boundary
    buttons: Buttons,
}

impl Default for GbSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl GbSystem {
    pub fn new() -> Self {
        Self::with_config(GbConfig::default())
    }

    pub fn with_config(config: GbConfig) -> Self {
        let color = config.color_mode;
        let mut sys = Self {
            ppu: Ppu::new(color, false, config.palette()),
            cpu: CpuLr35902::new(GbBus::new(color, None, None)),
            config,
            boot_rom: None,
            backlog: 0,
            buttons: Buttons::default(),
        };
        sys.power_on(None);
        sys
    }

    pub fn config(&self) -> &GbConfig {
        &self.config
    }

    pub fn cpu(&self) -> &CpuLr35902<GbBus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuLr35902<GbBus> {
        &mut self.cpu
    }

    pub fn bus(&self) -> &GbBus {
        &self.cpu.memory
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    /// Color hardware running a monochrome cartridge
    pub fn compat_mode(&self) -> bool {
        self.config.color_mode && self.bus().cartridge().is_some_and(|c| !c.color)
    }

    pub fn set_input_source(&mut self, input: Box<dyn InputSource>) {
        self.cpu.memory.set_input_source(input);
    }

    /// The input source asked to stop emulation
    pub fn quit_requested(&self) -> bool {
        self.buttons.quit
    }

    /// The input source asks for unthrottled running
    pub fn turbo(&self) -> bool {
        self.buttons.turbo
    }

    /// External RAM to persist, if the cartridge has a battery.
    pub fn battery_ram(&self) -> Option<Vec<u8>> {
        self.bus()
            .cartridge()
            .filter(|c| c.battery && c.ram_size > 0)
            .map(Cartridge::ram)
    }

    /// Restore external RAM from a save file.
    pub fn load_battery_ram(&mut self, data: &[u8]) -> Result<(), GbError> {
        let cart = self.cpu.memory.cartridge_mut().ok_or(GbError::NoCartridge)?;
        cart.load_ram(data)?;
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("loaded {} bytes of battery RAM", data.len())
        });
        Ok(())
    }

    /// Rebuild the machine around `cart`. Starts in the boot ROM when one is
    /// mounted and allowed, otherwise directly at 0x0100.
    fn power_on(&mut self, cart: Option<Cartridge>) {
        let color = self.config.color_mode;
        let boot = self.boot_rom.clone().filter(|_| !self.config.skip_boot);
        let booting = boot.is_some();
        let compat = color && cart.as_ref().is_some_and(|c| !c.color);

        let mut bus = GbBus::new(color, cart, boot);
        bus.set_input_source(self.cpu.memory.take_input_source());
        if compat && !booting {
            bus.seed_compat_palettes(self.config.palette());
        }

        let mut cpu = CpuLr35902::new(bus);
        cpu.reset();
        if !booting {
            cpu.skip_boot(color);
        }

        self.cpu = cpu;
        self.ppu = Ppu::new(color, compat, self.config.palette());
        self.backlog = 0;

        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "power on: {} hardware{}{}",
                if color { "color" } else { "monochrome" },
                if compat { ", compatibility mode" } else { "" },
                if booting { ", running boot ROM" } else { "" }
            )
        });
    }

    /// Detach the current cartridge, leaving a placeholder machine behind.
    fn take_cartridge(&mut self) -> Option<Cartridge> {
        let placeholder = CpuLr35902::new(GbBus::new(self.config.color_mode, None, None));
        let mut old = std::mem::replace(&mut self.cpu, placeholder);
        self.cpu.memory.set_input_source(old.memory.take_input_source());
        old.memory.into_cartridge()
    }

    /// Execute one CPU instruction, or one HDMA transfer, and bring the
    /// peripherals up to date. Returns the dots the PPU advanced.
    pub fn step(&mut self) -> u32 {
        let speed = self.cpu.dots_per_cycle();
        let cycles = if self.cpu.halted {
            self.cpu.step()
        } else if let Some(stall) = self.cpu.memory.hdma_step(speed) {
            stall
        } else {
            self.cpu.step()
        };

        // A `stop` may have switched speed; charge everything at the new rate
        let dpc = self.cpu.dots_per_cycle();
        self.backlog += cycles * dpc;
        self.cpu.ei_post_execute();

        let m_cycles = self.backlog / dpc;
        self.cpu.memory.step_oam_dma(m_cycles);
        self.cpu.memory.step_timer(m_cycles);

        let dots = self.backlog;
        self.ppu.step(dots, &mut self.cpu.memory);

        self.backlog = if self.cpu.memory.hdma_active() {
            0
        } else {
            self.cpu.dispatch_next() * dpc
        };
        dots
    }

    fn lcd_enabled(&self) -> bool {
        self.cpu.memory.read_io(0xFF40) & 0x80 != 0
    }

    fn blank_frame(&self) -> Frame {
        Frame::filled(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, self.ppu.blank_color())
    }

    /// Poll input once per frame.
    fn end_frame(&mut self) {
        self.buttons = self.cpu.memory.refresh_joypad();
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GbError {
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid mount point")]
    InvalidMountPoint,
    #[error("Cartridge error: {0}")]
    Cartridge(#[from] CartridgeError),
}

impl System for GbSystem {
    type Error = GbError;

    fn reset(&mut self) {
        let cart = self.take_cartridge();
        self.power_on(cart);
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if !self.is_mounted(CARTRIDGE) {
            return Err(GbError::NoCartridge);
        }

        let mut dots = 0;
        loop {
            dots += self.step();

            if self.ppu.frame_ready {
                self.end_frame();
                return Ok(self.ppu.take_frame());
            }

            if !self.lcd_enabled() && dots >= DOTS_PER_FRAME {
                self.end_frame();
                return Ok(self.blank_frame());
            }

            if dots >= DOTS_PER_FRAME * 2 {
                log(LogCategory::PPU, LogLevel::Warn, || {
                    format!("no frame after {} dots", dots)
                });
                self.end_frame();
                return Ok(self.ppu.frame().clone());
            }
        }
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({
            "system": "gb",
            "version": 1,
            "color": self.config.color_mode,
            "cpu": {
                "a": self.cpu.a,
                "f": self.cpu.f,
                "b": self.cpu.b,
                "c": self.cpu.c,
                "d": self.cpu.d,
                "e": self.cpu.e,
                "h": self.cpu.h,
                "l": self.cpu.l,
                "sp": self.cpu.sp,
                "pc": self.cpu.pc,
                "ime": self.cpu.ime,
                "halted": self.cpu.halted,
                "halt_bug": self.cpu.halt_bug,
                "ei_delay": self.cpu.ei_delay,
                "double_speed": self.cpu.double_speed,
                "cycles": self.cpu.cycles,
            },
            "ppu": {
                "mode": self.ppu.mode as u8,
                "dot": self.ppu.dot,
                "ly": self.ppu.ly,
            },
            "backlog": self.backlog,
            "bus": self.cpu.memory.save_state(),
        })
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        macro_rules! load_u8 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u8;
                }
            };
        }

        macro_rules! load_u16 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u16;
                }
            };
        }

        macro_rules! load_u32 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u32;
                }
            };
        }

        macro_rules! load_bool {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_bool()) {
                    $target = val;
                }
            };
        }

        if let Some(color) = v.get("color").and_then(|c| c.as_bool()) {
            if color != self.config.color_mode {
                return Err(serde::de::Error::custom(format!(
                    "state was saved in {} mode",
                    if color { "color" } else { "monochrome" }
                )));
            }
        }

        if let Some(cpu_state) = v.get("cpu") {
            load_u8!(cpu_state, "a", self.cpu.a);
            load_u8!(cpu_state, "f", self.cpu.f);
            load_u8!(cpu_state, "b", self.cpu.b);
            load_u8!(cpu_state, "c", self.cpu.c);
            load_u8!(cpu_state, "d", self.cpu.d);
            load_u8!(cpu_state, "e", self.cpu.e);
            load_u8!(cpu_state, "h", self.cpu.h);
            load_u8!(cpu_state, "l", self.cpu.l);
            load_u16!(cpu_state, "sp", self.cpu.sp);
            load_u16!(cpu_state, "pc", self.cpu.pc);
            load_bool!(cpu_state, "ime", self.cpu.ime);
            load_bool!(cpu_state, "halted", self.cpu.halted);
            load_bool!(cpu_state, "halt_bug", self.cpu.halt_bug);
            load_u8!(cpu_state, "ei_delay", self.cpu.ei_delay);
            load_bool!(cpu_state, "double_speed", self.cpu.double_speed);
            if let Some(val) = cpu_state.get("cycles").and_then(|v| v.as_u64()) {
                self.cpu.cycles = val;
            }
            self.cpu.f &= 0xF0;
        }

        if let Some(ppu_state) = v.get("ppu") {
            let mut mode = self.ppu.mode as u8;
            let mut dot = self.ppu.dot;
            let mut ly = self.ppu.ly;
            load_u8!(ppu_state, "mode", mode);
            load_u32!(ppu_state, "dot", dot);
            load_u8!(ppu_state, "ly", ly);
            self.ppu.restore_position(Mode::from_bits(mode), dot, ly);
        }

        load_u32!(v, "backlog", self.backlog);

        if let Some(bus_state) = v.get("bus") {
            self.cpu.memory.load_state(bus_state)?;
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: CARTRIDGE.to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: vec!["gb".to_string(), "gbc".to_string()],
                required: true,
            },
            MountPointInfo {
                id: BOOT_ROM.to_string(),
                name: "Boot ROM".to_string(),
                extensions: vec!["bin".to_string()],
                required: false,
            },
        ]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        match mount_point_id {
            CARTRIDGE => {
                let cart = Cartridge::from_bytes(data)?;
                log(LogCategory::Cartridge, LogLevel::Info, || {
                    format!(
                        "mounted \"{}\": {:?}, {} ROM banks, {} bytes RAM{}",
                        cart.title,
                        cart.kind,
                        cart.rom_bank_count(),
                        cart.ram_size,
                        if cart.battery { ", battery" } else { "" }
                    )
                });
                self.take_cartridge();
                self.power_on(Some(cart));
                Ok(())
            }
            BOOT_ROM => {
                self.boot_rom = Some(data.to_vec());
                self.reset();
                Ok(())
            }
            _ => Err(GbError::InvalidMountPoint),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        match mount_point_id {
            CARTRIDGE => {
                self.take_cartridge();
                self.power_on(None);
                Ok(())
            }
            BOOT_ROM => {
                self.boot_rom = None;
                self.reset();
                Ok(())
            }
            _ => Err(GbError::InvalidMountPoint),
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            CARTRIDGE => self.bus().cartridge().is_some(),
            BOOT_ROM => self.boot_rom.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::make_rom;
    use emu_core::cpu_lr35902::MemoryLr35902;

    #[test]
    fn test_gb_system_creation() {
        let sys = GbSystem::new();
        assert!(!sys.is_mounted("Cartridge"));
        assert_eq!(sys.cpu().pc, 0x0100);
        assert_eq!(sys.cpu().sp, 0xFFFE);
    }

    #[test]
    fn test_gb_mount_points() {
        let sys = GbSystem::new();
        let mount_points = sys.mount_points();
        assert_eq!(mount_points.len(), 2);
        assert_eq!(mount_points[0].id, "Cartridge");
        assert!(mount_points[0].required);
        assert_eq!(mount_points[1].id, "BootROM");
        assert!(!mount_points[1].required);
    }

    #[test]
    fn test_gb_mount_unmount() {
        let mut sys = GbSystem::new();
        assert!(!sys.is_mounted("Cartridge"));

        // Mount a minimal ROM
        let rom = vec![0; 0x8000]; // 32KB ROM
        assert!(sys.mount("Cartridge", &rom).is_ok());
        assert!(sys.is_mounted("Cartridge"));

        assert!(sys.unmount("Cartridge").is_ok());
        assert!(!sys.is_mounted("Cartridge"));

        assert!(matches!(sys.mount("Tape", &rom), Err(GbError::InvalidMountPoint)));
    }

    #[test]
    fn test_gb_mount_rejects_short_image() {
        let mut sys = GbSystem::new();
        let result = sys.mount("Cartridge", &[0; 0x100]);
        assert!(matches!(result, Err(GbError::Cartridge(CartridgeError::TooSmall))));
        assert!(!sys.is_mounted("Cartridge"));
    }

    #[test]
    fn test_gb_save_load_state() {
        let sys = GbSystem::new();
        let state = sys.save_state();
        assert_eq!(state["system"], "gb");
        assert_eq!(state["version"], 1);

        let mut sys2 = GbSystem::new();
        assert!(sys2.load_state(&state).is_ok());
    }

    #[test]
    fn test_gb_load_state_wrong_mode() {
        let state = GbSystem::new().save_state();
        let mut sys = GbSystem::with_config(GbConfig {
            color_mode: true,
            ..GbConfig::default()
        });
        assert!(sys.load_state(&state).is_err());
    }

    #[test]
    fn test_gb_supports_save_states() {
        let sys = GbSystem::new();
        assert!(sys.supports_save_states());
    }

    #[test]
    fn test_gb_step_frame_without_cart() {
        let mut sys = GbSystem::new();
        let result = sys.step_frame();
        assert!(result.is_err());
    }

    #[test]
    fn test_gb_step_frame_with_cart() {
        let mut sys = GbSystem::new();
        let rom = vec![0; 0x8000];
        sys.mount("Cartridge", &rom).unwrap();

        let result = sys.step_frame();
        assert!(result.is_ok());
        let frame = result.unwrap();
        assert_eq!(frame.width, 160);
        assert_eq!(frame.height, 144);
        assert_eq!(sys.ppu().ly, 144);
    }

    #[test]
    fn test_gb_frame_takes_70224_dots() {
        let mut sys = GbSystem::new();
        sys.mount("Cartridge", &vec![0; 0x8000]).unwrap();
        sys.step_frame().unwrap();
        let start = sys.cpu().cycles;
        sys.step_frame().unwrap();
        let dots = (sys.cpu().cycles - start) * 4;
        // A NOP stream overshoots by at most one instruction
        assert!((DOTS_PER_FRAME as u64..DOTS_PER_FRAME as u64 + 4).contains(&dots));
    }

    #[test]
    fn test_gb_post_boot_registers() {
        let mut sys = GbSystem::new();
        sys.mount("Cartridge", &vec![0; 0x8000]).unwrap();
        assert_eq!(sys.cpu().af(), 0x0100);
        assert_eq!(sys.bus().read(0xFF40), 0x91);
        assert_eq!(sys.bus().read(0xFF47), 0xFC);
        assert_eq!(sys.ppu().ly, 0);
    }

    #[test]
    fn test_gb_boot_rom_mount() {
        let mut sys = GbSystem::new();
        sys.mount("Cartridge", &vec![0; 0x8000]).unwrap();
        sys.mount("BootROM", &[0x31; 0x100]).unwrap();
        assert!(sys.is_mounted("BootROM"));
        assert_eq!(sys.cpu().pc, 0x0000);
        assert!(sys.bus().is_booting());
        assert_eq!(sys.bus().read(0x0000), 0x31);

        sys.unmount("BootROM").unwrap();
        assert_eq!(sys.cpu().pc, 0x0100);
        assert!(!sys.bus().is_booting());
    }

    #[test]
    fn test_gb_battery_ram() {
        let mut sys = GbSystem::new();
        assert!(matches!(sys.load_battery_ram(&[0; 0x2000]), Err(GbError::NoCartridge)));

        // MBC1 without battery
        sys.mount("Cartridge", &make_rom(0x02, 0, 2)).unwrap();
        assert_eq!(sys.battery_ram(), None);

        sys.mount("Cartridge", &make_rom(0x03, 0, 2)).unwrap();
        let mut save = vec![0; 0x2000];
        save[0x10] = 0x5A;
        sys.load_battery_ram(&save).unwrap();
        assert_eq!(sys.battery_ram(), Some(save));

        assert!(matches!(
            sys.load_battery_ram(&[0; 0x100]),
            Err(GbError::Cartridge(CartridgeError::SaveSizeMismatch { .. }))
        ));
    }

    #[test]
    fn test_gb_reset_keeps_cartridge_ram() {
        let mut sys = GbSystem::new();
        sys.mount("Cartridge", &make_rom(0x03, 0, 2)).unwrap();
        sys.cpu_mut().memory.write(0x0000, 0x0A);
        sys.cpu_mut().memory.write(0xA000, 0x99);
        sys.cpu_mut().pc = 0x1234;

        sys.reset();
        assert_eq!(sys.cpu().pc, 0x0100);
        assert_eq!(sys.battery_ram().map(|r| r[0]), Some(0x99));
        // Controller registers are back to power-on values
        assert!(!sys.bus().mbc().is_some_and(|m| m.ram_enabled()));
    }

    #[test]
    fn test_gb_input_flags() {
        let mut sys = GbSystem::new();
        sys.mount("Cartridge", &vec![0; 0x8000]).unwrap();
        sys.set_input_source(Box::new(Buttons {
            quit: true,
            turbo: true,
            ..Buttons::default()
        }));
        assert!(!sys.quit_requested());
        sys.step_frame().unwrap();
        assert!(sys.quit_requested());
        assert!(sys.turbo());

        // The source survives a reset
        sys.reset();
        sys.step_frame().unwrap();
        assert!(sys.quit_requested());
    }

    #[test]
    fn test_gb_compat_mode() {
        let config = GbConfig {
            color_mode: true,
            ..GbConfig::default()
        };
        let mut sys = GbSystem::with_config(config);
        sys.mount("Cartridge", &vec![0; 0x8000]).unwrap();
        assert!(sys.compat_mode());
        assert_eq!(sys.cpu().a, 0x11);
        // Background palette 0 seeded with the monochrome shades
        let shades = sys.config().palette();
        assert_eq!(sys.bus().bg_palette.argb[0], shades.shade(0));
        assert_eq!(sys.bus().obj_palette.argb[7], shades.shade(3));

        let mut color_rom = vec![0; 0x8000];
        color_rom[0x143] = 0x80;
        sys.mount("Cartridge", &color_rom).unwrap();
        assert!(!sys.compat_mode());
    }

    #[test]
    fn test_gb_speed_switch_scales_following_dispatch() {
        let config = GbConfig {
            color_mode: true,
            ..GbConfig::default()
        };
        let mut sys = GbSystem::with_config(config);
        let mut rom = make_rom(0x00, 0, 0);
        rom[0x100] = 0x10; // stop
        rom[0x143] = 0x80;
        sys.mount("Cartridge", &rom).unwrap();

        sys.cpu_mut().memory.write(0xFF4D, 0x01);
        sys.cpu_mut().memory.write(0xFFFF, 0x01);
        sys.cpu_mut().memory.write(0xFF0F, 0x01);
        sys.cpu_mut().ime = true;

        assert_eq!(sys.step(), 0);
        assert!(sys.cpu().double_speed);
        assert_eq!(sys.cpu().pc, 0x40);
        // Five M-cycles at two dots each
        assert_eq!(sys.backlog, 10);
    }
}
