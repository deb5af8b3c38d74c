//! Core emulator primitives and traits.

pub mod cpu_lr35902;
pub mod logging;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// Row-major framebuffer of opaque ARGB pixels.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self::filled(width, height, 0)
        }

        pub fn filled(width: u32, height: u32, argb: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![argb; (width * height) as usize],
            }
        }

        /// Out-of-bounds coordinates are ignored.
        pub fn set_pixel(&mut self, x: u32, y: u32, argb: u32) {
            if x < self.width && y < self.height {
                self.pixels[(y * self.width + x) as usize] = argb;
            }
        }

        pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
            if x < self.width && y < self.height {
                Some(self.pixels[(y * self.width + x) as usize])
            } else {
                None
            }
        }
    }
}

use serde_json::Value;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}

/// Description of a media slot a system accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Identifier passed to [`System::mount`] (e.g. "Cartridge", "BootROM")
    pub id: String,
    /// Display name
    pub name: String,
    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,
    /// Whether the system can run without this slot filled
    pub required: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Emulate until a frame is produced and return a framebuffer.
    fn step_frame(&mut self) -> Result<types::Frame, Self::Error>;

    /// JSON snapshot of machine state. Never includes ROM contents.
    fn save_state(&self) -> Value;

    /// Restore a snapshot produced by [`System::save_state`].
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    fn supports_save_states(&self) -> bool {
        false
    }

    fn mount_points(&self) -> Vec<MountPointInfo>;

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    fn is_mounted(&self, mount_point_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(160, 144);
        assert_eq!(f.pixels.len(), 160 * 144);
        assert_eq!(f.width, 160);
        assert_eq!(f.height, 144);
    }

    #[test]
    fn frame_pixel_access_is_bounds_checked() {
        let mut f = types::Frame::filled(4, 2, 0xFF00_0000);
        f.set_pixel(3, 1, 0xFFFF_FFFF);
        f.set_pixel(4, 1, 0x1234_5678);
        assert_eq!(f.pixel(3, 1), Some(0xFFFF_FFFF));
        assert_eq!(f.pixel(0, 0), Some(0xFF00_0000));
        assert_eq!(f.pixel(4, 0), None);
        assert_eq!(f.pixels[7], 0xFFFF_FFFF);
    }

    struct MockSystem {
        mounted: bool,
    }

    impl System for MockSystem {
        type Error = std::convert::Infallible;

        fn reset(&mut self) {}

        fn step_frame(&mut self) -> Result<types::Frame, Self::Error> {
            Ok(types::Frame::new(2, 2))
        }

        fn save_state(&self) -> serde_json::Value {
            serde_json::json!({"mock": true, "version": 1})
        }

        fn load_state(&mut self, _v: &serde_json::Value) -> Result<(), serde_json::Error> {
            Ok(())
        }

        fn mount_points(&self) -> Vec<MountPointInfo> {
            vec![MountPointInfo {
                id: "Cartridge".to_string(),
                name: "Cartridge Slot".to_string(),
                extensions: vec!["gb".to_string(), "gbc".to_string()],
                required: true,
            }]
        }

        fn mount(&mut self, _mount_point_id: &str, _data: &[u8]) -> Result<(), Self::Error> {
            self.mounted = true;
            Ok(())
        }

        fn unmount(&mut self, _mount_point_id: &str) -> Result<(), Self::Error> {
            self.mounted = false;
            Ok(())
        }

        fn is_mounted(&self, _mount_point_id: &str) -> bool {
            self.mounted
        }
    }

    #[test]
    fn mock_system_save_load_roundtrip() {
        let sys = MockSystem { mounted: false };
        let s = serde_json::to_string(&sys.save_state()).expect("serialize");
        let v: serde_json::Value = serde_json::from_str(&s).expect("deserialize");
        let mut sys2 = MockSystem { mounted: false };
        assert!(sys2.load_state(&v).is_ok());
        assert!(!sys2.supports_save_states());
    }

    #[test]
    fn test_system_mount_operations() {
        let mut sys = MockSystem { mounted: false };
        let mount_points = sys.mount_points();
        assert_eq!(mount_points[0].id, "Cartridge");
        assert!(mount_points[0].required);

        assert!(!sys.is_mounted("Cartridge"));
        assert!(sys.mount("Cartridge", &[1, 2, 3]).is_ok());
        assert!(sys.is_mounted("Cartridge"));
        assert!(sys.unmount("Cartridge").is_ok());
        assert!(!sys.is_mounted("Cartridge"));
    }
}
