use anyhow::{Context, Result};
use clap::Parser;
use emu_core::logging::{LogConfig, LogLevel};
use emu_core::types::Frame;
use emu_core::System;
use emu_gb::{GbConfig, GbSystem};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Headless Game Boy / Game Boy Color runner
#[derive(Parser)]
struct Args {
    /// Cartridge image (.gb / .gbc)
    rom: PathBuf,

    /// Emulate color hardware
    #[arg(long, default_value_t = false)]
    color: bool,

    /// Monochrome palette preset (0-10)
    #[arg(long, default_value_t = 0)]
    palette: usize,

    /// Boot ROM image; without one execution starts at 0x0100
    #[arg(long)]
    boot: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Directory for battery saves (defaults to the ROM's directory)
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Write core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Load this save-state before running and write it back afterwards
    #[arg(long)]
    state: Option<PathBuf>,

    /// Write the last frame as a binary PPM image
    #[arg(long)]
    dump_frame: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let level = LogLevel::from_str(&args.log_level)
        .with_context(|| format!("unknown log level {:?}", args.log_level))?;
    LogConfig::global().set_global_level(level);
    if let Some(path) = &args.log_file {
        LogConfig::global()
            .set_log_file(path.clone())
            .with_context(|| format!("cannot open log file {}", path.display()))?;
    }

    let config = GbConfig {
        color_mode: args.color,
        dmg_palette: args.palette,
        skip_boot: args.boot.is_none(),
    };
    let mut sys = GbSystem::with_config(config);

    if let Some(boot) = &args.boot {
        let data = fs::read(boot).with_context(|| format!("cannot read {}", boot.display()))?;
        sys.mount("BootROM", &data)?;
    }

    let rom = fs::read(&args.rom).with_context(|| format!("cannot read {}", args.rom.display()))?;
    sys.mount("Cartridge", &rom)?;

    let save_path = battery_path(&args);
    if sys.battery_ram().is_some() && save_path.exists() {
        let data = fs::read(&save_path)?;
        match sys.load_battery_ram(&data) {
            Ok(()) => log::info!("loaded {}", save_path.display()),
            Err(e) => log::warn!("ignoring {}: {}", save_path.display(), e),
        }
    }

    if let Some(path) = args.state.as_ref().filter(|p| p.exists()) {
        let text = fs::read_to_string(path)?;
        let state: serde_json::Value = serde_json::from_str(&text)?;
        sys.load_state(&state)
            .with_context(|| format!("cannot restore {}", path.display()))?;
        log::info!("restored state from {}", path.display());
    }

    let mut last = None;
    for n in 1..=args.frames {
        last = Some(sys.step_frame()?);
        if sys.quit_requested() {
            log::info!("quit requested after {} frames", n);
            break;
        }
    }

    if let Some(data) = sys.battery_ram() {
        fs::write(&save_path, data)
            .with_context(|| format!("cannot write {}", save_path.display()))?;
        log::info!("wrote {}", save_path.display());
    }

    if let Some(path) = &args.state {
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&sys.save_state())?)?;
    }

    if let (Some(path), Some(frame)) = (&args.dump_frame, &last) {
        write_ppm(path, frame)?;
    }

    if let Some(frame) = &last {
        println!("Produced frame {}x{}", frame.width, frame.height);
    }
    Ok(())
}

/// `<save_dir or rom dir>/<rom stem>.sav`
fn battery_path(args: &Args) -> PathBuf {
    let dir = args
        .save_dir
        .clone()
        .or_else(|| args.rom.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let stem = args.rom.file_stem().unwrap_or_default();
    dir.join(stem).with_extension("sav")
}

fn write_ppm(path: &Path, frame: &Frame) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    for &argb in &frame.pixels {
        out.write_all(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8])?;
    }
    out.flush()?;
    Ok(())
}
