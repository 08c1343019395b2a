mod config;
mod error;
mod screenshot;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use dotmatrix_core::{Machine, config::EmulationMode, gpu::PixelMode};
use log::{LevelFilter, error, info, warn};

use crate::{config::CliConfig, error::CliError};

#[derive(Parser, Debug)]
#[command(name = "dotmatrix", version, about = "Headless Game Boy / Game Boy Color runner")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// TOML file with machine settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Restore this savestate before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a savestate here after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply(&self, cfg: &mut CliConfig) {
        if self.dmg {
            cfg.machine.emulation_mode = EmulationMode::ForceDmg;
        } else if self.cgb {
            cfg.machine.emulation_mode = EmulationMode::ForceCgb;
        }
        if self.trace {
            cfg.machine.verbose_instructions = true;
        }
        if let Some(path) = &self.bootrom {
            cfg.boot_rom = Some(path.clone());
        }
        // Screenshots are written straight from the frame buffer.
        cfg.machine.pixel_mode = PixelMode::Rgba;
    }
}

fn init_logger(trace: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp(None);
    if trace {
        builder.filter_level(LevelFilter::Trace);
    }
    builder.init();
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|e| CliError::io(path, e))
}

/// Collects serial bytes and logs them a line at a time.
#[derive(Default)]
struct SerialLog {
    line: Vec<u8>,
}

impl SerialLog {
    fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.flush();
            } else {
                self.line.push(b);
            }
        }
    }

    fn flush(&mut self) {
        if !self.line.is_empty() {
            info!("serial: {}", String::from_utf8_lossy(&self.line));
            self.line.clear();
        }
    }
}

fn run(args: &Args) -> Result<bool, CliError> {
    let mut cfg = args
        .config
        .as_deref()
        .map(config::load_from_file)
        .unwrap_or_default();
    args.apply(&mut cfg);

    let rom = read(&args.rom)?;
    let mut machine = match &cfg.boot_rom {
        Some(path) => Machine::with_boot_rom(rom, read(path)?, cfg.machine)?,
        None => Machine::with_config(rom, cfg.machine)?,
    };
    info!(
        "Emulator initialized in {} mode",
        if machine.is_cgb() { "CGB" } else { "DMG" }
    );

    if let Some(path) = &args.load_state {
        machine.load_state(&read(path)?)?;
        info!("restored {}", path.display());
    }

    let mut serial = SerialLog::default();
    for _ in 0..args.frames {
        machine.simulate_one_frame();
        serial.push(&machine.take_serial_output());
        if !machine.is_running() {
            break;
        }
        if machine.is_paused() {
            warn!("paused at {:#06X}; ending run", machine.cpu().regs.pc);
            break;
        }
    }
    serial.flush();
    info!(
        "ran {} frame(s), {} cycles",
        machine.frame_count(),
        machine.now()
    );

    if let Some(path) = &args.screenshot {
        screenshot::save_png(path, machine.pixels())?;
        info!("wrote {}", path.display());
    }
    if let Some(path) = &args.save_state {
        let state = machine.save_state()?;
        std::fs::write(path, state).map_err(|e| CliError::io(path, e))?;
        info!("wrote {}", path.display());
    }

    match machine.diagnostic() {
        Some(diagnostic) => {
            error!("{diagnostic}");
            Ok(false)
        }
        None => Ok(true),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.trace);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
