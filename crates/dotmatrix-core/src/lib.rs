//! Cycle-stepped Game Boy / Game Boy Color emulation core.
//!
//! This crate contains the platform-agnostic machine (CPU, memory map, pixel
//! processor, cartridge controllers). Hosts live in separate crates and drive
//! the core through the [`machine`] facade.

/// Sound register stub with the NR52 power latch.
pub mod apu;

/// Memory breakpoints observed on every bus access.
pub mod breakpoints;

/// Cartridge header parsing.
pub mod cartridge;

/// Machine configuration shared with hosts.
pub mod config;

/// LR35902 CPU core.
pub mod cpu;

/// Stop reasons and the diagnostic snapshot.
pub mod diagnostics;

/// OAM DMA and CGB VRAM DMA.
pub mod dma;

pub mod error;

/// Pixel processor timing and rendering.
pub mod gpu;

/// Opcode classification and mnemonics.
pub mod instructions;

/// Interrupt sources and bookkeeping.
pub mod interrupts;

/// I/O register block at 0xFF00-0xFF7F.
pub mod io;

/// Joypad input register and its interrupt.
pub mod joypad;

/// High-level facade that wires the CPU and memory into a single machine.
pub mod machine;

/// Memory-bank controllers and work RAM.
pub mod mbc;

/// Memory map and bus access.
pub mod memory;

/// Register file and ALU.
pub mod registers;

/// MBC3 real-time clock.
pub mod rtc;

/// Savestate stream format.
pub mod savestate;

/// Serial port without a link partner.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

pub use config::MachineConfig;
pub use machine::{Event, Hook, Machine};
