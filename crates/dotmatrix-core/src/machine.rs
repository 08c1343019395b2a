use log::{error, info};

use crate::{
    breakpoints::{Breakpoint, BreakpointHit},
    cartridge::{Header, place_image},
    config::{MachineConfig, UnknownOpcodePolicy},
    cpu::{Cpu, CpuState},
    diagnostics::{Diagnostic, StopReason},
    error::{CartridgeError, Fault, StateError},
    gpu::{FRAME_CYCLES, Gpu},
    mbc::Mbc,
    memory::Memory,
    savestate::{self, RomDigest},
};

/// Callback slots a host can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    VBlank,
    Timer,
    LcdPower,
    /// Breakpoints, PC breakpoints and trapped opcodes.
    Debug,
}

const HOOK_COUNT: usize = 4;

/// What a hook is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    VBlank { frame: u64 },
    TimerOverflow,
    LcdPower { on: bool },
    Breakpoint { hit: BreakpointHit, pc: u16 },
    PcBreakpoint { pc: u16 },
    UnknownOpcode { opcode: u8, pc: u16 },
}

impl Event {
    pub fn hook(&self) -> Hook {
        match self {
            Event::VBlank { .. } => Hook::VBlank,
            Event::TimerOverflow => Hook::Timer,
            Event::LcdPower { .. } => Hook::LcdPower,
            Event::Breakpoint { .. } | Event::PcBreakpoint { .. } | Event::UnknownOpcode { .. } => {
                Hook::Debug
            }
        }
    }
}

pub type HookFn = Box<dyn FnMut(&mut Machine, Event)>;

/// A complete Game Boy: CPU, memory map and the configuration it was
/// built with.
pub struct Machine {
    cpu: Cpu,
    memory: Memory,
    header: Header,
    config: MachineConfig,
    cgb: bool,
    running: bool,
    paused: bool,
    single_step: bool,
    /// Set after a PC breakpoint fired so resuming executes the instruction.
    skip_pc_break: bool,
    diagnostic: Option<Diagnostic>,
    hooks: [Option<HookFn>; HOOK_COUNT],
}

impl Machine {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        Self::with_config(rom, MachineConfig::default())
    }

    pub fn with_config(rom: Vec<u8>, config: MachineConfig) -> Result<Self, CartridgeError> {
        Self::build(rom, None, config)
    }

    /// Start from power on, running `boot_rom` first.
    pub fn with_boot_rom(
        rom: Vec<u8>,
        boot_rom: Vec<u8>,
        config: MachineConfig,
    ) -> Result<Self, CartridgeError> {
        Self::build(rom, Some(boot_rom), config)
    }

    fn build(
        rom: Vec<u8>,
        boot_rom: Option<Vec<u8>>,
        config: MachineConfig,
    ) -> Result<Self, CartridgeError> {
        let header = Header::parse(&rom)?;
        let cgb = config.emulation_mode.resolve(header.cgb);
        info!(
            "loaded \"{}\": {:?}, {:#X} bytes RAM, {} mode",
            header.title,
            header.version,
            header.ram_size,
            if cgb { "CGB" } else { "DMG" }
        );
        let (cpu, memory) = Self::assemble(place_image(rom), &header, boot_rom, cgb, &config);
        Ok(Self {
            cpu,
            memory,
            header,
            config,
            cgb,
            running: true,
            paused: false,
            single_step: false,
            skip_pc_break: false,
            diagnostic: None,
            hooks: [None, None, None, None],
        })
    }

    fn assemble(
        rom: Vec<u8>,
        header: &Header,
        boot_rom: Option<Vec<u8>>,
        cgb: bool,
        config: &MachineConfig,
    ) -> (Cpu, Memory) {
        let dmg_compat = cgb && !header.cgb;
        let mut mbc = Mbc::new(rom, header, cgb);
        mbc.set_verbose(config.verbose_banking);
        let mut cpu = Cpu::new(cgb, boot_rom.is_some());
        cpu.set_trace(config.verbose_instructions);
        let mut memory = Memory::new(mbc, cgb, dmg_compat, boot_rom);
        memory.gpu.set_pixel_mode(config.pixel_mode);
        memory.gpu.set_dmg_palette(config.dmg_palette);
        memory.gpu.clear_frame();
        (cpu, memory)
    }

    /// Power cycle with the same cartridge, boot ROM and configuration.
    /// Hooks and breakpoints are kept.
    pub fn reset(&mut self) {
        let rom = self.memory.mbc.take_rom();
        let boot_rom = self.memory.take_boot_rom();
        let boot_rom = (!boot_rom.is_empty()).then_some(boot_rom);
        let breakpoints = std::mem::take(&mut self.memory.breakpoints);
        let (cpu, mut memory) = Self::assemble(rom, &self.header, boot_rom, self.cgb, &self.config);
        memory.breakpoints = breakpoints;
        self.cpu = cpu;
        self.memory = memory;
        self.running = true;
        self.paused = false;
        self.skip_pc_break = false;
        self.diagnostic = None;
    }

    /// Execute one instruction and advance the rest of the machine by the
    /// cycles it took. Returns those cycles, or 0 when nothing ran.
    pub fn simulate(&mut self) -> u32 {
        if !self.running || self.paused {
            return 0;
        }

        let pc = self.cpu.regs.pc;
        if self.cpu.state == CpuState::Running
            && !self.skip_pc_break
            && self.memory.breakpoints.is_pc_breakpoint(pc)
        {
            self.skip_pc_break = true;
            self.paused = true;
            self.dispatch(Event::PcBreakpoint { pc });
            return 0;
        }
        self.skip_pc_break = false;

        let mut cycles = match self.cpu.simulate(&mut self.memory) {
            Ok(cycles) => cycles,
            Err(Fault::UnknownOpcode { opcode, pc })
                if self.config.unknown_opcode == UnknownOpcodePolicy::Trap =>
            {
                self.paused = true;
                self.dispatch(Event::UnknownOpcode { opcode, pc });
                return 0;
            }
            Err(fault) => {
                self.halt_with(StopReason::Fault(fault));
                return 0;
            }
        };

        // Blocking VRAM DMA freezes the CPU while the rest keeps running.
        let stall = self.memory.take_stall();
        self.cpu.add_stall(stall);
        cycles += stall;
        let outcome = self.memory.simulate(cycles);

        for hit in self.memory.breakpoints.take_hits() {
            self.paused = true;
            let pc = self.cpu.last_pc();
            self.dispatch(Event::Breakpoint { hit, pc });
        }
        if let Some(on) = self.memory.gpu.take_power_event() {
            self.dispatch(Event::LcdPower { on });
        }
        if outcome.timer_overflow {
            self.dispatch(Event::TimerOverflow);
        }
        if outcome.vblank {
            let frame = self.memory.gpu.frame_count();
            self.dispatch(Event::VBlank { frame });
        }

        if let Some(fault) = self.memory.take_fault() {
            self.halt_with(StopReason::Fault(fault));
        } else if self.cpu.state == CpuState::Stopped {
            self.halt_with(StopReason::StopInstruction);
        }
        if self.single_step {
            self.paused = true;
        }
        cycles
    }

    /// Run until a frame completes, the machine stops or pauses, or a
    /// frame's worth of cycles passes with the LCD off. Returns the cycles
    /// executed.
    pub fn simulate_one_frame(&mut self) -> u64 {
        let start = self.memory.gpu.frame_count();
        let mut total = 0u64;
        let mut lcd_off = 0u64;
        while self.running && !self.paused {
            let cycles = self.simulate() as u64;
            total += cycles;
            if self.memory.gpu.frame_count() != start {
                break;
            }
            if self.memory.io.lcd_enabled() {
                lcd_off = 0;
            } else {
                lcd_off += cycles;
                let speed = if self.memory.io.double_speed() { 2 } else { 1 };
                if lcd_off >= FRAME_CYCLES as u64 * speed {
                    break;
                }
            }
        }
        total
    }

    fn dispatch(&mut self, event: Event) {
        let slot = event.hook() as usize;
        if let Some(mut hook) = self.hooks[slot].take() {
            hook(self, event);
            // A callback may have installed a replacement for itself.
            if self.hooks[slot].is_none() {
                self.hooks[slot] = Some(hook);
            }
        }
    }

    fn halt_with(&mut self, reason: StopReason) {
        self.running = false;
        let diagnostic = Diagnostic {
            reason,
            last_opcode: self.cpu.last_opcode(),
            pc: self.cpu.last_pc(),
            last_cycles: self.cpu.last_cycles(),
            total_cycles: self.cpu.cycles(),
        };
        match reason {
            StopReason::Fault(_) => error!("machine stopped: {diagnostic}"),
            _ => info!("machine stopped: {diagnostic}"),
        }
        self.diagnostic = Some(diagnostic);
    }

    pub fn set_hook<F>(&mut self, hook: Hook, callback: F)
    where
        F: FnMut(&mut Machine, Event) + 'static,
    {
        self.hooks[hook as usize] = Some(Box::new(callback));
    }

    pub fn clear_hook(&mut self, hook: Hook) {
        self.hooks[hook as usize] = None;
    }

    /// Joypad state, one bit per button, 1 = pressed. See
    /// [`crate::joypad::buttons`].
    pub fn set_inputs(&mut self, mask: u8) {
        self.memory.set_inputs(mask);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        if self.running {
            self.halt_with(StopReason::HostRequest);
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    pub fn add_breakpoint(&mut self, bp: Breakpoint) -> u32 {
        self.memory.breakpoints.add(bp)
    }

    pub fn remove_breakpoint(&mut self, id: u32) -> bool {
        self.memory.breakpoints.remove(id)
    }

    pub fn add_pc_breakpoint(&mut self, pc: u16) {
        self.memory.breakpoints.add_pc(pc);
    }

    pub fn remove_pc_breakpoint(&mut self, pc: u16) -> bool {
        self.memory.breakpoints.remove_pc(pc)
    }

    /// Pause after every instruction.
    pub fn set_single_step(&mut self, enabled: bool) {
        self.single_step = enabled;
    }

    pub fn set_verbose_instructions(&mut self, enabled: bool) {
        self.config.verbose_instructions = enabled;
        self.cpu.set_trace(enabled);
    }

    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        savestate::encode(&self.cpu, &self.memory)
    }

    /// Restore a state taken with the same ROM. Hooks, breakpoints and
    /// presentation settings stay as they are.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), StateError> {
        let digest = RomDigest::of(self.memory.mbc.rom());
        let (mut cpu, mut memory) = savestate::decode(bytes, digest)?;

        memory.mbc.attach_rom(self.memory.mbc.take_rom());
        memory.mbc.set_verbose(self.config.verbose_banking);
        memory.attach_boot_rom(self.memory.take_boot_rom());
        memory.breakpoints = std::mem::take(&mut self.memory.breakpoints);
        memory.gpu.set_pixel_mode(self.config.pixel_mode);
        memory.gpu.set_dmg_palette(self.config.dmg_palette);
        memory.gpu.clear_frame();
        cpu.set_trace(self.config.verbose_instructions);

        self.cgb = memory.io.is_cgb();
        self.cpu = cpu;
        self.memory = memory;
        self.running = true;
        self.paused = false;
        self.skip_pc_break = false;
        self.diagnostic = None;
        Ok(())
    }

    pub fn gpu(&self) -> &Gpu {
        &self.memory.gpu
    }

    pub fn pixels(&self) -> &[u32] {
        self.memory.gpu.pixels()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Master clock in CPU cycles.
    pub fn now(&self) -> u64 {
        self.cpu.cycles()
    }

    pub fn frame_count(&self) -> u64 {
        self.memory.gpu.frame_count()
    }

    /// Bytes sent over the serial port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.memory.io.serial.take_output()
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }
}
