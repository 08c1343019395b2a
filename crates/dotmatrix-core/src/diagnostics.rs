use std::fmt;

use crate::error::Fault;

/// Why the machine stopped running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Fault(Fault),
    /// STOP executed without an armed speed switch.
    StopInstruction,
    /// `Machine::stop` was called.
    HostRequest,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Fault(fault) => fault.fmt(f),
            StopReason::StopInstruction => f.write_str("STOP instruction"),
            StopReason::HostRequest => f.write_str("stopped by host"),
        }
    }
}

/// Snapshot taken when the machine stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub reason: StopReason,
    pub last_opcode: u8,
    pub pc: u16,
    pub last_cycles: u32,
    pub total_cycles: u64,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (last opcode {:#04X} at {:#06X}, {} cycles, {} total)",
            self.reason, self.last_opcode, self.pc, self.last_cycles, self.total_cycles
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason_and_location() {
        let diag = Diagnostic {
            reason: StopReason::Fault(Fault::UnknownOpcode {
                opcode: 0xDD,
                pc: 0x0150,
            }),
            last_opcode: 0xDD,
            pc: 0x0150,
            last_cycles: 4,
            total_cycles: 1234,
        };
        let text = diag.to_string();
        assert!(text.starts_with("unknown opcode 0xDD at 0x0150"));
        assert!(text.contains("1234 total"));
    }
}
