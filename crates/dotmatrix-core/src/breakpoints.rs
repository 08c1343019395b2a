use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// Memory breakpoint over an address range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub enabled: bool,
    pub range: RangeInclusive<u16>,
    pub on_read: bool,
    pub on_write: bool,
    pub value_match: Option<u8>,
}

impl Breakpoint {
    /// Enabled breakpoint on `range` for the given accesses. The id is
    /// assigned when it is added.
    pub fn new(range: RangeInclusive<u16>, on_read: bool, on_write: bool) -> Self {
        Self {
            id: 0,
            enabled: true,
            range,
            on_read,
            on_write,
            value_match: None,
        }
    }

    pub fn with_value(mut self, value: u8) -> Self {
        self.value_match = Some(value);
        self
    }

    pub fn matches_addr(&self, addr: u16) -> bool {
        self.range.contains(&addr)
    }

    pub fn matches_value(&self, value: u8) -> bool {
        self.value_match.is_none_or(|expected| expected == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub id: u32,
    pub access: AccessKind,
    pub addr: u16,
    pub value: u8,
}

/// Breakpoint set consulted on every bus access. Hits are queued in the
/// order they happen and drained by the machine after each instruction.
#[derive(Debug, Default, Clone)]
pub struct Breakpoints {
    list: Vec<Breakpoint>,
    pc_breakpoints: Vec<u16>,
    next_id: u32,
    has_read: bool,
    has_write: bool,
    hits: Vec<BreakpointHit>,
}

impl Breakpoints {
    /// Add a breakpoint and return its id.
    pub fn add(&mut self, mut bp: Breakpoint) -> u32 {
        self.next_id += 1;
        bp.id = self.next_id;
        self.list.push(bp);
        self.recompute_fast_paths();
        self.next_id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.list.len();
        self.list.retain(|bp| bp.id != id);
        self.recompute_fast_paths();
        self.list.len() != before
    }

    pub fn set_enabled(&mut self, id: u32, enabled: bool) {
        if let Some(bp) = self.list.iter_mut().find(|bp| bp.id == id) {
            bp.enabled = enabled;
        }
        self.recompute_fast_paths();
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.list
    }

    pub fn add_pc(&mut self, pc: u16) {
        if !self.pc_breakpoints.contains(&pc) {
            self.pc_breakpoints.push(pc);
        }
    }

    pub fn remove_pc(&mut self, pc: u16) -> bool {
        let before = self.pc_breakpoints.len();
        self.pc_breakpoints.retain(|&p| p != pc);
        self.pc_breakpoints.len() != before
    }

    pub fn is_pc_breakpoint(&self, pc: u16) -> bool {
        !self.pc_breakpoints.is_empty() && self.pc_breakpoints.contains(&pc)
    }

    pub fn take_hits(&mut self) -> Vec<BreakpointHit> {
        std::mem::take(&mut self.hits)
    }

    #[inline]
    pub fn note_read(&mut self, addr: u16, value: u8) {
        if self.has_read {
            self.scan(AccessKind::Read, addr, value);
        }
    }

    #[inline]
    pub fn note_write(&mut self, addr: u16, value: u8) {
        if self.has_write {
            self.scan(AccessKind::Write, addr, value);
        }
    }

    fn scan(&mut self, access: AccessKind, addr: u16, value: u8) {
        for bp in &self.list {
            let wanted = match access {
                AccessKind::Read => bp.on_read,
                AccessKind::Write => bp.on_write,
            };
            if !bp.enabled || !wanted || !bp.matches_addr(addr) || !bp.matches_value(value) {
                continue;
            }
            self.hits.push(BreakpointHit {
                id: bp.id,
                access,
                addr,
                value,
            });
        }
    }

    fn recompute_fast_paths(&mut self) {
        self.has_read = self.list.iter().any(|bp| bp.enabled && bp.on_read);
        self.has_write = self.list.iter().any(|bp| bp.enabled && bp.on_write);
    }
}
