//! Breakpoint bookkeeping: instruction, application-trigger, data, and
//! call-trap breakpoints, plus the instruction scoreboard used to track
//! opcode coverage across a run.
//!
//! The run loop consults `BreakpointEngine` in a fixed priority order every
//! step (see `check_instruction`/`check_data`): instruction breakpoints
//! first, then the single application trigger slot, then data breakpoints,
//! then the call trap. Each kind maps to a distinct `StopReason` so a caller
//! can tell why execution paused without re-inspecting `pc`.

use crate::memory::Page;

const MAX_INSTR_BREAKPOINTS: usize = 8;
const MAX_DATA_BREAKPOINTS: usize = 8;

/// Direction mask for a data breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAccess {
    pub read: bool,
    pub write: bool,
}

impl DataAccess {
    pub const READ: DataAccess = DataAccess { read: true, write: false };
    pub const WRITE: DataAccess = DataAccess { read: false, write: true };
    pub const READ_WRITE: DataAccess = DataAccess { read: true, write: true };

    fn matches(self, is_write: bool) -> bool {
        if is_write {
            self.write
        } else {
            self.read
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DataBreakpoint {
    addr: u16,
    access: DataAccess,
}

/// Which precode class an opcode was dispatched under, used to index the
/// instruction scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecodeClass {
    None,
    P72,
    P90,
    P91,
    P92,
}

impl PrecodeClass {
    fn index(self) -> usize {
        match self {
            PrecodeClass::None => 0,
            PrecodeClass::P72 => 1,
            PrecodeClass::P90 => 2,
            PrecodeClass::P91 => 3,
            PrecodeClass::P92 => 4,
        }
    }
}

/// Instruction/data/application/call breakpoint tables, plus the opcode
/// coverage scoreboard (5 precode classes x 256 opcodes).
pub struct BreakpointEngine {
    instruction: Vec<u32>,
    application_trigger: Option<u32>,
    data: Vec<DataBreakpoint>,
    call_trap_enabled: bool,
    data_triggered: Option<(u16, DataAccess)>,
    scoreboard: [[bool; 256]; 5],
}

impl Default for BreakpointEngine {
    fn default() -> Self {
        BreakpointEngine {
            instruction: Vec::new(),
            application_trigger: None,
            data: Vec::new(),
            call_trap_enabled: false,
            data_triggered: None,
            scoreboard: [[false; 256]; 5],
        }
    }
}

impl BreakpointEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction breakpoint. Returns `false` if the table is full
    /// or `addr` is already present.
    pub fn add_instruction(&mut self, addr: u32) -> bool {
        if self.instruction.len() >= MAX_INSTR_BREAKPOINTS || self.instruction.contains(&addr) {
            return false;
        }
        self.instruction.push(addr);
        true
    }

    pub fn remove_instruction(&mut self, addr: u32) {
        self.instruction.retain(|&a| a != addr);
    }

    pub fn set_application_trigger(&mut self, addr: u32) {
        self.application_trigger = Some(addr);
    }

    pub fn clear_application_trigger(&mut self) {
        self.application_trigger = None;
    }

    /// Adds a data breakpoint. Returns `false` if the table is full.
    pub fn add_data(&mut self, addr: u16, access: DataAccess) -> bool {
        if self.data.len() >= MAX_DATA_BREAKPOINTS {
            return false;
        }
        self.data.push(DataBreakpoint { addr, access });
        true
    }

    pub fn remove_data(&mut self, addr: u16) {
        self.data.retain(|bp| bp.addr != addr);
    }

    pub fn set_call_trap(&mut self, enabled: bool) {
        self.call_trap_enabled = enabled;
    }

    pub fn call_trap_enabled(&self) -> bool {
        self.call_trap_enabled
    }

    /// Called by `AddressSpace`'s data-access path (via the run loop) on
    /// every load/store; records the first match this step so `poll_data`
    /// can report it once the instruction finishes.
    pub fn observe_access(&mut self, addr: u16, is_write: bool) {
        if self.data_triggered.is_some() {
            return;
        }
        for bp in &self.data {
            if bp.addr == addr && bp.access.matches(is_write) {
                self.data_triggered = Some((addr, bp.access));
                return;
            }
        }
    }

    /// Drains and returns the data breakpoint hit recorded this step, if any.
    pub fn poll_data(&mut self) -> Option<(u16, DataAccess)> {
        self.data_triggered.take()
    }

    /// Checked before fetching the next instruction. Priority: instruction
    /// breakpoint, then the application trigger.
    pub fn check_pc(&self, pc: u32) -> Option<BreakHit> {
        if self.instruction.contains(&pc) {
            return Some(BreakHit::Instruction);
        }
        if self.application_trigger == Some(pc) {
            return Some(BreakHit::Application);
        }
        None
    }

    pub fn mark_executed(&mut self, class: PrecodeClass, opcode: u8) {
        self.scoreboard[class.index()][opcode as usize] = true;
    }

    pub fn was_executed(&self, class: PrecodeClass, opcode: u8) -> bool {
        self.scoreboard[class.index()][opcode as usize]
    }

    pub fn coverage_count(&self) -> usize {
        self.scoreboard.iter().flatten().filter(|&&hit| hit).count()
    }
}

/// Which breakpoint kind fired, from `BreakpointEngine::check_pc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakHit {
    Instruction,
    Application,
}

/// A hard-coded firmware location of interest that the run loop reports
/// through the ambient logging layer without stopping execution.
#[derive(Debug, Clone, Copy)]
pub struct ProbePoint {
    pub pc: u32,
    pub page: Page,
    pub label: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_breakpoint_table_caps_at_eight() {
        let mut bp = BreakpointEngine::new();
        for i in 0..8 {
            assert!(bp.add_instruction(0x4000 + i));
        }
        assert!(!bp.add_instruction(0x5000));
    }

    #[test]
    fn data_breakpoint_matches_direction() {
        let mut bp = BreakpointEngine::new();
        bp.add_data(0x0100, DataAccess::WRITE);
        bp.observe_access(0x0100, false);
        assert!(bp.poll_data().is_none());
        bp.observe_access(0x0100, true);
        assert_eq!(bp.poll_data(), Some((0x0100, DataAccess::WRITE)));
    }

    #[test]
    fn application_trigger_reports_distinct_hit() {
        let mut bp = BreakpointEngine::new();
        bp.set_application_trigger(0x6000);
        assert_eq!(bp.check_pc(0x6000), Some(BreakHit::Application));
        assert_eq!(bp.check_pc(0x6001), None);
    }

    #[test]
    fn scoreboard_tracks_precode_class_independently() {
        let mut bp = BreakpointEngine::new();
        bp.mark_executed(PrecodeClass::None, 0xa6);
        bp.mark_executed(PrecodeClass::P90, 0xa6);
        assert!(bp.was_executed(PrecodeClass::None, 0xa6));
        assert!(bp.was_executed(PrecodeClass::P90, 0xa6));
        assert!(!bp.was_executed(PrecodeClass::P72, 0xa6));
        assert_eq!(bp.coverage_count(), 2);
    }
}
