//! Run loop: step/run/step-over over the decoder, breakpoint checks, and
//! cycle-to-wall-clock accounting.

use crate::breakpoint::{BreakHit, BreakpointEngine, PrecodeClass, ProbePoint};
use crate::cpu::state::CpuState;
use crate::decode;
use crate::error::SimError;
use crate::memory::{AddressSpace, Page};

/// The microcontroller's fixed instruction clock, used to translate cycle
/// counts into elapsed simulated time.
pub const CLOCK_FREQUENCY_HZ: u64 = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    SteppingOver,
}

/// Why the run loop most recently stopped. Distinct from `SimError`: this is
/// what a caller (CLI, protocol harness) observes after a `run()`/`step()`
/// call returns, not what the decoder failed with internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AbnormalTermination,
    UserBreak,
    InstrBreak,
    DataBreak,
    CallBreak,
    ApplicationBreak,
}

pub struct RunLoop {
    pub state: RunState,
    pub breakpoints: BreakpointEngine,
    pub probe_points: Vec<ProbePoint>,
    pub cycle_count: u64,
    pub trace: bool,
    step_over_target_sp: Option<u16>,
}

impl Default for RunLoop {
    fn default() -> Self {
        RunLoop {
            state: RunState::Stopped,
            breakpoints: BreakpointEngine::new(),
            probe_points: Vec::new(),
            cycle_count: 0,
            trace: false,
            step_over_target_sp: None,
        }
    }
}

impl RunLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_nanos(&self) -> u64 {
        self.cycle_count * 1_000_000_000 / CLOCK_FREQUENCY_HZ
    }

    fn fire_probe_points(&self, cpu: &CpuState, mem: &AddressSpace, page: Page) {
        for probe in &self.probe_points {
            if probe.page == page && probe.pc == cpu.pc {
                log::info!(
                    "probe '{}' hit at pc=0x{:06x} a=0x{:02x} x=0x{:02x} y=0x{:02x}",
                    probe.label,
                    cpu.pc,
                    cpu.a,
                    cpu.x,
                    cpu.y
                );
                let _ = mem;
            }
        }
    }

    /// Executes exactly one instruction, including any leading precode byte.
    /// Returns the stop reason if the instruction itself triggered a fatal
    /// condition or a breakpoint became due as a result.
    pub fn step(&mut self, cpu: &mut CpuState, mem: &mut AddressSpace, page: Page) -> Option<StopReason> {
        if let Some(hit) = self.breakpoints.check_pc(cpu.pc) {
            self.state = RunState::Stopped;
            return Some(match hit {
                BreakHit::Instruction => StopReason::InstrBreak,
                BreakHit::Application => StopReason::ApplicationBreak,
            });
        }

        self.fire_probe_points(cpu, mem, page);

        let pre_sp = cpu.sp;
        match decode::step(cpu, mem, page) {
            Ok(outcome) => {
                self.cycle_count += outcome.cycles as u64;
                self.breakpoints.mark_executed(outcome.precode_class, outcome.opcode);

                for (addr, is_write) in mem.take_pending_accesses() {
                    self.breakpoints.observe_access(addr, is_write);
                }

                if self.trace {
                    log::trace!(
                        "pc=0x{:06x} a=0x{:02x} x=0x{:02x} y=0x{:02x} sp=0x{:04x} cc=0x{:02x}",
                        cpu.previous_pc,
                        cpu.a,
                        cpu.x,
                        cpu.y,
                        cpu.sp,
                        cpu.cc
                    );
                }

                if let Some((addr, access)) = self.breakpoints.poll_data() {
                    self.state = RunState::Stopped;
                    log::info!("data breakpoint hit at 0x{:04x} ({:?})", addr, access);
                    return Some(StopReason::DataBreak);
                }

                if outcome.was_call {
                    if self.breakpoints.call_trap_enabled() {
                        self.state = RunState::Stopped;
                        return Some(StopReason::CallBreak);
                    }
                    if self.state == RunState::SteppingOver && self.step_over_target_sp.is_none() {
                        self.step_over_target_sp = Some(pre_sp);
                    }
                }

                if outcome.was_return {
                    if let Some(target_sp) = self.step_over_target_sp {
                        if cpu.sp >= target_sp {
                            self.step_over_target_sp = None;
                            self.state = RunState::Stopped;
                        }
                    }
                }

                None
            }
            Err(err) => {
                log::error!("{}", err);
                self.state = RunState::Stopped;
                Some(match err {
                    SimError::FetchFromNonCodeRegion(_)
                    | SimError::UnhandledPrefix(_)
                    | SimError::UnknownOpcode { .. } => StopReason::AbnormalTermination,
                    _ => StopReason::AbnormalTermination,
                })
            }
        }
    }

    /// Runs until a breakpoint fires, a fatal condition occurs, or
    /// `user_break` reports a pending interrupt.
    pub fn run(
        &mut self,
        cpu: &mut CpuState,
        mem: &mut AddressSpace,
        page: Page,
        mut user_break: impl FnMut() -> bool,
    ) -> StopReason {
        self.state = RunState::Running;
        loop {
            if user_break() {
                self.state = RunState::Stopped;
                return StopReason::UserBreak;
            }
            if let Some(reason) = self.step(cpu, mem, page) {
                return reason;
            }
        }
    }

    /// Executes one instruction; if it was a call, continues stepping
    /// (silencing per-instruction trace) until the matching return brings
    /// `sp` back to its pre-call value.
    pub fn step_over(&mut self, cpu: &mut CpuState, mem: &mut AddressSpace, page: Page) -> Option<StopReason> {
        self.state = RunState::SteppingOver;
        let saved_trace = self.trace;
        self.trace = false;

        let first = self.step(cpu, mem, page);
        if first.is_some() {
            self.trace = saved_trace;
            return first;
        }

        while self.step_over_target_sp.is_some() {
            if let Some(reason) = self.step(cpu, mem, page) {
                self.trace = saved_trace;
                return Some(reason);
            }
        }

        self.trace = saved_trace;
        self.state = RunState::Stopped;
        None
    }

    pub fn mark_coverage(&mut self, class: PrecodeClass, opcode: u8) {
        self.breakpoints.mark_executed(class, opcode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::opcodes;
    use crate::memory::AddressSpace;

    #[test]
    fn run_until_instruction_breakpoint() {
        let mut cpu = CpuState::new();
        let mut mem = AddressSpace::new();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);
        mem.store_raw(Page::Page0, 0x4001, opcodes::NOP);
        mem.store_raw(Page::Page0, 0x4002, opcodes::NOP);

        let mut rl = RunLoop::new();
        rl.breakpoints.add_instruction(0x4002);
        let reason = rl.run(&mut cpu, &mut mem, Page::Page0, || false);
        assert_eq!(reason, StopReason::InstrBreak);
        assert_eq!(cpu.pc, 0x4002);
    }

    #[test]
    fn fetch_into_ram_stops_abnormal() {
        let mut cpu = CpuState::new();
        let mut mem = AddressSpace::new();
        cpu.pc = 0x0020;
        let mut rl = RunLoop::new();
        let reason = rl.run(&mut cpu, &mut mem, Page::Page0, || false);
        assert_eq!(reason, StopReason::AbnormalTermination);
    }

    #[test]
    fn user_break_stops_run() {
        let mut cpu = CpuState::new();
        let mut mem = AddressSpace::new();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);
        let mut rl = RunLoop::new();
        let reason = rl.run(&mut cpu, &mut mem, Page::Page0, || true);
        assert_eq!(reason, StopReason::UserBreak);
    }

    #[test]
    fn step_records_opcode_coverage_automatically() {
        let mut cpu = CpuState::new();
        let mut mem = AddressSpace::new();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);

        let mut rl = RunLoop::new();
        rl.step(&mut cpu, &mut mem, Page::Page0);
        assert!(rl.breakpoints.was_executed(PrecodeClass::None, opcodes::NOP));
    }

    #[test]
    fn step_over_call_consumes_subroutine() {
        let mut cpu = CpuState::new();
        let mut mem = AddressSpace::new();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::CALL_LONG);
        mem.store_raw(Page::Page0, 0x4001, 0x50);
        mem.store_raw(Page::Page0, 0x4002, 0x00);
        mem.store_raw(Page::Page0, 0x5000, opcodes::NOP);
        mem.store_raw(Page::Page0, 0x5001, opcodes::RET);

        let mut rl = RunLoop::new();
        let reason = rl.step_over(&mut cpu, &mut mem, Page::Page0);
        assert!(reason.is_none());
        assert_eq!(cpu.pc, 0x4003);
    }
}
