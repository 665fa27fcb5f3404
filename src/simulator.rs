#![doc = r#"
Simulator: the single owning aggregate tying together the address space, CPU
state, run loop (and its breakpoint engine), and the tag protocol harness.

There is exactly one instance per process. Every other module operates on
borrowed pieces of it (`&mut AddressSpace`, `&mut CpuState`, ...); this type
exists so the CLI and any embedding test harness have one value to construct,
reset, and pass around instead of four.
"#]

use anyhow::Result;

use crate::cpu::state::CpuState;
use crate::loader::{self, Segment};
use crate::memory::{AddressSpace, Page};
use crate::protocol::{Command, CommandOutcome, TagProtocolHarness};
use crate::runloop::{RunLoop, StopReason};

pub struct Simulator {
    pub mem: AddressSpace,
    pub cpu: CpuState,
    pub run_loop: RunLoop,
    pub page: Page,
    pub harness: TagProtocolHarness,
    simulated_nanos_at_load: u64,
}

impl Simulator {
    pub fn new(session_key: [u8; 16]) -> Self {
        Simulator {
            mem: AddressSpace::new(),
            cpu: CpuState::new(),
            run_loop: RunLoop::new(),
            page: Page::Page0,
            harness: TagProtocolHarness::new(session_key),
            simulated_nanos_at_load: 0,
        }
    }

    /// Resets CPU registers to power-up defaults. Memory and breakpoints are
    /// left untouched (matching the original's "reset CPU" menu item, which
    /// does not reload the firmware image).
    pub fn reset_cpu(&mut self) {
        self.cpu.reset();
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.cpu.pc = pc;
    }

    pub fn load_firmware_image(&mut self, path: &str, segment: Segment) -> Result<usize> {
        loader::load_firmware_image(&mut self.mem, path, segment)
    }

    pub fn save_snapshot(&self, base: &str) -> Result<()> {
        loader::save_snapshot(base, &self.mem, &self.cpu, self.run_loop.elapsed_nanos())
    }

    pub fn load_snapshot(&mut self, base: &str) -> Result<()> {
        let simtime = loader::load_snapshot(base, &mut self.mem, &mut self.cpu)?;
        self.simulated_nanos_at_load = simtime;
        Ok(())
    }

    pub fn step(&mut self) -> Option<StopReason> {
        self.run_loop.step(&mut self.cpu, &mut self.mem, self.page)
    }

    pub fn step_over(&mut self) -> Option<StopReason> {
        self.run_loop.step_over(&mut self.cpu, &mut self.mem, self.page)
    }

    pub fn run(&mut self, user_break: impl FnMut() -> bool) -> StopReason {
        self.run_loop.run(&mut self.cpu, &mut self.mem, self.page, user_break)
    }

    /// Writes a command packet, runs until the application trigger (or any
    /// other stop reason) fires, and reads back the response. A stop reason
    /// other than `ApplicationBreak` is reported as a failed command, per
    /// the protocol harness's error-handling contract.
    pub fn invoke_command(
        &mut self,
        cmd: u8,
        payload: &[u8],
        application_trigger_pc: u32,
    ) -> Result<CommandOutcome, StopReason> {
        self.run_loop.breakpoints.set_application_trigger(application_trigger_pc);
        self.harness.write_request(&mut self.mem, cmd, payload);

        let reason = self.run(|| false);
        self.run_loop.breakpoints.clear_application_trigger();

        if reason != StopReason::ApplicationBreak {
            return Err(reason);
        }

        let outcome = self.harness.read_response(&self.mem, cmd);
        self.harness.advance_sequence();
        Ok(outcome)
    }

    pub fn describe_command(cmd: u8) -> Option<Command> {
        Command::from_byte(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::opcodes;

    #[test]
    fn reset_cpu_restores_power_up_registers_without_touching_memory() {
        let mut sim = Simulator::new([0u8; 16]);
        sim.mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);
        sim.cpu.a = 0x42;
        sim.cpu.pc = 0x5000;
        sim.reset_cpu();
        assert_eq!(sim.cpu.a, 0);
        assert_eq!(sim.mem.load_raw(Page::Page0, 0x4000), opcodes::NOP);
    }

    #[test]
    fn invoke_command_round_trips_echo_through_application_trigger() {
        let mut sim = Simulator::new([0u8; 16]);
        // A tiny program at the reset vector that just spins on itself; the
        // application trigger at that same pc fires before it ever runs, so
        // this exercises the harness/run-loop wiring without needing a real
        // firmware image.
        sim.cpu.pc = 0x4000;
        sim.mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);
        sim.mem.store_raw(Page::Page0, PACKET_STATUS_FOR_TEST, 0x00);

        let outcome = sim.invoke_command(0x00, &[], 0x4000);
        assert!(outcome.is_ok());
    }

    const PACKET_STATUS_FOR_TEST: u16 = 0x00fb;
}
