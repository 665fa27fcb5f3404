#![doc = r#"
Line-oriented REPL binding user imperatives to the simulator core, in the
spirit of the original menu loop: one line in, one action out, registers
reprinted after anything that moves the PC.

Commands (whitespace-separated tokens, first token selects the action):
  load <path> [page0|page1lo|page1hi]   load a firmware image
  snapshot save <base> / snapshot load <base>
  reset                                  reset CPU registers
  pc <hex>                               set the program counter
  regs                                    display registers
  mem <hex-addr> <len>                   display memory
  poke <hex-addr> <hex-byte>              write a memory byte
  step / stepover / run
  break instr <hex-addr> / break data <hex-addr> <r|w|rw> / break calls
  trace on|off
  scoreboard show|clear
  log <path>                              start logging execution to a file
  capture <path>                          start capturing I/O writes to a file
  cmd <hex-cmd> <hex-bytes...> <hex-trigger-pc>   invoke the protocol harness
  quit
"#]

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

use crate::loader::Segment;
use crate::simulator::Simulator;

pub struct Cli {
    sim: Simulator,
    run_log: Option<std::fs::File>,
    capture: Option<std::fs::File>,
}

impl Cli {
    pub fn new(sim: Simulator) -> Self {
        Cli { sim, run_log: None, capture: None }
    }

    fn print_registers(&mut self) {
        let cpu = &self.sim.cpu;
        let line = format!(
            "pc=0x{:06x} a=0x{:02x} x=0x{:02x} y=0x{:02x} sp=0x{:04x} cc=0x{:02x}",
            cpu.pc, cpu.a, cpu.x, cpu.y, cpu.sp, cpu.cc
        );
        println!("{line}");
        if let Some(f) = self.run_log.as_mut() {
            let _ = writeln!(f, "{line}");
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<bool> {
        let mut tokens = line.split_whitespace();
        let Some(cmd) = tokens.next() else { return Ok(true) };

        match cmd {
            "quit" | "q" => return Ok(false),

            "load" => {
                let path = tokens.next().context("usage: load <path> [segment]")?;
                let segment = match tokens.next() {
                    Some("page1lo") => Segment::Page1Low,
                    Some("page1hi") => Segment::Page1High,
                    _ => Segment::Page0,
                };
                let n = self.sim.load_firmware_image(path, segment)?;
                println!("loaded {n} bytes from {path}");
            }

            "snapshot" => match tokens.next() {
                Some("save") => {
                    let base = tokens.next().context("usage: snapshot save <base>")?;
                    self.sim.save_snapshot(base)?;
                    println!("snapshot written to {base}.*");
                }
                Some("load") => {
                    let base = tokens.next().context("usage: snapshot load <base>")?;
                    self.sim.load_snapshot(base)?;
                    println!("snapshot restored from {base}.*");
                }
                _ => bail!("usage: snapshot save|load <base>"),
            },

            "reset" => {
                self.sim.reset_cpu();
                self.print_registers();
            }

            "pc" => {
                let addr = tokens.next().context("usage: pc <hex>")?;
                let pc = u32::from_str_radix(addr.trim_start_matches("0x"), 16)
                    .context("invalid hex address")?;
                self.sim.set_pc(pc);
                self.print_registers();
            }

            "regs" => self.print_registers(),

            "mem" => {
                let addr = tokens.next().context("usage: mem <hex-addr> <len>")?;
                let len: usize = tokens.next().context("usage: mem <hex-addr> <len>")?.parse()?;
                let mut address = u16::from_str_radix(addr.trim_start_matches("0x"), 16)
                    .context("invalid hex address")?;
                let mut line = String::new();
                for i in 0..len {
                    if i % 16 == 0 {
                        if !line.is_empty() {
                            println!("{line}");
                        }
                        line = format!("{:04x}:", address);
                    }
                    let byte = self.sim.mem.load_raw(self.sim.page, address);
                    line.push_str(&format!(" {byte:02x}"));
                    address = address.wrapping_add(1);
                }
                if !line.is_empty() {
                    println!("{line}");
                }
            }

            "poke" => {
                let addr = tokens.next().context("usage: poke <hex-addr> <hex-byte>")?;
                let byte = tokens.next().context("usage: poke <hex-addr> <hex-byte>")?;
                let address = u16::from_str_radix(addr.trim_start_matches("0x"), 16)
                    .context("invalid hex address")?;
                let value = u8::from_str_radix(byte.trim_start_matches("0x"), 16)
                    .context("invalid hex byte")?;
                self.sim.mem.store_raw(self.sim.page, address, value);
                if let Some(f) = self.capture.as_mut() {
                    let _ = writeln!(f, "0x{address:04x} <- 0x{value:02x}");
                }
            }

            "step" => {
                let reason = self.sim.step();
                self.print_registers();
                if let Some(reason) = reason {
                    println!("stopped: {reason:?}");
                }
            }

            "stepover" => {
                let reason = self.sim.step_over();
                self.print_registers();
                if let Some(reason) = reason {
                    println!("stopped: {reason:?}");
                }
            }

            "run" => {
                let reason = self.sim.run(|| false);
                self.print_registers();
                println!("stopped: {reason:?}");
            }

            "break" => match tokens.next() {
                Some("instr") => {
                    let addr = tokens.next().context("usage: break instr <hex-addr>")?;
                    let addr = u32::from_str_radix(addr.trim_start_matches("0x"), 16)?;
                    if !self.sim.run_loop.breakpoints.add_instruction(addr) {
                        println!("instruction breakpoint table full");
                    }
                }
                Some("data") => {
                    let addr = tokens.next().context("usage: break data <hex-addr> <r|w|rw>")?;
                    let addr = u16::from_str_radix(addr.trim_start_matches("0x"), 16)?;
                    let dir = tokens.next().unwrap_or("rw");
                    let access = match dir {
                        "r" => crate::breakpoint::DataAccess::READ,
                        "w" => crate::breakpoint::DataAccess::WRITE,
                        _ => crate::breakpoint::DataAccess::READ_WRITE,
                    };
                    if !self.sim.run_loop.breakpoints.add_data(addr, access) {
                        println!("data breakpoint table full");
                    }
                }
                Some("calls") => self.sim.run_loop.breakpoints.set_call_trap(true),
                _ => bail!("usage: break instr|data|calls ..."),
            },

            "trace" => match tokens.next() {
                Some("on") => self.sim.run_loop.trace = true,
                Some("off") => self.sim.run_loop.trace = false,
                _ => bail!("usage: trace on|off"),
            },

            "scoreboard" => match tokens.next() {
                Some("show") => {
                    println!("{} opcodes covered", self.sim.run_loop.breakpoints.coverage_count());
                }
                Some("clear") => {
                    self.sim.run_loop.breakpoints = crate::breakpoint::BreakpointEngine::new();
                }
                _ => bail!("usage: scoreboard show|clear"),
            },

            "log" => {
                let path = tokens.next().context("usage: log <path>")?;
                self.run_log = Some(std::fs::File::create(path).with_context(|| format!("creating {path}"))?);
            }

            "capture" => {
                let path = tokens.next().context("usage: capture <path>")?;
                self.capture = Some(std::fs::File::create(path).with_context(|| format!("creating {path}"))?);
            }

            "cmd" => {
                let cmd_byte = tokens.next().context("usage: cmd <hex-cmd> <hex-bytes...> <hex-trigger-pc>")?;
                let cmd_byte = u8::from_str_radix(cmd_byte.trim_start_matches("0x"), 16)?;
                let rest: Vec<&str> = tokens.collect();
                let (payload_tokens, trigger_token) =
                    rest.split_at(rest.len().saturating_sub(1));
                let trigger = trigger_token
                    .first()
                    .context("usage: cmd <hex-cmd> <hex-bytes...> <hex-trigger-pc>")?;
                let trigger_pc = u32::from_str_radix(trigger.trim_start_matches("0x"), 16)?;
                let mut payload = Vec::with_capacity(payload_tokens.len());
                for tok in payload_tokens {
                    payload.push(u8::from_str_radix(tok.trim_start_matches("0x"), 16)?);
                }
                match self.sim.invoke_command(cmd_byte, &payload, trigger_pc) {
                    Ok(outcome) => println!("{outcome:?}"),
                    Err(reason) => println!("command failed: {reason:?}"),
                }
            }

            other => bail!("unknown command {other:?} (try `?` for a summary)"),
        }
        Ok(true)
    }

    /// Runs the REPL against `stdin`/`stdout` until `quit` or EOF.
    pub fn run_repl(&mut self) -> Result<()> {
        let stdin = io::stdin();
        loop {
            print!("> ");
            io::stdout().flush().ok();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            match self.dispatch(line.trim()) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => log::error!("{err:#}"),
            }
        }
        Ok(())
    }

    /// Runs a fixed script of commands non-interactively (batch mode).
    pub fn run_batch(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            if !self.dispatch(line)? {
                break;
            }
        }
        Ok(())
    }

    pub fn into_simulator(self) -> Simulator {
        self.sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_is_an_error_not_a_panic() {
        let mut cli = Cli::new(Simulator::new([0u8; 16]));
        let err = cli.dispatch("frobnicate").unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn reset_and_pc_update_registers() {
        let mut cli = Cli::new(Simulator::new([0u8; 16]));
        assert!(cli.dispatch("pc 5000").unwrap());
        assert_eq!(cli.sim.cpu.pc, 0x5000);
        assert!(cli.dispatch("reset").unwrap());
        assert_eq!(cli.sim.cpu.pc, crate::cpu::state::PC_INITIAL_VALUE);
    }

    #[test]
    fn quit_stops_the_batch() {
        let mut cli = Cli::new(Simulator::new([0u8; 16]));
        let lines = vec!["pc 4000".to_string(), "quit".to_string(), "pc 9000".to_string()];
        cli.run_batch(&lines).unwrap();
        assert_eq!(cli.sim.cpu.pc, 0x4000);
    }
}
