#![doc = r#"
st7xsim library crate.

This crate exposes the simulator core modules for use by the CLI binary and
integration tests.

Modules:
- error: the `SimError` taxonomy shared across decode/memory/loader
- memory: address decode, region classification, peripheral bus
- cpu: architectural register/flag state and ALU primitives
- decode: prefix handling and opcode dispatch (fetch-decode-execute)
- breakpoint: instruction/data/application/call breakpoints and the opcode
  coverage scoreboard
- runloop: step/run/step-over and cycle-to-wall-clock accounting
- crypto: AES-128 ECB core and the parameterized CMAC engine
- protocol: tag command packet layout and the MAC cross-check harness
- loader: S-record / raw binary / flash-text / snapshot-bundle file I/O
- simulator: the single owning aggregate tying the above together
- cli: the line-oriented REPL binding user imperatives to the core
"#]

pub mod breakpoint;
pub mod cli;
pub mod cpu;
pub mod crypto;
pub mod decode;
pub mod error;
pub mod loader;
pub mod memory;
pub mod protocol;
pub mod runloop;
pub mod simulator;

pub use error::{SimError, SimResult};
pub use simulator::Simulator;
