//! Error taxonomy for the simulator core and its loader/CLI collaborators.
//!
//! `SimError` covers the fatal-stop conditions a single `step()` can raise
//! (see the run loop's `StopReason` for how these are surfaced to callers)
//! plus the I/O and parse failures the file loaders can hit. Loader/CLI
//! callers that need free-form context should wrap a `SimError` (or any
//! other source error) in `anyhow::Error` at their boundary rather than
//! growing this enum further.

use thiserror::Error;

/// Address classification at the moment a fatal condition was raised.
pub type Addr = u32;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("FETCHING FROM NON-CODE REGION at 0x{0:06x}")]
    FetchFromNonCodeRegion(Addr),

    #[error("unhandled prefix byte left set after instruction at 0x{0:06x}")]
    UnhandledPrefix(Addr),

    #[error("unknown opcode 0x{opcode:02x} at 0x{pc:06x}")]
    UnknownOpcode { opcode: u8, pc: Addr },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path}: {reason}")]
    Parse { path: String, reason: String },
}

pub type SimResult<T> = std::result::Result<T, SimError>;
