#![doc = r#"
Loader module: turns on-disk image files into bytes in the address space.

Overview
- `srec` reads Motorola S-record text (`.s19`-style firmware dumps).
- `raw` drops a flat binary blob into a fixed code segment.
- `flash_text` reads whitespace-separated hex bytes into the flash region.
- `snapshot` saves/restores a full simulator state bundle (four memory dumps
  plus a register text file) for resuming a session later.

This module owns actual file I/O (the rest of the crate works purely on
in-memory buffers), so its entry points return `anyhow::Result` rather than
`SimError`: these are CLI-facing operations where the failure is almost
always "bad path" or "malformed file", not a simulated-machine fault.
"#]

pub mod flash_text;
pub mod raw;
pub mod snapshot;
pub mod srec;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cpu::state::CpuState;
use crate::memory::AddressSpace;

pub use raw::Segment;
pub use snapshot::SnapshotRegisters;

/// Loads a firmware image by file extension: `.s19`/`.srec` as Motorola
/// S-records, `.flsh`/`.hex` as whitespace-separated flash text, anything
/// else as a raw binary blob placed at `segment`.
pub fn load_firmware_image(mem: &mut AddressSpace, path: &str, segment: Segment) -> Result<usize> {
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "s19" | "srec" => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            Ok(srec::load_srec(mem, &text, path)?)
        }
        "flsh" | "hex" => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            Ok(flash_text::load_flash_text(mem, &text, path)?)
        }
        _ => {
            let bytes = fs::read(path).with_context(|| format!("reading {path}"))?;
            Ok(raw::load_raw_binary(mem, &bytes, segment))
        }
    }
}

/// Saves the full simulator state under `<base>.{rom0,rom1,ramio,flsh,reg}`.
pub fn save_snapshot(base: &str, mem: &AddressSpace, cpu: &CpuState, simtime: u64) -> Result<()> {
    snapshot::save_snapshot(base, mem, cpu, simtime)
}

/// Restores the full simulator state from a bundle written by
/// [`save_snapshot`]. Returns the saved `SIMTIME` value.
pub fn load_snapshot(base: &str, mem: &mut AddressSpace, cpu: &mut CpuState) -> Result<u64> {
    snapshot::load_snapshot(base, mem, cpu)
}
