//! Snapshot save/restore: four raw binary files (`.rom0`, `.rom1`, `.ramio`,
//! `.flsh`) plus a text register file keyed by `REG_*`/`SIMTIME` lines.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cpu::state::CpuState;
use crate::memory::{AddressSpace, Page};

/// Register/timer state captured alongside the four memory dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRegisters {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u16,
    pub pc: u32,
    pub cc: u8,
    pub simtime: u64,
}

impl SnapshotRegisters {
    pub fn from_cpu(cpu: &CpuState, simtime: u64) -> Self {
        SnapshotRegisters { a: cpu.a, x: cpu.x, y: cpu.y, sp: cpu.sp, pc: cpu.pc, cc: cpu.cc, simtime }
    }

    pub fn apply(self, cpu: &mut CpuState) {
        cpu.a = self.a;
        cpu.x = self.x;
        cpu.y = self.y;
        cpu.sp = self.sp;
        cpu.pc = self.pc;
        cpu.cc = self.cc;
    }

    pub fn to_text(self) -> String {
        format!(
            "REG_A {:02x}\nREG_X {:02x}\nREG_Y {:02x}\nREG_SP {:04x}\nREG_PC {:08x}\nREG_CC {:02x}\nSIMTIME {}\n",
            self.a, self.x, self.y, self.sp, self.pc, self.cc, self.simtime
        )
    }

    pub fn parse(text: &str, path: &str) -> Result<Self> {
        let mut a = None;
        let mut x = None;
        let mut y = None;
        let mut sp = None;
        let mut pc = None;
        let mut cc = None;
        let mut simtime = None;

        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            match key {
                "REG_A" => a = u8::from_str_radix(value, 16).ok(),
                "REG_X" => x = u8::from_str_radix(value, 16).ok(),
                "REG_Y" => y = u8::from_str_radix(value, 16).ok(),
                "REG_SP" => sp = u16::from_str_radix(value, 16).ok(),
                "REG_PC" => pc = u32::from_str_radix(value, 16).ok(),
                "REG_CC" => cc = u8::from_str_radix(value, 16).ok(),
                "SIMTIME" => simtime = value.parse::<u64>().ok(),
                _ => {}
            }
        }

        Ok(SnapshotRegisters {
            a: a.with_context(|| format!("{path}: missing REG_A"))?,
            x: x.with_context(|| format!("{path}: missing REG_X"))?,
            y: y.with_context(|| format!("{path}: missing REG_Y"))?,
            sp: sp.with_context(|| format!("{path}: missing REG_SP"))?,
            pc: pc.with_context(|| format!("{path}: missing REG_PC"))?,
            cc: cc.with_context(|| format!("{path}: missing REG_CC"))?,
            simtime: simtime.with_context(|| format!("{path}: missing SIMTIME"))?,
        })
    }
}

/// Writes `<base>.rom0`, `<base>.rom1`, `<base>.ramio`, `<base>.flsh`, and
/// `<base>.reg` from the current simulator state.
pub fn save_snapshot(base: &str, mem: &AddressSpace, cpu: &CpuState, simtime: u64) -> Result<()> {
    fs::write(format!("{base}.rom0"), mem.rom_bytes(Page::Page0))
        .with_context(|| format!("writing {base}.rom0"))?;
    fs::write(format!("{base}.rom1"), mem.rom_bytes(Page::Page1))
        .with_context(|| format!("writing {base}.rom1"))?;
    fs::write(format!("{base}.ramio"), mem.lowmem_bytes())
        .with_context(|| format!("writing {base}.ramio"))?;
    fs::write(format!("{base}.flsh"), mem.flash_bytes())
        .with_context(|| format!("writing {base}.flsh"))?;
    fs::write(format!("{base}.reg"), SnapshotRegisters::from_cpu(cpu, simtime).to_text())
        .with_context(|| format!("writing {base}.reg"))?;
    Ok(())
}

/// Loads a snapshot bundle written by `save_snapshot`. A missing component
/// file is reported without mutating `mem`/`cpu`.
pub fn load_snapshot(base: &str, mem: &mut AddressSpace, cpu: &mut CpuState) -> Result<u64> {
    let rom0_path = format!("{base}.rom0");
    let rom1_path = format!("{base}.rom1");
    let ramio_path = format!("{base}.ramio");
    let flash_path = format!("{base}.flsh");
    let reg_path = format!("{base}.reg");

    for p in [&rom0_path, &rom1_path, &ramio_path, &flash_path, &reg_path] {
        if !Path::new(p).exists() {
            anyhow::bail!("snapshot bundle {base} is missing {p}");
        }
    }

    let rom0 = fs::read(&rom0_path).with_context(|| format!("reading {rom0_path}"))?;
    let rom1 = fs::read(&rom1_path).with_context(|| format!("reading {rom1_path}"))?;
    let ramio = fs::read(&ramio_path).with_context(|| format!("reading {ramio_path}"))?;
    let flash = fs::read(&flash_path).with_context(|| format!("reading {flash_path}"))?;
    let reg_text = fs::read_to_string(&reg_path).with_context(|| format!("reading {reg_path}"))?;
    let regs = SnapshotRegisters::parse(&reg_text, &reg_path)?;

    mem.load_rom_bytes(Page::Page0, &rom0);
    mem.load_rom_bytes(Page::Page1, &rom1);
    mem.load_lowmem_bytes(&ramio);
    mem.load_flash_bytes(&flash);
    regs.apply(cpu);

    Ok(regs.simtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_text_round_trips() {
        let regs = SnapshotRegisters { a: 0x11, x: 0x22, y: 0x33, sp: 0x03ff, pc: 0x4010, cc: 0x02, simtime: 42 };
        let text = regs.to_text();
        let parsed = SnapshotRegisters::parse(&text, "fixture.reg").unwrap();
        assert_eq!(parsed, regs);
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = SnapshotRegisters::parse("REG_A 11\n", "fixture.reg").unwrap_err();
        assert!(err.to_string().contains("REG_X"));
    }
}
