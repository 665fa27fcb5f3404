#![doc = r#"
Decoder/Executor: fetch-decode-execute for one instruction at a time.

Overview
- `addressing` resolves operand addresses for the ~8 addressing forms the
  instruction set supports.
- `opcodes` holds the base (no active precode) opcode table, transcribed
  from the microcontroller's opcode map.
- This module's `step` function is the single entry point the run loop
  calls: it consumes zero or one precode byte, dispatches the following
  opcode byte, and returns the cycle cost of the instruction executed.

Precode handling
- A precode byte (0x72/0x90/0x91/0x92) only ever changes how the *next*
  opcode's operands are addressed; it never changes which mnemonic a given
  opcode byte names. 0x90 redirects X-register addressing to Y; 0x91/0x92
  reinterpret REG_IND-family addressing as pointer indirection through the
  short data page. Each instruction handler that consumes an active precode
  clears it; if a handler recognizes a (precode, opcode) pair it has no
  operand decode for, it deliberately leaves the flag set so the
  end-of-instruction check raises `UnhandledPrefix`, mirroring the two
  cases the firmware never actually exercises (see DESIGN.md Open Question
  #2).
"#]

pub mod addressing;
pub mod opcodes;

use crate::breakpoint::PrecodeClass;
use crate::cpu::state::{CpuState, CARRY, NEGATIVE, ZERO};
use crate::error::{SimError, SimResult};
use crate::memory::{AddressSpace, MemoryRegion, Page};
use addressing as ad;

/// Outcome of executing a single instruction: how many cycles it cost,
/// whether it was a call-class instruction (used by step-over tracking),
/// and which (precode class, opcode) pair it dispatched through (used by
/// the scoreboard).
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub cycles: u32,
    pub was_call: bool,
    pub was_return: bool,
    pub precode_class: PrecodeClass,
    pub opcode: u8,
}

fn outcome(cycles: u32) -> StepOutcome {
    StepOutcome { cycles, was_call: false, was_return: false, precode_class: PrecodeClass::None, opcode: 0 }
}

/// Executes exactly one logical instruction (including any leading precode
/// byte) starting at `cpu.pc`, on the given code `page`.
pub fn step(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page) -> SimResult<StepOutcome> {
    cpu.previous_pc = cpu.pc;
    cpu.previous_sp = cpu.sp;

    let mut opcode;
    loop {
        let pc = cpu.pc;
        let byte = ad::fetch_u8(cpu, mem, page)?;
        if opcodes::is_precode(byte) {
            match byte {
                opcodes::PRECODE_72 => cpu.precode.p72 = true,
                opcodes::PRECODE_90 => cpu.precode.p90 = true,
                opcodes::PRECODE_91 => cpu.precode.p91 = true,
                opcodes::PRECODE_92 => cpu.precode.p92 = true,
                _ => unreachable!(),
            }
            let _ = pc;
            continue;
        }
        opcode = byte;
        break;
    }

    let class = if cpu.precode.p72 {
        PrecodeClass::P72
    } else if cpu.precode.p90 {
        PrecodeClass::P90
    } else if cpu.precode.p91 {
        PrecodeClass::P91
    } else if cpu.precode.p92 {
        PrecodeClass::P92
    } else {
        PrecodeClass::None
    };

    let result = match class {
        PrecodeClass::P72 => dispatch_precode_72(cpu, mem, page, opcode),
        PrecodeClass::P90 | PrecodeClass::P91 | PrecodeClass::P92 => {
            dispatch_indexed_precode(cpu, mem, page, opcode)
        }
        PrecodeClass::None => dispatch_base(cpu, mem, page, opcode),
    };

    let mut out = result?;

    if cpu.precode.any() {
        return Err(SimError::UnhandledPrefix(cpu.previous_pc));
    }

    out.precode_class = class;
    out.opcode = opcode;
    Ok(out)
}

fn consume_precode(cpu: &mut CpuState) {
    cpu.precode.clear();
}

// ---------------------------------------------------------------------
// Stack helpers
// ---------------------------------------------------------------------

fn push_u8(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, value: u8) {
    mem.store(page, cpu.sp, value);
    cpu.sp = cpu.sp.wrapping_sub(1);
}

fn pop_u8(cpu: &mut CpuState, mem: &mut AddressSpace) -> u8 {
    cpu.sp = cpu.sp.wrapping_add(1);
    mem.load(cpu.sp)
}

fn push_u16(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, value: u16) {
    push_u8(cpu, mem, page, (value >> 8) as u8);
    push_u8(cpu, mem, page, (value & 0xff) as u8);
}

fn pop_u16(cpu: &mut CpuState, mem: &mut AddressSpace) -> u16 {
    let lo = pop_u8(cpu, mem) as u16;
    let hi = pop_u8(cpu, mem) as u16;
    (hi << 8) | lo
}

/// Validates that a popped 16-bit return address does not land in a
/// non-code region on the page it will resume on; used by both `RET` (same
/// page) and `RETF` (the page named by the popped page byte).
fn check_return_target(page: Page, offset: u16) -> SimResult<()> {
    let region = MemoryRegion::classify(page, offset);
    if !region.is_code() {
        return Err(SimError::FetchFromNonCodeRegion(offset as u32));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// ALU family: ADD/ADC/SUB/SBC/AND/OR/XOR/BCP/CP, all addressed against A.
// ---------------------------------------------------------------------

enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Or,
    Xor,
    Bcp,
    Cp,
}

fn apply_alu(cpu: &mut CpuState, op: &AluOp, val: u8) {
    match op {
        AluOp::Add => cpu.alu_add(val),
        AluOp::Adc => cpu.alu_adc(val),
        AluOp::Sub => cpu.alu_sub(val),
        AluOp::Sbc => cpu.alu_sbc(val),
        AluOp::And => {
            cpu.a &= val;
            let a = cpu.a;
            cpu.update_nz(a);
        }
        AluOp::Or => {
            cpu.a |= val;
            let a = cpu.a;
            cpu.update_nz(a);
        }
        AluOp::Xor => {
            cpu.a ^= val;
            let a = cpu.a;
            cpu.update_nz(a);
        }
        AluOp::Bcp => {
            let result = cpu.a & val;
            cpu.update_nz(result);
        }
        AluOp::Cp => {
            let full = (cpu.a as u16).wrapping_sub(val as u16);
            cpu.assign_flag(CARRY, full & 0x100 != 0);
            cpu.update_nz((full & 0xff) as u8);
        }
    }
}

fn alu_immed(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: AluOp) -> SimResult<u32> {
    let v = ad::immed(cpu, mem, page)?;
    apply_alu(cpu, &op, v);
    Ok(1)
}

fn alu_short(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: AluOp) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let v = mem.load(addr);
    apply_alu(cpu, &op, v);
    Ok(1)
}

fn alu_long(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: AluOp) -> SimResult<u32> {
    let addr = ad::long(cpu, mem, page)?;
    let v = mem.load(addr);
    apply_alu(cpu, &op, v);
    Ok(2)
}

fn alu_reg_ind(cpu: &mut CpuState, mem: &mut AddressSpace, op: AluOp) -> SimResult<u32> {
    let addr = ad::reg_ind(cpu);
    let v = mem.load(addr);
    apply_alu(cpu, &op, v);
    Ok(1)
}

fn alu_reg_ind_off_short(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: AluOp) -> SimResult<u32> {
    let addr = ad::reg_ind_off_short(cpu, mem, page)?;
    let v = mem.load(addr);
    apply_alu(cpu, &op, v);
    Ok(1)
}

fn alu_reg_ind_off_long(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: AluOp) -> SimResult<u32> {
    let addr = ad::reg_ind_off_long(cpu, mem, page)?;
    let v = mem.load(addr);
    apply_alu(cpu, &op, v);
    Ok(2)
}

/// CP X,x: like `AluOp::Cp` but against the X register, result discarded.
fn cp_x(cpu: &mut CpuState, val: u8) {
    let full = (cpu.x as u16).wrapping_sub(val as u16);
    cpu.assign_flag(CARRY, full & 0x100 != 0);
    cpu.update_nz((full & 0xff) as u8);
}

// ---------------------------------------------------------------------
// Read-modify-write family: INC/DEC/NEG/CLR/CPL/SLA/SRA/SRL/RLC/RRC/SWAP/TNZ
// ---------------------------------------------------------------------

enum RmwOp {
    Inc,
    Dec,
    Neg,
    Clr,
    Cpl,
    Sla,
    Sra,
    Srl,
    Rlc,
    Rrc,
    Swap,
    Tnz,
}

/// Applies an RMW op to `val`, returning the new value (for TNZ, the
/// "new value" equals the input: it only sets flags).
fn apply_rmw(cpu: &mut CpuState, op: &RmwOp, val: u8) -> u8 {
    match op {
        RmwOp::Inc => {
            let r = val.wrapping_add(1);
            cpu.update_nz(r);
            r
        }
        RmwOp::Dec => {
            let r = val.wrapping_sub(1);
            cpu.update_nz(r);
            r
        }
        RmwOp::Neg => {
            let r = 0u8.wrapping_sub(val);
            cpu.assign_flag(CARRY, r != 0);
            cpu.update_nz(r);
            r
        }
        RmwOp::Clr => {
            cpu.assign_flag(ZERO, true);
            cpu.assign_flag(NEGATIVE, false);
            0
        }
        RmwOp::Cpl => {
            let r = !val;
            cpu.assign_flag(CARRY, true);
            cpu.update_nz(r);
            r
        }
        RmwOp::Sla => cpu.alu_sla(val),
        RmwOp::Sra => cpu.alu_sra(val),
        RmwOp::Srl => cpu.alu_srl(val),
        RmwOp::Rlc => cpu.alu_rlc(val),
        RmwOp::Rrc => cpu.alu_rrc(val),
        RmwOp::Swap => {
            let r = (val << 4) | (val >> 4);
            cpu.update_nz(r);
            r
        }
        RmwOp::Tnz => {
            cpu.update_nz(val);
            val
        }
    }
}

fn rmw_a(cpu: &mut CpuState, op: RmwOp) -> SimResult<u32> {
    let v = apply_rmw(cpu, &op, cpu.a);
    if !matches!(op, RmwOp::Tnz) {
        cpu.a = v;
    }
    Ok(1)
}

fn rmw_x(cpu: &mut CpuState, op: RmwOp) -> SimResult<u32> {
    let reg = ad::IndexReg::select(cpu);
    let cur = reg.value(cpu);
    let v = apply_rmw(cpu, &op, cur);
    if !matches!(op, RmwOp::Tnz) {
        match reg {
            ad::IndexReg::X => cpu.x = v,
            ad::IndexReg::Y => cpu.y = v,
        }
    }
    Ok(1)
}

fn rmw_reg_ind(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: RmwOp) -> SimResult<u32> {
    let addr = ad::reg_ind(cpu);
    let cur = mem.load(addr);
    let v = apply_rmw(cpu, &op, cur);
    if !matches!(op, RmwOp::Tnz) {
        mem.store(page, addr, v);
    }
    Ok(1)
}

fn rmw_short(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: RmwOp) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let cur = mem.load(addr);
    let v = apply_rmw(cpu, &op, cur);
    if !matches!(op, RmwOp::Tnz) {
        mem.store(page, addr, v);
    }
    Ok(1)
}

fn rmw_reg_ind_off_short(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, op: RmwOp) -> SimResult<u32> {
    let addr = ad::reg_ind_off_short(cpu, mem, page)?;
    let cur = mem.load(addr);
    let v = apply_rmw(cpu, &op, cur);
    if !matches!(op, RmwOp::Tnz) {
        mem.store(page, addr, v);
    }
    Ok(1)
}

// ---------------------------------------------------------------------
// Conditional branch predicate table
// ---------------------------------------------------------------------

fn branch_taken(cpu: &CpuState, opcode: u8) -> bool {
    use opcodes::*;
    let c = cpu.is_flag_set(CARRY);
    let z = cpu.is_flag_set(ZERO);
    let h = cpu.is_flag_set(crate::cpu::state::HALF_CARRY);
    let n = cpu.is_flag_set(NEGATIVE);
    let m = cpu.is_flag_set(crate::cpu::state::INTERRUPT_MASK_L0)
        || cpu.is_flag_set(crate::cpu::state::INTERRUPT_MASK_L1);
    match opcode {
        JRA => true,
        JRF => false,
        JRC => c,
        JRNC => !c,
        JREQ => z,
        JRNE => !z,
        JRH => h,
        JRNH => !h,
        JRM => m,
        JRNM => !m,
        JRMI => n,
        JRPL => !n,
        JRIH | JRIL => true,
        JRUGT => !(c || z),
        JRULE => c || z,
        _ => unreachable!("not a branch opcode"),
    }
}

fn is_branch_opcode(opcode: u8) -> bool {
    use opcodes::*;
    matches!(
        opcode,
        JRA | JRF | JRC | JRNC | JREQ | JRNE | JRH | JRNH | JRM | JRNM | JRMI | JRPL | JRIH
            | JRIL | JRUGT | JRULE
    )
}

fn do_branch(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, opcode: u8) -> SimResult<u32> {
    let disp = ad::fetch_u8(cpu, mem, page)? as i8;
    if branch_taken(cpu, opcode) {
        cpu.pc = (cpu.pc as i64 + disp as i64) as u32;
    }
    Ok(2)
}

// ---------------------------------------------------------------------
// Bit-manipulation family: BSET/BRES/BTJF/BTJT
// ---------------------------------------------------------------------

fn do_bset(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, bit: u8) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let v = mem.load(addr) | (1 << bit);
    mem.store(page, addr, v);
    Ok(1)
}

fn do_bres(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, bit: u8) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let v = mem.load(addr) & !(1 << bit);
    mem.store(page, addr, v);
    Ok(1)
}

fn do_btjt(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, bit: u8) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let v = mem.load(addr);
    let disp = ad::fetch_u8(cpu, mem, page)? as i8;
    let set = (v & (1 << bit)) != 0;
    cpu.assign_flag(CARRY, set);
    if set {
        cpu.pc = (cpu.pc as i64 + disp as i64) as u32;
    }
    Ok(2)
}

fn do_btjf(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, bit: u8) -> SimResult<u32> {
    let addr = ad::short(cpu, mem, page)?;
    let v = mem.load(addr);
    let disp = ad::fetch_u8(cpu, mem, page)? as i8;
    let set = (v & (1 << bit)) != 0;
    cpu.assign_flag(CARRY, !set);
    if !set {
        cpu.pc = (cpu.pc as i64 + disp as i64) as u32;
    }
    Ok(2)
}

// ---------------------------------------------------------------------
// Base (no active precode) dispatch
// ---------------------------------------------------------------------

fn dispatch_base(
    cpu: &mut CpuState,
    mem: &mut AddressSpace,
    page: Page,
    opcode: u8,
) -> SimResult<StepOutcome> {
    use opcodes::*;

    if let Some(bit) = bit_index(&BSET, opcode) {
        return Ok(outcome(do_bset(cpu, mem, page, bit)?));
    }
    if let Some(bit) = bit_index(&BRES, opcode) {
        return Ok(outcome(do_bres(cpu, mem, page, bit)?));
    }
    if let Some(bit) = bit_index(&BTJT, opcode) {
        return Ok(outcome(do_btjt(cpu, mem, page, bit)?));
    }
    if let Some(bit) = bit_index(&BTJF, opcode) {
        return Ok(outcome(do_btjf(cpu, mem, page, bit)?));
    }
    if is_branch_opcode(opcode) {
        return Ok(outcome(do_branch(cpu, mem, page, opcode)?));
    }

    let cycles = match opcode {
        // --- register moves ---
        EXGW => {
            std::mem::swap(&mut cpu.x, &mut cpu.y);
            1
        }
        EXG_A_X => {
            std::mem::swap(&mut cpu.a, &mut cpu.x);
            1
        }
        EXG_A_Y => {
            std::mem::swap(&mut cpu.a, &mut cpu.y);
            1
        }
        EXG_A_LONG => {
            let addr = ad::long(cpu, mem, page)?;
            let mem_val = mem.load(addr);
            mem.store(page, addr, cpu.a);
            cpu.a = mem_val;
            2
        }
        LD_X_A => { cpu.x = cpu.a; 1 }
        LD_A_X => { cpu.a = cpu.x; 1 }
        LD_X_Y => { cpu.x = cpu.y; 1 }
        LD_A_S => { cpu.a = (cpu.sp & 0xff) as u8; 1 }
        LD_S_A => { cpu.sp = (cpu.sp & 0xff00) | cpu.a as u16; 1 }
        LD_X_S => { cpu.x = (cpu.sp & 0xff) as u8; 1 }
        LD_S_X => { cpu.sp = (cpu.sp & 0xff00) | cpu.x as u16; 1 }
        LDW_SP_X => { cpu.sp = (cpu.sp & 0xff00) | cpu.x as u16; 1 }

        // --- LDF (far load/store via X) ---
        LDF_A_FAR => {
            let (tgt_page, off) = ad::far(cpu, mem, page)?;
            cpu.a = mem.load_raw(tgt_page, off);
            3
        }
        LDF_A_REG_IND => {
            let addr = ad::reg_ind(cpu);
            cpu.a = mem.load(addr);
            1
        }
        LDF_FAR_A => {
            let (tgt_page, off) = ad::far(cpu, mem, page)?;
            mem.store_raw(tgt_page, off, cpu.a);
            3
        }
        LDF_REG_IND_A => {
            let addr = ad::reg_ind(cpu);
            mem.store(page, addr, cpu.a);
            1
        }

        // --- ALU ops against A ---
        ADC_IMMED => alu_immed(cpu, mem, page, AluOp::Adc)?,
        ADC_SHORT => alu_short(cpu, mem, page, AluOp::Adc)?,
        ADC_LONG => alu_long(cpu, mem, page, AluOp::Adc)?,
        ADC_REG_IND => alu_reg_ind(cpu, mem, AluOp::Adc)?,
        ADC_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Adc)?,
        ADC_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Adc)?,

        ADD_IMMED => alu_immed(cpu, mem, page, AluOp::Add)?,
        ADD_SHORT => alu_short(cpu, mem, page, AluOp::Add)?,
        ADD_LONG => alu_long(cpu, mem, page, AluOp::Add)?,
        ADD_REG_IND => alu_reg_ind(cpu, mem, AluOp::Add)?,
        ADD_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Add)?,
        ADD_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Add)?,

        AND_IMMED => alu_immed(cpu, mem, page, AluOp::And)?,
        AND_SHORT => alu_short(cpu, mem, page, AluOp::And)?,
        AND_LONG => alu_long(cpu, mem, page, AluOp::And)?,
        AND_REG_IND => alu_reg_ind(cpu, mem, AluOp::And)?,
        AND_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::And)?,
        AND_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::And)?,

        BCP_IMMED => alu_immed(cpu, mem, page, AluOp::Bcp)?,
        BCP_SHORT => alu_short(cpu, mem, page, AluOp::Bcp)?,
        BCP_LONG => alu_long(cpu, mem, page, AluOp::Bcp)?,
        BCP_REG_IND => alu_reg_ind(cpu, mem, AluOp::Bcp)?,
        BCP_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Bcp)?,
        BCP_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Bcp)?,

        CP_IMMED => alu_immed(cpu, mem, page, AluOp::Cp)?,
        CP_SHORT => alu_short(cpu, mem, page, AluOp::Cp)?,
        CP_LONG => alu_long(cpu, mem, page, AluOp::Cp)?,
        CP_REG_IND => alu_reg_ind(cpu, mem, AluOp::Cp)?,
        CP_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Cp)?,
        CP_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Cp)?,

        CP_X_IMMED => { let v = ad::immed(cpu, mem, page)?; cp_x(cpu, v); 1 }
        CP_X_SHORT => { let a = ad::short(cpu, mem, page)?; let v = mem.load(a); cp_x(cpu, v); 1 }
        CP_X_LONG => { let a = ad::long(cpu, mem, page)?; let v = mem.load(a); cp_x(cpu, v); 2 }
        CP_X_REG_IND => { let a = ad::reg_ind(cpu); let v = mem.load(a); cp_x(cpu, v); 1 }
        CP_X_REG_IND_OFF_SHORT => { let a = ad::reg_ind_off_short(cpu, mem, page)?; let v = mem.load(a); cp_x(cpu, v); 1 }
        CP_X_REG_IND_OFF_LONG => { let a = ad::reg_ind_off_long(cpu, mem, page)?; let v = mem.load(a); cp_x(cpu, v); 2 }

        OR_IMMED => alu_immed(cpu, mem, page, AluOp::Or)?,
        OR_SHORT => alu_short(cpu, mem, page, AluOp::Or)?,
        OR_LONG => alu_long(cpu, mem, page, AluOp::Or)?,
        OR_REG_IND => alu_reg_ind(cpu, mem, AluOp::Or)?,
        OR_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Or)?,
        OR_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Or)?,

        SBC_IMMED => alu_immed(cpu, mem, page, AluOp::Sbc)?,
        SBC_SHORT => alu_short(cpu, mem, page, AluOp::Sbc)?,
        SBC_LONG => alu_long(cpu, mem, page, AluOp::Sbc)?,
        SBC_REG_IND => alu_reg_ind(cpu, mem, AluOp::Sbc)?,
        SBC_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Sbc)?,
        SBC_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Sbc)?,

        SUB_IMMED => alu_immed(cpu, mem, page, AluOp::Sub)?,
        SUB_SHORT => alu_short(cpu, mem, page, AluOp::Sub)?,
        SUB_LONG => alu_long(cpu, mem, page, AluOp::Sub)?,
        SUB_REG_IND => alu_reg_ind(cpu, mem, AluOp::Sub)?,
        SUB_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Sub)?,
        SUB_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Sub)?,

        XOR_IMMED => alu_immed(cpu, mem, page, AluOp::Xor)?,
        XOR_SHORT => alu_short(cpu, mem, page, AluOp::Xor)?,
        XOR_LONG => alu_long(cpu, mem, page, AluOp::Xor)?,
        XOR_REG_IND => alu_reg_ind(cpu, mem, AluOp::Xor)?,
        XOR_REG_IND_OFF_SHORT => alu_reg_ind_off_short(cpu, mem, page, AluOp::Xor)?,
        XOR_REG_IND_OFF_LONG => alu_reg_ind_off_long(cpu, mem, page, AluOp::Xor)?,

        // --- LD A,x / LD x,A ---
        LD_A_IMMED => { cpu.a = ad::immed(cpu, mem, page)?; let a = cpu.a; cpu.update_nz(a); 1 }
        LD_A_SHORT => { let addr = ad::short(cpu, mem, page)?; cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 1 }
        LD_A_LONG => { let addr = ad::long(cpu, mem, page)?; cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 2 }
        LD_A_REG_IND => { let addr = ad::reg_ind(cpu); cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 1 }
        LD_A_REG_IND_OFF_SHORT => { let addr = ad::reg_ind_off_short(cpu, mem, page)?; cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 1 }
        LD_A_REG_IND_OFF_LONG => { let addr = ad::reg_ind_off_long(cpu, mem, page)?; cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 2 }
        LD_A_SP_IND => { let addr = ad::sp_ind(cpu, mem, page)?; cpu.a = mem.load(addr); let a = cpu.a; cpu.update_nz(a); 1 }

        LD_SHORT_A => { let addr = ad::short(cpu, mem, page)?; mem.store(page, addr, cpu.a); 1 }
        LD_LONG_A => { let addr = ad::long(cpu, mem, page)?; mem.store(page, addr, cpu.a); 2 }
        LD_REG_IND_A => { let addr = ad::reg_ind(cpu); mem.store(page, addr, cpu.a); 1 }
        LD_REG_IND_OFF_SHORT_A => { let addr = ad::reg_ind_off_short(cpu, mem, page)?; mem.store(page, addr, cpu.a); 1 }
        LD_REG_IND_OFF_LONG_A => { let addr = ad::reg_ind_off_long(cpu, mem, page)?; mem.store(page, addr, cpu.a); 2 }
        LD_SP_IND_A => { let addr = ad::sp_ind(cpu, mem, page)?; mem.store(page, addr, cpu.a); 1 }

        // --- LD X,x / LD x,X ---
        LD_X_IMMED => { cpu.x = ad::immed(cpu, mem, page)?; let x = cpu.x; cpu.update_nz(x); 1 }
        LD_X_SHORT => { let addr = ad::short(cpu, mem, page)?; cpu.x = mem.load(addr); let x = cpu.x; cpu.update_nz(x); 1 }
        LD_X_LONG => { let addr = ad::long(cpu, mem, page)?; cpu.x = mem.load(addr); let x = cpu.x; cpu.update_nz(x); 2 }
        LD_X_REG_IND => { let addr = ad::reg_ind(cpu); cpu.x = mem.load(addr); let x = cpu.x; cpu.update_nz(x); 1 }
        LD_X_REG_IND_OFF_SHORT => { let addr = ad::reg_ind_off_short(cpu, mem, page)?; cpu.x = mem.load(addr); let x = cpu.x; cpu.update_nz(x); 1 }
        LD_X_REG_IND_OFF_LONG => { let addr = ad::reg_ind_off_long(cpu, mem, page)?; cpu.x = mem.load(addr); let x = cpu.x; cpu.update_nz(x); 2 }

        LD_SHORT_X => { let addr = ad::short(cpu, mem, page)?; mem.store(page, addr, cpu.x); 1 }
        LD_LONG_X => { let addr = ad::long(cpu, mem, page)?; mem.store(page, addr, cpu.x); 2 }
        LD_REG_IND_X => { let addr = ad::reg_ind(cpu); mem.store(page, addr, cpu.x); 1 }
        LD_REG_IND_OFF_SHORT_X => { let addr = ad::reg_ind_off_short(cpu, mem, page)?; mem.store(page, addr, cpu.x); 1 }
        LD_REG_IND_OFF_LONG_X => { let addr = ad::reg_ind_off_long(cpu, mem, page)?; mem.store(page, addr, cpu.x); 2 }

        // --- RMW family ---
        INC_A => rmw_a(cpu, RmwOp::Inc)?,
        INC_X => rmw_x(cpu, RmwOp::Inc)?,
        INC_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Inc)?,
        INC_SHORT => rmw_short(cpu, mem, page, RmwOp::Inc)?,
        INC_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Inc)?,

        DEC_A => rmw_a(cpu, RmwOp::Dec)?,
        DEC_X => rmw_x(cpu, RmwOp::Dec)?,
        DEC_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Dec)?,
        DEC_SHORT => rmw_short(cpu, mem, page, RmwOp::Dec)?,
        DEC_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Dec)?,

        NEG_A => rmw_a(cpu, RmwOp::Neg)?,
        NEG_X => rmw_x(cpu, RmwOp::Neg)?,
        NEG_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Neg)?,
        NEG_SHORT => rmw_short(cpu, mem, page, RmwOp::Neg)?,
        NEG_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Neg)?,

        CLR_A => rmw_a(cpu, RmwOp::Clr)?,
        CLR_X => rmw_x(cpu, RmwOp::Clr)?,
        CLR_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Clr)?,
        CLR_SHORT => rmw_short(cpu, mem, page, RmwOp::Clr)?,
        CLR_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Clr)?,

        CPL_A => rmw_a(cpu, RmwOp::Cpl)?,
        CPL_X => rmw_x(cpu, RmwOp::Cpl)?,
        CPL_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Cpl)?,
        CPL_SHORT => rmw_short(cpu, mem, page, RmwOp::Cpl)?,
        CPL_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Cpl)?,

        SLA_A => rmw_a(cpu, RmwOp::Sla)?,
        SLA_X => rmw_x(cpu, RmwOp::Sla)?,
        SLA_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Sla)?,
        SLA_SHORT => rmw_short(cpu, mem, page, RmwOp::Sla)?,
        SLA_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Sla)?,

        SRA_A => rmw_a(cpu, RmwOp::Sra)?,
        SRA_X => rmw_x(cpu, RmwOp::Sra)?,
        SRA_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Sra)?,
        SRA_SHORT => rmw_short(cpu, mem, page, RmwOp::Sra)?,
        SRA_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Sra)?,

        SRL_A => rmw_a(cpu, RmwOp::Srl)?,
        SRL_X => rmw_x(cpu, RmwOp::Srl)?,
        SRL_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Srl)?,
        SRL_SHORT => rmw_short(cpu, mem, page, RmwOp::Srl)?,
        SRL_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Srl)?,

        RLC_A => rmw_a(cpu, RmwOp::Rlc)?,
        RLC_X => rmw_x(cpu, RmwOp::Rlc)?,
        RLC_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Rlc)?,
        RLC_SHORT => rmw_short(cpu, mem, page, RmwOp::Rlc)?,
        RLC_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Rlc)?,

        RRC_A => rmw_a(cpu, RmwOp::Rrc)?,
        RRC_X => rmw_x(cpu, RmwOp::Rrc)?,
        RRC_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Rrc)?,
        RRC_SHORT => rmw_short(cpu, mem, page, RmwOp::Rrc)?,
        RRC_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Rrc)?,

        SWAP_A => rmw_a(cpu, RmwOp::Swap)?,
        SWAP_X => rmw_x(cpu, RmwOp::Swap)?,
        SWAP_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Swap)?,
        SWAP_SHORT => rmw_short(cpu, mem, page, RmwOp::Swap)?,
        SWAP_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Swap)?,

        TNZ_A => rmw_a(cpu, RmwOp::Tnz)?,
        TNZ_X => rmw_x(cpu, RmwOp::Tnz)?,
        TNZ_REG_IND => rmw_reg_ind(cpu, mem, page, RmwOp::Tnz)?,
        TNZ_SHORT => rmw_short(cpu, mem, page, RmwOp::Tnz)?,
        TNZ_REG_IND_OFF_SHORT => rmw_reg_ind_off_short(cpu, mem, page, RmwOp::Tnz)?,

        NOP => 1,

        // --- control flow ---
        JP_FAR => {
            let (tgt_page, off) = ad::far(cpu, mem, page)?;
            let _ = tgt_page; // JP stays within the current page's offset space
            cpu.pc = off as u32;
            1
        }
        JP_LONG => { let addr = ad::long(cpu, mem, page)?; cpu.pc = addr as u32; 1 }
        JP_REG_IND => { cpu.pc = ad::reg_ind(cpu) as u32; 1 }
        JP_REG_IND_OFF_SHORT => { let addr = ad::reg_ind_off_short(cpu, mem, page)?; cpu.pc = addr as u32; 1 }
        JP_REG_IND_OFF_LONG => { let addr = ad::reg_ind_off_long(cpu, mem, page)?; cpu.pc = addr as u32; 2 }

        CALL_LONG => {
            let addr = ad::long(cpu, mem, page)?;
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = addr as u32;
            return Ok(StepOutcome { cycles: 2, was_call: true, was_return: false, ..outcome(0) });
        }
        CALL_REG_IND => {
            let addr = ad::reg_ind(cpu);
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = addr as u32;
            return Ok(StepOutcome { cycles: 1, was_call: true, was_return: false, ..outcome(0) });
        }
        CALL_REG_IND_OFF_SHORT => {
            let addr = ad::reg_ind_off_short(cpu, mem, page)?;
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = addr as u32;
            return Ok(StepOutcome { cycles: 1, was_call: true, was_return: false, ..outcome(0) });
        }
        CALL_REG_IND_OFF_LONG => {
            let addr = ad::reg_ind_off_long(cpu, mem, page)?;
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = addr as u32;
            return Ok(StepOutcome { cycles: 2, was_call: true, was_return: false, ..outcome(0) });
        }
        CALLR_SHORT => {
            let disp = ad::fetch_u8(cpu, mem, page)? as i8;
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = (cpu.pc as i64 + disp as i64) as u32;
            return Ok(StepOutcome { cycles: 2, was_call: true, was_return: false, ..outcome(0) });
        }
        CALL_FAR => {
            let (tgt_page, off) = ad::far(cpu, mem, page)?;
            let ret_page_byte: u8 = if matches!(page, Page::Page1) { 1 } else { 0 };
            push_u8(cpu, mem, page, ret_page_byte);
            let ret = cpu.pc as u16;
            push_u16(cpu, mem, page, ret);
            cpu.pc = ((if matches!(tgt_page, Page::Page1) { 1u32 } else { 0u32 }) << 16) | off as u32;
            return Ok(StepOutcome { cycles: 3, was_call: true, was_return: false, ..outcome(0) });
        }

        RET => {
            let addr = pop_u16(cpu, mem);
            check_return_target(page, addr)?;
            cpu.pc = addr as u32;
            return Ok(StepOutcome { cycles: 2, was_call: false, was_return: true, ..outcome(0) });
        }
        RETF => {
            let lo16 = pop_u16(cpu, mem);
            let page_byte = pop_u8(cpu, mem);
            let target_page = if page_byte & 1 != 0 { Page::Page1 } else { Page::Page0 };
            check_return_target(target_page, lo16)?;
            cpu.pc = ((page_byte as u32 & 1) << 16) | lo16 as u32;
            return Ok(StepOutcome { cycles: 3, was_call: false, was_return: true, ..outcome(0) });
        }

        TRAP | IRET => {
            // No asynchronous interrupt delivery is modeled; these are
            // accepted as control-flow no-ops beyond their documented
            // stack discipline, which the firmware under test never
            // exercises via TRAP/IRET directly.
            1
        }
        WFI | HALT => {
            cpu.halt();
            1
        }

        POP_A => { cpu.a = pop_u8(cpu, mem); 1 }
        POP_X => { cpu.x = pop_u8(cpu, mem); 1 }
        POP_CC => { cpu.cc = pop_u8(cpu, mem); 1 }
        POP_LONG => { let _ = pop_u16(cpu, mem); 1 }

        PUSH_IMMED => { let v = ad::immed(cpu, mem, page)?; push_u8(cpu, mem, page, v); 1 }
        PUSH_A => { push_u8(cpu, mem, page, cpu.a); 1 }
        PUSH_X => { push_u8(cpu, mem, page, cpu.x); 1 }
        PUSH_CC => { push_u8(cpu, mem, page, cpu.cc); 1 }
        PUSH_LONG => { let addr = ad::long(cpu, mem, page)?; let v = mem.load(addr); push_u8(cpu, mem, page, v); 2 }

        MUL => { let r = (cpu.y as u16) * (cpu.a as u16); cpu.y = (r >> 8) as u8; cpu.a = (r & 0xff) as u8; cpu.clear_flag_bit(CARRY); 1 }
        MUL1 => { let r = (cpu.x as u16) * (cpu.a as u16); cpu.x = (r >> 8) as u8; cpu.a = (r & 0xff) as u8; cpu.clear_flag_bit(CARRY); 1 }
        DIV => { cpu.alu_div(); 1 }

        RCF => { cpu.clear_flag_bit(CARRY); 1 }
        SCF => { cpu.set_flag_bit(CARRY); 1 }
        CCF => { cpu.assign_flag(CARRY, !cpu.carry()); 1 }
        RIM => { cpu.clear_flag_bit(crate::cpu::state::INTERRUPT_MASK_L0 | crate::cpu::state::INTERRUPT_MASK_L1); 1 }
        SIM => { cpu.set_flag_bit(crate::cpu::state::INTERRUPT_MASK_L0 | crate::cpu::state::INTERRUPT_MASK_L1); 1 }
        RSP => { cpu.sp = crate::cpu::state::SP_INITIAL_VALUE; 1 }
        ADD_SP => { let v = ad::immed(cpu, mem, page)?; cpu.sp = cpu.sp.wrapping_add(v as u16); 1 }

        MOV_LONG_IMMED => {
            let dst = ad::long(cpu, mem, page)?;
            let v = ad::immed(cpu, mem, page)?;
            mem.store(page, dst, v);
            3
        }
        MOV_SHORT_SHORT => {
            let dst = ad::short(cpu, mem, page)?;
            let src = ad::short(cpu, mem, page)?;
            let v = mem.load(src);
            mem.store(page, dst, v);
            2
        }
        MOV_LONG_LONG => {
            let dst = ad::long(cpu, mem, page)?;
            let src = ad::long(cpu, mem, page)?;
            let v = mem.load(src);
            mem.store(page, dst, v);
            3
        }

        other => {
            return Err(SimError::UnknownOpcode { opcode: other, pc: cpu.previous_pc });
        }
    };

    Ok(outcome(cycles))
}

/// Dispatch while precode 0x90/0x91/0x92 is active: reuses the base table,
/// but REG_IND-family addressing picks up the alternate register/indirect
/// semantics selected in `addressing`. Handled opcodes clear their precode
/// flag; the two named stub cases (see module doc) do not.
fn dispatch_indexed_precode(
    cpu: &mut CpuState,
    mem: &mut AddressSpace,
    page: Page,
    opcode: u8,
) -> SimResult<StepOutcome> {
    use opcodes::*;

    // Stub cases the firmware never exercises: leave precode set so the
    // caller raises UnhandledPrefix (see DESIGN.md Open Question #2).
    if cpu.precode.p90 && opcode == LDF_A_REG_IND {
        return Ok(outcome(1));
    }
    if (cpu.precode.p91 || cpu.precode.p92) && opcode == LD_A_REG_IND_OFF_LONG {
        return Ok(outcome(2));
    }

    if cpu.precode.p91 || cpu.precode.p92 {
        // `[short]` / `[short.w]` / `([short],Y)` indirection for the small
        // set of REG_IND-class loads/stores the firmware actually uses.
        let out = match opcode {
            LD_A_REG_IND => {
                let addr = if cpu.precode.p91 {
                    ad::indir_short_off_y(cpu, mem, page)?
                } else {
                    ad::indir_short(cpu, mem, page)?
                };
                cpu.a = mem.load(addr);
                let a = cpu.a;
                cpu.update_nz(a);
                Some(2u32)
            }
            LD_REG_IND_A => {
                let addr = if cpu.precode.p91 {
                    ad::indir_short_off_y(cpu, mem, page)?
                } else {
                    ad::indir_short(cpu, mem, page)?
                };
                mem.store(page, addr, cpu.a);
                Some(2u32)
            }
            _ => None,
        };
        if let Some(cycles) = out {
            consume_precode(cpu);
            return Ok(outcome(cycles));
        }
    }

    if cpu.precode.p90 {
        // 0x90 redirects X-register addressing/arithmetic to Y; the base
        // table's addressing helpers already consult `IndexReg::select`,
        // so most opcodes fall straight through.
        let out = dispatch_base(cpu, mem, page, opcode)?;
        consume_precode(cpu);
        return Ok(out);
    }

    Err(SimError::UnknownOpcode { opcode, pc: cpu.previous_pc })
}

/// Dispatch for the ST8 superset precode (0x72): direct-to-long RMW family
/// plus `BRES` against a long (16-bit) address.
fn dispatch_precode_72(
    cpu: &mut CpuState,
    mem: &mut AddressSpace,
    page: Page,
    opcode: u8,
) -> SimResult<StepOutcome> {
    use opcodes::*;

    let cycles = match opcode {
        CLR_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Clr) }
        INC_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Inc) }
        DEC_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Dec) }
        TNZ_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Tnz) }
        RLC_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Rlc) }
        SLA_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Sla) }
        CPL_LONG_72 => { let addr = ad::long(cpu, mem, page)?; rmw_store_long(cpu, mem, page, addr, RmwOp::Cpl) }
        BRES_LONG_72 => {
            let addr = ad::long(cpu, mem, page)?;
            let bit = ad::fetch_u8(cpu, mem, page)? & 0x07;
            let v = mem.load(addr) & !(1 << bit);
            mem.store(page, addr, v);
            3
        }
        BSET_LONG_72 => {
            let addr = ad::long(cpu, mem, page)?;
            let bit = ad::fetch_u8(cpu, mem, page)? & 0x07;
            let v = mem.load(addr) | (1 << bit);
            mem.store(page, addr, v);
            3
        }
        _ => return Err(SimError::UnknownOpcode { opcode, pc: cpu.previous_pc }),
    };
    consume_precode(cpu);
    Ok(outcome(cycles))
}

fn rmw_store_long(cpu: &mut CpuState, mem: &mut AddressSpace, page: Page, addr: u16, op: RmwOp) -> u32 {
    let cur = mem.load(addr);
    let v = apply_rmw(cpu, &op, cur);
    if !matches!(op, RmwOp::Tnz) {
        mem.store(page, addr, v);
    }
    3
}

use opcodes::bit_index;

// Opcode assignments for the precode-0x72 direct-to-long RMW family. These
// are not part of the base table (they reuse base-table byte values under a
// different precode) so they are declared locally rather than in
// `opcodes.rs`, which only holds the unprefixed table.
const CLR_LONG_72: u8 = 0xcf;
const INC_LONG_72: u8 = 0xbc;
const DEC_LONG_72: u8 = 0xba;
const TNZ_LONG_72: u8 = 0xbd;
const RLC_LONG_72: u8 = 0xb9;
const SLA_LONG_72: u8 = 0xb8;
const CPL_LONG_72: u8 = 0xb3;
const BRES_LONG_72: u8 = 0x11;
const BSET_LONG_72: u8 = 0x10;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AddressSpace;

    fn setup() -> (CpuState, AddressSpace) {
        (CpuState::new(), AddressSpace::new())
    }

    #[test]
    fn ld_a_immed_sets_nz() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::LD_A_IMMED);
        mem.store_raw(Page::Page0, 0x4001, 0x00);
        let out = step(&mut cpu, &mut mem, Page::Page0).unwrap();
        assert_eq!(cpu.a, 0);
        assert!(cpu.is_flag_set(ZERO));
        assert_eq!(out.cycles, 1);
    }

    #[test]
    fn call_then_ret_round_trips_pc() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::CALL_LONG);
        mem.store_raw(Page::Page0, 0x4001, 0x50);
        mem.store_raw(Page::Page0, 0x4002, 0x00);
        mem.store_raw(Page::Page0, 0x5000, opcodes::RET);
        step(&mut cpu, &mut mem, Page::Page0).unwrap();
        assert_eq!(cpu.pc, 0x5000);
        step(&mut cpu, &mut mem, Page::Page0).unwrap();
        assert_eq!(cpu.pc, 0x4003);
    }

    #[test]
    fn fetch_from_ram_aborts() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x0020;
        let err = step(&mut cpu, &mut mem, Page::Page0).unwrap_err();
        assert!(matches!(err, SimError::FetchFromNonCodeRegion(0x0020)));
    }

    #[test]
    fn unhandled_prefix_stub_case_aborts() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::PRECODE_90);
        mem.store_raw(Page::Page0, 0x4001, opcodes::LDF_A_REG_IND);
        let err = step(&mut cpu, &mut mem, Page::Page0).unwrap_err();
        assert!(matches!(err, SimError::UnhandledPrefix(_)));
    }

    #[test]
    fn step_outcome_tags_precode_class_and_opcode() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);
        let out = step(&mut cpu, &mut mem, Page::Page0).unwrap();
        assert_eq!(out.precode_class, crate::breakpoint::PrecodeClass::None);
        assert_eq!(out.opcode, opcodes::NOP);
    }

    #[test]
    fn btjt_sets_carry_and_branches_when_bit_set() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x4000;
        mem.store_raw(Page::Page0, 0x4000, opcodes::BTJT[2]);
        mem.store_raw(Page::Page0, 0x4001, 0x20); // short address
        mem.store_raw(Page::Page0, 0x0020, 0x04); // bit 2 set
        mem.store_raw(Page::Page0, 0x4002, 0x05); // +5 displacement
        let pc_before = cpu.pc;
        step(&mut cpu, &mut mem, Page::Page0).unwrap();
        assert!(cpu.carry());
        assert_eq!(cpu.pc, pc_before + 3 + 5);
    }
}
