/*!
cpu::mod - Public façade for the microcontroller CPU core.

    state.rs  - registers, condition codes, precode bookkeeping.
    alu.rs    - pure ALU primitives (add/adc/sub/sbc/shifts/rotates/div).

Instruction decode and dispatch live in the `decode` module, which borrows
`CpuState` together with the `memory::AddressSpace` to execute one
instruction at a time. This module only re-exports the stable register/flag
surface; decode internals are not part of the public API.
*/

pub mod alu;
pub mod state;

pub use state::{
    CpuState, PrecodeFlags, CARRY, HALF_CARRY, INTERRUPT_MASK_L0, INTERRUPT_MASK_L1, NEGATIVE,
    OVERFLOW, ZERO,
};
