//! Instruction handlers (C6), one file per family, matching spec.md §4.6's
//! instruction-family breakdown. Every handler shares the signature
//! `fn(&mut Hart, u32, u64) -> Result<u64, Trap>` (`hart`, `insn`, `pc`) and
//! returns the next `pc`, a branch target, or `hart::PC_SERIALIZE`.

pub mod alu;
pub mod atomic;
pub mod branch;
pub mod compressed;
pub mod fp;
pub mod mem_ops;
pub mod system;
