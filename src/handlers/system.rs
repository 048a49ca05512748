//! System instructions: `ECALL`/`EBREAK`/`SRET`/`MRET`/`SFENCE.VM` and the
//! `CSRR*` family (spec.md §4.6 "System", §4.7).

use crate::bits::{csr_addr, rd, rs1};
use crate::config::{CSR_LD_TAG_ADDR, CSR_SD_TAG_ADDR};
use crate::csr::{Csr, Priv};
use crate::hart::{Hart, PC_SERIALIZE};
use crate::trap::{Trap, TrapCause};

fn next(pc: u64) -> u64 {
    pc + 4
}

pub fn ecall(hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    let cause = match hart.csr.mstatus.prv {
        Priv::U => TrapCause::EcallFromUMode,
        Priv::S => TrapCause::EcallFromSMode,
        Priv::M => TrapCause::EcallFromMMode,
    };
    Err(Trap::new(cause))
}

pub fn ebreak(_hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    Err(Trap::new(TrapCause::Breakpoint))
}

/// `MRET` (spec.md §4.6 "System"): pop the privilege stack and resume at
/// `mepc`. Flips `xlen`/`VM` bookkeeping indirectly via the CSR write path,
/// so it returns `PC_SERIALIZE` (spec.md §4.7 "Instructions that flip xlen
/// or the VM return PC_SERIALIZE").
pub fn mret(hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    if hart.csr.mstatus.prv != Priv::M {
        return Err(Trap::new(TrapCause::IllegalInstr));
    }
    hart.pc = hart.csr.mepc;
    hart.csr.pop_privilege_stack();
    hart.mem.translator.flush_tlb();
    Ok(PC_SERIALIZE)
}

pub fn sret(hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    if hart.csr.mstatus.prv < Priv::S {
        return Err(Trap::new(TrapCause::IllegalInstr));
    }
    hart.pc = hart.csr.sepc;
    hart.csr.pop_privilege_stack();
    hart.mem.translator.flush_tlb();
    Ok(PC_SERIALIZE)
}

/// `SFENCE.VM` (spec.md §4.6): flush the TLB.
pub fn sfence_vm(hart: &mut Hart, _insn: u32, pc: u64) -> Result<u64, Trap> {
    hart.mem.translator.flush_tlb();
    hart.icache.flush();
    Ok(next(pc))
}

fn resolve_csr(addr: u16) -> Option<Csr> {
    Some(match addr {
        0x300 => Csr::Mstatus,
        0x304 => Csr::Mie,
        0x344 => Csr::Mip,
        0x305 => Csr::Mtvec,
        0x340 => Csr::Mscratch,
        0x341 => Csr::Mepc,
        0x342 => Csr::Mcause,
        0x343 => Csr::Mbadaddr,
        0x180 => Csr::Sptbr,
        0x141 => Csr::Sepc,
        0x105 => Csr::Stvec,
        0x140 => Csr::Sscratch,
        0x044 => Csr::Stimecmp,
        0x780 => Csr::Mtohost,
        0x781 => Csr::Mfromhost,
        0xb00 | 0xc00 => Csr::Cycle,
        0xc01 => Csr::Time,
        0xb02 | 0xc02 => Csr::Instret,
        0x301 => Csr::Misa,
        a if a == CSR_LD_TAG_ADDR => Csr::CsrLdTag,
        a if a == CSR_SD_TAG_ADDR => Csr::CsrSdTag,
        _ => return None,
    })
}

fn csr_or_illegal(insn: u32) -> Result<Csr, Trap> {
    resolve_csr(csr_addr(insn)).ok_or_else(|| Trap::new(TrapCause::IllegalInstr))
}

pub fn csrrw(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let new = hart.read_reg(rs1(insn));
    hart.set_csr(csr, new)?;
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn csrrs(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let mask = hart.read_reg(rs1(insn));
    if mask != 0 {
        hart.set_csr(csr, old | mask)?;
    }
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn csrrc(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let mask = hart.read_reg(rs1(insn));
    if mask != 0 {
        hart.set_csr(csr, old & !mask)?;
    }
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn csrrwi(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let uimm = ((insn >> 15) & 0b1_1111) as u64;
    hart.set_csr(csr, uimm)?;
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn csrrsi(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let uimm = ((insn >> 15) & 0b1_1111) as u64;
    if uimm != 0 {
        hart.set_csr(csr, old | uimm)?;
    }
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn csrrci(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let csr = csr_or_illegal(insn)?;
    let old = hart.get_csr(csr)?;
    let uimm = ((insn >> 15) & 0b1_1111) as u64;
    if uimm != 0 {
        hart.set_csr(csr, old & !uimm)?;
    }
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Register;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn ecall_from_m_mode_traps_with_the_right_cause() {
        let mut h = hart();
        let err = ecall(&mut h, 0, h.pc).unwrap_err();
        assert_eq!(err.cause, TrapCause::EcallFromMMode);
    }

    #[test]
    fn csrrw_reads_old_value_and_writes_new() {
        let mut h = hart();
        h.gpr.set(Register::X1, 0xdead);
        let insn: u32 = ((CSR_LD_TAG_ADDR as u32) << 20) | (1 << 15) | (0b001 << 12) | (2 << 7) | 0b1110011;
        csrrw(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.csr.csr_ld_tag, 0xdead);
    }

    #[test]
    fn unmapped_csr_is_illegal_instruction() {
        let mut h = hart();
        let insn: u32 = (0x999 << 20) | (0 << 15) | (0b001 << 12) | (1 << 7) | 0b1110011;
        let err = csrrw(&mut h, insn, h.pc).unwrap_err();
        assert_eq!(err.cause, TrapCause::IllegalInstr);
    }

    #[test]
    fn csr_ld_tag_mask_turns_tagged_load_into_a_trap() {
        let mut h = hart();
        h.gpr.set_tagged(Register::X5, 42, 3);
        let sdct: u32 = (5 << 20) | (0 << 15) | (0b011 << 12) | 0b0101011;
        crate::handlers::mem_ops::sdct(&mut h, sdct, h.pc).unwrap();
        h.csr.csr_ld_tag = 1 << 3;
        let ldct: u32 = (0 << 20) | (0 << 15) | (0b011 << 12) | (7 << 7) | 0b0001011;
        let err = crate::handlers::mem_ops::ldct(&mut h, ldct, h.pc).unwrap_err();
        assert_eq!(err.cause, TrapCause::TagLoad);
        assert_eq!(err.badaddr, Some(0));
    }
}
