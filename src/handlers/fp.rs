//! `F`/`D` extension handlers (spec.md §4.6 "FP and CSR": "unchanged by
//! tags; dirty FP state on any FP CSR write"). GPR tags are never touched
//! by these handlers since floating-point registers carry no tag
//! (spec.md §3).

use crate::bits::{frd, frs1, frs2, imm_i, imm_s, rs1};
use crate::hart::Hart;
use crate::memory::Width;
use crate::trap::Trap;

fn next(pc: u64) -> u64 {
    pc + 4
}

fn mark_fs_dirty(hart: &mut Hart) {
    hart.csr.mstatus.fs = 0b11;
}

pub fn fld(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let addr = (hart.read_reg(rs1(insn)) as i64).wrapping_add(imm_i(insn)) as u64;
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    let bits = hart.mem.load(addr, Width::D, false, caps, hart.csr.csr_ld_tag)?;
    hart.fpr.set_bits(frd(insn), bits);
    mark_fs_dirty(hart);
    Ok(next(pc))
}

pub fn fsd(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let addr = (hart.read_reg(rs1(insn)) as i64).wrapping_add(imm_s(insn)) as u64;
    // The value to store is encoded in the rs2 field; rs1 is the base.
    let bits = hart.fpr.get_bits(frs2(insn));
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    hart.mem.store(addr, Width::D, bits, caps, hart.csr.csr_sd_tag)?;
    Ok(next(pc))
}

pub fn fadd_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.fpr.get_f64(frs1(insn));
    let b = hart.fpr.get_f64(frs2(insn));
    hart.fpr.set_f64(frd(insn), a + b);
    mark_fs_dirty(hart);
    Ok(next(pc))
}

pub fn fcvt_d_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let v = hart.read_reg(rs1(insn)) as i32;
    hart.fpr.set_f64(frd(insn), v as f64);
    mark_fs_dirty(hart);
    Ok(next(pc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::FRegister;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn fadd_d_marks_fs_dirty() {
        let mut h = hart();
        h.fpr.set_f64(FRegister::from_bits(1), 1.5);
        h.fpr.set_f64(FRegister::from_bits(2), 2.5);
        let insn: u32 = (2 << 20) | (1 << 15) | (3 << 7) | 0b1010011 | (0b0000001 << 25);
        fadd_d(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.fpr.get_f64(FRegister::from_bits(3)), 4.0);
        assert_eq!(h.csr.mstatus.fs, 0b11);
    }

    #[test]
    fn fsd_then_fld_round_trips() {
        let mut h = hart();
        h.fpr.set_f64(FRegister::from_bits(5), 3.25);
        h.gpr.set(crate::registers::Register::X10, 0x40);
        let fsd_insn: u32 = (5 << 20) | (10 << 15) | (0b011 << 12) | 0b0100111;
        fsd(&mut h, fsd_insn, h.pc).unwrap();
        let fld_insn: u32 = (0 << 20) | (10 << 15) | (0b011 << 12) | (6 << 7) | 0b0000111;
        fld(&mut h, fld_insn, h.pc).unwrap();
        assert_eq!(h.fpr.get_f64(FRegister::from_bits(6)), 3.25);
    }
}
