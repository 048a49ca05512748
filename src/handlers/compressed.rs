//! Compressed (`C.*`) instruction handlers (spec.md §4.6 "Compressed"):
//! each expands to a base instruction behaviourally. `C.ADDI` to `SP` and
//! `C.JALR` clear the tag of `SP`/`RA` respectively — handled here by simply
//! routing through `Hart::write_rd`, which always clears the destination
//! tag (spec.md §4.6 point 4), so no special-casing is needed.

use crate::hart::Hart;
use crate::registers::Register;
use crate::trap::{Trap, TrapCause};

fn rd_prime(insn: u32) -> Register {
    Register::from_bits(((insn >> 2) & 0b111) + 8)
}

fn rs2_full(insn: u32) -> Register {
    Register::from_bits((insn >> 2) & 0b1_1111)
}

fn rs1_full(insn: u32) -> Register {
    Register::from_bits((insn >> 7) & 0b1_1111)
}

/// `C.ADDI4SPN rd', nzuimm` — expands to `addi rd', x2, nzuimm`.
pub fn c_addi4spn(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let nzuimm = (((insn >> 7) & 0b1111) << 6)
        | (((insn >> 11) & 0b11) << 4)
        | (((insn >> 5) & 0b1) << 3)
        | (((insn >> 6) & 0b1) << 2);
    if nzuimm == 0 {
        return Err(Trap::new(TrapCause::IllegalInstr));
    }
    let sp = hart.read_reg(Register::X2);
    hart.write_rd(rd_prime(insn), sp.wrapping_add(nzuimm as u64));
    Ok(pc + 2)
}

/// `C.ADDI rd, nzimm` — expands to `addi rd, rd, nzimm`, clearing the
/// destination tag even when `rd == sp` (spec.md §4.6 "C.ADDI to SP ...
/// clear the tag of SP").
pub fn c_addi(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let rd = rs1_full(insn);
    let imm5 = ((insn >> 2) & 0b1_1111) as i64;
    let imm = if insn & (1 << 12) != 0 {
        imm5 - 32
    } else {
        imm5
    };
    let v = (hart.read_reg(rd) as i64).wrapping_add(imm);
    hart.write_rd(rd, v as u64);
    Ok(pc + 2)
}

/// `C.JR rs1` — expands to `jalr x0, 0(rs1)`.
pub fn c_jr(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let _ = pc;
    let target = hart.read_reg(rs1_full(insn)) & !1;
    if target & 0b11 != 0 {
        return Err(Trap::with_addr(TrapCause::InstrAddrMisaligned, target));
    }
    Ok(target)
}

/// `C.JALR rs1` — expands to `jalr x1, 0(rs1)`, clearing `ra`'s tag
/// (spec.md §4.6 "C.JALR clear the tag of ... RA").
pub fn c_jalr(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let target = hart.read_reg(rs1_full(insn)) & !1;
    if target & 0b11 != 0 {
        return Err(Trap::with_addr(TrapCause::InstrAddrMisaligned, target));
    }
    hart.write_rd(Register::X1, pc + 2);
    Ok(target)
}

/// `C.MV rd, rs2` — expands to `add rd, x0, rs2`.
pub fn c_mv(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let rd = rs1_full(insn);
    let v = hart.read_reg(rs2_full(insn));
    hart.write_rd(rd, v);
    Ok(pc + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn c_addi_to_sp_clears_tag() {
        let mut h = hart();
        h.gpr.set_tagged(Register::X2, 0x1000, 7);
        // C.ADDI x2, 4: rd=rs1=x2 at bits[11:7], imm5=4 at bits[6:2], sign bit12=0
        let insn: u32 = (2 << 7) | (4 << 2) | 0b01;
        c_addi(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.read_reg_tag(Register::X2), 0);
    }

    #[test]
    fn c_jalr_clears_ra_tag() {
        let mut h = hart();
        h.gpr.set(Register::X5, 0x2000);
        h.gpr.set_tagged(Register::X1, 0, 9);
        let insn: u32 = (0b1001 << 12) | (5 << 7) | 0b10;
        let pc = h.pc;
        let target = c_jalr(&mut h, insn, pc).unwrap();
        assert_eq!(target, 0x2000);
        assert_eq!(h.read_reg(Register::X1), pc + 2);
        assert_eq!(h.read_reg_tag(Register::X1), 0);
    }
}
