//! Control-transfer handlers: `JAL`/`JALR`/branches (spec.md §4.6 "Control
//! transfer": "Return address registers receive tag 0").

use crate::bits::{imm_b, imm_i, imm_j, rd, rs1, rs2};
use crate::hart::Hart;
use crate::trap::{Trap, TrapCause};

pub fn jal(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let target = pc.wrapping_add(imm_j(insn) as u64);
    if target & 0b11 != 0 {
        return Err(Trap::with_addr(TrapCause::InstrAddrMisaligned, target));
    }
    hart.write_rd(rd(insn), pc + 4);
    Ok(target)
}

pub fn jalr(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let base = hart.read_reg(rs1(insn)) as i64;
    let target = (base.wrapping_add(imm_i(insn)) as u64) & !1;
    if target & 0b11 != 0 {
        return Err(Trap::with_addr(TrapCause::InstrAddrMisaligned, target));
    }
    hart.write_rd(rd(insn), pc + 4);
    Ok(target)
}

fn branch_if(hart: &mut Hart, insn: u32, pc: u64, taken: bool) -> Result<u64, Trap> {
    if !taken {
        return Ok(pc + 4);
    }
    let target = pc.wrapping_add(imm_b(insn) as u64);
    if target & 0b11 != 0 {
        return Err(Trap::with_addr(TrapCause::InstrAddrMisaligned, target));
    }
    Ok(target)
}

pub fn beq(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = hart.read_reg(rs1(insn)) == hart.read_reg(rs2(insn));
    branch_if(hart, insn, pc, taken)
}

pub fn bne(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = hart.read_reg(rs1(insn)) != hart.read_reg(rs2(insn));
    branch_if(hart, insn, pc, taken)
}

pub fn blt(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = (hart.read_reg(rs1(insn)) as i64) < (hart.read_reg(rs2(insn)) as i64);
    branch_if(hart, insn, pc, taken)
}

pub fn bge(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = (hart.read_reg(rs1(insn)) as i64) >= (hart.read_reg(rs2(insn)) as i64);
    branch_if(hart, insn, pc, taken)
}

pub fn bltu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = hart.read_reg(rs1(insn)) < hart.read_reg(rs2(insn));
    branch_if(hart, insn, pc, taken)
}

pub fn bgeu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let taken = hart.read_reg(rs1(insn)) >= hart.read_reg(rs2(insn));
    branch_if(hart, insn, pc, taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Register;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn jal_sets_link_register_with_zero_tag() {
        let mut h = hart();
        let pc = h.pc;
        h.gpr.set_tagged(Register::X1, 0, 9);
        let insn: u32 = (1 << 7) | 0b1101111 | (4 << 21);
        let next = jal(&mut h, insn, pc).unwrap();
        assert_eq!(next, pc + 8);
        assert_eq!(h.read_reg(Register::X1), pc + 4);
        assert_eq!(h.read_reg_tag(Register::X1), 0);
    }

    #[test]
    fn beq_not_taken_falls_through() {
        let mut h = hart();
        h.gpr.set(Register::X1, 1);
        h.gpr.set(Register::X2, 2);
        let insn: u32 = (2 << 20) | (1 << 15) | (0b000 << 12) | 0b1100011;
        let next = beq(&mut h, insn, h.pc).unwrap();
        assert_eq!(next, h.pc + 4);
    }
}
