//! Integer ALU / shift / compare handlers (spec.md §4.6 "Integer ALU").
//!
//! All of these clear the destination tag via `Hart::write_rd`
//! (spec.md §4.6 point 4: "for plain ops, via WRITE_RD(v) which also
//! clears the destination tag").

use crate::bits::{imm_i, imm_u, rd, rs1, rs2};
use crate::hart::{Hart, PC_SERIALIZE};
use crate::trap::Trap;

fn next(pc: u64) -> u64 {
    pc + 4
}

pub fn add(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a.wrapping_add(b));
    Ok(next(pc))
}

pub fn sub(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a.wrapping_sub(b));
    Ok(next(pc))
}

pub fn slt(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    let b = hart.read_reg(rs2(insn)) as i64;
    hart.write_rd(rd(insn), if a < b { 1 } else { 0 });
    Ok(next(pc))
}

pub fn xor(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a ^ b);
    Ok(next(pc))
}

pub fn or(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a | b);
    Ok(next(pc))
}

pub fn and(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a & b);
    Ok(next(pc))
}

pub fn sltu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), if a < b { 1 } else { 0 });
    Ok(next(pc))
}

pub fn sll(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn)) & 0x3f;
    hart.write_rd(rd(insn), a << b);
    Ok(next(pc))
}

pub fn srl(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn)) & 0x3f;
    hart.write_rd(rd(insn), a >> b);
    Ok(next(pc))
}

pub fn sra(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    let b = hart.read_reg(rs2(insn)) & 0x3f;
    hart.write_rd(rd(insn), (a >> b) as u64);
    Ok(next(pc))
}

pub fn addi(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    hart.write_rd(rd(insn), a.wrapping_add(imm_i(insn)) as u64);
    Ok(next(pc))
}

pub fn slti(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    hart.write_rd(rd(insn), if a < imm_i(insn) { 1 } else { 0 });
    Ok(next(pc))
}

pub fn sltiu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    hart.write_rd(rd(insn), if a < imm_i(insn) as u64 { 1 } else { 0 });
    Ok(next(pc))
}

pub fn xori(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    hart.write_rd(rd(insn), (a ^ imm_i(insn)) as u64);
    Ok(next(pc))
}

pub fn ori(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    hart.write_rd(rd(insn), (a | imm_i(insn)) as u64);
    Ok(next(pc))
}

pub fn andi(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    hart.write_rd(rd(insn), (a & imm_i(insn)) as u64);
    Ok(next(pc))
}

pub fn lui(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    hart.write_rd(rd(insn), imm_u(insn) as u64);
    Ok(next(pc))
}

pub fn auipc(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    hart.write_rd(rd(insn), pc.wrapping_add(imm_u(insn) as u64));
    Ok(next(pc))
}

pub fn mul(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    hart.write_rd(rd(insn), a.wrapping_mul(b));
    Ok(next(pc))
}

pub fn mulh(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64 as i128;
    let b = hart.read_reg(rs2(insn)) as i64 as i128;
    hart.write_rd(rd(insn), ((a * b) >> 64) as u64);
    Ok(next(pc))
}

pub fn div(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    let b = hart.read_reg(rs2(insn)) as i64;
    let v = if b == 0 {
        -1i64
    } else if a == i64::MIN && b == -1 {
        a
    } else {
        a.wrapping_div(b)
    };
    hart.write_rd(rd(insn), v as u64);
    Ok(next(pc))
}

pub fn divu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    let v = if b == 0 { u64::MAX } else { a / b };
    hart.write_rd(rd(insn), v);
    Ok(next(pc))
}

pub fn rem(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn)) as i64;
    let b = hart.read_reg(rs2(insn)) as i64;
    let v = if b == 0 {
        a
    } else if a == i64::MIN && b == -1 {
        0
    } else {
        a.wrapping_rem(b)
    };
    hart.write_rd(rd(insn), v as u64);
    Ok(next(pc))
}

pub fn remu(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = hart.read_reg(rs1(insn));
    let b = hart.read_reg(rs2(insn));
    let v = if b == 0 { a } else { a % b };
    hart.write_rd(rd(insn), v);
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
    fn add_clears_destination_tag() {
        let mut h = hart();
        h.gpr.set_tagged(Register::X2, 1, 9);
        h.gpr.set_tagged(Register::X3, 2, 9);
        let insn: u32 = (3 << 20) | (2 << 15) | (1 << 7) | 0b0110011;
        add(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X1), 3);
        assert_eq!(h.read_reg_tag(Register::X1), 0);
    }

    #[test]
    fn addi_sign_extends_negative_immediate() {
        let mut h = hart();
        let insn: u32 = 0xfff0_0093; // addi x1, x0, -1
        addi(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X1), u64::MAX);
    }

    #[test]
    fn div_by_zero_returns_all_ones() {
        let mut h = hart();
        h.gpr.set(Register::X2, 10);
        let insn: u32 = (0 << 25) | (0 << 20) | (2 << 15) | (0b100 << 12) | (1 << 7) | 0b0110011;
        div(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X1), u64::MAX);
    }

    #[test]
    fn serialize_sentinel_is_not_emitted_by_plain_alu_ops() {
        let mut h = hart();
        let insn: u32 = (3 << 20) | (2 << 15) | (1 << 7) | 0b0110011;
        let r = add(&mut h, insn, h.pc).unwrap();
        assert_ne!(r, PC_SERIALIZE);
    }
}
