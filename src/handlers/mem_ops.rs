//! Load/store handlers, plus the `Xtag` tagged load/store (spec.md §4.6
//! "Loads"/"Stores"/"Tagged load"/"Tagged store", and §6).

use crate::bits::{imm_i, imm_s, rd, rs1, rs2};
use crate::memory::Width;
use crate::trap::Trap;

use crate::hart::Hart;

fn next(pc: u64) -> u64 {
    pc + 4
}

fn effective_addr_load(hart: &Hart, insn: u32) -> u64 {
    (hart.read_reg(rs1(insn)) as i64).wrapping_add(imm_i(insn)) as u64
}

fn effective_addr_store(hart: &Hart, insn: u32) -> u64 {
    (hart.read_reg(rs1(insn)) as i64).wrapping_add(imm_s(insn)) as u64
}

macro_rules! load_handler {
    ($name:ident, $width:expr, $sign:expr) => {
        pub fn $name(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
            let addr = effective_addr_load(hart, insn);
            let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
            let v = hart
                .mem
                .load(addr, $width, $sign, caps, hart.csr.csr_ld_tag)?;
            hart.write_rd(rd(insn), v);
            Ok(next(pc))
        }
    };
}

macro_rules! store_handler {
    ($name:ident, $width:expr) => {
        pub fn $name(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
            let addr = effective_addr_store(hart, insn);
            let v = hart.read_reg(rs2(insn));
            let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
            hart.mem.store(addr, $width, v, caps, hart.csr.csr_sd_tag)?;
            Ok(next(pc))
        }
    };
}

load_handler!(lb, Width::B, true);
load_handler!(lh, Width::H, true);
load_handler!(lw, Width::W, true);
load_handler!(ld, Width::D, true);
load_handler!(lbu, Width::B, false);
load_handler!(lhu, Width::H, false);
load_handler!(lwu, Width::W, false);

store_handler!(sb, Width::B);
store_handler!(sh, Width::H);
store_handler!(sw, Width::W);
store_handler!(sd, Width::D);

/// `LDCT rd, imm(rs1)` (spec.md §6): 64-bit tagged load, copies the memory
/// tag into `rd`'s register tag.
pub fn ldct(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let addr = effective_addr_load(hart, insn);
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    let (v, tag) = hart.mem.load_tagged(addr, caps, hart.csr.csr_ld_tag)?;
    hart.write_reg_tagged(rd(insn), v, tag);
    Ok(next(pc))
}

/// `SDCT rs2, imm(rs1)` (spec.md §6): 64-bit tagged store, writes `rs2`'s
/// register tag into memory.
pub fn sdct(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let addr = effective_addr_store(hart, insn);
    let rs2_reg = rs2(insn);
    let v = hart.read_reg(rs2_reg);
    let tag = hart.read_reg_tag(rs2_reg);
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    hart.mem.store_tagged(addr, v, tag, caps, hart.csr.csr_sd_tag)?;
    Ok(next(pc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::Hart;
    use crate::registers::Register;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn sd_then_ld_round_trips() {
        let mut h = hart();
        h.gpr.set(Register::X5, 7);
        let sd_insn: u32 = (5 << 20) | (0 << 15) | (0b011 << 12) | 0b0100011;
        let ld_insn: u32 = (0 << 20) | (0 << 15) | (0b011 << 12) | (6 << 7) | 0b0000011;
        sd(&mut h, sd_insn, h.pc).unwrap();
        ld(&mut h, ld_insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X6), 7);
    }

    #[test]
    fn sub_word_store_clears_the_enclosing_word_tag() {
        let mut h = hart();
        h.mem.tagmem.tag_write(0, 0xaa);
        h.gpr.set(Register::X5, 1);
        let sb_insn: u32 = (5 << 20) | (0 << 15) | (0b000 << 12) | 0b0100011;
        sb(&mut h, sb_insn, h.pc).unwrap();
        assert_eq!(h.mem.tagmem.tag_read(0), 0);
    }

    #[test]
    fn ldct_sdct_round_trip_preserves_register_tag() {
        let mut h = hart();
        h.gpr.set_tagged(Register::X5, 42, 3);
        let sdct_insn: u32 = (5 << 20) | (0 << 15) | (0b011 << 12) | 0b0101011;
        let ldct_insn: u32 = (0 << 20) | (0 << 15) | (0b011 << 12) | (7 << 7) | 0b0001011;
        sdct(&mut h, sdct_insn, h.pc).unwrap();
        ldct(&mut h, ldct_insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X7), 42);
        assert_eq!(h.read_reg_tag(Register::X7), 3);
    }
}
