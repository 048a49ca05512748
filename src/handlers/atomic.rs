//! `A` extension: load-reserved/store-conditional and AMOs (spec.md §4.6
//! "Atomics", "Load-Reserved / Store-Conditional").

use crate::bits::{rd, rs1, rs2};
use crate::hart::{Hart, NO_RESERVATION};
use crate::memory::Width;
use crate::trap::Trap;
#[cfg(test)]
use crate::translate::PhysMem;

fn next(pc: u64) -> u64 {
    pc + 4
}

fn addr(hart: &Hart, insn: u32) -> u64 {
    hart.read_reg(rs1(insn))
}

pub fn lr_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = addr(hart, insn);
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    let v = hart.mem.load(a, Width::W, true, caps, hart.csr.csr_ld_tag)?;
    hart.load_reservation = a;
    hart.write_rd(rd(insn), v);
    Ok(next(pc))
}

pub fn lr_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let a = addr(hart, insn);
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    let v = hart.mem.load(a, Width::D, true, caps, hart.csr.csr_ld_tag)?;
    hart.load_reservation = a;
    hart.write_rd(rd(insn), v);
    Ok(next(pc))
}

/// `SC.W`/`SC.D` (spec.md §4.6): succeeds (writes 0 to `rd`) iff `addr ==
/// load_reservation`; otherwise writes 1 and performs no memory write.
fn sc(hart: &mut Hart, insn: u32, pc: u64, width: Width) -> Result<u64, Trap> {
    let a = addr(hart, insn);
    if hart.load_reservation == a && a != NO_RESERVATION {
        let v = hart.read_reg(rs2(insn));
        let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
        hart.mem.store(a, width, v, caps, hart.csr.csr_sd_tag)?;
        hart.load_reservation = NO_RESERVATION;
        hart.write_rd(rd(insn), 0);
    } else {
        hart.write_rd(rd(insn), 1);
    }
    Ok(next(pc))
}

pub fn sc_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    sc(hart, insn, pc, Width::W)
}

pub fn sc_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    sc(hart, insn, pc, Width::D)
}

fn amo<F: FnOnce(u64) -> u64>(
    hart: &mut Hart,
    insn: u32,
    pc: u64,
    width: Width,
    op: F,
) -> Result<u64, Trap> {
    let a = addr(hart, insn);
    let caps = hart.csr.translation_caps(hart.csr.mstatus.prv1);
    let old = hart
        .mem
        .amo(a, width, caps, hart.csr.csr_ld_tag, hart.csr.csr_sd_tag, op)?;
    hart.write_rd(rd(insn), old);
    Ok(next(pc))
}

pub fn amoswap_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let new = hart.read_reg(rs2(insn)) as u32 as u64;
    amo(hart, insn, pc, Width::W, move |_old| new)
}

pub fn amoadd_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let b = hart.read_reg(rs2(insn)) as i32;
    amo(hart, insn, pc, Width::W, move |old| {
        ((old as i32).wrapping_add(b)) as u32 as u64
    })
}

/// `AMOMAX.W` — signed max (spec.md §8 scenario 5).
pub fn amomax_w(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let b = hart.read_reg(rs2(insn)) as i32;
    amo(hart, insn, pc, Width::W, move |old| {
        core::cmp::max(old as i32, b) as u32 as u64
    })
}

pub fn amoswap_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let new = hart.read_reg(rs2(insn));
    amo(hart, insn, pc, Width::D, move |_old| new)
}

pub fn amoadd_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let b = hart.read_reg(rs2(insn)) as i64;
    amo(hart, insn, pc, Width::D, move |old| {
        (old as i64).wrapping_add(b) as u64
    })
}

pub fn amomax_d(hart: &mut Hart, insn: u32, pc: u64) -> Result<u64, Trap> {
    let b = hart.read_reg(rs2(insn)) as i64;
    amo(hart, insn, pc, Width::D, move |old| {
        core::cmp::max(old as i64, b) as u64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Register;

    fn hart() -> Hart {
        Hart::new(vec![0u8; 4096], vec![0u8; 512], "RV64IMAFDC_Xtag").unwrap()
    }

    fn lr_d_insn(rd_idx: u32, rs1_idx: u32) -> u32 {
        (0b00010 << 27) | (rs1_idx << 15) | (0b011 << 12) | (rd_idx << 7) | 0b0101111
    }

    fn sc_d_insn(rd_idx: u32, rs1_idx: u32, rs2_idx: u32) -> u32 {
        (0b00011 << 27) | (rs2_idx << 20) | (rs1_idx << 15) | (0b011 << 12) | (rd_idx << 7) | 0b0101111
    }

    #[test]
    fn sc_succeeds_when_reservation_matches() {
        let mut h = hart();
        h.gpr.set(Register::X20, 0x100);
        h.gpr.set(Register::X4, 99);
        lr_d(&mut h, lr_d_insn(1, 20), h.pc).unwrap();
        assert_eq!(h.load_reservation, 0x100);
        sc_d(&mut h, sc_d_insn(3, 20, 4), h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X3), 0);
        assert_eq!(h.mem.ram.read_u64(0x100), 99);
    }

    #[test]
    fn sc_fails_without_a_prior_reservation() {
        let mut h = hart();
        h.gpr.set(Register::X20, 0x100);
        sc_d(&mut h, sc_d_insn(3, 20, 4), h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X3), 1);
    }

    #[test]
    fn amomax_w_picks_signed_max_and_clears_tag() {
        let mut h = hart();
        h.mem.tagmem.tag_write(0x100, 0xaa);
        h.mem.ram.write_u64(0x100, 3u64);
        h.gpr.set(Register::X7, 0x100);
        h.gpr.set(Register::X6, (-4i64) as u64);
        let insn: u32 = (0b10100 << 27) | (6 << 20) | (7 << 15) | (0b010 << 12) | (5 << 7) | 0b0101111;
        amomax_w(&mut h, insn, h.pc).unwrap();
        assert_eq!(h.read_reg(Register::X5), 3);
        assert_eq!(h.mem.ram.read_u64(0x100) as u32, 3);
        assert_eq!(h.mem.tagmem.tag_read(0x100), 0);
    }
}
