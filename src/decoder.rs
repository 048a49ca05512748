//! C5 — mask/match decoder
//!
//! A bucketed mask/match instruction table: descriptors are bucketed by
//! their low `match` bits, sorted, and probed linearly with a per-bucket
//! sentinel so every lookup terminates in O(bucket length), which in
//! practice is O(1) for a well-chosen bucket count.

use crate::hart::Hart;
use crate::trap::Trap;

/// Uniform handler signature for every instruction family (spec.md §4.6):
/// `(hart, insn, pc) -> next_pc`.
pub type Handler = fn(&mut Hart, u32, u64) -> Result<u64, Trap>;

/// One registered opcode. `rv32`/`rv64` may be the same function pointer;
/// they are kept distinct because some instructions (e.g. word-width
/// arithmetic immediate variants) only exist, or behave differently, in
/// one XLEN (spec.md §4.5: "returns the rv32 or rv64 handler based on
/// current xlen").
#[derive(Clone, Copy)]
pub struct Descriptor {
    pub name: &'static str,
    pub match_bits: u32,
    pub mask: u32,
    pub rv32: Handler,
    pub rv64: Handler,
}

fn illegal_instruction(_hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    Err(Trap::new(crate::trap::TrapCause::IllegalInstr))
}

const ILLEGAL: Descriptor = Descriptor {
    name: "illegal",
    match_bits: 0,
    mask: 0,
    rv32: illegal_instruction,
    rv64: illegal_instruction,
};

/// The built decoder: a bucket table plus the descriptor list it was built
/// from (spec.md §4.5 "Build"/"Layout").
pub struct Decoder {
    descriptors: Vec<Descriptor>,
    /// Index into `descriptors` of the first entry in each bucket, or
    /// `descriptors.len()` (pointing at nothing — callers fall through to
    /// the trailing sentinel) when the bucket is empty of exact matches.
    bucket_head: Vec<usize>,
    bucket_mask: u32,
}

impl Decoder {
    /// Build the table: choose `buckets` as the largest power of two such
    /// that every descriptor's mask is a superset of `buckets - 1` (spec.md
    /// §4.5 "Build"). Descriptors whose mask has bit 0 clear are rejected
    /// at registration (spec.md §4.5 "Guarantee").
    pub fn build(mut descriptors: Vec<Descriptor>) -> Decoder {
        assert!(
            descriptors.iter().all(|d| d.mask & 1 != 0),
            "every descriptor's mask must have bit 0 set"
        );

        let mut buckets: u32 = 256;
        while buckets > 1 {
            let low = buckets - 1;
            if descriptors.iter().all(|d| d.mask & low == low) {
                break;
            }
            buckets >>= 1;
        }
        let bucket_mask = buckets - 1;

        descriptors.sort_by_key(|d| (d.match_bits & bucket_mask, d.match_bits));
        descriptors.push(ILLEGAL);

        let mut bucket_head = vec![descriptors.len() - 1; buckets as usize];
        for (i, d) in descriptors.iter().enumerate() {
            let b = (d.match_bits & bucket_mask) as usize;
            if bucket_head[b] == descriptors.len() - 1 {
                bucket_head[b] = i;
            }
        }

        Decoder {
            descriptors,
            bucket_head,
            bucket_mask,
        }
    }

    /// `decode(insn) -> handler` (spec.md §4.5 "Dispatch"). `xlen` selects
    /// between a descriptor's `rv32`/`rv64` handler.
    pub fn decode(&self, insn: u32, xlen: u32) -> Handler {
        let b = (insn & self.bucket_mask) as usize;
        let mut i = self.bucket_head[b];
        while i < self.descriptors.len() - 1 {
            let d = &self.descriptors[i];
            if insn & d.mask == d.match_bits {
                return if xlen == 32 { d.rv32 } else { d.rv64 };
            }
            i += 1;
        }
        let sentinel = self.descriptors.last().unwrap();
        sentinel.rv64
    }
}

/// Enumerates RV64IMA plus `Xtag`, and a representative slice of C/F/D,
/// covering every instruction family named in spec.md §4.6.
pub fn base_descriptors() -> Vec<Descriptor> {
    use crate::handlers::{alu, atomic, branch, compressed, fp, mem_ops, system};

    vec![
        // —— Integer ALU / shifts / compare, register-register ——
        d("add", 0b0000000_00000_00000_000_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::add),
        d("sub", 0b0100000_00000_00000_000_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::sub),
        d("sll", 0b0000000_00000_00000_001_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::sll),
        d("slt", 0b0000000_00000_00000_010_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::slt),
        d("sltu", 0b0000000_00000_00000_011_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::sltu),
        d("xor", 0b0000000_00000_00000_100_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::xor),
        d("srl", 0b0000000_00000_00000_101_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::srl),
        d("sra", 0b0100000_00000_00000_101_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::sra),
        d("or", 0b0000000_00000_00000_110_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::or),
        d("and", 0b0000000_00000_00000_111_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::and),
        // —— register-immediate ——
        d("addi", 0b0000000_00000_00000_000_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::addi),
        d("slti", 0b0000000_00000_00000_010_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::slti),
        d("sltiu", 0b0000000_00000_00000_011_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::sltiu),
        d("xori", 0b0000000_00000_00000_100_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::xori),
        d("ori", 0b0000000_00000_00000_110_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::ori),
        d("andi", 0b0000000_00000_00000_111_00000_0010011, 0b0000000_00000_00000_111_00000_1111111, alu::andi),
        d("lui", 0b00000000000000000000_00000_0110111, 0b00000000000000000000_00000_1111111, alu::lui),
        d("auipc", 0b00000000000000000000_00000_0010111, 0b00000000000000000000_00000_1111111, alu::auipc),
        // —— loads / stores ——
        d("lb", 0b0000000_00000_00000_000_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lb),
        d("lh", 0b0000000_00000_00000_001_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lh),
        d("lw", 0b0000000_00000_00000_010_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lw),
        d("ld", 0b0000000_00000_00000_011_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::ld),
        d("lbu", 0b0000000_00000_00000_100_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lbu),
        d("lhu", 0b0000000_00000_00000_101_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lhu),
        d("lwu", 0b0000000_00000_00000_110_00000_0000011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::lwu),
        d("sb", 0b0000000_00000_00000_000_00000_0100011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::sb),
        d("sh", 0b0000000_00000_00000_001_00000_0100011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::sh),
        d("sw", 0b0000000_00000_00000_010_00000_0100011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::sw),
        d("sd", 0b0000000_00000_00000_011_00000_0100011, 0b0000000_00000_00000_111_00000_1111111, mem_ops::sd),
        // —— Xtag custom extension ——
        d("ldct", 0b0000100_00000_00000_011_00000_0001011, 0b1111111_00000_00000_111_00000_1111111, mem_ops::ldct),
        d("sdct", 0b0000100_00000_00000_011_00000_0101011, 0b1111111_00000_00000_111_00000_1111111, mem_ops::sdct),
        // —— M extension ——
        d("mul", 0b0000001_00000_00000_000_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::mul),
        d("mulh", 0b0000001_00000_00000_001_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::mulh),
        d("div", 0b0000001_00000_00000_100_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::div),
        d("divu", 0b0000001_00000_00000_101_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::divu),
        d("rem", 0b0000001_00000_00000_110_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::rem),
        d("remu", 0b0000001_00000_00000_111_00000_0110011, 0b1111111_00000_00000_111_00000_1111111, alu::remu),
        // —— A extension ——
        d("lr_w", 0b00010_00_00000_00000_010_00000_0101111, 0b11111_00_11111_00000_111_00000_1111111, atomic::lr_w),
        d("sc_w", 0b00011_00_00000_00000_010_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::sc_w),
        d("lr_d", 0b00010_00_00000_00000_011_00000_0101111, 0b11111_00_11111_00000_111_00000_1111111, atomic::lr_d),
        d("sc_d", 0b00011_00_00000_00000_011_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::sc_d),
        d("amoswap_w", 0b00001_00_00000_00000_010_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amoswap_w),
        d("amoadd_w", 0b00000_00_00000_00000_010_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amoadd_w),
        d("amomax_w", 0b10100_00_00000_00000_010_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amomax_w),
        d("amoswap_d", 0b00001_00_00000_00000_011_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amoswap_d),
        d("amoadd_d", 0b00000_00_00000_00000_011_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amoadd_d),
        d("amomax_d", 0b10100_00_00000_00000_011_00000_0101111, 0b11111_00_00000_00000_111_00000_1111111, atomic::amomax_d),
        // —— control transfer ——
        d("jal", 0b00000000000000000000_00000_1101111, 0b00000000000000000000_00000_1111111, branch::jal),
        d("jalr", 0b0000000_00000_00000_000_00000_1100111, 0b0000000_00000_00000_111_00000_1111111, branch::jalr),
        d("beq", 0b0000000_00000_00000_000_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::beq),
        d("bne", 0b0000000_00000_00000_001_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::bne),
        d("blt", 0b0000000_00000_00000_100_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::blt),
        d("bge", 0b0000000_00000_00000_101_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::bge),
        d("bltu", 0b0000000_00000_00000_110_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::bltu),
        d("bgeu", 0b0000000_00000_00000_111_00000_1100011, 0b0000000_00000_00000_111_00000_1111111, branch::bgeu),
        // —— system ——
        d("ecall", 0b000000000000_00000_000_00000_1110011, 0b111111111111_11111_111_11111_1111111, system::ecall),
        d("ebreak", 0b000000000001_00000_000_00000_1110011, 0b111111111111_11111_111_11111_1111111, system::ebreak),
        d("mret", 0b0011000_00010_00000_000_00000_1110011, 0b1111111_11111_11111_111_11111_1111111, system::mret),
        d("sret", 0b0001000_00010_00000_000_00000_1110011, 0b1111111_11111_11111_111_11111_1111111, system::sret),
        d("sfence_vm", 0b0001000_00100_00000_000_00000_1110011, 0b1111111_00000_11111_111_11111_1111111, system::sfence_vm),
        d("csrrw", 0b0000000_00000_00000_001_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrw),
        d("csrrs", 0b0000000_00000_00000_010_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrs),
        d("csrrc", 0b0000000_00000_00000_011_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrc),
        d("csrrwi", 0b0000000_00000_00000_101_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrwi),
        d("csrrsi", 0b0000000_00000_00000_110_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrsi),
        d("csrrci", 0b0000000_00000_00000_111_00000_1110011, 0b0000000_00000_00000_111_00000_1111111, system::csrrci),
        // —— compressed (representative subset, §4.6) ——
        d("c_addi4spn", 0b000_00000000_000_00, 0b111_00000000_000_11, compressed::c_addi4spn),
        d("c_addi", 0b000_0_00000_00000_01, 0b111_0_00000_00000_11, compressed::c_addi),
        d("c_jalr", 0b1001_00000_00000_10, 0b1111_00000_11111_11, compressed::c_jalr),
        d("c_jr", 0b1000_00000_00000_10, 0b1111_00000_11111_11, compressed::c_jr),
        d("c_mv", 0b1000_00000_00000_10, 0b1111_00000_00000_11, compressed::c_mv),
        // —— F/D (representative subset, §4.6) ——
        d("fld", 0b0000000_00000_00000_011_00000_0000111, 0b0000000_00000_00000_111_00000_1111111, fp::fld),
        d("fsd", 0b0000000_00000_00000_011_00000_0100111, 0b0000000_00000_00000_111_00000_1111111, fp::fsd),
        d("fadd_d", 0b0000001_00000_00000_000_00000_1010011, 0b1111111_00000_00000_000_00000_1111111, fp::fadd_d),
        d("fcvt_d_w", 0b1101001_00000_00000_000_00000_1010011, 0b1111111_00000_00000_000_00000_1111111, fp::fcvt_d_w),
    ]
}

fn d(name: &'static str, match_bits: u32, mask: u32, handler: Handler) -> Descriptor {
    Descriptor {
        name,
        match_bits,
        mask,
        rv32: handler,
        rv64: handler,
    }
}

pub fn build() -> Decoder {
    Decoder::build(base_descriptors())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bucket_has_a_fallthrough_to_illegal() {
        let decoder = build();
        // An all-ones word matches no registered descriptor's mask exactly.
        let h = decoder.decode(0xffff_ffff, 64);
        assert_eq!(h as usize, illegal_instruction as Handler as usize);
    }

    #[test]
    fn descriptors_all_have_bit_zero_set_in_mask() {
        for desc in base_descriptors() {
            assert_eq!(desc.mask & 1, 1, "{} has mask bit 0 clear", desc.name);
        }
    }

    #[test]
    fn add_instruction_decodes_to_the_add_handler() {
        let decoder = build();
        // add x1, x2, x3
        let insn: u32 = (0b0000000 << 25) | (3 << 20) | (2 << 15) | (0b000 << 12) | (1 << 7) | 0b0110011;
        let h = decoder.decode(insn, 64);
        assert_eq!(h as usize, crate::handlers::alu::add as Handler as usize);
    }
}
