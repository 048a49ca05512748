//! C8 (trap engine) + C9 (step loop), and the `Hart` struct that ties every
//! other component together.
//!
//! Grounded on `examples/original_source/riscv/processor.cc`'s
//! `processor_t::step`/`take_trap`/`take_interrupt`/`reset`: one struct
//! holds every piece of per-hart state, and the driving loop is a plain
//! method on it rather than a free function threading everything through
//! arguments.

use log::{debug, trace};

use crate::config::{DEFAULT_MTVEC, RESET_PC_OFFSET, TAG_BIT_LOAD_TRAP, TAG_BIT_STORE_TRAP};
use crate::csr::{Csr, CsrFile, Priv};
use crate::decoder::{self, Decoder};
use crate::icache::Icache;
use crate::isa::{Extensions, Isa};
use crate::memory::Memory;
use crate::registers::{FprFile, GprFile, Register};
use crate::tagmem::TagMem;
use crate::trap::{ConfigError, Interrupt, Trap, TrapCause};
use crate::translate::PhysMem;

/// Sentinel next-PC returned by handlers that changed CSR state the step
/// loop must resynchronize on (XLEN flip, VM change) before continuing the
/// inlined fetch loop (spec.md §4.6 point 5, §4.9 point 4).
pub const PC_SERIALIZE: u64 = u64::MAX;

/// `load_reservation`'s "none" sentinel (spec.md §3): all-ones.
pub const NO_RESERVATION: u64 = u64::MAX;

pub struct Hart {
    pub gpr: GprFile,
    pub fpr: FprFile,
    pub pc: u64,
    pub csr: CsrFile,
    pub mem: Memory,
    pub icache: Icache,
    pub decoder: Decoder,
    pub load_reservation: u64,
    pub xlen: u32,
    pub extensions: Extensions,
    /// Last-written register address+data, for harness commit logging
    /// (spec.md §3 `log_reg_write`).
    pub log_reg_write: Option<(Register, u64)>,
    /// Harness-driven real-time counter, advanced by `tick_rtc` and
    /// compared against `stimecmp` in `check_timer` (spec.md §4.9 point 1).
    rtc: u64,
    pub serialized: bool,
    pub debug: bool,
}

fn illegal_instruction(_hart: &mut Hart, _insn: u32, _pc: u64) -> Result<u64, Trap> {
    Err(Trap::new(TrapCause::IllegalInstr))
}

impl Hart {
    /// Takes ownership of harness-supplied RAM and tag-RAM buffers and an
    /// ISA string (spec.md §6 "Constructor input"). Unlike the original's
    /// `bad_isa_string`, which calls `abort()`, this returns a typed error
    /// (spec.md §7 supplement, see DESIGN.md).
    pub fn new(mem: Vec<u8>, tagmem: Vec<u8>, isa: &str) -> Result<Hart, ConfigError> {
        let memsz = mem.len() as u64;
        let tagmem = TagMem::from_bytes(tagmem, memsz)?;
        let isa = Isa::parse(isa)?;

        let mut hart = Hart {
            gpr: GprFile::default(),
            fpr: FprFile::default(),
            pc: 0,
            csr: CsrFile::new(0),
            mem: Memory::from_buffers(mem, tagmem),
            icache: Icache::new(illegal_instruction),
            decoder: decoder::build(),
            load_reservation: NO_RESERVATION,
            xlen: isa.xlen,
            extensions: isa.extensions,
            log_reg_write: None,
            rtc: 0,
            serialized: false,
            debug: false,
        };
        hart.reset(true);
        Ok(hart)
    }

    /// `state_t::reset()` (spec.md §3 "Lifecycles", grounded on
    /// `processor.cc`): zero architectural state, `pc = DEFAULT_MTVEC +
    /// 0x100`, `priv = M`, `load_reservation = none`. `hard` additionally
    /// flushes the icache and TLBs, matching a cold power-on reset; a soft
    /// reset (`hard == false`) is reserved for a future debug-halt feature
    /// and currently behaves identically.
    pub fn reset(&mut self, hard: bool) {
        self.gpr = GprFile::default();
        self.fpr = FprFile::default();
        self.pc = DEFAULT_MTVEC + RESET_PC_OFFSET;
        self.csr = CsrFile::new(0);
        self.load_reservation = NO_RESERVATION;
        // Prime the legacy bitmask tag policy by default (spec.md §9):
        // `CSR_LD_TAG = 1 << LOAD_TRAP_BIT`, `CSR_SD_TAG = 1 << STORE_TRAP_BIT`.
        self.csr.csr_ld_tag = 1 << TAG_BIT_LOAD_TRAP;
        self.csr.csr_sd_tag = 1 << TAG_BIT_STORE_TRAP;
        if hard {
            self.icache.flush();
            self.mem.translator.flush_tlb();
        }
    }

    pub fn tick_rtc(&mut self, delta: u64) {
        self.rtc = self.rtc.wrapping_add(delta);
    }

    fn translation_caps(&self) -> crate::csr::TranslationCaps {
        self.csr.translation_caps(self.csr.mstatus.prv1)
    }

    // ———————————————————————————— C8: trap engine ———————————————————————————— //

    /// Deliver `trap` (spec.md §4.8): redirect `pc`, push the privilege
    /// stack, clear the LR/SC reservation, set `mcause`/`mepc`, and set
    /// `mbadaddr` if the trap carries a faulting address.
    fn take_trap(&mut self, trap: Trap, faulting_pc: u64) {
        debug!("trap: {} at pc=0x{:x}", trap, faulting_pc);
        let prv_before = self.csr.mstatus.prv;
        self.csr.push_privilege_stack();
        self.load_reservation = NO_RESERVATION;
        self.csr.mcause = trap.cause.code(self.xlen);
        self.csr.mepc = faulting_pc;
        if let Some(addr) = trap.badaddr {
            self.csr.mbadaddr = addr;
        }
        self.pc = DEFAULT_MTVEC + 0x40 * (prv_before as u64);
    }

    /// `take_interrupt()` (spec.md §4.9 point 2): priority order M-soft,
    /// host, S-soft, S-timer (spec.md §3 supplement via
    /// `examples/original_source/riscv/processor.cc`).
    fn take_interrupt(&mut self) -> Option<Trap> {
        if !self.csr.mstatus.ie {
            return None;
        }
        let pending = self.csr.mip & self.csr.mie;
        const MIP_MSIP: u64 = 1 << 3;
        const MIP_HOST: u64 = 1 << 13;
        const MIP_SSIP: u64 = 1 << 1;
        const MIP_STIP: u64 = 1 << 5;

        let cause = if pending & MIP_MSIP != 0 {
            Interrupt::MachineSoft
        } else if pending & MIP_HOST != 0 {
            Interrupt::Host
        } else if pending & MIP_SSIP != 0 {
            Interrupt::SupervisorSoft
        } else if pending & MIP_STIP != 0 {
            Interrupt::SupervisorTimer
        } else {
            return None;
        };
        Some(Trap::new(TrapCause::Interrupt(cause)))
    }

    /// `check_timer()` (spec.md §4.9 point 1): if the RTC crossed
    /// `stimecmp`, assert `MIP_STIP`.
    fn check_timer(&mut self) {
        if self.rtc >= self.csr.stimecmp {
            self.csr.mip |= 1 << 5;
        }
    }

    // ————————————————————————————— C9: step loop ————————————————————————————— //

    /// `step(n)` (spec.md §4.9): retire up to `n` instructions, tail-calling
    /// itself after a trap so pending interrupts get a fresh chance, as the
    /// spec requires.
    pub fn step(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.check_timer();
        if let Some(trap) = self.take_interrupt() {
            let pc = self.pc;
            self.take_trap(trap, pc);
            return self.step(n);
        }

        let mut retired = 0u64;
        while retired < n {
            let pc = self.pc;
            let caps = self.translation_caps();
            let fetch = self.icache.fetch(
                pc,
                &mut self.mem,
                &self.decoder,
                caps,
                self.csr.csr_ld_tag,
                self.xlen,
            );
            let (handler, insn, len) = match fetch {
                Ok(v) => v,
                Err(trap) => {
                    self.take_trap(trap, pc);
                    break;
                }
            };

            if self.debug {
                trace!("pc=0x{:x} insn=0x{:08x}", pc, insn);
            }

            match handler(self, insn, pc) {
                Ok(PC_SERIALIZE) => {
                    self.serialized = true;
                    retired += 1;
                    break;
                }
                Ok(next_pc) => {
                    self.pc = next_pc;
                    retired += 1;
                    let _ = len;
                }
                Err(trap) => {
                    self.take_trap(trap, pc);
                    break;
                }
            }
        }

        self.csr.minstret = self.csr.minstret.wrapping_add(retired);
        if retired < n {
            return self.step(n - retired);
        }
    }

    // ————————————————————————————— register helpers ————————————————————————————— //

    pub fn read_reg(&self, reg: Register) -> u64 {
        self.gpr.get(reg)
    }

    pub fn read_reg_tag(&self, reg: Register) -> u8 {
        self.gpr.get_tag(reg)
    }

    /// `WRITE_RD(v)` (spec.md §4.6 point 4): writes the value and clears
    /// the destination tag.
    pub fn write_rd(&mut self, reg: Register, value: u64) {
        self.gpr.set(reg, value);
        self.log_reg_write = Some((reg, value));
    }

    /// `WRITE_REG(rd, v, tag)` (spec.md §4.6 point 4): writes value and tag
    /// together, for `LDCT` and tag-preserving atomics.
    pub fn write_reg_tagged(&mut self, reg: Register, value: u64, tag: u8) {
        self.gpr.set_tagged(reg, value, tag);
        self.log_reg_write = Some((reg, value));
    }

    pub fn get_csr(&self, csr: Csr) -> Result<u64, Trap> {
        self.csr.get(csr, self.rtc)
    }

    /// Sets the CSR and, if the write invoked `flush_tlb()`, also flushes
    /// the icache (spec.md §4.2 step 4: translation-affecting writes
    /// invalidate cached mappings, which includes fetch).
    pub fn set_csr(&mut self, csr: Csr, value: u64) -> Result<(), Trap> {
        let flushed = self.csr.set(csr, value)?;
        if flushed {
            self.mem.translator.flush_tlb();
            self.icache.flush();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_hart() -> Hart {
        Hart::new(vec![0u8; 1 << 16], vec![0u8; (1 << 16) / 8], "RV64IMAFDC_Xtag").unwrap()
    }

    #[test]
    fn reset_sets_pc_and_privilege() {
        let hart = new_hart();
        assert_eq!(hart.pc, DEFAULT_MTVEC + RESET_PC_OFFSET);
        assert_eq!(hart.csr.mstatus.prv, Priv::M);
        assert_eq!(hart.load_reservation, NO_RESERVATION);
    }

    #[test]
    fn x0_stays_zero_after_a_write_attempt() {
        let mut hart = new_hart();
        hart.write_rd(Register::X0, 123);
        assert_eq!(hart.read_reg(Register::X0), 0);
        assert_eq!(hart.read_reg_tag(Register::X0), 0);
    }

    #[test]
    fn scenario_sd_then_ld_round_trips_and_clears_tag() {
        let mut hart = new_hart();
        hart.mem.tagmem.tag_write(0, 0xaa);
        // addi x5, x0, 7
        let addi: u32 = (7 << 20) | (0 << 15) | (0b000 << 12) | (5 << 7) | 0b0010011;
        // sd x5, 0(x0)
        let sd: u32 = (0 << 25) | (5 << 20) | (0 << 15) | (0b011 << 12) | (0 << 7) | 0b0100011;
        // ld x6, 0(x0)
        let ld: u32 = (0 << 20) | (0 << 15) | (0b011 << 12) | (6 << 7) | 0b0000011;
        hart.mem.ram.write_u64(hart.pc, addi as u64);
        hart.mem.ram.write_u64(hart.pc + 4, sd as u64);
        hart.mem.ram.write_u64(hart.pc + 8, ld as u64);
        hart.step(3);
        assert_eq!(hart.read_reg(Register::X6), 7);
        assert_eq!(hart.mem.tagmem.tag_read(0), 0);
    }

    #[test]
    fn scenario_jal_writes_link_register_with_zero_tag() {
        let mut hart = new_hart();
        let base_pc = hart.pc;
        // jal x1, +8 — imm[10:1] = 8>>1 = 4, placed at bits[30:21]
        let jal: u32 = (1 << 7) | 0b1101111 | (4 << 21);
        hart.mem.ram.write_u64(base_pc, jal as u64);
        hart.step(1);
        assert_eq!(hart.pc, base_pc + 8);
        assert_eq!(hart.read_reg(Register::X1), base_pc + 4);
        assert_eq!(hart.read_reg_tag(Register::X1), 0);
    }
}
