//! C3 — data MMU
//!
//! Grounded on spec.md §4.3 and the original's `mmu_t::load`/`store`
//! template family in `examples/original_source/riscv/mmu.h`. Width is
//! monomorphised over a small closed set (8/16/32/64) via the `Width` enum
//! rather than const generics.

use crate::csr::TranslationCaps;
use crate::config::{CSR_LD_TAG_ADDR, CSR_SD_TAG_ADDR};
use crate::tagmem::TagMem;
use crate::translate::{AccessKind, PhysMem, Translator};
use crate::trap::{Trap, TrapCause};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    B = 1,
    H = 2,
    W = 4,
    D = 8,
}

impl Width {
    pub fn bytes(self) -> u64 {
        self as u64
    }
}

/// The physical RAM backing, a plain growable byte buffer (spec.md §3:
/// "contiguous byte array of size `memsz`").
pub struct Ram {
    bytes: Vec<u8>,
}

impl Ram {
    pub fn new(memsz: u64) -> Ram {
        Ram {
            bytes: vec![0u8; memsz as usize],
        }
    }

    /// Take ownership of a harness-supplied RAM buffer (spec.md §6).
    pub fn from_bytes(bytes: Vec<u8>) -> Ram {
        Ram { bytes }
    }
}

impl PhysMem for Ram {
    fn read_u64(&self, paddr: u64) -> u64 {
        let i = paddr as usize;
        if i + 8 > self.bytes.len() {
            return 0;
        }
        u64::from_le_bytes(self.bytes[i..i + 8].try_into().unwrap())
    }

    fn write_u64(&mut self, paddr: u64, value: u64) {
        let i = paddr as usize;
        if i + 8 > self.bytes.len() {
            return;
        }
        self.bytes[i..i + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn memsz(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl Ram {
    fn read(&self, paddr: u64, width: Width) -> u64 {
        let i = paddr as usize;
        let n = width.bytes() as usize;
        if i + n > self.bytes.len() {
            return 0;
        }
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&self.bytes[i..i + n]);
        u64::from_le_bytes(buf)
    }

    fn write(&mut self, paddr: u64, width: Width, value: u64) {
        let i = paddr as usize;
        let n = width.bytes() as usize;
        if i + n > self.bytes.len() {
            return;
        }
        let buf = value.to_le_bytes();
        self.bytes[i..i + n].copy_from_slice(&buf[..n]);
    }
}

/// Owns RAM, tag RAM, and the translator, and implements the tag-checked
/// load/store datapath (spec.md §4.3).
pub struct Memory {
    pub ram: Ram,
    pub tagmem: TagMem,
    pub translator: Translator,
    /// `true` selects the CSR-masked tag policy whenever the relevant CSR
    /// is non-default; this simulator always runs the CSR-gated form and
    /// recovers the legacy policy by priming the CSRs (spec.md §9), so this
    /// flag only exists to let tests exercise the raw legacy bit check.
    pub legacy_policy: bool,
}

impl Memory {
    pub fn new(memsz: u64, tagmem: TagMem) -> Memory {
        Memory {
            ram: Ram::new(memsz),
            tagmem,
            translator: Translator::default(),
            legacy_policy: false,
        }
    }

    pub fn from_buffers(mem: Vec<u8>, tagmem: TagMem) -> Memory {
        Memory {
            ram: Ram::from_bytes(mem),
            tagmem,
            translator: Translator::default(),
            legacy_policy: false,
        }
    }

    fn load_tag_check(&self, mem_tag: u8, vaddr: u64, csr_ld_tag: u64) -> Result<(), Trap> {
        let trapped = if self.legacy_policy {
            mem_tag & 0b10 != 0
        } else {
            (csr_ld_tag >> mem_tag) & 1 != 0
        };
        if trapped {
            Err(Trap::with_addr(TrapCause::TagLoad, vaddr))
        } else {
            Ok(())
        }
    }

    fn store_tag_check(&self, mem_tag: u8, vaddr: u64, csr_sd_tag: u64) -> Result<(), Trap> {
        let trapped = if self.legacy_policy {
            mem_tag & 0b01 != 0
        } else {
            (csr_sd_tag >> mem_tag) & 1 != 0
        };
        if trapped {
            Err(Trap::with_addr(TrapCause::TagStore, vaddr))
        } else {
            Ok(())
        }
    }

    /// `load_uintW`/`load_intW` (spec.md §4.3): tag-check then load.
    /// `sign_extend` selects the `intW` vs `uintW` family.
    pub fn load(
        &mut self,
        vaddr: u64,
        width: Width,
        sign_extend: bool,
        caps: TranslationCaps,
        csr_ld_tag: u64,
    ) -> Result<u64, Trap> {
        let paddr = self
            .translator
            .translate(vaddr, width.bytes(), AccessKind::Load, caps, &mut self.ram)?;
        let mem_tag = self.tagmem.tag_read(paddr);
        self.load_tag_check(mem_tag, vaddr, csr_ld_tag)?;
        let raw = self.ram.read(paddr, width);
        Ok(if sign_extend {
            sign_extend_to_64(raw, width)
        } else {
            raw
        })
    }

    /// `store_uintW` (spec.md §4.3): tag-check, store, then clear the
    /// enclosing word's tag for a sub-word/plain store.
    pub fn store(
        &mut self,
        vaddr: u64,
        width: Width,
        value: u64,
        caps: TranslationCaps,
        csr_sd_tag: u64,
    ) -> Result<(), Trap> {
        let paddr = self
            .translator
            .translate(vaddr, width.bytes(), AccessKind::Store, caps, &mut self.ram)?;
        let mem_tag = self.tagmem.tag_read(paddr);
        self.store_tag_check(mem_tag, vaddr, csr_sd_tag)?;
        self.ram.write(paddr, width, value);
        self.tagmem.clear(paddr);
        Ok(())
    }

    /// `LDCT`: 64-bit tagged load — destination value plus the memory tag
    /// (spec.md §4.6, §6).
    pub fn load_tagged(
        &mut self,
        vaddr: u64,
        caps: TranslationCaps,
        csr_ld_tag: u64,
    ) -> Result<(u64, u8), Trap> {
        let paddr = self
            .translator
            .translate(vaddr, 8, AccessKind::Load, caps, &mut self.ram)?;
        let mem_tag = self.tagmem.tag_read(paddr);
        self.load_tag_check(mem_tag, vaddr, csr_ld_tag)?;
        Ok((self.ram.read(paddr, Width::D), mem_tag))
    }

    /// `SDCT`: 64-bit tagged store — value plus the register tag written
    /// into memory (spec.md §4.6, §6).
    pub fn store_tagged(
        &mut self,
        vaddr: u64,
        value: u64,
        reg_tag: u8,
        caps: TranslationCaps,
        csr_sd_tag: u64,
    ) -> Result<(), Trap> {
        let paddr = self
            .translator
            .translate(vaddr, 8, AccessKind::Store, caps, &mut self.ram)?;
        let mem_tag = self.tagmem.tag_read(paddr);
        self.store_tag_check(mem_tag, vaddr, csr_sd_tag)?;
        self.ram.write(paddr, Width::D, value);
        self.tagmem.tag_write(paddr, reg_tag);
        Ok(())
    }

    /// Read-modify-write for an AMO/LR/SC word or doubleword, following the
    /// ordering in spec.md §4.3: "tag-read -> policy-check -> value-load ->
    /// value-store -> tag-write". `op` computes the new value from the old;
    /// the aligned word's tag is cleared unless `write_reg_tag` overrides it
    /// (the tagged-swap case, not currently exposed by any handler).
    pub fn amo<F: FnOnce(u64) -> u64>(
        &mut self,
        vaddr: u64,
        width: Width,
        caps: TranslationCaps,
        csr_ld_tag: u64,
        csr_sd_tag: u64,
        op: F,
    ) -> Result<u64, Trap> {
        let paddr = self
            .translator
            .translate(vaddr, width.bytes(), AccessKind::Store, caps, &mut self.ram)?;
        let aligned = paddr & !7;
        let mem_tag = self.tagmem.tag_read(aligned);
        self.load_tag_check(mem_tag, vaddr, csr_ld_tag)?;
        self.store_tag_check(mem_tag, vaddr, csr_sd_tag)?;
        let old = sign_extend_to_64(self.ram.read(paddr, width), width);
        let new = op(old);
        self.ram.write(paddr, width, new);
        self.tagmem.clear(aligned);
        Ok(old)
    }
}

fn sign_extend_to_64(raw: u64, width: Width) -> u64 {
    match width {
        Width::B => raw as i8 as i64 as u64,
        Width::H => raw as i16 as i64 as u64,
        Width::W => raw as i32 as i64 as u64,
        Width::D => raw,
    }
}

/// Implementation-defined CSR addresses, re-exported for handlers that
/// decode `CSRRW`-family instructions against the tag-policy CSRs directly
/// by address rather than by the `Csr` enum (spec.md §6).
pub const TAG_LD_ADDR: u16 = CSR_LD_TAG_ADDR;
pub const TAG_SD_ADDR: u16 = CSR_SD_TAG_ADDR;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::Priv;

    fn caps() -> TranslationCaps {
        TranslationCaps {
            prv: Priv::M,
            mprv: false,
            mprv_prv: Priv::M,
            vm: 0,
            sptbr: 0,
        }
    }

    #[test]
    fn store_then_load_round_trips_and_clears_tag() {
        let mut mem = Memory::new(4096, TagMem::new(4096).unwrap());
        mem.tagmem.tag_write(0, 0xaa);
        mem.store(0, Width::D, 7, caps(), 0).unwrap();
        assert_eq!(mem.tagmem.tag_read(0), 0);
        let v = mem.load(0, Width::D, false, caps(), 0).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn tagged_round_trip_preserves_register_tag() {
        let mut mem = Memory::new(4096, TagMem::new(4096).unwrap());
        mem.store_tagged(16, 42, 3, caps(), 0).unwrap();
        let (v, tag) = mem.load_tagged(16, caps(), 0).unwrap();
        assert_eq!(v, 42);
        assert_eq!(tag, 3);
        assert_eq!(mem.tagmem.tag_read(16), 3);
    }

    #[test]
    fn load_tag_check_traps_when_mask_bit_set() {
        let mut mem = Memory::new(4096, TagMem::new(4096).unwrap());
        mem.store_tagged(16, 42, 3, caps(), 0).unwrap();
        let err = mem.load_tagged(16, caps(), 1 << 3).unwrap_err();
        assert_eq!(err.cause, TrapCause::TagLoad);
        assert_eq!(err.badaddr, Some(16));
    }

    #[test]
    fn sign_extension_on_byte_load() {
        let mut mem = Memory::new(4096, TagMem::new(4096).unwrap());
        mem.store(0, Width::B, 0xff, caps(), 0).unwrap();
        let v = mem.load(0, Width::B, true, caps(), 0).unwrap();
        assert_eq!(v, 0xffff_ffff_ffff_ffffu64);
    }

    #[test]
    fn amo_max_signed_picks_larger_and_clears_tag() {
        let mut mem = Memory::new(4096, TagMem::new(4096).unwrap());
        mem.tagmem.tag_write(0, 0xaa);
        mem.store(0, Width::W, 3u64, caps(), 0).unwrap();
        let old = mem
            .amo(0, Width::W, caps(), 0, 0, |old| {
                let old = old as i32;
                core::cmp::max(old, -4) as u32 as u64
            })
            .unwrap();
        assert_eq!(old, 3);
        let new = mem.load(0, Width::W, false, caps(), 0).unwrap();
        assert_eq!(new, 3);
        assert_eq!(mem.tagmem.tag_read(0), 0);
    }
}
