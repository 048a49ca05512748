//! C2 — address translator + TLB
//!
//! Grounded on `examples/original_source/riscv/mmu.h`'s `tlb_lookup`/`walk`
//! plus spec.md §4.2: three parallel direct-mapped caches (fetch/load/
//! store), each 256 entries, indexed by `(vaddr >> 12) mod 256` and tagged
//! by `vaddr >> 12`. SV39 is fully walked; SV48 is accepted by the ISA
//! parser but walked as SV39 beyond 39 bits of virtual address (see
//! DESIGN.md Open Question).

use log::trace;

use crate::config::{PGSHIFT, PGSIZE, TLB_ENTRIES};
use crate::csr::{Priv, TranslationCaps};
use crate::trap::{Trap, TrapCause};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Fetch,
    Load,
    Store,
}

#[derive(Clone, Copy, Debug)]
struct TlbEntry {
    vpn_tag: u64,
    /// `host_base` here is a physical-address base: `paddr = host_base + (vaddr & (PGSIZE - 1))`.
    ppn_base: u64,
    valid: bool,
}

impl Default for TlbEntry {
    fn default() -> Self {
        TlbEntry {
            vpn_tag: 0,
            ppn_base: 0,
            valid: false,
        }
    }
}

/// A minimal page-table-entry view, enough to check permissions and the
/// referenced/dirty bits (spec.md §4.2 step 3).
#[derive(Clone, Copy, Debug)]
struct Pte {
    ppn: u64,
    valid: bool,
    readable: bool,
    writable: bool,
    executable: bool,
    user: bool,
    global: bool,
    accessed: bool,
    dirty: bool,
}

impl Pte {
    fn from_bits(bits: u64) -> Pte {
        Pte {
            valid: bits & 1 != 0,
            readable: bits & (1 << 1) != 0,
            writable: bits & (1 << 2) != 0,
            executable: bits & (1 << 3) != 0,
            user: bits & (1 << 4) != 0,
            global: bits & (1 << 5) != 0,
            accessed: bits & (1 << 6) != 0,
            dirty: bits & (1 << 7) != 0,
            ppn: bits >> 10,
        }
    }

    fn to_bits(self) -> u64 {
        let mut v = self.ppn << 10;
        if self.valid {
            v |= 1;
        }
        if self.readable {
            v |= 1 << 1;
        }
        if self.writable {
            v |= 1 << 2;
        }
        if self.executable {
            v |= 1 << 3;
        }
        if self.user {
            v |= 1 << 4;
        }
        if self.global {
            v |= 1 << 5;
        }
        if self.accessed {
            v |= 1 << 6;
        }
        if self.dirty {
            v |= 1 << 7;
        }
        v
    }

    fn is_leaf(self) -> bool {
        self.readable || self.writable || self.executable
    }
}

/// A single `(read_word, write_word)` pair into the backing physical RAM,
/// handed down by `Hart` so the walker never needs a borrow of the whole
/// memory subsystem (spec.md §9's capabilities pattern, applied again here).
pub trait PhysMem {
    fn read_u64(&self, paddr: u64) -> u64;
    fn write_u64(&mut self, paddr: u64, value: u64);
    fn memsz(&self) -> u64;
}

pub struct Translator {
    fetch_tlb: Vec<TlbEntry>,
    load_tlb: Vec<TlbEntry>,
    store_tlb: Vec<TlbEntry>,
}

impl Default for Translator {
    fn default() -> Self {
        Translator {
            fetch_tlb: vec![TlbEntry::default(); TLB_ENTRIES],
            load_tlb: vec![TlbEntry::default(); TLB_ENTRIES],
            store_tlb: vec![TlbEntry::default(); TLB_ENTRIES],
        }
    }
}

impl Translator {
    pub fn flush_tlb(&mut self) {
        for e in self.fetch_tlb.iter_mut().chain(&mut self.load_tlb).chain(&mut self.store_tlb) {
            e.valid = false;
        }
        trace!("tlb flushed");
    }

    fn tlb_for(&mut self, kind: AccessKind) -> &mut Vec<TlbEntry> {
        match kind {
            AccessKind::Fetch => &mut self.fetch_tlb,
            AccessKind::Load => &mut self.load_tlb,
            AccessKind::Store => &mut self.store_tlb,
        }
    }

    fn misaligned_cause(kind: AccessKind) -> TrapCause {
        match kind {
            AccessKind::Fetch => TrapCause::InstrAddrMisaligned,
            AccessKind::Load => TrapCause::LoadAddrMisaligned,
            AccessKind::Store => TrapCause::StoreAddrMisaligned,
        }
    }

    fn page_fault_cause(kind: AccessKind) -> TrapCause {
        match kind {
            AccessKind::Fetch => TrapCause::InstrPageFault,
            AccessKind::Load => TrapCause::LoadPageFault,
            AccessKind::Store => TrapCause::StorePageFault,
        }
    }

    /// `translate(vaddr, bytes, is_store, is_fetch) -> paddr` (spec.md §4.2).
    pub fn translate(
        &mut self,
        vaddr: u64,
        bytes: u64,
        kind: AccessKind,
        caps: TranslationCaps,
        mem: &mut dyn PhysMem,
    ) -> Result<u64, Trap> {
        if bytes > 0 && vaddr & (bytes - 1) != 0 {
            return Err(Trap::with_addr(Self::misaligned_cause(kind), vaddr));
        }

        let vpn = vaddr >> PGSHIFT;
        let idx = (vpn as usize) % TLB_ENTRIES;

        if let Some(entry) = self.tlb_for(kind).get(idx).copied() {
            if entry.valid && entry.vpn_tag == vpn {
                return Ok(entry.ppn_base + (vaddr & (PGSIZE - 1)));
            }
        }

        let effective_prv = if kind != AccessKind::Fetch && caps.mprv {
            caps.mprv_prv
        } else {
            caps.prv
        };

        // Bare mode, or M-mode without MPRV redirect: identity map.
        let bypass = caps.vm == 0 || (effective_prv == Priv::M && (kind == AccessKind::Fetch || !caps.mprv));
        let ppn = if bypass {
            if vaddr >= mem.memsz() {
                return Err(Trap::with_addr(
                    if kind == AccessKind::Fetch {
                        TrapCause::InstrAccessFault
                    } else if kind == AccessKind::Load {
                        TrapCause::LoadAccessFault
                    } else {
                        TrapCause::StoreAccessFault
                    },
                    vaddr,
                ));
            }
            vpn
        } else {
            self.walk(vaddr, kind, effective_prv, caps.sptbr, mem)?
        };

        let ppn_base = ppn << PGSHIFT;
        if let Some(slot) = self.tlb_for(kind).get_mut(idx) {
            *slot = TlbEntry {
                vpn_tag: vpn,
                ppn_base,
                valid: true,
            };
        }
        Ok(ppn_base + (vaddr & (PGSIZE - 1)))
    }

    /// SV39 3-level page-table walk (spec.md §4.2 step 3). Sets referenced
    /// (accessed) and dirty bits in the leaf PTE on success, matching the
    /// original's `walk()`.
    fn walk(
        &self,
        vaddr: u64,
        kind: AccessKind,
        prv: Priv,
        sptbr: u64,
        mem: &mut dyn PhysMem,
    ) -> Result<u64, Trap> {
        const LEVELS: u32 = 3;
        const PTESIZE: u64 = 8;
        let vpn = vaddr >> PGSHIFT;

        let mut base = sptbr & !0xfff;
        let mut pte = Pte::from_bits(0);
        let mut ppn_result = 0u64;
        let mut found = false;

        for level in (0..LEVELS).rev() {
            let shift = PGSHIFT as u64 + 9 * level as u64;
            let idx = (vpn >> shift) & 0x1ff;
            let pte_addr = base + idx * PTESIZE;
            let bits = mem.read_u64(pte_addr);
            pte = Pte::from_bits(bits);

            if !pte.valid {
                return Err(Trap::with_addr(Self::page_fault_cause(kind), vaddr));
            }
            if pte.is_leaf() {
                let leaf_shift = PGSHIFT as u64 + 9 * level as u64;
                let lower_mask = (1u64 << leaf_shift) - 1;
                ppn_result = (pte.ppn & !((1u64 << (9 * level)) - 1)) | ((vpn) & (lower_mask >> PGSHIFT));
                found = true;
                break;
            }
            base = pte.ppn << PGSHIFT;
        }

        if !found {
            return Err(Trap::with_addr(Self::page_fault_cause(kind), vaddr));
        }

        let perm_ok = match kind {
            AccessKind::Fetch => pte.executable,
            AccessKind::Load => pte.readable,
            AccessKind::Store => pte.writable,
        };
        let priv_ok = if pte.user { true } else { prv != Priv::U };
        if !perm_ok || !priv_ok {
            return Err(Trap::with_addr(Self::page_fault_cause(kind), vaddr));
        }
        if kind == AccessKind::Store && !pte.dirty {
            let mut updated = pte;
            updated.dirty = true;
            updated.accessed = true;
            let leaf_level = {
                let mut lvl = 0u32;
                for l in (0..LEVELS).rev() {
                    let shift = PGSHIFT as u64 + 9 * l as u64;
                    let idx = (vpn >> shift) & 0x1ff;
                    let addr = (sptbr & !0xfff) + idx * PTESIZE;
                    if Pte::from_bits(mem.read_u64(addr)).is_leaf() {
                        lvl = l;
                        break;
                    }
                }
                lvl
            };
            let shift = PGSHIFT as u64 + 9 * leaf_level as u64;
            let idx = (vpn >> shift) & 0x1ff;
            mem.write_u64((sptbr & !0xfff) + idx * PTESIZE, updated.to_bits());
        } else if !pte.accessed {
            let mut updated = pte;
            updated.accessed = true;
            let shift = PGSHIFT as u64;
            let idx = (vpn >> shift) & 0x1ff;
            mem.write_u64((sptbr & !0xfff) + idx * PTESIZE, updated.to_bits());
        }

        Ok(ppn_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatMem {
        words: std::collections::HashMap<u64, u64>,
        size: u64,
    }

    impl PhysMem for FlatMem {
        fn read_u64(&self, paddr: u64) -> u64 {
            *self.words.get(&paddr).unwrap_or(&0)
        }
        fn write_u64(&mut self, paddr: u64, value: u64) {
            self.words.insert(paddr, value);
        }
        fn memsz(&self) -> u64 {
            self.size
        }
    }

    fn caps_bare() -> TranslationCaps {
        TranslationCaps {
            prv: Priv::M,
            mprv: false,
            mprv_prv: Priv::M,
            vm: 0,
            sptbr: 0,
        }
    }

    #[test]
    fn bare_mode_identity_maps() {
        let mut t = Translator::default();
        let mut mem = FlatMem {
            words: Default::default(),
            size: 1 << 20,
        };
        let p = t
            .translate(0x1000, 8, AccessKind::Load, caps_bare(), &mut mem)
            .unwrap();
        assert_eq!(p, 0x1000);
    }

    #[test]
    fn misaligned_access_traps() {
        let mut t = Translator::default();
        let mut mem = FlatMem {
            words: Default::default(),
            size: 1 << 20,
        };
        let err = t
            .translate(0x1001, 8, AccessKind::Load, caps_bare(), &mut mem)
            .unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadAddrMisaligned);
    }

    #[test]
    fn bare_mode_out_of_range_is_access_fault() {
        let mut t = Translator::default();
        let mut mem = FlatMem {
            words: Default::default(),
            size: 0x1000,
        };
        let err = t
            .translate(0x10000, 8, AccessKind::Load, caps_bare(), &mut mem)
            .unwrap_err();
        assert_eq!(err.cause, TrapCause::LoadAccessFault);
    }

    #[test]
    fn flush_invalidates_every_cache() {
        let mut t = Translator::default();
        let mut mem = FlatMem {
            words: Default::default(),
            size: 1 << 20,
        };
        t.translate(0x2000, 8, AccessKind::Load, caps_bare(), &mut mem)
            .unwrap();
        t.flush_tlb();
        assert!(t.load_tlb.iter().all(|e| !e.valid));
    }
}
