//! Configuration constants
//!
//! This crate is a hosted library with no build-time configuration surface
//! of its own: the constants below are the simulator's fixed parameters,
//! set once here rather than threaded through environment variables that a
//! harness has no reason to set (spec.md §1).

/// PC at reset, and base of the trap vector table: traps land at
/// `DEFAULT_MTVEC + 0x40 * priv`.
pub const DEFAULT_MTVEC: u64 = 0x1000;

/// Offset from `DEFAULT_MTVEC` of the reset PC.
pub const RESET_PC_OFFSET: u64 = 0x100;

/// Page size / translation granule.
pub const PGSHIFT: u32 = 12;
pub const PGSIZE: u64 = 1 << PGSHIFT;

/// Number of direct-mapped entries in each of the fetch/load/store TLBs.
pub const TLB_ENTRIES: usize = 256;

/// Number of direct-mapped entries in the decoded-instruction cache.
pub const ICACHE_ENTRIES: usize = 1024;

/// Implementation-defined CSR addresses for the tag-policy masks.
///
/// Chosen in the custom ("Xtag") CSR address range so they never alias a
/// standard RISC-V CSR.
pub const CSR_LD_TAG_ADDR: u16 = 0x800;
pub const CSR_SD_TAG_ADDR: u16 = 0x801;

/// Implementation-defined trap cause numbers for the two tag traps, chosen
/// from the reserved-for-custom-use range of the standard cause encoding.
pub const CAUSE_TAG_LOAD: u64 = 24;
pub const CAUSE_TAG_STORE: u64 = 25;

/// Legacy (CSR-less) tag-policy bit positions, see spec.md §3 and §9: the
/// CSR-gated policy is the superset, the legacy direct bitmask policy is
/// recovered by priming `CSR_LD_TAG = 1 << 1` and `CSR_SD_TAG = 1 << 0` at
/// reset (see `Hart::reset`).
pub const TAG_BIT_STORE_TRAP: u8 = 0;
pub const TAG_BIT_LOAD_TRAP: u8 = 1;
