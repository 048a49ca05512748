//! tagrv-core
//!
//! The execution core of a single-hart RV64IMAFDC(+compressed) simulator
//! extended with a per-word memory-tag facility for dynamic memory-safety
//! policies (spec.md §1). This crate owns instruction execution, address
//! translation, the CSR file, trap delivery, and the tag-checking memory
//! model; it does not own a boot loader, a device model, or a multi-hart
//! scheduler — those are an embedding harness's responsibility (spec.md §1
//! Non-goals, §5).
//!
//! The entry point is [`Hart`]: construct one with [`Hart::new`], feed it
//! target memory and tag-memory buffers and an ISA string, then drive it
//! with [`Hart::step`].

pub mod bits;
pub mod config;
pub mod csr;
pub mod decoder;
pub mod handlers;
pub mod hart;
pub mod icache;
pub mod isa;
pub mod logger;
pub mod memory;
pub mod registers;
pub mod tagmem;
pub mod trap;
pub mod translate;

pub use csr::{Csr, CsrFile, Priv};
pub use hart::Hart;
pub use isa::{Extensions, Isa};
pub use memory::{Memory, Ram, Width};
pub use registers::{FRegister, Register};
pub use tagmem::TagMem;
pub use trap::{ConfigError, Interrupt, Trap, TrapCause};
