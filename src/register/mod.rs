//! Copy Engine register definitions.
//!
//! Register layout for the CE block:
//!
//! - [`ce`]: per-engine ring/control/interrupt registers, addressed relative
//!   to the engine's control base, plus the [`ce::CeRegs`] accessor block.
//! - [`wrapper`]: the device-level CE wrapper block with the interrupt
//!   summary register shared by all engines.
//! - [`regtable`]: per-silicon register tables (base addresses, engine
//!   count).

pub mod ce;
pub mod regtable;
pub mod wrapper;
