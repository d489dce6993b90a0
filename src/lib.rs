//! QCA988x Copy Engine Driver
//!
//! A `no_std` Rust implementation of the host side of the QCA988x-family
//! Copy Engine (CE): the DMA transport that moves buffers between the host
//! CPU and the wireless target over a memory-mapped interconnect. The CE is
//! the layer everything else in an ath10k-class driver is built on - the
//! message transport, firmware download, and diagnostic access are all
//! callers of this API.
//!
//! # Architecture
//!
//! One engine is a pair of descriptor rings in DMA-coherent host memory:
//!
//! - The **source ring** carries host-produced descriptors of buffers to
//!   send; the target consumes them and advances its MMIO read index.
//! - The **destination ring** carries empty buffers the target may fill;
//!   the target writes the received length into each descriptor.
//!
//! Up to eight engines share one device, one interrupt, and one lock. The
//! driver is organized into three layers:
//!
//! 1. **Driver** ([`driver::device`]): per-device facade with the engine
//!    registry, queueing/harvest operations, and interrupt service
//! 2. **Rings** (`internal`): the ring-cursor state machines and the
//!    8-byte descriptor wire format
//! 3. **HAL** ([`hal`]): platform contracts for MMIO access and
//!    DMA-coherent allocation
//!
//! # Platform contracts
//!
//! The crate owns no hardware. The embedding driver supplies a
//! [`TargetBus`] (register access plus target wake bracketing, provided by
//! the PCI layer) and a [`CoherentDma`] allocator. Both are ordinary traits
//! and both are mocked for host tests.
//!
//! # Features
//!
//! - `log`: warnings on oversized sends and latched engine errors
//! - `defmt`: `defmt::Format` derives on public types
//!
//! # Example
//!
//! ```ignore
//! use ph_qca988x_ce::{CeDevice, EngineConfig, TransferToken, regtable};
//!
//! let ce = CeDevice::new(bus, dma, &regtable::QCA988X);
//!
//! // Engine 1: host-to-target messages.
//! let htc_tx = ce.engine_init(1, &EngineConfig::new().with_src_ring(16, 2048))?;
//!
//! ce.send(htc_tx, TransferToken(0), msg_bus_addr, msg_len, 0, 0)?;
//!
//! // From the shared interrupt handler:
//! ce.per_engine_service_any();
//! ```

#![no_std]

extern crate alloc;

// =============================================================================
// Modules
// =============================================================================

pub mod driver;
pub mod hal;

// Internal implementation details (pub(crate) only)
mod internal;

pub mod register;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use driver::config::{
    ATTR_BYTE_SWAP_DATA, ATTR_DIS_INTR, ATTR_NO_SNOOP, ATTR_SWIZZLE_DESCRIPTORS, EngineConfig,
    EngineState, SEND_FLAG_BYTE_SWAP, SEND_FLAG_GATHER,
};
pub use driver::device::{
    CE_COUNT_MAX, CeDevice, EngineId, RecvCallback, SendCallback,
};
pub use driver::error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result,
};
pub use driver::interrupt::{EngineIntStatus, MiscIntStatus};
pub use driver::sendlist::{SENDLIST_ITEMS_MAX, SendList};
pub use driver::transfer::{RecvCompletion, SendCompletion, TransferContext, TransferToken};
pub use hal::{CoherentBuffer, CoherentDma, TargetBus};
pub use register::regtable;
