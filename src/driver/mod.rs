//! Copy Engine driver: the public API surface.
//!
//! - [`device`]: the [`CeDevice`](device::CeDevice) facade - lifecycle,
//!   send/receive queueing, completion harvesting, interrupt service
//! - [`config`]: engine attributes and flag constants
//! - [`transfer`]: per-transfer handles and completion records
//! - [`sendlist`]: staging buffer for gathered sends
//! - [`interrupt`]: parsed interrupt status views
//! - [`error`]: domain-split error types

pub mod config;
pub mod device;
pub mod error;
pub mod interrupt;
pub mod sendlist;
pub mod transfer;
