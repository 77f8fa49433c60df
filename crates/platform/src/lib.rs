//! Platform contracts for the DW-GDMA driver stack.
//!
//! This crate defines the collaborator traits the DMA driver and the
//! streaming controllers are written against, so the whole stack can be
//! exercised on a host without hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Camera / display front-ends
//!         ↓
//! stream  (capture / refresh controllers, transaction handoff)
//!         ↓
//! gdma    (allocator, channels, descriptor chains)
//!         ↓
//! platform (this crate - collaborator traits)
//!         ↓
//! SoC registers, cache controller, interrupt matrix
//! ```
//!
//! # Collaborators
//!
//! - [`AddressMap`] - cached / non-cached aliasing
//! - [`CacheSync`] - write-back and invalidate
//! - [`ClockControl`] - group bus clocks and bridge source clocks
//! - [`MemoryRegions`] - ISR-safe and DMA-capable region queries
//! - [`InterruptController`] - per-group interrupt vectors
//! - [`GdmaRegisters`] - channel register access
//! - [`Bridge`] - camera / display bridge FIFO
//!
//! [`DmaPlatform`] bundles the first six for the driver.
//!
//! # Features
//!
//! - `std`: build [`mocks`] for downstream tests
//! - `defmt`: derive `defmt::Format` on all types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod address;
pub mod bridge;
pub mod cache;
pub mod gdma;
pub mod ids;
pub mod mocks;
pub mod system;

pub use address::{AddressMap, CachedAddr, UncachedAddr};
pub use bridge::{Bridge, BridgeTransfer};
pub use cache::{CacheError, CacheSync, SyncDirection, SyncFlags};
pub use gdma::{
    BlockProgram, BlockType, BurstItems, BurstMode, ChannelEvents, ChannelSetup, EndpointConfig,
    FlowController, GdmaRegisters, Handshake, LockLevel, Role, TransferWidth,
};
pub use ids::{ChannelAddr, ChannelId, ClockId, GroupId, PeripheralId};
pub use system::{ClockControl, InterruptController, InterruptError, MemoryRegions};

/// Everything the DMA driver needs from the SoC.
///
/// Implemented automatically for any type that provides all collaborator
/// traits. `Sync` because one platform instance is shared between task
/// code and every group's interrupt handler.
pub trait DmaPlatform:
    AddressMap + CacheSync + ClockControl + MemoryRegions + InterruptController + GdmaRegisters + Sync
{
}

impl<T> DmaPlatform for T where
    T: AddressMap
        + CacheSync
        + ClockControl
        + MemoryRegions
        + InterruptController
        + GdmaRegisters
        + Sync
{
}
