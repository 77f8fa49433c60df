//! Driver for the DW-GDMA scatter-gather DMA engine.
//!
//! # Architecture
//!
//! ```text
//! Allocator ── process-wide group table (critical section)
//!    │  acquire_group / register_channel
//!    ▼
//! Channel ─── one lane, exclusively owned; transfer mode tag from its ends
//!    │  use_link_list
//!    ▼
//! LinkList ── caller-provided descriptor storage, edited via the
//!             non-cacheable alias
//! ```
//!
//! All storage is caller-provided; the crate never allocates.
//!
//! # Example
//!
//! ```no_run
//! use gdma::{Allocator, Channel, ChannelConfig, LinkList, LinkListItem, LinkType};
//! use platform::{BlockType, EndpointConfig, PeripheralId};
//!
//! fn capture<P: platform::DmaPlatform>(
//!     alloc: &Allocator<P>,
//!     storage: &mut [LinkListItem],
//! ) -> gdma::Result<()> {
//!     let config = ChannelConfig::new(
//!         EndpointConfig::peripheral(PeripheralId(0), BlockType::Contiguous),
//!         EndpointConfig::memory(BlockType::LinkList),
//!     );
//!     let mut channel = Channel::new(alloc, config)?;
//!     let list = LinkList::new(alloc.platform(), storage, LinkType::Circular)?;
//!     channel.use_link_list(&list)?;
//!     channel.enable(true);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt, derive `defmt::Format`
//! - `tracing`: log through tracing (host builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)] // usize addresses into 64-bit descriptor fields

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod allocator;
pub mod channel;
pub mod config;
pub mod error;
pub mod link_list;
pub mod transfer;

pub use allocator::{Allocator, ChannelSlot, GroupRef, PeripheralClaim};
pub use channel::{BreakEvent, Channel, ChannelConfig, ChannelHandler};
pub use error::{Error, ErrorKind, Result};
pub use link_list::{items_for, LinkList, LinkListItem, LinkType, LliHandle, LliStatus};
pub use transfer::{BlockMarkers, Control, EndpointTransfer, TransferConfig};
