//! Camera capture and display refresh streams over DW-GDMA.
//!
//! A [`StreamController`] ties one bridge peripheral (camera receiver or
//! display interface) to one DMA channel and keeps exactly one frame in
//! flight. At every frame boundary the interrupt handler swaps in the
//! next client buffer, falling back to an internal buffer when the client
//! has none ready, so the bridge never overflows (capture) or starves
//! (refresh).
//!
//! ```text
//!  client ──submit / on_get_new_trans──► controller ──arm──► channel ◄─► bridge
//!     ▲                                      │
//!     └──────────── on_trans_finished ◄──────┘  (transfer-done interrupt)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gdma::{Allocator, LinkListItem};
//! use stream::{CaptureController, PullSource, StreamConfig, StreamHandler, Transaction};
//!
//! struct Frames;
//!
//! impl StreamHandler for Frames {
//!     fn on_trans_finished(&self, trans: &Transaction) -> bool {
//!         let _ = trans.received_size;
//!         false
//!     }
//! }
//!
//! fn run<P: platform::DmaPlatform, B: platform::Bridge>(
//!     alloc: &'static Allocator<P>,
//!     bridge: B,
//!     lli: &'static mut [LinkListItem],
//!     spare: &'static mut [u8],
//!     frames: &'static Frames,
//! ) -> gdma::Result<()> {
//!     let cam: CaptureController<'_, P, B, Frames> = CaptureController::new(
//!         alloc,
//!         bridge,
//!         PullSource,
//!         StreamConfig::new(800, 640, 16),
//!         lli,
//!         Some(spare),
//!     )?;
//!     cam.register_event_callbacks(frames)?;
//!     cam.enable()?;
//!     cam.start()
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
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod controller;
pub mod direction;
pub mod source;
pub mod transaction;

pub use config::{StreamConfig, MAX_INTERNAL_BUFFERS};
pub use controller::{
    CaptureController, DeleteError, RefreshController, StreamController, StreamState, StreamStats,
};
pub use direction::{Capture, Direction, Refresh};
pub use source::{PullSource, QueueSource, Timeout, TransactionSource};
pub use transaction::{DmaBuf, StreamHandler, Transaction};
