//! Stream configuration.

use gdma::config::{MAX_BLOCK_TS, MAX_OUTSTANDING_REQUESTS};
use gdma::{Error, Result};
use platform::BurstItems;

/// The controller owns exactly one internal (fallback) buffer.
pub const MAX_INTERNAL_BUFFERS: usize = 1;

/// Geometry and DMA shape of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    /// Pixels per line.
    pub h_res: u32,
    /// Lines per frame.
    pub v_res: u32,
    /// Bits per pixel on the bridge side.
    pub bits_per_pixel: u32,
    /// Burst length on both ends.
    pub burst: BurstItems,
    /// Outstanding requests on both ends.
    pub outstanding: u8,
    /// Channel arbitration priority.
    pub channel_priority: u8,
    /// Group interrupt priority (0 = don't care).
    pub intr_priority: u8,
    /// Require the handler object in ISR-safe memory.
    pub isr_cache_safe: bool,
    /// Beats per descriptor before a frame is split over several items.
    pub max_block_items: usize,
}

impl StreamConfig {
    /// A `h_res` × `v_res` frame of `bits_per_pixel`-bit pixels.
    pub const fn new(h_res: u32, v_res: u32, bits_per_pixel: u32) -> Self {
        Self {
            h_res,
            v_res,
            bits_per_pixel,
            burst: BurstItems::Items16,
            outstanding: 5,
            channel_priority: 1,
            intr_priority: 0,
            isr_cache_safe: false,
            max_block_items: MAX_BLOCK_TS,
        }
    }

    /// Set the burst length.
    #[must_use]
    pub const fn with_burst(mut self, burst: BurstItems) -> Self {
        self.burst = burst;
        self
    }

    /// Set the outstanding-request limit.
    #[must_use]
    pub const fn with_outstanding(mut self, requests: u8) -> Self {
        self.outstanding = requests;
        self
    }

    /// Set the channel arbitration priority.
    #[must_use]
    pub const fn with_channel_priority(mut self, priority: u8) -> Self {
        self.channel_priority = priority;
        self
    }

    /// Set the interrupt priority.
    #[must_use]
    pub const fn with_intr_priority(mut self, priority: u8) -> Self {
        self.intr_priority = priority;
        self
    }

    /// Require ISR-safe handler placement.
    #[must_use]
    pub const fn with_isr_cache_safe(mut self, safe: bool) -> Self {
        self.isr_cache_safe = safe;
        self
    }

    /// Cap the beats per descriptor, clamped to `1..=MAX_BLOCK_TS`.
    #[must_use]
    pub fn with_max_block_items(mut self, items: usize) -> Self {
        self.max_block_items = items.clamp(1, MAX_BLOCK_TS);
        self
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> Result<usize> {
        let bits = u64::from(self.h_res)
            .checked_mul(u64::from(self.v_res))
            .and_then(|px| px.checked_mul(u64::from(self.bits_per_pixel)))
            .ok_or(Error::InvalidArgument("frame size overflows"))?;
        if bits == 0 {
            return Err(Error::InvalidArgument("empty frame"));
        }
        if bits & 7 != 0 {
            return Err(Error::InvalidArgument("frame is not a whole number of bytes"));
        }
        usize::try_from(bits >> 3).map_err(|_| Error::InvalidArgument("frame size overflows"))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.outstanding == 0 || self.outstanding > MAX_OUTSTANDING_REQUESTS {
            return Err(Error::InvalidArgument("outstanding requests out of range"));
        }
        if self.max_block_items == 0 || self.max_block_items > MAX_BLOCK_TS {
            return Err(Error::InvalidArgument("block item cap out of range"));
        }
        self.frame_size().map(|_| ())
    }
}
