//! Block transfer description and its control-register encoding.
//!
//! The same 64-bit control word is used for a block loaded directly into
//! channel registers and for the `ctl` field of a link-list item.

use platform::{BurstItems, BurstMode, TransferWidth};

use crate::config::MAX_BLOCK_TS;
use crate::error::{Error, Result};

bitfield::bitfield! {
    /// CHx_CTL / LLI `ctl` image.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Control(u64);
    impl Debug;
    /// Source master select.
    pub src_master, set_src_master: 0;
    /// Destination master select.
    pub dst_master, set_dst_master: 2;
    /// Source address fixed (1) or incrementing (0).
    pub src_fixed, set_src_fixed: 4;
    /// Destination address fixed (1) or incrementing (0).
    pub dst_fixed, set_dst_fixed: 6;
    /// Source beat width code.
    pub u8, src_width, set_src_width: 10, 8;
    /// Destination beat width code.
    pub u8, dst_width, set_dst_width: 13, 11;
    /// Source burst size code.
    pub u8, src_msize, set_src_msize: 17, 14;
    /// Destination burst size code.
    pub u8, dst_msize, set_dst_msize: 21, 18;
    /// Use `arlen` instead of the default AXI burst length.
    pub arlen_en, set_arlen_en: 38;
    /// AXI read burst length.
    pub u8, arlen, set_arlen: 46, 39;
    /// Use `awlen` instead of the default AXI burst length.
    pub awlen_en, set_awlen_en: 47;
    /// AXI write burst length.
    pub u8, awlen, set_awlen: 55, 48;
    /// Write source status back into the descriptor.
    pub src_stat_en, set_src_stat_en: 56;
    /// Write destination status back into the descriptor.
    pub dst_stat_en, set_dst_stat_en: 57;
    /// Raise block-done when this block completes.
    pub ioc, set_ioc: 58;
    /// Last block of the multi-block transfer.
    pub last, set_last: 62;
    /// Shadow register set / descriptor is valid.
    pub valid, set_valid: 63;
}

/// Completion markers of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockMarkers {
    /// Raise a block-done interrupt when the block completes.
    pub enable_intr: bool,
    /// Block ends the multi-block transfer.
    pub is_last: bool,
    /// Block may be executed by hardware.
    pub is_valid: bool,
}

impl Control {
    /// Current markers.
    pub fn markers(self) -> BlockMarkers {
        BlockMarkers {
            enable_intr: self.ioc(),
            is_last: self.last(),
            is_valid: self.valid(),
        }
    }

    /// Replace the markers, keeping every other field.
    #[must_use]
    pub fn with_markers(mut self, markers: BlockMarkers) -> Self {
        self.set_ioc(markers.enable_intr);
        self.set_last(markers.is_last);
        self.set_valid(markers.is_valid);
        self
    }
}

/// One end of a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointTransfer {
    /// Start address (cacheable alias for memory buffers).
    pub addr: usize,
    /// Beat width.
    pub width: TransferWidth,
    /// Items per burst.
    pub burst_items: BurstItems,
    /// Address update between beats.
    pub burst_mode: BurstMode,
    /// AXI burst length override, 0 keeps the default.
    pub burst_len: u8,
    /// Write the peripheral status word back into the descriptor.
    pub status_write_back: bool,
}

impl EndpointTransfer {
    /// Incrementing memory end.
    pub const fn memory(addr: usize, width: TransferWidth) -> Self {
        Self {
            addr,
            width,
            burst_items: BurstItems::Items16,
            burst_mode: BurstMode::Increment,
            burst_len: 0,
            status_write_back: false,
        }
    }

    /// Fixed-address FIFO end.
    pub const fn fifo(addr: usize, width: TransferWidth) -> Self {
        Self {
            addr,
            width,
            burst_items: BurstItems::Items16,
            burst_mode: BurstMode::Fixed,
            burst_len: 0,
            status_write_back: false,
        }
    }

    /// Override the burst size.
    #[must_use]
    pub const fn with_burst(mut self, items: BurstItems) -> Self {
        self.burst_items = items;
        self
    }

    /// Override the AXI burst length.
    #[must_use]
    pub const fn with_burst_len(mut self, len: u8) -> Self {
        self.burst_len = len;
        self
    }

    /// Request status write-back.
    #[must_use]
    pub const fn with_status_write_back(mut self) -> Self {
        self.status_write_back = true;
        self
    }
}

/// Dynamic configuration of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferConfig {
    /// Source end.
    pub src: EndpointTransfer,
    /// Destination end.
    pub dst: EndpointTransfer,
    /// Block size in bytes.
    pub size: usize,
}

impl TransferConfig {
    /// Number of source-width items in the block.
    ///
    /// The size must be non-zero, a multiple of the source width and fit
    /// in [`MAX_BLOCK_TS`] items.
    pub fn block_items(&self) -> Result<u32> {
        let width = self.src.width.bytes();
        if self.size == 0 {
            return Err(Error::InvalidArgument("transfer size is zero"));
        }
        if self.size.checked_rem(width) != Some(0) {
            return Err(Error::InvalidArgument(
                "transfer size not a multiple of the source width",
            ));
        }
        let items = self.size.checked_div(width).unwrap_or(0);
        if items > MAX_BLOCK_TS {
            return Err(Error::InvalidArgument("block exceeds the maximum block size"));
        }
        u32::try_from(items).map_err(|_| Error::InvalidArgument("block exceeds the maximum block size"))
    }

    /// Control word for this block with the given markers.
    pub fn control(&self, markers: BlockMarkers) -> Control {
        let mut ctl = Control::default();
        ctl.set_src_fixed(self.src.burst_mode == BurstMode::Fixed);
        ctl.set_dst_fixed(self.dst.burst_mode == BurstMode::Fixed);
        ctl.set_src_width(self.src.width.code());
        ctl.set_dst_width(self.dst.width.code());
        ctl.set_src_msize(self.src.burst_items.code());
        ctl.set_dst_msize(self.dst.burst_items.code());
        if self.src.burst_len != 0 {
            ctl.set_arlen_en(true);
            ctl.set_arlen(self.src.burst_len);
        }
        if self.dst.burst_len != 0 {
            ctl.set_awlen_en(true);
            ctl.set_awlen(self.dst.burst_len);
        }
        ctl.set_src_stat_en(self.src.status_write_back);
        ctl.set_dst_stat_en(self.dst.status_write_back);
        ctl.with_markers(markers)
    }
}

/// BLOCK_TS register value for `items` beats (the field holds items - 1).
pub(crate) fn block_ts(items: u32) -> u32 {
    items.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    fn cfg(size: usize) -> TransferConfig {
        TransferConfig {
            src: EndpointTransfer::fifo(0x5000_0000, TransferWidth::Bits32),
            dst: EndpointTransfer::memory(0x4000_0000, TransferWidth::Bits64)
                .with_burst(BurstItems::Items32)
                .with_burst_len(15),
            size,
        }
    }

    #[test]
    fn size_must_divide_by_source_width() {
        assert_eq!(cfg(4096).block_items(), Ok(1024));
        assert!(matches!(cfg(4098).block_items(), Err(Error::InvalidArgument(_))));
        assert!(matches!(cfg(0).block_items(), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            cfg((MAX_BLOCK_TS + 1) * 4).block_items(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn control_word_layout() {
        let ctl = cfg(64).control(BlockMarkers {
            enable_intr: true,
            is_last: true,
            is_valid: true,
        });
        assert!(ctl.src_fixed());
        assert!(!ctl.dst_fixed());
        assert_eq!(ctl.src_width(), 2);
        assert_eq!(ctl.dst_width(), 3);
        assert_eq!(ctl.dst_msize(), 4);
        assert!(!ctl.arlen_en());
        assert!(ctl.awlen_en());
        assert_eq!(ctl.awlen(), 15);
        assert_eq!(ctl.0 >> 62, 0b11);
        assert!(ctl.ioc());
    }

    #[test]
    fn markers_round_trip_without_touching_shape() {
        let base = cfg(64).control(BlockMarkers::default());
        let marked = base.with_markers(BlockMarkers {
            enable_intr: false,
            is_last: true,
            is_valid: true,
        });
        assert_eq!(marked.src_width(), base.src_width());
        assert!(marked.markers().is_last);
        assert_eq!(marked.with_markers(BlockMarkers::default()), base);
    }
}
