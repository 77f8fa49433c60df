//! Bridge / FIFO peripheral collaborator.
//!
//! Camera and display bridges sit between the DMA engine and the
//! sensor- or panel-facing logic. The streaming controller only needs to
//! know the FIFO address, the handshake interface and the bus width, and
//! to switch the bridge on and off around a stream.

use crate::gdma::{BurstItems, TransferWidth};
use crate::ids::{ClockId, PeripheralId};

/// Transfer shape programmed into the bridge at stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeTransfer {
    /// Bytes per frame.
    pub frame_size: usize,
    /// Burst length requested from the DMA engine.
    pub burst: BurstItems,
    /// Beat width on the bridge side.
    pub width: TransferWidth,
}

/// A bridge peripheral.
///
/// All methods take `&self`; implementations perform single register
/// writes and may be called from interrupt context.
pub trait Bridge {
    /// Hardware handshake interface the bridge is wired to.
    fn peripheral(&self) -> PeripheralId;

    /// Source clock feeding the bridge.
    fn clock(&self) -> ClockId;

    /// Bus address of the bridge FIFO.
    fn fifo_address(&self) -> usize;

    /// FIFO beat width.
    fn bus_width(&self) -> TransferWidth;

    /// Program frame size and burst shape.
    fn configure(&self, transfer: &BridgeTransfer);

    /// Start or stop the bridge.
    fn enable(&self, on: bool);
}

impl<T: Bridge + ?Sized> Bridge for &T {
    fn peripheral(&self) -> PeripheralId {
        (**self).peripheral()
    }

    fn clock(&self) -> ClockId {
        (**self).clock()
    }

    fn fifo_address(&self) -> usize {
        (**self).fifo_address()
    }

    fn bus_width(&self) -> TransferWidth {
        (**self).bus_width()
    }

    fn configure(&self, transfer: &BridgeTransfer) {
        (**self).configure(transfer);
    }

    fn enable(&self, on: bool) {
        (**self).enable(on);
    }
}
