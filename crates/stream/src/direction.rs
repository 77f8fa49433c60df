//! Data direction of a stream.

use gdma::{EndpointTransfer, TransferConfig};
use platform::{BlockType, EndpointConfig, PeripheralId, SyncFlags};

mod sealed {
    pub trait Sealed {}
}

/// Capture (bridge → memory) or refresh (memory → bridge).
///
/// Sealed; the two implementations differ only in which end is the
/// bridge FIFO and where cache maintenance happens.
pub trait Direction: sealed::Sealed {
    /// Log label.
    const LABEL: &'static str;

    /// Maintenance on a buffer before the engine reads it.
    const BEFORE_ARM: Option<SyncFlags>;

    /// Maintenance on a finished buffer before software reads it.
    const BEFORE_NOTIFY: Option<SyncFlags>;

    /// Channel ends for a bridge on `peripheral`. The memory end walks a
    /// link list; the bridge end is a fixed FIFO.
    fn endpoints(peripheral: PeripheralId, outstanding: u8) -> (EndpointConfig, EndpointConfig);

    /// One descriptor's worth of transfer between the FIFO and memory.
    fn chunk(fifo: EndpointTransfer, memory: EndpointTransfer, size: usize) -> TransferConfig;
}

/// Bridge → memory (camera).
#[derive(Debug, Clone, Copy, Default)]
pub struct Capture;

/// Memory → bridge (display).
#[derive(Debug, Clone, Copy, Default)]
pub struct Refresh;

impl sealed::Sealed for Capture {}
impl sealed::Sealed for Refresh {}

impl Direction for Capture {
    const LABEL: &'static str = "capture";
    const BEFORE_ARM: Option<SyncFlags> = None;
    const BEFORE_NOTIFY: Option<SyncFlags> = Some(SyncFlags::INVALIDATE.allow_unaligned());

    fn endpoints(peripheral: PeripheralId, outstanding: u8) -> (EndpointConfig, EndpointConfig) {
        (
            EndpointConfig::peripheral(peripheral, BlockType::Contiguous).with_outstanding(outstanding),
            EndpointConfig::memory(BlockType::LinkList).with_outstanding(outstanding),
        )
    }

    fn chunk(fifo: EndpointTransfer, memory: EndpointTransfer, size: usize) -> TransferConfig {
        TransferConfig {
            src: fifo,
            dst: memory,
            size,
        }
    }
}

impl Direction for Refresh {
    const LABEL: &'static str = "refresh";
    const BEFORE_ARM: Option<SyncFlags> = Some(SyncFlags::WRITEBACK.allow_unaligned());
    const BEFORE_NOTIFY: Option<SyncFlags> = None;

    fn endpoints(peripheral: PeripheralId, outstanding: u8) -> (EndpointConfig, EndpointConfig) {
        (
            EndpointConfig::memory(BlockType::LinkList).with_outstanding(outstanding),
            EndpointConfig::peripheral(peripheral, BlockType::Contiguous).with_outstanding(outstanding),
        )
    }

    fn chunk(fifo: EndpointTransfer, memory: EndpointTransfer, size: usize) -> TransferConfig {
        TransferConfig {
            src: memory,
            dst: fifo,
            size,
        }
    }
}
