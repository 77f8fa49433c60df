//! DW-GDMA channel register contract.
//!
//! The driver never touches registers directly; every channel-level write
//! goes through [`GdmaRegisters`]. The value types here mirror the fields
//! of the channel configuration, control and interrupt-status registers,
//! without committing to a chip revision's bit positions (except for the
//! interrupt status word, whose layout is fixed by the IP).

use crate::address::CachedAddr;
use crate::ids::{ChannelAddr, GroupId, PeripheralId};

// ── Endpoint configuration ───────────────────────────────────────────────────

/// How one end of a channel advances between blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockType {
    /// Single contiguous block.
    Contiguous,
    /// Address register reloads its initial value after each block.
    Reload,
    /// Next block is taken from shadow registers written by software.
    Shadow,
    /// Next block is fetched from a descriptor in memory.
    LinkList,
}

/// What sits at one end of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// System memory.
    Memory,
    /// A peripheral with a hardware handshake interface.
    Peripheral(PeripheralId),
}

/// Handshake used to pace one end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Handshake {
    /// Peripheral request lines.
    Hardware,
    /// Software requests (memory ends always use this).
    Software,
}

/// Which party decides the block length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowController {
    /// The DMA engine (block size from `block_ts`).
    #[default]
    Dma,
    /// The source peripheral.
    Source,
    /// The destination peripheral.
    Destination,
}

/// Static configuration of one channel end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointConfig {
    /// Multi-block mechanism.
    pub block_type: BlockType,
    /// Memory or peripheral.
    pub role: Role,
    /// Handshake kind.
    pub handshake: Handshake,
    /// Maximum outstanding AXI requests (1..=16).
    pub outstanding_requests: u8,
}

impl EndpointConfig {
    /// A memory end using software handshake and one outstanding request.
    #[must_use]
    pub const fn memory(block_type: BlockType) -> Self {
        Self {
            block_type,
            role: Role::Memory,
            handshake: Handshake::Software,
            outstanding_requests: 1,
        }
    }

    /// A peripheral end paced by hardware handshake.
    #[must_use]
    pub const fn peripheral(id: PeripheralId, block_type: BlockType) -> Self {
        Self {
            block_type,
            role: Role::Peripheral(id),
            handshake: Handshake::Hardware,
            outstanding_requests: 1,
        }
    }

    /// Override the outstanding-request limit.
    #[must_use]
    pub const fn with_outstanding(mut self, requests: u8) -> Self {
        self.outstanding_requests = requests;
        self
    }
}

/// Everything written to the channel configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSetup {
    /// Source end.
    pub src: EndpointConfig,
    /// Destination end.
    pub dst: EndpointConfig,
    /// Flow controller.
    pub flow_controller: FlowController,
    /// Arbitration priority (higher wins).
    pub priority: u8,
}

/// A single block loaded straight into the channel registers
/// (contiguous / reload / shadow modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockProgram {
    /// Source address.
    pub src: u64,
    /// Destination address.
    pub dst: u64,
    /// Block size in source-width items, minus one.
    pub block_ts: u32,
    /// Control register image.
    pub control: u64,
}

// ── Transfer shape ───────────────────────────────────────────────────────────

/// Width of one bus beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TransferWidth {
    /// 8 bits.
    Bits8 = 0,
    /// 16 bits.
    Bits16 = 1,
    /// 32 bits.
    #[default]
    Bits32 = 2,
    /// 64 bits.
    Bits64 = 3,
    /// 128 bits.
    Bits128 = 4,
    /// 256 bits.
    Bits256 = 5,
    /// 512 bits.
    Bits512 = 6,
}

impl TransferWidth {
    /// Register encoding.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Beat size in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
            Self::Bits128 => 16,
            Self::Bits256 => 32,
            Self::Bits512 => 64,
        }
    }
}

/// Number of items per burst transaction (MSIZE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BurstItems {
    /// 1 item.
    Items1 = 0,
    /// 4 items.
    Items4 = 1,
    /// 8 items.
    Items8 = 2,
    /// 16 items.
    #[default]
    Items16 = 3,
    /// 32 items.
    Items32 = 4,
    /// 64 items.
    Items64 = 5,
    /// 128 items.
    Items128 = 6,
    /// 256 items.
    Items256 = 7,
    /// 512 items.
    Items512 = 8,
    /// 1024 items.
    Items1024 = 9,
}

impl BurstItems {
    /// Register encoding.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Items per burst.
    #[must_use]
    pub const fn items(self) -> usize {
        match self {
            Self::Items1 => 1,
            Self::Items4 => 4,
            Self::Items8 => 8,
            Self::Items16 => 16,
            Self::Items32 => 32,
            Self::Items64 => 64,
            Self::Items128 => 128,
            Self::Items256 => 256,
            Self::Items512 => 512,
            Self::Items1024 => 1024,
        }
    }
}

/// Address update between beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BurstMode {
    /// Address increments (memory).
    #[default]
    Increment,
    /// Address stays fixed (peripheral FIFO).
    Fixed,
}

/// Bus lock scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockLevel {
    /// Hold the bus for the whole multi-block transfer.
    FullTransfer,
    /// Hold the bus for the current block only.
    Block,
}

// ── Interrupt status ─────────────────────────────────────────────────────────

bitfield::bitfield! {
    /// Channel interrupt status / mask word.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelEvents(u32);
    impl Debug;
    /// One block finished.
    pub block_done, set_block_done: 0;
    /// The whole (multi-block) transfer finished; the channel auto-disabled.
    pub transfer_done, set_transfer_done: 1;
    /// Source-side transaction completed.
    pub src_trans_done, set_src_trans_done: 3;
    /// Destination-side transaction completed.
    pub dst_trans_done, set_dst_trans_done: 4;
    /// Decode error on a source access.
    pub src_decode_error, set_src_decode_error: 5;
    /// Decode error on a destination access.
    pub dst_decode_error, set_dst_decode_error: 6;
    /// Slave error on a source access.
    pub src_slave_error, set_src_slave_error: 7;
    /// Slave error on a destination access.
    pub dst_slave_error, set_dst_slave_error: 8;
    /// Decode error fetching a descriptor.
    pub lli_read_decode_error, set_lli_read_decode_error: 9;
    /// Decode error writing descriptor status back.
    pub lli_write_decode_error, set_lli_write_decode_error: 10;
    /// Slave error fetching a descriptor.
    pub lli_read_slave_error, set_lli_read_slave_error: 11;
    /// Slave error writing descriptor status back.
    pub lli_write_slave_error, set_lli_write_slave_error: 12;
    /// Fetched descriptor or shadow register set was not marked valid.
    pub invalid_block, set_invalid_block: 13;
    /// Channel entered suspend.
    pub suspended, set_suspended: 27;
    /// Channel disabled after a disable request.
    pub disabled, set_disabled: 28;
    /// Channel aborted.
    pub aborted, set_aborted: 29;
}

impl ChannelEvents {
    /// No events.
    pub const NONE: Self = Self(0);
    /// Block-done bit only.
    pub const BLOCK_DONE: Self = Self(1 << 0);
    /// Transfer-done bit only.
    pub const TRANSFER_DONE: Self = Self(1 << 1);
    /// Invalid-block bit only.
    pub const INVALID_BLOCK: Self = Self(1 << 13);
    /// Every bus/descriptor error bit (5..=12).
    pub const ERRORS: Self = Self(0x1FE0);

    /// Bitwise union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bitwise intersection.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if any bus or descriptor error bit is set.
    #[must_use]
    pub const fn has_error(self) -> bool {
        self.0 & Self::ERRORS.0 != 0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ChannelEvents {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ChannelEvents({=u32:#x})", self.0);
    }
}

// ── Register access ──────────────────────────────────────────────────────────

/// Register-level access to DW-GDMA groups and channels.
///
/// `set_enable`, `set_suspend` and `abort` are single atomic register
/// writes and may be issued from any context. The configuration writes
/// (`configure_channel`, `load_block`, `set_link_list_head`) must only be
/// issued while the channel is disabled.
pub trait GdmaRegisters {
    /// Number of groups on this SoC.
    fn group_count(&self) -> u8;

    /// Channels per group.
    fn channels_per_group(&self) -> u8;

    /// Initialize a group's global registers (after clock-on and reset).
    fn init_group(&self, group: GroupId);

    /// Put a group's global registers back to their idle state.
    fn deinit_group(&self, group: GroupId);

    /// Write the channel configuration register.
    fn configure_channel(&self, ch: ChannelAddr, setup: &ChannelSetup);

    /// Load a single block into the channel registers.
    fn load_block(&self, ch: ChannelAddr, block: &BlockProgram);

    /// Point the channel at the first descriptor of a chain.
    fn set_link_list_head(&self, ch: ChannelAddr, head: CachedAddr);

    /// Descriptor the channel is currently executing.
    fn current_link_list_item(&self, ch: ChannelAddr) -> CachedAddr;

    /// Enable or disable the channel. Hardware clears the enable bit on
    /// its own once the transfer completes.
    fn set_enable(&self, ch: ChannelAddr, on: bool);

    /// Current enable bit.
    fn is_enabled(&self, ch: ChannelAddr) -> bool;

    /// Request or release suspend.
    fn set_suspend(&self, ch: ChannelAddr, on: bool);

    /// Abort the channel.
    fn abort(&self, ch: ChannelAddr);

    /// Configure the bus lock (`None` releases it).
    fn set_lock(&self, ch: ChannelAddr, level: Option<LockLevel>);

    /// Signal that the next shadow register set or descriptor is valid
    /// after an invalid-block stall.
    fn resume_block(&self, ch: ChannelAddr);

    /// Unmask exactly the given interrupt sources.
    fn set_interrupt_mask(&self, ch: ChannelAddr, events: ChannelEvents);

    /// Read and clear the pending interrupt status.
    fn take_events(&self, ch: ChannelAddr) -> ChannelEvents;
}
