//! Newtype identifiers for DMA groups, channels, peripherals and clocks.
//!
//! Plain `u8` indices are easy to swap by accident (group 1 / channel 1).
//! Each identifier gets its own type so the compiler catches the mix-up.

/// Index of a DW-GDMA group (one shared hardware block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupId(pub u8);

impl GroupId {
    /// Table index for this group.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a channel inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(pub u8);

impl ChannelId {
    /// Slot index for this channel.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fully qualified channel address: `(group, channel)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelAddr {
    /// Owning group.
    pub group: GroupId,
    /// Channel index within the group.
    pub channel: ChannelId,
}

impl ChannelAddr {
    /// Build an address from raw indices.
    #[must_use]
    pub const fn new(group: u8, channel: u8) -> Self {
        Self {
            group: GroupId(group),
            channel: ChannelId(channel),
        }
    }
}

/// Hardware handshake interface number of a peripheral (camera bridge,
/// display bridge, ...). At most one channel may drive a given interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralId(pub u8);

/// Identifier of a gateable source clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockId(pub u8);
