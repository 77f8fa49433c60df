//! Chip-level limits of the DW-GDMA IP.
//!
//! Table sizes are fixed at compile time; the running SoC reports its
//! actual topology through [`platform::GdmaRegisters`] and must fit inside
//! them.

/// Size of the group table.
pub const MAX_GROUPS: usize = 4;

/// Channel slots per group.
pub const MAX_CHANNELS_PER_GROUP: usize = 8;

/// Hardware handshake interfaces that can be claimed (bitmask width).
pub const MAX_PERIPHERALS: usize = 32;

/// Upper bound of the per-end outstanding request limit.
pub const MAX_OUTSTANDING_REQUESTS: u8 = 16;

/// Highest interrupt priority a channel may request (0 = don't care).
pub const MAX_INTR_PRIORITY: u8 = 3;

/// Items (source-width beats) per block: the BLOCK_TS field is 22 bits.
pub const MAX_BLOCK_TS: usize = 1 << 22;

/// Alignment and size of one link-list item.
pub const LLI_ALIGN: usize = 64;

// Compile-time consistency checks.
const _: () = assert!(MAX_PERIPHERALS <= u32::BITS as usize);
const _: () = assert!(MAX_CHANNELS_PER_GROUP <= u8::MAX as usize);
const _: () = assert!(MAX_GROUPS <= u8::MAX as usize);
