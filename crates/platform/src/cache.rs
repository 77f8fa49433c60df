//! Cache coherency collaborator.
//!
//! | When                         | Flags                    |
//! |------------------------------|--------------------------|
//! | descriptor chain created     | `WRITEBACK_INVALIDATE`   |
//! | fallback buffer created      | `WRITEBACK`              |
//! | capture frame handed to user | `INVALIDATE`, unaligned  |
//! | refresh frame armed          | `WRITEBACK`, unaligned   |

/// Which party wrote the memory last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncDirection {
    /// Software wrote through the cache; push dirty lines to memory.
    CacheToMemory,
    /// A device wrote memory; drop stale cache lines.
    MemoryToCache,
}

/// Parameters of one [`CacheSync::sync`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncFlags {
    /// Data direction.
    pub direction: SyncDirection,
    /// Also invalidate after a write-back.
    pub invalidate: bool,
    /// Accept an address or length that is not cache-line aligned.
    pub unaligned: bool,
}

impl SyncFlags {
    /// Write dirty lines back to memory.
    pub const WRITEBACK: Self = Self {
        direction: SyncDirection::CacheToMemory,
        invalidate: false,
        unaligned: false,
    };

    /// Write back, then invalidate (memory is about to be used through
    /// the non-cacheable alias).
    pub const WRITEBACK_INVALIDATE: Self = Self {
        direction: SyncDirection::CacheToMemory,
        invalidate: true,
        unaligned: false,
    };

    /// Drop cached lines so the CPU re-reads what a device wrote.
    pub const INVALIDATE: Self = Self {
        direction: SyncDirection::MemoryToCache,
        invalidate: true,
        unaligned: false,
    };

    /// Same flags, tolerating unaligned ranges.
    #[must_use]
    pub const fn allow_unaligned(self) -> Self {
        Self {
            unaligned: true,
            ..self
        }
    }
}

/// Cache maintenance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CacheError {
    /// Address or length not line-aligned and `unaligned` was not set.
    Misaligned,
    /// Range is not backed by cacheable memory.
    InvalidRegion,
}

/// Cache maintenance operations.
pub trait CacheSync {
    /// Data cache line size in bytes (power of two).
    fn line_size(&self) -> usize;

    /// Synchronize `len` bytes at `addr`.
    fn sync(&self, addr: usize, len: usize, flags: SyncFlags) -> Result<(), CacheError>;
}
