//! Cached / non-cached address aliasing.
//!
//! On the target SoC the same physical memory is visible through two bus
//! windows: the cacheable one (used by hardware when it dereferences a
//! descriptor `next` pointer or a buffer address) and the non-cacheable one
//! (used by software to edit descriptors without explicit flushes).
//!
//! The two views are separate types. Driver code never adds or masks
//! offsets itself; it asks the [`AddressMap`] for the alias it needs.
//!
//! ```text
//!   software edit ──► UncachedAddr ──┐
//!                                    ├── same SRAM line
//!   hardware fetch ◄── CachedAddr ───┘
//! ```

/// An address in the cacheable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CachedAddr(usize);

/// An address in the non-cacheable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UncachedAddr(usize);

impl CachedAddr {
    /// Terminator value of a descriptor chain.
    pub const NULL: Self = Self(0);

    /// Wrap a raw value that is already known to be a cacheable address.
    ///
    /// Used when reading an address back from hardware (descriptor `llp`
    /// fields, the channel's current-descriptor register).
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw bus address.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// `true` for the chain terminator.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The same memory seen through the non-cacheable window.
    #[must_use]
    pub fn to_uncached<M: AddressMap + ?Sized>(self, map: &M) -> UncachedAddr {
        if self.is_null() {
            return UncachedAddr::NULL;
        }
        map.uncached(self.0)
    }
}

impl UncachedAddr {
    /// Null address.
    pub const NULL: Self = Self(0);

    /// Wrap a raw value that is already known to be a non-cacheable address.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw bus address.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// `true` for the null address.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The same memory seen through the cacheable window.
    #[must_use]
    pub fn to_cached<M: AddressMap + ?Sized>(self, map: &M) -> CachedAddr {
        if self.is_null() {
            return CachedAddr::NULL;
        }
        map.cached(self.0)
    }

    /// Pointer for software access through the non-cacheable window.
    #[must_use]
    pub const fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

/// Maps any CPU-visible address onto either bus window.
///
/// Both conversions must be idempotent: `cached(cached(a).get())` equals
/// `cached(a)`, and likewise for `uncached`.
pub trait AddressMap {
    /// Cacheable alias of `addr`.
    fn cached(&self, addr: usize) -> CachedAddr;

    /// Non-cacheable alias of `addr`.
    fn uncached(&self, addr: usize) -> UncachedAddr;
}

impl<T: AddressMap + ?Sized> AddressMap for &T {
    fn cached(&self, addr: usize) -> CachedAddr {
        (**self).cached(addr)
    }

    fn uncached(&self, addr: usize) -> UncachedAddr {
        (**self).uncached(addr)
    }
}
