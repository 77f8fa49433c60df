//! Link-list descriptor chains.
//!
//! A chain is a caller-provided, cache-line aligned array of
//! [`LinkListItem`]s. After creation software only touches the items
//! through their non-cacheable alias ([`LliHandle`]), so edits are visible
//! to the engine without a flush. The `llp` (next) field is the one place
//! where the other view leaks in: the engine dereferences it through the
//! cacheable window, so [`LliHandle::set_next`] stores the cacheable alias
//! and [`LliHandle::next`] maps it back.
//!
//! ```text
//!   singly:   [0] ─► [1] ─► [2] ─► 0
//!   circular: [0] ─► [1] ─► [2] ─┐
//!              ▲─────────────────┘
//! ```

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr::{addr_of, addr_of_mut};

use platform::{AddressMap, CacheSync, CachedAddr, SyncFlags, UncachedAddr};

use crate::config::LLI_ALIGN;
use crate::error::{Error, Result};
use crate::transfer::{block_ts, BlockMarkers, Control, TransferConfig};

/// One hardware descriptor.
///
/// Field order and widths are fixed by the engine's descriptor fetch.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkListItem {
    sar: u64,
    dar: u64,
    block_ts: u32,
    _reserved0: u32,
    llp: u64,
    ctl: u64,
    sstat: u32,
    dstat: u32,
    llp_status: u64,
    _reserved1: u64,
}

const _: () = assert!(core::mem::size_of::<LinkListItem>() == LLI_ALIGN);

impl LinkListItem {
    /// All-zero item, used to initialise storage arrays.
    pub const EMPTY: Self = Self {
        sar: 0,
        dar: 0,
        block_ts: 0,
        _reserved0: 0,
        llp: 0,
        ctl: 0,
        sstat: 0,
        dstat: 0,
        llp_status: 0,
        _reserved1: 0,
    };

    /// Source address (cached copy; read after the chain is released).
    pub fn source(&self) -> u64 {
        self.sar
    }

    /// Destination address.
    pub fn destination(&self) -> u64 {
        self.dar
    }

    /// Raw `llp` field (cacheable alias of the successor, 0 at the end).
    pub fn next_raw(&self) -> u64 {
        self.llp
    }

    /// Control word.
    pub fn control(&self) -> Control {
        Control(self.ctl)
    }

    /// Block size in beats.
    pub fn block_items(&self) -> u32 {
        self.block_ts.saturating_add(1)
    }
}

impl Default for LinkListItem {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Chain topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkType {
    /// Last item terminates the chain.
    Singly,
    /// Last item points back to the first.
    Circular,
}

/// Peripheral status words written back by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LliStatus {
    /// Source status snapshot.
    pub source: u32,
    /// Destination status snapshot.
    pub destination: u32,
}

/// A descriptor chain over borrowed storage.
///
/// Not safe to drop while a channel is still executing it; stop the
/// channel first.
///
/// `Send` but not `Sync`: handles write the items through `&self`.
pub struct LinkList<'d> {
    base: UncachedAddr,
    cached_base: CachedAddr,
    len: usize,
    link_type: LinkType,
    _storage: PhantomData<(&'d mut [LinkListItem], Cell<()>)>,
}

impl<'d> LinkList<'d> {
    /// Build a chain over `storage`.
    ///
    /// The storage is zeroed, written back and invalidated (all later
    /// software access uses the non-cacheable alias), then every item is
    /// linked to its successor.
    pub fn new<P>(platform: &P, storage: &'d mut [LinkListItem], link_type: LinkType) -> Result<Self>
    where
        P: AddressMap + CacheSync + ?Sized,
    {
        if storage.is_empty() {
            return Err(Error::InvalidArgument("link list needs at least one item"));
        }
        let addr = storage.as_ptr() as usize;
        let line = platform.line_size().max(1);
        if addr.checked_rem(line) != Some(0) {
            return Err(Error::InvalidArgument("link list storage not cache-line aligned"));
        }

        storage.fill(LinkListItem::EMPTY);
        platform.sync(addr, core::mem::size_of_val(storage), SyncFlags::WRITEBACK_INVALIDATE)?;

        let list = Self {
            base: platform.uncached(addr),
            cached_base: platform.cached(addr),
            len: storage.len(),
            link_type,
            _storage: PhantomData,
        };
        for index in 0..list.len {
            let next = match index.checked_add(1) {
                Some(n) if n < list.len => list.item(n),
                _ if link_type == LinkType::Circular => list.item(0),
                _ => None,
            };
            if let Some(item) = list.item(index) {
                item.set_next(next.as_ref());
            }
        }
        Ok(list)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: construction rejects empty storage.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Topology the chain was built with.
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Cacheable address of the first item, as programmed into a channel.
    pub fn head(&self) -> CachedAddr {
        self.cached_base
    }

    /// Handle on item `index`, through the non-cacheable alias.
    pub fn item(&self, index: usize) -> Option<LliHandle<'_, 'd>> {
        if index >= self.len {
            return None;
        }
        Some(LliHandle { list: self, index })
    }

    /// Index of the item at a non-cacheable address.
    pub fn index_of(&self, addr: UncachedAddr) -> Option<usize> {
        Self::offset_index(self.base.get(), addr.get(), self.len)
    }

    /// Index of the item at a cacheable address (hardware view).
    pub fn index_of_cached(&self, addr: CachedAddr) -> Option<usize> {
        Self::offset_index(self.cached_base.get(), addr.get(), self.len)
    }

    fn offset_index(base: usize, addr: usize, len: usize) -> Option<usize> {
        let offset = addr.checked_sub(base)?;
        if offset.checked_rem(LLI_ALIGN)? != 0 {
            return None;
        }
        let index = offset.checked_div(LLI_ALIGN)?;
        (index < len).then_some(index)
    }

    fn uncached_at(&self, index: usize) -> UncachedAddr {
        // index < len, so the product stays inside the storage slice.
        UncachedAddr::from_raw(self.base.get().wrapping_add(index.wrapping_mul(LLI_ALIGN)))
    }

    fn cached_at(&self, index: usize) -> CachedAddr {
        CachedAddr::from_raw(self.cached_base.get().wrapping_add(index.wrapping_mul(LLI_ALIGN)))
    }
}

/// Number of items needed to move `bytes` in blocks of at most
/// `max_items` beats of `width_bytes` each.
pub fn items_for(bytes: usize, width_bytes: usize, max_items: usize) -> usize {
    let beats = bytes.div_ceil(width_bytes.max(1));
    beats.div_ceil(max_items.max(1)).max(1)
}

/// Software view of one descriptor (non-cacheable alias).
#[derive(Clone, Copy)]
pub struct LliHandle<'l, 'd> {
    list: &'l LinkList<'d>,
    index: usize,
}

impl LliHandle<'_, '_> {
    fn ptr(&self) -> *mut LinkListItem {
        self.list.uncached_at(self.index).as_ptr()
    }

    fn read_ctl(&self) -> Control {
        // SAFETY: `ptr` addresses item `index < len` of the storage
        // borrowed by the list; the alias is valid for volatile access.
        Control(unsafe { addr_of!((*self.ptr()).ctl).read_volatile() })
    }

    fn write_ctl(&self, ctl: Control) {
        // SAFETY: see `read_ctl`.
        unsafe { addr_of_mut!((*self.ptr()).ctl).write_volatile(ctl.0) }
    }

    /// Position in the chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Non-cacheable address of this item.
    pub fn address(&self) -> UncachedAddr {
        self.list.uncached_at(self.index)
    }

    /// Cacheable address of this item.
    pub fn cached_address(&self) -> CachedAddr {
        self.list.cached_at(self.index)
    }

    /// Program source, destination, size and shape. Markers are kept.
    pub fn configure_transfer(&self, config: &TransferConfig) -> Result<()> {
        let items = config.block_items()?;
        let ctl = config.control(self.read_ctl().markers());
        let item = self.ptr();
        // SAFETY: see `read_ctl`.
        unsafe {
            addr_of_mut!((*item).sar).write_volatile(config.src.addr as u64);
            addr_of_mut!((*item).dar).write_volatile(config.dst.addr as u64);
            addr_of_mut!((*item).block_ts).write_volatile(block_ts(items));
        }
        self.write_ctl(ctl);
        Ok(())
    }

    /// Set the completion markers.
    pub fn set_block_markers(&self, markers: BlockMarkers) {
        self.write_ctl(self.read_ctl().with_markers(markers));
    }

    /// Current completion markers.
    pub fn markers(&self) -> BlockMarkers {
        self.read_ctl().markers()
    }

    /// Point this item at `next` (`None` terminates the chain).
    ///
    /// The engine follows `llp` through the cacheable window, so the
    /// cacheable alias of `next` is stored.
    pub fn set_next(&self, next: Option<&LliHandle<'_, '_>>) {
        let llp = next.map_or(0, |n| n.cached_address().get() as u64);
        // SAFETY: see `read_ctl`.
        unsafe { addr_of_mut!((*self.ptr()).llp).write_volatile(llp) }
    }

    /// Successor, mapped back to the non-cacheable view. `None` at the
    /// end of a singly linked chain or if `llp` points outside the list.
    pub fn next(&self) -> Option<Self> {
        // SAFETY: see `read_ctl`.
        let llp = unsafe { addr_of!((*self.ptr()).llp).read_volatile() };
        let llp = usize::try_from(llp).ok()?;
        if llp == 0 {
            return None;
        }
        let index = self.list.index_of_cached(CachedAddr::from_raw(llp))?;
        self.list.item(index)
    }

    /// Programmed source address.
    pub fn source(&self) -> u64 {
        // SAFETY: see `read_ctl`.
        unsafe { addr_of!((*self.ptr()).sar).read_volatile() }
    }

    /// Programmed destination address.
    pub fn destination(&self) -> u64 {
        // SAFETY: see `read_ctl`.
        unsafe { addr_of!((*self.ptr()).dar).read_volatile() }
    }

    /// Programmed block size in beats.
    pub fn block_items(&self) -> u32 {
        // SAFETY: see `read_ctl`.
        let ts = unsafe { addr_of!((*self.ptr()).block_ts).read_volatile() };
        ts.saturating_add(1)
    }

    /// Status words written back by the engine.
    pub fn status(&self) -> LliStatus {
        let item = self.ptr();
        // SAFETY: see `read_ctl`.
        unsafe {
            LliStatus {
                source: addr_of!((*item).sstat).read_volatile(),
                destination: addr_of!((*item).dstat).read_volatile(),
            }
        }
    }
}
