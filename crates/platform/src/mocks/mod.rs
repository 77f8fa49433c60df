//! Mock implementations for testing
//!
//! [`MockPlatform`] implements every collaborator trait and records each
//! call, in order, into one operation log. Tests assert on the log to
//! check ordering properties (clock before init, cache pass before a
//! buffer is handed out, channel re-armed before a completion is
//! reported). [`MockBridge`] writes into the same log.
//!
//! Address aliasing is modelled with a tag bit: the cacheable alias of a
//! pointer has bit `usize::BITS - 2` set, the non-cacheable alias is the
//! plain pointer. Software can therefore dereference any `UncachedAddr`
//! the driver produces.

#![cfg(any(test, feature = "std"))]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::vec::Vec;

use crate::*;

/// Tag bit that marks the cacheable alias in the mock address space.
pub const CACHED_ALIAS_TAG: usize = 1 << (usize::BITS - 2);

/// Cache line size reported by the mock.
pub const MOCK_CACHE_LINE: usize = 64;

const LINE_MASK: usize = MOCK_CACHE_LINE - 1;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `ClockControl::enable_bus_clock`
    BusClock {
        /// Group.
        group: GroupId,
        /// New state.
        on: bool,
    },
    /// `ClockControl::reset`
    ResetGroup(GroupId),
    /// `ClockControl::enable_source_clock`
    SourceClock {
        /// Clock.
        clock: ClockId,
        /// New state.
        on: bool,
    },
    /// `GdmaRegisters::init_group`
    InitGroup(GroupId),
    /// `GdmaRegisters::deinit_group`
    DeinitGroup(GroupId),
    /// `CacheSync::sync`, address normalised to the plain pointer.
    Sync {
        /// Start address.
        addr: usize,
        /// Length in bytes.
        len: usize,
        /// Flags.
        flags: SyncFlags,
    },
    /// `InterruptController::install`, with the effective priority.
    InstallInterrupt {
        /// Group.
        group: GroupId,
        /// Granted priority.
        priority: u8,
    },
    /// `InterruptController::uninstall`
    UninstallInterrupt(GroupId),
    /// `GdmaRegisters::configure_channel`
    ConfigureChannel {
        /// Channel.
        ch: ChannelAddr,
        /// Written configuration.
        setup: ChannelSetup,
    },
    /// `GdmaRegisters::load_block`
    LoadBlock {
        /// Channel.
        ch: ChannelAddr,
        /// Loaded block.
        block: BlockProgram,
    },
    /// `GdmaRegisters::set_link_list_head`
    SetLinkListHead {
        /// Channel.
        ch: ChannelAddr,
        /// Head descriptor (cacheable alias).
        head: CachedAddr,
    },
    /// `GdmaRegisters::set_enable`
    SetEnable {
        /// Channel.
        ch: ChannelAddr,
        /// New state.
        on: bool,
    },
    /// Descriptor fetched by the modelled hardware when a link-list
    /// channel is enabled: the SAR and DAR words of the head descriptor.
    Arm {
        /// Channel.
        ch: ChannelAddr,
        /// Source address of the first block.
        src: u64,
        /// Destination address of the first block.
        dst: u64,
    },
    /// `GdmaRegisters::set_suspend`
    SetSuspend {
        /// Channel.
        ch: ChannelAddr,
        /// New state.
        on: bool,
    },
    /// `GdmaRegisters::abort`
    Abort(ChannelAddr),
    /// `GdmaRegisters::set_lock`
    SetLock {
        /// Channel.
        ch: ChannelAddr,
        /// Lock level, `None` when released.
        level: Option<LockLevel>,
    },
    /// `GdmaRegisters::resume_block`
    ResumeBlock(ChannelAddr),
    /// `GdmaRegisters::set_interrupt_mask`
    SetInterruptMask {
        /// Channel.
        ch: ChannelAddr,
        /// Unmasked sources.
        events: ChannelEvents,
    },
    /// `Bridge::configure`
    BridgeConfigure {
        /// Bridge interface.
        peripheral: PeripheralId,
        /// Programmed transfer.
        transfer: BridgeTransfer,
    },
    /// `Bridge::enable`
    BridgeEnable {
        /// Bridge interface.
        peripheral: PeripheralId,
        /// New state.
        on: bool,
    },
    /// Free-form marker inserted by test code.
    Note(&'static str),
}

#[derive(Debug, Default)]
struct ChannelState {
    enabled: bool,
    suspended: bool,
    lock: Option<LockLevel>,
    pending: u32,
    mask: ChannelEvents,
    head: Option<CachedAddr>,
    current: Option<CachedAddr>,
    setup: Option<ChannelSetup>,
    block: Option<BlockProgram>,
}

#[derive(Debug)]
struct State {
    ops: Vec<Op>,
    channels: HashMap<ChannelAddr, ChannelState>,
    initialized: HashSet<GroupId>,
    bus_clocks: HashSet<GroupId>,
    source_clocks: HashSet<ClockId>,
    installed: HashMap<GroupId, u8>,
    isr_safe: bool,
    dma_capable: bool,
    default_priority: u8,
    fail_next_install: bool,
}

/// Recording mock of the whole SoC side of the DMA stack.
#[derive(Debug)]
pub struct MockPlatform {
    groups: u8,
    channels: u8,
    state: Mutex<State>,
}

impl MockPlatform {
    /// Two groups of four channels.
    pub fn new() -> Self {
        Self::with_topology(2, 4)
    }

    /// Custom group / channel counts.
    pub fn with_topology(groups: u8, channels: u8) -> Self {
        Self {
            groups,
            channels,
            state: Mutex::new(State {
                ops: Vec::new(),
                channels: HashMap::new(),
                initialized: HashSet::new(),
                bus_clocks: HashSet::new(),
                source_clocks: HashSet::new(),
                installed: HashMap::new(),
                isr_safe: true,
                dma_capable: true,
                default_priority: 1,
                fail_next_install: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: Op) {
        self.state().ops.push(op);
    }

    // ── Log access ──────────────────────────────────────────────────────────

    /// Snapshot of the operation log.
    pub fn ops(&self) -> Vec<Op> {
        self.state().ops.clone()
    }

    /// Empty the operation log.
    pub fn clear_ops(&self) {
        self.state().ops.clear();
    }

    /// Append a marker to the log.
    pub fn note(&self, tag: &'static str) {
        self.record(Op::Note(tag));
    }

    /// Index of the first logged op matching `pred`.
    pub fn position(&self, pred: impl Fn(&Op) -> bool) -> Option<usize> {
        self.state().ops.iter().position(pred)
    }

    // ── Fault / environment injection ───────────────────────────────────────

    /// Latch interrupt status bits on a channel. A transfer-done event
    /// clears the enable bit, like the hardware does.
    pub fn raise(&self, ch: ChannelAddr, events: ChannelEvents) {
        let mut state = self.state();
        let chan = state.channels.entry(ch).or_default();
        chan.pending |= events.0;
        if events.transfer_done() {
            chan.enabled = false;
        }
    }

    /// Make `current_link_list_item` report `addr`.
    pub fn set_current_link_list_item(&self, ch: ChannelAddr, addr: CachedAddr) {
        self.state().channels.entry(ch).or_default().current = Some(addr);
    }

    /// Answer for every `MemoryRegions::is_isr_safe` query.
    pub fn set_isr_safe(&self, safe: bool) {
        self.state().isr_safe = safe;
    }

    /// Answer for every `MemoryRegions::is_dma_capable` query.
    pub fn set_dma_capable(&self, capable: bool) {
        self.state().dma_capable = capable;
    }

    /// Priority granted when a handler is installed with priority 0.
    pub fn set_default_priority(&self, priority: u8) {
        self.state().default_priority = priority;
    }

    /// Make the next `InterruptController::install` call fail.
    pub fn fail_next_install(&self) {
        self.state().fail_next_install = true;
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// `true` between `init_group` and `deinit_group`.
    pub fn is_group_initialized(&self, group: GroupId) -> bool {
        self.state().initialized.contains(&group)
    }

    /// Current bus clock gate of a group.
    pub fn bus_clock_on(&self, group: GroupId) -> bool {
        self.state().bus_clocks.contains(&group)
    }

    /// Current state of a source clock.
    pub fn source_clock_on(&self, clock: ClockId) -> bool {
        self.state().source_clocks.contains(&clock)
    }

    /// Effective priority of an installed group interrupt.
    pub fn installed_priority(&self, group: GroupId) -> Option<u8> {
        self.state().installed.get(&group).copied()
    }

    /// Unmasked interrupt sources of a channel.
    pub fn interrupt_mask(&self, ch: ChannelAddr) -> ChannelEvents {
        self.state()
            .channels
            .get(&ch)
            .map_or(ChannelEvents::NONE, |c| c.mask)
    }

    /// Last configuration written to a channel.
    pub fn channel_setup(&self, ch: ChannelAddr) -> Option<ChannelSetup> {
        self.state().channels.get(&ch).and_then(|c| c.setup)
    }

    /// Last single block loaded into a channel.
    pub fn loaded_block(&self, ch: ChannelAddr) -> Option<BlockProgram> {
        self.state().channels.get(&ch).and_then(|c| c.block)
    }

    /// Current suspend request.
    pub fn is_suspended(&self, ch: ChannelAddr) -> bool {
        self.state().channels.get(&ch).is_some_and(|c| c.suspended)
    }

    /// Current bus lock.
    pub fn lock_level(&self, ch: ChannelAddr) -> Option<LockLevel> {
        self.state().channels.get(&ch).and_then(|c| c.lock)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressMap for MockPlatform {
    fn cached(&self, addr: usize) -> CachedAddr {
        if addr == 0 {
            return CachedAddr::NULL;
        }
        CachedAddr::from_raw(addr | CACHED_ALIAS_TAG)
    }

    fn uncached(&self, addr: usize) -> UncachedAddr {
        UncachedAddr::from_raw(addr & !CACHED_ALIAS_TAG)
    }
}

impl CacheSync for MockPlatform {
    fn line_size(&self) -> usize {
        MOCK_CACHE_LINE
    }

    fn sync(&self, addr: usize, len: usize, flags: SyncFlags) -> Result<(), CacheError> {
        if !flags.unaligned && (addr & LINE_MASK != 0 || len & LINE_MASK != 0) {
            return Err(CacheError::Misaligned);
        }
        self.record(Op::Sync {
            addr: addr & !CACHED_ALIAS_TAG,
            len,
            flags,
        });
        Ok(())
    }
}

impl ClockControl for MockPlatform {
    fn enable_bus_clock(&self, group: GroupId, on: bool) {
        let mut state = self.state();
        if on {
            state.bus_clocks.insert(group);
        } else {
            state.bus_clocks.remove(&group);
        }
        state.ops.push(Op::BusClock { group, on });
    }

    fn reset(&self, group: GroupId) {
        self.record(Op::ResetGroup(group));
    }

    fn enable_source_clock(&self, clock: ClockId, on: bool) {
        let mut state = self.state();
        if on {
            state.source_clocks.insert(clock);
        } else {
            state.source_clocks.remove(&clock);
        }
        state.ops.push(Op::SourceClock { clock, on });
    }
}

impl MemoryRegions for MockPlatform {
    fn is_isr_safe(&self, _addr: usize) -> bool {
        self.state().isr_safe
    }

    fn is_dma_capable(&self, _addr: usize) -> bool {
        self.state().dma_capable
    }
}

impl InterruptController for MockPlatform {
    fn install(&self, group: GroupId, priority: u8) -> Result<u8, InterruptError> {
        let mut state = self.state();
        if state.fail_next_install {
            state.fail_next_install = false;
            return Err(InterruptError::NoFreeVector);
        }
        let granted = if priority == 0 {
            state.default_priority
        } else {
            priority
        };
        state.installed.insert(group, granted);
        state.ops.push(Op::InstallInterrupt {
            group,
            priority: granted,
        });
        Ok(granted)
    }

    fn uninstall(&self, group: GroupId) {
        let mut state = self.state();
        state.installed.remove(&group);
        state.ops.push(Op::UninstallInterrupt(group));
    }
}

impl GdmaRegisters for MockPlatform {
    fn group_count(&self) -> u8 {
        self.groups
    }

    fn channels_per_group(&self) -> u8 {
        self.channels
    }

    fn init_group(&self, group: GroupId) {
        let mut state = self.state();
        state.initialized.insert(group);
        state.ops.push(Op::InitGroup(group));
    }

    fn deinit_group(&self, group: GroupId) {
        let mut state = self.state();
        state.initialized.remove(&group);
        state.channels.retain(|ch, _| ch.group != group);
        state.ops.push(Op::DeinitGroup(group));
    }

    fn configure_channel(&self, ch: ChannelAddr, setup: &ChannelSetup) {
        let mut state = self.state();
        state.channels.entry(ch).or_default().setup = Some(*setup);
        state.ops.push(Op::ConfigureChannel { ch, setup: *setup });
    }

    fn load_block(&self, ch: ChannelAddr, block: &BlockProgram) {
        let mut state = self.state();
        state.channels.entry(ch).or_default().block = Some(*block);
        state.ops.push(Op::LoadBlock { ch, block: *block });
    }

    fn set_link_list_head(&self, ch: ChannelAddr, head: CachedAddr) {
        let mut state = self.state();
        let chan = state.channels.entry(ch).or_default();
        chan.head = Some(head);
        chan.current = None;
        state.ops.push(Op::SetLinkListHead { ch, head });
    }

    fn current_link_list_item(&self, ch: ChannelAddr) -> CachedAddr {
        self.state()
            .channels
            .get(&ch)
            .and_then(|c| c.current.or(c.head))
            .unwrap_or(CachedAddr::NULL)
    }

    fn set_enable(&self, ch: ChannelAddr, on: bool) {
        let mut state = self.state();
        let chan = state.channels.entry(ch).or_default();
        chan.enabled = on;
        let head = chan.head.filter(|h| !h.is_null());
        state.ops.push(Op::SetEnable { ch, on });
        if let (true, Some(head)) = (on, head) {
            let (src, dst) = fetch_head(head);
            state.ops.push(Op::Arm { ch, src, dst });
        }
    }

    fn is_enabled(&self, ch: ChannelAddr) -> bool {
        self.state().channels.get(&ch).is_some_and(|c| c.enabled)
    }

    fn set_suspend(&self, ch: ChannelAddr, on: bool) {
        let mut state = self.state();
        state.channels.entry(ch).or_default().suspended = on;
        state.ops.push(Op::SetSuspend { ch, on });
    }

    fn abort(&self, ch: ChannelAddr) {
        let mut state = self.state();
        let chan = state.channels.entry(ch).or_default();
        chan.enabled = false;
        let mut aborted = ChannelEvents::NONE;
        aborted.set_aborted(true);
        chan.pending |= aborted.0;
        state.ops.push(Op::Abort(ch));
    }

    fn set_lock(&self, ch: ChannelAddr, level: Option<LockLevel>) {
        let mut state = self.state();
        state.channels.entry(ch).or_default().lock = level;
        state.ops.push(Op::SetLock { ch, level });
    }

    fn resume_block(&self, ch: ChannelAddr) {
        self.record(Op::ResumeBlock(ch));
    }

    fn set_interrupt_mask(&self, ch: ChannelAddr, events: ChannelEvents) {
        let mut state = self.state();
        state.channels.entry(ch).or_default().mask = events;
        state.ops.push(Op::SetInterruptMask { ch, events });
    }

    fn take_events(&self, ch: ChannelAddr) -> ChannelEvents {
        let mut state = self.state();
        let chan = state.channels.entry(ch).or_default();
        let events = ChannelEvents(chan.pending).intersection(chan.mask);
        chan.pending = 0;
        events
    }
}

/// Read the SAR / DAR words of a descriptor the way the engine fetches
/// it. Both are 64-bit and lead every DW-GDMA descriptor.
fn fetch_head(head: CachedAddr) -> (u64, u64) {
    let ptr = (head.get() & !CACHED_ALIAS_TAG) as *const u64;
    // SAFETY: heads only reach the mock through `set_link_list_head`, which
    // the driver calls with the cacheable alias of a live, 64-byte aligned
    // descriptor chain. Clearing the tag yields the real pointer.
    unsafe { (ptr.read_volatile(), ptr.add(1).read_volatile()) }
}

/// Recording mock bridge that logs into a [`MockPlatform`].
#[derive(Debug)]
pub struct MockBridge<'a> {
    platform: &'a MockPlatform,
    peripheral: PeripheralId,
    clock: ClockId,
    fifo: usize,
    width: TransferWidth,
    enabled: AtomicBool,
}

impl<'a> MockBridge<'a> {
    /// A bridge on interface `peripheral`, fed by `clock`, with a 32-bit FIFO.
    pub fn new(platform: &'a MockPlatform, peripheral: PeripheralId, clock: ClockId) -> Self {
        Self {
            platform,
            peripheral,
            clock,
            fifo: 0x5000_0000,
            width: TransferWidth::Bits32,
            enabled: AtomicBool::new(false),
        }
    }

    /// Override the FIFO beat width.
    #[must_use]
    pub fn with_bus_width(mut self, width: TransferWidth) -> Self {
        self.width = width;
        self
    }

    /// Current enable state.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Bridge for MockBridge<'_> {
    fn peripheral(&self) -> PeripheralId {
        self.peripheral
    }

    fn clock(&self) -> ClockId {
        self.clock
    }

    fn fifo_address(&self) -> usize {
        self.fifo
    }

    fn bus_width(&self) -> TransferWidth {
        self.width
    }

    fn configure(&self, transfer: &BridgeTransfer) {
        self.platform.record(Op::BridgeConfigure {
            peripheral: self.peripheral,
            transfer: *transfer,
        });
    }

    fn enable(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
        self.platform.record(Op::BridgeEnable {
            peripheral: self.peripheral,
            on,
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn aliases_are_idempotent() {
        let p = MockPlatform::new();
        let c = p.cached(0x1000);
        assert_eq!(p.cached(c.get()), c);
        let u = p.uncached(c.get());
        assert_eq!(u.get(), 0x1000);
        assert_eq!(p.uncached(u.get()), u);
        assert_eq!(u.to_cached(&p), c);
        assert_eq!(c.to_uncached(&p), u);
    }

    #[test]
    fn null_stays_null() {
        let p = MockPlatform::new();
        assert!(p.cached(0).is_null());
        assert!(CachedAddr::NULL.to_uncached(&p).is_null());
    }

    #[test]
    fn misaligned_sync_is_rejected_unless_tolerated() {
        let p = MockPlatform::new();
        assert_eq!(
            p.sync(0x1004, 64, SyncFlags::WRITEBACK),
            Err(CacheError::Misaligned)
        );
        assert!(p
            .sync(0x1004, 10, SyncFlags::INVALIDATE.allow_unaligned())
            .is_ok());
    }

    #[test]
    fn transfer_done_clears_enable() {
        let p = MockPlatform::new();
        let ch = ChannelAddr::new(0, 1);
        p.set_enable(ch, true);
        assert!(p.is_enabled(ch));
        p.raise(ch, ChannelEvents::TRANSFER_DONE);
        assert!(!p.is_enabled(ch));
    }

    #[test]
    fn masked_events_are_not_reported() {
        let p = MockPlatform::new();
        let ch = ChannelAddr::new(1, 0);
        p.set_interrupt_mask(ch, ChannelEvents::TRANSFER_DONE);
        p.raise(
            ch,
            ChannelEvents::TRANSFER_DONE.union(ChannelEvents::BLOCK_DONE),
        );
        assert_eq!(p.take_events(ch), ChannelEvents::TRANSFER_DONE);
        assert!(p.take_events(ch).is_empty());
    }

    #[test]
    fn install_reports_granted_priority() {
        let p = MockPlatform::new();
        p.set_default_priority(2);
        assert_eq!(p.install(GroupId(0), 0), Ok(2));
        assert_eq!(p.install(GroupId(1), 3), Ok(3));
        p.fail_next_install();
        assert_eq!(
            p.install(GroupId(1), 3),
            Err(InterruptError::NoFreeVector)
        );
    }
}
