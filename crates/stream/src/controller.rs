//! Streaming controller: one bridge, one DMA channel, one frame in flight.
//!
//! # Lifecycle
//!
//! ```text
//!          enable            start
//!   Init ─────────► Enabled ───────► Started
//!    ▲   ◄─────────    ▲    ◄───────    │
//!    │     disable     │      stop      │
//!  delete              └── (fault latches here until stop)
//! ```
//!
//! Every transition checks and updates the state inside a short critical
//! section; the hardware side effects run outside it. A transition that
//! is still running its side effects makes every other transition fail
//! with `InvalidState`.
//!
//! # Handoff
//!
//! On every transfer-done interrupt, in this order:
//!
//! 1. acquire the next buffer from the source (pull callback or queue);
//! 2. substitute the internal buffer if nothing usable came back (halt
//!    if there is no internal buffer either);
//! 3. write back the new buffer (refresh only);
//! 4. re-arm the descriptors, enable the channel and make the new buffer
//!    current, all inside one critical section;
//! 5. invalidate the finished buffer (capture only) and hand it to the
//!    client, unless it is the internal buffer and the client never
//!    asked for it.
//!
//! The engine is re-armed before any client code runs, so a slow
//! completion callback cannot make the bridge overflow.

use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;

use critical_section::Mutex;
use heapless::Vec;

use gdma::{
    items_for, Allocator, BlockMarkers, BreakEvent, Channel, ChannelConfig, ChannelHandler,
    EndpointTransfer, Error, LinkList, LinkListItem, LinkType, Result,
};
use platform::{Bridge, BridgeTransfer, ChannelEvents, DmaPlatform, SyncFlags, TransferWidth};

use crate::config::{StreamConfig, MAX_INTERNAL_BUFFERS};
use crate::direction::{Capture, Direction, Refresh};
use crate::source::{PullSource, QueueSource, Timeout, TransactionSource};
use crate::transaction::{DmaBuf, StreamHandler, Transaction};

// ── Public state ─────────────────────────────────────────────────────────────

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamState {
    /// Created; callbacks may be registered.
    Init,
    /// Bridge clock held; ready to start.
    Enabled,
    /// Frames flowing (or halted on a fault).
    Started,
}

/// Running counters. All saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamStats {
    /// Transfer-done interrupts handled while started.
    pub frames_completed: u32,
    /// Finished buffers handed to the client.
    pub frames_delivered: u32,
    /// Frames that went to the internal buffer instead of a client one.
    pub fallback_substitutions: u32,
    /// Invalid-block events seen.
    pub invalid_blocks: u32,
}

/// [`StreamController::delete`] refused; the controller is handed back.
pub struct DeleteError<T> {
    /// The controller, unchanged.
    pub controller: T,
    /// Why deletion was refused.
    pub error: Error,
}

impl<T> fmt::Debug for DeleteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

// ── Shared state ─────────────────────────────────────────────────────────────

struct Inner<'d, H: ?Sized> {
    state: StreamState,
    /// A transition is running its side effects.
    busy: bool,
    /// The handoff may re-arm the channel.
    running: bool,
    faulted: bool,
    /// One-way: set once the client has seen the internal buffer.
    exposed: bool,
    handler: Option<&'d H>,
    current: Transaction,
    stats: StreamStats,
}

impl<H: ?Sized> Inner<'_, H> {
    const fn new() -> Self {
        Self {
            state: StreamState::Init,
            busy: false,
            running: false,
            faulted: false,
            exposed: false,
            handler: None,
            current: Transaction::EMPTY,
            stats: StreamStats {
                frames_completed: 0,
                frames_delivered: 0,
                fallback_substitutions: 0,
                invalid_blocks: 0,
            },
        }
    }

    fn require(&self, state: StreamState, reason: &'static str) -> Result<()> {
        if self.busy || self.state != state {
            return Err(Error::InvalidState(reason));
        }
        Ok(())
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// A capture or refresh stream.
///
/// `S` fixes how buffers are acquired ([`PullSource`] or
/// [`QueueSource`]); `D` fixes the data direction ([`Capture`] or
/// [`Refresh`]).
///
/// All operations take `&self` so the controller can be shared between
/// task code and the interrupt vector that calls
/// [`Self::handle_interrupt`].
pub struct StreamController<'d, P, B, H, S, D>
where
    P: DmaPlatform,
    B: Bridge,
    H: StreamHandler + ?Sized,
    S: TransactionSource,
    D: Direction,
{
    alloc: &'d Allocator<P>,
    // Dropped before the list it executes.
    channel: Channel<'d, P>,
    list: LinkList<'d>,
    bridge: B,
    source: S,
    fallback: Option<DmaBuf>,
    frame_size: usize,
    width: TransferWidth,
    config: StreamConfig,
    inner: Mutex<RefCell<Inner<'d, H>>>,
    _direction: PhantomData<D>,
}

/// Camera-side controller (bridge → memory).
pub type CaptureController<'d, P, B, H, S = PullSource> = StreamController<'d, P, B, H, S, Capture>;

/// Display-side controller (memory → bridge).
pub type RefreshController<'d, P, B, H, S = PullSource> = StreamController<'d, P, B, H, S, Refresh>;

impl<'d, P, B, H, S, D> StreamController<'d, P, B, H, S, D>
where
    P: DmaPlatform,
    B: Bridge,
    H: StreamHandler + ?Sized,
    S: TransactionSource,
    D: Direction,
{
    /// Create a controller in the `Init` state.
    ///
    /// `lli_storage` must hold at least one item per descriptor a frame
    /// needs (one unless the frame exceeds `max_block_items` beats);
    /// extra items are left unused. `fallback`, if given, receives frames
    /// whenever the client has no buffer ready. It must hold a whole
    /// frame, be cache-line aligned and DMA capable.
    pub fn new(
        alloc: &'d Allocator<P>,
        bridge: B,
        source: S,
        config: StreamConfig,
        lli_storage: &'d mut [LinkListItem],
        fallback: Option<&'d mut [u8]>,
    ) -> Result<Self> {
        config.validate()?;
        let platform = alloc.platform();
        let frame_size = config.frame_size()?;
        let width = bridge.bus_width();
        if frame_size.checked_rem(width.bytes()) != Some(0) {
            return Err(Error::InvalidArgument("frame size is not a multiple of the bus width"));
        }

        let items = items_for(frame_size, width.bytes(), config.max_block_items);
        let storage = lli_storage
            .get_mut(..items)
            .ok_or(Error::InvalidArgument("link list storage too small for one frame"))?;
        let fallback = match fallback {
            Some(buf) => Some(Self::prepare_fallback(platform, buf, frame_size)?),
            None => None,
        };
        let list = LinkList::new(platform, storage, LinkType::Singly)?;

        let (src, dst) = D::endpoints(bridge.peripheral(), config.outstanding);
        let mut channel = Channel::new(
            alloc,
            ChannelConfig::new(src, dst)
                .with_channel_priority(config.channel_priority)
                .with_intr_priority(config.intr_priority)
                .with_isr_cache_safe(config.isr_cache_safe),
        )?;
        channel.listen(ChannelEvents::TRANSFER_DONE.union(ChannelEvents::INVALID_BLOCK))?;

        debug!(
            "stream: {} controller on channel ({},{}), {} bytes per frame in {} descriptors",
            D::LABEL,
            channel.group().0,
            channel.id().0,
            frame_size,
            items,
        );
        Ok(Self {
            alloc,
            channel,
            list,
            bridge,
            source,
            fallback,
            frame_size,
            width,
            config,
            inner: Mutex::new(RefCell::new(Inner::new())),
            _direction: PhantomData,
        })
    }

    fn prepare_fallback(platform: &P, buf: &mut [u8], frame_size: usize) -> Result<DmaBuf> {
        if buf.len() < frame_size {
            return Err(Error::InvalidArgument("internal buffer smaller than one frame"));
        }
        let addr = buf.as_ptr() as usize;
        if addr.checked_rem(platform.line_size().max(1)) != Some(0) {
            return Err(Error::InvalidArgument("internal buffer not cache-line aligned"));
        }
        if !platform.is_dma_capable(addr) {
            return Err(Error::InvalidArgument("internal buffer not DMA capable"));
        }
        platform.sync(addr, buf.len(), SyncFlags::WRITEBACK.allow_unaligned())?;
        Ok(DmaBuf::from_slice(buf))
    }

    fn platform(&self) -> &'d P {
        self.alloc.platform()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<'d, H>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    fn begin(&self, from: StreamState, reason: &'static str) -> Result<()> {
        self.with_inner(|inner| {
            inner.require(from, reason)?;
            inner.busy = true;
            Ok(())
        })
    }

    fn finish(&self, to: StreamState) {
        self.with_inner(|inner| {
            inner.state = to;
            inner.busy = false;
        });
        trace!("stream: {} now {}", D::LABEL, state_name(to));
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Lifecycle state.
    pub fn state(&self) -> StreamState {
        self.with_inner(|inner| inner.state)
    }

    /// Counters since creation.
    pub fn stats(&self) -> StreamStats {
        self.with_inner(|inner| inner.stats)
    }

    /// The pipeline halted because no buffer was available. Cleared by
    /// [`Self::stop`].
    pub fn is_faulted(&self) -> bool {
        self.with_inner(|inner| inner.faulted)
    }

    /// The latched fault as an error, if the pipeline has halted.
    pub fn fault(&self) -> Option<Error> {
        self.is_faulted()
            .then_some(Error::Fatal("no buffer to arm and no internal buffer"))
    }

    /// The client has asked for the internal buffer at least once.
    pub fn is_fallback_exposed(&self) -> bool {
        self.with_inner(|inner| inner.exposed)
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Configuration the controller was created with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The underlying DMA channel.
    pub fn channel(&self) -> &Channel<'d, P> {
        &self.channel
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Install the client callbacks. Only allowed in `Init`.
    pub fn register_event_callbacks(&self, handler: &'d H) -> Result<()> {
        if self.config.isr_cache_safe {
            let addr = core::ptr::from_ref(handler).cast::<()>() as usize;
            if !self.platform().is_isr_safe(addr) {
                return Err(Error::InvalidArgument("handler not in ISR-safe memory"));
            }
        }
        self.with_inner(|inner| {
            inner.require(
                StreamState::Init,
                "callbacks can only be registered in the init state",
            )?;
            inner.handler = Some(handler);
            Ok(())
        })
    }

    /// `Init` → `Enabled`: take the bridge clock hold.
    pub fn enable(&self) -> Result<()> {
        self.begin(StreamState::Init, "enable needs the init state")?;
        self.platform().enable_source_clock(self.bridge.clock(), true);
        self.finish(StreamState::Enabled);
        Ok(())
    }

    /// `Enabled` → `Init`: release the bridge clock hold.
    pub fn disable(&self) -> Result<()> {
        self.begin(StreamState::Enabled, "disable needs the enabled state")?;
        self.platform().enable_source_clock(self.bridge.clock(), false);
        self.finish(StreamState::Init);
        Ok(())
    }

    /// `Enabled` → `Started`: arm the first buffer and turn the bridge on.
    ///
    /// Needs registered callbacks, and either a buffer from the source or
    /// an internal buffer. If arming fails, a client buffer already taken
    /// from the source comes back through `on_trans_finished` with
    /// `received_size` 0.
    pub fn start(&self) -> Result<()> {
        let handler = self.with_inner(|inner| {
            inner.require(StreamState::Enabled, "start needs the enabled state")?;
            let handler = inner
                .handler
                .ok_or(Error::InvalidState("no completion callback registered"))?;
            inner.busy = true;
            Ok::<_, Error>(handler)
        })?;
        let result = self.start_stream(handler);
        self.finish(if result.is_ok() {
            StreamState::Started
        } else {
            StreamState::Enabled
        });
        result
    }

    fn start_stream(&self, handler: &H) -> Result<()> {
        let mut first = Transaction::EMPTY;
        self.source.acquire(handler, &mut first);
        let first = self
            .usable_or_fallback(first)
            .ok_or(Error::InvalidState("no transaction ready and no internal buffer"))?;
        self.prepare_for_engine(&first);

        let armed = self.with_inner(|inner| {
            self.arm(&first)?;
            if self.is_fallback(&first) {
                inner.stats.fallback_substitutions =
                    inner.stats.fallback_substitutions.saturating_add(1);
            }
            inner.current = first;
            inner.running = true;
            inner.faulted = false;
            Ok::<(), Error>(())
        });
        if let Err(e) = armed {
            self.give_back(handler, first);
            return Err(e);
        }

        self.bridge.configure(&BridgeTransfer {
            frame_size: self.frame_size,
            burst: self.config.burst,
            width: self.width,
        });
        self.bridge.enable(true);
        info!("stream: {} started", D::LABEL);
        Ok(())
    }

    /// Return a client buffer that was taken but never armed, empty.
    fn give_back(&self, handler: &H, trans: Transaction) {
        if self.is_fallback(&trans) {
            return;
        }
        warn!("stream: {} could not arm the first buffer, returning it", D::LABEL);
        handler.on_trans_finished(&Transaction {
            received_size: 0,
            ..trans
        });
    }

    /// `Started` → `Enabled`: bridge off, then channel off.
    ///
    /// The frame in flight is abandoned; its buffer goes back to the
    /// client without a callback. Clears the fault latch.
    pub fn stop(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.require(StreamState::Started, "stop needs the started state")?;
            inner.busy = true;
            inner.running = false;
            Ok::<(), Error>(())
        })?;
        self.bridge.enable(false);
        self.channel.enable(false);
        self.with_inner(|inner| {
            inner.faulted = false;
            inner.current = Transaction::EMPTY;
        });
        self.finish(StreamState::Enabled);
        info!("stream: {} stopped", D::LABEL);
        Ok(())
    }

    /// Tear down. Only allowed in `Init`; otherwise the controller is
    /// handed back inside the error.
    pub fn delete(self) -> Result<(), DeleteError<Self>> {
        let idle = self.with_inner(|inner| inner.require(StreamState::Init, "").is_ok());
        if !idle {
            return Err(DeleteError {
                controller: self,
                error: Error::InvalidState("delete needs the init state"),
            });
        }
        drop(self);
        Ok(())
    }

    // ── Internal buffer ─────────────────────────────────────────────────────

    /// The internal buffer. `count` must be 1.
    ///
    /// From now on frames that land in the internal buffer are reported
    /// through `on_trans_finished` like client buffers.
    pub fn get_internal_buffer(&self, count: usize) -> Result<Vec<DmaBuf, MAX_INTERNAL_BUFFERS>> {
        if count != MAX_INTERNAL_BUFFERS {
            return Err(Error::InvalidArgument("exactly one internal buffer exists"));
        }
        let fallback = self
            .fallback
            .ok_or(Error::InvalidState("no internal buffer"))?;
        self.with_inner(|inner| inner.exposed = true);
        let mut buffers = Vec::new();
        buffers
            .push(fallback)
            .map_err(|_| Error::NoMemory("internal buffer list full"))?;
        Ok(buffers)
    }

    /// Usable length of the internal buffer (one frame).
    pub fn get_buffer_length(&self) -> Result<usize> {
        if self.fallback.is_none() {
            return Err(Error::InvalidState("no internal buffer"));
        }
        self.with_inner(|inner| inner.exposed = true);
        Ok(self.frame_size)
    }

    // ── Interrupt side ──────────────────────────────────────────────────────

    /// Service the channel's interrupt. Call from the group vector.
    /// Returns "need yield".
    pub fn handle_interrupt(&self) -> bool {
        let events = self.channel.take_events();
        self.channel.dispatch(events, &Handoff(self))
    }

    fn on_invalid_block(&self, event: &BreakEvent) -> bool {
        warn!(
            "stream: {} invalid block at descriptor {}",
            D::LABEL,
            event.invalid_lli.get()
        );
        self.with_inner(|inner| {
            inner.stats.invalid_blocks = inner.stats.invalid_blocks.saturating_add(1);
        });
        self.channel.continue_after_invalid_block();
        false
    }

    fn on_frame_done(&self) -> bool {
        let handler = self.with_inner(|inner| {
            if !inner.running || inner.faulted {
                return None;
            }
            inner.stats.frames_completed = inner.stats.frames_completed.saturating_add(1);
            inner.handler
        });
        let Some(handler) = handler else {
            return false;
        };

        let mut next = Transaction::EMPTY;
        let mut need_yield = self.source.acquire(handler, &mut next);
        let next = self.usable_or_fallback(next);
        if let Some(next) = &next {
            self.prepare_for_engine(next);
        }

        let outcome = self.with_inner(|inner| {
            if !inner.running {
                return None;
            }
            let armed = match next {
                Some(next) => match self.arm(&next) {
                    Ok(()) => {
                        if self.is_fallback(&next) {
                            inner.stats.fallback_substitutions =
                                inner.stats.fallback_substitutions.saturating_add(1);
                        }
                        Some(next)
                    }
                    Err(_) => None,
                },
                None => None,
            };
            if armed.is_none() {
                inner.faulted = true;
            }
            let finished = core::mem::replace(&mut inner.current, armed.unwrap_or_default());
            Some((finished, armed.is_some(), inner.exposed))
        });
        let Some((finished, armed, exposed)) = outcome else {
            trace!("stream: {} stopped during handoff", D::LABEL);
            return need_yield;
        };
        if !armed {
            self.bridge.enable(false);
            error!(
                "stream: {} has no buffer to arm and no internal buffer, halting",
                D::LABEL
            );
        }

        if self.should_notify(&finished, exposed) {
            need_yield |= self.notify(handler, finished);
        }
        need_yield
    }

    fn notify(&self, handler: &H, mut finished: Transaction) -> bool {
        if let (Some(flags), Some(buf)) = (D::BEFORE_NOTIFY, finished.buffer) {
            if self.platform().sync(buf.addr(), self.frame_size, flags).is_err() {
                warn!("stream: {} cache invalidate failed", D::LABEL);
            }
        }
        finished.received_size = self.frame_size;
        self.with_inner(|inner| {
            inner.stats.frames_delivered = inner.stats.frames_delivered.saturating_add(1);
        });
        handler.on_trans_finished(&finished)
    }

    // ── Handoff helpers ─────────────────────────────────────────────────────

    fn is_fallback(&self, trans: &Transaction) -> bool {
        match (self.fallback, trans.buffer) {
            (Some(fallback), Some(buf)) => fallback.addr() == buf.addr(),
            _ => false,
        }
    }

    fn should_notify(&self, finished: &Transaction, exposed: bool) -> bool {
        finished.buffer.is_some() && (exposed || !self.is_fallback(finished))
    }

    /// `candidate` if it can hold a frame, else the internal buffer.
    fn usable_or_fallback(&self, candidate: Transaction) -> Option<Transaction> {
        match candidate.buffer {
            Some(buf) if buf.len() >= self.frame_size => Some(candidate),
            Some(_) => {
                warn!("stream: {} buffer shorter than one frame, dropped", D::LABEL);
                self.fallback.map(Transaction::new)
            }
            None => {
                let fallback = self.fallback.map(Transaction::new);
                if fallback.is_some() {
                    debug!("stream: {} no buffer ready, using the internal buffer", D::LABEL);
                }
                fallback
            }
        }
    }

    fn prepare_for_engine(&self, trans: &Transaction) {
        if let (Some(flags), Some(buf)) = (D::BEFORE_ARM, trans.buffer) {
            if self.platform().sync(buf.addr(), self.frame_size, flags).is_err() {
                warn!("stream: {} cache write-back failed", D::LABEL);
            }
        }
    }

    /// Point the descriptors at `trans`'s buffer and enable the channel.
    /// Runs inside the critical section, so only one context ever edits
    /// the descriptors.
    fn arm(&self, trans: &Transaction) -> Result<()> {
        let buf = trans
            .buffer
            .ok_or(Error::InvalidState("nothing to arm"))?;
        let base = self.platform().cached(buf.addr()).get();
        let per_item = self.config.max_block_items.saturating_mul(self.width.bytes());
        let fifo = EndpointTransfer::fifo(self.bridge.fifo_address(), self.width)
            .with_burst(self.config.burst);
        let last = self.list.len().saturating_sub(1);

        let mut offset = 0usize;
        for index in 0..self.list.len() {
            let item = self
                .list
                .item(index)
                .ok_or(Error::InvalidState("descriptor missing"))?;
            let size = self.frame_size.saturating_sub(offset).min(per_item);
            let memory = EndpointTransfer::memory(base.wrapping_add(offset), self.width)
                .with_burst(self.config.burst);
            item.configure_transfer(&D::chunk(fifo, memory, size))?;
            item.set_block_markers(BlockMarkers {
                enable_intr: index == last,
                is_last: index == last,
                is_valid: true,
            });
            offset = offset.saturating_add(size);
        }

        self.channel.use_link_list(&self.list)?;
        self.channel.enable(true);
        Ok(())
    }
}

impl<'d, P, B, H, const N: usize, D> StreamController<'d, P, B, H, QueueSource<N>, D>
where
    P: DmaPlatform,
    B: Bridge,
    H: StreamHandler + ?Sized,
    D: Direction,
{
    /// Queue a buffer for a future frame. See [`QueueSource::submit`].
    pub async fn submit(&self, trans: Transaction, timeout: Timeout) -> Result<()> {
        self.source.submit(trans, timeout).await
    }
}

impl<P, B, H, S, D> Drop for StreamController<'_, P, B, H, S, D>
where
    P: DmaPlatform,
    B: Bridge,
    H: StreamHandler + ?Sized,
    S: TransactionSource,
    D: Direction,
{
    fn drop(&mut self) {
        let (state, running) = self.with_inner(|inner| (inner.state, inner.running));
        if running {
            self.bridge.enable(false);
            self.channel.enable(false);
        }
        if state != StreamState::Init {
            self.platform().enable_source_clock(self.bridge.clock(), false);
        }
        debug!("stream: {} controller deleted", D::LABEL);
    }
}

// SAFETY: the link list is the only field that is not `Sync`; its items
// are written only by `arm`, which always runs inside the critical section
// guarding `inner`. Everything else is either immutable after creation or
// behind that same lock.
unsafe impl<P, B, H, S, D> Sync for StreamController<'_, P, B, H, S, D>
where
    P: DmaPlatform,
    B: Bridge + Sync,
    H: StreamHandler + Sync + ?Sized,
    S: TransactionSource + Sync,
    D: Direction,
{
}

/// Routes channel events into the handoff without making the controller
/// itself a public [`ChannelHandler`].
struct Handoff<'a, T>(&'a T);

impl<P, B, H, S, D> ChannelHandler for Handoff<'_, StreamController<'_, P, B, H, S, D>>
where
    P: DmaPlatform,
    B: Bridge,
    H: StreamHandler + ?Sized,
    S: TransactionSource,
    D: Direction,
{
    fn on_invalid_block(&self, event: &BreakEvent) -> bool {
        self.0.on_invalid_block(event)
    }

    fn on_full_done(&self, _events: ChannelEvents) -> bool {
        self.0.on_frame_done()
    }
}

fn state_name(state: StreamState) -> &'static str {
    match state {
        StreamState::Init => "init",
        StreamState::Enabled => "enabled",
        StreamState::Started => "started",
    }
}
