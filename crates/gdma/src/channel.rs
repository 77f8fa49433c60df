//! DMA channels.
//!
//! A [`Channel`] is one execution lane, owned by exactly one client for
//! its lifetime. Creating it registers a slot with the [`Allocator`]
//! (which acquires the group) and claims any peripheral handshake
//! interface it is wired to; dropping it undoes both.
//!
//! # Locking
//!
//! `enable`, `suspend`, `abort`, `lock` and `continue_after_invalid_block`
//! are single atomic register writes and take `&self`; they may be called
//! from interrupt context. Everything that rewrites configuration takes
//! `&mut self` and is refused while the channel is enabled.
//!
//! # Interrupts
//!
//! The group vector is shared by all channels of a group and installed
//! lazily on the first [`Channel::listen`] /
//! [`Channel::register_event_callbacks`]. The platform's vector calls
//! [`Channel::handle_interrupt`] for each live channel; events are
//! dispatched in a fixed order (invalid block, block done, full done).

use platform::{
    BlockProgram, BlockType, ChannelAddr, ChannelEvents, ChannelId, ChannelSetup, DmaPlatform,
    EndpointConfig, FlowController, GroupId, Handshake, LockLevel, Role, UncachedAddr,
};

use crate::allocator::{Allocator, ChannelSlot, PeripheralClaim};
use crate::config::{MAX_INTR_PRIORITY, MAX_OUTSTANDING_REQUESTS, MAX_PERIPHERALS};
use crate::error::{Error, Result};
use crate::link_list::LinkList;
use crate::transfer::{block_ts, BlockMarkers, Control, TransferConfig};

// ── Configuration ────────────────────────────────────────────────────────────

/// Static channel configuration, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Source end.
    pub src: EndpointConfig,
    /// Destination end.
    pub dst: EndpointConfig,
    /// Who decides the block length.
    pub flow_controller: FlowController,
    /// Arbitration priority, below the number of channels per group.
    pub channel_priority: u8,
    /// Interrupt priority, 1..=3, or 0 for "don't care".
    pub intr_priority: u8,
    /// Handlers must live in ISR-safe memory (cache may be off while the
    /// interrupt runs).
    pub isr_cache_safe: bool,
}

impl ChannelConfig {
    /// Configuration with DMA flow control and default priorities.
    pub const fn new(src: EndpointConfig, dst: EndpointConfig) -> Self {
        Self {
            src,
            dst,
            flow_controller: FlowController::Dma,
            channel_priority: 0,
            intr_priority: 0,
            isr_cache_safe: false,
        }
    }

    /// Set the flow controller.
    #[must_use]
    pub const fn with_flow_controller(mut self, flow: FlowController) -> Self {
        self.flow_controller = flow;
        self
    }

    /// Set the arbitration priority.
    #[must_use]
    pub const fn with_channel_priority(mut self, priority: u8) -> Self {
        self.channel_priority = priority;
        self
    }

    /// Set the interrupt priority.
    #[must_use]
    pub const fn with_intr_priority(mut self, priority: u8) -> Self {
        self.intr_priority = priority;
        self
    }

    /// Require ISR-safe handler placement.
    #[must_use]
    pub const fn with_isr_cache_safe(mut self, safe: bool) -> Self {
        self.isr_cache_safe = safe;
        self
    }

    /// Transfer-type tag: the most capable block type of the two ends
    /// (link-list > shadow > reload > contiguous).
    pub fn transfer_mode(&self) -> BlockType {
        self.src.block_type.max(self.dst.block_type)
    }

    fn validate(&self, channels_per_group: u8) -> Result<()> {
        for end in [&self.src, &self.dst] {
            if end.outstanding_requests == 0 || end.outstanding_requests > MAX_OUTSTANDING_REQUESTS {
                return Err(Error::InvalidArgument("outstanding requests out of range"));
            }
            match end.role {
                Role::Memory if end.handshake == Handshake::Hardware => {
                    return Err(Error::InvalidArgument(
                        "memory end cannot use hardware handshake",
                    ));
                }
                Role::Peripheral(id) if usize::from(id.0) >= MAX_PERIPHERALS => {
                    return Err(Error::InvalidArgument("peripheral id out of range"));
                }
                _ => {}
            }
        }
        if self.channel_priority >= channels_per_group {
            return Err(Error::InvalidArgument("channel priority out of range"));
        }
        if self.intr_priority > MAX_INTR_PRIORITY {
            return Err(Error::InvalidArgument("interrupt priority out of range"));
        }
        Ok(())
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Data passed to [`ChannelHandler::on_invalid_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BreakEvent {
    /// Raw status that triggered the break.
    pub events: ChannelEvents,
    /// Descriptor the channel stopped on (non-cacheable alias), null in
    /// non-list modes.
    pub invalid_lli: UncachedAddr,
}

/// Per-channel interrupt callbacks.
///
/// Called from interrupt context. Each returns `true` if it woke a task
/// of higher priority than the interrupted one.
pub trait ChannelHandler {
    /// A descriptor or shadow set was not valid, or a bus error hit.
    /// The channel is stalled until
    /// [`Channel::continue_after_invalid_block`] or a disable.
    fn on_invalid_block(&self, _event: &BreakEvent) -> bool {
        false
    }

    /// One block finished (shadow / list modes, block markers with IOC).
    fn on_block_done(&self, _events: ChannelEvents) -> bool {
        false
    }

    /// The whole multi-block transfer finished; the channel disabled
    /// itself.
    fn on_full_done(&self, _events: ChannelEvents) -> bool {
        false
    }

    /// Sources to unmask when this handler is registered.
    fn interests(&self) -> ChannelEvents {
        ChannelEvents::TRANSFER_DONE.union(ChannelEvents::INVALID_BLOCK)
    }
}

// ── Channel ──────────────────────────────────────────────────────────────────

/// One DMA channel.
pub struct Channel<'d, P: DmaPlatform> {
    alloc: &'d Allocator<P>,
    // Field order is drop order: claims are released before the slot,
    // and the slot before the group reference it carries.
    _claims: [Option<PeripheralClaim<'d, P>>; 2],
    slot: ChannelSlot<'d, P>,
    config: ChannelConfig,
    handler: Option<&'d (dyn ChannelHandler + Sync)>,
    last_block: Option<BlockProgram>,
    listening: ChannelEvents,
}

impl<'d, P: DmaPlatform> Channel<'d, P> {
    /// Allocate and configure a channel.
    ///
    /// Sub-resources are held in guards while they are acquired, so any
    /// failure releases everything taken so far.
    pub fn new(alloc: &'d Allocator<P>, config: ChannelConfig) -> Result<Self> {
        let platform = alloc.platform();
        config.validate(platform.channels_per_group())?;

        let slot = alloc.register_channel()?;
        let addr = slot.addr();
        let claims = [Self::claim(alloc, config.src.role)?, Self::claim(alloc, config.dst.role)?];
        // Reserved last: a reservation is never rolled back.
        alloc.reserve_priority(addr.group, config.intr_priority)?;

        platform.configure_channel(
            addr,
            &ChannelSetup {
                src: config.src,
                dst: config.dst,
                flow_controller: config.flow_controller,
                priority: config.channel_priority,
            },
        );
        platform.set_interrupt_mask(addr, ChannelEvents::NONE);
        debug!("gdma: channel ({},{}) created", addr.group.0, addr.channel.0);

        Ok(Self {
            alloc,
            _claims: claims,
            slot,
            config,
            handler: None,
            last_block: None,
            listening: ChannelEvents::NONE,
        })
    }

    fn claim(alloc: &'d Allocator<P>, role: Role) -> Result<Option<PeripheralClaim<'d, P>>> {
        match role {
            Role::Memory => Ok(None),
            Role::Peripheral(id) => alloc.claim_peripheral(id).map(Some),
        }
    }

    /// Disable and release the channel. Same as dropping it.
    pub fn delete(self) {}

    fn platform(&self) -> &'d P {
        self.alloc.platform()
    }

    /// Full address.
    pub fn addr(&self) -> ChannelAddr {
        self.slot.addr()
    }

    /// Channel index within its group.
    pub fn id(&self) -> ChannelId {
        self.slot.addr().channel
    }

    /// Owning group.
    pub fn group(&self) -> GroupId {
        self.slot.addr().group
    }

    /// Static configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Transfer-type tag.
    pub fn transfer_mode(&self) -> BlockType {
        self.config.transfer_mode()
    }

    /// Interrupt sources currently unmasked.
    pub fn listening(&self) -> ChannelEvents {
        self.listening
    }

    fn ensure_disabled(&self) -> Result<()> {
        if self.platform().is_enabled(self.addr()) {
            return Err(Error::InvalidState("channel is running"));
        }
        Ok(())
    }

    // ── Transfer setup ──────────────────────────────────────────────────────

    /// Load a single block (contiguous, reload and shadow modes).
    ///
    /// Markers start cleared; set them with [`Self::set_block_markers`].
    pub fn configure_transfer(&mut self, config: &TransferConfig) -> Result<()> {
        if self.transfer_mode() == BlockType::LinkList {
            return Err(Error::InvalidState(
                "link-list channels are configured per descriptor",
            ));
        }
        self.ensure_disabled()?;
        let items = config.block_items()?;
        let block = BlockProgram {
            src: config.src.addr as u64,
            dst: config.dst.addr as u64,
            block_ts: block_ts(items),
            control: config.control(BlockMarkers::default()).0,
        };
        self.platform().load_block(self.addr(), &block);
        self.last_block = Some(block);
        Ok(())
    }

    /// Update the markers of the block loaded by
    /// [`Self::configure_transfer`].
    pub fn set_block_markers(&mut self, markers: BlockMarkers) -> Result<()> {
        if self.transfer_mode() == BlockType::LinkList {
            return Err(Error::InvalidState("link-list markers live in the descriptors"));
        }
        let block = self
            .last_block
            .as_mut()
            .ok_or(Error::InvalidState("no block configured"))?;
        block.control = Control(block.control).with_markers(markers).0;
        let block = *block;
        self.platform().load_block(self.addr(), &block);
        Ok(())
    }

    /// Bind a descriptor chain (one LLP register write).
    ///
    /// The chain must stay alive, and unmodified except through its
    /// handles, for as long as the channel may execute it. A singly linked
    /// chain has to be bound again before every re-enable, since the
    /// engine advances the LLP register as it walks.
    pub fn use_link_list(&self, list: &LinkList<'_>) -> Result<()> {
        if self.transfer_mode() != BlockType::LinkList {
            return Err(Error::InvalidState("channel is not in link-list mode"));
        }
        self.ensure_disabled()?;
        self.platform().set_link_list_head(self.addr(), list.head());
        Ok(())
    }

    // ── Run control (hardware-atomic) ───────────────────────────────────────

    /// Arm or disarm. Hardware clears the enable bit by itself once the
    /// transfer completes. Disabling is the graceful stop; prefer it over
    /// [`Self::abort`].
    pub fn enable(&self, on: bool) {
        self.platform().set_enable(self.addr(), on);
    }

    /// Current enable bit.
    pub fn is_enabled(&self) -> bool {
        self.platform().is_enabled(self.addr())
    }

    /// Suspend or resume.
    pub fn suspend(&self, on: bool) {
        self.platform().set_suspend(self.addr(), on);
    }

    /// Abort the channel.
    ///
    /// Last resort for a hung channel only: it can break the peripheral
    /// bus protocol. Try `enable(false)` first.
    pub fn abort(&self) {
        warn!("gdma: aborting channel ({},{})", self.group().0, self.id().0);
        self.platform().abort(self.addr());
    }

    /// Lock the bus for the given scope.
    pub fn lock(&self, level: LockLevel) {
        self.platform().set_lock(self.addr(), Some(level));
    }

    /// Release the bus lock.
    pub fn unlock(&self) {
        self.platform().set_lock(self.addr(), None);
    }

    /// Resume after an invalid-block stall once the offending descriptor
    /// or shadow set has been fixed.
    pub fn continue_after_invalid_block(&self) {
        self.platform().resume_block(self.addr());
    }

    // ── Interrupts ──────────────────────────────────────────────────────────

    /// Unmask `events`, installing the group vector first if needed.
    pub fn listen(&mut self, events: ChannelEvents) -> Result<()> {
        self.alloc.install_group_interrupt(self.group())?;
        self.platform().set_interrupt_mask(self.addr(), events);
        self.listening = events;
        Ok(())
    }

    /// Register the callback set and unmask the sources it wants.
    ///
    /// With `isr_cache_safe` the handler object must live in ISR-safe
    /// memory; this is checked before the vector is installed.
    pub fn register_event_callbacks(
        &mut self,
        handler: &'d (dyn ChannelHandler + Sync),
    ) -> Result<()> {
        if self.config.isr_cache_safe {
            let addr = core::ptr::from_ref(handler).cast::<()>() as usize;
            if !self.platform().is_isr_safe(addr) {
                return Err(Error::InvalidArgument("handler not in ISR-safe memory"));
            }
        }
        self.listen(handler.interests())?;
        self.handler = Some(handler);
        Ok(())
    }

    /// Read and clear the pending status.
    pub fn take_events(&self) -> ChannelEvents {
        self.platform().take_events(self.addr())
    }

    /// Service this channel's share of the group interrupt.
    pub fn handle_interrupt(&self) -> bool {
        let events = self.take_events();
        match self.handler {
            Some(handler) => self.dispatch(events, handler),
            None => false,
        }
    }

    /// Dispatch already-cleared `events` to `handler` in fixed order:
    /// invalid block (or bus error), block done, full done. Returns the OR
    /// of the handler results.
    pub fn dispatch<H>(&self, events: ChannelEvents, handler: &H) -> bool
    where
        H: ChannelHandler + ?Sized,
    {
        let mut need_yield = false;
        if events.invalid_block() || events.has_error() {
            let platform = self.platform();
            let event = BreakEvent {
                events,
                invalid_lli: platform
                    .current_link_list_item(self.addr())
                    .to_uncached(platform),
            };
            need_yield |= handler.on_invalid_block(&event);
        }
        if events.block_done() {
            need_yield |= handler.on_block_done(events);
        }
        if events.transfer_done() {
            need_yield |= handler.on_full_done(events);
        }
        need_yield
    }
}

impl<P: DmaPlatform> Drop for Channel<'_, P> {
    fn drop(&mut self) {
        let addr = self.addr();
        let platform = self.platform();
        platform.set_interrupt_mask(addr, ChannelEvents::NONE);
        platform.set_enable(addr, false);
        debug!("gdma: channel ({},{}) deleted", addr.group.0, addr.channel.0);
    }
}
