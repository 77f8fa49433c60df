//! Channel configuration rules, run control and interrupt dispatch.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]

use std::sync::Mutex;

use gdma::{
    Allocator, BlockMarkers, BreakEvent, Channel, ChannelConfig, ChannelHandler, Control,
    EndpointTransfer, Error, LinkList, LinkListItem, LinkType, TransferConfig,
};
use platform::mocks::{MockPlatform, Op};
use platform::{
    AddressMap, BlockType, ChannelEvents, EndpointConfig, GroupId, Handshake,
    LockLevel, PeripheralId, TransferWidth,
};

fn config(src: BlockType, dst: BlockType) -> ChannelConfig {
    ChannelConfig::new(EndpointConfig::memory(src), EndpointConfig::memory(dst))
}

fn block(size: usize) -> TransferConfig {
    TransferConfig {
        src: EndpointTransfer::memory(0x4000_0000, TransferWidth::Bits32),
        dst: EndpointTransfer::memory(0x4800_0000, TransferWidth::Bits32),
        size,
    }
}

// ── Static configuration ─────────────────────────────────────────────────────

#[test]
fn out_of_range_configuration_is_rejected() {
    let alloc = Allocator::new(MockPlatform::new());
    let base = config(BlockType::Contiguous, BlockType::Contiguous);

    let mut bad = base;
    bad.src.outstanding_requests = 0;
    assert!(matches!(Channel::new(&alloc, bad), Err(Error::InvalidArgument(_))));

    bad = base;
    bad.dst.outstanding_requests = 17;
    assert!(matches!(Channel::new(&alloc, bad), Err(Error::InvalidArgument(_))));

    assert!(matches!(
        Channel::new(&alloc, base.with_channel_priority(4)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Channel::new(&alloc, base.with_intr_priority(4)),
        Err(Error::InvalidArgument(_))
    ));

    bad = base;
    bad.src.handshake = Handshake::Hardware;
    assert!(matches!(Channel::new(&alloc, bad), Err(Error::InvalidArgument(_))));

    // Nothing was allocated by any of the failed attempts.
    assert!(!alloc.group_exists(GroupId(0)));
    assert!(Channel::new(&alloc, base.with_channel_priority(3)).is_ok());
}

#[test]
fn channel_setup_reaches_the_registers() {
    let alloc = Allocator::new(MockPlatform::new());
    let cfg = ChannelConfig::new(
        EndpointConfig::peripheral(PeripheralId(2), BlockType::Contiguous).with_outstanding(4),
        EndpointConfig::memory(BlockType::LinkList).with_outstanding(16),
    )
    .with_channel_priority(1);
    let ch = Channel::new(&alloc, cfg).unwrap();
    let setup = alloc.platform().channel_setup(ch.addr()).unwrap();
    assert_eq!(setup.src, cfg.src);
    assert_eq!(setup.dst, cfg.dst);
    assert_eq!(setup.priority, 1);
    assert_eq!(ch.transfer_mode(), BlockType::LinkList);
}

#[test]
fn a_peripheral_interface_can_only_be_claimed_once() {
    let alloc = Allocator::new(MockPlatform::new());
    let cam = ChannelConfig::new(
        EndpointConfig::peripheral(PeripheralId(5), BlockType::Contiguous),
        EndpointConfig::memory(BlockType::LinkList),
    );
    let first = Channel::new(&alloc, cam).unwrap();
    assert!(matches!(Channel::new(&alloc, cam), Err(Error::Conflict(_))));
    assert_eq!(alloc.group_ref_count(GroupId(0)), 1);
    drop(first);
    assert!(Channel::new(&alloc, cam).is_ok());
}

// ── Transfer setup ───────────────────────────────────────────────────────────

#[test]
fn single_block_transfer_is_loaded() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Contiguous)).unwrap();
    ch.configure_transfer(&block(4096)).unwrap();
    let loaded = alloc.platform().loaded_block(ch.addr()).unwrap();
    assert_eq!(loaded.src, 0x4000_0000);
    assert_eq!(loaded.dst, 0x4800_0000);
    assert_eq!(loaded.block_ts, 1023);
    assert_eq!(Control(loaded.control).markers(), BlockMarkers::default());
}

#[test]
fn indivisible_size_is_rejected() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Contiguous)).unwrap();
    assert!(matches!(ch.configure_transfer(&block(4097)), Err(Error::InvalidArgument(_))));
}

#[test]
fn link_list_channel_refuses_single_block_setup() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::LinkList)).unwrap();
    assert!(matches!(ch.configure_transfer(&block(64)), Err(Error::InvalidState(_))));
    assert!(matches!(
        ch.set_block_markers(BlockMarkers::default()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn running_channel_refuses_reconfiguration() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Shadow, BlockType::Contiguous)).unwrap();
    ch.enable(true);
    assert!(matches!(ch.configure_transfer(&block(64)), Err(Error::InvalidState(_))));
    ch.enable(false);
    assert!(ch.configure_transfer(&block(64)).is_ok());
}

#[test]
fn shadow_markers_reload_the_block() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Shadow, BlockType::Contiguous)).unwrap();
    assert!(matches!(
        ch.set_block_markers(BlockMarkers::default()),
        Err(Error::InvalidState(_))
    ));
    ch.configure_transfer(&block(256)).unwrap();
    let markers = BlockMarkers {
        enable_intr: true,
        is_last: false,
        is_valid: true,
    };
    ch.set_block_markers(markers).unwrap();
    let loaded = alloc.platform().loaded_block(ch.addr()).unwrap();
    assert_eq!(Control(loaded.control).markers(), markers);
    assert_eq!(loaded.block_ts, 63);
}

#[test]
fn link_list_binding_requires_list_mode() {
    let alloc = Allocator::new(MockPlatform::new());
    let mut storage = [LinkListItem::EMPTY; 2];
    let list = LinkList::new(alloc.platform(), &mut storage, LinkType::Circular).unwrap();

    let mut plain = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Reload)).unwrap();
    assert!(matches!(plain.use_link_list(&list), Err(Error::InvalidState(_))));

    let mut listed = Channel::new(&alloc, config(BlockType::LinkList, BlockType::Contiguous)).unwrap();
    listed.use_link_list(&list).unwrap();
    assert_eq!(
        alloc.platform().ops().last(),
        Some(&Op::SetLinkListHead {
            ch: listed.addr(),
            head: list.head()
        })
    );
}

// ── Run control ──────────────────────────────────────────────────────────────

#[test]
fn run_control_writes_through() {
    let alloc = Allocator::new(MockPlatform::new());
    let ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Contiguous)).unwrap();
    let p = alloc.platform();

    ch.suspend(true);
    assert!(p.is_suspended(ch.addr()));
    ch.suspend(false);
    ch.lock(LockLevel::Block);
    assert_eq!(p.lock_level(ch.addr()), Some(LockLevel::Block));
    ch.unlock();
    assert_eq!(p.lock_level(ch.addr()), None);
    ch.continue_after_invalid_block();
    assert_eq!(p.ops().last(), Some(&Op::ResumeBlock(ch.addr())));

    ch.enable(true);
    assert!(ch.is_enabled());
    ch.abort();
    assert!(!ch.is_enabled());
}

#[test]
fn drop_masks_and_disables() {
    let alloc = Allocator::new(MockPlatform::new());
    let ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Contiguous)).unwrap();
    let addr = ch.addr();
    ch.enable(true);
    alloc.platform().clear_ops();
    ch.delete();
    let ops = alloc.platform().ops();
    assert_eq!(
        ops[..2],
        [
            Op::SetInterruptMask {
                ch: addr,
                events: ChannelEvents::NONE
            },
            Op::SetEnable { ch: addr, on: false },
        ]
    );
    assert!(!alloc.group_exists(GroupId(0)));
}

// ── Interrupt dispatch ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<&'static str>>,
    last_break: Mutex<Option<BreakEvent>>,
    yield_on_block: bool,
}

impl ChannelHandler for Recorder {
    fn on_invalid_block(&self, event: &BreakEvent) -> bool {
        self.calls.lock().unwrap().push("invalid");
        *self.last_break.lock().unwrap() = Some(*event);
        false
    }

    fn on_block_done(&self, _events: ChannelEvents) -> bool {
        self.calls.lock().unwrap().push("block");
        self.yield_on_block
    }

    fn on_full_done(&self, _events: ChannelEvents) -> bool {
        self.calls.lock().unwrap().push("full");
        false
    }

    fn interests(&self) -> ChannelEvents {
        ChannelEvents::TRANSFER_DONE
            .union(ChannelEvents::BLOCK_DONE)
            .union(ChannelEvents::INVALID_BLOCK)
    }
}

#[test]
fn events_dispatch_in_fixed_order_and_yield_is_ored() {
    let handler = Recorder {
        yield_on_block: true,
        ..Recorder::default()
    };
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::LinkList, BlockType::Contiguous)).unwrap();
    ch.register_event_callbacks(&handler).unwrap();
    assert_eq!(alloc.platform().installed_priority(GroupId(0)), Some(1));

    let all = ChannelEvents::TRANSFER_DONE
        .union(ChannelEvents::BLOCK_DONE)
        .union(ChannelEvents::INVALID_BLOCK);
    alloc.platform().raise(ch.addr(), all);
    assert!(ch.handle_interrupt());
    assert_eq!(*handler.calls.lock().unwrap(), ["invalid", "block", "full"]);

    // Status was cleared by the first pass.
    assert!(!ch.handle_interrupt());
    assert_eq!(handler.calls.lock().unwrap().len(), 3);
}

#[test]
fn break_event_reports_the_stalled_descriptor_uncached() {
    let handler = Recorder::default();
    let alloc = Allocator::new(MockPlatform::new());
    let mut storage = [LinkListItem::EMPTY; 4];
    let list = LinkList::new(alloc.platform(), &mut storage, LinkType::Singly).unwrap();
    let mut ch = Channel::new(&alloc, config(BlockType::LinkList, BlockType::Contiguous)).unwrap();
    ch.use_link_list(&list).unwrap();
    ch.register_event_callbacks(&handler).unwrap();

    let stalled = list.item(2).unwrap();
    alloc
        .platform()
        .set_current_link_list_item(ch.addr(), stalled.cached_address());
    alloc.platform().raise(ch.addr(), ChannelEvents::INVALID_BLOCK);
    assert!(!ch.handle_interrupt());

    let event = handler.last_break.lock().unwrap().unwrap();
    assert_eq!(event.invalid_lli, stalled.address());
    assert_eq!(list.index_of(event.invalid_lli), Some(2));
    assert_ne!(
        event.invalid_lli.get(),
        alloc.platform().cached(event.invalid_lli.get()).get()
    );
}

#[test]
fn isr_unsafe_handler_is_rejected_before_install() {
    let handler = Recorder::default();
    let alloc = Allocator::new(MockPlatform::new());
    alloc.platform().set_isr_safe(false);
    let mut ch = Channel::new(
        &alloc,
        config(BlockType::Contiguous, BlockType::Contiguous).with_isr_cache_safe(true),
    )
    .unwrap();
    assert!(matches!(
        ch.register_event_callbacks(&handler),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(alloc.platform().installed_priority(GroupId(0)), None);
    assert!(!ch.handle_interrupt());
}

#[test]
fn failed_vector_install_is_reported() {
    let handler = Recorder::default();
    let alloc = Allocator::new(MockPlatform::new());
    let mut ch = Channel::new(&alloc, config(BlockType::Contiguous, BlockType::Contiguous)).unwrap();
    alloc.platform().fail_next_install();
    assert!(matches!(
        ch.register_event_callbacks(&handler),
        Err(Error::NotFound(_))
    ));
    assert!(ch.register_event_callbacks(&handler).is_ok());
    assert_eq!(
        alloc.platform().interrupt_mask(ch.addr()),
        handler.interests()
    );
}
