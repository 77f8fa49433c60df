//! Refresh controller: memory → bridge direction specifics.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]

mod common;

use common::*;
use gdma::{Allocator, LinkListItem};
use platform::mocks::{MockBridge, MockPlatform, Op};
use platform::{BlockType, BridgeTransfer, BurstItems, ChannelEvents, Role, SyncFlags, TransferWidth};
use stream::{PullSource, RefreshController};

#[test]
fn memory_end_walks_the_list_and_bridge_end_is_the_peripheral() {
    let alloc = Allocator::new(MockPlatform::new());
    let bridge = MockBridge::new(alloc.platform(), BRIDGE_PERIPHERAL, BRIDGE_CLOCK);
    let mut lli = [LinkListItem::EMPTY; 1];

    let panel: RefreshController<'_, _, _, Recorder<'_>> =
        RefreshController::new(&alloc, &bridge, PullSource, config(), &mut lli, None).unwrap();
    let setup = alloc.platform().channel_setup(panel.channel().addr()).unwrap();
    assert_eq!(setup.src.role, Role::Memory);
    assert_eq!(setup.src.block_type, BlockType::LinkList);
    assert_eq!(setup.dst.role, Role::Peripheral(BRIDGE_PERIPHERAL));
    assert_eq!(setup.src.outstanding_requests, config().outstanding);
    assert_eq!(panel.channel().transfer_mode(), BlockType::LinkList);
}

#[test]
fn buffers_are_written_back_before_the_engine_reads_them() {
    let alloc = Allocator::new(MockPlatform::new());
    let bridge = MockBridge::new(alloc.platform(), BRIDGE_PERIPHERAL, BRIDGE_CLOCK);
    let handler = Recorder::new(alloc.platform());
    let (a, b) = (user_buffer(FRAME), user_buffer(FRAME));
    handler.offer(a);
    handler.offer(b);
    let mut lli = [LinkListItem::EMPTY; 1];

    let panel: RefreshController<'_, _, _, Recorder<'_>> =
        RefreshController::new(&alloc, &bridge, PullSource, config(), &mut lli, None).unwrap();
    panel.register_event_callbacks(&handler).unwrap();
    panel.enable().unwrap();

    let platform = alloc.platform();
    let written_back = |buf: stream::DmaBuf| {
        move |op: &Op| {
            matches!(op, Op::Sync { addr, len, flags }
                if *addr == buf.addr()
                    && *len == FRAME
                    && *flags == SyncFlags::WRITEBACK.allow_unaligned())
        }
    };

    panel.start().unwrap();
    let synced_a = platform.position(written_back(a)).unwrap();
    let armed_a = platform
        .position(|op| matches!(op, Op::Arm { src, .. } if *src == engine_addr(platform, a)))
        .unwrap();
    assert!(synced_a < armed_a);

    platform.clear_ops();
    platform.raise(panel.channel().addr(), ChannelEvents::TRANSFER_DONE);
    panel.handle_interrupt();

    let synced_b = platform.position(written_back(b)).unwrap();
    let armed_b = platform
        .position(|op| matches!(op, Op::Arm { src, .. } if *src == engine_addr(platform, b)))
        .unwrap();
    let notified = platform.position(|op| *op == Op::Note("finished")).unwrap();
    assert!(synced_b < armed_b);
    assert!(armed_b < notified);

    // Nothing to invalidate in this direction.
    assert!(platform
        .position(|op| matches!(op, Op::Sync { flags, .. } if flags.invalidate))
        .is_none());
    assert_eq!(handler.finished_addrs(), [a.addr()]);
}

#[test]
fn bridge_is_programmed_then_enabled_after_the_channel() {
    let alloc = Allocator::new(MockPlatform::new());
    let bridge = MockBridge::new(alloc.platform(), BRIDGE_PERIPHERAL, BRIDGE_CLOCK)
        .with_bus_width(TransferWidth::Bits64);
    let handler = Recorder::new(alloc.platform());
    handler.offer(user_buffer(FRAME));
    let mut lli = [LinkListItem::EMPTY; 1];

    let panel: RefreshController<'_, _, _, Recorder<'_>> = RefreshController::new(
        &alloc,
        &bridge,
        PullSource,
        config().with_burst(BurstItems::Items8),
        &mut lli,
        None,
    )
    .unwrap();
    panel.register_event_callbacks(&handler).unwrap();
    panel.enable().unwrap();
    let platform = alloc.platform();
    platform.clear_ops();
    panel.start().unwrap();

    let ch = panel.channel().addr();
    let channel_on = platform
        .position(|op| *op == Op::SetEnable { ch, on: true })
        .unwrap();
    let configured = platform
        .position(|op| {
            *op == Op::BridgeConfigure {
                peripheral: BRIDGE_PERIPHERAL,
                transfer: BridgeTransfer {
                    frame_size: FRAME,
                    burst: BurstItems::Items8,
                    width: TransferWidth::Bits64,
                },
            }
        })
        .unwrap();
    let bridge_on = platform
        .position(|op| {
            *op == Op::BridgeEnable {
                peripheral: BRIDGE_PERIPHERAL,
                on: true,
            }
        })
        .unwrap();
    assert!(channel_on < configured);
    assert!(configured < bridge_on);

    platform.clear_ops();
    panel.stop().unwrap();
    let bridge_off = platform
        .position(|op| {
            *op == Op::BridgeEnable {
                peripheral: BRIDGE_PERIPHERAL,
                on: false,
            }
        })
        .unwrap();
    let channel_off = platform
        .position(|op| *op == Op::SetEnable { ch, on: false })
        .unwrap();
    assert!(bridge_off < channel_off);
}
