//! Group reference counting, channel id allocation and priority domains.

// Test files legitimately use arithmetic for verification; allow at file level.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]

use gdma::{Allocator, Channel, ChannelConfig, Error, ErrorKind};
use platform::mocks::MockPlatform;
use platform::{BlockType, ChannelAddr, EndpointConfig, GroupId, PeripheralId};
use proptest::prelude::*;

fn mem_to_mem() -> ChannelConfig {
    ChannelConfig::new(
        EndpointConfig::memory(BlockType::Contiguous),
        EndpointConfig::memory(BlockType::Contiguous),
    )
}

// ── Reference counting ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn ref_count_tracks_live_channels(
        order in (1usize..=8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let alloc = Allocator::new(MockPlatform::with_topology(2, 4));
        prop_assert!(!alloc.group_exists(GroupId(0)));
        prop_assert!(!alloc.group_exists(GroupId(1)));

        let mut live: Vec<Option<Channel<'_, MockPlatform>>> = order
            .iter()
            .map(|_| Some(Channel::new(&alloc, mem_to_mem()).unwrap()))
            .collect();

        for victim in order {
            live[victim] = None;
            for g in 0..2u8 {
                let expected = live
                    .iter()
                    .flatten()
                    .filter(|ch| ch.group() == GroupId(g))
                    .count();
                prop_assert_eq!(alloc.group_ref_count(GroupId(g)), expected);
                prop_assert_eq!(alloc.group_exists(GroupId(g)), expected > 0);
                prop_assert_eq!(alloc.platform().bus_clock_on(GroupId(g)), expected > 0);
            }
        }
        prop_assert!(!alloc.group_exists(GroupId(0)));
        prop_assert!(!alloc.group_exists(GroupId(1)));
    }
}

#[test]
fn exhausting_every_group_reports_not_found() {
    let alloc = Allocator::new(MockPlatform::with_topology(2, 2));
    let _held: Vec<_> = (0..4)
        .map(|_| Channel::new(&alloc, mem_to_mem()).unwrap())
        .collect();
    let err = Channel::new(&alloc, mem_to_mem()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(alloc.group_ref_count(GroupId(0)), 2);
    assert_eq!(alloc.group_ref_count(GroupId(1)), 2);
}

// ── Channel ids ──────────────────────────────────────────────────────────────

#[test]
fn live_channel_ids_are_unique_and_freed_ids_are_reused_once() {
    let alloc = Allocator::new(MockPlatform::with_topology(2, 4));
    let mut chans: Vec<_> = (0..4)
        .map(|_| Some(Channel::new(&alloc, mem_to_mem()).unwrap()))
        .collect();
    let mut ids: Vec<_> = chans.iter().flatten().map(|c| c.id().0).collect();
    ids.sort_unstable();
    assert_eq!(ids, [0, 1, 2, 3]);
    assert!(chans.iter().flatten().all(|c| c.group() == GroupId(0)));

    chans[1] = None;
    assert!(!alloc.is_channel_in_use(ChannelAddr::new(0, 1)));

    let reused = Channel::new(&alloc, mem_to_mem()).unwrap();
    assert_eq!(reused.addr(), ChannelAddr::new(0, 1));

    let spilled = Channel::new(&alloc, mem_to_mem()).unwrap();
    assert_eq!(spilled.addr(), ChannelAddr::new(1, 0));
}

// ── Interrupt priority domain ────────────────────────────────────────────────

#[test]
fn differing_nonzero_priority_conflicts() {
    let alloc = Allocator::new(MockPlatform::with_topology(1, 4));
    let _first = Channel::new(&alloc, mem_to_mem().with_intr_priority(2)).unwrap();
    let err = Channel::new(&alloc, mem_to_mem().with_intr_priority(3))
        .err()
        .unwrap();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    // The failed attempt gave its slot and group reference back.
    assert_eq!(alloc.group_ref_count(GroupId(0)), 1);
    assert!(Channel::new(&alloc, mem_to_mem().with_intr_priority(2)).is_ok());
}

#[test]
fn dont_care_priority_never_conflicts() {
    let alloc = Allocator::new(MockPlatform::with_topology(1, 4));
    let _a = Channel::new(&alloc, mem_to_mem().with_intr_priority(1)).unwrap();
    let _b = Channel::new(&alloc, mem_to_mem()).unwrap();
    let _c = Channel::new(&alloc, mem_to_mem().with_intr_priority(0)).unwrap();
    assert_eq!(alloc.group_priority(GroupId(0)), Some(1));
}

#[test]
fn installed_default_priority_becomes_the_group_priority() {
    let alloc = Allocator::new(MockPlatform::with_topology(1, 4));
    alloc.platform().set_default_priority(1);
    let mut first = Channel::new(&alloc, mem_to_mem()).unwrap();
    first
        .listen(platform::ChannelEvents::TRANSFER_DONE)
        .unwrap();
    assert_eq!(alloc.group_priority(GroupId(0)), Some(1));
    assert!(matches!(
        Channel::new(&alloc, mem_to_mem().with_intr_priority(3)),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn priority_is_forgotten_with_the_group() {
    let alloc = Allocator::new(MockPlatform::with_topology(1, 4));
    drop(Channel::new(&alloc, mem_to_mem().with_intr_priority(2)).unwrap());
    assert_eq!(alloc.group_priority(GroupId(0)), None);
    assert!(Channel::new(&alloc, mem_to_mem().with_intr_priority(3)).is_ok());
}

#[test]
fn failed_creation_leaves_the_group_priority_alone() {
    let alloc = Allocator::new(MockPlatform::with_topology(1, 4));
    let _keeps_group_up = Channel::new(&alloc, mem_to_mem()).unwrap();
    let _taken = alloc.claim_peripheral(PeripheralId(5)).unwrap();

    let to_taken_peripheral = ChannelConfig::new(
        EndpointConfig::memory(BlockType::Contiguous),
        EndpointConfig::peripheral(PeripheralId(5), BlockType::Contiguous),
    )
    .with_intr_priority(2);
    assert!(matches!(
        Channel::new(&alloc, to_taken_peripheral),
        Err(Error::Conflict(_))
    ));

    assert_eq!(alloc.group_priority(GroupId(0)), None);
    assert!(Channel::new(&alloc, mem_to_mem().with_intr_priority(3)).is_ok());
    assert_eq!(alloc.group_priority(GroupId(0)), Some(3));
}
