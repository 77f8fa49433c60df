//! Process-wide table of DMA groups.
//!
//! One [`Allocator`] exists per SoC, usually in a `static`. It hands out
//! channel slots, reference-counts the groups that contain them, brings a
//! group's clock and reset domain up on first use and gates it off when
//! the last channel goes away.
//!
//! Every table access runs inside one `critical_section`. The sections are
//! O(1): a slot scan over at most [`MAX_CHANNELS_PER_GROUP`] booleans plus,
//! at bring-up or teardown, a handful of single register writes.
//!
//! ```text
//!  register_channel ──► acquire_group(0) ──► free slot? ──yes──► ChannelSlot
//!                              │                 │no
//!                              │            drop GroupRef (release)
//!                              ▼
//!                       acquire_group(1) ... ──► NotFound
//! ```

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use platform::{ChannelAddr, ChannelId, DmaPlatform, GroupId, PeripheralId};

use crate::config::{MAX_CHANNELS_PER_GROUP, MAX_GROUPS, MAX_PERIPHERALS};
use crate::error::{Error, Result};

// ── Table ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct GroupSlot {
    refs: u16,
    channels: [bool; MAX_CHANNELS_PER_GROUP],
    /// 0 until a channel requests a priority or the vector is installed.
    intr_priority: u8,
    intr_installed: bool,
}

impl GroupSlot {
    const fn new() -> Self {
        Self {
            refs: 0,
            channels: [false; MAX_CHANNELS_PER_GROUP],
            intr_priority: 0,
            intr_installed: false,
        }
    }
}

#[derive(Debug)]
struct GroupTable {
    groups: [Option<GroupSlot>; MAX_GROUPS],
    /// One bit per claimed handshake interface.
    peripherals: u32,
}

impl GroupTable {
    const fn new() -> Self {
        Self {
            groups: [None; MAX_GROUPS],
            peripherals: 0,
        }
    }

    fn slot(&self, id: GroupId) -> Option<&GroupSlot> {
        self.groups.get(id.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: GroupId) -> Option<&mut GroupSlot> {
        self.groups.get_mut(id.index()).and_then(Option::as_mut)
    }
}

// ── Allocator ────────────────────────────────────────────────────────────────

/// Channel and group allocator.
pub struct Allocator<P> {
    platform: P,
    table: Mutex<RefCell<GroupTable>>,
}

impl<P: DmaPlatform> Allocator<P> {
    /// Wrap the platform. No hardware is touched until the first
    /// group is acquired.
    pub const fn new(platform: P) -> Self {
        Self {
            platform,
            table: Mutex::new(RefCell::new(GroupTable::new())),
        }
    }

    /// The wrapped platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn with_table<R>(&self, f: impl FnOnce(CriticalSection<'_>, &mut GroupTable) -> R) -> R {
        critical_section::with(|cs| f(cs, &mut self.table.borrow_ref_mut(cs)))
    }

    fn group_count(&self) -> u8 {
        let max = u8::try_from(MAX_GROUPS).unwrap_or(u8::MAX);
        self.platform.group_count().min(max)
    }

    fn channels_per_group(&self) -> usize {
        usize::from(self.platform.channels_per_group()).min(MAX_CHANNELS_PER_GROUP)
    }

    /// Take a reference on group `id`, bringing it up if this is the first.
    ///
    /// Bring-up order: bus clock on, reset pulse, group register init.
    pub fn acquire_group(&self, id: GroupId) -> Result<GroupRef<'_, P>> {
        if id.0 >= self.group_count() {
            return Err(Error::InvalidArgument("group id out of range"));
        }
        self.with_table(|_, table| {
            let entry = table
                .groups
                .get_mut(id.index())
                .ok_or(Error::InvalidArgument("group id out of range"))?;
            let slot = entry.get_or_insert_with(|| {
                self.platform.enable_bus_clock(id, true);
                self.platform.reset(id);
                self.platform.init_group(id);
                debug!("gdma: group {} up", id.0);
                GroupSlot::new()
            });
            slot.refs = slot
                .refs
                .checked_add(1)
                .ok_or(Error::NoMemory("group reference count overflow"))?;
            Ok::<(), Error>(())
        })?;
        Ok(GroupRef { alloc: self, id })
    }

    /// Drop one reference on `id`; the last one tears the group down.
    ///
    /// Teardown order: interrupt vector removed, group registers reset,
    /// bus clock gated, slot freed.
    fn release_group(&self, id: GroupId) {
        self.with_table(|_, table| {
            let Some(entry) = table.groups.get_mut(id.index()) else {
                return;
            };
            let Some(slot) = entry.as_mut() else {
                return;
            };
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs > 0 {
                return;
            }
            if slot.intr_installed {
                self.platform.uninstall(id);
            }
            self.platform.deinit_group(id);
            self.platform.enable_bus_clock(id, false);
            *entry = None;
            debug!("gdma: group {} down", id.0);
        });
    }

    /// Find a free channel slot, scanning groups in order and the lowest
    /// free index first.
    ///
    /// Groups acquired speculatively during the scan are released again
    /// before returning [`Error::NotFound`].
    pub fn register_channel(&self) -> Result<ChannelSlot<'_, P>> {
        let per_group = self.channels_per_group();
        for g in 0..self.group_count() {
            let group = self.acquire_group(GroupId(g))?;
            let claimed = self.with_table(|_, table| {
                let slot = table.slot_mut(group.id)?;
                let (index, used) = slot
                    .channels
                    .iter_mut()
                    .take(per_group)
                    .enumerate()
                    .find(|(_, used)| !**used)?;
                *used = true;
                u8::try_from(index).ok()
            });
            if let Some(index) = claimed {
                return Ok(ChannelSlot {
                    group,
                    channel: ChannelId(index),
                });
            }
            // `group` drops here and gives its reference back.
        }
        Err(Error::NotFound("no free channel in any group"))
    }

    fn unregister_channel(&self, addr: ChannelAddr) {
        self.with_table(|_, table| {
            if let Some(used) = table
                .slot_mut(addr.group)
                .and_then(|slot| slot.channels.get_mut(addr.channel.index()))
            {
                *used = false;
            }
        });
    }

    /// Record the interrupt priority a channel of `group` asks for.
    ///
    /// The first non-zero request fixes the group priority; a differing
    /// non-zero request afterwards is a [`Error::Conflict`]. Priority 0
    /// never conflicts.
    pub fn reserve_priority(&self, group: GroupId, priority: u8) -> Result<()> {
        if priority == 0 {
            return Ok(());
        }
        self.with_table(|_, table| {
            let slot = table
                .slot_mut(group)
                .ok_or(Error::InvalidState("group not acquired"))?;
            if slot.intr_priority == 0 {
                slot.intr_priority = priority;
                Ok(())
            } else if slot.intr_priority == priority {
                Ok(())
            } else {
                warn!(
                    "gdma: group {} runs at priority {}, channel asked for {}",
                    group.0,
                    slot.intr_priority,
                    priority
                );
                Err(Error::Conflict("interrupt priority differs from group"))
            }
        })
    }

    /// Install the shared group vector once, at the group priority.
    ///
    /// After installation the effective priority granted by the platform
    /// becomes the group priority.
    pub fn install_group_interrupt(&self, group: GroupId) -> Result<()> {
        self.with_table(|_, table| {
            let slot = table
                .slot_mut(group)
                .ok_or(Error::InvalidState("group not acquired"))?;
            if slot.intr_installed {
                return Ok(());
            }
            let granted = self.platform.install(group, slot.intr_priority)?;
            slot.intr_installed = true;
            slot.intr_priority = granted;
            debug!("gdma: group {} vector at priority {}", group.0, granted);
            Ok(())
        })
    }

    /// Claim handshake interface `id` exclusively.
    pub fn claim_peripheral(&self, id: PeripheralId) -> Result<PeripheralClaim<'_, P>> {
        let index = usize::from(id.0);
        if index >= MAX_PERIPHERALS {
            return Err(Error::InvalidArgument("peripheral id out of range"));
        }
        let bit = 1u32
            .checked_shl(u32::from(id.0))
            .ok_or(Error::InvalidArgument("peripheral id out of range"))?;
        self.with_table(|_, table| {
            if table.peripherals & bit != 0 {
                return Err(Error::Conflict("peripheral already claimed"));
            }
            table.peripherals |= bit;
            Ok(())
        })?;
        Ok(PeripheralClaim { alloc: self, bit })
    }

    fn release_peripheral(&self, bit: u32) {
        self.with_table(|_, table| table.peripherals &= !bit);
    }

    // ── Introspection ───────────────────────────────────────────────────────

    /// Live references on `id` (0 when the group does not exist).
    pub fn group_ref_count(&self, id: GroupId) -> usize {
        self.with_table(|_, table| table.slot(id).map_or(0, |s| usize::from(s.refs)))
    }

    /// `true` while the group is brought up.
    pub fn group_exists(&self, id: GroupId) -> bool {
        self.with_table(|_, table| table.slot(id).is_some())
    }

    /// Fixed interrupt priority of the group, if any.
    pub fn group_priority(&self, id: GroupId) -> Option<u8> {
        self.with_table(|_, table| {
            table
                .slot(id)
                .map(|s| s.intr_priority)
                .filter(|p| *p != 0)
        })
    }

    /// `true` if the slot is taken.
    pub fn is_channel_in_use(&self, addr: ChannelAddr) -> bool {
        self.with_table(|_, table| {
            table
                .slot(addr.group)
                .and_then(|s| s.channels.get(addr.channel.index()))
                .copied()
                .unwrap_or(false)
        })
    }
}

// ── Guards ───────────────────────────────────────────────────────────────────

/// One reference on a group; dropping it is `release_group`.
#[must_use = "dropping the reference releases the group"]
pub struct GroupRef<'a, P: DmaPlatform> {
    alloc: &'a Allocator<P>,
    id: GroupId,
}

impl<P: DmaPlatform> GroupRef<'_, P> {
    /// Group id.
    pub fn id(&self) -> GroupId {
        self.id
    }
}

impl<P: DmaPlatform> Drop for GroupRef<'_, P> {
    fn drop(&mut self) {
        self.alloc.release_group(self.id);
    }
}

/// A registered channel slot. Dropping it clears the slot, then releases
/// the group reference it holds.
#[must_use = "dropping the slot unregisters the channel"]
pub struct ChannelSlot<'a, P: DmaPlatform> {
    group: GroupRef<'a, P>,
    channel: ChannelId,
}

impl<P: DmaPlatform> ChannelSlot<'_, P> {
    /// Full channel address.
    pub fn addr(&self) -> ChannelAddr {
        ChannelAddr {
            group: self.group.id,
            channel: self.channel,
        }
    }
}

impl<P: DmaPlatform> Drop for ChannelSlot<'_, P> {
    fn drop(&mut self) {
        self.group.alloc.unregister_channel(self.addr());
    }
}

/// Exclusive claim on a handshake interface.
#[must_use = "dropping the claim frees the peripheral"]
pub struct PeripheralClaim<'a, P: DmaPlatform> {
    alloc: &'a Allocator<P>,
    bit: u32,
}

impl<P: DmaPlatform> Drop for PeripheralClaim<'_, P> {
    fn drop(&mut self) {
        self.alloc.release_peripheral(self.bit);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;
    use platform::mocks::{MockPlatform, Op};

    #[test]
    fn bring_up_and_teardown_order() {
        let alloc = Allocator::new(MockPlatform::new());
        let g = alloc.acquire_group(GroupId(1)).unwrap();
        drop(g);
        let g1 = GroupId(1);
        assert_eq!(
            alloc.platform().ops(),
            [
                Op::BusClock { group: g1, on: true },
                Op::ResetGroup(g1),
                Op::InitGroup(g1),
                Op::DeinitGroup(g1),
                Op::BusClock { group: g1, on: false },
            ]
        );
    }

    #[test]
    fn group_id_out_of_range() {
        let alloc = Allocator::new(MockPlatform::with_topology(1, 2));
        assert!(matches!(
            alloc.acquire_group(GroupId(1)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn scan_releases_full_groups() {
        let alloc = Allocator::new(MockPlatform::with_topology(2, 1));
        let a = alloc.register_channel().unwrap();
        let b = alloc.register_channel().unwrap();
        assert_eq!(a.addr(), ChannelAddr::new(0, 0));
        assert_eq!(b.addr(), ChannelAddr::new(1, 0));
        assert!(matches!(alloc.register_channel(), Err(Error::NotFound(_))));
        assert_eq!(alloc.group_ref_count(GroupId(0)), 1);
        assert_eq!(alloc.group_ref_count(GroupId(1)), 1);
    }

    #[test]
    fn installed_vector_is_removed_with_the_group() {
        let alloc = Allocator::new(MockPlatform::new());
        let slot = alloc.register_channel().unwrap();
        alloc.install_group_interrupt(GroupId(0)).unwrap();
        alloc.install_group_interrupt(GroupId(0)).unwrap();
        assert_eq!(alloc.platform().installed_priority(GroupId(0)), Some(1));
        drop(slot);
        assert_eq!(alloc.platform().installed_priority(GroupId(0)), None);
        let installs = alloc
            .platform()
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::InstallInterrupt { .. }))
            .count();
        assert_eq!(installs, 1);
    }

    #[test]
    fn peripheral_claims_are_exclusive() {
        let alloc = Allocator::new(MockPlatform::new());
        let claim = alloc.claim_peripheral(PeripheralId(3)).unwrap();
        assert!(matches!(
            alloc.claim_peripheral(PeripheralId(3)),
            Err(Error::Conflict(_))
        ));
        drop(claim);
        assert!(alloc.claim_peripheral(PeripheralId(3)).is_ok());
        assert!(matches!(
            alloc.claim_peripheral(PeripheralId(32)),
            Err(Error::InvalidArgument(_))
        ));
    }
}
