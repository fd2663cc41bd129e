//! # Slot Inventory
//!
//! Reference [`InventoryProvider`]: each actor owns a fixed array of stack
//! slots, allocated once. Adds fill partial stacks first, then empty slots,
//! and report how many units fit. Removes are all-or-nothing.

use std::collections::HashMap;

use crate::item::CommodityId;
use crate::ports::{ActorId, InventoryProvider};

/// Slots per actor.
pub const INVENTORY_SLOTS: usize = 36;

/// Default stack size for commodities without an explicit limit.
pub const DEFAULT_MAX_STACK: u32 = 64;

/// Units of one commodity in one slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    /// Commodity in this slot. Meaningless when `count` is zero.
    pub commodity: CommodityId,
    /// Units in this slot.
    pub count: u32,
}

impl Stack {
    /// Returns true if this slot holds nothing.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    const fn holds(&self, commodity: CommodityId) -> bool {
        self.count > 0 && self.commodity == commodity
    }
}

/// One actor's slots.
#[derive(Clone, Debug)]
pub struct SlotInventory {
    slots: [Stack; INVENTORY_SLOTS],
}

impl SlotInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [Stack::default(); INVENTORY_SLOTS],
        }
    }

    /// Number of non-empty slots.
    #[must_use]
    pub fn used_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    /// Reads one slot.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Stack> {
        self.slots.get(index)
    }

    /// Total units of `commodity` across all slots.
    #[must_use]
    pub fn count(&self, commodity: CommodityId) -> u32 {
        self.slots
            .iter()
            .filter(|slot| slot.holds(commodity))
            .fold(0u32, |total, slot| total.saturating_add(slot.count))
    }

    /// Units of `commodity` that would still fit.
    #[must_use]
    pub fn room_for(&self, commodity: CommodityId, max_stack: u32) -> u32 {
        self.slots
            .iter()
            .map(|slot| {
                if slot.is_empty() {
                    max_stack
                } else if slot.commodity == commodity {
                    max_stack.saturating_sub(slot.count)
                } else {
                    0
                }
            })
            .fold(0u32, u32::saturating_add)
    }

    /// Adds up to `amount` units. Returns the units placed.
    pub fn add(&mut self, commodity: CommodityId, amount: u32, max_stack: u32) -> u32 {
        let mut remaining = amount;

        for slot in self.slots.iter_mut().filter(|slot| slot.holds(commodity)) {
            if remaining == 0 {
                break;
            }
            let fits = max_stack.saturating_sub(slot.count).min(remaining);
            slot.count += fits;
            remaining -= fits;
        }

        for slot in self.slots.iter_mut().filter(|slot| slot.is_empty()) {
            if remaining == 0 {
                break;
            }
            let fits = max_stack.min(remaining);
            *slot = Stack {
                commodity,
                count: fits,
            };
            remaining -= fits;
        }

        amount - remaining
    }

    /// Removes exactly `amount` units, emptying later slots first.
    pub fn remove(&mut self, commodity: CommodityId, amount: u32) -> bool {
        if self.count(commodity) < amount {
            return false;
        }

        let mut remaining = amount;
        for slot in self
            .slots
            .iter_mut()
            .rev()
            .filter(|slot| slot.holds(commodity))
        {
            if remaining == 0 {
                break;
            }
            let taken = slot.count.min(remaining);
            slot.count -= taken;
            remaining -= taken;
        }
        true
    }
}

impl Default for SlotInventory {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-actor slot inventories with per-commodity stack limits.
#[derive(Clone, Debug, Default)]
pub struct PlayerInventories {
    actors: HashMap<ActorId, SlotInventory>,
    max_stack: HashMap<CommodityId, u32>,
}

impl PlayerInventories {
    /// Creates an empty set of inventories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the stack size of `commodity`. Zero means it never fits.
    #[must_use]
    pub fn with_max_stack(mut self, commodity: CommodityId, max_stack: u32) -> Self {
        self.max_stack.insert(commodity, max_stack);
        self
    }

    /// Stack size of `commodity`.
    #[must_use]
    pub fn max_stack(&self, commodity: CommodityId) -> u32 {
        self.max_stack
            .get(&commodity)
            .copied()
            .unwrap_or(DEFAULT_MAX_STACK)
    }

    /// Inventory of `actor`, if it ever held anything.
    #[must_use]
    pub fn get(&self, actor: ActorId) -> Option<&SlotInventory> {
        self.actors.get(&actor)
    }

    /// Inventory of `actor`, created empty on first use.
    pub fn entry(&mut self, actor: ActorId) -> &mut SlotInventory {
        self.actors.entry(actor).or_default()
    }
}

impl InventoryProvider for PlayerInventories {
    fn count_held(&self, actor: ActorId, commodity: CommodityId) -> u32 {
        self.actors
            .get(&actor)
            .map_or(0, |inventory| inventory.count(commodity))
    }

    fn add(&mut self, actor: ActorId, commodity: CommodityId, amount: u32) -> u32 {
        let max_stack = self.max_stack(commodity);
        self.entry(actor).add(commodity, amount, max_stack)
    }

    fn remove(&mut self, actor: ActorId, commodity: CommodityId, amount: u32) -> bool {
        match self.actors.get_mut(&actor) {
            Some(inventory) => inventory.remove(commodity, amount),
            None => amount == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_fills_existing_stack_first() {
        let mut inv = SlotInventory::new();
        assert_eq!(inv.add(1, 40, 64), 40);
        assert_eq!(inv.add(2, 10, 64), 10);
        assert_eq!(inv.add(1, 30, 64), 30);

        assert_eq!(inv.count(1), 70);
        assert_eq!(inv.used_slots(), 3);
        assert_eq!(inv.slot(0).map(|s| s.count), Some(64));
    }

    #[test]
    fn test_add_reports_partial_fit() {
        let mut inv = SlotInventory::new();
        let capacity = 64 * INVENTORY_SLOTS as u32;
        assert_eq!(inv.add(5, capacity - 10, 64), capacity - 10);
        assert_eq!(inv.room_for(5, 64), 10);
        assert_eq!(inv.room_for(6, 64), 0);

        assert_eq!(inv.add(5, 25, 64), 10);
        assert_eq!(inv.add(6, 1, 64), 0);
    }

    #[test]
    fn test_remove_is_all_or_nothing() {
        let mut inv = SlotInventory::new();
        inv.add(1, 100, 64);
        assert!(!inv.remove(1, 101));
        assert_eq!(inv.count(1), 100);

        assert!(inv.remove(1, 70));
        assert_eq!(inv.count(1), 30);
        assert_eq!(inv.used_slots(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut inv = SlotInventory::new();
        inv.add(1, 10, 64);
        assert!(inv.remove(1, 10));
        assert_eq!(inv.add(2, 5, 64), 5);
        assert_eq!(inv.count(1), 0);
        assert_eq!(inv.slot(0), Some(&Stack { commodity: 2, count: 5 }));
    }

    #[test]
    fn test_player_inventories_provider() {
        let mut players = PlayerInventories::new().with_max_stack(9, 1);
        assert_eq!(players.count_held(1, 9), 0);
        assert!(!players.remove(1, 9, 1));
        assert!(players.remove(1, 9, 0));

        assert_eq!(players.add(1, 9, 3), 3);
        assert_eq!(players.entry(1).used_slots(), 3);
        assert_eq!(players.count_held(1, 9), 3);
        assert_eq!(players.count_held(2, 9), 0);
        assert!(players.remove(1, 9, 2));
        assert_eq!(players.count_held(1, 9), 1);
    }
}
