//! Storage ranges.
//!
//! A [`StorageRange`] is a bounded, ordered view over a slice of some
//! external container's slots. The engine never owns container storage; the
//! caller lends the slots for the duration of one intent.
//!
//! [`StoragePools`] groups the three views the workbench draws from, in their
//! default priority order: the block's own storage, the player's main
//! inventory, then the player's hotbar.

use serde::{Deserialize, Serialize};
use tracing::trace;
use workbench_common::ItemTypeId;

use crate::item_stack::ItemStack;

/// Which slot collection a [`SlotRef`] points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
    /// The 3x3 crafting grid.
    Grid,
    /// Storage built into the workbench block.
    BlockStorage,
    /// The player's main (bulk) inventory.
    PlayerMain,
    /// The player's quick-access row.
    PlayerHotbar,
}

/// Reference to a single slot of the grid or of a storage pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    /// Pool the slot belongs to.
    pub pool: PoolKind,
    /// Local index inside that pool.
    pub index: usize,
}

impl SlotRef {
    /// Create a slot reference.
    #[must_use]
    pub const fn new(pool: PoolKind, index: usize) -> Self {
        Self { pool, index }
    }
}

/// Mutable view over a contiguous run of container slots.
#[derive(Debug)]
pub struct StorageRange<'a> {
    slots: &'a mut [ItemStack],
}

impl<'a> StorageRange<'a> {
    /// Create a view over the given slots.
    #[must_use]
    pub fn new(slots: &'a mut [ItemStack]) -> Self {
        Self { slots }
    }

    /// Create a view with no slots.
    #[must_use]
    pub fn empty() -> Self {
        Self { slots: &mut [] }
    }

    /// Split into two disjoint views at `mid` (clamped to the arity).
    #[must_use]
    pub fn split_at(self, mid: usize) -> (StorageRange<'a>, StorageRange<'a>) {
        let mid = mid.min(self.slots.len());
        let (head, tail) = self.slots.split_at_mut(mid);
        (StorageRange::new(head), StorageRange::new(tail))
    }

    /// Number of slots in the view.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Get a copy of the stack at `index` (empty when out of range).
    #[must_use]
    pub fn get(&self, index: usize) -> ItemStack {
        self.slots.get(index).copied().unwrap_or_default()
    }

    /// Replace the stack at `index`. Returns false when out of range.
    pub fn set(&mut self, index: usize, stack: ItemStack) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = stack;
                true
            }
            None => false,
        }
    }

    /// Check if every slot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(ItemStack::is_empty)
    }

    /// Check if any slot holds the given item type.
    #[must_use]
    pub fn contains_item(&self, item: ItemTypeId) -> bool {
        !item.is_none() && self.slots.iter().any(|s| s.matches_item(item))
    }

    /// Extract up to `max_units` identical to `request`, draining slots in
    /// order.
    pub fn extract(&mut self, request: &ItemStack, max_units: u32) -> ItemStack {
        if request.is_empty() {
            return ItemStack::empty();
        }
        let request = *request;
        self.extract_where(|s| s.is_identical(&request), max_units)
    }

    /// Extract up to `max_units` starting at the first slot accepted by
    /// `accept`. Further units are only drawn from stacks identical to that
    /// first one, so the result is always a single identity.
    pub fn extract_where(
        &mut self,
        accept: impl Fn(&ItemStack) -> bool,
        max_units: u32,
    ) -> ItemStack {
        let mut extracted = ItemStack::empty();
        if max_units == 0 {
            return extracted;
        }
        for slot in self.slots.iter_mut() {
            if slot.is_empty() {
                continue;
            }
            let wanted = max_units - extracted.count();
            if extracted.is_empty() {
                if !accept(slot) {
                    continue;
                }
                extracted = slot.split(wanted);
            } else if slot.is_identical(&extracted) {
                let part = slot.split(wanted.min(extracted.headroom()));
                extracted.grow(part.count());
            }
            if extracted.count() >= max_units || extracted.is_full() {
                break;
            }
        }
        if !extracted.is_empty() {
            trace!(
                "Extracted {} x {:?} from range",
                extracted.count(),
                extracted.item()
            );
        }
        extracted
    }

    /// Insert a stack, merging into identical stacks first and then filling
    /// empty slots. Returns whatever did not fit.
    pub fn insert(&mut self, stack: ItemStack) -> ItemStack {
        self.insert_limited(stack, u32::MAX)
    }

    /// Insert at most `limit` units of `stack`. Returns the remainder,
    /// including the units that were held back by the limit.
    pub fn insert_limited(&mut self, stack: ItemStack, limit: u32) -> ItemStack {
        if stack.is_empty() || limit == 0 {
            return stack;
        }
        let mut source = stack;
        let mut budget = limit.min(source.count());

        let mut merge = |slot: &mut ItemStack| -> bool {
            if budget > 0 {
                let before = source.count();
                if slot.try_merge_limited(&mut source, budget).success() {
                    budget -= before - source.count();
                }
            }
            budget == 0
        };
        for slot in self.slots.iter_mut().filter(|s| !s.is_empty()) {
            if merge(slot) {
                break;
            }
        }
        for slot in self.slots.iter_mut().filter(|s| s.is_empty()) {
            if merge(slot) {
                break;
            }
        }
        source
    }
}

impl<'a> From<&'a mut [ItemStack]> for StorageRange<'a> {
    fn from(slots: &'a mut [ItemStack]) -> Self {
        Self::new(slots)
    }
}

/// The storage views available to a workbench intent.
#[derive(Debug)]
pub struct StoragePools<'a> {
    /// Storage built into the workbench block.
    pub block: StorageRange<'a>,
    /// Player main inventory.
    pub player_main: StorageRange<'a>,
    /// Player hotbar.
    pub player_hotbar: StorageRange<'a>,
}

impl<'a> StoragePools<'a> {
    /// Create pools from three separate views.
    #[must_use]
    pub fn new(
        block: StorageRange<'a>,
        player_main: StorageRange<'a>,
        player_hotbar: StorageRange<'a>,
    ) -> Self {
        Self {
            block,
            player_main,
            player_hotbar,
        }
    }

    /// Create pools from block storage and one player inventory slice whose
    /// first `hotbar_len` slots are the hotbar.
    #[must_use]
    pub fn from_player_inventory(
        block: &'a mut [ItemStack],
        player: &'a mut [ItemStack],
        hotbar_len: usize,
    ) -> Self {
        let (hotbar, main) = StorageRange::new(player).split_at(hotbar_len);
        Self::new(StorageRange::new(block), main, hotbar)
    }

    /// Pools with no slots at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(
            StorageRange::empty(),
            StorageRange::empty(),
            StorageRange::empty(),
        )
    }

    /// Get a pool by kind. The grid is not a pool.
    #[must_use]
    pub fn pool(&self, kind: PoolKind) -> Option<&StorageRange<'a>> {
        match kind {
            PoolKind::Grid => None,
            PoolKind::BlockStorage => Some(&self.block),
            PoolKind::PlayerMain => Some(&self.player_main),
            PoolKind::PlayerHotbar => Some(&self.player_hotbar),
        }
    }

    /// Get a pool mutably by kind.
    pub fn pool_mut(&mut self, kind: PoolKind) -> Option<&mut StorageRange<'a>> {
        match kind {
            PoolKind::Grid => None,
            PoolKind::BlockStorage => Some(&mut self.block),
            PoolKind::PlayerMain => Some(&mut self.player_main),
            PoolKind::PlayerHotbar => Some(&mut self.player_hotbar),
        }
    }

    /// All pools in priority order.
    pub fn all_mut(&mut self) -> [&mut StorageRange<'a>; 3] {
        [
            &mut self.block,
            &mut self.player_main,
            &mut self.player_hotbar,
        ]
    }

    /// Player pools in priority order.
    pub fn player_mut(&mut self) -> [&mut StorageRange<'a>; 2] {
        [&mut self.player_main, &mut self.player_hotbar]
    }

    /// Player pools first, then block storage.
    pub fn player_then_block_mut(&mut self) -> [&mut StorageRange<'a>; 3] {
        [
            &mut self.player_main,
            &mut self.player_hotbar,
            &mut self.block,
        ]
    }

    /// Block storage alone.
    pub fn block_mut(&mut self) -> [&mut StorageRange<'a>; 1] {
        [&mut self.block]
    }

    /// Read-only views in priority order.
    #[must_use]
    pub fn all(&self) -> [&StorageRange<'a>; 3] {
        [&self.block, &self.player_main, &self.player_hotbar]
    }
}
