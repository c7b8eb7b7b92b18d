//! Item Stack Management
//!
//! Low-level stack operations used by the grid, the storage ranges and the
//! placement engine:
//!
//! - Identity comparison (item type plus variant tag, ignoring quantity)
//! - Growing, shrinking and splitting within `max_count`
//! - Merging one stack into another up to a unit limit
//!
//! # Example
//!
//! ```
//! use workbench_assist::item_stack::{ItemStack, StackResult};
//! use workbench_common::ItemTypeId;
//!
//! let plank = ItemTypeId::new(2);
//! let mut a = ItemStack::with_max(plank, 60, 64);
//! let mut b = ItemStack::with_max(plank, 10, 64);
//!
//! assert_eq!(a.try_merge_limited(&mut b, 8), StackResult::Partial(6));
//! assert_eq!(a.count(), 64);
//! assert_eq!(b.count(), 6);
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;
use workbench_common::ItemTypeId;

/// Maximum stack size used when nothing more specific is known.
pub const DEFAULT_MAX_STACK: u32 = 64;

/// Result of a stack merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackResult {
    /// Operation completed fully.
    Complete,
    /// Operation partially completed with remainder.
    Partial(u32),
    /// Operation failed (different items).
    Incompatible,
    /// Source stack is empty.
    Empty,
}

impl StackResult {
    /// Check if operation was at least partially successful.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Complete | Self::Partial(_))
    }
}

/// A quantity of one item identity.
///
/// Invariant: `count <= max_count` and `max_count >= 1`. A stack whose count
/// drops to zero is normalized to [`ItemStack::empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    item: ItemTypeId,
    count: u32,
    max_count: u32,
    /// Auxiliary tag data; stacks only merge when it matches.
    variant: u16,
}

impl Default for ItemStack {
    fn default() -> Self {
        Self::empty()
    }
}

impl ItemStack {
    /// Create an empty stack.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            item: ItemTypeId::NONE,
            count: 0,
            max_count: DEFAULT_MAX_STACK,
            variant: 0,
        }
    }

    /// Create a stack with the default maximum size.
    #[must_use]
    pub fn new(item: ItemTypeId, count: u32) -> Self {
        Self::with_max(item, count, DEFAULT_MAX_STACK)
    }

    /// Create a stack with an explicit maximum size.
    #[must_use]
    pub fn with_max(item: ItemTypeId, count: u32, max_count: u32) -> Self {
        if item.is_none() || count == 0 {
            return Self::empty();
        }
        let max_count = max_count.max(1);
        Self {
            item,
            count: count.min(max_count),
            max_count,
            variant: 0,
        }
    }

    /// Set the variant tag.
    #[must_use]
    pub const fn with_variant(mut self, variant: u16) -> Self {
        self.variant = variant;
        self
    }

    /// Get the item identity (`ItemTypeId::NONE` when empty).
    #[must_use]
    pub const fn item(&self) -> ItemTypeId {
        self.item
    }

    /// Get the stack count.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Get the maximum stack size.
    #[must_use]
    pub const fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Get the variant tag.
    #[must_use]
    pub const fn variant(&self) -> u16 {
        self.variant
    }

    /// Check if the stack is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.item.is_none() || self.count == 0
    }

    /// Check if the stack is at its maximum size.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        !self.is_empty() && self.count >= self.max_count
    }

    /// Units that can still be added.
    #[must_use]
    pub const fn headroom(&self) -> u32 {
        if self.is_empty() {
            self.max_count
        } else {
            self.max_count.saturating_sub(self.count)
        }
    }

    /// Check whether this stack holds the given item type (any variant).
    #[must_use]
    pub fn matches_item(&self, item: ItemTypeId) -> bool {
        !self.is_empty() && self.item == item
    }

    /// Two stacks are identical when item and variant match, ignoring
    /// quantity. Two empty stacks are identical.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => true,
            (false, false) => self.item == other.item && self.variant == other.variant,
            _ => false,
        }
    }

    /// Negation of [`ItemStack::is_identical`].
    #[must_use]
    pub fn is_different(&self, other: &Self) -> bool {
        !self.is_identical(other)
    }

    /// Add units, clamped to `max_count`. Returns the units actually added.
    ///
    /// Growing an empty stack does nothing; use [`ItemStack::copy_with_count`]
    /// to materialize a new stack.
    pub fn grow(&mut self, amount: u32) -> u32 {
        if self.is_empty() {
            return 0;
        }
        let added = amount.min(self.headroom());
        self.count += added;
        added
    }

    /// Remove units. Returns the units actually removed.
    pub fn shrink(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.count);
        self.count -= removed;
        if self.count == 0 {
            *self = Self::empty();
        }
        removed
    }

    /// Split off a portion of this stack.
    ///
    /// Returns the split-off portion.
    #[must_use]
    pub fn split(&mut self, amount: u32) -> Self {
        if self.is_empty() || amount == 0 {
            return Self::empty();
        }

        let take = amount.min(self.count);
        let split = self.copy_with_count(take);
        self.shrink(take);

        trace!("Split {} items, {} remaining", take, self.count);
        split
    }

    /// Copy the stack with a new count (clamped to `max_count`).
    #[must_use]
    pub fn copy_with_count(&self, count: u32) -> Self {
        if self.item.is_none() || count == 0 {
            return Self::empty();
        }
        Self {
            count: count.min(self.max_count),
            ..*self
        }
    }

    /// Merge at most `limit` units of `source` into this stack.
    pub fn try_merge_limited(&mut self, source: &mut Self, limit: u32) -> StackResult {
        if source.is_empty() {
            return StackResult::Empty;
        }

        if self.is_empty() {
            *self = source.split(limit.min(source.max_count));
        } else if self.is_identical(source) {
            let transfer = source.count.min(self.headroom()).min(limit);
            self.count += transfer;
            source.shrink(transfer);
        } else {
            return StackResult::Incompatible;
        }

        if source.is_empty() {
            StackResult::Complete
        } else {
            StackResult::Partial(source.count)
        }
    }
}
