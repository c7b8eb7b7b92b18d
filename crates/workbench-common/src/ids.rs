//! ID types for items and recipes.

use serde::{Deserialize, Serialize};

/// Identity of an item type, without quantity.
///
/// The raw value 0 is reserved for "no item" and is what empty grid cells
/// and empty history cells carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ItemTypeId(u32);

impl ItemTypeId {
    /// The empty identity.
    pub const NONE: Self = Self(0);

    /// Creates an item type ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this is the empty identity.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Unique identifier for a recipe.
///
/// The raw value 0 is reserved for "no recipe"; history entries that no
/// longer resolve carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipeId(u32);

impl RecipeId {
    /// The unresolved recipe.
    pub const NONE: Self = Self(0);

    /// Creates a recipe ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this is the unresolved recipe.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "recipe#{}", self.0)
    }
}
