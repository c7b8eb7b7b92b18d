//! Intents accepted by the authoritative session.

use serde::{Deserialize, Serialize};
use workbench_common::ItemTypeId;

use crate::storage::SlotRef;

/// A discrete user action on the workbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Select the next history entry.
    Next,
    /// Select the previous history entry.
    Prev,
    /// Drop the history selection.
    ClearSelection,
    /// Place (or level up) the current history entry from storage.
    PlaceCurrent,
    /// Spread one storage stack across the matching grid cells.
    DistributeFromSlot(SlotRef),
    /// Spread a storage stack and every identical stack of its pool.
    DistributeAllMatching(SlotRef),
    /// Move one stack between the grid and storage.
    MoveStack(SlotRef),
    /// Move every stack identical to the referenced one.
    MoveAllMatching(SlotRef),
    /// Rebind the grid to the next matching recipe.
    CycleCollisionRecipe,
    /// Top every grid stack up to the given count.
    ScaleUp(u32),
    /// Move up to the given number of units per grid stack back to storage.
    ScaleDown(u32),
    /// Recall a placement for an output from the empty output slot.
    RecallOutput {
        /// Item held by the user, if any
        held: Option<ItemTypeId>,
    },
}

impl Intent {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
            Self::ClearSelection => "clear-selection",
            Self::PlaceCurrent => "place-current",
            Self::DistributeFromSlot(_) => "distribute",
            Self::DistributeAllMatching(_) => "distribute-all",
            Self::MoveStack(_) => "move-stack",
            Self::MoveAllMatching(_) => "move-all",
            Self::CycleCollisionRecipe => "cycle-collision",
            Self::ScaleUp(_) => "scale-up",
            Self::ScaleDown(_) => "scale-down",
            Self::RecallOutput { .. } => "recall-output",
        }
    }
}
