//! # Workbench Assist
//!
//! Crafting assistance engine for a 3x3 workbench grid.
//!
//! This crate provides:
//! - Item stacks and bounded views over external storage containers
//! - The recipe catalog interface and an in-memory catalog
//! - Grid recipe resolution with collision cycling
//! - A bounded crafting history with a transient stash slot
//! - Placement, distribution and scaling of grid stacks
//! - An authoritative session that applies intents and replicates snapshots
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌──────────────────┐     ┌───────────────┐
//! │  Intent  │────▶│ WorkbenchSession │────▶│ Snapshot      │──▶ WorkbenchMirror
//! └──────────┘     │ (single writer)  │     │ (full state)  │
//!                  └──────────────────┘     └───────────────┘
//!                    │        │      │
//!                    ▼        ▼      ▼
//!               GridState  History  placement ◀──▶ StorageRange pools
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod catalog;
pub mod config;
pub mod grid;
pub mod history;
pub mod intent;
pub mod item_stack;
pub mod placement;
pub mod recall;
pub mod session;
pub mod storage;
pub mod sync;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::*;
    pub use crate::config::*;
    pub use crate::grid::*;
    pub use crate::history::*;
    pub use crate::intent::*;
    pub use crate::item_stack::*;
    pub use crate::placement::*;
    pub use crate::recall::*;
    pub use crate::session::*;
    pub use crate::storage::*;
    pub use crate::sync::*;
}

pub use prelude::*;
pub use workbench_common::{ItemTypeId, RecipeId};
