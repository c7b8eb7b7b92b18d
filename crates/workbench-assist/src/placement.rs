//! Placement engine.
//!
//! Allocation algorithms moving units between the grid and a
//! priority-ordered list of storage ranges:
//!
//! - [`place_from_template`]: fill grid cells from storage one unit at a time
//! - [`distribute_stack`]: level one source stack across the matching cells
//! - [`increase_grid_stacks`] / [`decrease_grid_stacks`]: scale the grid
//!
//! Every loop is bounded by [`MAX_PLACEMENT_PASSES`]. A placement pass that
//! moves nothing ends the loop, and a distribution pass always raises the
//! common fill level by one, so 64 passes cover any stack size up to 64.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use workbench_common::ItemTypeId;

use crate::grid::GRID_SLOTS;
use crate::history::HistoryEntry;
use crate::item_stack::ItemStack;
use crate::storage::StorageRange;

/// Upper bound of passes over the grid in one placement operation.
pub const MAX_PLACEMENT_PASSES: usize = 64;

/// Outcome of a placement operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementResult {
    /// Nothing moved.
    Unchanged,
    /// Some units moved but a requested quantity could not be met.
    Incomplete,
    /// Everything requested was placed.
    Placed,
}

impl PlacementResult {
    /// Check if anything moved.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Map a "did something change" flag.
    #[must_use]
    pub const fn from_changed(changed: bool) -> Self {
        if changed {
            Self::Placed
        } else {
            Self::Unchanged
        }
    }
}

/// Units wanted in one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateCell {
    /// Wanted item (`NONE` for nothing).
    pub item: ItemTypeId,
    /// Units still to add.
    pub count: u32,
}

impl TemplateCell {
    /// Create a template cell.
    #[must_use]
    pub const fn new(item: ItemTypeId, count: u32) -> Self {
        Self { item, count }
    }

    /// Check if the cell wants nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.item.is_none() || self.count == 0
    }
}

/// A placement template for the whole grid.
pub type Template = [TemplateCell; GRID_SLOTS];

/// Take one unit for `cell` from the first range that has one.
///
/// An occupied cell only accepts units identical to itself; an empty cell
/// accepts any variant of `item`.
fn take_unit(cell: &ItemStack, item: ItemTypeId, ranges: &mut [&mut StorageRange<'_>]) -> ItemStack {
    for range in ranges.iter_mut() {
        let unit = if cell.is_empty() {
            range.extract_where(|s| s.matches_item(item), 1)
        } else {
            range.extract(cell, 1)
        };
        debug_assert!(unit.count() <= 1, "storage range returned more than requested");
        if !unit.is_empty() {
            return unit;
        }
    }
    ItemStack::empty()
}

/// Fill grid cells from storage according to `template`.
///
/// Cells never grow beyond `min(max_count, cell_limit)`. Occupied cells
/// holding a different item than the template asks for are left alone and
/// count as unmet.
pub fn place_from_template(
    grid: &mut [ItemStack; GRID_SLOTS],
    template: &Template,
    ranges: &mut [&mut StorageRange<'_>],
    cell_limit: u32,
) -> PlacementResult {
    let mut remaining = template.map(|cell| if cell.item.is_none() { 0 } else { cell.count });
    let mut moved = false;

    for pass in 0..MAX_PLACEMENT_PASSES {
        let mut updated = false;
        for (index, cell) in grid.iter_mut().enumerate() {
            if remaining[index] == 0 {
                continue;
            }
            let item = template[index].item;
            if !cell.is_empty()
                && (!cell.matches_item(item) || cell.count() >= cell.max_count().min(cell_limit))
            {
                continue;
            }
            let unit = take_unit(cell, item, ranges);
            if unit.is_empty() {
                continue;
            }
            if cell.is_empty() {
                *cell = unit;
            } else {
                cell.grow(unit.count());
            }
            remaining[index] -= 1;
            updated = true;
            moved = true;
            trace!("Placed one {:?} into cell {} (pass {})", item, index, pass);
        }
        if !updated {
            break;
        }
    }

    let result = if !moved {
        PlacementResult::Unchanged
    } else if remaining.iter().any(|&n| n > 0) {
        PlacementResult::Incomplete
    } else {
        PlacementResult::Placed
    };
    debug!("Placement from template: {:?}", result);
    result
}

/// Build the levelling template for re-placing `entry` on top of the grid.
///
/// Returns `None` when the grid conflicts with the entry (an occupied cell
/// where the entry is empty, or an occupied cell that is neither the entry's
/// item nor an alternative of the same ingredient), or when the common fill
/// level would exceed a cell's stack limit.
///
/// The fill level is one above the current level when all participating
/// cells are even, otherwise the highest current level.
pub fn refab_template(
    grid: &[ItemStack; GRID_SLOTS],
    entry: &HistoryEntry,
    same_ingredient: impl Fn(ItemTypeId, ItemTypeId) -> bool,
    cell_limit: u32,
) -> Option<Template> {
    let mut levels: [Option<u32>; GRID_SLOTS] = [None; GRID_SLOTS];
    for (index, (needed, placed)) in entry.cells.iter().zip(grid.iter()).enumerate() {
        if needed.is_none() {
            if !placed.is_empty() {
                return None;
            }
            continue;
        }
        if !placed.is_empty() && placed.item() != *needed && !same_ingredient(*needed, placed.item()) {
            return None;
        }
        levels[index] = Some(placed.count());
    }

    let min = levels.iter().flatten().min().copied()?;
    let max = levels.iter().flatten().max().copied()?;
    let fill = if max <= min { min + 1 } else { max };

    let mut template = [TemplateCell::default(); GRID_SLOTS];
    for (index, level) in levels.iter().enumerate() {
        if level.is_none() {
            continue;
        }
        let placed = &grid[index];
        let limit = if placed.is_empty() {
            cell_limit
        } else {
            placed.max_count().min(cell_limit)
        };
        if fill > limit {
            return None;
        }
        template[index] = if placed.is_empty() {
            TemplateCell::new(entry.cells[index], fill)
        } else {
            TemplateCell::new(placed.item(), fill - placed.count())
        };
    }
    Some(template)
}

/// Spread `source` across the grid, levelling the eligible cells.
///
/// Eligible cells hold a stack identical to the source, or are empty and
/// accepted by `template_accepts`. The lowest cells are raised first; once
/// they are even, all of them rise together until the source runs out or the
/// limit `min(source max_count, cell_limit)` is reached. The residual stays
/// in `source`.
pub fn distribute_stack(
    grid: &mut [ItemStack; GRID_SLOTS],
    source: &mut ItemStack,
    template_accepts: impl Fn(usize, &ItemStack) -> bool,
    cell_limit: u32,
) -> PlacementResult {
    if source.is_empty() {
        return PlacementResult::Unchanged;
    }

    let mut levels: [Option<u32>; GRID_SLOTS] = [None; GRID_SLOTS];
    for (index, cell) in grid.iter().enumerate() {
        if !cell.is_empty() {
            if cell.is_identical(source) {
                levels[index] = Some(cell.count());
            }
        } else if template_accepts(index, source) {
            levels[index] = Some(0);
        }
    }

    let Some(mut min) = levels.iter().flatten().min().copied() else {
        return PlacementResult::Unchanged;
    };
    let limit = source.max_count().min(cell_limit);
    if min >= limit {
        return PlacementResult::Unchanged;
    }

    let available = source.count();
    let mut to_distribute = available;
    for _ in 0..MAX_PLACEMENT_PASSES {
        if to_distribute == 0 {
            break;
        }
        for level in levels.iter_mut().flatten() {
            if to_distribute == 0 {
                break;
            }
            if *level == min {
                *level += 1;
                to_distribute -= 1;
            }
        }
        min += 1;
        if min >= limit {
            break;
        }
    }

    let used = available - to_distribute;
    if used == 0 {
        return PlacementResult::Unchanged;
    }
    for (cell, level) in grid.iter_mut().zip(levels.iter()) {
        if let Some(level) = *level {
            *cell = source.copy_with_count(level);
        }
    }
    source.shrink(used);
    debug!("Distributed {} units, {} left in source", used, source.count());
    PlacementResult::Placed
}

/// Top up every occupied cell to `target` units from storage.
pub fn increase_grid_stacks(
    grid: &mut [ItemStack; GRID_SLOTS],
    ranges: &mut [&mut StorageRange<'_>],
    target: u32,
    cell_limit: u32,
) -> PlacementResult {
    let template = grid.map(|cell| {
        if cell.is_empty() {
            TemplateCell::default()
        } else {
            TemplateCell::new(cell.item(), target.saturating_sub(cell.count()))
        }
    });
    if template.iter().all(TemplateCell::is_empty) {
        return PlacementResult::Unchanged;
    }
    place_from_template(grid, &template, ranges, cell_limit)
}

/// Move up to `limit` units of every occupied cell back into storage.
///
/// Ranges are tried in priority order; a cell shrinks by whatever was
/// accepted.
pub fn decrease_grid_stacks(
    grid: &mut [ItemStack; GRID_SLOTS],
    ranges: &mut [&mut StorageRange<'_>],
    limit: u32,
) -> bool {
    let mut changed = false;
    for cell in grid.iter_mut() {
        if cell.is_empty() {
            continue;
        }
        let mut budget = limit.min(cell.count());
        for range in ranges.iter_mut() {
            if budget == 0 {
                break;
            }
            let before = cell.count();
            *cell = range.insert_limited(*cell, budget);
            let moved = before - cell.count();
            budget -= moved;
            changed |= moved > 0;
        }
    }
    if changed {
        debug!("Decreased grid stacks by up to {}", limit);
    }
    changed
}

/// Insert a stack into the ranges in order. Returns what did not fit.
pub fn move_into_ranges(stack: ItemStack, ranges: &mut [&mut StorageRange<'_>]) -> ItemStack {
    let mut rest = stack;
    for range in ranges.iter_mut() {
        if rest.is_empty() {
            break;
        }
        rest = range.insert(rest);
    }
    rest
}

/// Move every grid stack into the ranges. Returns true if anything moved.
pub fn move_grid_to(grid: &mut [ItemStack; GRID_SLOTS], ranges: &mut [&mut StorageRange<'_>]) -> bool {
    let mut changed = false;
    for cell in grid.iter_mut() {
        if cell.is_empty() {
            continue;
        }
        let before = cell.count();
        *cell = move_into_ranges(*cell, ranges);
        changed |= cell.count() != before;
    }
    changed
}
