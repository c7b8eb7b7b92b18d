//! Recall and synthesis of placements.
//!
//! Given an output the user wants, find it in the history or synthesize a
//! placement from the catalog. Ingredient alternatives the user already owns
//! are preferred over the catalog's default so the suggestion does not ask
//! for items that are not in storage.

use tracing::debug;
use workbench_common::{ItemTypeId, RecipeId};

use crate::catalog::{RecipeCatalog, RecipeShape};
use crate::grid::{GRID_SLOTS, GRID_WIDTH};
use crate::history::{HistoryCache, HistoryEntry};
use crate::storage::StorageRange;

/// First alternative present in any range, searching alternatives in order
/// and ranges in priority order for each.
#[must_use]
pub fn search_storage(alternatives: &[ItemTypeId], ranges: &[&StorageRange<'_>]) -> Option<ItemTypeId> {
    alternatives
        .iter()
        .copied()
        .find(|&item| ranges.iter().any(|range| range.contains_item(item)))
}

/// Preferred item for one ingredient cell.
fn preferred(alternatives: &[ItemTypeId], ranges: &[&StorageRange<'_>]) -> ItemTypeId {
    search_storage(alternatives, ranges)
        .or_else(|| alternatives.first().copied())
        .unwrap_or(ItemTypeId::NONE)
}

/// Lay out a recipe on the grid.
///
/// Shaped recipes occupy the bottom `height` rows and the leftmost `width`
/// columns. Shapeless recipes fill cells in order. Returns `None` for
/// unknown recipes and for recipes with more than nine ingredients.
#[must_use]
pub fn placement_cells<C>(catalog: &C, recipe: RecipeId, ranges: &[&StorageRange<'_>]) -> Option<[ItemTypeId; GRID_SLOTS]>
where
    C: RecipeCatalog + ?Sized,
{
    let shape = catalog.shape(recipe)?;
    let ingredients = catalog.ingredients(recipe);
    if ingredients.len() > GRID_SLOTS {
        return None;
    }

    let mut cells = [ItemTypeId::NONE; GRID_SLOTS];
    match shape {
        RecipeShape::Shaped { width, height } => {
            let (width, height) = (usize::from(width), usize::from(height));
            if width > GRID_WIDTH || height > GRID_WIDTH {
                return None;
            }
            let top = GRID_WIDTH - height;
            let mut next = ingredients.iter();
            for row in top..GRID_WIDTH {
                for col in 0..width {
                    let Some(alternatives) = next.next() else {
                        break;
                    };
                    cells[row * GRID_WIDTH + col] = preferred(alternatives, ranges);
                }
            }
        }
        RecipeShape::Shapeless => {
            for (cell, alternatives) in cells.iter_mut().zip(ingredients.iter()) {
                *cell = preferred(alternatives, ranges);
            }
        }
    }
    Some(cells)
}

/// Check whether `a` and `b` are alternatives of one ingredient of `recipe`.
#[must_use]
pub fn same_ingredient<C>(catalog: &C, recipe: RecipeId, a: ItemTypeId, b: ItemTypeId) -> bool
where
    C: RecipeCatalog + ?Sized,
{
    catalog
        .ingredients(recipe)
        .iter()
        .any(|alternatives| alternatives.contains(&a) && alternatives.contains(&b))
}

/// Replace the cells of `entry` that cannot be found in storage by an owned
/// alternative of the same ingredient.
///
/// Returns the adapted copy, or `None` when nothing had to change. The entry
/// itself is never modified.
#[must_use]
pub fn adapt_entry<C>(catalog: &C, entry: &HistoryEntry, ranges: &[&StorageRange<'_>]) -> Option<HistoryEntry>
where
    C: RecipeCatalog + ?Sized,
{
    let ingredients = catalog.ingredients(entry.recipe_id);
    let mut adapted = *entry;
    let mut changed = false;

    for cell in &mut adapted.cells {
        if cell.is_none() || ranges.iter().any(|range| range.contains_item(*cell)) {
            continue;
        }
        let owned = ingredients
            .iter()
            .find(|alternatives| alternatives.contains(cell))
            .and_then(|alternatives| search_storage(alternatives, ranges));
        if let Some(replacement) = owned {
            if replacement != *cell {
                *cell = replacement;
                changed = true;
            }
        }
    }

    changed.then_some(adapted)
}

/// Make a placement for `output` current.
///
/// A history entry producing `output` is selected (and re-stashed in adapted
/// form when some of its ingredients are no longer owned). Otherwise the
/// first catalog recipe producing `output` is laid out and stashed.
///
/// Returns true when the history has a current entry afterwards.
pub fn recall_output<C>(
    history: &mut HistoryCache,
    catalog: &C,
    output: ItemTypeId,
    ranges: &[&StorageRange<'_>],
) -> bool
where
    C: RecipeCatalog + ?Sized,
{
    if output.is_none() {
        return false;
    }

    if let Some(index) = history.find_by_output(output) {
        history.select(index);
        let adapted = history
            .current()
            .and_then(|entry| adapt_entry(catalog, entry, ranges));
        if let Some(entry) = adapted {
            debug!("Recalled {} with substituted ingredients", entry.recipe_id);
            history.stash(entry);
        } else {
            debug!("Recalled history entry {} for {:?}", index, output);
        }
        return true;
    }

    let Some(recipe) = catalog.recipes_for_output(output).first().copied() else {
        debug!("No recipe produces {:?}", output);
        return false;
    };
    let Some(cells) = placement_cells(catalog, recipe, ranges) else {
        return false;
    };
    debug!("Synthesized placement of {} for {:?}", recipe, output);
    history.stash(HistoryEntry::new(recipe, output, cells));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemDefinition, RecipeBook, RecipeDefinition};
    use crate::item_stack::ItemStack;

    const OAK: ItemTypeId = ItemTypeId::new(1);
    const BIRCH: ItemTypeId = ItemTypeId::new(2);
    const STICK: ItemTypeId = ItemTypeId::new(3);
    const SIGN: ItemTypeId = ItemTypeId::new(4);
    const DYE: ItemTypeId = ItemTypeId::new(5);

    const SIGN_RECIPE: RecipeId = RecipeId::new(1);
    const DYE_RECIPE: RecipeId = RecipeId::new(2);

    fn book() -> RecipeBook {
        let wood = vec![OAK, BIRCH];
        RecipeBook::from_definitions(
            vec![
                ItemDefinition::new(OAK, "oak"),
                ItemDefinition::new(BIRCH, "birch"),
                ItemDefinition::new(STICK, "stick"),
                ItemDefinition::new(SIGN, "sign"),
                ItemDefinition::new(DYE, "dye"),
            ],
            vec![
                RecipeDefinition::shaped(
                    SIGN_RECIPE,
                    "sign",
                    2,
                    2,
                    vec![wood.clone(), wood, vec![STICK], vec![]],
                )
                .output(SIGN, 3),
                RecipeDefinition::shapeless(DYE_RECIPE, "dye", vec![vec![STICK], vec![OAK, BIRCH]])
                    .output(DYE, 1),
            ],
        )
    }

    #[test]
    fn test_shaped_layout_bottom_left() {
        let book = book();
        let cells = placement_cells(&book, SIGN_RECIPE, &[]).expect("layout");
        let none = ItemTypeId::NONE;
        assert_eq!(cells, [none, none, none, OAK, OAK, none, STICK, none, none]);
    }

    #[test]
    fn test_layout_prefers_owned_alternative() {
        let book = book();
        let mut slots = vec![ItemStack::new(BIRCH, 2)];
        let range = StorageRange::new(&mut slots);
        let cells = placement_cells(&book, DYE_RECIPE, &[&range]).expect("layout");
        assert_eq!(cells[0], STICK);
        assert_eq!(cells[1], BIRCH);
        assert_eq!(cells[2], ItemTypeId::NONE);
    }

    #[test]
    fn test_adapt_entry_replaces_missing_only() {
        let book = book();
        let mut cells = [ItemTypeId::NONE; GRID_SLOTS];
        cells[3] = OAK;
        cells[4] = OAK;
        cells[6] = STICK;
        let entry = HistoryEntry::new(SIGN_RECIPE, SIGN, cells);

        let mut slots = vec![ItemStack::new(BIRCH, 4)];
        let range = StorageRange::new(&mut slots);
        let adapted = adapt_entry(&book, &entry, &[&range]).expect("adapted");
        assert_eq!(adapted.cells[3], BIRCH);
        assert_eq!(adapted.cells[4], BIRCH);
        assert_eq!(adapted.cells[6], STICK);
        assert_eq!(entry.cells[3], OAK);

        let mut owned = vec![ItemStack::new(OAK, 4)];
        let range = StorageRange::new(&mut owned);
        assert!(adapt_entry(&book, &entry, &[&range]).is_none());
    }

    #[test]
    fn test_recall_synthesizes_into_stash() {
        let book = book();
        let mut history = HistoryCache::new(4);
        assert!(recall_output(&mut history, &book, SIGN, &[]));
        let current = history.current().expect("current");
        assert_eq!(current.recipe_id, SIGN_RECIPE);
        assert!(history.stashed().is_some());
        assert!(history.is_empty());
    }

    #[test]
    fn test_recall_selects_history_entry() {
        let book = book();
        let mut history = HistoryCache::new(4);
        let mut cells = [ItemTypeId::NONE; GRID_SLOTS];
        cells[0] = STICK;
        cells[1] = OAK;
        history.record(cells, DYE_RECIPE, DYE);

        assert!(recall_output(&mut history, &book, DYE, &[]));
        assert_eq!(history.cursor(), Some(0));
        assert!(history.stashed().is_none());
    }

    #[test]
    fn test_recall_unknown_output() {
        let book = book();
        let mut history = HistoryCache::new(4);
        assert!(!recall_output(&mut history, &book, OAK, &[]));
        assert!(!recall_output(&mut history, &book, ItemTypeId::NONE, &[]));
        assert!(history.current().is_none());
    }

    #[test]
    fn test_same_ingredient() {
        let book = book();
        assert!(same_ingredient(&book, SIGN_RECIPE, OAK, BIRCH));
        assert!(!same_ingredient(&book, SIGN_RECIPE, OAK, STICK));
    }
}
