//! Grid state and recipe resolution.
//!
//! [`GridState`] holds the nine input stacks, the derived output stack and
//! the recipe the grid is currently bound to. Resolution keeps the bound
//! recipe across re-evaluation as long as it still matches; collision
//! cycling walks the usable matches in a stable hash order.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::debug;
use workbench_common::{ItemTypeId, RecipeId};

use crate::catalog::{RecipeCatalog, UsePolicy};
use crate::item_stack::ItemStack;

/// Width (and height) of the crafting grid.
pub const GRID_WIDTH: usize = 3;

/// Number of grid cells.
pub const GRID_SLOTS: usize = GRID_WIDTH * GRID_WIDTH;

/// The 3x3 crafting grid with its derived output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    stacks: [ItemStack; GRID_SLOTS],
    output: ItemStack,
    bound_recipe: Option<RecipeId>,
    has_collision: bool,
}

impl Default for GridState {
    fn default() -> Self {
        Self::new()
    }
}

impl GridState {
    /// Create an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stacks: [ItemStack::empty(); GRID_SLOTS],
            output: ItemStack::empty(),
            bound_recipe: None,
            has_collision: false,
        }
    }

    /// The input stacks, row-major.
    #[must_use]
    pub fn stacks(&self) -> &[ItemStack; GRID_SLOTS] {
        &self.stacks
    }

    /// Mutable access to the input stacks. Call [`GridState::resolve`]
    /// afterwards.
    pub fn stacks_mut(&mut self) -> &mut [ItemStack; GRID_SLOTS] {
        &mut self.stacks
    }

    /// Get the stack in one cell (empty when out of range).
    #[must_use]
    pub fn stack(&self, index: usize) -> ItemStack {
        self.stacks.get(index).copied().unwrap_or_default()
    }

    /// Replace the stack in one cell. Returns false when out of range.
    pub fn set_stack(&mut self, index: usize, stack: ItemStack) -> bool {
        match self.stacks.get_mut(index) {
            Some(slot) => {
                *slot = stack;
                true
            }
            None => false,
        }
    }

    /// The derived output stack.
    #[must_use]
    pub fn output(&self) -> ItemStack {
        self.output
    }

    /// The recipe the grid is bound to.
    #[must_use]
    pub fn bound_recipe(&self) -> Option<RecipeId> {
        self.bound_recipe
    }

    /// Whether more than one recipe matches the grid.
    #[must_use]
    pub fn has_collision(&self) -> bool {
        self.has_collision
    }

    /// Check if every cell is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.iter().all(ItemStack::is_empty)
    }

    /// Identities of the cells (`NONE` for empty cells).
    #[must_use]
    pub fn cell_identities(&self) -> [ItemTypeId; GRID_SLOTS] {
        self.stacks.map(|s| if s.is_empty() { ItemTypeId::NONE } else { s.item() })
    }

    /// Total units in the grid.
    #[must_use]
    pub fn total_units(&self) -> u32 {
        self.stacks.iter().map(ItemStack::count).sum()
    }

    /// Prefer `recipe` the next time the grid is resolved.
    pub fn bind_hint(&mut self, recipe: Option<RecipeId>) {
        if recipe.is_some() {
            self.bound_recipe = recipe;
        }
    }

    /// Remove one unit from every occupied cell.
    pub fn consume_one_each(&mut self) {
        for stack in &mut self.stacks {
            stack.shrink(1);
        }
    }

    /// Re-evaluate the bound recipe, the output and the collision flag.
    ///
    /// Returns true if any derived field changed.
    pub fn resolve<C, P>(&mut self, catalog: &C, policy: &P) -> bool
    where
        C: RecipeCatalog + ?Sized,
        P: UsePolicy + ?Sized,
    {
        let before = (self.output, self.bound_recipe, self.has_collision);
        let matches = catalog.matches(&self.stacks);

        match matches.first() {
            None => {
                self.bound_recipe = None;
                self.output = ItemStack::empty();
                self.has_collision = false;
            }
            Some(&first) => {
                let bound = self
                    .bound_recipe
                    .filter(|id| matches.contains(id))
                    .unwrap_or(first);
                self.bound_recipe = Some(bound);
                self.has_collision = matches.len() > 1;
                self.output = if policy.is_usable(bound) {
                    catalog.output_of(bound)
                } else {
                    ItemStack::empty()
                };
            }
        }

        let changed = before != (self.output, self.bound_recipe, self.has_collision);
        if changed {
            debug!(
                "Grid resolved to {:?} (collision: {})",
                self.bound_recipe, self.has_collision
            );
        }
        changed
    }

    /// Rebind to the next usable matching recipe, in stable hash order.
    ///
    /// Returns true if the bound recipe changed.
    pub fn cycle_collision<C, P>(&mut self, catalog: &C, policy: &P) -> bool
    where
        C: RecipeCatalog + ?Sized,
        P: UsePolicy + ?Sized,
    {
        let matches = catalog.matches(&self.stacks);
        if matches.len() < 2 {
            return false;
        }
        let mut usable: Vec<RecipeId> = matches
            .into_iter()
            .filter(|&id| policy.is_usable(id))
            .collect();
        usable.sort_by_key(|&id| (recipe_hash(id), id));

        let position = self
            .bound_recipe
            .and_then(|bound| usable.iter().position(|&id| id == bound));
        let next = match position {
            Some(index) => usable[(index + 1) % usable.len()],
            None => match usable.first() {
                Some(&first) => first,
                None => return false,
            },
        };
        if self.bound_recipe == Some(next) {
            return false;
        }

        debug!("Collision cycle {:?} -> {}", self.bound_recipe, next);
        self.bound_recipe = Some(next);
        self.output = catalog.output_of(next);
        true
    }
}

/// Stable ordering key used for collision cycling.
#[must_use]
pub fn recipe_hash(id: RecipeId) -> u64 {
    let mut hasher = FxHasher::default();
    id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AllowAll, ItemDefinition, RecipeBook, RecipeDefinition};

    const PLANK: ItemTypeId = ItemTypeId::new(1);
    const BUTTON: ItemTypeId = ItemTypeId::new(2);
    const PLATE: ItemTypeId = ItemTypeId::new(3);

    fn colliding_book() -> RecipeBook {
        RecipeBook::from_definitions(
            vec![
                ItemDefinition::new(PLANK, "plank"),
                ItemDefinition::new(BUTTON, "button"),
                ItemDefinition::new(PLATE, "plate"),
            ],
            vec![
                RecipeDefinition::shapeless(RecipeId::new(10), "button", vec![vec![PLANK]])
                    .output(BUTTON, 1),
                RecipeDefinition::shaped(RecipeId::new(11), "plate", 1, 1, vec![vec![PLANK]])
                    .output(PLATE, 1),
            ],
        )
    }

    #[test]
    fn test_empty_grid_resolves_to_nothing() {
        let book = colliding_book();
        let mut grid = GridState::new();
        assert!(!grid.resolve(&book, &AllowAll));
        assert!(grid.output().is_empty());
        assert_eq!(grid.bound_recipe(), None);
        assert!(!grid.has_collision());
    }

    #[test]
    fn test_resolve_binds_first_and_flags_collision() {
        let book = colliding_book();
        let mut grid = GridState::new();
        grid.set_stack(4, ItemStack::new(PLANK, 1));
        assert!(grid.resolve(&book, &AllowAll));
        assert_eq!(grid.bound_recipe(), Some(RecipeId::new(10)));
        assert!(grid.has_collision());
        assert_eq!(grid.output().item(), BUTTON);
    }

    #[test]
    fn test_resolve_keeps_bound_recipe() {
        let book = colliding_book();
        let mut grid = GridState::new();
        grid.set_stack(4, ItemStack::new(PLANK, 1));
        grid.bind_hint(Some(RecipeId::new(11)));
        grid.resolve(&book, &AllowAll);
        assert_eq!(grid.bound_recipe(), Some(RecipeId::new(11)));
        assert_eq!(grid.output().item(), PLATE);
    }

    #[test]
    fn test_unusable_recipe_has_no_output() {
        let book = colliding_book();
        let mut grid = GridState::new();
        grid.set_stack(0, ItemStack::new(PLANK, 1));
        grid.resolve(&book, &|_: RecipeId| false);
        assert!(grid.bound_recipe().is_some());
        assert!(grid.output().is_empty());
    }

    #[test]
    fn test_cycle_collision_wraps() {
        let book = colliding_book();
        let mut grid = GridState::new();
        grid.set_stack(0, ItemStack::new(PLANK, 1));
        grid.resolve(&book, &AllowAll);

        let start = grid.bound_recipe();
        assert!(grid.cycle_collision(&book, &AllowAll));
        let second = grid.bound_recipe();
        assert_ne!(start, second);
        assert!(grid.cycle_collision(&book, &AllowAll));
        assert_eq!(grid.bound_recipe(), start);

        // Resolution after cycling keeps the cycled recipe.
        grid.cycle_collision(&book, &AllowAll);
        grid.resolve(&book, &AllowAll);
        assert_eq!(grid.bound_recipe(), second);
    }

    #[test]
    fn test_cycle_skips_unusable_in_hash_order() {
        let book = RecipeBook::from_definitions(
            vec![
                ItemDefinition::new(PLANK, "plank"),
                ItemDefinition::new(BUTTON, "button"),
            ],
            (10..=13)
                .map(|n| {
                    RecipeDefinition::shapeless(
                        RecipeId::new(n),
                        format!("button_{n}"),
                        vec![vec![PLANK]],
                    )
                    .output(BUTTON, 1)
                })
                .collect(),
        );
        let locked = RecipeId::new(11);
        let policy = |id: RecipeId| id != locked;

        let mut order: Vec<RecipeId> = [10, 12, 13].into_iter().map(RecipeId::new).collect();
        order.sort_by_key(|&id| (recipe_hash(id), id));

        let mut grid = GridState::new();
        grid.set_stack(0, ItemStack::new(PLANK, 1));
        grid.resolve(&book, &policy);
        assert_eq!(grid.bound_recipe(), Some(RecipeId::new(10)));

        let start = order.iter().position(|&id| id == RecipeId::new(10)).expect("usable");
        for step in 1..=order.len() {
            assert!(grid.cycle_collision(&book, &policy));
            assert_eq!(grid.bound_recipe(), Some(order[(start + step) % order.len()]));
            assert_ne!(grid.bound_recipe(), Some(locked));
        }

        // A bound recipe the policy rejects restarts the cycle at the front.
        grid.bind_hint(Some(locked));
        grid.resolve(&book, &policy);
        assert!(grid.output().is_empty());
        assert!(grid.cycle_collision(&book, &policy));
        assert_eq!(grid.bound_recipe(), Some(order[0]));
        assert_eq!(grid.output().item(), BUTTON);
    }

    #[test]
    fn test_cycle_without_collision_is_noop() {
        let book = colliding_book();
        let mut grid = GridState::new();
        assert!(!grid.cycle_collision(&book, &AllowAll));
    }

    #[test]
    fn test_consume_and_identities() {
        let mut grid = GridState::new();
        grid.set_stack(0, ItemStack::new(PLANK, 2));
        grid.set_stack(8, ItemStack::new(BUTTON, 1));
        grid.consume_one_each();
        let cells = grid.cell_identities();
        assert_eq!(cells[0], PLANK);
        assert_eq!(cells[8], ItemTypeId::NONE);
        assert_eq!(grid.total_units(), 1);
    }
}
