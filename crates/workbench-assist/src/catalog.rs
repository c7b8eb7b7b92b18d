//! Recipe catalog interface and the in-memory catalog.
//!
//! The engine consumes recipes through [`RecipeCatalog`] and the permission
//! predicate through [`UsePolicy`]; it never loads recipe data itself.
//! [`RecipeBook`] is a plain in-memory implementation used by the simulator
//! and the tests.
//!
//! # Matching rules of [`RecipeBook`]
//!
//! - Shaped recipes must cover the bounding box of the occupied grid cells
//!   exactly (same width and height, every cell accepted).
//! - Shapeless recipes match when the occupied cells can be assigned one to
//!   one onto the ingredient list.
//! - Results come back in registration order, so repeated queries for the
//!   same grid are stable.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use workbench_common::{ItemTypeId, RecipeId};

use crate::grid::{GRID_SLOTS, GRID_WIDTH};
use crate::item_stack::{ItemStack, DEFAULT_MAX_STACK};

/// Positional constraint of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipeShape {
    /// Occupies a `width` x `height` sub-rectangle of the grid.
    Shaped {
        /// Pattern width (1..=3)
        width: u8,
        /// Pattern height (1..=3)
        height: u8,
    },
    /// Any arrangement of the ingredients.
    Shapeless,
}

/// Recipe lookups the engine needs.
pub trait RecipeCatalog {
    /// Recipes matching the grid, in a stable order.
    fn matches(&self, grid: &[ItemStack; GRID_SLOTS]) -> Vec<RecipeId>;

    /// Shape of a recipe.
    fn shape(&self, id: RecipeId) -> Option<RecipeShape>;

    /// Alternatives per ingredient cell.
    ///
    /// For shaped recipes this is `width * height` entries in row-major
    /// order, an empty list marking an empty pattern cell. For shapeless
    /// recipes it is one entry per ingredient.
    fn ingredients(&self, id: RecipeId) -> Vec<Vec<ItemTypeId>>;

    /// Declared output (empty for unknown recipes).
    fn output_of(&self, id: RecipeId) -> ItemStack;

    /// Recipes producing the given item, in a stable order.
    fn recipes_for_output(&self, item: ItemTypeId) -> Vec<RecipeId>;
}

/// Permission predicate deciding whether a matched recipe may produce output.
pub trait UsePolicy {
    /// Check if the recipe may be crafted in the current context.
    fn is_usable(&self, recipe: RecipeId) -> bool;
}

impl<F> UsePolicy for F
where
    F: Fn(RecipeId) -> bool,
{
    fn is_usable(&self, recipe: RecipeId) -> bool {
        self(recipe)
    }
}

/// Policy that allows every recipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl UsePolicy for AllowAll {
    fn is_usable(&self, _recipe: RecipeId) -> bool {
        true
    }
}

/// Stable textual names for identities, used by the history codec.
pub trait NameRegistry {
    /// Name of an item type.
    fn item_name(&self, item: ItemTypeId) -> Option<&str>;
    /// Item type for a name.
    fn item_by_name(&self, name: &str) -> Option<ItemTypeId>;
    /// Name of a recipe.
    fn recipe_name(&self, recipe: RecipeId) -> Option<&str>;
    /// Recipe for a name.
    fn recipe_by_name(&self, name: &str) -> Option<RecipeId>;
}

/// An item type known to the [`RecipeBook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Item identity
    pub id: ItemTypeId,
    /// Registry name
    pub name: String,
    /// Maximum stack size
    #[serde(default = "default_max_stack")]
    pub max_stack: u32,
}

fn default_max_stack() -> u32 {
    DEFAULT_MAX_STACK
}

impl ItemDefinition {
    /// Create an item definition with the default stack size.
    #[must_use]
    pub fn new(id: ItemTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    /// Set the maximum stack size.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack.max(1);
        self
    }
}

/// A recipe known to the [`RecipeBook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDefinition {
    /// Recipe identity
    pub id: RecipeId,
    /// Registry name
    pub name: String,
    /// Positional constraint
    pub shape: RecipeShape,
    /// Alternatives per ingredient cell (see [`RecipeCatalog::ingredients`])
    pub ingredients: Vec<Vec<ItemTypeId>>,
    /// Output item
    pub output: ItemTypeId,
    /// Output quantity
    #[serde(default = "default_output_count")]
    pub output_count: u32,
}

fn default_output_count() -> u32 {
    1
}

impl RecipeDefinition {
    /// Create a shaped recipe from row-major cells.
    #[must_use]
    pub fn shaped(
        id: RecipeId,
        name: impl Into<String>,
        width: u8,
        height: u8,
        cells: Vec<Vec<ItemTypeId>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            shape: RecipeShape::Shaped { width, height },
            ingredients: cells,
            output: ItemTypeId::NONE,
            output_count: 1,
        }
    }

    /// Create a shapeless recipe.
    #[must_use]
    pub fn shapeless(id: RecipeId, name: impl Into<String>, ingredients: Vec<Vec<ItemTypeId>>) -> Self {
        Self {
            id,
            name: name.into(),
            shape: RecipeShape::Shapeless,
            ingredients,
            output: ItemTypeId::NONE,
            output_count: 1,
        }
    }

    /// Set the output.
    #[must_use]
    pub fn output(mut self, item: ItemTypeId, count: u32) -> Self {
        self.output = item;
        self.output_count = count.max(1);
        self
    }

    /// Check the definition is usable on a 3x3 grid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.id.is_none() || self.output.is_none() {
            return false;
        }
        match self.shape {
            RecipeShape::Shaped { width, height } => {
                (1..=3).contains(&width)
                    && (1..=3).contains(&height)
                    && self.ingredients.len() == usize::from(width) * usize::from(height)
                    && self.ingredients.iter().any(|alts| !alts.is_empty())
            }
            RecipeShape::Shapeless => {
                !self.ingredients.is_empty()
                    && self.ingredients.len() <= GRID_SLOTS
                    && self.ingredients.iter().all(|alts| !alts.is_empty())
            }
        }
    }

    fn matches(&self, grid: &[ItemStack; GRID_SLOTS]) -> bool {
        match self.shape {
            RecipeShape::Shaped { width, height } => {
                self.matches_shaped(grid, usize::from(width), usize::from(height))
            }
            RecipeShape::Shapeless => self.matches_shapeless(grid),
        }
    }

    fn matches_shaped(&self, grid: &[ItemStack; GRID_SLOTS], width: usize, height: usize) -> bool {
        let Some((min_x, min_y, max_x, max_y)) = bounding_box(grid) else {
            return false;
        };
        if max_x - min_x + 1 != width || max_y - min_y + 1 != height {
            return false;
        }
        for y in 0..height {
            for x in 0..width {
                let stack = &grid[(min_y + y) * GRID_WIDTH + min_x + x];
                let alternatives = &self.ingredients[y * width + x];
                let ok = if alternatives.is_empty() {
                    stack.is_empty()
                } else {
                    !stack.is_empty() && alternatives.contains(&stack.item())
                };
                if !ok {
                    return false;
                }
            }
        }
        true
    }

    fn matches_shapeless(&self, grid: &[ItemStack; GRID_SLOTS]) -> bool {
        let items: Vec<ItemTypeId> = grid
            .iter()
            .filter(|s| !s.is_empty())
            .map(ItemStack::item)
            .collect();
        if items.len() != self.ingredients.len() {
            return false;
        }
        let mut used = vec![false; self.ingredients.len()];
        assign_shapeless(&items, &self.ingredients, &mut used)
    }
}

/// Bounding box `(min_x, min_y, max_x, max_y)` of the occupied cells.
fn bounding_box(grid: &[ItemStack; GRID_SLOTS]) -> Option<(usize, usize, usize, usize)> {
    let mut min_x = GRID_WIDTH;
    let mut min_y = GRID_WIDTH;
    let mut max_x = 0;
    let mut max_y = 0;

    for (index, stack) in grid.iter().enumerate() {
        if !stack.is_empty() {
            let (x, y) = (index % GRID_WIDTH, index / GRID_WIDTH);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x <= max_x && min_y <= max_y {
        Some((min_x, min_y, max_x, max_y))
    } else {
        None
    }
}

/// Backtracking assignment of grid items onto ingredient slots.
fn assign_shapeless(items: &[ItemTypeId], ingredients: &[Vec<ItemTypeId>], used: &mut [bool]) -> bool {
    let Some((&item, rest)) = items.split_first() else {
        return true;
    };
    for (slot, alternatives) in ingredients.iter().enumerate() {
        if used[slot] || !alternatives.contains(&item) {
            continue;
        }
        used[slot] = true;
        if assign_shapeless(rest, ingredients, used) {
            return true;
        }
        used[slot] = false;
    }
    false
}

/// In-memory recipe catalog and name registry.
#[derive(Debug, Default, Clone)]
pub struct RecipeBook {
    items: AHashMap<ItemTypeId, ItemDefinition>,
    items_by_name: AHashMap<String, ItemTypeId>,
    recipes: Vec<RecipeDefinition>,
    recipe_index: AHashMap<RecipeId, usize>,
    recipes_by_name: AHashMap<String, RecipeId>,
    by_output: AHashMap<ItemTypeId, Vec<RecipeId>>,
}

impl RecipeBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from item and recipe definitions.
    #[must_use]
    pub fn from_definitions(items: Vec<ItemDefinition>, recipes: Vec<RecipeDefinition>) -> Self {
        let mut book = Self::new();
        for item in items {
            book.register_item(item);
        }
        for recipe in recipes {
            book.register_recipe(recipe);
        }
        book
    }

    /// Register an item type, replacing any previous definition.
    pub fn register_item(&mut self, item: ItemDefinition) {
        if item.id.is_none() {
            warn!("Ignoring item '{}' registered with the empty identity", item.name);
            return;
        }
        self.items_by_name.insert(item.name.clone(), item.id);
        self.items.insert(item.id, item);
    }

    /// Register a recipe. Invalid or duplicate definitions are ignored.
    pub fn register_recipe(&mut self, recipe: RecipeDefinition) -> bool {
        if !recipe.is_valid() {
            warn!("Ignoring invalid recipe '{}' ({})", recipe.name, recipe.id);
            return false;
        }
        if self.recipe_index.contains_key(&recipe.id) {
            warn!("Ignoring duplicate recipe id {}", recipe.id);
            return false;
        }
        debug!("Registered recipe '{}' ({})", recipe.name, recipe.id);
        self.recipe_index.insert(recipe.id, self.recipes.len());
        self.recipes_by_name.insert(recipe.name.clone(), recipe.id);
        self.by_output.entry(recipe.output).or_default().push(recipe.id);
        self.recipes.push(recipe);
        true
    }

    /// Look up a recipe definition.
    #[must_use]
    pub fn recipe(&self, id: RecipeId) -> Option<&RecipeDefinition> {
        self.recipe_index.get(&id).map(|&index| &self.recipes[index])
    }

    /// Look up an item definition.
    #[must_use]
    pub fn item(&self, id: ItemTypeId) -> Option<&ItemDefinition> {
        self.items.get(&id)
    }

    /// Maximum stack size of an item (default when unknown).
    #[must_use]
    pub fn max_stack(&self, id: ItemTypeId) -> u32 {
        self.items.get(&id).map_or(DEFAULT_MAX_STACK, |item| item.max_stack)
    }

    /// Create a stack of an item using its registered stack size.
    #[must_use]
    pub fn stack(&self, id: ItemTypeId, count: u32) -> ItemStack {
        ItemStack::with_max(id, count, self.max_stack(id))
    }

    /// Number of registered recipes.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}

impl RecipeCatalog for RecipeBook {
    fn matches(&self, grid: &[ItemStack; GRID_SLOTS]) -> Vec<RecipeId> {
        self.recipes
            .iter()
            .filter(|recipe| recipe.matches(grid))
            .map(|recipe| recipe.id)
            .collect()
    }

    fn shape(&self, id: RecipeId) -> Option<RecipeShape> {
        self.recipe(id).map(|recipe| recipe.shape)
    }

    fn ingredients(&self, id: RecipeId) -> Vec<Vec<ItemTypeId>> {
        self.recipe(id)
            .map(|recipe| recipe.ingredients.clone())
            .unwrap_or_default()
    }

    fn output_of(&self, id: RecipeId) -> ItemStack {
        self.recipe(id)
            .map_or_else(ItemStack::empty, |recipe| {
                self.stack(recipe.output, recipe.output_count)
            })
    }

    fn recipes_for_output(&self, item: ItemTypeId) -> Vec<RecipeId> {
        self.by_output.get(&item).cloned().unwrap_or_default()
    }
}

impl NameRegistry for RecipeBook {
    fn item_name(&self, item: ItemTypeId) -> Option<&str> {
        self.items.get(&item).map(|def| def.name.as_str())
    }

    fn item_by_name(&self, name: &str) -> Option<ItemTypeId> {
        self.items_by_name.get(name).copied()
    }

    fn recipe_name(&self, recipe: RecipeId) -> Option<&str> {
        self.recipe(recipe).map(|def| def.name.as_str())
    }

    fn recipe_by_name(&self, name: &str) -> Option<RecipeId> {
        self.recipes_by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANK: ItemTypeId = ItemTypeId::new(1);
    const STICK: ItemTypeId = ItemTypeId::new(2);
    const BIRCH: ItemTypeId = ItemTypeId::new(3);
    const TORCH: ItemTypeId = ItemTypeId::new(4);
    const COAL: ItemTypeId = ItemTypeId::new(5);

    fn book() -> RecipeBook {
        let items = vec![
            ItemDefinition::new(PLANK, "plank"),
            ItemDefinition::new(STICK, "stick"),
            ItemDefinition::new(BIRCH, "birch_plank"),
            ItemDefinition::new(TORCH, "torch").max_stack(16),
            ItemDefinition::new(COAL, "coal"),
        ];
        let recipes = vec![
            RecipeDefinition::shaped(
                RecipeId::new(1),
                "sticks",
                1,
                2,
                vec![vec![PLANK, BIRCH], vec![PLANK, BIRCH]],
            )
            .output(STICK, 4),
            RecipeDefinition::shaped(RecipeId::new(2), "torch", 1, 2, vec![vec![COAL], vec![STICK]])
                .output(TORCH, 4),
            RecipeDefinition::shapeless(
                RecipeId::new(3),
                "coal_mix",
                vec![vec![COAL], vec![STICK], vec![PLANK, BIRCH]],
            )
            .output(TORCH, 1),
        ];
        RecipeBook::from_definitions(items, recipes)
    }

    fn grid(cells: &[(usize, ItemTypeId)]) -> [ItemStack; GRID_SLOTS] {
        let mut grid = [ItemStack::empty(); GRID_SLOTS];
        for &(index, item) in cells {
            grid[index] = ItemStack::new(item, 1);
        }
        grid
    }

    #[test]
    fn test_shaped_match_anywhere_in_grid() {
        let book = book();
        assert_eq!(book.matches(&grid(&[(0, PLANK), (3, PLANK)])), vec![RecipeId::new(1)]);
        assert_eq!(book.matches(&grid(&[(5, BIRCH), (8, PLANK)])), vec![RecipeId::new(1)]);
    }

    #[test]
    fn test_shaped_rejects_extra_items() {
        let book = book();
        assert!(book.matches(&grid(&[(0, PLANK), (3, PLANK), (4, STICK)])).is_empty());
        assert!(book.matches(&grid(&[(0, PLANK), (6, PLANK)])).is_empty());
    }

    #[test]
    fn test_shapeless_match_any_order() {
        let book = book();
        let found = book.matches(&grid(&[(8, BIRCH), (0, STICK), (4, COAL)]));
        assert_eq!(found, vec![RecipeId::new(3)]);
        assert!(book.matches(&grid(&[(0, STICK), (4, COAL)])).is_empty());
    }

    #[test]
    fn test_output_uses_item_stack_size() {
        let book = book();
        let out = book.output_of(RecipeId::new(2));
        assert_eq!(out.item(), TORCH);
        assert_eq!(out.count(), 4);
        assert_eq!(out.max_count(), 16);
        assert!(book.output_of(RecipeId::new(99)).is_empty());
    }

    #[test]
    fn test_recipes_for_output_in_registration_order() {
        let book = book();
        assert_eq!(
            book.recipes_for_output(TORCH),
            vec![RecipeId::new(2), RecipeId::new(3)]
        );
        assert!(book.recipes_for_output(PLANK).is_empty());
    }

    #[test]
    fn test_invalid_and_duplicate_recipes_rejected() {
        let mut book = book();
        let bad = RecipeDefinition::shaped(RecipeId::new(9), "bad", 2, 2, vec![vec![PLANK]])
            .output(STICK, 1);
        assert!(!book.register_recipe(bad));
        let dup = RecipeDefinition::shapeless(RecipeId::new(1), "dup", vec![vec![PLANK]])
            .output(STICK, 1);
        assert!(!book.register_recipe(dup));
        let unnamed = RecipeDefinition::shapeless(RecipeId::NONE, "none", vec![vec![PLANK]])
            .output(STICK, 1);
        assert!(!book.register_recipe(unnamed));
        assert_eq!(book.recipe_count(), 3);
    }

    #[test]
    fn test_name_registry() {
        let book = book();
        assert_eq!(book.item_name(TORCH), Some("torch"));
        assert_eq!(book.item_by_name("coal"), Some(COAL));
        assert_eq!(book.recipe_name(RecipeId::new(3)), Some("coal_mix"));
        assert_eq!(book.recipe_by_name("sticks"), Some(RecipeId::new(1)));
        assert_eq!(book.item_by_name("missing"), None);
    }

    #[test]
    fn test_use_policy_closure() {
        let only_first = |id: RecipeId| id == RecipeId::new(1);
        assert!(only_first.is_usable(RecipeId::new(1)));
        assert!(!only_first.is_usable(RecipeId::new(2)));
        assert!(AllowAll.is_usable(RecipeId::new(2)));
    }
}
