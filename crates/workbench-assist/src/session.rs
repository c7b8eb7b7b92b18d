//! Authoritative workbench session.
//!
//! [`WorkbenchSession`] owns the grid and the history and is the only place
//! where they change. Each call handles one intent against the storage pools
//! lent by the caller, re-resolves the grid and publishes a snapshot when
//! something was committed.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use workbench_common::{ItemTypeId, WorkbenchResult};

use crate::catalog::{AllowAll, NameRegistry, RecipeCatalog, UsePolicy};
use crate::config::AssistConfig;
use crate::grid::GridState;
use crate::history::{HistoryBlob, HistoryCache, HistoryEntry};
use crate::intent::Intent;
use crate::item_stack::ItemStack;
use crate::placement::{
    decrease_grid_stacks, distribute_stack, increase_grid_stacks, move_grid_to, move_into_ranges,
    place_from_template, refab_template, PlacementResult,
};
use crate::recall::{recall_output, same_ingredient};
use crate::storage::{PoolKind, SlotRef, StoragePools, StorageRange};
use crate::sync::{Snapshot, SnapshotPublisher, WorkbenchMirror};

/// The single writer of grid and history state.
#[derive(Debug)]
pub struct WorkbenchSession<C, P = AllowAll> {
    catalog: C,
    policy: P,
    config: AssistConfig,
    grid: GridState,
    history: HistoryCache,
    publisher: SnapshotPublisher,
}

impl<C: RecipeCatalog> WorkbenchSession<C, AllowAll> {
    /// Create a session in which every recipe is usable.
    #[must_use]
    pub fn new(catalog: C, config: AssistConfig) -> Self {
        Self::with_policy(catalog, AllowAll, config)
    }
}

impl<C: RecipeCatalog, P: UsePolicy> WorkbenchSession<C, P> {
    /// Create a session with a custom permission predicate.
    #[must_use]
    pub fn with_policy(catalog: C, policy: P, mut config: AssistConfig) -> Self {
        config.validate();
        let history = HistoryCache::new(config.history_capacity);
        Self {
            catalog,
            policy,
            config,
            grid: GridState::new(),
            history,
            publisher: SnapshotPublisher::new(),
        }
    }

    // === Accessors ===

    /// The recipe catalog.
    #[must_use]
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    /// Current grid.
    #[must_use]
    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    /// Current history.
    #[must_use]
    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    /// Revision of the last published snapshot.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.publisher.revision()
    }

    /// Current state as a snapshot (not published).
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: workbench_common::SchemaVersion::SNAPSHOT,
            revision: self.publisher.revision(),
            grid: self.grid.clone(),
            history: self.history.clone(),
        }
    }

    /// Register a replica. The current state is published right away.
    pub fn subscribe(&mut self) -> WorkbenchMirror {
        let mirror = self.publisher.subscribe();
        self.publisher.publish(&self.grid, &self.history);
        mirror
    }

    fn commit(&mut self) {
        self.grid.resolve(&self.catalog, &self.policy);
        self.publisher.publish(&self.grid, &self.history);
    }

    // === Direct grid access ===

    /// Put a stack into a grid cell, replacing its content.
    pub fn put_stack(&mut self, index: usize, stack: ItemStack) -> bool {
        if !self.grid.set_stack(index, stack) {
            warn!("Grid index {} out of range", index);
            return false;
        }
        self.commit();
        true
    }

    /// Take the whole stack out of a grid cell.
    pub fn take_stack(&mut self, index: usize) -> ItemStack {
        let stack = self.grid.stack(index);
        if stack.is_empty() {
            return stack;
        }
        self.grid.set_stack(index, ItemStack::empty());
        self.commit();
        stack
    }

    /// Complete one craft and return its output.
    ///
    /// One unit is consumed from every occupied cell and the crafted
    /// arrangement is recorded in the history.
    pub fn take_output(&mut self) -> ItemStack {
        let output = self.grid.output();
        let Some(recipe) = self.grid.bound_recipe() else {
            return ItemStack::empty();
        };
        if output.is_empty() {
            return output;
        }

        let cells = self.grid.cell_identities();
        self.grid.consume_one_each();
        if self.config.assist_enabled {
            self.history.record(cells, recipe, output.item());
        }
        info!("Crafted {} x {:?} with {}", output.count(), output.item(), recipe);
        self.commit();
        output
    }

    // === Configuration and persistence ===

    /// Apply a new configuration to the live session.
    pub fn apply_config(&mut self, mut config: AssistConfig) {
        config.validate();
        self.history.set_capacity(config.history_capacity);
        if !config.assist_enabled {
            self.history.clear();
        }
        self.config = config;
        debug!("Applied config {:?}", self.config);
        self.commit();
    }

    /// History in its persisted form.
    #[must_use]
    pub fn export_history<N: NameRegistry + ?Sized>(&self, names: &N) -> HistoryBlob {
        self.history.to_blob(names)
    }

    /// Replace the history from its persisted form.
    pub fn restore_history<N: NameRegistry + ?Sized>(&mut self, blob: &HistoryBlob, names: &N) {
        let mut history = HistoryCache::from_blob(blob, names);
        history.set_capacity(self.config.history_capacity);
        if !self.config.assist_enabled {
            history.clear();
        }
        self.history = history;
        self.commit();
    }

    /// Write the history blob to a file.
    pub fn save_history<N, Q>(&self, path: Q, names: &N) -> WorkbenchResult<()>
    where
        N: NameRegistry + ?Sized,
        Q: AsRef<Path>,
    {
        let bytes = self.export_history(names).to_bytes()?;
        fs::write(path.as_ref(), bytes)?;
        info!("Saved crafting history to {}", path.as_ref().display());
        Ok(())
    }

    /// Read the history blob from a file.
    pub fn load_history<N, Q>(&mut self, path: Q, names: &N) -> WorkbenchResult<()>
    where
        N: NameRegistry + ?Sized,
        Q: AsRef<Path>,
    {
        let bytes = fs::read(path.as_ref())?;
        let blob = HistoryBlob::from_bytes(&bytes)?;
        self.restore_history(&blob, names);
        info!("Loaded crafting history from {}", path.as_ref().display());
        Ok(())
    }

    // === Intents ===

    /// Handle one intent.
    ///
    /// Never fails: "nothing to do" is reported as
    /// [`PlacementResult::Unchanged`].
    pub fn apply(&mut self, intent: Intent, pools: &mut StoragePools<'_>) -> PlacementResult {
        if !self.config.assist_enabled {
            debug!("Assist disabled, ignoring {}", intent.name());
            return PlacementResult::Unchanged;
        }

        let result = match intent {
            Intent::Next => self.navigate(pools, HistoryCache::next),
            Intent::Prev => self.navigate(pools, HistoryCache::prev),
            Intent::ClearSelection => self.navigate(pools, HistoryCache::reset),
            Intent::PlaceCurrent => self.place_current(pools),
            Intent::DistributeFromSlot(slot) => self.distribute_from(slot, pools),
            Intent::DistributeAllMatching(slot) => self.distribute_all_matching(slot, pools),
            Intent::MoveStack(slot) => self.move_stack(slot, pools),
            Intent::MoveAllMatching(slot) => self.move_all_matching(slot, pools),
            Intent::CycleCollisionRecipe => PlacementResult::from_changed(
                self.grid.cycle_collision(&self.catalog, &self.policy),
            ),
            Intent::ScaleUp(target) => self.scale_up(target, pools),
            Intent::ScaleDown(step) => self.scale_down(step, pools),
            Intent::RecallOutput { held } => self.recall(held, pools),
        };

        debug!("Intent {} -> {:?}", intent.name(), result);
        if result.changed() {
            self.commit();
        }
        result
    }

    /// Move the grid back to storage (block storage first) and step the
    /// selection.
    fn navigate(
        &mut self,
        pools: &mut StoragePools<'_>,
        step: fn(&mut HistoryCache),
    ) -> PlacementResult {
        let before = (self.history.cursor(), self.history.stashed().copied());
        step(&mut self.history);
        let moved = move_grid_to(self.grid.stacks_mut(), &mut pools.all_mut());
        let selection_changed = before != (self.history.cursor(), self.history.stashed().copied());
        PlacementResult::from_changed(moved || selection_changed)
    }

    /// The current entry if the grid is consistent with it.
    fn template_entry(&self) -> Option<HistoryEntry> {
        let entry = *self.history.current()?;
        let catalog = &self.catalog;
        refab_template(
            self.grid.stacks(),
            &entry,
            |a, b| same_ingredient(catalog, entry.recipe_id, a, b),
            self.config.grid_stack_limit,
        )
        .map(|_| entry)
    }

    fn place_current(&mut self, pools: &mut StoragePools<'_>) -> PlacementResult {
        let Some(entry) = self.history.current().copied() else {
            return PlacementResult::Unchanged;
        };
        let catalog = &self.catalog;
        let Some(template) = refab_template(
            self.grid.stacks(),
            &entry,
            |a, b| same_ingredient(catalog, entry.recipe_id, a, b),
            self.config.grid_stack_limit,
        ) else {
            debug!("Grid does not fit {}, nothing to place", entry.recipe_id);
            return PlacementResult::Unchanged;
        };

        let result = place_from_template(
            self.grid.stacks_mut(),
            &template,
            &mut pools.all_mut(),
            self.config.grid_stack_limit,
        );
        if result.changed() {
            self.grid.bind_hint(Some(entry.recipe_id));
        }
        result
    }

    fn distribute_from(&mut self, slot: SlotRef, pools: &mut StoragePools<'_>) -> PlacementResult {
        let entry = self.template_entry();
        let Some(range) = pools.pool_mut(slot.pool) else {
            warn!("Cannot distribute from {:?}", slot);
            return PlacementResult::Unchanged;
        };
        let mut source = range.get(slot.index);
        if source.is_empty() {
            return PlacementResult::Unchanged;
        }

        let catalog = &self.catalog;
        let accepts = |index: usize, stack: &ItemStack| {
            entry.is_some_and(|e| {
                let wanted = e.cells[index];
                !wanted.is_none()
                    && (wanted == stack.item()
                        || same_ingredient(catalog, e.recipe_id, wanted, stack.item()))
            })
        };
        let result = distribute_stack(
            self.grid.stacks_mut(),
            &mut source,
            accepts,
            self.config.grid_stack_limit,
        );
        if result.changed() {
            range.set(slot.index, source);
            if let Some(e) = entry {
                self.grid.bind_hint(Some(e.recipe_id));
            }
        }
        result
    }

    fn distribute_all_matching(&mut self, slot: SlotRef, pools: &mut StoragePools<'_>) -> PlacementResult {
        let Some(reference) = pools.pool(slot.pool).map(|range| range.get(slot.index)) else {
            warn!("Cannot distribute from {:?}", slot);
            return PlacementResult::Unchanged;
        };
        if !self.distribute_from(slot, pools).changed() {
            return PlacementResult::Unchanged;
        }

        let arity = pools.pool(slot.pool).map_or(0, StorageRange::arity);
        for index in (0..arity).filter(|&i| i != slot.index) {
            let identical = pools
                .pool(slot.pool)
                .is_some_and(|range| reference.is_identical(&range.get(index)));
            if !identical {
                continue;
            }
            if !self
                .distribute_from(SlotRef::new(slot.pool, index), pools)
                .changed()
            {
                break;
            }
        }
        PlacementResult::Placed
    }

    fn move_stack(&mut self, slot: SlotRef, pools: &mut StoragePools<'_>) -> PlacementResult {
        let stack = match slot.pool {
            PoolKind::Grid => self.grid.stack(slot.index),
            kind => pools.pool(kind).map_or_else(ItemStack::empty, |r| r.get(slot.index)),
        };
        if stack.is_empty() {
            return PlacementResult::Unchanged;
        }

        let rest = match slot.pool {
            PoolKind::Grid => {
                let rest = move_into_ranges(stack, &mut pools.all_mut());
                self.grid.set_stack(slot.index, rest);
                rest
            }
            PoolKind::BlockStorage => {
                let rest = move_into_ranges(stack, &mut pools.player_mut());
                pools.block.set(slot.index, rest);
                rest
            }
            PoolKind::PlayerMain | PoolKind::PlayerHotbar => {
                let rest = move_into_ranges(stack, &mut pools.block_mut());
                if let Some(range) = pools.pool_mut(slot.pool) {
                    range.set(slot.index, rest);
                }
                rest
            }
        };
        PlacementResult::from_changed(rest.count() != stack.count())
    }

    fn move_all_matching(&mut self, slot: SlotRef, pools: &mut StoragePools<'_>) -> PlacementResult {
        if slot.pool == PoolKind::Grid {
            let moved = move_grid_to(self.grid.stacks_mut(), &mut pools.player_then_block_mut());
            return PlacementResult::from_changed(moved);
        }

        let reference = pools
            .pool(slot.pool)
            .map_or_else(ItemStack::empty, |r| r.get(slot.index));
        if reference.is_empty() {
            return PlacementResult::Unchanged;
        }

        let StoragePools {
            block,
            player_main,
            player_hotbar,
        } = pools;
        let moved = if slot.pool == PoolKind::BlockStorage {
            move_matching(block, &reference, &mut [&mut *player_main, &mut *player_hotbar])
        } else {
            let main = move_matching(player_main, &reference, &mut [&mut *block]);
            let hotbar = move_matching(player_hotbar, &reference, &mut [&mut *block]);
            main || hotbar
        };
        PlacementResult::from_changed(moved)
    }

    fn scale_up(&mut self, target: u32, pools: &mut StoragePools<'_>) -> PlacementResult {
        if !self.config.scroll_scaling {
            return PlacementResult::Unchanged;
        }
        increase_grid_stacks(
            self.grid.stacks_mut(),
            &mut pools.all_mut(),
            target.max(1),
            self.config.grid_stack_limit,
        )
    }

    fn scale_down(&mut self, step: u32, pools: &mut StoragePools<'_>) -> PlacementResult {
        if !self.config.scroll_scaling {
            return PlacementResult::Unchanged;
        }
        let step = self.config.scale_down_step(step);
        PlacementResult::from_changed(decrease_grid_stacks(
            self.grid.stacks_mut(),
            &mut pools.all_mut(),
            step,
        ))
    }

    fn recall(&mut self, held: Option<ItemTypeId>, pools: &mut StoragePools<'_>) -> PlacementResult {
        if !self.config.output_slot_recall || !self.grid.is_empty() {
            return PlacementResult::Unchanged;
        }
        let Some(output) = held
            .filter(|item| !item.is_none())
            .or_else(|| self.history.current().map(|e| e.output))
        else {
            return PlacementResult::Unchanged;
        };

        let before = (self.history.cursor(), self.history.stashed().copied());
        recall_output(&mut self.history, &self.catalog, output, &pools.all());
        let after = (self.history.cursor(), self.history.stashed().copied());
        PlacementResult::from_changed(before != after)
    }
}

/// Move every stack of `from` identical to `reference` into `targets`.
fn move_matching(
    from: &mut StorageRange<'_>,
    reference: &ItemStack,
    targets: &mut [&mut StorageRange<'_>],
) -> bool {
    let mut moved = false;
    for index in 0..from.arity() {
        let stack = from.get(index);
        if stack.is_empty() || stack.is_different(reference) {
            continue;
        }
        let rest = move_into_ranges(stack, targets);
        moved |= rest.count() != stack.count();
        from.set(index, rest);
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemDefinition, RecipeBook, RecipeDefinition};
    use workbench_common::RecipeId;

    const PLANK: ItemTypeId = ItemTypeId::new(1);
    const STICK: ItemTypeId = ItemTypeId::new(2);
    const COAL: ItemTypeId = ItemTypeId::new(3);
    const TORCH: ItemTypeId = ItemTypeId::new(4);

    const STICKS: RecipeId = RecipeId::new(1);
    const TORCHES: RecipeId = RecipeId::new(2);

    fn book() -> RecipeBook {
        RecipeBook::from_definitions(
            vec![
                ItemDefinition::new(PLANK, "plank"),
                ItemDefinition::new(STICK, "stick"),
                ItemDefinition::new(COAL, "coal"),
                ItemDefinition::new(TORCH, "torch"),
            ],
            vec![
                RecipeDefinition::shaped(STICKS, "sticks", 1, 2, vec![vec![PLANK], vec![PLANK]])
                    .output(STICK, 4),
                RecipeDefinition::shaped(TORCHES, "torches", 1, 2, vec![vec![COAL], vec![STICK]])
                    .output(TORCH, 4),
            ],
        )
    }

    fn session() -> WorkbenchSession<RecipeBook> {
        WorkbenchSession::new(book(), AssistConfig::default())
    }

    fn craft_sticks(session: &mut WorkbenchSession<RecipeBook>) {
        session.put_stack(3, ItemStack::new(PLANK, 1));
        session.put_stack(6, ItemStack::new(PLANK, 1));
        let out = session.take_output();
        assert_eq!(out.item(), STICK);
    }

    #[test]
    fn test_take_output_records_history() {
        let mut session = session();
        craft_sticks(&mut session);
        assert!(session.grid().is_empty());
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().entries()[0].recipe_id, STICKS);
        assert!(session.take_output().is_empty());
    }

    #[test]
    fn test_next_then_place_current() {
        let mut session = session();
        craft_sticks(&mut session);

        let mut block = vec![ItemStack::new(PLANK, 10)];
        let mut player = vec![ItemStack::empty(); 4];
        let mut pools = StoragePools::from_player_inventory(&mut block, &mut player, 2);

        assert_eq!(session.apply(Intent::Next, &mut pools), PlacementResult::Placed);
        assert_eq!(session.apply(Intent::PlaceCurrent, &mut pools), PlacementResult::Placed);
        assert_eq!(session.grid().stack(3).count(), 1);
        assert_eq!(session.grid().stack(6).count(), 1);
        assert_eq!(session.grid().output().item(), STICK);

        // A second placement levels both cells up by one.
        assert_eq!(session.apply(Intent::PlaceCurrent, &mut pools), PlacementResult::Placed);
        assert_eq!(session.grid().stack(3).count(), 2);
        drop(pools);
        assert_eq!(block[0].count(), 6);
    }

    #[test]
    fn test_next_moves_grid_to_storage() {
        let mut session = session();
        craft_sticks(&mut session);
        session.put_stack(0, ItemStack::new(COAL, 3));

        let mut block = vec![ItemStack::empty()];
        let mut player = vec![ItemStack::empty(); 2];
        let mut pools = StoragePools::from_player_inventory(&mut block, &mut player, 1);
        assert_eq!(session.apply(Intent::Next, &mut pools), PlacementResult::Placed);
        assert!(session.grid().is_empty());
        drop(pools);
        assert_eq!(block[0].item(), COAL);
    }

    #[test]
    fn test_distribute_from_slot_writes_residual() {
        let mut session = session();
        session.put_stack(3, ItemStack::new(PLANK, 1));
        session.put_stack(6, ItemStack::new(PLANK, 3));

        let mut block = vec![ItemStack::empty()];
        let mut player = vec![ItemStack::new(PLANK, 5)];
        let mut pools = StoragePools::from_player_inventory(&mut block, &mut player, 1);
        let slot = SlotRef::new(PoolKind::PlayerHotbar, 0);
        assert_eq!(
            session.apply(Intent::DistributeFromSlot(slot), &mut pools),
            PlacementResult::Placed
        );
        assert_eq!(session.grid().stack(3).count(), 5);
        assert_eq!(session.grid().stack(6).count(), 4);
        drop(pools);
        assert!(player[0].is_empty());
    }

    #[test]
    fn test_distribute_from_grid_is_rejected() {
        let mut session = session();
        let mut pools = StoragePools::none();
        let slot = SlotRef::new(PoolKind::Grid, 0);
        assert_eq!(
            session.apply(Intent::DistributeFromSlot(slot), &mut pools),
            PlacementResult::Unchanged
        );
    }

    #[test]
    fn test_move_stack_and_move_all() {
        let mut session = session();
        session.put_stack(0, ItemStack::new(COAL, 3));
        let mut block = vec![ItemStack::new(STICK, 2), ItemStack::new(STICK, 5), ItemStack::empty()];
        let mut player = vec![ItemStack::empty(); 3];
        let mut pools = StoragePools::from_player_inventory(&mut block, &mut player, 1);

        let grid_slot = SlotRef::new(PoolKind::Grid, 0);
        assert_eq!(session.apply(Intent::MoveStack(grid_slot), &mut pools), PlacementResult::Placed);
        assert!(session.grid().is_empty());

        let block_slot = SlotRef::new(PoolKind::BlockStorage, 0);
        assert_eq!(
            session.apply(Intent::MoveAllMatching(block_slot), &mut pools),
            PlacementResult::Placed
        );
        assert!(pools.block.get(0).is_empty());
        assert!(pools.block.get(1).is_empty());
        assert_eq!(pools.block.get(2).item(), COAL);
        assert_eq!(pools.player_main.get(0).count(), 7);
    }

    #[test]
    fn test_cycle_collision_without_collision() {
        let mut session = session();
        craft_sticks(&mut session);
        let mut pools = StoragePools::none();
        assert_eq!(
            session.apply(Intent::CycleCollisionRecipe, &mut pools),
            PlacementResult::Unchanged
        );
    }

    #[test]
    fn test_recall_output_synthesizes() {
        let mut session = session();
        let mut pools = StoragePools::none();
        let result = session.apply(Intent::RecallOutput { held: Some(TORCH) }, &mut pools);
        assert_eq!(result, PlacementResult::Placed);
        let current = session.history().current().expect("stash");
        assert_eq!(current.recipe_id, TORCHES);
        assert_eq!(current.cells[3], COAL);
        assert_eq!(current.cells[6], STICK);
    }

    #[test]
    fn test_disabled_assist_ignores_intents() {
        let mut session = session();
        craft_sticks(&mut session);
        session.apply_config(AssistConfig {
            assist_enabled: false,
            ..AssistConfig::default()
        });
        assert!(session.history().is_empty());

        let mut pools = StoragePools::none();
        assert_eq!(session.apply(Intent::Next, &mut pools), PlacementResult::Unchanged);
        craft_sticks(&mut session);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_scale_down_clamped_by_config() {
        let mut session = WorkbenchSession::new(
            book(),
            AssistConfig {
                max_scale_step: 2,
                ..AssistConfig::default()
            },
        );
        session.put_stack(0, ItemStack::new(COAL, 10));
        let mut block = vec![ItemStack::empty()];
        let mut player: Vec<ItemStack> = Vec::new();
        let mut pools = StoragePools::from_player_inventory(&mut block, &mut player, 0);
        assert_eq!(session.apply(Intent::ScaleDown(50), &mut pools), PlacementResult::Placed);
        assert_eq!(session.grid().stack(0).count(), 8);
    }

    #[test]
    fn test_snapshots_reach_mirror() {
        let mut session = session();
        let mut mirror = session.subscribe();
        craft_sticks(&mut session);
        assert!(mirror.sync());
        assert_eq!(mirror.revision(), session.revision());
        assert_eq!(mirror.history(), Some(session.history()));
        assert_eq!(mirror.grid(), Some(session.grid()));
    }

    #[test]
    fn test_history_file_round_trip() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("history.bin");

        let mut session = session();
        craft_sticks(&mut session);
        let names = book();
        session.save_history(&path, &names).expect("save");

        let mut restored = WorkbenchSession::new(book(), AssistConfig::default());
        restored.load_history(&path, &names).expect("load");
        assert_eq!(restored.history(), session.history());

        fs::write(&path, b"garbage").expect("write");
        assert!(restored.load_history(&path, &names).is_err());
    }
}
