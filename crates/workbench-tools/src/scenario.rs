//! Scripted workbench sessions.
//!
//! A scenario declares the item and recipe registry, the initial contents of
//! block storage and the player inventory, and a list of steps. Steps are run
//! through an authoritative [`WorkbenchSession`]; after each step a mirror
//! replica is synced and its newest snapshot is reported.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use workbench_assist::prelude::*;
use workbench_common::ItemTypeId;

/// A stack in a scenario slot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStack {
    /// Item identity
    pub item: ItemTypeId,
    /// Quantity
    pub count: u32,
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Replace a grid cell.
    Put {
        /// Grid cell index
        slot: usize,
        /// Item identity
        item: ItemTypeId,
        /// Quantity
        count: u32,
    },
    /// Take a whole grid cell away.
    Take {
        /// Grid cell index
        slot: usize,
    },
    /// Complete one craft.
    TakeOutput,
    /// Apply an intent against the scenario storage.
    Apply(Intent),
    /// Replace the assistant configuration.
    Configure(AssistConfig),
    /// Write the history blob to a file.
    SaveHistory(PathBuf),
    /// Read the history blob from a file.
    LoadHistory(PathBuf),
}

impl Step {
    fn label(&self) -> String {
        match self {
            Self::Put { slot, .. } => format!("put:{slot}"),
            Self::Take { slot } => format!("take:{slot}"),
            Self::TakeOutput => "take-output".to_string(),
            Self::Apply(intent) => intent.name().to_string(),
            Self::Configure(_) => "configure".to_string(),
            Self::SaveHistory(_) => "save-history".to_string(),
            Self::LoadHistory(_) => "load-history".to_string(),
        }
    }
}

/// A complete scripted session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Item registry
    pub items: Vec<ItemDefinition>,
    /// Recipe registry
    pub recipes: Vec<RecipeDefinition>,
    /// Block storage slots
    pub block: Vec<Option<SlotStack>>,
    /// Player inventory slots (hotbar first)
    pub player: Vec<Option<SlotStack>>,
    /// Number of leading player slots forming the hotbar
    pub hotbar_len: usize,
    /// Steps to run
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a RON scenario.
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse scenario")
    }

    fn book(&self) -> RecipeBook {
        RecipeBook::from_definitions(self.items.clone(), self.recipes.clone())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step number, starting at 1
    pub step: usize,
    /// Short description of the step
    pub action: String,
    /// Placement result for intents
    pub result: Option<PlacementResult>,
    /// Units produced by a craft
    pub crafted: Option<u32>,
    /// Snapshot received by the replica, if any was published
    pub snapshot: Option<Snapshot>,
}

/// Runs a scenario against an authoritative session and a replica.
pub struct Runner {
    session: WorkbenchSession<RecipeBook>,
    names: RecipeBook,
    mirror: WorkbenchMirror,
    block: Vec<ItemStack>,
    player: Vec<ItemStack>,
    hotbar_len: usize,
}

impl Runner {
    /// Set up the session, the storage and the replica.
    pub fn new(scenario: &Scenario, config: AssistConfig) -> Self {
        let names = scenario.book();
        let slots = |specs: &[Option<SlotStack>]| -> Vec<ItemStack> {
            specs
                .iter()
                .map(|spec| spec.map_or_else(ItemStack::empty, |s| names.stack(s.item, s.count)))
                .collect()
        };
        let block = slots(&scenario.block);
        let player = slots(&scenario.player);

        let mut session = WorkbenchSession::new(scenario.book(), config);
        let mirror = session.subscribe();
        info!(
            "Scenario ready: {} recipes, {} block slots, {} player slots",
            names.recipe_count(),
            block.len(),
            player.len()
        );

        Self {
            session,
            names,
            mirror,
            hotbar_len: scenario.hotbar_len.min(player.len()),
            block,
            player,
        }
    }

    /// Run one step and report what the replica saw.
    pub fn step(&mut self, index: usize, step: &Step) -> Result<StepReport> {
        let mut result = None;
        let mut crafted = None;

        match step {
            Step::Put { slot, item, count } => {
                let stack = self.names.stack(*item, *count);
                self.session.put_stack(*slot, stack);
            }
            Step::Take { slot } => {
                let stack = self.session.take_stack(*slot);
                self.return_to_player(stack);
            }
            Step::TakeOutput => {
                let output = self.session.take_output();
                crafted = Some(output.count());
                self.return_to_player(output);
            }
            Step::Apply(intent) => {
                let mut pools =
                    StoragePools::from_player_inventory(&mut self.block, &mut self.player, self.hotbar_len);
                result = Some(self.session.apply(*intent, &mut pools));
            }
            Step::Configure(config) => self.session.apply_config(config.clone()),
            Step::SaveHistory(path) => self
                .session
                .save_history(path, &self.names)
                .with_context(|| format!("Failed to save history to {}", path.display()))?,
            Step::LoadHistory(path) => self
                .session
                .load_history(path, &self.names)
                .with_context(|| format!("Failed to load history from {}", path.display()))?,
        }

        let snapshot = if self.mirror.sync() {
            self.mirror.latest().cloned()
        } else {
            None
        };
        debug!("Step {} ({}) -> {:?}", index, step.label(), result);

        Ok(StepReport {
            step: index,
            action: step.label(),
            result,
            crafted,
            snapshot,
        })
    }

    /// Run every step of `scenario`.
    pub fn run(&mut self, scenario: &Scenario) -> Result<Vec<StepReport>> {
        scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.step(index + 1, step))
            .collect()
    }

    /// The authoritative session.
    pub fn session(&self) -> &WorkbenchSession<RecipeBook> {
        &self.session
    }

    /// Player inventory contents.
    pub fn player(&self) -> &[ItemStack] {
        &self.player
    }

    /// Block storage contents.
    pub fn block(&self) -> &[ItemStack] {
        &self.block
    }

    /// Hand a stack back to the player, spilling into block storage.
    fn return_to_player(&mut self, stack: ItemStack) {
        let rest = {
            let (mut hotbar, mut main) =
                StorageRange::new(&mut self.player).split_at(self.hotbar_len);
            move_into_ranges(stack, &mut [&mut main, &mut hotbar])
        };
        if rest.is_empty() {
            return;
        }
        debug!("Player inventory full, spilling {} units into block storage", rest.count());
        let lost = StorageRange::new(&mut self.block).insert(rest);
        if !lost.is_empty() {
            warn!(
                "Discarded {} x {:?} with no free storage slot",
                lost.count(),
                lost.item()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workbench_common::RecipeId;

    const SCENARIO: &str = r#"
#![enable(unwrap_newtypes, implicit_some)]
(
    items: [
        (id: 1, name: "coal"),
        (id: 2, name: "stick"),
        (id: 3, name: "torch"),
    ],
    recipes: [
        (
            id: 1,
            name: "torch",
            shape: Shaped(width: 1, height: 2),
            ingredients: [[1], [2]],
            output: 3,
            output_count: 4,
        ),
    ],
    block: [(item: 1, count: 8), (item: 2, count: 8)],
    player: [None, None, None],
    hotbar_len: 1,
    steps: [
        Put(slot: 1, item: 1, count: 1),
        Put(slot: 4, item: 2, count: 1),
        TakeOutput,
        Apply(Next),
        Apply(PlaceCurrent),
        Apply(ScaleUp(3)),
        Apply(CycleCollisionRecipe),
    ],
)
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_ron(SCENARIO).expect("parse");
        assert_eq!(scenario.items.len(), 3);
        assert_eq!(scenario.recipes[0].id, RecipeId::new(1));
        assert_eq!(scenario.block.len(), 2);
        assert_eq!(scenario.steps.len(), 7);
        assert_eq!(scenario.steps[5], Step::Apply(Intent::ScaleUp(3)));
    }

    #[test]
    fn test_run_scenario() {
        let scenario = Scenario::from_ron(SCENARIO).expect("parse");
        let mut runner = Runner::new(&scenario, AssistConfig::default());
        let reports = runner.run(&scenario).expect("run");

        assert_eq!(reports[2].crafted, Some(4));
        assert_eq!(reports[4].result, Some(PlacementResult::Placed));
        assert_eq!(reports[5].result, Some(PlacementResult::Placed));
        assert_eq!(reports[6].result, Some(PlacementResult::Unchanged));
        assert!(reports[6].snapshot.is_none());

        let grid = runner.session().grid();
        assert_eq!(grid.stack(1).count(), 3);
        assert_eq!(grid.stack(4).count(), 3);
        assert_eq!(runner.block()[0].count(), 5);
        assert_eq!(runner.player()[1].count(), 4);
    }

    #[test]
    fn test_output_spills_into_block_storage() {
        let mut scenario = Scenario::from_ron(SCENARIO).expect("parse");
        scenario.player = vec![Some(SlotStack {
            item: ItemTypeId::new(1),
            count: 1,
        })];
        scenario.block.push(None);
        scenario.steps.truncate(3);

        let mut runner = Runner::new(&scenario, AssistConfig::default());
        let reports = runner.run(&scenario).expect("run");
        assert_eq!(reports[2].crafted, Some(4));
        assert_eq!(runner.player()[0].count(), 1);
        assert_eq!(runner.block()[2].item(), ItemTypeId::new(3));
        assert_eq!(runner.block()[2].count(), 4);
    }

    #[test]
    fn test_history_steps_round_trip() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("history.bin");

        let mut scenario = Scenario::from_ron(SCENARIO).expect("parse");
        scenario.steps.truncate(3);
        scenario.steps.push(Step::SaveHistory(path.clone()));
        scenario.steps.push(Step::Configure(AssistConfig {
            assist_enabled: false,
            ..AssistConfig::default()
        }));
        scenario.steps.push(Step::Configure(AssistConfig::default()));
        scenario.steps.push(Step::LoadHistory(path));

        let mut runner = Runner::new(&scenario, AssistConfig::default());
        let reports = runner.run(&scenario).expect("run");
        let last = reports.last().and_then(|r| r.snapshot.as_ref()).expect("snapshot");
        assert_eq!(last.history.len(), 1);
        assert_eq!(runner.session().history().len(), 1);
    }

    #[test]
    fn test_missing_history_file_is_error() {
        let scenario = Scenario {
            steps: vec![Step::LoadHistory(PathBuf::from("/nonexistent/history.bin"))],
            ..Scenario::default()
        };
        let mut runner = Runner::new(&scenario, AssistConfig::default());
        assert!(runner.run(&scenario).is_err());
    }
}
