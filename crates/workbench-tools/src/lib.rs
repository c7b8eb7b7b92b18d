//! # Workbench Tools
//!
//! Development tools for the crafting workbench assistant:
//! - Scripted sessions replayed through an authoritative session and a
//!   replica (`workbench-sim`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod scenario;

pub use scenario::{Runner, Scenario, SlotStack, Step, StepReport};
