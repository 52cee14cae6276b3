//! Bot players.
//!
//! Bots take a seat like anyone else but have no ledger session; their
//! chips are house chips. The room asks [`BotDecisionMaker`] for an action
//! once the thinking delay elapses and folds instead if the answer is
//! illegal.
//!
//! ## Difficulty Presets
//!
//! ### Easy (Loose-Passive)
//! - Folds only the weakest hands
//! - Aggression: 0.5 (passive)
//! - Never bluffs
//!
//! ### Standard (Balanced)
//! - Aggression: 1.5 (moderately aggressive)
//! - Bluffs 15% of time
//!
//! ### TAG (Tight-Aggressive)
//! - Aggression: 2.5 (very aggressive)
//! - Bluffs 25% of time

pub mod decision;
pub mod models;

pub use decision::{BotDecisionContext, BotDecisionMaker};
pub use models::{BotDifficulty, DifficultyParams};
