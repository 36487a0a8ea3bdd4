//! # jsplay engine
//!
//! The playground core: everything between the editor and the display.
//!
//! ```text
//! source ─▶ preprocess ─▶ classify ─▶ cache gate ─▶ sandbox ─▶ reconcile ─▶ ConsoleSink
//! ```
//!
//! - [`preprocess`] splits a snippet into statements with stable identities
//! - [`classify`] flags constructs whose output can change between runs
//! - [`cache`] decides whether an auto-triggered run executes at all
//! - [`reconcile`] maps records onto per-statement output slots
//! - [`Playground`] owns one session and drives the [`jsplay_executor`] sandbox
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jsplay_engine::{NullSink, Playground, PlaygroundOptions, Trigger};
//!
//! # async fn example() -> Result<(), jsplay_engine::EngineError> {
//! let playground = Playground::new(PlaygroundOptions::default(), Arc::new(NullSink));
//! let result = playground.run("console.log(1 + 1)", Trigger::Manual).await?;
//! assert_eq!(result.output_slots[0].content.to_text(), "2");
//! # Ok(())
//! # }
//! ```

pub mod autorun;
pub mod cache;
pub mod classify;
mod error;
mod playground;
pub mod preprocess;
pub mod reconcile;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

pub use cache::{CacheGate, CacheOptions, CacheStats, Decision, ReasonTag};
pub use classify::NonDeterminism;
pub use error::EngineError;
pub use playground::{
    ConsoleLine, ConsoleSink, ExecutionResult, JobStatus, NO_OUTPUT_NOTICE, NullSink, Playground,
    PlaygroundOptions, RunnerState,
};
pub use preprocess::{HeuristicSplitter, SourceStatement, StatementSplitter};
pub use reconcile::{OutputSlot, PersistentScope, SlotChange, SlotKey};

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Auto,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        })
    }
}
