//! Build orchestration for the Gregory MS site.
//!
//! This crate ties together data acquisition, normalization and artifact
//! writing with the external tools (git, press kit, site generator) into a
//! single build run.

pub mod cleanup;
pub mod embeds;
pub mod external;
pub mod pipeline;
pub mod source;

pub use external::{ToolInfo, Toolchain};
pub use pipeline::{BuildOrchestrator, BuildReport, ProgressReporter, SilentProgress, StepOutcome};
pub use source::{CollectionStats, RawDataset};
