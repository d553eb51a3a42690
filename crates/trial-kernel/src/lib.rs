//! Incremental trial-state engine.
//!
//! Consumes one structured testimony event at a time and maintains the
//! running litigation assessment: bounded momentum score and trend,
//! contradiction detection against the full statement history, per-witness
//! credibility, and prioritized tactical actions. All I/O stays at the
//! caller's boundary; the transition itself is total and synchronous.

pub mod actions;
pub mod contradiction;
pub mod credibility;
pub mod engine;
pub mod momentum;
pub mod source;

pub use contradiction::{PolarityComparer, StatementComparer};
pub use engine::{BatchOutcome, StepOutcome, TrialEngine};
pub use source::{read_transcript, LineWarning, SourceError, TranscriptBatch};
