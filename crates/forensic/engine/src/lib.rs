//! Forensic consensus pipeline: silos → jury → score.
//!
//! ## Stages
//!
//! 1. **Silo audit**: four specialist reviews of the recipe content, dispatched
//!    concurrently; any single failure fails the stage.
//! 2. **Jury synthesis**: one completion call role-playing a ten-member jury
//!    over all four reports.
//! 3. **Score resolution**: an ordered list of extractors turns the jury's
//!    free text into a clamped basis-point score and records which one won.
//!
//! [`AuditEngine`] runs the stages in order and hands back a populated
//! [`AuditSession`](forensic_types::AuditSession) whose evidence digest is the
//! replay key for the commit guard.

pub mod content;
pub mod error;
pub mod jury;
pub mod pipeline;
pub mod resolver;
mod scan;
pub mod silo;

pub use content::{ContentStore, HttpContentStore, StaticContentStore};
pub use error::AuditError;
pub use jury::{parse_votes, JuryStage};
pub use pipeline::{AuditEngine, AuditFailure, StageModels};
pub use resolver::{
    DirectFieldExtractor, LabeledPatternExtractor, ResolverConfig, ScoreExtractor, ScoreResolver,
    SeverityAverageExtractor,
};
pub use silo::SiloStage;
