//! Shared vocabulary for the forensic consensus audit engine.
//!
//! Every crate in the workspace speaks in these types:
//! - [`RecipeId`] and [`LedgerRecord`] mirror what the ledger stores per recipe
//! - [`Bps`] and [`Severity`] are range-checked score units
//! - [`SiloRole`], [`SiloReports`] and [`JuryVote`] model the closed review panel
//! - [`AuditSession`] carries one recipe through silos, jury and resolution
//! - [`EvidenceDigest`] is the anti-replay key derived from the session evidence

pub mod evidence;
pub mod panel;
pub mod recipe;
pub mod score;
pub mod session;

pub use evidence::{DigestParseError, EvidenceDigest};
pub use panel::{JuryVote, SiloReports, SiloRole, JURY_SIZE};
pub use recipe::{LedgerRecord, RecipeId};
pub use score::{Bps, Severity};
pub use session::{AuditSession, ResolutionStrategy, ResolvedScore};
