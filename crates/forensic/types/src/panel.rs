use serde::{Deserialize, Serialize};

use crate::score::Severity;

/// Number of simulated jurors in the synthesis stage.
pub const JURY_SIZE: usize = 10;

/// The closed set of specialist reviewers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiloRole {
    /// SRE specialist: toil and operational waste.
    Toil,
    /// Security architect: vulnerabilities in logic and schemas.
    Security,
    /// Economist: incentive gaming and arbitrage.
    Economy,
    /// Technical architect: structural integrity and pattern compliance.
    Structure,
}

impl SiloRole {
    /// Canonical labeling order.
    pub const ALL: [SiloRole; 4] = [
        SiloRole::Toil,
        SiloRole::Security,
        SiloRole::Economy,
        SiloRole::Structure,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SiloRole::Toil => "TOIL",
            SiloRole::Security => "SECURITY",
            SiloRole::Economy => "ECONOMY",
            SiloRole::Structure => "STRUCTURE",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            SiloRole::Toil => {
                "SRE Specialist: Audit for TOIL and operational waste in the provided \
                 Technical Specification and SRE Metrics."
            }
            SiloRole::Security => {
                "Security Architect: Audit for vulnerabilities in the Core Logic, \
                 JSON Schemas, and BPS Matrix."
            }
            SiloRole::Economy => {
                "Economist: Audit for incentive gaming and economic arbitrage in the \
                 BPS Aggregation and Path Score Computation."
            }
            SiloRole::Structure => {
                "Technical Architect: Audit for structural integrity and pattern \
                 compliance with the recipe lifecycle."
            }
        }
    }
}

impl std::fmt::Display for SiloRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Exactly one report per specialist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiloReports {
    pub toil: String,
    pub security: String,
    pub economy: String,
    pub structure: String,
}

impl SiloReports {
    pub fn get(&self, role: SiloRole) -> &str {
        match role {
            SiloRole::Toil => &self.toil,
            SiloRole::Security => &self.security,
            SiloRole::Economy => &self.economy,
            SiloRole::Structure => &self.structure,
        }
    }

    /// Reports in canonical role order.
    pub fn iter(&self) -> impl Iterator<Item = (SiloRole, &str)> {
        SiloRole::ALL.into_iter().map(move |role| (role, self.get(role)))
    }

    /// `LABEL: report` blocks, one per role, as fed to the jury.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(role, report)| format!("{}: {}", role.label(), report.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One juror's vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuryVote {
    pub voter: u8,
    pub severity: Severity,
    pub verdict: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports() -> SiloReports {
        SiloReports {
            toil: "low toil".into(),
            security: "no injection surface".into(),
            economy: "fee path is gameable".into(),
            structure: "matches lifecycle".into(),
        }
    }

    #[test]
    fn iter_follows_canonical_order() {
        let roles: Vec<SiloRole> = reports().iter().map(|(r, _)| r).collect();
        assert_eq!(roles, SiloRole::ALL.to_vec());
    }

    #[test]
    fn render_labels_every_role() {
        let rendered = reports().render();
        assert!(rendered.starts_with("TOIL: low toil"));
        assert!(rendered.contains("ECONOMY: fee path is gameable"));
        assert_eq!(rendered.lines().count(), 4);
    }

    #[test]
    fn prompts_are_distinct() {
        let mut prompts: Vec<&str> = SiloRole::ALL.iter().map(|r| r.system_prompt()).collect();
        prompts.dedup();
        assert_eq!(prompts.len(), 4);
    }
}
