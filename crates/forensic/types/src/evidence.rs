use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::panel::SiloReports;

/// BLAKE3 hash of the audit evidence, used as the ledger's anti-replay key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvidenceDigest([u8; 32]);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid evidence digest: {0}")]
pub struct DigestParseError(String);

impl EvidenceDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest over the labeled silo reports followed by the raw jury output.
    pub fn compute(reports: &SiloReports, jury_text: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        for (role, report) in reports.iter() {
            hasher.update(role.label().as_bytes());
            hasher.update(b"\n");
            hasher.update(report.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"JURY\n");
        hasher.update(jury_text.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for EvidenceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for EvidenceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvidenceDigest({})", self.short())
    }
}

impl FromStr for EvidenceDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches("0x");
        blake3::Hash::from_hex(hex)
            .map(|hash| Self(*hash.as_bytes()))
            .map_err(|e| DigestParseError(e.to_string()))
    }
}

impl TryFrom<String> for EvidenceDigest {
    type Error = DigestParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvidenceDigest> for String {
    fn from(value: EvidenceDigest) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports(security: &str) -> SiloReports {
        SiloReports {
            toil: "a".into(),
            security: security.into(),
            economy: "c".into(),
            structure: "d".into(),
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let a = EvidenceDigest::compute(&reports("b"), "jury");
        let b = EvidenceDigest::compute(&reports("b"), "jury");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_any_evidence() {
        let base = EvidenceDigest::compute(&reports("b"), "jury");
        assert_ne!(base, EvidenceDigest::compute(&reports("b2"), "jury"));
        assert_ne!(base, EvidenceDigest::compute(&reports("b"), "jury2"));
    }

    #[test]
    fn hex_round_trip_accepts_prefix() {
        let digest = EvidenceDigest::compute(&reports("b"), "jury");
        let parsed: EvidenceDigest = digest.to_string().parse().unwrap();
        assert_eq!(parsed, digest);
        assert!("0xnothex".parse::<EvidenceDigest>().is_err());
    }
}
