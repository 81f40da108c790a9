//! Proxy classification data models

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::proxy::parser::extract_ip;

/// Highest score a risk service can report
pub const MAX_RISK_SCORE: u8 = 100;

/// Proxies scoring at or below this value are considered safe
pub const RISK_THRESHOLD: u8 = 50;

/// Connection-type verdict for a proxy IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Verdict {
    Datacenter,
    Residential,
    PotentiallyResidential,
    #[default]
    Unknown,
}

impl Verdict {
    /// Whether the verdict is inconclusive and needs a remote lookup
    pub fn needs_refinement(&self) -> bool {
        matches!(self, Verdict::Unknown | Verdict::PotentiallyResidential)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Datacenter => write!(f, "Datacenter"),
            Verdict::Residential => write!(f, "Residential"),
            Verdict::PotentiallyResidential => write!(f, "Potentially Residential"),
            Verdict::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A proxy as read from the input list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    raw: String,
    ip: String,
}

impl ProxyRecord {
    /// Create a record from a raw proxy line, deriving its IP
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let ip = extract_ip(&raw).to_string();
        Self { raw, ip }
    }

    /// The proxy string exactly as provided
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The IP segment of the proxy string
    pub fn ip(&self) -> &str {
        &self.ip
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Fraud/risk score reported for an IP, in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskAssessment {
    score: u8,
}

impl RiskAssessment {
    /// Create an assessment, clamping the score to the valid range
    pub fn new(score: u64) -> Self {
        let score = score.min(MAX_RISK_SCORE as u64) as u8;
        Self { score }
    }

    /// An assessment treated as maximally risky
    pub fn maximum() -> Self {
        Self {
            score: MAX_RISK_SCORE,
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    /// Whether the score passes the safety threshold
    pub fn is_low_risk(&self) -> bool {
        self.score <= RISK_THRESHOLD
    }
}

/// Detailed trace of how a single proxy was classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyOutcome {
    pub proxy: ProxyRecord,
    /// Verdict from the offline ASN lookup
    pub asn_verdict: Verdict,
    /// Verdict after the remote connection-type lookup, if one was made
    pub refined_verdict: Option<Verdict>,
    /// Risk score, if the risk service produced one
    pub risk: Option<RiskAssessment>,
}

impl ProxyOutcome {
    /// Outcome for a proxy dropped by the offline lookup
    pub fn datacenter(proxy: ProxyRecord) -> Self {
        Self {
            proxy,
            asn_verdict: Verdict::Datacenter,
            refined_verdict: None,
            risk: None,
        }
    }

    /// Whether the proxy never reached the remote services
    pub fn is_short_circuited(&self) -> bool {
        self.asn_verdict == Verdict::Datacenter
    }

    /// The last verdict reached for this proxy
    pub fn final_verdict(&self) -> Verdict {
        self.refined_verdict.unwrap_or(self.asn_verdict)
    }

    pub fn is_residential(&self) -> bool {
        self.final_verdict() == Verdict::Residential
    }

    pub fn is_checked(&self) -> bool {
        self.risk.map_or(false, |r| r.is_low_risk())
    }
}

/// Accumulated output of a classification run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Proxies judged residential, in input order
    pub residential: Vec<String>,
    /// Proxies judged low-risk, in input order
    pub checked: Vec<String>,
    /// Per-proxy decisions, in input order
    pub outcomes: Vec<ProxyOutcome>,
}

impl ClassificationReport {
    /// Build a report from per-proxy outcomes, preserving their order
    pub fn from_outcomes(outcomes: Vec<ProxyOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            report.push(outcome);
        }
        report
    }

    /// Append one outcome to the report
    pub fn push(&mut self, outcome: ProxyOutcome) {
        if outcome.is_residential() {
            self.residential.push(outcome.proxy.raw().to_string());
        }
        if outcome.is_checked() {
            self.checked.push(outcome.proxy.raw().to_string());
        }
        self.outcomes.push(outcome);
    }

    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of proxies dropped by the offline lookup
    pub fn datacenter_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_short_circuited())
            .count()
    }

    /// Number of proxies that reached the risk stage but got no score
    pub fn unscored_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.is_short_circuited() && o.risk.is_none())
            .count()
    }
}
