//! Offline ASN classification using a MaxMind ASN database

use crate::error::LookupError;
use crate::proxy::models::Verdict;
use crate::Result;
use anyhow::Context;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Organization name fragments that mark hosting infrastructure
pub const DEFAULT_DATACENTER_MARKERS: &[&str] = &["Hosting", "Data Center", "Cloud"];

/// Autonomous system information for an IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsnRecord {
    /// Autonomous system number
    pub number: Option<u32>,
    /// Organization operating the autonomous system
    pub organization: Option<String>,
}

impl AsnRecord {
    pub fn new(number: u32, organization: impl Into<String>) -> Self {
        Self {
            number: Some(number),
            organization: Some(organization.into()),
        }
    }
}

/// Classify an organization name against datacenter markers
///
/// Matching is a case-sensitive substring test.
pub fn classify_organization<S: AsRef<str>>(organization: &str, markers: &[S]) -> Verdict {
    if markers
        .iter()
        .any(|marker| organization.contains(marker.as_ref()))
    {
        Verdict::Datacenter
    } else {
        Verdict::PotentiallyResidential
    }
}

/// Source of ASN records keyed by IP
pub trait AsnSource: Send + Sync {
    /// Look up the ASN record for an IP string
    ///
    /// Returns `Ok(None)` when the database holds no record for the address.
    fn lookup_asn(&self, ip: &str) -> std::result::Result<Option<AsnRecord>, LookupError>;
}

/// Read-only handle to an on-disk ASN database
pub struct AsnDatabase {
    reader: Arc<Reader<Vec<u8>>>,
}

impl AsnDatabase {
    /// Open an ASN database from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path)
            .with_context(|| format!("failed to open ASN database {}", path.display()))?;
        debug!(
            "Opened ASN database {} ({})",
            path.display(),
            reader.metadata.database_type
        );
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up the ASN record for an IpAddr
    pub fn lookup_ip(
        &self,
        ip: IpAddr,
    ) -> std::result::Result<Option<AsnRecord>, LookupError> {
        let lookup_result = self
            .reader
            .lookup(ip)
            .map_err(|e| LookupError::Database(e.to_string()))?;

        let asn: Option<geoip2::Asn> = lookup_result
            .decode()
            .map_err(|e| LookupError::Database(e.to_string()))?;

        Ok(asn.map(|asn| AsnRecord {
            number: asn.autonomous_system_number,
            organization: asn.autonomous_system_organization.map(String::from),
        }))
    }
}

impl AsnSource for AsnDatabase {
    fn lookup_asn(&self, ip: &str) -> std::result::Result<Option<AsnRecord>, LookupError> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| LookupError::InvalidIp(ip.to_string()))?;
        self.lookup_ip(ip)
    }
}

impl Clone for AsnDatabase {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

/// Classifier producing coarse verdicts from offline ASN data
#[derive(Clone)]
pub struct AsnClassifier {
    source: Arc<dyn AsnSource>,
    markers: Vec<String>,
}

impl AsnClassifier {
    /// Create a classifier using the default datacenter markers
    pub fn new(source: Arc<dyn AsnSource>) -> Self {
        Self {
            source,
            markers: DEFAULT_DATACENTER_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }

    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
        self
    }

    /// Classify an IP using only the offline database
    ///
    /// Lookup failures never propagate; they yield `Verdict::Unknown`.
    pub fn classify(&self, ip: &str) -> Verdict {
        match self.source.lookup_asn(ip) {
            Ok(Some(record)) => {
                let organization = record.organization.as_deref().unwrap_or_default();
                let verdict = classify_organization(organization, self.markers.as_slice());
                info!(
                    ip,
                    asn = ?record.number,
                    organization,
                    %verdict,
                    "classified by ASN"
                );
                verdict
            }
            Ok(None) => {
                warn!(ip, stage = "asn", "ASN data not found");
                Verdict::Unknown
            }
            Err(e) => {
                warn!(ip, stage = "asn", error = %e, "ASN lookup failed");
                Verdict::Unknown
            }
        }
    }
}
