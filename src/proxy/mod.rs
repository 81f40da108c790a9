//! Proxy module for classifying proxies
//!
//! This module provides functionality for:
//! - Extracting IPs from proxy strings and reading/writing proxy lists
//! - Classifying IPs as datacenter or potentially residential from offline ASN data
//! - Resolving ambiguous IPs through a remote connection-type service
//! - Scoring IPs through a remote risk service
//! - Running the per-proxy classification pipeline with a bounded worker pool
//! - Provisioning the offline ASN database

pub mod asn;
mod http;
pub mod intel;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod provision;
pub mod risk;

pub use asn::{classify_organization, AsnClassifier, AsnDatabase, AsnRecord, AsnSource};
pub use intel::{verdict_from_connection_type, ConnectionTypeSource, IpInfoClient};
pub use models::{ClassificationReport, ProxyOutcome, ProxyRecord, RiskAssessment, Verdict};
pub use parser::{extract_ip, ProxyParser};
pub use pipeline::{shutdown_channel, ClassificationPipeline, Shutdown, ShutdownTrigger};
pub use provision::{DatabaseProvisioner, Provisioned};
pub use risk::{risk_from_response, ProxyCheckClient, RiskSource};
