//! Proxy Classifier
//!
//! Sorts a list of proxies into residential and low-risk sets.
//! Each proxy is checked against an offline ASN database first; proxies that
//! are not clearly hosted in a datacenter are resolved through a remote
//! connection-type service and scored by a remote risk service.

pub mod config;
pub mod error;
pub mod proxy;

pub use config::{ClassifierConfig, ServiceConfig};
pub use error::LookupError;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
