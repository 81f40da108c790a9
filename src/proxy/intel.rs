//! Remote connection-type lookup for IPs the ASN data could not settle

use crate::config::ServiceConfig;
use crate::error::LookupError;
use crate::proxy::http::ServiceClient;
use crate::proxy::models::Verdict;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Default IP-intelligence endpoint
pub const DEFAULT_IPINFO_URL: &str = "https://ipinfo.io";

/// Connection type value marking a residential IP
const RESIDENTIAL_TYPE: &str = "residential";

/// Subset of the IP-intelligence response used for classification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpInfoResponse {
    /// Connection type, e.g. "residential", "hosting", "business"
    #[serde(rename = "type", default)]
    pub connection_type: Option<Value>,
}

impl IpInfoResponse {
    pub fn connection_type(&self) -> Option<&str> {
        self.connection_type.as_ref().and_then(Value::as_str)
    }
}

/// Map a reported connection type to a verdict
///
/// Anything other than a residential type, including a missing field, counts
/// as datacenter.
pub fn verdict_from_connection_type(connection_type: Option<&str>) -> Verdict {
    match connection_type {
        Some(t) if t.eq_ignore_ascii_case(RESIDENTIAL_TYPE) => Verdict::Residential,
        _ => Verdict::Datacenter,
    }
}

/// Remote source resolving an IP to `Residential` or `Datacenter`
#[async_trait]
pub trait ConnectionTypeSource: Send + Sync {
    async fn resolve(&self, ip: &str) -> std::result::Result<Verdict, LookupError>;
}

/// HTTP client for the ipinfo.io connection-type API
#[derive(Clone)]
pub struct IpInfoClient {
    service: ServiceClient,
}

impl IpInfoClient {
    /// Create a new client from service configuration
    pub fn with_config(config: &ServiceConfig) -> Result<Self> {
        let service = ServiceClient::new(config)?;

        if !service.has_api_key() {
            warn!("No IPInfo API key configured, connection-type lookups are disabled");
        }

        Ok(Self { service })
    }
}

#[async_trait]
impl ConnectionTypeSource for IpInfoClient {
    async fn resolve(&self, ip: &str) -> std::result::Result<Verdict, LookupError> {
        let api_key = self.service.api_key()?;

        debug!(ip, "Classifying IP using IPInfo API");
        let info: IpInfoResponse = self
            .service
            .get_json(&self.service.url(ip), &[("token", api_key)])
            .await?;

        let verdict = verdict_from_connection_type(info.connection_type());
        debug!(ip, connection_type = ?info.connection_type(), %verdict, "classified by IPInfo");
        Ok(verdict)
    }
}
