//! Fraud/risk scoring via the proxycheck.io API

use crate::config::ServiceConfig;
use crate::error::LookupError;
use crate::proxy::http::ServiceClient;
use crate::proxy::models::RiskAssessment;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Default risk service endpoint
pub const DEFAULT_PROXYCHECK_URL: &str = "http://proxycheck.io";

/// Metadata flags requested alongside the risk score
const QUERY_FLAGS: [(&str, &str); 4] = [("vpn", "1"), ("asn", "1"), ("risk", "2"), ("port", "1")];

/// Extract the risk score for `ip` from a risk service response
///
/// The response is keyed by IP. A missing IP key yields no score, while a
/// present IP without a usable `risk` field is treated as maximally risky.
pub fn risk_from_response(body: &Value, ip: &str) -> Option<RiskAssessment> {
    let entry = body.get(ip)?.as_object()?;

    let assessment = match entry.get("risk") {
        Some(risk) => risk
            .as_u64()
            .map(RiskAssessment::new)
            .unwrap_or_else(RiskAssessment::maximum),
        None => RiskAssessment::maximum(),
    };

    Some(assessment)
}

/// Remote source of risk scores
#[async_trait]
pub trait RiskSource: Send + Sync {
    /// Score an IP; `Ok(None)` means the service returned no data for it
    async fn assess(&self, ip: &str) -> std::result::Result<Option<RiskAssessment>, LookupError>;
}

/// HTTP client for the proxycheck.io v2 API
#[derive(Clone)]
pub struct ProxyCheckClient {
    service: ServiceClient,
}

impl ProxyCheckClient {
    /// Create a new client from service configuration
    pub fn with_config(config: &ServiceConfig) -> Result<Self> {
        let service = ServiceClient::new(config)?;

        if !service.has_api_key() {
            warn!("No ProxyCheck API key configured, risk scoring is disabled");
        }

        Ok(Self { service })
    }
}

#[async_trait]
impl RiskSource for ProxyCheckClient {
    async fn assess(&self, ip: &str) -> std::result::Result<Option<RiskAssessment>, LookupError> {
        let api_key = self.service.api_key()?;

        let mut query = vec![("key", api_key)];
        query.extend_from_slice(&QUERY_FLAGS);

        debug!(ip, "Checking risk level using ProxyCheck API");
        let body: Value = self
            .service
            .get_json(&self.service.url(&format!("v2/{}", ip)), &query)
            .await?;

        let assessment = risk_from_response(&body, ip);
        match assessment {
            Some(risk) => debug!(ip, score = risk.score(), "risk score received"),
            None => debug!(ip, "risk service returned no data for IP"),
        }
        Ok(assessment)
    }
}
