//! Classifier configuration, constructed once at startup and passed down

use crate::proxy::asn::DEFAULT_DATACENTER_MARKERS;
use crate::proxy::intel::DEFAULT_IPINFO_URL;
use crate::proxy::risk::DEFAULT_PROXYCHECK_URL;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for remote lookups in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default timeout for the ASN database download in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Default number of proxies classified concurrently
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default base directory for inputs and outputs
pub const DEFAULT_BASE_PATH: &str = "data";

/// Default source of the GeoLite2 ASN database
pub const DEFAULT_ASN_DB_URL: &str =
    "https://github.com/P3TERX/GeoLite.mmdb/raw/download/GeoLite2-ASN.mmdb";

/// Connection settings for one remote lookup service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service endpoint without trailing path
    pub base_url: String,
    /// API key; lookups are skipped when absent
    pub api_key: Option<String>,
    /// Upper bound for a single request
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration for a classification run
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Proxy list to classify
    pub input_path: PathBuf,
    /// Output list of residential proxies
    pub residential_path: PathBuf,
    /// Output list of low-risk proxies
    pub checked_path: PathBuf,
    /// Local ASN database file
    pub asn_db_path: PathBuf,
    /// Where to fetch the ASN database from when it is missing
    pub asn_db_url: String,
    /// Timeout for the ASN database download
    pub download_timeout: Duration,
    /// IP-intelligence service settings
    pub ipinfo: ServiceConfig,
    /// Risk service settings
    pub proxycheck: ServiceConfig,
    /// Number of proxies classified concurrently
    pub concurrency: usize,
    /// Organization name fragments marking datacenter ASNs
    pub datacenter_markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from_base_path(DEFAULT_BASE_PATH)
    }
}

impl ClassifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out the default file locations under `base`
    pub fn from_base_path<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        let output = base.join("output");

        Self {
            input_path: output.join("live_proxies.txt"),
            residential_path: output.join("residential_proxies.txt"),
            checked_path: output.join("checked_proxies.txt"),
            asn_db_path: base.join("geolite").join("GeoLite2-ASN.mmdb"),
            asn_db_url: DEFAULT_ASN_DB_URL.to_string(),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ipinfo: ServiceConfig::new(DEFAULT_IPINFO_URL.to_string(), None),
            proxycheck: ServiceConfig::new(DEFAULT_PROXYCHECK_URL.to_string(), None),
            concurrency: DEFAULT_CONCURRENCY,
            datacenter_markers: DEFAULT_DATACENTER_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }

    pub fn with_input_path(mut self, path: PathBuf) -> Self {
        self.input_path = path;
        self
    }

    pub fn with_residential_path(mut self, path: PathBuf) -> Self {
        self.residential_path = path;
        self
    }

    pub fn with_checked_path(mut self, path: PathBuf) -> Self {
        self.checked_path = path;
        self
    }

    pub fn with_asn_db_path(mut self, path: PathBuf) -> Self {
        self.asn_db_path = path;
        self
    }

    pub fn with_asn_db_url(mut self, url: String) -> Self {
        self.asn_db_url = url;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_ipinfo_key(mut self, key: Option<String>) -> Self {
        self.ipinfo.api_key = key;
        self
    }

    pub fn with_proxycheck_key(mut self, key: Option<String>) -> Self {
        self.proxycheck.api_key = key;
        self
    }

    /// Set the timeout for both remote services
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.ipinfo.timeout = timeout;
        self.proxycheck.timeout = timeout;
        self
    }

    /// Set the worker count; zero is raised to one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_datacenter_markers(mut self, markers: Vec<String>) -> Self {
        self.datacenter_markers = markers;
        self
    }
}
