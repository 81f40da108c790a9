use anyhow::Result;
use clap::Parser;
use proxy_classifier::{
    config::{DEFAULT_ASN_DB_URL, DEFAULT_BASE_PATH},
    proxy::{
        intel::DEFAULT_IPINFO_URL, risk::DEFAULT_PROXYCHECK_URL, shutdown_channel, AsnDatabase,
        ClassificationPipeline, DatabaseProvisioner, ProxyParser,
    },
    ClassifierConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit status used when a second Ctrl+C aborts the run
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Classify live proxies into residential and low-risk lists
#[derive(Parser)]
#[command(name = "proxy-classifier")]
#[command(about = "Classify live proxies into residential and low-risk lists")]
struct Cli {
    /// Base directory for default input, output and database paths
    #[arg(long, env = "BASE_PATH", default_value = DEFAULT_BASE_PATH)]
    base_path: PathBuf,

    /// Input file with one proxy per line [default: <base>/output/live_proxies.txt]
    #[arg(short, long, env = "LIVE_PROXIES_FILE")]
    input: Option<PathBuf>,

    /// Output file for residential proxies [default: <base>/output/residential_proxies.txt]
    #[arg(short, long, env = "RESIDENTIAL_PROXIES_FILE")]
    residential: Option<PathBuf>,

    /// Output file for low-risk proxies [default: <base>/output/checked_proxies.txt]
    #[arg(short, long, env = "CHECKED_PROXIES_FILE")]
    checked: Option<PathBuf>,

    /// GeoLite2 ASN database path [default: <base>/geolite/GeoLite2-ASN.mmdb]
    #[arg(long, env = "ASN_DB_PATH")]
    asn_db_path: Option<PathBuf>,

    /// URL the ASN database is downloaded from when missing
    #[arg(long, env = "ASN_DB_URL", default_value = DEFAULT_ASN_DB_URL)]
    asn_db_url: String,

    /// IPInfo API token
    #[arg(long, env = "IPINFO_API_KEY", hide_env_values = true)]
    ipinfo_api_key: Option<String>,

    /// ProxyCheck API key
    #[arg(long, env = "PROXYCHECK_API_KEY", hide_env_values = true)]
    proxycheck_api_key: Option<String>,

    /// IPInfo API endpoint
    #[arg(long, env = "IPINFO_URL", default_value = DEFAULT_IPINFO_URL)]
    ipinfo_url: String,

    /// ProxyCheck API endpoint
    #[arg(long, env = "PROXYCHECK_URL", default_value = DEFAULT_PROXYCHECK_URL)]
    proxycheck_url: String,

    /// Number of proxies classified concurrently
    #[arg(short = 'n', long, env = "CLASSIFY_CONCURRENCY", default_value = "4")]
    concurrency: usize,

    /// Timeout in seconds for each API request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    timeout: u64,

    /// Timeout in seconds for the ASN database download
    #[arg(long, env = "ASN_DB_DOWNLOAD_TIMEOUT_SECS", default_value = "60")]
    download_timeout: u64,

    /// Organization name fragment marking a datacenter ASN (repeatable)
    #[arg(long = "datacenter-marker")]
    datacenter_markers: Vec<String>,
}

impl Cli {
    fn into_config(self) -> ClassifierConfig {
        let mut config = ClassifierConfig::from_base_path(&self.base_path)
            .with_asn_db_url(self.asn_db_url)
            .with_ipinfo_key(self.ipinfo_api_key.filter(|k| !k.is_empty()))
            .with_proxycheck_key(self.proxycheck_api_key.filter(|k| !k.is_empty()))
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_download_timeout(Duration::from_secs(self.download_timeout))
            .with_concurrency(self.concurrency);

        config.ipinfo.base_url = self.ipinfo_url;
        config.proxycheck.base_url = self.proxycheck_url;

        if let Some(path) = self.input {
            config = config.with_input_path(path);
        }
        if let Some(path) = self.residential {
            config = config.with_residential_path(path);
        }
        if let Some(path) = self.checked {
            config = config.with_checked_path(path);
        }
        if let Some(path) = self.asn_db_path {
            config = config.with_asn_db_path(path);
        }
        if !self.datacenter_markers.is_empty() {
            config = config.with_datacenter_markers(self.datacenter_markers);
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();
    run(config).await
}

async fn run(config: ClassifierConfig) -> Result<()> {
    let provisioner = DatabaseProvisioner::new(config.asn_db_url.clone(), config.download_timeout)?;
    provisioner.ensure(&config.asn_db_path).await?;
    let database = AsnDatabase::from_path(&config.asn_db_path)?;

    let proxies = ProxyParser::parse_file(&config.input_path)?;
    info!(
        "Loaded {} live proxies from {}",
        proxies.len(),
        config.input_path.display()
    );

    let pipeline = ClassificationPipeline::from_config(&config, Arc::new(database))?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error setting up Ctrl+C handler: {}", e);
                return;
            }
            if trigger.trigger() {
                warn!("Received second Ctrl+C, exiting without saving results");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            info!("Received Ctrl+C, finishing in-flight proxies (press again to abort)...");
        }
    });

    let total = proxies.len();
    let report = pipeline.run_until(proxies, &shutdown).await;

    ProxyParser::save_to_file(&report.residential, &config.residential_path)?;
    info!(
        "Saved {} residential proxies to {}",
        report.residential.len(),
        config.residential_path.display()
    );

    ProxyParser::save_to_file(&report.checked, &config.checked_path)?;
    info!(
        "Saved {} checked (safe) proxies to {}",
        report.checked.len(),
        config.checked_path.display()
    );

    info!(
        total,
        processed = report.processed(),
        datacenter = report.datacenter_count(),
        residential = report.residential.len(),
        checked = report.checked.len(),
        unscored = report.unscored_count(),
        "Classification summary"
    );

    Ok(())
}
