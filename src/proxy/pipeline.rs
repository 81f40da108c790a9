//! Classification pipeline combining the offline and remote lookups

use crate::config::ClassifierConfig;
use crate::error::LookupError;
use crate::proxy::asn::{AsnClassifier, AsnSource};
use crate::proxy::intel::{ConnectionTypeSource, IpInfoClient};
use crate::proxy::models::{
    ClassificationReport, ProxyOutcome, ProxyRecord, RiskAssessment, Verdict,
};
use crate::proxy::risk::{ProxyCheckClient, RiskSource};
use crate::Result;
use futures::future;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Signal telling the pipeline to stop launching new work
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`Shutdown`] signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Create a connected shutdown trigger and token
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A token that is never triggered
    pub fn never() -> Self {
        shutdown_channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ShutdownTrigger {
    /// Send the shutdown signal
    ///
    /// Returns `true` if the signal had already been sent.
    pub fn trigger(&self) -> bool {
        self.tx.send_replace(true)
    }
}

/// Per-proxy classification pipeline
pub struct ClassificationPipeline {
    asn: AsnClassifier,
    intel: Arc<dyn ConnectionTypeSource>,
    risk: Arc<dyn RiskSource>,
    concurrency: usize,
}

impl ClassificationPipeline {
    /// Create a pipeline that processes proxies one at a time
    pub fn new(
        asn: AsnClassifier,
        intel: Arc<dyn ConnectionTypeSource>,
        risk: Arc<dyn RiskSource>,
    ) -> Self {
        Self {
            asn,
            intel,
            risk,
            concurrency: 1,
        }
    }

    /// Build a pipeline backed by the HTTP services named in `config`
    pub fn from_config(config: &ClassifierConfig, asn_source: Arc<dyn AsnSource>) -> Result<Self> {
        let asn = AsnClassifier::new(asn_source)
            .with_markers(config.datacenter_markers.clone());
        let intel = Arc::new(IpInfoClient::with_config(&config.ipinfo)?);
        let risk = Arc::new(ProxyCheckClient::with_config(&config.proxycheck)?);

        Ok(Self::new(asn, intel, risk).with_concurrency(config.concurrency))
    }

    /// Set how many proxies are classified at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classify a single proxy
    ///
    /// Proxies the ASN data marks as datacenter never reach the remote
    /// services. Every other proxy gets one connection-type lookup and one
    /// risk lookup.
    pub async fn classify_proxy(&self, proxy: ProxyRecord) -> ProxyOutcome {
        debug!(proxy = %proxy, "Processing proxy");
        let ip = proxy.ip();

        let asn_verdict = self.asn.classify(ip);
        if asn_verdict == Verdict::Datacenter {
            info!(proxy = %proxy, "Skipping datacenter proxy");
            return ProxyOutcome::datacenter(proxy);
        }

        let refined_verdict = if asn_verdict.needs_refinement() {
            Some(self.refine(ip).await)
        } else {
            None
        };

        let risk = self.score(ip).await;

        let outcome = ProxyOutcome {
            asn_verdict,
            refined_verdict,
            risk,
            proxy,
        };

        if outcome.is_residential() {
            info!(proxy = %outcome.proxy, "Proxy added to residential list");
        }
        if outcome.is_checked() {
            info!(proxy = %outcome.proxy, "Proxy added to checked (safe) list");
        }

        outcome
    }

    /// Classify all proxies, keeping input order in the report
    pub async fn run(&self, proxies: Vec<ProxyRecord>) -> ClassificationReport {
        self.run_until(proxies, &Shutdown::never()).await
    }

    /// Classify proxies until `shutdown` is triggered
    ///
    /// Work already started when the signal arrives runs to completion; no new
    /// proxies are picked up afterwards.
    pub async fn run_until(
        &self,
        proxies: Vec<ProxyRecord>,
        shutdown: &Shutdown,
    ) -> ClassificationReport {
        let total = proxies.len();

        let outcomes = stream::iter(proxies)
            .take_while(|_| future::ready(!shutdown.is_triggered()))
            .map(|proxy| self.classify_proxy(proxy))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        if outcomes.len() < total {
            warn!(
                "Classification stopped early: {} of {} proxies processed",
                outcomes.len(),
                total
            );
        }

        ClassificationReport::from_outcomes(outcomes)
    }

    async fn refine(&self, ip: &str) -> Verdict {
        match self.intel.resolve(ip).await {
            Ok(verdict) => verdict,
            Err(LookupError::MissingApiKey) => Verdict::Unknown,
            Err(e) => {
                warn!(ip, stage = "ip-intel", error = %e, "Connection-type lookup failed");
                Verdict::Unknown
            }
        }
    }

    async fn score(&self, ip: &str) -> Option<RiskAssessment> {
        match self.risk.assess(ip).await {
            Ok(Some(risk)) => Some(risk),
            Ok(None) => {
                warn!(ip, stage = "risk", "No risk data returned");
                None
            }
            Err(LookupError::MissingApiKey) => None,
            Err(e) => {
                warn!(ip, stage = "risk", error = %e, "Risk lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::asn::AsnRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubAsn {
        records: HashMap<String, AsnRecord>,
    }

    impl StubAsn {
        fn with(mut self, ip: &str, org: &str) -> Self {
            self.records.insert(ip.to_string(), AsnRecord::new(64500, org));
            self
        }
    }

    impl AsnSource for StubAsn {
        fn lookup_asn(&self, ip: &str) -> std::result::Result<Option<AsnRecord>, LookupError> {
            Ok(self.records.get(ip).cloned())
        }
    }

    #[derive(Default)]
    struct StubIntel {
        types: HashMap<String, &'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl StubIntel {
        fn with(mut self, ip: &str, connection_type: &'static str) -> Self {
            self.types.insert(ip.to_string(), connection_type);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectionTypeSource for StubIntel {
        async fn resolve(&self, ip: &str) -> std::result::Result<Verdict, LookupError> {
            self.calls.lock().unwrap().push(ip.to_string());
            match self.types.get(ip) {
                Some(&"residential") => Ok(Verdict::Residential),
                Some(_) => Ok(Verdict::Datacenter),
                None => Err(LookupError::Timeout),
            }
        }
    }

    #[derive(Default)]
    struct StubRisk {
        scores: HashMap<String, u64>,
        delays: HashMap<String, u64>,
        calls: AtomicUsize,
    }

    impl StubRisk {
        fn with(mut self, ip: &str, score: u64) -> Self {
            self.scores.insert(ip.to_string(), score);
            self
        }

        fn delayed(mut self, ip: &str, millis: u64) -> Self {
            self.delays.insert(ip.to_string(), millis);
            self
        }
    }

    #[async_trait]
    impl RiskSource for StubRisk {
        async fn assess(
            &self,
            ip: &str,
        ) -> std::result::Result<Option<RiskAssessment>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(millis) = self.delays.get(ip) {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
            }
            Ok(self.scores.get(ip).copied().map(RiskAssessment::new))
        }
    }

    fn pipeline(
        asn: StubAsn,
        intel: Arc<StubIntel>,
        risk: Arc<StubRisk>,
    ) -> ClassificationPipeline {
        ClassificationPipeline::new(AsnClassifier::new(Arc::new(asn)), intel, risk)
    }

    fn records(lines: &[&str]) -> Vec<ProxyRecord> {
        lines.iter().map(|l| ProxyRecord::new(*l)).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let asn = StubAsn::default()
            .with("1.1.1.1", "Cloudflare, Inc. Hosting")
            .with("2.2.2.2", "Comcast Cable");
        let intel = Arc::new(StubIntel::default().with("2.2.2.2", "residential"));
        let risk = Arc::new(StubRisk::default().with("2.2.2.2", 10));

        let report = pipeline(asn, intel.clone(), risk.clone())
            .run(records(&["http://1.1.1.1:80", "2.2.2.2:8080"]))
            .await;

        assert_eq!(report.residential, vec!["2.2.2.2:8080"]);
        assert_eq!(report.checked, vec!["2.2.2.2:8080"]);
        assert_eq!(intel.calls(), vec!["2.2.2.2"]);
        assert_eq!(risk.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_datacenter_short_circuits_remote_calls() {
        let asn = StubAsn::default().with("1.1.1.1", "Acme Data Center");
        let intel = Arc::new(StubIntel::default().with("1.1.1.1", "residential"));
        let risk = Arc::new(StubRisk::default().with("1.1.1.1", 0));

        let report = pipeline(asn, intel.clone(), risk.clone())
            .run(records(&["1.1.1.1:3128"]))
            .await;

        assert!(report.residential.is_empty());
        assert!(report.checked.is_empty());
        assert!(intel.calls().is_empty());
        assert_eq!(risk.calls.load(Ordering::SeqCst), 0);
        assert!(report.outcomes[0].is_short_circuited());
    }

    #[tokio::test]
    async fn test_risk_threshold_boundary() {
        let asn = StubAsn::default();
        let intel = Arc::new(StubIntel::default());
        let risk = Arc::new(StubRisk::default().with("5.5.5.5", 50).with("5.5.5.6", 51));

        let report = pipeline(asn, intel, risk)
            .run(records(&["5.5.5.5:80", "5.5.5.6:80", "5.5.5.7:80"]))
            .await;

        assert_eq!(report.checked, vec!["5.5.5.5:80"]);
        assert_eq!(report.unscored_count(), 1);
    }

    #[tokio::test]
    async fn test_intel_failure_is_not_residential() {
        let asn = StubAsn::default().with("2.2.2.2", "Comcast Cable");
        // No entry for 2.2.2.2 makes the stub time out
        let intel = Arc::new(StubIntel::default());
        let risk = Arc::new(StubRisk::default().with("2.2.2.2", 5));

        let report = pipeline(asn, intel.clone(), risk)
            .run(records(&["2.2.2.2:8080"]))
            .await;

        assert!(report.residential.is_empty());
        assert_eq!(report.checked, vec!["2.2.2.2:8080"]);
        assert_eq!(report.outcomes[0].final_verdict(), Verdict::Unknown);
        assert_eq!(intel.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_database_miss_triggers_refinement() {
        let asn = StubAsn::default();
        let intel = Arc::new(StubIntel::default().with("7.7.7.7", "residential"));
        let risk = Arc::new(StubRisk::default());

        let report = pipeline(asn, intel.clone(), risk)
            .run(records(&["socks5://7.7.7.7:1080"]))
            .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.asn_verdict, Verdict::Unknown);
        assert_eq!(outcome.refined_verdict, Some(Verdict::Residential));
        assert_eq!(report.residential, vec!["socks5://7.7.7.7:1080"]);
        assert!(report.checked.is_empty());
        assert_eq!(intel.calls(), vec!["7.7.7.7"]);
    }

    #[tokio::test]
    async fn test_refined_datacenter_still_scored() {
        let asn = StubAsn::default().with("8.8.4.4", "Some ISP");
        let intel = Arc::new(StubIntel::default().with("8.8.4.4", "business"));
        let risk = Arc::new(StubRisk::default().with("8.8.4.4", 0));

        let report = pipeline(asn, intel, risk).run(records(&["8.8.4.4:80"])).await;

        assert!(report.residential.is_empty());
        assert_eq!(report.checked, vec!["8.8.4.4:80"]);
    }

    #[tokio::test]
    async fn test_concurrent_run_preserves_input_order() {
        let asn = StubAsn::default();
        let intel = Arc::new(
            StubIntel::default()
                .with("10.0.0.1", "residential")
                .with("10.0.0.2", "residential")
                .with("10.0.0.3", "residential"),
        );
        let risk = Arc::new(
            StubRisk::default()
                .with("10.0.0.1", 1)
                .with("10.0.0.2", 2)
                .with("10.0.0.3", 3)
                .delayed("10.0.0.1", 60)
                .delayed("10.0.0.2", 30),
        );

        let input = records(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        let report = pipeline(asn, intel, risk)
            .with_concurrency(3)
            .run(input)
            .await;

        let expected = vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"];
        assert_eq!(report.residential, expected);
        assert_eq!(report.checked, expected);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let build = || {
            let asn = StubAsn::default()
                .with("1.1.1.1", "Cloud Provider")
                .with("2.2.2.2", "Home ISP");
            let intel = Arc::new(StubIntel::default().with("2.2.2.2", "residential"));
            let risk = Arc::new(StubRisk::default().with("2.2.2.2", 20).with("3.3.3.3", 80));
            pipeline(asn, intel, risk).with_concurrency(2)
        };
        let input = records(&["1.1.1.1:80", "2.2.2.2:80", "3.3.3.3:80", "2.2.2.2:80"]);

        let first = build().run(input.clone()).await;
        let second = build().run(input).await;

        assert_eq!(first.residential, second.residential);
        assert_eq!(first.checked, second.checked);
        assert_eq!(first.residential, vec!["2.2.2.2:80", "2.2.2.2:80"]);
    }

    #[tokio::test]
    async fn test_triggered_shutdown_processes_nothing() {
        let asn = StubAsn::default();
        let intel = Arc::new(StubIntel::default());
        let risk = Arc::new(StubRisk::default());
        let (trigger, shutdown) = shutdown_channel();
        trigger.trigger();

        let report = pipeline(asn, intel.clone(), risk.clone())
            .run_until(records(&["1.1.1.1:80", "2.2.2.2:80"]), &shutdown)
            .await;

        assert_eq!(report.processed(), 0);
        assert!(intel.calls().is_empty());
        assert_eq!(risk.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_never_is_not_triggered() {
        assert!(!Shutdown::never().is_triggered());
    }

    #[test]
    fn test_repeated_trigger_reports_pending_shutdown() {
        let (trigger, shutdown) = shutdown_channel();

        assert!(!trigger.trigger());
        assert!(shutdown.is_triggered());
        // A second request means the first one is still being honored
        assert!(trigger.trigger());
    }

    #[test]
    fn test_pipeline_concurrency_floor() {
        let p = pipeline(
            StubAsn::default(),
            Arc::new(StubIntel::default()),
            Arc::new(StubRisk::default()),
        )
        .with_concurrency(0);
        assert_eq!(p.concurrency, 1);
    }
}
