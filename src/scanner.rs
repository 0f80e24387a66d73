//! Per-target scan pipeline and the bounded-concurrency orchestrator
//!
//! Each target runs probe → extract → match to completion inside its own
//! task; a semaphore caps how many targets are in flight and an mpsc
//! channel feeds finished results to a single aggregating loop, so the
//! result store never sees unsynchronized concurrent writes. A failure
//! inside one target's pipeline is captured into that target's result
//! and never disturbs its siblings.

use crate::detect::{self, PluginFinding};
use crate::error::Result;
use crate::fetch::HttpClient;
use crate::vulndb::{VulnerabilityIndex, VulnerabilityRecord};
use crate::{ScanConfig, SinkRef};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use url::Url;

/// Capacity of the worker-to-aggregator result channel
const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Terminal state of one target's scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    /// Target could not be confirmed as WordPress
    NotWordpress,
    /// Target was scanned to completion
    Scanned,
    /// The scanning phase failed for this target
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotWordpress => write!(f, "not WordPress"),
            Self::Scanned => write!(f, "scanned"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A plugin finding paired with a vulnerability record it satisfies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerabilityMatch {
    /// Plugin slug
    pub slug: String,
    /// Installed plugin version
    pub version: String,
    /// The matched record
    pub vulnerability: VulnerabilityRecord,
}

/// Outcome for one target; written exactly once per target
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Normalized target URL
    pub target_url: String,
    /// Terminal state
    pub status: ScanStatus,
    /// Error text for `not-wordpress` and `failed` outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Plugins detected on the target
    pub plugins: Vec<PluginFinding>,
    /// Findings matched against the vulnerability index
    pub vulnerable_plugins: Vec<VulnerabilityMatch>,
}

impl ScanResult {
    fn new(target_url: &str) -> Self {
        Self {
            target_url: target_url.to_string(),
            status: ScanStatus::Failed,
            error: None,
            plugins: Vec::new(),
            vulnerable_plugins: Vec::new(),
        }
    }

    /// Whether any vulnerability matched on this target
    pub fn is_vulnerable(&self) -> bool {
        !self.vulnerable_plugins.is_empty()
    }
}

/// Normalize a raw target: trim, default to https, strip trailing slashes
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Mass WordPress scanner
///
/// Cheap to clone: every worker task carries its own handle to the shared
/// connection pool, the read-only vulnerability index, and the finding
/// sink.
#[derive(Clone)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    client: Arc<HttpClient>,
    index: Arc<VulnerabilityIndex>,
    sink: SinkRef,
}

impl Scanner {
    /// Create a scanner over a loaded vulnerability index
    pub fn new(config: ScanConfig, index: VulnerabilityIndex, sink: SinkRef) -> Result<Self> {
        let client = HttpClient::new(config.timeout, config.retries)?;
        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            index: Arc::new(index),
            sink,
        })
    }

    /// Scan every target with bounded concurrency
    ///
    /// Completion order between targets is unspecified; the returned map
    /// holds exactly one result per normalized target. Pooled connections
    /// are released when the scanner is dropped, failures or not.
    pub async fn run(&self, targets: Vec<String>) -> HashMap<String, ScanResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.threads.max(1)));
        let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let mut workers = Vec::with_capacity(targets.len());
        for raw in targets {
            let target = normalize_target(&raw);
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed unexpectedly");
            let scanner = self.clone();
            let tx = tx.clone();

            workers.push(tokio::spawn(async move {
                let _permit = permit;
                let result = scanner.scan_target(&target).await;
                let _ = tx.send((target, result)).await;
            }));
        }
        drop(tx);

        let mut results = HashMap::new();
        while let Some((target, result)) = rx.recv().await {
            results.insert(target, result);
        }

        for worker in workers {
            let _ = worker.await;
        }
        results
    }

    /// Run the full pipeline for one target
    ///
    /// Never errors: every outcome, including failure, is captured into
    /// the returned [`ScanResult`].
    pub async fn scan_target(&self, target: &str) -> ScanResult {
        let mut result = ScanResult::new(target);

        let base = match Url::parse(target) {
            Ok(base) => base,
            Err(e) => {
                result.error = Some(format!("invalid target URL: {e}"));
                return result;
            }
        };

        let probe = detect::probe(&self.client, &base).await;
        if !probe.confirmed {
            result.status = ScanStatus::NotWordpress;
            result.error = Some("could not confirm WordPress installation".to_string());
            return result;
        }

        match self.audit(target, &base, probe.homepage).await {
            Ok((plugins, matches)) => {
                result.status = ScanStatus::Scanned;
                result.plugins = plugins;
                result.vulnerable_plugins = matches;
            }
            Err(e) => {
                result.status = ScanStatus::Failed;
                result.error = Some(e.to_string());
            }
        }
        result
    }

    /// Extract plugins and match them against the vulnerability index
    async fn audit(
        &self,
        target: &str,
        base: &Url,
        homepage: Option<String>,
    ) -> Result<(Vec<PluginFinding>, Vec<VulnerabilityMatch>)> {
        let mut found: HashMap<String, PluginFinding> = HashMap::new();

        if let Some(body) = homepage {
            for finding in detect::extract_plugins(&body) {
                merge_finding(&mut found, finding);
            }
        }

        // Active resolution is bounded by the slugs the index knows:
        // readme probes never exceed the size of the local database
        for slug in self.index.known_slugs() {
            if let Some(filter) = &self.config.plugin
                && filter != slug
            {
                continue;
            }
            let resolved = found.get(slug).is_some_and(PluginFinding::has_version);
            if resolved {
                continue;
            }

            let readme_url = base
                .join(&format!("/wp-content/plugins/{slug}/readme.txt"))
                .map_err(|e| crate::Error::InvalidUrl(e.to_string()))?;
            if let Some(page) = self.client.get(readme_url.as_str()).await
                && page.is_ok()
                && let Some(info) = detect::parse_readme(&page.body)
                && info.slug == slug
                && info.has_version()
            {
                found.insert(slug.to_string(), info);
            }
        }

        let mut plugins: Vec<PluginFinding> = found.into_values().collect();
        plugins.sort_by(|a, b| a.slug.cmp(&b.slug));

        let mut matches = Vec::new();
        for finding in &plugins {
            if let Some(filter) = &self.config.plugin
                && filter != &finding.slug
            {
                continue;
            }
            for record in
                self.index
                    .matches(&finding.slug, &finding.version, self.config.cve.as_deref())
            {
                self.sink
                    .on_match(target, &finding.slug, &finding.version, &record);
                matches.push(VulnerabilityMatch {
                    slug: finding.slug.clone(),
                    version: finding.version.clone(),
                    vulnerability: record,
                });
            }
        }

        Ok((plugins, matches))
    }
}

/// Merge a finding into the per-target map
///
/// A concrete version always supersedes `"unknown"` for the same slug; a
/// later `"unknown"` never overwrites a concrete version.
fn merge_finding(found: &mut HashMap<String, PluginFinding>, finding: PluginFinding) {
    match found.get_mut(&finding.slug) {
        Some(existing) => {
            if !existing.has_version() && finding.has_version() {
                existing.version = finding.version;
            }
        }
        None => {
            found.insert(finding.slug.clone(), finding);
        }
    }
}
