//! WordPress Hunter - Mass WordPress vulnerability scanner
//!
//! Fingerprints WordPress installations across many targets concurrently,
//! extracts installed plugin versions, and matches them against a local
//! vulnerability database.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use wordpress_hunter::{NullSink, ScanConfig, Scanner, VulnerabilityIndex};
//!
//! #[tokio::main]
//! async fn main() -> wordpress_hunter::Result<()> {
//!     let index = VulnerabilityIndex::load(Path::new("data/vulnerabilities.json"));
//!     let scanner = Scanner::new(ScanConfig::default(), index, NullSink::new_ref())?;
//!     let results = scanner.run(vec!["https://example.com".to_string()]).await;
//!     for (target, result) in &results {
//!         println!("{}: {}", target, result.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod detect;
pub mod error;
pub mod fetch;
pub mod report;
pub mod scanner;
mod version;
pub mod vulndb;

use std::sync::Arc;

pub use detect::{PluginFinding, UNKNOWN_VERSION};
pub use error::{Error, Result};
pub use fetch::{FetchedPage, HttpClient};
pub use report::{ReportFormat, render_summary, write_report};
pub use scanner::{ScanResult, ScanStatus, Scanner, VulnerabilityMatch, normalize_target};
pub use vulndb::{AffectedVersionBounds, Severity, VulnerabilityIndex, VulnerabilityRecord};

/// Scan configuration shared by all targets of one run
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum targets in flight at once
    pub threads: usize,
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Retry budget for transport failures per request
    pub retries: u32,
    /// Restrict scanning to one plugin slug
    pub plugin: Option<String>,
    /// Restrict matching to one CVE id
    pub cve: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 50,
            timeout: 5,
            retries: 2,
            plugin: None,
            cve: None,
        }
    }
}

/// Receives each vulnerability match as it is found, before final
/// aggregation, so a reporter can build plugin-indexed site lists
/// incrementally
pub trait ScanEventSink: Send + Sync {
    /// Called once per match with the target, finding, and matched record
    fn on_match(&self, target: &str, slug: &str, version: &str, record: &VulnerabilityRecord);
}

/// Shared handle to a [`ScanEventSink`]
pub type SinkRef = Arc<dyn ScanEventSink>;

/// Sink that discards every event
pub struct NullSink;

impl NullSink {
    /// Create a shared handle to a no-op sink
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for NullSink {
    fn on_match(&self, _target: &str, _slug: &str, _version: &str, _record: &VulnerabilityRecord) {}
}
