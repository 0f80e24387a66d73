//! Slug-keyed vulnerability index
//!
//! Loaded once at startup from a JSON database and shared read-only by
//! every concurrent scan task. A missing or corrupt database is never
//! fatal: the index loads empty and every match query returns nothing.

use crate::version::Version;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Vulnerability severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
    #[serde(rename = "n/a")]
    NotAvailable,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Informational => "informational",
            Self::NotAvailable => "n/a",
        };
        write!(f, "{label}")
    }
}

/// Inclusive version window within which a plugin is vulnerable
///
/// Absent bounds leave that side of the window open; a record with no
/// bounds at all affects every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedVersionBounds {
    /// Highest affected version, inclusive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal: Option<String>,
    /// Lowest affected version, inclusive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greater_than_or_equal: Option<String>,
}

impl AffectedVersionBounds {
    /// Whether `installed` satisfies every present bound
    ///
    /// A bound that fails to parse as a version makes the record not
    /// match, never a panic.
    fn affects(&self, installed: &Version) -> bool {
        if let Some(upper) = &self.less_than_or_equal {
            match Version::parse(upper) {
                Some(upper) => {
                    if *installed > upper {
                        return false;
                    }
                }
                None => return false,
            }
        }

        if let Some(lower) = &self.greater_than_or_equal {
            match Version::parse(lower) {
                Some(lower) => {
                    if *installed < lower {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}

/// One known vulnerability for a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// CVE or internal identifier
    pub id: String,
    /// Vulnerability class, e.g. "SQL Injection"
    #[serde(rename = "type")]
    pub kind: String,
    /// Severity rating
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Affected version window
    #[serde(default)]
    pub affected_versions: AffectedVersionBounds,
}

/// One database entry: a plugin and its known vulnerabilities
#[derive(Debug, Deserialize)]
struct DbEntry {
    plugin_slug: String,
    vulnerabilities: Vec<VulnerabilityRecord>,
}

/// In-memory, slug-keyed vulnerability table
#[derive(Debug, Default)]
pub struct VulnerabilityIndex {
    by_slug: HashMap<String, Vec<VulnerabilityRecord>>,
}

impl VulnerabilityIndex {
    /// Load the index from a JSON database file
    ///
    /// An unreadable or malformed file yields an empty index; malformed
    /// individual entries are skipped. Both are logged, neither fails.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "vulnerability database '{}' not readable ({}), continuing with an empty index",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "vulnerability database '{}' is not valid JSON ({}), continuing with an empty index",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        let mut by_slug: HashMap<String, Vec<VulnerabilityRecord>> = HashMap::new();
        for entry in entries {
            match serde_json::from_value::<DbEntry>(entry) {
                Ok(entry) => by_slug
                    .entry(entry.plugin_slug)
                    .or_default()
                    .extend(entry.vulnerabilities),
                Err(e) => warn!("skipping malformed vulnerability entry: {}", e),
            }
        }

        debug!("vulnerability index covers {} plugin slugs", by_slug.len());
        Self { by_slug }
    }

    /// Build an index directly from records (used by tests and embedders)
    pub fn from_records(records: impl IntoIterator<Item = (String, Vec<VulnerabilityRecord>)>) -> Self {
        let mut by_slug: HashMap<String, Vec<VulnerabilityRecord>> = HashMap::new();
        for (slug, vulnerabilities) in records {
            by_slug.entry(slug).or_default().extend(vulnerabilities);
        }
        Self { by_slug }
    }

    /// Whether the index knows any vulnerabilities for a slug
    pub fn contains_slug(&self, slug: &str) -> bool {
        self.by_slug.contains_key(slug)
    }

    /// All plugin slugs the index knows about
    ///
    /// This set bounds active readme resolution: only plugins present in
    /// the local database are ever probed.
    pub fn known_slugs(&self) -> impl Iterator<Item = &str> {
        self.by_slug.keys().map(String::as_str)
    }

    /// Number of plugin slugs in the index
    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }

    /// All records affecting `version` of the plugin `slug`
    ///
    /// Empty when the slug is unknown or the installed version does not
    /// parse; a finding with an unparseable version is unresolvable, not
    /// "not vulnerable". `specific_cve` narrows the records to one id.
    pub fn matches(
        &self,
        slug: &str,
        version: &str,
        specific_cve: Option<&str>,
    ) -> Vec<VulnerabilityRecord> {
        let Some(records) = self.by_slug.get(slug) else {
            return Vec::new();
        };
        let Some(installed) = Version::parse(version) else {
            return Vec::new();
        };

        records
            .iter()
            .filter(|record| specific_cve.is_none_or(|id| record.id == id))
            .filter(|record| record.affected_versions.affects(&installed))
            .cloned()
            .collect()
    }
}
