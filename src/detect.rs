//! WordPress detection heuristics
//!
//! Probing confirms a target runs WordPress; extraction pulls plugin
//! slugs and versions out of page bodies. Both scan raw HTML with
//! regexes rather than a DOM parser: that is a deliberate best-effort
//! heuristic which can under- or over-match (an unrelated asset path
//! that happens to sit under `/wp-content/plugins/` still counts).

use crate::fetch::HttpClient;
use regex::Regex;
use serde::Serialize;
use url::Url;

/// Sentinel for a plugin whose version could not be determined
pub const UNKNOWN_VERSION: &str = "unknown";

/// Markers in a homepage body that identify WordPress
const WP_BODY_MARKERS: &[&str] = &["wp-content", "wp-includes", "/wp-json/"];

/// Login page probed when the homepage is inconclusive
const WP_LOGIN_PATH: &str = "/wp-login.php";

/// Marker expected in a WordPress login page body
const WP_LOGIN_MARKER: &str = "WordPress";

/// Plugin asset paths, optionally versioned via a `ver=` query parameter
const PLUGIN_PATH_PATTERN: &str =
    r#"/wp-content/plugins/([a-z0-9-]+)/[^\s"'<>]*?(?:\.css|\.js|readme\.txt)(?:\?ver=([0-9][0-9.]*))?"#;

/// A plugin detected on a target, before vulnerability matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginFinding {
    /// Plugin slug (its directory name under `wp-content/plugins/`)
    pub slug: String,
    /// Detected version, or [`UNKNOWN_VERSION`]
    pub version: String,
}

impl PluginFinding {
    /// Whether this finding carries a concrete version
    pub fn has_version(&self) -> bool {
        self.version != UNKNOWN_VERSION
    }
}

/// Outcome of probing one target
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Whether WordPress was confirmed
    pub confirmed: bool,
    /// Homepage body, retained when the root returned 200
    pub homepage: Option<String>,
}

/// Check whether a target runs WordPress
///
/// Fetches the target root and looks for WordPress path markers in a 200
/// body; falls back to the `wp-login.php` page. Fetch failures count as a
/// negative for that step only, so probing degrades to "not confirmed"
/// instead of erroring.
pub async fn probe(client: &HttpClient, base: &Url) -> ProbeOutcome {
    let mut homepage = None;

    if let Some(page) = client.get(base.as_str()).await
        && page.is_ok()
    {
        let confirmed = body_has_wp_markers(&page.body);
        homepage = Some(page.body);
        if confirmed {
            return ProbeOutcome {
                confirmed: true,
                homepage,
            };
        }
    }

    let confirmed = match base.join(WP_LOGIN_PATH) {
        Ok(login_url) => matches!(
            client.get(login_url.as_str()).await,
            Some(page) if page.is_ok() && page.body.contains(WP_LOGIN_MARKER)
        ),
        Err(_) => false,
    };

    ProbeOutcome { confirmed, homepage }
}

/// Whether a homepage body contains any WordPress marker
pub fn body_has_wp_markers(body: &str) -> bool {
    WP_BODY_MARKERS.iter().any(|marker| body.contains(marker))
}

/// Extract plugin findings from a page body
///
/// One finding per distinct slug; when a slug appears several times, a
/// concrete version upgrades an earlier `"unknown"` and an `"unknown"`
/// never downgrades a concrete version.
pub fn extract_plugins(html: &str) -> Vec<PluginFinding> {
    let re = Regex::new(PLUGIN_PATH_PATTERN).unwrap();

    let mut plugins: Vec<PluginFinding> = Vec::new();
    for caps in re.captures_iter(html) {
        let slug = &caps[1];
        let version = caps
            .get(2)
            .map_or(UNKNOWN_VERSION, |m| m.as_str())
            .to_string();

        match plugins.iter_mut().find(|p| p.slug == slug) {
            Some(existing) => {
                if !existing.has_version() && version != UNKNOWN_VERSION {
                    existing.version = version;
                }
            }
            None => plugins.push(PluginFinding {
                slug: slug.to_string(),
                version,
            }),
        }
    }
    plugins
}

/// Parse a plugin `readme.txt`
///
/// The display name comes from the `=== Name ===` banner (re-derived into
/// a slug), the version from `Stable tag:` with `Version:` as fallback.
/// Returns `None` when neither is present.
pub fn parse_readme(content: &str) -> Option<PluginFinding> {
    let name_re = Regex::new(r"(?i)===\s*(.*?)\s*===").unwrap();
    let stable_re = Regex::new(r"(?i)Stable tag:\s*([0-9.]+)").unwrap();
    let version_re = Regex::new(r"(?i)Version:\s*([0-9.]+)").unwrap();

    let slug = name_re
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| slug_from_name(m.as_str()));

    let version = stable_re
        .captures(content)
        .or_else(|| version_re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    if slug.is_none() && version.is_none() {
        return None;
    }

    Some(PluginFinding {
        // An absent banner yields an empty slug, which never matches a
        // probed slug and so is discarded by the caller
        slug: slug.unwrap_or_default(),
        version: version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
    })
}

/// Derive a slug from a plugin display name
pub fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
