//! End-to-end scan pipeline tests over mock WordPress sites

use std::sync::Mutex;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wordpress_hunter::{
    AffectedVersionBounds, NullSink, ScanConfig, ScanEventSink, ScanStatus, Scanner, Severity,
    SinkRef, UNKNOWN_VERSION, VulnerabilityIndex, VulnerabilityRecord,
};

const PLAIN_HOMEPAGE: &str = "<html><head><title>Just a site</title></head><body>hello</body></html>";

fn wp_homepage(extra: &str) -> String {
    format!(
        r#"<html><head>
<link rel="stylesheet" href="/wp-content/themes/twentytwenty/style.css">
{extra}
</head><body>a blog</body></html>"#
    )
}

fn record(id: &str, lower: Option<&str>, upper: Option<&str>) -> VulnerabilityRecord {
    VulnerabilityRecord {
        id: id.to_string(),
        kind: "Cross-Site Scripting".to_string(),
        severity: Severity::High,
        description: "test vulnerability".to_string(),
        affected_versions: AffectedVersionBounds {
            less_than_or_equal: upper.map(String::from),
            greater_than_or_equal: lower.map(String::from),
        },
    }
}

fn index_with(entries: Vec<(&str, Vec<VulnerabilityRecord>)>) -> VulnerabilityIndex {
    VulnerabilityIndex::from_records(
        entries
            .into_iter()
            .map(|(slug, records)| (slug.to_string(), records)),
    )
}

fn quick_config() -> ScanConfig {
    ScanConfig {
        threads: 4,
        timeout: 5,
        retries: 0,
        plugin: None,
        cve: None,
    }
}

/// Sink recording every match notification
#[derive(Default)]
struct RecordingSink {
    matches: Mutex<Vec<(String, String, String, String)>>,
}

impl ScanEventSink for RecordingSink {
    fn on_match(&self, target: &str, slug: &str, version: &str, record: &VulnerabilityRecord) {
        self.matches.lock().unwrap().push((
            target.to_string(),
            slug.to_string(),
            version.to_string(),
            record.id.clone(),
        ));
    }
}

async fn serve_homepage(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn version_above_upper_bound_is_not_matched() {
    let server = serve_homepage(wp_homepage(
        r#"<script src="/wp-content/plugins/akismet/akismet.js?ver=5.3"></script>"#,
    ))
    .await;

    let index = index_with(vec![("akismet", vec![record("CVE-1", None, Some("5.2"))])]);
    let scanner = Scanner::new(quick_config(), index, NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.status, ScanStatus::Scanned);
    assert_eq!(result.plugins.len(), 1);
    assert_eq!(result.plugins[0].slug, "akismet");
    assert_eq!(result.plugins[0].version, "5.3");
    assert!(result.vulnerable_plugins.is_empty());
}

#[tokio::test]
async fn version_inside_bounds_is_matched_and_notified() {
    let server = serve_homepage(wp_homepage(
        r#"<script src="/wp-content/plugins/akismet/akismet.js?ver=5.3"></script>"#,
    ))
    .await;

    let index = index_with(vec![("akismet", vec![record("CVE-1", None, Some("5.5"))])]);
    let sink = std::sync::Arc::new(RecordingSink::default());
    let sink_ref: SinkRef = sink.clone();
    let scanner = Scanner::new(quick_config(), index, sink_ref).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.status, ScanStatus::Scanned);
    assert_eq!(result.vulnerable_plugins.len(), 1);
    let m = &result.vulnerable_plugins[0];
    assert_eq!(m.slug, "akismet");
    assert_eq!(m.version, "5.3");
    assert_eq!(m.vulnerability.id, "CVE-1");

    let notified = sink.matches.lock().unwrap();
    assert_eq!(
        *notified,
        vec![(
            server.uri(),
            "akismet".to_string(),
            "5.3".to_string(),
            "CVE-1".to_string()
        )]
    );
}

#[tokio::test]
async fn site_without_wordpress_markers_is_not_wordpress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAIN_HOMEPAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form>login</form>"))
        .mount(&server)
        .await;

    let index = index_with(vec![("akismet", vec![record("CVE-1", None, None)])]);
    let scanner = Scanner::new(quick_config(), index, NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.status, ScanStatus::NotWordpress);
    assert!(result.plugins.is_empty());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn login_page_marker_confirms_wordpress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAIN_HOMEPAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-login.php"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<title>Log In - WordPress</title>"),
        )
        .mount(&server)
        .await;

    let scanner = Scanner::new(quick_config(), index_with(vec![]), NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    assert_eq!(results[&server.uri()].status, ScanStatus::Scanned);
}

#[tokio::test]
async fn readme_resolves_plugin_missed_by_passive_extraction() {
    let server = serve_homepage(wp_homepage("")).await;
    Mock::given(method("GET"))
        .and(path("/wp-content/plugins/hello-dolly/readme.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "=== Hello Dolly ===\nContributors: matt\nStable tag: 1.7.2\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let index = index_with(vec![(
        "hello-dolly",
        vec![record("CVE-2", None, Some("2.0"))],
    )]);
    let scanner = Scanner::new(quick_config(), index, NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.status, ScanStatus::Scanned);
    assert_eq!(result.plugins.len(), 1);
    assert_eq!(result.plugins[0].slug, "hello-dolly");
    assert_eq!(result.plugins[0].version, "1.7.2");
    assert_eq!(result.vulnerable_plugins.len(), 1);
    assert_eq!(result.vulnerable_plugins[0].vulnerability.id, "CVE-2");
}

#[tokio::test]
async fn readme_probing_is_bounded_by_the_index() {
    let server = serve_homepage(wp_homepage(
        // Passively detected but absent from the index: never probed
        r#"<link href="/wp-content/plugins/mystery-plugin/assets/style.css">"#,
    ))
    .await;
    Mock::given(method("GET"))
        .and(path("/wp-content/plugins/mystery-plugin/readme.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("should never be fetched"))
        .expect(0)
        .mount(&server)
        .await;

    let index = index_with(vec![("hello-dolly", vec![record("CVE-2", None, None)])]);
    let scanner = Scanner::new(quick_config(), index, NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.status, ScanStatus::Scanned);
    // The unprobed plugin still appears as a finding with unknown version
    let mystery = result
        .plugins
        .iter()
        .find(|p| p.slug == "mystery-plugin")
        .unwrap();
    assert_eq!(mystery.version, UNKNOWN_VERSION);
    assert!(result.vulnerable_plugins.is_empty());
}

#[tokio::test]
async fn plugin_filter_restricts_probing_and_matching() {
    let server = serve_homepage(wp_homepage(concat!(
        r#"<script src="/wp-content/plugins/akismet/akismet.js?ver=5.3"></script>"#,
        r#"<script src="/wp-content/plugins/contact-form-7/form.js?ver=5.0"></script>"#,
    )))
    .await;

    let index = index_with(vec![
        ("akismet", vec![record("CVE-1", None, Some("5.5"))]),
        ("contact-form-7", vec![record("CVE-3", None, Some("5.5"))]),
    ]);
    let config = ScanConfig {
        plugin: Some("akismet".to_string()),
        ..quick_config()
    };
    let scanner = Scanner::new(config, index, NullSink::new_ref()).unwrap();
    let results = scanner.run(vec![server.uri()]).await;

    let result = &results[&server.uri()];
    assert_eq!(result.vulnerable_plugins.len(), 1);
    assert_eq!(result.vulnerable_plugins[0].slug, "akismet");
}

#[tokio::test]
async fn one_failing_target_does_not_disturb_siblings() {
    let wp = serve_homepage(wp_homepage(
        r#"<script src="/wp-content/plugins/akismet/akismet.js?ver=5.3"></script>"#,
    ))
    .await;
    let plain = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAIN_HOMEPAGE))
        .mount(&plain)
        .await;

    // The space makes the URL unparseable, failing that target alone
    let broken = "https://bro ken.example".to_string();

    let index = index_with(vec![("akismet", vec![record("CVE-1", None, Some("5.5"))])]);
    let scanner = Scanner::new(quick_config(), index, NullSink::new_ref()).unwrap();
    let results = scanner
        .run(vec![wp.uri(), broken.clone(), plain.uri()])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[&wp.uri()].status, ScanStatus::Scanned);
    assert_eq!(results[&wp.uri()].vulnerable_plugins.len(), 1);
    assert_eq!(results[&broken].status, ScanStatus::Failed);
    assert!(results[&broken].error.is_some());
    assert_eq!(results[&plain.uri()].status, ScanStatus::NotWordpress);
}

#[tokio::test]
async fn every_target_reaches_a_terminal_state_under_a_small_limit() {
    let mut servers = Vec::new();
    for _ in 0..5 {
        servers.push(
            serve_homepage(wp_homepage(
                r#"<script src="/wp-content/plugins/akismet/akismet.js?ver=5.3"></script>"#,
            ))
            .await,
        );
    }

    let index = index_with(vec![("akismet", vec![record("CVE-1", None, Some("5.5"))])]);
    let config = ScanConfig {
        threads: 2,
        ..quick_config()
    };
    let scanner = Scanner::new(config, index, NullSink::new_ref()).unwrap();

    let targets: Vec<String> = servers.iter().map(|s| s.uri()).collect();
    let results = scanner.run(targets).await;

    assert_eq!(results.len(), 5);
    for server in &servers {
        let result = &results[&server.uri()];
        assert_eq!(result.status, ScanStatus::Scanned);
        assert_eq!(result.vulnerable_plugins.len(), 1);
    }
}
