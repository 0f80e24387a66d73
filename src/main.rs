//! WordPress Hunter CLI - Mass-scan WordPress sites for vulnerable plugins

use clap::{ArgGroup, Parser};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use wordpress_hunter::{
    Error, ScanConfig, ScanEventSink, Scanner, SinkRef, VulnerabilityIndex, VulnerabilityRecord,
    render_summary, write_report,
};

/// Mass WordPress vulnerability scanner
#[derive(Parser, Debug)]
#[command(name = "wordpress-hunter")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["url", "targets"])))]
struct Args {
    /// Scan a single target URL
    #[arg(long)]
    url: Option<String>,

    /// File with one target URL per line for a mass scan
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Number of targets scanned concurrently
    #[arg(long, default_value_t = 50)]
    threads: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Retries for failed HTTP requests
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Scan for a specific plugin slug only
    #[arg(long)]
    plugin: Option<String>,

    /// Match a specific CVE id only
    #[arg(long)]
    cve: Option<String>,

    /// Vulnerability database file
    #[arg(long, default_value = "data/vulnerabilities.json")]
    database: PathBuf,

    /// Report file; format follows the extension (.txt, .csv, .json)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Suppress terminal output (file reports are still written)
    #[arg(long)]
    silent: bool,

    /// Write one vulnerable_<slug>.txt file per vulnerable plugin
    #[arg(long)]
    save_by_plugin: bool,
}

/// Sink that prints matches as they are found and gathers the
/// plugin-indexed site lists for --save-by-plugin
struct ConsoleSink {
    silent: bool,
    by_plugin: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl ConsoleSink {
    fn new_ref(silent: bool) -> Arc<Self> {
        Arc::new(Self {
            silent,
            by_plugin: Mutex::new(BTreeMap::new()),
        })
    }

    fn save_by_plugin(&self) -> std::io::Result<Vec<PathBuf>> {
        let by_plugin = self.by_plugin.lock().expect("sink mutex poisoned");
        let mut written = Vec::new();
        for (slug, targets) in by_plugin.iter() {
            let path = PathBuf::from(format!("vulnerable_{slug}.txt"));
            let mut content = String::new();
            for target in targets {
                content.push_str(target);
                content.push('\n');
            }
            fs::write(&path, content)?;
            written.push(path);
        }
        Ok(written)
    }
}

impl ScanEventSink for ConsoleSink {
    fn on_match(&self, target: &str, slug: &str, version: &str, record: &VulnerabilityRecord) {
        if !self.silent {
            println!(
                "[+] {} :: {} {} -> {} ({})",
                target, slug, version, record.id, record.severity
            );
        }
        self.by_plugin
            .lock()
            .expect("sink mutex poisoned")
            .entry(slug.to_string())
            .or_default()
            .insert(target.to_string());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !args.silent {
        print_banner();
    }

    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> wordpress_hunter::Result<()> {
    let targets = match (&args.url, &args.targets) {
        (Some(url), _) => vec![url.clone()],
        (None, Some(path)) => read_targets(path)?,
        (None, None) => unreachable!("clap enforces the input group"),
    };

    let config = ScanConfig {
        threads: args.threads,
        timeout: args.timeout,
        retries: args.retries,
        plugin: args.plugin.clone(),
        cve: args.cve.clone(),
    };

    let index = VulnerabilityIndex::load(&args.database);
    let sink = ConsoleSink::new_ref(args.silent);
    let sink_ref: SinkRef = sink.clone();
    let scanner = Scanner::new(config, index, sink_ref)?;

    let results = scanner.run(targets).await;

    if !args.silent {
        let stdout = std::io::stdout();
        let mut writer = stdout.lock();
        render_summary(&results, &mut writer)?;
    }

    if let Some(path) = &args.output {
        write_report(path, &results)?;
    }

    if args.save_by_plugin {
        let written = sink.save_by_plugin().map_err(Error::OutputFailed)?;
        if !args.silent {
            for path in written {
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

/// Read the target list: one URL per line, blank lines skipped
fn read_targets(path: &Path) -> wordpress_hunter::Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| Error::TargetFile {
        path: path.display().to_string(),
        source,
    })?;

    let targets: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if targets.is_empty() {
        return Err(Error::NoTargets(path.display().to_string()));
    }
    Ok(targets)
}

fn print_banner() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("WordPress Hunter v{}", VERSION);
    println!("Mass WordPress vulnerability scanner");
    println!();
}
