//! xscrape main entry point
//!
//! This is the command-line interface for the xscrape web scraper.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;
use xscrape::config::{load_config_with_hash, Config};
use xscrape::crawler::run_job;
use xscrape::job::{Job, JobOverrides};
use xscrape::storage::{open_visited_pages, UrlPattern, VisitedPageRepository};

/// xscrape: a configuration-driven web scraper
///
/// xscrape walks the pages reachable from each job's root URL and stores the
/// files or text the job's resource XPath selects. Pages processed by earlier
/// runs are skipped.
#[derive(Parser, Debug)]
#[command(name = "xscrape")]
#[command(version)]
#[command(about = "A configuration-driven web scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Run only the named job
    #[arg(long, value_name = "NAME")]
    job: Option<String>,

    /// Start the job from this URL instead of its configured root
    #[arg(long, value_name = "URL", requires = "job")]
    root_url: Option<Url>,

    /// Ignore the visited-page history
    #[arg(long)]
    full_scan: bool,

    /// Write resources even when they already exist
    #[arg(long)]
    download_always: bool,

    /// Do not record pages as visited
    #[arg(long)]
    disable_marking_visited: bool,

    /// Log the resources that would be written without writing them
    #[arg(long)]
    disable_resource_writes: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the resolved jobs without scraping
    #[arg(long, conflicts_with_all = ["list_visited", "forget_visited", "mark_visited"])]
    dry_run: bool,

    /// List visited pages whose URL matches the pattern (`*` is a wildcard)
    #[arg(long, value_name = "PATTERN", conflicts_with_all = ["forget_visited", "mark_visited"])]
    list_visited: Option<String>,

    /// Forget visited pages whose URL matches the pattern
    #[arg(long, value_name = "PATTERN", conflicts_with = "mark_visited")]
    forget_visited: Option<String>,

    /// Record a page as visited
    #[arg(long, value_name = "URL")]
    mark_visited: Option<Url>,
}

impl Cli {
    fn overrides(&self) -> JobOverrides {
        JobOverrides {
            root_url: self.root_url.clone(),
            full_scan: self.full_scan,
            download_always: self.download_always,
            disable_marking_visited: self.disable_marking_visited,
            disable_resource_writes: self.disable_resource_writes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let result = if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if let Some(pattern) = &cli.list_visited {
        handle_list_visited(&config, pattern).await
    } else if let Some(pattern) = &cli.forget_visited {
        handle_forget_visited(&config, pattern).await
    } else if let Some(url) = &cli.mark_visited {
        handle_mark_visited(&config, url).await
    } else {
        handle_scrap(&config, &cli).await
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("xscrape=info,warn"),
            1 => EnvFilter::new("xscrape=debug,info"),
            2 => EnvFilter::new("xscrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the jobs selected on the command line
fn resolve_jobs(config: &Config, cli: &Cli) -> anyhow::Result<Vec<Job>> {
    let overrides = cli.overrides();
    let definitions: Vec<_> = match &cli.job {
        Some(name) => match config.job(name) {
            Some(definition) => vec![definition],
            None => bail!(xscrape::ConfigError::UnknownJob(name.clone())),
        },
        None => config.jobs.iter().collect(),
    };

    definitions
        .into_iter()
        .map(|definition| {
            Job::from_definition(definition, &config.http, &overrides)
                .with_context(|| format!("Invalid job '{}'", definition.name))
        })
        .collect()
}

fn open_history(config: &Config) -> anyhow::Result<Arc<dyn VisitedPageRepository>> {
    let path = Path::new(&config.storage.database_path);
    let visited = open_visited_pages(path)
        .with_context(|| format!("Failed to open visited-page database {}", path.display()))?;
    Ok(Arc::new(visited))
}

/// Handles the --dry-run mode: validates config and shows the resolved jobs
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== xscrape Dry Run ===\n");

    println!("HTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Retries: {}", config.http.retries);
    println!("  Retry delay: {}ms", config.http.retry_delay_ms);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Cache: {}", config.http.cache);

    println!("\nStorage:");
    println!("  Visited pages: {}", config.storage.database_path);

    let jobs = resolve_jobs(config, cli)?;
    println!("\nJobs ({}):", jobs.len());
    for job in &jobs {
        println!("  - {} ({})", job.name, job.resource_type);
        println!("    Root: {}", job.root_url);
        match &job.adjacency_xpath {
            Some(xpath) => println!("    Follow: {}", xpath),
            None => println!("    Follow: (single page)"),
        }
        println!("    Resources: {}", job.resource_xpath);
        println!("    Destination: {:?}", job.destination);
        println!("    Page retries: {}", job.page_retries);
        println!(
            "    Flags: full-scan={} download-always={} mark-visited={} write-resources={}",
            job.full_scan,
            job.download_always,
            !job.disable_marking_visited,
            !job.disable_resource_writes
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --list-visited mode
async fn handle_list_visited(config: &Config, pattern: &str) -> anyhow::Result<()> {
    let visited = open_history(config)?;
    let records = visited.search(&UrlPattern::new(pattern)).await?;

    for record in &records {
        println!("{}\t{}", record.visited_at.to_rfc3339(), record.url);
    }
    tracing::info!("{} visited pages match {}", records.len(), pattern);
    Ok(())
}

/// Handles the --forget-visited mode
async fn handle_forget_visited(config: &Config, pattern: &str) -> anyhow::Result<()> {
    let visited = open_history(config)?;
    let removed = visited.delete(&UrlPattern::new(pattern)).await?;

    println!("Forgot {} visited pages matching {}", removed, pattern);
    Ok(())
}

/// Handles the --mark-visited mode
async fn handle_mark_visited(config: &Config, url: &Url) -> anyhow::Result<()> {
    let visited = open_history(config)?;
    visited.upsert(url).await?;

    println!("Marked {} as visited", url);
    Ok(())
}

/// Handles the main scraping operation
async fn handle_scrap(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let jobs = resolve_jobs(config, cli)?;
    if jobs.is_empty() {
        bail!("No jobs configured in {}", cli.config.display());
    }

    let visited = open_history(config)?;

    for job in &jobs {
        let summary = run_job(job, visited.clone())
            .await
            .with_context(|| format!("Job '{}' failed", job.name))?;

        tracing::info!(
            "Job '{}' completed: {} pages, {} written, {} skipped, {} not written",
            job.name,
            summary.pages,
            summary.written,
            summary.skipped,
            summary.suppressed
        );
    }

    Ok(())
}
