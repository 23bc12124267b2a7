//! Market-Scout main entry point
//!
//! This is the command-line interface for the Market-Scout research pipeline.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use market_scout::config::{load_config_with_hash, Config, LogFormat};
use market_scout::output::{export_report, print_job_list, print_job_status};
use market_scout::storage::{open_store, JobStore, SqliteJobStore};
use market_scout::{JobRunner, Services};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Market-Scout: a guarded research pipeline
///
/// Market-Scout turns a free-text question into a market-comparison report by
/// planning, searching, crawling and extracting under step and URL limits.
#[derive(Parser, Debug)]
#[command(name = "market-scout")]
#[command(version = "1.0.0")]
#[command(about = "A guarded market research pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when it does not exist)
    #[arg(short, long, value_name = "CONFIG", default_value = "market-scout.toml", global = true)]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Validate config and show what a run would use without running anything
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one research job to completion
    Run {
        /// The research question
        query: String,
    },

    /// Show the status of a job
    Status {
        job_id: String,
    },

    /// Print or export the report of a job
    Report {
        job_id: String,

        /// Which payload to print
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Write both payloads to the configured report directory instead of printing
        #[arg(long)]
        export: bool,
    },

    /// List recent jobs
    Jobs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let (config, config_hash) = load(&cli.config)?;

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet, config.logging.format);
    match &config_hash {
        Some(hash) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            cli.config.display(),
            hash
        ),
        None => tracing::info!(
            "No configuration at {}, using defaults",
            cli.config.display()
        ),
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    match cli.command {
        Some(Command::Run { query }) => handle_run(&config, &query).await,
        Some(Command::Status { job_id }) => handle_status(&config, &job_id),
        Some(Command::Report {
            job_id,
            format,
            export,
        }) => handle_report(&config, &job_id, format, export),
        Some(Command::Jobs { limit }) => handle_jobs(&config, limit),
        None => bail!("no command given; try `market-scout run \"<question>\"` or --help"),
    }
}

/// Loads the config file, or defaults when it does not exist
fn load(path: &Path) -> anyhow::Result<(Config, Option<String>)> {
    if !path.exists() {
        return Ok((Config::default(), None));
    }
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok((config, Some(hash)))
}

/// Sets up the logging/tracing subscriber based on verbosity level and format
fn setup_logging(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("market_scout=info,warn"),
            1 => EnvFilter::new("market_scout=debug,info"),
            2 => EnvFilter::new("market_scout=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Console => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open(config: &Config) -> anyhow::Result<SqliteJobStore> {
    let path = Path::new(&config.output.database_path);
    open_store(path).with_context(|| format!("failed to open job database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what a run would use
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Market-Scout Dry Run ===\n");

    println!("Pipeline:");
    println!("  Max steps: {}", config.pipeline.max_steps);
    println!("  Max URLs: {}", config.pipeline.max_urls);

    println!("\nCrawler:");
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Timeout: {}s", config.crawler.timeout_seconds);
    println!(
        "  Delay: {}-{}ms",
        config.crawler.min_delay_ms, config.crawler.max_delay_ms
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Fetch waits: {}-{}ms",
        config.retry.fetch.min_wait_ms, config.retry.fetch.max_wait_ms
    );
    println!(
        "  Generation waits: {}-{}ms",
        config.retry.generation.min_wait_ms, config.retry.generation.max_wait_ms
    );

    println!("\nGeneration:");
    println!("  Model: {}", config.llm.model);
    println!("  API base: {}", config.llm.api_base);
    let key_present = std::env::var(&config.llm.api_key_env).is_ok();
    println!(
        "  API key ({}): {}",
        config.llm.api_key_env,
        if key_present { "set" } else { "MISSING" }
    );
    println!(
        "  Cache: {}",
        if config.cache.enabled {
            format!("enabled ({}s TTL)", config.cache.ttl_seconds)
        } else {
            "disabled".to_string()
        }
    );

    println!("\nSearch:");
    println!("  Endpoint: {}", config.search.endpoint);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Reports: {}", config.output.report_dir);

    println!("\n✓ Configuration is valid");
    if !key_present {
        println!("✗ Set {} before running a job", config.llm.api_key_env);
    }

    Ok(())
}

/// Handles the `run` command
async fn handle_run(config: &Config, query: &str) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let services = Services::from_config(config).context("failed to set up collaborators")?;
    let store: Arc<dyn JobStore> = Arc::new(open(config)?);
    let runner = JobRunner::new(Arc::new(services), store, config.pipeline.clone());

    let record = runner.run(query).await?;
    print_job_status(&record);

    if record.report_md.is_some() {
        let exported = export_report(&record, Path::new(&config.output.report_dir))?;
        println!("\n✓ Report written to: {}", exported.markdown.display());
        if let Some(json) = exported.json {
            println!("✓ JSON written to: {}", json.display());
        }
    }

    Ok(())
}

/// Handles the `status` command
fn handle_status(config: &Config, job_id: &str) -> anyhow::Result<()> {
    let store = open(config)?;
    let record = store.get(job_id)?;
    print_job_status(&record);
    Ok(())
}

/// Handles the `report` command
fn handle_report(
    config: &Config,
    job_id: &str,
    format: ReportFormat,
    export: bool,
) -> anyhow::Result<()> {
    let store = open(config)?;
    let record = store.get(job_id)?;

    if export {
        let exported = export_report(&record, Path::new(&config.output.report_dir))?;
        println!("✓ Report exported to: {}", exported.markdown.display());
        return Ok(());
    }

    match format {
        ReportFormat::Markdown => match &record.report_md {
            Some(md) => print!("{}", md),
            None => bail!("job {} has no report ({})", job_id, record.status),
        },
        ReportFormat::Json => match &record.report_json {
            Some(json) => println!("{}", serde_json::to_string_pretty(json)?),
            None => bail!("job {} has no report ({})", job_id, record.status),
        },
    }
    Ok(())
}

/// Handles the `jobs` command
fn handle_jobs(config: &Config, limit: usize) -> anyhow::Result<()> {
    let store = open(config)?;
    let records = store.list_recent(limit)?;
    print_job_list(&records);
    Ok(())
}
