use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pub_search::config::Config;
use pub_search::publication::seed_demo_if_missing;
use pub_search::search::{
    ErrorKind, PublicationStore, SearchError, SearchRequest, SortOrder, build_from_feed,
    index_stats, search,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{self, EnvFilter};

/// Exit status when a query runs before the first build
const EXIT_STORE_MISSING: u8 = 2;

/// Publication search index tool
#[derive(Parser)]
#[command(name = "pubsearch", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index directory (overrides the config file)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// JSON Lines feed (overrides the config file)
    #[arg(long, global = true)]
    feed: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or refresh the index from the feed
    Index {
        /// Write a demo feed first if the feed file does not exist
        #[arg(long)]
        seed_demo: bool,
    },
    /// Run a query and print the response as JSON
    Search {
        /// Free-text query; quote words to search for a phrase
        query: String,

        /// relevance, year or recent
        #[arg(long)]
        sort: Option<String>,
    },
    /// Print index readiness and document count
    Stats,
    /// Print every stored document as JSON lines
    Dump,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match init_logging(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<SearchError>().map(SearchError::kind) {
                Some(ErrorKind::StoreMissing) => ExitCode::from(EXIT_STORE_MISSING),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

/// `RUST_LOG` wins when set and valid; otherwise info, or debug with `-v`
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(verbose, rust_log.as_deref());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();
            Ok(None)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(index_dir) = &cli.index_dir {
        config.index_dir = index_dir.clone();
    }
    if let Some(feed) = &cli.feed {
        config.feed_path = feed.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Index { seed_demo } => {
            if seed_demo && seed_demo_if_missing(&config.feed_path)? {
                tracing::info!("Seeded demo feed at {}", config.feed_path.display());
            }
            let report = build_from_feed(&config)?;
            writeln!(
                stdout,
                "Indexed {} records ({} lines skipped); index holds {} documents.",
                report.records_indexed, report.lines_skipped, report.doc_count
            )?;
        }
        Command::Search { query, sort } => {
            let request =
                SearchRequest::new(&query).with_sort(SortOrder::parse_lenient(sort.as_deref()));
            let response = search(&config, &request)?;
            serde_json::to_writer_pretty(&mut stdout, &response)?;
            writeln!(stdout)?;
        }
        Command::Stats => {
            let stats = index_stats(&config.index_dir);
            serde_json::to_writer(&mut stdout, &stats)?;
            writeln!(stdout)?;
        }
        Command::Dump => {
            let store = PublicationStore::open_existing(&config.index_dir)?;
            for document in store.export_documents()? {
                serde_json::to_writer(&mut stdout, &document)?;
                writeln!(stdout)?;
            }
        }
    }

    Ok(())
}
