use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use covcrawl::cli::{self, CrawlArgs};
use covcrawl::crawl::CrawlOptions;
use covcrawl::{db, fetch};

/// covcrawl — Crawl JaCoCo HTML coverage reports into a queryable SQLite store.
#[derive(Parser)]
#[command(name = "covcrawl", version, about)]
struct Cli {
    /// Path to the SQLite database (default: ./.covcrawl.db)
    #[arg(long, global = true, default_value = ".covcrawl.db")]
    db: PathBuf,

    /// Log crawl progress at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a report tree and store it as a snapshot.
    Crawl {
        /// Report root: a directory, an http(s) URL, or the root index.html.
        location: String,

        /// Name for this snapshot (default: project report name, then page title).
        #[arg(long)]
        name: Option<String>,

        /// Ant build descriptor whose `report_number` property names the snapshot.
        #[arg(long)]
        project: Option<PathBuf>,

        /// Also write the crawled tree as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Overwrite an existing snapshot with the same name.
        #[arg(long)]
        overwrite: bool,

        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = fetch::DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,

        /// Stop fetching new pages after this many seconds.
        #[arg(long)]
        deadline: Option<u64>,

        /// Stop after this many child page fetches.
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// List methods whose cyclomatic complexity exceeds a threshold.
    Complexity {
        /// Snapshot name. If omitted, uses the most recent.
        #[arg(long)]
        snapshot: Option<String>,

        /// Report methods with complexity strictly above this value.
        #[arg(long, default_value_t = 10)]
        threshold: u64,
    },

    /// List classes whose line coverage is below a threshold.
    LowCoverage {
        /// Snapshot name. If omitted, uses the most recent.
        #[arg(long)]
        snapshot: Option<String>,

        /// Report classes with line coverage strictly below this ratio (0.0-1.0).
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
    },

    /// List all snapshots in the database.
    Snapshots,

    /// Write a stored snapshot as JSON.
    Export {
        /// Output path.
        output: PathBuf,

        /// Snapshot name. If omitted, uses the most recent.
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Delete a snapshot from the database.
    Delete {
        /// Snapshot name to delete.
        name: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "covcrawl=debug" } else { "covcrawl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut conn = db::open(&cli.db).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;

    let output = match cli.command {
        Commands::Crawl {
            location,
            name,
            project,
            json,
            overwrite,
            timeout,
            deadline,
            max_pages,
        } => {
            let fetcher = fetch::fetcher_for(&location, Duration::from_secs(timeout));
            let options = CrawlOptions {
                deadline: deadline.map(Duration::from_secs),
                max_pages,
                ..Default::default()
            };
            cli::cmd_crawl(
                &mut conn,
                fetcher.as_ref(),
                CrawlArgs {
                    location: &location,
                    name: name.as_deref(),
                    project: project.as_deref(),
                    options,
                    json: json.as_deref(),
                    overwrite,
                },
            )
        }
        Commands::Complexity {
            snapshot,
            threshold,
        } => cli::cmd_complexity(&conn, snapshot.as_deref(), threshold),
        Commands::LowCoverage {
            snapshot,
            threshold,
        } => {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("--threshold must be between 0.0 and 1.0, got {}", threshold);
            }
            cli::cmd_low_coverage(&conn, snapshot.as_deref(), threshold)
        }
        Commands::Snapshots => cli::cmd_snapshots(&conn),
        Commands::Export { output, snapshot } => {
            cli::cmd_export(&conn, snapshot.as_deref(), &output)
        }
        Commands::Delete { name } => cli::cmd_delete(&mut conn, &name),
    }?;
    print!("{output}");
    Ok(())
}
