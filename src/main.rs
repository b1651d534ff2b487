//! # Persona Dedup CLI (`dedup`)
//!
//! ## Usage
//!
//! ```bash
//! dedup --config ./config/dedup.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dedup analyze <file>` | Classify every Original/Duplicates pair |
//! | `dedup inspect <file>` | Parse the file and show the detected rows |
//!
//! ## Examples
//!
//! ```bash
//! # Dry run: check the columns are detected
//! dedup inspect people.xlsx
//!
//! # Classify and export
//! dedup analyze people.xlsx --output results.csv
//!
//! # Keep retrying inconclusive rows, slower pacing
//! dedup analyze people.csv --max-attempts unbounded --pacing-ms 1000
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;

use persona_dedup::cancel::CancelToken;
use persona_dedup::classifier::create_classifier;
use persona_dedup::config::{self, DEFAULT_CONFIG_PATH};
use persona_dedup::display;
use persona_dedup::export;
use persona_dedup::orchestrator::run_batch;
use persona_dedup::progress::{format_number, ProgressMode};
use persona_dedup::source;
use persona_dedup_core::policy::MaxAttempts;

/// Rows shown by `inspect`.
const INSPECT_PREVIEW_ROWS: usize = 10;

/// Persona Dedup: check whether spreadsheet name pairs are the same person.
#[derive(Parser)]
#[command(
    name = "dedup",
    about = "Check whether pairs of names refer to the same person using search-grounded AI",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dedup.toml`; when that file is absent the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every name pair in a spreadsheet.
    ///
    /// Rows are processed one at a time in file order. Results are printed
    /// as a table followed by the deduplicated list of sources.
    Analyze {
        /// `.xlsx`, `.xls` or `.csv` file with `Original` and `Duplicates` columns.
        file: PathBuf,

        /// Write results as CSV to this path.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write results as CSV to a timestamped file in the current directory.
        #[arg(long, conflicts_with = "output")]
        export: bool,

        /// Progress on stderr. Default: human when stderr is a TTY, otherwise off.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Attempts per row: a positive number or `unbounded`.
        #[arg(long)]
        max_attempts: Option<MaxAttempts>,

        /// Wait between rows, in milliseconds.
        #[arg(long)]
        pacing_ms: Option<u64>,

        /// Base retry delay, in milliseconds.
        #[arg(long)]
        base_delay_ms: Option<u64>,
    },

    /// Parse a spreadsheet without classifying anything.
    Inspect {
        /// `.xlsx`, `.xls` or `.csv` file with `Original` and `Duplicates` columns.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(verbosity_level(cli.verbose));

    match cli.command {
        Commands::Inspect { file } => {
            let records = match source::load_records(&file) {
                Ok(records) => records,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            println!("{}: {} rows", file.display(), format_number(records.len() as u64));
            for record in records.iter().take(INSPECT_PREVIEW_ROWS) {
                println!(
                    "  {:>4}  {}  |  {}",
                    record.index + 1,
                    record.original,
                    record.duplicate
                );
            }
            if records.len() > INSPECT_PREVIEW_ROWS {
                println!("  ... {} more", records.len() - INSPECT_PREVIEW_ROWS);
            }
        }
        Commands::Analyze {
            file,
            output,
            export: export_default,
            progress,
            max_attempts,
            pacing_ms,
            base_delay_ms,
        } => {
            let cfg = config::load_config_or_default(&cli.config)?;

            let mut policy = cfg.retry.policy()?;
            if let Some(max) = max_attempts {
                policy.max_attempts = max;
            }
            if let Some(ms) = base_delay_ms {
                policy.base_delay = Duration::from_millis(ms);
            }
            let pacing = pacing_ms.map(Duration::from_millis).unwrap_or_else(|| cfg.batch.pacing());

            let classifier = create_classifier(&cfg.classifier)?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();

            let cancel = CancelToken::new();
            cancel.cancel_on_ctrl_c();

            let report = match run_batch(
                source::load_records(&file),
                classifier.as_ref(),
                &policy,
                pacing,
                reporter.as_ref(),
                &cancel,
            )
            .await
            {
                Ok(report) => report,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            display::print_results(&report.results);

            let target = match (output, export_default) {
                (Some(path), _) => Some(path),
                (None, true) => Some(PathBuf::from(export::default_export_name(chrono::Local::now()))),
                (None, false) => None,
            };
            if let Some(path) = target {
                export::export_csv(&path, &report.results)?;
            }

            display::print_summary(&report);
            if report.cancelled {
                eprintln!(
                    "Cancelled: {} of {} rows finished.",
                    report.results.len(),
                    report.total
                );
                std::process::exit(130);
            }
        }
    }

    Ok(())
}

fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}
