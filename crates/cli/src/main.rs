//! Command-line interface for worksheet repair.
//!
//! This CLI tool checks a worksheet archive, writes the repaired copy next
//! to it and lists everything that had to be fixed.

use clap::{Parser, Subcommand};
use fixer::{Classification, LogLevel, Outcome, RepairOptions, Repairer};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "sheetfix")]
#[command(version, about = "Check and repair worksheet archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a worksheet and write a repaired copy
    Repair {
        /// Worksheet archive to repair
        input: PathBuf,

        /// Output file (default: <name>_fix_<timestamp>.lma next to the input)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// JSON file with repair options
        #[arg(long)]
        config: Option<PathBuf>,

        /// CSS selector of elements to strip from page content
        #[arg(long)]
        selector: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the entries of a worksheet archive
    Inspect {
        /// Worksheet archive to inspect
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Initialize tracing; progress is rendered by the spinner, so engine logs
    // stay silent unless RUST_LOG asks for them
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Repair {
            input,
            out,
            config,
            selector,
            json,
        } => handle_repair(input, out, config, selector, json),
        Commands::Inspect { archive, json } => handle_inspect(archive, json),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the archive could not be repaired.
fn handle_repair(
    input: PathBuf,
    out: Option<PathBuf>,
    config: Option<PathBuf>,
    selector: Option<String>,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut options = match config {
        Some(path) => load_options(&path)?,
        None => RepairOptions::default(),
    };
    if let Some(selector) = selector {
        options.disallowed_selector = selector;
    }
    let repairer = Repairer::new(options)?;

    let bytes = std::fs::read(&input)?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel_flag.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let bar = spinner.clone();
    let progress = move |message: &str, level: LogLevel| match level {
        LogLevel::Info | LogLevel::Success => bar.set_message(message.to_string()),
        LogLevel::Warning => bar.println(format!("warning: {}", message)),
        LogLevel::Error => bar.println(format!("error: {}", message)),
    };
    let outcome = repairer.repair(&bytes, &progress, cancel_flag);
    spinner.finish_and_clear();

    let written = match &outcome.artifact {
        Some(artifact) => {
            let path = out.unwrap_or_else(|| default_output_path(&input));
            std::fs::write(&path, artifact)?;
            Some(path)
        }
        None => None,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome, written.as_deref());
    }

    Ok(!outcome.is_error())
}

fn handle_inspect(archive: PathBuf, json: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(&archive)?;
    let entries = fixer::inspect(&bytes)?.into_entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            let kind = if entry.is_directory { "dir " } else { "file" };
            println!("{} {:>10}  {}", kind, entry.size, entry.name);
        }
        println!("{} entries", entries.len());
    }

    Ok(true)
}

fn load_options(path: &Path) -> Result<RepairOptions, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let options = serde_json::from_str(&raw)?;
    tracing::debug!(config = %path.display(), "Loaded repair options");
    Ok(options)
}

fn print_summary(outcome: &Outcome, written: Option<&Path>) {
    match outcome.classification {
        Classification::Success => println!("File was re-built successfully."),
        Classification::Warning => println!("Some issues found. Fixed file is available."),
        Classification::Error => println!(
            "Fatal errors occurred. The file cannot be fixed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    }

    for warning in &outcome.warnings {
        println!("  - {}", warning);
    }

    if let Some(path) = written {
        println!("Saved fixed file to {}", path.display());
    }
}

/// `<stem>_fix_<unix millis>.lma` in the input's directory.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("worksheet");
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    input.with_file_name(format!("{}_fix_{}.lma", stem, millis))
}
