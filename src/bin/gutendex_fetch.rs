use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gutendex_fetch::app::App;
use gutendex_fetch::config::{ConfigLoader, Overrides};
use gutendex_fetch::domain::SortMode;
use gutendex_fetch::error::GutenError;
use gutendex_fetch::http::ReqwestTransport;
use gutendex_fetch::output::{ConsoleOutput, JsonOutput, OutputMode};
use gutendex_fetch::store::OutputDir;

const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(name = "gutendex-fetch")]
#[command(about = "Download Project Gutenberg e-books in EPUB format, ranked or sampled via Gutendex")]
#[command(version)]
struct Cli {
    /// Number of books to download [default: 10]
    count: Option<usize>,

    /// Output directory for downloaded books [default: output]
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Save book metadata as JSON alongside EPUB files (default)
    #[arg(long, conflicts_with = "no_json")]
    save_json: bool,

    /// Don't save book metadata as JSON
    #[arg(long)]
    no_json: bool,

    /// Maximum number of download attempts per file [default: 3]
    #[arg(long)]
    retries: Option<u32>,

    /// Chunk size in bytes for streaming downloads [default: 65536]
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Sort books by popularity, id, title, author, or pick randomly [default: popular]
    #[arg(long, value_enum)]
    sort: Option<SortMode>,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<String>,

    /// Print the run summary as JSON instead of progress lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => interrupted_exit(),
        Err(report) => {
            if let Some(error) = report.downcast_ref::<GutenError>() {
                if matches!(error, GutenError::Interrupted) {
                    return interrupted_exit();
                }
                eprintln!("{report:?}");
                return ExitCode::from(map_exit_code(error));
            }
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn interrupted_exit() -> ExitCode {
    println!("Interrupted by user – exiting…");
    ExitCode::from(INTERRUPTED_EXIT)
}

fn map_exit_code(error: &GutenError) -> u8 {
    match error {
        _ if error.is_metadata_error() => 3,
        GutenError::ConfigRead(_)
        | GutenError::ConfigParse(_)
        | GutenError::InvalidSettings(_) => 2,
        GutenError::Interrupted => INTERRUPTED_EXIT,
        _ => 1,
    }
}

/// Returns `Ok(false)` when the run was cut short by Ctrl-C.
fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let save_json = if cli.no_json {
        Some(false)
    } else if cli.save_json {
        Some(true)
    } else {
        None
    };
    let overrides = Overrides {
        count: cli.count,
        output_dir: cli.output_dir,
        save_json,
        retries: cli.retries,
        chunk_size: cli.chunk_size,
        sort: cli.sort,
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)).into_diagnostic()?;

    let output = OutputDir::new(resolved.output_dir.clone());
    output.ensure()?;
    let transport = ReqwestTransport::new()?;
    let app = App::new(transport, output, resolved.api.clone()).with_interrupt(interrupt);

    let summary = match output_mode {
        OutputMode::Console => {
            println!(
                "Fetching metadata for {} books (sort: {})...",
                resolved.run.count, resolved.run.mode
            );
            let summary = app.run(&resolved.run, &ConsoleOutput::new())?;
            ConsoleOutput::print_summary(&summary);
            summary
        }
        OutputMode::Json => {
            let summary = app.run(&resolved.run, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
            summary
        }
    };
    Ok(!summary.interrupted)
}
