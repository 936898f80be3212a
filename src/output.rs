use std::cell::Cell;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::{RecordOutcome, RunSummary};
use crate::progress::{ProgressEvent, ProgressSink};

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

/// Prints progress lines to stdout.
#[derive(Default)]
pub struct ConsoleOutput {
    last_decile: Cell<Option<u64>>,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(summary: &RunSummary) {
        println!();
        println!(
            "Downloaded {}, skipped {}, failed {} of {} collected ({} requested) into {}/",
            summary.downloaded,
            summary.skipped,
            summary.failed,
            summary.collected,
            summary.requested,
            summary.output_dir
        );
        if summary.interrupted {
            println!("Run stopped early.");
        } else {
            println!("✅ All done!  Happy reading.");
        }
    }

    fn on_bytes(&self, done: u64, total: Option<u64>) {
        let Some(total) = total.filter(|total| *total > 0) else {
            return;
        };
        let percent = (done.saturating_mul(100) / total).min(100);
        let decile = percent / 10;
        if self.last_decile.get().is_some_and(|last| decile <= last) {
            return;
        }
        self.last_decile.set(Some(decile));
        println!(
            "    {percent}% complete ({:.1}/{:.1} MB)",
            done as f64 / MIB,
            total as f64 / MIB
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PageFetched { fetched, target } => {
                println!("  Fetched metadata page ({fetched}/{target} books so far)");
            }
            ProgressEvent::PoolSelected {
                mode,
                pool,
                selected,
            } => {
                println!("Selected {selected} books by {mode} from a pool of {pool}.");
            }
            ProgressEvent::RecordStarted {
                index,
                total,
                title,
                file_name,
                ..
            } => {
                self.last_decile.set(None);
                println!("⬇️  [{index}/{total}] {title} → {file_name}");
            }
            ProgressEvent::Bytes { done, total } => self.on_bytes(done, total),
            ProgressEvent::AttemptFailed {
                url,
                attempt,
                retries,
                message,
            } => {
                self.last_decile.set(None);
                println!("⚠️  Attempt {attempt}/{retries} failed for {url}: {message}");
            }
            ProgressEvent::RecordFinished {
                index,
                total,
                id,
                title,
                outcome,
            } => match outcome {
                RecordOutcome::Downloaded { path, .. } => {
                    println!("  Download complete: {}", path.file_name().unwrap_or_default());
                }
                RecordOutcome::Skipped { reason } => {
                    println!("⏭️  [{index}/{total}] Skipping ID {id} ({title}): {reason}");
                }
                RecordOutcome::Failed { reason } => {
                    println!("❌  [{index}/{total}] ID {id} ({title}) failed: {reason}; moving on…");
                }
            },
        }
    }
}

/// Machine-readable output; progress is suppressed.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
