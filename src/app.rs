use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::collector::{ApiOptions, MetadataCollector};
use crate::domain::{BookRecord, SortMode};
use crate::download::{DownloadOptions, Downloader};
use crate::error::GutenError;
use crate::formats::pick_best_epub;
use crate::http::HttpTransport;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{Claims, OutputDir, PlanAction};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub count: usize,
    pub mode: SortMode,
    pub save_json: bool,
    pub download: DownloadOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            count: 10,
            mode: SortMode::Popular,
            save_json: true,
            download: DownloadOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    NoEpubFormat,
    AlreadyPresent { path: Utf8PathBuf },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoEpubFormat => write!(f, "no EPUB available"),
            SkipReason::AlreadyPresent { path } => write!(f, "already downloaded: {path}"),
        }
    }
}

/// Terminal state of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Downloaded {
        path: Utf8PathBuf,
        bytes: u64,
        sidecar: Option<Utf8PathBuf>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub index: usize,
    pub id: u64,
    pub title: String,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub output_dir: Utf8PathBuf,
    pub mode: SortMode,
    pub requested: usize,
    pub collected: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub items: Vec<RecordReport>,
}

/// Collects metadata once, then acquires each record in order.
pub struct App<T: HttpTransport> {
    transport: T,
    output: OutputDir,
    api: ApiOptions,
    interrupt: Arc<AtomicBool>,
}

impl<T: HttpTransport> App<T> {
    pub fn new(transport: T, output: OutputDir, api: ApiOptions) -> Self {
        Self {
            transport,
            output,
            api,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a flag that stops the run at the next page, chunk or record.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn collect<R: Rng + ?Sized>(
        &self,
        count: usize,
        mode: SortMode,
        rng: &mut R,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<BookRecord>, GutenError> {
        MetadataCollector::new(&self.transport, &self.api, &self.interrupt)
            .fetch(count, mode, rng, sink)
    }

    pub fn run(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GutenError> {
        self.run_with_rng(options, &mut rand::thread_rng(), sink)
    }

    /// Only metadata collection can fail the run; per-record problems end up
    /// in the summary.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        options: &RunOptions,
        rng: &mut R,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, GutenError> {
        let started_at = Utc::now().to_rfc3339();
        let records = self.collect(options.count, options.mode, rng, sink)?;
        let total = records.len();

        let mut claims = Claims::new();
        let mut items = Vec::with_capacity(total);
        let mut interrupted = false;
        for (offset, record) in records.iter().enumerate() {
            if self.is_interrupted() {
                interrupted = true;
                break;
            }
            let index = offset + 1;
            let outcome = self.acquire_record(record, index, total, options, &mut claims, sink);
            sink.event(ProgressEvent::RecordFinished {
                index,
                total,
                id: record.id(),
                title: record.title().to_string(),
                outcome: outcome.clone(),
            });
            items.push(RecordReport {
                index,
                id: record.id(),
                title: record.title().to_string(),
                outcome,
            });
            if self.is_interrupted() {
                interrupted = true;
                break;
            }
        }

        let count = |pred: fn(&RecordOutcome) -> bool| {
            items.iter().filter(|item| pred(&item.outcome)).count()
        };
        let downloaded = count(|outcome| matches!(outcome, RecordOutcome::Downloaded { .. }));
        let skipped = count(|outcome| matches!(outcome, RecordOutcome::Skipped { .. }));
        let failed = count(|outcome| matches!(outcome, RecordOutcome::Failed { .. }));
        info!(downloaded, skipped, failed, interrupted, "run finished");

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            output_dir: self.output.root().to_owned(),
            mode: options.mode,
            requested: options.count,
            collected: total,
            downloaded,
            skipped,
            failed,
            interrupted,
            items,
        })
    }

    /// Processes one record; never fails, errors become [`RecordOutcome::Failed`].
    pub fn acquire_record(
        &self,
        record: &BookRecord,
        index: usize,
        total: usize,
        options: &RunOptions,
        claims: &mut Claims,
        sink: &dyn ProgressSink,
    ) -> RecordOutcome {
        self.try_acquire(record, index, total, options, claims, sink)
            .unwrap_or_else(|err| {
                warn!(id = record.id(), title = record.title(), error = %err, "record failed");
                RecordOutcome::Failed {
                    reason: err.to_string(),
                }
            })
    }

    fn try_acquire(
        &self,
        record: &BookRecord,
        index: usize,
        total: usize,
        options: &RunOptions,
        claims: &mut Claims,
        sink: &dyn ProgressSink,
    ) -> Result<RecordOutcome, GutenError> {
        let Some(url) = pick_best_epub(record.formats()) else {
            return Ok(RecordOutcome::Skipped {
                reason: SkipReason::NoEpubFormat,
            });
        };

        let plan = self.output.plan(record, claims)?;
        claims.insert(plan.epub_path.clone(), record.id());
        if plan.action == PlanAction::AlreadyPresent {
            return Ok(RecordOutcome::Skipped {
                reason: SkipReason::AlreadyPresent {
                    path: plan.epub_path,
                },
            });
        }

        sink.event(ProgressEvent::RecordStarted {
            index,
            total,
            id: record.id(),
            title: record.title().to_string(),
            file_name: plan.epub_path.file_name().unwrap_or_default().to_string(),
        });
        let bytes = Downloader::new(&self.transport, &options.download, &self.interrupt).download(
            url,
            plan.epub_path.as_std_path(),
            sink,
        )?;

        let sidecar = if options.save_json && OutputDir::write_sidecar(&plan.json_path, record)? {
            Some(plan.json_path)
        } else {
            None
        };
        Ok(RecordOutcome::Downloaded {
            path: plan.epub_path,
            bytes,
            sidecar,
        })
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}
