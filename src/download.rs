use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::GutenError;
use crate::http::HttpTransport;
use crate::progress::{ProgressEvent, ProgressSink};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Total attempts per file, including the first.
    pub retries: u32,
    pub chunk_size: usize,
    /// Fixed pause between attempts.
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: DEFAULT_BACKOFF,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// Streams one URL to disk with bounded retries.
pub struct Downloader<'a, T: HttpTransport + ?Sized> {
    transport: &'a T,
    options: &'a DownloadOptions,
    interrupt: &'a AtomicBool,
}

impl<'a, T: HttpTransport + ?Sized> Downloader<'a, T> {
    pub fn new(
        transport: &'a T,
        options: &'a DownloadOptions,
        interrupt: &'a AtomicBool,
    ) -> Self {
        Self {
            transport,
            options,
            interrupt,
        }
    }

    /// Downloads `url` into `destination` and returns the byte count.
    ///
    /// Every attempt restarts from byte zero into a fresh temporary file next
    /// to `destination`; the file only takes its final name once the body is
    /// complete. Exhausting the attempts yields [`GutenError::RetriesExhausted`].
    pub fn download(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, GutenError> {
        let retries = self.options.retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=retries {
            match self.attempt(url, destination, sink) {
                Ok(bytes) => {
                    debug!(url, attempt, bytes, "download complete");
                    return Ok(bytes);
                }
                Err(GutenError::Interrupted) => return Err(GutenError::Interrupted),
                Err(err) => {
                    let message = err.to_string();
                    warn!(url, attempt, retries, error = %message, "download attempt failed");
                    sink.event(ProgressEvent::AttemptFailed {
                        url: url.to_string(),
                        attempt,
                        retries,
                        message: message.clone(),
                    });
                    last_error = message;
                    if attempt < retries && !self.options.backoff.is_zero() {
                        thread::sleep(self.options.backoff);
                    }
                }
            }
        }
        Err(GutenError::RetriesExhausted {
            attempts: retries,
            message: last_error,
        })
    }

    fn attempt(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, GutenError> {
        let response = self.transport.get(url, self.options.timeout)?;
        if !response.is_success() {
            return Err(GutenError::DownloadStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        let total = response.content_length;
        let mut body = response.body;

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".gutendex-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|err| {
                GutenError::Filesystem(format!("temp file in {}: {err}", parent.display()))
            })?;

        let mut buffer = vec![0u8; self.options.chunk_size.max(1)];
        let mut done = 0u64;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(GutenError::Interrupted);
            }
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(GutenError::DownloadHttp(err.to_string())),
            };
            temp.write_all(&buffer[..read])
                .map_err(|err| GutenError::Filesystem(err.to_string()))?;
            done += read as u64;
            sink.event(ProgressEvent::Bytes { done, total });
        }

        if let Some(total) = total {
            if done < total {
                return Err(GutenError::DownloadHttp(format!(
                    "body ended after {done} of {total} bytes"
                )));
            }
        }

        temp.flush()
            .map_err(|err| GutenError::Filesystem(err.to_string()))?;
        temp.persist(destination).map_err(|err| {
            GutenError::Filesystem(format!("persist {}: {}", destination.display(), err.error))
        })?;
        Ok(done)
    }
}
