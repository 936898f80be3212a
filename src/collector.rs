use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{BookRecord, SortMode};
use crate::error::GutenError;
use crate::http::HttpTransport;
use crate::progress::{ProgressEvent, ProgressSink};

pub const DEFAULT_API_ROOT: &str = "https://gutendex.com/books";
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub api_root: String,
    pub page_timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    results: Vec<BookRecord>,
    next: Option<String>,
}

/// Turns a count and an ordering into paginated Gutendex requests.
pub struct MetadataCollector<'a, T: HttpTransport + ?Sized> {
    transport: &'a T,
    options: &'a ApiOptions,
    interrupt: &'a AtomicBool,
}

impl<'a, T: HttpTransport + ?Sized> MetadataCollector<'a, T> {
    pub fn new(
        transport: &'a T,
        options: &'a ApiOptions,
        interrupt: &'a AtomicBool,
    ) -> Self {
        Self {
            transport,
            options,
            interrupt,
        }
    }

    /// Returns at most `n` records ordered by `mode`.
    ///
    /// Any failing page aborts the whole collection.
    pub fn fetch<R: Rng + ?Sized>(
        &self,
        n: usize,
        mode: SortMode,
        rng: &mut R,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<BookRecord>, GutenError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let target = mode.pool_target(n);
        let mut pool = self.paginate(&self.first_page_url(mode)?, target, sink)?;
        let fetched = pool.len();

        match mode {
            SortMode::Popular | SortMode::Ascending | SortMode::Descending => {
                pool.truncate(n);
                return Ok(pool);
            }
            SortMode::Title => sort_by_title(&mut pool),
            SortMode::Author => sort_by_author(&mut pool),
            SortMode::Random => pool.shuffle(rng),
        }
        pool.truncate(n);

        sink.event(ProgressEvent::PoolSelected {
            mode,
            pool: fetched,
            selected: pool.len(),
        });
        Ok(pool)
    }

    fn first_page_url(&self, mode: SortMode) -> Result<String, GutenError> {
        let mut url = Url::parse(&self.options.api_root).map_err(|err| {
            GutenError::InvalidSettings(format!("api root {}: {err}", self.options.api_root))
        })?;
        url.query_pairs_mut().append_pair("sort", mode.api_sort());
        Ok(url.to_string())
    }

    /// Follows `next` cursors until `target` records are held or the source runs dry.
    fn paginate(
        &self,
        first: &str,
        target: usize,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<BookRecord>, GutenError> {
        let mut books = Vec::new();
        let mut next = Some(first.to_string());
        while let Some(url) = next {
            if books.len() >= target {
                break;
            }
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(GutenError::Interrupted);
            }
            let page = self.fetch_page(&url)?;
            debug!(url = %url, records = page.results.len(), "fetched metadata page");
            books.extend(page.results);
            next = page.next;
            sink.event(ProgressEvent::PageFetched {
                fetched: books.len(),
                target,
            });
        }
        Ok(books)
    }

    fn fetch_page(&self, url: &str) -> Result<Page, GutenError> {
        let response = self
            .transport
            .get(url, self.options.page_timeout)
            .map_err(|err| match err {
                GutenError::DownloadHttp(message) => GutenError::ApiHttp(message),
                other => other,
            })?;
        if !response.is_success() {
            return Err(GutenError::ApiStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        serde_json::from_reader(response.body).map_err(|err| GutenError::ApiParse {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

fn sort_by_title(books: &mut [BookRecord]) {
    books.sort_by_cached_key(|book| book.title().to_lowercase());
}

/// Authorless records go last.
fn sort_by_author(books: &mut [BookRecord]) {
    books.sort_by_cached_key(|book| match book.first_author() {
        Some(name) => (false, name.to_lowercase()),
        None => (true, String::new()),
    });
}
