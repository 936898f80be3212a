#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use gutendex_fetch::error::GutenError;
use gutendex_fetch::http::{HttpResponse, HttpTransport};
use gutendex_fetch::progress::{ProgressEvent, ProgressSink};

pub const API_ROOT: &str = "http://mock.test/books";

pub enum Reply {
    Body { status: u16, body: Vec<u8> },
    /// Declares more bytes than the body holds.
    Truncated { declared: u64, body: Vec<u8> },
    /// The stream errors after yielding `body`.
    BrokenStream { body: Vec<u8> },
    /// Raises `flag` as soon as the first chunk has been read.
    Interrupting { body: Vec<u8>, flag: Arc<AtomicBool> },
    TransportError(String),
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Reply::Body {
            status: 200,
            body: body.into(),
        }
    }

    pub fn json(value: &Value) -> Self {
        Reply::ok(serde_json::to_vec(value).unwrap())
    }

    pub fn status(status: u16) -> Self {
        Reply::Body {
            status,
            body: Vec::new(),
        }
    }
}

/// Scripted transport: each URL serves its queued replies in order and the
/// last one repeats.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == url).count()
    }

    pub fn epub_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(".epub"))
            .count()
    }
}

struct FailingReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            read => Ok(read),
        }
    }
}

struct FlaggingReader {
    inner: Cursor<Vec<u8>>,
    flag: Arc<AtomicBool>,
}

impl Read for FlaggingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.flag.store(true, Ordering::SeqCst);
        Ok(read)
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, GutenError> {
        self.calls.lock().unwrap().push(url.to_string());
        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(url)
            .ok_or_else(|| GutenError::DownloadHttp(format!("no route for {url}")))?;
        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            match queue.front().unwrap() {
                Reply::Body { status, body } => Reply::Body {
                    status: *status,
                    body: body.clone(),
                },
                Reply::Truncated { declared, body } => Reply::Truncated {
                    declared: *declared,
                    body: body.clone(),
                },
                Reply::BrokenStream { body } => Reply::BrokenStream { body: body.clone() },
                Reply::Interrupting { body, flag } => Reply::Interrupting {
                    body: body.clone(),
                    flag: Arc::clone(flag),
                },
                Reply::TransportError(message) => Reply::TransportError(message.clone()),
            }
        };
        match reply {
            Reply::Body { status, body } => Ok(HttpResponse {
                status,
                content_length: Some(body.len() as u64),
                body: Box::new(Cursor::new(body)),
            }),
            Reply::Truncated { declared, body } => Ok(HttpResponse {
                status: 200,
                content_length: Some(declared),
                body: Box::new(Cursor::new(body)),
            }),
            Reply::BrokenStream { body } => Ok(HttpResponse {
                status: 200,
                content_length: None,
                body: Box::new(FailingReader {
                    inner: Cursor::new(body),
                }),
            }),
            Reply::Interrupting { body, flag } => Ok(HttpResponse {
                status: 200,
                content_length: Some(body.len() as u64),
                body: Box::new(FlaggingReader {
                    inner: Cursor::new(body),
                    flag,
                }),
            }),
            Reply::TransportError(message) => Err(GutenError::DownloadHttp(message)),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn epub_url(id: u64) -> String {
    format!("https://www.gutenberg.org/ebooks/{id}.epub.noimages")
}

pub fn book(id: u64, title: &str, author: Option<&str>) -> Value {
    let authors = match author {
        Some(name) => json!([{ "name": name, "birth_year": null, "death_year": null }]),
        None => json!([]),
    };
    json!({
        "id": id,
        "title": title,
        "authors": authors,
        "languages": ["en"],
        "formats": {
            "text/html": format!("https://www.gutenberg.org/ebooks/{id}.html.images"),
            "application/epub+zip": format!("https://www.gutenberg.org/ebooks/{id}.epub3.images"),
            "application/epub+zip; noimages": epub_url(id),
        },
        "download_count": id % 1000,
    })
}

pub fn book_without_epub(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "authors": [],
        "formats": {
            "text/plain; charset=us-ascii":
                format!("https://www.gutenberg.org/ebooks/{id}.txt.utf-8"),
        },
        "download_count": 5,
    })
}

pub fn page(results: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "count": results.len(),
        "next": next,
        "previous": null,
        "results": results,
    })
}

pub fn first_page(sort: &str) -> String {
    format!("{API_ROOT}?sort={sort}")
}

pub fn page_url(sort: &str, number: usize) -> String {
    format!("{API_ROOT}?page={number}&sort={sort}")
}
