mod common;

use std::fs;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use assert_matches::assert_matches;

use gutendex_fetch::download::{DownloadOptions, Downloader};
use gutendex_fetch::error::GutenError;
use gutendex_fetch::progress::ProgressEvent;

use common::{MockTransport, RecordingSink, Reply};

const URL: &str = "https://www.gutenberg.org/ebooks/84.epub.noimages";

fn options(retries: u32, chunk_size: usize) -> DownloadOptions {
    DownloadOptions {
        retries,
        chunk_size,
        backoff: Duration::ZERO,
        ..DownloadOptions::default()
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn succeeds_on_third_attempt_after_transport_errors() {
    let body = payload(10_000);
    let transport = MockTransport::new().route(
        URL,
        vec![
            Reply::TransportError("timed out".to_string()),
            Reply::TransportError("connection reset".to_string()),
            Reply::ok(body.clone()),
        ],
    );
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("Frankenstein.epub");
    let options = options(3, 4096);
    let interrupt = AtomicBool::new(false);
    let sink = RecordingSink::default();

    let bytes = Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &sink)
        .unwrap();

    assert_eq!(bytes, 10_000);
    assert_eq!(fs::read(&dest).unwrap(), body);
    assert_eq!(transport.calls_to(URL), 3);

    let failures = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::AttemptFailed {
                attempt, retries, ..
            } => Some((attempt, retries)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(failures, vec![(1, 3), (2, 3)]);
}

#[test]
fn reports_cumulative_progress_per_chunk() {
    let transport = MockTransport::new().route(URL, vec![Reply::ok(payload(10_000))]);
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    let options = options(1, 4096);
    let interrupt = AtomicBool::new(false);
    let sink = RecordingSink::default();

    Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &sink)
        .unwrap();

    let progress = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::Bytes { done, total } => Some((done, total)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        progress,
        vec![
            (4096, Some(10_000)),
            (8192, Some(10_000)),
            (10_000, Some(10_000))
        ]
    );
}

#[test]
fn gives_up_after_retry_ceiling() {
    let transport = MockTransport::new().route(URL, vec![Reply::status(503)]);
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    let options = options(3, 1024);
    let interrupt = AtomicBool::new(false);

    let err = Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(
        err,
        GutenError::RetriesExhausted { attempts: 3, ref message } if message.contains("503")
    );
    assert_eq!(transport.calls_to(URL), 3);
    assert!(!dest.exists());
}

#[test]
fn short_body_is_retried() {
    let body = payload(2048);
    let transport = MockTransport::new().route(
        URL,
        vec![
            Reply::Truncated {
                declared: 4096,
                body: body.clone(),
            },
            Reply::ok(payload(4096)),
        ],
    );
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    let options = options(2, 1024);
    let interrupt = AtomicBool::new(false);

    let bytes = Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &RecordingSink::default())
        .unwrap();

    assert_eq!(bytes, 4096);
    assert_eq!(fs::read(&dest).unwrap(), payload(4096));
}

#[test]
fn broken_stream_leaves_no_partial_file() {
    let transport = MockTransport::new().route(
        URL,
        vec![Reply::BrokenStream {
            body: payload(3000),
        }],
    );
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    let options = options(2, 1024);
    let interrupt = AtomicBool::new(false);

    let err = Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, GutenError::RetriesExhausted { attempts: 2, .. });
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn successful_attempt_replaces_stale_file() {
    let transport = MockTransport::new().route(URL, vec![Reply::ok("fresh")]);
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    fs::write(&dest, b"stale partial bytes from an older attempt").unwrap();
    let options = options(1, 1024);
    let interrupt = AtomicBool::new(false);

    Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &RecordingSink::default())
        .unwrap();

    assert_eq!(fs::read(&dest).unwrap(), b"fresh");
}

#[test]
fn interrupt_aborts_without_retrying() {
    let transport = MockTransport::new().route(URL, vec![Reply::ok(payload(100))]);
    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("book.epub");
    let options = options(3, 16);
    let interrupt = AtomicBool::new(true);

    let err = Downloader::new(&transport, &options, &interrupt)
        .download(URL, &dest, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, GutenError::Interrupted);
    assert_eq!(transport.calls_to(URL), 1);
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}
