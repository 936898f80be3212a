use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::GutenError;

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The only network capability the pipeline needs: a streamed GET.
///
/// Transport failures (DNS, connect, timeout before headers) come back as
/// [`GutenError::DownloadHttp`]; callers decide how to classify them.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, GutenError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, GutenError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gutendex-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GutenError::InvalidSettings(err.to_string()))?,
        );
        // per-request timeouts are applied in `get`
        let client = Client::builder()
            .default_headers(headers)
            .timeout(None)
            .build()
            .map_err(|err| GutenError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, GutenError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|err| GutenError::DownloadHttp(err.to_string()))?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}
