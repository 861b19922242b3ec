//! Article page fetching.
use async_trait::async_trait;
use std::time::Duration;
use url::Url;
use wedwire_http::header::{ACCEPT, HeaderMap, HeaderValue};
use wedwire_http::{HttpClient, HttpError, RequestOpts};

/// Retrieves raw HTML for an arbitrary article URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, HttpError>;
}

/// [`PageFetcher`] over the shared HTTP client with a fixed per-fetch timeout.
#[derive(Clone)]
pub struct HttpPageFetcher {
    http: HttpClient,
    timeout: Duration,
    retries: usize,
}

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5";

// Every page request is absolute; the base is never joined against.
const DETACHED_BASE: &str = "about:blank";

impl HttpPageFetcher {
    pub fn new(user_agent: &str, timeout: Duration, retries: usize) -> Result<Self, HttpError> {
        let http = HttpClient::with_user_agent(DETACHED_BASE, user_agent)?;
        Ok(Self {
            http,
            timeout,
            retries,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, HttpError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HttpError::Url(format!("unsupported scheme: {}", url.scheme())));
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        self.http
            .get_text(
                url.as_str(),
                RequestOpts {
                    timeout: Some(self.timeout),
                    retries: Some(self.retries),
                    headers: Some(headers),
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await
    }
}
