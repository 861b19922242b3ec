//! Small GET-only HTTP client shared by the search provider and the page fetcher.
//!
//! - Per-request options: headers, query auth, query params, timeout, retries
//! - 429 and 5xx are retried with exponential backoff; `Retry-After` wins when present
//! - Secrets (`api_key`, `token`, `Authorization`, ...) never reach the logs
//! - JSON bodies via [`HttpClient::get_json`], HTML/text via [`HttpClient::get_text`]
//! - Optional *raw* request/response logging via `WEDWIRE_HTTP_RAW=1`
//!
//! ```no_run
//! # async fn demo() -> Result<(), wedwire_http::HttpError> {
//! let client = wedwire_http::HttpClient::new("https://serpapi.com")?;
//! let got: serde_json::Value = client
//!     .get_json("search.json", wedwire_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
pub use reqwest::header;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const RAW_ENV: &str = "WEDWIRE_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_CHARS: usize = 500;
const REDACTED: &str = "<redacted>";
/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// Status code for `Api` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How a request authenticates.
///
/// ```
/// use wedwire_http::Auth;
/// use std::borrow::Cow;
///
/// let auth = Auth::Query { name: "api_key", value: Cow::Borrowed("k") };
/// assert!(matches!(auth, Auth::Query { name: "api_key", .. }));
/// ```
#[derive(Clone, Debug, Default)]
pub enum Auth<'a> {
    /// Secret carried as a query parameter (SerpAPI `api_key`). Redacted in logs.
    Query { name: &'a str, value: Cow<'a, str> },
    #[default]
    None,
}

/// Per-request overrides of the client defaults.
///
/// ```
/// use wedwire_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     auth: Some(Auth::Query { name: "api_key", value: Cow::Borrowed("demo") }),
///     ..Default::default()
/// };
/// assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// A request fully resolved for sending, shared by every attempt.
struct Prepared<'a> {
    id: String,
    url: Url,
    query: Vec<(&'a str, Cow<'a, str>)>,
    headers: HeaderMap,
    timeout: Duration,
    retries: usize,
}

/// Why one attempt failed, and whether another may follow.
struct Failure {
    error: HttpError,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl Failure {
    fn transport(err: reqwest::Error, timeout: Duration) -> Self {
        let error = if err.is_timeout() {
            HttpError::Timeout(timeout)
        } else {
            HttpError::Network(err.to_string())
        };
        Self {
            error,
            retryable: true,
            retry_after: None,
        }
    }

    /// `Retry-After` when the server sent one, else exponential backoff with a
    /// floor of just over a second for rate limiting.
    fn delay(&self, attempt: usize) -> Duration {
        if let Some(after) = self.retry_after {
            return after;
        }
        let exp = backoff(attempt);
        match self.error.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => exp.max(Duration::from_millis(1100)),
            _ => exp,
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use wedwire_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://serpapi.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        Self::build(base, None)
    }

    /// Like [`HttpClient::new`], sending `user_agent` on every request.
    pub fn with_user_agent(base: &str, user_agent: &str) -> Result<Self, HttpError> {
        Self::build(base, Some(user_agent))
    }

    fn build(base: &str, user_agent: Option<&str>) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(format!("{base}: {e}")))?;
        let mut defaults = HeaderMap::new();
        if let Some(ua) = user_agent {
            let ua = HeaderValue::from_str(ua).map_err(|e| HttpError::Build(e.to_string()))?;
            defaults.insert(USER_AGENT, ua);
        }
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .default_headers(defaults)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let (id, body) = self.get(path, opts).await?;
        serde_json::from_slice(&body).map_err(|e| {
            let snippet = snippet(&body);
            warn!(
                req_id = %id,
                line = e.line(),
                column = e.column(),
                error = %e,
                body_snippet = %snippet,
                "http.decode_failed"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }

    /// GET a text body (HTML pages). Invalid UTF-8 is replaced, not rejected.
    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<String, HttpError> {
        let (_, body) = self.get(path, opts).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get(&self, path: &str, opts: RequestOpts<'_>) -> Result<(String, Vec<u8>), HttpError> {
        let req = self.prepare(path, opts)?;
        let mut attempt = 1usize;
        loop {
            match self.attempt(&req, attempt).await {
                Ok(body) => return Ok((req.id, body)),
                Err(failure) if failure.retryable && attempt <= req.retries => {
                    let delay = failure.delay(attempt);
                    warn!(
                        req_id = %req.id,
                        attempt,
                        retries = req.retries,
                        status = ?failure.error.status(),
                        backoff_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "http.retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    warn!(req_id = %req.id, attempt, error = %failure.error, "http.failed");
                    return Err(failure.error);
                }
            }
        }
    }

    fn prepare<'a>(&self, path: &str, opts: RequestOpts<'a>) -> Result<Prepared<'a>, HttpError> {
        let url = match Url::parse(path) {
            Ok(abs) if opts.allow_absolute => abs,
            _ => self
                .base
                .join(path)
                .map_err(|e| HttpError::Url(format!("{path}: {e}")))?,
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HttpError::Url(format!("unsupported scheme: {}", url.scheme())));
        }

        let mut query = opts.query.unwrap_or_default();
        if let Some(Auth::Query { name, value }) = opts.auth {
            query.push((name, value));
        }
        Ok(Prepared {
            id: format!("h{}", NEXT_REQUEST.fetch_add(1, Ordering::Relaxed)),
            url,
            query,
            headers: opts.headers.unwrap_or_default(),
            timeout: opts.timeout.unwrap_or(self.default_timeout),
            retries: opts.retries.unwrap_or(self.max_retries),
        })
    }

    fn request(&self, req: &Prepared<'_>) -> RequestBuilder {
        let pairs: Vec<(&str, &str)> = req.query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
        self.inner
            .get(req.url.clone())
            .timeout(req.timeout)
            .query(&pairs)
            .headers(req.headers.clone())
    }

    async fn attempt(&self, req: &Prepared<'_>, attempt: usize) -> Result<Vec<u8>, Failure> {
        debug!(
            req_id = %req.id,
            attempt,
            host_path = %host_path(&req.url),
            query = ?redacted_pairs(req.query.iter().map(|(k, v)| (*k, v.as_ref()))),
            timeout_ms = req.timeout.as_millis() as u64,
            "http.request"
        );
        let raw = raw_enabled();
        if raw {
            debug!(target: "http.raw", req_id = %req.id, curl = %curl(req), "request");
        }

        let started = Instant::now();
        let resp = self
            .request(req)
            .send()
            .await
            .map_err(|e| Failure::transport(e, req.timeout))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = read_body(resp)
            .await
            .map_err(|e| Failure::transport(e, req.timeout))?;
        let server_id = server_request_id(&headers);

        debug!(
            req_id = %req.id,
            %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            body_len = body.len(),
            x_request_id = %server_id,
            "http.response"
        );
        if raw {
            let shown = &body[..body.len().min(RAW_MAX_BODY)];
            info!(
                target: "http.raw",
                req_id = %req.id,
                %status,
                headers = ?redacted_headers(&headers),
                body = %String::from_utf8_lossy(shown),
                truncated = body.len() > RAW_MAX_BODY,
                "response"
            );
        }

        if status.is_success() {
            return Ok(body);
        }
        Err(Failure {
            error: HttpError::Api {
                status,
                message: error_message(&body),
                request_id: server_id,
            },
            retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            retry_after: retry_after(&headers),
        })
    }
}

async fn read_body(resp: Response) -> Result<Vec<u8>, reqwest::Error> {
    Ok(resp.bytes().await?.to_vec())
}

fn raw_enabled() -> bool {
    std::env::var(RAW_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn backoff(attempt: usize) -> Duration {
    let exp = attempt.saturating_sub(1).min(10) as u32;
    Duration::from_millis(200 * 2u64.pow(exp))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn server_request_id(headers: &HeaderMap) -> String {
    ["x-request-id", "x-correlation-id"]
        .iter()
        .find_map(|name| headers.get(*name)?.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

fn is_secret(name: &str) -> bool {
    const SECRETS: &[&str] = &[
        "access_token",
        "api_key",
        "apikey",
        "auth",
        "authorization",
        "bearer",
        "client_secret",
        "cookie",
        "key",
        "secret",
        "token",
        "x-api-key",
    ];
    SECRETS.contains(&name.to_ascii_lowercase().as_str())
}

fn redact<'a>(name: &str, value: &'a str) -> &'a str {
    if is_secret(name) { REDACTED } else { value }
}

fn redacted_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<String> {
    pairs.map(|(k, v)| format!("{k}={}", redact(k, v))).collect()
}

fn redacted_headers(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .map(|(k, v)| format!("{k}: {}", redact(k.as_str(), v.to_str().unwrap_or("<binary>"))))
        .collect()
}

fn host_path(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or("-"), url.path())
}

/// A shell-pasteable repro of the request with every secret replaced.
fn curl(req: &Prepared<'_>) -> String {
    let mut url = req.url.clone();
    url.set_query(None);
    let query = redacted_pairs(req.query.iter().map(|(k, v)| (*k, v.as_ref()))).join("&");
    let mut cmd = String::from("curl");
    for header in redacted_headers(&req.headers) {
        cmd.push_str(&format!(" -H '{}'", header.replace('\'', r"'\''")));
    }
    if query.is_empty() {
        cmd.push_str(&format!(" '{url}'"));
    } else {
        cmd.push_str(&format!(" '{url}?{query}'"));
    }
    cmd
}

/// The most specific message an error body offers: `error.message`, then
/// `message`, `detail` or a string `error` (SerpAPI), else a body snippet.
fn error_message(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let found = ["/error/message", "/message", "/detail", "/error"]
            .iter()
            .find_map(|ptr| json.pointer(ptr)?.as_str().filter(|s| !s.is_empty()));
        if let Some(msg) = found {
            return msg.to_string();
        }
    }
    snippet(body)
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(&body[..body.len().min(4 * SNIPPET_CHARS)]);
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(url: &str, query: Vec<(&'static str, Cow<'static, str>)>) -> Prepared<'static> {
        Prepared {
            id: "h1".into(),
            url: Url::parse(url).unwrap(),
            query,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(1),
            retries: 0,
        }
    }

    #[test]
    fn curl_never_contains_secret() {
        let mut req = prepared(
            "https://serpapi.com/search.json",
            vec![("q", "wedding".into()), ("api_key", "s3cret".into())],
        );
        req.headers
            .insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        let cmd = curl(&req);
        assert!(!cmd.contains("s3cret"), "{cmd}");
        assert!(cmd.contains("q=wedding"));
        assert!(cmd.contains("api_key=<redacted>"));
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(error_message(br#"{"error":"Invalid API key."}"#), "Invalid API key.");
        assert_eq!(error_message(br#"{"error":{"message":"quota"}}"#), "quota");
        assert_eq!(error_message(br#"{"detail":"gone"}"#), "gone");
        assert_eq!(error_message(b"plain text"), "plain text");
    }

    #[test]
    fn snippets_are_bounded() {
        let long = "x".repeat(2 * SNIPPET_CHARS);
        let s = snippet(long.as_bytes());
        assert_eq!(s.len(), SNIPPET_CHARS + 3);
        assert!(s.ends_with("..."));
        assert_eq!(snippet(b"short"), "short");
    }

    #[test]
    fn retry_delay_honours_retry_after_and_rate_limit_floor() {
        let backoff_only = Failure {
            error: HttpError::Network("reset".into()),
            retryable: true,
            retry_after: None,
        };
        assert_eq!(backoff_only.delay(1), Duration::from_millis(200));
        assert_eq!(backoff_only.delay(3), Duration::from_millis(800));

        let limited = Failure {
            error: HttpError::Api {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: String::new(),
                request_id: "-".into(),
            },
            retryable: true,
            retry_after: None,
        };
        assert_eq!(limited.delay(1), Duration::from_millis(1100));

        let told = Failure {
            retry_after: Some(Duration::from_secs(3)),
            ..limited
        };
        assert_eq!(told.delay(1), Duration::from_secs(3));
    }

    #[test]
    fn retry_after_is_capped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(retry_after(&headers), Some(MAX_RETRY_AFTER));
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 2 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn non_http_schemes_are_rejected_before_sending() {
        let client = HttpClient::new("https://serpapi.com").unwrap();
        let opts = RequestOpts {
            allow_absolute: true,
            ..Default::default()
        };
        assert!(matches!(
            client.prepare("file:///etc/passwd", opts),
            Err(HttpError::Url(_))
        ));
    }
}
