//! Minimal client for SerpAPI's news vertical.
//!
//! Handles credentials, request parameter shaping, and result normalisation
//! before delegating transport to the shared HTTP client. Results come back in
//! provider order, filtered to rows with a usable link and de-duplicated.
use super::types::{NewsQuery, SerpNewsResponse, SerpNewsResult, map_freshness};
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashSet;
use std::time::Instant;
use url::Url;
use wedwire_common::{RawSearchResult, WedwireError};
use wedwire_config::SearchConfig;
use wedwire_http::{Auth, HttpClient, RequestOpts};

/// Source of raw news results for the orchestrator.
#[async_trait]
pub trait NewsSearch: Send + Sync {
    /// Run one search. Errors are always `Config` or `Provider`.
    async fn search(&self, query: &NewsQuery) -> Result<Vec<RawSearchResult>, WedwireError>;
}

#[derive(Clone)]
pub struct SerpApi {
    http: HttpClient,
    api_key: String,
}

impl SerpApi {
    /// Build a client from config. A missing key is a configuration error,
    /// reported before any request is made.
    pub fn new(cfg: &SearchConfig) -> Result<Self, WedwireError> {
        let api_key = cfg.credentials()?.to_string();
        let http = HttpClient::new(&cfg.endpoint)
            .map_err(|e| WedwireError::Config(format!("search.endpoint: {e}")))?;
        Ok(Self { http, api_key })
    }

    pub async fn search_page(&self, query: &NewsQuery) -> Result<SerpNewsResponse, WedwireError> {
        let mut params: Vec<(&str, Cow<'_, str>)> = vec![
            ("engine", "google".into()),
            ("q", query.query.as_str().into()),
            ("tbm", "nws".into()),
            ("num", query.num.to_string().into()),
        ];
        if let Some(tbs) = map_freshness(query.freshness) {
            params.push(("tbs", tbs.into()));
        }
        if let Some(hl) = query.language.as_deref().filter(|s| !s.is_empty()) {
            params.push(("hl", hl.into()));
        }
        if let Some(gl) = query.country.as_deref().filter(|s| !s.is_empty()) {
            params.push(("gl", gl.into()));
        }

        let query_snippet = if query.query.chars().count() > 160 {
            format!("{}…", query.query.chars().take(160).collect::<String>())
        } else {
            query.query.clone()
        };
        let started = Instant::now();
        tracing::info!(
            target: "web.serp",
            query = %query_snippet,
            num = query.num,
            freshness = ?query.freshness,
            "serp.search.start"
        );

        let resp: SerpNewsResponse = match self
            .http
            .get_json(
                "search.json",
                RequestOpts {
                    auth: Some(Auth::Query {
                        name: "api_key",
                        value: Cow::Borrowed(self.api_key.as_str()),
                    }),
                    query: Some(params),
                    retries: Some(1),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(
                    target: "web.serp",
                    query = %query_snippet,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "serp.search.error"
                );
                return Err(WedwireError::Provider(format!("search request failed: {e}")));
            }
        };

        tracing::info!(
            target: "web.serp",
            query = %query_snippet,
            elapsed_ms = started.elapsed().as_millis() as u64,
            results = resp.news_results.as_ref().map(Vec::len).unwrap_or(0),
            search_id = ?resp.search_metadata.as_ref().and_then(|m| m.id.as_deref()),
            "serp.search.success"
        );
        Ok(resp)
    }
}

#[async_trait]
impl NewsSearch for SerpApi {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<RawSearchResult>, WedwireError> {
        let resp = self.search_page(query).await?;
        if let Some(err) = resp.error.as_deref() {
            return Err(WedwireError::Provider(format!("provider reported: {err}")));
        }
        let Some(rows) = resp.news_results.as_ref() else {
            return Err(WedwireError::Provider(
                "no news_results in provider response".into(),
            ));
        };

        let results = collect_results(rows);
        if results.is_empty() {
            return Err(WedwireError::Provider(
                "no usable news results after filtering".into(),
            ));
        }
        tracing::debug!(
            target: "web.serp",
            raw = rows.len(),
            kept = results.len(),
            "serp.search.filtered"
        );
        Ok(results)
    }
}

/// Flatten clusters, drop rows without a usable http(s) link, de-duplicate by
/// link key, and keep provider order.
pub(crate) fn collect_results(rows: &[SerpNewsResult]) -> Vec<RawSearchResult> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for row in rows {
        push_row(&mut out, &mut seen, row);
    }
    out
}

fn push_row(out: &mut Vec<RawSearchResult>, seen: &mut HashSet<String>, row: &SerpNewsResult) {
    if let Some(raw) = row.to_raw() {
        if let Ok(u) = Url::parse(&raw.link)
            && matches!(u.scheme(), "http" | "https")
            && seen.insert(link_key(&u))
        {
            out.push(raw);
        }
        return;
    }
    if let Some(stories) = row.stories.as_ref() {
        for story in stories {
            push_row(out, seen, story);
        }
    }
}

/// Simple normalization key for deduping (drop fragment, trim trailing slash).
fn link_key(u: &Url) -> String {
    let mut clone = u.clone();
    clone.set_fragment(None);
    clone.as_str().trim_end_matches('/').to_string()
}
