//! End-to-end ingestion: search, fetch, extract, resolve, upsert.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use wedwire_common::{Article, ExtractedContent, ImageHints, RawSearchResult, WedwireError};
use wedwire_config::WedwireConfig;
use wedwire_http::HttpError;
use wedwire_store::ArticleStore;
use wedwire_web::extract::{ContentError, ContentExtractor, PageDocument};
use wedwire_web::fetch::{HttpPageFetcher, PageFetcher};
use wedwire_web::image::ImageResolver;
use wedwire_web::serp::{NewsQuery, NewsSearch, SerpApi};

use crate::published::normalize_published;

/// Drives ingestion batches and lazy reads against one store.
pub struct Orchestrator {
    search: Arc<dyn NewsSearch>,
    fetcher: Arc<dyn PageFetcher>,
    store: ArticleStore,
    extractor: ContentExtractor,
    resolver: ImageResolver,
    query: NewsQuery,
    target_count: usize,
    concurrency: usize,
    fetch_timeout: Duration,
    staleness: chrono::Duration,
}

/// What one page fetch produced, before anything is written.
struct Enrichment {
    content: Option<ExtractedContent>,
    image: Option<String>,
}

impl Orchestrator {
    pub fn new(
        cfg: &WedwireConfig,
        search: Arc<dyn NewsSearch>,
        fetcher: Arc<dyn PageFetcher>,
        store: ArticleStore,
    ) -> Self {
        Self {
            search,
            fetcher,
            store,
            extractor: ContentExtractor::new(),
            resolver: ImageResolver::new(&cfg.image),
            query: NewsQuery::from(&cfg.search),
            target_count: cfg.ingest.target_count.max(1),
            concurrency: cfg.ingest.concurrency.max(1),
            fetch_timeout: cfg.ingest.fetch_timeout(),
            staleness: chrono::Duration::from_std(cfg.ingest.staleness_window())
                .unwrap_or_else(|_| chrono::Duration::days(365_000)),
        }
    }

    /// Wire up the SerpAPI client, HTTP page fetcher and SQLite store from
    /// config. Missing credentials fail here, before the store is opened.
    pub async fn from_config(cfg: &WedwireConfig) -> Result<Self, WedwireError> {
        let search = SerpApi::new(&cfg.search)?;
        let fetcher = HttpPageFetcher::new(
            &cfg.ingest.user_agent,
            cfg.ingest.fetch_timeout(),
            cfg.ingest.fetch_retries,
        )
        .map_err(|e| WedwireError::Config(format!("page fetcher: {e}")))?;
        let store = ArticleStore::connect(&cfg.store).await?;
        Ok(Self::new(cfg, Arc::new(search), Arc::new(fetcher), store))
    }

    /// Like [`from_config`](Self::from_config) without a search client, for
    /// reads and backfills. [`run`](Self::run) on it is a configuration error.
    pub async fn reader(cfg: &WedwireConfig) -> Result<Self, WedwireError> {
        let fetcher = HttpPageFetcher::new(
            &cfg.ingest.user_agent,
            cfg.ingest.fetch_timeout(),
            cfg.ingest.fetch_retries,
        )
        .map_err(|e| WedwireError::Config(format!("page fetcher: {e}")))?;
        let store = ArticleStore::connect(&cfg.store).await?;
        Ok(Self::new(cfg, Arc::new(Unconfigured), Arc::new(fetcher), store))
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    pub fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    /// Query the provider and ingest what it returns.
    pub async fn run(&self) -> Result<Vec<Article>, WedwireError> {
        let started = Instant::now();
        let raw = self.search.search(&self.query).await.inspect_err(|e| {
            warn!(target: "ingest", error = %e, "ingest.search_failed");
        })?;
        let articles = self.ingest(raw).await?;
        info!(
            target: "ingest",
            returned = articles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingest.run.done"
        );
        Ok(articles)
    }

    /// Enrich and store each raw result with bounded concurrency.
    ///
    /// Returns, in provider order, the stored articles that ended up with an
    /// image, stopping once `target_count` of them are collected. Items
    /// without an image are still stored. Per-item failures are logged and
    /// never abort the batch.
    pub async fn ingest(&self, raw: Vec<RawSearchResult>) -> Result<Vec<Article>, WedwireError> {
        let now = Utc::now();
        let total = raw.len();
        info!(
            target: "ingest",
            total,
            target = self.target_count,
            concurrency = self.concurrency,
            "ingest.batch.start"
        );

        let mut pending = stream::iter(raw)
            .map(|item| self.ingest_one(item, now))
            .buffered(self.concurrency);

        let mut out = Vec::with_capacity(self.target_count);
        let mut stored = 0usize;
        while let Some(article) = pending.next().await {
            let Some(article) = article else { continue };
            stored += 1;
            if !article.has_image() {
                debug!(target: "ingest", link = %article.link, "ingest.item.no_image");
                continue;
            }
            out.push(article);
            if out.len() >= self.target_count {
                break;
            }
        }

        info!(
            target: "ingest",
            total,
            stored,
            returned = out.len(),
            "ingest.batch.done"
        );
        Ok(out)
    }

    /// Fetch, extract, resolve and upsert one result. `None` when the stored
    /// row could not be read or written.
    async fn ingest_one(&self, raw: RawSearchResult, now: DateTime<Utc>) -> Option<Article> {
        let started = Instant::now();
        // Without the stored row the merge would reset its archive flag and
        // creation time, so the item is left untouched.
        let existing = match self.store.get_by_link(&raw.link).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(target: "ingest", link = %raw.link, error = %e, "ingest.item.lookup_failed");
                return None;
            }
        };

        let enrichment = match self.fetch_page(&raw.link).await {
            Ok((url, html)) => self.enrich(url, &html, &raw.images),
            Err(e) => {
                warn!(target: "ingest", link = %raw.link, error = %e, "ingest.item.fetch_failed");
                Enrichment {
                    content: None,
                    image: self.resolver.resolve(&raw.images, None, None),
                }
            }
        };

        let published = normalize_published(raw.published.as_deref(), now);
        let prior = existing.as_ref();
        let mut article = Article {
            id: prior.map(|a| a.id).unwrap_or_else(Uuid::new_v4),
            snippet: non_empty(raw.snippet)
                .or_else(|| enrichment.content.as_ref().and_then(|c| c.excerpt.clone()))
                .unwrap_or_default(),
            source: non_empty(raw.source)
                .or_else(|| enrichment.content.as_ref().and_then(|c| c.site_name.clone()))
                .unwrap_or_default(),
            title: raw.title,
            link: raw.link,
            published,
            image: enrichment
                .image
                .or_else(|| prior.and_then(|a| a.image.clone())),
            content: enrichment
                .content
                .map(|c| c.content)
                .or_else(|| prior.and_then(|a| a.content.clone())),
            created_at: prior.map(|a| a.created_at).unwrap_or(now),
            is_archived: prior.is_some_and(|a| a.is_archived),
            enriched_at: Some(now),
        };

        match self.store.upsert(&article).await {
            Ok(id) => article.id = id,
            Err(e) => {
                warn!(target: "ingest", link = %article.link, error = %e, "ingest.item.store_failed");
                return None;
            }
        }
        info!(
            target: "ingest",
            link = %article.link,
            has_image = article.has_image(),
            has_content = article.content.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingest.item.done"
        );
        Some(article)
    }

    /// Read one article, backfilling content when it is missing and the last
    /// attempt is older than the staleness window.
    pub async fn get_article(&self, link: &str) -> Result<Option<Article>, WedwireError> {
        let Some(mut article) = self.store.get_by_link(link).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if !self.needs_backfill(&article, now) {
            return Ok(Some(article));
        }

        info!(target: "ingest", link = %link, "ingest.backfill.start");
        match self.fetch_page(link).await {
            Ok((url, html)) => {
                let enrichment = self.enrich(url, &html, &ImageHints::default());
                if let Some(content) = enrichment.content {
                    article.content = Some(content.content);
                }
                if article.image.is_none() {
                    article.image = enrichment.image;
                }
                article.enriched_at = Some(now);
                self.store.upsert(&article).await?;
            }
            Err(e) => {
                warn!(target: "ingest", link = %link, error = %e, "ingest.backfill.fetch_failed");
                self.store.mark_enriched(link, now).await?;
                article.enriched_at = Some(now);
            }
        }
        info!(
            target: "ingest",
            link = %link,
            has_content = article.content.is_some(),
            has_image = article.has_image(),
            "ingest.backfill.done"
        );
        Ok(Some(article))
    }

    fn needs_backfill(&self, article: &Article, now: DateTime<Utc>) -> bool {
        article.content.is_none()
            && article
                .enriched_at
                .is_none_or(|at| now.signed_duration_since(at) >= self.staleness)
    }

    async fn fetch_page(&self, link: &str) -> Result<(Url, String), ContentError> {
        let url = Url::parse(link).map_err(|e| HttpError::Url(format!("{link}: {e}")))?;
        let html = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&url))
            .await
            .map_err(|_| HttpError::Timeout(self.fetch_timeout))??;
        Ok((url, html))
    }

    /// Parse a fetched page and run extraction and image resolution over it.
    /// Synchronous so the parsed document never lives across an await.
    fn enrich(&self, url: Url, html: &str, hints: &ImageHints) -> Enrichment {
        let doc = PageDocument::parse(html, url);
        let content = match self.extractor.extract_document(&doc) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(target: "ingest", link = %doc.url(), error = %e, "ingest.item.parse_failed");
                None
            }
        };
        let image = self.resolver.resolve(hints, content.as_ref(), Some(&doc));
        Enrichment { content, image }
    }
}

struct Unconfigured;

#[async_trait]
impl NewsSearch for Unconfigured {
    async fn search(&self, _query: &NewsQuery) -> Result<Vec<RawSearchResult>, WedwireError> {
        Err(WedwireError::Config("search client not configured".into()))
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
