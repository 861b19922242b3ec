//! SQLite-backed Article Store.
//!
//! Articles are keyed by `link`. Writes go through a single-permit semaphore so
//! overlapping ingestion runs serialize their upserts; reads share the pool.
//! Timestamps are stored as RFC 3339 text with millisecond precision, which
//! keeps lexical and chronological order identical.
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use uuid::Uuid;
use wedwire_common::{Article, ListFilter, ListOrder, ListQuery, Page, WedwireError};
use wedwire_config::StoreConfig;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row for {link}: {reason}")]
    Corrupt { link: String, reason: String },
    #[error("store is closed")]
    Closed,
}

impl From<StoreError> for WedwireError {
    fn from(e: StoreError) -> Self {
        WedwireError::Store(e.to_string())
    }
}

#[derive(Clone)]
pub struct ArticleStore {
    pool: SqlitePool,
    write_limit: Arc<Semaphore>,
}

impl ArticleStore {
    /// Open (creating if needed) the database named by `cfg.url` and apply the schema.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let mut opts = SqliteConnectOptions::from_str(&cfg.url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !cfg.url.contains(":memory:") {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections.max(1))
            .connect_with(opts)
            .await?;
        info!(url = %cfg.url, max_connections = cfg.max_connections, "store.connect");
        Self::with_pool(pool).await
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            write_limit: Arc::new(Semaphore::new(1)),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or fully replace the row for `article.link`. The stored row keeps
    /// the id it was first written with; that id is returned.
    pub async fn upsert(&self, article: &Article) -> Result<Uuid, StoreError> {
        let _permit = self.write_permit().await?;
        let row = sqlx::query(
            r#"INSERT INTO articles
               (id, title, link, snippet, source, published, image, content, created_at, is_archived, enriched_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(link) DO UPDATE SET
                 title=excluded.title,
                 snippet=excluded.snippet,
                 source=excluded.source,
                 published=excluded.published,
                 image=excluded.image,
                 content=excluded.content,
                 created_at=excluded.created_at,
                 is_archived=excluded.is_archived,
                 enriched_at=excluded.enriched_at
               RETURNING id"#,
        )
        .bind(article.id.to_string())
        .bind(article.title.as_str())
        .bind(article.link.as_str())
        .bind(article.snippet.as_str())
        .bind(article.source.as_str())
        .bind(to_text(article.published))
        .bind(article.image.as_deref())
        .bind(article.content.as_deref())
        .bind(to_text(article.created_at))
        .bind(article.is_archived)
        .bind(article.enriched_at.map(to_text))
        .fetch_one(&self.pool)
        .await?;

        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt {
            link: article.link.clone(),
            reason: format!("id: {e}"),
        })?;
        info!(
            link = %article.link,
            id = %id,
            has_image = article.image.is_some(),
            has_content = article.content.is_some(),
            "store.upsert"
        );
        Ok(id)
    }

    pub async fn get_by_link(&self, link: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM articles WHERE link = ?1"))
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;
        debug!(link = %link, found = row.is_some(), "store.get_by_link");
        row.as_ref().map(article_from_row).transpose()
    }

    /// One page of articles plus whether more exist past it. The total comes
    /// from a count query run alongside the page query.
    pub async fn list_page(&self, query: &ListQuery) -> Result<Page<Article>, StoreError> {
        let order = match query.order {
            ListOrder::Recent => "published DESC, link ASC",
            ListOrder::ImageFirst => "(image IS NULL) ASC, published DESC, link ASC",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM articles WHERE {FILTER} ORDER BY {order} LIMIT ?4 OFFSET ?5"
        );
        let pattern = like_pattern(&query.filter);
        let page = async {
            sqlx::query(&sql)
                .bind(query.filter.include_archived)
                .bind(query.filter.has_image_only)
                .bind(pattern.as_deref())
                .bind(i64::from(query.limit))
                .bind(i64::from(query.offset))
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        };

        let (rows, total) = tokio::try_join!(page, self.count(&query.filter))?;
        let items = rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = u64::from(query.offset) + (items.len() as u64) < total;
        debug!(
            offset = query.offset,
            limit = query.limit,
            order = ?query.order,
            returned = items.len(),
            total,
            has_more,
            "store.list_page"
        );
        Ok(Page {
            items,
            has_more,
            total,
        })
    }

    pub async fn count(&self, filter: &ListFilter) -> Result<u64, StoreError> {
        let pattern = like_pattern(filter);
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM articles WHERE {FILTER}"))
            .bind(filter.include_archived)
            .bind(filter.has_image_only)
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    /// Soft-retire (or restore) an article. Returns `false` when the link is unknown.
    pub async fn archive(&self, link: &str, archived: bool) -> Result<bool, StoreError> {
        let _permit = self.write_permit().await?;
        let res = sqlx::query("UPDATE articles SET is_archived = ?2 WHERE link = ?1")
            .bind(link)
            .bind(archived)
            .execute(&self.pool)
            .await?;
        info!(link = %link, archived, rows = res.rows_affected(), "store.archive");
        Ok(res.rows_affected() > 0)
    }

    /// Record a content extraction attempt without touching other columns.
    pub async fn mark_enriched(&self, link: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let _permit = self.write_permit().await?;
        let res = sqlx::query("UPDATE articles SET enriched_at = ?2 WHERE link = ?1")
            .bind(link)
            .bind(to_text(at))
            .execute(&self.pool)
            .await?;
        debug!(link = %link, rows = res.rows_affected(), "store.mark_enriched");
        Ok(res.rows_affected() > 0)
    }

    async fn write_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, StoreError> {
        self.write_limit
            .acquire()
            .await
            .map_err(|_| StoreError::Closed)
    }
}

const COLUMNS: &str =
    "id, title, link, snippet, source, published, image, content, created_at, is_archived, enriched_at";

// ?1 include_archived, ?2 has_image_only, ?3 title LIKE pattern
const FILTER: &str = r"(?1 OR is_archived = 0)
  AND (?2 = 0 OR image IS NOT NULL)
  AND (?3 IS NULL OR title LIKE ?3 ESCAPE '\')";

fn like_pattern(filter: &ListFilter) -> Option<String> {
    let needle = filter.title_contains.as_deref()?.trim();
    if needle.is_empty() {
        return None;
    }
    let escaped = needle
        .replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_");
    Some(format!("%{escaped}%"))
}

fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn article_from_row(row: &SqliteRow) -> Result<Article, StoreError> {
    let link: String = row.try_get("link")?;
    let corrupt = |field: &str, e: &dyn std::fmt::Display| StoreError::Corrupt {
        link: link.clone(),
        reason: format!("{field}: {e}"),
    };
    let parse_ts = |field: &str, raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(field, &e))
    };

    let id: String = row.try_get("id")?;
    let published: String = row.try_get("published")?;
    let created_at: String = row.try_get("created_at")?;
    let enriched_at: Option<String> = row.try_get("enriched_at")?;

    Ok(Article {
        id: Uuid::parse_str(&id).map_err(|e| corrupt("id", &e))?,
        title: row.try_get("title")?,
        snippet: row.try_get("snippet")?,
        source: row.try_get("source")?,
        published: parse_ts("published", &published)?,
        image: row.try_get("image")?,
        content: row.try_get("content")?,
        created_at: parse_ts("created_at", &created_at)?,
        is_archived: row.try_get("is_archived")?,
        enriched_at: enriched_at
            .as_deref()
            .map(|raw| parse_ts("enriched_at", raw))
            .transpose()?,
        link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        let filter = ListFilter {
            title_contains: Some(" 100%_real ".into()),
            ..ListFilter::default()
        };
        assert_eq!(like_pattern(&filter).as_deref(), Some(r"%100\%\_real%"));
        assert_eq!(like_pattern(&ListFilter::default()), None);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(to_text(a) < to_text(b));
        assert_eq!(to_text(a), "2024-06-01T09:00:00.000Z");
    }
}
