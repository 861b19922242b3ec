//! Common types and utilities shared across Wedwire crates.
//!
//! This crate defines the records that flow through the ingestion pipeline,
//! the caller-visible error kinds, and the observability helpers used by the
//! binary and integration tests. It stays dependency-light so every crate in
//! the workspace can depend on it.
//!
//! # Overview
//!
//! - [`RawSearchResult`] and [`ImageHints`]: what the search provider hands us
//! - [`ExtractedContent`]: readable article produced from a fetched page
//! - [`Article`]: the persisted, enriched record keyed by `link`
//! - [`ListQuery`] / [`Page`]: paginated reads from the store
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`WedwireError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use wedwire_common::{ImageHints, ImageTier};
//!
//! let hints = ImageHints {
//!     thumbnail: Some("https://a.com/t.jpg".into()),
//!     large: Some("https://a.com/l.jpg".into()),
//!     ..ImageHints::default()
//! };
//! let tiers: Vec<_> = hints.candidates().map(|c| c.tier).collect();
//! assert_eq!(tiers, vec![ImageTier::Large, ImageTier::Thumbnail]);
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod observability;

/// Image references attached to a search result, one named slot per field.
///
/// Providers add and drop these fields freely; everything downstream works off
/// this fixed set rather than probing the raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHints {
    /// Full-resolution original, highest trust.
    pub original: Option<String>,
    /// Image taken from the publisher page itself.
    pub source: Option<String>,
    /// A large rendition offered by the provider.
    pub large: Option<String>,
    /// Provider thumbnail, lowest trust.
    pub thumbnail: Option<String>,
}

impl ImageHints {
    /// Candidates in precedence order, skipping empty slots.
    pub fn candidates(&self) -> impl Iterator<Item = ImageCandidate> + '_ {
        [
            (ImageTier::Original, &self.original),
            (ImageTier::Source, &self.source),
            (ImageTier::Large, &self.large),
            (ImageTier::Thumbnail, &self.thumbnail),
        ]
        .into_iter()
        .filter_map(|(tier, slot)| {
            slot.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|url| ImageCandidate {
                    url: url.to_string(),
                    tier,
                })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.candidates().next().is_none()
    }
}

/// Where an image candidate came from. Declaration order is trust order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTier {
    Original,
    Source,
    Large,
    Embedded,
    Thumbnail,
    OpenGraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    pub tier: ImageTier,
}

/// Unprocessed record from the news search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSearchResult {
    pub title: String,
    /// Canonical article URL; the natural key of a stored [`Article`].
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub source: String,
    /// Free-text timestamp as the provider wrote it ("3 hours ago", "10/14/2024, ...").
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub images: ImageHints,
}

/// Readable representation of a fetched article page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    /// Sanitized HTML of the main content region.
    pub content: String,
    pub excerpt: Option<String>,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    /// Plain-text length of `content`, in characters.
    pub text_length: usize,
}

/// Persisted, enriched article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source: String,
    pub published: DateTime<Utc>,
    pub image: Option<String>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_archived: bool,
    /// Last time content extraction was attempted for this link.
    pub enriched_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Sort order for paginated listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    /// Newest `published` first.
    #[default]
    Recent,
    /// Articles with a resolved image first, newest first within each group.
    ImageFirst,
}

/// Filter applied to listings and counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Case-insensitive substring match on the title.
    pub title_contains: Option<String>,
    pub include_archived: bool,
    pub has_image_only: bool,
}

/// Offset/limit page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub offset: u32,
    pub limit: u32,
    pub order: ListOrder,
    pub filter: ListFilter,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
            order: ListOrder::default(),
            filter: ListFilter::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub total: u64,
}

/// Error kinds surfaced by the pipeline.
///
/// Only `Config`, `Provider` and `Store` ever escape an ingestion run; the
/// per-item kinds are logged and absorbed by the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum WedwireError {
    /// Missing or invalid configuration, such as an absent provider key.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The search provider could not be queried or returned nothing usable.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An article page could not be fetched (network, timeout, non-2xx).
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// No confident content region was found in a fetched page.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(String),
}

/// Convenient alias for results that use [`WedwireError`].
pub type Result<T> = std::result::Result<T, WedwireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_skip_blank_slots() {
        let hints = ImageHints {
            original: Some("   ".into()),
            source: None,
            large: Some("https://cdn.example.com/l.jpg".into()),
            thumbnail: Some("https://cdn.example.com/t.jpg".into()),
        };
        let got: Vec<_> = hints.candidates().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].tier, ImageTier::Large);
        assert_eq!(got[1].url, "https://cdn.example.com/t.jpg");
    }

    #[test]
    fn tiers_order_by_trust() {
        assert!(ImageTier::Original < ImageTier::Source);
        assert!(ImageTier::Embedded < ImageTier::Thumbnail);
        assert!(ImageTier::Thumbnail < ImageTier::OpenGraph);
    }

    #[test]
    fn raw_result_tolerates_missing_optional_fields() {
        let raw: RawSearchResult =
            serde_json::from_str(r#"{"title":"X Wedding","link":"https://a.com/1"}"#).unwrap();
        assert!(raw.images.is_empty());
        assert_eq!(raw.snippet, "");
        assert!(raw.published.is_none());
    }
}
