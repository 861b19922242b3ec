use serde::{Deserialize, Serialize};
use wedwire_common::{ImageHints, RawSearchResult};
use wedwire_config::{Freshness, SearchConfig};

/// Request parameters for a news search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub query: String,
    /// Result-count hint; providers may return fewer.
    pub num: u32,
    pub freshness: Freshness,
    pub language: Option<String>,
    pub country: Option<String>,
}

impl From<&SearchConfig> for NewsQuery {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            query: cfg.query.clone(),
            num: cfg.num,
            freshness: cfg.freshness,
            language: cfg.language.clone(),
            country: cfg.country.clone(),
        }
    }
}

/// Google `tbs` value for a freshness window.
pub fn map_freshness(f: Freshness) -> Option<&'static str> {
    Some(match f {
        Freshness::Any => return None,
        Freshness::Day => "qdr:d",
        Freshness::Week => "qdr:w",
        Freshness::Month => "qdr:m",
        Freshness::Year => "qdr:y",
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpNewsResponse {
    #[serde(default)]
    pub search_metadata: Option<SearchMetadata>,
    #[serde(default)]
    pub news_results: Option<Vec<SerpNewsResult>>,
    /// SerpAPI reports some failures (bad key, no results) in a 200 body.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpNewsResult {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub source: Option<SourceField>,
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default, alias = "original_image")]
    pub original: Option<String>,
    #[serde(default, alias = "image")]
    pub source_image: Option<String>,
    #[serde(default, alias = "thumbnail_large")]
    pub large_image: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail_small: Option<String>,

    /// Clustered coverage of one story; present instead of `link` on cluster rows.
    #[serde(default)]
    pub stories: Option<Vec<SerpNewsResult>>,
}

/// Publisher name: a plain string in `tbm=nws`, an object in the news engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceField {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
    },
}

impl SourceField {
    pub fn name(&self) -> Option<&str> {
        match self {
            SourceField::Name(n) => Some(n.as_str()),
            SourceField::Detailed { name } => name.as_deref(),
        }
    }
}

impl SerpNewsResult {
    /// Convert into the provider-neutral record. `None` without title or link.
    pub fn to_raw(&self) -> Option<RawSearchResult> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let link = self.link.as_deref().map(str::trim).filter(|l| !l.is_empty())?;
        Some(RawSearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: self.snippet.clone().unwrap_or_default(),
            source: self
                .source
                .as_ref()
                .and_then(SourceField::name)
                .unwrap_or_default()
                .to_string(),
            published: self.date.clone(),
            images: ImageHints {
                original: self.original.clone(),
                source: self.source_image.clone(),
                large: self.large_image.clone(),
                thumbnail: self.thumbnail.clone().or_else(|| self.thumbnail_small.clone()),
            },
        })
    }
}
