//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are attached, then `WEDWIRE__`-prefixed
//! environment variables are applied on top (`WEDWIRE__SEARCH__API_KEY` sets
//! `search.api_key`). After merging, `${VAR}` placeholders anywhere in the tree
//! are expanded recursively before the typed [`WedwireConfig`] is built.
//!
//! Every section has defaults, so an empty source set yields a usable config.
//! The only value without a default is the search provider key; callers check
//! it with [`SearchConfig::credentials`] before talking to the provider.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use wedwire_common::observability::LogFormat;
use wedwire_common::WedwireError;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WedwireConfig {
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub image: ImageConfig,
    pub logging: LoggingConfig,
}

/// Search provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub query: String,
    /// Result-count hint sent to the provider.
    pub num: u32,
    pub freshness: Freshness,
    pub language: Option<String>,
    pub country: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://serpapi.com".into(),
            query: "wedding news celebrity marriage".into(),
            num: 20,
            freshness: Freshness::Week,
            language: Some("en".into()),
            country: None,
        }
    }
}

impl SearchConfig {
    /// Provider key, or a configuration error when it is absent.
    ///
    /// A value that still contains `${` means the referenced variable was
    /// never set, which counts as missing.
    ///
    /// ```
    /// use wedwire_config::SearchConfig;
    ///
    /// let mut cfg = SearchConfig::default();
    /// assert!(cfg.credentials().is_err());
    /// cfg.api_key = Some("${SERP_API_KEY}".into());
    /// assert!(cfg.credentials().is_err());
    /// cfg.api_key = Some("abc123".into());
    /// assert_eq!(cfg.credentials().unwrap(), "abc123");
    /// ```
    pub fn credentials(&self) -> Result<&str, WedwireError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && !key.contains("${") => Ok(key),
            _ => Err(WedwireError::Config(
                "search.api_key is not configured".into(),
            )),
        }
    }
}

/// Provider-side recency filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Any,
    Day,
    #[default]
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://wedwire.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Stop once this many articles with an image have been accumulated.
    pub target_count: usize,
    /// Cap on simultaneous per-article enrichment tasks.
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: usize,
    pub staleness_hours: u64,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            concurrency: 4,
            fetch_timeout_secs: 10,
            fetch_retries: 1,
            staleness_hours: 24,
            user_agent: "Mozilla/5.0 (compatible; wedwire/0.1)".into(),
        }
    }
}

impl IngestConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Minimum of width and height for an `<img>` to count as a featured image.
    pub min_featured_dimension: u32,
    /// Size written into size directives when requesting a larger rendition.
    pub upgrade_size: u32,
    /// Optional resizing proxy prefix; the image URL is appended percent-encoded.
    pub resize_proxy: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_featured_dimension: 300,
            upgrade_size: 1600,
            resize_proxy: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: true,
            filter: "info".into(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct WedwireConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for WedwireConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl WedwireConfigLoader {
    /// Start with no files; `WEDWIRE__` env overrides are always applied last.
    ///
    /// ```
    /// use wedwire_config::WedwireConfigLoader;
    ///
    /// let config = WedwireConfigLoader::new()
    ///     .with_yaml_str("ingest:\n  target_count: 3")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.ingest.target_count, 3);
    /// assert_eq!(config.ingest.concurrency, 4);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when absent, for env-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// ```
    /// use wedwire_config::{Freshness, WedwireConfigLoader};
    ///
    /// unsafe { std::env::set_var("DOC_SERP_KEY", "injected-from-env"); }
    ///
    /// let config = WedwireConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// search:
    ///   api_key: "${DOC_SERP_KEY}"
    ///   freshness: day
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.search.credentials().unwrap(), "injected-from-env");
    /// assert_eq!(config.search.freshness, Freshness::Day);
    ///
    /// unsafe { std::env::remove_var("DOC_SERP_KEY"); }
    /// ```
    pub fn load(self) -> Result<WedwireConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
            Environment::with_prefix("WEDWIRE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: WedwireConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
