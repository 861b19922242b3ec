//! Best-image selection for an article.
//!
//! Candidates are tried in a fixed precedence (original, source/large,
//! embedded content images, thumbnail, Open Graph) and the first one that
//! passes [`validate_image_url`] wins. Finding no image is a normal outcome
//! and yields `None`.
use crate::extract::{PageDocument, image_source};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;
use url::form_urlencoded::byte_serialize;
use wedwire_common::{ExtractedContent, ImageCandidate, ImageHints, ImageTier};
use wedwire_config::ImageConfig;

/// Upper bound on client-side escalation steps after a failed image load.
pub const MAX_ESCALATIONS: usize = 2;

/// Why a candidate URL was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not an absolute url")]
    NotAbsolute,
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("data uri")]
    DataUri,
    #[error("contains 'undefined'")]
    Undefined,
    #[error("placeholder image")]
    Placeholder,
}

/// Gate every candidate passes before it can be returned.
pub fn validate_image_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.contains("data:") {
        return Err(ValidationError::DataUri);
    }
    if lowered.contains("undefined") {
        return Err(ValidationError::Undefined);
    }
    let url = Url::parse(trimmed).map_err(|_| ValidationError::NotAbsolute)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::NotAbsolute);
    }
    if PLACEHOLDER.is_match(url.path()) {
        return Err(ValidationError::Placeholder);
    }
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct ImageResolver {
    min_featured_dimension: u32,
    upgrade_size: u32,
    resize_proxy: Option<String>,
}

impl Default for ImageResolver {
    fn default() -> Self {
        Self::new(&ImageConfig::default())
    }
}

impl ImageResolver {
    pub fn new(cfg: &ImageConfig) -> Self {
        Self {
            min_featured_dimension: cfg.min_featured_dimension,
            upgrade_size: cfg.upgrade_size,
            resize_proxy: cfg
                .resize_proxy
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        }
    }

    /// Best image URL for an article, or `None` when nothing validates.
    ///
    /// `content` is the extracted body, if extraction succeeded; `page` is the
    /// fetched document, if the fetch succeeded. Either may be absent.
    pub fn resolve(
        &self,
        hints: &ImageHints,
        content: Option<&ExtractedContent>,
        page: Option<&PageDocument>,
    ) -> Option<String> {
        self.resolve_candidate(hints, content, page).map(|c| c.url)
    }

    /// Like [`resolve`](Self::resolve) but also reports which tier won.
    pub fn resolve_candidate(
        &self,
        hints: &ImageHints,
        content: Option<&ExtractedContent>,
        page: Option<&PageDocument>,
    ) -> Option<ImageCandidate> {
        let mut thumbnail = None;
        for candidate in hints.candidates() {
            let url = match validate_image_url(&candidate.url) {
                Ok(url) => url,
                Err(reason) => {
                    tracing::debug!(
                        target: "web.image",
                        tier = ?candidate.tier,
                        url = %candidate.url,
                        %reason,
                        "image.candidate.rejected"
                    );
                    continue;
                }
            };
            match candidate.tier {
                ImageTier::Original => return Some(accept(url, ImageTier::Original)),
                ImageTier::Thumbnail => thumbnail = Some(url),
                tier => {
                    let upgraded = self.upgrade_host(self.upgrade_size_params(url));
                    return Some(accept(upgraded, tier));
                }
            }
        }

        if let Some(url) = self.embedded(content, page) {
            return Some(accept(self.upgrade_host(url), ImageTier::Embedded));
        }
        if let Some(url) = thumbnail {
            return Some(accept(self.upgrade_host(url), ImageTier::Thumbnail));
        }
        page.and_then(open_graph_image)
            .map(|url| accept(self.upgrade_host(url), ImageTier::OpenGraph))
    }

    /// Escalation URLs for a client whose resolved image failed to load: the
    /// next lower-trust valid hint, then the resolved image through the resize
    /// proxy when one is configured. Never longer than [`MAX_ESCALATIONS`].
    pub fn fallback_chain(&self, hints: &ImageHints, resolved: &ImageCandidate) -> Vec<String> {
        let mut chain = Vec::with_capacity(MAX_ESCALATIONS);
        if let Some(next) = hints
            .candidates()
            .filter(|c| c.tier > resolved.tier)
            .filter_map(|c| validate_image_url(&c.url).ok())
            .map(String::from)
            .find(|url| *url != resolved.url)
        {
            chain.push(next);
        }
        if let Some(proxy) = self.resize_proxy.as_deref() {
            let encoded: String = byte_serialize(resolved.url.as_bytes()).collect();
            chain.push(format!("{proxy}{encoded}"));
        }
        chain.truncate(MAX_ESCALATIONS);
        chain
    }

    /// Scan embedded `<img>` elements, preferring ones that look featured.
    fn embedded(
        &self,
        content: Option<&ExtractedContent>,
        page: Option<&PageDocument>,
    ) -> Option<Url> {
        let fragment;
        let (html, base) = match (content, page) {
            (Some(c), page) => {
                fragment = Html::parse_fragment(&c.content);
                (&fragment, page.map(PageDocument::url))
            }
            (None, Some(page)) => (page.html(), Some(page.url())),
            (None, None) => return None,
        };

        let mut first_valid = None;
        for img in html.select(&IMAGES) {
            let Some(url) = self.embedded_url(img, base) else {
                continue;
            };
            if self.is_featured(img) {
                return Some(url);
            }
            if first_valid.is_none() {
                first_valid = Some(url);
            }
        }
        first_valid
    }

    fn embedded_url(&self, img: ElementRef<'_>, base: Option<&Url>) -> Option<Url> {
        let el = img.value();
        let class = el.attr("class").unwrap_or("");
        if DECORATIVE.is_match(class) {
            return None;
        }
        let raw = image_source(el)?;
        let absolute = match base {
            Some(base) => base.join(raw).ok()?.to_string(),
            None => raw.to_string(),
        };
        if DECORATIVE.is_match(&absolute) {
            return None;
        }
        validate_image_url(&absolute).ok()
    }

    fn is_featured(&self, img: ElementRef<'_>) -> bool {
        let el = img.value();
        match (
            el.attr("width").and_then(parse_dimension),
            el.attr("height").and_then(parse_dimension),
        ) {
            (Some(w), Some(h)) => w.min(h) > self.min_featured_dimension,
            _ => false,
        }
    }

    /// Rewrite size query parameters and WordPress size suffixes to request a
    /// large rendition.
    fn upgrade_size_params(&self, mut url: Url) -> Url {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        if pairs
            .iter()
            .any(|(k, _)| WIDTH_PARAMS.contains(&k.as_str()))
        {
            let size = self.upgrade_size.to_string();
            let rewritten: Vec<(String, String)> = pairs
                .into_iter()
                .filter(|(k, _)| !HEIGHT_PARAMS.contains(&k.as_str()))
                .map(|(k, v)| {
                    if WIDTH_PARAMS.contains(&k.as_str()) {
                        (k, size.clone())
                    } else {
                        (k, v)
                    }
                })
                .collect();
            url.query_pairs_mut().clear().extend_pairs(rewritten);
        }

        let path = url.path().to_string();
        let stripped = WP_SIZE_SUFFIX.replace(&path, "$ext");
        if stripped != path {
            url.set_path(&stripped);
        }
        url
    }

    /// Rewrite the size directive of hosts that serve any rendition on demand.
    fn upgrade_host(&self, mut url: Url) -> Url {
        let sized_host = url
            .host_str()
            .is_some_and(|h| SIZED_HOSTS.iter().any(|s| h == *s || h.ends_with(&format!(".{s}"))));
        if !sized_host {
            return url;
        }
        let path = url.path().to_string();
        let directive = format!("=s{}", self.upgrade_size);
        let segment = format!("/s{}/", self.upgrade_size);
        let upgraded = SIZE_DIRECTIVE.replace(&path, directive.as_str());
        let upgraded = SIZE_SEGMENT.replace(&upgraded, segment.as_str());
        if upgraded != path {
            url.set_path(&upgraded);
        }
        url
    }
}

fn accept(url: Url, tier: ImageTier) -> ImageCandidate {
    tracing::debug!(target: "web.image", ?tier, url = %url, "image.resolved");
    ImageCandidate {
        url: url.into(),
        tier,
    }
}

fn open_graph_image(page: &PageDocument) -> Option<Url> {
    OPEN_GRAPH_KEYS.iter().find_map(|key| {
        page.meta(&[*key])
            .and_then(|raw| page.absolutize(&raw))
            .and_then(|abs| validate_image_url(&abs).ok())
    })
}

fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

const OPEN_GRAPH_KEYS: &[&str] = &[
    "og:image",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];

const WIDTH_PARAMS: &[&str] = &["w", "width"];
const HEIGHT_PARAMS: &[&str] = &["h", "height"];

const SIZED_HOSTS: &[&str] = &["googleusercontent.com", "ggpht.com", "blogspot.com"];

static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("static selector parses"));

static DECORATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)icon|logo|avatar|badge|sprite|emoji|favicon").expect("static pattern compiles")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)placeholder|blank\.(gif|png)|spacer\.gif|pixel\.(gif|png)|transparent\.(gif|png)|1x1\.|no[-_]?image|default[-_]image",
    )
    .expect("static pattern compiles")
});

static WP_SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-\d{2,4}x\d{2,4}(?P<ext>\.(jpe?g|png|gif|webp))$")
        .expect("static pattern compiles")
});

static SIZE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=(s\d+|w\d+-h\d+)(-[a-z0-9-]+)?$").expect("static pattern compiles")
});

static SIZE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/s\d+(-c)?/").expect("static pattern compiles"));

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(
        original: Option<&str>,
        source: Option<&str>,
        large: Option<&str>,
        thumbnail: Option<&str>,
    ) -> ImageHints {
        ImageHints {
            original: original.map(String::from),
            source: source.map(String::from),
            large: large.map(String::from),
            thumbnail: thumbnail.map(String::from),
        }
    }

    fn content(html: &str) -> ExtractedContent {
        ExtractedContent {
            title: "t".into(),
            content: html.into(),
            excerpt: None,
            byline: None,
            site_name: None,
            text_length: 0,
        }
    }

    #[test]
    fn original_is_used_as_is() {
        let r = ImageResolver::default();
        let h = hints(
            Some("https://cdn.example/full.jpg?w=200"),
            Some("https://cdn.example/src.jpg"),
            None,
            Some("https://cdn.example/t.jpg"),
        );
        let got = r.resolve_candidate(&h, None, None).unwrap();
        assert_eq!(got.url, "https://cdn.example/full.jpg?w=200");
        assert_eq!(got.tier, ImageTier::Original);
    }

    #[test]
    fn higher_tier_beats_thumbnail() {
        let r = ImageResolver::default();
        let h = hints(
            None,
            None,
            Some("https://cdn.example/large.jpg"),
            Some("https://cdn.example/t.jpg"),
        );
        assert_eq!(
            r.resolve(&h, None, None).as_deref(),
            Some("https://cdn.example/large.jpg")
        );
    }

    #[test]
    fn thumbnail_only_result_uses_thumbnail() {
        let r = ImageResolver::default();
        let h = hints(None, None, None, Some("https://a.com/t.jpg"));
        let got = r.resolve_candidate(&h, None, None).unwrap();
        assert_eq!(got.url, "https://a.com/t.jpg");
        assert_eq!(got.tier, ImageTier::Thumbnail);
    }

    #[test]
    fn data_uris_are_never_returned() {
        let r = ImageResolver::default();
        let h = hints(
            Some("data:image/png;base64,iVBORw0KGgo="),
            Some("https://cdn.example/redirect?to=data:image/png"),
            None,
            Some("https://a.com/t.jpg"),
        );
        let got = r.resolve(&h, None, None).unwrap();
        assert!(!got.contains("data:"));
        assert_eq!(got, "https://a.com/t.jpg");
    }

    #[test]
    fn validation_reasons() {
        assert_eq!(
            validate_image_url("data:image/gif;base64,R0lG"),
            Err(ValidationError::DataUri)
        );
        assert_eq!(
            validate_image_url("https://a.com/undefined"),
            Err(ValidationError::Undefined)
        );
        assert_eq!(
            validate_image_url("/relative.jpg"),
            Err(ValidationError::NotAbsolute)
        );
        assert!(matches!(
            validate_image_url("ftp://a.com/x.jpg"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
        assert_eq!(
            validate_image_url("https://a.com/img/placeholder.png"),
            Err(ValidationError::Placeholder)
        );
        assert_eq!(
            validate_image_url("https://a.com/spacer.gif"),
            Err(ValidationError::Placeholder)
        );
        assert!(validate_image_url("https://a.com/wedding.jpg").is_ok());
    }

    #[test]
    fn size_params_are_upgraded() {
        let r = ImageResolver::default();
        let h = hints(
            None,
            Some("https://cdn.example/a.jpg?w=300&h=200&q=80"),
            None,
            None,
        );
        assert_eq!(
            r.resolve(&h, None, None).as_deref(),
            Some("https://cdn.example/a.jpg?w=1600&q=80")
        );
    }

    #[test]
    fn wordpress_size_suffix_is_stripped() {
        let r = ImageResolver::default();
        let h = hints(
            None,
            None,
            Some("https://blog.example/wp-content/uploads/2024/06/vows-300x200.jpg"),
            None,
        );
        assert_eq!(
            r.resolve(&h, None, None).as_deref(),
            Some("https://blog.example/wp-content/uploads/2024/06/vows.jpg")
        );
    }

    #[test]
    fn sized_hosts_request_large_renditions() {
        let r = ImageResolver::default();
        let h = hints(
            None,
            Some("https://lh3.googleusercontent.com/abc123=s120-c"),
            None,
            None,
        );
        assert_eq!(
            r.resolve(&h, None, None).as_deref(),
            Some("https://lh3.googleusercontent.com/abc123=s1600")
        );

        let h = hints(
            None,
            None,
            None,
            Some("https://1.bp.blogspot.com/-x/AAAA/s320/ring.jpg"),
        );
        assert_eq!(
            r.resolve(&h, None, None).as_deref(),
            Some("https://1.bp.blogspot.com/-x/AAAA/s1600/ring.jpg")
        );
    }

    #[test]
    fn embedded_prefers_featured_and_skips_decorative() {
        let r = ImageResolver::default();
        let body = content(
            r#"<div>
<img src="https://a.com/static/site-logo.png" width="800" height="800">
<img src="https://a.com/small.jpg" width="120" height="90">
<img src="https://a.com/round.jpg" class="author-avatar" width="900" height="900">
<img src="https://a.com/hero.jpg" width="1200" height="800">
</div>"#,
        );
        let got = r
            .resolve_candidate(&ImageHints::default(), Some(&body), None)
            .unwrap();
        assert_eq!(got.url, "https://a.com/hero.jpg");
        assert_eq!(got.tier, ImageTier::Embedded);
    }

    #[test]
    fn embedded_falls_back_to_first_valid() {
        let r = ImageResolver::default();
        let body = content(
            r#"<div><img src="data:image/gif;base64,R0lG"><img src="https://a.com/one.jpg"><img src="https://a.com/two.jpg"></div>"#,
        );
        assert_eq!(
            r.resolve(&ImageHints::default(), Some(&body), None).as_deref(),
            Some("https://a.com/one.jpg")
        );
    }

    #[test]
    fn embedded_beats_thumbnail() {
        let r = ImageResolver::default();
        let body = content(r#"<p><img src="https://a.com/inline.jpg"></p>"#);
        let h = hints(None, None, None, Some("https://a.com/t.jpg"));
        assert_eq!(
            r.resolve(&h, Some(&body), None).as_deref(),
            Some("https://a.com/inline.jpg")
        );
    }

    #[test]
    fn open_graph_is_the_last_resort() {
        let r = ImageResolver::default();
        let page = PageDocument::parse(
            r#"<html><head><meta property="og:image" content="/media/cover.jpg"></head><body><p>hi</p></body></html>"#,
            Url::parse("https://news.example/story/1").unwrap(),
        );
        let got = r
            .resolve_candidate(&ImageHints::default(), None, Some(&page))
            .unwrap();
        assert_eq!(got.url, "https://news.example/media/cover.jpg");
        assert_eq!(got.tier, ImageTier::OpenGraph);
    }

    #[test]
    fn open_graph_on_sized_host_is_upgraded() {
        let r = ImageResolver::default();
        let page = PageDocument::parse(
            r#"<html><head><meta property="og:image" content="https://lh3.googleusercontent.com/abc=s120-c"></head><body></body></html>"#,
            Url::parse("https://news.example/story/1").unwrap(),
        );
        let got = r
            .resolve_candidate(&ImageHints::default(), None, Some(&page))
            .unwrap();
        assert_eq!(got.url, "https://lh3.googleusercontent.com/abc=s1600");
        assert_eq!(got.tier, ImageTier::OpenGraph);
    }

    #[test]
    fn page_images_are_scanned_when_extraction_failed() {
        let r = ImageResolver::default();
        let page = PageDocument::parse(
            r#"<html><body><img src="/photos/kiss.jpg" width="640" height="480"></body></html>"#,
            Url::parse("https://news.example/story/1").unwrap(),
        );
        assert_eq!(
            r.resolve(&ImageHints::default(), None, Some(&page)).as_deref(),
            Some("https://news.example/photos/kiss.jpg")
        );
    }

    #[test]
    fn nothing_valid_is_none() {
        let r = ImageResolver::default();
        let h = hints(
            Some("undefined"),
            Some("data:image/png;base64,AAAA"),
            Some("/relative.jpg"),
            Some("https://a.com/blank.gif"),
        );
        assert_eq!(r.resolve(&h, None, None), None);
    }

    #[test]
    fn fallback_chain_is_bounded() {
        let r = ImageResolver::new(&ImageConfig {
            resize_proxy: Some("https://proxy.example/?url=".into()),
            ..ImageConfig::default()
        });
        let h = hints(
            None,
            Some("https://a.com/src.jpg"),
            Some("https://a.com/large.jpg"),
            Some("https://a.com/t.jpg"),
        );
        let resolved = r.resolve_candidate(&h, None, None).unwrap();
        assert_eq!(resolved.tier, ImageTier::Source);

        let chain = r.fallback_chain(&h, &resolved);
        assert_eq!(
            chain,
            vec![
                "https://a.com/large.jpg".to_string(),
                "https://proxy.example/?url=https%3A%2F%2Fa.com%2Fsrc.jpg".to_string(),
            ]
        );
        assert_eq!(chain, r.fallback_chain(&h, &resolved));
    }

    #[test]
    fn fallback_chain_without_lower_tiers_or_proxy_is_empty() {
        let r = ImageResolver::default();
        let h = hints(None, None, None, Some("https://a.com/t.jpg"));
        let resolved = r.resolve_candidate(&h, None, None).unwrap();
        assert!(r.fallback_chain(&h, &resolved).is_empty());
    }
}
