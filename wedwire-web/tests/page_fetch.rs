use std::time::Duration;

use url::Url;
use wedwire_http::HttpError;
use wedwire_web::extract::{ContentExtractor, PageDocument};
use wedwire_web::fetch::{HttpPageFetcher, PageFetcher};
use wedwire_web::image::ImageResolver;
use wedwire_common::ImageHints;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html><head>
<title>Couple Says I Do On The Beach - Island Times</title>
<meta property="og:image" content="/media/beach.jpg">
</head><body><div class="entry-content">
<p>The couple said their vows on the sand at sunset, surrounded by family, friends, and a steel band.</p>
<p>Guests traveled from three continents, and the celebration continued until well after midnight.</p>
<p>The bride wore a custom gown, the groom a linen suit, and the cake had five tiers of coconut sponge.</p>
</div></body></html>"#;

#[tokio::test]
async fn fetches_html_and_feeds_extractor_and_resolver() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/story/beach"))
        .and(header("user-agent", "wedwire-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new("wedwire-test", Duration::from_secs(2), 0).unwrap();
    let url = Url::parse(&format!("{}/story/beach", server.uri())).unwrap();
    let html = fetcher.fetch(&url).await.unwrap();

    let doc = PageDocument::parse(&html, url);
    let content = ContentExtractor::new().extract_document(&doc).unwrap();
    assert_eq!(content.title, "Couple Says I Do On The Beach");
    assert!(content.content.contains("steel band"));

    let image = ImageResolver::default().resolve(&ImageHints::default(), Some(&content), Some(&doc));
    assert_eq!(image, Some(format!("{}/media/beach.jpg", server.uri())));
}

#[tokio::test]
async fn non_success_pages_are_fetch_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new("wedwire-test", Duration::from_secs(2), 0).unwrap();
    let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(410));
}

#[tokio::test]
async fn non_http_schemes_are_refused() {
    let fetcher = HttpPageFetcher::new("wedwire-test", Duration::from_secs(2), 0).unwrap();
    let url = Url::parse("file:///etc/hosts").unwrap();
    assert!(matches!(fetcher.fetch(&url).await, Err(HttpError::Url(_))));
}
