use wedwire_common::WedwireError;
use wedwire_config::{Freshness, SearchConfig};
use wedwire_web::serp::{NewsQuery, NewsSearch, SerpApi};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> SearchConfig {
    SearchConfig {
        api_key: Some("test-key".into()),
        endpoint: server.uri(),
        country: Some("us".into()),
        ..SearchConfig::default()
    }
}

#[tokio::test]
async fn sends_news_mode_params_and_maps_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("engine", "google"))
        .and(query_param("tbm", "nws"))
        .and(query_param("q", "wedding news celebrity marriage"))
        .and(query_param("num", "20"))
        .and(query_param("tbs", "qdr:w"))
        .and(query_param("hl", "en"))
        .and(query_param("gl", "us"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "search_metadata": { "id": "abc", "status": "Success" },
            "news_results": [
                {
                    "position": 1,
                    "title": "Pop Star Weds Longtime Partner",
                    "link": "https://news.example/pop-star-weds",
                    "snippet": "An intimate ceremony...",
                    "source": "Example News",
                    "date": "3 hours ago",
                    "thumbnail": "https://news.example/t.jpg"
                },
                {
                    "position": 2,
                    "title": "Royal Engagement Announced",
                    "link": "https://royal.example/engaged",
                    "source": { "name": "Royal Desk" },
                    "original": "https://royal.example/full.jpg"
                },
                { "position": 3, "title": "No link here" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = SerpApi::new(&config(&server)).unwrap();
    let cfg = config(&server);
    let got = api.search(&NewsQuery::from(&cfg)).await.unwrap();

    assert_eq!(got.len(), 2);
    assert_eq!(got[0].title, "Pop Star Weds Longtime Partner");
    assert_eq!(got[0].source, "Example News");
    assert_eq!(got[0].published.as_deref(), Some("3 hours ago"));
    assert_eq!(
        got[0].images.thumbnail.as_deref(),
        Some("https://news.example/t.jpg")
    );
    assert_eq!(got[1].source, "Royal Desk");
    assert_eq!(
        got[1].images.original.as_deref(),
        Some("https://royal.example/full.jpg")
    );
}

#[tokio::test]
async fn any_freshness_omits_tbs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "news_results": [ { "title": "A", "link": "https://a.example/1" } ]
        })))
        .mount(&server)
        .await;

    let cfg = SearchConfig {
        freshness: Freshness::Any,
        ..config(&server)
    };
    let api = SerpApi::new(&cfg).unwrap();
    api.search(&NewsQuery::from(&cfg)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query_pairs().all(|(k, _)| k != "tbs"));
}

#[tokio::test]
async fn provider_error_body_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "error": "Invalid API key." })),
        )
        .mount(&server)
        .await;

    let cfg = config(&server);
    let err = SerpApi::new(&cfg)
        .unwrap()
        .search(&NewsQuery::from(&cfg))
        .await
        .unwrap_err();
    assert!(matches!(err, WedwireError::Provider(ref m) if m.contains("Invalid API key")));
}

#[tokio::test]
async fn non_success_status_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "Invalid API key."
        })))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let err = SerpApi::new(&cfg)
        .unwrap()
        .search(&NewsQuery::from(&cfg))
        .await
        .unwrap_err();
    assert!(matches!(err, WedwireError::Provider(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_results_after_filtering_are_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "news_results": [
                { "title": "No link" },
                { "title": "Bad scheme", "link": "javascript:void(0)" }
            ]
        })))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let err = SerpApi::new(&cfg)
        .unwrap()
        .search(&NewsQuery::from(&cfg))
        .await
        .unwrap_err();
    assert!(matches!(err, WedwireError::Provider(_)));
}

#[tokio::test]
async fn missing_news_results_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "search_metadata": { "status": "Success" }
        })))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let err = SerpApi::new(&cfg)
        .unwrap()
        .search(&NewsQuery::from(&cfg))
        .await
        .unwrap_err();
    assert!(matches!(err, WedwireError::Provider(_)));
}

#[test]
fn blank_key_is_rejected_before_any_request() {
    let cfg = SearchConfig {
        api_key: Some("   ".into()),
        ..SearchConfig::default()
    };
    assert!(matches!(SerpApi::new(&cfg), Err(WedwireError::Config(_))));
}
