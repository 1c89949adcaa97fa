//! HTTP retrieval against a mock server

use futures::TryStreamExt;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xscrape::crawler::{DownloadStreamProvider, HttpDownloader, HttpPageRetriever, PageRetriever};
use xscrape::job::HttpPolicy;
use xscrape::ScrapError;

fn policy(cache: bool) -> HttpPolicy {
    HttpPolicy {
        user_agent: "TestBot/1.0".to_string(),
        retries: 2,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        cache,
    }
}

fn page_url(server: &MockServer, page: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page)).expect("Failed to build URL")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<p>finally</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(false)).unwrap();
    let page = retriever
        .get_page(&page_url(&mock_server, "/flaky"))
        .await
        .expect("Page should load after retries");

    assert_eq!(page.body(), "<p>finally</p>");
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let mock_server = MockServer::start().await;

    // One attempt plus two retries
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(false)).unwrap();
    let result = retriever.get_page(&page_url(&mock_server, "/down")).await;

    assert!(matches!(result, Err(ScrapError::HttpStatus { status: 500, .. })));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(false)).unwrap();
    let result = retriever.get_page(&page_url(&mock_server, "/missing")).await;

    assert!(matches!(result, Err(ScrapError::HttpStatus { status: 404, .. })));
}

#[tokio::test]
async fn test_cache_serves_repeated_gets_and_reload_bypasses_it() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(html("<p>cached</p>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(true)).unwrap();
    let url = page_url(&mock_server, "/cached");

    let first = retriever.get_page(&url).await.unwrap();
    let second = retriever.get_page(&url).await.unwrap();
    assert_eq!(first, second);

    let reloaded = retriever.reload(&first).await.unwrap();
    assert_eq!(reloaded.url(), first.url());
}

#[tokio::test]
async fn test_without_cache_every_get_fetches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(html("<p>plain</p>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(false)).unwrap();
    let url = page_url(&mock_server, "/plain");

    retriever.get_page(&url).await.unwrap();
    retriever.get_page(&url).await.unwrap();
}

#[tokio::test]
async fn test_redirect_changes_page_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/new", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<p>moved</p>"))
        .mount(&mock_server)
        .await;

    let retriever = HttpPageRetriever::new(&policy(false)).unwrap();
    let page = retriever.get_page(&page_url(&mock_server, "/old")).await.unwrap();

    assert_eq!(page.url().path(), "/new");
    assert_eq!(page.requested_url().path(), "/old");
    assert!(page.is_redirected());
}

#[tokio::test]
async fn test_downloader_streams_body() {
    let mock_server = MockServer::start().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&mock_server)
        .await;

    let downloader = HttpDownloader::new(&policy(false)).unwrap();
    let chunks: Vec<_> = downloader
        .get_stream(&page_url(&mock_server, "/file.bin"))
        .await
        .unwrap()
        .try_collect()
        .await
        .expect("Body should stream completely");

    let received: Vec<u8> = chunks.iter().flat_map(|chunk| chunk.iter().copied()).collect();
    assert_eq!(received, body);
}

#[tokio::test]
async fn test_downloader_status_errors_fail_before_streaming() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone.bin"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&mock_server)
        .await;

    let downloader = HttpDownloader::new(&policy(false)).unwrap();
    let result = downloader
        .get_stream(&page_url(&mock_server, "/gone.bin"))
        .await;

    assert!(matches!(result, Err(ScrapError::HttpStatus { status: 410, .. })));
}
