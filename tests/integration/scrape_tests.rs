//! End-to-end scraping against a mock site

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xscrape::config::DestinationConfig;
use xscrape::crawler::{HttpDownloader, HttpPageRetriever, ScrapDownloadsService, ScrapTextService};
use xscrape::job::{HttpPolicy, Job, JobOverrides, ResourceInfo, ResourceType};
use xscrape::storage::{
    ContentStream, FileSystemResources, ResourceRepository, SqliteVisitedPages, StorageResult,
    VisitedPageRepository,
};
use xscrape::XPath;

/// File-system store that records which resource URLs were checked
struct RecordingResources {
    inner: FileSystemResources,
    checked: Mutex<Vec<String>>,
    written: Mutex<Vec<String>>,
}

impl RecordingResources {
    fn new(root: &Path, template: &str) -> Self {
        let inner = FileSystemResources::from_config(&DestinationConfig::FileSystem {
            root_folder: root.display().to_string(),
            path: template.to_string(),
        })
        .expect("Failed to build resource store");

        Self {
            inner,
            checked: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
        }
    }

    fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }

    fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceRepository for RecordingResources {
    async fn exists(&self, info: &ResourceInfo) -> StorageResult<bool> {
        self.checked.lock().unwrap().push(info.url.to_string());
        self.inner.exists(info).await
    }

    async fn upsert(&self, info: &ResourceInfo, content: ContentStream) -> StorageResult<()> {
        self.written.lock().unwrap().push(info.url.to_string());
        self.inner.upsert(info, content).await
    }

    async fn key(&self, info: &ResourceInfo) -> StorageResult<String> {
        self.inner.key(info).await
    }
}

fn policy() -> HttpPolicy {
    HttpPolicy {
        user_agent: "TestBot/1.0".to_string(),
        retries: 1,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        cache: false,
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Mounts pages `a` and `b` linking to each other, two images each
async fn mount_gallery(mock_server: &MockServer, page_fetches: u64) {
    for (name, other) in [("a", "b"), ("b", "a")] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(html(format!(
                r#"<html><body>
                <a href="/{other}">{other}</a>
                <img src="/img/{name}1.png">
                <img src="/img/{name}2.png">
                </body></html>"#,
                name = name,
                other = other
            )))
            .expect(page_fetches)
            .mount(mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path_regex(r"^/img/.+\.png$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .mount(mock_server)
        .await;
}

fn gallery_job(mock_server: &MockServer, root: &Path) -> Job {
    Job::new(
        "gallery",
        Url::parse(&format!("{}/a", mock_server.uri())).unwrap(),
        ResourceType::DownloadLink,
        XPath::parse("//img/@src").unwrap(),
        DestinationConfig::FileSystem {
            root_folder: root.display().to_string(),
            path: "{page_name}/{resource_name}".to_string(),
        },
    )
    .with_adjacency(XPath::parse("//a/@href").unwrap())
}

fn downloads_service(
    visited: Arc<SqliteVisitedPages>,
    resources: Arc<RecordingResources>,
) -> ScrapDownloadsService {
    ScrapDownloadsService::new(
        Arc::new(HttpPageRetriever::new(&policy()).unwrap()),
        visited,
        resources,
        Arc::new(HttpDownloader::new(&policy()).unwrap()),
    )
}

#[tokio::test]
async fn test_gallery_crawl_end_to_end() {
    let mock_server = MockServer::start().await;
    mount_gallery(&mock_server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let visited = Arc::new(SqliteVisitedPages::new(&dir.path().join("visited.db")).unwrap());
    let resources = Arc::new(RecordingResources::new(&out, "{page_name}/{resource_name}"));

    let job = gallery_job(&mock_server, &out);
    let summary = downloads_service(visited.clone(), resources.clone())
        .scrap(&job)
        .await
        .expect("Scrape failed");

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.written, 4);

    let page_a = Url::parse(&format!("{}/a", mock_server.uri())).unwrap();
    let page_b = Url::parse(&format!("{}/b", mock_server.uri())).unwrap();
    assert!(visited.exists(&page_a).await.unwrap());
    assert!(visited.exists(&page_b).await.unwrap());

    // Pages are never checked as resources
    let checked = resources.checked();
    assert_eq!(checked.len(), 4);
    assert!(!checked.contains(&page_a.to_string()));
    assert!(!checked.contains(&page_b.to_string()));

    let written: Vec<String> = resources
        .written()
        .iter()
        .map(|url| Url::parse(url).unwrap().path().to_string())
        .collect();
    assert_eq!(
        written,
        vec!["/img/a1.png", "/img/a2.png", "/img/b1.png", "/img/b2.png"]
    );

    for file in ["a/a1.png", "a/a2.png", "b/b1.png", "b/b2.png"] {
        assert_eq!(std::fs::read(out.join(file)).unwrap(), b"PNG", "{}", file);
    }
}

#[tokio::test]
async fn test_second_run_skips_visited_pages_and_existing_files() {
    let mock_server = MockServer::start().await;
    // `a` is the root and loads on both runs; `b` only on the first
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(
            r#"<a href="/b">b</a><img src="/img/a1.png">"#.to_string(),
        ))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html(r#"<img src="/img/b1.png">"#.to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let visited = Arc::new(SqliteVisitedPages::new(&dir.path().join("visited.db")).unwrap());
    let resources = Arc::new(RecordingResources::new(&out, "{page_name}/{resource_name}"));
    let job = gallery_job(&mock_server, &out);

    let first = downloads_service(visited.clone(), resources.clone())
        .scrap(&job)
        .await
        .unwrap();
    assert_eq!((first.pages, first.written), (2, 2));

    let second = downloads_service(visited.clone(), resources.clone())
        .scrap(&job)
        .await
        .unwrap();
    assert_eq!((second.pages, second.written, second.skipped), (1, 0, 1));
    assert_eq!(resources.written().len(), 2);
}

#[tokio::test]
async fn test_redirected_link_is_skipped_on_the_next_run() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(
            r#"<a href="/old">old</a><img src="/img/a1.png">"#.to_string(),
        ))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/new", mock_server.uri()).as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html(r#"<img src="/img/new1.png">"#.to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let database = dir.path().join("visited.db");
    let resources = Arc::new(RecordingResources::new(&out, "{page_name}/{resource_name}"));
    let job = gallery_job(&mock_server, &out);

    let visited = Arc::new(SqliteVisitedPages::new(&database).unwrap());
    let first = downloads_service(visited, resources.clone())
        .scrap(&job)
        .await
        .unwrap();
    assert_eq!(first.pages, 2);

    // Reopened, as a later invocation would
    let visited = Arc::new(SqliteVisitedPages::new(&database).unwrap());
    for page in ["/old", "/new"] {
        let url = Url::parse(&format!("{}{}", mock_server.uri(), page)).unwrap();
        assert!(visited.exists(&url).await.unwrap(), "{} not marked visited", page);
    }

    let second = downloads_service(visited, resources)
        .scrap(&job)
        .await
        .unwrap();
    assert_eq!(second.pages, 1);

    let old_fetches = mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == "/old")
        .count();
    assert_eq!(old_fetches, 1);
}

#[tokio::test]
async fn test_full_scan_revisits_every_page() {
    let mock_server = MockServer::start().await;
    mount_gallery(&mock_server, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let visited = Arc::new(SqliteVisitedPages::new_in_memory().unwrap());
    let resources = Arc::new(RecordingResources::new(&out, "{page_name}/{resource_name}"));
    let job = gallery_job(&mock_server, &out);

    downloads_service(visited.clone(), resources.clone())
        .scrap(&job)
        .await
        .unwrap();

    let full_scan = job.with_overrides(&JobOverrides {
        full_scan: true,
        ..Default::default()
    });
    let summary = downloads_service(visited, resources.clone())
        .scrap(&full_scan)
        .await
        .unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.skipped, 4);
    assert_eq!(resources.written().len(), 4);
}

#[tokio::test]
async fn test_text_crawl_writes_fragments() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(html(
            r#"<html><body>
            <h1>My Post</h1>
            <article><p>One</p><p>Two</p></article>
            </body></html>"#
                .to_string(),
        ))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let visited = Arc::new(SqliteVisitedPages::new_in_memory().unwrap());
    let resources = Arc::new(RecordingResources::new(
        &out,
        "{content://h1}/{resource_index:02}.txt",
    ));

    let job = Job::new(
        "posts",
        Url::parse(&format!("{}/post", mock_server.uri())).unwrap(),
        ResourceType::Text,
        XPath::parse("//article/p").unwrap(),
        DestinationConfig::FileSystem {
            root_folder: out.display().to_string(),
            path: "{content://h1}/{resource_index:02}.txt".to_string(),
        },
    );

    let service = ScrapTextService::new(
        Arc::new(HttpPageRetriever::new(&policy()).unwrap()),
        visited,
        resources.clone(),
    );
    let summary = service.scrap(&job).await.unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(std::fs::read_to_string(out.join("My Post/00.txt")).unwrap(), "One");
    assert_eq!(std::fs::read_to_string(out.join("My Post/01.txt")).unwrap(), "Two");
}
