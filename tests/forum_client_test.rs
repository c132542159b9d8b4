//! Integration tests for fetching and classifying thread pages over HTTP.

mod common;

use std::sync::Arc;
use std::time::Duration;

use forum_thread_notifier::error::ErrorKind;
use forum_thread_notifier::forum::{FetchError, ForumClient, PageFetcher};
use forum_thread_notifier::poll::SmartFetcher;
use forum_thread_notifier::retry::RetryPolicy;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::thread_page;

const THREAD_PATH: &str = "/threads/trip-report.9/";

fn client(attempts: u32) -> ForumClient {
    ForumClient::new(Duration::from_secs(5), RetryPolicy::immediate(attempts))
        .expect("Failed to build client")
}

#[tokio::test]
async fn test_fetch_and_parse_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(thread_page(
            "Trip Report",
            &[("1", "alice", "Leaving tomorrow"), ("2", "bob", "Safe travels")],
            1,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let page = client(3).fetch_page(&url).await.unwrap();

    assert_eq!(page.title, "Trip Report");
    assert!(page.is_last());
    assert_eq!(page.posts.len(), 2);
    assert_eq!(page.posts[1].author, "bob");
    assert_eq!(page.posts[1].content, "Safe travels");
    assert_eq!(page.posts[1].url, format!("{url}#post-2"));
}

#[tokio::test]
async fn test_forbidden_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let err = client(5).fetch_page(&url).await.unwrap_err();

    assert!(err.is_forbidden());
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(thread_page(
            "Trip Report",
            &[("1", "alice", "Back online")],
            1,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let page = client(5).fetch_page(&url).await.unwrap();
    assert_eq!(page.posts[0].content, "Back online");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let err = client(3).fetch_page(&url).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[tokio::test]
async fn test_missing_thread_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let err = client(5).fetch_page(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Permanent { .. }));
}

#[tokio::test]
async fn test_page_without_posts_is_content_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Log in to continue</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}{THREAD_PATH}", server.uri());
    let err = client(5).fetch_page(&url).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Content);
}

#[tokio::test]
async fn test_smart_fetch_over_http_uses_three_pages() {
    let server = MockServer::start().await;
    let pages = [
        (THREAD_PATH.to_string(), 1, [("1", "a"), ("2", "b")]),
        (format!("{THREAD_PATH}page-2"), 2, [("3", "c"), ("4", "d")]),
        (format!("{THREAD_PATH}page-3"), 3, [("5", "e"), ("6", "f")]),
    ];
    for (page_path, number, posts) in &pages {
        let posts: Vec<(&str, &str, &str)> =
            posts.iter().map(|(id, text)| (*id, "rider", *text)).collect();
        Mock::given(method("GET"))
            .and(path(page_path.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(thread_page("Long Thread", &posts, *number, 3)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let planner = SmartFetcher::new(Arc::new(client(1)));
    let url = format!("{}{THREAD_PATH}", server.uri());
    let fetched = planner.fetch(&url, &["3"]).await.unwrap();

    let ids: Vec<&str> = fetched.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "4", "5", "6"]);
    assert_eq!(fetched.pages_fetched, 3);
    assert_eq!(fetched.title, "Long Thread");
}
