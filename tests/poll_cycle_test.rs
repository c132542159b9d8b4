//! End-to-end poll cycles against a mock forum, the filesystem store and a
//! recording mail provider.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use forum_thread_notifier::email::{EmailError, MailProvider, Sender};
use forum_thread_notifier::forum::ForumClient;
use forum_thread_notifier::models::{Subscription, Thread};
use forum_thread_notifier::poll::{CycleOutcome, CycleStats, Scheduler, SmartFetcher};
use forum_thread_notifier::retry::RetryPolicy;
use forum_thread_notifier::store::{LocalStore, Store};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{thread_page, token};

const THREAD_PATH: &str = "/threads/trip-report.9/";

#[derive(Default)]
struct RecordingProvider {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl MailProvider for RecordingProvider {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), html_body.to_string()));
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    store: Arc<LocalStore>,
    provider: Arc<RecordingProvider>,
    scheduler: Scheduler,
    _temp_dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(LocalStore::new(temp_dir.path()).await.unwrap());
        let provider = Arc::new(RecordingProvider::default());

        let fetcher = ForumClient::new(Duration::from_secs(5), RetryPolicy::immediate(1)).unwrap();
        let scheduler = Scheduler::new(
            SmartFetcher::new(Arc::new(fetcher)),
            store.clone(),
            Arc::new(Sender::new(provider.clone(), "https://notify.example.com")),
            10,
            CancellationToken::new(),
        );

        Self {
            server,
            store,
            provider,
            scheduler,
            _temp_dir: temp_dir,
        }
    }

    fn thread_url(&self) -> String {
        format!("{}{THREAD_PATH}", self.server.uri())
    }

    async fn serve_posts(&self, posts: &[(&str, &str, &str)]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(THREAD_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(thread_page("Trip Report", posts, 1, 1)),
            )
            .mount(&self.server)
            .await;
    }

    async fn subscribe(&self, n: u8) {
        let mut sub = Subscription::new(format!("reader{n}@example.com"), token(n));
        sub.watch(Thread::new(self.thread_url(), "9", Utc::now()));
        self.store.save(&sub).await.unwrap();
    }

    async fn thread(&self, n: u8) -> Thread {
        let subs = self.store.list().await.unwrap();
        subs.into_iter()
            .find(|s| s.token == token(n))
            .expect("subscription exists")
            .threads["9"]
            .clone()
    }

    /// Pretend every stored thread was last polled a day ago.
    async fn make_due(&self) {
        for mut sub in self.store.list().await.unwrap() {
            for thread in sub.threads.values_mut() {
                thread.last_polled_at = thread
                    .last_polled_at
                    .map(|t| t - chrono::Duration::days(1));
            }
            self.store.save(&sub).await.unwrap();
        }
    }

    async fn cycle(&self) -> CycleStats {
        match self.scheduler.run_cycle().await.unwrap() {
            CycleOutcome::Completed(stats) => stats,
            CycleOutcome::Skipped => panic!("cycle was skipped"),
        }
    }
}

#[tokio::test]
async fn test_first_cycle_records_baseline_then_notifies() {
    let harness = Harness::new().await;
    harness
        .serve_posts(&[("1", "alice", "Day one"), ("2", "bob", "Day two")])
        .await;
    harness.subscribe(1).await;

    let stats = harness.cycle().await;
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.notified, 0);
    assert!(harness.provider.sent.lock().unwrap().is_empty());

    let thread = harness.thread(1).await;
    assert_eq!(thread.last_post_id, "2");
    assert_eq!(thread.title, "Trip Report");
    assert!(thread.last_polled_at.is_some());
    assert!(thread.last_post_time.is_some());

    // Not due yet: nothing fetched
    let stats = harness.cycle().await;
    assert_eq!(stats.skipped_not_due, 1);

    harness
        .serve_posts(&[
            ("1", "alice", "Day one"),
            ("2", "bob", "Day two"),
            ("3", "carol", "Day three <em>photos</em>"),
        ])
        .await;
    harness.make_due().await;

    let stats = harness.cycle().await;
    assert_eq!(stats.notified, 1);

    let sent = harness.provider.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (to, subject, body) = &sent[0];
    assert_eq!(to, "reader1@example.com");
    assert_eq!(subject, "Trip Report");
    assert!(body.contains("Day three"));
    assert!(!body.contains("Day two"));
    assert!(body.contains(&format!("https://notify.example.com/manage?token={}", token(1))));

    assert_eq!(harness.thread(1).await.last_post_id, "3");
}

#[tokio::test]
async fn test_shared_thread_fetched_once_per_cycle() {
    let harness = Harness::new().await;
    harness.serve_posts(&[("1", "alice", "Hello")]).await;
    for n in 1..=3 {
        harness.subscribe(n).await;
    }

    let stats = harness.cycle().await;

    assert_eq!(stats.subscriptions, 3);
    assert_eq!(stats.groups, 1);
    let requests = harness.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    for n in 1..=3 {
        assert_eq!(harness.thread(n).await.last_post_id, "1");
    }
}

#[tokio::test]
async fn test_unreachable_thread_is_retried_next_cycle() {
    let harness = Harness::new().await;
    harness.server.reset().await;
    Mock::given(method("GET"))
        .and(path(THREAD_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&harness.server)
        .await;
    harness.subscribe(1).await;

    let stats = harness.cycle().await;
    assert_eq!(stats.fetch_failures, 1);
    assert!(harness.thread(1).await.is_new());

    harness.serve_posts(&[("1", "alice", "Hello")]).await;
    let stats = harness.cycle().await;
    assert_eq!(stats.checked, 1);
    assert_eq!(harness.thread(1).await.last_post_id, "1");
}
