//! Bounded-request fetching of the newest posts in a paginated thread.
//!
//! Threads can run to hundreds of pages. Posts are chronological across pages,
//! so everything newer than a subscriber's marker sits at the tail; this never
//! needs more than three page requests no matter how long the thread is.

use std::sync::Arc;

use tracing::{info, warn};

use crate::forum::{page_url, FetchError, Page, PageFetcher};
use crate::models::Post;

/// Result of a smart fetch: the candidate posts (oldest first) and the thread title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedThread {
    pub posts: Vec<Post>,
    pub title: String,
    /// Page requests it took to build the candidate set.
    pub pages_fetched: u32,
}

impl FetchedThread {
    #[must_use]
    pub fn latest(&self) -> Option<&Post> {
        self.posts.last()
    }
}

/// Plans and performs the page fetches for one thread check.
#[derive(Clone)]
pub struct SmartFetcher {
    fetcher: Arc<dyn PageFetcher>,
}

impl SmartFetcher {
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch just enough of the thread at `thread_url` to see every post after
    /// each of `markers`, the last-seen post ids of everyone watching it.
    ///
    /// An empty marker (a first check) or an empty list always widens the
    /// window to the two newest pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the first or last page cannot be fetched.
    pub async fn fetch(
        &self,
        thread_url: &str,
        markers: &[&str],
    ) -> Result<FetchedThread, FetchError> {
        info!(url = %thread_url, markers = ?markers, "Starting smart thread fetch");

        let first = self.fetcher.fetch_page(&page_url(thread_url, 1)).await?;
        info!(
            title = %first.title,
            current_page = first.current_page,
            last_page = first.last_page,
            posts_on_page = first.posts.len(),
            "First page fetched"
        );

        if first.is_last() {
            return Ok(FetchedThread {
                posts: first.posts,
                title: first.title,
                pages_fetched: 1,
            });
        }

        let last_page_number = first.last_page;
        let last = self
            .fetcher
            .fetch_page(&page_url(thread_url, last_page_number))
            .await?;
        info!(
            page_number = last_page_number,
            posts_on_page = last.posts.len(),
            "Last page fetched"
        );

        let missing: Vec<&str> = markers
            .iter()
            .copied()
            .filter(|marker| !contains_post(&last.posts, marker))
            .collect();
        if !markers.is_empty() && missing.is_empty() {
            return Ok(FetchedThread {
                posts: last.posts,
                title: first.title,
                pages_fetched: 2,
            });
        }

        // Some marker is not on the last page: either more than a page of new
        // posts accumulated or this is a first check. Look one page further back.
        let previous_number = last_page_number - 1;
        let (previous, pages_fetched) = if previous_number <= 1 {
            (Some(first.posts), 2)
        } else {
            info!(
                missing_markers = ?missing,
                fetching_page = previous_number,
                "Last seen post not on last page, fetching previous page"
            );
            match self
                .fetcher
                .fetch_page(&page_url(thread_url, previous_number))
                .await
            {
                Ok(Page { posts, .. }) => (Some(posts), 3),
                Err(e) => {
                    warn!(
                        page_number = previous_number,
                        error = %e,
                        "Failed to fetch previous page, continuing with last page only"
                    );
                    (None, 3)
                }
            }
        };

        let posts = match previous {
            Some(mut posts) => {
                posts.extend(last.posts);
                posts
            }
            None => last.posts,
        };

        for marker in missing
            .iter()
            .filter(|marker| !marker.is_empty() && !contains_post(&posts, marker))
        {
            warn!(
                url = %thread_url,
                last_seen_post = %marker,
                posts_fetched = posts.len(),
                "Last seen post not found in lookback window, all fetched posts will be treated as new"
            );
        }

        Ok(FetchedThread {
            posts,
            title: first.title,
            pages_fetched,
        })
    }

    /// Fetch the newest post of a thread, e.g. to verify a thread before subscribing.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be fetched.
    pub async fn latest_post(&self, thread_url: &str) -> Result<(Post, String), FetchError> {
        let fetched = self.fetch(thread_url, &[]).await?;
        let title = fetched.title;
        fetched
            .posts
            .into_iter()
            .last()
            .map(|post| (post, title))
            .ok_or_else(|| FetchError::Content {
                url: thread_url.to_string(),
            })
    }
}

fn contains_post(posts: &[Post], id: &str) -> bool {
    !id.is_empty() && posts.iter().any(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    const THREAD: &str = "https://forum.example.com/threads/long.1/";
    const POSTS_PER_PAGE: u32 = 20;

    /// Serves a synthetic thread of `pages` pages and records every requested URL.
    struct FakeThread {
        pages: u32,
        failing: HashMap<String, FetchError>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeThread {
        fn new(pages: u32) -> Self {
            Self {
                pages,
                failing: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn post_id(page: u32, index: u32) -> String {
        ((page - 1) * POSTS_PER_PAGE + index + 1).to_string()
    }

    #[async_trait]
    impl PageFetcher for FakeThread {
        async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some(err) = self.failing.get(url) {
                return Err(err.clone());
            }
            let number = url
                .rsplit_once("/page-")
                .map_or(1, |(_, n)| n.parse::<u32>().unwrap());
            let posts = (0..POSTS_PER_PAGE)
                .map(|i| Post {
                    id: post_id(number, i),
                    author: "rider".to_string(),
                    content: format!("post {i} on page {number}"),
                    html_content: None,
                    timestamp: None,
                    url: format!("{url}#post-{}", post_id(number, i)),
                })
                .collect();
            Ok(Page {
                posts,
                title: "Long Thread".to_string(),
                current_page: number,
                last_page: if self.pages > 1 { self.pages } else { 0 },
            })
        }
    }

    #[tokio::test]
    async fn test_single_page_thread_uses_one_request() {
        let fake = Arc::new(FakeThread::new(1));
        let planner = SmartFetcher::new(fake.clone());

        let fetched = planner.fetch(THREAD, &["5"]).await.unwrap();

        assert_eq!(fake.requests(), vec![THREAD.to_string()]);
        assert_eq!(fetched.pages_fetched, 1);
        assert_eq!(fetched.posts.len(), POSTS_PER_PAGE as usize);
        assert_eq!(fetched.title, "Long Thread");
    }

    #[tokio::test]
    async fn test_marker_on_last_page_uses_two_requests() {
        let fake = Arc::new(FakeThread::new(300));
        let planner = SmartFetcher::new(fake.clone());

        let marker = post_id(300, 4);
        let fetched = planner.fetch(THREAD, &[marker.as_str()]).await.unwrap();

        assert_eq!(
            fake.requests(),
            vec![THREAD.to_string(), format!("{}page-300", THREAD)]
        );
        assert_eq!(fetched.pages_fetched, 2);
        assert_eq!(fetched.posts.first().unwrap().id, post_id(300, 0));
    }

    #[tokio::test]
    async fn test_marker_further_back_uses_three_requests() {
        let fake = Arc::new(FakeThread::new(300));
        let planner = SmartFetcher::new(fake.clone());

        // Marker only exists on page 298
        let marker = post_id(298, 10);
        let fetched = planner.fetch(THREAD, &[marker.as_str()]).await.unwrap();

        assert_eq!(
            fake.requests(),
            vec![
                THREAD.to_string(),
                format!("{}page-300", THREAD),
                format!("{}page-299", THREAD),
            ]
        );
        assert_eq!(fetched.pages_fetched, 3);

        let expected: Vec<String> = (299..=300)
            .flat_map(|page| (0..POSTS_PER_PAGE).map(move |i| post_id(page, i)))
            .collect();
        let ids: Vec<String> = fetched.posts.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_any_marker_off_last_page_widens_window() {
        let fake = Arc::new(FakeThread::new(300));
        let planner = SmartFetcher::new(fake.clone());

        let recent = post_id(300, 4);
        let behind = post_id(299, 15);
        let fetched = planner
            .fetch(THREAD, &[recent.as_str(), behind.as_str()])
            .await
            .unwrap();

        assert_eq!(fake.requests().len(), 3);
        assert_eq!(fetched.pages_fetched, 3);
        assert!(fetched.posts.iter().any(|p| p.id == behind));
        assert!(fetched.posts.iter().any(|p| p.id == recent));
    }

    #[tokio::test]
    async fn test_all_markers_on_last_page_use_two_requests() {
        let fake = Arc::new(FakeThread::new(300));
        let planner = SmartFetcher::new(fake.clone());

        let a = post_id(300, 1);
        let b = post_id(300, 9);
        let fetched = planner.fetch(THREAD, &[a.as_str(), b.as_str()]).await.unwrap();

        assert_eq!(fake.requests().len(), 2);
        assert_eq!(fetched.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_first_check_fetches_two_page_window() {
        let fake = Arc::new(FakeThread::new(50));
        let planner = SmartFetcher::new(fake.clone());

        let fetched = planner.fetch(THREAD, &[""]).await.unwrap();

        assert_eq!(fake.requests().len(), 3);
        assert_eq!(fetched.posts.len(), 2 * POSTS_PER_PAGE as usize);
        assert_eq!(fetched.latest().unwrap().id, post_id(50, POSTS_PER_PAGE - 1));
    }

    #[tokio::test]
    async fn test_two_page_thread_reuses_first_page() {
        let fake = Arc::new(FakeThread::new(2));
        let planner = SmartFetcher::new(fake.clone());

        let fetched = planner.fetch(THREAD, &["missing"]).await.unwrap();

        assert_eq!(fake.requests().len(), 2);
        assert_eq!(fetched.posts.len(), 2 * POSTS_PER_PAGE as usize);
        assert_eq!(fetched.posts[0].id, post_id(1, 0));
    }

    #[tokio::test]
    async fn test_previous_page_failure_falls_back_to_last_page() {
        let mut fake = FakeThread::new(10);
        let previous = format!("{}page-9", THREAD);
        fake.failing.insert(
            previous.clone(),
            FetchError::Transient {
                url: previous,
                message: "HTTP 502".to_string(),
            },
        );
        let fake = Arc::new(fake);
        let planner = SmartFetcher::new(fake.clone());

        let fetched = planner.fetch(THREAD, &["missing"]).await.unwrap();

        assert_eq!(fake.requests().len(), 3);
        assert_eq!(fetched.posts.len(), POSTS_PER_PAGE as usize);
        assert_eq!(fetched.posts[0].id, post_id(10, 0));
    }

    #[tokio::test]
    async fn test_first_page_error_propagates() {
        let mut fake = FakeThread::new(10);
        fake.failing.insert(
            THREAD.to_string(),
            FetchError::Forbidden {
                url: THREAD.to_string(),
            },
        );
        let planner = SmartFetcher::new(Arc::new(fake));

        let err = planner.fetch(THREAD, &["1"]).await.unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn test_latest_post() {
        let planner = SmartFetcher::new(Arc::new(FakeThread::new(3)));
        let (post, title) = planner.latest_post(THREAD).await.unwrap();
        assert_eq!(post.id, post_id(3, POSTS_PER_PAGE - 1));
        assert_eq!(title, "Long Thread");
    }
}
