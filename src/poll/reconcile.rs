//! Per-subscriber reconciliation of a fetched thread against their watermark.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::email::Emailer;
use crate::models::{Post, Subscription};
use crate::poll::planner::FetchedThread;
use crate::store::{Store, StoreError};

/// What reconciliation did for one (subscriber, thread) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First check: the newest post was recorded as the baseline, nothing sent.
    Baseline,
    /// An email with `sent` posts went out and the watermark advanced.
    Notified { sent: usize },
    /// Nothing newer than the watermark.
    NoNewPosts,
    /// Delivery failed; the watermark is unchanged so the posts are retried.
    SendFailed,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("subscription does not watch thread {0}")]
    UnknownThread(String),
    #[error("fetched thread has no posts")]
    NoPosts,
    #[error("failed to persist subscription: {0}")]
    Save(#[from] StoreError),
}

/// Posts strictly after the marker, or every post when the marker is absent.
#[must_use]
pub fn find_new_posts<'a>(posts: &'a [Post], last_post_id: &str) -> &'a [Post] {
    match posts.iter().position(|p| p.id == last_post_id) {
        Some(idx) => &posts[idx + 1..],
        None => posts,
    }
}

/// Reconcile one watched thread of `sub` against a shared fetch result.
///
/// Mutates `sub` in place and persists it. The watermark only advances after
/// a successful send, so the worst case on failure is a duplicate email.
///
/// # Errors
///
/// Returns an error if the thread is not watched, the fetch had no posts, or
/// the subscription could not be saved.
pub async fn reconcile(
    store: &dyn Store,
    emailer: &dyn Emailer,
    max_posts_per_email: usize,
    sub: &mut Subscription,
    thread_id: &str,
    fetched: &FetchedThread,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let Some(latest) = fetched.latest() else {
        return Err(ReconcileError::NoPosts);
    };

    let thread = sub
        .threads
        .get_mut(thread_id)
        .ok_or_else(|| ReconcileError::UnknownThread(thread_id.to_string()))?;

    if thread.title.is_empty() && !fetched.title.is_empty() {
        thread.title.clone_from(&fetched.title);
    }
    thread.last_polled_at = Some(thread.last_polled_at.map_or(now, |prev| prev.max(now)));
    if let Some(published) = latest.published_at() {
        thread.last_post_time = Some(published);
    }

    if thread.last_post_id.is_empty() {
        thread.last_post_id.clone_from(&latest.id);
        info!(
            email = %sub.email,
            thread_url = %thread.url,
            baseline_post = %latest.id,
            "First check for subscription, recording latest post without notifying"
        );
        store.save(sub).await?;
        return Ok(ReconcileOutcome::Baseline);
    }

    let new_posts = find_new_posts(&fetched.posts, &thread.last_post_id);
    if new_posts.is_empty() {
        store.save(sub).await?;
        return Ok(ReconcileOutcome::NoNewPosts);
    }

    // Only the most recent posts go out; older ones beyond the cap are dropped
    let batch = &new_posts[new_posts.len().saturating_sub(max_posts_per_email.max(1))..];
    let Some(newest) = batch.last() else {
        return Ok(ReconcileOutcome::NoNewPosts);
    };
    info!(
        email = %sub.email,
        thread_url = %thread.url,
        new_posts = new_posts.len(),
        sending = batch.len(),
        previous_post = %thread.last_post_id,
        "Found new posts"
    );

    let snapshot = thread.clone();
    if let Err(e) = emailer.send_notification(sub, &snapshot, batch).await {
        warn!(
            email = %sub.email,
            thread_url = %snapshot.url,
            error = %e,
            "Failed to send notification, keeping watermark for retry"
        );
        store.save(sub).await?;
        return Ok(ReconcileOutcome::SendFailed);
    }

    if let Some(thread) = sub.threads.get_mut(thread_id) {
        thread.last_post_id.clone_from(&newest.id);
    }

    if let Err(e) = store.save(sub).await {
        error!(
            severity = "critical",
            email = %sub.email,
            thread_url = %snapshot.url,
            sent_through = %newest.id,
            error = %e,
            "Email sent but watermark could not be saved, posts may be sent again"
        );
        return Err(e.into());
    }

    info!(
        email = %sub.email,
        thread_url = %snapshot.url,
        post_count = batch.len(),
        last_post = %newest.id,
        "Notification sent"
    );
    Ok(ReconcileOutcome::Notified { sent: batch.len() })
}
