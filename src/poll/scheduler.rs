//! Poll cycle orchestration.
//!
//! One [`Scheduler`] exists per process. Each cycle loads every subscription,
//! groups watched threads by canonical URL, fetches each due thread once and
//! reconciles every subscriber in the group against that single result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::email::Emailer;
use crate::forum::{canonical_thread_url, thread_key};
use crate::models::{Subscription, Thread};
use crate::poll::interval::calculate_interval;
use crate::poll::planner::SmartFetcher;
use crate::poll::reconcile::{reconcile, ReconcileOutcome};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poll cycle cancelled")]
    Cancelled,
    #[error("failed to list subscriptions: {0}")]
    List(#[source] StoreError),
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub cycle: u64,
    pub subscriptions: usize,
    pub thread_entries: usize,
    pub groups: usize,
    /// Groups that were due and fetched successfully.
    pub checked: usize,
    pub skipped_not_due: usize,
    pub fetch_failures: usize,
    /// Subscriber/thread pairs that were emailed.
    pub notified: usize,
    pub reconcile_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleStats),
    /// Another cycle was already running.
    Skipped,
}

/// Every subscriber entry for one thread.
#[derive(Debug)]
struct ThreadCheckGroup {
    /// Canonical URL the thread is fetched from. `https` wins when members use both schemes.
    url: String,
    /// Snapshot whose timing decides whether the group is due.
    representative: Thread,
    /// (index into the cycle's subscriptions, thread id within that subscription)
    members: Vec<(usize, String)>,
}

pub struct Scheduler {
    planner: SmartFetcher,
    store: Arc<dyn Store>,
    emailer: Arc<dyn Emailer>,
    max_posts_per_email: usize,
    cycle_lock: Mutex<()>,
    cycles: AtomicU64,
    shutdown: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        planner: SmartFetcher,
        store: Arc<dyn Store>,
        emailer: Arc<dyn Emailer>,
        max_posts_per_email: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            planner,
            store,
            emailer,
            max_posts_per_email,
            cycle_lock: Mutex::new(()),
            cycles: AtomicU64::new(0),
            shutdown,
        }
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for any running cycle to finish and hold off new ones while the guard lives.
    ///
    /// A cycle saves whole subscription documents it loaded at its start, so
    /// edits made outside the poller must hold this guard across their
    /// load-modify-save or a concurrent cycle would overwrite them.
    pub async fn pause_polling(&self) -> MutexGuard<'_, ()> {
        self.cycle_lock.lock().await
    }

    /// Number of cycles started so far.
    #[must_use]
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run one poll cycle, or return [`CycleOutcome::Skipped`] if one is already running.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Cancelled`] if shutdown was requested mid-cycle and
    /// [`PollError::List`] if subscriptions could not be loaded. Failures scoped
    /// to a single thread or subscriber are logged and counted, never returned.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PollError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            info!("Poll cycle already in progress, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        let now = Utc::now();
        info!(cycle, "Starting poll cycle");

        let mut subs = self.store.list().await.map_err(PollError::List)?;
        let groups = group_threads(&subs);

        let mut stats = CycleStats {
            cycle,
            subscriptions: subs.len(),
            thread_entries: subs.iter().map(|s| s.threads.len()).sum(),
            groups: groups.len(),
            ..CycleStats::default()
        };
        info!(
            cycle,
            subscriptions = stats.subscriptions,
            thread_entries = stats.thread_entries,
            unique_threads = stats.groups,
            "Loaded subscriptions"
        );

        for group in groups.values() {
            let url = &group.url;
            if self.shutdown.is_cancelled() {
                info!(cycle, "Poll cycle cancelled");
                return Err(PollError::Cancelled);
            }

            if !is_due(&group.representative, url, now) {
                stats.skipped_not_due += 1;
                continue;
            }

            // Every member's marker shapes the window, so nobody's gap is cut short
            let markers: Vec<&str> = group
                .members
                .iter()
                .filter_map(|(index, thread_id)| subs.get(*index)?.threads.get(thread_id))
                .map(|thread| thread.last_post_id.as_str())
                .collect();

            let fetched = match self.planner.fetch(url, &markers).await {
                Ok(fetched) => fetched,
                Err(e) if e.is_forbidden() => {
                    error!(
                        thread_url = %url,
                        subscribers = group.members.len(),
                        error = %e,
                        "Thread requires login, check failed"
                    );
                    stats.fetch_failures += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        thread_url = %url,
                        subscribers = group.members.len(),
                        kind = %e.kind(),
                        error = %e,
                        "Failed to check thread, will retry next cycle"
                    );
                    stats.fetch_failures += 1;
                    continue;
                }
            };
            stats.checked += 1;
            debug!(
                thread_url = %url,
                posts = fetched.posts.len(),
                pages_fetched = fetched.pages_fetched,
                subscribers = group.members.len(),
                "Thread fetched, reconciling subscribers"
            );

            for (index, thread_id) in &group.members {
                let Some(sub) = subs.get_mut(*index) else {
                    continue;
                };
                let result = reconcile(
                    self.store.as_ref(),
                    self.emailer.as_ref(),
                    self.max_posts_per_email,
                    sub,
                    thread_id,
                    &fetched,
                    Utc::now(),
                )
                .await;

                match result {
                    Ok(ReconcileOutcome::Notified { .. }) => stats.notified += 1,
                    Ok(ReconcileOutcome::SendFailed) => stats.reconcile_failures += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            email = %sub.email,
                            thread_url = %url,
                            error = %e,
                            "Failed to reconcile subscription"
                        );
                        stats.reconcile_failures += 1;
                    }
                }
            }
        }

        info!(
            cycle,
            checked = stats.checked,
            skipped_not_due = stats.skipped_not_due,
            fetch_failures = stats.fetch_failures,
            notified = stats.notified,
            reconcile_failures = stats.reconcile_failures,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Poll cycle complete"
        );
        Ok(CycleOutcome::Completed(stats))
    }
}

/// Group every watched thread by [`thread_key`], so `http`/`https`, paged and
/// anchored forms of one thread share a single fetch.
///
/// The representative prefers a never-polled entry so a fresh subscription
/// forces a check even when other subscribers were polled moments ago.
fn group_threads(subs: &[Subscription]) -> HashMap<String, ThreadCheckGroup> {
    let mut groups: HashMap<String, ThreadCheckGroup> = HashMap::new();

    for (index, sub) in subs.iter().enumerate() {
        for (thread_id, thread) in &sub.threads {
            let key = thread_key(&thread.url).unwrap_or_else(|| thread.url.clone());
            let url = canonical_thread_url(&thread.url).unwrap_or_else(|| thread.url.clone());
            let member = (index, thread_id.clone());

            match groups.get_mut(&key) {
                Some(group) => {
                    if thread.is_new() && !group.representative.is_new() {
                        group.representative = thread.clone();
                    }
                    if url.starts_with("https://") && !group.url.starts_with("https://") {
                        group.url = url;
                    }
                    group.members.push(member);
                }
                None => {
                    groups.insert(
                        key,
                        ThreadCheckGroup {
                            url,
                            representative: thread.clone(),
                            members: vec![member],
                        },
                    );
                }
            }
        }
    }

    groups
}

fn is_due(representative: &Thread, url: &str, now: DateTime<Utc>) -> bool {
    let (interval, reason) = calculate_interval(
        representative.last_post_time,
        representative.last_polled_at,
        now,
    );

    let Some(last_polled) = representative.last_polled_at else {
        debug!(thread_url = %url, reason = %reason, "New subscription, checking immediately");
        return true;
    };

    let elapsed = (now - last_polled).to_std().unwrap_or(Duration::ZERO);
    if elapsed < interval {
        debug!(
            thread_url = %url,
            elapsed_secs = elapsed.as_secs(),
            interval_secs = interval.as_secs(),
            reason = %reason,
            "Thread not due"
        );
        return false;
    }

    debug!(thread_url = %url, interval_secs = interval.as_secs(), reason = %reason, "Thread due");
    true
}

/// Run [`Scheduler::run_cycle`] every `period` until the scheduler's shutdown token fires.
///
/// Missed ticks are skipped rather than bunched up, so a slow cycle never
/// causes a burst of back-to-back cycles.
pub async fn poll_loop(scheduler: Arc<Scheduler>, period: Duration, run_immediately: bool) {
    let shutdown = scheduler.shutdown_token();
    info!(
        interval_secs = period.as_secs(),
        run_immediately, "Starting poll loop"
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    if !run_immediately {
        // The first tick completes immediately
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Poll loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                match scheduler.run_cycle().await {
                    Ok(_) => {}
                    Err(PollError::Cancelled) => {
                        info!("Poll loop shutting down");
                        break;
                    }
                    Err(e) => error!(error = %e, "Poll cycle failed"),
                }
            }
        }
    }
}
