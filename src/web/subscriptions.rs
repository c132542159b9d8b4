//! Subscribe, manage and unsubscribe handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::Utc;
use maud::Markup;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::pages;
use super::AppState;
use crate::constants::MAX_THREADS_PER_SUBSCRIBER;
use crate::forum::{canonical_thread_url, thread_id};
use crate::models::{Subscription, Thread};
use crate::store::{subscription_key, token_for_email};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
        .expect("email regex is valid")
});

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/subscribe", post(subscribe))
        .route("/manage", get(manage).post(manage_action))
        .route("/unsubscribe", get(unsubscribe))
}

fn page(status: StatusCode, markup: Markup) -> Response {
    (status, Html(markup.into_string())).into_response()
}

/// Trim and lowercase an email address, or `None` if it does not look like one.
fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if !(3..=254).contains(&email.len()) || !EMAIL.is_match(&email) {
        return None;
    }
    Some(email)
}

async fn index() -> Response {
    page(StatusCode::OK, pages::render_index_page(None))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeForm {
    email: String,
    thread_url: String,
}

async fn subscribe(State(state): State<AppState>, Form(form): Form<SubscribeForm>) -> Response {
    let Some(email) = normalize_email(&form.email) else {
        return page(
            StatusCode::BAD_REQUEST,
            pages::render_index_page(Some("Please enter a valid email address.")),
        );
    };
    let Some((thread_url, id)) = canonical_thread_url(&form.thread_url)
        .and_then(|url| thread_id(&url).map(|id| (url, id)))
    else {
        return page(
            StatusCode::BAD_REQUEST,
            pages::render_index_page(Some("Please enter a valid forum thread URL.")),
        );
    };

    // Verify the thread is readable before touching any subscription
    let (latest, title) = match state.planner.latest_post(&thread_url).await {
        Ok(found) => found,
        Err(e) if e.is_forbidden() => {
            warn!(url = %thread_url, "Thread requires login, refusing subscription");
            return page(StatusCode::FORBIDDEN, pages::render_forbidden_page(&thread_url));
        }
        Err(e) => {
            warn!(url = %thread_url, error = %e, "Failed to verify thread");
            return page(
                StatusCode::BAD_REQUEST,
                pages::render_index_page(Some(
                    "Could not verify thread URL. Check the link and try again.",
                )),
            );
        }
    };

    let token = token_for_email(state.token_salt.as_bytes(), &email);

    let paused = state.scheduler.pause_polling().await;
    let mut sub = match state.store.load(&token).await {
        Ok(Some(sub)) => sub,
        Ok(None) => Subscription::new(email.clone(), token),
        Err(e) => {
            error!(email = %email, error = %e, "Failed to load subscription");
            return page(
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::render_error_page("Could not load your subscription. Please try again."),
            );
        }
    };

    if let Some(existing) = sub.threads.get(&id) {
        return page(
            StatusCode::OK,
            pages::render_already_subscribed_page(&sub, existing),
        );
    }
    if sub.threads.len() >= MAX_THREADS_PER_SUBSCRIBER {
        return page(
            StatusCode::BAD_REQUEST,
            pages::render_index_page(Some(&format!(
                "You can watch at most {MAX_THREADS_PER_SUBSCRIBER} threads. Unsubscribe from one first."
            ))),
        );
    }

    // The latest post is the starting watermark, so the first check only
    // reports posts made after this point.
    let mut thread = Thread::new(thread_url, id, Utc::now());
    thread.title = title;
    thread.last_post_time = latest.published_at();
    thread.last_post_id = latest.id;
    sub.watch(thread.clone());

    if let Err(e) = state.store.save(&sub).await {
        error!(email = %sub.email, error = %e, "Failed to save subscription");
        return page(
            StatusCode::INTERNAL_SERVER_ERROR,
            pages::render_error_page("Could not save your subscription. Please try again."),
        );
    }
    drop(paused);

    info!(
        email = %sub.email,
        thread_url = %thread.url,
        thread_count = sub.threads.len(),
        "New thread subscription"
    );

    if let Err(e) = state.emailer.send_welcome(&sub, &thread).await {
        warn!(email = %sub.email, error = %e, "Failed to send welcome email");
    }

    page(StatusCode::OK, pages::render_subscribed_page(&sub, &thread))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: String,
}

fn invalid_token() -> Response {
    page(
        StatusCode::BAD_REQUEST,
        pages::render_error_page("Invalid subscription link."),
    )
}

fn storage_failure() -> Response {
    page(
        StatusCode::INTERNAL_SERVER_ERROR,
        pages::render_error_page("Could not update your subscription. Please try again."),
    )
}

async fn manage(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Response {
    if subscription_key(&query.token).is_err() {
        return invalid_token();
    }
    match state.store.load(&query.token).await {
        Ok(Some(sub)) => page(StatusCode::OK, pages::render_manage_page(&sub)),
        Ok(None) => page(StatusCode::NOT_FOUND, pages::render_not_found_page()),
        Err(e) => {
            error!(error = %e, "Failed to load subscription for manage page");
            storage_failure()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManageForm {
    token: String,
    action: String,
    #[serde(default)]
    thread_id: Option<String>,
}

async fn manage_action(State(state): State<AppState>, Form(form): Form<ManageForm>) -> Response {
    if subscription_key(&form.token).is_err() {
        return invalid_token();
    }

    let _paused = state.scheduler.pause_polling().await;
    let mut sub = match state.store.load(&form.token).await {
        Ok(Some(sub)) => sub,
        Ok(None) => return page(StatusCode::NOT_FOUND, pages::render_not_found_page()),
        Err(e) => {
            error!(error = %e, "Failed to load subscription for update");
            return storage_failure();
        }
    };

    match form.action.as_str() {
        "unsubscribe" => {
            let Some(thread_id) = form.thread_id.filter(|id| !id.is_empty()) else {
                return page(
                    StatusCode::BAD_REQUEST,
                    pages::render_error_page("No thread selected."),
                );
            };
            if let Some(thread) = sub.threads.remove(&thread_id) {
                info!(email = %sub.email, thread_url = %thread.url, "Unsubscribed from thread");
            }

            // A subscription without threads is not kept around
            if sub.threads.is_empty() {
                return delete_subscription(&state, &sub).await;
            }
            if let Err(e) = state.store.save(&sub).await {
                error!(email = %sub.email, error = %e, "Failed to save subscription");
                return storage_failure();
            }
            Redirect::to(&pages::manage_path(&sub.token)).into_response()
        }
        "unsubscribe_all" => delete_subscription(&state, &sub).await,
        other => {
            warn!(action = %other, "Unknown manage action");
            page(
                StatusCode::BAD_REQUEST,
                pages::render_error_page("Unknown action."),
            )
        }
    }
}

async fn delete_subscription(state: &AppState, sub: &Subscription) -> Response {
    if let Err(e) = state.store.delete(&sub.token).await {
        error!(email = %sub.email, error = %e, "Failed to delete subscription");
        return storage_failure();
    }
    info!(email = %sub.email, "Subscription removed");
    page(StatusCode::OK, pages::render_unsubscribed_page())
}

/// Email footers link here; the manage page does the actual work.
async fn unsubscribe(Query(query): Query<TokenQuery>) -> Response {
    if subscription_key(&query.token).is_err() {
        return invalid_token();
    }
    Redirect::to(&pages::manage_path(&query.token)).into_response()
}
