//! Notification email delivery.
//!
//! [`Sender`] renders notifications and welcome emails and hands them to a [`MailProvider`],
//! which is the only part that knows about a concrete delivery service.

mod brevo;
mod mock;
pub mod templates;

pub use brevo::BrevoProvider;
pub use mock::MockProvider;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::constants::DEFAULT_SUBJECT;
use crate::error::ErrorKind;
use crate::models::{Post, Subscription, Thread};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email request failed: {0}")]
    Transport(String),
    #[error("email provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to build email request: {0}")]
    Request(String),
}

impl EmailError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transient,
            Self::Status {
                status: 401 | 403, ..
            }
            | Self::Request(_) => ErrorKind::Permanent,
            Self::Status { .. } => ErrorKind::Transient,
        }
    }
}

/// A raw delivery channel: one HTML message to one recipient.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the provider.
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError>;
}

/// Delivers one notification for one thread to one subscriber.
#[async_trait]
pub trait Emailer: Send + Sync {
    /// Send `posts` (oldest first) as a single email. An empty list sends nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed after the provider's retries.
    async fn send_notification(
        &self,
        sub: &Subscription,
        thread: &Thread,
        posts: &[Post],
    ) -> Result<(), EmailError>;

    /// Confirm a new subscription to `thread`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed after the provider's retries.
    async fn send_welcome(&self, sub: &Subscription, thread: &Thread) -> Result<(), EmailError>;
}

/// Renders notifications and sends them through a provider.
#[derive(Clone)]
pub struct Sender {
    provider: Arc<dyn MailProvider>,
    base_url: String,
}

impl Sender {
    #[must_use]
    pub fn new(provider: Arc<dyn MailProvider>, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Emailer for Sender {
    async fn send_notification(
        &self,
        sub: &Subscription,
        thread: &Thread,
        posts: &[Post],
    ) -> Result<(), EmailError> {
        if posts.is_empty() {
            return Ok(());
        }

        // The thread title keeps notifications for one thread in one conversation
        let subject = if thread.title.is_empty() {
            DEFAULT_SUBJECT
        } else {
            thread.title.as_str()
        };
        let body = templates::notification_body(sub, thread, posts, &self.base_url).into_string();

        info!(
            to = %sub.email,
            subject,
            post_count = posts.len(),
            "Sending notification email"
        );

        self.provider.send(&sub.email, subject, &body).await
    }

    async fn send_welcome(&self, sub: &Subscription, thread: &Thread) -> Result<(), EmailError> {
        let subject = if thread.title.is_empty() {
            DEFAULT_SUBJECT
        } else {
            thread.title.as_str()
        };
        let body = templates::welcome_body(sub, thread, &self.base_url).into_string();

        info!(to = %sub.email, subject, thread_url = %thread.url, "Sending welcome email");

        self.provider.send(&sub.email, subject, &body).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    struct RecordingProvider {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl MailProvider for RecordingProvider {
        async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
            self.sent.lock().unwrap().push((
                to.to_string(),
                subject.to_string(),
                html_body.to_string(),
            ));
            Ok(())
        }
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author: "rider".to_string(),
            content: format!("content {id}"),
            html_content: None,
            timestamp: None,
            url: format!("https://forum.example.com/threads/trip.9/#post-{id}"),
        }
    }

    fn fixtures() -> (Subscription, Thread) {
        let sub = Subscription::new("reader@example.com", "a".repeat(64));
        let thread = Thread::new("https://forum.example.com/threads/trip.9/", "9", Utc::now());
        (sub, thread)
    }

    #[tokio::test]
    async fn test_subject_falls_back_when_title_unknown() {
        let provider = Arc::new(RecordingProvider::default());
        let sender = Sender::new(provider.clone(), "https://notify.example.com");
        let (sub, mut thread) = fixtures();

        sender.send_notification(&sub, &thread, &[post("1")]).await.unwrap();
        thread.title = "Trip Report".to_string();
        sender.send_notification(&sub, &thread, &[post("2")]).await.unwrap();

        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "reader@example.com");
        assert_eq!(sent[0].1, "Forum Thread Update");
        assert_eq!(sent[1].1, "Trip Report");
        assert!(sent[1].2.contains("content 2"));
    }

    #[tokio::test]
    async fn test_empty_post_list_sends_nothing() {
        let provider = Arc::new(RecordingProvider::default());
        let sender = Sender::new(provider.clone(), "https://notify.example.com");
        let (sub, thread) = fixtures();

        sender.send_notification(&sub, &thread, &[]).await.unwrap();
        assert!(provider.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_welcome_email() {
        let provider = Arc::new(RecordingProvider::default());
        let sender = Sender::new(provider.clone(), "https://notify.example.com");
        let (sub, mut thread) = fixtures();
        thread.title = "Trip Report".to_string();

        sender.send_welcome(&sub, &thread).await.unwrap();

        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Trip Report");
        assert!(sent[0].2.contains("Subscription confirmed"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EmailError::Transport("reset".into()).kind(), ErrorKind::Transient);
        assert_eq!(
            EmailError::Status { status: 502, body: String::new() }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            EmailError::Status { status: 401, body: String::new() }.kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            EmailError::Status { status: 403, body: String::new() }.kind(),
            ErrorKind::Permanent
        );
    }
}
