//! Maud page templates for the subscription flows.

use maud::{html, Markup, DOCTYPE};

use crate::constants::DEFAULT_THREAD_TITLE;
use crate::models::{Subscription, Thread};

fn layout(title: &str, content: &Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | Thread Notifier" }
                style {
                    "body{font-family:system-ui,sans-serif;max-width:40rem;margin:2rem auto;padding:0 1rem;line-height:1.5}"
                    "label{display:block;margin-top:1rem}"
                    "input[type=email],input[type=url]{width:100%;padding:.4rem}"
                    ".error{color:#a00}"
                    "ul.threads li{margin:.5rem 0}"
                }
            }
            body {
                header { a href="/" { "Thread Notifier" } }
                main { (content) }
            }
        }
    }
}

fn thread_title(thread: &Thread) -> &str {
    if thread.title.is_empty() {
        DEFAULT_THREAD_TITLE
    } else {
        &thread.title
    }
}

/// Landing page with the subscribe form, optionally showing an error above it.
#[must_use]
pub fn render_index_page(error: Option<&str>) -> Markup {
    let content = html! {
        h1 { "Watch a forum thread" }
        p { "Get an email whenever someone posts in a thread you care about." }
        @if let Some(error) = error {
            p class="error" { (error) }
        }
        form method="post" action="/subscribe" {
            label for="email" { "Email address" }
            input type="email" id="email" name="email" required;
            label for="thread_url" { "Thread URL" }
            input type="url" id="thread_url" name="thread_url" required
                placeholder="https://forum.example.com/threads/topic.123/";
            p { button type="submit" { "Subscribe" } }
        }
    };
    layout("Subscribe", &content)
}

#[must_use]
pub fn render_subscribed_page(sub: &Subscription, thread: &Thread) -> Markup {
    let content = html! {
        h1 { "Subscribed" }
        p {
            "You will get an email at " strong { (sub.email) }
            " when there are new posts in "
            a href=(thread.url) { (thread_title(thread)) } "."
        }
        p { a href=(manage_path(&sub.token)) { "Manage your subscriptions" } }
    };
    layout("Subscribed", &content)
}

#[must_use]
pub fn render_already_subscribed_page(sub: &Subscription, thread: &Thread) -> Markup {
    let content = html! {
        h1 { "Already subscribed" }
        p {
            (sub.email) " is already watching "
            a href=(thread.url) { (thread_title(thread)) } "."
        }
        p { a href=(manage_path(&sub.token)) { "Manage your subscriptions" } }
    };
    layout("Already subscribed", &content)
}

/// Shown when the forum requires a login to read the thread.
#[must_use]
pub fn render_forbidden_page(thread_url: &str) -> Markup {
    let content = html! {
        h1 { "Thread not accessible" }
        p {
            "The forum requires a login to read "
            a href=(thread_url) { (thread_url) }
            ", so it cannot be watched. Only publicly readable threads are supported."
        }
        p { a href="/" { "Try another thread" } }
    };
    layout("Thread not accessible", &content)
}

#[must_use]
pub fn render_manage_page(sub: &Subscription) -> Markup {
    let content = html! {
        h1 { "Your subscriptions" }
        p { "Threads watched by " strong { (sub.email) } ":" }
        ul class="threads" {
            @for thread in sub.threads.values() {
                li {
                    a href=(thread.url) { (thread_title(thread)) }
                    form method="post" action="/manage" style="display:inline" {
                        input type="hidden" name="token" value=(sub.token);
                        input type="hidden" name="action" value="unsubscribe";
                        input type="hidden" name="thread_id" value=(thread.id);
                        " "
                        button type="submit" { "Unsubscribe" }
                    }
                }
            }
        }
        form method="post" action="/manage" {
            input type="hidden" name="token" value=(sub.token);
            input type="hidden" name="action" value="unsubscribe_all";
            button type="submit" { "Unsubscribe from everything" }
        }
    };
    layout("Manage subscriptions", &content)
}

#[must_use]
pub fn render_unsubscribed_page() -> Markup {
    let content = html! {
        h1 { "Unsubscribed" }
        p { "You will not receive any more emails." }
        p { a href="/" { "Watch another thread" } }
    };
    layout("Unsubscribed", &content)
}

#[must_use]
pub fn render_not_found_page() -> Markup {
    let content = html! {
        h1 { "Subscription not found" }
        p { "This link is no longer valid. The subscription may have been removed." }
        p { a href="/" { "Subscribe again" } }
    };
    layout("Not found", &content)
}

/// Generic failure page with a short message.
#[must_use]
pub fn render_error_page(message: &str) -> Markup {
    let content = html! {
        h1 { "Something went wrong" }
        p class="error" { (message) }
        p { a href="/" { "Back" } }
    };
    layout("Error", &content)
}

#[must_use]
pub fn manage_path(token: &str) -> String {
    format!("/manage?token={}", urlencoding::encode(token))
}
