//! HTML bodies for notification and welcome emails.

use std::fmt::Write as _;

use maud::{html, Escaper, Markup, PreEscaped, DOCTYPE};
use scraper::{node::Node, ElementRef, Html};

use crate::constants::DEFAULT_THREAD_TITLE;
use crate::models::{Post, Subscription, Thread};

const EMAIL_STYLE: &str = r"
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; background: #fff; }
.header { border-bottom: 2px solid #e67e22; padding-bottom: 10px; margin-bottom: 20px; }
.post { margin-bottom: 30px; padding-bottom: 30px; border-bottom: 1px solid #ecf0f1; }
.post:last-of-type { border-bottom: none; }
.post-number { color: #7f8c8d; font-weight: 500; }
.author { color: #e67e22; font-weight: 600; }
.timestamp { color: #7f8c8d; font-size: 0.9em; }
.content { margin: 15px 0; }
.content img { max-width: 100%; height: auto; display: block; }
.content blockquote { border-left: 3px solid #ddd; padding-left: 15px; margin: 10px 0; color: #666; }
.footer { margin-top: 30px; padding-top: 15px; border-top: 1px solid #ddd; font-size: 0.9em; color: #7f8c8d; }
.footer a { color: #7f8c8d; text-decoration: underline; margin-right: 12px; }
a { color: #e67e22; text-decoration: none; }
@media (prefers-color-scheme: dark) {
body { background: #1a1a1a; color: #e0e0e0; }
.author, a { color: #ff8c42; }
.content blockquote { border-left-color: #444; color: #b0b0b0; }
}
";

/// Tags kept from forum post HTML. Everything else is unwrapped to its text.
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "b", "strong", "i", "em", "u", "blockquote", "img", "a", "ul", "ol", "li", "div",
    "span",
];

/// Tags whose content is dropped entirely.
const DROPPED_TAGS: &[&str] = &["script", "style", "head", "title", "form", "noscript"];

/// Link to the subscriber's manage page.
#[must_use]
pub fn manage_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/manage?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

/// Render the notification email for `posts` (oldest first).
#[must_use]
pub fn notification_body(
    sub: &Subscription,
    thread: &Thread,
    posts: &[Post],
    base_url: &str,
) -> Markup {
    let title = if thread.title.is_empty() {
        DEFAULT_THREAD_TITLE
    } else {
        thread.title.as_str()
    };

    // Link the newest post so the reader lands on the right page of the thread
    let thread_link = posts
        .last()
        .map(|p| p.url.as_str())
        .filter(|u| !u.is_empty())
        .unwrap_or(thread.url.as_str());

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(EMAIL_STYLE)) }
            }
            body {
                div.header {
                    h2 { a href=(thread.url) { (title) } }
                    @if posts.len() > 1 {
                        p { (posts.len()) " new posts" }
                    }
                }
                @for post in posts {
                    (post_block(post))
                }
                div.footer {
                    a href=(thread_link) { "View thread" }
                    a href=(manage_url(base_url, &sub.token)) { "Manage" }
                }
            }
        }
    }
}

/// Render the confirmation sent when a subscriber starts watching `thread`.
#[must_use]
pub fn welcome_body(sub: &Subscription, thread: &Thread, base_url: &str) -> Markup {
    let title = if thread.title.is_empty() {
        DEFAULT_THREAD_TITLE
    } else {
        thread.title.as_str()
    };

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(EMAIL_STYLE)) }
            }
            body {
                div.header {
                    h2 { "Subscription confirmed" }
                }
                div.content {
                    p {
                        "You are now watching "
                        strong { a href=(thread.url) { (title) } }
                        "."
                    }
                    p { "You'll get an email whenever new posts are added to this thread." }
                }
                div.footer {
                    a href=(thread.url) { "View thread" }
                    a href=(manage_url(base_url, &sub.token)) { "Manage" }
                }
            }
        }
    }
}

fn post_block(post: &Post) -> Markup {
    let published = post
        .published_at()
        .map(|t| t.format("%b %-d, %Y at %-I:%M %p UTC").to_string());

    html! {
        div.post {
            div.meta {
                a.post-number href=(post.url) { "#" (post.id) }
                span.author { " \u{2022} " (post.author) }
                @if let Some(published) = published {
                    span.timestamp { " \u{2022} " (published) }
                }
            }
            div.content {
                @match post.html_content.as_deref().filter(|h| !h.trim().is_empty()) {
                    Some(rich) => { (PreEscaped(sanitize_post_html(rich))) }
                    None => { (post.content) }
                }
            }
        }
    }
}

/// Reduce untrusted post HTML to a small set of formatting tags.
///
/// Only `href`/`src`/`alt` survive, and only with http(s) or relative URLs.
/// Embedded media is replaced by a visible placeholder.
#[must_use]
pub fn sanitize_post_html(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let mut out = String::with_capacity(fragment.len());
    render_children(document.root_element(), &mut out);
    out
}

fn render_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_escaped(out, text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render_element(child, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    let el = element.value();
    let name = el.name();

    if DROPPED_TAGS.contains(&name) {
        return;
    }

    match name {
        "iframe" => {
            match el.attr("src").filter(|src| is_safe_url(src)) {
                Some(src) => {
                    out.push_str("[iframe: <a href=\"");
                    push_escaped(out, src);
                    out.push_str("\">");
                    push_escaped(out, src);
                    out.push_str("</a>]");
                }
                None => out.push_str("[replaced iframe]"),
            }
            return;
        }
        "video" | "embed" | "object" | "audio" => {
            let _ = write!(out, "[replaced {name}]");
            return;
        }
        _ => {}
    }

    if !ALLOWED_TAGS.contains(&name) {
        render_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    match name {
        "img" => {
            push_attr(out, "src", el.attr("src").filter(|src| is_safe_url(src)));
            push_attr(out, "alt", el.attr("alt"));
        }
        "a" => push_attr(out, "href", el.attr("href").filter(|href| is_safe_url(href))),
        _ => {}
    }
    out.push('>');

    if matches!(name, "br" | "img") {
        return;
    }

    render_children(element, out);
    let _ = write!(out, "</{name}>");
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        let _ = write!(out, " {name}=\"");
        push_escaped(out, value);
        out.push('"');
    }
}

fn push_escaped(out: &mut String, text: &str) {
    let _ = Escaper::new(out).write_str(text);
}

fn is_safe_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    if url.is_empty() {
        return false;
    }
    url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with('/')
        || url.starts_with("./")
        || url.starts_with("../")
        || !url.contains(':')
}
