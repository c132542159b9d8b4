//! XenForo thread page parsing.
//!
//! Handles both the classic `li.message#post-N` layout and the current
//! `article.message[data-content="post-N"]` layout.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{FetchError, Page};
use crate::constants::DEFAULT_THREAD_TITLE;
use crate::models::Post;

static TITLE_HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1.p-title-value").expect("Invalid selector"));
static TITLE_TAG: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("Invalid selector"));
static MESSAGES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"li.message[id^="post-"], article.message[data-content^="post-"]"#)
        .expect("Invalid selector")
});
static USERNAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.username").expect("Invalid selector"));
static BODY: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("blockquote.messageText, .bbWrapper").expect("Invalid selector")
});
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("Invalid selector"));
static PAGE_NAV: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pageNav-page").expect("Invalid selector"));
static PAGE_NAV_CURRENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pageNav-page--current").expect("Invalid selector"));

/// Parse a thread page. `page_url` is used for post permalinks and error reporting.
///
/// # Errors
///
/// Returns [`FetchError::Content`] if the page contains no posts.
pub fn parse_page(html: &str, page_url: &str) -> Result<Page, FetchError> {
    let document = Html::parse_document(html);

    let posts: Vec<Post> = document
        .select(&MESSAGES)
        .filter_map(|message| parse_post(message, page_url))
        .collect();

    if posts.is_empty() {
        return Err(FetchError::Content {
            url: page_url.to_string(),
        });
    }

    let last_page = document
        .select(&PAGE_NAV)
        .filter_map(|el| page_number(&el))
        .max()
        .unwrap_or(0);
    let current_page = document
        .select(&PAGE_NAV_CURRENT)
        .find_map(|el| page_number(&el))
        .unwrap_or(1);

    Ok(Page {
        posts,
        title: extract_title(&document),
        current_page,
        last_page,
    })
}

fn extract_title(document: &Html) -> String {
    if let Some(heading) = document.select(&TITLE_HEADING).next() {
        let title = collapse_text(&heading);
        if !title.is_empty() {
            return title;
        }
    }

    // Fall back to <title>, dropping the " | Site Name" suffix
    if let Some(tag) = document.select(&TITLE_TAG).next() {
        let raw = collapse_text(&tag);
        let title = match raw.find(" | ") {
            Some(idx) if idx > 0 => raw[..idx].to_string(),
            _ => raw,
        };
        if !title.is_empty() {
            return title;
        }
    }

    DEFAULT_THREAD_TITLE.to_string()
}

fn parse_post(message: ElementRef<'_>, page_url: &str) -> Option<Post> {
    let attrs = message.value();
    let id = attrs
        .attr("id")
        .and_then(|v| v.strip_prefix("post-"))
        .or_else(|| attrs.attr("data-content").and_then(|v| v.strip_prefix("post-")))
        .filter(|id| !id.is_empty())?
        .to_string();

    let author = message
        .select(&USERNAME)
        .next()
        .map(|el| collapse_text(&el))
        .filter(|a| !a.is_empty())
        .or_else(|| attrs.attr("data-author").map(ToString::to_string))
        .unwrap_or_default();

    let body = message.select(&BODY).next()?;
    let content = body.text().collect::<String>().trim().to_string();
    if content.is_empty() {
        return None;
    }
    let html_content = Some(body.inner_html().trim().to_string()).filter(|h| !h.is_empty());

    let timestamp = message
        .select(&TIME)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(ToString::to_string);

    Some(Post {
        url: format!("{page_url}#post-{id}"),
        id,
        author,
        content,
        html_content,
        timestamp,
    })
}

fn page_number(element: &ElementRef<'_>) -> Option<u32> {
    collapse_text(element).parse().ok()
}

/// Element text with runs of whitespace collapsed to single spaces.
fn collapse_text(element: &ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}
