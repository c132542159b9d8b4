//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fmt::Write as _;

/// Render a XenForo-style thread page.
///
/// `posts` are `(id, author, text)`; `last_page` of 1 renders no pagination bar.
pub fn thread_page(title: &str, posts: &[(&str, &str, &str)], current_page: u32, last_page: u32) -> String {
    let mut html = String::from("<!DOCTYPE html><html><head><title>ignored | Forum</title></head><body>");
    let _ = write!(html, r#"<h1 class="p-title-value">{title}</h1>"#);

    if last_page > 1 {
        html.push_str(r#"<ul class="pageNav-main">"#);
        for page in [1, current_page, last_page] {
            let class = if page == current_page {
                "pageNav-page pageNav-page--current"
            } else {
                "pageNav-page"
            };
            let _ = write!(html, r#"<li class="{class}"><a>{page}</a></li>"#);
        }
        html.push_str("</ul>");
    }

    for (id, author, text) in posts {
        let _ = write!(
            html,
            r#"<article class="message" data-author="{author}" data-content="post-{id}">
                 <a class="username">{author}</a>
                 <time datetime="2025-10-01T12:00:00+00:00">Oct 1</time>
                 <div class="bbWrapper">{text}</div>
               </article>"#
        );
    }

    html.push_str("</body></html>");
    html
}

/// A valid subscription token derived from a small number.
pub fn token(n: u8) -> String {
    format!("{n:064x}")
}
