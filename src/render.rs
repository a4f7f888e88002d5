use once_cell::sync::Lazy;
use regex::Regex;
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::breadcrumbs::Breadcrumb;
use crate::model::ContentItem;
use crate::replies::{flatten, ReplyNode};

const DELETED_AUTHOR: &str = "[deleted]";

static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</li>|</blockquote>").expect("valid break regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static BLANK_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid blank run regex"));

/// Reduces Discourse `cooked` HTML to plain text.
pub fn plain_text(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_RUN_RE
        .replace_all(decoded.trim(), "\n\n")
        .into_owned()
}

pub fn render_thread(forest: &[ReplyNode], width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in flatten(forest) {
        let indent = "  ".repeat(entry.depth);
        let author = entry
            .post
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DELETED_AUTHOR);
        let mut header = format!("{indent}#{} {author}", entry.post.post_number);
        match entry.descendants {
            0 => {}
            1 => header.push_str(" (1 reply)"),
            n => header.push_str(&format!(" ({n} replies)")),
        }
        lines.push(header);

        let body = plain_text(entry.post.cooked.as_deref().unwrap_or_default());
        let prefix = format!("{indent}  ");
        for paragraph in body.lines() {
            lines.extend(wrap_with_prefix(paragraph, width, &prefix));
        }
    }
    lines
}

fn wrap_with_prefix(text: &str, width: usize, prefix: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![prefix.trim_end().to_string()];
    }
    if width == 0 {
        return vec![format!("{prefix}{text}")];
    }
    let min_width = UnicodeWidthStr::width(prefix).saturating_add(1);
    let options = WrapOptions::new(width.max(min_width))
        .break_words(false)
        .initial_indent(prefix)
        .subsequent_indent(prefix);
    wrap(text, options)
        .into_iter()
        .map(|cow| cow.into_owned())
        .collect()
}

pub fn render_breadcrumbs(crumbs: &[Breadcrumb]) -> String {
    crumbs
        .iter()
        .map(|crumb| {
            if crumb.is_current_page {
                format!("[{}]", crumb.label)
            } else {
                crumb.label.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

pub fn render_items(items: &[ContentItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let title = item.title.as_deref().unwrap_or_default();
            format!(
                "{}\t{:+}\t{}/{}\t{}",
                item.id,
                item.score(),
                item.upvotes,
                item.downvotes,
                title
            )
        })
        .collect()
}
