use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::Url;

use crate::model::{Community, ContentItem};

pub const LOADING_LABEL: &str = "Loading...";
pub const COMMUNITY_LABEL_MAX: usize = 50;
pub const POST_LABEL_MAX: usize = 20;
const ELLIPSIS: char = '…';

static ROUTE_BASE: Lazy<Option<Url>> = Lazy::new(|| Url::parse("http://localhost/").ok());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub href: String,
    pub is_current_page: bool,
}

impl Breadcrumb {
    fn new<L: Into<String>, H: Into<String>>(label: L, href: H, is_current_page: bool) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            is_current_page,
        }
    }

    fn home(is_current_page: bool) -> Self {
        Self::new("Home", "/", is_current_page)
    }
}

/// Page shapes the breadcrumb trail distinguishes. Variants are listed in
/// matching precedence: a path under a community that also names a post is a
/// `Post` route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Post {
        community_id: Option<String>,
        post_id: Option<String>,
    },
    Community {
        community_id: Option<String>,
    },
    Access,
    Account,
    CreateGroup,
    Discourse {
        slug: Option<String>,
    },
    Other,
}

impl Route {
    pub fn parse(pathname: &str) -> Route {
        let segments = path_segments(pathname);
        if segments.iter().all(|segment| segment.is_empty()) {
            return Route::Home;
        }

        if let Some(post_id) = segment_after(&segments, "post") {
            return Route::Post {
                community_id: segment_after(&segments, "communities").flatten(),
                post_id,
            };
        }
        if let Some(community_id) = segment_after(&segments, "communities") {
            return Route::Community { community_id };
        }

        let has = |name: &str| segments.iter().any(|segment| segment == name);
        if has("access") {
            Route::Access
        } else if has("account") {
            Route::Account
        } else if has("create-group") {
            Route::CreateGroup
        } else if has("discourse") {
            Route::Discourse {
                slug: segment_after(&segments, "discourse").flatten(),
            }
        } else {
            Route::Other
        }
    }
}

fn path_segments(pathname: &str) -> Vec<String> {
    let path = match ROUTE_BASE.as_ref().and_then(|base| base.join(pathname).ok()) {
        Some(url) => url.path().to_string(),
        None => pathname.to_string(),
    };
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect()
}

/// `None` when `name` is absent or is the final segment; `Some(None)` when it
/// is followed by an empty segment (trailing slash).
fn segment_after(segments: &[String], name: &str) -> Option<Option<String>> {
    let idx = segments.iter().position(|segment| segment == name)?;
    let next = segments.get(idx + 1)?;
    if next.is_empty() {
        Some(None)
    } else {
        Some(Some(next.clone()))
    }
}

/// Cuts `text` to `max` chars plus an ellipsis. Empty or missing text is the
/// loading placeholder; whitespace counts like any other char.
pub fn truncate_label(text: Option<&str>, max: usize) -> String {
    let text = match text {
        Some(text) if !text.is_empty() => text,
        _ => return LOADING_LABEL.to_string(),
    };
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push(ELLIPSIS);
    cut
}

pub fn breadcrumbs_for(
    community: Option<&Community>,
    post: Option<&ContentItem>,
    pathname: &str,
) -> Vec<Breadcrumb> {
    derive(community, post, &Route::parse(pathname))
}

pub fn derive(
    community: Option<&Community>,
    post: Option<&ContentItem>,
    route: &Route,
) -> Vec<Breadcrumb> {
    match route {
        Route::Home => vec![Breadcrumb::home(true)],
        Route::Post {
            community_id,
            post_id,
        } => {
            let community_href = community_href(community, community_id.as_deref());
            let post_id = post
                .map(|post| post.id.clone())
                .or_else(|| post_id.clone())
                .unwrap_or_default();
            let post_href = format!("{community_href}/post/{post_id}");
            vec![
                Breadcrumb::home(false),
                Breadcrumb::new(community_label(community), community_href, false),
                Breadcrumb::new(
                    truncate_label(post.and_then(|post| post.title.as_deref()), POST_LABEL_MAX),
                    post_href,
                    true,
                ),
            ]
        }
        Route::Community { community_id } => vec![
            Breadcrumb::home(false),
            Breadcrumb::new(
                community_label(community),
                community_href(community, community_id.as_deref()),
                true,
            ),
        ],
        Route::Access => vec![
            Breadcrumb::home(false),
            Breadcrumb::new("Access", "/access", true),
        ],
        Route::Account => vec![
            Breadcrumb::home(false),
            Breadcrumb::new("Account", "/account", true),
        ],
        Route::CreateGroup => vec![
            Breadcrumb::home(false),
            Breadcrumb::new("Create Group", "/create-group", true),
        ],
        Route::Discourse { slug } => {
            let slug = community
                .and_then(|community| community.alt_title.clone())
                .filter(|title| !title.trim().is_empty())
                .or_else(|| slug.clone());
            let href = match slug {
                Some(slug) => format!("/discourse/{slug}"),
                None => "/discourse".to_string(),
            };
            vec![
                Breadcrumb::home(false),
                Breadcrumb::new("Discourse", href, true),
            ]
        }
        Route::Other => vec![Breadcrumb::home(false)],
    }
}

fn community_label(community: Option<&Community>) -> String {
    truncate_label(
        community.map(|community| community.name.as_str()),
        COMMUNITY_LABEL_MAX,
    )
}

fn community_href(community: Option<&Community>, fallback_id: Option<&str>) -> String {
    match (community, fallback_id) {
        (Some(community), _) => format!("/communities/{}", community.id),
        (None, Some(id)) => format!("/communities/{id}"),
        (None, None) => "/communities".to_string(),
    }
}
