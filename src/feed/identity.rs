//! Article identity and feed URL normalization.

use url::Url;

use crate::{FeedError, Result};

/// Derive the stable id of an article.
///
/// The canonical link is the id; when the feed gives no link the id is the
/// composite `"{feed_url}:{title}"`.
pub fn article_id(feed_url: &str, link: Option<&str>, title: &str) -> String {
    match link.map(str::trim).filter(|l| !l.is_empty()) {
        Some(link) => link.to_string(),
        None => format!("{feed_url}:{title}"),
    }
}

/// Normalize a user-supplied feed URL.
///
/// Missing schemes default to `https`. Host case, default ports, fragments
/// and trailing slashes on non-root paths are canonicalized so that two
/// spellings of the same feed compare equal.
pub fn normalize_feed_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FeedError::Validation("feed URL is empty".to_string()));
    }

    let with_scheme = if has_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| FeedError::Validation(format!("invalid feed URL {raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FeedError::Validation(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(FeedError::Validation(format!("feed URL has no host: {raw}")));
    }

    url.set_fragment(None);
    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });

    Ok(url.to_string())
}

/// Whether `raw` starts with `scheme://`; a `://` later in the URL does not count.
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
