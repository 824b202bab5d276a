//! Feed document parsing (RSS, Atom and JSON Feed via feed-rs).

use feed_rs::parser;

use crate::config::FetchConfig;
use crate::feed::types::{Article, MAX_DESCRIPTION_LENGTH};
use crate::{FeedError, Result};

/// Title used for entries that have none.
const UNTITLED: &str = "(no title)";

/// Turns a raw feed document into articles.
pub trait FeedParser: Send + Sync {
    /// Parse `raw`, fetched from `feed_url`, into articles in document order.
    ///
    /// A malformed document is reported as [`FeedError::Parse`].
    fn parse(&self, feed_url: &str, raw: &str) -> Result<Vec<Article>>;
}

/// Parser backed by `feed-rs`.
#[derive(Debug, Clone)]
pub struct FeedRsParser {
    max_description_length: usize,
}

impl FeedRsParser {
    /// Create a parser with the default description limit.
    pub fn new() -> Self {
        Self {
            max_description_length: MAX_DESCRIPTION_LENGTH,
        }
    }

    /// Create a parser using the configured description limit.
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_description_length: config.max_content_length,
        }
    }
}

impl Default for FeedRsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedParser for FeedRsParser {
    fn parse(&self, feed_url: &str, raw: &str) -> Result<Vec<Article>> {
        let feed = parser::parse(raw.as_bytes())
            .map_err(|e| FeedError::Parse(format!("failed to parse feed {feed_url}: {e}")))?;

        let articles = feed
            .entries
            .into_iter()
            .map(|entry| {
                let title = entry
                    .title
                    .map(|t| strip_html(&t.content))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string());
                let link = entry.links.first().map(|l| l.href.clone());
                let description = entry
                    .summary
                    .map(|t| t.content)
                    .or(entry.content.and_then(|c| c.body))
                    .map(|d| truncate(&strip_html(&d), self.max_description_length))
                    .unwrap_or_default();

                let mut article = Article::new(feed_url, link, title).with_description(description);
                if let Some(published_at) = entry.published.or(entry.updated) {
                    article = article.with_published_at(published_at);
                }
                article
            })
            .collect();

        Ok(articles)
    }
}

/// Strip HTML tags and decode common entities.
fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(buf) = entity.as_mut() {
            if ch == ';' {
                decode_entity(buf, &mut result);
                entity = None;
            } else if ch.is_alphanumeric() || ch == '#' {
                buf.push(ch);
            } else {
                // Not an entity after all
                result.push('&');
                result.push_str(buf);
                result.push(ch);
                entity = None;
            }
            continue;
        }

        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => entity = Some(String::new()),
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    if let Some(buf) = entity {
        result.push('&');
        result.push_str(&buf);
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(entity: &str, out: &mut String) {
    match entity {
        "amp" => out.push('&'),
        "lt" => out.push('<'),
        "gt" => out.push('>'),
        "quot" => out.push('"'),
        "apos" => out.push('\''),
        "nbsp" => out.push(' '),
        _ => match parse_numeric_entity(entity).and_then(char::from_u32) {
            Some(c) => out.push(c),
            None => {
                out.push('&');
                out.push_str(entity);
                out.push(';');
            }
        },
    }
}

/// Parse a numeric HTML entity (e.g., "#123" or "#x7B").
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    let digits = entity.strip_prefix('#')?;
    match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

/// Truncate to at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
