//! Message text builders and transport-safe chunking.
//!
//! Output uses the Telegram HTML subset (`<b>`, `<a href>`). All lengths are
//! UTF-16 code units, which is what the Bot API counts.

use thiserror::Error;
use tracing::warn;
use url::Url;

use stockwatch_common::Product;

/// Target chunk size; the transport maximum is 4096.
pub const MESSAGE_LIMIT: usize = 4000;

/// Longest error detail carried by a per-source error message.
pub const SOURCE_ERROR_CHARS: usize = 100;
/// Longest error detail carried by a fatal error message.
pub const FATAL_ERROR_CHARS: usize = 200;

/// Longest entity `escape_html` emits (`&quot;`), semicolon excluded.
const MAX_ENTITY_LEN: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("none of the {count} products has a name or a usable link")]
    Unidentifiable { count: usize },
}

pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Keep at most `max` characters.
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Restock message for one source: a header, then one block per product,
/// blocks separated by a blank line.
///
/// A link that is not an absolute http(s) URL is left out of its block. The
/// batch fails only when no product can be told apart from the others.
pub fn format_products(store: &str, items: &[Product]) -> Result<String, FormatError> {
    let mut blocks = Vec::with_capacity(items.len() + 1);
    blocks.push(format!("🔔 <b>Restock Alert on {}</b>", escape_html(store)));

    let mut identified = 0;
    for item in items {
        let name = item.name.trim();
        let link = match item.url.trim() {
            "" => None,
            raw => {
                let link = checked_link(raw);
                if link.is_none() {
                    warn!(store, product = name, url = raw, "Dropping unusable product link");
                }
                link
            }
        };
        if !name.is_empty() || link.is_some() {
            identified += 1;
        }

        let mut block = if name.is_empty() {
            "• <b>Unknown Product</b>".to_string()
        } else {
            format!("• <b>{}</b>", escape_html(name))
        };
        if !item.price.trim().is_empty() {
            block.push_str(&format!(" - {}", escape_html(item.price.trim())));
        }
        if let Some(link) = link {
            block.push_str(&format!("\n  <a href=\"{}\">View Product</a>", escape_html(&link)));
        }
        blocks.push(block);
    }

    if identified == 0 {
        return Err(FormatError::Unidentifiable { count: items.len() });
    }
    Ok(blocks.join("\n\n"))
}

fn checked_link(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub fn fallback_message(store: &str) -> String {
    format!("🔔 New products available on {}", escape_html(store))
}

pub fn error_message(detail: &str) -> String {
    format!("⚠️ <b>Bot Error</b>\n{}", escape_html(detail))
}

pub fn startup_message() -> String {
    "🤖 <b>Stock Monitor Bot Started</b>\nMonitoring for product availability...".to_string()
}

pub fn stopped_message() -> String {
    "🛑 <b>Bot Stopped</b>\nStock monitoring has been stopped.".to_string()
}

pub fn test_message() -> String {
    "🧪 <b>Bot Test Message</b>\nThis is a test message to verify the bot is working correctly."
        .to_string()
}

/// Split `text` on line boundaries into chunks of at most `limit` units.
///
/// Joining the chunks with `"\n"` gives back `text`. A single line longer than
/// `limit` is the one exception: see [`hard_split`].
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return Vec::new();
    }
    if text_len(text) <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = text_len(line);

        if line_len > limit {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            chunks.extend(hard_split(line, limit));
            continue;
        }

        current = match current.take() {
            Some((mut chunk, len)) if len + 1 + line_len <= limit => {
                chunk.push('\n');
                chunk.push_str(line);
                Some((chunk, len + 1 + line_len))
            }
            Some((chunk, _)) => {
                chunks.push(chunk);
                Some((line.to_string(), line_len))
            }
            None => Some((line.to_string(), line_len)),
        };
    }

    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }
    chunks
}

/// Cut an overlong line into pieces of at most `limit` units. Tags are dropped
/// and entities are never cut, so each piece parses on its own.
fn hard_split(line: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut len = 0;
    for token in plain_tokens(line) {
        let w = text_len(token);
        if len + w > limit && !piece.is_empty() {
            pieces.push(std::mem::take(&mut piece));
            len = 0;
        }
        piece.push_str(token);
        len += w;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Characters and whole `&...;` entities of `line`, with `<...>` tags skipped.
fn plain_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(c) = rest.chars().next() {
        let end = match c {
            '<' => match rest.find('>') {
                Some(close) => {
                    rest = &rest[close + 1..];
                    continue;
                }
                None => c.len_utf8(),
            },
            '&' => rest
                .find(';')
                .filter(|&semi| semi <= MAX_ENTITY_LEN)
                .map_or(c.len_utf8(), |semi| semi + 1),
            _ => c.len_utf8(),
        };
        tokens.push(&rest[..end]);
        rest = &rest[end..];
    }
    tokens
}
