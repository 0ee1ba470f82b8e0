//! Message sending helpers.
//!
//! Telegram's message limit is 4096 characters; we use 4090 for safety.
//! Tries HTML first; falls back to plain text if Telegram rejects the markup.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, ParseMode};
use tracing::warn;

/// Maximum characters per Telegram message (limit is 4096; 4090 for safety).
const CHUNK_MAX: usize = 4090;

/// Split `text` into chunks at newline boundaries, falling back to spaces,
/// then to a hard cut for pathological single tokens.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let cost = if current.is_empty() {
            line.len()
        } else {
            1 + line.len()
        };
        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // Force-split any chunk that is still oversized (one enormous line).
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= CHUNK_MAX {
            result.push(chunk);
            continue;
        }
        let mut remaining = chunk.as_str();
        while remaining.len() > CHUNK_MAX {
            let cut = floor_char_boundary(remaining, CHUNK_MAX);
            let split_at = remaining[..cut]
                .rfind('\n')
                .or_else(|| remaining[..cut].rfind(' '))
                .unwrap_or(cut);
            result.push(remaining[..split_at].to_string());
            remaining = remaining[split_at..].trim_start();
        }
        if !remaining.is_empty() {
            result.push(remaining.to_string());
        }
    }
    result
}

/// Largest byte index ≤ `max` that is a UTF-8 character boundary.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Send `text` to `chat_id` in chunks, HTML first with a plain fallback.
/// Only the final chunk carries the inline keyboard.
pub async fn send_chunked(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) {
    let chunks = split_chunks(text);
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.iter().enumerate() {
        let markup = if i == last { keyboard.clone() } else { None };

        let mut html = bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html);
        if let Some(ref m) = markup {
            html = html.reply_markup(m.clone());
        }

        if html.await.is_err() {
            // HTML rejected (unbalanced tags from the model) - plain retry.
            let mut plain = bot.send_message(chat_id, chunk);
            if let Some(m) = markup {
                plain = plain.reply_markup(m);
            }
            if let Err(e) = plain.await {
                warn!(error = %e, chunk_index = i, "failed to send plain-text fallback");
            }
        }

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Привет!");
        assert_eq!(chunks, vec!["Привет!".to_string()]);
    }

    #[test]
    fn long_text_splits_on_newlines() {
        let line = "а".repeat(2000);
        let text = format!("{line}\n{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn single_giant_line_force_splits() {
        let text = "x".repeat(9000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn force_split_respects_utf8_boundaries() {
        // Cyrillic is 2 bytes per char; a naive byte cut would panic.
        let text = "я".repeat(5000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.concat().chars().count(), 5000);
    }
}
