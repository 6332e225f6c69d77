// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch rendering and transport-sized chunking.
//!
//! Lengths are measured in UTF-16 code units, the unit Telegram's message
//! limit is counted in. Characters are never split.

use chrono::{DateTime, Utc};

use mirrorline_core::{RelayItem, Role};

/// Smallest chunk size honored; protects the header from being split.
const MIN_CHUNK: usize = 64;

/// One outgoing message and how many items it completes.
///
/// An item split across several chunks is counted on its last piece, so
/// summing `item_count` over delivered chunks gives the number of items that
/// were fully delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub item_count: usize,
}

/// Render `items` as a header plus one role-attributed line per item, split
/// into chunks of at most `max_units` UTF-16 code units.
pub fn render_batch(items: &[RelayItem], max_units: usize) -> Vec<Chunk> {
    let max_units = max_units.max(MIN_CHUNK);
    let mut chunks = Vec::new();
    let Some(header) = header(items) else {
        return chunks;
    };

    let mut current = header;
    let mut count = 0;
    for item in items {
        let line = line(item);
        let line_len = utf16_len(&line);

        if line_len > max_units {
            if !current.is_empty() {
                chunks.push(Chunk {
                    text: std::mem::take(&mut current),
                    item_count: std::mem::take(&mut count),
                });
            }
            let pieces = split_units(&line, max_units);
            let last = pieces.len() - 1;
            for (i, text) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    text,
                    item_count: usize::from(i == last),
                });
            }
            continue;
        }

        let joined_len = utf16_len(&current) + 1 + line_len;
        if current.is_empty() {
            current = line;
        } else if joined_len <= max_units {
            current.push('\n');
            current.push_str(&line);
        } else {
            chunks.push(Chunk {
                text: std::mem::replace(&mut current, line),
                item_count: std::mem::take(&mut count),
            });
        }
        count += 1;
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            text: current,
            item_count: count,
        });
    }
    chunks
}

fn header(items: &[RelayItem]) -> Option<String> {
    let first = items.iter().map(|i| i.enqueued_at).min()?;
    let last = items.iter().map(|i| i.enqueued_at).max()?;
    let noun = if items.len() == 1 { "message" } else { "messages" };
    Some(format!(
        "📨 {} {noun} · {}",
        items.len(),
        time_range(first, last)
    ))
}

fn time_range(first: DateTime<Utc>, last: DateTime<Utc>) -> String {
    if first.date_naive() == last.date_naive() {
        format!(
            "{} {}-{} UTC",
            first.format("%Y-%m-%d"),
            first.format("%H:%M:%S"),
            last.format("%H:%M:%S")
        )
    } else {
        format!(
            "{} - {} UTC",
            first.format("%Y-%m-%d %H:%M:%S"),
            last.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn line(item: &RelayItem) -> String {
    let who = match item.role {
        Role::User => "👤 User",
        Role::Bot => "🤖 Bot",
    };
    format!("{who}: {}", item.content)
}

pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

fn split_units(text: &str, max_units: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut units = 0;
    for ch in text.chars() {
        let width = ch.len_utf16();
        if units + width > max_units {
            pieces.push(std::mem::take(&mut current));
            units = 0;
        }
        current.push(ch);
        units += width;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
