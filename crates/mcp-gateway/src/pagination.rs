//! Cursor-based pagination for catalog listings.
//!
//! Cursors are opaque to clients: URL-safe base64 over `{"offset": n}`.
//! An undecodable cursor falls back to the start of the list rather than
//! erroring, so stale cursors degrade gracefully.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::config::defaults;

#[derive(Debug, Deserialize, Serialize)]
struct CursorPayload {
    offset: u64,
}

/// Encode an offset as an opaque cursor.
#[must_use]
pub fn encode_cursor(offset: usize) -> String {
    let payload = CursorPayload { offset: offset as u64 };
    // Serializing a two-field struct to JSON cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor back to an offset. Invalid cursors decode to 0.
#[must_use]
pub fn decode_cursor(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| URL_SAFE_NO_PAD.decode(c).ok())
        .and_then(|raw| serde_json::from_slice::<CursorPayload>(&raw).ok())
        .map_or(0, |payload| payload.offset as usize)
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Slice `items` at the cursor's offset.
///
/// `next_cursor` is present iff the window stopped short of the list end.
/// A zero or missing page size means the default.
#[must_use]
pub fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: Option<usize>) -> Page<T> {
    let offset = decode_cursor(cursor).min(items.len());
    let size = match page_size {
        Some(s) if s > 0 => s,
        _ => defaults::PAGE_SIZE,
    };
    let end = (offset + size).min(items.len());

    Page {
        items: items[offset..end].to_vec(),
        next_cursor: (end < items.len()).then(|| encode_cursor(end)),
    }
}
