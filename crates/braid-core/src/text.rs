//! UTF-8–safe text previews for log output.
//!
//! `&str[..n]` panics when `n` falls inside a multi-byte character, so the
//! preview helper snaps back to the nearest char boundary before cutting.

/// Produce a one-line preview of `s`, at most `max_bytes` bytes plus an
/// ellipsis when truncated. Newlines are collapsed to spaces.
#[must_use]
pub fn preview(s: &str, max_bytes: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.len() <= max_bytes {
        return flat;
    }
    let mut end = max_bytes;
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &flat[..end])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
