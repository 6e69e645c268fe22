//! Helpers for sanitizing data before it enters tracing fields and logs.
//!
//! Storage paths and messenger chat ids identify people and servers; logs
//! only ever carry the redacted forms produced here.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks a chat id down to its last three characters: `123456789` → `***789`.
pub fn redact_chat_id(chat_id: &str) -> String {
    let chars: Vec<char> = chat_id.chars().collect();
    if chars.len() <= 3 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("***{}", tail)
}

/// Shortens free text (error bodies, messages) for log fields.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
