use chrono::NaiveDateTime;

use crate::model::MediaKind;

const ALLOWED_PUNCTUATION: &[char] = &['-', '_', '.', '(', ')', ' ', '%'];

/// Drops every character outside ASCII letters, digits and `-_.() %`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(c))
        .collect()
}

/// `<sanitized title>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn build_filename(title: &str, kind: MediaKind, at: NaiveDateTime) -> String {
    let mut stem = sanitize_filename(title);
    if stem.trim().is_empty() {
        stem = "download".to_string();
    }
    format!(
        "{stem}_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        kind.extension()
    )
}
