/// Case-insensitive substring check (handles umlauts via Unicode lowercasing)
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: Option<&str>, default: &str) -> String {
    value.unwrap_or(default).to_string()
}
