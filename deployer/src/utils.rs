//! Utility functions

use serde::{Deserialize, Serialize};

/// Longest error text handed to a chat renderer
pub const MAX_CHAT_TEXT: usize = 200;

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Make arbitrary error text safe for a chat message.
///
/// Strips characters that break Markdown/HTML renderers and control characters,
/// collapses whitespace runs into single spaces and caps the result at
/// `max_chars` characters (an ellipsis marks truncation and counts toward the cap).
pub fn sanitize_for_chat(text: &str, max_chars: usize) -> String {
    let stripped: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !is_markup_char(*c))
        .collect();

    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    let keep = max_chars.saturating_sub(3);
    let mut truncated: String = normalized.chars().take(keep).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push_str("...");
    truncated
}

/// Shorthand for [`sanitize_for_chat`] with the default cap
pub fn sanitize_error(text: &str) -> String {
    sanitize_for_chat(text, MAX_CHAT_TEXT)
}

fn is_markup_char(c: char) -> bool {
    matches!(c, '<' | '>' | '&' | '*' | '`' | '[' | ']' | '\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_markup_and_caps_length() {
        let input = format!("<script>alert(1)</script>{}", "x".repeat(300));
        let out = sanitize_error(&input);

        assert!(out.chars().count() <= MAX_CHAT_TEXT);
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(out.starts_with("scriptalert(1)/script"));
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_sanitize_normalizes_whitespace() {
        let out = sanitize_error("error:\n\n  permission\tdenied\r\n");
        assert_eq!(out, "error: permission denied");
    }

    #[test]
    fn test_sanitize_keeps_short_text() {
        assert_eq!(sanitize_error("HTTP 403: Forbidden"), "HTTP 403: Forbidden");
    }

    #[test]
    fn test_sanitize_keeps_underscores_in_names() {
        let out = sanitize_error("Worker demo_worker: tried worker.js, _worker.js");
        assert_eq!(out, "Worker demo_worker: tried worker.js, _worker.js");
    }

    #[test]
    fn test_sanitize_drops_control_chars() {
        let out = sanitize_error("\u{1b}[31mfailed\u{1b}[0m");
        assert_eq!(out, "31mfailed0m");
    }
}
