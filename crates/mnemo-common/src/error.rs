//! Bounded truncation for persisted diagnostics
//!
//! Every error message written to an `error_info` column passes through
//! here so a pathological upstream error cannot bloat the database.

use crate::MAX_ERROR_INFO_CHARS;

/// Clip a diagnostic message to [`MAX_ERROR_INFO_CHARS`] characters.
///
/// Truncation is by character, not byte, so multi-byte text never gets cut
/// mid-codepoint. Clipped messages are suffixed with an ellipsis marker.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_INFO_CHARS {
        return message.to_string();
    }
    let mut clipped: String = message
        .chars()
        .take(MAX_ERROR_INFO_CHARS.saturating_sub(1))
        .collect();
    clipped.push('…');
    clipped
}
