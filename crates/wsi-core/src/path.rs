//! xAPI path normalization and matching.
//!
//! xAPI paths address commands, statuses, configurations and events on a
//! device. Callers write them either dot-separated (`Audio.Volume`) or
//! space-separated (`Audio Volume`), in any letter case.

/// Convert a space-separated path into its dot-separated form.
///
/// Letter case is preserved, since the cloud API addresses are case sensitive
/// when used in URLs.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.trim().replace(' ', ".")
}

/// Normalized form used for comparisons: dot-separated and lowercase.
fn comparable(path: &str) -> String {
    normalize_path(path).to_ascii_lowercase()
}

/// Strip a trailing wildcard (`Audio.*` or `Audio*`) from a subscription pattern.
fn strip_wildcard(pattern: &str) -> &str {
    pattern
        .strip_suffix(".*")
        .or_else(|| pattern.strip_suffix('*'))
        .unwrap_or(pattern)
}

/// Check whether an actual notification path matches a registered pattern.
///
/// Both sides are normalized (spaces become dots, ASCII lowercase) and the
/// pattern matches when the path *contains* it. A trailing `*` on the pattern
/// is ignored so `Audio.*` subscribes to everything under `Audio`.
///
/// Containment is looser than segment matching: the pattern `Audio` also
/// matches `SystemAudio.Mute`, and an empty pattern matches every path.
/// Register specific patterns to avoid surprise deliveries.
///
/// # Examples
///
/// ```
/// use wsi_core::path_matches;
///
/// assert!(path_matches("Audio.Volume", "Audio"));
/// assert!(path_matches("Standby State", "standby.state"));
/// assert!(!path_matches("Audio.Volume", "Video"));
/// ```
#[must_use]
pub fn path_matches(actual: &str, pattern: &str) -> bool {
    let actual = comparable(actual);
    let pattern = comparable(pattern);
    actual.contains(strip_wildcard(&pattern))
}

/// Split a path into its normalized segments.
#[must_use]
pub fn segments(path: &str) -> Vec<String> {
    normalize_path(path)
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
