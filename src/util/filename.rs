//! Helpers for client-supplied filenames.

/// Make a client-supplied filename safe for use in headers and logs.
///
/// Path separators become word breaks, runs of whitespace collapse to `_`,
/// anything outside `[A-Za-z0-9._-]` is dropped and leading/trailing `.` and
/// `_` are trimmed, so the result can never name a parent directory. May
/// return an empty string.
pub fn sanitize_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Split a filename into base name and extension (text after the final `.`).
/// The extension is empty when there is no dot.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) => (&filename[..idx], &filename[idx + 1..]),
        None => (filename, ""),
    }
}
