//! Normalization of free-form strings into workflow identifiers.

/// Maximum identifier length accepted by the workflow naming grammar.
pub const MAX_NAME_LEN: usize = 63;

/// Converts `name` into an identifier made of `[a-z0-9_-]` that does not
/// start with a digit and is at most 63 characters long.
///
/// The result may be empty; callers must treat that as an error.
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '.' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();

    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }

    // Only ASCII remains, so byte truncation is a char boundary.
    sanitized.truncate(MAX_NAME_LEN);
    sanitized
}
