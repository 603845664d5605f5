//! Header text to SQL identifier conversion

/// Prefix for names that would otherwise start with a digit
pub const DIGIT_PREFIX: &str = "col_";

/// Prefix of the positional fallback used for headers that sanitize to nothing
pub const UNNAMED_PREFIX: &str = "col_unnamed_";

/// Convert a raw header into a lowercase `[a-z0-9_]` identifier.
///
/// Headers with no usable characters yield `col_unnamed_<index>`; callers
/// treat that marker as "drop this column" (see [`is_unnamed`]).
pub fn sanitize(raw: &str, index: usize) -> String {
    let lowered = raw.trim().to_lowercase();

    let mut name = String::with_capacity(lowered.len());
    let mut in_separator = false;
    for c in lowered.chars() {
        let replacement = match c {
            'ä' => Some("ae"),
            'ö' => Some("oe"),
            'ü' => Some("ue"),
            'ß' => Some("ss"),
            _ => None,
        };

        if let Some(digraph) = replacement {
            name.push_str(digraph);
            in_separator = false;
        } else if c.is_whitespace() || matches!(c, '-' | '.' | '/' | '(' | ')') {
            if !in_separator {
                name.push('_');
                in_separator = true;
            }
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            name.push(c);
            in_separator = false;
        }
        // anything else is dropped without ending a separator run
    }

    let name = collapse_underscores(&name);
    let name = name.trim_matches('_');

    if name.is_empty() {
        tracing::warn!(raw, index, "header sanitized to empty, using fallback name");
        return format!("{}{}", UNNAMED_PREFIX, index);
    }

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{}", DIGIT_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Whether a sanitized name is the positional fallback marker
pub fn is_unnamed(sanitized: &str) -> bool {
    sanitized
        .strip_prefix(UNNAMED_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !last_underscore {
                out.push(c);
            }
            last_underscore = true;
        } else {
            out.push(c);
            last_underscore = false;
        }
    }
    out
}
