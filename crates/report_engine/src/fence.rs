//! Markdown code fence removal.
//!
//! Grammar: `opener? body closer?` where `opener` is three backticks followed
//! by an optional language tag from [`FENCE_LANGUAGES`], and `closer` is three
//! bare backticks. Surrounding whitespace is trimmed. New fence variants are
//! added to the table, not as new branches.

const FENCE: &str = "```";

/// Language tags recognized after an opening fence, longest first where one
/// tag is a prefix of another.
pub const FENCE_LANGUAGES: &[&str] = &[
    "html",
    "json",
    "markdown",
    "md",
    "javascript",
    "js",
    "xml",
    "text",
];

/// Removes code fences from `text`.
///
/// One opener and one closer are peeled per layer; layers are peeled until
/// nothing changes, which makes the operation idempotent.
pub fn strip_fences(text: &str) -> &str {
    let mut current = text;
    loop {
        let next = strip_layer(current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

fn strip_layer(text: &str) -> &str {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix(FENCE) {
        Some(rest) => strip_language(rest),
        None => trimmed,
    };
    let body = body.strip_suffix(FENCE).unwrap_or(body);
    body.trim()
}

fn strip_language(rest: &str) -> &str {
    for tag in FENCE_LANGUAGES {
        let Some(prefix) = rest.get(..tag.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(tag) {
            continue;
        }
        let after = &rest[tag.len()..];
        let at_boundary = after
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphanumeric());
        if at_boundary {
            return after;
        }
    }
    rest
}
