use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SET_COOKIE_RE: Regex = Regex::new(r"([^=]+)=([^;]*)").unwrap();
    static ref UUID_RE: Regex = Regex::new(
        r"(?i)([a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})"
    )
    .unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Split one `Set-Cookie` header value into its name and value.
/// Attributes after the first `;` are ignored.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let cap = SET_COOKIE_RE.captures(header)?;
    let name = cap.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }
    let value = cap.get(2).map_or("", |m| m.as_str()).trim();
    Some((name.to_string(), value.to_string()))
}

/// First UUID-shaped (8-4-4-4-12 hex) token in the text.
pub fn extract_uuid(text: &str) -> Option<String> {
    UUID_RE
        .captures(text)
        .and_then(|cap| cap.get(1).map(|m| m.as_str().to_string()))
}

/// `"Salle 1"` -> `"salle-1"`
pub fn slugify(name: &str) -> String {
    WHITESPACE_RE
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

/// Shorten secrets for logging.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
