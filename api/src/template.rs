//! URL template substitution.
//!
//! Endpoint URLs may carry path placeholders in two equivalent spellings,
//! `:name` and `{name}`. A placeholder only starts at a non-word boundary, so
//! the `:` of a scheme or port (`http://host:8080`) is never taken for one.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::warn;

/// Matches `:name` or `{name}` placeholders that are not glued to a word.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\B(?::(\w+)|\{(\w+)\})").expect("Invalid placeholder regex")
});

/// Matches URLs carrying a scheme (or protocol-relative `//`).
static ABSOLUTE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z][a-z\d+\-.]*:)?//").expect("Invalid absolute URL regex")
});

fn capture_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map_or("", |m| m.as_str())
}

/// Returns placeholder names in the order they appear in the template.
///
/// ## Examples
///
/// ```rust
/// use api_module::template::placeholders;
///
/// assert_eq!(placeholders("/api/{id}/:time/info"), vec!["id", "time"]);
/// ```
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|caps| capture_name(&caps))
        .collect()
}

/// Substitutes placeholders from `params`.
///
/// Without a params object the template is returned untouched. Values are
/// rendered without escaping: strings verbatim, everything else through its
/// JSON form. A placeholder with no matching param stays in the URL as
/// written and a warning is logged.
///
/// ## Examples
///
/// ```rust
/// use api_module::template::substitute;
/// use serde_json::json;
///
/// let params = json!({ "id": 123, "time": 999 });
/// let url = substitute("/api/{id}/:time/info", params.as_object());
/// assert_eq!(url, "/api/123/999/info");
/// ```
pub fn substitute(template: &str, params: Option<&Map<String, Value>>) -> String {
    let Some(params) = params else {
        return template.to_string();
    };

    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let name = capture_name(caps);
            match params.get(name) {
                Some(value) => render(value).into_owned(),
                None => {
                    warn!(
                        template,
                        placeholder = name,
                        "URL placeholder has no matching param"
                    );
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn render(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Returns `true` if the URL carries a scheme or starts with `//`.
pub fn is_absolute(url: &str) -> bool {
    ABSOLUTE_URL_RE.is_match(url)
}

/// Joins a base URL and a relative path with exactly one `/` between them.
///
/// ## Examples
///
/// ```rust
/// use api_module::template::combine;
///
/// assert_eq!(combine("http://localhost:7788/", "/api/info"), "http://localhost:7788/api/info");
/// assert_eq!(combine("http://localhost:7788", ""), "http://localhost:7788");
/// ```
pub fn combine(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Resolves a request URL against an optional base, absolute URLs win.
pub fn resolve(base: Option<&str>, url: &str) -> String {
    match base {
        Some(base) if !is_absolute(url) => combine(base, url),
        _ => url.to_string(),
    }
}
