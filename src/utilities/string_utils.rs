//! String helpers: placeholder interpolation and tool-name normalisation.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utilities::errors::TemplateError;

/// `{identifier}` placeholders. JSON braces (`{"a": 1}`) never match.
static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_\-]*)\}").expect("valid placeholder regex"));
static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel-case regex"));
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid tool-name regex"));

/// Names of the placeholders in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in VARIABLE_PATTERN.captures_iter(template) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace every `{key}` in `template` with `lookup(key)`.
///
/// Fails on the first placeholder without a value. The output depends only
/// on `template` and `lookup`, so resolving twice yields the same text.
pub fn interpolate_only<'a, F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<Cow<'a, str>>,
{
    if !template.contains('{') {
        return Ok(template.to_string());
    }

    let mut result = String::with_capacity(template.len());
    let mut last = 0;
    for cap in VARIABLE_PATTERN.captures_iter(template) {
        let whole = cap.get_match();
        let key = &cap[1];
        let value = lookup(key).ok_or_else(|| TemplateError::missing_key(key))?;
        result.push_str(&template[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&template[last..]);
    Ok(result)
}

/// Normalise a tool name the way models tend to mangle it:
/// `"Read File"`, `"readFile"` and `"read_file"` all become `read_file`.
pub fn sanitize_tool_name(name: &str) -> String {
    let ascii: String = name.chars().filter(|c| c.is_ascii()).collect();
    let split = CAMEL_BOUNDARY.replace_all(ascii.trim(), "${1}_${2}");
    let lowered = split.to_lowercase();
    DISALLOWED_CHARS
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}
