//! One-shot repair pass for JSON-output completions
//!
//! Models asked for JSON sometimes wrap it in a code fence or prepend a
//! short preamble. The repair pass extracts the first balanced JSON
//! object or array from the text and re-parses it. Exactly one pass is
//! attempted; if extraction fails the node fails with a format error.

use serde_json::Value;

/// Parse `text` as JSON, tolerating surrounding whitespace
pub fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

/// Attempt the repair pass: strip code fences, then extract the first
/// balanced object or array
pub fn repair(text: &str) -> Option<Value> {
    let stripped = strip_code_fence(text);
    if let Some(value) = parse_strict(stripped) {
        return Some(value);
    }
    extract_balanced(stripped).and_then(|candidate| parse_strict(candidate))
}

/// Parse with the repair fallback; `Ok` carries the parsed value and
/// whether repair was needed
pub fn parse_or_repair(text: &str) -> Option<(Value, bool)> {
    if let Some(value) = parse_strict(text) {
        return Some((value, false));
    }
    repair(text).map(|value| (value, true))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Scan for the first `{` or `[` and return the balanced span starting
/// there, honoring string literals and escapes
fn extract_balanced(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b if !in_string && b == open => depth += 1,
            b if !in_string && b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
