//! Tolerant extraction of JSON from LLM output.
//!
//! Models wrap their answers in markdown fences, prepend prose, or emit
//! trailing commas. This module strips those artifacts before parsing;
//! anything still unparseable afterwards is an invalid-output failure.

use serde_json::Value;

/// Clean a raw model response and parse it as JSON.
pub fn clean_json_response(raw: &str) -> Result<Value, serde_json::Error> {
    let stripped = strip_code_fences(raw.trim());
    let sliced = slice_json_payload(stripped);
    let cleaned = remove_trailing_commas(sliced);
    serde_json::from_str(&cleaned)
}

/// Remove a surrounding ```json ... ``` (or plain ```) fence.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Drop the opening fence line and the closing fence, if present.
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim(),
        None => after_open.trim(),
    }
}

/// Slice from the first `[` or `{` to the matching last `]` or `}`,
/// discarding surrounding prose.
fn slice_json_payload(text: &str) -> &str {
    let start = text.find(['[', '{']);
    let Some(start) = start else { return text };

    let open = text.as_bytes()[start];
    let close = if open == b'[' { ']' } else { '}' };
    match text.rfind(close) {
        Some(end) if end > start => &text[start..=end],
        _ => &text[start..],
    }
}

/// Remove commas that directly precede a closing bracket or brace,
/// respecting string literals.
fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next_significant = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next_significant, Some(']') | Some('}')) {
                    continue;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let value = clean_json_response(r#"[{"a": 1}]"#).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_markdown_fence() {
        let raw = "```json\n[{\"name\": \"case\"}]\n```";
        let value = clean_json_response(raw).unwrap();
        assert_eq!(value[0]["name"], "case");
    }

    #[test]
    fn test_surrounding_prose() {
        let raw = "Here are the test cases:\n[{\"name\": \"x\"}]\nLet me know if you need more.";
        let value = clean_json_response(raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_trailing_commas() {
        let raw = r#"[{"a": 1, "b": [1, 2,],},]"#;
        let value = clean_json_response(raw).unwrap();
        assert_eq!(value[0]["b"][1], 2);
    }

    #[test]
    fn test_comma_inside_string_untouched() {
        let raw = r#"[{"name": "a, b,]"}]"#;
        let value = clean_json_response(raw).unwrap();
        assert_eq!(value[0]["name"], "a, b,]");
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(clean_json_response("not json at all").is_err());
    }
}
