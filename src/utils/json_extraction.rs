//! JSON extraction from model replies.
//!
//! The transform prompt asks for a single JSON object, but models routinely
//! wrap it in prose or a markdown fence. Extraction tries, in order:
//! 1. A ```json fenced block
//! 2. A generic ``` fenced block
//! 3. The first balanced `{...}` span anywhere in the reply
//!
//! Candidates are only accepted if they parse as JSON, so a stray brace in
//! surrounding prose cannot shadow the real object.

use regex::Regex;

/// Find the matching closing brace for a string starting at a `{`.
///
/// Tracks string literals and escape sequences so braces inside values are
/// ignored. Returns the byte index of the matching `}`, or `None` when the
/// object never closes (truncated reply).
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract JSON from a ```json ... ``` fenced block.
fn extract_from_json_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    let start = block.find('{')?;
    let end = find_matching_brace(&block[start..])?;
    Some(block[start..=start + end].to_string())
}

/// Extract JSON from a generic ``` ... ``` fenced block.
fn extract_from_generic_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    let start = block.find('{')?;
    let end = find_matching_brace(&block[start..])?;
    Some(block[start..=start + end].to_string())
}

/// Find the first balanced object span that actually parses as JSON.
///
/// Scans every `{` position, not just the first, so replies like
/// `{oops} {"content": ...}` still yield the real object.
fn extract_first_valid_object(content: &str) -> Option<String> {
    for (pos, c) in content.char_indices() {
        if c != '{' {
            continue;
        }
        let substr = &content[pos..];
        if let Some(end) = find_matching_brace(substr) {
            let candidate = &substr[..=end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// Extract the first JSON object from a model reply.
///
/// Returns `None` when the reply contains no parseable object, which the
/// transform layer treats as a retryable failure.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(json) = extract_from_json_code_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json).is_ok() {
            return Some(json);
        }
    }

    if let Some(json) = extract_from_generic_code_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json).is_ok() {
            return Some(json);
        }
    }

    extract_first_valid_object(trimmed)
}
