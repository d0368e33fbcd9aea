//! Best-effort recovery of object arrays from corrupted JSON exports.
//!
//! Interrupted generation runs leave behind files that no longer parse as a
//! whole: a truncated array, missing commas between objects, or string values
//! with broken escaping. Recovery rescans the raw text with a small state
//! machine and salvages every object that still parses on its own.
//!
//! Scanner states and transitions:
//!
//! | state          | input | next state      | action                       |
//! |----------------|-------|-----------------|------------------------------|
//! | OutsideObject  | `{`   | InObject        | open buffer, depth = 1       |
//! | OutsideObject  | other | OutsideObject   | skip                         |
//! | InObject       | `{`   | InObject        | depth += 1                   |
//! | InObject       | `}`   | InObject/Outside| depth -= 1; emit at depth 0  |
//! | InObject       | `"`   | InString        |                              |
//! | InObject       | `\`   | EscapePending   | resume = InObject            |
//! | InString       | `"`   | InObject        |                              |
//! | InString       | `\`   | EscapePending   | resume = InString            |
//! | EscapePending  | any   | resume state    |                              |
//!
//! Tracking escapes outside strings too means an over-escaped export
//! (`{\"content\": ...}`) still scans as one balanced span. An emitted span
//! is parsed with serde; if that fails, a single quote-unescaping pass
//! (`\"` -> `"`) is tried, and an object that still fails is discarded and
//! counted, never partially kept.

use serde_json::Value;
use std::path::Path;

use super::{write_jsonl, DatasetError};

/// Scanner state for the object-recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    OutsideObject,
    InObject,
    InString,
    EscapePending,
}

/// Outcome of scanning one corrupted input.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Objects that parsed, in input order.
    pub objects: Vec<Value>,
    /// Count of balanced spans that failed to parse even after the
    /// quote-unescaping fallback.
    pub failed: usize,
}

fn parse_span(span: &str) -> Option<Value> {
    let trimmed = span.trim().trim_end_matches(',').trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    // Fallback: exports double-escaped quotes inside values; undo once.
    let unescaped = trimmed.replace("\\\"", "\"");
    serde_json::from_str::<Value>(&unescaped).ok()
}

/// Recover standalone JSON objects from arbitrarily corrupted text.
pub fn recover_objects(content: &str) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    let mut state = ScanState::OutsideObject;
    let mut resume = ScanState::InObject;
    let mut depth: usize = 0;
    let mut buffer = String::new();

    for c in content.chars() {
        match state {
            ScanState::OutsideObject => {
                if c == '{' {
                    state = ScanState::InObject;
                    depth = 1;
                    buffer.clear();
                    buffer.push(c);
                }
            }
            ScanState::InObject => {
                buffer.push(c);
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            match parse_span(&buffer) {
                                Some(value) => {
                                    tracing::debug!(
                                        index = report.objects.len(),
                                        "recovered object"
                                    );
                                    report.objects.push(value);
                                }
                                None => {
                                    let preview: String = buffer.chars().take(80).collect();
                                    tracing::warn!(preview = %preview, "discarding unparseable object");
                                    report.failed += 1;
                                }
                            }
                            state = ScanState::OutsideObject;
                        }
                    }
                    '"' => state = ScanState::InString,
                    '\\' => {
                        resume = ScanState::InObject;
                        state = ScanState::EscapePending;
                    }
                    _ => {}
                }
            }
            ScanState::InString => {
                buffer.push(c);
                match c {
                    '"' => state = ScanState::InObject,
                    '\\' => {
                        resume = ScanState::InString;
                        state = ScanState::EscapePending;
                    }
                    _ => {}
                }
            }
            ScanState::EscapePending => {
                buffer.push(c);
                state = resume;
            }
        }
    }

    if state != ScanState::OutsideObject {
        // Trailing unterminated object: truncated mid-write, drop it.
        tracing::warn!("input ended inside an object; dropping trailing fragment");
        report.failed += 1;
    }

    report
}

/// Summary of a repair run.
#[derive(Debug)]
pub struct RepairSummary {
    /// Objects recovered from the input.
    pub recovered: usize,
    /// Balanced spans discarded as unparseable.
    pub failed: usize,
    /// Records written to the output (recovered objects with usable content).
    pub written: usize,
}

/// Repair a corrupted JSON export into a JSONL file.
///
/// Tries a standard whole-file parse first; only when that fails does the
/// state-machine recovery run. Recovered objects are filtered to those with
/// a non-empty `content` field before being written out.
pub fn repair_to_jsonl(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<RepairSummary, DatasetError> {
    let input = input.as_ref();
    let content = std::fs::read_to_string(input)?;

    let (objects, failed) = match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(items)) => (items, 0),
        Ok(single) => (vec![single], 0),
        Err(e) => {
            tracing::info!(error = %e, "whole-file parse failed, running recovery scan");
            let report = recover_objects(&content);
            if report.objects.is_empty() {
                return Err(DatasetError::NothingRecovered(
                    input.display().to_string(),
                ));
            }
            (report.objects, report.failed)
        }
    };

    let recovered = objects.len();
    let usable: Vec<Value> = objects
        .into_iter()
        .filter(|item| {
            item.as_object().is_some()
                && item
                    .get("content")
                    .and_then(|c| c.as_str())
                    .map(|s| !s.trim().is_empty())
                    .unwrap_or(false)
        })
        .collect();

    write_jsonl(output, &usable)?;

    Ok(RepairSummary {
        recovered,
        failed,
        written: usable.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_recover_clean_array_body() {
        let input = r#"{"content": "하나"}, {"content": "둘"}"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.objects[1]["content"], "둘");
    }

    #[test]
    fn test_recover_with_missing_commas() {
        let input = "{\"content\": \"하나\"}\n{\"content\": \"둘\"}{\"content\": \"셋\"}";
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 3);
    }

    #[test]
    fn test_braces_in_strings_do_not_split_objects() {
        let input = r#"{"content": "중괄호 {격리} 테스트", "emotion": "normal"}"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0]["content"], "중괄호 {격리} 테스트");
    }

    #[test]
    fn test_quote_unescape_fallback() {
        // The whole span is balanced but over-escaped; fallback recovers it.
        let input = r#"{\"content\": \"복구 대상\"}"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0]["content"], "복구 대상");
    }

    #[test]
    fn test_unparseable_object_discarded() {
        let input = r#"{"content": "정상"} {broken: no quotes,} {"content": "또 정상"}"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_trailing_fragment_counts_as_failure() {
        let input = r#"{"content": "완전"} {"content": "잘린"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let input = r#"{"content": "그는 \"야옹\"이라 말했다"}"#;
        let report = recover_objects(input);
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0]["content"], "그는 \"야옹\"이라 말했다");
    }

    #[test]
    fn test_repair_to_jsonl_standard_parse() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.jsonl");
        std::fs::write(
            &input,
            r#"[{"content": "하나"}, {"content": ""}, {"other": 1}]"#,
        )
        .expect("write");

        let summary = repair_to_jsonl(&input, &output).expect("repair");
        assert_eq!(summary.recovered, 3);
        assert_eq!(summary.failed, 0);
        // Empty-content and content-less records are filtered out.
        assert_eq!(summary.written, 1);

        let lines = std::fs::read_to_string(&output).expect("read");
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn test_repair_to_jsonl_recovers_broken_file() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("broken.json");
        let output = dir.path().join("out.jsonl");
        // Missing commas make this unparseable as a whole.
        std::fs::write(
            &input,
            "[{\"content\": \"하나\"}\n{\"content\": \"둘\"}]",
        )
        .expect("write");

        let summary = repair_to_jsonl(&input, &output).expect("repair");
        assert_eq!(summary.recovered, 2);
        assert_eq!(summary.written, 2);
    }

    #[test]
    fn test_repair_to_jsonl_nothing_recovered() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("hopeless.json");
        let output = dir.path().join("out.jsonl");
        std::fs::write(&input, "no json here at all").expect("write");

        let err = repair_to_jsonl(&input, &output).unwrap_err();
        assert!(matches!(err, DatasetError::NothingRecovered(_)));
    }
}
