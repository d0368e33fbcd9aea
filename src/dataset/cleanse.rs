//! Text cleansing for scraped captions and generated transforms.
//!
//! Social-media exports arrive with literal escape sequences, URLs, stray
//! symbols outside the allowed character set, and emphasis spam ("ㅋㅋㅋㅋㅋㅋ",
//! emoji walls). Cleaning normalizes all of that; records whose cleaned
//! `content` or `transformed_content` ends up empty are dropped.

use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

use super::{read_jsonl_values, write_jsonl, DatasetError};

/// Fields cleaned and required to be non-empty in a usable record.
const CLEANED_FIELDS: [&str; 2] = ["content", "transformed_content"];

/// Emoji detection, matching the counting ranges used by the quality scorer.
pub fn emoji_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            "[\u{1F600}-\u{1F64F}\
\u{1F300}-\u{1F5FF}\
\u{1F680}-\u{1F6FF}\
\u{1F1E0}-\u{1F1FF}\
\u{2700}-\u{27BF}\
\u{1F900}-\u{1F9FF}\
\u{2600}-\u{26FF}]",
        )
        .expect("emoji regex must compile")
    })
}

/// Whether a character counts as an emoji for run squashing and counting.
pub fn is_emoji_char(c: char) -> bool {
    matches!(c,
        '\u{1F600}'..='\u{1F64F}'
        | '\u{1F300}'..='\u{1F5FF}'
        | '\u{1F680}'..='\u{1F6FF}'
        | '\u{1F1E0}'..='\u{1F1FF}'
        | '\u{2700}'..='\u{27BF}'
        | '\u{1F900}'..='\u{1F9FF}'
        | '\u{2600}'..='\u{26FF}')
}

/// Whether a character may appear in a cleaned caption.
///
/// Hangul syllables, ASCII alphanumerics, basic punctuation, the emoji
/// ranges above, and the joiners emoji sequences are built from (variation
/// selector, ZWJ). A few sanctioned symbols sit outside the emoji ranges.
pub fn is_allowed_char(c: char) -> bool {
    matches!(c,
        '가'..='힣'
        | 'a'..='z'
        | 'A'..='Z'
        | '0'..='9'
        | ' ' | '.' | ',' | '!' | '?' | '~')
        || is_emoji_char(c)
        || matches!(c,
            '\u{FE0F}'            // variation selector-16
            | '\u{200D}'          // zero-width joiner
            | '\u{2B50}'          // star
            | '\u{1FA70}'..='\u{1FAFF}')
}

fn literal_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Matches escape sequences that survived as literal text ("\r\n", "\n",
    // "\r") plus the mangled "rn" some exporters leave behind.
    RE.get_or_init(|| Regex::new(r"(\\r\\n|\\n|\\r|rn)").expect("escape regex must compile"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("url regex must compile"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex must compile"))
}

/// Squash consecutive repeats of short chunks (1..=5 chars) from 4+ down
/// to 2 repetitions. "ㅋㅋㅋㅋㅋㅋ" becomes "ㅋㅋ", "냥냥냥냥냥" becomes "냥냥".
fn squash_repeated_chunks(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let mut squashed = false;

        for len in 1..=5usize {
            if i + len > chars.len() {
                break;
            }
            let chunk = &chars[i..i + len];
            // Whitespace inside the chunk would merge across word boundaries.
            if chunk.iter().any(|c| c.is_whitespace()) {
                continue;
            }

            let mut repeats = 1;
            while chars[i + repeats * len..]
                .get(..len)
                .map(|next| next == chunk)
                .unwrap_or(false)
            {
                repeats += 1;
            }

            if repeats >= 4 {
                for c in chunk.iter().cycle().take(len * 2) {
                    out.push(*c);
                }
                i += repeats * len;
                squashed = true;
                break;
            }
        }

        if !squashed {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

/// Trim emoji runs of 4+ characters down to their first 3.
fn squash_emoji_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;

    for c in text.chars() {
        if is_emoji_char(c) {
            run += 1;
            if run <= 3 {
                out.push(c);
            }
        } else {
            run = 0;
            out.push(c);
        }
    }

    out
}

/// Clean one text field.
pub fn clean_text(text: &str) -> String {
    let text = literal_escape_regex().replace_all(text, " ");
    let text = url_regex().replace_all(&text, "");
    let text: String = text.chars().filter(|c| is_allowed_char(*c)).collect();
    let text = squash_repeated_chunks(&text);
    let text = squash_emoji_runs(&text);
    let text = whitespace_regex().replace_all(&text, " ");
    text.trim().to_string()
}

/// Summary of a cleansing run.
#[derive(Debug)]
pub struct CleanseSummary {
    /// Records read from the input.
    pub read: usize,
    /// Records written after cleaning.
    pub written: usize,
}

/// Clean `content` and `transformed_content` across a JSONL file.
///
/// A record survives only if both fields are present and non-empty after
/// cleaning.
pub fn clean_jsonl(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<CleanseSummary, DatasetError> {
    let values = read_jsonl_values(input)?;
    let read = values.len();

    let mut cleaned: Vec<Value> = Vec::with_capacity(read);
    for mut value in values {
        if let Some(map) = value.as_object_mut() {
            for field in CLEANED_FIELDS {
                if let Some(Value::String(text)) = map.get(field) {
                    let replacement = clean_text(text);
                    map.insert(field.to_string(), Value::String(replacement));
                }
            }
        }

        let usable = CLEANED_FIELDS.iter().all(|field| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
        });

        if usable {
            cleaned.push(value);
        }
    }

    write_jsonl(output, &cleaned)?;
    tracing::info!(read, written = cleaned.len(), "cleansed dataset");

    Ok(CleanseSummary {
        read,
        written: cleaned.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clean_text_strips_urls() {
        assert_eq!(
            clean_text("사진 보기 https://example.com/abc 귀엽다"),
            "사진 보기 귀엽다"
        );
        assert_eq!(clean_text("링크 www.pets.kr 입니다"), "링크 입니다");
    }

    #[test]
    fn test_clean_text_normalizes_literal_escapes() {
        assert_eq!(clean_text("첫줄\\n둘째줄"), "첫줄 둘째줄");
        assert_eq!(clean_text("첫줄\\r\\n둘째줄"), "첫줄 둘째줄");
    }

    #[test]
    fn test_clean_text_removes_disallowed_chars() {
        // Hashtags and brackets are not in the allowed set.
        assert_eq!(clean_text("#고양이 [일상] 냥스타그램"), "고양이 일상 냥스타그램");
    }

    #[test]
    fn test_clean_text_squashes_repeats() {
        assert_eq!(clean_text("냥냥냥냥냥냥냥냥"), "냥냥");
        assert_eq!(clean_text("왈왈왈왈왈"), "왈왈");
        // Three repeats stay untouched.
        assert_eq!(clean_text("멍멍멍"), "멍멍멍");
    }

    #[test]
    fn test_clean_text_squashes_emoji_runs() {
        // Identical emoji spam is handled by the chunk rule...
        assert_eq!(clean_text("귀엽다🐱🐱🐱🐱🐱"), "귀엽다🐱🐱");
        // ...mixed emoji walls by the run rule.
        assert_eq!(clean_text("좋다😍✨🔥❤🐱"), "좋다😍✨🔥");
        assert_eq!(clean_text("좋아😍😍"), "좋아😍😍");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  안녕   하세요  "), "안녕 하세요");
    }

    #[test]
    fn test_allowed_chars() {
        assert!(is_allowed_char('가'));
        assert!(is_allowed_char('z'));
        assert!(is_allowed_char('🐱'));
        assert!(is_allowed_char('✨'));
        assert!(is_allowed_char('\u{FE0F}'));
        assert!(!is_allowed_char('#'));
        assert!(!is_allowed_char('@'));
    }

    #[test]
    fn test_clean_jsonl_drops_empty_records() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");

        let lines = [
            r#"{"content": "고양이 최고", "transformed_content": "고양이 최고다냥 🐱"}"#,
            // transformed_content cleans down to empty
            r#"{"content": "강아지", "transformed_content": "@@@"}"#,
            // missing transformed_content entirely
            r#"{"content": "토끼"}"#,
        ];
        std::fs::write(&input, lines.join("\n")).expect("write");

        let summary = clean_jsonl(&input, &output).expect("clean");
        assert_eq!(summary.read, 3);
        assert_eq!(summary.written, 1);

        let values = read_jsonl_values(&output).expect("read output");
        assert_eq!(values[0]["content"], "고양이 최고");
    }
}
