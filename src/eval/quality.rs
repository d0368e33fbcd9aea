//! Composite quality scoring.
//!
//! Four independent sub-checks averaged into one score:
//! forbidden-word absence (binary), sentence-repetition buckets, the ratio
//! of allowed characters, and emoji-count scoring. Empty or missing text
//! scores 0.0 on every sub-check.

use regex::Regex;
use std::sync::OnceLock;

use crate::dataset::cleanse::{emoji_regex, is_allowed_char};

/// Profanity and slur patterns, Korean and English, including common
/// asterisk-masked spellings.
const FORBIDDEN_PATTERNS: &[&str] = &[
    "씨발", "ㅆㅂ", "ㅅㅂ", "존나", "좆", "병신", "개새끼", "미친", "지랄", "씹", "염병",
    "죽어", "fuck", "shit", "asshole", "bitch", "bastard", "damn", "cunt", "dick", "piss",
    "faggot", "slut", "cock", "pussy", "nigger", "motherfucker", "bullshit", "wtf",
    r"f\*ck", r"s\*it", r"b\*tch", r"씨\*발", r"ㅅ\*ㅂ", r"ㅂ\*ㅅ",
];

fn forbidden_regexes() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FORBIDDEN_PATTERNS
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("forbidden pattern must compile"))
            .collect()
    })
}

fn sentence_split_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s*").expect("sentence split regex must compile"))
}

/// Per-sub-check breakdown of a quality score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    /// 1.0 when no forbidden word appears, else 0.0.
    pub forbidden: f64,
    /// Repetition bucket: max repeat 1 -> 1.0, 2 -> 0.7, 3 -> 0.4, 4+ -> 0.0.
    pub repetition: f64,
    /// Ratio of characters inside the allowed set.
    pub allowed_chars: f64,
    /// Emoji count bucket: 0 -> 0.5, 1-3 -> 1.0, 4+ -> 0.0.
    pub emoji: f64,
    /// Mean of the four sub-checks, rounded to 3 decimals.
    pub total: f64,
}

impl QualityScore {
    fn zero() -> Self {
        Self {
            forbidden: 0.0,
            repetition: 0.0,
            allowed_chars: 0.0,
            emoji: 0.0,
            total: 0.0,
        }
    }
}

/// Scores transformed text on the four quality sub-checks.
#[derive(Default)]
pub struct QualityEvaluator;

impl QualityEvaluator {
    /// Create a quality evaluator.
    pub fn new() -> Self {
        Self
    }

    /// 0.0 when any forbidden pattern matches, 1.0 otherwise.
    pub fn score_forbidden_words(&self, text: &str) -> f64 {
        if forbidden_regexes().iter().any(|re| re.is_match(text)) {
            0.0
        } else {
            1.0
        }
    }

    /// Bucketed penalty for repeated sentences.
    pub fn score_repetition(&self, text: &str) -> f64 {
        let sentences: Vec<&str> = sentence_split_regex()
            .split(text.trim())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if sentences.is_empty() {
            return 1.0;
        }

        let max_repeat = sentences
            .iter()
            .map(|s| sentences.iter().filter(|other| *other == s).count())
            .max()
            .unwrap_or(1);

        match max_repeat {
            0 | 1 => 1.0,
            2 => 0.7,
            3 => 0.4,
            _ => 0.0,
        }
    }

    /// Share of characters inside the allowed set.
    pub fn score_allowed_chars(&self, text: &str) -> f64 {
        let total = text.chars().count();
        if total == 0 {
            return 0.0;
        }
        let allowed = text.chars().filter(|c| is_allowed_char(*c)).count();
        (allowed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Bucketed emoji-count score: none is tolerable, a few is ideal, a wall
    /// of them is spam.
    pub fn score_emoji_usage(&self, text: &str) -> f64 {
        let count = emoji_regex().find_iter(text).count();
        match count {
            0 => 0.5,
            1..=3 => 1.0,
            _ => 0.0,
        }
    }

    /// Full quality score for one text.
    pub fn score(&self, text: Option<&str>) -> QualityScore {
        let text = match text {
            Some(t) if !t.trim().is_empty() => t,
            _ => return QualityScore::zero(),
        };

        let forbidden = self.score_forbidden_words(text);
        let repetition = self.score_repetition(text);
        let allowed_chars = self.score_allowed_chars(text);
        let emoji = self.score_emoji_usage(text);
        let total = (forbidden + repetition + allowed_chars + emoji) / 4.0;

        QualityScore {
            forbidden,
            repetition,
            allowed_chars,
            emoji,
            total: (total * 1000.0).round() / 1000.0,
        }
    }

    /// Score a batch of records on `transformed_content`.
    pub fn score_records(&self, records: &[serde_json::Value]) -> Vec<Option<f64>> {
        records
            .iter()
            .map(|record| {
                let text = record.get("transformed_content").and_then(|v| v.as_str());
                Some(self.score(text).total)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_scores_zero_everywhere() {
        let eval = QualityEvaluator::new();
        for text in [None, Some(""), Some("   ")] {
            let score = eval.score(text);
            assert_eq!(score.forbidden, 0.0);
            assert_eq!(score.repetition, 0.0);
            assert_eq!(score.allowed_chars, 0.0);
            assert_eq!(score.emoji, 0.0);
            assert_eq!(score.total, 0.0);
        }
    }

    #[test]
    fn test_clean_text_scores_high() {
        let eval = QualityEvaluator::new();
        let score = eval.score(Some("오늘 산책 다녀왔다멍! 정말 신났다멍 🐶"));
        assert_eq!(score.forbidden, 1.0);
        assert_eq!(score.repetition, 1.0);
        assert_eq!(score.allowed_chars, 1.0);
        assert_eq!(score.emoji, 1.0);
        assert_eq!(score.total, 1.0);
    }

    #[test]
    fn test_forbidden_word_zeroes_that_check() {
        let eval = QualityEvaluator::new();
        assert_eq!(eval.score_forbidden_words("정말 미친 하루였다"), 0.0);
        assert_eq!(eval.score_forbidden_words("WTF 이게 뭐야"), 0.0);
        assert_eq!(eval.score_forbidden_words("f*ck"), 0.0);
        assert_eq!(eval.score_forbidden_words("평화로운 하루"), 1.0);
    }

    #[test]
    fn test_repetition_buckets() {
        let eval = QualityEvaluator::new();
        assert_eq!(eval.score_repetition("하나다. 둘이다. 셋이다."), 1.0);
        assert_eq!(eval.score_repetition("같다. 같다. 다르다."), 0.7);
        assert_eq!(eval.score_repetition("같다. 같다. 같다."), 0.4);
        assert_eq!(eval.score_repetition("같다. 같다. 같다. 같다."), 0.0);
    }

    #[test]
    fn test_allowed_char_ratio() {
        let eval = QualityEvaluator::new();
        assert_eq!(eval.score_allowed_chars("가나다"), 1.0);
        // 2 of 4 chars disallowed.
        let score = eval.score_allowed_chars("가#나@");
        assert!((score - 0.5).abs() < 1e-9);
        assert_eq!(eval.score_allowed_chars(""), 0.0);
    }

    #[test]
    fn test_emoji_buckets() {
        let eval = QualityEvaluator::new();
        assert_eq!(eval.score_emoji_usage("이모지 없음"), 0.5);
        assert_eq!(eval.score_emoji_usage("하나 🐱"), 1.0);
        assert_eq!(eval.score_emoji_usage("셋 🐱🐶✨"), 1.0);
        assert_eq!(eval.score_emoji_usage("넷 🐱🐶✨🔥"), 0.0);
    }

    #[test]
    fn test_score_records_always_produces_values() {
        let eval = QualityEvaluator::new();
        let records = vec![
            serde_json::json!({"transformed_content": "좋은 하루다냥 🐱"}),
            serde_json::json!({"transformed_content": ""}),
            serde_json::json!({"other": 1}),
        ];
        let scores = eval.score_records(&records);
        assert!(scores[0].expect("present") > 0.5);
        assert_eq!(scores[1], Some(0.0));
        assert_eq!(scores[2], Some(0.0));
    }
}
