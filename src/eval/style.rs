//! Persona style-match scoring.
//!
//! Detects whether a transformed text actually carries the requested
//! persona's sentence endings, on a discrete scale:
//!
//! - correct-persona endings only: 1.0
//! - wrong-persona endings only: 0.1
//! - both personas mixed: 0.2
//! - no persona markers at all: 0.0
//!
//! Persona nouns ("고양이", "강아지", ...) are stripped before matching so a
//! bare mention of a cat or dog does not count as speaking like one.

use regex::Regex;

use crate::prompts::Category;

/// Cat sentence endings, interjections and signature nouns treated as
/// cat-speak markers.
const CAT_ENDINGS: &[&str] = &[
    // base and most common endings
    "냥", "냐옹", "이냥", "이다냥", "다냥", "냐용", "이냐옹", "다옹", "댜옹",
    // emphatic and emotive forms
    "냐하", "먀", "먀하", "냐앙", "냐우", "냐욧", "냥냥", "냐옹이", "냐앙앙", "냐야", "냐오",
    "냐온", "냐홍", "냐뇽", "냐웅", "냐오옹", "먀옹", "먀먀", "냐햏",
    // slang, doubled and compound forms
    "냔", "뇽", "뇽뇽", "먀옹먀옹", "냐홍이", "냐옹냥", "냐옹냥냥", "냐하하", "냐핫", "먀하하",
    "냐옹옹", "냐아앙", "냐아앙앙", "냥옹", "냔냥", "냐야옹", "냐옹냐옹",
    // spaced and tilde-joined variants
    " 냥", " 냐옹", " 냐", " 냐욧", " 냐옹이", " 냥냥", "~냥", "~냐옹", "~냐", "~냐하",
    "~냐용", "~먀", "~냐앙",
    // trailing-punctuation variants
    "냐옹~", "냐앙~", "냐하~", "냐옹!", "냐앙!", "냐하!", "냐옹.", "냐앙.", "냐하.", "먀.",
    "먀!", "냐야~", "냐옹냐옹~",
    // signature address
    "집사",
];

/// Dog sentence endings, including mixed cat-dog hybrids that count as
/// dog-side markers for outlier detection.
const DOG_ENDINGS: &[&str] = &[
    // base endings
    "멍", "왈", "다멍", "다개", "다왈", "요멍", "왕", "왕왕", "멍멍", "멍멍이", "컹", "컹컹",
    "왈왈", "멍이",
    // doubled and compound forms
    "멍이멍이", "멍왕", "멍멍멍", "멍왈", "멍컹", "왈멍", "멍컹컹", "멍왈왈", "왕멍", "왕왕왕",
    "컹컹컹", "왈왈왈", "컹멍", "멍컹왈", "왕이", "왈이", "몽", "몽몽", "멍뭉", "왈뭉", "몽왈",
    "멍멍왈", "왕왈", "멍몽", "왈몽", "멍몽왈", "왕몽", "컹컹왕", "왕컹", "왕컹컹",
    // spaced and tilde-joined variants
    " 멍", " 왈", "~멍", "~왈", "~왕", "~멍멍", "~왕왕", "~다멍", "~다개", "~다왈", "~컹",
    "~멍이", "~멍멍이",
    // cat-dog hybrid endings (style contamination)
    "냐멍", "냐왈", "냥왈", "냥멍", "냐멍멍", "냐왕", "냥왕", "냥멍멍",
    // signature address
    "주인",
];

/// Persona nouns stripped before ending detection.
const CAT_NOUNS: &[&str] = &[
    "고양이", "냥이", "야옹이", "캣", "냥냥이", "묘", "묘님", "캣초딩", "캣맘", "냥스타그램",
    "묘생", "캣타워", "미스코리냥",
];
const DOG_NOUNS: &[&str] = &[
    "강아지", "댕댕이", "멍멍이", "개", "견", "댕댕", "견생", "개스타그램", "멍스타그램",
    "견주", "멍뭉이",
];

fn alternation(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|")
}

/// Scores persona style markers in transformed text.
pub struct StyleEvaluator {
    cat_pattern: Regex,
    dog_pattern: Regex,
    cat_noun_pattern: Regex,
    dog_noun_pattern: Regex,
}

impl Default for StyleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleEvaluator {
    /// Build the evaluator, compiling the marker tables.
    pub fn new() -> Self {
        // Endings must sit at a word edge: followed by a non-word char,
        // whitespace or end of text.
        let cat_pattern = Regex::new(&format!(r"({})([\W\s]|$)", alternation(CAT_ENDINGS)))
            .expect("cat pattern must compile");
        let dog_pattern = Regex::new(&format!(r"({})([\W\s]|$)", alternation(DOG_ENDINGS)))
            .expect("dog pattern must compile");
        let cat_noun_pattern =
            Regex::new(&alternation(CAT_NOUNS)).expect("cat noun pattern must compile");
        let dog_noun_pattern =
            Regex::new(&alternation(DOG_NOUNS)).expect("dog noun pattern must compile");

        Self {
            cat_pattern,
            dog_pattern,
            cat_noun_pattern,
            dog_noun_pattern,
        }
    }

    /// Strip persona nouns so they cannot trip the ending patterns.
    fn remove_nouns(&self, text: &str) -> String {
        let text = self.cat_noun_pattern.replace_all(text, " ");
        self.dog_noun_pattern.replace_all(&text, " ").into_owned()
    }

    /// Score one transformed text against its requested category.
    pub fn score(&self, category: Category, transformed: &str) -> f64 {
        let stripped = self.remove_nouns(transformed);
        let has_cat = self.cat_pattern.is_match(&stripped);
        let has_dog = self.dog_pattern.is_match(&stripped);

        let (has_wanted, has_other) = match category {
            Category::Cat => (has_cat, has_dog),
            Category::Dog => (has_dog, has_cat),
        };

        match (has_wanted, has_other) {
            (true, true) => 0.2,
            (true, false) => 1.0,
            (false, true) => 0.1,
            (false, false) => 0.0,
        }
    }

    /// Score a batch of records, reading `post_type` and
    /// `transformed_content` from each.
    pub fn score_records(&self, records: &[serde_json::Value]) -> Vec<Option<f64>> {
        records
            .iter()
            .map(|record| {
                let category: Category = record
                    .get("post_type")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())?;
                let transformed = record
                    .get("transformed_content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                Some(self.score(category, transformed))
            })
            .collect()
    }
}
