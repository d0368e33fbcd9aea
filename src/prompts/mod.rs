//! Prompt construction for pet-persona style transfer.
//!
//! A transform prompt is deterministic in (content, category, emotion): persona
//! base rules, the emotion style guide for that persona, writing directives and
//! an echo-JSON output contract. Prompts are plain templates with `{}`-style
//! placeholders substituted by `str::replace`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target persona for a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cat,
    Dog,
}

impl Category {
    /// All supported categories, in canonical order.
    pub fn all() -> &'static [Category] {
        &[Category::Cat, Category::Dog]
    }

    /// Wire name used in records and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cat => "cat",
            Category::Dog => "dog",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cat" => Ok(Category::Cat),
            "dog" => Ok(Category::Dog),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Tone variant within a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Normal,
    Happy,
    Curious,
    Sad,
    Grumpy,
    Angry,
}

impl Emotion {
    /// All supported emotions, in canonical order.
    pub fn all() -> &'static [Emotion] {
        &[
            Emotion::Happy,
            Emotion::Normal,
            Emotion::Grumpy,
            Emotion::Angry,
            Emotion::Curious,
            Emotion::Sad,
        ]
    }

    /// Wire name used in records and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Normal => "normal",
            Emotion::Happy => "happy",
            Emotion::Curious => "curious",
            Emotion::Sad => "sad",
            Emotion::Grumpy => "grumpy",
            Emotion::Angry => "angry",
        }
    }

    /// Sampling weight for the weighted work-list builder. Happy and normal
    /// posts dominate real pet feeds, so they are drawn twice as often.
    pub fn sampling_weight(&self) -> f64 {
        match self {
            Emotion::Happy | Emotion::Normal => 0.25,
            _ => 0.125,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Emotion::Normal),
            "happy" => Ok(Emotion::Happy),
            "curious" => Ok(Emotion::Curious),
            "sad" => Ok(Emotion::Sad),
            "grumpy" => Ok(Emotion::Grumpy),
            "angry" => Ok(Emotion::Angry),
            other => Err(format!("unknown emotion '{}'", other)),
        }
    }
}

/// Persona base rules for cat transformations.
const CAT_BASE_RULES: &str = "\
[역할] 너는 고양이의 말투와 문맥으로 문장을 재생성하는 변환기다.
[규칙]
1. 문장은 반드시 '~냥', '~냐옹', '~이냥', '~다먀', '~댜옹' 등의 어미로 끝나야 한다.
2. 'ㅋㅋㅋ'는 '냐하하!'로, 'ㅎㅎㅎ'는 '먀하하!'로 바꾸되, 각 표현은 한 번만 사용하라.
3. 고양이 기본 이모티콘 정보: 🐈(고양이), 🐾(발자국), 🐈‍⬛(검은 고양이), 🐱(고양이) 이모티콘 중 한개를 골라 전체 글에서 한 번만 사용.
4. 새로운 문장 생성은 입력 원문 두배 이하로 제한.
5. 반드시 한국어로만 작성한다.";

/// Persona base rules for dog transformations.
const DOG_BASE_RULES: &str = "\
[역할] 너는 강아지의 말투와 문맥으로 문장을 재생성하는 변환기다.
[규칙]
1. 문장은 반드시 '~멍', '~냐왈', '~다왈', '~다개', '~요멍' 등의 어미로 끝나야 한다.
2. 반드시 한국어로만 작성한다.
3. 강아지 기본 이모티콘 정보: 🐩(강아지), 🐕(강아지), 🦴, 🐶(강아지) 이모티콘 중 한개를 골라 전체 글에서 한 번만 사용.
4. 새로운 문장 생성은 입력 원문 두배 이하로 제한.";

/// Emotion style guide for a (category, emotion) pair.
fn style_guide(category: Category, emotion: Emotion) -> &'static str {
    match (category, emotion) {
        (Category::Cat, Emotion::Normal) => {
            "기본 규칙을 준수하여 글을 작성하라. 평범한 일상의 고양이처럼 느긋하고 여유로운 톤으로 작성."
        }
        (Category::Cat, Emotion::Happy) => {
            "밝고 들뜬 말투. 하트(❤️), 하트2(💛), 하트3(💙), 빛나는(✨) 이모티콘 중 한 개만 맨 뒤에 사용."
        }
        (Category::Cat, Emotion::Curious) => {
            "궁금해하는 말투. 신기한(🫨), 궁금한(❓) 이모티콘 중 한 개만 문장 맨 뒤에 사용."
        }
        (Category::Cat, Emotion::Sad) => "축 처진 말투, 눈물(😢) 이모티콘 한 개만 맨 뒤에 사용.",
        (Category::Cat, Emotion::Grumpy) => "거만한 성격, 고급스러운 말투.",
        (Category::Cat, Emotion::Angry) => {
            "화났음. 까칠한 말투. 화남(😾), 화남2(💢), 불꽃(🔥) 이모티콘 중 한 개만 문장 맨 뒤에 사용."
        }
        (Category::Dog, Emotion::Normal) => {
            "기본 규칙을 준수하여 글을 작성하라. 평범한 일상에서 즐겁게 지내는 강아지의 느낌으로 작성."
        }
        (Category::Dog, Emotion::Happy) => {
            "밝고 들뜬 말투. 하트(❤️), 하트2(💛), 하트3(💙), 빛나는(✨) 이모티콘 중 한 개만 맨 뒤에 사용."
        }
        (Category::Dog, Emotion::Curious) => {
            "궁금해하는 말투. 신기한(🫨), 궁금한(❓) 이모티콘 중 한 개만 문장 맨 뒤에 사용."
        }
        (Category::Dog, Emotion::Sad) => "풀이 죽은 말투.",
        (Category::Dog, Emotion::Grumpy) => "불만이 있는 말투.",
        (Category::Dog, Emotion::Angry) => {
            "공격적인 말투. 화남(😾), 화남2(💢), 불꽃(🔥) 이모티콘 중 한 개만 문장 맨 뒤에 사용."
        }
    }
}

/// Transform prompt template.
///
/// The reply contract asks the model to echo category, emotion and content so
/// the response can be validated against the request; the content echo is
/// untrusted and reassigned after parsing.
const TRANSFORM_PROMPT: &str = "\
{base_rules}

[현재 감정 상태]
{emotion}

[감정별 스타일 지침]
{style_guide}

[사용자 입력 원문]
{content}

[작성 지침]
- 위 내용을 기반으로, \"{category}\"의 말투와 문체로 글을 **일부 재구성**하라.
- 동물의 사고방식으로 세상을 바라보고 해석하는 모습을 담아라.
- 해당 동물의 습성, 행동 패턴을 자연스럽게 문장에 녹여내라.
- 동물이 실제로 할 수 있는 행동과 감정 표현을 넣어라.
- 원문의 단어와 내용은 유지한다.

반드시 다음 JSON 형식으로 응답해주세요:

{
  \"content\": \"{content}\",
  \"emotion\": \"{emotion}\",
  \"post_type\": \"{category}\",
  \"transformed_content\": \"여기에 변환된 텍스트 작성\"
}";

/// Build the transform prompt for one work item.
pub fn build_transform_prompt(content: &str, category: Category, emotion: Emotion) -> String {
    let base_rules = match category {
        Category::Cat => CAT_BASE_RULES,
        Category::Dog => DOG_BASE_RULES,
    };

    TRANSFORM_PROMPT
        .replace("{base_rules}", base_rules)
        .replace("{style_guide}", style_guide(category, emotion))
        .replace("{category}", category.as_str())
        .replace("{emotion}", emotion.as_str())
        .replace("{content}", content)
}

/// Suitability-check prompt used by the corpus prefilter.
///
/// The model is asked for a bare true/false verdict on whether a scraped
/// caption is usable as style-transfer source material.
const SUITABILITY_PROMPT: &str = "\
아래 텍스트가 고양이-강아지 문장 변환에 적합한지 평가해주세요.

텍스트: \"{text}\"

평가 기준:
1. 반려동물의 행동, 특성, 습관 등을 명확하게 묘사하고 있는가?
2. 영어가 없어야 함
3. 임보, 임시보호, 평생가족, 협찬이라는 단어가 없어야 함
4. 충분한 문맥과 내용이 있는가? (단순 태그나 단어 나열이 아닌가?)
5. 해시태그가 없거나 매우 적어야 함

위 기준을 바탕으로, 이 텍스트가 변환에 적합하면 True, 그렇지 않으면 False로만 답해주세요.";

/// Build the suitability-check prompt for one caption.
pub fn build_suitability_prompt(text: &str) -> String {
    SUITABILITY_PROMPT.replace("{text}", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in Category::all() {
            let parsed: Category = category.as_str().parse().expect("should parse");
            assert_eq!(parsed, *category);
        }
        assert!("hamster".parse::<Category>().is_err());
    }

    #[test]
    fn test_emotion_round_trip() {
        for emotion in Emotion::all() {
            let parsed: Emotion = emotion.as_str().parse().expect("should parse");
            assert_eq!(parsed, *emotion);
        }
        assert!("bored".parse::<Emotion>().is_err());
    }

    #[test]
    fn test_emotion_weights_sum_to_one() {
        let total: f64 = Emotion::all().iter().map(|e| e.sampling_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_prompt_is_deterministic() {
        let a = build_transform_prompt("산책 다녀왔다", Category::Dog, Emotion::Happy);
        let b = build_transform_prompt("산책 다녀왔다", Category::Dog, Emotion::Happy);
        assert_eq!(a, b);
    }

    #[test]
    fn test_transform_prompt_contains_parts() {
        let prompt = build_transform_prompt("오늘은 낮잠을 잤다", Category::Cat, Emotion::Sad);

        assert!(prompt.contains("고양이의 말투"));
        assert!(prompt.contains("오늘은 낮잠을 잤다"));
        assert!(prompt.contains("\"post_type\": \"cat\""));
        assert!(prompt.contains("\"emotion\": \"sad\""));
        assert!(prompt.contains("눈물(😢)"));
    }

    #[test]
    fn test_dog_prompt_uses_dog_rules() {
        let prompt = build_transform_prompt("간식 먹었다", Category::Dog, Emotion::Normal);
        assert!(prompt.contains("강아지의 말투"));
        assert!(!prompt.contains("[역할] 너는 고양이"));
    }

    #[test]
    fn test_suitability_prompt_embeds_text() {
        let prompt = build_suitability_prompt("우리 고양이가 츄르를 좋아해요");
        assert!(prompt.contains("우리 고양이가 츄르를 좋아해요"));
        assert!(prompt.contains("True"));
    }

    #[test]
    fn test_serde_wire_names() {
        assert_eq!(
            serde_json::to_string(&Category::Cat).expect("serialize"),
            "\"cat\""
        );
        assert_eq!(
            serde_json::to_string(&Emotion::Grumpy).expect("serialize"),
            "\"grumpy\""
        );
        let emotion: Emotion = serde_json::from_str("\"happy\"").expect("deserialize");
        assert_eq!(emotion, Emotion::Happy);
    }
}
