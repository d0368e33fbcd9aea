//! Batch work lists and distribution statistics.
//!
//! A work item is one requested transformation. Work lists are built either
//! as the full cartesian product of contents x categories x emotions, or by
//! weighted sampling of two distinct (category, emotion) pairs per content
//! until a target count is reached.

pub mod checkpoint;
pub mod driver;

pub use checkpoint::Checkpoint;
pub use driver::{BatchConfig, BatchDriver, BatchOutcome};

use rand::distributions::{Distribution as RandDistribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::prompts::{Category, Emotion};

/// One requested transformation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Source caption text.
    pub content: String,
    /// Target persona.
    pub post_type: Category,
    /// Target emotion.
    pub emotion: Emotion,
}

/// Build the full cartesian product work list, in stable order:
/// contents outermost, then categories, then emotions.
pub fn cartesian_work_list(contents: &[String]) -> Vec<WorkItem> {
    let mut items = Vec::with_capacity(contents.len() * Category::all().len() * Emotion::all().len());
    for content in contents {
        for &post_type in Category::all() {
            for &emotion in Emotion::all() {
                items.push(WorkItem {
                    content: content.clone(),
                    post_type,
                    emotion,
                });
            }
        }
    }
    items
}

/// Build a target-count work list by cycling contents and drawing two
/// (category, emotion) pairs per content.
///
/// Emotions are drawn with their sampling weights; the second pair for a
/// content is redrawn until it differs from the first, so no content gets
/// the same transformation twice in a row.
pub fn sampled_work_list<R: Rng>(
    contents: &[String],
    target_count: usize,
    rng: &mut R,
) -> Vec<WorkItem> {
    if contents.is_empty() || target_count == 0 {
        return Vec::new();
    }

    let emotions = Emotion::all();
    let weights: Vec<f64> = emotions.iter().map(|e| e.sampling_weight()).collect();
    let emotion_index = WeightedIndex::new(&weights).expect("weights are positive");
    let categories = Category::all();

    let mut items = Vec::with_capacity(target_count);
    let mut content_index = 0usize;

    while items.len() < target_count {
        let content = &contents[content_index % contents.len()];
        content_index += 1;

        let first_category = categories[rng.gen_range(0..categories.len())];
        let first_emotion = emotions[emotion_index.sample(rng)];
        items.push(WorkItem {
            content: content.clone(),
            post_type: first_category,
            emotion: first_emotion,
        });

        if items.len() >= target_count {
            break;
        }

        let mut second_category = categories[rng.gen_range(0..categories.len())];
        let mut second_emotion = emotions[emotion_index.sample(rng)];
        while second_category == first_category && second_emotion == first_emotion {
            second_category = categories[rng.gen_range(0..categories.len())];
            second_emotion = emotions[emotion_index.sample(rng)];
        }

        items.push(WorkItem {
            content: content.clone(),
            post_type: second_category,
            emotion: second_emotion,
        });
    }

    items.truncate(target_count);
    items
}

/// Category/emotion breakdown of a set of work items or results.
#[derive(Debug, Default)]
pub struct WorkDistribution {
    total: usize,
    by_category: BTreeMap<&'static str, usize>,
    by_emotion: BTreeMap<&'static str, usize>,
}

impl WorkDistribution {
    /// Tally a set of (category, emotion) pairs.
    pub fn tally(pairs: impl IntoIterator<Item = (Category, Emotion)>) -> Self {
        let mut dist = Self::default();
        for (category, emotion) in pairs {
            dist.total += 1;
            *dist.by_category.entry(category.as_str()).or_insert(0) += 1;
            *dist.by_emotion.entry(emotion.as_str()).or_insert(0) += 1;
        }
        dist
    }

    /// Total tallied pairs.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Count for one category.
    pub fn category_count(&self, category: Category) -> usize {
        self.by_category.get(category.as_str()).copied().unwrap_or(0)
    }

    /// Count for one emotion.
    pub fn emotion_count(&self, emotion: Emotion) -> usize {
        self.by_emotion.get(emotion.as_str()).copied().unwrap_or(0)
    }
}

impl fmt::Display for WorkDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total: {}", self.total)?;
        writeln!(f, "by category:")?;
        for (name, count) in &self.by_category {
            let percent = 100.0 * *count as f64 / self.total.max(1) as f64;
            writeln!(f, "  {}: {} ({:.2}%)", name, count, percent)?;
        }
        writeln!(f, "by emotion:")?;
        for (name, count) in &self.by_emotion {
            let percent = 100.0 * *count as f64 / self.total.max(1) as f64;
            writeln!(f, "  {}: {} ({:.2}%)", name, count, percent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_cartesian_work_list_covers_all_pairs() {
        let contents = vec!["하나".to_string(), "둘".to_string()];
        let items = cartesian_work_list(&contents);

        // 2 contents x 2 categories x 6 emotions
        assert_eq!(items.len(), 24);
        assert_eq!(items[0].content, "하나");
        assert_eq!(items[0].post_type, Category::Cat);

        let dist = WorkDistribution::tally(items.iter().map(|i| (i.post_type, i.emotion)));
        assert_eq!(dist.category_count(Category::Cat), 12);
        assert_eq!(dist.category_count(Category::Dog), 12);
        assert_eq!(dist.emotion_count(Emotion::Happy), 4);
    }

    #[test]
    fn test_sampled_work_list_hits_target() {
        let contents = vec!["하나".to_string(), "둘".to_string(), "셋".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        let items = sampled_work_list(&contents, 11, &mut rng);
        assert_eq!(items.len(), 11);
    }

    #[test]
    fn test_sampled_pairs_differ_per_content() {
        let contents = vec!["하나".to_string()];
        let mut rng = StdRng::seed_from_u64(42);
        let items = sampled_work_list(&contents, 100, &mut rng);

        // Items come in pairs per content cycle; each pair must differ.
        for pair in items.chunks(2) {
            if pair.len() == 2 {
                assert!(
                    pair[0].post_type != pair[1].post_type || pair[0].emotion != pair[1].emotion
                );
            }
        }
    }

    #[test]
    fn test_sampled_work_list_empty_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sampled_work_list(&[], 10, &mut rng).is_empty());
        assert!(sampled_work_list(&["하나".to_string()], 0, &mut rng).is_empty());
    }

    #[test]
    fn test_distribution_display() {
        let dist = WorkDistribution::tally(vec![
            (Category::Cat, Emotion::Happy),
            (Category::Dog, Emotion::Happy),
            (Category::Cat, Emotion::Sad),
        ]);
        let text = dist.to_string();
        assert!(text.contains("total: 3"));
        assert!(text.contains("cat: 2"));
        assert!(text.contains("happy: 2 (66.67%)"));
    }
}
