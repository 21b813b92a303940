//! Category label resolution and class statistics.
//!
//! Labels arrive either as integer class ids or as free-form category names.
//! A [`CategoryResolver`] starts in numeric mode and switches permanently to a
//! [`CategoryVocabulary`] the first time it meets a label that does not parse
//! as an integer. From then on every label, numeric-looking or not, is looked
//! up in the vocabulary so that ids stay consistent across the whole index.

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Maps category tokens to contiguous ids in first-seen order, starting at 0.
///
/// Tokens are trimmed and lowercased before lookup, and a whole token maps to
/// one id ("Golden Retriever" is a single category). Integer tokens are
/// stored in canonical form, so "07" and "7" are the same category.
#[derive(Debug, Default)]
pub struct CategoryVocabulary {
    word_index: RwLock<HashMap<String, i64>>,
}

/// On-disk layout of a vocabulary file.
#[derive(Debug, Serialize, Deserialize)]
struct VocabularyFile {
    max_len: usize,
    word_index: BTreeMap<String, i64>,
    #[serde(default)]
    filter: String,
    #[serde(default)]
    disable_filtering: bool,
}

fn normalize(token: &str) -> String {
    let token = token.trim();
    match token.parse::<i64>() {
        Ok(class) => class.to_string(),
        Err(_) => token.to_lowercase(),
    }
}

impl CategoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `token`, assigning the next free id if it is new.
    pub fn fit(&self, token: &str) -> i64 {
        let token = normalize(token);
        if let Some(id) = self.id_of_normalized(&token) {
            return id;
        }
        let mut word_index = self
            .word_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next_id = word_index.len() as i64;
        *word_index.entry(token).or_insert(next_id)
    }

    /// Looks up `token` without extending the vocabulary.
    pub fn id(&self, token: &str) -> Option<i64> {
        self.id_of_normalized(&normalize(token))
    }

    fn id_of_normalized(&self, token: &str) -> Option<i64> {
        self.word_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.word_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tokens ordered by id.
    pub fn tokens(&self) -> Vec<String> {
        let word_index = self
            .word_index
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut tokens: Vec<_> = word_index.iter().collect();
        tokens.sort_by_key(|(_, id)| **id);
        tokens.into_iter().map(|(token, _)| token.clone()).collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let word_index: BTreeMap<String, i64> = self
            .word_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(token, id)| (token.clone(), *id))
            .collect();
        let file = VocabularyFile {
            max_len: 1,
            word_index,
            filter: String::new(),
            disable_filtering: true,
        };
        let bytes = serde_json::to_vec(&file)?;
        fs::write(path, bytes)
            .with_context(|| format!("Failed to write category vocabulary {}", path.display()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let vocabulary = Self::new();
        vocabulary.load_into(path)?;
        Ok(vocabulary)
    }

    /// Replaces the contents of this vocabulary with the file at `path`.
    pub fn load_into(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = fs::read(path)
            .with_context(|| format!("Failed to read category vocabulary {}", path.display()))?;
        let file: VocabularyFile = serde_json::from_slice(&contents)
            .with_context(|| format!("Invalid category vocabulary {}", path.display()))?;

        let mut ids: Vec<i64> = file.word_index.values().copied().collect();
        ids.sort_unstable();
        ensure!(
            ids.iter().copied().eq(0..ids.len() as i64),
            "Category vocabulary {} does not hold contiguous ids starting at 0",
            path.display()
        );

        *self
            .word_index
            .write()
            .unwrap_or_else(PoisonError::into_inner) = file.word_index.into_iter().collect();
        Ok(())
    }
}

/// How raw label tokens become class ids.
#[derive(Debug, Clone, Default)]
pub enum LabelStrategy {
    /// Labels are integer class ids.
    #[default]
    Numeric,
    /// Labels are category names resolved through a shared vocabulary.
    Vocabulary(Arc<CategoryVocabulary>),
}

impl LabelStrategy {
    pub fn vocabulary(&self) -> Option<&Arc<CategoryVocabulary>> {
        match self {
            LabelStrategy::Numeric => None,
            LabelStrategy::Vocabulary(vocabulary) => Some(vocabulary),
        }
    }

    /// Resolves a token to a class id without extending the vocabulary.
    pub fn resolve(&self, token: &str) -> Result<i64> {
        match self {
            LabelStrategy::Numeric => token
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Label '{}' is not an integer class id", token)),
            LabelStrategy::Vocabulary(vocabulary) => match vocabulary.id(token) {
                Some(id) => Ok(id),
                None => bail!("Label '{}' is not in the category vocabulary", token),
            },
        }
    }

    /// Resolves an integer label. Once labels are categorical the integer
    /// is looked up as a category name like any other token.
    pub fn resolve_class(&self, class: i64) -> Result<i64> {
        match self {
            LabelStrategy::Numeric => Ok(class),
            LabelStrategy::Vocabulary(_) => self.resolve(&class.to_string()),
        }
    }
}

/// Per-class row counts and loss weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub counts: BTreeMap<i64, usize>,
    pub weights: BTreeMap<i64, f32>,
}

impl ClassStatistics {
    pub fn record(&mut self, class: i64) {
        *self.counts.entry(class).or_insert(0) += 1;
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Sets `weight[c] = max_count / count[c]`, so the most frequent class
    /// weighs 1.0 and rarer classes proportionally more.
    pub fn compute_weights(&mut self) {
        let max_count = self.counts.values().copied().max().unwrap_or(0);
        self.weights = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(class, count)| (*class, max_count as f32 / *count as f32))
            .collect();
    }

    /// Replaces the computed weights when `overrides` is non-empty.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<i64, f32>) {
        if !overrides.is_empty() {
            self.weights = overrides.clone();
        }
    }

    /// Weight of `class`; classes without a weight count as 1.0.
    pub fn weight(&self, class: i64) -> f32 {
        self.weights.get(&class).copied().unwrap_or(1.0)
    }

    /// Positive/negative weights for binary tasks where class 1 is positive.
    ///
    /// The minority side is weighted 1.0 and the majority side by
    /// `minority / majority`. Returns `(1.0, 1.0)` when either side is empty.
    pub fn binary_weights(&self) -> (f32, f32) {
        let pos = self.counts.get(&1).copied().unwrap_or(0);
        let neg = self.counts.get(&0).copied().unwrap_or(0);
        if pos == 0 || neg == 0 {
            return (1.0, 1.0);
        }
        if pos < neg {
            (1.0, pos as f32 / neg as f32)
        } else {
            (neg as f32 / pos as f32, 1.0)
        }
    }
}

/// Scan-time label resolver: assigns class ids and counts them.
///
/// Integer labels met before the switch to a vocabulary are carried over
/// into it in first-seen order, and their counts are re-keyed, so the ids
/// counted here always match the ids a batch is labelled with.
#[derive(Debug, Default)]
pub struct CategoryResolver {
    strategy: LabelStrategy,
    stats: ClassStatistics,
    numeric_order: Vec<i64>,
    numeric_seen: HashSet<i64>,
}

impl CategoryResolver {
    pub fn new(strategy: LabelStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Resolves `token` to a class id, switching to the vocabulary strategy
    /// on the first non-integer token.
    pub fn resolve(&mut self, token: &str) -> i64 {
        let vocabulary = match &self.strategy {
            LabelStrategy::Vocabulary(vocabulary) => vocabulary.clone(),
            LabelStrategy::Numeric => {
                if let Ok(class) = token.trim().parse::<i64>() {
                    if self.numeric_seen.insert(class) {
                        self.numeric_order.push(class);
                    }
                    return class;
                }
                self.switch_to_vocabulary()
            }
        };
        vocabulary.fit(token)
    }

    /// Resolves an integer label through the current strategy.
    pub fn resolve_class(&mut self, class: i64) -> i64 {
        self.resolve(&class.to_string())
    }

    fn switch_to_vocabulary(&mut self) -> Arc<CategoryVocabulary> {
        let vocabulary = Arc::new(CategoryVocabulary::new());
        let remap: HashMap<i64, i64> = self
            .numeric_order
            .drain(..)
            .map(|class| (class, vocabulary.fit(&class.to_string())))
            .collect();
        self.numeric_seen.clear();

        let counts = std::mem::take(&mut self.stats.counts);
        for (class, count) in counts {
            let class = remap.get(&class).copied().unwrap_or(class);
            *self.stats.counts.entry(class).or_insert(0) += count;
        }
        self.strategy = LabelStrategy::Vocabulary(vocabulary.clone());
        vocabulary
    }

    /// Counts one row of `class`.
    pub fn record(&mut self, class: i64) {
        self.stats.record(class);
    }

    /// Resolves and counts one row.
    pub fn resolve_and_record(&mut self, token: &str) -> i64 {
        let class = self.resolve(token);
        self.record(class);
        class
    }

    pub fn strategy(&self) -> &LabelStrategy {
        &self.strategy
    }

    pub fn stats(&self) -> &ClassStatistics {
        &self.stats
    }

    pub fn into_parts(self) -> (LabelStrategy, ClassStatistics) {
        (self.strategy, self.stats)
    }
}
