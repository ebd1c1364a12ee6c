//! Bigram collocation detection.
//!
//! Frequent adjacent token pairs are merged into a single `a_b` token before
//! training so that multi-word terms get one vector. Scoring follows the
//! classic collocation formula
//! `(count(ab) - min_count) / (count(a) * count(b)) * vocab_size`,
//! where `vocab_size` counts both unigrams and bigrams seen so far.

use std::collections::{HashMap, HashSet};

/// Default minimum bigram count below which a pair never scores.
pub const DEFAULT_MIN_COUNT: u64 = 20;

/// Default score a pair must exceed to become a phrase.
pub const DEFAULT_THRESHOLD: f64 = 5.0;

/// Delimiter joining the tokens of a detected phrase.
pub const PHRASE_DELIMITER: char = '_';

/// Learns unigram and bigram counts from token sequences.
#[derive(Debug, Clone)]
pub struct PhraseDetector {
    min_count: u64,
    threshold: f64,
    unigrams: HashMap<String, u64>,
    bigrams: HashMap<(String, String), u64>,
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_COUNT, DEFAULT_THRESHOLD)
    }
}

impl PhraseDetector {
    /// Creates a detector with explicit scoring parameters.
    #[must_use]
    pub fn new(min_count: u64, threshold: f64) -> Self {
        Self {
            min_count,
            threshold,
            unigrams: HashMap::new(),
            bigrams: HashMap::new(),
        }
    }

    /// Counts the tokens and adjacent pairs of one sentence.
    pub fn observe<'a, I>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut previous: Option<&str> = None;
        for token in tokens {
            *self.unigrams.entry(token.to_owned()).or_default() += 1;
            if let Some(left) = previous {
                *self
                    .bigrams
                    .entry((left.to_owned(), token.to_owned()))
                    .or_default() += 1;
            }
            previous = Some(token);
        }
    }

    /// Number of distinct unigrams and bigrams observed.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.unigrams.len() + self.bigrams.len()
    }

    /// Collocation score of `left right`, or `None` when either token or the
    /// pair has never been observed.
    #[must_use]
    pub fn score(&self, left: &str, right: &str) -> Option<f64> {
        let left_count = *self.unigrams.get(left)?;
        let right_count = *self.unigrams.get(right)?;
        let pair_count = *self
            .bigrams
            .get(&(left.to_owned(), right.to_owned()))?;
        Some(collocation_score(
            pair_count,
            left_count,
            right_count,
            self.min_count,
            self.vocab_size(),
        ))
    }

    /// Freezes the learned counts into the set of pairs that score above the
    /// threshold.
    #[must_use]
    pub fn freeze(&self) -> Phraser {
        let vocab_size = self.vocab_size();
        let phrases = self
            .bigrams
            .iter()
            .filter(|((left, right), pair_count)| {
                let left_count = self.unigrams.get(left).copied().unwrap_or_default();
                let right_count = self.unigrams.get(right).copied().unwrap_or_default();
                left_count > 0
                    && right_count > 0
                    && collocation_score(
                        **pair_count,
                        left_count,
                        right_count,
                        self.min_count,
                        vocab_size,
                    ) > self.threshold
            })
            .map(|(pair, _)| pair.clone())
            .collect();
        Phraser { phrases }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "corpus counts stay far below 2^52"
)]
fn collocation_score(
    pair_count: u64,
    left_count: u64,
    right_count: u64,
    min_count: u64,
    vocab_size: usize,
) -> f64 {
    let excess = pair_count as f64 - min_count as f64;
    let denominator = left_count as f64 * right_count as f64;
    excess / denominator * vocab_size as f64
}

/// Frozen phrase table applied to token sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phraser {
    phrases: HashSet<(String, String)>,
}

impl Phraser {
    /// Returns `true` when `left right` is a detected phrase.
    #[must_use]
    pub fn is_phrase(&self, left: &str, right: &str) -> bool {
        self.phrases.contains(&(left.to_owned(), right.to_owned()))
    }

    /// Number of detected phrases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    /// Returns `true` when no pair qualified as a phrase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Merges phrases greedily from left to right. A token consumed by a
    /// phrase never starts another one.
    #[must_use]
    pub fn apply<'a, I>(&self, tokens: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut merged = Vec::new();
        let mut pending: Option<&str> = None;
        for token in tokens {
            pending = match pending {
                Some(left) if self.is_phrase(left, token) => {
                    merged.push(format!("{left}{PHRASE_DELIMITER}{token}"));
                    None
                }
                Some(left) => {
                    merged.push(left.to_owned());
                    Some(token)
                }
                None => Some(token),
            };
        }
        merged.extend(pending.map(str::to_owned));
        merged
    }

    /// Applies the phrase table to a space-separated n-gram and joins the
    /// result with single spaces.
    #[must_use]
    pub fn process(&self, ngram: &str) -> String {
        self.apply(ngram.split_whitespace()).join(" ")
    }
}
