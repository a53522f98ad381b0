//! Keyword ranking views.
//!
//! Turns an extractor's `(word, frequency, tfidf)` list into the two
//! presentation views: a frequency-weighted cloud and a TF-IDF ranking.
//! Both are pure functions of their input; ties keep input order.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WORDS: usize = 50;
pub const DEFAULT_MAX_ITEMS: usize = 20;

const MIN_SIZE: f64 = 12.0;
const SIZE_SPAN: f64 = 28.0;
const MIN_OPACITY: f64 = 0.6;
const OPACITY_SPAN: f64 = 0.4;

/// One keyword as supplied by the external extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordScore {
    pub word: String,
    pub frequency: u64,
    pub tfidf: f64,
}

/// Frequency-view entry with display weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedKeyword {
    pub word: String,
    pub frequency: u64,
    pub tfidf: f64,
    /// Font size in `[12, 40]`.
    pub size: f64,
    /// Opacity in `[0.6, 1.0]`.
    pub opacity: f64,
}

/// Importance-view entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceEntry {
    /// 1-based position in the view.
    pub rank: usize,
    pub word: String,
    pub frequency: u64,
    pub tfidf: f64,
    /// Relative bar width in `[0, 100]`.
    pub bar_width: f64,
}

/// Sorts by frequency (descending, stable), keeps `max_words`, and scales
/// size/opacity linearly between the retained minimum and maximum.
///
/// When every retained frequency is equal the scale fraction is `0`, so all
/// entries get the minimum size and opacity.
#[must_use]
pub fn frequency_view(keywords: &[KeywordScore], max_words: usize) -> Vec<WeightedKeyword> {
    let mut sorted: Vec<&KeywordScore> = keywords.iter().collect();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    sorted.truncate(max_words);

    let (Some(max), Some(min)) = (
        sorted.iter().map(|k| k.frequency).max(),
        sorted.iter().map(|k| k.frequency).min(),
    ) else {
        return Vec::new();
    };

    sorted
        .into_iter()
        .map(|k| {
            let fraction = scale_fraction(k.frequency, min, max);
            WeightedKeyword {
                word: k.word.clone(),
                frequency: k.frequency,
                tfidf: k.tfidf,
                size: MIN_SIZE + fraction * SIZE_SPAN,
                opacity: MIN_OPACITY + fraction * OPACITY_SPAN,
            }
        })
        .collect()
}

/// Sorts by TF-IDF (descending, stable), keeps `max_items`, and attaches a
/// bar width relative to the largest retained TF-IDF.
#[must_use]
pub fn importance_view(keywords: &[KeywordScore], max_items: usize) -> Vec<ImportanceEntry> {
    let mut sorted: Vec<&KeywordScore> = keywords.iter().collect();
    sorted.sort_by(|a, b| tfidf_key(b).total_cmp(&tfidf_key(a)));
    sorted.truncate(max_items);

    let max_tfidf = sorted
        .iter()
        .map(|k| tfidf_key(k))
        .fold(f64::NEG_INFINITY, f64::max);

    sorted
        .into_iter()
        .enumerate()
        .map(|(idx, k)| ImportanceEntry {
            rank: idx + 1,
            word: k.word.clone(),
            frequency: k.frequency,
            tfidf: k.tfidf,
            bar_width: bar_width(tfidf_key(k), max_tfidf),
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn scale_fraction(value: u64, min: u64, max: u64) -> f64 {
    if max == min {
        return 0.0;
    }
    (value - min) as f64 / (max - min) as f64
}

fn bar_width(tfidf: f64, max_tfidf: f64) -> f64 {
    if max_tfidf <= 0.0 || !max_tfidf.is_finite() {
        return 0.0;
    }
    (tfidf / max_tfidf * 100.0).clamp(0.0, 100.0)
}

// NaN sorts last rather than poisoning the comparison.
fn tfidf_key(k: &KeywordScore) -> f64 {
    if k.tfidf.is_nan() {
        f64::NEG_INFINITY
    } else {
        k.tfidf
    }
}
