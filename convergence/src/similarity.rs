//! Lexical similarity between gists.
//!
//! Term-frequency cosine over lowercased alphanumeric tokens. This is the
//! default backing for [`crate::scorer::Scorer::similarity`]; scorers with a
//! judged notion of relatedness override the trait method instead.

use std::collections::HashMap;

/// Cosine similarity of the term-frequency vectors of `a` and `b`,
/// in `[0.0, 1.0]`. Either side being empty (after tokenization) yields 0.0.
pub fn lexical_cosine(a: &str, b: &str) -> f64 {
    let left = term_counts(a);
    let right = term_counts(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let dot: f64 = left
        .iter()
        .filter_map(|(term, count)| right.get(term).map(|other| count * other))
        .sum();
    let norm = |counts: &HashMap<String, f64>| {
        counts.values().map(|c| c * c).sum::<f64>().sqrt()
    };

    let denom = norm(&left) * norm(&right);
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom).clamp(0.0, 1.0)
    }
}

fn term_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}
