//! Text similarity used by scoring and consensus.
//!
//! Two metrics, deliberately different: the voting strategies measure plain
//! token overlap (Jaccard), while the consensus scorer weighs terms by
//! TF-IDF before taking a cosine. Keep them distinct — surface overlap and
//! weighted overlap answer different questions.

use std::collections::{HashMap, HashSet};

/// Characters treated as token boundaries alongside whitespace.
const DELIMITERS: &[char] = &[
    ',', '.', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'',
];

/// Magnitudes below this are treated as zero vectors.
const EPSILON: f64 = 1e-10;

/// Lowercased tokens, split on whitespace and punctuation, single
/// characters dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || DELIMITERS.contains(&c))
        .filter(|token| token.chars().count() > 1)
        .map(|token| token.to_lowercase())
        .collect()
}

/// Token-set overlap: `|A ∩ B| / |A ∪ B|`. Zero when either side has no
/// tokens.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = tokenize(a).into_iter().collect();
    let set_b: HashSet<String> = tokenize(b).into_iter().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Cosine similarity of TF-IDF vectors over the union of both token sets.
///
/// TF is `1 + ln(count)`; IDF is `ln(N / df) + 1`, zero for terms absent
/// from the corpus. When no corpus is supplied the two inputs form it.
/// Returns 0 when either vector is (numerically) zero.
pub fn tfidf_cosine(a: &str, b: &str, corpus: Option<&[String]>) -> f64 {
    let fallback;
    let corpus: &[String] = match corpus {
        Some(docs) if !docs.is_empty() => docs,
        _ => {
            fallback = [a.to_string(), b.to_string()];
            &fallback
        }
    };

    let document_frequency = document_frequencies(corpus);
    let n = corpus.len() as f64;

    let counts_a = term_counts(a);
    let counts_b = term_counts(b);

    let vocabulary: HashSet<&String> = counts_a.keys().chain(counts_b.keys()).collect();

    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;
    for term in vocabulary {
        let idf = match document_frequency.get(term) {
            Some(&df) if df > 0 => (n / df as f64).ln() + 1.0,
            _ => 0.0,
        };
        let weight_a = tf(counts_a.get(term).copied()) * idf;
        let weight_b = tf(counts_b.get(term).copied()) * idf;
        dot += weight_a * weight_b;
        mag_a += weight_a * weight_a;
        mag_b += weight_b * weight_b;
    }

    let mag_a = mag_a.sqrt();
    let mag_b = mag_b.sqrt();
    if mag_a < EPSILON || mag_b < EPSILON {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

fn tf(count: Option<usize>) -> f64 {
    match count {
        Some(c) if c >= 1 => 1.0 + (c as f64).ln(),
        _ => 0.0,
    }
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn document_frequencies(corpus: &[String]) -> HashMap<String, usize> {
    let mut df = HashMap::new();
    for doc in corpus {
        let unique: HashSet<String> = tokenize(doc).into_iter().collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }
    df
}
