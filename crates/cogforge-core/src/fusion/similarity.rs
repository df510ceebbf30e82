//! Text similarity, clustering and anchor terms for fusion.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::worker::StageOutput;

/// How two candidate artifacts are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Jaccard index over lowercase word tokens.
    #[default]
    TokenJaccard,
    /// Cosine similarity of term-frequency vectors.
    TermCosine,
    /// 1.0 when the content digests match, else 0.0.
    ExactDigest,
}

fn word_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").ok()).as_ref()
}

fn identifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{3,}").ok())
        .as_ref()
}

/// Lowercase word tokens, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    match word_regex() {
        Some(re) => re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect(),
        None => text.split_whitespace().map(str::to_lowercase).collect(),
    }
}

pub fn jaccard(a: &str, b: &str) -> f64 {
    let a: BTreeSet<String> = tokenize(a).into_iter().collect();
    let b: BTreeSet<String> = tokenize(b).into_iter().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    inter / union
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

pub fn term_cosine(a: &str, b: &str) -> f64 {
    let ta = term_frequencies(a);
    let tb = term_frequencies(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let dot: f64 = ta
        .iter()
        .filter_map(|(t, x)| tb.get(t).map(|y| x * y))
        .sum();
    let mag_a: f64 = ta.values().map(|v| v * v).sum::<f64>().sqrt();
    let mag_b: f64 = tb.values().map(|v| v * v).sum::<f64>().sqrt();
    if mag_a < 1e-9 || mag_b < 1e-9 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

/// Similarity of two candidates in `[0, 1]`.
pub fn similarity(metric: SimilarityMetric, a: &StageOutput, b: &StageOutput) -> f64 {
    match metric {
        SimilarityMetric::TokenJaccard => jaccard(&a.content, &b.content),
        SimilarityMetric::TermCosine => term_cosine(&a.content, &b.content),
        SimilarityMetric::ExactDigest => {
            if a.digest == b.digest {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Group candidates so that every pair inside a cluster reaches `threshold`
/// (complete linkage). Clusters are merged greedily, closest pair first,
/// where the distance between two clusters is their least similar pair. Ties
/// go to the lowest indices. Each cluster lists indices in ascending order;
/// clusters are ordered by their first index.
pub fn cluster(outputs: &[&StageOutput], metric: SimilarityMetric, threshold: f64) -> Vec<Vec<usize>> {
    let n = outputs.len();
    let mut sim = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = similarity(metric, outputs[i], outputs[j]);
            sim[i][j] = s;
            sim[j][i] = s;
        }
    }

    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let link = clusters[a]
                    .iter()
                    .flat_map(|i| clusters[b].iter().map(move |j| (*i, *j)))
                    .map(|(i, j)| sim[i][j])
                    .fold(f64::MAX, f64::min);
                if link < threshold {
                    continue;
                }
                if best.map_or(true, |(_, _, s)| link > s) {
                    best = Some((a, b, link));
                }
            }
        }
        let Some((a, b, _)) = best else { break };
        let absorbed = clusters.remove(b);
        clusters[a].extend(absorbed);
        clusters[a].sort_unstable();
    }
    clusters.sort_by_key(|c| c[0]);
    clusters
}

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "will", "should", "would", "could", "must", "each",
    "when", "then", "than", "into", "only", "also", "some", "more", "most", "such", "there",
    "their", "which", "while", "where", "what", "been", "being", "does", "return", "self",
];

fn identifiers(text: &str) -> Vec<String> {
    match identifier_regex() {
        Some(re) => re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect(),
        None => Vec::new(),
    }
}

/// Most frequent identifier-like terms across the upstream artifacts.
/// Ties are broken alphabetically so the result is deterministic.
pub fn anchor_terms(texts: &[&str], max_terms: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for term in identifiers(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max_terms).map(|(t, _)| t).collect()
}

/// Fraction of `anchors` mentioned in `content`. No anchors means full coverage.
pub fn anchor_coverage(anchors: &[String], content: &str) -> f64 {
    if anchors.is_empty() {
        return 1.0;
    }
    let present: BTreeSet<String> = identifiers(content).into_iter().collect();
    let hits = anchors.iter().filter(|a| present.contains(*a)).count();
    hits as f64 / anchors.len() as f64
}
