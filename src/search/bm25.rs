//! Sparse lexical scoring (spec §4.5): a compact BM25 implementation run
//! over an ad-hoc candidate set, not an FTS5 index.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::HybridCandidateChunk;

const K1: f64 = 1.5;
const B: f64 = 0.75;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

fn tokenize(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// One scorable candidate: a stable key plus the text BM25 scores against.
pub struct SparseCandidate<'a> {
    pub chunk_key: &'a str,
    pub text: &'a str,
}

/// Scores `candidates` against `query`, returning the top `top_k` by BM25
/// score keyed by `chunk_key`. Candidates scoring 0 (no shared terms) are
/// dropped.
pub fn score_sparse(query: &str, candidates: &[SparseCandidate<'_>], top_k: usize) -> HashMap<String, f64> {
    if candidates.is_empty() {
        return HashMap::new();
    }

    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return HashMap::new();
    }

    let tokenized_docs: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(c.text)).collect();
    let doc_lengths: Vec<usize> = tokenized_docs.iter().map(|t| t.len()).collect();
    let avg_doc_length = if doc_lengths.is_empty() {
        1.0
    } else {
        (doc_lengths.iter().sum::<usize>() as f64 / doc_lengths.len() as f64).max(1.0)
    };

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized_docs {
        let unique: HashSet<&str> = tokens.iter().map(|s| s.as_str()).collect();
        for term in unique {
            *document_frequency.entry(term).or_insert(0) += 1;
        }
    }

    let mut query_counter: HashMap<&str, usize> = HashMap::new();
    for term in &query_terms {
        *query_counter.entry(term.as_str()).or_insert(0) += 1;
    }

    let total_docs = candidates.len() as f64;
    let mut scored: Vec<(String, f64)> = Vec::new();

    for ((candidate, tokens), doc_length) in candidates.iter().zip(tokenized_docs.iter()).zip(doc_lengths.iter()) {
        let mut term_frequency: HashMap<&str, usize> = HashMap::new();
        for term in tokens {
            *term_frequency.entry(term.as_str()).or_insert(0) += 1;
        }

        let mut score = 0.0;
        for (&term, &query_weight) in &query_counter {
            let frequency = *term_frequency.get(term).unwrap_or(&0);
            if frequency == 0 {
                continue;
            }

            let docs_with_term = *document_frequency.get(term).unwrap_or(&0) as f64;
            let idf = (1.0 + ((total_docs - docs_with_term + 0.5) / (docs_with_term + 0.5))).ln();
            let norm = frequency as f64 + K1 * (1.0 - B + B * (*doc_length as f64 / avg_doc_length));
            score += query_weight as f64 * idf * ((frequency as f64 * (K1 + 1.0)) / norm.max(1e-9));
        }

        if score > 0.0 {
            scored.push((candidate.chunk_key.to_string(), score));
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored.into_iter().collect()
}

/// Fuses normalized dense+sparse scores into final hybrid-ordered rows,
/// max-normalizing each score family before weighting (spec §4.5: NOT
/// reciprocal-rank fusion).
pub fn fuse(
    candidate_rows: &[(String, String, String, i64, String, String)],
    dense_scores: &HashMap<String, f64>,
    sparse_scores: &HashMap<String, f64>,
    top_k: usize,
    dense_weight: f64,
) -> Vec<HybridCandidateChunk> {
    if candidate_rows.is_empty() {
        return Vec::new();
    }

    let dense_positive: HashMap<&str, f64> = dense_scores
        .iter()
        .filter(|(k, _)| candidate_rows.iter().any(|r| &r.0 == *k))
        .map(|(k, v)| (k.as_str(), v.max(0.0)))
        .collect();
    let sparse_positive: HashMap<&str, f64> = sparse_scores
        .iter()
        .filter(|(k, _)| candidate_rows.iter().any(|r| &r.0 == *k))
        .map(|(k, v)| (k.as_str(), v.max(0.0)))
        .collect();

    let max_dense = dense_positive.values().cloned().fold(0.0_f64, f64::max);
    let max_sparse = sparse_positive.values().cloned().fold(0.0_f64, f64::max);
    let sparse_weight = 1.0 - dense_weight;

    let mut ranked: Vec<HybridCandidateChunk> = Vec::new();
    for (chunk_key, document_id, document_name, chunk_index, context_header, text) in candidate_rows {
        let key = chunk_key.as_str();
        if !dense_positive.contains_key(key) && !sparse_positive.contains_key(key) {
            continue;
        }
        let dense_raw = *dense_positive.get(key).unwrap_or(&0.0);
        let sparse_raw = *sparse_positive.get(key).unwrap_or(&0.0);

        let dense_norm = if max_dense > 0.0 { dense_raw / max_dense } else { 0.0 };
        let sparse_norm = if max_sparse > 0.0 { sparse_raw / max_sparse } else { 0.0 };
        let hybrid_score = dense_weight * dense_norm + sparse_weight * sparse_norm;

        ranked.push(HybridCandidateChunk {
            rank: 0,
            source_id: String::new(),
            chunk_key: chunk_key.clone(),
            document_id: document_id.clone(),
            document_name: document_name.clone(),
            chunk_index: *chunk_index,
            context_header: context_header.clone(),
            text: text.clone(),
            dense_score: dense_raw,
            sparse_score: sparse_raw,
            hybrid_score,
        });
    }

    ranked.sort_by(|a, b| {
        (b.hybrid_score, b.dense_score, b.sparse_score)
            .partial_cmp(&(a.hybrid_score, a.dense_score, a.sparse_score))
            .unwrap()
    });
    ranked.truncate(top_k);

    for (rank, row) in ranked.iter_mut().enumerate() {
        row.rank = rank as i64 + 1;
        row.source_id = format!("S{}", rank + 1);
    }

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_zero_for_disjoint_terms() {
        let candidates = vec![SparseCandidate { chunk_key: "a", text: "apples and oranges" }];
        let scores = score_sparse("quantum physics", &candidates, 10);
        assert!(scores.is_empty());
    }

    #[test]
    fn ranks_higher_term_frequency_first() {
        let candidates = vec![
            SparseCandidate { chunk_key: "low", text: "cats are nice" },
            SparseCandidate { chunk_key: "high", text: "cats cats cats everywhere cats" },
        ];
        let scores = score_sparse("cats", &candidates, 10);
        assert!(scores["high"] > scores["low"]);
    }

    #[test]
    fn fuse_normalizes_by_max_and_sorts_descending() {
        let rows = vec![
            ("k1".to_string(), "d1".to_string(), "Doc".to_string(), 0, "h".to_string(), "t1".to_string()),
            ("k2".to_string(), "d1".to_string(), "Doc".to_string(), 1, "h".to_string(), "t2".to_string()),
        ];
        let dense: HashMap<String, f64> = [("k1".to_string(), 0.8), ("k2".to_string(), 0.4)].into_iter().collect();
        let sparse: HashMap<String, f64> = [("k1".to_string(), 1.0), ("k2".to_string(), 2.0)].into_iter().collect();

        let fused = fuse(&rows, &dense, &sparse, 10, 0.5);
        assert_eq!(fused[0].chunk_key, "k2");
        assert_eq!(fused[0].rank, 1);
        assert_eq!(fused[0].source_id, "S1");
    }

    #[test]
    fn fuse_drops_candidates_with_zero_in_both_families() {
        let rows = vec![("k1".to_string(), "d1".to_string(), "Doc".to_string(), 0, "h".to_string(), "t1".to_string())];
        let fused = fuse(&rows, &HashMap::new(), &HashMap::new(), 10, 0.5);
        assert!(fused.is_empty());
    }

    #[test]
    fn fuse_keeps_candidate_with_negative_dense_score() {
        let rows = vec![("k1".to_string(), "d1".to_string(), "Doc".to_string(), 0, "h".to_string(), "t1".to_string())];
        let dense: HashMap<String, f64> = [("k1".to_string(), -0.3)].into_iter().collect();
        let fused = fuse(&rows, &dense, &HashMap::new(), 10, 0.5);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].dense_score, 0.0);
    }
}
