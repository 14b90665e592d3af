//! Maximal Marginal Relevance (MMR) selection.
//!
//! MMR re-selects a candidate pool to balance relevance and diversity:
//! `MMR = λ × sim(candidate, query) − (1 − λ) × max(sim(candidate, selected))`
//!
//! λ = 1.0: pure relevance (same order as similarity search)
//! λ = 0.5: balanced relevance + diversity
//! λ = 0.0: pure diversity

use std::cmp::Ordering;

use crate::similarity::SimilarityMetric;

/// Greedily select up to `k` candidates and return their indices in selection order.
///
/// `candidates` is expected in backend order (descending similarity, ties in
/// insertion order), so a candidate's index doubles as its insertion rank.
/// At each step the unselected candidate with the highest MMR score wins;
/// ties go to the higher query similarity, then to the lower index. The
/// diversity term of the first pick is zero.
pub fn select(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
    metric: SimilarityMetric,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates.iter().map(|c| metric.similarity(query, c)).collect();
    // Highest similarity of each candidate to anything selected so far.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let score = |i: usize| {
            let penalty = if redundancy[i] == f32::NEG_INFINITY { 0.0 } else { redundancy[i] };
            lambda * relevance[i] - (1.0 - lambda) * penalty
        };

        let best = (0..candidates.len()).filter(|&i| !taken[i]).reduce(|best, i| {
            match score(i).partial_cmp(&score(best)).unwrap_or(Ordering::Equal) {
                Ordering::Greater => i,
                Ordering::Less => best,
                Ordering::Equal if relevance[i] > relevance[best] => i,
                Ordering::Equal => best,
            }
        });

        let Some(best) = best else { break };
        taken[best] = true;
        selected.push(best);

        for (i, candidate) in candidates.iter().enumerate() {
            if !taken[i] {
                let sim = metric.similarity(candidate, candidates[best]);
                if sim > redundancy[i] {
                    redundancy[i] = sim;
                }
            }
        }
    }

    selected
}
