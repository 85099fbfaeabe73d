//! Maximal marginal relevance selection

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Scale rows to unit length; zero rows stay zero
fn normalize_rows(matrix: ArrayView2<f32>) -> Array2<f32> {
    let mut normalized = matrix.to_owned();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    normalized
}

fn normalize(vector: ArrayView1<f32>) -> Array1<f32> {
    let norm = vector.dot(&vector).sqrt();
    if norm > 0.0 {
        &vector / norm
    } else {
        vector.to_owned()
    }
}

/// Pick up to `k` rows of `candidates`, trading similarity to `query` against
/// similarity to rows already picked.
///
/// Each step selects the row maximising
/// `lambda * sim(query, row) - (1 - lambda) * max(sim(row, picked))`.
/// The first pick is the row most similar to the query. Ties go to the lower
/// row index. Returns row indices in selection order.
pub fn maximal_marginal_relevance(
    query: ArrayView1<f32>,
    candidates: ArrayView2<f32>,
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let n = candidates.nrows();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }

    let candidates = normalize_rows(candidates);
    let query = normalize(query);
    let to_query = candidates.dot(&query);

    let mut selected = Vec::with_capacity(k);
    let mut picked = vec![false; n];
    let mut redundancy = Array1::from_elem(n, f32::NEG_INFINITY);

    let first = argmax(to_query.iter().copied().enumerate());
    selected.push(first);
    picked[first] = true;

    while selected.len() < k {
        let last = candidates.row(selected[selected.len() - 1]);
        let to_last = candidates.dot(&last);
        for (r, s) in redundancy.iter_mut().zip(to_last.iter()) {
            *r = r.max(*s);
        }

        let next = argmax(
            (0..n)
                .filter(|&i| !picked[i])
                .map(|i| (i, lambda * to_query[i] - (1.0 - lambda) * redundancy[i])),
        );
        selected.push(next);
        picked[next] = true;
    }

    selected
}

/// Index of the first maximum
fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    let mut seen = false;
    for (i, score) in scores {
        if !seen || score > best.1 {
            best = (i, score);
            seen = true;
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_pure_relevance_orders_by_similarity() {
        let query = arr1(&[1.0, 0.0]);
        let candidates = arr2(&[[0.0, 1.0], [1.0, 0.1], [1.0, 0.5]]);

        let picked = maximal_marginal_relevance(query.view(), candidates.view(), 3, 1.0);
        assert_eq!(picked, vec![1, 2, 0]);
    }

    #[test]
    fn test_diversity_skips_near_duplicate() {
        let query = arr1(&[1.0, 0.0]);
        // Rows 0 and 1 are near-identical; row 2 is less relevant but different
        let candidates = arr2(&[[1.0, 0.05], [1.0, 0.06], [0.7, -0.7]]);

        let relevance_only = maximal_marginal_relevance(query.view(), candidates.view(), 2, 1.0);
        assert_eq!(relevance_only, vec![0, 1]);

        let balanced = maximal_marginal_relevance(query.view(), candidates.view(), 2, 0.5);
        assert_eq!(balanced, vec![0, 2]);
    }

    #[test]
    fn test_k_bounds() {
        let query = arr1(&[1.0, 0.0]);
        let candidates = arr2(&[[1.0, 0.0], [0.0, 1.0]]);

        assert_eq!(
            maximal_marginal_relevance(query.view(), candidates.view(), 8, 0.5).len(),
            2
        );
        assert!(maximal_marginal_relevance(query.view(), candidates.view(), 0, 0.5).is_empty());

        let none = Array2::<f32>::zeros((0, 2));
        assert!(maximal_marginal_relevance(query.view(), none.view(), 8, 0.5).is_empty());
    }

    #[test]
    fn test_zero_vectors_do_not_produce_nan_picks() {
        let query = arr1(&[1.0, 0.0]);
        let candidates = arr2(&[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]);

        let picked = maximal_marginal_relevance(query.view(), candidates.view(), 3, 0.5);
        assert_eq!(picked, vec![1, 0, 2]);
    }
}
