use std::collections::{BTreeMap, HashSet};

use super::similarity::{ScoredItem, SimilarityMatrix};
use crate::models::ItemId;

/// Predicts scores for items the user has not rated and returns the best `limit`
///
/// `pred(c) = Σ sim(c, i) * r(i) / Σ |sim(c, i)|` over the user's rated items `i` with a
/// defined similarity to `c`. Candidates with no such item, or whose similarities sum to
/// zero in magnitude, are skipped.
pub fn recommend(
    matrix: &SimilarityMatrix,
    rated: &[(ItemId, f64)],
    limit: usize,
) -> Vec<ScoredItem> {
    if rated.is_empty() || limit == 0 {
        return Vec::new();
    }

    let rated_ids: HashSet<ItemId> = rated.iter().map(|&(item_id, _)| item_id).collect();

    // candidate -> (weighted sum, sum of |sim|)
    let mut sums: BTreeMap<ItemId, (f64, f64)> = BTreeMap::new();
    for &(item_id, score) in rated {
        for neighbor in matrix.neighbors(item_id) {
            if rated_ids.contains(&neighbor.item_id) {
                continue;
            }
            let acc = sums.entry(neighbor.item_id).or_insert((0.0, 0.0));
            acc.0 += neighbor.score * score;
            acc.1 += neighbor.score.abs();
        }
    }

    let mut ranked: Vec<ScoredItem> = sums
        .into_iter()
        .filter(|&(_, (_, weight))| weight > 0.0)
        .map(|(item_id, (weighted, weight))| ScoredItem {
            item_id,
            score: weighted / weight,
        })
        .collect();

    ranked.sort_by(ScoredItem::rank_order);
    ranked.truncate(limit);
    ranked
}

/// The `limit` items most similar to `item_id`, never including `item_id` itself
pub fn similar_items(matrix: &SimilarityMatrix, item_id: ItemId, limit: usize) -> Vec<ScoredItem> {
    matrix
        .neighbors(item_id)
        .iter()
        .filter(|neighbor| neighbor.item_id != item_id)
        .take(limit)
        .copied()
        .collect()
}
