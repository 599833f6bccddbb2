use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::RatingSnapshot;
use crate::models::{ItemId, UserId};

/// An item paired with a score: a similarity or a predicted rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
}

impl ScoredItem {
    /// Descending score, ties broken by the lower item id
    pub fn rank_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    }
}

/// Item-item Pearson similarities derived from one rating snapshot
///
/// Each unordered pair is computed once and indexed from both sides, so
/// `similarity(a, b) == similarity(b, a)` holds by construction.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    generation: u64,
    built_at: DateTime<Utc>,
    rating_count: usize,
    item_count: usize,
    pairs: HashMap<(ItemId, ItemId), f64>,
    neighbors: HashMap<ItemId, Vec<ScoredItem>>,
}

impl SimilarityMatrix {
    /// Computes every defined pairwise similarity in the snapshot
    pub fn build(snapshot: &RatingSnapshot, min_co_raters: usize, generation: u64) -> Self {
        // Snapshot order is (user, item), so every per-item column is sorted by user
        let mut columns: BTreeMap<ItemId, Vec<(UserId, f64)>> = BTreeMap::new();
        for entry in snapshot.iter() {
            columns
                .entry(entry.item_id)
                .or_default()
                .push((entry.user_id, entry.score));
        }

        let items: Vec<(&ItemId, &Vec<(UserId, f64)>)> = columns.iter().collect();
        let mut pairs = HashMap::new();
        let mut neighbors: HashMap<ItemId, Vec<ScoredItem>> = HashMap::new();
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for (i, (&item_a, column_a)) in items.iter().enumerate() {
            if column_a.len() < min_co_raters {
                continue;
            }
            for (&item_b, column_b) in items.iter().skip(i + 1) {
                if column_b.len() < min_co_raters {
                    continue;
                }
                co_rated(column_a, column_b, &mut xs, &mut ys);
                if xs.len() < min_co_raters {
                    continue;
                }
                let Some(similarity) = pearson(&xs, &ys) else {
                    continue;
                };
                pairs.insert((item_a, item_b), similarity);
                neighbors.entry(item_a).or_default().push(ScoredItem {
                    item_id: item_b,
                    score: similarity,
                });
                neighbors.entry(item_b).or_default().push(ScoredItem {
                    item_id: item_a,
                    score: similarity,
                });
            }
        }

        for list in neighbors.values_mut() {
            list.sort_by(ScoredItem::rank_order);
        }

        Self {
            generation,
            built_at: Utc::now(),
            rating_count: snapshot.len(),
            item_count: columns.len(),
            pairs,
            neighbors,
        }
    }

    /// Similarity of two distinct items, `None` when undefined
    pub fn similarity(&self, a: ItemId, b: ItemId) -> Option<f64> {
        let key = if a < b { (a, b) } else { (b, a) };
        self.pairs.get(&key).copied()
    }

    /// Items with a defined similarity to `item_id`, most similar first
    pub fn neighbors(&self, item_id: ItemId) -> &[ScoredItem] {
        self.neighbors
            .get(&item_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every stored pair as `(lower id, higher id, similarity)`
    pub fn pairs(&self) -> impl Iterator<Item = (ItemId, ItemId, f64)> + '_ {
        self.pairs.iter().map(|(&(a, b), &s)| (a, b, s))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn rating_count(&self) -> usize {
        self.rating_count
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

/// Collects the scores of users present in both columns
fn co_rated(a: &[(UserId, f64)], b: &[(UserId, f64)], xs: &mut Vec<f64>, ys: &mut Vec<f64>) {
    xs.clear();
    ys.clear();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                xs.push(a[i].1);
                ys.push(b[j].1);
                i += 1;
                j += 1;
            }
        }
    }
}

/// Pearson correlation of two equal-length vectors, centred on their own means
///
/// Returns `None` when either vector has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    if is_constant(xs) || is_constant(ys) {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if !denominator.is_finite() || denominator <= f64::EPSILON {
        return None;
    }
    Some((covariance / denominator).clamp(-1.0, 1.0))
}

// Rounding in the mean can leave a constant vector with a tiny non-zero spread
fn is_constant(values: &[f64]) -> bool {
    match values.split_first() {
        Some((first, rest)) => rest.iter().all(|v| v == first),
        None => true,
    }
}
