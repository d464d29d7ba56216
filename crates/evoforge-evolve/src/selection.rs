//! Fitness-proportional and tournament selection.

use std::collections::HashSet;

use rand::seq::{index, SliceRandom};
use rand::Rng;

use evoforge_core::types::AgentId;

fn weight(fitness: f64) -> f64 {
    if fitness.is_finite() && fitness > 0.0 {
        fitness
    } else {
        0.0
    }
}

/// Roulette-wheel sampling without replacement.
///
/// Returns `min(k, candidates.len())` distinct ids. Each draw picks with
/// probability proportional to fitness among the ids not yet drawn; when
/// every remaining weight is zero the draw is uniform.
pub fn roulette_wheel<R: Rng + ?Sized>(
    candidates: &[(AgentId, f64)],
    k: usize,
    rng: &mut R,
) -> Vec<AgentId> {
    let mut pool: Vec<(AgentId, f64)> = candidates
        .iter()
        .map(|(id, f)| (id.clone(), weight(*f)))
        .collect();
    let mut chosen = Vec::with_capacity(k.min(pool.len()));

    while chosen.len() < k && !pool.is_empty() {
        let total: f64 = pool.iter().map(|(_, w)| w).sum();
        let idx = if total > 0.0 {
            let mut ticket = rng.gen::<f64>() * total;
            // Float rounding can leave the ticket past the last bucket.
            let mut pick = pool.iter().rposition(|(_, w)| *w > 0.0).unwrap_or(0);
            for (i, (_, w)) in pool.iter().enumerate() {
                if *w > 0.0 && ticket < *w {
                    pick = i;
                    break;
                }
                ticket -= w;
            }
            pick
        } else {
            rng.gen_range(0..pool.len())
        };
        chosen.push(pool.swap_remove(idx).0);
    }
    chosen
}

/// Tournament size for a population: `max(2, round(n * ratio))`, capped at `n`.
pub fn tournament_size(population: usize, ratio: f64) -> usize {
    let size = (population as f64 * ratio).round() as usize;
    size.max(2).min(population)
}

/// Tournament selection.
///
/// Every candidate enters exactly one tournament against distinct random
/// opponents; the fittest entrant wins. The `k` returned ids are drawn with
/// replacement from the winners.
pub fn tournament<R: Rng + ?Sized>(
    candidates: &[(AgentId, f64)],
    k: usize,
    size_ratio: f64,
    rng: &mut R,
) -> Vec<AgentId> {
    let n = candidates.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let size = tournament_size(n, size_ratio);

    let winners: Vec<usize> = (0..n)
        .map(|entrant| {
            let opponents = index::sample(rng, n - 1, size.saturating_sub(1));
            opponents
                .into_iter()
                .map(|j| if j >= entrant { j + 1 } else { j })
                .fold(entrant, |best, other| {
                    if weight(candidates[other].1) > weight(candidates[best].1) {
                        other
                    } else {
                        best
                    }
                })
        })
        .collect();

    (0..k)
        .map(|_| candidates[winners[rng.gen_range(0..winners.len())]].0.clone())
        .collect()
}

/// Pair each selected parent with a distinct partner from the same pool.
///
/// `None` means the parent is mutated: there was no other id to pair with,
/// or the pair was already used in this batch.
pub fn pair_parents<R: Rng + ?Sized>(
    selected: &[AgentId],
    rng: &mut R,
) -> Vec<(AgentId, Option<AgentId>)> {
    let mut distinct: Vec<&AgentId> = Vec::new();
    for id in selected {
        if !distinct.contains(&id) {
            distinct.push(id);
        }
    }

    let mut used: HashSet<(AgentId, AgentId)> = HashSet::new();
    selected
        .iter()
        .map(|parent| {
            let others: Vec<&&AgentId> = distinct.iter().filter(|id| **id != parent).collect();
            let partner = others.choose(rng).map(|id| (**id).clone());
            match partner {
                Some(partner) => {
                    let key = if *parent < partner {
                        (parent.clone(), partner.clone())
                    } else {
                        (partner.clone(), parent.clone())
                    };
                    if used.insert(key) {
                        (parent.clone(), Some(partner))
                    } else {
                        (parent.clone(), None)
                    }
                }
                None => (parent.clone(), None),
            }
        })
        .collect()
}
