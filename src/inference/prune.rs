//! K-best selection over a candidate pool.
//!
//! Candidates are ranked by the sum of their score trace. All candidates of a round share the
//! same length, so no length normalization is needed here. Equal scores rank by lower candidate
//! index, and NaN ranks as `-inf`, which makes the order total and the selection deterministic.

use std::cmp::Ordering;

use super::beam::CandidatePool;

fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn compare(pool: &CandidatePool, b: usize, i: usize, j: usize) -> Ordering {
    let si = rank_key(pool.score(b, i));
    let sj = rank_key(pool.score(b, j));
    sj.partial_cmp(&si)
        .unwrap_or(Ordering::Equal)
        .then(i.cmp(&j))
}

/// Indices of the `k` best candidates of every sentence, best first, `(bs, k)` row-major.
///
/// `k` must not exceed [`CandidatePool::per_sentence`].
#[must_use]
pub fn kbest(pool: &CandidatePool, k: usize) -> Vec<usize> {
    let n = pool.per_sentence();
    debug_assert!(k > 0 && k <= n);

    let mut picks = Vec::with_capacity(pool.batch_size() * k);
    let mut order = Vec::with_capacity(n);
    for b in 0..pool.batch_size() {
        order.clear();
        order.extend(0..n);
        let cmp = |i: &usize, j: &usize| compare(pool, b, *i, *j);
        if k < n {
            order.select_nth_unstable_by(k - 1, cmp);
            order.truncate(k);
        }
        order.sort_unstable_by(cmp);
        picks.extend_from_slice(&order);
    }
    picks
}

/// Token the unconstrained 1-best candidate of every sentence would append.
#[must_use]
pub fn one_best_tokens(pool: &CandidatePool) -> Vec<u32> {
    kbest(pool, 1).into_iter().map(|j| pool.token(j)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::beam::BeamState;

    #[test]
    fn test_kbest_orders_by_cumulative_score() {
        let mut state = BeamState::new(1, 2, 5, 1);
        let pool = state.expand(vec![-3.0, -0.1, -0.2, -3.0], 4);
        state.select(&pool, &kbest(&pool, 2));
        assert_eq!(state.hypothesis(0), &[1, 1]);
        assert_eq!(state.hypothesis(1), &[1, 2]);

        // slot 0 has -0.1 so far, slot 1 has -0.2: slot 1's -0.05 beats slot 0's -0.2
        let pool = state.expand(vec![-0.2, -5.0, -5.0, -5.0, -5.0, -0.05, -5.0, -5.0], 4);
        assert_eq!(kbest(&pool, 2), vec![5, 0]);
    }

    #[test]
    fn test_kbest_ties_prefer_lower_index() {
        let state = BeamState::new(2, 3, 5, 1);
        let pool = state.expand(vec![-1.0, -1.0, -1.0, -1.0, -2.0, -1.0, -2.0, -1.0], 4);
        assert_eq!(kbest(&pool, 3), vec![0, 1, 2, 1, 3, 0]);
    }

    #[test]
    fn test_kbest_ranks_nan_and_inf_last() {
        let state = BeamState::new(1, 2, 5, 1);
        let pool = state.expand(vec![f32::NAN, f32::NEG_INFINITY, -7.0, f32::NEG_INFINITY], 4);
        let picks = kbest(&pool, 2);
        assert_eq!(picks[0], 2);
        // NaN and -inf tie; lower index wins
        assert_eq!(picks[1], 0);
    }

    #[test]
    fn test_kbest_is_deterministic() {
        let state = BeamState::new(3, 4, 8, 1);
        let logprobs = (0..3 * 16)
            .map(|i| -f32::from(u8::try_from((i * 7) % 5).unwrap()))
            .collect::<Vec<_>>();
        let pool = state.expand(logprobs, 16);
        assert_eq!(kbest(&pool, 4), kbest(&pool, 4));
    }

    #[test]
    fn test_one_best_tokens() {
        let state = BeamState::new(2, 1, 4, 1);
        let pool = state.expand(vec![-2.0, -1.0, -3.0, -0.5, -0.5, -4.0], 3);
        assert_eq!(one_best_tokens(&pool), vec![1, 0]);
    }
}
