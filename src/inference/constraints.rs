//! Hard constraints on a round's candidate pool.
//!
//! Forbidden candidates are not removed: their last-step log-prob becomes `-inf`, so the same
//! K-best selection handles constrained and unconstrained rounds alike.

use tracing::{debug, warn};

use super::beam::CandidatePool;
use crate::tokenizer::SpecialTokens;

/// Forbid every extension except the end token.
///
/// Applied on the round that produces hypotheses of length `max_size`, so every surviving
/// hypothesis ends there.
pub fn force_eos(pool: &mut CandidatePool, eos: u32) {
    for b in 0..pool.batch_size() {
        pool.forbid_all_but(b, eos);
    }
}

/// Force each sentence to extend with its prefix token for this round.
///
/// `prefix[b]` is the prefix token at the current position of sentence `b`. Padding or the end
/// token means the prefix is over for that sentence and nothing is forced. When `best` holds
/// the unconstrained 1-best tokens and a sentence's 1-best is the mask token, forcing is skipped
/// for that sentence too.
///
/// Returns the number of sentences that were forced.
pub fn force_prefix(
    pool: &mut CandidatePool,
    prefix: &[u32],
    special: SpecialTokens,
    best: Option<&[u32]>,
) -> usize {
    debug_assert_eq!(prefix.len(), pool.batch_size());

    let mut forced = 0;
    for (b, &pref) in prefix.iter().enumerate() {
        if pref == special.eos || pref == special.pad {
            continue;
        }
        if let Some(best) = best {
            debug!(sentence = b, pref, best = best[b], "prefix vs unconstrained best");
            if special.msk == Some(best[b]) {
                continue;
            }
        }
        if pref as usize >= pool.vocab_size() {
            warn!(sentence = b, pref, "prefix token outside the target vocabulary; not forced");
            continue;
        }
        pool.forbid_all_but(b, pref);
        forced += 1;
    }
    forced
}
