//! Beam bookkeeping: active hypotheses, one-token expansion, and finalization.
//!
//! Hypotheses are rows of two parallel arenas (token ids and per-step log-probs) with a fixed
//! stride of `max_size`, indexed by `sentence * width + slot`. The arenas are sized for
//! `bs * K` rows up front and double-buffered, so no round allocates hypothesis storage.
//!
//! A slot is never removed. Finished or forbidden hypotheses are tombstoned by writing
//! `-inf` into their last score entry, which keeps every array rectangular and makes them
//! lose every later comparison.

use candle_core::{Device, Tensor};

use crate::error::Result;

/// Google-NMT style length normalization factor: `((5 + len) / 6) ^ alpha`.
///
/// Returns exactly 1.0 when `alpha` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn norm_length(len: usize, alpha: f32) -> f32 {
    if alpha == 0.0 {
        return 1.0;
    }
    ((5.0 + len as f32) / 6.0).powf(alpha)
}

/// A hypothesis that reached the end token.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalHypothesis {
    /// Token ids, begin and end tokens included
    pub tokens: Vec<u32>,
    /// Length-normalized cumulative log-probability
    pub score: f32,
}

/// Finished hypotheses of one sentence, at most `capacity` of them.
///
/// The token sequence itself is the key, so two different hypotheses can never collide. The
/// first arrival of a key wins.
#[derive(Debug, Clone)]
pub struct Finalized {
    entries: Vec<FinalHypothesis>,
    capacity: usize,
}

impl Finalized {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    #[must_use]
    pub fn contains(&self, tokens: &[u32]) -> bool {
        self.entries.iter().any(|h| h.tokens == tokens)
    }

    /// Insert a hypothesis unless the set is full or already holds the same tokens.
    pub fn insert(&mut self, tokens: &[u32], score: f32) -> bool {
        if self.is_full() || self.contains(tokens) {
            return false;
        }
        self.entries.push(FinalHypothesis {
            tokens: tokens.to_vec(),
            score,
        });
        true
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FinalHypothesis> {
        self.entries.iter()
    }

    /// Entries by descending score; equal scores keep insertion order.
    #[must_use]
    pub fn ranked(&self) -> Vec<&FinalHypothesis> {
        let mut ranked = self.entries.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

/// Every one-token extension of the active hypotheses.
///
/// Candidate `j` of sentence `b` extends slot `j / Vt` of that sentence with token `j % Vt`.
/// Only the new log-prob of each candidate is stored; the rest of its score trace is the
/// parent's, summarized in `base`.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    batch_size: usize,
    width: usize,
    vocab_size: usize,
    /// Last-step log-probs, `(bs, width * Vt)` row-major
    last: Vec<f32>,
    /// Sum of each parent slot's score trace, `(bs, width)`
    base: Vec<f32>,
}

impl CandidatePool {
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Candidates per sentence (`width * Vt`).
    #[must_use]
    pub fn per_sentence(&self) -> usize {
        self.width * self.vocab_size
    }

    /// Parent slot (within the sentence) of candidate `j`.
    #[must_use]
    pub fn parent(&self, j: usize) -> usize {
        j / self.vocab_size
    }

    /// Token appended by candidate `j`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn token(&self, j: usize) -> u32 {
        (j % self.vocab_size) as u32
    }

    /// Last-step log-prob of candidate `j` of sentence `b`.
    #[must_use]
    pub fn last(&self, b: usize, j: usize) -> f32 {
        self.last[b * self.per_sentence() + j]
    }

    /// Cumulative log-probability (sum of the full score trace) of candidate `j` of sentence `b`.
    #[must_use]
    pub fn score(&self, b: usize, j: usize) -> f32 {
        self.base[b * self.width + self.parent(j)] + self.last(b, j)
    }

    /// Mutable last-step log-probs of sentence `b`, laid out `(width, Vt)`.
    pub fn sentence_mut(&mut self, b: usize) -> &mut [f32] {
        let n = self.per_sentence();
        &mut self.last[b * n..(b + 1) * n]
    }

    /// Set every candidate of sentence `b` whose token is not `keep` to `-inf`.
    pub fn forbid_all_but(&mut self, b: usize, keep: u32) {
        let vt = self.vocab_size;
        let keep = keep as usize;
        for row in self.sentence_mut(b).chunks_exact_mut(vt) {
            for (token, logp) in row.iter_mut().enumerate() {
                if token != keep {
                    *logp = f32::NEG_INFINITY;
                }
            }
        }
    }
}

/// Active hypotheses and finished results for a batch of sentences.
#[derive(Debug, Clone)]
pub struct BeamState {
    batch_size: usize,
    beam_size: usize,
    max_size: usize,
    /// Active slots per sentence: 1 before the first expansion, K afterwards
    width: usize,
    /// Current hypothesis length (lt)
    len: usize,
    tokens: Vec<u32>,
    scores: Vec<f32>,
    next_tokens: Vec<u32>,
    next_scores: Vec<f32>,
    finals: Vec<Finalized>,
}

impl BeamState {
    /// One hypothesis per sentence holding only `bos`, with score trace `[0.0]`.
    #[must_use]
    pub fn new(batch_size: usize, beam_size: usize, max_size: usize, bos: u32) -> Self {
        let capacity = batch_size * beam_size * max_size;
        let mut tokens = vec![0; capacity];
        let scores = vec![0.0; capacity];
        for b in 0..batch_size {
            tokens[b * max_size] = bos;
        }
        Self {
            batch_size,
            beam_size,
            max_size,
            width: 1,
            len: 1,
            tokens,
            scores,
            next_tokens: vec![0; capacity],
            next_scores: vec![0.0; capacity],
            finals: (0..batch_size).map(|_| Finalized::new(beam_size)).collect(),
        }
    }

    /// Active slots per sentence.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Current hypothesis length (lt).
    #[must_use]
    pub fn length(&self) -> usize {
        self.len
    }

    /// Number of active rows (`bs * width`).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.batch_size * self.width
    }

    /// Token ids of active row `row`.
    #[must_use]
    pub fn hypothesis(&self, row: usize) -> &[u32] {
        let start = row * self.max_size;
        &self.tokens[start..start + self.len]
    }

    /// Per-step log-probs of active row `row`.
    #[must_use]
    pub fn trace(&self, row: usize) -> &[f32] {
        let start = row * self.max_size;
        &self.scores[start..start + self.len]
    }

    /// Cumulative log-probability of active row `row`.
    #[must_use]
    pub fn score(&self, row: usize) -> f32 {
        self.trace(row).iter().sum()
    }

    /// Active hypotheses as a `(rows, len)` u32 tensor.
    ///
    /// # Errors
    /// Returns an error if tensor creation fails.
    pub fn hyps_tensor(&self, device: &Device) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(self.rows() * self.len);
        for row in 0..self.rows() {
            flat.extend_from_slice(self.hypothesis(row));
        }
        Ok(Tensor::from_vec(flat, (self.rows(), self.len), device)?)
    }

    /// Pair every active row with every vocabulary id.
    ///
    /// `logprobs` is the oracle's `(rows, Vt)` output, row-major; the pool takes ownership of it.
    #[must_use]
    pub fn expand(&self, logprobs: Vec<f32>, vocab_size: usize) -> CandidatePool {
        debug_assert_eq!(logprobs.len(), self.rows() * vocab_size);
        let base = (0..self.rows()).map(|row| self.score(row)).collect();
        CandidatePool {
            batch_size: self.batch_size,
            width: self.width,
            vocab_size,
            last: logprobs,
            base,
        }
    }

    /// Replace the active set with the chosen candidates.
    ///
    /// `picks` holds `K` candidate indices per sentence, `(bs, K)` row-major. After this call
    /// the width is K and every hypothesis is one token longer.
    pub fn select(&mut self, pool: &CandidatePool, picks: &[usize]) {
        let k = self.beam_size;
        debug_assert_eq!(picks.len(), self.batch_size * k);
        debug_assert!(self.len < self.max_size);

        let stride = self.max_size;
        let len = self.len;
        for b in 0..self.batch_size {
            for (slot, &j) in picks[b * k..(b + 1) * k].iter().enumerate() {
                let src = (b * self.width + pool.parent(j)) * stride;
                let dst = (b * k + slot) * stride;
                self.next_tokens[dst..dst + len].copy_from_slice(&self.tokens[src..src + len]);
                self.next_scores[dst..dst + len].copy_from_slice(&self.scores[src..src + len]);
                self.next_tokens[dst + len] = pool.token(j);
                self.next_scores[dst + len] = pool.last(b, j);
            }
        }

        std::mem::swap(&mut self.tokens, &mut self.next_tokens);
        std::mem::swap(&mut self.scores, &mut self.next_scores);
        self.width = k;
        self.len += 1;
    }

    /// Move hypotheses ending in `eos` into their sentence's finalized set.
    ///
    /// Each inserted hypothesis is tombstoned so it cannot be selected again. Sentences that
    /// already hold K finals ignore further arrivals, and hypotheses whose score is already
    /// `-inf` are never finalized. Returns the number of hypotheses inserted.
    pub fn finalize(&mut self, eos: u32, alpha: f32) -> usize {
        let mut inserted = 0;
        for row in 0..self.rows() {
            if self.hypothesis(row).last() != Some(&eos) {
                continue;
            }
            let b = row / self.width;
            if self.finals[b].is_full() {
                continue;
            }

            let mut score = self.score(row);
            if score.is_finite() {
                if alpha != 0.0 {
                    score /= norm_length(self.len, alpha);
                }
                let start = row * self.max_size;
                let tokens = &self.tokens[start..start + self.len];
                if self.finals[b].insert(tokens, score) {
                    inserted += 1;
                }
            }
            self.scores[row * self.max_size + self.len - 1] = f32::NEG_INFINITY;
        }
        inserted
    }

    /// Whether every sentence holds K finalized hypotheses.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.finals.iter().all(Finalized::is_full)
    }

    #[must_use]
    pub fn finals(&self) -> &[Finalized] {
        &self.finals
    }

    #[must_use]
    pub fn into_finals(self) -> Vec<Finalized> {
        self.finals
    }
}
