//! Contract between the beam search and the translation model.

use candle_core::{Device, Result, Tensor};

use crate::inference::context::EncoderContext;

/// A sequence-to-sequence model seen from the decoder.
///
/// The decoder only needs three things from a model: a source encoder, a prefix encoder, and a
/// next-token distribution for every active hypothesis. Both encoders run once per batch; the
/// decoder then calls [`ScoreOracle::next_token_logprobs`] once per round and blocks until it
/// returns.
pub trait ScoreOracle {
    /// Size of the target vocabulary (Vt).
    fn vocab_size(&self) -> usize;

    /// Device the oracle's tensors live on.
    fn device(&self) -> &Device;

    /// Encode padded source ids.
    ///
    /// * `src` - `(bs, ls)` u32 token ids
    /// * `src_mask` - `(bs, 1, ls)` u8, 1 for real tokens and 0 for padding
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    fn encode_source(&self, src: &Tensor, src_mask: &Tensor) -> Result<Tensor>;

    /// Encode padded target-side prefixes; same layout as [`ScoreOracle::encode_source`].
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    fn encode_prefix(&self, pre: &Tensor, pre_mask: &Tensor) -> Result<Tensor>;

    /// Log-probabilities of the next token for every active hypothesis.
    ///
    /// * `hyps` - `(I, lt)` u32 hypotheses, begin token first
    /// * `causal_mask` - `(1, lt, lt)` u8 no-look-ahead mask
    /// * `ctx` - encoder context with `I` rows
    ///
    /// Returns `(I, Vt)` f32 log-probabilities for position `lt`.
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    fn next_token_logprobs(
        &self,
        hyps: &Tensor,
        causal_mask: &Tensor,
        ctx: &EncoderContext,
    ) -> Result<Tensor>;
}
