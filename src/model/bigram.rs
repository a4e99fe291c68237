//! Reference score oracle backed by a token transition table.
//!
//! The next-token distribution depends only on the last token of each hypothesis:
//! `log_softmax(transitions[last])`. The encoders pass the ids through as f32 so the decoder's
//! context handling is exercised end-to-end even though the table never looks at them.

use candle_core::{D, DType, Device, Result, Tensor};
use candle_nn::VarBuilder;

use super::oracle::ScoreOracle;
use crate::inference::context::EncoderContext;

/// Tensor name of the `(Vt, Vt)` transition logits in a weights file.
pub const TRANSITIONS: &str = "transitions";

/// Bigram score oracle.
pub struct BigramOracle {
    /// Row `t` holds next-token logits after token `t`
    transitions: Tensor,
    vocab_size: usize,
    device: Device,
}

impl BigramOracle {
    /// Wrap a square `(Vt, Vt)` logits table.
    ///
    /// # Errors
    /// Returns an error if the table is not square or is empty.
    pub fn new(transitions: Tensor) -> Result<Self> {
        let (rows, cols) = transitions.dims2()?;
        if rows != cols || rows == 0 {
            return Err(candle_core::Error::Msg(format!(
                "transition table must be square and non-empty, got ({rows}, {cols})"
            )));
        }
        let device = transitions.device().clone();
        Ok(Self {
            transitions: transitions.to_dtype(DType::F32)?,
            vocab_size: rows,
            device,
        })
    }

    /// Load the table through a variable builder.
    ///
    /// # Errors
    /// Returns an error if the `transitions` tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn load(vocab_size: usize, vb: VarBuilder) -> Result<Self> {
        let transitions = vb.get((vocab_size, vocab_size), TRANSITIONS)?;
        Self::new(transitions)
    }
}

impl ScoreOracle for BigramOracle {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn encode_source(&self, src: &Tensor, _src_mask: &Tensor) -> Result<Tensor> {
        src.to_dtype(DType::F32)?.unsqueeze(D::Minus1)
    }

    fn encode_prefix(&self, pre: &Tensor, _pre_mask: &Tensor) -> Result<Tensor> {
        pre.to_dtype(DType::F32)?.unsqueeze(D::Minus1)
    }

    fn next_token_logprobs(
        &self,
        hyps: &Tensor,
        _causal_mask: &Tensor,
        ctx: &EncoderContext,
    ) -> Result<Tensor> {
        let (n, lt) = hyps.dims2()?;
        if ctx.rows() != n {
            return Err(candle_core::Error::Msg(format!(
                "encoder context has {} rows for {n} hypotheses",
                ctx.rows()
            )));
        }
        let last = hyps.narrow(1, lt - 1, 1)?.squeeze(1)?.contiguous()?;
        let logits = self.transitions.index_select(&last, 0)?;
        candle_nn::ops::log_softmax(&logits, D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mask::create_causal_mask;

    #[test]
    fn test_rows_are_normalized_log_probs() {
        let device = Device::Cpu;
        let table = Tensor::new(&[[0.0f32, 1.0, 2.0], [3.0, 0.0, 0.0], [0.0, 0.0, 0.0]], &device)
            .unwrap();
        let oracle = BigramOracle::new(table).unwrap();

        let src = Tensor::new(&[[1u32, 2]], &device).unwrap();
        let mask = Tensor::ones((1, 1, 2), DType::U8, &device).unwrap();
        let ctx = EncoderContext::encode(&oracle, &src, &mask, None).unwrap();

        let hyps = Tensor::new(&[[1u32, 0]], &device).unwrap();
        let causal = create_causal_mask(2, &device).unwrap();
        let out = oracle.next_token_logprobs(&hyps, &causal, &ctx).unwrap();
        assert_eq!(out.dims(), &[1, 3]);

        let row: Vec<f32> = out.squeeze(0).unwrap().to_vec1().unwrap();
        let total: f32 = row.iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        // After token 0 the table prefers token 2.
        assert!(row[2] > row[1] && row[1] > row[0]);
    }

    #[test]
    fn test_rejects_non_square_table() {
        let device = Device::Cpu;
        let table = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        assert!(BigramOracle::new(table).is_err());
    }
}
