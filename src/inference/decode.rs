//! Constrained beam search.
//!
//! One round per hypothesis length: query the oracle, expand every active hypothesis by every
//! vocabulary id, apply the end-of-sequence and prefix constraints, keep the K best candidates
//! per sentence, and move finished hypotheses into the finalized sets. Rounds stop once every
//! sentence holds K finals, and never run past the round producing length `max_size`.

use candle_core::{DType, Tensor};
use tracing::{Level, debug, enabled, trace, warn};

use super::beam::{BeamState, Finalized};
use super::constraints::{force_eos, force_prefix};
use super::context::{EncoderContext, pad_rows};
use super::prune::{kbest, one_best_tokens};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::model::mask::create_causal_mask;
use crate::model::oracle::ScoreOracle;
use crate::tokenizer::SpecialTokens;

/// Beam search over a [`ScoreOracle`].
pub struct BeamSearch<'a, O: ScoreOracle + ?Sized> {
    oracle: &'a O,
    config: DecoderConfig,
    special: SpecialTokens,
    vocab_size: usize,
}

impl<'a, O: ScoreOracle + ?Sized> BeamSearch<'a, O> {
    /// Build a decoder, checking the configuration against the oracle's vocabulary.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the vocabulary is empty, the beam is wider than the
    /// vocabulary, a special token id is out of range, or mask-aware prefix forcing is
    /// requested without a mask token.
    pub fn new(oracle: &'a O, config: DecoderConfig, special: SpecialTokens) -> Result<Self> {
        config.validate()?;

        let vocab_size = oracle.vocab_size();
        if vocab_size == 0 {
            return Err(Error::Config("target vocabulary is empty".into()));
        }
        if config.beam_size > vocab_size {
            return Err(Error::Config(format!(
                "beam_size {} exceeds vocabulary size {vocab_size}",
                config.beam_size
            )));
        }
        for (name, id) in [("pad", special.pad), ("bos", special.bos), ("eos", special.eos)] {
            if id as usize >= vocab_size {
                return Err(Error::Config(format!(
                    "{name} id {id} outside vocabulary of size {vocab_size}"
                )));
            }
        }
        if config.mask_prefix && special.msk.is_none() {
            return Err(Error::Config(
                "mask-aware prefix forcing needs a <msk> token in the target vocabulary".into(),
            ));
        }

        Ok(Self {
            oracle,
            config,
            special,
            vocab_size,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one batch.
    ///
    /// `ctx` holds one row per sentence. `prefix`, when given, holds one target prefix per
    /// sentence (begin token first, same layout as the hypotheses); shorter prefixes are padded.
    ///
    /// Returns the finalized hypotheses of every sentence, in batch order.
    ///
    /// # Errors
    /// Returns an error if the oracle fails or returns a distribution of the wrong shape.
    pub fn traverse(
        &self,
        ctx: &EncoderContext,
        prefix: Option<&[Vec<u32>]>,
    ) -> Result<Vec<Finalized>> {
        let bs = ctx.rows();
        let k = self.config.beam_size;
        let max_size = self.config.max_size;
        let device = self.oracle.device();

        if bs == 0 {
            return Ok(Vec::new());
        }
        if prefix.is_some_and(|p| p.len() != bs) {
            return Err(Error::Config(format!(
                "{} prefixes for a batch of {bs} sentences",
                prefix.map_or(0, <[_]>::len)
            )));
        }
        let (pref, lp) = prefix.map_or((Vec::new(), 0), |p| pad_rows(p, self.special.pad));
        if lp > max_size {
            debug!(lp, max_size, "prefix longer than max_size; trailing prefix tokens unused");
        }

        let mut state = BeamState::new(bs, k, max_size, self.special.bos);
        let mut wide: Option<EncoderContext> = None;

        loop {
            let lt = state.length();
            if lt == 2 && wide.is_none() {
                wide = Some(ctx.replicate(k)?);
            }
            let round_ctx = wide.as_ref().unwrap_or(ctx);

            let hyps = state.hyps_tensor(device)?;
            let causal = create_causal_mask(lt, device)?;
            let next = self.oracle.next_token_logprobs(&hyps, &causal, round_ctx)?;
            let logprobs = self.check_distribution(&next, state.rows())?;

            let mut pool = state.expand(logprobs, self.vocab_size);

            if lt == max_size - 1 {
                force_eos(&mut pool, self.special.eos);
            } else if lt < lp {
                let column = (0..bs).map(|b| pref[b * lp + lt]).collect::<Vec<_>>();
                let best = self.config.mask_prefix.then(|| one_best_tokens(&pool));
                force_prefix(&mut pool, &column, self.special, best.as_deref());
            }

            let picks = kbest(&pool, k);
            state.select(&pool, &picks);
            if enabled!(Level::TRACE) {
                dump_beam(&state);
            }

            state.finalize(self.special.eos, self.config.alpha);

            if state.is_complete() {
                break;
            }
            if state.length() >= max_size {
                for (b, finals) in state.finals().iter().enumerate() {
                    if !finals.is_full() {
                        warn!(
                            sentence = b,
                            found = finals.len(),
                            beam_size = k,
                            "beam exhausted at max_size before reaching beam_size finals"
                        );
                    }
                }
                break;
            }
        }

        Ok(state.into_finals())
    }

    fn check_distribution(&self, next: &Tensor, rows: usize) -> Result<Vec<f32>> {
        let expected = (rows, self.vocab_size);
        if next.dims() != [rows, self.vocab_size].as_slice() {
            return Err(Error::OracleShape {
                expected,
                got: next.dims().to_vec(),
            });
        }
        Ok(next.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
    }
}

fn dump_beam(state: &BeamState) {
    let width = state.width();
    for row in 0..state.rows() {
        trace!(
            "batch {} beam {}\tlogP={:.6}\t{:?}",
            row / width,
            row % width,
            state.score(row),
            state.hypothesis(row)
        );
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Result as CandleResult};

    use super::*;
    use crate::inference::context::prepare_source;

    const VT: usize = 5;
    const SPECIAL: SpecialTokens = SpecialTokens {
        pad: 0,
        bos: 1,
        eos: 2,
        msk: None,
    };

    /// Oracle returning the same distribution for every hypothesis.
    struct Flat {
        row: [f32; VT],
        device: Device,
    }

    impl ScoreOracle for Flat {
        fn vocab_size(&self) -> usize {
            VT
        }

        fn device(&self) -> &Device {
            &self.device
        }

        fn encode_source(&self, src: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            src.to_dtype(DType::F32)
        }

        fn encode_prefix(&self, pre: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            pre.to_dtype(DType::F32)
        }

        fn next_token_logprobs(
            &self,
            hyps: &Tensor,
            _causal_mask: &Tensor,
            _ctx: &EncoderContext,
        ) -> CandleResult<Tensor> {
            let (n, _) = hyps.dims2()?;
            let data = self.row.repeat(n);
            Tensor::from_vec(data, (n, VT), &self.device)
        }
    }

    /// Oracle that answers with a fixed, wrong number of columns.
    struct Narrow(Device);

    impl ScoreOracle for Narrow {
        fn vocab_size(&self) -> usize {
            VT
        }

        fn device(&self) -> &Device {
            &self.0
        }

        fn encode_source(&self, src: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            src.to_dtype(DType::F32)
        }

        fn encode_prefix(&self, pre: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            pre.to_dtype(DType::F32)
        }

        fn next_token_logprobs(
            &self,
            hyps: &Tensor,
            _causal_mask: &Tensor,
            _ctx: &EncoderContext,
        ) -> CandleResult<Tensor> {
            let (n, _) = hyps.dims2()?;
            Tensor::zeros((n, VT - 1), DType::F32, &self.0)
        }
    }

    /// Oracle with one distribution right after `<bos>` and another everywhere else.
    struct AfterBos {
        first: [f32; 6],
        rest: [f32; 6],
        device: Device,
    }

    impl ScoreOracle for AfterBos {
        fn vocab_size(&self) -> usize {
            6
        }

        fn device(&self) -> &Device {
            &self.device
        }

        fn encode_source(&self, src: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            src.to_dtype(DType::F32)
        }

        fn encode_prefix(&self, pre: &Tensor, _mask: &Tensor) -> CandleResult<Tensor> {
            pre.to_dtype(DType::F32)
        }

        fn next_token_logprobs(
            &self,
            hyps: &Tensor,
            _causal_mask: &Tensor,
            _ctx: &EncoderContext,
        ) -> CandleResult<Tensor> {
            let (n, lt) = hyps.dims2()?;
            let row = if lt == 1 { self.first } else { self.rest };
            Tensor::from_vec(row.repeat(n), (n, 6), &self.device)
        }
    }

    fn context<O: ScoreOracle>(oracle: &O, bs: usize) -> EncoderContext {
        let src = vec![vec![1, 3, 2]; bs];
        let (src, mask) = prepare_source(&src, 0, oracle.device()).unwrap();
        EncoderContext::encode(oracle, &src, &mask, None).unwrap()
    }

    fn config(beam_size: usize, max_size: usize) -> DecoderConfig {
        DecoderConfig {
            beam_size,
            max_size,
            n_best: 1,
            ..DecoderConfig::default()
        }
    }

    #[test]
    fn test_forced_eos_fills_every_sentence() {
        // eos is the least likely token, so only the length cap ends hypotheses
        let oracle = Flat {
            row: [-1.0, -1.2, -9.0, -0.1, -0.2],
            device: Device::Cpu,
        };
        let search = BeamSearch::new(&oracle, config(3, 5), SPECIAL).unwrap();
        let finals = search.traverse(&context(&oracle, 2), None).unwrap();

        assert_eq!(finals.len(), 2);
        for sentence in &finals {
            assert_eq!(sentence.len(), 3);
            for hyp in sentence.iter() {
                assert_eq!(hyp.tokens.len(), 5);
                assert_eq!(hyp.tokens.first(), Some(&1));
                assert_eq!(hyp.tokens.last(), Some(&2));
            }
        }
        let best = finals[0].ranked()[0];
        assert_eq!(best.tokens, vec![1, 3, 3, 3, 2]);
        assert!((best.score - (-0.3 - 9.0)).abs() < 1e-5);
    }

    #[test]
    fn test_prefix_is_followed_then_released() {
        let oracle = Flat {
            row: [-1.0, -1.2, -5.0, -0.1, -0.2],
            device: Device::Cpu,
        };
        let search = BeamSearch::new(&oracle, config(2, 6), SPECIAL).unwrap();
        // sentence 0 must start with 4 4; sentence 1's prefix is empty
        let prefix = vec![vec![1, 4, 4, 2], vec![1, 2]];
        let finals = search.traverse(&context(&oracle, 2), Some(&prefix)).unwrap();

        for hyp in finals[0].iter() {
            assert_eq!(&hyp.tokens[..3], &[1, 4, 4]);
        }
        assert_eq!(finals[1].ranked()[0].tokens[1], 3);
    }

    #[test]
    fn test_beam_wider_than_vocabulary_is_rejected() {
        let oracle = Flat {
            row: [0.0; VT],
            device: Device::Cpu,
        };
        let err = BeamSearch::new(&oracle, config(VT + 1, 4), SPECIAL)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_mask_prefix_requires_mask_token() {
        let oracle = Flat {
            row: [0.0; VT],
            device: Device::Cpu,
        };
        let cfg = DecoderConfig {
            mask_prefix: true,
            ..config(2, 4)
        };
        assert!(BeamSearch::new(&oracle, cfg, SPECIAL).is_err());
    }

    #[test]
    fn test_oracle_shape_mismatch_is_fatal() {
        let oracle = Narrow(Device::Cpu);
        let search = BeamSearch::new(&oracle, config(2, 4), SPECIAL).unwrap();
        let err = search.traverse(&context(&oracle, 1), None).unwrap_err();
        assert!(matches!(
            err,
            Error::OracleShape {
                expected: (1, VT),
                ..
            }
        ));
    }

    #[test]
    fn test_mask_prefix_lets_masked_best_through() {
        // <msk> (5) is the 1-best after <bos>; afterwards eos dominates
        let oracle = AfterBos {
            first: [-9.0, -9.0, -9.0, -3.0, -2.0, -0.1],
            rest: [-5.0, -5.0, -0.1, -5.0, -5.0, -5.0],
            device: Device::Cpu,
        };
        let special = SpecialTokens {
            msk: Some(5),
            ..SPECIAL
        };
        let prefix = vec![vec![1, 3, 2]];

        let search = BeamSearch::new(&oracle, config(2, 5), special).unwrap();
        let finals = search.traverse(&context(&oracle, 1), Some(&prefix)).unwrap();
        let best = finals[0].ranked()[0];
        assert_eq!(best.tokens, vec![1, 3, 2]);
        assert!((best.score - -3.1).abs() < 1e-5);

        let cfg = DecoderConfig {
            mask_prefix: true,
            ..config(2, 5)
        };
        let search = BeamSearch::new(&oracle, cfg, special).unwrap();
        let finals = search.traverse(&context(&oracle, 1), Some(&prefix)).unwrap();
        let ranked = finals[0]
            .ranked()
            .into_iter()
            .map(|h| h.tokens.clone())
            .collect::<Vec<_>>();
        assert_eq!(ranked, vec![vec![1, 5, 2], vec![1, 4, 2]]);
        assert!((finals[0].ranked()[0].score - -0.2).abs() < 1e-5);
    }

    #[test]
    fn test_length_cap_returns_partial_set() {
        // with max_size 2 only <bos> <eos> exists, so a beam of 2 cannot fill
        let oracle = Flat {
            row: [-1.0, -1.2, -9.0, -0.1, -0.2],
            device: Device::Cpu,
        };
        let search = BeamSearch::new(&oracle, config(2, 2), SPECIAL).unwrap();
        let finals = search.traverse(&context(&oracle, 2), None).unwrap();

        assert_eq!(finals.len(), 2);
        for sentence in &finals {
            assert!(!sentence.is_full());
            let ranked = sentence.ranked();
            assert_eq!(ranked.len(), 1);
            assert_eq!(ranked[0].tokens, vec![1, 2]);
            assert!((ranked[0].score - -9.0).abs() < 1e-6);
        }
    }
}
