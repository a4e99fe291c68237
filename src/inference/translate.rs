//! Batch translation driver: encode, decode, and write n-best lines.

use std::io::Write;
use std::time::Instant;

use tracing::{debug, info};

use super::beam::Finalized;
use super::context::{EncoderContext, prepare_source};
use super::decode::BeamSearch;
use super::format::{OutputFormat, Record};
use crate::config::DecoderConfig;
use crate::data::{Batch, TestSet};
use crate::error::{Error, Result};
use crate::model::oracle::ScoreOracle;
use crate::tokenizer::Vocab;

/// Translates test sets with a score oracle and writes formatted hypotheses.
pub struct Inference<'a, O: ScoreOracle + ?Sized> {
    oracle: &'a O,
    search: BeamSearch<'a, O>,
    src_vocab: &'a Vocab,
    tgt_vocab: &'a Vocab,
    format: OutputFormat,
    n_best: usize,
}

impl<'a, O: ScoreOracle + ?Sized> Inference<'a, O> {
    /// # Errors
    /// Returns an error if the configuration or the format string is invalid, or if the
    /// oracle's vocabulary does not match the target vocabulary.
    pub fn new(
        oracle: &'a O,
        src_vocab: &'a Vocab,
        tgt_vocab: &'a Vocab,
        config: DecoderConfig,
    ) -> Result<Self> {
        let format = OutputFormat::parse(&config.format)?;
        if oracle.vocab_size() != tgt_vocab.len() {
            return Err(Error::Config(format!(
                "oracle scores {} tokens but the target vocabulary has {}",
                oracle.vocab_size(),
                tgt_vocab.len()
            )));
        }
        let n_best = config.n_best;
        let search = BeamSearch::new(oracle, config, tgt_vocab.special_tokens())?;
        Ok(Self {
            oracle,
            search,
            src_vocab,
            tgt_vocab,
            format,
            n_best,
        })
    }

    /// Encode and decode one batch.
    ///
    /// # Errors
    /// Returns an error if encoding or decoding fails.
    pub fn translate_batch(&self, batch: &Batch) -> Result<Vec<Finalized>> {
        let device = self.oracle.device();
        let (src, src_mask) = prepare_source(&batch.src, self.src_vocab.pad_id(), device)?;
        let pre = match &batch.pre {
            Some(pre) => Some(prepare_source(pre, self.tgt_vocab.pad_id(), device)?),
            None => None,
        };
        let ctx = EncoderContext::encode(
            self.oracle,
            &src,
            &src_mask,
            pre.as_ref().map(|(p, m)| (p, m)),
        )?;
        self.search.traverse(&ctx, batch.pre.as_deref())
    }

    /// Translate every batch of `testset`, writing up to N lines per sentence to `out`.
    ///
    /// Each line is flushed as soon as it is written. Returns the number of lines written.
    ///
    /// # Errors
    /// Returns an error if decoding or writing fails.
    pub fn translate<W: Write>(&self, testset: &TestSet, out: &mut W) -> Result<usize> {
        info!("Running: inference");
        let start = Instant::now();
        let mut written = 0;

        for batch in testset.batches() {
            let finals = self.translate_batch(&batch)?;
            debug!(sentences = batch.len(), "decoded batch");

            for (b, sentence) in finals.iter().enumerate() {
                for (rank, hyp) in sentence.ranked().into_iter().take(self.n_best).enumerate() {
                    let record = Record {
                        position: batch.positions[b],
                        rank,
                        score: hyp.score,
                        source: &batch.src[b],
                        hypothesis: &hyp.tokens,
                    };
                    let line = self.format.render(&record, self.src_vocab, self.tgt_vocab);
                    writeln!(out, "{line}")?;
                    out.flush()?;
                    written += 1;
                }
            }
        }

        info!(
            sentences = testset.len(),
            lines = written,
            "translated in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(written)
    }
}
