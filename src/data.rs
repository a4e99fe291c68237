//! Test-set loading and batching.

use std::io::BufRead;

use crate::error::{Error, Result};
use crate::tokenizer::Vocab;

/// A batch of sentences to translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based input position of every sentence
    pub positions: Vec<usize>,
    /// Source ids, `<bos> ... <eos>`, unpadded
    pub src: Vec<Vec<u32>>,
    /// Target prefixes, `<bos> ... <eos>`, unpadded
    pub pre: Option<Vec<Vec<u32>>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.src.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }
}

/// Tokenized test set, kept in input order.
#[derive(Debug, Clone)]
pub struct TestSet {
    src: Vec<Vec<u32>>,
    pre: Option<Vec<Vec<u32>>>,
    batch_size: usize,
}

impl TestSet {
    /// Wrap already-encoded sentences.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `batch_size` is 0 or the prefix count differs from the
    /// source count.
    pub fn new(
        src: Vec<Vec<u32>>,
        pre: Option<Vec<Vec<u32>>>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if let Some(pre) = &pre {
            if pre.len() != src.len() {
                return Err(Error::Config(format!(
                    "{} prefix lines for {} source lines",
                    pre.len(),
                    src.len()
                )));
            }
        }
        Ok(Self {
            src,
            pre,
            batch_size,
        })
    }

    /// Encode whitespace-tokenized source (and optional prefix) lines.
    ///
    /// # Errors
    /// Same conditions as [`TestSet::new`].
    pub fn from_lines<S: AsRef<str>>(
        src_lines: &[S],
        pre_lines: Option<&[S]>,
        src_vocab: &Vocab,
        tgt_vocab: &Vocab,
        batch_size: usize,
    ) -> Result<Self> {
        let src = src_lines
            .iter()
            .map(|l| src_vocab.encode_line(l.as_ref()))
            .collect();
        let pre = pre_lines.map(|lines| {
            lines
                .iter()
                .map(|l| tgt_vocab.encode_line(l.as_ref()))
                .collect()
        });
        Self::new(src, pre, batch_size)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.src.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    #[must_use]
    pub fn has_prefix(&self) -> bool {
        self.pre.is_some()
    }

    /// Consecutive batches of at most `batch_size` sentences.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        (0..self.src.len())
            .step_by(self.batch_size)
            .map(move |start| {
                let end = (start + self.batch_size).min(self.src.len());
                Batch {
                    positions: (start..end).collect(),
                    src: self.src[start..end].to_vec(),
                    pre: self.pre.as_ref().map(|pre| pre[start..end].to_vec()),
                }
            })
    }
}

/// Read every line of `reader`, trailing newline characters removed.
///
/// # Errors
/// Returns an error if reading fails.
pub fn read_lines<R: BufRead>(reader: R) -> Result<Vec<String>> {
    Ok(reader.lines().collect::<std::io::Result<Vec<_>>>()?)
}
