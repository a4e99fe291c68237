//! Token vocabulary for source and target sides.
//!
//! A vocabulary file holds one token per line; the token id is the line index. Only the first
//! whitespace-separated field of a line is used, so `token<TAB>frequency` files load as-is.
//! Special tokens are located by their surface form:
//! - `<pad>`, `<unk>`, `<bos>`, `<eos>` are required
//! - `<msk>` is optional

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

pub const PAD: &str = "<pad>";
pub const UNK: &str = "<unk>";
pub const BOS: &str = "<bos>";
pub const EOS: &str = "<eos>";
pub const MSK: &str = "<msk>";

/// Special token ids the decoder needs from the target vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub bos: u32,
    pub eos: u32,
    pub msk: Option<u32>,
}

/// Bidirectional token <-> id mapping.
#[derive(Debug, Clone)]
pub struct Vocab {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
    pad: u32,
    unk: u32,
    bos: u32,
    eos: u32,
    msk: Option<u32>,
}

impl Vocab {
    /// Build a vocabulary from tokens in id order.
    ///
    /// # Errors
    /// Returns [`Error::Vocab`] if the list is empty, holds duplicates, or lacks a required
    /// special token.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(Error::Vocab("vocabulary is empty".into()));
        }

        let mut index = HashMap::with_capacity(tokens.len());
        for (id, tok) in tokens.iter().enumerate() {
            let id = u32::try_from(id)
                .map_err(|_| Error::Vocab("vocabulary exceeds u32 ids".into()))?;
            if index.insert(tok.clone(), id).is_some() {
                return Err(Error::Vocab(format!("duplicate token {tok:?}")));
            }
        }

        let required = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| Error::Vocab(format!("missing special token {name}")))
        };
        let pad = required(PAD)?;
        let unk = required(UNK)?;
        let bos = required(BOS)?;
        let eos = required(EOS)?;
        let msk = index.get(MSK).copied();

        Ok(Self {
            tokens,
            index,
            pad,
            unk,
            bos,
            eos,
            msk,
        })
    }

    /// Load a vocabulary file (one token per line).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not form a valid vocabulary.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let tokens = raw
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self::from_tokens(tokens)
            .map_err(|e| Error::Vocab(format!("{}: {e}", path.display())))
    }

    /// Number of tokens (Vt).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn pad_id(&self) -> u32 {
        self.pad
    }

    #[must_use]
    pub fn unk_id(&self) -> u32 {
        self.unk
    }

    #[must_use]
    pub fn bos_id(&self) -> u32 {
        self.bos
    }

    #[must_use]
    pub fn eos_id(&self) -> u32 {
        self.eos
    }

    #[must_use]
    pub fn msk_id(&self) -> Option<u32> {
        self.msk
    }

    #[must_use]
    pub fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            pad: self.pad,
            bos: self.bos,
            eos: self.eos,
            msk: self.msk,
        }
    }

    /// Surface form of `id`; ids outside the vocabulary render as `<unk>`.
    #[must_use]
    pub fn token(&self, id: u32) -> &str {
        self.tokens
            .get(id as usize)
            .map_or(UNK, String::as_str)
    }

    /// Id of `token`, or the `<unk>` id.
    #[must_use]
    pub fn id(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(self.unk)
    }

    /// Encode a whitespace-tokenized line as `<bos> ids... <eos>`.
    #[must_use]
    pub fn encode_line(&self, line: &str) -> Vec<u32> {
        let mut ids = Vec::with_capacity(line.len() / 4 + 2);
        ids.push(self.bos);
        ids.extend(line.split_whitespace().map(|t| self.id(t)));
        ids.push(self.eos);
        ids
    }

    /// Render ids as space-separated tokens.
    #[must_use]
    pub fn detokenize(&self, ids: &[u32]) -> String {
        ids.iter()
            .map(|&id| self.token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
