//! Rendering of finalized hypotheses as tab-separated output lines.

use crate::error::{Error, Result};
use crate::tokenizer::Vocab;

/// One output column, selected by a format character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `p`: 1-based position of the sentence in the input
    Position,
    /// `n`: 1-based rank in the n-best list
    Rank,
    /// `c`: length-normalized score, 6 decimals
    Score,
    /// `s`: source tokens, padding and begin/end stripped
    Source,
    /// `j`: source ids, padding stripped
    SourceIds,
    /// `t`: hypothesis tokens, begin/end stripped
    Target,
    /// `i`: hypothesis ids
    TargetIds,
}

impl Field {
    fn from_char(ch: char) -> Option<Self> {
        match ch {
            'p' => Some(Self::Position),
            'n' => Some(Self::Rank),
            'c' => Some(Self::Score),
            's' => Some(Self::Source),
            'j' => Some(Self::SourceIds),
            't' => Some(Self::Target),
            'i' => Some(Self::TargetIds),
            _ => None,
        }
    }
}

/// A finalized hypothesis ready for rendering.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// 0-based position of the sentence in the input
    pub position: usize,
    /// 0-based n-best rank
    pub rank: usize,
    pub score: f32,
    /// Source ids as fed to the encoder (may carry trailing padding)
    pub source: &'a [u32],
    /// Hypothesis ids, begin and end tokens included
    pub hypothesis: &'a [u32],
}

/// Parsed output format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    fields: Vec<Field>,
}

impl OutputFormat {
    /// Parse a format string such as `"pnct"`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] on the first unknown character, or [`Error::Config`]
    /// if the string selects nothing.
    pub fn parse(format: &str) -> Result<Self> {
        let fields = format
            .chars()
            .map(|ch| {
                Field::from_char(ch).ok_or_else(|| Error::InvalidFormat {
                    ch,
                    format: format.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if fields.is_empty() {
            return Err(Error::Config("output format selects no fields".into()));
        }
        Ok(Self { fields })
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Render one record as a tab-separated line (no trailing newline).
    #[must_use]
    pub fn render(&self, record: &Record<'_>, src_vocab: &Vocab, tgt_vocab: &Vocab) -> String {
        let source = strip_trailing(record.source, src_vocab.pad_id());
        let mut line = String::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                line.push('\t');
            }
            let column = match field {
                Field::Position => (record.position + 1).to_string(),
                Field::Rank => (record.rank + 1).to_string(),
                Field::Score => format!("{:.6}", record.score),
                Field::Source => src_vocab.detokenize(inner(source)),
                Field::SourceIds => join_ids(source),
                Field::Target => tgt_vocab.detokenize(inner(record.hypothesis)),
                Field::TargetIds => join_ids(record.hypothesis),
            };
            line.push_str(&column);
        }
        line
    }
}

fn strip_trailing(ids: &[u32], pad: u32) -> &[u32] {
    let end = ids.iter().rposition(|&t| t != pad).map_or(0, |i| i + 1);
    &ids[..end]
}

/// Drop the first and last id (begin/end tokens).
fn inner(ids: &[u32]) -> &[u32] {
    if ids.len() < 2 {
        return &[];
    }
    &ids[1..ids.len() - 1]
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocab {
        Vocab::from_tokens(["<pad>", "<bos>", "<eos>", "<unk>", "a", "b"]).unwrap()
    }

    #[test]
    fn test_unknown_character_is_rejected() {
        let err = OutputFormat::parse("pnx").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { ch: 'x', .. }));
        assert!(OutputFormat::parse("").is_err());
    }

    #[test]
    fn test_render_all_fields() {
        let v = vocab();
        let format = OutputFormat::parse("pncsjti").unwrap();
        let record = Record {
            position: 0,
            rank: 1,
            score: -1.5,
            source: &[1, 4, 5, 2, 0, 0],
            hypothesis: &[1, 5, 4, 2],
        };
        assert_eq!(
            format.render(&record, &v, &v),
            "1\t2\t-1.500000\ta b\t1 4 5 2\tb a\t1 5 4 2"
        );
    }

    #[test]
    fn test_render_short_hypothesis() {
        let v = vocab();
        let format = OutputFormat::parse("tc").unwrap();
        let record = Record {
            position: 3,
            rank: 0,
            score: f32::NEG_INFINITY,
            source: &[0, 0],
            hypothesis: &[1, 2],
        };
        assert_eq!(format.render(&record, &v, &v), "\t-inf");
    }

    #[test]
    fn test_render_multi_digit_columns() {
        let v = vocab();
        let format = OutputFormat::parse("pnci").unwrap();
        let record = Record {
            position: 11,
            rank: 9,
            score: -12.25,
            source: &[1, 4, 2],
            hypothesis: &[1, 4, 4, 5, 2],
        };
        assert_eq!(format.render(&record, &v, &v), "12\t10\t-12.250000\t1 4 4 5 2");
    }
}
