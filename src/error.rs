//! Error type shared by the decoder, formatter and vocabulary code.

use thiserror::Error;

/// Errors surfaced by the translation engine.
///
/// None of these are transient: each one is a configuration or programming error and decoding
/// stops as soon as it is seen.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid decoder configuration: {0}")]
    Config(String),

    #[error("invalid format option {ch:?} in {format:?}")]
    InvalidFormat { ch: char, format: String },

    #[error("score oracle returned shape {got:?}, expected {expected:?}")]
    OracleShape {
        expected: (usize, usize),
        got: Vec<usize>,
    },

    #[error("vocabulary error: {0}")]
    Vocab(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
