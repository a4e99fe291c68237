pub mod bigram;
pub mod mask;
pub mod oracle;

// Re-exports for convenience
pub use bigram::BigramOracle;
pub use mask::{create_causal_mask, create_padding_mask};
pub use oracle::ScoreOracle;
