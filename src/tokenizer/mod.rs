pub mod vocab;

pub use vocab::{SpecialTokens, Vocab};
