pub mod beam;
pub mod constraints;
pub mod context;
pub mod decode;
pub mod format;
pub mod prune;
pub mod translate;

pub use beam::{FinalHypothesis, Finalized, norm_length};
pub use context::EncoderContext;
pub use decode::BeamSearch;
pub use format::OutputFormat;
pub use translate::Inference;
