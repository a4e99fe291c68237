use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;

use crate::model::BigramOracle;
use crate::model::bigram::TRANSITIONS;

/// Load a bigram oracle from a safetensors file holding a `transitions` tensor.
///
/// # Errors
/// Returns an error if the file cannot be read, is not safetensors, or lacks a square
/// `transitions` tensor.
pub fn load_bigram_oracle(model_path: &Path, device: &Device) -> Result<BigramOracle> {
    let data = std::fs::read(model_path)
        .with_context(|| format!("read weights {}", model_path.display()))?;
    load_bigram_oracle_from_bytes(data, device)
        .with_context(|| format!("load {}", model_path.display()))
}

/// Load a bigram oracle from in-memory safetensors bytes.
///
/// # Errors
/// Returns an error if the buffer is not safetensors or lacks a square `transitions` tensor.
pub fn load_bigram_oracle_from_bytes(data: Vec<u8>, device: &Device) -> Result<BigramOracle> {
    let vocab_size = {
        let tensors = SafeTensors::deserialize(&data).context("parse safetensors header")?;
        let view = tensors.tensor(TRANSITIONS).with_context(|| {
            format!(
                "weights have no {TRANSITIONS:?} tensor (found: {})",
                tensors.names().into_iter().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;
        match view.shape() {
            [rows, cols] if rows == cols && *rows > 0 => *rows,
            shape => anyhow::bail!("{TRANSITIONS:?} must be a square matrix, got shape {shape:?}"),
        }
    };

    let vb = VarBuilder::from_buffered_safetensors(data, DType::F32, device)?;
    BigramOracle::load(vocab_size, vb).context("build bigram oracle")
}
