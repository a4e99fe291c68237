use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Decoding settings consumed by the beam search and the output formatter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Beam width (K): hypotheses kept per sentence after every round
    pub beam_size: usize,
    /// Maximum hypothesis length, begin and end tokens included
    pub max_size: usize,
    /// Number of finalized hypotheses emitted per sentence (N <= K)
    pub n_best: usize,
    /// Length-normalization exponent; 0 disables normalization
    pub alpha: f32,
    /// Output field selection, see [`crate::inference::format::OutputFormat`]
    pub format: String,
    /// Skip prefix forcing whenever the unconstrained 1-best is the mask token
    pub mask_prefix: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_size: 4,
            max_size: 250,
            n_best: 1,
            alpha: 0.0,
            format: "pt".to_string(),
            mask_prefix: false,
        }
    }
}

impl DecoderConfig {
    /// Read a JSON config file. Missing fields take their default values.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the result is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate settings that do not depend on the vocabulary.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first inconsistent setting.
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(Error::Config("beam_size must be positive".into()));
        }
        if self.max_size < 2 {
            return Err(Error::Config(format!(
                "max_size must be at least 2 (got {})",
                self.max_size
            )));
        }
        if self.n_best == 0 || self.n_best > self.beam_size {
            return Err(Error::Config(format!(
                "n_best must be in 1..={} (got {})",
                self.beam_size, self.n_best
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(Error::Config(format!(
                "alpha must be a non-negative number (got {})",
                self.alpha
            )));
        }
        Ok(())
    }
}
