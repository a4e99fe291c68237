//! Per-batch encoder state shared by every beam slot of a sentence.

use candle_core::{Device, Result, Tensor};

use crate::model::mask::create_padding_mask;
use crate::model::oracle::ScoreOracle;

/// Pad id sequences to a rectangle.
///
/// Returns the row-major ids and the common row length.
#[must_use]
pub fn pad_rows(seqs: &[Vec<u32>], pad_id: u32) -> (Vec<u32>, usize) {
    let width = seqs.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(seqs.len() * width);
    for seq in seqs {
        flat.extend_from_slice(seq);
        flat.extend(std::iter::repeat_n(pad_id, width - seq.len()));
    }
    (flat, width)
}

/// Turn a batch of id sequences into a `(bs, ls)` id tensor and its `(bs, 1, ls)` mask.
///
/// # Errors
/// Returns an error if tensor creation fails.
pub fn prepare_source(seqs: &[Vec<u32>], pad_id: u32, device: &Device) -> Result<(Tensor, Tensor)> {
    let (flat, width) = pad_rows(seqs, pad_id);
    let ids = Tensor::from_vec(flat, (seqs.len(), width), device)?;
    let mask = create_padding_mask(&ids, pad_id)?;
    Ok((ids, mask))
}

/// Encoder outputs for one batch.
///
/// Computed once before decoding and never mutated afterwards; widening the beam produces a
/// new context through [`EncoderContext::replicate`].
#[derive(Debug, Clone)]
pub struct EncoderContext {
    src: Tensor,
    src_mask: Tensor,
    prefix: Option<(Tensor, Tensor)>,
}

impl EncoderContext {
    /// Run the oracle's encoders over a prepared batch.
    ///
    /// # Errors
    /// Returns an error if either encoder fails.
    pub fn encode<O: ScoreOracle + ?Sized>(
        oracle: &O,
        src: &Tensor,
        src_mask: &Tensor,
        prefix: Option<(&Tensor, &Tensor)>,
    ) -> Result<Self> {
        let z_src = oracle.encode_source(src, src_mask)?;
        let prefix = match prefix {
            Some((pre, pre_mask)) => Some((oracle.encode_prefix(pre, pre_mask)?, pre_mask.clone())),
            None => None,
        };
        Ok(Self {
            src: z_src,
            src_mask: src_mask.clone(),
            prefix,
        })
    }

    /// Source representation, first dimension is the row count.
    #[must_use]
    pub fn src(&self) -> &Tensor {
        &self.src
    }

    #[must_use]
    pub fn src_mask(&self) -> &Tensor {
        &self.src_mask
    }

    /// Prefix representation and mask, when a prefix was supplied.
    #[must_use]
    pub fn prefix(&self) -> Option<(&Tensor, &Tensor)> {
        self.prefix.as_ref().map(|(z, m)| (z, m))
    }

    /// Number of rows (sentences, or sentences x beam slots once widened).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.src.dims().first().copied().unwrap_or(0)
    }

    /// Repeat every row `k` times in place, so row `b` becomes rows `b*k..(b+1)*k`.
    ///
    /// # Errors
    /// Returns an error if the index tensor cannot be built or selection fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn replicate(&self, k: usize) -> Result<Self> {
        let rows = self.rows();
        let index = (0..rows)
            .flat_map(|r| std::iter::repeat_n(r as u32, k))
            .collect::<Vec<_>>();
        let index = Tensor::from_vec(index, rows * k, self.src.device())?;
        let select = |t: &Tensor| t.index_select(&index, 0);

        let prefix = match &self.prefix {
            Some((z, m)) => Some((select(z)?, select(m)?)),
            None => None,
        };
        Ok(Self {
            src: select(&self.src)?,
            src_mask: select(&self.src_mask)?,
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use candle_core::DType;

    use super::*;
    use crate::model::BigramOracle;

    fn oracle(device: &Device) -> BigramOracle {
        BigramOracle::new(Tensor::zeros((6, 6), DType::F32, device).unwrap()).unwrap()
    }

    #[test]
    fn test_prepare_source_pads_and_masks() {
        let device = Device::Cpu;
        let (ids, mask) = prepare_source(&[vec![1, 4, 2], vec![1, 2]], 0, &device).unwrap();
        assert_eq!(ids.to_vec2::<u32>().unwrap(), vec![vec![1, 4, 2], vec![1, 2, 0]]);
        assert_eq!(mask.dims(), &[2, 1, 3]);
    }

    #[test]
    fn test_replicate_interleaves_rows() {
        let device = Device::Cpu;
        let oracle = oracle(&device);
        let (src, src_mask) = prepare_source(&[vec![1, 4, 2], vec![1, 5, 2]], 0, &device).unwrap();
        let (pre, pre_mask) = prepare_source(&[vec![1, 3], vec![1, 4]], 0, &device).unwrap();
        let ctx = EncoderContext::encode(&oracle, &src, &src_mask, Some((&pre, &pre_mask))).unwrap();

        let wide = ctx.replicate(3).unwrap();
        assert_eq!(wide.rows(), 6);
        assert_eq!(wide.src_mask().dims(), &[6, 1, 3]);

        let z: Vec<Vec<f32>> = wide.src().squeeze(2).unwrap().to_vec2().unwrap();
        assert_eq!(z[0], vec![1.0, 4.0, 2.0]);
        assert_eq!(z[2], vec![1.0, 4.0, 2.0]);
        assert_eq!(z[3], vec![1.0, 5.0, 2.0]);

        let (zp, mp) = wide.prefix().unwrap();
        assert_eq!(zp.dims(), &[6, 2, 1]);
        assert_eq!(mp.dims(), &[6, 1, 2]);
    }
}
