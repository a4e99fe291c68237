//! Attention masks handed to the score oracle.

use candle_core::{Device, Result, Tensor};

/// Create a causal (no-look-ahead) mask over a hypothesis of length `seq_len`.
///
/// Position (i, j) is 1 if j <= i, else 0. Shape is (1, seq_len, seq_len) so it broadcasts over
/// every hypothesis of the round.
///
/// # Errors
/// Returns an error if tensor creation fails.
pub fn create_causal_mask(seq_len: usize, device: &Device) -> Result<Tensor> {
    let mut mask_data = Vec::with_capacity(seq_len * seq_len);
    for i in 0..seq_len {
        for j in 0..seq_len {
            mask_data.push(u8::from(j <= i));
        }
    }

    let mask = Tensor::from_vec(mask_data, (seq_len, seq_len), device)?;
    mask.unsqueeze(0)
}

/// Padding mask for a `(bs, len)` id tensor: 1 where the id differs from `pad_id`.
///
/// Returns shape (bs, 1, len).
///
/// # Errors
/// Returns an error if tensor operations fail.
pub fn create_padding_mask(ids: &Tensor, pad_id: u32) -> Result<Tensor> {
    let pad = Tensor::full(pad_id, ids.dims(), ids.device())?;
    ids.ne(&pad)?.unsqueeze(1)
}
