//! Nintendo DSP ADPCM: 8-byte frames of 14 samples, 8 predictor coefficient pairs per channel.

use super::{clamp16, frame_too_short, ChannelState};
use crate::error::DecodeError;

pub const FRAME_SIZE: usize = 8;
pub const SAMPLES_PER_FRAME: usize = 14;

pub fn decode_frame(
    state: &mut ChannelState,
    frame: &[u8],
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    let coefs = state.coefs.ok_or(DecodeError::StateSizeMismatch { expected: 16, found: 0 })?;
    let header = *frame.first().ok_or_else(|| frame_too_short(offset))?;

    let index = (header >> 4) as usize;
    if index > 7 {
        return Err(DecodeError::CorruptFrame {
            offset,
            reason: format!("predictor index {} out of range", index),
        });
    }
    let scale = 1i64 << (header & 0x0f);
    let coef1 = coefs[index * 2] as i64;
    let coef2 = coefs[index * 2 + 1] as i64;

    let mut hist1 = state.hist1 as i64;
    let mut hist2 = state.hist2 as i64;

    for i in first..first + count {
        let byte = *frame.get(1 + i / 2).ok_or_else(|| frame_too_short(offset))?;
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        let nibble = ((nibble << 4) as i8 >> 4) as i64;

        let sample = ((nibble * scale) << 11) + 1024 + coef1 * hist1 + coef2 * hist2;
        let sample = clamp16((sample >> 11).clamp(i32::MIN as i64, i32::MAX as i64) as i32);

        hist2 = hist1;
        hist1 = sample as i64;
        out[(i - first) * stride] = sample;
    }

    state.hist1 = hist1 as i32;
    state.hist2 = hist2 as i32;
    Ok(())
}
