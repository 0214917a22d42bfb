//! PlayStation ADPCM: 16-byte frames of 28 samples with a fixed 5-entry filter table.

use super::{clamp16, frame_too_short, ChannelState};
use crate::error::DecodeError;

pub const FRAME_SIZE: usize = 16;
pub const SAMPLES_PER_FRAME: usize = 28;

const FILTERS: [[i32; 2]; 5] = [[0, 0], [60, 0], [115, -52], [98, -55], [122, -60]];

pub fn decode_frame(
    state: &mut ChannelState,
    frame: &[u8],
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    let header = *frame.first().ok_or_else(|| frame_too_short(offset))?;

    let predictor = (header >> 4) as usize;
    if predictor >= FILTERS.len() {
        return Err(DecodeError::CorruptFrame {
            offset,
            reason: format!("filter index {} out of range", predictor),
        });
    }
    let mut shift = (header & 0x0f) as u32;
    if shift > 12 {
        shift = 9; // reserved values behave like 9 on hardware
    }
    let [coef1, coef2] = FILTERS[predictor];

    let mut hist1 = state.hist1;
    let mut hist2 = state.hist2;

    for i in first..first + count {
        let byte = *frame.get(2 + i / 2).ok_or_else(|| frame_too_short(offset))?;
        let nibble = if i % 2 == 0 { byte & 0x0f } else { byte >> 4 };

        let mut sample = (((nibble as u16) << 12) as i16 as i32) >> shift;
        sample += (hist1 * coef1 + hist2 * coef2) >> 6;
        let sample = clamp16(sample);

        hist2 = hist1;
        hist1 = sample as i32;
        out[(i - first) * stride] = sample;
    }

    state.hist1 = hist1;
    state.hist2 = hist2;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_order_and_shift() {
        let mut state = ChannelState::default();
        let mut frame = [0u8; 16];
        frame[0] = 0x0c; // filter 0, shift 12
        frame[2] = 0xf1; // low nibble 1 first, then -1
        let mut out = [0i16; 3];
        decode_frame(&mut state, &frame, 0, 0, 3, &mut out, 1).unwrap();
        assert_eq!(out, [1, -1, 0]);
    }

    #[test]
    fn test_filter_applies_history() {
        let mut state = ChannelState { hist1: 64, ..Default::default() };
        let mut frame = [0u8; 16];
        frame[0] = 0x1c; // filter 1: 60/64 * hist1
        let mut out = [0i16; 2];
        decode_frame(&mut state, &frame, 0, 0, 2, &mut out, 1).unwrap();
        assert_eq!(out, [60, 56]);
        assert_eq!(state.hist1, 56);
        assert_eq!(state.hist2, 60);
    }

    #[test]
    fn test_reserved_shift_and_clamp() {
        let mut state = ChannelState { hist1: 32767, hist2: 0, ..Default::default() };
        let mut frame = [0u8; 16];
        frame[0] = 0x2f; // filter 2, shift 15 -> 9
        frame[2] = 0x07;
        let mut out = [0i16; 1];
        decode_frame(&mut state, &frame, 0, 0, 1, &mut out, 1).unwrap();
        assert_eq!(out[0], i16::MAX);
    }

    #[test]
    fn test_bad_filter_is_corrupt() {
        let mut state = ChannelState::default();
        let mut frame = [0u8; 16];
        frame[0] = 0x50;
        let mut out = [0i16; 1];
        assert!(matches!(
            decode_frame(&mut state, &frame, 0x10, 0, 1, &mut out, 1),
            Err(DecodeError::CorruptFrame { offset: 0x10, .. })
        ));
    }
}
