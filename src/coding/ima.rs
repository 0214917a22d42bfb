//! IMA ADPCM as laid out by Wwise: every channel sub-block opens with a 4-byte
//! header (sample, step index, reserved) followed by low-nibble-first codes.

use super::{clamp16, frame_too_short, ChannelState};
use crate::error::DecodeError;
use crate::source::Endian;

pub const HEADER_SIZE: usize = 4;

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const INDEX_TABLE: [i32; 8] = [-1, -1, -1, -1, 2, 4, 6, 8];

/// Samples carried by a sub-block of `size` bytes: the header sample plus two per byte
pub fn samples_in_frame(size: usize) -> usize {
    if size <= HEADER_SIZE {
        0
    } else {
        (size - HEADER_SIZE) * 2 + 1
    }
}

fn expand_nibble(nibble: u8, hist: &mut i32, step_index: &mut i32) {
    let step = STEP_TABLE[*step_index as usize];
    let mut delta = step >> 3;
    if nibble & 1 != 0 {
        delta += step >> 2;
    }
    if nibble & 2 != 0 {
        delta += step >> 1;
    }
    if nibble & 4 != 0 {
        delta += step;
    }
    if nibble & 8 != 0 {
        delta = -delta;
    }

    *hist = clamp16(*hist + delta) as i32;
    *step_index = (*step_index + INDEX_TABLE[(nibble & 7) as usize]).clamp(0, 88);
}

#[allow(clippy::too_many_arguments)]
pub fn decode_frame(
    state: &mut ChannelState,
    endian: Endian,
    frame: &[u8],
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    let mut hist = state.hist1;
    let mut step_index = state.step_index.clamp(0, 88);
    let mut i = first;
    let end = first + count;

    if i == 0 && i < end {
        let header = frame.get(..HEADER_SIZE).ok_or_else(|| frame_too_short(offset))?;
        hist = endian.read_i16(&header[0..2]) as i32;
        step_index = header[2] as i32;
        if step_index > 88 {
            return Err(DecodeError::CorruptFrame {
                offset,
                reason: format!("step index {} out of range", step_index),
            });
        }
        out[0] = hist as i16;
        i = 1;
    }

    while i < end {
        let code = i - 1;
        let byte = *frame.get(HEADER_SIZE + code / 2).ok_or_else(|| frame_too_short(offset))?;
        let nibble = if code % 2 == 0 { byte & 0x0f } else { byte >> 4 };
        expand_nibble(nibble, &mut hist, &mut step_index);
        out[(i - first) * stride] = hist as i16;
        i += 1;
    }

    state.hist1 = hist;
    state.step_index = step_index;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sample_then_codes() {
        let mut state = ChannelState::default();
        // hist 1000 LE, step index 0, codes 4 (+step) then 0xc (-step)
        let frame = [0xe8, 0x03, 0x00, 0x00, 0xc4];
        let mut out = [0i16; 3];
        decode_frame(&mut state, Endian::Little, &frame, 0, 0, 3, &mut out, 1).unwrap();

        // step 7: code 4 -> 7 + (7 >> 3)
        assert_eq!(out[0], 1000);
        assert_eq!(out[1], 1007);
        // step index 2 (step 9): code 0xc -> -(9 + (9 >> 3))
        assert_eq!(out[2], 997);
        assert_eq!(state.step_index, 4);
    }

    #[test]
    fn test_big_endian_header() {
        let mut state = ChannelState::default();
        let frame = [0xff, 0xfe, 0x10, 0x00, 0x00];
        let mut out = [0i16; 1];
        decode_frame(&mut state, Endian::Big, &frame, 0, 0, 1, &mut out, 1).unwrap();
        assert_eq!(out[0], -2);
        assert_eq!(state.step_index, 16);
    }

    #[test]
    fn test_resume_mid_frame_uses_state() {
        let frame = [0xe8, 0x03, 0x00, 0x00, 0xc4];
        let mut full = [0i16; 3];
        let mut state = ChannelState::default();
        decode_frame(&mut state, Endian::Little, &frame, 0, 0, 3, &mut full, 1).unwrap();

        let mut state = ChannelState::default();
        let mut head = [0i16; 2];
        decode_frame(&mut state, Endian::Little, &frame, 0, 0, 2, &mut head, 1).unwrap();
        let mut tail = [0i16; 1];
        decode_frame(&mut state, Endian::Little, &frame, 0, 2, 1, &mut tail, 1).unwrap();

        assert_eq!([head[0], head[1], tail[0]], full);
    }

    #[test]
    fn test_bad_step_index() {
        let mut state = ChannelState::default();
        let frame = [0x00, 0x00, 89, 0x00, 0x00];
        let mut out = [0i16; 1];
        assert!(decode_frame(&mut state, Endian::Little, &frame, 0, 0, 1, &mut out, 1).is_err());
    }

    #[test]
    fn test_samples_in_frame() {
        assert_eq!(samples_in_frame(0x24), 65);
        assert_eq!(samples_in_frame(4), 0);
        assert_eq!(samples_in_frame(5), 3);
    }
}
