use super::frame_too_short;
use crate::error::DecodeError;
use crate::source::Endian;

pub fn decode_pcm16(
    frame: &[u8],
    endian: Endian,
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    for i in 0..count {
        let at = (first + i) * 2;
        let bytes = frame.get(at..at + 2).ok_or_else(|| frame_too_short(offset))?;
        out[i * stride] = endian.read_i16(bytes);
    }
    Ok(())
}

pub fn decode_pcm8(
    frame: &[u8],
    unsigned: bool,
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    for i in 0..count {
        let byte = *frame.get(first + i).ok_or_else(|| frame_too_short(offset))?;
        let value = if unsigned { byte as i16 - 0x80 } else { byte as i8 as i16 };
        out[i * stride] = value << 8;
    }
    Ok(())
}
