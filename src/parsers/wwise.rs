//! Audiokinetic Wwise RIFF/RIFX (.wem and friends). RIFX files carry every
//! header field big-endian, including the chunk sizes.

use crate::chunks::{Chunk, ChunkWalker};
use crate::coding::{dsp_bytes_to_samples, ima, ima_bytes_to_samples, pcm_bytes_to_samples, CodingKind, TruncationPolicy};
use crate::error::{ParseError, StructuralError};
use crate::layout::LayoutKind;
use crate::models::StreamDescriptor;
use crate::source::{ByteSource, ByteSourceExt, Endian};

use super::{apply_loop, FormatParser};

const FIRST_CHUNK: u64 = 0xc;
/// Per-channel DSP header: 16 coefs, gain, ps, two history words, loop context
const DSP_HEADER_SIZE: u64 = 0x2e;

pub struct WwiseParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Pcm,
    Ima,
    Dsp,
}

#[derive(Debug, Clone, Copy)]
struct Fmt {
    offset: u64,
    format: u16,
    channels: usize,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
    extra_size: u16,
}

fn codec_for(format: u16) -> Result<Codec, ParseError> {
    let unsupported = |codec: &str| {
        Err(ParseError::Unsupported {
            format: "Wwise".to_string(),
            codec: codec.to_string(),
        })
    };
    match format {
        0x0001 | 0xFFFE => Ok(Codec::Pcm),
        0x0002 | 0x0069 => Ok(Codec::Ima),
        0xFFF0 => Ok(Codec::Dsp),
        0x0161 | 0x0162 => unsupported("XWMA"),
        0x0165 | 0x0166 => unsupported("XMA2"),
        0xAAC0 => unsupported("AAC"),
        0xFFFB => unsupported("HEVAG"),
        0xFFFC => unsupported("ATRAC9"),
        0xFFFF => unsupported("Vorbis"),
        other => unsupported(&format!("format 0x{:04x}", other)),
    }
}

fn malformed(chunk: &Chunk, reason: impl Into<String>) -> ParseError {
    ParseError::Structural(StructuralError::MalformedChunk {
        offset: chunk.header_offset,
        reason: reason.into(),
    })
}

fn read_fmt(source: &dyn ByteSource, chunk: &Chunk, endian: Endian) -> Result<Fmt, ParseError> {
    if chunk.truncated {
        return Err(malformed(chunk, "fmt chunk runs past the end of the file"));
    }
    if chunk.size < 0x12 {
        return Err(malformed(chunk, format!("fmt chunk of {} bytes is too small", chunk.size)));
    }

    let offset = chunk.offset;
    let format = source.read_u16(offset, endian)?;
    let extra_size = if chunk.size > 0x10 && format != 0x0165 && format != 0x0166 {
        source.read_u16(offset + 0x10, endian)?
    } else {
        0
    };

    Ok(Fmt {
        offset,
        format,
        channels: source.read_u16(offset + 0x02, endian)? as usize,
        sample_rate: source.read_u32(offset + 0x04, endian)?,
        block_align: source.read_u16(offset + 0x0c, endian)?,
        bits_per_sample: source.read_u16(offset + 0x0e, endian)?,
        extra_size,
    })
}

/// Single forward loop from a `smpl` chunk
fn read_loop(source: &dyn ByteSource, chunk: &Chunk, endian: Endian) -> Result<Option<(u64, u64)>, ParseError> {
    if chunk.truncated || chunk.size < 0x34 {
        return Ok(None);
    }
    let loop_count = source.read_u32(chunk.offset + 0x1c, endian)?;
    let loop_type = source.read_u32(chunk.offset + 0x28, endian)?;
    if loop_count != 1 || loop_type != 0 {
        log::debug!("Ignoring smpl chunk with {} loops of type {}", loop_count, loop_type);
        return Ok(None);
    }
    let start = source.read_u32(chunk.offset + 0x2c, endian)? as u64;
    let end = source.read_u32(chunk.offset + 0x30, endian)? as u64;
    Ok(Some((start, end)))
}

fn unsupported_bits(codec: &str, bits: u16) -> ParseError {
    ParseError::Unsupported {
        format: "Wwise".to_string(),
        codec: format!("{} with {} bits per sample", codec, bits),
    }
}

impl FormatParser for WwiseParser {
    fn name(&self) -> &'static str {
        "Wwise RIFF"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wem", "wav", "lwav", "ogg", "logg", "xma"]
    }

    fn parse(&self, source: &dyn ByteSource) -> Result<StreamDescriptor, ParseError> {
        let endian = if source.is_id32(0, b"RIFF") {
            Endian::Little
        } else if source.is_id32(0, b"RIFX") {
            Endian::Big
        } else {
            return Err(ParseError::NotThisFormat);
        };
        if !source.is_id32(8, b"WAVE") && !source.is_id32(8, b"XWMA") {
            return Err(ParseError::NotThisFormat);
        }

        let walker = ChunkWalker::new(source, FIRST_CHUNK).endian(endian).tolerate_truncation(true);
        let fmt_chunk = walker.find(b"fmt ")?.ok_or_else(|| {
            StructuralError::MalformedChunk { offset: FIRST_CHUNK, reason: "no fmt chunk".to_string() }
        })?;
        let data_chunk = walker.find(b"data")?.ok_or_else(|| {
            StructuralError::MalformedChunk { offset: FIRST_CHUNK, reason: "no data chunk".to_string() }
        })?;

        let fmt = read_fmt(source, &fmt_chunk, endian)?;
        let mut codec = codec_for(fmt.format)?;
        // newer Wii/3DS banks reuse 0x0002 for DSP with the coefficients in fmt
        if fmt.format == 0x0002 && fmt.extra_size as u64 == 0x0c + fmt.channels as u64 * DSP_HEADER_SIZE {
            codec = Codec::Dsp;
        }
        if fmt.channels == 0 {
            return Err(malformed(&fmt_chunk, "zero channels"));
        }
        let channels = fmt.channels;

        let coding = match codec {
            Codec::Pcm => CodingKind::Pcm16 { endian },
            Codec::Ima => CodingKind::WwiseIma { endian },
            Codec::Dsp => CodingKind::NgcDsp,
        };

        let file_size = source.size();
        let mut data_size = data_chunk.size;
        if data_chunk.offset + data_size > file_size {
            let available = file_size.saturating_sub(data_chunk.offset);
            match coding.truncation_policy() {
                TruncationPolicy::Truncate => {
                    log::warn!(
                        "Wwise data declares {} bytes but only {} are present, truncating",
                        data_size,
                        available
                    );
                    data_size = available;
                }
                TruncationPolicy::Fail => {
                    return Err(StructuralError::TruncatedChunk {
                        tag: "data".to_string(),
                        offset: data_chunk.header_offset,
                        size: data_size,
                        available,
                    }
                    .into());
                }
            }
        }

        let format_name = match endian {
            Endian::Little => "Wwise RIFF",
            Endian::Big => "Wwise RIFX",
        };

        let mut descriptor = match codec {
            Codec::Pcm => {
                if fmt.bits_per_sample != 16 {
                    return Err(unsupported_bits("PCM", fmt.bits_per_sample));
                }
                let layout = if channels > 1 {
                    LayoutKind::Interleave { block_size: 2, last_block_size: None }
                } else {
                    LayoutKind::Flat
                };
                let mut descriptor = StreamDescriptor::new(format_name, channels, fmt.sample_rate, coding, layout);
                descriptor.set_num_samples(pcm_bytes_to_samples(data_size, channels, 16));
                descriptor
            }
            Codec::Ima => {
                if fmt.bits_per_sample != 4 {
                    return Err(unsupported_bits("IMA", fmt.bits_per_sample));
                }
                let block_align = fmt.block_align as u64;
                if block_align == 0 || block_align % channels as u64 != 0 {
                    return Err(malformed(
                        &fmt_chunk,
                        format!("IMA block align {} does not split over {} channels", block_align, channels),
                    ));
                }
                let sub_block = block_align / channels as u64;
                if sub_block <= ima::HEADER_SIZE as u64 {
                    return Err(malformed(&fmt_chunk, format!("IMA sub-block of {} bytes", sub_block)));
                }
                let tail = (data_size % block_align) / channels as u64;
                let last_block_size = (tail > ima::HEADER_SIZE as u64).then_some(tail);

                let layout = LayoutKind::Interleave { block_size: sub_block, last_block_size };
                let mut descriptor = StreamDescriptor::new(format_name, channels, fmt.sample_rate, coding, layout);
                descriptor.set_num_samples(ima_bytes_to_samples(data_size, block_align, channels));
                descriptor
            }
            Codec::Dsp => {
                if fmt.bits_per_sample != 4 {
                    return Err(unsupported_bits("DSP", fmt.bits_per_sample));
                }
                let table_size = DSP_HEADER_SIZE * channels as u64;
                let (num_samples, coef_offset) = match walker.find(b"WiiH")? {
                    Some(wiih) => {
                        if wiih.size != table_size || wiih.truncated {
                            return Err(malformed(
                                &wiih,
                                format!("WiiH of {} bytes for {} channels", wiih.size, channels),
                            ));
                        }
                        (dsp_bytes_to_samples(data_size, channels), wiih.offset)
                    }
                    None if fmt.extra_size as u64 == 0x0c + table_size => {
                        let num_samples = source.read_u32(fmt.offset + 0x18, endian)? as u64;
                        (num_samples, fmt.offset + 0x1c)
                    }
                    None => return Err(malformed(&fmt_chunk, "DSP stream without coefficients")),
                };

                let layout = LayoutKind::Interleave { block_size: 8, last_block_size: None };
                let mut descriptor = StreamDescriptor::new(format_name, channels, fmt.sample_rate, coding, layout);
                descriptor.set_num_samples(num_samples);
                for channel in 0..channels {
                    let header = coef_offset + channel as u64 * DSP_HEADER_SIZE;
                    let mut coefs = [0i16; 16];
                    for (i, coef) in coefs.iter_mut().enumerate() {
                        *coef = source.read_i16(header + i as u64 * 2, endian)?;
                    }
                    // history words are big-endian on every platform
                    let hist1 = source.read_i16(header + 0x24, Endian::Big)? as i32;
                    let hist2 = source.read_i16(header + 0x26, Endian::Big)? as i32;
                    descriptor.set_coefs(channel, coefs).set_history(channel, hist1, hist2);
                }
                descriptor
            }
        };

        descriptor.set_base_offset(data_chunk.offset).set_data_size(data_size);

        if let Some(smpl) = walker.find(b"smpl")? {
            if let Some((start, end)) = read_loop(source, &smpl, endian)? {
                apply_loop(&mut descriptor, start, end);
            }
        }

        Ok(descriptor)
    }
}
