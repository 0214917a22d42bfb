//! Coding engine: per-frame decoders that turn encoded bytes plus per-channel
//! history into PCM16 samples.

pub mod dsp;
pub mod external;
pub mod ima;
pub mod pcm;
pub mod psx;

use crate::error::{DecodeError, StructuralError};
use crate::models::{ChannelHistory, ChannelSetup};
use crate::source::Endian;

pub use external::{riff_header, ExternalCodec, SymphoniaDecoder, TransformDecoder};

/// Sample encodings understood by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CodingKind {
    Pcm16 { endian: Endian },
    Pcm8,
    Pcm8Unsigned,
    /// Nintendo GameCube DSP ADPCM
    NgcDsp,
    /// PlayStation 4-bit ADPCM
    PsxAdpcm,
    /// Wwise-flavoured IMA ADPCM; each frame is one channel sub-block
    WwiseIma { endian: Endian },
    /// Opaque codec handed to a transform decoder
    External(ExternalCodec),
}

/// Fixed byte/sample footprint of one frame of a frame-based coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub bytes_per_frame: u64,
    pub samples_per_frame: u64,
}

/// Where decoding may restart with freshly derivable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPoint {
    /// Stateless coding: any sample
    AnySample,
    /// Each frame carries its own state
    FrameStart,
    /// History only known at the start of the stream
    StreamStart,
}

/// Truncation handling when the declared payload runs past the source end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Shrink the payload to what is actually there
    Truncate,
    /// Refuse to open
    Fail,
}

impl CodingKind {
    pub fn name(&self) -> &str {
        match self {
            CodingKind::Pcm16 { endian: Endian::Little } => "PCM16LE",
            CodingKind::Pcm16 { endian: Endian::Big } => "PCM16BE",
            CodingKind::Pcm8 => "PCM8",
            CodingKind::Pcm8Unsigned => "PCM8U",
            CodingKind::NgcDsp => "NGC DSP ADPCM",
            CodingKind::PsxAdpcm => "PSX ADPCM",
            CodingKind::WwiseIma { .. } => "Wwise IMA ADPCM",
            CodingKind::External(codec) => &codec.name,
        }
    }

    /// Frame geometry, given the per-channel interleave or sub-block size when the
    /// coding's frame size depends on it. `None` for external codings.
    pub fn frame_geometry(&self, sub_block: Option<u64>) -> Result<Option<FrameGeometry>, StructuralError> {
        let geometry = match self {
            CodingKind::Pcm16 { .. } => FrameGeometry { bytes_per_frame: 2, samples_per_frame: 1 },
            CodingKind::Pcm8 | CodingKind::Pcm8Unsigned => {
                FrameGeometry { bytes_per_frame: 1, samples_per_frame: 1 }
            }
            CodingKind::NgcDsp => FrameGeometry {
                bytes_per_frame: dsp::FRAME_SIZE as u64,
                samples_per_frame: dsp::SAMPLES_PER_FRAME as u64,
            },
            CodingKind::PsxAdpcm => FrameGeometry {
                bytes_per_frame: psx::FRAME_SIZE as u64,
                samples_per_frame: psx::SAMPLES_PER_FRAME as u64,
            },
            CodingKind::WwiseIma { .. } => {
                let size = sub_block.ok_or_else(|| {
                    StructuralError::InvalidDescriptor("IMA coding needs a sub-block size".to_string())
                })?;
                if size <= ima::HEADER_SIZE as u64 {
                    return Err(StructuralError::InvalidDescriptor(format!(
                        "IMA sub-block of {} bytes has no room for samples",
                        size
                    )));
                }
                FrameGeometry {
                    bytes_per_frame: size,
                    samples_per_frame: ima::samples_in_frame(size as usize) as u64,
                }
            }
            CodingKind::External(_) => return Ok(None),
        };
        Ok(Some(geometry))
    }

    pub fn reset_point(&self) -> ResetPoint {
        match self {
            CodingKind::Pcm16 { .. } | CodingKind::Pcm8 | CodingKind::Pcm8Unsigned => ResetPoint::AnySample,
            CodingKind::WwiseIma { .. } | CodingKind::External(_) => ResetPoint::FrameStart,
            CodingKind::NgcDsp | CodingKind::PsxAdpcm => ResetPoint::StreamStart,
        }
    }

    pub fn truncation_policy(&self) -> TruncationPolicy {
        match self {
            CodingKind::WwiseIma { .. } => TruncationPolicy::Truncate,
            _ => TruncationPolicy::Fail,
        }
    }
}

/// Mutable per-channel decode state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub hist1: i32,
    pub hist2: i32,
    pub step_index: i32,
    pub coefs: Option<[i16; 16]>,
}

impl ChannelState {
    pub fn from_setup(setup: &ChannelSetup) -> Self {
        Self {
            hist1: setup.history.hist1,
            hist2: setup.history.hist2,
            step_index: setup.history.step_index,
            coefs: setup.coefs,
        }
    }

    pub fn history(&self) -> ChannelHistory {
        ChannelHistory {
            hist1: self.hist1,
            hist2: self.hist2,
            step_index: self.step_index,
        }
    }

    /// Replace the history, keeping static coefficients
    pub fn restore(&mut self, history: &ChannelHistory) {
        self.hist1 = history.hist1;
        self.hist2 = history.hist2;
        self.step_index = history.step_index;
    }
}

/// Decode `count` samples of one channel from a run of frames.
///
/// `data` holds the channel's bytes starting at the first frame; consecutive frames
/// start `frame_stride` bytes apart and the last one may be short. The first `skip`
/// samples of the first frame were already consumed and `state` holds the history
/// after them. Output goes to `out[i * out_stride]`.
#[allow(clippy::too_many_arguments)]
pub fn decode_frames(
    kind: &CodingKind,
    geometry: FrameGeometry,
    state: &mut ChannelState,
    data: &[u8],
    data_offset: u64,
    frame_stride: usize,
    skip: usize,
    count: usize,
    out: &mut [i16],
    out_stride: usize,
) -> Result<usize, DecodeError> {
    let bytes_per_frame = geometry.bytes_per_frame as usize;
    let samples_per_frame = geometry.samples_per_frame as usize;
    if count > 0 && out.len() < (count - 1) * out_stride + 1 {
        return Err(DecodeError::StateSizeMismatch {
            expected: (count - 1) * out_stride + 1,
            found: out.len(),
        });
    }

    let mut produced = 0;
    let mut first = skip;
    let mut frame_index = 0;
    while produced < count {
        let start = frame_index * frame_stride;
        let end = (start + bytes_per_frame).min(data.len());
        let frame_offset = data_offset + start as u64;
        if start >= end {
            return Err(DecodeError::CorruptFrame {
                offset: frame_offset,
                reason: "frame lies outside the read window".to_string(),
            });
        }
        let frame = &data[start..end];

        let wanted = (samples_per_frame - first).min(count - produced);
        let target = &mut out[produced * out_stride..];
        decode_frame(kind, state, frame, frame_offset, first, wanted, target, out_stride)?;

        produced += wanted;
        first = 0;
        frame_index += 1;
    }

    Ok(produced)
}

#[allow(clippy::too_many_arguments)]
fn decode_frame(
    kind: &CodingKind,
    state: &mut ChannelState,
    frame: &[u8],
    offset: u64,
    first: usize,
    count: usize,
    out: &mut [i16],
    stride: usize,
) -> Result<(), DecodeError> {
    match kind {
        CodingKind::Pcm16 { endian } => pcm::decode_pcm16(frame, *endian, offset, first, count, out, stride),
        CodingKind::Pcm8 => pcm::decode_pcm8(frame, false, offset, first, count, out, stride),
        CodingKind::Pcm8Unsigned => pcm::decode_pcm8(frame, true, offset, first, count, out, stride),
        CodingKind::NgcDsp => dsp::decode_frame(state, frame, offset, first, count, out, stride),
        CodingKind::PsxAdpcm => psx::decode_frame(state, frame, offset, first, count, out, stride),
        CodingKind::WwiseIma { endian } => {
            ima::decode_frame(state, *endian, frame, offset, first, count, out, stride)
        }
        CodingKind::External(codec) => Err(DecodeError::UnknownCoding(format!(
            "{} is decoded by a transform decoder, not per frame",
            codec.name
        ))),
    }
}

#[inline]
pub(crate) fn clamp16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub(crate) fn frame_too_short(offset: u64) -> DecodeError {
    DecodeError::CorruptFrame {
        offset,
        reason: "frame too short for the requested samples".to_string(),
    }
}

pub fn pcm_bytes_to_samples(bytes: u64, channels: usize, bits_per_sample: u32) -> u64 {
    if channels == 0 || bits_per_sample < 8 {
        return 0;
    }
    bytes / channels as u64 / (bits_per_sample as u64 / 8)
}

pub fn dsp_bytes_to_samples(bytes: u64, channels: usize) -> u64 {
    if channels == 0 {
        return 0;
    }
    bytes / channels as u64 / dsp::FRAME_SIZE as u64 * dsp::SAMPLES_PER_FRAME as u64
}

pub fn psx_bytes_to_samples(bytes: u64, channels: usize) -> u64 {
    if channels == 0 {
        return 0;
    }
    bytes / channels as u64 / psx::FRAME_SIZE as u64 * psx::SAMPLES_PER_FRAME as u64
}

/// IMA sample count for whole blocks of `block_align` bytes (all channels), counting
/// a trailing partial block
pub fn ima_bytes_to_samples(bytes: u64, block_align: u64, channels: usize) -> u64 {
    if channels == 0 || block_align == 0 {
        return 0;
    }
    let channels = channels as u64;
    let header = ima::HEADER_SIZE as u64 * channels;
    let per_block = |size: u64| {
        if size <= header {
            0
        } else {
            (size - header) * 2 / channels + 1
        }
    };
    (bytes / block_align) * per_block(block_align) + per_block(bytes % block_align)
}

/// DSP samples in a blocked payload once every block header is taken out
pub fn blocked_dsp_samples(data_size: u64, header_size: u64, block_count: u64, channels: usize) -> u64 {
    let headers = header_size.saturating_mul(block_count);
    dsp_bytes_to_samples(data_size.saturating_sub(headers), channels)
}

/// ATRAC3 frames carry 1024 samples per channel
pub fn atrac3_bytes_to_samples(bytes: u64, block_align: u64) -> u64 {
    if block_align == 0 {
        return 0;
    }
    bytes / block_align * 1024
}
