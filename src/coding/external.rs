use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Parameters of a codec decoded outside the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCodec {
    pub name: String,
    /// WAVEFORMATEX format tag
    pub format_tag: u16,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub avg_bytes_per_sec: u32,
    /// Codec-specific bytes appended to the format header
    pub extra: Vec<u8>,
    /// Decoder priming samples to drop from the front of the output
    pub skip_samples: u64,
}

/// Decoder for codecs the engine does not implement. Receives a synthesized
/// container header plus the raw payload and returns interleaved PCM16.
pub trait TransformDecoder: Send {
    fn name(&self) -> &str;

    fn decode(&mut self, header: &[u8], payload: &[u8], expected_samples: u64) -> Result<Vec<i16>, DecodeError>;
}

/// Build a minimal RIFF/WAVE header describing `data_size` bytes of `codec` payload
pub fn riff_header(codec: &ExternalCodec, channels: u16, sample_rate: u32, data_size: u32) -> Vec<u8> {
    let has_extension = codec.format_tag != 0x0001 || !codec.extra.is_empty();
    let fmt_size: u32 = if has_extension { 18 + codec.extra.len() as u32 } else { 16 };
    let riff_size = (20 + fmt_size).saturating_add(data_size);

    let mut header = Vec::with_capacity(20 + fmt_size as usize + 8);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&riff_size.to_le_bytes());
    header.extend_from_slice(b"WAVE");

    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&fmt_size.to_le_bytes());
    header.extend_from_slice(&codec.format_tag.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&codec.avg_bytes_per_sec.to_le_bytes());
    header.extend_from_slice(&codec.block_align.to_le_bytes());
    header.extend_from_slice(&codec.bits_per_sample.to_le_bytes());
    if has_extension {
        header.extend_from_slice(&(codec.extra.len() as u16).to_le_bytes());
        header.extend_from_slice(&codec.extra);
    }

    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());
    header
}

/// Transform decoder backed by symphonia's format probe and codec registry
pub struct SymphoniaDecoder {
    hint_extension: String,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self { hint_extension: "wav".to_string() }
    }

    pub fn with_hint(extension: impl Into<String>) -> Self {
        Self { hint_extension: extension.into() }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformDecoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn decode(&mut self, header: &[u8], payload: &[u8], expected_samples: u64) -> Result<Vec<i16>, DecodeError> {
        let mut bytes = Vec::with_capacity(header.len() + payload.len());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(payload);

        let media_source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(&self.hint_extension);

        let probed = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::ExternalRejected(format!("probe failed: {}", e)))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::ExternalRejected("no audio track in payload".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::ExternalRejected(format!("no decoder: {}", e)))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DecodeError::ExternalRejected(format!("packet read failed: {}", e))),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(DecodeError::ExternalRejected(format!("decode failed: {}", e))),
            }
        }

        log::debug!(
            "External decode produced {} interleaved samples ({} frames expected)",
            samples.len(),
            expected_samples
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_codec(channels: u16) -> ExternalCodec {
        ExternalCodec {
            name: "PCM via symphonia".to_string(),
            format_tag: 0x0001,
            block_align: 2 * channels,
            bits_per_sample: 16,
            avg_bytes_per_sec: 8000 * 2 * channels as u32,
            extra: Vec::new(),
            skip_samples: 0,
        }
    }

    #[test]
    fn test_riff_header_layout() {
        let header = riff_header(&pcm_codec(2), 2, 8000, 400);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 36 + 400);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
    }

    #[test]
    fn test_riff_size_saturates() {
        let header = riff_header(&pcm_codec(1), 1, 8000, u32::MAX);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), u32::MAX);
        assert_eq!(u32::from_le_bytes([header[40], header[41], header[42], header[43]]), u32::MAX);
    }

    #[test]
    fn test_riff_header_with_extra() {
        let mut codec = pcm_codec(1);
        codec.format_tag = 0x0270;
        codec.extra = vec![1, 0, 0, 8, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let header = riff_header(&codec, 1, 44100, 0x98);

        assert_eq!(u32::from_le_bytes([header[16], header[17], header[18], header[19]]), 32);
        assert_eq!(u16::from_le_bytes([header[36], header[37]]), 14);
        assert_eq!(&header[52..56], b"data");
        assert_eq!(u16::from_le_bytes([header[20], header[21]]), 0x0270);
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 44100);
        assert_eq!(&header[38..52], &codec.extra[..]);
        assert_eq!(u32::from_le_bytes([header[56], header[57], header[58], header[59]]), 0x98);
    }

    #[test]
    fn test_symphonia_decodes_pcm_payload() {
        let frames: Vec<i16> = (0..64).map(|i| (i * 100 - 3200) as i16).collect();
        let payload: Vec<u8> = frames.iter().flat_map(|s| s.to_le_bytes()).collect();
        let header = riff_header(&pcm_codec(1), 1, 8000, payload.len() as u32);

        let mut decoder = SymphoniaDecoder::new();
        let samples = decoder.decode(&header, &payload, 64).unwrap();
        assert_eq!(samples, frames);
    }

    #[test]
    fn test_symphonia_rejects_garbage() {
        let mut decoder = SymphoniaDecoder::new();
        let result = decoder.decode(b"NOPE", &[0u8; 32], 16);
        assert!(matches!(result, Err(DecodeError::ExternalRejected(_))));
    }
}
