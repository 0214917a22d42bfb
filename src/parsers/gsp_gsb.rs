//! Tecmo GSP+GSB pairs: the `.gsb` holds raw audio, the `.gsp` next to it the
//! header as a chain of big-endian chunks whose sizes count their own header.

use crate::chunks::ChunkWalker;
use crate::coding::{atrac3_bytes_to_samples, blocked_dsp_samples, CodingKind, ExternalCodec};
use crate::error::{ParseError, StructuralError};
use crate::layout::{BlockSizing, BlockedLayout, LayoutKind};
use crate::models::StreamDescriptor;
use crate::source::{open_by_ext, swap_extension, ByteSource, ByteSourceExt, Endian};

use super::{apply_loop, FormatParser};

const CODEC_DSP: u32 = 0x04;
const CODEC_ATRAC3: u32 = 0x08;
const CODEC_XMA2: u32 = 0x09;

/// Coefficient tables in GCEX start here, one per channel
const GCEX_COEFS: u64 = 0x18;
const GCEX_COEF_SPACING: u64 = 0x30;

const ATRAC3_FRAME_PER_CHANNEL: u64 = 0x98;
const ATRAC3_ENCODER_DELAY: u64 = 1024 + 69 * 2;

pub struct GspGsbParser;

/// Fields shared by every codec, from DATA and BSIC
#[derive(Debug, Clone, Copy)]
struct Header {
    data_size: u64,
    codec: u32,
    sample_rate: u32,
    channels: usize,
    num_samples: u64,
    looped: bool,
    loop_start: u64,
    loop_end: u64,
}

fn required(walker: &ChunkWalker<'_>, tag: &[u8; 4]) -> Result<u64, ParseError> {
    match walker.find(tag)? {
        Some(chunk) => Ok(chunk.offset),
        None => Err(StructuralError::MalformedChunk {
            offset: 0,
            reason: format!("GSP header has no {} chunk", String::from_utf8_lossy(tag)),
        }
        .into()),
    }
}

fn read_header(head: &dyn ByteSource, walker: &ChunkWalker<'_>) -> Result<Header, ParseError> {
    required(walker, b"HEAD")?;

    let data = required(walker, b"DATA")?;
    let bsic = required(walker, b"BSIC")?;

    Ok(Header {
        data_size: head.read_u32(data, Endian::Big)? as u64,
        codec: head.read_u32(data + 0x04, Endian::Big)?,
        sample_rate: head.read_u32(data + 0x08, Endian::Big)?,
        channels: head.read_u16(data + 0x0e, Endian::Big)? as usize,
        num_samples: head.read_u32(data + 0x14, Endian::Big)? as u64,
        looped: head.read_u8(bsic + 0x0c)? != 0,
        loop_start: head.read_u32(bsic + 0x10, Endian::Big)? as u64,
        loop_end: head.read_u32(bsic + 0x14, Endian::Big)? as u64,
    })
}

fn dsp_descriptor(head: &dyn ByteSource, walker: &ChunkWalker<'_>, header: &Header) -> Result<StreamDescriptor, ParseError> {
    let gcex = required(walker, b"GCEX")?;
    let block_size = head.read_u32(gcex, Endian::Big)? as u64;
    let header_size = head.read_u32(gcex + 0x04, Endian::Big)? as u64;
    let block_count = head.read_u32(gcex + 0x08, Endian::Big)? as usize;

    let layout = LayoutKind::Blocked(BlockedLayout {
        header_size,
        block_count,
        sizing: BlockSizing::Fixed(block_size),
        sub_block: None,
    });
    let mut descriptor = StreamDescriptor::new("GSP+GSB", header.channels, header.sample_rate, CodingKind::NgcDsp, layout);
    descriptor.set_num_samples(blocked_dsp_samples(
        header.data_size,
        header_size,
        block_count as u64,
        header.channels,
    ));

    for channel in 0..header.channels {
        let table = gcex + GCEX_COEFS + channel as u64 * GCEX_COEF_SPACING;
        let mut coefs = [0i16; 16];
        for (i, coef) in coefs.iter_mut().enumerate() {
            *coef = head.read_i16(table + i as u64 * 2, Endian::Big)?;
        }
        descriptor.set_coefs(channel, coefs);
    }

    if header.looped {
        apply_loop(&mut descriptor, header.loop_start, header.loop_end);
    }
    Ok(descriptor)
}

fn atrac3_codec(channels: usize, sample_rate: u32) -> ExternalCodec {
    let block_align = ATRAC3_FRAME_PER_CHANNEL * channels as u64;
    let joint_stereo: u8 = (block_align == 0x60 * channels as u64) as u8;

    let mut extra = Vec::with_capacity(14);
    extra.extend_from_slice(&1u16.to_le_bytes());
    extra.extend_from_slice(&(0x0800 * channels as u32).to_le_bytes());
    extra.extend_from_slice(&[joint_stereo, 0, joint_stereo, 0]);
    extra.extend_from_slice(&1u16.to_le_bytes());
    extra.extend_from_slice(&0u16.to_le_bytes());

    ExternalCodec {
        name: "ATRAC3".to_string(),
        format_tag: 0x0270,
        block_align: block_align as u16,
        bits_per_sample: 0,
        avg_bytes_per_sec: (sample_rate as u64 * block_align / 1024) as u32,
        extra,
        skip_samples: ATRAC3_ENCODER_DELAY,
    }
}

fn atrac3_descriptor(header: &Header) -> StreamDescriptor {
    let codec = atrac3_codec(header.channels, header.sample_rate);
    let block_align = codec.block_align as u64;

    let mut descriptor = StreamDescriptor::new(
        "GSP+GSB",
        header.channels,
        header.sample_rate,
        CodingKind::External(codec),
        LayoutKind::Flat,
    );
    // header sample counts do not match the payload; derive them from its size
    descriptor.set_num_samples(
        atrac3_bytes_to_samples(header.data_size, block_align).saturating_sub(ATRAC3_ENCODER_DELAY),
    );

    if header.looped {
        // loop points are byte offsets into the payload
        let start = atrac3_bytes_to_samples(header.loop_start, block_align);
        let end = atrac3_bytes_to_samples(header.loop_end, block_align).saturating_sub(ATRAC3_ENCODER_DELAY);
        apply_loop(&mut descriptor, start, end);
    }
    descriptor
}

impl FormatParser for GspGsbParser {
    fn name(&self) -> &'static str {
        "GSP+GSB"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gsb"]
    }

    fn parse(&self, source: &dyn ByteSource) -> Result<StreamDescriptor, ParseError> {
        let head = open_by_ext(source, "gsp").ok_or_else(|| ParseError::MissingCompanion {
            name: swap_extension(source.name(), "gsp"),
        })?;
        if !head.is_id32(0, b"GSND") {
            return Err(ParseError::NotThisFormat);
        }

        let first_offset = head.read_u32(0x10, Endian::Big)? as u64;
        let walker = ChunkWalker::new(head.as_ref(), first_offset)
            .endian(Endian::Big)
            .size_includes_header(true);
        let header = read_header(head.as_ref(), &walker)?;
        if header.channels == 0 {
            return Err(StructuralError::InvalidDescriptor("GSP header declares no channels".to_string()).into());
        }
        log::debug!(
            "GSP header: codec 0x{:02x}, {} ch, {} Hz, {} data bytes, {} header samples",
            header.codec,
            header.channels,
            header.sample_rate,
            header.data_size,
            header.num_samples
        );

        let mut descriptor = match header.codec {
            CODEC_DSP => dsp_descriptor(head.as_ref(), &walker, &header)?,
            CODEC_ATRAC3 => atrac3_descriptor(&header),
            CODEC_XMA2 => {
                return Err(ParseError::Unsupported { format: "GSP+GSB".to_string(), codec: "XMA2".to_string() })
            }
            other => {
                return Err(ParseError::Unsupported {
                    format: "GSP+GSB".to_string(),
                    codec: format!("codec 0x{:02x}", other),
                })
            }
        };

        if header.data_size > source.size() {
            return Err(StructuralError::TruncatedChunk {
                tag: "GSB payload".to_string(),
                offset: 0,
                size: header.data_size,
                available: source.size(),
            }
            .into());
        }
        descriptor.set_base_offset(0).set_data_size(header.data_size);
        Ok(descriptor)
    }
}
