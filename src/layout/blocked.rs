//! Variable-block layouts: the payload is a chain of blocks, each with its own
//! header, whose sizes are fixed or read from the block header. The chain is
//! walked once at open and the cumulative sample index kept for lookups.

use crate::coding::FrameGeometry;
use crate::error::StructuralError;
use crate::source::{ByteSource, ByteSourceExt, Endian};

/// How each block's total size is found
#[derive(Debug, Clone, PartialEq)]
pub enum BlockSizing {
    /// Every block has this size; the last one may be cut by the payload end
    Fixed(u64),
    /// Size stored as a u32 inside the block header
    FromHeader {
        field_offset: u64,
        endian: Endian,
        /// Whether the stored size counts the header itself
        includes_header: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockedLayout {
    pub header_size: u64,
    pub block_count: usize,
    pub sizing: BlockSizing,
    /// Per-channel interleave inside a block payload. `None` splits the payload
    /// evenly between channels.
    pub sub_block: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Absolute offset of the block header
    pub offset: u64,
    /// Total block size including the header
    pub size: u64,
    pub first_sample: u64,
    pub samples: u64,
}

#[derive(Debug, Clone)]
pub struct BlockIndex {
    entries: Vec<BlockEntry>,
    total_samples: u64,
}

impl BlockIndex {
    pub fn build(
        layout: &BlockedLayout,
        source: &dyn ByteSource,
        base_offset: u64,
        data_size: Option<u64>,
        channels: usize,
        geometry: FrameGeometry,
    ) -> Result<Self, StructuralError> {
        let end = match data_size {
            Some(size) => base_offset.saturating_add(size).min(source.size()),
            None => source.size(),
        };

        // every block holds more than its header, so the payload bounds the count
        let fit = end.saturating_sub(base_offset) / layout.header_size.saturating_add(1);
        let mut entries = Vec::with_capacity(layout.block_count.min(fit as usize));
        let mut offset = base_offset;
        let mut first_sample = 0u64;

        for block in 0..layout.block_count {
            let remaining = end.saturating_sub(offset);
            if remaining == 0 {
                log::warn!(
                    "Payload ends after {} of {} declared blocks",
                    block,
                    layout.block_count
                );
                break;
            }
            if remaining < layout.header_size {
                return Err(StructuralError::MalformedChunk {
                    offset,
                    reason: format!("block {} header cut by payload end", block),
                });
            }

            let size = match &layout.sizing {
                BlockSizing::Fixed(size) => (*size).min(remaining),
                BlockSizing::FromHeader { field_offset, endian, includes_header } => {
                    let stored = source
                        .read_u32(offset + field_offset, *endian)
                        .map_err(|e| StructuralError::MalformedChunk {
                            offset,
                            reason: format!("block {} size unreadable: {}", block, e),
                        })? as u64;
                    let size = if *includes_header { stored } else { stored + layout.header_size };
                    if size > remaining {
                        return Err(StructuralError::TruncatedChunk {
                            tag: format!("block {}", block),
                            offset,
                            size,
                            available: remaining,
                        });
                    }
                    size
                }
            };
            if size <= layout.header_size {
                return Err(StructuralError::MalformedChunk {
                    offset,
                    reason: format!("block {} has no payload", block),
                });
            }

            let samples = payload_samples(size - layout.header_size, layout.sub_block, channels, geometry);
            entries.push(BlockEntry { offset, size, first_sample, samples });
            first_sample += samples;
            offset += size;
        }

        log::debug!("Indexed {} blocks, {} samples", entries.len(), first_sample);
        Ok(Self { entries, total_samples: first_sample })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn entry(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    /// Index of the block holding `position`
    pub fn find(&self, position: u64) -> Option<usize> {
        let index = self.entries.partition_point(|e| e.first_sample + e.samples <= position);
        (index < self.entries.len()).then_some(index)
    }
}

/// Per-channel sub-block size inside a payload of `payload_size` bytes
pub fn sub_block_size(payload_size: u64, sub_block: Option<u64>, channels: usize) -> u64 {
    sub_block.unwrap_or(payload_size / channels.max(1) as u64)
}

fn payload_samples(payload_size: u64, sub_block: Option<u64>, channels: usize, geometry: FrameGeometry) -> u64 {
    let sub = sub_block_size(payload_size, sub_block, channels);
    if sub == 0 {
        return 0;
    }
    let rounds = payload_size / (sub * channels as u64);
    rounds * (sub / geometry.bytes_per_frame) * geometry.samples_per_frame
}
