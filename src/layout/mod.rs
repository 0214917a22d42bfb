//! Layout engine: maps a sample position to the byte ranges holding each
//! channel's frames.

pub mod blocked;

use crate::coding::FrameGeometry;
use crate::error::{RangeError, StructuralError};
use crate::models::StreamDescriptor;
use crate::source::ByteSource;

pub use blocked::{BlockEntry, BlockIndex, BlockSizing, BlockedLayout};

/// How channel data is arranged in the payload
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutKind {
    /// Frame-interleaved: one frame of every channel, in channel order
    Flat,
    /// Fixed-size per-channel blocks in channel order, repeating
    Interleave {
        block_size: u64,
        /// Per-channel size of a short final block
        last_block_size: Option<u64>,
    },
    /// Chain of self-described blocks
    Blocked(BlockedLayout),
}

impl LayoutKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayoutKind::Flat => "flat",
            LayoutKind::Interleave { .. } => "interleave",
            LayoutKind::Blocked(_) => "blocked",
        }
    }

    /// Per-channel contiguous span, for codings whose frame size follows it
    pub fn channel_span(&self) -> Option<u64> {
        match self {
            LayoutKind::Flat => None,
            LayoutKind::Interleave { block_size, .. } => Some(*block_size),
            LayoutKind::Blocked(blocked) => blocked.sub_block,
        }
    }
}

/// Byte range of one channel inside a read plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRead {
    pub offset: u64,
    pub length: usize,
    /// Distance between consecutive frames of this channel
    pub frame_stride: usize,
}

/// A run of frames that can be decoded without crossing a layout boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub position: u64,
    /// Samples of the first frame before `position`
    pub skip: usize,
    pub samples: usize,
    pub block: Option<usize>,
    /// Bytes left in the current block or sub-block after this run
    pub boundary_bytes: u64,
    pub channels: Vec<ChannelRead>,
}

impl ReadPlan {
    pub fn frame_start(&self) -> u64 {
        self.position - self.skip as u64
    }
}

pub struct LayoutEngine {
    kind: LayoutKind,
    geometry: FrameGeometry,
    channels: usize,
    base_offset: u64,
    num_samples: u64,
    index: Option<BlockIndex>,
}

impl LayoutEngine {
    pub fn new(
        descriptor: &StreamDescriptor,
        geometry: FrameGeometry,
        source: &dyn ByteSource,
    ) -> Result<Self, StructuralError> {
        let bytes_per_frame = geometry.bytes_per_frame;
        if bytes_per_frame == 0 || geometry.samples_per_frame == 0 {
            return Err(StructuralError::InvalidDescriptor("empty frame geometry".to_string()));
        }

        let index = match &descriptor.layout {
            LayoutKind::Flat => None,
            LayoutKind::Interleave { block_size, last_block_size } => {
                if *block_size == 0 || block_size % bytes_per_frame != 0 {
                    return Err(StructuralError::InvalidDescriptor(format!(
                        "interleave {} is not a multiple of the {}-byte frame",
                        block_size, bytes_per_frame
                    )));
                }
                if last_block_size.is_some_and(|last| last == 0 || last > *block_size) {
                    return Err(StructuralError::InvalidDescriptor(format!(
                        "last block size {:?} outside 1..={}",
                        last_block_size, block_size
                    )));
                }
                None
            }
            LayoutKind::Blocked(blocked) => {
                if let Some(sub) = blocked.sub_block {
                    if sub == 0 || sub % bytes_per_frame != 0 {
                        return Err(StructuralError::InvalidDescriptor(format!(
                            "sub-block {} is not a multiple of the {}-byte frame",
                            sub, bytes_per_frame
                        )));
                    }
                }
                Some(BlockIndex::build(
                    blocked,
                    source,
                    descriptor.base_offset,
                    descriptor.data_size,
                    descriptor.channels,
                    geometry,
                )?)
            }
        };

        Ok(Self {
            kind: descriptor.layout.clone(),
            geometry,
            channels: descriptor.channels,
            base_offset: descriptor.base_offset,
            num_samples: descriptor.num_samples,
            index,
        })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn block_index(&self) -> Option<&BlockIndex> {
        self.index.as_ref()
    }

    /// Samples the layout can actually address, when it is known
    pub fn capacity(&self) -> Option<u64> {
        self.index.as_ref().map(BlockIndex::total_samples)
    }

    pub(crate) fn clamp_samples(&mut self, num_samples: u64) {
        self.num_samples = num_samples;
    }

    /// Plan the reads for up to `max_samples` samples starting at `position`.
    /// The run stops early at block boundaries.
    pub fn locate(&self, position: u64, max_samples: usize) -> Result<ReadPlan, RangeError> {
        if position >= self.num_samples {
            return Err(RangeError::PositionOutOfRange { position, num_samples: self.num_samples });
        }
        let wanted = (max_samples as u64).min(self.num_samples - position).max(1);

        match &self.kind {
            LayoutKind::Flat => Ok(self.locate_flat(position, wanted)),
            LayoutKind::Interleave { block_size, last_block_size } => {
                self.locate_interleave(position, wanted, *block_size, *last_block_size)
            }
            LayoutKind::Blocked(blocked) => self.locate_blocked(position, wanted, blocked),
        }
    }

    fn locate_flat(&self, position: u64, wanted: u64) -> ReadPlan {
        let bpf = self.geometry.bytes_per_frame;
        let spf = self.geometry.samples_per_frame;
        let frame = position / spf;
        let skip = position % spf;
        let frames = (skip + wanted).div_ceil(spf);
        let stride = bpf * self.channels as u64;

        let channels = (0..self.channels as u64)
            .map(|c| ChannelRead {
                offset: self.base_offset + frame * stride + c * bpf,
                length: ((frames - 1) * stride + bpf) as usize,
                frame_stride: stride as usize,
            })
            .collect();

        ReadPlan {
            position,
            skip: skip as usize,
            samples: wanted as usize,
            block: None,
            boundary_bytes: 0,
            channels,
        }
    }

    fn locate_interleave(
        &self,
        position: u64,
        wanted: u64,
        block_size: u64,
        last_block_size: Option<u64>,
    ) -> Result<ReadPlan, RangeError> {
        let bpf = self.geometry.bytes_per_frame;
        let spf = self.geometry.samples_per_frame;
        let channels = self.channels as u64;
        let frames_per_block = block_size / bpf;
        let samples_per_block = frames_per_block * spf;

        let block = position / samples_per_block;
        let in_block = position % samples_per_block;
        let frame_in_block = in_block / spf;
        let skip = in_block % spf;
        let needed = (skip + wanted).div_ceil(spf);

        let last_index = (self.num_samples - 1) / samples_per_block;
        let short_last = last_block_size.filter(|_| block == last_index);
        let block_start = self.base_offset + block * block_size * channels;

        // one frame per block: a channel's frames sit a whole interleave round apart
        if frames_per_block == 1 && short_last.is_none() {
            let blocks_left = match last_block_size {
                Some(_) => last_index - block,
                None => u64::MAX,
            };
            let frames = needed.min(blocks_left);
            let stride = block_size * channels;
            let samples = wanted.min(frames * spf - skip);

            return Ok(ReadPlan {
                position,
                skip: skip as usize,
                samples: samples as usize,
                block: Some((block + frames - 1) as usize),
                boundary_bytes: 0,
                channels: (0..channels)
                    .map(|c| ChannelRead {
                        offset: block_start + c * block_size,
                        length: ((frames - 1) * stride + bpf) as usize,
                        frame_stride: stride as usize,
                    })
                    .collect(),
            });
        }

        let current = short_last.unwrap_or(block_size);
        let block_frames = current.div_ceil(bpf);
        if frame_in_block >= block_frames {
            return Err(RangeError::PositionOutOfRange { position, num_samples: self.num_samples });
        }
        let frames = needed.min(block_frames - frame_in_block);
        let samples = wanted.min(frames * spf - skip);
        let read_start = frame_in_block * bpf;
        let length = (frames * bpf).min(current - read_start);

        Ok(ReadPlan {
            position,
            skip: skip as usize,
            samples: samples as usize,
            block: Some(block as usize),
            boundary_bytes: current - read_start - length,
            channels: (0..channels)
                .map(|c| ChannelRead {
                    offset: block_start + c * current + read_start,
                    length: length as usize,
                    frame_stride: bpf as usize,
                })
                .collect(),
        })
    }

    fn locate_blocked(&self, position: u64, wanted: u64, layout: &BlockedLayout) -> Result<ReadPlan, RangeError> {
        let index = self
            .index
            .as_ref()
            .ok_or(RangeError::BlockOutOfRange { index: 0, block_count: 0 })?;
        let block = index.find(position).ok_or(RangeError::BlockOutOfRange {
            index: index.len(),
            block_count: index.len(),
        })?;
        let entry = index.entry(block).ok_or(RangeError::BlockOutOfRange {
            index: block,
            block_count: index.len(),
        })?;

        let bpf = self.geometry.bytes_per_frame;
        let spf = self.geometry.samples_per_frame;
        let channels = self.channels as u64;

        let payload = entry.offset + layout.header_size;
        let sub = blocked::sub_block_size(entry.size - layout.header_size, layout.sub_block, self.channels);
        let frames_per_sub = sub / bpf;
        let samples_per_sub = frames_per_sub * spf;

        let in_block = position - entry.first_sample;
        let round = in_block / samples_per_sub;
        let within = in_block % samples_per_sub;
        let frame_in_sub = within / spf;
        let skip = within % spf;

        let frames = (skip + wanted).div_ceil(spf).min(frames_per_sub - frame_in_sub);
        let samples = wanted.min(frames * spf - skip).min(entry.samples - in_block);
        let round_start = payload + round * sub * channels;

        Ok(ReadPlan {
            position,
            skip: skip as usize,
            samples: samples as usize,
            block: Some(block),
            boundary_bytes: (frames_per_sub - frame_in_sub - frames) * bpf,
            channels: (0..channels)
                .map(|c| ChannelRead {
                    offset: round_start + c * sub + frame_in_sub * bpf,
                    length: (frames * bpf) as usize,
                    frame_stride: bpf as usize,
                })
                .collect(),
        })
    }
}
