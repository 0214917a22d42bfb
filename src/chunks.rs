//! Tagged-chunk walker: `[tag:4][size:4]` framing followed by `size` payload
//! bytes, with the next chunk right after (optionally aligned). Byte order of
//! both the tag and the size is chosen per walk.

use crate::error::StructuralError;
use crate::source::{ByteSource, Endian};

/// A located chunk. `offset` points at the payload, after the 8-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub tag: [u8; 4],
    pub header_offset: u64,
    pub offset: u64,
    pub size: u64,
    pub depth: usize,
    /// Declared size runs past the enclosing region (tolerant walks only)
    pub truncated: bool,
}

impl Chunk {
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).to_string()
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Configurable walk over a chunked region
#[derive(Clone)]
pub struct ChunkWalker<'a> {
    source: &'a dyn ByteSource,
    start: u64,
    end: Option<u64>,
    size_endian: Endian,
    tag_endian: Endian,
    size_includes_header: bool,
    alignment: u64,
    max_chunks: Option<usize>,
    containers: Vec<[u8; 4]>,
    max_depth: usize,
    tolerate_truncation: bool,
}

impl<'a> ChunkWalker<'a> {
    pub fn new(source: &'a dyn ByteSource, start: u64) -> Self {
        Self {
            source,
            start,
            end: None,
            size_endian: Endian::Little,
            tag_endian: Endian::Big,
            size_includes_header: false,
            alignment: 1,
            max_chunks: None,
            containers: Vec::new(),
            max_depth: 0,
            tolerate_truncation: false,
        }
    }

    /// Byte order of the size field
    pub fn endian(mut self, endian: Endian) -> Self {
        self.size_endian = endian;
        self
    }

    /// `Little` means the tag is stored byte-reversed
    pub fn tag_endian(mut self, endian: Endian) -> Self {
        self.tag_endian = endian;
        self
    }

    /// Size field counts the 8-byte header too
    pub fn size_includes_header(mut self, full: bool) -> Self {
        self.size_includes_header = full;
        self
    }

    pub fn align(mut self, alignment: u64) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    pub fn end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    /// Stop after visiting this many chunks (all depths)
    pub fn max_chunks(mut self, count: usize) -> Self {
        self.max_chunks = Some(count);
        self
    }

    /// Descend into chunks with this tag; their payload starts with a 4-byte form type
    pub fn container(mut self, tag: &[u8; 4]) -> Self {
        self.containers.push(*tag);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Yield an oversized chunk (flagged `truncated`) and stop, instead of failing.
    /// Leaves the truncation policy to the caller.
    pub fn tolerate_truncation(mut self, tolerate: bool) -> Self {
        self.tolerate_truncation = tolerate;
        self
    }

    pub fn chunks(&self) -> ChunkIter<'_, 'a> {
        let end = self.end.unwrap_or(u64::MAX).min(self.source.size());
        ChunkIter {
            walker: self,
            stack: vec![Region { pos: self.start, end, depth: 0 }],
            visited: 0,
        }
    }

    /// First chunk with a matching tag at any allowed depth
    pub fn find(&self, tag: &[u8; 4]) -> Result<Option<Chunk>, StructuralError> {
        for chunk in self.chunks() {
            let chunk = chunk?;
            if &chunk.tag == tag {
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
struct Region {
    pos: u64,
    end: u64,
    depth: usize,
}

pub struct ChunkIter<'w, 'a> {
    walker: &'w ChunkWalker<'a>,
    stack: Vec<Region>,
    visited: usize,
}

impl<'w, 'a> ChunkIter<'w, 'a> {
    fn fail(&mut self, err: StructuralError) -> Option<Result<Chunk, StructuralError>> {
        self.stack.clear();
        Some(Err(err))
    }
}

impl<'w, 'a> Iterator for ChunkIter<'w, 'a> {
    type Item = Result<Chunk, StructuralError>;

    fn next(&mut self) -> Option<Self::Item> {
        let walker = self.walker;
        loop {
            if walker.max_chunks.is_some_and(|max| self.visited >= max) {
                return None;
            }

            let region = *self.stack.last()?;
            // trailing bytes that cannot hold a header end the region
            if region.end < region.pos || region.end - region.pos < 8 {
                self.stack.pop();
                continue;
            }

            let mut header = [0u8; 8];
            if let Err(e) = walker.source.read_exact_at(region.pos, &mut header) {
                return self.fail(StructuralError::MalformedChunk {
                    offset: region.pos,
                    reason: e.to_string(),
                });
            }

            let mut tag = [header[0], header[1], header[2], header[3]];
            if walker.tag_endian == Endian::Little {
                tag.reverse();
            }
            let raw_size = walker.size_endian.read_u32(&header[4..8]) as u64;

            let size = if walker.size_includes_header && raw_size != 0 {
                if raw_size < 8 {
                    return self.fail(StructuralError::MalformedChunk {
                        offset: region.pos,
                        reason: format!("size {} smaller than chunk header", raw_size),
                    });
                }
                raw_size - 8
            } else {
                raw_size
            };

            let payload = region.pos + 8;
            self.visited += 1;

            if size > region.end - payload {
                if walker.tolerate_truncation {
                    self.stack.clear();
                    return Some(Ok(Chunk {
                        tag,
                        header_offset: region.pos,
                        offset: payload,
                        size,
                        depth: region.depth,
                        truncated: true,
                    }));
                }
                return self.fail(StructuralError::TruncatedChunk {
                    tag: String::from_utf8_lossy(&tag).to_string(),
                    offset: region.pos,
                    size,
                    available: region.end - payload,
                });
            }

            let padded = size.div_ceil(walker.alignment) * walker.alignment;
            let next = payload.saturating_add(padded).min(region.end);
            if let Some(top) = self.stack.last_mut() {
                top.pos = next;
            }

            if size == 0 {
                continue;
            }

            let chunk = Chunk {
                tag,
                header_offset: region.pos,
                offset: payload,
                size,
                depth: region.depth,
                truncated: false,
            };

            if region.depth < walker.max_depth && size >= 4 && walker.containers.contains(&tag) {
                self.stack.push(Region {
                    pos: payload + 4,
                    end: payload + size,
                    depth: region.depth + 1,
                });
            }

            return Some(Ok(chunk));
        }
    }
}
