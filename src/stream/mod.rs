//! Stream handle: owns the playback cursor and per-channel decode state, and
//! drives layout, coding and loop handling for render and seek.

pub mod loop_controller;

use log::{debug, info, trace, warn};

use crate::coding::{self, riff_header, ChannelState, CodingKind, ResetPoint, TransformDecoder};
use crate::error::{DecodeError, EngineError, RangeError, RenderFailure, StructuralError};
use crate::layout::LayoutEngine;
use crate::models::{StreamDescriptor, StreamInfo};
use crate::source::ByteSource;

pub use loop_controller::{LoopController, LoopState};

/// Samples decoded per step while priming history after a seek
const PRIME_CHUNK: usize = 4096;

/// Per-open playback options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Number of loop jumps before the stream plays through to its end
    pub loop_limit: Option<u32>,
    /// Play straight through, ignoring the descriptor's loop region
    pub ignore_loop: bool,
    /// Keep the decoder state seen at loop start for seamless jumps
    pub capture_loop_snapshot: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            loop_limit: None,
            ignore_loop: false,
            capture_loop_snapshot: true,
        }
    }
}

/// Result of a successful render call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rendered {
    pub samples: usize,
    /// The cursor sits at the stream end and no loop jump is pending
    pub end_of_stream: bool,
    /// A loop jump happened at the start of this call
    pub looped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackCursor {
    pub position: u64,
    pub block: Option<usize>,
    /// Bytes left before the next block boundary
    pub boundary_bytes: u64,
    /// Set by a seek or loop jump, cleared by the next decode
    pub just_reprimed: bool,
}

struct ExternalPipeline {
    decoder: Box<dyn TransformDecoder>,
    header: Vec<u8>,
    data_size: u64,
    skip_samples: u64,
    decoded: Option<Vec<i16>>,
}

enum Pipeline {
    Frames(LayoutEngine),
    External(ExternalPipeline),
}

enum Fill {
    Decode,
    Silence,
}

struct SpanFailure {
    written: usize,
    run_samples: usize,
    cause: DecodeError,
}

pub struct Stream<'a> {
    source: &'a dyn ByteSource,
    descriptor: StreamDescriptor,
    pipeline: Pipeline,
    states: Vec<ChannelState>,
    initial_states: Vec<ChannelState>,
    cursor: PlaybackCursor,
    looper: LoopController,
    scratch: Vec<i16>,
}

impl<'a> Stream<'a> {
    pub fn open(descriptor: StreamDescriptor, source: &'a dyn ByteSource) -> Result<Self, EngineError> {
        Self::open_with(descriptor, source, StreamOptions::default())
    }

    pub fn open_with(
        mut descriptor: StreamDescriptor,
        source: &'a dyn ByteSource,
        options: StreamOptions,
    ) -> Result<Self, EngineError> {
        descriptor.validate()?;

        let pipeline = match descriptor.coding.clone() {
            CodingKind::External(codec) => {
                let decoder = descriptor.transform.take().ok_or_else(|| {
                    StructuralError::InvalidDescriptor("external coding needs a transform decoder".to_string())
                })?;
                let data_size = descriptor
                    .data_size
                    .unwrap_or_else(|| source.size().saturating_sub(descriptor.base_offset));
                let header = riff_header(
                    &codec,
                    descriptor.channels as u16,
                    descriptor.sample_rate,
                    data_size.min(u32::MAX as u64) as u32,
                );
                Pipeline::External(ExternalPipeline {
                    decoder,
                    header,
                    data_size,
                    skip_samples: codec.skip_samples,
                    decoded: None,
                })
            }
            kind => {
                let geometry = kind
                    .frame_geometry(descriptor.layout.channel_span())?
                    .ok_or_else(|| StructuralError::UnknownCoding(kind.name().to_string()))?;
                let mut engine = LayoutEngine::new(&descriptor, geometry, source)?;
                if let Some(capacity) = engine.capacity() {
                    if capacity < descriptor.num_samples {
                        warn!(
                            "Blocks hold {} samples, header declares {}; clamping",
                            capacity, descriptor.num_samples
                        );
                        clamp_length(&mut descriptor, capacity);
                        engine.clamp_samples(capacity);
                    }
                }
                Pipeline::Frames(engine)
            }
        };

        let states: Vec<ChannelState> = if descriptor.channel_setup.is_empty() {
            vec![ChannelState::default(); descriptor.channels]
        } else {
            descriptor.channel_setup.iter().map(ChannelState::from_setup).collect()
        };

        let region = if options.ignore_loop { None } else { descriptor.loop_region };
        let looper = LoopController::new(
            region,
            options.loop_limit,
            options.capture_loop_snapshot,
            descriptor.loop_snapshot.clone(),
        );

        info!("Opened stream: {}", descriptor.info().describe());

        Ok(Self {
            source,
            initial_states: states.clone(),
            states,
            descriptor,
            pipeline,
            cursor: PlaybackCursor::default(),
            looper,
            scratch: Vec::new(),
        })
    }

    /// Render up to `sample_count` interleaved sample frames into `out`.
    ///
    /// Renders stop at loop end; the jump back happens at the start of the next
    /// call. Rendering past the end of a non-looping stream is a range error.
    pub fn render(&mut self, out: &mut [i16], sample_count: usize) -> Result<Rendered, EngineError> {
        self.fill(out, sample_count, Fill::Decode)
    }

    /// Advance like `render` but write silence without decoding. Used to step
    /// over a run that failed to decode; channel history is left as it was.
    pub fn render_silence(&mut self, out: &mut [i16], sample_count: usize) -> Result<Rendered, EngineError> {
        self.fill(out, sample_count, Fill::Silence)
    }

    fn fill(&mut self, out: &mut [i16], sample_count: usize, mode: Fill) -> Result<Rendered, EngineError> {
        if sample_count == 0 {
            return Ok(Rendered::default());
        }
        let channels = self.descriptor.channels;
        let needed = sample_count.saturating_mul(channels);
        if out.len() < needed {
            return Err(RangeError::BufferTooSmall { needed, available: out.len() }.into());
        }

        let mut looped = false;
        if let Some(target) = self.looper.take_jump() {
            if let Err(cause) = self.reposition(target) {
                self.looper.rearm();
                return Err(RenderFailure {
                    position: self.cursor.position,
                    samples_written: 0,
                    run_samples: 0,
                    cause,
                }
                .into());
            }
            looped = true;
            debug!("Loop transition {} back to sample {}", self.looper.transitions(), target);
        }

        let position = self.cursor.position;
        let num_samples = self.descriptor.num_samples;
        if position >= num_samples {
            return Err(RangeError::EndOfStream { position, num_samples }.into());
        }

        let limit = self.looper.render_limit(position, num_samples);
        let count = (limit - position).min(sample_count as u64) as usize;
        let target = &mut out[..count * channels];

        let result = match mode {
            Fill::Decode => self.decode_into(target, count),
            Fill::Silence => {
                target.fill(0);
                self.cursor.position += count as u64;
                self.cursor.just_reprimed = false;
                Ok(())
            }
        };
        if let Err(failure) = result {
            return Err(RenderFailure {
                position: self.cursor.position,
                samples_written: failure.written,
                run_samples: failure.run_samples,
                cause: failure.cause,
            }
            .into());
        }

        self.looper.after_render(self.cursor.position);
        Ok(Rendered {
            samples: count,
            end_of_stream: self.cursor.position >= num_samples && !self.looper.pending_jump(),
            looped,
        })
    }

    /// Position the cursor so the next render yields what continuous playback
    /// from the start would have produced at `sample`
    pub fn seek(&mut self, sample: u64) -> Result<(), EngineError> {
        let num_samples = self.descriptor.num_samples;
        if sample > num_samples {
            return Err(RangeError::SeekBeyondEnd { position: sample, num_samples }.into());
        }

        self.looper.cancel_jump();
        if sample == num_samples {
            self.cursor.position = sample;
            self.cursor.just_reprimed = true;
        } else if let Err(cause) = self.reposition(sample) {
            return Err(RenderFailure {
                position: self.cursor.position,
                samples_written: 0,
                run_samples: 0,
                cause,
            }
            .into());
        }
        self.looper.after_render(sample);

        debug!("Seeked to sample {}", sample);
        Ok(())
    }

    pub fn close(self) {
        debug!(
            "Closed {} stream at sample {} after {} loop transitions",
            self.descriptor.format_name,
            self.cursor.position,
            self.looper.transitions()
        );
    }

    pub fn info(&self) -> StreamInfo {
        self.descriptor.info()
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn channels(&self) -> usize {
        self.descriptor.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.descriptor.sample_rate
    }

    pub fn num_samples(&self) -> u64 {
        self.descriptor.num_samples
    }

    pub fn position(&self) -> u64 {
        self.cursor.position
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn just_reprimed(&self) -> bool {
        self.cursor.just_reprimed
    }

    pub fn loop_transitions(&self) -> u32 {
        self.looper.transitions()
    }

    pub fn loop_state(&self) -> LoopState {
        self.looper.state(self.cursor.position, self.descriptor.num_samples)
    }

    pub fn is_looping(&self) -> bool {
        self.looper.looping()
    }

    /// Decode `count` samples at the cursor into `out`, committing state per run
    fn decode_into(&mut self, out: &mut [i16], count: usize) -> Result<(), SpanFailure> {
        let channels = self.descriptor.channels;
        let frame_samples = match &self.pipeline {
            Pipeline::Frames(engine) => Some(engine.geometry().samples_per_frame),
            Pipeline::External(_) => None,
        };
        let mut done = 0;
        // after a failed multi-frame run, go frame by frame to find the bad one
        let mut narrow = false;

        while done < count {
            self.looper.capture(self.cursor.position, &self.states);

            let position = self.cursor.position;
            let mut max = count - done;
            if let Some(point) = self.looper.capture_point() {
                if position < point {
                    max = max.min((point - position) as usize);
                }
            }
            let frame_left = frame_samples.map(|spf| (spf - position % spf) as usize);
            if let (true, Some(left)) = (narrow, frame_left) {
                max = max.min(left);
            }

            match self.decode_step(&mut out[done * channels..], max) {
                Ok(step) => done += step,
                Err((run_samples, cause)) => {
                    if !narrow && frame_left.is_some_and(|left| run_samples > left) {
                        narrow = true;
                        continue;
                    }
                    return Err(SpanFailure { written: done, run_samples, cause });
                }
            }
        }

        self.looper.capture(self.cursor.position, &self.states);
        Ok(())
    }

    fn decode_step(&mut self, out: &mut [i16], max: usize) -> Result<usize, (usize, DecodeError)> {
        match &mut self.pipeline {
            Pipeline::Frames(engine) => {
                let plan = engine.locate(self.cursor.position, max).map_err(|e| {
                    (
                        max,
                        DecodeError::CorruptFrame { offset: self.descriptor.base_offset, reason: e.to_string() },
                    )
                })?;
                let channels = self.descriptor.channels;

                // all reads first so a short source leaves state untouched
                let mut buffers = Vec::with_capacity(channels);
                for read in &plan.channels {
                    let bytes = self
                        .source
                        .read(read.offset, read.length)
                        .map_err(|e| (plan.samples, DecodeError::Read(e)))?;
                    buffers.push(bytes);
                }

                let mut next = self.states.clone();
                for (c, (read, bytes)) in plan.channels.iter().zip(&buffers).enumerate() {
                    coding::decode_frames(
                        &self.descriptor.coding,
                        engine.geometry(),
                        &mut next[c],
                        bytes,
                        read.offset,
                        read.frame_stride,
                        plan.skip,
                        plan.samples,
                        &mut out[c..],
                        channels,
                    )
                    .map_err(|e| (plan.samples, e))?;
                }

                trace!(
                    "Decoded {} samples at {} (block {:?})",
                    plan.samples,
                    plan.position,
                    plan.block
                );
                self.states = next;
                self.cursor.position += plan.samples as u64;
                self.cursor.block = plan.block;
                self.cursor.boundary_bytes = plan.boundary_bytes;
                self.cursor.just_reprimed = false;
                Ok(plan.samples)
            }
            Pipeline::External(external) => {
                let channels = self.descriptor.channels;
                if external.decoded.is_none() {
                    let payload = self
                        .source
                        .read(self.descriptor.base_offset, external.data_size as usize)
                        .map_err(|e| (max, DecodeError::Read(e)))?;
                    let expected = self.descriptor.num_samples + external.skip_samples;
                    let mut samples = external
                        .decoder
                        .decode(&external.header, &payload, expected)
                        .map_err(|e| (max, e))?;

                    let skip = (external.skip_samples as usize).saturating_mul(channels).min(samples.len());
                    samples.drain(..skip);
                    samples.truncate(self.descriptor.num_samples as usize * channels);
                    debug!(
                        "{} decoded {} samples up front",
                        external.decoder.name(),
                        samples.len() / channels
                    );
                    external.decoded = Some(samples);
                }

                let decoded = external.decoded.as_deref().unwrap_or_default();
                let position = self.cursor.position as usize;
                let available = (decoded.len() / channels).saturating_sub(position);
                if available == 0 {
                    return Err((
                        max,
                        DecodeError::ExternalRejected(format!("decoder output ends at sample {}", position)),
                    ));
                }

                let count = max.min(available);
                out[..count * channels]
                    .copy_from_slice(&decoded[position * channels..(position + count) * channels]);
                self.cursor.position += count as u64;
                self.cursor.just_reprimed = false;
                Ok(count)
            }
        }
    }

    /// Move the cursor to `target` with state valid for continuing from there.
    /// On failure cursor and state are left as they were.
    fn reposition(&mut self, target: u64) -> Result<(), DecodeError> {
        let saved_cursor = self.cursor;
        let saved_states = self.states.clone();

        let result = self.reprime(target);
        match result {
            Ok(()) => {
                self.cursor.just_reprimed = true;
                Ok(())
            }
            Err(cause) => {
                self.cursor = saved_cursor;
                self.states = saved_states;
                Err(cause)
            }
        }
    }

    fn reprime(&mut self, target: u64) -> Result<(), DecodeError> {
        let engine = match &self.pipeline {
            Pipeline::External(_) => {
                self.cursor.position = target;
                return Ok(());
            }
            Pipeline::Frames(engine) => engine,
        };

        if let Some(states) = self.looper.resume_state(target, &self.states) {
            trace!("Resuming at sample {} from loop start state", target);
            self.states = states;
            self.cursor.position = target;
            self.cursor.block = None;
            return Ok(());
        }

        match self.descriptor.coding.reset_point() {
            ResetPoint::AnySample => {
                self.cursor.position = target;
                self.cursor.block = None;
                Ok(())
            }
            ResetPoint::FrameStart => {
                let plan = engine.locate(target, 1).map_err(|e| DecodeError::CorruptFrame {
                    offset: self.descriptor.base_offset,
                    reason: e.to_string(),
                })?;
                self.cursor.position = plan.frame_start();
                self.prime_to(target)
            }
            ResetPoint::StreamStart => {
                self.states = self.initial_states.clone();
                self.cursor.position = 0;
                self.prime_to(target)
            }
        }
    }

    /// Decode silently from the cursor up to `target`
    fn prime_to(&mut self, target: u64) -> Result<(), DecodeError> {
        let channels = self.descriptor.channels;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(PRIME_CHUNK * channels, 0);

        let mut result = Ok(());
        while self.cursor.position < target {
            let count = ((target - self.cursor.position) as usize).min(PRIME_CHUNK);
            if let Err(failure) = self.decode_into(&mut scratch[..count * channels], count) {
                result = Err(failure.cause);
                break;
            }
        }

        self.scratch = scratch;
        result
    }
}

fn clamp_length(descriptor: &mut StreamDescriptor, length: u64) {
    descriptor.num_samples = length;
    if let Some(region) = descriptor.loop_region {
        if region.start >= length {
            warn!("Loop start {} lies past the clamped length; disabling loop", region.start);
            descriptor.clear_loop();
        } else if region.end > length {
            descriptor.set_loop(region.start, length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{ExternalCodec, SymphoniaDecoder};
    use crate::layout::LayoutKind;
    use crate::models::ChannelHistory;
    use crate::source::{Endian, MemorySource};

    const COEFS: [i16; 16] = [
        0, 0, 2048, 0, 0, 2048, 1024, 1024, 3000, -1000, 3584, -1536, 2048, -1024, 1800, -900,
    ];

    /// Stereo DSP with an 8-byte interleave and deterministic frame contents
    fn dsp_fixture(frames: usize) -> (MemorySource, StreamDescriptor) {
        let channels = 2;
        let mut data = Vec::with_capacity(frames * 8 * channels);
        let mut seed: u32 = 0x1234_5678;
        for f in 0..frames {
            for c in 0..channels {
                data.push((((f + c) % 8) << 4 | (f * 3 + c) % 11) as u8);
                for _ in 0..7 {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    data.push((seed >> 16) as u8);
                }
            }
        }

        let mut descriptor = StreamDescriptor::new(
            "test",
            channels,
            32000,
            CodingKind::NgcDsp,
            LayoutKind::Interleave { block_size: 8, last_block_size: None },
        );
        descriptor.set_num_samples((frames * 14) as u64);
        descriptor.set_coefs(0, COEFS).set_coefs(1, COEFS);
        (MemorySource::new("fixture.dsp", data), descriptor)
    }

    fn render_all(stream: &mut Stream, total: usize, chunk: usize) -> Vec<i16> {
        let channels = stream.channels();
        let mut output = Vec::new();
        let mut buffer = vec![0i16; chunk * channels];
        while output.len() < total * channels {
            let want = chunk.min(total - output.len() / channels);
            let rendered = stream.render(&mut buffer, want).unwrap();
            output.extend_from_slice(&buffer[..rendered.samples * channels]);
        }
        output
    }

    #[test]
    fn test_chunk_size_does_not_change_output() {
        let (source, descriptor) = dsp_fixture(40);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let reference = render_all(&mut stream, 560, 560);

        for chunk in [1, 7, 13, 14, 100] {
            let (source, descriptor) = dsp_fixture(40);
            let mut stream = Stream::open(descriptor, &source).unwrap();
            assert_eq!(render_all(&mut stream, 560, chunk), reference, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_seek_matches_continuous_render() {
        let (source, descriptor) = dsp_fixture(40);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let reference = render_all(&mut stream, 560, 560);

        for target in [0usize, 1, 13, 14, 15, 300, 559] {
            let (source, descriptor) = dsp_fixture(40);
            let mut stream = Stream::open(descriptor, &source).unwrap();
            stream.seek(target as u64).unwrap();
            assert!(stream.just_reprimed());

            let rest = render_all(&mut stream, 560 - target, 50);
            assert_eq!(rest, reference[target * 2..], "seek to {}", target);
            assert!(!stream.just_reprimed());
        }
    }

    #[test]
    fn test_loop_jump_matches_fresh_seek() {
        for capture in [true, false] {
            let (source, mut descriptor) = dsp_fixture(40);
            descriptor.set_loop(100, 400);
            let options = StreamOptions { capture_loop_snapshot: capture, ..Default::default() };
            let mut stream = Stream::open_with(descriptor, &source, options).unwrap();

            let first_pass = render_all(&mut stream, 400, 64);
            assert_eq!(first_pass.len(), 800);
            assert_eq!(stream.loop_transitions(), 0);
            let after_jump = render_all(&mut stream, 50, 50);
            assert_eq!(stream.loop_transitions(), 1);

            let (source, descriptor) = dsp_fixture(40);
            let mut fresh = Stream::open(descriptor, &source).unwrap();
            fresh.seek(100).unwrap();
            assert_eq!(after_jump, render_all(&mut fresh, 50, 50), "capture {}", capture);
            assert_eq!(after_jump, first_pass[200..300]);
        }
    }

    #[test]
    fn test_render_stops_at_loop_end_and_jumps_once() {
        let (source, mut descriptor) = dsp_fixture(40);
        descriptor.set_loop(14, 140);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 2 * 200];

        let rendered = stream.render(&mut buffer, 200).unwrap();
        assert_eq!(rendered.samples, 140);
        assert!(!rendered.end_of_stream);
        assert_eq!(stream.loop_state(), LoopState::InLoop);
        assert_eq!(stream.loop_transitions(), 0);

        let rendered = stream.render(&mut buffer, 1).unwrap();
        assert_eq!(rendered.samples, 1);
        assert!(rendered.looped);
        assert_eq!(stream.loop_transitions(), 1);
        assert_eq!(stream.position(), 15);
    }

    #[test]
    fn test_loop_limit_then_outro() {
        let (source, mut descriptor) = dsp_fixture(20);
        descriptor.set_loop(28, 140);
        let options = StreamOptions { loop_limit: Some(2), ..Default::default() };
        let mut stream = Stream::open_with(descriptor, &source, options).unwrap();

        let mut total = 0;
        let mut buffer = vec![0i16; 2 * 64];
        loop {
            match stream.render(&mut buffer, 64) {
                Ok(rendered) => {
                    total += rendered.samples;
                    if rendered.end_of_stream {
                        break;
                    }
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(stream.loop_transitions(), 2);
        assert_eq!(stream.loop_state(), LoopState::AfterLoopExhausted);
        assert_eq!(total, 140 + 112 + (280 - 28));
    }

    #[test]
    fn test_end_of_stream_is_range_error() {
        let (source, descriptor) = dsp_fixture(2);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 2 * 100];

        let rendered = stream.render(&mut buffer, 100).unwrap();
        assert_eq!(rendered.samples, 28);
        assert!(rendered.end_of_stream);

        assert!(matches!(
            stream.render(&mut buffer, 1),
            Err(EngineError::Range(RangeError::EndOfStream { position: 28, .. }))
        ));
    }

    #[test]
    fn test_zero_count_and_small_buffer() {
        let (source, descriptor) = dsp_fixture(2);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 3];

        assert_eq!(stream.render(&mut buffer, 0).unwrap(), Rendered::default());
        assert_eq!(stream.position(), 0);
        assert!(matches!(
            stream.render(&mut buffer, 2),
            Err(EngineError::Range(RangeError::BufferTooSmall { needed: 4, available: 3 }))
        ));
    }

    #[test]
    fn test_seek_beyond_end() {
        let (source, descriptor) = dsp_fixture(2);
        let mut stream = Stream::open(descriptor, &source).unwrap();

        assert!(stream.seek(28).is_ok());
        assert!(matches!(
            stream.seek(29),
            Err(EngineError::Range(RangeError::SeekBeyondEnd { position: 29, num_samples: 28 }))
        ));
    }

    #[test]
    fn test_corrupt_frame_leaves_cursor_and_state() {
        let (source, descriptor) = dsp_fixture(10);
        let mut data = source.bytes().to_vec();
        // channel 1 of frame 4
        data[4 * 16 + 8] = 0x90;
        let source = MemorySource::new("corrupt.dsp", data);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 2 * 140];

        match stream.render(&mut buffer, 140) {
            Err(EngineError::Render(failure)) => {
                assert_eq!(failure.samples_written, 56);
                assert_eq!(failure.position, 56);
                assert_eq!(failure.run_samples, 14);
                assert!(matches!(failure.cause, DecodeError::CorruptFrame { .. }));
            }
            other => panic!("Expected RenderFailure, got {:?}", other),
        }
        assert_eq!(stream.position(), 56);

        // same run fails again until it is stepped over
        assert!(stream.render(&mut buffer, 14).is_err());
        let skipped = stream.render_silence(&mut buffer, 14).unwrap();
        assert_eq!(skipped.samples, 14);
        assert!(buffer[..28].iter().all(|&s| s == 0));
        assert_eq!(stream.render(&mut buffer, 14).unwrap().samples, 14);
    }

    #[test]
    fn test_truncated_payload_reports_short_read() {
        let (source, descriptor) = dsp_fixture(10);
        let data = source.bytes()[..5 * 16].to_vec();
        let source = MemorySource::new("short.dsp", data);
        let mut stream = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 2 * 140];

        match stream.render(&mut buffer, 140) {
            Err(EngineError::Render(failure)) => {
                assert!(matches!(failure.cause, DecodeError::Read(_)));
                assert_eq!(failure.position, 70);
                assert_eq!(failure.samples_written, 70);
            }
            other => panic!("Expected RenderFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_stored_loop_history_used_for_jump() {
        let (source, descriptor) = dsp_fixture(40);
        let mut probe = Stream::open(descriptor, &source).unwrap();
        let mut buffer = vec![0i16; 2 * 100];
        probe.render(&mut buffer, 100).unwrap();
        let history: Vec<ChannelHistory> = probe.states.iter().map(ChannelState::history).collect();

        let (source, mut descriptor) = dsp_fixture(40);
        descriptor.set_loop(100, 200).set_loop_snapshot(history);
        let options = StreamOptions { capture_loop_snapshot: false, ..Default::default() };
        let mut stream = Stream::open_with(descriptor, &source, options).unwrap();
        let first = render_all(&mut stream, 200, 200);
        let looped = render_all(&mut stream, 100, 100);

        assert_eq!(looped, first[200..400]);
    }

    #[test]
    fn test_ignore_loop_plays_through() {
        let (source, mut descriptor) = dsp_fixture(10);
        descriptor.set_loop(14, 70);
        let options = StreamOptions { ignore_loop: true, ..Default::default() };
        let mut stream = Stream::open_with(descriptor, &source, options).unwrap();
        let mut buffer = vec![0i16; 2 * 200];

        let rendered = stream.render(&mut buffer, 200).unwrap();
        assert_eq!(rendered.samples, 140);
        assert!(rendered.end_of_stream);
        assert!(stream.info().loop_region.is_some());
    }

    #[test]
    fn test_external_pipeline_with_skip_and_loop() {
        let frames: Vec<i16> = (0..200).map(|i| (i * 50 - 5000) as i16).collect();
        let payload: Vec<u8> = frames.iter().flat_map(|s| s.to_le_bytes()).collect();
        let source = MemorySource::new("ext.bin", payload.clone());

        let codec = ExternalCodec {
            name: "PCM16 via transform".to_string(),
            format_tag: 0x0001,
            block_align: 2,
            bits_per_sample: 16,
            avg_bytes_per_sec: 16000,
            extra: Vec::new(),
            skip_samples: 10,
        };
        let mut descriptor = StreamDescriptor::new("test", 1, 8000, CodingKind::External(codec), LayoutKind::Flat);
        descriptor
            .set_num_samples(190)
            .set_data_size(payload.len() as u64)
            .set_loop(20, 100)
            .set_transform(Box::new(SymphoniaDecoder::new()));

        let mut stream = Stream::open(descriptor, &source).unwrap();
        let first = render_all(&mut stream, 100, 30);
        assert_eq!(first, frames[10..110]);

        let looped = render_all(&mut stream, 5, 5);
        assert_eq!(looped, frames[30..35]);
        assert_eq!(stream.loop_transitions(), 1);
    }

    #[test]
    fn test_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Stream<'static>>();
    }

    #[test]
    fn test_block_clamp_shrinks_length() {
        use crate::layout::{BlockSizing, BlockedLayout};

        let source = MemorySource::new("a.bin", vec![0u8; 0x50]);
        let mut descriptor = StreamDescriptor::new(
            "test",
            1,
            32000,
            CodingKind::Pcm16 { endian: Endian::Big },
            LayoutKind::Blocked(BlockedLayout {
                header_size: 0x10,
                block_count: 2,
                sizing: BlockSizing::Fixed(0x28),
                sub_block: None,
            }),
        );
        descriptor.set_num_samples(1000).set_loop(10, 900);

        let stream = Stream::open(descriptor, &source).unwrap();
        // two blocks of 0x18 payload bytes
        assert_eq!(stream.num_samples(), 24);
        assert_eq!(stream.info().loop_region.map(|r| r.end), Some(24));
    }
}
