use std::fmt;
use std::time::Duration;

use crate::coding::{CodingKind, TransformDecoder};
use crate::error::StructuralError;
use crate::layout::LayoutKind;

/// Sample-domain loop bounds: `start` inclusive, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    pub start: u64,
    pub end: u64,
}

impl LoopRegion {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Predictor history for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHistory {
    pub hist1: i32,
    pub hist2: i32,
    pub step_index: i32,
}

/// Static per-channel data loaded once from the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSetup {
    pub coefs: Option<[i16; 16]>,
    pub history: ChannelHistory,
}

/// Canonical, format-agnostic stream description produced by a parser
pub struct StreamDescriptor {
    pub format_name: String,
    pub channels: usize,
    pub sample_rate: u32,
    pub num_samples: u64,
    pub loop_region: Option<LoopRegion>,
    pub coding: CodingKind,
    pub layout: LayoutKind,
    pub base_offset: u64,
    /// Payload size when the container declares it
    pub data_size: Option<u64>,
    pub channel_setup: Vec<ChannelSetup>,
    /// History at loop start as stored by the container
    pub loop_snapshot: Option<Vec<ChannelHistory>>,
    pub transform: Option<Box<dyn TransformDecoder>>,
}

impl fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("format_name", &self.format_name)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("num_samples", &self.num_samples)
            .field("loop_region", &self.loop_region)
            .field("coding", &self.coding)
            .field("layout", &self.layout)
            .field("base_offset", &self.base_offset)
            .field("data_size", &self.data_size)
            .field("transform", &self.transform.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

impl StreamDescriptor {
    pub fn new(
        format_name: impl Into<String>,
        channels: usize,
        sample_rate: u32,
        coding: CodingKind,
        layout: LayoutKind,
    ) -> Self {
        Self {
            format_name: format_name.into(),
            channels,
            sample_rate,
            num_samples: 0,
            loop_region: None,
            coding,
            layout,
            base_offset: 0,
            data_size: None,
            channel_setup: Vec::new(),
            loop_snapshot: None,
            transform: None,
        }
    }

    pub fn set_num_samples(&mut self, num_samples: u64) -> &mut Self {
        self.num_samples = num_samples;
        self
    }

    pub fn set_loop(&mut self, start: u64, end: u64) -> &mut Self {
        self.loop_region = Some(LoopRegion::new(start, end));
        self
    }

    pub fn clear_loop(&mut self) -> &mut Self {
        self.loop_region = None;
        self
    }

    pub fn set_base_offset(&mut self, offset: u64) -> &mut Self {
        self.base_offset = offset;
        self
    }

    pub fn set_data_size(&mut self, size: u64) -> &mut Self {
        self.data_size = Some(size);
        self
    }

    fn setup_mut(&mut self, channel: usize) -> &mut ChannelSetup {
        if self.channel_setup.len() < self.channels {
            self.channel_setup.resize(self.channels, ChannelSetup::default());
        }
        &mut self.channel_setup[channel]
    }

    pub fn set_coefs(&mut self, channel: usize, coefs: [i16; 16]) -> &mut Self {
        self.setup_mut(channel).coefs = Some(coefs);
        self
    }

    pub fn set_history(&mut self, channel: usize, hist1: i32, hist2: i32) -> &mut Self {
        let setup = self.setup_mut(channel);
        setup.history.hist1 = hist1;
        setup.history.hist2 = hist2;
        self
    }

    pub fn set_loop_snapshot(&mut self, snapshot: Vec<ChannelHistory>) -> &mut Self {
        self.loop_snapshot = Some(snapshot);
        self
    }

    pub fn set_transform(&mut self, decoder: Box<dyn TransformDecoder>) -> &mut Self {
        self.transform = Some(decoder);
        self
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_region.is_some()
    }

    /// Check the invariants every downstream stage relies on
    pub fn validate(&self) -> Result<(), StructuralError> {
        let invalid = |msg: String| Err(StructuralError::InvalidDescriptor(msg));

        if self.channels == 0 {
            return invalid("channel count must be positive".to_string());
        }
        if self.sample_rate == 0 {
            return invalid("sample rate must be positive".to_string());
        }
        if let Some(region) = self.loop_region {
            if region.start >= region.end {
                return invalid(format!(
                    "loop start {} must be before loop end {}",
                    region.start, region.end
                ));
            }
            if region.end > self.num_samples {
                return invalid(format!(
                    "loop end {} beyond stream length {}",
                    region.end, self.num_samples
                ));
            }
        }
        if !self.channel_setup.is_empty() && self.channel_setup.len() != self.channels {
            return Err(StructuralError::StateSizeMismatch {
                expected: self.channels,
                found: self.channel_setup.len(),
            });
        }
        if let Some(snapshot) = &self.loop_snapshot {
            if snapshot.len() != self.channels {
                return Err(StructuralError::StateSizeMismatch {
                    expected: self.channels,
                    found: snapshot.len(),
                });
            }
        }

        match &self.coding {
            CodingKind::NgcDsp => {
                let with_coefs = self.channel_setup.iter().filter(|s| s.coefs.is_some()).count();
                if with_coefs != self.channels {
                    return Err(StructuralError::StateSizeMismatch {
                        expected: self.channels,
                        found: with_coefs,
                    });
                }
            }
            CodingKind::External(_) => {
                if self.transform.is_none() {
                    return invalid("external coding needs a transform decoder".to_string());
                }
                if !matches!(self.layout, LayoutKind::Flat) {
                    return Err(StructuralError::UnknownLayout(format!(
                        "{} with external coding",
                        self.layout.name()
                    )));
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            format_name: self.format_name.clone(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            num_samples: self.num_samples,
            loop_region: self.loop_region,
            coding: self.coding.name().to_string(),
            layout: self.layout.name().to_string(),
        }
    }
}

/// Human-facing stream summary
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub format_name: String,
    pub channels: usize,
    pub sample_rate: u32,
    pub num_samples: u64,
    pub loop_region: Option<LoopRegion>,
    pub coding: String,
    pub layout: String,
}

impl StreamInfo {
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.num_samples, self.sample_rate)
    }

    /// Get a human-readable stream description
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} - {} / {} - {} Hz - {} channel{} - {} samples ({:.2}s)",
            self.format_name,
            self.coding,
            self.layout,
            self.sample_rate,
            self.channels,
            if self.channels == 1 { "" } else { "s" },
            self.num_samples,
            self.duration().as_secs_f64(),
        );
        if let Some(region) = self.loop_region {
            text.push_str(&format!(" - loop {}..{}", region.start, region.end));
        }
        text
    }
}

pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Endian;

    fn pcm_descriptor() -> StreamDescriptor {
        let mut descriptor = StreamDescriptor::new(
            "test",
            2,
            44100,
            CodingKind::Pcm16 { endian: Endian::Little },
            LayoutKind::Interleave { block_size: 2, last_block_size: None },
        );
        descriptor.set_num_samples(1000);
        descriptor
    }

    #[test]
    fn test_valid_descriptor() {
        let mut descriptor = pcm_descriptor();
        descriptor.set_loop(100, 1000);
        assert!(descriptor.validate().is_ok());
        assert!(descriptor.loop_enabled());
    }

    #[test]
    fn test_loop_bounds_rejected() {
        let mut descriptor = pcm_descriptor();
        descriptor.set_loop(500, 500);
        assert!(matches!(descriptor.validate(), Err(StructuralError::InvalidDescriptor(_))));

        descriptor.set_loop(600, 400);
        assert!(descriptor.validate().is_err());

        descriptor.set_loop(0, 1001);
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_zero_channels_or_rate_rejected() {
        let mut descriptor = pcm_descriptor();
        descriptor.channels = 0;
        assert!(descriptor.validate().is_err());

        let mut descriptor = pcm_descriptor();
        descriptor.sample_rate = 0;
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_dsp_requires_coefficients() {
        let mut descriptor = StreamDescriptor::new(
            "test",
            2,
            32000,
            CodingKind::NgcDsp,
            LayoutKind::Interleave { block_size: 8, last_block_size: None },
        );
        descriptor.set_num_samples(14);
        descriptor.set_coefs(0, [0; 16]);

        match descriptor.validate() {
            Err(StructuralError::StateSizeMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("Expected StateSizeMismatch, got {:?}", other),
        }

        descriptor.set_coefs(1, [0; 16]);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_snapshot_size_checked() {
        let mut descriptor = pcm_descriptor();
        descriptor.set_loop_snapshot(vec![ChannelHistory::default()]);
        assert!(matches!(
            descriptor.validate(),
            Err(StructuralError::StateSizeMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_info_description() {
        let mut descriptor = pcm_descriptor();
        descriptor.set_num_samples(44100).set_loop(0, 44100);
        let info = descriptor.info();

        assert_eq!(info.duration().as_secs(), 1);
        let text = info.describe();
        assert!(text.contains("44100 Hz"));
        assert!(text.contains("2 channels"));
        assert!(text.contains("loop 0..44100"));
    }
}
