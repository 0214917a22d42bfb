//! Container parsers. Each one recognises a family of files and turns its
//! header into a [`StreamDescriptor`]; the registry tries them in order.

pub mod gsp_gsb;
pub mod wwise;

use crate::coding::{CodingKind, SymphoniaDecoder, TransformDecoder};
use crate::error::ParseError;
use crate::models::StreamDescriptor;
use crate::source::{check_extensions, ByteSource};

pub use gsp_gsb::GspGsbParser;
pub use wwise::WwiseParser;

pub trait FormatParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extensions the data file may carry, without dots
    fn extensions(&self) -> &'static [&'static str];

    /// `ParseError::NotThisFormat` when the file is not ours, so the next parser runs
    fn parse(&self, source: &dyn ByteSource) -> Result<StreamDescriptor, ParseError>;
}

/// Set a header loop, pulling an end past the stream length back onto it
pub(crate) fn apply_loop(descriptor: &mut StreamDescriptor, start: u64, end: u64) {
    let clamped = end.min(descriptor.num_samples);
    if clamped != end {
        log::warn!("Loop end {} beyond {} samples, clamping", end, descriptor.num_samples);
    }
    if start < clamped {
        descriptor.set_loop(start, clamped);
    } else {
        log::warn!("Dropping empty loop {}..{}", start, clamped);
    }
}

type TransformFactory = Box<dyn Fn() -> Box<dyn TransformDecoder> + Send + Sync>;

/// Ordered parser list plus the decoder factory for external codings
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FormatParser>>,
    transform_factory: TransformFactory,
}

impl ParserRegistry {
    /// Empty registry using symphonia for external codings
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            transform_factory: Box::new(|| Box::new(SymphoniaDecoder::new())),
        }
    }

    pub fn register(&mut self, parser: Box<dyn FormatParser>) -> &mut Self {
        log::debug!("Registered parser '{}'", parser.name());
        self.parsers.push(parser);
        self
    }

    pub fn with_transform_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TransformDecoder> + Send + Sync + 'static,
    {
        self.transform_factory = Box::new(factory);
        self
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Run every parser whose extensions match, in registration order
    pub fn parse(&self, source: &dyn ByteSource) -> Result<StreamDescriptor, ParseError> {
        let mut last_error = None;

        for parser in &self.parsers {
            let extensions = parser.extensions().join(",");
            if !check_extensions(source.name(), &extensions) {
                continue;
            }

            match parser.parse(source) {
                Ok(mut descriptor) => {
                    if matches!(descriptor.coding, CodingKind::External(_)) && descriptor.transform.is_none() {
                        descriptor.set_transform((self.transform_factory)());
                    }
                    descriptor.validate()?;
                    log::info!(
                        "{} parsed {}: {} ch, {} Hz, {} samples",
                        parser.name(),
                        source.name(),
                        descriptor.channels,
                        descriptor.sample_rate,
                        descriptor.num_samples
                    );
                    return Ok(descriptor);
                }
                Err(ParseError::NotThisFormat) => {
                    log::trace!("{} does not recognise {}", parser.name(), source.name());
                }
                Err(e) => {
                    log::debug!("{} rejected {}: {}", parser.name(), source.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ParseError::NoParserMatched {
            name: source.name().to_string(),
        }))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(WwiseParser)).register(Box::new(GspGsbParser));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::ExternalCodec;
    use crate::error::DecodeError;
    use crate::layout::LayoutKind;
    use crate::source::MemorySource;

    struct Fixed(Result<(), &'static str>);

    impl FormatParser for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["bin"]
        }

        fn parse(&self, _source: &dyn ByteSource) -> Result<StreamDescriptor, ParseError> {
            match self.0 {
                Ok(()) => {
                    let mut descriptor = StreamDescriptor::new(
                        "Fixed",
                        1,
                        8000,
                        CodingKind::External(ExternalCodec {
                            name: "test".to_string(),
                            format_tag: 1,
                            block_align: 2,
                            bits_per_sample: 16,
                            avg_bytes_per_sec: 16000,
                            extra: Vec::new(),
                            skip_samples: 0,
                        }),
                        LayoutKind::Flat,
                    );
                    descriptor.set_num_samples(4);
                    Ok(descriptor)
                }
                Err("not mine") => Err(ParseError::NotThisFormat),
                Err(codec) => Err(ParseError::Unsupported { format: "Fixed".to_string(), codec: codec.to_string() }),
            }
        }
    }

    struct Silent;

    impl TransformDecoder for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn decode(&mut self, _header: &[u8], _payload: &[u8], expected: u64) -> Result<Vec<i16>, DecodeError> {
            Ok(vec![0; expected as usize])
        }
    }

    #[test]
    fn test_extension_filter_and_no_match() {
        let registry = ParserRegistry::default();
        let source = MemorySource::new("song.mp3", vec![0u8; 64]);
        assert!(matches!(registry.parse(&source), Err(ParseError::NoParserMatched { .. })));
    }

    #[test]
    fn test_not_this_format_moves_on() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(Fixed(Err("not mine")))).register(Box::new(Fixed(Ok(()))));
        let source = MemorySource::new("a.bin", vec![0u8; 8]);
        assert!(registry.parse(&source).is_ok());
    }

    #[test]
    fn test_real_error_is_reported() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(Fixed(Err("XMA2")))).register(Box::new(Fixed(Err("not mine"))));
        let source = MemorySource::new("a.bin", vec![0u8; 8]);
        assert!(matches!(registry.parse(&source), Err(ParseError::Unsupported { .. })));
    }

    #[test]
    fn test_external_coding_gets_decoder() {
        let mut registry = ParserRegistry::new().with_transform_factory(|| Box::new(Silent));
        registry.register(Box::new(Fixed(Ok(()))));
        let descriptor = registry.parse(&MemorySource::new("a.bin", vec![0u8; 8])).unwrap();
        assert_eq!(descriptor.transform.as_ref().map(|t| t.name()), Some("silent"));
    }

    #[test]
    fn test_default_order() {
        assert_eq!(ParserRegistry::default().parser_names(), vec!["Wwise RIFF", "GSP+GSB"]);
    }
}
