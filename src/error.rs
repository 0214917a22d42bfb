use thiserror::Error;

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderFailure),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] hound::Error),
}

impl EngineError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Structural(err) => err.user_message(),
            EngineError::Render(err) => err.cause.user_message(),
            EngineError::Range(err) => err.user_message(),
            EngineError::Source(err) => err.user_message(),
            EngineError::Parse(err) => err.user_message(),
            EngineError::Config(err) => err.user_message(),
            EngineError::File(err) => Self::format_file_error(err),
            EngineError::Output(err) => format!("Cannot write output file: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            EngineError::Structural(err) => err.recovery_suggestions(),
            EngineError::Render(err) => err.cause.recovery_suggestions(),
            EngineError::Range(_) => vec!["Seek to a position inside the stream".to_string()],
            EngineError::Source(err) => err.recovery_suggestions(),
            EngineError::Parse(err) => err.recovery_suggestions(),
            EngineError::Config(err) => err.recovery_suggestions(),
            EngineError::File(_) => vec!["Check that the file path is correct".to_string()],
            EngineError::Output(_) => vec![
                "Check that the output directory exists and is writable".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
        }
    }

    /// Check if decoding can continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Structural(_) => false, // Fatal to stream open
            EngineError::Render(err) => err.cause.is_recoverable(),
            EngineError::Range(_) => true,
            EngineError::Source(err) => err.is_recoverable(),
            EngineError::Parse(_) => false,
            EngineError::Config(err) => err.is_recoverable(),
            EngineError::File(_) => false,
            EngineError::Output(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::Structural(_) => ErrorSeverity::Critical,
            EngineError::Render(_) => ErrorSeverity::Error,
            EngineError::Range(RangeError::EndOfStream { .. }) => ErrorSeverity::Info,
            EngineError::Range(_) => ErrorSeverity::Warning,
            EngineError::Source(_) => ErrorSeverity::Error,
            EngineError::Parse(ParseError::Unsupported { .. }) => ErrorSeverity::Warning,
            EngineError::Parse(_) => ErrorSeverity::Error,
            EngineError::Config(_) => ErrorSeverity::Warning,
            EngineError::File(_) => ErrorSeverity::Error,
            EngineError::Output(_) => ErrorSeverity::Error,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Malformed container framing or an invalid stream descriptor.
/// Always fatal to stream open.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("Truncated chunk '{tag}' at 0x{offset:x}: claims {size} bytes, {available} available")]
    TruncatedChunk {
        tag: String,
        offset: u64,
        size: u64,
        available: u64,
    },

    #[error("Malformed chunk at 0x{offset:x}: {reason}")]
    MalformedChunk { offset: u64, reason: String },

    #[error("Invalid stream descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Unknown coding kind: {0}")]
    UnknownCoding(String),

    #[error("Unknown layout kind: {0}")]
    UnknownLayout(String),

    #[error("Decode state mismatch: expected {expected} channel states, found {found}")]
    StateSizeMismatch { expected: usize, found: usize },
}

impl StructuralError {
    pub fn user_message(&self) -> String {
        match self {
            StructuralError::TruncatedChunk { tag, .. } => {
                format!("The '{}' section of this file is cut short", tag)
            }
            StructuralError::MalformedChunk { reason, .. } => {
                format!("The file structure is damaged: {}", reason)
            }
            StructuralError::InvalidDescriptor(msg) => {
                format!("The stream header describes an impossible stream: {}", msg)
            }
            StructuralError::UnknownCoding(kind) => {
                format!("Sample encoding '{}' is not supported", kind)
            }
            StructuralError::UnknownLayout(kind) => {
                format!("Data layout '{}' is not supported", kind)
            }
            StructuralError::StateSizeMismatch { expected, found } => {
                format!("Stream declares {} channels but provides decoder state for {}", expected, found)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            StructuralError::TruncatedChunk { .. } | StructuralError::MalformedChunk { .. } => vec![
                "Try re-extracting the file from the game archive".to_string(),
                "Check if the file transfer completed successfully".to_string(),
            ],
            _ => vec!["This file variant is not handled by the current parsers".to_string()],
        }
    }
}

/// Failure scoped to a single frame run
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Corrupt frame at 0x{offset:x}: {reason}")]
    CorruptFrame { offset: u64, reason: String },

    #[error("External decoder rejected data: {0}")]
    ExternalRejected(String),

    #[error("Read failed: {0}")]
    Read(#[from] SourceError),

    #[error("Decode state mismatch: expected {expected}, found {found}")]
    StateSizeMismatch { expected: usize, found: usize },

    #[error("Unknown coding kind: {0}")]
    UnknownCoding(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::CorruptFrame { offset, .. } => {
                format!("Audio data is damaged near byte 0x{:x}", offset)
            }
            DecodeError::ExternalRejected(msg) => {
                format!("The external codec could not decode this stream: {}", msg)
            }
            DecodeError::Read(err) => err.user_message(),
            DecodeError::StateSizeMismatch { .. } => "Decoder state does not match the stream".to_string(),
            DecodeError::UnknownCoding(kind) => format!("Sample encoding '{}' is not supported", kind),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::CorruptFrame { .. } | DecodeError::Read(_) => vec![
                "Use --silence-errors to replace damaged frames with silence".to_string(),
                "Seek past the damaged region".to_string(),
            ],
            DecodeError::ExternalRejected(_) => vec![
                "The codec may not be available in this build".to_string(),
            ],
            _ => vec!["Report the file so the format variant can be investigated".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::CorruptFrame { .. } => true, // Later frames are independent of the payload
            DecodeError::Read(_) => true,
            DecodeError::ExternalRejected(_) => false,
            DecodeError::StateSizeMismatch { .. } => false,
            DecodeError::UnknownCoding(_) => false,
        }
    }
}

/// A render call that stopped short because a frame run failed to decode.
/// Samples before the failing run were written and the cursor sits at `position`.
#[derive(Debug, Error)]
#[error("decode failed at sample {position} after writing {samples_written} samples: {cause}")]
pub struct RenderFailure {
    pub position: u64,
    pub samples_written: usize,
    /// Samples covered by the failing run, so callers can skip it
    pub run_samples: usize,
    #[source]
    pub cause: DecodeError,
}

/// Seek or render requests outside the stream
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("Seek to sample {position} beyond stream end {num_samples}")]
    SeekBeyondEnd { position: u64, num_samples: u64 },

    #[error("End of stream reached at sample {position} of {num_samples}")]
    EndOfStream { position: u64, num_samples: u64 },

    #[error("Sample position {position} outside stream of {num_samples} samples")]
    PositionOutOfRange { position: u64, num_samples: u64 },

    #[error("Block index {index} beyond block count {block_count}")]
    BlockOutOfRange { index: usize, block_count: usize },

    #[error("Output buffer holds {available} values, {needed} needed")]
    BufferTooSmall { needed: usize, available: usize },
}

impl RangeError {
    pub fn user_message(&self) -> String {
        match self {
            RangeError::SeekBeyondEnd { position, num_samples } => {
                format!("Cannot seek to sample {} - stream only has {} samples", position, num_samples)
            }
            RangeError::EndOfStream { .. } => "Playback reached the end of the stream".to_string(),
            RangeError::PositionOutOfRange { position, .. } => {
                format!("Sample {} is outside the stream", position)
            }
            RangeError::BlockOutOfRange { index, .. } => {
                format!("Block {} does not exist in this stream", index)
            }
            RangeError::BufferTooSmall { needed, .. } => {
                format!("Output buffer too small, {} samples needed", needed)
            }
        }
    }
}

/// Byte source access errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Short read at 0x{offset:x}: requested {requested} bytes, {available} available")]
    ShortRead {
        offset: u64,
        requested: usize,
        available: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source not found: {name}")]
    NotFound { name: String },
}

impl SourceError {
    pub fn user_message(&self) -> String {
        match self {
            SourceError::ShortRead { .. } => "File ended before the expected audio data".to_string(),
            SourceError::Io(err) => format!("Cannot read file: {}", err),
            SourceError::NotFound { name } => format!("Cannot find file: {}", name),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SourceError::ShortRead { .. } => vec![
                "Check if the file is completely extracted".to_string(),
            ],
            SourceError::Io(_) => vec!["Check file permissions".to_string()],
            SourceError::NotFound { .. } => vec![
                "Some formats need a companion header file next to the data file".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SourceError::ShortRead { .. } => true,
            SourceError::Io(_) => true,
            SourceError::NotFound { .. } => false,
        }
    }
}

/// Container parser errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Not this format")]
    NotThisFormat,

    #[error("Unsupported {format} codec: {codec}")]
    Unsupported { format: String, codec: String },

    #[error("Missing companion file: {name}")]
    MissingCompanion { name: String },

    #[error("{0}")]
    Structural(#[from] StructuralError),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("No parser recognised {name}")]
    NoParserMatched { name: String },
}

impl ParseError {
    pub fn user_message(&self) -> String {
        match self {
            ParseError::NotThisFormat => "File is not in the expected format".to_string(),
            ParseError::Unsupported { format, codec } => {
                format!("{} files using {} are not supported", format, codec)
            }
            ParseError::MissingCompanion { name } => {
                format!("Companion file '{}' was not found", name)
            }
            ParseError::Structural(err) => err.user_message(),
            ParseError::Source(err) => err.user_message(),
            ParseError::NoParserMatched { name } => {
                format!("'{}' is not a recognised game audio container", name)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ParseError::MissingCompanion { .. } => vec![
                "Place the header file next to the data file with the same base name".to_string(),
            ],
            ParseError::NoParserMatched { .. } => vec![
                "Check if the file extension matches the actual format".to_string(),
            ],
            _ => vec![],
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/gastream/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // Defaults are always usable
    }
}
