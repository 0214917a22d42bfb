pub mod chunks;
pub mod cli;
pub mod coding;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod layout;
pub mod logging;
pub mod models;
pub mod parsers;
pub mod source;
pub mod stream;


pub use error::*;
pub use models::*;
pub use parsers::{FormatParser, ParserRegistry};
pub use source::{ByteSource, FileSource, MemorySource, MemoryVolume};
pub use stream::{Rendered, Stream, StreamOptions};
