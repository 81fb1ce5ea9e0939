//! Positional byte access shared by the container readers.

mod source;
mod stream;

pub use source::{ByteSource, FileSource, MemorySource};
pub use stream::SourceStream;
