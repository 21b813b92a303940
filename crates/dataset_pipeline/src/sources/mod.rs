//! Concrete [`RowSource`](crate::source::RowSource) implementations.

pub mod delimited;
pub mod directory;
pub mod values;

pub use delimited::DelimitedFileSource;
pub use directory::{DirectoryEntry, DirectorySource};
pub use values::ValuesSource;
