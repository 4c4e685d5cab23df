//! Canonical document model shared by every ingester and the search core.

pub mod raw;
pub mod source;
pub mod types;

pub use raw::{MaterializeError, RawDocument};
pub use source::{Source, build_source_data};
pub use types::{Media, MediaList, Metalist, Person, SourceData, Varlist};
