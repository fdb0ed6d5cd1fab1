//! Writing side: object serialization and incremental updates.
//!
//! Nothing here rewrites existing bytes. Every change is a new revision
//! appended after the original `%%EOF`.

pub mod incremental;
pub mod object_serializer;
pub mod pending;

pub use incremental::{IncrementalUpdate, RenderedUpdate};
pub use object_serializer::ObjectSerializer;
pub use pending::PendingFile;
