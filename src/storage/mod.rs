//! Blob storage across two endpoints.
//!
//! # Data Flow
//! ```text
//! POST /api/blob → writer.rs (create container, upload; primary → secondary)
//! GET /api/blob  → reader.rs (primary, then secondary on error)
//! ```
//!
//! # Design Decisions
//! - Writes trip a breaker and stay on the secondary; reads do not
//! - A missing blob on the answering endpoint is not an error

pub mod blob;
pub mod reader;
pub mod writer;

pub use blob::BlobRecord;
pub use reader::{BlobReader, ReadError};
pub use writer::{BlobWriter, UploadError};
