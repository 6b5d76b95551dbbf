//! S3-compatible object storage client.
//!
//! User-recorded clips are uploaded by the browser straight to the bucket
//! through presigned write URLs; the analysis pipeline reads them back with
//! a metadata probe followed by a byte download.

pub mod client;
pub mod error;

pub use client::{ObjectMetadata, StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
