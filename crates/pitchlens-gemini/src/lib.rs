//! Client for the Gemini file and generation APIs.
//!
//! Covers the three provider surfaces the analysis pipeline needs:
//! - file upload (resumable protocol) producing a remote file handle,
//! - file status refresh and deletion by handle name,
//! - `generateContent` with a forced function call for structured output.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GeminiClient, GeminiConfig};
pub use error::{GeminiError, GeminiResult};
pub use types::{FileState, RemoteFile};
