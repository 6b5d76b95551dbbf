//! Tactical analysis request and source selection.

use serde::Deserialize;
use thiserror::Error;

/// Request body for `POST /api/analyze/tactics`.
///
/// Exactly one of `filename` (an object key in the storage bucket) or
/// `presetUrl` (a publicly fetchable clip URL) must be supplied.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTacticsRequest {
    /// Storage object key for user-uploaded clips.
    #[serde(default)]
    pub filename: Option<String>,
    /// URL of a preset clip.
    #[serde(default)]
    pub preset_url: Option<String>,
}

/// Resolved video source for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisSource {
    /// Object key in the storage bucket.
    StoredObject(String),
    /// Preset clip URL to fetch over HTTP.
    PresetUrl(String),
}

impl AnalysisSource {
    /// Display name used for the remote file handle.
    ///
    /// For stored objects this is the object key; for preset URLs the last
    /// path segment with any query string stripped, falling back to a fixed
    /// name when the URL has no usable segment.
    pub fn display_name(&self) -> String {
        match self {
            Self::StoredObject(key) => key.clone(),
            Self::PresetUrl(url) => {
                let tail = url.rsplit('/').next().unwrap_or_default();
                let name = tail.split('?').next().unwrap_or_default();
                if name.is_empty() {
                    "preset-clip".to_string()
                } else {
                    name.to_string()
                }
            }
        }
    }
}

/// Errors resolving the request's source selector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceSelectionError {
    #[error("either filename or presetUrl is required in the request body")]
    Missing,

    #[error("filename and presetUrl are mutually exclusive")]
    Conflicting,
}

impl AnalyzeTacticsRequest {
    /// Resolve the mutually exclusive source selector.
    ///
    /// Empty strings count as absent so a client sending `{"filename": ""}`
    /// gets the same answer as one omitting the field.
    pub fn source(&self) -> Result<AnalysisSource, SourceSelectionError> {
        let filename = self.filename.as_deref().filter(|s| !s.is_empty());
        let preset_url = self.preset_url.as_deref().filter(|s| !s.is_empty());

        match (filename, preset_url) {
            (Some(key), None) => Ok(AnalysisSource::StoredObject(key.to_string())),
            (None, Some(url)) => Ok(AnalysisSource::PresetUrl(url.to_string())),
            (Some(_), Some(_)) => Err(SourceSelectionError::Conflicting),
            (None, None) => Err(SourceSelectionError::Missing),
        }
    }
}
