//! Wire types for the Gemini file and generation APIs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processing state of a remote file.
///
/// Any value outside the known enumeration deserializes to `Unknown`, which
/// the readiness poll treats as fatal rather than retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Pending,
    Processing,
    Active,
    Failed,
    #[serde(other)]
    #[default]
    Unknown,
}

impl FileState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Pending => "PENDING",
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
            FileState::Unknown => "UNKNOWN",
        }
    }

    /// True while the provider is still preparing the file.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, FileState::Pending | FileState::Processing)
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file uploaded to the Gemini file API.
///
/// `name` is the opaque resource identifier (`files/...`) used for status
/// refresh and deletion; `uri`/`mime_type` reference the file in a
/// generation request once the state is `ACTIVE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub state: FileState,
}

impl RemoteFile {
    /// Display name for logs and error messages.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Wrapper for upload responses (`{"file": {...}}`).
#[derive(Debug, Deserialize)]
pub(crate) struct FileEnvelope {
    pub file: RemoteFile,
}

// ----------------------------------------------------------------------------
// generateContent request/response
// ----------------------------------------------------------------------------

/// Gemini generateContent request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Content,
    pub tools: Vec<Tool>,
    pub tool_config: ToolConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content part. Exactly one of the fields is set.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn file_data(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: mime_type.into(),
                file_uri: file_uri.into(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Parameter schema in the provider's OpenAPI-subset format.
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    /// "ANY" forces the model to call one of the allowed functions.
    pub mode: String,
    pub allowed_function_names: Vec<String>,
}

/// Gemini generateContent response.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// The first function call in the response, if any.
    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .and_then(|mut parts| parts.find_map(|p| p.function_call.as_ref()))
    }

    /// All text parts of the first candidate, concatenated.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}
