//! Gemini API client.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{GeminiError, GeminiResult};
use crate::types::{
    Content, FileEnvelope, FunctionCallingConfig, FunctionDeclaration, GenerateContentRequest,
    GenerateContentResponse, Part, RemoteFile, Tool, ToolConfig,
};

/// Name of the function the model is forced to call.
pub const REPORT_TOOL_NAME: &str = "saveTacticalReport";

/// System instruction establishing the analyst persona.
const SYSTEM_INSTRUCTION: &str = "You are a world-class soccer tactical analyst. \
    Analyze the provided video footage and generate a detailed tactical report. \
    Focus on formations, key moments, player actions, and potential improvements. \
    Respond using the provided tool.";

/// User prompt sent alongside the video reference.
const USER_PROMPT: &str =
    "Analyze the tactics in this soccer footage and provide a structured report.";

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base URL
    pub base_url: String,
    /// API key
    pub api_key: String,
    /// Generation model
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> GeminiResult<Self> {
        Ok(Self {
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            api_key: std::env::var("GEMINI_API_KEY")
                .map_err(|_| GeminiError::Config("GEMINI_API_KEY not set".to_string()))?,
            model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            timeout: Duration::from_secs(
                std::env::var("GEMINI_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

/// Client for the Gemini file and generation APIs.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(config: GeminiConfig) -> GeminiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GeminiError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GeminiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Upload raw bytes to the file API, returning the remote file handle.
    ///
    /// Uses the provider's resumable upload protocol: a start request carries
    /// the display name and content headers and yields an upload session URL,
    /// a second request sends the bytes and finalizes the session.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> GeminiResult<RemoteFile> {
        info!(
            "Uploading {} bytes to file API as '{}' ({})",
            bytes.len(),
            display_name,
            mime_type
        );

        let start_url = format!("{}/upload/v1beta/files", self.config.base_url);
        let start = self
            .http
            .post(&start_url)
            .query(&[("key", self.config.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        if !start.status().is_success() {
            let status = start.status().as_u16();
            let body = start.text().await.unwrap_or_default();
            return Err(GeminiError::RequestFailed { status, body });
        }

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GeminiError::InvalidResponse("upload start response has no session URL".to_string())
            })?;

        let finalize = self
            .http
            .post(&session_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes)
            .send()
            .await?;

        if !finalize.status().is_success() {
            let status = finalize.status().as_u16();
            let body = finalize.text().await.unwrap_or_default();
            return Err(GeminiError::RequestFailed { status, body });
        }

        let envelope: FileEnvelope = finalize.json().await?;
        info!(
            "Uploaded file {} (initial state: {})",
            envelope.file.name, envelope.file.state
        );
        Ok(envelope.file)
    }

    /// Refresh a remote file handle by its resource name.
    pub async fn get_file(&self, name: &str) -> GeminiResult<RemoteFile> {
        debug!("Refreshing file state for {}", name);

        let url = format!("{}/v1beta/{}", self.config.base_url, name);
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::from_http_status(status, body, name));
        }

        Ok(response.json().await?)
    }

    /// Delete a remote file by its resource name.
    pub async fn delete_file(&self, name: &str) -> GeminiResult<()> {
        debug!("Deleting file {}", name);

        let url = format!("{}/v1beta/{}", self.config.base_url, name);
        let response = self
            .http
            .delete(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::from_http_status(status, body, name));
        }

        Ok(())
    }

    /// Run the tactical report generation against an `ACTIVE` remote file.
    ///
    /// The request declares the report schema as a function and forces the
    /// model to call it, so the result is the function call's argument
    /// payload as untyped JSON. A response carrying text instead of the
    /// expected call fails with [`GeminiError::MissingToolCall`].
    pub async fn generate_report(&self, file: &RemoteFile) -> GeminiResult<Value> {
        let file_uri = file.uri.as_deref().ok_or_else(|| {
            GeminiError::InvalidResponse(format!("remote file {} has no uri", file.name))
        })?;
        let mime_type = file.mime_type.as_deref().unwrap_or("video/mp4");

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::file_data(mime_type, file_uri), Part::text(USER_PROMPT)],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(SYSTEM_INSTRUCTION)],
            },
            tools: vec![Tool {
                function_declarations: vec![tactical_report_tool()],
            }],
            tool_config: ToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: vec![REPORT_TOOL_NAME.to_string()],
                },
            },
        };

        let response = self.generate_content(&request).await?;

        match response.function_call() {
            Some(call) if call.name == REPORT_TOOL_NAME => Ok(call.args.clone()),
            _ => Err(GeminiError::MissingToolCall {
                text: response.text(),
            }),
        }
    }

    /// Check that the API is reachable and the key is accepted.
    pub async fn check_connectivity(&self) -> bool {
        let url = format!("{}/v1beta/models", self.config.base_url);

        match self
            .http
            .get(&url)
            .query(&[("key", self.config.api_key.as_str()), ("pageSize", "1")])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Gemini connectivity check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Gemini connectivity check error: {}", e);
                false
            }
        }
    }

    /// Low-level generateContent call.
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> GeminiResult<GenerateContentResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        debug!("Sending generateContent request to model {}", self.config.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::RequestFailed { status, body });
        }

        Ok(response.json().await?)
    }
}

/// The report function declaration the model is forced to call.
///
/// The parameter schema mirrors the tactical report shape; descriptions guide
/// the model toward the expected content of each field.
fn tactical_report_tool() -> FunctionDeclaration {
    FunctionDeclaration {
        name: REPORT_TOOL_NAME.to_string(),
        description: "Saves the extracted tactical analysis report.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "overallSummary": {
                    "type": "string",
                    "description": "A concise overall summary of the tactical situation observed in the footage."
                },
                "formationAnalysis": {
                    "type": "string",
                    "description": "Analysis of the team formations, including strengths and weaknesses."
                },
                "keyTacticalMoments": {
                    "type": "array",
                    "description": "A list of 3-5 key tactical moments or patterns observed.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "timestamp": {
                                "type": "string",
                                "description": "Approximate timestamp (e.g., MM:SS) of the moment, if discernible."
                            },
                            "description": {
                                "type": "string",
                                "description": "Detailed description of the specific tactical moment (e.g., a specific press, counter-attack, defensive shape, individual brilliance)."
                            }
                        },
                        "required": ["description"]
                    }
                },
                "playerHighlights": {
                    "type": "array",
                    "description": "Highlights of standout individual player performances or errors (optional).",
                    "items": {
                        "type": "object",
                        "properties": {
                            "playerName": {
                                "type": "string",
                                "description": "Name of the player involved, if identifiable."
                            },
                            "highlight": {
                                "type": "string",
                                "description": "Description of a notable individual action or contribution."
                            }
                        },
                        "required": ["highlight"]
                    }
                },
                "suggestedImprovements": {
                    "type": "array",
                    "description": "Areas where tactical improvements could be made (optional).",
                    "items": { "type": "string" }
                }
            },
            "required": ["overallSummary", "formationAnalysis", "keyTacticalMoments"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileState;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn active_file() -> RemoteFile {
        RemoteFile {
            name: "files/abc123".to_string(),
            display_name: Some("clip.mp4".to_string()),
            mime_type: Some("video/mp4".to_string()),
            uri: Some("https://provider/v1beta/files/abc123".to_string()),
            state: FileState::Active,
        }
    }

    #[test]
    fn test_report_tool_declares_required_fields() {
        let tool = tactical_report_tool();
        assert_eq!(tool.name, REPORT_TOOL_NAME);

        let required = tool.parameters["required"].as_array().unwrap();
        assert!(required.contains(&json!("overallSummary")));
        assert!(required.contains(&json!("formationAnalysis")));
        assert!(required.contains(&json!("keyTacticalMoments")));
        // Item-level requirements
        assert_eq!(
            tool.parameters["properties"]["keyTacticalMoments"]["items"]["required"],
            json!(["description"])
        );
    }

    #[tokio::test]
    async fn test_upload_file_two_step() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Goog-Upload-URL", format!("{}/upload-session", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session"))
            // wiremock's `header` matcher can't do an exact match on a header
            // value containing a comma (it treats it as a multi-value list), so
            // assert the `upload, finalize` command with a closure matcher.
            .and(|req: &wiremock::Request| {
                req.headers
                    .get("X-Goog-Upload-Command")
                    .map(|v| v.to_str().unwrap_or_default() == "upload, finalize")
                    .unwrap_or(false)
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc123",
                    "displayName": "clip.mp4",
                    "mimeType": "video/mp4",
                    "uri": "https://provider/v1beta/files/abc123",
                    "state": "PROCESSING"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = test_client(&server.uri())
            .upload_file(b"clip-bytes".to_vec(), "video/mp4", "clip.mp4")
            .await
            .unwrap();

        assert_eq!(file.name, "files/abc123");
        assert_eq!(file.state, FileState::Processing);
    }

    #[tokio::test]
    async fn test_get_file_maps_404_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri()).get_file("files/abc123").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server.uri()).delete_file("files/abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_report_extracts_forced_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{
                            "functionCall": {
                                "name": "saveTacticalReport",
                                "args": {"overallSummary": "x"}
                            }
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let args = test_client(&server.uri())
            .generate_report(&active_file())
            .await
            .unwrap();
        assert_eq!(args["overallSummary"], "x");
    }

    #[tokio::test]
    async fn test_generate_report_text_response_fails_extraction() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{"text": "Here is my analysis in prose."}]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .generate_report(&active_file())
            .await
            .unwrap_err();

        match err {
            GeminiError::MissingToolCall { text } => {
                assert_eq!(text, "Here is my analysis in prose.")
            }
            other => panic!("expected MissingToolCall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_report_requires_uri() {
        let mut file = active_file();
        file.uri = None;

        let err = test_client("http://localhost:1")
            .generate_report(&file)
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::InvalidResponse(_)));
    }
}
