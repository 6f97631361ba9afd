// Gemini REST backend. One generateContent call with inline media and a JSON response schema.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::{AnalysisBackend, AnalysisRequest, TrackAnalysis};
use crate::error::AnalysisError;
use crate::prompt;
use crate::types::AnalysisSettings;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Backend talking to the Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    settings: AnalysisSettings,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, settings: AnalysisSettings) -> Self {
        GeminiBackend {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            settings,
        }
    }

    /// Read the key from `GEMINI_API_KEY`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env(settings: AnalysisSettings) -> Result<Self, AnalysisError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| AnalysisError::Failed("GEMINI_API_KEY not found in environment".into()))?;
        Ok(Self::new(api_key, settings))
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model,
            self.api_key
        )
    }

    fn build_request(&self, request: &AnalysisRequest) -> GeminiRequest {
        let text = prompt::build_prompt(&request.context, &request.markers, request.media_kind);
        GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.media.mime().to_string(),
                            data: request.media.to_base64(),
                        },
                    },
                    Part::Text { text },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: prompt::response_schema(),
                temperature: self.settings.temperature,
            },
        }
    }
}

impl AnalysisBackend for GeminiBackend {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<TrackAnalysis, AnalysisError> {
        let body = self.build_request(request);
        debug!(model = %self.settings.model, kind = ?request.media_kind, "sending analysis request");

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::classify(format!("Gemini API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, "analysis request rejected");
            return Err(AnalysisError::classify(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Failed(format!("Failed to read Gemini response: {}", e)))?;

        parse_response(&text)
    }
}

/// Extract the analysis from a raw `generateContent` response body.
pub fn parse_response(body: &str) -> Result<TrackAnalysis, AnalysisError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Failed(format!("Failed to parse Gemini response: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::SafetyBlocked(format!("Prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| AnalysisError::Failed("No response from Gemini".into()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(AnalysisError::SafetyBlocked("Response blocked: SAFETY".into()));
    }

    let text = candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.iter().find_map(|p| p.text.as_deref()))
        .ok_or_else(|| AnalysisError::Failed("Empty response from Gemini".into()))?;

    let clean = strip_fences(text);
    serde_json::from_str(clean)
        .map_err(|e| AnalysisError::Failed(format!("Failed to parse track analysis: {}", e)))
}

/// Strip a markdown code fence around the JSON, if the model added one.
fn strip_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
