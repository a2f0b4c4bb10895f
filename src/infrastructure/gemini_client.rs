use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[async_trait]
pub trait GenerativeModelClient: Send + Sync {
    /// Returns the raw JSON text produced under `response_schema`.
    async fn generate_json(
        &self,
        prompt: &str,
        response_schema: &serde_json::Value,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl ReqwestGeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model.trim()
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_request<'a>(
    prompt: &'a str,
    response_schema: &'a serde_json::Value,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema,
        },
    }
}

fn extract_text(body: &str) -> Result<String, InfraError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::Generation(format!("invalid model response payload: {error}; body={body}"))
    })?;

    let candidate = parsed
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| InfraError::Generation("model response contained no candidates".to_string()))?;

    let text: String = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(InfraError::Generation(format!(
            "model returned no text (finish reason: {reason})"
        )));
    }
    Ok(text)
}

#[async_trait]
impl GenerativeModelClient for ReqwestGeminiClient {
    async fn generate_json(
        &self,
        prompt: &str,
        response_schema: &serde_json::Value,
    ) -> Result<String, InfraError> {
        if self.api_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig("gemini api key must not be empty".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, response_schema))
            .send()
            .await
            .map_err(|error| InfraError::Generation(format!("network error while calling model: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Generation(format!("failed reading model response: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Generation(format!(
                "model api error: http {}; body={body}",
                status.as_u16()
            )));
        }

        extract_text(&body)
    }
}
