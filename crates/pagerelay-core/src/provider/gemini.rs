use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::CompletionError;
use crate::types::CompletionRequest;

use super::CompletionProvider;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String, api_base: Option<String>) -> Self {
        let base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            client,
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Normalize model name: strip "gemini/" prefix.
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("gemini/").unwrap_or(model)
    }

    fn build_body(request: &CompletionRequest) -> serde_json::Value {
        let mut generation_config = json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        json!({
            "systemInstruction": {
                "parts": [{"text": request.system_instruction}]
            },
            "contents": [{
                "role": "user",
                "parts": [{"text": request.user_text}]
            }],
            "generationConfig": generation_config,
        })
    }

    fn parse_response(data: &serde_json::Value) -> Result<String, CompletionError> {
        let candidate = data
            .get("candidates")
            .and_then(|v| v.get(0))
            .ok_or_else(|| match data.pointer("/promptFeedback/blockReason").and_then(|v| v.as_str()) {
                Some(reason) => CompletionError::Parse(format!("Prompt blocked: {}", reason)),
                None => CompletionError::Parse("No candidates in response".to_string()),
            })?;

        let parts = candidate
            .get("content")
            .and_then(|v| v.get("parts"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| CompletionError::Parse("No parts in response".to_string()))?;

        // Thinking models may interleave thought parts; only visible text is kept.
        let text: String = parts
            .iter()
            .filter(|p| !p.get("thought").and_then(|v| v.as_bool()).unwrap_or(false))
            .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
            .collect();

        let text = text.trim();
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::NoApiKey);
        }

        let model_name = Self::normalize_model(&request.model);
        let url = format!("{}/models/{}:generateContent", self.api_base, model_name);

        debug!("Gemini request with model {}", model_name);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(text);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;
        Self::parse_response(&data)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: &str) -> GeminiProvider {
        GeminiProvider::new(reqwest::Client::new(), key.to_string(), Some(server.uri()))
    }

    #[test]
    fn test_normalize_model() {
        assert_eq!(GeminiProvider::normalize_model("gemini/gemini-2.0-flash"), "gemini-2.0-flash");
        assert_eq!(GeminiProvider::normalize_model("gemini-3-pro-preview"), "gemini-3-pro-preview");
    }

    #[test]
    fn test_build_body() {
        let req = CompletionRequest::new("gemini-3-pro-preview", "be casual", "hey there");
        let body = GeminiProvider::build_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be casual");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hey there");
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_build_body_with_token_cap() {
        let req = CompletionRequest::new("gemini-3-pro-preview", "be casual", "hey there")
            .with_max_tokens(256);
        let body = GeminiProvider::build_body(&req);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_parse_response_joins_text_parts() {
        let data = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Got it! "},
                    {"text": "How old is the account?"}
                ]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GeminiProvider::parse_response(&data).unwrap(),
            "Got it! How old is the account?"
        );
    }

    #[test]
    fn test_parse_response_blocked_prompt() {
        let data = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiProvider::parse_response(&data).unwrap_err();
        assert!(matches!(err, CompletionError::Parse(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn test_parse_response_empty_text() {
        let data = json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]});
        assert!(matches!(
            GeminiProvider::parse_response(&data),
            Err(CompletionError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-3-pro-preview:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Hi! What can I do for you?"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = CompletionRequest::new("gemini-3-pro-preview", "be nice", "hello");
        let reply = provider(&server, "test-key").complete(&req).await.unwrap();
        assert_eq!(reply, "Hi! What can I do for you?");
    }

    #[tokio::test]
    async fn test_complete_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "API key not valid"}
            })))
            .mount(&server)
            .await;

        let req = CompletionRequest::new("gemini-3-pro-preview", "s", "u");
        let err = provider(&server, "bad").complete(&req).await.unwrap_err();
        match err {
            CompletionError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let req = CompletionRequest::new("gemini-3-pro-preview", "s", "u");
        let err = provider(&server, "k").complete(&req).await.unwrap_err();
        assert!(matches!(err, CompletionError::Parse(_)));
    }

    #[tokio::test]
    async fn test_complete_without_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let req = CompletionRequest::new("gemini-3-pro-preview", "s", "u");
        let err = provider(&server, "").complete(&req).await.unwrap_err();
        assert!(matches!(err, CompletionError::NoApiKey));
    }

    #[tokio::test]
    async fn test_complete_transport_error() {
        // Nothing listens on port 1.
        let p = GeminiProvider::new(
            reqwest::Client::new(),
            "k".into(),
            Some("http://127.0.0.1:1".into()),
        );
        let req = CompletionRequest::new("gemini-3-pro-preview", "s", "u");
        assert!(matches!(
            p.complete(&req).await,
            Err(CompletionError::Http(_))
        ));
    }
}
