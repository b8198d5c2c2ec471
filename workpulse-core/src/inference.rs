//! Multimodal inference client for productivity classification.
//!
//! Provides an `InferenceBackend` trait with an implementation for any
//! OpenAI-compatible `chat/completions` endpoint. A whole batch of screenshots
//! goes out as one user message: a text block with the instructions followed
//! by one inline `data:` URL per image.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{InferenceConfig, WorkpulseConfig};
use crate::models::ImageUpload;
use crate::reply::verdict_schema;

// ============================================================================
// InferenceBackend trait
// ============================================================================

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Classify a batch of screenshots in a single call and return the raw
    /// model reply.
    async fn classify(&self, images: &[ImageUpload]) -> Result<String, InferenceError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model refused the request: {0}")]
    Refused(String),

    #[error("Missing message content in response")]
    MissingContent,
}

// ============================================================================
// Prompt
// ============================================================================

/// Instruction block for a batch of `count` screenshots.
pub fn build_prompt(count: usize) -> String {
    format!(
        "You are an AI productivity assistant for employee monitoring. \
         You will be given {count} screenshots, each covering 15 minutes of an employee's workday. \
         Look at all of them together.\n\
         For each screenshot, identify the main activity (for example: Excel/Working, \
         Coding in VS Code, Reading Emails, Browsing Instagram, Watching YouTube, Idle/No Activity).\n\
         A visible LinkedIn page counts as productive professional networking. \
         Other social media and entertainment content counts as unproductive.\n\
         Then decide whether the employee was mostly productive, unproductive, or mixed, \
         summarize the session in 2-3 sentences, and give a productivity score out of 10 \
         (10 = perfect productivity, 1 = no productivity).\n\
         Respond in exactly this format:\n\
         SUMMARY: <summary>\nVERDICT: <verdict>\nSCORE: <score>/10"
    )
}

/// Inline `data:` URL for an image, using its declared content type.
pub fn data_url(image: &ImageUpload) -> String {
    let mime = if image.content_type.starts_with("image/") {
        image.content_type.as_str()
    } else {
        "image/jpeg"
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(&image.content))
}

// ============================================================================
// Chat completion API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiChatClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: InferenceConfig,
}

impl OpenAiChatClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_config(config: &WorkpulseConfig) -> Result<Self, InferenceError> {
        Self::new(config.inference.clone())
    }

    fn build_request(&self, images: &[ImageUpload]) -> ChatRequest {
        let mut content = Vec::with_capacity(images.len() + 1);
        content.push(ContentPart::Text {
            text: build_prompt(images.len()),
        });
        content.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_url(image),
            },
        }));

        let response_format = self.config.structured_output.then(|| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "productivity_verdict",
                    "strict": true,
                    "schema": verdict_schema(),
                }
            })
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: self.config.max_tokens,
            response_format,
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiChatClient {
    async fn classify(&self, images: &[ImageUpload]) -> Result<String, InferenceError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request = self.build_request(images);

        tracing::debug!(
            model = %self.config.model,
            images = images.len(),
            structured = self.config.structured_output,
            "Sending classification request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Inference API error");
            return Err(InferenceError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .ok_or(InferenceError::MissingContent)?
            .message;

        match (reply.content, reply.refusal) {
            (Some(content), _) => Ok(content),
            (None, Some(refusal)) => Err(InferenceError::Refused(refusal)),
            (None, None) => Err(InferenceError::MissingContent),
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn test_config(base_url: String, structured: bool) -> InferenceConfig {
        InferenceConfig {
            api_key: "sk-test".to_string(),
            base_url,
            model: "gpt-4o".to_string(),
            max_tokens: 800,
            structured_output: structured,
            timeout_seconds: 5,
        }
    }

    fn png(name: &str) -> ImageUpload {
        ImageUpload::new(name, "image/png", b"fake-png".to_vec())
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_prompt_mentions_count_and_format() {
        let prompt = build_prompt(3);
        assert!(prompt.contains("given 3 screenshots"));
        assert!(prompt.contains("LinkedIn"));
        assert!(prompt.ends_with("SUMMARY: <summary>\nVERDICT: <verdict>\nSCORE: <score>/10"));
    }

    #[test]
    fn test_data_url_uses_declared_type() {
        let url = data_url(&png("a.png"));
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(&url["data:image/png;base64,".len()..], STANDARD.encode(b"fake-png"));
    }

    #[test]
    fn test_data_url_defaults_non_image_types_to_jpeg() {
        let image = ImageUpload::new("a", "application/octet-stream", b"x".to_vec());
        assert!(data_url(&image).starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_request_has_one_text_block_then_one_image_per_upload() {
        let client = OpenAiChatClient::new(test_config("http://unused".into(), false)).unwrap();
        let request = client.build_request(&[png("a.png"), png("b.png")]);
        let json = serde_json::to_value(&request).unwrap();

        let content = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert!(content[2]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(json["max_tokens"], 800);
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_structured_request_carries_schema() {
        let client = OpenAiChatClient::new(test_config("http://unused".into(), true)).unwrap();
        let json = serde_json::to_value(client.build_request(&[png("a.png")])).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(
            json["response_format"]["json_schema"]["schema"]["required"],
            serde_json::json!(["summary", "verdict", "score"])
        );
    }

    #[tokio::test]
    async fn test_classify_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("SUMMARY: S\nVERDICT: V\nSCORE: 7/10")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(test_config(server.uri(), false)).unwrap();
        let reply = client.classify(&[png("a.png")]).await.unwrap();
        assert_eq!(reply, "SUMMARY: S\nVERDICT: V\nSCORE: 7/10");

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_classify_surfaces_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(test_config(server.uri(), false)).unwrap();
        match client.classify(&[png("a.png")]).await {
            Err(InferenceError::Api { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_without_choices_is_missing_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(test_config(server.uri(), false)).unwrap();
        assert!(matches!(
            client.classify(&[png("a.png")]).await,
            Err(InferenceError::MissingContent)
        ));
    }

    #[tokio::test]
    async fn test_classify_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": null, "refusal": "no" } }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(test_config(server.uri(), true)).unwrap();
        assert!(matches!(
            client.classify(&[png("a.png")]).await,
            Err(InferenceError::Refused(_))
        ));
    }
}
