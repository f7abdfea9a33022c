use super::{CompletionClient, CompletionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct:free";

const APP_TITLE: &str = "Buddi";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.3;
const EMPTY_ANSWER: &str = "Sorry, I could not generate a response.";

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn request_body(&self, question: &str, context: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatTurn {
                    role: "system",
                    content: system_prompt(context),
                },
                ChatTurn {
                    role: "user",
                    content: question.to_string(),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

fn system_prompt(context: &str) -> String {
    format!(
        "You are Buddi, a helpful assistant that answers questions about the provided PDF content.\n\
         Use only the information from the PDF to answer. If the answer is not in the PDF, \
         say \"I couldn't find that information in the uploaded document.\"\n\
         \n\
         PDF Content:\n\
         {}",
        context
    )
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, question: &str, context: &str) -> Result<String, CompletionError> {
        let request = self.request_body(question, context);

        debug!(model = %self.model, context_chars = context.len(), "Requesting completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", APP_TITLE)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CompletionError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".to_string()))?;

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Ok(EMPTY_ANSWER.to_string()),
        }
    }
}

// Request/Response Models
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new(
            format!("{}/api/v1/chat/completions", server.uri()),
            "test-key",
            DEFAULT_MODEL,
        )
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("x-title", "Buddi"))
            .and(body_partial_json(json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "The deadline is June 1." } }]
            })))
            .mount(&server)
            .await;

        let answer = client_for(&server)
            .complete("What is the deadline?", "Submissions close June 1.")
            .await
            .unwrap();
        assert_eq!(answer, "The deadline is June 1.");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .ends_with("Submissions close June 1."));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is the deadline?");
    }

    #[tokio::test]
    async fn error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("q", "ctx").await.unwrap_err();
        match err {
            CompletionError::Api { status, ref message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("q", "ctx").await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("q", "ctx").await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_content_falls_back_to_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "" } }]
            })))
            .mount(&server)
            .await;

        let answer = client_for(&server).complete("q", "ctx").await.unwrap();
        assert_eq!(answer, EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let client = OpenRouterClient::new("http://127.0.0.1:9/chat", "k", DEFAULT_MODEL);
        let err = client.complete("q", "ctx").await.unwrap_err();
        assert!(matches!(err, CompletionError::Http(_)));
    }
}
