use super::prompt::{
    QA_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT, build_qa_prompt, build_summary_prompt,
    parse_qa_response,
};
use super::{NarrativeClient, NarrativeRequest, NarrativeResponse};
use crate::config::NarrativeConfig;
use crate::error::NarrativeError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Chat completion message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Narrator backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct ChatNarrator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    qa_max_tokens: u32,
    temperature: f32,
}

impl ChatNarrator {
    pub fn new(config: &NarrativeConfig, api_key: String) -> Result<Self, NarrativeError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            qa_max_tokens: config.qa_max_tokens,
            temperature: config.temperature,
        })
    }

    /// One non-streaming completion, returning the first choice's text
    async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
    ) -> Result<String, NarrativeError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            temperature: self.temperature,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let completion: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| NarrativeError::Malformed(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(NarrativeError::EmptyResponse);
        }

        tracing::debug!(
            "Chat completion from {} took {:?}",
            self.model,
            start.elapsed()
        );
        Ok(content)
    }
}

#[async_trait]
impl NarrativeClient for ChatNarrator {
    async fn narrate(&self, request: &NarrativeRequest) -> Result<NarrativeResponse, NarrativeError> {
        tracing::info!(
            "Requesting narrative for {} commits on '{}'",
            request.commits.len(),
            request.topic
        );

        let summary = self.complete(
            SUMMARY_SYSTEM_PROMPT,
            build_summary_prompt(&request.topic, &request.commits),
            self.max_tokens,
        );
        let qa = async {
            let question = request.question.as_ref()?;
            let outcome = self
                .complete(
                    QA_SYSTEM_PROMPT,
                    build_qa_prompt(question, &request.topic, &request.commits),
                    self.qa_max_tokens,
                )
                .await;
            Some(outcome)
        };

        let (summary, qa_outcome) = tokio::join!(summary, qa);
        let summary_text = summary?;

        // A failed question leaves the summary intact; the caller answers locally
        let (qa_answer, evidence) = match qa_outcome {
            Some(Ok(content)) => {
                let (answer, evidence) = parse_qa_response(&content);
                (Some(answer), evidence)
            }
            Some(Err(e)) => {
                tracing::warn!("Question call failed, keeping summary: {}", e);
                (None, Vec::new())
            }
            None => (None, Vec::new()),
        };

        Ok(NarrativeResponse {
            summary_text,
            qa_answer,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregates;
    use crate::git::test_support::{commit_at, ts};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn narrator(server: &MockServer) -> ChatNarrator {
        let config = NarrativeConfig {
            endpoint: format!("{}/v1/", server.uri()),
            model: "test-model".to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        ChatNarrator::new(&config, "sk-test".to_string()).unwrap()
    }

    fn request(question: Option<&str>) -> NarrativeRequest {
        let mut commit = commit_at("1945ab9c752534e733c38ba0109dc3b741f0a6eb", ts(2024, 1, 1));
        commit.message = "Introduce auth middleware".to_string();
        NarrativeRequest {
            topic: "auth".to_string(),
            commits: vec![commit],
            aggregates: Aggregates::default(),
            question: question.map(str::to_string),
        }
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
    }

    #[tokio::test]
    async fn test_summary_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("Provide a structured summary"))
            .respond_with(completion("Auth began as middleware."))
            .expect(1)
            .mount(&server)
            .await;

        let response = narrator(&server).narrate(&request(None)).await.unwrap();

        assert_eq!(response.summary_text, "Auth began as middleware.");
        assert!(response.qa_answer.is_none());
        assert!(response.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_summary_and_question() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Provide a structured summary"))
            .respond_with(completion("Summary text."))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Question: Why middleware?"))
            .respond_with(completion(
                "Answer\nSummary: To centralize checks.\n\nKey Evidence\n1945ab9c — \"Introduce auth middleware\"",
            ))
            .mount(&server)
            .await;

        let response = narrator(&server)
            .narrate(&request(Some("Why middleware?")))
            .await
            .unwrap();

        assert_eq!(response.summary_text, "Summary text.");
        assert_eq!(response.qa_answer.as_deref(), Some("To centralize checks."));
        assert_eq!(response.evidence.len(), 1);
        assert_eq!(response.evidence[0].hash, "1945ab9c");
    }

    #[tokio::test]
    async fn test_failed_question_keeps_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Provide a structured summary"))
            .respond_with(completion("Good summary."))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Question: Why middleware?"))
            .respond_with(ResponseTemplate::new(500).set_body_string("qa down"))
            .expect(1)
            .mount(&server)
            .await;

        let response = narrator(&server)
            .narrate(&request(Some("Why middleware?")))
            .await
            .unwrap();

        assert_eq!(response.summary_text, "Good summary.");
        assert!(response.qa_answer.is_none());
        assert!(response.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_failed_summary_is_an_error_even_with_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Provide a structured summary"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Question: Why middleware?"))
            .respond_with(completion("Answer\nSummary: To centralize checks."))
            .mount(&server)
            .await;

        let result = narrator(&server)
            .narrate(&request(Some("Why middleware?")))
            .await;
        assert!(matches!(
            result,
            Err(NarrativeError::Server { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let result = narrator(&server).narrate(&request(None)).await;
        match result {
            Err(NarrativeError::Server { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("   "))
            .mount(&server)
            .await;

        let result = narrator(&server).narrate(&request(None)).await;
        assert!(matches!(result, Err(NarrativeError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = narrator(&server).narrate(&request(None)).await;
        assert!(matches!(result, Err(NarrativeError::Malformed(_))));
    }
}
