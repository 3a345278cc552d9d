//! Live `AgentPort` adapter over an Anthropic-shaped messages endpoint.
//!
//! This is the only module that knows a model provider exists. Failures map
//! onto the invocation taxonomy: 408/429/5xx and transport errors are
//! transient (the orchestrator retries them), 4xx content refusals are
//! rejections (the turn is skipped).

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::{AgentFailure, AgentPort, AgentReply};
use crate::types::{Expert, Message, MODERATOR_ID};

/// Adapter configuration. Defaults read the API key from the environment.
#[derive(Debug, Clone)]
pub struct HttpAgentConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// USD per 1k input tokens, for cost attribution.
    pub usd_per_1k_input: f64,
    /// USD per 1k output tokens.
    pub usd_per_1k_output: f64,
}

impl Default for HttpAgentConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1024,
            usd_per_1k_input: 0.0008,
            usd_per_1k_output: 0.004,
        }
    }
}

/// HTTP-backed expert invocations.
pub struct HttpAgentClient {
    config: HttpAgentConfig,
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(config: HttpAgentConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn system_prompt(expert: &Expert) -> String {
        format!(
            "You are {}, a debate panelist specializing in {}. Argue from that \
             perspective, engage with the other panelists' points, and commit to \
             a position.",
            expert.name,
            if expert.specializations.is_empty() {
                "general decision-making".to_string()
            } else {
                expert.specializations.join(", ")
            }
        )
    }

    fn history_block(history: &[Message]) -> String {
        history
            .iter()
            .map(|m| {
                let author = if m.author_id == MODERATOR_ID {
                    "moderator"
                } else {
                    m.author_id.as_str()
                };
                format!("[{}] {}", author, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl AgentPort for HttpAgentClient {
    async fn invoke(
        &self,
        expert: &Expert,
        prompt: &str,
        history: &[Message],
    ) -> std::result::Result<AgentReply, AgentFailure> {
        if self.config.api_key.is_empty() {
            return Err(AgentFailure::Transient(
                "no API key configured for the agent adapter".into(),
            ));
        }

        let user_content = if history.is_empty() {
            prompt.to_string()
        } else {
            format!(
                "{}\n\nFull transcript for reference:\n{}",
                prompt,
                Self::history_block(history)
            )
        };

        let request_body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": Self::system_prompt(expert),
            "messages": [
                { "role": "user", "content": user_content }
            ]
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AgentFailure::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error()
            || status.as_u16() == 429
            || status.as_u16() == 408
        {
            return Err(AgentFailure::Transient(format!(
                "provider returned {}",
                status
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentFailure::ContentRejected(format!(
                "provider refused ({}): {}",
                status, body
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| AgentFailure::Transient(format!("malformed response: {}", e)))?;

        let text = parsed
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let tokens_used = parsed.usage.input_tokens + parsed.usage.output_tokens;
        let cost_usd = f64::from(parsed.usage.input_tokens) / 1000.0
            * self.config.usd_per_1k_input
            + f64::from(parsed.usage.output_tokens) / 1000.0 * self.config.usd_per_1k_output;

        Ok(AgentReply {
            text,
            tokens_used,
            cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expert() -> Expert {
        Expert::new("Analyst", vec!["financial modeling".into()])
    }

    #[test]
    fn test_system_prompt_names_the_specializations() {
        let prompt = HttpAgentClient::system_prompt(&expert());
        assert!(prompt.contains("Analyst"));
        assert!(prompt.contains("financial modeling"));
    }

    #[test]
    fn test_history_block_labels_the_moderator() {
        let history = vec![
            Message::from_expert(1, "analyst", "claims".into(), 1, 0.0),
            Message::intervention(
                1,
                crate::types::InterventionKind::Deepen,
                "go deeper".into(),
            ),
        ];
        let block = HttpAgentClient::history_block(&history);
        assert!(block.contains("[analyst] claims"));
        assert!(block.contains("[moderator] go deeper"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_transient() {
        let client = HttpAgentClient::new(HttpAgentConfig {
            api_key: String::new(),
            ..HttpAgentConfig::default()
        });
        let err = client.invoke(&expert(), "prompt", &[]).await.unwrap_err();
        assert!(matches!(err, AgentFailure::Transient(_)));
    }

    #[test]
    fn test_api_response_shape_parses() {
        let raw = r#"{
            "content": [{"type": "text", "text": "RECOMMENDATION: alpha"}],
            "usage": {"input_tokens": 120, "output_tokens": 40}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "RECOMMENDATION: alpha");
        assert_eq!(parsed.usage.input_tokens + parsed.usage.output_tokens, 160);
    }
}
