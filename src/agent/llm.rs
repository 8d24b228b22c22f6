//! HTTP reasoning engine for OpenAI-compatible and Ollama endpoints.
//!
//! Targeted decisions ask for a JSON tool call such as
//! `{"tool_name": "vote_for_player", "arguments": {"player_id": 4}}`;
//! speeches are plain text. Every call is recorded on the `llm_calls`
//! tracing target with its duration and token usage.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::prompt::build_prompt;
use super::{AgentReply, DecisionKind, DecisionRequest, ReasoningEngine};
use crate::config::{GenerationParams, LlmSection, ParamsSection, Provider};
use crate::errors::AgentError;
use crate::game::PlayerId;

pub struct LlmEngine {
    client: reqwest::Client,
    provider: Provider,
    api_url: String,
    model: String,
    api_key: Option<String>,
    params: ParamsSection,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repeat_penalty: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl LlmEngine {
    pub fn new(llm: &LlmSection, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build reasoning engine HTTP client")?;
        Ok(Self {
            client,
            provider: llm.provider,
            api_url: llm.api_url.clone(),
            model: llm.model.clone(),
            api_key,
            params: llm.params.clone(),
        })
    }

    fn chat_body<'a>(
        &'a self,
        prompt: &'a str,
        kind: DecisionKind,
        params: &GenerationParams,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: kind.tool_name().map(|_| ResponseFormat {
                kind: "json_object",
            }),
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        }
    }

    fn ollama_body<'a>(
        &'a self,
        prompt: &'a str,
        kind: DecisionKind,
        params: &GenerationParams,
    ) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_tokens,
                repeat_penalty: params.presence_penalty.map(|p| 1.0 + p),
            },
            format: kind.tool_name().map(|_| "json"),
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        kind: DecisionKind,
        params: &GenerationParams,
    ) -> Result<(String, TokenUsage), AgentError> {
        let request = match self.provider {
            Provider::OpenaiCompatible => {
                let mut request = self
                    .client
                    .post(&self.api_url)
                    .json(&self.chat_body(prompt, kind, params));
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request
            }
            Provider::Ollama => self
                .client
                .post(&self.api_url)
                .json(&self.ollama_body(prompt, kind, params)),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
            });
        }

        match self.provider {
            Provider::OpenaiCompatible => {
                let body: ChatResponse = response.json().await.map_err(transport_error)?;
                let usage = body
                    .usage
                    .map(|u| TokenUsage {
                        prompt_tokens: u.prompt_tokens,
                        completion_tokens: u.completion_tokens,
                    })
                    .unwrap_or_default();
                let text = body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .unwrap_or_default();
                Ok((text, usage))
            }
            Provider::Ollama => {
                let body: OllamaResponse = response.json().await.map_err(transport_error)?;
                Ok((
                    body.response,
                    TokenUsage {
                        prompt_tokens: body.prompt_eval_count,
                        completion_tokens: body.eval_count,
                    },
                ))
            }
        }
    }
}

#[async_trait]
impl ReasoningEngine for LlmEngine {
    async fn decide(&self, request: &DecisionRequest) -> Result<AgentReply, AgentError> {
        let prompt = build_prompt(request);
        let params = self.params.resolve(request.kind, request.role);
        debug!(player = request.actor_id, kind = %request.kind, ?params, "Calling reasoning engine");

        let started = Instant::now();
        let result = self.complete(&prompt, request.kind, &params).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let reply = result.and_then(|(text, usage)| {
            let reply = interpret(request.kind, &text);
            info!(
                target: "llm_calls",
                call_type = request.kind.as_str(),
                player_id = request.actor_id,
                duration_ms,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total(),
                ok = reply.is_ok(),
                response = text.trim(),
                "llm call"
            );
            reply
        });

        if let Err(err) = &reply
            && err.is_retryable()
        {
            info!(
                target: "llm_calls",
                call_type = request.kind.as_str(),
                player_id = request.actor_id,
                duration_ms,
                ok = false,
                error = %err,
                "llm call"
            );
        }
        reply
    }
}

fn transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout { secs: 0.0 }
    } else {
        AgentError::Transport(err.to_string())
    }
}

/// Turn raw engine output into a reply for the given decision kind.
pub fn interpret(kind: DecisionKind, text: &str) -> Result<AgentReply, AgentError> {
    match kind.tool_name() {
        None => {
            let speech = text.trim().trim_matches('"').trim();
            if speech.is_empty() {
                Err(AgentError::NoAnswer)
            } else {
                Ok(AgentReply::Speech(speech.to_string()))
            }
        }
        Some(tool) => parse_tool_call(text, tool).map(AgentReply::Target),
    }
}

/// Extract `arguments.player_id` from a tool call naming `expected_tool`.
pub fn parse_tool_call(text: &str, expected_tool: &str) -> Result<PlayerId, AgentError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        return Err(AgentError::NoAnswer);
    }
    let value: Value =
        serde_json::from_str(json).map_err(|e| AgentError::Malformed(e.to_string()))?;

    let tool = value.get("tool_name").and_then(Value::as_str);
    if tool != Some(expected_tool) {
        return Err(AgentError::Malformed(format!(
            "expected tool '{}', got {:?}",
            expected_tool, tool
        )));
    }

    let id = value
        .get("arguments")
        .and_then(|args| args.get("player_id"))
        .and_then(|id| match id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .ok_or_else(|| AgentError::Malformed("missing arguments.player_id".into()))?;

    PlayerId::try_from(id).map_err(|_| AgentError::Malformed(format!("player_id {} out of range", id)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
