//! OpenAI-compatible chat completions with an optional knowledge search tool.

use crate::config::LlmConfig;
use crate::error::{ConfigError, GenerationError};
use crate::llm::knowledge::{self, KnowledgeBase};
use crate::llm::{ChatMessage, ResponseGenerator};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static REASONING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("hardcoded reasoning regex"));

const SEARCH_TOOL: &str = "searchKnowledge";
const DEFAULT_SEARCH_LIMIT: usize = 3;

/// Drop `<think>...</think>` reasoning some models emit inline with the answer.
pub fn strip_reasoning(text: &str) -> String {
    REASONING_REGEX.replace_all(text, "").trim().to_string()
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the model produced in one completion step.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    Final(String),
    ToolCalls(Vec<ToolCall>),
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Interpret `choices[0].message` of a chat completions response.
pub fn parse_turn(body: &Value) -> Result<AssistantTurn, GenerationError> {
    let message = &body["choices"][0]["message"];

    if let Some(calls) = message["tool_calls"].as_array()
        && !calls.is_empty()
    {
        let calls = calls
            .iter()
            .map(|call| {
                // Usually a JSON string, but some providers send the object itself.
                let arguments_field = &call["function"]["arguments"];
                let arguments = arguments_field
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .or_else(|| arguments_field.as_object().map(|_| arguments_field.clone()))
                    .unwrap_or_else(|| serde_json::json!({}));

                ToolCall {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments,
                }
            })
            .collect();
        return Ok(AssistantTurn::ToolCalls(calls));
    }

    let text = message["content"].as_str().map(strip_reasoning).unwrap_or_default();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    Ok(AssistantTurn::Final(text))
}

fn search_tool_definition() -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": SEARCH_TOOL,
            "description": "Search the knowledge base to find relevant information for answering questions",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant information"
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of results to return (default: 3)"
                    }
                },
                "required": ["query"]
            }
        }
    })
}

/// One chat completions call: request body in, response body out.
#[async_trait::async_trait]
pub trait CompletionEndpoint: Send + Sync {
    async fn complete(&self, request: &Value) -> Result<Value, GenerationError>;
}

/// `POST {base_url}/v1/chat/completions` with bearer auth.
pub struct HttpCompletionEndpoint {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpCompletionEndpoint {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionEndpoint for HttpCompletionEndpoint {
    async fn complete(&self, request: &Value) -> Result<Value, GenerationError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|error| GenerationError::ProviderRequest(error.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|error| {
            GenerationError::ProviderRequest(format!("failed to read response body: {error}"))
        })?;

        let body: Value = serde_json::from_str(&response_text).map_err(|error| {
            GenerationError::ProviderRequest(format!(
                "response ({status}) is not valid JSON: {error}"
            ))
        })?;

        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(GenerationError::ProviderRequest(format!(
                "API error ({status}): {message}"
            )));
        }

        Ok(body)
    }
}

/// Generator for any OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleGenerator {
    endpoint: Arc<dyn CompletionEndpoint>,
    model: String,
    max_output_tokens: u32,
    max_tool_steps: usize,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("model", &self.model)
            .field("knowledge", &self.knowledge.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        http: reqwest::Client,
        config: &LlmConfig,
        knowledge: Option<Arc<dyn KnowledgeBase>>,
    ) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingKey("GROQ_API_KEY".into()))?;

        let endpoint = HttpCompletionEndpoint::new(http, &config.base_url, api_key);
        Ok(Self::with_endpoint(Arc::new(endpoint), config, knowledge))
    }

    pub fn with_endpoint(
        endpoint: Arc<dyn CompletionEndpoint>,
        config: &LlmConfig,
        knowledge: Option<Arc<dyn KnowledgeBase>>,
    ) -> Self {
        Self {
            endpoint,
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            max_tool_steps: config.max_tool_steps,
            knowledge,
        }
    }

    fn request_body(&self, messages: &[Value]) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_output_tokens,
        });

        if self.knowledge.is_some() {
            body["tools"] = serde_json::json!([search_tool_definition()]);
        }

        body
    }

    /// Tool failures go back to the model as text instead of failing the turn.
    async fn run_tool(&self, call: &ToolCall) -> String {
        let Some(knowledge) = &self.knowledge else {
            return format!("Unknown tool: {}", call.name);
        };
        if call.name != SEARCH_TOOL {
            return format!("Unknown tool: {}", call.name);
        }

        let args: SearchArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(error) => return format!("Invalid arguments: {error}"),
        };

        let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        match knowledge.search(&args.query, limit).await {
            Ok(hits) => {
                tracing::debug!(query = %args.query, hits = hits.len(), "knowledge search");
                knowledge::format_hits(&hits)
            }
            Err(error) => {
                tracing::warn!(%error, query = %args.query, "knowledge search failed");
                format!("Knowledge search failed: {error}")
            }
        }
    }
}

#[async_trait::async_trait]
impl ResponseGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let mut transcript: Vec<Value> = messages
            .iter()
            .map(|message| {
                serde_json::json!({
                    "role": message.role,
                    "content": message.content,
                })
            })
            .collect();

        for step in 0..self.max_tool_steps {
            let body = self.endpoint.complete(&self.request_body(&transcript)).await?;

            match parse_turn(&body)? {
                AssistantTurn::Final(text) => {
                    tracing::debug!(step, model = %self.model, "generation finished");
                    return Ok(text);
                }
                AssistantTurn::ToolCalls(calls) => {
                    transcript.push(body["choices"][0]["message"].clone());
                    for call in &calls {
                        let output = self.run_tool(call).await;
                        transcript.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": call.id,
                            "content": output,
                        }));
                    }
                }
            }
        }

        Err(GenerationError::StepLimit(self.max_tool_steps))
    }
}
