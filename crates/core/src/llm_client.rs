use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

/// One conversational turn sent to the generation backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }
}

/// A single generation request: the instruction payload plus the ordered turns.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub instructions: String,
    pub turns: Vec<Turn>,
    /// Ask the backend to answer with a bare JSON object.
    pub json_mode: bool,
}

/// A generic client for a text-generation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call and returns the generated text.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gemini-2.0-flash").
    /// * `temperature` - Sampling temperature forwarded with every request.
    pub fn new(config: OpenAIConfig, model: String, temperature: f32) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature,
        }
    }

    fn build_messages(request: &GenerationRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.instructions.clone())
                .build()?
                .into(),
        ];
        for turn in &request.turns {
            match turn.role {
                TurnRole::User => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.text.clone())
                        .build()?
                        .into(),
                ),
                TurnRole::Agent => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.text.clone())
                        .build()?
                        .into(),
                ),
            };
        }
        Ok(messages)
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(Self::build_messages(&request)?)
            .temperature(self.temperature);
        if request.json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }

        debug!(model = %self.model, turns = request.turns.len(), json_mode = request.json_mode, "Calling generation backend");
        let response: CreateChatCompletionResponse =
            self.client.chat().create(args.build()?).await?;

        response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")
    }
}

type Responder = Box<dyn Fn(&GenerationRequest) -> Result<String> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<String, String>>>),
    Responder(Responder),
}

/// A deterministic `LLMClient` for development and integration testing.
///
/// Either replays a fixed queue of replies in order, or answers every request
/// through a pure function of the request. Every request is recorded.
pub struct ScriptedLLMClient {
    script: Script,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLLMClient {
    /// Replies with each entry in turn; `Err` entries simulate backend failures.
    pub fn new(replies: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(replies.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fn(
        responder: impl Fn(&GenerationRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// All requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        match &self.script {
            Script::Queue(replies) => replies
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| anyhow!("Scripted backend has no replies left"))?
                .map_err(|message| anyhow!(message)),
            Script::Responder(responder) => responder(&request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest {
            instructions: "be brief".to_string(),
            turns: vec![Turn::user(text)],
            json_mode: false,
        }
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order() {
        let client = ScriptedLLMClient::new([
            Ok("first".to_string()),
            Err("backend down".to_string()),
        ]);

        assert_eq!(client.generate(request("a")).await.unwrap(), "first");
        let err = client.generate(request("b")).await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
        assert!(client.generate(request("c")).await.is_err());
        assert_eq!(client.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn scripted_client_from_fn_is_deterministic() {
        let client = ScriptedLLMClient::from_fn(|req| Ok(req.turns[0].text.to_uppercase()));
        assert_eq!(client.generate(request("hola")).await.unwrap(), "HOLA");
        assert_eq!(client.generate(request("hola")).await.unwrap(), "HOLA");
    }

    #[test]
    fn messages_start_with_instructions() {
        let mut req = request("hola");
        req.turns.push(Turn {
            role: TurnRole::Agent,
            text: "¿En qué te ayudo?".to_string(),
        });
        let messages = OpenAICompatibleClient::build_messages(&req).unwrap();
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }
}
