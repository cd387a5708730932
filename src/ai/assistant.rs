use crate::ai::prompts::{system_prompt, user_prompt, RequestKind};
use crate::ai::transport::{ChatMessage, ChatRequest, ChatTransport};
use crate::settings::{Settings, SettingsStore};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("API key not found. Please set your API key in the extension settings.")]
    MissingApiKey,
    #[error("Error processing request: {0}")]
    Transport(String),
    #[error("{0}")]
    Api(String),
    #[error("Unexpected API response format")]
    UnexpectedResponse,
    #[error("Could not read settings: {0}")]
    Settings(String),
}

/// Wire shape of a completion outcome: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionReply {
    Result { result: String },
    Error { error: String },
}

impl From<Result<String, CompletionError>> for CompletionReply {
    fn from(outcome: Result<String, CompletionError>) -> Self {
        match outcome {
            Ok(result) => CompletionReply::Result { result },
            Err(e) => CompletionReply::Error { error: e.to_string() },
        }
    }
}

/// Issues one completion request per call, configured from the settings store.
pub struct AIAssistant {
    transport: Arc<dyn ChatTransport>,
    settings: Arc<dyn SettingsStore>,
    /// Used when the stored settings carry no key (`AI_API_KEY`).
    fallback_api_key: Option<String>,
}

impl AIAssistant {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            transport,
            settings,
            fallback_api_key: None,
        }
    }

    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    fn api_key(&self, settings: &Settings) -> Option<String> {
        settings
            .api_key()
            .map(str::to_string)
            .or_else(|| self.fallback_api_key.clone())
    }

    /// Whether a credential is available, from settings or the environment.
    pub fn is_configured(&self) -> bool {
        self.settings
            .load()
            .map(|s| self.api_key(&s).is_some())
            .unwrap_or(false)
    }

    pub fn build_request(&self, settings: &Settings, kind: &RequestKind, content: &str) -> ChatRequest {
        ChatRequest {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt(kind, settings.translate_summaries)),
                ChatMessage::user(user_prompt(kind, settings.summary_length, content)),
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }

    pub async fn complete(&self, kind: RequestKind, content: &str) -> Result<String, CompletionError> {
        let settings = self
            .settings
            .load()
            .map_err(|e| CompletionError::Settings(e.to_string()))?;
        let api_key = self.api_key(&settings).ok_or(CompletionError::MissingApiKey)?;

        let request = self.build_request(&settings, &kind, content);
        debug!("Requesting {} completion ({} chars of post content)", kind.label(), content.len());

        let response = self.transport.send(&api_key, &request).await.map_err(|e| {
            error!("Error in completion API request: {}", e);
            CompletionError::Transport(e)
        })?;

        if let Some(api_error) = response.error {
            let message = api_error
                .message
                .unwrap_or_else(|| "Error with completion API request".to_string());
            warn!("Completion API reported an error: {}", message);
            return Err(CompletionError::Api(message));
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .ok_or(CompletionError::UnexpectedResponse)
    }

    pub async fn summarize(&self, content: &str) -> Result<String, CompletionError> {
        self.complete(RequestKind::Summarize, content).await
    }

    pub async fn answer(&self, question: &str, content: &str) -> Result<String, CompletionError> {
        self.complete(
            RequestKind::AnswerQuestion {
                question: question.to_string(),
            },
            content,
        )
        .await
    }
}
