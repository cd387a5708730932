//! The controller surface: persists settings and forwards user actions to the
//! page engine, shaping the engine's answers for display.

use crate::ai::processor::TextSection;
use crate::browser::engine::VisiblePost;
use crate::browser::messages::{Command, EngineHandle, Response};
use crate::settings::{SettingsError, SettingsStore, Status, SummaryLength};
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

pub const PREVIEW_CHARS: usize = 200;
pub const OPTION_CHARS: usize = 40;

const NO_SELECTION_TEXT: &str = "No post selected. Click on a post on the page to select it.";
const NO_ANSWER_TEXT: &str = "Error: Could not get answer. Make sure your API key is set correctly.";

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("Please enter a valid API key")]
    InvalidApiKey,
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("No feed page is open")]
    NoPage,
    #[error("Could not reach the page. Please reload it.")]
    EngineUnavailable,
    #[error("Unexpected response from the page: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Summarize,
    Qa,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPreview {
    pub text: String,
    pub rtl: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOption {
    pub id: String,
    pub label: String,
}

/// One question and its answer (or the error shown instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaEntry {
    pub question: TextSection,
    pub answer: Result<TextSection, String>,
}

/// Everything the popup shows when it opens.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub status: Status,
    pub tab: Tab,
    pub preview: PostPreview,
    pub options: Vec<PostOption>,
    pub selected_id: Option<String>,
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub struct Popup {
    settings: Arc<dyn SettingsStore>,
    /// `None` when no feed page is open; settings are still saved.
    engine: Option<EngineHandle>,
}

impl Popup {
    pub fn new(settings: Arc<dyn SettingsStore>, engine: Option<EngineHandle>) -> Self {
        Self { settings, engine }
    }

    async fn send(&self, command: Command) -> Result<Response, PopupError> {
        let engine = self.engine.as_ref().ok_or(PopupError::NoPage)?;
        engine.request(command).await.map_err(|_| PopupError::EngineUnavailable)
    }

    /// Fire-and-forget notification; a missing page is not an error here.
    async fn notify(&self, command: Command) {
        if self.engine.is_none() {
            debug!("No page open, not sending {:?}", command);
            return;
        }
        if let Err(e) = self.send(command).await {
            warn!("Could not notify the page: {}", e);
        }
    }

    pub fn status(&self) -> Result<Status, PopupError> {
        Ok(self.settings.load()?.status())
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), PopupError> {
        self.settings.update(&mut |s| s.enabled = enabled)?;
        self.notify(if enabled { Command::Enable } else { Command::Disable })
            .await;
        Ok(())
    }

    pub async fn save_api_key(&self, input: &str) -> Result<(), PopupError> {
        let key = input.trim();
        if key.is_empty() {
            return Err(PopupError::InvalidApiKey);
        }
        self.settings.update(&mut |s| s.api_key = Some(key.to_string()))?;
        self.notify(Command::ApiKeyUpdated).await;
        Ok(())
    }

    pub async fn set_model(&self, model: &str) -> Result<(), PopupError> {
        self.settings.update(&mut |s| s.model = model.to_string())?;
        self.notify(Command::ModelUpdated).await;
        Ok(())
    }

    pub async fn set_summary_length(&self, length: SummaryLength) -> Result<(), PopupError> {
        self.settings.update(&mut |s| s.summary_length = length)?;
        self.notify(Command::SummaryLengthUpdated).await;
        Ok(())
    }

    pub async fn set_translate(&self, translate: bool) -> Result<(), PopupError> {
        self.settings.update(&mut |s| s.translate_summaries = translate)?;
        self.notify(Command::TranslationUpdated { translate }).await;
        Ok(())
    }

    pub async fn summarize_now(&self) -> Result<(), PopupError> {
        self.send(Command::SummarizeNow).await.map(|_| ())
    }

    pub async fn select_post(&self, post_id: &str) -> Result<(), PopupError> {
        if post_id.is_empty() {
            return Ok(());
        }
        self.send(Command::SetSelectedPostId {
            post_id: post_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn visible_posts(&self) -> Result<Vec<VisiblePost>, PopupError> {
        match self.send(Command::GetVisiblePosts).await? {
            Response::Posts { posts } => Ok(posts),
            other => Err(PopupError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn post_options(&self) -> Result<Vec<PostOption>, PopupError> {
        Ok(self
            .visible_posts()
            .await?
            .into_iter()
            .map(|post| PostOption {
                label: truncate(&post.content, OPTION_CHARS),
                id: post.id,
            })
            .collect())
    }

    /// Selected post preview plus the one-shot question-mode flag.
    pub async fn selected_post(&self) -> Result<(PostPreview, bool), PopupError> {
        match self.send(Command::GetSelectedPost).await? {
            Response::SelectedPost {
                post_content,
                question_mode,
                ..
            } => {
                let preview = match post_content {
                    Some(content) => PostPreview {
                        text: truncate(&content, PREVIEW_CHARS),
                        rtl: crate::direction::is_rtl(&content),
                        selected: true,
                    },
                    None => PostPreview {
                        text: NO_SELECTION_TEXT.to_string(),
                        rtl: false,
                        selected: false,
                    },
                };
                Ok((preview, question_mode))
            }
            other => Err(PopupError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn selected_post_id(&self) -> Result<Option<String>, PopupError> {
        match self.send(Command::GetSelectedPostId).await? {
            Response::SelectedPostId { post_id } => Ok(post_id),
            other => Err(PopupError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// What the popup renders on open. Opens on the Q&A tab after the ask affordance.
    pub async fn load(&self) -> Result<PopupView, PopupError> {
        let status = self.status()?;
        let (preview, question_mode) = self.selected_post().await?;
        let options = self.post_options().await?;
        let selected_id = self.selected_post_id().await?;
        Ok(PopupView {
            status,
            tab: if question_mode { Tab::Qa } else { Tab::Summarize },
            preview,
            options,
            selected_id,
        })
    }

    pub async fn ask(&self, question: &str) -> Result<QaEntry, PopupError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PopupError::EmptyQuestion);
        }
        let answer = match self
            .send(Command::AskQuestion {
                question: question.to_string(),
            })
            .await?
        {
            Response::Answer { result } => Ok(TextSection::new(result)),
            Response::Error { error } => Err(error),
            _ => Err(NO_ANSWER_TEXT.to_string()),
        };
        Ok(QaEntry {
            question: TextSection::new(question),
            answer,
        })
    }
}
