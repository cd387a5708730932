use crate::browser::engine::VisiblePost;
use crate::browser::page::{ClickTarget, DomChange, ElementHandle};
use crate::settings::Status;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Commands the popup sends to the page-resident engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Enable,
    Disable,
    SummarizeNow,
    ApiKeyUpdated,
    ModelUpdated,
    SummaryLengthUpdated,
    TranslationUpdated {
        translate: bool,
    },
    GetSelectedPost,
    GetSelectedPostId,
    GetVisiblePosts,
    SetSelectedPostId {
        #[serde(rename = "postId")]
        post_id: String,
    },
    AskQuestion {
        question: String,
    },
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Ack,
    SelectedPost {
        #[serde(rename = "postId")]
        post_id: Option<String>,
        #[serde(rename = "postContent")]
        post_content: Option<String>,
        #[serde(rename = "questionMode")]
        question_mode: bool,
    },
    SelectedPostId {
        #[serde(rename = "postId")]
        post_id: Option<String>,
    },
    Posts {
        posts: Vec<VisiblePost>,
    },
    Answer {
        result: String,
    },
    Status(Status),
    Error {
        error: String,
    },
}

/// Events the page delivers to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Loaded,
    Scrolled,
    Mutated(DomChange),
    Clicked(ClickTarget),
    AskClicked(ElementHandle),
}

#[derive(Debug, Error)]
#[error("the page engine is no longer running")]
pub struct EngineGone;

pub(crate) type Envelope = (Command, oneshot::Sender<Response>);

/// Request/response channel from the popup to the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Envelope>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self { tx }
    }

    pub async fn request(&self, command: Command) -> Result<Response, EngineGone> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send((command, reply_tx)).await.map_err(|_| EngineGone)?;
        reply_rx.await.map_err(|_| EngineGone)
    }

    /// Parses a JSON command (as sent over an extension message port) and forwards it.
    pub async fn request_json(&self, raw: &str) -> Result<Response, EngineGone> {
        match serde_json::from_str::<Command>(raw) {
            Ok(command) => self.request(command).await,
            Err(e) => Ok(Response::Error {
                error: format!("Invalid command: {e}"),
            }),
        }
    }
}

/// Sender side of the page event stream.
#[derive(Debug, Clone)]
pub struct PageEvents {
    tx: mpsc::Sender<PageEvent>,
}

impl PageEvents {
    pub(crate) fn new(tx: mpsc::Sender<PageEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: PageEvent) -> Result<(), EngineGone> {
        self.tx.send(event).await.map_err(|_| EngineGone)
    }
}
