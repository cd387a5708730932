#![allow(dead_code)]

use async_trait::async_trait;
use feed_summarizer::ai::transport::{ChatRequest, ChatResponse, ChatTransport};
use feed_summarizer::ai::AIAssistant;
use feed_summarizer::browser::{DocumentPage, Engine};
use feed_summarizer::settings::{MemoryStore, Settings};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Mode {
    Reply(String),
    Fail(String),
    Hang,
}

/// Transport stub that records requests and answers according to its mode.
pub struct ScriptedTransport {
    mode: Mutex<Mode>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Reply(text.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.last_message(1)
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_message(0)
    }

    fn last_message(&self, index: usize) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.messages[index].content.clone())
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, _api_key: &str, request: &ChatRequest) -> Result<ChatResponse, String> {
        self.requests.lock().unwrap().push(request.clone());
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Mode::Reply(text) => {
                let body = serde_json::json!({ "choices": [{ "message": { "content": text } }] });
                serde_json::from_value(body).map_err(|e| e.to_string())
            }
            Mode::Fail(e) => Err(e),
            Mode::Hang => std::future::pending().await,
        }
    }
}

pub fn long_text(tag: &str) -> String {
    format!("{tag} ").repeat(40)
}

pub fn post(id: &str, text: &str) -> String {
    format!(
        r#"<div class="feed-shared-update-v2" id="{id}"><span class="actor">Someone</span><div class="feed-shared-text">{text}</div></div>"#
    )
}

pub fn feed(posts: &[(&str, &str)]) -> String {
    let body: String = posts.iter().map(|(id, text)| post(id, text)).collect();
    format!("<html><body><main>{body}</main></body></html>")
}

pub fn settings_with_key() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Settings {
        api_key: Some("sk-test".to_string()),
        ..Settings::default()
    }))
}

pub fn engine_with(
    html: &str,
    transport: Arc<ScriptedTransport>,
    settings: Arc<MemoryStore>,
) -> Engine<DocumentPage> {
    let assistant = AIAssistant::new(transport, settings.clone());
    let mut engine = Engine::new(DocumentPage::from_html(html), assistant, settings);
    engine.initialize();
    engine
}
