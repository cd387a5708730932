//! Feed post summarizer: finds posts on a feed page, summarizes them with a
//! chat-completion API and answers questions about a selected post.

pub mod ai;
pub mod browser;
pub mod config;
pub mod direction;
pub mod popup;
pub mod settings;

pub use ai::{AIAssistant, CompletionError, HttpTransport};
pub use browser::{DocumentPage, Engine, EngineHandle, EngineRuntime, PageEvent, PageEvents, RuntimeConfig};
pub use popup::Popup;
pub use settings::{FileStore, MemoryStore, Settings, SettingsStore};
