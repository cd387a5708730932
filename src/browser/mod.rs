pub mod engine;
pub mod messages;
pub mod page;
pub mod runtime;
pub mod scheduler;

pub use engine::{Engine, EngineError, PassReport, Post, Selection, VisiblePost};
pub use messages::{Command, EngineHandle, PageEvent, PageEvents, Response};
pub use page::{ClickTarget, DocumentPage, DomChange, ElementHandle, Page, SummaryBlock};
pub use runtime::{EngineRuntime, RuntimeConfig};
pub use scheduler::Debouncer;
