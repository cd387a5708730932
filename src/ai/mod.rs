pub mod assistant;
pub mod processor;
pub mod prompts;
pub mod transport;

pub use assistant::{AIAssistant, CompletionError, CompletionReply};
pub use processor::{split_summary, KeyPoints, RenderedSummary, SplitSummary, TextSection};
pub use prompts::RequestKind;
pub use transport::{ChatRequest, ChatResponse, ChatTransport, HttpTransport, DEFAULT_API_ENDPOINT};
