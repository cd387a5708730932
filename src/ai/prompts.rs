use crate::settings::SummaryLength;

/// Language every answer is forced into when translation is switched on.
pub const TRANSLATION_TARGET: &str = "Persian/Farsi";

/// The two kinds of completion the extension asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Summarize,
    AnswerQuestion { question: String },
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Summarize => "summary",
            RequestKind::AnswerQuestion { .. } => "question",
        }
    }
}

const KEY_POINTS_INSTRUCTION: &str = "After the summary, provide a list of key points from the post labeled as 'Key Points:' with each point on a new line prefixed with a bullet point.";

pub fn system_prompt(kind: &RequestKind, translate: bool) -> String {
    match (kind, translate) {
        (RequestKind::Summarize, true) => format!(
            "You are an AI summarization assistant that can work with any language. \
             Detect the language of the feed post. Always summarize the post in {TRANSLATION_TARGET} \
             regardless of the original language. Keep summaries concise and informative. {KEY_POINTS_INSTRUCTION}"
        ),
        (RequestKind::Summarize, false) => format!(
            "You are an AI summarization assistant that can work with any language. \
             Summarize the feed post in the SAME LANGUAGE as the original post. \
             Focus on the main points and key takeaways. Keep the summary concise and informative. {KEY_POINTS_INSTRUCTION}"
        ),
        (RequestKind::AnswerQuestion { .. }, true) => format!(
            "You are an AI assistant answering questions about feed posts. You can work with any language. \
             Detect the language of the post and answer the question in {TRANSLATION_TARGET} \
             regardless of the language the question was asked in. \
             Provide clear, accurate, and helpful answers based solely on the post content."
        ),
        (RequestKind::AnswerQuestion { .. }, false) => "You are an AI assistant answering questions about feed posts. \
             You can work with any language. Detect the language of the post and answer the question \
             in the SAME LANGUAGE as the question was asked. \
             Provide clear, accurate, and helpful answers based solely on the post content."
            .to_string(),
    }
}

fn length_phrase(length: SummaryLength) -> &'static str {
    match length {
        SummaryLength::Short => "in one or two sentences",
        SummaryLength::Medium => "in a few sentences",
        SummaryLength::Long => "in a detailed paragraph",
    }
}

pub fn user_prompt(kind: &RequestKind, length: SummaryLength, content: &str) -> String {
    match kind {
        RequestKind::Summarize => format!(
            "Summarize this feed post {}, then list 3-5 key points:\n\n{}",
            length_phrase(length),
            content
        ),
        RequestKind::AnswerQuestion { question } => format!(
            "Feed Post:\n{content}\n\nQuestion: {question}\n\nAnswer the question based only on the information in the post."
        ),
    }
}
