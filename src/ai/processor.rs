use crate::direction::is_rtl;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

fn key_points_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)key points:").expect("static regex"))
}

/// A completion split on its first `Key Points:` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub summary: String,
    pub key_points: Option<String>,
}

/// Splits a summary completion into its body and key-points list.
///
/// Without a marker the whole text is the summary. A marker followed by
/// nothing yields no key-points section.
pub fn split_summary(text: &str) -> SplitSummary {
    match key_points_marker().find(text) {
        Some(m) => {
            let key_points = text[m.end()..].trim();
            SplitSummary {
                summary: text[..m.start()].trim().to_string(),
                key_points: (!key_points.is_empty()).then(|| key_points.to_string()),
            }
        }
        None => SplitSummary {
            summary: text.to_string(),
            key_points: None,
        },
    }
}

/// A block of rendered text with its reading direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSection {
    pub text: String,
    pub rtl: bool,
}

impl TextSection {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let rtl = is_rtl(&text);
        Self { text, rtl }
    }
}

/// Key points rendered as one bullet per non-empty line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPoints {
    pub section: TextSection,
    pub bullets: Vec<String>,
}

impl KeyPoints {
    pub fn new(text: &str) -> Self {
        let bullets = text
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            section: TextSection::new(text),
            bullets,
        }
    }
}

/// Everything the page shows for a successfully summarized post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSummary {
    pub summary: TextSection,
    pub key_points: Option<KeyPoints>,
    /// Whether the "ask a question about this post" affordance is attached.
    pub ask_affordance: bool,
}

impl RenderedSummary {
    pub const HEADER: &'static str = "Summary";
    pub const KEY_POINTS_HEADER: &'static str = "Key Points";
    pub const ASK_LABEL: &'static str = "Ask a question about this post";

    pub fn from_completion(text: &str) -> Self {
        let split = split_summary(text);
        Self {
            summary: TextSection::new(split.summary),
            key_points: split.key_points.as_deref().map(KeyPoints::new),
            ask_affordance: true,
        }
    }

    /// Plain-text rendering, used by the CLI.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n{}\n", Self::HEADER, self.summary.text);
        if let Some(points) = &self.key_points {
            out.push_str(&format!("{}\n", Self::KEY_POINTS_HEADER));
            for bullet in &points.bullets {
                out.push_str(&format!("  • {bullet}\n"));
            }
        }
        out
    }
}
