use crate::ai::assistant::{AIAssistant, CompletionError};
use crate::ai::processor::RenderedSummary;
use crate::browser::page::{ClickTarget, ElementHandle, Page, SummaryBlock};
use crate::settings::{SettingsError, SettingsStore};
use log::{debug, info, warn};
use rand::Rng;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Posts with less text than this are not worth a summary.
pub const MIN_CONTENT_CHARS: usize = 100;

pub const POST_SELECTORS: &[&str] = &[".feed-shared-update-v2", ".occludable-update", ".artdeco-card"];

pub const CONTENT_SELECTORS: &[&str] = &[
    ".feed-shared-update-v2__description",
    ".feed-shared-text",
    ".feed-shared-inline-show-more-text",
    ".update-components-text",
];

const HIGHLIGHT_NOTICE: &str = "Post selected for Q&A. Use the extension popup to ask questions.";
const ASK_NOTICE: &str = "Click the extension icon to ask questions about this post";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No post selected. Please click on a post first.")]
    NoPostSelected,
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// CSS selectors used to find posts and their text.
#[derive(Debug, Clone)]
pub struct PostSelectors {
    post: Selector,
    content: Vec<Selector>,
}

impl PostSelectors {
    pub fn new(post: &[&str], content: &[&str]) -> Result<Self, EngineError> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| EngineError::InvalidSelector {
                selector: css.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            post: parse(&post.join(", "))?,
            content: content.iter().map(|css| parse(css)).collect::<Result<_, _>>()?,
        })
    }
}

impl Default for PostSelectors {
    fn default() -> Self {
        Self::new(POST_SELECTORS, CONTENT_SELECTORS).expect("built-in selectors parse")
    }
}

/// One feed item as currently rendered. Only valid while `element` is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub element: ElementHandle,
    pub content_element: Option<ElementHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisiblePost {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Selected { post_id: String, content: String },
}

/// Outcome counts of one summarization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub scheduled: usize,
    pub summarized: usize,
    pub failed: usize,
}

/// `id-<unix millis>-<7 base36 chars>`.
pub fn generate_post_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("id-{millis}-{suffix}")
}

/// Finds posts on a page, summarizes new ones and tracks the Q&A selection.
///
/// Post ids live in an element-to-id map owned by the engine. An element the
/// page recreates gets a fresh id and is summarized again.
pub struct Engine<P: Page> {
    page: P,
    assistant: AIAssistant,
    settings: Arc<dyn SettingsStore>,
    selectors: PostSelectors,
    enabled: bool,
    ids: HashMap<ElementHandle, String>,
    processed: HashSet<String>,
    visible_posts: Vec<VisiblePost>,
    selection: Selection,
    question_mode: bool,
    passes: u64,
}

impl<P: Page> Engine<P> {
    pub fn new(page: P, assistant: AIAssistant, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            page,
            assistant,
            settings,
            selectors: PostSelectors::default(),
            enabled: true,
            ids: HashMap::new(),
            processed: HashSet::new(),
            visible_posts: Vec::new(),
            selection: Selection::None,
            question_mode: false,
            passes: 0,
        }
    }

    pub fn with_selectors(mut self, selectors: PostSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Loads the enabled flag from settings.
    pub fn initialize(&mut self) {
        match self.settings.load() {
            Ok(settings) => self.enabled = settings.enabled,
            Err(e) => warn!("Could not load settings, staying enabled: {}", e),
        }
        info!("Post summarizer engine ready (enabled: {})", self.enabled);
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_processed(&self, post_id: &str) -> bool {
        self.processed.contains(post_id)
    }

    /// Number of trigger-driven discovery passes run so far.
    pub fn discovery_passes(&self) -> u64 {
        self.passes
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Id of `element`, assigned on first sight.
    pub fn post_id(&mut self, element: ElementHandle) -> String {
        self.ids.entry(element).or_insert_with(generate_post_id).clone()
    }

    fn element_for_id(&self, post_id: &str) -> Option<ElementHandle> {
        self.ids
            .iter()
            .find(|(element, id)| id.as_str() == post_id && self.page.is_attached(**element))
            .map(|(element, _)| *element)
    }

    pub fn content_element(&self, post: ElementHandle) -> Option<ElementHandle> {
        self.selectors
            .content
            .iter()
            .find_map(|selector| self.page.query_within(post, selector))
    }

    pub fn extract_content(&self, post: ElementHandle) -> String {
        self.content_element(post)
            .map(|el| self.page.inner_text(el))
            .unwrap_or_default()
    }

    /// Scans the page for posts in document order.
    pub fn discover(&mut self) -> Vec<Post> {
        let page = &self.page;
        self.ids.retain(|element, _| page.is_attached(*element));

        let elements = self.page.query_all(&self.selectors.post);
        elements
            .into_iter()
            .map(|element| {
                let content_element = self.content_element(element);
                let content = content_element
                    .map(|el| self.page.inner_text(el))
                    .unwrap_or_default();
                Post {
                    id: self.post_id(element),
                    content,
                    element,
                    content_element,
                }
            })
            .collect()
    }

    /// Rebuilds the snapshot of posts that have any text.
    pub fn cache_visible_posts(&mut self) {
        self.visible_posts = self
            .discover()
            .into_iter()
            .filter(|post| !post.content.trim().is_empty())
            .map(|post| VisiblePost {
                id: post.id,
                content: post.content,
            })
            .collect();
    }

    pub fn visible_posts(&mut self) -> Vec<VisiblePost> {
        self.cache_visible_posts();
        self.visible_posts.clone()
    }

    /// Summarizes every new, long enough post on the page.
    ///
    /// Every eligible post is marked processed and gets its placeholder before
    /// the first request goes out; requests then run one at a time.
    pub async fn summarize_posts(&mut self) -> PassReport {
        let mut report = PassReport::default();
        if !self.enabled {
            return report;
        }
        if !self.assistant.is_configured() {
            debug!("No API key configured, skipping summarization");
            return report;
        }

        let mut queue = Vec::new();
        for post in self.discover() {
            // a wrapping container and the post inside it both match the post selectors
            if self.page.has_block_within(post.element) || self.processed.contains(&post.id) {
                continue;
            }
            if post.content.chars().count() < MIN_CONTENT_CHARS {
                continue;
            }
            let Some(anchor) = post.content_element else {
                continue;
            };

            self.processed.insert(post.id.clone());
            self.page
                .insert_summary_block(post.element, anchor, SummaryBlock::Pending);
            queue.push(post);
        }
        report.scheduled = queue.len();

        for post in queue {
            let block = match self.assistant.summarize(&post.content).await {
                Ok(text) => {
                    report.summarized += 1;
                    SummaryBlock::Ready(RenderedSummary::from_completion(&text))
                }
                Err(e) => {
                    warn!("Summarizing post {} failed: {}", post.id, e);
                    report.failed += 1;
                    SummaryBlock::Failed {
                        message: e.to_string(),
                    }
                }
            };
            if !self.page.replace_summary_block(post.element, block) {
                debug!("Post {} left the page before its summary arrived", post.id);
            }
        }

        if report.scheduled > 0 {
            info!(
                "Summarization pass: {} scheduled, {} summarized, {} failed",
                report.scheduled, report.summarized, report.failed
            );
        }
        report
    }

    /// One trigger-driven pass: summarize, then refresh the visible-post cache.
    pub async fn run_discovery_pass(&mut self) -> PassReport {
        if !self.enabled {
            return PassReport::default();
        }
        self.passes += 1;
        debug!("Discovery pass #{}", self.passes);
        let report = self.summarize_posts().await;
        self.cache_visible_posts();
        report
    }

    pub fn remove_summaries(&mut self) -> usize {
        self.page.remove_summary_blocks()
    }

    /// Starts a new generation: forget processed posts, drop every block, summarize again.
    pub async fn force_resummarize(&mut self) -> PassReport {
        self.processed.clear();
        let removed = self.remove_summaries();
        debug!("Forced re-summarization, removed {} summaries", removed);
        self.summarize_posts().await
    }

    pub async fn enable(&mut self) -> PassReport {
        self.enabled = true;
        self.summarize_posts().await
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.remove_summaries();
    }

    fn select(&mut self, element: ElementHandle, post_id: String, content: String) {
        if let Selection::Selected { post_id: previous, .. } = &self.selection {
            if let Some(previous) = self.element_for_id(previous) {
                self.page.set_highlighted(previous, false);
            }
        }
        self.page.set_highlighted(element, true);
        debug!("Selected post {}", post_id);
        self.selection = Selection::Selected { post_id, content };
    }

    /// A click inside a post (but outside our blocks) selects it.
    pub fn handle_click(&mut self, target: ClickTarget) -> bool {
        let ClickTarget::Element(element) = target else {
            return false;
        };
        let Some(post) = self.page.closest(element, &self.selectors.post) else {
            return false;
        };

        let post_id = self.post_id(post);
        let content = self.extract_content(post);
        self.select(post, post_id, content);
        self.page.show_notification(HIGHLIGHT_NOTICE);
        true
    }

    /// Selection from the popup's post list. Unknown ids leave the selection as is.
    pub fn set_selected_post_by_id(&mut self, post_id: &str) -> bool {
        if post_id.is_empty() {
            return false;
        }
        let Some(element) = self.element_for_id(post_id) else {
            warn!("Post {} is no longer on the page", post_id);
            return false;
        };
        let content = self.extract_content(element);
        self.select(element, post_id.to_string(), content);
        self.page.scroll_into_view(element);
        true
    }

    /// The "ask a question" affordance of a rendered summary.
    pub fn activate_ask(&mut self, post: ElementHandle) -> bool {
        if !self.page.is_attached(post) {
            return false;
        }
        for element in self.page.query_all(&self.selectors.post) {
            self.page.set_highlighted(element, false);
        }
        let post_id = self.post_id(post);
        let content = self.extract_content(post);
        self.select(post, post_id, content);
        self.question_mode = true;
        self.page.show_notification(ASK_NOTICE);
        true
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_post_id(&self) -> Option<&str> {
        match &self.selection {
            Selection::Selected { post_id, .. } => Some(post_id),
            Selection::None => None,
        }
    }

    pub fn selected_post_content(&self) -> Option<&str> {
        match &self.selection {
            Selection::Selected { content, .. } if !content.is_empty() => Some(content),
            _ => None,
        }
    }

    /// Reads and clears the flag raised by the ask affordance.
    pub fn take_question_mode(&mut self) -> bool {
        std::mem::take(&mut self.question_mode)
    }

    /// Answers a question about the selected post with one completion request.
    pub async fn ask_question(&mut self, question: &str) -> Result<String, EngineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EngineError::EmptyQuestion);
        }
        let content = self
            .selected_post_content()
            .ok_or(EngineError::NoPostSelected)?
            .to_string();
        Ok(self.assistant.answer(question, &content).await?)
    }
}
