//! The DOM host the engine runs against.
//!
//! The engine only ever holds [`ElementHandle`]s; the page owns the elements.
//! A handle is valid for as long as the element it names is attached. When a
//! segment of the page is re-parsed, every element in it gets a new handle.

use crate::ai::processor::RenderedSummary;
use ego_tree::NodeId;
use log::debug;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Non-owning reference to one element of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle {
    segment: u64,
    index: usize,
}

/// What the engine renders next to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SummaryBlock {
    Pending,
    Failed { message: String },
    Ready(RenderedSummary),
}

impl SummaryBlock {
    pub const PENDING_TEXT: &'static str = "Summarizing...";

    pub fn is_pending(&self) -> bool {
        matches!(self, SummaryBlock::Pending)
    }

    pub fn to_text(&self) -> String {
        match self {
            SummaryBlock::Pending => Self::PENDING_TEXT.to_string(),
            SummaryBlock::Failed { message } => format!("Error: {message}"),
            SummaryBlock::Ready(summary) => summary.to_text(),
        }
    }
}

/// Where a click landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// An element of the page itself.
    Element(ElementHandle),
    /// Somewhere inside the summary or Q&A block rendered for this post.
    SummaryBlock(ElementHandle),
}

/// Structural change delivered together with a mutation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChange {
    /// Attributes or text changed; no elements were added or removed.
    None,
    /// New content was appended below the existing feed.
    Append(String),
    /// The whole page was replaced.
    Replace(String),
    /// Every element was recreated from the same markup (virtualized re-render).
    Rerender,
}

pub trait Page {
    /// All elements matching `selector`, in document order.
    fn query_all(&self, selector: &Selector) -> Vec<ElementHandle>;

    /// First descendant of `scope` matching `selector`.
    fn query_within(&self, scope: ElementHandle, selector: &Selector) -> Option<ElementHandle>;

    /// `element` itself or its nearest ancestor matching `selector`.
    fn closest(&self, element: ElementHandle, selector: &Selector) -> Option<ElementHandle>;

    /// Visible text with whitespace runs collapsed.
    fn inner_text(&self, element: ElementHandle) -> String;

    fn is_attached(&self, element: ElementHandle) -> bool;

    fn summary_block(&self, post: ElementHandle) -> Option<&SummaryBlock>;

    /// Whether any rendered block belongs to `post`, to an element inside it,
    /// or is placed in front of an element inside it.
    fn has_block_within(&self, post: ElementHandle) -> bool;

    /// Places a block for `post` immediately before `anchor`.
    fn insert_summary_block(&mut self, post: ElementHandle, anchor: ElementHandle, block: SummaryBlock);

    /// Replaces the block rendered for `post`. Returns false if none is rendered.
    fn replace_summary_block(&mut self, post: ElementHandle, block: SummaryBlock) -> bool;

    /// Removes every rendered block and returns how many there were.
    fn remove_summary_blocks(&mut self) -> usize;

    fn set_highlighted(&mut self, element: ElementHandle, highlighted: bool);

    fn scroll_into_view(&mut self, element: ElementHandle);

    fn show_notification(&mut self, message: &str);

    fn apply_change(&mut self, change: DomChange);
}

struct Segment {
    id: u64,
    source: String,
    html: Html,
    /// Elements in document order; a handle's index points into this.
    order: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
}

impl Segment {
    fn parse(id: u64, source: String, any: &Selector) -> Self {
        let html = Html::parse_document(&source);
        let order: Vec<NodeId> = html.select(any).map(|e| e.id()).collect();
        let positions = order.iter().enumerate().map(|(index, node)| (*node, index)).collect();
        Self {
            id,
            source,
            html,
            order,
            positions,
        }
    }
}

#[derive(Debug, Clone)]
struct PlacedBlock {
    post: ElementHandle,
    anchor: ElementHandle,
    block: SummaryBlock,
}

/// A page built from parsed HTML documents, one per appended segment.
pub struct DocumentPage {
    segments: Vec<Segment>,
    next_segment: u64,
    any: Selector,
    blocks: Vec<PlacedBlock>,
    highlighted: HashSet<ElementHandle>,
    scrolled_to: Option<ElementHandle>,
    notifications: Vec<String>,
}

impl Default for DocumentPage {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentPage {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            next_segment: 0,
            any: Selector::parse("*").expect("universal selector"),
            blocks: Vec::new(),
            highlighted: HashSet::new(),
            scrolled_to: None,
            notifications: Vec::new(),
        }
    }

    pub fn from_html(html: &str) -> Self {
        let mut page = Self::new();
        page.append_html(html);
        page
    }

    /// Appends a segment (infinite scroll) and returns its id.
    pub fn append_html(&mut self, html: &str) -> u64 {
        let id = self.next_segment;
        self.next_segment += 1;
        self.segments.push(Segment::parse(id, html.to_string(), &self.any));
        debug!("Appended page segment {} ({} bytes)", id, html.len());
        id
    }

    pub fn replace_html(&mut self, html: &str) {
        self.segments.clear();
        self.append_html(html);
        self.drop_detached();
    }

    /// Re-parses every segment from its markup. All handles change.
    pub fn rerender(&mut self) {
        let sources: Vec<String> = self.segments.drain(..).map(|s| s.source).collect();
        for source in sources {
            self.append_html(&source);
        }
        self.drop_detached();
    }

    fn drop_detached(&mut self) {
        let live: HashSet<u64> = self.segments.iter().map(|s| s.id).collect();
        self.blocks.retain(|b| live.contains(&b.post.segment));
        self.highlighted.retain(|h| live.contains(&h.segment));
        if self.scrolled_to.is_some_and(|h| !live.contains(&h.segment)) {
            self.scrolled_to = None;
        }
    }

    fn segment(&self, id: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    fn element(&self, handle: ElementHandle) -> Option<ElementRef<'_>> {
        let segment = self.segment(handle.segment)?;
        let node = *segment.order.get(handle.index)?;
        segment.html.tree.get(node).and_then(ElementRef::wrap)
    }

    fn handle_of(&self, segment: &Segment, element: ElementRef<'_>) -> Option<ElementHandle> {
        segment.positions.get(&element.id()).map(|&index| ElementHandle {
            segment: segment.id,
            index,
        })
    }

    /// Whether `element` is `scope` or one of its descendants.
    fn contains(&self, scope: ElementHandle, element: ElementHandle) -> bool {
        if scope == element {
            return true;
        }
        if scope.segment != element.segment {
            return false;
        }
        let (Some(scope), Some(element)) = (self.element(scope), self.element(element)) else {
            return false;
        };
        element.ancestors().any(|node| node.id() == scope.id())
    }

    /// Rendered blocks in insertion order.
    pub fn summary_blocks(&self) -> impl Iterator<Item = (ElementHandle, &SummaryBlock)> + '_ {
        self.blocks.iter().map(|b| (b.post, &b.block))
    }

    /// The element a post's block was placed in front of.
    pub fn block_anchor(&self, post: ElementHandle) -> Option<ElementHandle> {
        self.blocks.iter().find(|b| b.post == post).map(|b| b.anchor)
    }

    pub fn is_highlighted(&self, element: ElementHandle) -> bool {
        self.highlighted.contains(&element)
    }

    pub fn highlighted(&self) -> impl Iterator<Item = ElementHandle> + '_ {
        self.highlighted.iter().copied()
    }

    pub fn scrolled_to(&self) -> Option<ElementHandle> {
        self.scrolled_to
    }

    pub fn notifications(&self) -> &[String] {
        &self.notifications
    }

    /// First element matching a CSS selector string, for hosts and tests.
    pub fn find(&self, css: &str) -> Option<ElementHandle> {
        let selector = Selector::parse(css).ok()?;
        self.query_all(&selector).into_iter().next()
    }
}

impl Page for DocumentPage {
    fn query_all(&self, selector: &Selector) -> Vec<ElementHandle> {
        self.segments
            .iter()
            .flat_map(|segment| {
                segment
                    .html
                    .select(selector)
                    .filter_map(move |el| self.handle_of(segment, el))
            })
            .collect()
    }

    fn query_within(&self, scope: ElementHandle, selector: &Selector) -> Option<ElementHandle> {
        let segment = self.segment(scope.segment)?;
        let found = self.element(scope)?.select(selector).next()?;
        self.handle_of(segment, found)
    }

    fn closest(&self, element: ElementHandle, selector: &Selector) -> Option<ElementHandle> {
        let segment = self.segment(element.segment)?;
        let start = self.element(element)?;
        let found = std::iter::once(start)
            .chain(start.ancestors().filter_map(ElementRef::wrap))
            .find(|e| selector.matches(e))?;
        self.handle_of(segment, found)
    }

    fn inner_text(&self, element: ElementHandle) -> String {
        self.element(element)
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    fn is_attached(&self, element: ElementHandle) -> bool {
        self.element(element).is_some()
    }

    fn summary_block(&self, post: ElementHandle) -> Option<&SummaryBlock> {
        self.blocks.iter().find(|b| b.post == post).map(|b| &b.block)
    }

    fn has_block_within(&self, post: ElementHandle) -> bool {
        self.blocks
            .iter()
            .any(|b| self.contains(post, b.post) || self.contains(post, b.anchor))
    }

    fn insert_summary_block(&mut self, post: ElementHandle, anchor: ElementHandle, block: SummaryBlock) {
        self.blocks.push(PlacedBlock { post, anchor, block });
    }

    fn replace_summary_block(&mut self, post: ElementHandle, block: SummaryBlock) -> bool {
        match self.blocks.iter_mut().find(|b| b.post == post) {
            Some(placed) => {
                placed.block = block;
                true
            }
            None => false,
        }
    }

    fn remove_summary_blocks(&mut self) -> usize {
        let removed = self.blocks.len();
        self.blocks.clear();
        removed
    }

    fn set_highlighted(&mut self, element: ElementHandle, highlighted: bool) {
        if highlighted {
            self.highlighted.insert(element);
        } else {
            self.highlighted.remove(&element);
        }
    }

    fn scroll_into_view(&mut self, element: ElementHandle) {
        self.scrolled_to = Some(element);
    }

    fn show_notification(&mut self, message: &str) {
        self.notifications.push(message.to_string());
    }

    fn apply_change(&mut self, change: DomChange) {
        match change {
            DomChange::None => {}
            DomChange::Append(html) => {
                self.append_html(&html);
            }
            DomChange::Replace(html) => self.replace_html(&html),
            DomChange::Rerender => self.rerender(),
        }
    }
}
