mod common;

use common::{engine_with, feed, long_text, settings_with_key, Mode, ScriptedTransport};
use feed_summarizer::browser::{ClickTarget, Page, SummaryBlock};
use feed_summarizer::settings::{MemoryStore, Settings};
use futures::FutureExt;
use std::sync::Arc;

const REPLY: &str = "This is the summary. Key Points:\n- one\n- two";

#[tokio::test]
async fn content_length_boundary() {
    let short = "a".repeat(99);
    let exact = "b".repeat(100);
    let html = feed(&[("short", &short), ("exact", &exact)]);
    let transport = ScriptedTransport::replying(REPLY);
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());

    let report = engine.summarize_posts().await;
    assert_eq!(report.scheduled, 1);
    assert_eq!(transport.calls(), 1);

    let short_el = engine.page().find("#short").unwrap();
    let exact_el = engine.page().find("#exact").unwrap();
    assert!(engine.page().summary_block(short_el).is_none());
    assert!(engine.page().summary_block(exact_el).is_some());

    // short posts are still selectable and listed
    let visible = engine.visible_posts();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn wrapped_posts_are_summarized_once() {
    let text = long_text("wrapped");
    let html = format!(
        r#"<html><body><div class="occludable-update" id="outer"><div class="feed-shared-update-v2" id="inner"><div class="feed-shared-text">{text}</div></div></div></body></html>"#
    );
    let transport = ScriptedTransport::replying(REPLY);
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());

    let report = engine.summarize_posts().await;
    assert_eq!(report.scheduled, 1);
    assert_eq!(transport.calls(), 1);
    assert_eq!(engine.page().summary_blocks().count(), 1);

    engine.run_discovery_pass().await;
    assert_eq!(transport.calls(), 1);

    engine.force_resummarize().await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(engine.page().summary_blocks().count(), 1);
}

#[tokio::test]
async fn summary_is_rendered_before_the_content() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let mut engine = engine_with(&html, ScriptedTransport::replying(REPLY), settings_with_key());
    engine.summarize_posts().await;

    let a = engine.page().find("#a").unwrap();
    let content = engine.content_element(a).unwrap();
    assert_eq!(engine.page().block_anchor(a), Some(content));

    match engine.page().summary_block(a).unwrap() {
        SummaryBlock::Ready(summary) => {
            assert_eq!(summary.summary.text, "This is the summary.");
            let points = summary.key_points.as_ref().unwrap();
            assert_eq!(points.section.text, "- one\n- two");
            assert_eq!(points.bullets, vec!["one", "two"]);
            assert!(summary.ask_affordance);
        }
        other => panic!("expected a rendered summary, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_discovery_is_idempotent() {
    let html = feed(&[("a", &long_text("alpha")), ("b", &long_text("beta"))]);
    let transport = ScriptedTransport::replying(REPLY);
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());

    engine.run_discovery_pass().await;
    engine.run_discovery_pass().await;

    assert_eq!(transport.calls(), 2);
    assert_eq!(engine.page().summary_blocks().count(), 2);
    assert_eq!(engine.processed_count(), 2);
}

#[tokio::test]
async fn forced_resummarize_places_fresh_placeholders_before_any_response() {
    let html = feed(&[("a", &long_text("alpha")), ("b", &long_text("beta"))]);
    let transport = ScriptedTransport::replying(REPLY);
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());
    engine.summarize_posts().await;
    assert!(engine
        .page()
        .summary_blocks()
        .all(|(_, block)| matches!(block, SummaryBlock::Ready(_))));

    transport.set_mode(Mode::Hang);
    // poll once: runs up to the first outstanding request
    assert!(engine.force_resummarize().now_or_never().is_none());

    let blocks: Vec<_> = engine.page().summary_blocks().map(|(_, b)| b.clone()).collect();
    assert_eq!(blocks, vec![SummaryBlock::Pending, SummaryBlock::Pending]);
    assert_eq!(engine.processed_count(), 2);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn failures_render_inline_and_are_not_retried() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let transport = ScriptedTransport::replying(REPLY);
    transport.set_mode(Mode::Fail("connection reset".to_string()));
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());

    let report = engine.summarize_posts().await;
    assert_eq!(report.failed, 1);
    let a = engine.page().find("#a").unwrap();
    assert_eq!(
        engine.page().summary_block(a).unwrap().to_text(),
        "Error: Error processing request: connection reset"
    );

    engine.page_mut().remove_summary_blocks();
    engine.summarize_posts().await;
    assert_eq!(transport.calls(), 1);

    transport.set_mode(Mode::Reply(REPLY.to_string()));
    engine.force_resummarize().await;
    assert_eq!(transport.calls(), 2);
    assert!(matches!(engine.page().summary_block(a), Some(SummaryBlock::Ready(_))));
}

#[tokio::test]
async fn no_credential_means_no_requests() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let transport = ScriptedTransport::replying(REPLY);
    let settings = Arc::new(MemoryStore::new(Settings::default()));
    let mut engine = engine_with(&html, transport.clone(), settings);

    assert_eq!(engine.summarize_posts().await.scheduled, 0);
    assert_eq!(transport.calls(), 0);
    assert_eq!(engine.page().summary_blocks().count(), 0);
    assert_eq!(engine.processed_count(), 0);
}

#[tokio::test]
async fn recreated_posts_are_summarized_again() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let transport = ScriptedTransport::replying(REPLY);
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());
    engine.summarize_posts().await;

    engine.page_mut().rerender();
    engine.summarize_posts().await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(engine.page().summary_blocks().count(), 1);
}

#[tokio::test]
async fn selecting_a_new_post_moves_the_highlight() {
    let html = feed(&[("a", &long_text("alpha")), ("b", &long_text("beta"))]);
    let mut engine = engine_with(&html, ScriptedTransport::replying(REPLY), settings_with_key());
    let posts = engine.discover();
    let (a, b) = (posts[0].element, posts[1].element);

    let actor = engine.page().find("#a .actor").unwrap();
    assert!(engine.handle_click(ClickTarget::Element(actor)));
    assert_eq!(engine.selected_post_id(), Some(posts[0].id.as_str()));
    assert!(engine.page().is_highlighted(a));

    assert!(engine.set_selected_post_by_id(&posts[1].id));
    assert_eq!(engine.selected_post_content(), Some(posts[1].content.as_str()));
    assert!(!engine.page().is_highlighted(a));
    assert!(engine.page().is_highlighted(b));
    assert_eq!(engine.page().highlighted().count(), 1);
    assert_eq!(engine.page().scrolled_to(), Some(b));
}

#[tokio::test]
async fn questions_use_the_selected_post() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let transport = ScriptedTransport::replying("It is about alpha.");
    let mut engine = engine_with(&html, transport.clone(), settings_with_key());
    let a = engine.page().find("#a").unwrap();
    engine.activate_ask(a);

    let answer = engine.ask_question("What is it about?").await.unwrap();
    assert_eq!(answer, "It is about alpha.");
    let prompt = transport.last_user_prompt().unwrap();
    assert!(prompt.contains("alpha alpha"));
    assert!(prompt.contains("Question: What is it about?"));
}

#[tokio::test]
async fn translation_flag_reaches_the_prompt() {
    let html = feed(&[("a", &long_text("alpha"))]);
    let transport = ScriptedTransport::replying(REPLY);
    let settings = Arc::new(MemoryStore::new(Settings {
        api_key: Some("sk".to_string()),
        translate_summaries: true,
        ..Settings::default()
    }));
    let mut engine = engine_with(&html, transport.clone(), settings);
    engine.summarize_posts().await;
    assert!(transport.last_system_prompt().unwrap().contains("Persian/Farsi"));

    let a = engine.page().find("#a").unwrap();
    engine.activate_ask(a);
    engine.ask_question("Why?").await.unwrap();
    assert!(transport.last_system_prompt().unwrap().contains("Persian/Farsi"));
}
