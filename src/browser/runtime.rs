use crate::browser::engine::Engine;
use crate::browser::messages::{Command, EngineHandle, Envelope, PageEvent, PageEvents, Response};
use crate::browser::page::Page;
use crate::browser::scheduler::Debouncer;
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Delay between page load and the first discovery pass.
    pub settle_delay: Duration,
    pub scroll_window: Duration,
    pub mutation_window: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            scroll_window: Duration::from_millis(500),
            mutation_window: Duration::from_millis(500),
        }
    }
}

/// Owns the engine and serializes every page event and popup command through it.
pub struct EngineRuntime<P: Page> {
    engine: Engine<P>,
    commands: mpsc::Receiver<Envelope>,
    events: mpsc::Receiver<PageEvent>,
    settle: Debouncer,
    scroll: Debouncer,
    mutation: Debouncer,
    config: RuntimeConfig,
}

impl<P: Page> EngineRuntime<P> {
    pub fn new(engine: Engine<P>, config: RuntimeConfig) -> (Self, EngineHandle, PageEvents) {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let runtime = Self {
            engine,
            commands: command_rx,
            events: event_rx,
            settle: Debouncer::new(config.settle_delay),
            scroll: Debouncer::new(config.scroll_window),
            mutation: Debouncer::new(config.mutation_window),
            config,
        };
        (runtime, EngineHandle::new(command_tx), PageEvents::new(event_tx))
    }

    fn next_deadline(&self) -> Option<Instant> {
        [&self.settle, &self.scroll, &self.mutation]
            .into_iter()
            .filter_map(Debouncer::deadline)
            .min()
    }

    /// Runs until every handle and event sender is dropped, then flushes
    /// pending passes and hands the engine back.
    pub async fn run(mut self) -> Engine<P> {
        let mut commands_open = true;
        let mut events_open = true;

        while commands_open || events_open {
            let deadline = self.next_deadline();
            // Page events are applied before popup commands that arrived alongside them.
            tokio::select! {
                biased;
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => events_open = false,
                },
                envelope = self.commands.recv(), if commands_open => match envelope {
                    Some((command, reply)) => {
                        let response = self.handle_command(command).await;
                        let _ = reply.send(response);
                    }
                    None => commands_open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_due(Instant::now()).await;
                }
            }
        }

        let pending = [&mut self.settle, &mut self.scroll, &mut self.mutation]
            .into_iter()
            .fold(false, |any, d| d.flush() || any);
        if pending {
            debug!("Flushing pending discovery pass on shutdown");
            self.engine.run_discovery_pass().await;
        }
        info!("Engine runtime stopped");
        self.engine
    }

    fn handle_event(&mut self, event: PageEvent, now: Instant) {
        match event {
            PageEvent::Loaded => {
                self.settle.schedule_at(now + self.config.settle_delay);
            }
            PageEvent::Scrolled => self.scroll.trigger(now),
            PageEvent::Mutated(change) => {
                self.engine.page_mut().apply_change(change);
                self.mutation.trigger(now);
            }
            PageEvent::Clicked(target) => {
                self.engine.handle_click(target);
            }
            PageEvent::AskClicked(post) => {
                self.engine.activate_ask(post);
            }
        }
    }

    async fn fire_due(&mut self, now: Instant) {
        for fired in [
            self.settle.poll(now),
            self.scroll.poll(now),
            self.mutation.poll(now),
        ] {
            if fired {
                self.engine.run_discovery_pass().await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Response {
        debug!("Handling command {:?}", command);
        match command {
            Command::Enable => {
                self.engine.enable().await;
                Response::Ack
            }
            Command::Disable => {
                self.engine.disable();
                Response::Ack
            }
            Command::SummarizeNow => {
                self.engine.force_resummarize().await;
                self.engine.cache_visible_posts();
                Response::Ack
            }
            Command::ApiKeyUpdated | Command::SummaryLengthUpdated => {
                self.engine.force_resummarize().await;
                Response::Ack
            }
            Command::ModelUpdated => Response::Ack,
            Command::TranslationUpdated { translate } => {
                let saved = self
                    .engine
                    .settings()
                    .update(&mut |s| s.translate_summaries = translate);
                if let Err(e) = saved {
                    return Response::Error { error: e.to_string() };
                }
                self.engine.force_resummarize().await;
                Response::Ack
            }
            Command::GetSelectedPost => Response::SelectedPost {
                post_id: self.engine.selected_post_id().map(str::to_string),
                post_content: self.engine.selected_post_content().map(str::to_string),
                question_mode: self.engine.take_question_mode(),
            },
            Command::GetSelectedPostId => Response::SelectedPostId {
                post_id: self.engine.selected_post_id().map(str::to_string),
            },
            Command::GetVisiblePosts => Response::Posts {
                posts: self.engine.visible_posts(),
            },
            Command::SetSelectedPostId { post_id } => {
                self.engine.set_selected_post_by_id(&post_id);
                Response::Ack
            }
            Command::AskQuestion { question } => match self.engine.ask_question(&question).await {
                Ok(result) => Response::Answer { result },
                Err(e) => Response::Error { error: e.to_string() },
            },
            Command::GetStatus => match self.engine.settings().load() {
                Ok(settings) => Response::Status(settings.status()),
                Err(e) => Response::Error { error: e.to_string() },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::assistant::AIAssistant;
    use crate::ai::transport::{ChatRequest, ChatResponse, ChatTransport};
    use crate::browser::page::{DocumentPage, DomChange};
    use crate::settings::{MemoryStore, Settings, SettingsStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn send(&self, _api_key: &str, _request: &ChatRequest) -> Result<ChatResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            serde_json::from_str(r#"{"choices":[{"message":{"content":"A summary."}}]}"#)
                .map_err(|e| e.to_string())
        }
    }

    fn post(id: &str) -> String {
        format!(
            r#"<div class="feed-shared-update-v2" id="{id}"><div class="feed-shared-text">{}</div></div>"#,
            "long post text ".repeat(10)
        )
    }

    fn runtime(html: &str) -> (EngineRuntime<DocumentPage>, EngineHandle, PageEvents, Arc<CountingTransport>, Arc<MemoryStore>) {
        let transport = Arc::new(CountingTransport::default());
        let settings = Arc::new(MemoryStore::new(Settings {
            api_key: Some("sk-test".to_string()),
            ..Settings::default()
        }));
        let assistant = AIAssistant::new(transport.clone(), settings.clone());
        let engine = Engine::new(DocumentPage::from_html(html), assistant, settings.clone());
        let (rt, handle, events) = EngineRuntime::new(engine, RuntimeConfig::default());
        (rt, handle, events, transport, settings)
    }

    #[tokio::test(start_paused = true)]
    async fn load_waits_for_settle_delay() {
        let (rt, handle, events, transport, _) = runtime(&post("a"));
        let probe = transport.clone();
        let driver = async move {
            events.send(PageEvent::Loaded).await.unwrap();
            sleep(Duration::from_millis(1900)).await;
            assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
            sleep(Duration::from_millis(200)).await;
            assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
            drop(events);
            drop(handle);
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert_eq!(engine.page().summary_blocks().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_burst_runs_one_pass() {
        let (rt, handle, events, transport, _) = runtime(&post("a"));
        let driver = async move {
            for _ in 0..5 {
                events.send(PageEvent::Scrolled).await.unwrap();
                sleep(Duration::from_millis(100)).await;
            }
            sleep(Duration::from_secs(2)).await;
            drop(events);
            drop(handle);
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert_eq!(engine.discovery_passes(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn appended_posts_are_summarized_after_quiet_period() {
        let (rt, handle, events, transport, _) = runtime(&post("a"));
        let probe = transport.clone();
        let driver = async move {
            for id in ["b", "c", "d"] {
                events
                    .send(PageEvent::Mutated(DomChange::Append(post(id))))
                    .await
                    .unwrap();
                sleep(Duration::from_millis(100)).await;
            }
            assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
            sleep(Duration::from_secs(1)).await;
            drop(events);
            drop(handle);
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert_eq!(engine.discovery_passes(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert_eq!(engine.page().summary_blocks().count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_pass_is_flushed_on_shutdown() {
        let (rt, handle, events, transport, _) = runtime(&post("a"));
        let driver = async move {
            events.send(PageEvent::Loaded).await.unwrap();
            drop(events);
            drop(handle);
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert_eq!(engine.discovery_passes(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_round_trip() {
        let (rt, handle, events, transport, settings) = runtime(&post("a"));
        let driver = async move {
            let posts = match handle.request(Command::GetVisiblePosts).await.unwrap() {
                Response::Posts { posts } => posts,
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(posts.len(), 1);

            let answer = handle
                .request(Command::AskQuestion {
                    question: "What?".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(
                answer,
                Response::Error {
                    error: "No post selected. Please click on a post first.".to_string()
                }
            );

            handle
                .request(Command::SetSelectedPostId {
                    post_id: posts[0].id.clone(),
                })
                .await
                .unwrap();
            let selected = handle.request(Command::GetSelectedPostId).await.unwrap();
            assert_eq!(
                selected,
                Response::SelectedPostId {
                    post_id: Some(posts[0].id.clone())
                }
            );

            handle
                .request(Command::TranslationUpdated { translate: true })
                .await
                .unwrap();
            match handle.request(Command::GetStatus).await.unwrap() {
                Response::Status(status) => assert!(status.translate_summaries),
                other => panic!("unexpected {other:?}"),
            }
            drop(events);
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert!(settings.load().unwrap().translate_summaries);
        // translationUpdated forced one summarization
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.page().summary_blocks().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_removes_blocks_and_ignores_triggers() {
        let (rt, handle, events, transport, _) = runtime(&post("a"));
        let driver = async move {
            handle.request(Command::SummarizeNow).await.unwrap();
            handle.request(Command::Disable).await.unwrap();
            events.send(PageEvent::Scrolled).await.unwrap();
            sleep(Duration::from_secs(1)).await;
        };
        let (engine, ()) = tokio::join!(rt.run(), driver);
        assert!(!engine.is_enabled());
        assert_eq!(engine.page().summary_blocks().count(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
