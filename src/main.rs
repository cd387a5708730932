use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use feed_summarizer::ai::{AIAssistant, HttpTransport};
use feed_summarizer::browser::{DocumentPage, DomChange, Engine, EngineRuntime, PageEvent, RuntimeConfig};
use feed_summarizer::config::AppConfig;
use feed_summarizer::popup::Popup;
use feed_summarizer::settings::{FileStore, SettingsStore, SummaryLength};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "feed-summarizer", version, about = "Summarize feed posts and ask questions about them")]
struct Cli {
    /// Settings file (defaults to $SUMMARIZER_SETTINGS or ./summarizer-settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Chat-completion endpoint (defaults to $AI_API_ENDPOINT or the OpenAI API)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current settings
    Status,
    /// Store the API key
    SetKey { key: String },
    /// Choose the completion model
    SetModel { model: String },
    /// Choose the summary length (short, medium, long)
    SetLength { length: String },
    /// Force summaries into the fixed translation language
    SetTranslate {
        #[arg(action = clap::ArgAction::Set)]
        translate: bool,
    },
    Enable,
    Disable,
    /// Summarize the posts of saved feed pages; later files are appended as scrolled-in content
    Summarize {
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },
    /// List the posts found on a saved feed page
    Posts { page: PathBuf },
    /// Ask a question about one post of a saved feed page
    Ask {
        page: PathBuf,
        /// 1-based position of the post in `posts` output
        #[arg(long, default_value_t = 1)]
        post: usize,
        question: String,
    },
}

fn read_page(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read page {}", path.display()))
}

fn build_engine(config: &AppConfig, settings: Arc<dyn SettingsStore>, html: &str) -> Engine<DocumentPage> {
    let transport = Arc::new(HttpTransport::new(config.endpoint.clone()));
    let assistant = AIAssistant::new(transport, settings.clone()).with_fallback_key(config.env_api_key.clone());
    let mut engine = Engine::new(DocumentPage::from_html(html), assistant, settings);
    engine.initialize();
    engine
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(cli.endpoint.as_deref(), cli.settings)?;
    let store = Arc::new(FileStore::new(&config.settings_path));
    store.initialize().context("Failed to initialize settings")?;
    let settings: Arc<dyn SettingsStore> = store;

    match cli.command {
        Commands::Status => {
            let status = Popup::new(settings, None).status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::SetKey { key } => {
            Popup::new(settings, None).save_api_key(&key).await?;
            println!("API key saved successfully");
        }
        Commands::SetModel { model } => Popup::new(settings, None).set_model(&model).await?,
        Commands::SetLength { length } => {
            let length: SummaryLength = length.parse()?;
            Popup::new(settings, None).set_summary_length(length).await?;
        }
        Commands::SetTranslate { translate } => Popup::new(settings, None).set_translate(translate).await?,
        Commands::Enable => Popup::new(settings, None).set_enabled(true).await?,
        Commands::Disable => Popup::new(settings, None).set_enabled(false).await?,
        Commands::Summarize { pages } => summarize(&config, settings, &pages).await?,
        Commands::Posts { page } => list_posts(&config, settings, &page).await?,
        Commands::Ask { page, post, question } => ask(&config, settings, &page, post, &question).await?,
    }

    Ok(())
}

async fn summarize(config: &AppConfig, settings: Arc<dyn SettingsStore>, pages: &[PathBuf]) -> Result<()> {
    let (first, rest) = pages.split_first().context("No page given")?;
    let engine = build_engine(config, settings, &read_page(first)?);
    let (runtime, handle, events) = EngineRuntime::new(engine, RuntimeConfig::default());

    let driver = async move {
        events.send(PageEvent::Loaded).await?;
        for path in rest {
            let html = read_page(path)?;
            events.send(PageEvent::Scrolled).await?;
            events.send(PageEvent::Mutated(DomChange::Append(html))).await?;
        }
        drop(handle);
        Ok::<_, anyhow::Error>(())
    };
    let (engine, driven) = tokio::join!(runtime.run(), driver);
    driven?;

    let blocks: Vec<_> = engine.page().summary_blocks().collect();
    info!("{} posts summarized", blocks.len());
    for (n, (post, block)) in blocks.into_iter().enumerate() {
        let content = engine.extract_content(post);
        println!("── Post {} ──", n + 1);
        println!("{}\n", feed_summarizer::popup::truncate(&content, 120));
        println!("{}", block.to_text());
    }
    Ok(())
}

async fn list_posts(config: &AppConfig, settings: Arc<dyn SettingsStore>, page: &Path) -> Result<()> {
    let engine = build_engine(config, settings.clone(), &read_page(page)?);
    let (runtime, handle, events) = EngineRuntime::new(engine, RuntimeConfig::default());
    drop(events);

    let popup = Popup::new(settings, Some(handle));
    let driver = async move {
        let options = popup.post_options().await;
        drop(popup);
        options
    };
    let (_, options) = tokio::join!(runtime.run(), driver);
    for (n, option) in options?.iter().enumerate() {
        println!("{:>3}. {}", n + 1, option.label);
    }
    Ok(())
}

async fn ask(
    config: &AppConfig,
    settings: Arc<dyn SettingsStore>,
    page: &Path,
    position: usize,
    question: &str,
) -> Result<()> {
    let engine = build_engine(config, settings.clone(), &read_page(page)?);
    let (runtime, handle, events) = EngineRuntime::new(engine, RuntimeConfig::default());
    drop(events);

    let popup = Popup::new(settings, Some(handle));
    let driver = async move {
        let options = popup.post_options().await?;
        let Some(option) = position.checked_sub(1).and_then(|i| options.get(i)) else {
            bail!("No post #{} on this page ({} found)", position, options.len());
        };
        popup.select_post(&option.id).await?;
        let view = popup.load().await?;
        println!("Post: {}\n", view.preview.text);
        let entry = popup.ask(question).await?;
        drop(popup);
        Ok::<_, anyhow::Error>(entry)
    };
    let (_, entry) = tokio::join!(runtime.run(), driver);
    let entry = entry?;

    println!("Q: {}", entry.question.text);
    match entry.answer {
        Ok(answer) => println!("A: {}", answer.text),
        Err(error) => bail!("{}", error),
    }
    Ok(())
}
