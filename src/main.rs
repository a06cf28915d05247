//! 命令行入口
//!
//! 在进程内组装完整链路：内容端控制器 → 端口 → 后台处理器 → LLM 客户端。

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use lingo_trans::background::PortProtocolHandler;
use lingo_trans::content::{
    RequestIdGenerator, TranslateTrigger, TranslationRequestController, TranslationSurface,
};
use lingo_trans::env;
use lingo_trans::messaging::InProcessRuntime;
use lingo_trans::network::LlmClient;
use lingo_trans::translation::config::{
    create_provider_config, validate_settings, FileSettingsStore, Settings, SettingsStore,
};
use lingo_trans::translation::pipeline::{PageStatus, PageTranslator, ProgressSink};
use lingo_trans::translation::{LlmTranslator, TranslationError, TranslationResult};

#[derive(Parser)]
#[command(name = "lingo-trans", version, about = "Translate text and pages with an LLM provider")]
struct Cli {
    /// Settings file (defaults to LINGO_TRANS_CONFIG or the search paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a piece of text and stream the result
    Translate {
        #[arg(short, long)]
        text: String,
        /// Target language code, e.g. `es`
        #[arg(long)]
        to: Option<String>,
    },
    /// Translate an HTML file block by block and print the document
    Page {
        file: PathBuf,
        #[arg(long)]
        to: Option<String>,
    },
    /// Check connectivity with the configured provider
    Health,
}

/// 把流式结果写到标准输出
#[derive(Default)]
struct StdoutSurface {
    failure: Mutex<Option<String>>,
}

impl TranslationSurface for StdoutSurface {
    fn on_loading(&self, _trigger: TranslateTrigger, target_label: &str) {
        tracing::info!("开始翻译为 {}", target_label);
    }

    fn on_append(&self, content: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(content.as_bytes());
        let _ = stdout.flush();
    }

    fn on_success(&self, _content: &str, elapsed: Duration) {
        println!();
        tracing::info!("翻译完成，用时 {:?}", elapsed);
    }

    fn on_error(&self, message: &str) {
        self.record(message);
    }

    fn on_interrupted(&self, message: &str) {
        self.record(message);
    }
}

impl StdoutSurface {
    fn record(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|mut f| f.take())
    }
}

/// 整页翻译进度写到标准错误
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn update(&self, status: PageStatus, message: &str) {
        match status {
            PageStatus::Error => tracing::error!("{}", message),
            _ => eprintln!("{}", message),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env::init_tracing();
    let cli = Cli::parse();

    let store = Arc::new(match &cli.config {
        Some(path) => FileSettingsStore::new(path),
        None => FileSettingsStore::discover(),
    });
    let settings = store.load_stored_settings().await;

    // 任何网络请求之前先校验设置
    if let Err(e) = validate_settings(&settings) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Translate { text, to } => run_translate(store, &settings, &text, to).await,
        Command::Page { file, to } => run_page(store, &settings, &file, to).await,
        Command::Health => run_health(&settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// 启动进程内后台，返回连接器与处理器
fn spawn_background(
    store: Arc<FileSettingsStore>,
) -> (
    InProcessRuntime,
    Arc<PortProtocolHandler<LlmTranslator, FileSettingsStore>>,
    tokio::task::JoinHandle<()>,
) {
    let (runtime, incoming) = InProcessRuntime::new();
    let handler = Arc::new(PortProtocolHandler::new(
        Arc::new(LlmTranslator::from_env()),
        store,
    ));
    let serving = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move {
            let report = handler.serve(incoming).await;
            tracing::debug!("后台统计: {:?}", report);
        }
    });
    (runtime, handler, serving)
}

async fn run_translate(
    store: Arc<FileSettingsStore>,
    settings: &Settings,
    text: &str,
    to: Option<String>,
) -> TranslationResult<()> {
    if text.trim().is_empty() {
        return Err(TranslationError::ConfigError(
            "Nothing to translate: --text is empty.".to_string(),
        ));
    }
    let target = settings.effective_target_language(to.as_deref()).to_string();

    let (runtime, handler, serving) = spawn_background(store);
    let surface = Arc::new(StdoutSurface::default());
    let mut controller = TranslationRequestController::new(
        Arc::new(runtime),
        surface.clone(),
        Arc::new(RequestIdGenerator::new()),
    );

    controller.start_translation(text, &target, TranslateTrigger::Manual);
    controller.wait_settled().await;
    drop(controller);

    handler.shutdown();
    let _ = serving.await;

    match surface.take_failure() {
        Some(message) => Err(TranslationError::ProcessingError(message)),
        None => Ok(()),
    }
}

async fn run_page(
    store: Arc<FileSettingsStore>,
    settings: &Settings,
    file: &PathBuf,
    to: Option<String>,
) -> TranslationResult<()> {
    let html = tokio::fs::read(file).await?;
    let target = settings.effective_target_language(to.as_deref()).to_string();

    let (runtime, handler, serving) = spawn_background(store);
    let translator = PageTranslator::new(Arc::new(runtime), Arc::new(RequestIdGenerator::new()));
    let result = translator
        .translate_html(&html, "utf-8", &target, &StderrProgress)
        .await;
    drop(translator);

    handler.shutdown();
    let _ = serving.await;

    let (document, outcome) = result?;
    tracing::debug!("整页翻译结果: {:?}", outcome);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&document)?;
    stdout.flush()?;
    Ok(())
}

async fn run_health(settings: &Settings) -> TranslationResult<()> {
    let config = create_provider_config(settings);
    let status = LlmClient::new()
        .health_check(&config, &CancellationToken::new())
        .await;

    if status.ok {
        println!("{}", status.message);
        Ok(())
    } else {
        Err(TranslationError::NetworkError(status.message))
    }
}
