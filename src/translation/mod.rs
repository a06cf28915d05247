//! 翻译模块
//!
//! - **config**: 用户设置、语言表与设置存储
//! - **core**: `TranslationPipeline` 接口与基于 LLM 的翻译器
//! - **error**: 错误类型与分类
//! - **pipeline**: 整页翻译（块收集、逐块翻译、回滚）
//! - **prompt**: 翻译与改写提示词
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use lingo_trans::translation::{LlmTranslator, Settings, TranslationPipeline, TranslationRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let translator = LlmTranslator::from_env();
//! let settings = Settings::default();
//! let request = TranslationRequest::new("Hello world", "es");
//! let mut on_stream = |chunk: lingo_trans::network::StreamChunk| {
//!     print!("{}", chunk.content);
//! };
//! translator
//!     .translate(&settings, &request, &CancellationToken::new(), &mut on_stream)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod prompt;

pub use config::{
    constants, resolve_language_label, FileSettingsStore, MemorySettingsStore, ModelProvider,
    SelectionBehavior, Settings, SettingsStore,
};
pub use core::{LlmTranslator, TranslationPipeline, TranslatorStats};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use pipeline::{PageOutcome, PageStatus, PageTranslator, ProgressSink};
pub use prompt::{RewritingRequest, TranslationRequest};
