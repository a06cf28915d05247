//! 翻译系统核心模块
//!
//! - **服务层** (`service.rs`): `TranslationPipeline` 接口与基于 LLM 的实现
//!
//! ```text
//! PortProtocolHandler
//!     └── TranslationPipeline (service.rs)
//!             ├── prompt (translation/prompt.rs)
//!             └── LlmClient (network/client.rs)
//! ```

pub mod service;

pub use service::{
    LlmTranslator, TranslationPipeline, TranslatorStats, TranslatorStatsSnapshot,
    MAX_OUTPUT_TOKENS, REWRITING_TEMPERATURE, TRANSLATION_TEMPERATURE,
};
