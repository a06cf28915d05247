//! # 网络模块
//!
//! 这个模块包含与 LLM 提供商通信相关的功能：
//!
//! - 请求构造、重试与退避
//! - SSE 流式响应的增量解析
//! - 模型列表与连通性检查
//!
//! # 模块组织
//!
//! - `client` - HTTP 客户端与重试策略
//! - `streaming` - SSE 解码器与增量提取
//! - `types` - 请求、响应与流式块类型

pub mod client;
pub mod streaming;
pub mod types;

pub use client::{classify_status, parse_retry_after, LlmClient, RetryPolicy, StreamCallback};
pub use streaming::{extract_delta, Delta, SseDecoder};
pub use types::{
    ApiRequest, ApiResponse, HealthStatus, ModelInfo, ProtocolType, ProviderConfig, StreamChunk,
    TokenUsage,
};
