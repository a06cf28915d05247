//! 翻译服务核心实现
//!
//! `LlmTranslator` 把一次翻译请求变成一次 LLM 补全调用：
//! 校验设置、推导提供商配置、构造提示词，再交给 `LlmClient` 流式执行。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use lingo_trans::translation::core::{LlmTranslator, TranslationPipeline};
//! use lingo_trans::translation::config::Settings;
//! use lingo_trans::translation::prompt::TranslationRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
//! let translator = LlmTranslator::default();
//! let request = TranslationRequest::new("Hello world", "es");
//! let mut print = |chunk: lingo_trans::network::StreamChunk| print!("{}", chunk.content);
//! let response = translator
//!     .translate(&settings, &request, &CancellationToken::new(), &mut print)
//!     .await?;
//! println!("\n{}", response.content);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::network::{
    ApiRequest, ApiResponse, HealthStatus, LlmClient, ModelInfo, RetryPolicy, StreamCallback,
};
use crate::translation::config::{create_provider_config, validate_settings, Settings};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::prompt::{
    build_rewriting_prompt, build_translation_prompt, RewritingRequest, TranslationRequest,
};

/// 翻译请求的温度
pub const TRANSLATION_TEMPERATURE: f32 = 0.3;
/// 改写请求的温度
pub const REWRITING_TEMPERATURE: f32 = 0.5;
/// 单次补全的最大输出 token
pub const MAX_OUTPUT_TOKENS: u32 = 2000;

/// 翻译管道
///
/// 端口处理器通过这个接口执行每个请求；测试中可以替换为假实现。
#[async_trait]
pub trait TranslationPipeline: Send + Sync + 'static {
    async fn translate(
        &self,
        settings: &Settings,
        request: &TranslationRequest,
        signal: &CancellationToken,
        on_stream: StreamCallback<'_>,
    ) -> TranslationResult<ApiResponse>;
}

/// 基于 LLM 的翻译器
#[derive(Clone, Default)]
pub struct LlmTranslator {
    client: LlmClient,
    stats: Arc<TranslatorStats>,
}

impl LlmTranslator {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            stats: Arc::new(TranslatorStats::default()),
        }
    }

    /// 使用环境变量中的重试次数
    pub fn from_env() -> Self {
        Self::new(LlmClient::with_retry_policy(RetryPolicy::from_env()))
    }

    pub fn stats(&self) -> &TranslatorStats {
        &self.stats
    }

    async fn run(
        &self,
        settings: &Settings,
        api_request: ApiRequest,
        signal: &CancellationToken,
        on_stream: Option<StreamCallback<'_>>,
    ) -> TranslationResult<ApiResponse> {
        validate_settings(settings)?;
        let config = create_provider_config(settings);

        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let result = self.client.call(&config, &api_request, signal, on_stream).await;
        self.stats.add_processing_time(started.elapsed());

        match &result {
            Ok(response) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "补全完成: model={} chars={}",
                    api_request.model,
                    response.content.chars().count()
                );
            }
            Err(TranslationError::Aborted) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("补全失败: {}", e);
            }
        }

        result
    }

    /// 改写文本
    pub async fn rewrite(
        &self,
        settings: &Settings,
        request: &RewritingRequest,
        signal: &CancellationToken,
        on_stream: Option<StreamCallback<'_>>,
    ) -> TranslationResult<ApiResponse> {
        let api_request = ApiRequest {
            stream: on_stream.is_some(),
            temperature: Some(REWRITING_TEMPERATURE),
            max_tokens: Some(MAX_OUTPUT_TOKENS),
            ..ApiRequest::new(build_rewriting_prompt(request), settings.model.clone())
        };
        self.run(settings, api_request, signal, on_stream).await
    }

    /// 列出当前提供商的模型
    pub async fn fetch_models(
        &self,
        settings: &Settings,
        signal: &CancellationToken,
    ) -> TranslationResult<Vec<ModelInfo>> {
        let config = create_provider_config(settings);
        self.client.fetch_models(&config, signal).await
    }

    /// 连通性检查，设置无效时不发起任何请求
    pub async fn health_check(&self, settings: &Settings, signal: &CancellationToken) -> HealthStatus {
        if let Err(e) = validate_settings(settings) {
            return HealthStatus {
                ok: false,
                message: e.to_string(),
            };
        }
        let config = create_provider_config(settings);
        self.client.health_check(&config, signal).await
    }
}

#[async_trait]
impl TranslationPipeline for LlmTranslator {
    async fn translate(
        &self,
        settings: &Settings,
        request: &TranslationRequest,
        signal: &CancellationToken,
        on_stream: StreamCallback<'_>,
    ) -> TranslationResult<ApiResponse> {
        let api_request = ApiRequest {
            stream: true,
            temperature: Some(TRANSLATION_TEMPERATURE),
            max_tokens: Some(MAX_OUTPUT_TOKENS),
            ..ApiRequest::new(build_translation_prompt(request), settings.model.clone())
        };
        self.run(settings, api_request, signal, Some(on_stream)).await
    }
}

/// 翻译器统计信息
///
/// 使用原子计数，可在多个请求任务间共享。
#[derive(Debug, Default)]
pub struct TranslatorStats {
    pub requests: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub aborted: AtomicU64,
    /// 总处理时间（微秒）
    pub processing_time: AtomicU64,
}

impl TranslatorStats {
    pub fn add_processing_time(&self, duration: std::time::Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 获取统计数据快照
    pub fn snapshot(&self) -> TranslatorStatsSnapshot {
        TranslatorStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            processing_time: std::time::Duration::from_micros(
                self.processing_time.load(Ordering::Relaxed),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorStatsSnapshot {
    pub requests: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub processing_time: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_settings_fail_before_network() {
        let translator = LlmTranslator::default();
        let mut chunks = Vec::new();
        let mut sink = |chunk: crate::network::StreamChunk| chunks.push(chunk);

        let error = translator
            .translate(
                &Settings::default(),
                &TranslationRequest::new("hi", "es"),
                &CancellationToken::new(),
                &mut sink,
            )
            .await
            .unwrap_err();

        assert!(matches!(error, TranslationError::ConfigError(_)));
        assert!(error.to_string().starts_with("No model selected"));
        assert_eq!(translator.stats().snapshot().requests, 0);
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_health_check_reports_validation_error() {
        let translator = LlmTranslator::default();
        let settings = Settings {
            model: "gpt-4o-mini".to_string(),
            ..Settings::default()
        };
        let status = translator
            .health_check(&settings, &CancellationToken::new())
            .await;
        assert!(!status.ok);
        assert_eq!(
            status.message,
            "OpenAI API key is required. Please configure it in Settings."
        );
    }
}
