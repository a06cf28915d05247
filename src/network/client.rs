//! LLM HTTP 客户端
//!
//! 负责一次补全调用：构造请求、有限次数重试、流式或非流式解析响应。
//! 取消信号贯穿发送、读取响应体和退避等待的每一个挂起点。

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::streaming::SseDecoder;
use super::types::{
    wire, ApiRequest, ApiResponse, HealthStatus, ModelInfo, ProtocolType, ProviderConfig,
    StreamChunk, TokenUsage,
};
use crate::translation::error::{helpers, TranslationError, TranslationResult};

/// 连通性探测使用的提示词
pub const HEALTH_PROBE_PROMPT: &str = "Say \"OK\" if you can read this.";

/// 流式回调
pub type StreamCallback<'a> = &'a mut (dyn FnMut(StreamChunk) + Send);

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（包括第一次）
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// 读取 `LINGO_TRANS_MAX_RETRIES`
    pub fn from_env() -> Self {
        use crate::env::{network, EnvVar};

        let max_attempts = match network::MaxRetries::get() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{}，使用默认重试次数", e);
                Self::default().max_attempts
            }
        };

        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时间
    ///
    /// 服务端给出 retry-after 时严格遵守，否则指数退避并封顶。
    pub fn delay_for(&self, attempt: usize, retry_after: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after {
            return Duration::from_secs(seconds);
        }

        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// 按 HTTP 状态码对失败响应分类
pub fn classify_status(status: u16, message: String, retry_after: Option<u64>) -> TranslationError {
    match status {
        401 | 403 => TranslationError::Auth { message, status },
        429 => TranslationError::RateLimit {
            message,
            retry_after,
        },
        400 | 422 => TranslationError::InvalidRequest { message, status },
        _ => TranslationError::ServerError { message, status },
    }
}

/// 解析 Retry-After 头，只接受整数秒
pub fn parse_retry_after(value: Option<&HeaderValue>) -> Option<u64> {
    value?.to_str().ok()?.trim().parse::<u64>().ok()
}

/// 在取消信号触发时立即放弃 future
async fn cancellable<F: Future>(signal: &CancellationToken, future: F) -> TranslationResult<F::Output> {
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(TranslationError::Aborted),
        output = future => Ok(output),
    }
}

/// 转发一个流式块，错误块在转发后作为终止错误返回
fn dispatch(chunk: StreamChunk, content: &mut String, on_stream: StreamCallback<'_>) -> TranslationResult<()> {
    content.push_str(&chunk.content);
    let error = chunk.error.clone();
    on_stream(chunk);
    match error {
        Some(message) => Err(TranslationError::ProcessingError(message)),
        None => Ok(()),
    }
}

/// LLM 客户端
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
        }
    }

    fn headers(config: &ProviderConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !config.api_key.is_empty() {
            match HeaderValue::from_str(&format!("Bearer {}", config.api_key)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("API Key 含有非法字符，已忽略 Authorization 头"),
            }
        }

        for (key, value) in &config.custom_headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!("忽略非法的自定义请求头: {}", key),
            }
        }

        headers
    }

    fn request_body(config: &ProviderConfig, request: &ApiRequest, stream: bool) -> TranslationResult<Value> {
        let temperature = request.temperature.unwrap_or(ApiRequest::DEFAULT_TEMPERATURE);
        let body = match config.protocol {
            ProtocolType::Chat => serde_json::to_value(wire::ChatRequest {
                model: &request.model,
                messages: vec![wire::ChatMessage {
                    role: "user",
                    content: &request.prompt,
                }],
                stream,
                temperature,
                max_tokens: request.max_tokens,
            })?,
            ProtocolType::Responses => serde_json::to_value(wire::ResponsesRequest {
                model: &request.model,
                input: &request.prompt,
                stream,
                temperature,
                max_tokens: request.max_tokens,
            })?,
        };
        Ok(body)
    }

    /// 把失败响应解析为分类错误
    async fn parse_api_error(
        response: reqwest::Response,
        signal: &CancellationToken,
    ) -> TranslationResult<TranslationError> {
        let status = response.status().as_u16();
        let retry_after = if status == 429 {
            parse_retry_after(response.headers().get(RETRY_AFTER))
        } else {
            None
        };

        let body = cancellable(signal, response.text()).await?.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("API request failed with status {}", status));

        Ok(classify_status(status, message, retry_after))
    }

    /// 发送请求，可重试错误按策略等待后重试
    async fn send_with_retry(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &Value,
        signal: &CancellationToken,
    ) -> TranslationResult<reqwest::Response> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = helpers::network_error("Request failed after retries");

        for attempt in 0..attempts {
            let sent = cancellable(
                signal,
                self.http.post(url).headers(headers.clone()).json(body).send(),
            )
            .await?;

            let error = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let error = Self::parse_api_error(response, signal).await?;
                    if !error.is_retryable() {
                        tracing::debug!("不可重试的错误: {}", error);
                        return Err(error);
                    }
                    error
                }
                Err(e) => helpers::network_error(e),
            };

            if attempt + 1 < attempts {
                let delay = self.retry.delay_for(attempt, error.retry_after());
                tracing::warn!(
                    "请求失败（第 {}/{} 次）: {}，{}ms 后重试",
                    attempt + 1,
                    attempts,
                    error,
                    delay.as_millis()
                );
                cancellable(signal, tokio::time::sleep(delay)).await?;
            }
            last_error = error;
        }

        Err(last_error)
    }

    /// 执行一次补全调用
    ///
    /// 提供了 `on_stream` 且请求开启流式时逐块回调，返回值只包含聚合内容；
    /// 否则解析完整 JSON 响应。
    pub async fn call(
        &self,
        config: &ProviderConfig,
        request: &ApiRequest,
        signal: &CancellationToken,
        on_stream: Option<StreamCallback<'_>>,
    ) -> TranslationResult<ApiResponse> {
        let url = config.endpoint(config.protocol.endpoint_path());
        let headers = Self::headers(config);

        match on_stream {
            Some(on_stream) if request.stream => {
                let body = Self::request_body(config, request, true)?;
                let response = self.send_with_retry(&url, &headers, &body, signal).await?;
                Self::read_stream(config.protocol, response, signal, on_stream).await
            }
            _ => {
                let body = Self::request_body(config, request, false)?;
                let response = self.send_with_retry(&url, &headers, &body, signal).await?;
                Self::read_json(response, signal).await
            }
        }
    }

    async fn read_stream(
        protocol: ProtocolType,
        response: reqwest::Response,
        signal: &CancellationToken,
        on_stream: StreamCallback<'_>,
    ) -> TranslationResult<ApiResponse> {
        let mut decoder = SseDecoder::new(protocol);
        let mut content = String::new();
        let mut body = response.bytes_stream();

        loop {
            match cancellable(signal, body.next()).await? {
                Some(Ok(bytes)) => {
                    for chunk in decoder.feed(&bytes) {
                        dispatch(chunk, &mut content, on_stream)?;
                    }
                }
                Some(Err(e)) => {
                    let error = helpers::network_error(e);
                    tracing::warn!("读取流式响应失败: {}", error);
                    on_stream(StreamChunk::failed(error.to_string()));
                    return Err(error);
                }
                None => break,
            }
        }

        for chunk in decoder.finish() {
            dispatch(chunk, &mut content, on_stream)?;
        }

        Ok(ApiResponse {
            content,
            ..ApiResponse::default()
        })
    }

    async fn read_json(
        response: reqwest::Response,
        signal: &CancellationToken,
    ) -> TranslationResult<ApiResponse> {
        let text = cancellable(signal, response.text()).await??;
        let data: wire::CompletionResponse = serde_json::from_str(&text)?;

        let first = data.choices.first();
        let content = first
            .and_then(|c| c.message.as_ref().and_then(|m| m.content.clone()))
            .or_else(|| first.and_then(|c| c.text.clone()))
            .or(data.output_text)
            .unwrap_or_default();

        Ok(ApiResponse {
            content,
            usage: data.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: data.model,
            finish_reason: first.and_then(|c| c.finish_reason.clone()),
        })
    }

    /// 列出提供商可用的模型
    pub async fn fetch_models(
        &self,
        config: &ProviderConfig,
        signal: &CancellationToken,
    ) -> TranslationResult<Vec<ModelInfo>> {
        let url = config.endpoint("models");
        let response = cancellable(
            signal,
            self.http.get(&url).headers(Self::headers(config)).send(),
        )
        .await?
        .map_err(helpers::network_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(classify_status(
                status,
                format!("Failed to fetch models: {}", status),
                None,
            ));
        }

        let text = cancellable(signal, response.text()).await??;
        let list: wire::ModelList = serde_json::from_str(&text)?;

        Ok(list
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                name: entry.id.clone(),
                id: entry.id,
                provider: config.provider,
                created: entry.created,
                description: entry.description,
            })
            .collect())
    }

    /// 连通性与凭据检查：先列模型，失败则发一个极小的补全请求
    pub async fn health_check(&self, config: &ProviderConfig, signal: &CancellationToken) -> HealthStatus {
        let models_error = match self.fetch_models(config, signal).await {
            Ok(_) => {
                return HealthStatus {
                    ok: true,
                    message: "Connection successful".to_string(),
                }
            }
            Err(e) => e,
        };
        tracing::debug!("模型列表不可用，改用探测请求: {}", models_error);

        let probe = ApiRequest {
            max_tokens: Some(10),
            ..ApiRequest::new(HEALTH_PROBE_PROMPT, config.model.clone())
        };

        match self.call(config, &probe, signal, None).await {
            Ok(_) => HealthStatus {
                ok: true,
                message: "Connection successful (via test request)".to_string(),
            },
            Err(e) => {
                tracing::debug!("探测请求失败: {}", e);
                HealthStatus {
                    ok: false,
                    message: models_error.to_string(),
                }
            }
        }
    }
}
