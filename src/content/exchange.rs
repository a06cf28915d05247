//! 单个请求的端口交互状态机
//!
//! 只处理与自身 requestId 匹配的消息，并保证每个请求最多产生一个终止结果。

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::messaging::{
    ContentPort, PortRequest, PortResponse, RuntimeConnector, SELECTION_TRANSLATION_PORT,
};
use crate::translation::error::{TranslationError, TranslationResult};

/// 弹窗翻译被中断时的提示
pub const SELECTION_INTERRUPTED_MESSAGE: &str = "Translation was interrupted. Please try again.";
/// 整页翻译被中断时的提示
pub const PAGE_INTERRUPTED_MESSAGE: &str = "Translation interrupted. Try again.";
/// 后台没有给出原因时的失败提示
pub const DEFAULT_FAILURE_MESSAGE: &str = "Translation failed. Please check your settings.";

/// 处理一条消息后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// 不属于当前请求，或请求已结束
    Ignore,
    /// 新增的流式内容
    Append(String),
    /// 成功，携带最终内容
    Success(String),
    Error(String),
    /// 终止消息到达前通道已断开
    Interrupted,
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_) | Self::Interrupted)
    }
}

#[derive(Debug, Clone)]
pub struct PortExchange {
    request_id: String,
    aggregated: String,
    settled: bool,
}

impl PortExchange {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            aggregated: String::new(),
            settled: false,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn aggregated(&self) -> &str {
        &self.aggregated
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn on_message(&mut self, message: &PortResponse) -> Step {
        if self.settled || message.request_id() != self.request_id {
            return Step::Ignore;
        }

        match message {
            PortResponse::Chunk {
                content,
                done,
                error,
                ..
            } => {
                if let Some(error) = error {
                    return self.finish(Step::Error(non_empty_or_default(error)));
                }

                let delta = content.as_deref().unwrap_or_default();
                self.aggregated.push_str(delta);

                if done.unwrap_or(false) {
                    let content = self.aggregated.clone();
                    return self.finish(Step::Success(content));
                }
                if delta.is_empty() {
                    Step::Ignore
                } else {
                    Step::Append(delta.to_string())
                }
            }
            PortResponse::Complete { content, .. } => {
                let content = match content {
                    Some(content) if !content.is_empty() => content.clone(),
                    _ => self.aggregated.clone(),
                };
                self.finish(Step::Success(content))
            }
            PortResponse::Error { message, .. } => {
                self.finish(Step::Error(non_empty_or_default(message)))
            }
        }
    }

    pub fn on_disconnect(&mut self) -> Step {
        if self.settled {
            return Step::Ignore;
        }
        self.finish(Step::Interrupted)
    }

    fn finish(&mut self, step: Step) -> Step {
        self.settled = true;
        step
    }
}

/// requestId 生成器：`{prefix}-{毫秒时间戳}-{序号}`
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    sequence: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, prefix: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), sequence)
    }
}

fn non_empty_or_default(message: &str) -> String {
    if message.trim().is_empty() {
        DEFAULT_FAILURE_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

/// 通过独立端口翻译一段文本，等待终止结果
///
/// 失败时错误文本即后台给出的原因；通道中断返回 `Interrupted`。
pub async fn translate_segment_via_port(
    connector: &dyn RuntimeConnector,
    request_id: String,
    text: &str,
    target_language: &str,
    preserve_placeholders: bool,
) -> TranslationResult<String> {
    let mut port: ContentPort = connector.connect(SELECTION_TRANSLATION_PORT).map_err(|e| {
        tracing::debug!("无法连接翻译端口: {}", e);
        TranslationError::ChannelError(
            "Unable to start page translation. Check your connection.".to_string(),
        )
    })?;

    let mut exchange = PortExchange::new(request_id.clone());
    let start = PortRequest::Start {
        request_id,
        text: text.to_string(),
        target_language: target_language.to_string(),
        source_language: Some("auto".to_string()),
        preserve_placeholders: preserve_placeholders.then_some(true),
    };
    if let Err(e) = port.post_message(start) {
        tracing::debug!("发送整页翻译请求失败: {}", e);
        return Err(TranslationError::ChannelError(
            "Unable to start page translation.".to_string(),
        ));
    }

    loop {
        let step = match port.recv().await {
            Some(message) => exchange.on_message(&message),
            None => exchange.on_disconnect(),
        };

        match step {
            Step::Ignore | Step::Append(_) => continue,
            Step::Success(content) => {
                port.disconnect();
                return Ok(content);
            }
            Step::Error(message) => {
                port.disconnect();
                return Err(TranslationError::ProcessingError(message));
            }
            Step::Interrupted => {
                return Err(TranslationError::Interrupted(
                    PAGE_INTERRUPTED_MESSAGE.to_string(),
                ))
            }
        }
    }
}
