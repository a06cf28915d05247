//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。跨越端口边界时只传递 `to_string()` 的文本，
//! 不传递结构化的错误码。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 认证失败（401/403）
    #[error("{message}")]
    Auth { message: String, status: u16 },

    /// 速率限制（429），可能带有服务端给出的等待秒数
    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// 请求无效（400/422）
    #[error("{message}")]
    InvalidRequest { message: String, status: u16 },

    /// 服务端错误（5xx 及其他未分类状态）
    #[error("{message}")]
    ServerError { message: String, status: u16 },

    /// 网络错误
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 超时错误
    #[error("Request timed out: {0}")]
    TimeoutError(String),

    /// 通道在终止消息到达之前关闭
    #[error("{0}")]
    Interrupted(String),

    /// 请求被主动取消
    #[error("Request aborted")]
    Aborted,

    /// 配置错误（缺少模型、API Key 等）
    #[error("{0}")]
    ConfigError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 端口/通道错误
    #[error("{0}")]
    ChannelError(String),

    /// DOM 重建错误
    #[error("重建错误: {0}")]
    ReconstructionError(String),

    /// 处理错误
    #[error("{0}")]
    ProcessingError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::RateLimit { .. } => true,
            TranslationError::ServerError { .. } => true,
            TranslationError::NetworkError(_) => true,
            TranslationError::Auth { .. } => false,
            TranslationError::InvalidRequest { .. } => false,
            TranslationError::TimeoutError(_) => false,
            TranslationError::Interrupted(_) => false,
            TranslationError::Aborted => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::ChannelError(_) => false,
            TranslationError::ReconstructionError(_) => false,
            TranslationError::ProcessingError(_) => false,
        }
    }

    /// 服务端要求的等待秒数（仅速率限制错误）
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TranslationError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP 状态码（仅 HTTP 分类错误）
    pub fn status(&self) -> Option<u16> {
        match self {
            TranslationError::Auth { status, .. }
            | TranslationError::InvalidRequest { status, .. }
            | TranslationError::ServerError { status, .. } => Some(*status),
            TranslationError::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// 是否为主动取消
    pub fn is_aborted(&self) -> bool {
        matches!(self, TranslationError::Aborted)
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::Aborted => ErrorSeverity::Info,
            TranslationError::ConfigError(_) => ErrorSeverity::Info,
            TranslationError::RateLimit { .. } => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::Interrupted(_) => ErrorSeverity::Warning,
            TranslationError::ChannelError(_) => ErrorSeverity::Warning,
            TranslationError::Auth { .. } => ErrorSeverity::Error,
            TranslationError::InvalidRequest { .. } => ErrorSeverity::Error,
            TranslationError::ServerError { .. } => ErrorSeverity::Error,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::ProcessingError(_) => ErrorSeverity::Error,
            TranslationError::ReconstructionError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::Auth { .. } => ErrorCategory::Auth,
            TranslationError::RateLimit { .. } => ErrorCategory::RateLimit,
            TranslationError::InvalidRequest { .. } => ErrorCategory::InvalidRequest,
            TranslationError::ServerError { .. } => ErrorCategory::Server,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::Interrupted(_) => ErrorCategory::Interrupted,
            TranslationError::Aborted => ErrorCategory::Aborted,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::ChannelError(_) => ErrorCategory::Channel,
            TranslationError::ReconstructionError(_) => ErrorCategory::Dom,
            TranslationError::ProcessingError(_) => ErrorCategory::Processing,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        match &mut self {
            TranslationError::Auth { message, .. }
            | TranslationError::RateLimit { message, .. }
            | TranslationError::InvalidRequest { message, .. }
            | TranslationError::ServerError { message, .. } => {
                *message = format!("{} ({})", message, context);
            }
            TranslationError::NetworkError(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::Interrupted(msg)
            | TranslationError::ConfigError(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::ChannelError(msg)
            | TranslationError::ReconstructionError(msg)
            | TranslationError::ProcessingError(msg) => {
                *msg = format!("{} ({})", msg, context);
            }
            TranslationError::Aborted => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    InvalidRequest,
    Server,
    Network,
    Timeout,
    Interrupted,
    Aborted,
    Configuration,
    Parsing,
    Serialization,
    Channel,
    Dom,
    Processing,
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(error.to_string())
        } else if error.is_decode() {
            TranslationError::ParseError(error.to_string())
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::ProcessingError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::SerializationError(format!("TOML序列化错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(format!("配置错误: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 创建网络错误
    pub fn network_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::NetworkError(msg.to_string())
    }
}
