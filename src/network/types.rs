//! 提供商 API 的请求、响应与流式数据类型

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::translation::config::ModelProvider;

/// 接口协议：chat-completions 或 responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    #[default]
    Chat,
    Responses,
}

impl ProtocolType {
    /// 相对于 base URL 的请求路径
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            ProtocolType::Chat => "chat/completions",
            ProtocolType::Responses => "responses",
        }
    }
}

/// 提供商连接配置
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider: ModelProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub protocol: ProtocolType,
    pub custom_headers: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// 拼接 base URL 与路径，去掉多余的斜杠
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// 一次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub prompt: String,
    pub model: String,
    pub stream: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ApiRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;

    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            stream: false,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 补全结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// 流式增量
///
/// 只有 `done=true` 或带有 `error` 的块才是终止块。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            error: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            content: String::new(),
            done: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            done: true,
            error: Some(message.into()),
        }
    }
}

/// 模型信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub created: Option<i64>,
    pub description: Option<String>,
}

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub ok: bool,
    pub message: String,
}

/// 线上格式
pub(crate) mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize)]
    pub struct ChatMessage<'a> {
        pub role: &'static str,
        pub content: &'a str,
    }

    #[derive(Debug, Serialize)]
    pub struct ChatRequest<'a> {
        pub model: &'a str,
        pub messages: Vec<ChatMessage<'a>>,
        pub stream: bool,
        pub temperature: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
    }

    #[derive(Debug, Serialize)]
    pub struct ResponsesRequest<'a> {
        pub model: &'a str,
        pub input: &'a str,
        pub stream: bool,
        pub temperature: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct CompletionResponse {
        #[serde(default)]
        pub model: Option<String>,
        #[serde(default)]
        pub choices: Vec<Choice>,
        #[serde(default)]
        pub usage: Option<Usage>,
        /// responses 风格的聚合文本
        #[serde(default)]
        pub output_text: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Choice {
        #[serde(default)]
        pub message: Option<Message>,
        #[serde(default)]
        pub text: Option<String>,
        #[serde(default)]
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Message {
        #[serde(default)]
        pub content: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Usage {
        #[serde(default)]
        pub prompt_tokens: u64,
        #[serde(default)]
        pub completion_tokens: u64,
        #[serde(default)]
        pub total_tokens: u64,
    }

    #[derive(Debug, Deserialize)]
    pub struct ModelList {
        #[serde(default)]
        pub data: Vec<ModelEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ModelEntry {
        pub id: String,
        #[serde(default)]
        pub created: Option<i64>,
        #[serde(default)]
        pub description: Option<String>,
    }
}
