//! 端口与运行时消息格式
//!
//! 所有消息以 `type` 字段区分，字段名使用 camelCase，与扩展页面之间的 JSON 格式一致。

use serde::{Deserialize, Serialize};

/// 划词翻译端口名称
pub const SELECTION_TRANSLATION_PORT: &str = "lingotrans:selection-translation";

/// 侧边栏待翻译内容在本地存储中的键
pub const SIDE_PANEL_TRANSLATE_STORAGE_KEY: &str = "lingotrans:sidepanel:pending-translation";

/// 内容脚本发往后台的端口消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortRequest {
    #[serde(rename = "selection:translate:start", rename_all = "camelCase")]
    Start {
        request_id: String,
        text: String,
        target_language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preserve_placeholders: Option<bool>,
    },
    #[serde(rename = "selection:translate:cancel", rename_all = "camelCase")]
    Cancel { request_id: String },
}

impl PortRequest {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Start { request_id, .. } | Self::Cancel { request_id } => request_id,
        }
    }
}

/// 后台发往内容脚本的端口消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortResponse {
    #[serde(rename = "selection:translate:chunk", rename_all = "camelCase")]
    Chunk {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        done: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "selection:translate:complete", rename_all = "camelCase")]
    Complete {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    #[serde(rename = "selection:translate:error", rename_all = "camelCase")]
    Error { request_id: String, message: String },
}

impl PortResponse {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Chunk { request_id, .. }
            | Self::Complete { request_id, .. }
            | Self::Error { request_id, .. } => request_id,
        }
    }

    /// 是否为终止消息
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Chunk { done, error, .. } => done.unwrap_or(false) || error.is_some(),
            Self::Complete { .. } | Self::Error { .. } => true,
        }
    }
}

/// 划词翻译的展示方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Popup,
    Sidepanel,
}

/// 整页翻译的展示方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    Inline,
    Sidepanel,
}

/// 侧边栏翻译内容的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSource {
    Selection,
    Page,
}

/// 交给侧边栏的翻译内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePanelPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    pub source: PayloadSource,
    /// 毫秒时间戳
    pub timestamp: i64,
}

/// 单次投递、无需回复的运行时消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeMessage {
    #[serde(rename = "openSidePanel", rename_all = "camelCase")]
    OpenSidePanel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<i64>,
    },
    #[serde(rename = "context:translate:selection", rename_all = "camelCase")]
    ContextTranslateSelection {
        mode: SelectionMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    #[serde(rename = "context:translate:page", rename_all = "camelCase")]
    ContextTranslatePage {
        mode: PageMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_language: Option<String>,
    },
    #[serde(rename = "sidepanel:translate:request")]
    SidePanelTranslateRequest(SidePanelPayload),
}
