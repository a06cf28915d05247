//! 翻译设置模块
//!
//! 设置由外部存储层持久化，这里只定义核心需要的形状、默认值、清洗与校验，
//! 以及从设置推导出提供商连接配置的逻辑。

pub mod languages;
pub mod manager;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::types::{ProtocolType, ProviderConfig};
use crate::translation::error::{TranslationError, TranslationResult};

pub use languages::{is_known_language, resolve_language_label, SUPPORTED_LANGUAGES};
pub use manager::{FileSettingsStore, MemorySettingsStore, SettingsStore, SettingsSubscription};

/// 设置常量
pub mod constants {
    pub const SETTINGS_STORAGE_KEY: &str = "lingo-trans:settings";
    pub const DEFAULT_TARGET_LANGUAGE: &str = "en";
    pub const DEFAULT_POPUP_TIMEOUT_SECONDS: f64 = 8.0;
    pub const MAX_POPUP_TIMEOUT_SECONDS: f64 = 300.0;

    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com/v1";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lingo-trans.toml",
        ".lingo-trans.toml",
        "~/.config/lingo-trans/settings.toml",
    ];
}

/// 模型提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "self-hosted")]
    SelfHosted,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 3] = [
        ModelProvider::OpenAi,
        ModelProvider::Claude,
        ModelProvider::SelfHosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::Claude => "claude",
            ModelProvider::SelfHosted => "self-hosted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

/// 选中文本后的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SelectionBehavior {
    /// 显示浮动翻译按钮
    #[default]
    #[serde(rename = "float-icon")]
    FloatIcon,
    /// 选中即翻译
    #[serde(rename = "auto-translate")]
    AutoTranslate,
    #[serde(rename = "off")]
    Off,
}

impl SelectionBehavior {
    pub const ALL: [SelectionBehavior; 3] = [
        SelectionBehavior::FloatIcon,
        SelectionBehavior::AutoTranslate,
        SelectionBehavior::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionBehavior::FloatIcon => "float-icon",
            SelectionBehavior::AutoTranslate => "auto-translate",
            SelectionBehavior::Off => "off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == value)
    }
}

/// 扩展设置
///
/// 请求开始时捕获一份快照，请求过程中外部更新不会影响已经在途的请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub openai_api_key: String,
    pub claude_api_key: String,
    pub self_hosted_host: String,
    pub self_hosted_api_key: String,
    pub model_provider: ModelProvider,
    pub model: String,
    pub custom_headers: BTreeMap<String, String>,
    pub selection_behavior: SelectionBehavior,
    pub default_target_language: String,
    pub popup_timeout_seconds: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            claude_api_key: String::new(),
            self_hosted_host: String::new(),
            self_hosted_api_key: String::new(),
            model_provider: ModelProvider::OpenAi,
            model: String::new(),
            custom_headers: BTreeMap::new(),
            selection_behavior: SelectionBehavior::FloatIcon,
            default_target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            popup_timeout_seconds: constants::DEFAULT_POPUP_TIMEOUT_SECONDS,
        }
    }
}

impl Settings {
    /// 请求未指定目标语言时使用的语言
    pub fn effective_target_language<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested.map(str::trim) {
            Some(lang) if !lang.is_empty() => lang,
            _ if !self.default_target_language.is_empty() => &self.default_target_language,
            _ => constants::DEFAULT_TARGET_LANGUAGE,
        }
    }

    /// 弹窗自动隐藏时间（毫秒），0 表示不自动隐藏
    pub fn popup_timeout_ms(&self) -> u64 {
        (self.popup_timeout_seconds.max(0.0) * 1000.0) as u64
    }
}

/// 按键名查找字段，忽略大小写以及 `_`/`-` 分隔符
fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    if let Some(found) = object.get(name) {
        return Some(found);
    }

    let normalize = |key: &str| -> String {
        key.chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect()
    };
    let wanted = normalize(name);
    object
        .iter()
        .find(|(key, _)| normalize(key) == wanted)
        .map(|(_, v)| v)
}

fn trimmed_string(value: &Value, name: &str) -> String {
    field(value, name)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// 清洗自定义请求头
pub fn sanitize_custom_headers(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut next = BTreeMap::new();
    let Some(Value::Object(map)) = value else {
        return next;
    };

    for (key, raw) in map {
        let trimmed_key = key.trim();
        if trimmed_key.is_empty() {
            continue;
        }

        match raw {
            Value::String(s) => {
                next.insert(trimmed_key.to_string(), s.clone());
            }
            Value::Number(n) => {
                next.insert(trimmed_key.to_string(), n.to_string());
            }
            Value::Bool(b) => {
                next.insert(trimmed_key.to_string(), b.to_string());
            }
            Value::Null => {
                next.insert(trimmed_key.to_string(), String::new());
            }
            _ => {}
        }
    }

    next
}

/// 把任意存储值清洗为合法设置，无法识别的字段回落到默认值
pub fn sanitize_settings(value: &Value) -> Settings {
    let defaults = Settings::default();
    if !value.is_object() {
        return defaults;
    }

    let model_provider = field(value, "modelProvider")
        .and_then(Value::as_str)
        .and_then(ModelProvider::parse)
        .unwrap_or(defaults.model_provider);

    let selection_behavior = field(value, "selectionBehavior")
        .and_then(Value::as_str)
        .and_then(SelectionBehavior::parse)
        .unwrap_or(defaults.selection_behavior);

    let default_target_language = field(value, "defaultTargetLanguage")
        .and_then(Value::as_str)
        .filter(|code| is_known_language(code))
        .map(str::to_string)
        .unwrap_or(defaults.default_target_language);

    let popup_timeout_raw = match field(value, "popupTimeoutSeconds") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let popup_timeout_seconds = match popup_timeout_raw {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            secs.min(constants::MAX_POPUP_TIMEOUT_SECONDS)
        }
        _ => defaults.popup_timeout_seconds,
    };

    Settings {
        openai_api_key: trimmed_string(value, "openaiApiKey"),
        claude_api_key: trimmed_string(value, "claudeApiKey"),
        self_hosted_host: trimmed_string(value, "selfHostedHost"),
        self_hosted_api_key: trimmed_string(value, "selfHostedApiKey"),
        model_provider,
        model: trimmed_string(value, "model"),
        custom_headers: sanitize_custom_headers(field(value, "customHeaders")),
        selection_behavior,
        default_target_language,
        popup_timeout_seconds,
    }
}

/// 在发起任何网络请求前校验设置
pub fn validate_settings(settings: &Settings) -> TranslationResult<()> {
    if settings.model.is_empty() {
        return Err(TranslationError::ConfigError(
            "No model selected. Please configure a model in Settings.".to_string(),
        ));
    }

    match settings.model_provider {
        ModelProvider::OpenAi if settings.openai_api_key.is_empty() => {
            Err(TranslationError::ConfigError(
                "OpenAI API key is required. Please configure it in Settings.".to_string(),
            ))
        }
        ModelProvider::Claude if settings.claude_api_key.is_empty() => {
            Err(TranslationError::ConfigError(
                "Claude API key is required. Please configure it in Settings.".to_string(),
            ))
        }
        ModelProvider::SelfHosted if settings.self_hosted_host.is_empty() => {
            Err(TranslationError::ConfigError(
                "Self-hosted host URL is required. Please configure it in Settings.".to_string(),
            ))
        }
        ModelProvider::SelfHosted => url::Url::parse(&settings.self_hosted_host)
            .map(|_| ())
            .map_err(|e| {
                TranslationError::ConfigError(format!(
                    "Self-hosted host URL is invalid ({}). Please fix it in Settings.",
                    e
                ))
            }),
        _ => Ok(()),
    }
}

/// 由设置推导提供商连接配置
pub fn create_provider_config(settings: &Settings) -> ProviderConfig {
    let (base_url, api_key) = match settings.model_provider {
        ModelProvider::OpenAi => (
            constants::OPENAI_BASE_URL.to_string(),
            settings.openai_api_key.clone(),
        ),
        ModelProvider::Claude => (
            constants::CLAUDE_BASE_URL.to_string(),
            settings.claude_api_key.clone(),
        ),
        ModelProvider::SelfHosted => (
            settings.self_hosted_host.trim_end_matches('/').to_string(),
            settings.self_hosted_api_key.clone(),
        ),
    };

    ProviderConfig {
        provider: settings.model_provider,
        base_url,
        api_key,
        model: settings.model.clone(),
        protocol: ProtocolType::Chat,
        custom_headers: settings.custom_headers.clone(),
    }
}
