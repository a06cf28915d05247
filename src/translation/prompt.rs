//! 提示词构造
//!
//! 把翻译/改写请求渲染成发送给模型的单条用户消息。

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::translation::config::resolve_language_label;

/// 翻译请求
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
    pub source_language: Option<String>,
    /// 保留 HTML 标签原样
    pub preserve_html: bool,
    /// 保留 `[[tN]]` 占位符原样
    pub preserve_placeholders: bool,
    pub glossary: BTreeMap<String, String>,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_language: target_language.into(),
            ..Self::default()
        }
    }
}

/// 改写语气
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Formal,
    Casual,
    Concise,
}

impl Tone {
    fn instruction(&self) -> &'static str {
        match self {
            Tone::Neutral => "Maintain a neutral tone.",
            Tone::Formal => "Use formal, professional language.",
            Tone::Casual => "Use casual, friendly language.",
            Tone::Concise => "Make it concise and to the point.",
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Tone::Neutral),
            "formal" => Ok(Tone::Formal),
            "casual" => Ok(Tone::Casual),
            "concise" => Ok(Tone::Concise),
            other => Err(format!("unknown tone '{}'", other)),
        }
    }
}

/// 改写请求
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewritingRequest {
    pub text: String,
    pub target_language: String,
    pub tone: Tone,
}

fn label_for(code: &str) -> String {
    resolve_language_label(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

/// 构造翻译提示词
pub fn build_translation_prompt(request: &TranslationRequest) -> String {
    let target_label = label_for(&request.target_language);
    let source_label = request
        .source_language
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty() && *code != "auto")
        .map(label_for);

    let mut prompt = format!("Translate the following text to {}", target_label);
    if let Some(source) = source_label {
        let _ = write!(prompt, " (from {})", source);
    }
    prompt.push_str(".\n\n");

    if request.preserve_html {
        prompt.push_str(
            "IMPORTANT: Preserve all HTML tags and attributes exactly as they are. Only translate the text content between tags.\n\n",
        );
    }

    if request.preserve_placeholders {
        prompt.push_str(
            "IMPORTANT: The text contains placeholder markers such as [[t1]] and [[/t1]]. Keep every marker exactly as written, keep each pair around the words it wraps, and do not add or remove markers.\n\n",
        );
    }

    prompt.push_str("Instructions:\n");
    prompt.push_str("- Maintain the original meaning, tone, and punctuation\n");
    prompt.push_str("- Do not add explanations or comments\n");
    prompt.push_str("- Output only the translated text\n");

    if !request.glossary.is_empty() {
        prompt.push_str("\nGlossary (use these exact translations):\n");
        for (term, translation) in &request.glossary {
            let _ = writeln!(prompt, "- {} → {}", term, translation);
        }
    }

    let _ = write!(prompt, "\nText to translate:\n{}", request.text);
    prompt
}

/// 构造改写提示词
pub fn build_rewriting_prompt(request: &RewritingRequest) -> String {
    format!(
        "Rewrite the following text in {}.\n\n{}\n\nInstructions:\n- Preserve the original facts and meaning\n- Do not add explanations or comments\n- Output only the rewritten text\n\nText to rewrite:\n{}",
        label_for(&request.target_language),
        request.tone.instruction(),
        request.text
    )
}
