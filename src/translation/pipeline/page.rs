//! 整页翻译
//!
//! 逐块（不并发）通过端口协议翻译，每块请求都保留占位符。任一块失败时，
//! 已经写回的块全部恢复原状，再把错误交给调用方。

use std::sync::Arc;

use markup5ever_rcdom::{Handle, RcDom};

use super::collector::{collect_blocks, restore_original_blocks, BlockPayload};
use crate::content::{translate_segment_via_port, RequestIdGenerator};
use crate::messaging::RuntimeConnector;
use crate::parsers::html::{
    create_text_node, find_nodes, html_to_dom, inner_text, replace_children, serialize_document,
};
use crate::translation::config::resolve_language_label;
use crate::translation::error::TranslationResult;

/// 进度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Loading,
    Success,
    Error,
}

/// 进度展示（页面上的浮层）
pub trait ProgressSink {
    fn update(&self, status: PageStatus, message: &str);
}

/// 不展示进度
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _status: PageStatus, _message: &str) {}
}

/// 整页翻译结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// 页面没有可读文本
    Skipped,
    /// 按块翻译，`blocks` 为实际写回的块数
    Translated { blocks: usize },
    /// 没有块级元素，整页文本被替换为译文
    FallbackText,
}

pub struct PageTranslator {
    connector: Arc<dyn RuntimeConnector>,
    ids: Arc<RequestIdGenerator>,
}

impl PageTranslator {
    pub fn new(connector: Arc<dyn RuntimeConnector>, ids: Arc<RequestIdGenerator>) -> Self {
        Self { connector, ids }
    }

    /// 翻译文档的 `<body>`
    pub async fn translate_page(
        &self,
        dom: &RcDom,
        target_language: &str,
        progress: &dyn ProgressSink,
    ) -> TranslationResult<PageOutcome> {
        let Some(body) = find_nodes(&dom.document, &["html", "body"]).into_iter().next() else {
            tracing::debug!("文档没有 body，跳过整页翻译");
            return Ok(PageOutcome::Skipped);
        };

        let blocks = collect_blocks(&body);
        let fallback_text = inner_text(&body);
        if blocks.is_empty() && fallback_text.trim().is_empty() {
            tracing::debug!("页面没有可读文本，跳过整页翻译");
            return Ok(PageOutcome::Skipped);
        }

        let target_label = resolve_language_label(target_language).unwrap_or(target_language);
        progress.update(
            PageStatus::Loading,
            &format!("Translating page to {}…", target_label),
        );

        let result = if blocks.is_empty() {
            self.translate_fallback(&body, &fallback_text, target_language)
                .await
        } else {
            self.translate_blocks(dom, &blocks, target_language, progress)
                .await
        };

        match &result {
            Ok(_) => progress.update(
                PageStatus::Success,
                &format!("Page translated to {}.", target_label),
            ),
            Err(e) => progress.update(PageStatus::Error, &e.to_string()),
        }
        result
    }

    async fn translate_fallback(
        &self,
        body: &Handle,
        text: &str,
        target_language: &str,
    ) -> TranslationResult<PageOutcome> {
        let translation = self.translate_segment(text, target_language, false).await?;
        if !translation.trim().is_empty() {
            replace_children(body, vec![create_text_node(&translation)]);
        }
        Ok(PageOutcome::FallbackText)
    }

    async fn translate_blocks(
        &self,
        dom: &RcDom,
        blocks: &[BlockPayload],
        target_language: &str,
        progress: &dyn ProgressSink,
    ) -> TranslationResult<PageOutcome> {
        let total = blocks.len();
        let mut applied: Vec<&BlockPayload> = Vec::with_capacity(total);

        for (index, block) in blocks.iter().enumerate() {
            progress.update(
                PageStatus::Loading,
                &format!("Translating section {} of {}…", index + 1, total),
            );

            match self.translate_block(dom, block, target_language).await {
                Ok(true) => applied.push(block),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("第 {} 块翻译失败，回滚 {} 块: {}", index + 1, applied.len(), e);
                    applied.push(block);
                    restore_original_blocks(applied);
                    return Err(e);
                }
            }
        }

        Ok(PageOutcome::Translated {
            blocks: applied.len(),
        })
    }

    /// 译文为空时保留原文，返回 `false`
    async fn translate_block(
        &self,
        dom: &RcDom,
        block: &BlockPayload,
        target_language: &str,
    ) -> TranslationResult<bool> {
        let translation = self
            .translate_segment(&block.segment, target_language, true)
            .await?;
        if translation.trim().is_empty() {
            return Ok(false);
        }
        block.apply(dom, &translation)?;
        Ok(true)
    }

    async fn translate_segment(
        &self,
        text: &str,
        target_language: &str,
        preserve_placeholders: bool,
    ) -> TranslationResult<String> {
        translate_segment_via_port(
            self.connector.as_ref(),
            self.ids.next("page"),
            text,
            target_language,
            preserve_placeholders,
        )
        .await
    }

    /// 解析 HTML、翻译并序列化为 UTF-8 文档
    pub async fn translate_html(
        &self,
        html: &[u8],
        charset: &str,
        target_language: &str,
        progress: &dyn ProgressSink,
    ) -> TranslationResult<(Vec<u8>, PageOutcome)> {
        let dom = html_to_dom(html, charset);
        let outcome = self.translate_page(&dom, target_language, progress).await?;
        let output = serialize_document(&dom, "utf-8")?;
        Ok((output, outcome))
    }
}
