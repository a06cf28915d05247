//! 行内标记占位符
//!
//! 段落序列化时把需要保留的行内元素替换为成对的 `[[tN]]` / `[[/tN]]` 标记，
//! 并在 token 表中记录标签名与属性；译文返回后按标记重建 DOM 片段。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

use super::dom::{
    append_child, create_element, create_text_node, get_node_attrs, replace_children, replace_run,
};
use super::utils::{is_preserve_tag, is_skip_tag};
use crate::translation::error::{TranslationError, TranslationResult};

/// 被替换元素的标签与属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMeta {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

/// token id（如 `t0`）到元素信息的映射
pub type TokenMap = BTreeMap<String, TokenMeta>;

/// 序列化结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaceholderSegment {
    pub text: String,
    pub token_map: TokenMap,
}

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"\[\[(/?)t(\d+)]]").expect("placeholder pattern is valid"))
}

/// 把元素的子树序列化为带占位符的纯文本
pub fn serialize_with_placeholders(element: &Handle) -> PlaceholderSegment {
    serialize_nodes_with_placeholders(&element.children.borrow())
}

/// 序列化一组相邻的兄弟节点，token 从 `t0` 开始编号
pub fn serialize_nodes_with_placeholders(nodes: &[Handle]) -> PlaceholderSegment {
    let mut segment = PlaceholderSegment::default();
    let mut counter = 0usize;

    for node in nodes {
        walk(node, &mut segment, &mut counter);
    }

    segment
}

fn walk(node: &Handle, segment: &mut PlaceholderSegment, counter: &mut usize) {
    match &node.data {
        NodeData::Text { contents } => segment.text.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            let tag = name.local.as_ref();
            if is_skip_tag(tag) {
                return;
            }

            if is_preserve_tag(tag) {
                let token_id = format!("t{}", counter);
                *counter += 1;
                segment.token_map.insert(
                    token_id.clone(),
                    TokenMeta {
                        tag: tag.to_string(),
                        attrs: get_node_attrs(node),
                    },
                );

                segment.text.push_str(&format!("[[{}]]", token_id));
                for child in node.children.borrow().iter() {
                    walk(child, segment, counter);
                }
                segment.text.push_str(&format!("[[/{}]]", token_id));
                return;
            }

            if tag == "br" {
                segment.text.push('\n');
                return;
            }

            for child in node.children.borrow().iter() {
                walk(child, segment, counter);
            }
        }
        _ => {}
    }
}

/// 按占位符构建游离的 DOM 片段
///
/// 未登记的 token 按原文输出；没有对应开标记的闭标记被丢弃。
pub fn build_fragment(dom: &RcDom, translated: &str, token_map: &TokenMap) -> Vec<Handle> {
    let mut fragment: Vec<Handle> = Vec::new();
    let mut stack: Vec<(String, Handle)> = Vec::new();
    let mut last_index = 0;

    let append = |fragment: &mut Vec<Handle>, stack: &[(String, Handle)], node: Handle| match stack.last() {
        Some((_, parent)) => append_child(parent, node),
        None => fragment.push(node),
    };

    for captures in token_regex().captures_iter(translated) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        let plain = &translated[last_index..whole.start()];
        if !plain.is_empty() {
            append(&mut fragment, &stack, create_text_node(plain));
        }
        last_index = whole.end();

        let is_closing = captures.get(1).map(|m| m.as_str() == "/").unwrap_or(false);
        let key = format!("t{}", captures.get(2).map(|m| m.as_str()).unwrap_or_default());

        let Some(meta) = token_map.get(&key) else {
            append(&mut fragment, &stack, create_text_node(whole.as_str()));
            continue;
        };

        if is_closing {
            if let Some(position) = stack.iter().rposition(|(open, _)| *open == key) {
                stack.truncate(position);
            }
        } else {
            let element = create_element(dom, &meta.tag, &meta.attrs);
            append(&mut fragment, &stack, element.clone());
            stack.push((key, element));
        }
    }

    let rest = &translated[last_index..];
    if !rest.is_empty() {
        append(&mut fragment, &stack, create_text_node(rest));
    }

    fragment
}

/// 用译文重建元素内容，整体替换原有子节点
pub fn reconstruct_html_from_translation(
    dom: &RcDom,
    target: &Handle,
    translated: &str,
    token_map: &TokenMap,
) -> TranslationResult<()> {
    if !matches!(target.data, NodeData::Element { .. }) {
        return Err(TranslationError::ReconstructionError(
            "target is not an element".to_string(),
        ));
    }

    let fragment = build_fragment(dom, translated, token_map);
    replace_children(target, fragment);
    Ok(())
}

/// 用译文替换父节点中的一段行内节点
pub fn reconstruct_run_from_translation(
    dom: &RcDom,
    parent: &Handle,
    run: &[Handle],
    translated: &str,
    token_map: &TokenMap,
) -> TranslationResult<()> {
    let fragment = build_fragment(dom, translated, token_map);
    if replace_run(parent, run, fragment) {
        Ok(())
    } else {
        Err(TranslationError::ReconstructionError(
            "inline run is no longer attached to its parent".to_string(),
        ))
    }
}
