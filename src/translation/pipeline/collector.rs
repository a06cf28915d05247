//! 段落收集器
//!
//! 从 DOM 中找出需要翻译的块级元素，并把每个块序列化为带占位符的段落文本。

use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::parsers::html::{
    get_node_attr, get_node_name, inner_text, is_block_tag, is_skip_tag,
    reconstruct_html_from_translation, reconstruct_run_from_translation, replace_children,
    serialize_nodes_with_placeholders, serialize_with_placeholders, TokenMap,
};
use crate::translation::error::TranslationResult;

/// 一个可翻译的块
#[derive(Debug, Clone)]
pub struct BlockPayload {
    /// 块元素；行内片段时为片段所在的父元素
    pub element: Handle,
    /// 与块级子元素相邻的一段行内节点，整块时为空
    pub run: Vec<Handle>,
    /// 翻译前的子节点，用于回滚
    pub original_children: Vec<Handle>,
    pub segment: String,
    pub token_map: TokenMap,
}

impl BlockPayload {
    /// 把译文写回 DOM
    pub fn apply(&self, dom: &RcDom, translated: &str) -> TranslationResult<()> {
        if self.run.is_empty() {
            reconstruct_html_from_translation(dom, &self.element, translated, &self.token_map)
        } else {
            reconstruct_run_from_translation(
                dom,
                &self.element,
                &self.run,
                translated,
                &self.token_map,
            )
        }
    }

    /// 恢复翻译前的子节点
    pub fn restore(&self) {
        replace_children(&self.element, self.original_children.clone());
    }
}

/// 按文档顺序收集可翻译的块
///
/// 含有其他块级元素的元素不整体收集：其内部的块各自收集，
/// 块之间的文本与行内元素按连续片段收集，重建时互不覆盖。
pub fn collect_blocks(root: &Handle) -> Vec<BlockPayload> {
    let mut blocks = Vec::new();
    visit(root, &mut blocks);
    blocks
}

/// 回滚已翻译的块
pub fn restore_original_blocks<'a>(blocks: impl IntoIterator<Item = &'a BlockPayload>) {
    for block in blocks {
        block.restore();
    }
}

fn visit(node: &Handle, blocks: &mut Vec<BlockPayload>) {
    match node.data {
        NodeData::Document => {}
        NodeData::Element { .. } => {
            if is_excluded(node) {
                return;
            }
            if contains_block(node) {
                visit_mixed(node, blocks);
                return;
            }
            if get_node_name(node).is_some_and(is_block_tag) {
                blocks.extend(block_payload(node));
                return;
            }
        }
        _ => return,
    }

    for child in node.children.borrow().iter() {
        visit(child, blocks);
    }
}

/// 子节点中既有块又有行内内容
fn visit_mixed(parent: &Handle, blocks: &mut Vec<BlockPayload>) {
    let children = parent.children.borrow().clone();
    let mut run: Vec<Handle> = Vec::new();

    for child in &children {
        let breaks_run = matches!(child.data, NodeData::Element { .. })
            && (is_excluded(child)
                || get_node_name(child).is_some_and(is_block_tag)
                || contains_block(child));
        if breaks_run {
            blocks.extend(run_payload(parent, &children, std::mem::take(&mut run)));
            visit(child, blocks);
        } else {
            run.push(child.clone());
        }
    }
    blocks.extend(run_payload(parent, &children, run));
}

/// 脚本类元素、文档头或显式隐藏的元素
fn is_excluded(node: &Handle) -> bool {
    if get_node_name(node)
        .is_some_and(|tag| is_skip_tag(tag) || matches!(tag, "head" | "template"))
    {
        return true;
    }
    get_node_attr(node, "hidden").is_some()
        || get_node_attr(node, "aria-hidden").is_some_and(|v| v.trim() == "true")
}

fn contains_block(node: &Handle) -> bool {
    node.children.borrow().iter().any(|child| {
        matches!(child.data, NodeData::Element { .. })
            && !is_excluded(child)
            && (get_node_name(child).is_some_and(is_block_tag) || contains_block(child))
    })
}

fn block_payload(element: &Handle) -> Option<BlockPayload> {
    if inner_text(element).trim().is_empty() {
        return None;
    }

    let segment = serialize_with_placeholders(element);
    if segment.text.trim().is_empty() {
        return None;
    }

    Some(BlockPayload {
        element: element.clone(),
        run: Vec::new(),
        original_children: element.children.borrow().clone(),
        segment: segment.text,
        token_map: segment.token_map,
    })
}

fn run_payload(parent: &Handle, siblings: &[Handle], run: Vec<Handle>) -> Option<BlockPayload> {
    if run.iter().all(|node| inner_text(node).trim().is_empty()) {
        return None;
    }

    let segment = serialize_nodes_with_placeholders(&run);
    if segment.text.trim().is_empty() {
        return None;
    }

    Some(BlockPayload {
        element: parent.clone(),
        run,
        original_children: siblings.to_vec(),
        segment: segment.text,
        token_map: segment.token_map,
    })
}
