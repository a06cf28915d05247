use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, TendrilSink};
use html5ever::tree_builder::create_element as build_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::utils::SKIP_TAGS;

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default()).one(s.as_str())
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let Some((node_name, rest)) = node_names.split_first() else {
        return Vec::new();
    };

    let mut found_nodes = Vec::new();
    let matches = get_node_name(node) == Some(*node_name);

    if matches && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    let next = if matches && !rest.is_empty() { rest } else { node_names };
    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, next));
    }

    found_nodes
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 按文档顺序获取元素的全部属性
pub fn get_node_attrs(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 创建游离的元素节点
pub fn create_element(dom: &RcDom, tag: &str, attrs: &[(String, String)]) -> Handle {
    let attributes = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name.as_str())),
            value: format_tendril!("{}", value),
        })
        .collect();

    build_element(
        dom,
        QualName::new(None, ns!(html), LocalName::from(tag)),
        attributes,
    )
}

/// 创建游离的文本节点
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(text.into()),
    })
}

/// 追加子节点并维护父指针
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 整体替换元素的子节点
pub fn replace_children(parent: &Handle, children: Vec<Handle>) {
    for old in parent.children.borrow().iter() {
        old.parent.set(None);
    }
    parent.children.borrow_mut().clear();
    for child in children {
        append_child(parent, child);
    }
}

/// 把父节点中一段连续的子节点替换为新节点
///
/// `run` 必须按顺序连续出现在 `parent` 的当前子节点中，否则不做修改并返回 `false`。
pub fn replace_run(parent: &Handle, run: &[Handle], replacement: Vec<Handle>) -> bool {
    let Some(first) = run.first() else {
        return false;
    };

    let mut children = parent.children.borrow_mut();
    let Some(start) = children.iter().position(|child| Rc::ptr_eq(child, first)) else {
        return false;
    };
    let end = start + run.len();
    if end > children.len()
        || !children[start..end]
            .iter()
            .zip(run)
            .all(|(current, expected)| Rc::ptr_eq(current, expected))
    {
        return false;
    }

    for old in &children[start..end] {
        old.parent.set(None);
    }
    for node in &replacement {
        node.parent.set(Some(Rc::downgrade(parent)));
    }
    children.splice(start..end, replacement);
    true
}

/// 渲染文本：跳过脚本等非内容元素，`<br>` 输出为换行
pub fn inner_text(node: &Handle) -> String {
    let mut output = String::new();
    collect_text(node, &mut output);
    output
}

fn collect_text(node: &Handle, output: &mut String) {
    match &node.data {
        NodeData::Text { contents } => output.push_str(&contents.borrow()),
        NodeData::Element { name, .. } => {
            let tag = name.local.as_ref();
            if SKIP_TAGS.contains(&tag) {
                return;
            }
            if tag == "br" {
                output.push('\n');
                return;
            }
            for child in node.children.borrow().iter() {
                collect_text(child, output);
            }
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, output);
            }
        }
        _ => {}
    }
}
