//! HTML解析和处理模块
//!
//! - `utils`: 标签分类常量
//! - `dom`: 基础DOM操作
//! - `placeholders`: 行内标记占位符的序列化与重建
//! - `serializer`: 序列化功能

pub mod dom;
pub mod placeholders;
pub mod serializer;
pub mod utils;

pub use dom::{
    append_child, create_element, create_text_node, find_nodes, get_node_attr, get_node_attrs,
    get_node_name, html_to_dom, inner_text, replace_children, replace_run,
};
pub use placeholders::{
    build_fragment, reconstruct_html_from_translation, reconstruct_run_from_translation,
    serialize_nodes_with_placeholders, serialize_with_placeholders, PlaceholderSegment, TokenMap,
    TokenMeta,
};
pub use serializer::{serialize_children, serialize_document};
pub use utils::{is_block_tag, is_preserve_tag, is_skip_tag, BLOCK_TAGS, PRESERVE_TAGS, SKIP_TAGS};
