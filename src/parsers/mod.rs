//! # 解析器模块
//!
//! 页面翻译需要的 HTML 解析、DOM 操作与序列化功能。
//!
//! # 模块组织
//!
//! - `html` - HTML文档解析、DOM操作、占位符序列化与重建

pub mod html;

pub use html::{html_to_dom, serialize_document};
