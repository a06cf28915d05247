//! # LingoTrans Library
//!
//! 浏览器扩展划词翻译与整页翻译的核心逻辑，与具体浏览器 API 解耦。
//!
//! ## 模块组织
//!
//! - `selection` - 选区检测（防抖、长度校验、可编辑区域过滤）
//! - `content` - 内容脚本一侧的请求控制器与划词流程
//! - `messaging` - 端口协议与运行时消息
//! - `background` - 后台端口处理器、侧边栏与右键菜单
//! - `translation` - 设置、提示词、LLM 翻译器与整页翻译管道
//! - `network` - LLM 提供商 HTTP 客户端与流式解析
//! - `parsers` - HTML 解析、占位符序列化与重建
//! - `env` - 环境变量与日志初始化

pub mod background;
pub mod content;
pub mod env;
pub mod messaging;
pub mod network;
pub mod parsers;
pub mod selection;
pub mod translation;

pub use translation::{TranslationError, TranslationResult};
