//! # 内容脚本模块
//!
//! 页面一侧的翻译逻辑：
//!
//! - `exchange` - 单个请求的端口交互状态机
//! - `controller` - 每个翻译界面的请求控制器
//! - `selection_flow` - 选区快照到翻译动作的映射

pub mod controller;
pub mod exchange;
pub mod selection_flow;

pub use controller::{
    LastRequest, TranslateTrigger, TranslationPhase, TranslationRequestController,
    TranslationSurface,
};
pub use exchange::{
    translate_segment_via_port, PortExchange, RequestIdGenerator, Step, DEFAULT_FAILURE_MESSAGE,
    PAGE_INTERRUPTED_MESSAGE, SELECTION_INTERRUPTED_MESSAGE,
};
pub use selection_flow::{
    FlowAction, RuntimeMessenger, SelectionButton, SelectionState, SelectionTranslationFlow,
    NO_SELECTION_MESSAGE,
};
