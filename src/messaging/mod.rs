//! # 消息模块
//!
//! 内容脚本与后台之间的通信：
//!
//! - `protocol` - 端口消息与运行时消息的 JSON 格式
//! - `port` - 进程内双向端口与连接器

pub mod port;
pub mod protocol;

pub use port::{
    channel, BackgroundPort, ContentPort, InProcessRuntime, Port, PortSender, RuntimeConnector,
};
pub use protocol::{
    PageMode, PayloadSource, PortRequest, PortResponse, RuntimeMessage, SelectionMode,
    SidePanelPayload, SELECTION_TRANSLATION_PORT, SIDE_PANEL_TRANSLATE_STORAGE_KEY,
};
