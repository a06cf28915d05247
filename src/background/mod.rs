//! # 后台模块
//!
//! 扩展后台进程的两部分职责：
//!
//! - `handler` - 划词翻译端口协议，按连接管理请求生命周期
//! - `panel` - 侧边栏开关、右键菜单与运行时消息

pub mod handler;
pub mod panel;

pub use handler::{ConnectionSummary, PortProtocolHandler, ServeReport};
pub use panel::{
    BackgroundService, ContextMenuClick, ContextMenuItem, ExtensionHost, MessageSender,
    OpenTarget, PanelSession, PanelStateStore, SidePanelTarget, TabId, TabInfo, WindowId,
    CONTEXT_MENU_ITEMS, CONTEXT_MENU_PAGE_INLINE, CONTEXT_MENU_PAGE_SIDEPANEL,
    CONTEXT_MENU_SELECTION_POPUP, CONTEXT_MENU_SELECTION_SIDEPANEL, SIDE_PANEL_PATH,
};
