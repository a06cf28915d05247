//! 侧边栏与右键菜单
//!
//! 浏览器扩展接口通过 `ExtensionHost` 注入；每个窗口的侧边栏开关状态保存在
//! `PanelStateStore` 中，由 `BackgroundService` 持有。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::messaging::{
    PageMode, PayloadSource, RuntimeMessage, SelectionMode, SidePanelPayload,
    SIDE_PANEL_TRANSLATE_STORAGE_KEY,
};
use crate::translation::error::TranslationResult;

pub type TabId = i64;
pub type WindowId = i64;

/// 侧边栏页面路径
pub const SIDE_PANEL_PATH: &str = "sidepanel.html";

pub const CONTEXT_MENU_SELECTION_POPUP: &str = "lingotrans:context:selection:popup";
pub const CONTEXT_MENU_SELECTION_SIDEPANEL: &str = "lingotrans:context:selection:sidepanel";
pub const CONTEXT_MENU_PAGE_INLINE: &str = "lingotrans:context:page:inline";
pub const CONTEXT_MENU_PAGE_SIDEPANEL: &str = "lingotrans:context:page:sidepanel";

/// 右键菜单项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMenuItem {
    pub id: &'static str,
    pub title: &'static str,
    pub contexts: &'static [&'static str],
}

pub const CONTEXT_MENU_ITEMS: [ContextMenuItem; 4] = [
    ContextMenuItem {
        id: CONTEXT_MENU_SELECTION_POPUP,
        title: "Translate selection",
        contexts: &["selection"],
    },
    ContextMenuItem {
        id: CONTEXT_MENU_SELECTION_SIDEPANEL,
        title: "Translate selection in side panel",
        contexts: &["selection"],
    },
    ContextMenuItem {
        id: CONTEXT_MENU_PAGE_INLINE,
        title: "Translate page",
        contexts: &["page"],
    },
    ContextMenuItem {
        id: CONTEXT_MENU_PAGE_SIDEPANEL,
        title: "Translate page in side panel",
        contexts: &["page"],
    },
];

/// 事件携带的标签页信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabInfo {
    pub id: Option<TabId>,
    pub window_id: Option<WindowId>,
}

/// 运行时消息的发送方
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSender {
    pub tab: Option<TabInfo>,
}

/// 右键菜单点击信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMenuClick {
    pub menu_item_id: String,
    pub selection_text: Option<String>,
}

/// 打开侧边栏的目标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidePanelTarget {
    pub tab_id: Option<TabId>,
    pub window_id: Option<WindowId>,
}

impl SidePanelTarget {
    /// 标签页与窗口都未知时返回 `None`
    pub fn from_tab(tab: Option<&TabInfo>) -> Option<Self> {
        let tab_id = tab.and_then(|t| t.id);
        let window_id = tab.and_then(|t| t.window_id);
        if tab_id.is_none() && window_id.is_none() {
            return None;
        }
        Some(Self { tab_id, window_id })
    }
}

/// `open_side_panel` 的参数，窗口优先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget {
    Window(WindowId),
    Tab(TabId),
}

/// 浏览器扩展接口
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    async fn open_side_panel(&self, target: OpenTarget) -> TranslationResult<()>;

    /// 为标签页启用（带页面路径）或禁用侧边栏
    async fn set_panel_options(&self, tab_id: TabId, enabled: bool) -> TranslationResult<()>;

    async fn set_panel_behavior(&self, open_on_action_click: bool) -> TranslationResult<()>;

    async fn remove_all_context_menus(&self) -> TranslationResult<()>;

    async fn create_context_menu(&self, item: &ContextMenuItem) -> TranslationResult<()>;

    async fn send_tab_message(&self, tab_id: TabId, message: &RuntimeMessage) -> TranslationResult<()>;

    async fn storage_set(&self, key: &str, value: Value) -> TranslationResult<()>;

    /// 向扩展内所有页面广播运行时消息
    async fn broadcast(&self, message: &RuntimeMessage) -> TranslationResult<()>;
}

/// 单个窗口的侧边栏状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelSession {
    pub opened: bool,
    pub last_tab_id: Option<TabId>,
}

/// 按窗口记录侧边栏是否处于打开状态
///
/// 浏览器没有提供查询侧边栏状态的接口，这里记录的是最后一次开关的结果。
#[derive(Debug, Default)]
pub struct PanelStateStore {
    sessions: DashMap<WindowId, PanelSession>,
}

impl PanelStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, window_id: WindowId) -> Option<PanelSession> {
        self.sessions.get(&window_id).map(|entry| *entry.value())
    }

    pub fn set(&self, window_id: WindowId, session: PanelSession) {
        self.sessions.insert(window_id, session);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 后台服务：处理扩展按钮、运行时消息和右键菜单
pub struct BackgroundService<H> {
    host: Arc<H>,
    panels: Arc<PanelStateStore>,
}

impl<H: ExtensionHost> BackgroundService<H> {
    pub fn new(host: Arc<H>, panels: Arc<PanelStateStore>) -> Self {
        Self { host, panels }
    }

    pub fn panels(&self) -> &PanelStateStore {
        &self.panels
    }

    /// 安装或启动时调用：设置按钮行为并注册右键菜单
    pub async fn initialize(&self) {
        if let Err(e) = self.host.set_panel_behavior(true).await {
            tracing::debug!("无法设置侧边栏按钮行为: {}", e);
        }
        self.register_context_menus().await;
    }

    /// 切换或强制打开侧边栏，返回侧边栏最终是否打开
    pub async fn open_side_panel_for_target(
        &self,
        target: Option<SidePanelTarget>,
        force_open: bool,
    ) -> bool {
        let window_id = target.and_then(|t| t.window_id);
        let existing = window_id.and_then(|id| self.panels.get(id));
        let candidate_tab = target
            .and_then(|t| t.tab_id)
            .or_else(|| existing.and_then(|s| s.last_tab_id));

        if !force_open && existing.is_some_and(|s| s.opened) {
            if let Some(tab_id) = candidate_tab {
                self.configure_tab(tab_id, false).await;
            }
            if let Some(window_id) = window_id {
                self.panels.set(
                    window_id,
                    PanelSession {
                        opened: false,
                        last_tab_id: candidate_tab,
                    },
                );
            }
            return false;
        }

        if let Some(tab_id) = candidate_tab {
            self.configure_tab(tab_id, true).await;
        }

        let open_target = match (window_id, candidate_tab) {
            (Some(window_id), _) => OpenTarget::Window(window_id),
            (None, Some(tab_id)) => OpenTarget::Tab(tab_id),
            (None, None) => {
                tracing::debug!("缺少打开侧边栏所需的目标信息");
                return false;
            }
        };

        if let Some(window_id) = window_id {
            self.panels.set(
                window_id,
                PanelSession {
                    opened: true,
                    last_tab_id: candidate_tab,
                },
            );
        }

        let opened = match self.host.open_side_panel(open_target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("打开侧边栏失败: {}", e);
                false
            }
        };

        if let Some(window_id) = window_id {
            self.panels.set(
                window_id,
                PanelSession {
                    opened,
                    last_tab_id: candidate_tab,
                },
            );
        }

        opened
    }

    async fn configure_tab(&self, tab_id: TabId, enabled: bool) {
        if let Err(e) = self.host.set_panel_options(tab_id, enabled).await {
            tracing::debug!("配置标签页 {} 的侧边栏失败: {}", tab_id, e);
        }
    }

    /// 扩展按钮点击：切换侧边栏
    pub async fn handle_action_click(&self, tab: Option<TabInfo>) -> bool {
        self.open_side_panel_for_target(SidePanelTarget::from_tab(tab.as_ref()), false)
            .await
    }

    /// 处理单次运行时消息，目前只响应打开侧边栏请求
    pub async fn handle_runtime_message(&self, message: &RuntimeMessage, sender: &MessageSender) -> bool {
        let RuntimeMessage::OpenSidePanel { tab_id } = message else {
            return false;
        };

        let tab_id = tab_id.or_else(|| sender.tab.and_then(|t| t.id));
        let window_id = sender.tab.and_then(|t| t.window_id);
        let target = SidePanelTarget::from_tab(Some(&TabInfo {
            id: tab_id,
            window_id,
        }));
        self.open_side_panel_for_target(target, false).await
    }

    /// 右键菜单点击
    pub async fn handle_context_menu_click(&self, info: &ContextMenuClick, tab: Option<TabInfo>) {
        let tab_id = tab.and_then(|t| t.id);
        let target = SidePanelTarget::from_tab(tab.as_ref());
        let selection_text = info.selection_text.clone().unwrap_or_default();

        match info.menu_item_id.as_str() {
            CONTEXT_MENU_SELECTION_POPUP => {
                if let Some(tab_id) = tab_id {
                    let message = RuntimeMessage::ContextTranslateSelection {
                        mode: SelectionMode::Popup,
                        text: Some(selection_text),
                    };
                    self.send_to_tab(tab_id, &message).await;
                }
            }
            CONTEXT_MENU_SELECTION_SIDEPANEL => {
                if !selection_text.trim().is_empty() {
                    self.start_side_panel_translation(target, selection_text, PayloadSource::Selection)
                        .await;
                }
            }
            CONTEXT_MENU_PAGE_INLINE => {
                if let Some(tab_id) = tab_id {
                    let message = RuntimeMessage::ContextTranslatePage {
                        mode: PageMode::Inline,
                        target_language: None,
                    };
                    self.send_to_tab(tab_id, &message).await;
                }
            }
            CONTEXT_MENU_PAGE_SIDEPANEL => {
                let text = selection_text.trim().to_string();
                self.start_side_panel_translation(target, text, PayloadSource::Page)
                    .await;
            }
            other => tracing::debug!("未知菜单项: {}", other),
        }
    }

    async fn send_to_tab(&self, tab_id: TabId, message: &RuntimeMessage) {
        if let Err(e) = self.host.send_tab_message(tab_id, message).await {
            tracing::debug!("向标签页 {} 发送消息失败: {}", tab_id, e);
        }
    }

    /// 重建右键菜单，单项失败不影响其他项
    pub async fn register_context_menus(&self) {
        if let Err(e) = self.host.remove_all_context_menus().await {
            tracing::debug!("清理旧菜单失败: {}", e);
        }
        for item in CONTEXT_MENU_ITEMS.iter() {
            if let Err(e) = self.host.create_context_menu(item).await {
                tracing::debug!("创建菜单项 {} 失败: {}", item.id, e);
            }
        }
    }

    /// 保存并广播侧边栏待翻译内容，同时强制打开侧边栏
    pub async fn start_side_panel_translation(
        &self,
        target: Option<SidePanelTarget>,
        text: String,
        source: PayloadSource,
    ) -> bool {
        let payload = SidePanelPayload {
            text,
            target_language: None,
            source,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let deliver = async {
            match serde_json::to_value(&payload) {
                Ok(value) => {
                    if let Err(e) = self.host.storage_set(SIDE_PANEL_TRANSLATE_STORAGE_KEY, value).await {
                        tracing::debug!("保存侧边栏内容失败: {}", e);
                    }
                }
                Err(e) => tracing::debug!("序列化侧边栏内容失败: {}", e),
            }

            let message = RuntimeMessage::SidePanelTranslateRequest(payload.clone());
            if let Err(e) = self.host.broadcast(&message).await {
                // 侧边栏尚未打开时没有接收方
                if !e.to_string().contains("Could not establish connection") {
                    tracing::debug!("广播侧边栏内容失败: {}", e);
                }
            }
        };

        let (opened, ()) = tokio::join!(self.open_side_panel_for_target(target, true), deliver);
        opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::error::TranslationError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open(OpenTarget),
        Options(TabId, bool),
        Behavior(bool),
        Menu(&'static str),
        TabMessage(TabId, RuntimeMessage),
        Storage(String),
        Broadcast,
    }

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<Call>>,
        fail_open: bool,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ExtensionHost for RecordingHost {
        async fn open_side_panel(&self, target: OpenTarget) -> TranslationResult<()> {
            self.record(Call::Open(target));
            if self.fail_open {
                return Err(TranslationError::ChannelError("no user gesture".into()));
            }
            Ok(())
        }

        async fn set_panel_options(&self, tab_id: TabId, enabled: bool) -> TranslationResult<()> {
            self.record(Call::Options(tab_id, enabled));
            Ok(())
        }

        async fn set_panel_behavior(&self, open_on_action_click: bool) -> TranslationResult<()> {
            self.record(Call::Behavior(open_on_action_click));
            Ok(())
        }

        async fn remove_all_context_menus(&self) -> TranslationResult<()> {
            Err(TranslationError::ChannelError("menus unavailable".into()))
        }

        async fn create_context_menu(&self, item: &ContextMenuItem) -> TranslationResult<()> {
            self.record(Call::Menu(item.id));
            Ok(())
        }

        async fn send_tab_message(&self, tab_id: TabId, message: &RuntimeMessage) -> TranslationResult<()> {
            self.record(Call::TabMessage(tab_id, message.clone()));
            Ok(())
        }

        async fn storage_set(&self, key: &str, _value: Value) -> TranslationResult<()> {
            self.record(Call::Storage(key.to_string()));
            Ok(())
        }

        async fn broadcast(&self, _message: &RuntimeMessage) -> TranslationResult<()> {
            self.record(Call::Broadcast);
            Err(TranslationError::ChannelError(
                "Could not establish connection. Receiving end does not exist.".into(),
            ))
        }
    }

    fn service(host: RecordingHost) -> (BackgroundService<RecordingHost>, Arc<RecordingHost>) {
        let host = Arc::new(host);
        (
            BackgroundService::new(host.clone(), Arc::new(PanelStateStore::new())),
            host,
        )
    }

    const TAB: TabInfo = TabInfo {
        id: Some(7),
        window_id: Some(1),
    };

    #[tokio::test]
    async fn test_action_click_toggles_panel() {
        let (service, host) = service(RecordingHost::default());

        assert!(service.handle_action_click(Some(TAB)).await);
        assert_eq!(
            service.panels().get(1),
            Some(PanelSession {
                opened: true,
                last_tab_id: Some(7)
            })
        );

        assert!(!service.handle_action_click(Some(TAB)).await);
        assert_eq!(service.panels().get(1).map(|s| s.opened), Some(false));
        assert_eq!(
            host.calls(),
            vec![
                Call::Options(7, true),
                Call::Open(OpenTarget::Window(1)),
                Call::Options(7, false)
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_open_is_recorded_as_closed() {
        let (service, _host) = service(RecordingHost {
            fail_open: true,
            ..RecordingHost::default()
        });
        assert!(!service.handle_action_click(Some(TAB)).await);
        assert_eq!(service.panels().get(1).map(|s| s.opened), Some(false));
    }

    #[tokio::test]
    async fn test_missing_target_does_nothing() {
        let (service, host) = service(RecordingHost::default());
        assert!(!service.handle_action_click(None).await);
        assert!(host.calls().is_empty());
        assert!(service.panels().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_message_prefers_explicit_tab() {
        let (service, host) = service(RecordingHost::default());
        let sender = MessageSender { tab: None };
        let opened = service
            .handle_runtime_message(&RuntimeMessage::OpenSidePanel { tab_id: Some(3) }, &sender)
            .await;

        assert!(opened);
        assert_eq!(
            host.calls(),
            vec![Call::Options(3, true), Call::Open(OpenTarget::Tab(3))]
        );
    }

    #[tokio::test]
    async fn test_context_menu_routes() {
        let (service, host) = service(RecordingHost::default());
        let click = |id: &str, text: &str| ContextMenuClick {
            menu_item_id: id.to_string(),
            selection_text: Some(text.to_string()),
        };

        service
            .handle_context_menu_click(&click(CONTEXT_MENU_SELECTION_POPUP, "hi"), Some(TAB))
            .await;
        service
            .handle_context_menu_click(&click(CONTEXT_MENU_SELECTION_SIDEPANEL, "  "), Some(TAB))
            .await;
        service
            .handle_context_menu_click(&click(CONTEXT_MENU_PAGE_INLINE, ""), None)
            .await;

        assert_eq!(
            host.calls(),
            vec![Call::TabMessage(
                7,
                RuntimeMessage::ContextTranslateSelection {
                    mode: SelectionMode::Popup,
                    text: Some("hi".into())
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_side_panel_translation_persists_broadcasts_and_force_opens() {
        let (service, host) = service(RecordingHost::default());
        service.panels().set(
            1,
            PanelSession {
                opened: true,
                last_tab_id: Some(7),
            },
        );

        let click = ContextMenuClick {
            menu_item_id: CONTEXT_MENU_SELECTION_SIDEPANEL.to_string(),
            selection_text: Some("Bonjour".to_string()),
        };
        service.handle_context_menu_click(&click, Some(TAB)).await;

        let calls = host.calls();
        assert!(calls.contains(&Call::Storage(SIDE_PANEL_TRANSLATE_STORAGE_KEY.to_string())));
        assert!(calls.contains(&Call::Broadcast));
        assert!(calls.contains(&Call::Open(OpenTarget::Window(1))));
        assert_eq!(service.panels().get(1).map(|s| s.opened), Some(true));
    }

    #[tokio::test]
    async fn test_register_menus_survives_remove_failure() {
        let (service, host) = service(RecordingHost::default());
        service.register_context_menus().await;
        assert_eq!(
            host.calls(),
            CONTEXT_MENU_ITEMS
                .iter()
                .map(|item| Call::Menu(item.id))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_initialize_sets_action_behavior_then_menus() {
        let (service, host) = service(RecordingHost::default());
        service.initialize().await;

        let mut expected = vec![Call::Behavior(true)];
        expected.extend(CONTEXT_MENU_ITEMS.iter().map(|item| Call::Menu(item.id)));
        assert_eq!(host.calls(), expected);
        assert!(service.panels().is_empty());
    }
}
