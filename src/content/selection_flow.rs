//! 划词翻译流程
//!
//! 根据设置中的 `selectionBehavior` 把选区快照映射为显示悬浮按钮或自动翻译，
//! 并处理右键菜单触发的翻译、重试和打开侧边栏。

use std::sync::Arc;

use async_trait::async_trait;

use super::controller::{TranslateTrigger, TranslationRequestController, TranslationSurface};
use crate::messaging::{PageMode, RuntimeMessage, SelectionMode};
use crate::selection::{Rect, SelectionHost, SelectionSnapshot};
use crate::translation::config::{SelectionBehavior, Settings};
use crate::translation::error::TranslationResult;

/// 右键菜单翻译时没有选中文本的提示
pub const NO_SELECTION_MESSAGE: &str = "Highlight text before translating via the context menu.";

/// 选区旁的悬浮翻译按钮
pub trait SelectionButton: Send + Sync {
    fn show(&self, rect: &Rect);
    fn hide(&self);
}

/// 向后台发送单次运行时消息
#[async_trait]
pub trait RuntimeMessenger: Send + Sync {
    async fn send_message(&self, message: RuntimeMessage) -> TranslationResult<()>;
}

/// 当前可翻译的选区
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionState {
    pub text: String,
    pub rect: Rect,
}

/// 处理运行时消息后需要调用方继续执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    None,
    /// 已开始划词翻译
    Started(String),
    OpenedSidePanel,
    /// 需要在页面 DOM 上执行整页翻译
    TranslatePage { target_language: Option<String> },
}

pub struct SelectionTranslationFlow {
    controller: TranslationRequestController,
    surface: Arc<dyn TranslationSurface>,
    button: Arc<dyn SelectionButton>,
    host: Arc<dyn SelectionHost>,
    messenger: Arc<dyn RuntimeMessenger>,
    settings: Settings,
    selection: Option<SelectionState>,
}

impl SelectionTranslationFlow {
    pub fn new(
        controller: TranslationRequestController,
        surface: Arc<dyn TranslationSurface>,
        button: Arc<dyn SelectionButton>,
        host: Arc<dyn SelectionHost>,
        messenger: Arc<dyn RuntimeMessenger>,
        settings: Settings,
    ) -> Self {
        Self {
            controller,
            surface,
            button,
            host,
            messenger,
            settings,
            selection: None,
        }
    }

    pub fn controller(&self) -> &TranslationRequestController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut TranslationRequestController {
        &mut self.controller
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn selection(&self) -> Option<&SelectionState> {
        self.selection.as_ref()
    }

    /// 设置变更；关闭划词功能时立即隐藏按钮
    pub fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings;
        if self.settings.selection_behavior == SelectionBehavior::Off {
            self.button.hide();
        }
    }

    fn target_language(&self) -> String {
        self.settings.effective_target_language(None).to_string()
    }

    /// 处理选区快照，自动翻译时返回新请求的 requestId
    pub fn handle_snapshot(&mut self, snapshot: &SelectionSnapshot) -> Option<String> {
        let rect = match snapshot.rect {
            Some(rect) if snapshot.is_text() => rect,
            _ => {
                self.selection = None;
                self.button.hide();
                return None;
            }
        };

        if self.settings.selection_behavior == SelectionBehavior::Off {
            self.selection = None;
            self.button.hide();
            return None;
        }

        self.selection = Some(SelectionState {
            text: snapshot.text.clone(),
            rect,
        });

        match self.settings.selection_behavior {
            SelectionBehavior::AutoTranslate => {
                let target = self.target_language();
                self.button.hide();
                self.controller
                    .start_translation(&snapshot.text, &target, TranslateTrigger::Auto)
            }
            _ => {
                self.button.show(&rect);
                None
            }
        }
    }

    /// 悬浮按钮点击
    pub fn on_button_click(&mut self) -> Option<String> {
        let text = self.selection.as_ref()?.text.clone();
        let target = self.target_language();
        self.button.hide();
        self.controller
            .start_translation(&text, &target, TranslateTrigger::Manual)
    }

    pub fn retry(&mut self) -> Option<String> {
        self.controller.retry()
    }

    /// 关闭弹窗：取消进行中的翻译
    pub fn close_popup(&mut self) {
        self.controller.cancel();
    }

    /// 右键菜单触发的划词翻译，优先使用菜单携带的文本
    pub fn translate_context_selection(&mut self, explicit_text: Option<&str>) -> Option<String> {
        let text = match explicit_text {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => self
                .host
                .read_selection()
                .map(|selection| selection.text.trim().to_string())
                .unwrap_or_default(),
        };

        if text.is_empty() {
            self.surface.on_error(NO_SELECTION_MESSAGE);
            return None;
        }

        let target = self.target_language();
        self.controller
            .start_translation(&text, &target, TranslateTrigger::Manual)
    }

    /// 请求后台打开侧边栏，失败只记录日志
    pub async fn open_side_panel(&self) -> bool {
        match self
            .messenger
            .send_message(RuntimeMessage::OpenSidePanel { tab_id: None })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("请求打开侧边栏失败: {}", e);
                false
            }
        }
    }

    /// 处理后台发来的运行时消息
    pub async fn handle_runtime_message(&mut self, message: &RuntimeMessage) -> FlowAction {
        match message {
            RuntimeMessage::ContextTranslateSelection { mode, text } => match mode {
                SelectionMode::Popup => match self.translate_context_selection(text.as_deref()) {
                    Some(request_id) => FlowAction::Started(request_id),
                    None => FlowAction::None,
                },
                SelectionMode::Sidepanel => {
                    self.open_side_panel().await;
                    FlowAction::OpenedSidePanel
                }
            },
            RuntimeMessage::ContextTranslatePage {
                mode,
                target_language,
            } => match mode {
                PageMode::Inline => FlowAction::TranslatePage {
                    target_language: target_language.clone(),
                },
                PageMode::Sidepanel => {
                    self.open_side_panel().await;
                    FlowAction::OpenedSidePanel
                }
            },
            _ => FlowAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::RequestIdGenerator;
    use crate::messaging::InProcessRuntime;
    use crate::selection::{FrameHandle, RawSelection, SelectionKind};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Ui {
        events: Mutex<Vec<String>>,
    }

    impl Ui {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl TranslationSurface for Ui {
        fn on_loading(&self, trigger: TranslateTrigger, label: &str) {
            self.push(format!("loading:{:?}:{}", trigger, label));
        }
        fn on_append(&self, _content: &str) {}
        fn on_success(&self, _content: &str, _elapsed: Duration) {}
        fn on_error(&self, message: &str) {
            self.push(format!("error:{}", message));
        }
        fn on_interrupted(&self, _message: &str) {}
    }

    impl SelectionButton for Ui {
        fn show(&self, _rect: &Rect) {
            self.push("button:show".into());
        }
        fn hide(&self) {
            self.push("button:hide".into());
        }
    }

    #[async_trait]
    impl RuntimeMessenger for Ui {
        async fn send_message(&self, message: RuntimeMessage) -> TranslationResult<()> {
            self.push(format!("runtime:{:?}", message));
            Ok(())
        }
    }

    struct NoSelection;

    impl SelectionHost for NoSelection {
        fn read_selection(&self) -> Option<RawSelection> {
            None
        }
        fn register_listeners(&self) {}
        fn unregister_listeners(&self) {}
        fn request_animation_frame(&self) -> FrameHandle {
            FrameHandle(0)
        }
        fn cancel_animation_frame(&self, _handle: FrameHandle) {}
    }

    fn flow(behavior: SelectionBehavior) -> (SelectionTranslationFlow, Arc<Ui>, InProcessRuntime) {
        let ui = Arc::new(Ui::default());
        let (runtime, _incoming) = InProcessRuntime::new();
        let controller = TranslationRequestController::new(
            Arc::new(runtime.clone()),
            ui.clone(),
            Arc::new(RequestIdGenerator::new()),
        );
        let settings = Settings {
            selection_behavior: behavior,
            ..Settings::default()
        };
        let flow = SelectionTranslationFlow::new(
            controller,
            ui.clone(),
            ui.clone(),
            Arc::new(NoSelection),
            ui.clone(),
            settings,
        );
        (flow, ui, runtime)
    }

    fn text_snapshot(text: &str) -> SelectionSnapshot {
        SelectionSnapshot {
            kind: SelectionKind::Text,
            text: text.to_string(),
            rect: Some(Rect::new(0.0, 0.0, 40.0, 12.0)),
            range: None,
        }
    }

    #[tokio::test]
    async fn test_float_icon_shows_button() {
        let (mut flow, ui, _runtime) = flow(SelectionBehavior::FloatIcon);
        assert!(flow.handle_snapshot(&text_snapshot("Hello")).is_none());
        assert_eq!(flow.selection().map(|s| s.text.as_str()), Some("Hello"));

        flow.handle_snapshot(&SelectionSnapshot::none());
        assert!(flow.selection().is_none());
        assert_eq!(*ui.events.lock().unwrap(), vec!["button:show", "button:hide"]);
    }

    #[tokio::test]
    async fn test_off_behavior_ignores_selection() {
        let (mut flow, ui, _runtime) = flow(SelectionBehavior::Off);
        assert!(flow.handle_snapshot(&text_snapshot("Hello")).is_none());
        assert!(flow.selection().is_none());
        assert_eq!(*ui.events.lock().unwrap(), vec!["button:hide"]);
    }

    #[tokio::test]
    async fn test_context_selection_without_text_reports_error() {
        let (mut flow, ui, _runtime) = flow(SelectionBehavior::FloatIcon);
        let action = flow
            .handle_runtime_message(&RuntimeMessage::ContextTranslateSelection {
                mode: SelectionMode::Popup,
                text: Some("  ".into()),
            })
            .await;

        assert_eq!(action, FlowAction::None);
        assert_eq!(
            ui.events.lock().unwrap().last().cloned(),
            Some(format!("error:{}", NO_SELECTION_MESSAGE))
        );
    }

    #[tokio::test]
    async fn test_page_messages_map_to_actions() {
        let (mut flow, ui, _runtime) = flow(SelectionBehavior::FloatIcon);
        let inline = flow
            .handle_runtime_message(&RuntimeMessage::ContextTranslatePage {
                mode: PageMode::Inline,
                target_language: Some("ja".into()),
            })
            .await;
        assert_eq!(
            inline,
            FlowAction::TranslatePage {
                target_language: Some("ja".into())
            }
        );

        let side = flow
            .handle_runtime_message(&RuntimeMessage::ContextTranslatePage {
                mode: PageMode::Sidepanel,
                target_language: None,
            })
            .await;
        assert_eq!(side, FlowAction::OpenedSidePanel);
        assert!(ui.events.lock().unwrap()[0].starts_with("runtime:OpenSidePanel"));
    }

    #[tokio::test]
    async fn test_turning_off_hides_button() {
        let (mut flow, ui, _runtime) = flow(SelectionBehavior::FloatIcon);
        flow.apply_settings(Settings {
            selection_behavior: SelectionBehavior::Off,
            ..Settings::default()
        });
        assert_eq!(*ui.events.lock().unwrap(), vec!["button:hide"]);
    }
}
