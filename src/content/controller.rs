//! 翻译请求控制器
//!
//! 每个翻译界面（例如一个弹窗）拥有一个控制器，同一时间最多只有一个进行中的端口连接。
//!
//! ```text
//! Idle → Connecting → Streaming → Success | Error | Interrupted
//!            └────────────┴──→ Cancelled
//! ```
//!
//! 端口消息在独立任务中处理；任务与 `cancel` 通过共享的结束标记竞争，
//! 保证每个请求只产生一次终止通知，`cancel` 返回后界面不再收到任何通知。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::exchange::{PortExchange, RequestIdGenerator, Step, SELECTION_INTERRUPTED_MESSAGE};
use crate::messaging::{
    ContentPort, PortRequest, PortSender, RuntimeConnector, SELECTION_TRANSLATION_PORT,
};
use crate::translation::config::resolve_language_label;

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationPhase {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Success,
    Error,
    Interrupted,
    Cancelled,
}

impl TranslationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Interrupted)
    }
}

/// 触发翻译的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateTrigger {
    Manual,
    Auto,
    Retry,
}

/// 翻译结果的展示界面
pub trait TranslationSurface: Send + Sync {
    /// 开始新请求，界面应清空旧内容
    fn on_loading(&self, trigger: TranslateTrigger, target_label: &str);
    fn on_append(&self, content: &str);
    /// `content` 是最终的完整译文
    fn on_success(&self, content: &str, elapsed: Duration);
    fn on_error(&self, message: &str);
    fn on_interrupted(&self, message: &str);
}

/// 最近一次请求，用于重试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastRequest {
    pub text: String,
    pub target_language: String,
}

/// 请求结束标记
///
/// 界面通知都在持锁期间发出。
#[derive(Default)]
struct SettleGate {
    settled: Mutex<bool>,
}

impl SettleGate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.settled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 请求未结束时执行 `notify`
    fn while_pending(&self, notify: impl FnOnce()) {
        let settled = self.lock();
        if !*settled {
            notify();
        }
    }

    /// 标记结束并执行 `notify`；已经结束时返回 `false`
    fn settle(&self, notify: impl FnOnce()) -> bool {
        let mut settled = self.lock();
        if *settled {
            return false;
        }
        *settled = true;
        notify();
        true
    }
}

struct ActiveTranslation {
    request_id: String,
    sender: PortSender<PortRequest>,
    settled: Arc<SettleGate>,
    detach: CancellationToken,
    task: Option<JoinHandle<()>>,
}

pub struct TranslationRequestController {
    connector: Arc<dyn RuntimeConnector>,
    surface: Arc<dyn TranslationSurface>,
    ids: Arc<RequestIdGenerator>,
    phase: Arc<watch::Sender<TranslationPhase>>,
    active: Option<ActiveTranslation>,
    last_request: Option<LastRequest>,
}

impl TranslationRequestController {
    pub fn new(
        connector: Arc<dyn RuntimeConnector>,
        surface: Arc<dyn TranslationSurface>,
        ids: Arc<RequestIdGenerator>,
    ) -> Self {
        let (phase, _) = watch::channel(TranslationPhase::Idle);
        Self {
            connector,
            surface,
            ids,
            phase: Arc::new(phase),
            active: None,
            last_request: None,
        }
    }

    pub fn phase(&self) -> TranslationPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TranslationPhase> {
        self.phase.subscribe()
    }

    /// 当前跟踪的 requestId
    pub fn active_request_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.request_id.as_str())
    }

    pub fn last_request(&self) -> Option<&LastRequest> {
        self.last_request.as_ref()
    }

    /// 开始翻译，先取消当前请求；返回新请求的 requestId
    pub fn start_translation(
        &mut self,
        text: &str,
        target_language: &str,
        trigger: TranslateTrigger,
    ) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.last_request = Some(LastRequest {
            text: text.to_string(),
            target_language: target_language.to_string(),
        });
        self.cancel();

        let target_label = resolve_language_label(target_language).unwrap_or(target_language);
        self.surface.on_loading(trigger, target_label);
        self.phase.send_replace(TranslationPhase::Connecting);

        let request_id = self.ids.next("selection");
        let port = match self.connector.connect(SELECTION_TRANSLATION_PORT) {
            Ok(port) => port,
            Err(e) => {
                tracing::debug!("无法连接翻译端口: {}", e);
                self.fail("Unable to reach the translator. Please try again.");
                return None;
            }
        };

        let start = PortRequest::Start {
            request_id: request_id.clone(),
            text: text.to_string(),
            target_language: target_language.to_string(),
            source_language: None,
            preserve_placeholders: None,
        };
        if let Err(e) = port.post_message(start) {
            tracing::debug!("发送翻译请求失败: {}", e);
            self.fail("Unable to start translation. Please check your settings.");
            return None;
        }
        self.phase.send_replace(TranslationPhase::Streaming);

        let settled = Arc::new(SettleGate::default());
        let detach = CancellationToken::new();
        let sender = port.sender();
        let task = tokio::spawn(drive(
            port,
            PortExchange::new(request_id.clone()),
            Arc::clone(&settled),
            detach.clone(),
            Arc::clone(&self.surface),
            Arc::clone(&self.phase),
        ));

        self.active = Some(ActiveTranslation {
            request_id: request_id.clone(),
            sender,
            settled,
            detach,
            task: Some(task),
        });
        Some(request_id)
    }

    /// 用最近一次请求重新翻译
    pub fn retry(&mut self) -> Option<String> {
        let last = self.last_request.clone()?;
        self.start_translation(&last.text, &last.target_language, TranslateTrigger::Retry)
    }

    /// 取消进行中的请求，不向界面发送终止通知
    ///
    /// 请求已结束或没有请求时什么也不做，返回 `false`。
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        let was_pending = active.settled.settle(|| {});
        active.detach.cancel();

        if was_pending {
            let cancel = PortRequest::Cancel {
                request_id: active.request_id.clone(),
            };
            if let Err(e) = active.sender.post_message(cancel) {
                tracing::debug!("发送取消消息失败: {}", e);
            }
            self.phase.send_replace(TranslationPhase::Cancelled);
        }

        was_pending
    }

    /// 等待当前请求的处理任务结束
    pub async fn wait_settled(&mut self) {
        let Some(task) = self.active.as_mut().and_then(|active| active.task.take()) else {
            return;
        };
        if let Err(e) = task.await {
            tracing::warn!("翻译任务异常退出: {}", e);
        }
    }

    fn fail(&self, message: &str) {
        self.phase.send_replace(TranslationPhase::Error);
        self.surface.on_error(message);
    }
}

impl Drop for TranslationRequestController {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 处理单个请求的端口消息，直到终止或被取消
async fn drive(
    mut port: ContentPort,
    mut exchange: PortExchange,
    settled: Arc<SettleGate>,
    detach: CancellationToken,
    surface: Arc<dyn TranslationSurface>,
    phase: Arc<watch::Sender<TranslationPhase>>,
) {
    let started = Instant::now();

    loop {
        let step = tokio::select! {
            biased;
            _ = detach.cancelled() => break,
            message = port.recv() => match message {
                Some(message) => exchange.on_message(&message),
                None => exchange.on_disconnect(),
            },
        };

        match step {
            Step::Ignore => continue,
            Step::Append(content) => settled.while_pending(|| surface.on_append(&content)),
            terminal => {
                // 与 cancel 竞争，只有先设置标记的一方生效
                settled.settle(|| match terminal {
                    Step::Success(content) => {
                        phase.send_replace(TranslationPhase::Success);
                        surface.on_success(&content, started.elapsed());
                    }
                    Step::Error(message) => {
                        phase.send_replace(TranslationPhase::Error);
                        surface.on_error(&message);
                    }
                    _ => {
                        phase.send_replace(TranslationPhase::Interrupted);
                        surface.on_interrupted(SELECTION_INTERRUPTED_MESSAGE);
                    }
                });
                break;
            }
        }
    }

    port.disconnect();
}
