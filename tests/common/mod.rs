// 集成测试公共模块
//
// 假翻译管道、记录型界面与进程内后台的搭建工具

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::RcDom;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lingo_trans::background::{PortProtocolHandler, ServeReport};
use lingo_trans::content::{TranslateTrigger, TranslationSurface};
use lingo_trans::messaging::InProcessRuntime;
use lingo_trans::network::{ApiResponse, StreamCallback, StreamChunk};
use lingo_trans::parsers::html::{find_nodes, serialize_children};
use lingo_trans::translation::config::{MemorySettingsStore, Settings};
use lingo_trans::translation::core::TranslationPipeline;
use lingo_trans::translation::error::{TranslationError, TranslationResult};
use lingo_trans::translation::prompt::TranslationRequest;

/// 按词流式输出的假翻译管道
///
/// - `hang` 开头的文本一直等待取消
/// - `fail` 开头的文本返回提供商错误
/// - 其他文本逐词输出 `<lang>:<word>`，每个词之间等待 `delay`
#[derive(Default)]
pub struct WordPipeline {
    pub delay: Duration,
    pub seen: Mutex<Vec<TranslationRequest>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl WordPipeline {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn seen_texts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    /// 与流式输出拼接结果一致的完整译文
    pub fn expected(text: &str, lang: &str) -> String {
        text.split_whitespace()
            .map(|word| format!("{}:{}", lang, word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl TranslationPipeline for WordPipeline {
    async fn translate(
        &self,
        _settings: &Settings,
        request: &TranslationRequest,
        signal: &CancellationToken,
        on_stream: StreamCallback<'_>,
    ) -> TranslationResult<ApiResponse> {
        self.seen.lock().unwrap().push(request.clone());

        // 被取消或任务被中止（future 被丢弃）时都会记录
        let mut guard = CancelGuard {
            sink: &self.cancelled,
            text: request.text.clone(),
            armed: true,
        };

        if request.text.starts_with("hang") {
            signal.cancelled().await;
            return Err(TranslationError::Aborted);
        }
        if request.text.starts_with("fail") {
            guard.armed = false;
            return Err(TranslationError::Auth {
                message: "Invalid API key".to_string(),
                status: 401,
            });
        }

        let words: Vec<&str> = request.text.split_whitespace().collect();
        for (index, word) in words.iter().enumerate() {
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = signal.cancelled() => return Err(TranslationError::Aborted),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            let separator = if index == 0 { "" } else { " " };
            on_stream(StreamChunk::delta(format!(
                "{}{}:{}",
                separator, request.target_language, word
            )));
        }
        on_stream(StreamChunk::finished());
        guard.armed = false;

        Ok(ApiResponse {
            content: Self::expected(&request.text, &request.target_language),
            ..ApiResponse::default()
        })
    }
}

struct CancelGuard<'a> {
    sink: &'a Mutex<Vec<String>>,
    text: String,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sink.lock().unwrap().push(std::mem::take(&mut self.text));
        }
    }
}

/// 按函数一次性给出译文的假翻译管道
pub struct MapPipeline {
    pub map: fn(&str) -> Result<String, String>,
    pub seen: Mutex<Vec<TranslationRequest>>,
}

impl MapPipeline {
    pub fn new(map: fn(&str) -> Result<String, String>) -> Self {
        Self {
            map,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<TranslationRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationPipeline for MapPipeline {
    async fn translate(
        &self,
        _settings: &Settings,
        request: &TranslationRequest,
        _signal: &CancellationToken,
        on_stream: StreamCallback<'_>,
    ) -> TranslationResult<ApiResponse> {
        self.seen.lock().unwrap().push(request.clone());
        let content = (self.map)(&request.text).map_err(TranslationError::ProcessingError)?;
        on_stream(StreamChunk::delta(content.clone()));
        on_stream(StreamChunk::finished());
        Ok(ApiResponse {
            content,
            ..ApiResponse::default()
        })
    }
}

pub type TestHandler<P = WordPipeline> = PortProtocolHandler<P, MemorySettingsStore>;

/// 进程内后台
pub struct Background<P: TranslationPipeline = WordPipeline> {
    pub runtime: InProcessRuntime,
    pub handler: Arc<TestHandler<P>>,
    pub pipeline: Arc<P>,
    pub serving: JoinHandle<ServeReport>,
}

impl<P: TranslationPipeline> Background<P> {
    pub fn start(pipeline: P) -> Self {
        let pipeline = Arc::new(pipeline);
        let (runtime, incoming) = InProcessRuntime::new();
        let handler = Arc::new(PortProtocolHandler::new(
            Arc::clone(&pipeline),
            Arc::new(MemorySettingsStore::new(Settings::default())),
        ));
        let serving = tokio::spawn(Arc::clone(&handler).serve(incoming));
        Self {
            runtime,
            handler,
            pipeline,
            serving,
        }
    }

    /// 关闭后台并返回统计
    pub async fn stop(self) -> ServeReport {
        self.handler.shutdown();
        self.serving.await.unwrap()
    }
}

/// 界面收到的通知
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Loading(TranslateTrigger, String),
    Append(String),
    Success(String),
    Error(String),
    Interrupted(String),
}

#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// 所有 append 内容按顺序拼接
    pub fn appended(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Append(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// 终止通知（成功、失败、中断）的个数
    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    SurfaceEvent::Success(_) | SurfaceEvent::Error(_) | SurfaceEvent::Interrupted(_)
                )
            })
            .count()
    }

    fn push(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TranslationSurface for RecordingSurface {
    fn on_loading(&self, trigger: TranslateTrigger, target_label: &str) {
        self.push(SurfaceEvent::Loading(trigger, target_label.to_string()));
    }

    fn on_append(&self, content: &str) {
        self.push(SurfaceEvent::Append(content.to_string()));
    }

    fn on_success(&self, content: &str, _elapsed: Duration) {
        self.push(SurfaceEvent::Success(content.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.push(SurfaceEvent::Error(message.to_string()));
    }

    fn on_interrupted(&self, message: &str) {
        self.push(SurfaceEvent::Interrupted(message.to_string()));
    }
}

/// `<body>` 的 innerHTML
pub fn body_html(dom: &RcDom) -> String {
    let body = find_nodes(&dom.document, &["html", "body"]).remove(0);
    serialize_children(&body).unwrap()
}

/// 轮询直到条件成立，最多等待一秒
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 1s");
}
