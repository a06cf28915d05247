//! 端口协议处理器
//!
//! 每个连接拥有独立的 `requestId -> 取消句柄` 映射，映射只由连接自己的事件循环修改。
//! 翻译任务在 `JoinSet` 中运行，完成后把结果交回事件循环，由事件循环负责移除映射项。
//!
//! ```text
//! Port ──start──▶ handle_connection ──spawn──▶ run_request ──▶ TranslationPipeline
//!      ◀─chunk/complete/error── Outbox ◀───────────┘
//! ```

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::messaging::{
    BackgroundPort, PortRequest, PortResponse, PortSender, SELECTION_TRANSLATION_PORT,
};
use crate::network::StreamChunk;
use crate::translation::config::SettingsStore;
use crate::translation::core::TranslationPipeline;
use crate::translation::prompt::TranslationRequest;

/// 单个连接的处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// 收到的 start 消息数
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    /// 被 cancel 消息取消的请求数
    pub cancelled: usize,
    /// 被相同 requestId 的新 start 替换的请求数
    pub replaced: usize,
    /// 连接断开时仍在进行的请求数
    pub aborted_on_disconnect: usize,
}

impl AddAssign for ConnectionSummary {
    fn add_assign(&mut self, other: Self) {
        self.started += other.started;
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.replaced += other.replaced;
        self.aborted_on_disconnect += other.aborted_on_disconnect;
    }
}

/// `serve` 的运行结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeReport {
    pub connections: usize,
    pub totals: ConnectionSummary,
}

struct ActiveRequest {
    token: CancellationToken,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// 带关闭标记的发送端，发送失败只记录日志
#[derive(Clone)]
struct Outbox {
    sender: PortSender<PortResponse>,
    closed: Arc<AtomicBool>,
}

impl Outbox {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn post(&self, token: &CancellationToken, message: PortResponse) {
        if self.is_closed() || token.is_cancelled() {
            tracing::debug!("请求已结束，丢弃消息: {}", message.request_id());
            return;
        }
        if let Err(e) = self.sender.post_message(message) {
            tracing::debug!("发送端口消息失败: {}", e);
        }
    }
}

/// 后台端口协议处理器
pub struct PortProtocolHandler<P, S: ?Sized> {
    pipeline: Arc<P>,
    settings: Arc<S>,
    shutdown: CancellationToken,
}

impl<P, S> PortProtocolHandler<P, S>
where
    P: TranslationPipeline,
    S: SettingsStore + ?Sized + 'static,
{
    pub fn new(pipeline: Arc<P>, settings: Arc<S>) -> Self {
        Self {
            pipeline,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// 终止后台：所有连接按断开处理
    pub fn shutdown(&self) {
        tracing::info!("后台处理器关闭");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 接受新连接，直到运行时被丢弃或处理器关闭
    ///
    /// 名称不匹配的端口会被直接断开。
    pub async fn serve(
        self: Arc<Self>,
        mut incoming: mpsc::UnboundedReceiver<BackgroundPort>,
    ) -> ServeReport {
        let mut report = ServeReport::default();
        let mut connections: JoinSet<ConnectionSummary> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    match joined {
                        Ok(summary) => report.totals += summary,
                        Err(e) => tracing::warn!("连接任务异常退出: {}", e),
                    }
                }
                port = incoming.recv() => match port {
                    Some(port) if port.name() == SELECTION_TRANSLATION_PORT => {
                        report.connections += 1;
                        let handler = Arc::clone(&self);
                        connections.spawn(async move { handler.handle_connection(port).await });
                    }
                    Some(port) => {
                        tracing::debug!("忽略未知端口: {}", port.name());
                        port.disconnect();
                    }
                    None => break,
                },
            }
        }

        while let Some(joined) = connections.join_next().await {
            match joined {
                Ok(summary) => report.totals += summary,
                Err(e) => tracing::warn!("连接任务异常退出: {}", e),
            }
        }

        tracing::info!(
            "后台处理器停止: connections={} completed={} failed={}",
            report.connections,
            report.totals.completed,
            report.totals.failed
        );
        report
    }

    /// 处理单个连接，直到对端断开或处理器关闭
    pub async fn handle_connection(&self, mut port: BackgroundPort) -> ConnectionSummary {
        let outbox = Outbox {
            sender: port.sender(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let mut active: HashMap<String, ActiveRequest> = HashMap::new();
        let mut tasks: JoinSet<(String, u64, RequestOutcome)> = JoinSet::new();
        let mut summary = ConnectionSummary::default();
        let mut next_generation = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let (request_id, generation, outcome) = match joined {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::warn!("翻译任务异常退出: {}", e);
                            continue;
                        }
                    };
                    if active.get(&request_id).is_some_and(|entry| entry.generation == generation) {
                        active.remove(&request_id);
                    }
                    match outcome {
                        RequestOutcome::Completed => summary.completed += 1,
                        RequestOutcome::Failed => summary.failed += 1,
                        RequestOutcome::Cancelled => {}
                    }
                }
                message = port.recv() => match message {
                    Some(PortRequest::Start {
                        request_id,
                        text,
                        target_language,
                        source_language,
                        preserve_placeholders,
                    }) => {
                        if let Some(previous) = active.remove(&request_id) {
                            tracing::debug!("重复的 requestId，取消旧请求: {}", request_id);
                            previous.token.cancel();
                            summary.replaced += 1;
                        }

                        let token = self.shutdown.child_token();
                        let generation = next_generation;
                        next_generation += 1;
                        active.insert(
                            request_id.clone(),
                            ActiveRequest {
                                token: token.clone(),
                                generation,
                            },
                        );
                        summary.started += 1;

                        let request = TranslationRequest {
                            source_language,
                            preserve_placeholders: preserve_placeholders.unwrap_or(false),
                            ..TranslationRequest::new(text, target_language)
                        };
                        let pipeline = Arc::clone(&self.pipeline);
                        let settings = Arc::clone(&self.settings);
                        let outbox = outbox.clone();
                        tasks.spawn(async move {
                            let outcome =
                                run_request(pipeline, settings, &request_id, request, &token, &outbox)
                                    .await;
                            (request_id, generation, outcome)
                        });
                    }
                    Some(PortRequest::Cancel { request_id }) => {
                        if let Some(entry) = active.remove(&request_id) {
                            tracing::debug!("取消请求: {}", request_id);
                            entry.token.cancel();
                            summary.cancelled += 1;
                        }
                    }
                    None => break,
                },
            }
        }

        outbox.closed.store(true, Ordering::Release);
        summary.aborted_on_disconnect += active.len();
        for (_, entry) in active.drain() {
            entry.token.cancel();
        }
        tasks.shutdown().await;
        port.disconnect();

        tracing::debug!("端口连接结束: {:?}", summary);
        summary
    }
}

/// 执行单个翻译请求，并把流式结果转发到端口
async fn run_request<P, S>(
    pipeline: Arc<P>,
    settings: Arc<S>,
    request_id: &str,
    mut request: TranslationRequest,
    token: &CancellationToken,
    outbox: &Outbox,
) -> RequestOutcome
where
    P: TranslationPipeline,
    S: SettingsStore + ?Sized,
{
    // 请求全程使用开始时的设置快照
    let snapshot = settings.load_stored_settings().await;
    request.target_language = snapshot
        .effective_target_language(Some(&request.target_language))
        .to_string();

    let mut aggregated = String::new();
    let mut stream_failed = false;

    let result = {
        let mut on_stream = |chunk: StreamChunk| {
            if token.is_cancelled() || outbox.is_closed() {
                return;
            }

            aggregated.push_str(&chunk.content);
            let failed = chunk.error.is_some();
            outbox.post(
                token,
                PortResponse::Chunk {
                    request_id: request_id.to_string(),
                    content: (!chunk.content.is_empty()).then_some(chunk.content),
                    done: chunk.done.then_some(true),
                    error: chunk.error,
                },
            );

            if failed {
                stream_failed = true;
                token.cancel();
            }
        };
        pipeline
            .translate(&snapshot, &request, token, &mut on_stream)
            .await
    };

    if stream_failed {
        return RequestOutcome::Failed;
    }
    if token.is_cancelled() || outbox.is_closed() {
        return RequestOutcome::Cancelled;
    }

    match result {
        Ok(response) => {
            let content = if response.content.is_empty() {
                aggregated
            } else {
                response.content
            };
            outbox.post(
                token,
                PortResponse::Complete {
                    request_id: request_id.to_string(),
                    content: Some(content),
                },
            );
            RequestOutcome::Completed
        }
        Err(e) if e.is_aborted() => RequestOutcome::Cancelled,
        Err(e) => {
            tracing::debug!("翻译失败 {}: {}", request_id, e);
            outbox.post(
                token,
                PortResponse::Error {
                    request_id: request_id.to_string(),
                    message: e.to_string(),
                },
            );
            RequestOutcome::Failed
        }
    }
}
