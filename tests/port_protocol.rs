//! 端口协议集成测试
//!
//! 内容端控制器、进程内端口与后台处理器一起运行

use std::sync::Arc;
use std::time::Duration;

use lingo_trans::content::{
    RequestIdGenerator, TranslateTrigger, TranslationPhase, TranslationRequestController,
    SELECTION_INTERRUPTED_MESSAGE,
};
use lingo_trans::messaging::{
    channel, PortRequest, PortResponse, RuntimeConnector, SELECTION_TRANSLATION_PORT,
};

mod common {
    #![allow(dead_code)]
    include!("common/mod.rs");
}

use common::{wait_until, Background, RecordingSurface, SurfaceEvent, WordPipeline};

fn controller(background: &Background) -> (TranslationRequestController, Arc<RecordingSurface>) {
    let surface = Arc::new(RecordingSurface::default());
    let controller = TranslationRequestController::new(
        Arc::new(background.runtime.clone()),
        surface.clone(),
        Arc::new(RequestIdGenerator::new()),
    );
    (controller, surface)
}

fn cancel(request_id: &str) -> PortRequest {
    PortRequest::Cancel {
        request_id: request_id.to_string(),
    }
}

fn start(request_id: &str, text: &str) -> PortRequest {
    PortRequest::Start {
        request_id: request_id.to_string(),
        text: text.to_string(),
        target_language: "es".to_string(),
        source_language: None,
        preserve_placeholders: None,
    }
}

#[tokio::test]
async fn test_stream_then_success() {
    let background = Background::start(WordPipeline::default());
    let (mut controller, surface) = controller(&background);

    let request_id = controller
        .start_translation("Hello world", "es", TranslateTrigger::Manual)
        .expect("request should start");
    assert!(request_id.starts_with("selection-"));
    controller.wait_settled().await;

    let expected = WordPipeline::expected("Hello world", "es");
    assert_eq!(surface.appended(), expected);
    assert_eq!(
        surface.events().first(),
        Some(&SurfaceEvent::Loading(TranslateTrigger::Manual, "Spanish".into()))
    );
    assert_eq!(surface.events().last(), Some(&SurfaceEvent::Success(expected)));
    assert_eq!(surface.terminal_count(), 1);
    assert_eq!(controller.phase(), TranslationPhase::Success);

    drop(controller);
    let report = background.stop().await;
    assert_eq!(report.connections, 1);
    assert_eq!(report.totals.started, 1);
}

#[tokio::test]
async fn test_provider_error_reaches_surface() {
    let background = Background::start(WordPipeline::default());
    let (mut controller, surface) = controller(&background);

    controller.start_translation("fail please", "es", TranslateTrigger::Manual);
    controller.wait_settled().await;

    assert_eq!(
        surface.events().last(),
        Some(&SurfaceEvent::Error("Invalid API key".into()))
    );
    assert_eq!(controller.phase(), TranslationPhase::Error);
}

#[tokio::test]
async fn test_cancel_mid_stream_aborts_provider_call() {
    let background = Background::start(WordPipeline::with_delay(Duration::from_millis(40)));
    let (mut controller, surface) = controller(&background);

    let text = "one two three four five six seven eight";
    controller.start_translation(text, "es", TranslateTrigger::Manual);
    wait_until(|| !surface.appended().is_empty()).await;

    assert!(controller.cancel());
    assert_eq!(controller.phase(), TranslationPhase::Cancelled);

    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| pipeline.cancelled.lock().unwrap().contains(&text.to_string())).await;

    // 取消后界面不再收到任何终止通知
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(surface.terminal_count(), 0);
    assert!(!controller.cancel());
}

#[tokio::test]
async fn test_cancel_message_stops_request_on_open_port() {
    let background = Background::start(WordPipeline::default());
    let mut port = background
        .runtime
        .connect(SELECTION_TRANSLATION_PORT)
        .unwrap();

    port.post_message(start("x", "hang x")).unwrap();
    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| pipeline.seen_texts().len() == 1).await;

    port.post_message(cancel("x")).unwrap();
    wait_until(|| pipeline.cancelled.lock().unwrap().contains(&"hang x".to_string())).await;

    // 取消的请求不再发出任何消息
    let quiet = tokio::time::timeout(Duration::from_millis(100), port.recv()).await;
    assert!(quiet.is_err());

    let report = background.stop().await;
    assert_eq!(report.totals.started, 1);
    assert_eq!(report.totals.cancelled, 1);
    assert_eq!(report.totals.aborted_on_disconnect, 0);
    drop(port);
}

#[tokio::test]
async fn test_immediate_cancel_removes_request_entry() {
    let background = Background::start(WordPipeline::default());
    let (content, port) = channel(SELECTION_TRANSLATION_PORT);

    content.post_message(start("x", "hang x")).unwrap();
    content.post_message(cancel("x")).unwrap();
    // 未知 requestId 的取消被忽略
    content.post_message(cancel("missing")).unwrap();
    content.disconnect();

    let summary = background.handler.handle_connection(port).await;
    assert_eq!(summary.started, 1);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.aborted_on_disconnect, 0);
}

#[tokio::test]
async fn test_disconnect_after_first_chunk_interrupts_surface() {
    let background = Background::start(WordPipeline::with_delay(Duration::from_millis(50)));
    let (mut controller, surface) = controller(&background);

    controller.start_translation("one two three four five six", "es", TranslateTrigger::Manual);
    wait_until(|| !surface.appended().is_empty()).await;

    background.handler.shutdown();
    controller.wait_settled().await;

    let events = surface.events();
    assert!(matches!(events[1], SurfaceEvent::Append(_)));
    assert_eq!(
        events.last(),
        Some(&SurfaceEvent::Interrupted(SELECTION_INTERRUPTED_MESSAGE.into()))
    );
    assert_eq!(surface.terminal_count(), 1);
    assert_eq!(controller.phase(), TranslationPhase::Interrupted);

    let report = background.serving.await.unwrap();
    assert_eq!(report.totals.aborted_on_disconnect, 1);
    assert_eq!(report.totals.completed, 0);
}

#[tokio::test]
async fn test_new_translation_cancels_previous_one() {
    let background = Background::start(WordPipeline::default());
    let (mut controller, surface) = controller(&background);

    let first = controller
        .start_translation("hang one", "es", TranslateTrigger::Manual)
        .unwrap();
    let second = controller
        .start_translation("Hello", "es", TranslateTrigger::Manual)
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(controller.active_request_id(), Some(second.as_str()));

    controller.wait_settled().await;
    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| pipeline.cancelled.lock().unwrap().contains(&"hang one".to_string())).await;

    assert_eq!(surface.terminal_count(), 1);
    assert_eq!(
        surface.events().last(),
        Some(&SurfaceEvent::Success("es:Hello".into()))
    );
}

#[tokio::test]
async fn test_background_shutdown_interrupts_surface() {
    let background = Background::start(WordPipeline::default());
    let (mut controller, surface) = controller(&background);

    controller.start_translation("hang forever", "es", TranslateTrigger::Manual);
    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| !pipeline.seen_texts().is_empty()).await;

    background.handler.shutdown();
    controller.wait_settled().await;

    assert_eq!(
        surface.events().last(),
        Some(&SurfaceEvent::Interrupted(SELECTION_INTERRUPTED_MESSAGE.into()))
    );
    assert_eq!(controller.phase(), TranslationPhase::Interrupted);

    let report = background.serving.await.unwrap();
    assert_eq!(report.totals.aborted_on_disconnect, 1);
}

#[tokio::test]
async fn test_disconnect_cancels_in_flight_requests() {
    let background = Background::start(WordPipeline::default());
    let port = background
        .runtime
        .connect(SELECTION_TRANSLATION_PORT)
        .unwrap();

    port.post_message(start("a", "hang a")).unwrap();
    port.post_message(start("b", "hang b")).unwrap();
    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| pipeline.seen_texts().len() == 2).await;

    port.disconnect();
    wait_until(|| pipeline.cancelled.lock().unwrap().len() == 2).await;

    let report = background.stop().await;
    assert_eq!(report.connections, 1);
    assert_eq!(report.totals.started, 2);
    assert_eq!(report.totals.aborted_on_disconnect, 2);
}

#[tokio::test]
async fn test_duplicate_request_id_replaces_active_request() {
    let background = Background::start(WordPipeline::default());
    let mut port = background
        .runtime
        .connect(SELECTION_TRANSLATION_PORT)
        .unwrap();

    port.post_message(start("dup", "hang old")).unwrap();
    let pipeline = Arc::clone(&background.pipeline);
    wait_until(|| pipeline.seen_texts().len() == 1).await;
    port.post_message(start("dup", "Hola amigo")).unwrap();

    let mut complete = None;
    while let Some(message) = port.recv().await {
        if let PortResponse::Complete { content, .. } = message {
            complete = content;
            break;
        }
    }
    assert_eq!(complete.as_deref(), Some("es:Hola es:amigo"));
    wait_until(|| pipeline.cancelled.lock().unwrap().contains(&"hang old".to_string())).await;

    port.disconnect();
    let report = background.stop().await;
    assert_eq!(report.totals.started, 2);
    assert_eq!(report.totals.replaced, 1);
}

#[tokio::test]
async fn test_unknown_port_name_is_disconnected() {
    let background = Background::start(WordPipeline::default());
    let mut port = background.runtime.connect("other-port").unwrap();

    assert!(port.recv().await.is_none());
    let report = background.stop().await;
    assert_eq!(report.connections, 0);
}
