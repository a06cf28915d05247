//! 选区检测器
//!
//! 把原始的指针、按键和 selectionchange 事件合并到下一动画帧再求值，
//! 输出经过校验的 `SelectionSnapshot`。Escape 键直接输出空选区。

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

/// 默认最短选区字符数
pub const DEFAULT_MIN_LENGTH: usize = 1;
/// 默认最长选区字符数
pub const DEFAULT_MAX_LENGTH: usize = 5000;

/// 视口坐标下的矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// 坐标有限、尺寸非负且不同时为零
    pub fn is_usable(&self) -> bool {
        let finite = [self.top, self.left, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.width >= 0.0
            && self.height >= 0.0
            && !(self.width == 0.0 && self.height == 0.0)
    }
}

/// 宿主提供的选区范围句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeHandle(pub u64);

/// 动画帧回调句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// 选区起点所在的元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorElement {
    pub tag: String,
    pub content_editable: bool,
}

impl AnchorElement {
    /// 输入框、文本域或可编辑元素
    pub fn is_focusable(&self) -> bool {
        let tag = self.tag.to_ascii_lowercase();
        tag == "input" || tag == "textarea" || self.content_editable
    }
}

/// 宿主读取到的原始选区
#[derive(Debug, Clone, PartialEq)]
pub struct RawSelection {
    pub text: String,
    pub collapsed: bool,
    pub anchor: Option<AnchorElement>,
    pub rect: Rect,
    pub range: RangeHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    None,
    Text,
}

/// 一次求值的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub kind: SelectionKind,
    pub text: String,
    pub rect: Option<Rect>,
    pub range: Option<RangeHandle>,
}

impl SelectionSnapshot {
    pub fn none() -> Self {
        Self {
            kind: SelectionKind::None,
            text: String::new(),
            rect: None,
            range: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == SelectionKind::Text
    }
}

/// 检测器关心的页面事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    PointerUp,
    KeyUp { key: String },
    SelectionChange,
}

/// 页面能力：读取选区、注册捕获阶段监听、调度动画帧
pub trait SelectionHost: Send + Sync {
    /// 没有选区时返回 `None`
    fn read_selection(&self) -> Option<RawSelection>;
    fn register_listeners(&self);
    fn unregister_listeners(&self);
    fn request_animation_frame(&self) -> FrameHandle;
    fn cancel_animation_frame(&self, handle: FrameHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionDetectorOptions {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for SelectionDetectorOptions {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

pub type SelectionListener = Box<dyn FnMut(&SelectionSnapshot) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

pub struct SelectionDetector {
    host: Arc<dyn SelectionHost>,
    options: SelectionDetectorOptions,
    listeners: BTreeMap<ListenerId, SelectionListener>,
    next_listener: u64,
    pending_frame: Option<FrameHandle>,
    started: bool,
    disposed: bool,
}

impl SelectionDetector {
    pub fn new(host: Arc<dyn SelectionHost>, options: SelectionDetectorOptions) -> Self {
        Self {
            host,
            options,
            listeners: BTreeMap::new(),
            next_listener: 0,
            pending_frame: None,
            started: false,
            disposed: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// 注册监听并立即调度一次求值；重复调用无效果
    pub fn start(&mut self) {
        if self.disposed || self.started {
            return;
        }
        self.host.register_listeners();
        self.started = true;
        self.schedule_evaluate();
    }

    pub fn stop(&mut self) {
        if self.started {
            self.host.unregister_listeners();
            self.started = false;
        }
        if let Some(frame) = self.pending_frame.take() {
            self.host.cancel_animation_frame(frame);
        }
    }

    /// 停止并清空所有监听器，可重复调用
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.stop();
        self.listeners.clear();
    }

    pub fn add_listener(&mut self, listener: SelectionListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, listener);
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn handle_event(&mut self, event: &SelectionEvent) {
        if !self.started || self.disposed {
            return;
        }
        match event {
            SelectionEvent::KeyUp { key } if key == "Escape" => {
                self.notify(&SelectionSnapshot::none());
            }
            _ => self.schedule_evaluate(),
        }
    }

    /// 动画帧回调，只有最近一次调度的帧会求值
    pub fn on_animation_frame(&mut self, frame: FrameHandle) {
        if self.pending_frame != Some(frame) {
            return;
        }
        self.pending_frame = None;
        if self.disposed {
            return;
        }
        let snapshot = self.evaluate();
        self.notify(&snapshot);
    }

    fn schedule_evaluate(&mut self) {
        if let Some(frame) = self.pending_frame.take() {
            self.host.cancel_animation_frame(frame);
        }
        self.pending_frame = Some(self.host.request_animation_frame());
    }

    fn evaluate(&self) -> SelectionSnapshot {
        let Some(selection) = self.host.read_selection() else {
            return SelectionSnapshot::none();
        };
        if selection.collapsed {
            return SelectionSnapshot::none();
        }
        if selection.anchor.as_ref().is_some_and(AnchorElement::is_focusable) {
            return SelectionSnapshot::none();
        }

        let text = selection.text.trim();
        let length = text.chars().count();
        if length < self.options.min_length || length > self.options.max_length {
            return SelectionSnapshot::none();
        }

        if !selection.rect.is_usable() {
            return SelectionSnapshot::none();
        }

        SelectionSnapshot {
            kind: SelectionKind::Text,
            text: text.to_string(),
            rect: Some(selection.rect),
            range: Some(selection.range),
        }
    }

    fn notify(&mut self, snapshot: &SelectionSnapshot) {
        for (id, listener) in self.listeners.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::warn!("选区监听器执行失败: {:?}", id);
            }
        }
    }
}

impl Drop for SelectionDetector {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// 把快照转发到通道的监听器，供异步代码消费
pub fn snapshot_channel() -> (SelectionListener, mpsc::UnboundedReceiver<SelectionSnapshot>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: SelectionListener = Box::new(move |snapshot: &SelectionSnapshot| {
        if tx.send(snapshot.clone()).is_err() {
            tracing::debug!("选区快照接收端已关闭");
        }
    });
    (listener, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHost {
        selection: Mutex<Option<RawSelection>>,
        registered: Mutex<i32>,
        next_frame: AtomicU64,
        cancelled: Mutex<Vec<FrameHandle>>,
    }

    impl FakeHost {
        fn select(&self, text: &str, rect: Rect) {
            *self.selection.lock().unwrap() = Some(RawSelection {
                text: text.to_string(),
                collapsed: false,
                anchor: Some(AnchorElement {
                    tag: "p".into(),
                    content_editable: false,
                }),
                rect,
                range: RangeHandle(1),
            });
        }

        fn last_frame(&self) -> FrameHandle {
            FrameHandle(self.next_frame.load(Ordering::SeqCst) - 1)
        }
    }

    impl SelectionHost for FakeHost {
        fn read_selection(&self) -> Option<RawSelection> {
            self.selection.lock().unwrap().clone()
        }
        fn register_listeners(&self) {
            *self.registered.lock().unwrap() += 1;
        }
        fn unregister_listeners(&self) {
            *self.registered.lock().unwrap() -= 1;
        }
        fn request_animation_frame(&self) -> FrameHandle {
            FrameHandle(self.next_frame.fetch_add(1, Ordering::SeqCst))
        }
        fn cancel_animation_frame(&self, handle: FrameHandle) {
            self.cancelled.lock().unwrap().push(handle);
        }
    }

    fn detector(host: &Arc<FakeHost>) -> (SelectionDetector, Arc<Mutex<Vec<SelectionSnapshot>>>) {
        let mut detector = SelectionDetector::new(host.clone(), SelectionDetectorOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        detector.add_listener(Box::new(move |s: &SelectionSnapshot| {
            sink.lock().unwrap().push(s.clone())
        }));
        (detector, seen)
    }

    fn good_rect() -> Rect {
        Rect::new(10.0, 20.0, 80.0, 16.0)
    }

    #[test]
    fn test_start_is_idempotent_and_dispose_unregisters() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, _) = detector(&host);
        detector.start();
        detector.start();
        assert_eq!(*host.registered.lock().unwrap(), 1);

        detector.dispose();
        detector.dispose();
        assert_eq!(*host.registered.lock().unwrap(), 0);
    }

    #[test]
    fn test_only_latest_frame_evaluates() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, seen) = detector(&host);
        detector.start();
        host.select("Hello world", good_rect());

        let initial = host.last_frame();
        detector.handle_event(&SelectionEvent::SelectionChange);
        detector.handle_event(&SelectionEvent::PointerUp);
        let latest = host.last_frame();

        detector.on_animation_frame(initial);
        assert!(seen.lock().unwrap().is_empty());
        assert!(host.cancelled.lock().unwrap().contains(&initial));

        detector.on_animation_frame(latest);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].text, "Hello world");
        assert_eq!(seen[0].rect, Some(good_rect()));
    }

    #[test]
    fn test_escape_is_immediate() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, seen) = detector(&host);
        detector.start();
        host.select("Hello", good_rect());

        detector.handle_event(&SelectionEvent::KeyUp {
            key: "Escape".into(),
        });
        assert_eq!(*seen.lock().unwrap(), vec![SelectionSnapshot::none()]);
    }

    #[test]
    fn test_invalid_selections_emit_none() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, seen) = detector(&host);
        detector.start();

        let too_long = "a".repeat(5001);
        let cases = [
            ("   ", good_rect()),
            ("x", Rect::new(0.0, 0.0, 0.0, 0.0)),
            ("x", Rect::new(f64::NAN, 0.0, 4.0, 4.0)),
            (too_long.as_str(), good_rect()),
        ];
        for (text, rect) in cases {
            host.select(text, rect);
            detector.handle_event(&SelectionEvent::PointerUp);
            detector.on_animation_frame(host.last_frame());
        }

        assert!(seen.lock().unwrap().iter().all(|s| !s.is_text()));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_editable_anchor_is_ignored() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, seen) = detector(&host);
        detector.start();
        host.select("typed", good_rect());
        if let Some(selection) = host.selection.lock().unwrap().as_mut() {
            selection.anchor = Some(AnchorElement {
                tag: "TEXTAREA".into(),
                content_editable: false,
            });
        }

        detector.on_animation_frame(host.last_frame());
        assert_eq!(seen.lock().unwrap()[0].kind, SelectionKind::None);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let host = Arc::new(FakeHost::default());
        let mut detector = SelectionDetector::new(host.clone(), SelectionDetectorOptions::default());
        detector.add_listener(Box::new(|_: &SelectionSnapshot| panic!("listener bug")));
        let (listener, mut rx) = snapshot_channel();
        detector.add_listener(listener);

        detector.start();
        detector.handle_event(&SelectionEvent::KeyUp {
            key: "Escape".into(),
        });
        assert_eq!(rx.try_recv().unwrap(), SelectionSnapshot::none());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let host = Arc::new(FakeHost::default());
        let (mut detector, seen) = detector(&host);
        assert!(detector.remove_listener(ListenerId(0)));
        detector.start();
        detector.handle_event(&SelectionEvent::KeyUp {
            key: "Escape".into(),
        });
        assert!(seen.lock().unwrap().is_empty());
    }
}
