//! # 选区模块
//!
//! 把页面上的选区事件转换为经过防抖和校验的选区快照。

pub mod detector;

pub use detector::{
    snapshot_channel, AnchorElement, FrameHandle, ListenerId, RangeHandle, RawSelection, Rect,
    SelectionDetector, SelectionDetectorOptions, SelectionEvent, SelectionHost, SelectionKind,
    SelectionListener, SelectionSnapshot, DEFAULT_MAX_LENGTH, DEFAULT_MIN_LENGTH,
};
