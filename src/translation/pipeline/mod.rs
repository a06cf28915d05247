//! 整页翻译管道
//!
//! - `collector` - 收集可翻译的块并生成带占位符的段落
//! - `page` - 逐块翻译、写回与失败回滚

pub mod collector;
pub mod page;

pub use collector::{collect_blocks, restore_original_blocks, BlockPayload};
pub use page::{NoProgress, PageOutcome, PageStatus, PageTranslator, ProgressSink};
