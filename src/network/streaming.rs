//! SSE 流式解析
//!
//! 响应体按字节增量到达：先做 UTF-8 流式解码，再按空行切分 SSE 记录，
//! 从每条记录的 `data:` 负载中提取内容增量。单条记录格式错误只记录日志并跳过。

use encoding_rs::{Decoder, UTF_8};
use serde_json::Value;

use super::types::{ProtocolType, StreamChunk};

/// SSE 流结束标记
pub const DONE_SENTINEL: &str = "[DONE]";

/// 从一条消息中提取出的增量
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    pub content: Option<String>,
    pub finished: bool,
    pub error: Option<String>,
}

/// 增量 SSE 解码器
pub struct SseDecoder {
    protocol: ProtocolType,
    decoder: Decoder,
    buffer: String,
    done: bool,
}

impl SseDecoder {
    pub fn new(protocol: ProtocolType) -> Self {
        Self {
            protocol,
            decoder: UTF_8.new_decoder_without_bom_handling(),
            buffer: String::new(),
            done: false,
        }
    }

    /// 是否已经收到 `[DONE]`
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 送入一段字节，返回其中完整记录产生的所有块
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.decode(bytes, false);
        self.drain_records()
    }

    /// 流结束：冲刷解码器与缓冲区中剩余的最后一条记录
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        self.decode(&[], true);
        let mut chunks = self.drain_records();

        let rest = std::mem::take(&mut self.buffer);
        if !rest.trim().is_empty() {
            chunks.extend(self.process_record(&rest));
        }
        chunks
    }

    fn decode(&mut self, bytes: &[u8], last: bool) {
        let mut remaining = bytes;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(remaining.len())
                .unwrap_or(remaining.len() * 3 + 4);
            self.buffer.reserve(needed);

            let (result, read, _) = self.decoder.decode_to_string(remaining, &mut self.buffer, last);
            remaining = &remaining[read..];
            if matches!(result, encoding_rs::CoderResult::InputEmpty) {
                break;
            }
        }

        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    fn drain_records(&mut self) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let record: String = self.buffer.drain(..idx + 2).collect();
            chunks.extend(self.process_record(&record[..idx]));
        }
        chunks
    }

    fn process_record(&mut self, record: &str) -> Vec<StreamChunk> {
        let data = record
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|payload| payload.strip_prefix(' ').unwrap_or(payload))
            .collect::<Vec<_>>()
            .join("\n");
        let data = data.trim();

        if data.is_empty() {
            return Vec::new();
        }
        if data == DONE_SENTINEL {
            self.done = true;
            return Vec::new();
        }

        let message: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("跳过无法解析的 SSE 记录: {} ({})", e, truncate(data, 120));
                return Vec::new();
            }
        };

        let delta = extract_delta(self.protocol, &message);
        let mut chunks = Vec::new();
        if let Some(error) = delta.error {
            chunks.push(StreamChunk::failed(error));
            return chunks;
        }
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::delta(content));
        }
        if delta.finished {
            chunks.push(StreamChunk::finished());
        }
        chunks
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 按协议从消息中提取增量内容与结束标志
pub fn extract_delta(protocol: ProtocolType, message: &Value) -> Delta {
    if let Some(message) = message
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
    {
        return Delta {
            error: Some(message.to_string()),
            ..Delta::default()
        };
    }

    match protocol {
        ProtocolType::Responses if message.get("type").is_some() => responses_delta(message),
        _ => chat_delta(message),
    }
}

fn chat_delta(message: &Value) -> Delta {
    let Some(choice) = message.get("choices").and_then(|c| c.get(0)) else {
        return Delta::default();
    };

    let content = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .or_else(|| choice.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let finished = choice
        .get("finish_reason")
        .map(|reason| !reason.is_null())
        .unwrap_or(false);

    Delta {
        content,
        finished,
        error: None,
    }
}

fn responses_delta(message: &Value) -> Delta {
    let event = message.get("type").and_then(Value::as_str).unwrap_or_default();

    match event {
        "response.output_text.delta" => Delta {
            content: message.get("delta").and_then(Value::as_str).map(str::to_string),
            ..Delta::default()
        },
        "response.completed" | "response.incomplete" => Delta {
            finished: true,
            ..Delta::default()
        },
        "response.failed" | "error" => Delta {
            error: Some(
                message
                    .pointer("/response/error/message")
                    .or_else(|| message.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Response stream failed")
                    .to_string(),
            ),
            ..Delta::default()
        },
        _ => Delta::default(),
    }
}
