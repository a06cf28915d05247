//! 进程内长连接端口
//!
//! 每个端口是一对无界 mpsc 通道。对端全部丢弃后 `post_message` 返回错误，
//! `recv` 返回 `None`，与浏览器扩展端口的断开语义一致。

use tokio::sync::mpsc;

use super::protocol::{PortRequest, PortResponse};
use crate::translation::error::{TranslationError, TranslationResult};

/// 内容脚本一侧的端口
pub type ContentPort = Port<PortResponse, PortRequest>;
/// 后台一侧的端口
pub type BackgroundPort = Port<PortRequest, PortResponse>;

/// 端口的发送半边，可在任务之间克隆
#[derive(Debug)]
pub struct PortSender<Out> {
    name: String,
    tx: mpsc::UnboundedSender<Out>,
}

impl<Out> Clone for PortSender<Out> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<Out> PortSender<Out> {
    /// 发送消息，对端已断开时返回 `ChannelError`
    pub fn post_message(&self, message: Out) -> TranslationResult<()> {
        self.tx.send(message).map_err(|_| {
            TranslationError::ChannelError(format!("port '{}' is disconnected", self.name))
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 双向端口
#[derive(Debug)]
pub struct Port<In, Out> {
    name: String,
    sender: PortSender<Out>,
    rx: mpsc::UnboundedReceiver<In>,
}

impl<In, Out> Port<In, Out> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post_message(&self, message: Out) -> TranslationResult<()> {
        self.sender.post_message(message)
    }

    pub fn sender(&self) -> PortSender<Out> {
        self.sender.clone()
    }

    /// 接收下一条消息；对端断开且缓冲区为空时返回 `None`
    pub async fn recv(&mut self) -> Option<In> {
        self.rx.recv().await
    }

    /// 主动断开，同时拒绝对端后续发送
    pub fn disconnect(mut self) {
        self.rx.close();
    }
}

/// 创建一对相连的端口
pub fn channel(name: &str) -> (ContentPort, BackgroundPort) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let content = Port {
        name: name.to_string(),
        sender: PortSender {
            name: name.to_string(),
            tx: request_tx,
        },
        rx: response_rx,
    };
    let background = Port {
        name: name.to_string(),
        sender: PortSender {
            name: name.to_string(),
            tx: response_tx,
        },
        rx: request_rx,
    };

    (content, background)
}

/// 打开到后台的端口
pub trait RuntimeConnector: Send + Sync {
    fn connect(&self, name: &str) -> TranslationResult<ContentPort>;
}

/// 进程内运行时：把新端口的后台一端交给后台处理器
#[derive(Clone)]
pub struct InProcessRuntime {
    incoming: mpsc::UnboundedSender<BackgroundPort>,
}

impl InProcessRuntime {
    /// 返回运行时以及后台处理器需要消费的连接接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackgroundPort>) {
        let (incoming, rx) = mpsc::unbounded_channel();
        (Self { incoming }, rx)
    }
}

impl RuntimeConnector for InProcessRuntime {
    fn connect(&self, name: &str) -> TranslationResult<ContentPort> {
        let (content, background) = channel(name);
        self.incoming.send(background).map_err(|_| {
            TranslationError::ChannelError("background worker is not running".to_string())
        })?;
        tracing::debug!("打开端口: {}", name);
        Ok(content)
    }
}
