use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, RcDom, SerializableHandle};

use crate::translation::error::{TranslationError, TranslationResult};

/// 序列化文档，按给定字符集编码输出
pub fn serialize_document(dom: &RcDom, document_encoding: &str) -> TranslationResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    let serializable: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| TranslationError::SerializationError(format!("无法序列化 DOM: {}", e)))?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            buf = data.to_vec();
        }
    }

    Ok(buf)
}

/// 序列化元素的子节点（innerHTML）
pub fn serialize_children(node: &Handle) -> TranslationResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..SerializeOpts::default()
    };

    serialize(&mut buf, &serializable, opts)
        .map_err(|e| TranslationError::SerializationError(format!("无法序列化节点: {}", e)))?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
