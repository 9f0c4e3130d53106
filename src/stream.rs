//! 流式响应处理模块
use crate::{
    error::{NanoError, Result},
    types::{Message, Role},
    utils::message,
};
use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::debug;
use serde_json::Value;
use std::{
    pin::Pin,
    task::{Context, Poll},
};

// ================================================================================================
// 帧解析
// ================================================================================================

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";
const HEARTBEAT: &str = "data: {}";
const DONE_CHUNK: &str = "[DONE]";

/// 解析单行帧
///
/// 空行、`event:` 声明、`:` 注释、心跳帧与 `[DONE]` 返回 `Ok(None)`；
/// 数据帧中 `delta.text` 为字符串时返回该文本，其余结构一律返回 `Ok(None)`。
/// 只有载荷不是合法 JSON 时才报错
pub fn parse_frame(line: &str) -> Result<Option<String>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with(EVENT_PREFIX) || line.starts_with(':') || line == HEARTBEAT {
        return Ok(None);
    }

    let data = line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| NanoError::Frame(format!("unexpected line: '{}'", line)))?
        .trim_start();
    if data.is_empty() || data == DONE_CHUNK {
        return Ok(None);
    }

    let payload: Value = serde_json::from_str(data)
        .map_err(|e| NanoError::Json(format!("Failed to parse frame: '{}', error: {}", data, e)))?;
    Ok(payload
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// 将字节流切分成行并产出文本增量
///
/// 跨多次读取的帧会被重新拼接；末尾没有换行的帧同样会被处理
pub fn decode_frames<S, E>(bytes_stream: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    NanoError: From<E>,
{
    try_stream! {
        let mut bytes_stream = Box::pin(bytes_stream);
        let mut buffer = BytesMut::new();
        while let Some(bytes_res) = bytes_stream.next().await {
            let bytes = bytes_res.map_err(NanoError::from)?;
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line_bytes = buffer.split_to(pos + 1);
                let line = std::str::from_utf8(&line_bytes).map_err(NanoError::Utf8)?;
                if let Some(text) = parse_frame(line)? {
                    yield text;
                }
            }
        }

        if !buffer.is_empty() {
            debug!("Trailing frame without newline: {:?}", String::from_utf8_lossy(&buffer));
            let line = String::from_utf8(buffer.to_vec()).map_err(|e| NanoError::Utf8(e.utf8_error()))?;
            if let Some(text) = parse_frame(&line)? {
                yield text;
            }
        }
    }
}

// ================================================================================================
// 回复流
// ================================================================================================

/// 一次流式回复
///
/// 逐块产出文本，同时累积完整回复。无论正常结束还是提前丢弃，
/// `Drop` 时都会关闭底层连接并把累积的文本以 `assistant` 身份追加到对话历史。
/// 唯一的例外是在产出任何文本之前就解析失败，此时不记录回复
pub struct ReplyStream<'a> {
    chunks: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
    history: &'a mut Vec<Message>,
    reply: String,
    failed: bool,
    finished: bool,
}

impl<'a> ReplyStream<'a> {
    pub(crate) fn new(
        chunks: impl Stream<Item = Result<String>> + Send + 'static,
        history: &'a mut Vec<Message>,
    ) -> Self {
        Self {
            chunks: Box::pin(chunks),
            history,
            reply: String::new(),
            failed: false,
            finished: false,
        }
    }

    /// 目前为止累积的回复
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// 读完整个流并返回完整回复
    pub async fn collect_reply(mut self) -> Result<String> {
        while let Some(chunk) = self.next().await {
            chunk?;
        }
        Ok(self.reply.clone())
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.chunks.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(text))) => {
                this.reply.push_str(&text);
                Poll::Ready(Some(Ok(text)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.failed = true;
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyStream<'_> {
    fn drop(&mut self) {
        // 先断开连接，再提交历史
        self.chunks = Box::pin(futures::stream::empty::<Result<String>>());
        if self.failed && self.reply.is_empty() {
            debug!("Reply failed before any output; history left untouched");
            return;
        }
        debug!(
            "Committing assistant reply ({} bytes, finished: {})",
            self.reply.len(),
            self.finished
        );
        let reply = std::mem::take(&mut self.reply);
        self.history.push(message(Role::Assistant, &reply));
    }
}
