//! 对话客户端核心模块
use crate::{
    config::{AskOptions, Config, resolve_model},
    conversation::Conversations,
    error::{NanoError, Result},
    stream::{ReplyStream, decode_frames},
    tokenizer::Tokenizer,
    types::{Message, MessagesRequest, Role},
    utils::{message, outgoing_messages},
};
use log::{debug, error};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use std::sync::OnceLock;

// ================================================================================================
// 核心客户端模块
// ================================================================================================

/// 对话客户端
///
/// 按对话 ID 维护内存中的消息历史，发起流式请求并逐块产出回复文本。
/// 同一个实例不支持并发会话，需要并发时请使用多个实例
#[derive(Debug)]
pub struct ConversationClient {
    client: Client,
    config: Config,
    conversations: Conversations,
    tokenizer: OnceLock<Tokenizer>,
}

impl ConversationClient {
    /// 创建一个新的 `ConversationClient` 实例
    ///
    /// 底层 HTTP 客户端构建失败时直接返回错误，不会退回到忽略超时等配置的默认客户端
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .tcp_nodelay(config.tcp_nodelay);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            error!("Failed to build reqwest client: {}", e);
            NanoError::from(e)
        })?;

        Ok(Self {
            client,
            config,
            conversations: Conversations::new(),
            tokenizer: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 对话的消息历史，不存在时为空
    pub fn history(&self, conversation_id: &str) -> &[Message] {
        self.conversations.get(conversation_id)
    }

    /// 将对话重置为空
    pub fn reset(&mut self, conversation_id: &str) {
        self.conversations.reset(conversation_id);
    }

    /// 向对话追加一条消息
    ///
    /// 对话不存在或 `preserve_history` 为 `false` 时会先重置
    pub fn append_message(
        &mut self,
        content: &str,
        role: Role,
        conversation_id: &str,
        preserve_history: bool,
    ) {
        self.conversations
            .append(conversation_id, role, content, preserve_history);
    }

    /// 当前模型的分词器，首次使用时加载
    fn tokenizer(&self) -> Result<&Tokenizer> {
        if let Some(tokenizer) = self.tokenizer.get() {
            return Ok(tokenizer);
        }
        let tokenizer = Tokenizer::for_model(&self.config.model)?;
        Ok(self.tokenizer.get_or_init(|| tokenizer))
    }

    /// 统计对话的 token 数
    ///
    /// 每条消息计 5 + 内容 token 数，最后再加 5 作为回复前缀。
    /// 模型不在支持列表中时返回 [`NanoError::UnsupportedModel`]
    pub fn count_tokens(&self, conversation_id: &str) -> Result<usize> {
        let tokenizer = self.tokenizer()?;
        Ok(tokenizer.count_messages(self.conversations.get(conversation_id)))
    }

    /// 截断对话直到 token 数不超过 `truncate_limit`
    ///
    /// 始终保留第一条消息，从第二条开始删除。默认流程不会调用
    pub fn truncate(&mut self, conversation_id: &str) -> Result<()> {
        let tokenizer = self.tokenizer()?.clone();
        let limit = self.config.truncate_limit;
        loop {
            let count = tokenizer.count_messages(self.conversations.get(conversation_id));
            if count <= limit || !self.conversations.drop_second(conversation_id) {
                break;
            }
            debug!(
                "Truncated conversation '{}' ({} tokens > {})",
                conversation_id, count, limit
            );
        }
        Ok(())
    }

    /// 构建 API 请求所需的 HTTP 标头
    fn build_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| NanoError::InvalidRequest(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.config.api_version)
                .map_err(|e| NanoError::InvalidRequest(format!("Invalid API version: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// 发送请求，非成功状态码转换为 [`NanoError::RequestFailed`]
    async fn send(&self, request_builder: RequestBuilder) -> Result<Response> {
        let response = request_builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await.unwrap_or_else(|e| {
            debug!("Failed to read error response body: {}", e);
            String::new()
        });
        error!("Request failed: {} {} {}", status.as_u16(), reason, body);
        Err(NanoError::RequestFailed {
            status: status.as_u16(),
            reason,
            body,
        })
    }

    /// 发起流式对话
    ///
    /// 先把提示追加到对话，再发送请求。返回的 [`ReplyStream`] 逐块产出文本，
    /// 在被读完或丢弃时把累积的回复以 `assistant` 身份写回对话历史。
    /// 服务端返回非成功状态码时，在产出任何文本之前返回 [`NanoError::RequestFailed`]，
    /// 此时对话中只多出本次的提示
    pub async fn stream_reply(
        &mut self,
        conversation_id: &str,
        prompt: &str,
        options: AskOptions,
    ) -> Result<ReplyStream<'_>> {
        let preserve_history = options.preserve_history;
        let history = self.conversations.entry(conversation_id, preserve_history);
        history.push(message(options.role, prompt));
        let messages = outgoing_messages(history, prompt, preserve_history);

        let model = resolve_model(
            options.model.as_deref(),
            self.config.env_model.as_deref(),
            &self.config.model,
        );
        let body = MessagesRequest {
            model,
            messages: &messages,
            system: &self.config.system_prompt,
            stream: true,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            top_p: options.top_p.unwrap_or(self.config.top_p),
            max_tokens: options.max_tokens,
        };

        let api_key = options.api_key.as_deref().unwrap_or(&self.config.api_key);
        let mut request_builder = self
            .client
            .post(&self.config.api_url)
            .headers(self.build_headers(api_key)?)
            .json(&body);
        if let Some(timeout) = options.timeout {
            request_builder = request_builder.timeout(timeout);
        }

        debug!(
            "POST {} model={} messages={} conversation='{}'",
            self.config.api_url,
            model,
            messages.len(),
            conversation_id
        );
        let response = self.send(request_builder).await?;

        let chunks = decode_frames(response.bytes_stream());
        let history = self.conversations.entry(conversation_id, true);
        Ok(ReplyStream::new(chunks, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::REPLY_OVERHEAD;

    fn client_with_model(model: &str) -> ConversationClient {
        ConversationClient::new(
            Config::default()
                .with_api_key("test-key".to_string())
                .with_model(model.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_reset_then_count_is_reply_overhead() {
        let mut client = client_with_model("claude-2");
        client.append_message("hello", Role::User, "a", true);
        client.reset("a");
        assert_eq!(client.count_tokens("a").unwrap(), REPLY_OVERHEAD);
    }

    #[test]
    fn test_count_tokens_unsupported_model() {
        let mut client = client_with_model("mistral-large");
        client.append_message("hello", Role::User, "a", true);
        let err = client.count_tokens("a").unwrap_err();
        assert!(matches!(err, NanoError::UnsupportedModel { .. }));
        assert!(client.tokenizer.get().is_none());
    }

    #[test]
    fn test_append_message_order() {
        let mut client = client_with_model("claude-2");
        client.append_message("one", Role::User, "a", true);
        client.append_message("two", Role::Assistant, "a", true);
        client.append_message("three", Role::User, "a", true);
        let contents: Vec<&str> = client.history("a").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_truncate_keeps_first_message_until_under_limit() {
        let config = Config::default()
            .with_model("claude-2".to_string())
            .with_truncate_limit(40);
        let mut client = ConversationClient::new(config).unwrap();
        client.append_message("system notes", Role::User, "a", true);
        for i in 0..10 {
            client.append_message(&format!("message number {}", i), Role::User, "a", true);
        }
        client.truncate("a").unwrap();

        let history = client.history("a");
        assert!(client.count_tokens("a").unwrap() <= 40 || history.len() == 1);
        assert_eq!(history[0].content, "system notes");
        assert_eq!(history.last().unwrap().content, "message number 9");
    }

    #[test]
    fn test_truncate_stops_at_single_message() {
        let config = Config::default()
            .with_model("claude-2".to_string())
            .with_truncate_limit(0);
        let mut client = ConversationClient::new(config).unwrap();
        client.append_message("a long first message", Role::User, "a", true);
        client.append_message("second", Role::User, "a", true);
        client.truncate("a").unwrap();
        assert_eq!(client.history("a").len(), 1);
    }

    #[test]
    fn test_build_headers() {
        let client = client_with_model("claude-2");
        let headers = client.build_headers("k").unwrap();
        assert_eq!(headers["x-api-key"], "k");
        assert_eq!(headers["anthropic-version"], "2023-06-01");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(client.build_headers("bad\nkey").is_err());
    }

    #[test]
    fn test_new_keeps_configured_timeout() {
        let config = Config::default()
            .with_model("claude-2".to_string())
            .with_timeout(std::time::Duration::from_millis(250));
        let client = ConversationClient::new(config).unwrap();
        assert_eq!(client.config().timeout(), Some(std::time::Duration::from_millis(250)));
    }
}
