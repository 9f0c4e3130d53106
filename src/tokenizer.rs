//! Token 计数模块
use crate::error::{NanoError, Result};
use crate::types::Message;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// 每条消息的固定开销
pub const MESSAGE_OVERHEAD: usize = 5;
/// 回复前缀的固定开销
pub const REPLY_OVERHEAD: usize = 5;

/// 支持 token 计数的模型
pub const SUPPORTED_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-3.5-turbo-0301",
    "gpt-3.5-turbo-0613",
    "gpt-3.5-turbo-16k-0613",
    "gpt-4",
    "gpt-4-0314",
    "gpt-4-32k",
    "gpt-4-32k-0314",
    "gpt-4-0613",
    "gpt-4-32k-0613",
    "gpt-4-1106-preview",
    "claude-2",
    "claude-2.1",
    "claude-instant-1.2",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "claude-3-5-sonnet-20240620",
];

/// 判断模型是否在支持列表中
pub fn is_supported(model: &str) -> bool {
    SUPPORTED_MODELS.contains(&model)
}

/// 绑定到某个模型的 BPE 分词器
#[derive(Clone)]
pub struct Tokenizer {
    model: String,
    encoder: Arc<CoreBPE>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer").field("model", &self.model).finish()
    }
}

impl Tokenizer {
    /// 为模型加载分词器
    ///
    /// 不在支持列表中的模型直接返回 [`NanoError::UnsupportedModel`]，不会加载任何编码表。
    /// Claude 系列模型不在 tiktoken 的注册表里，统一使用 `cl100k_base`
    pub fn for_model(model: &str) -> Result<Self> {
        if !is_supported(model) {
            return Err(NanoError::UnsupportedModel {
                model: model.to_string(),
                supported: SUPPORTED_MODELS.join(", "),
            });
        }

        let encoder = if model.starts_with("claude-") {
            tiktoken_rs::cl100k_base()
        } else {
            tiktoken_rs::get_bpe_from_model(model)
        }
        .map_err(|e| NanoError::Tokenizer(format!("{}: {}", model, e)))?;

        Ok(Self {
            model: model.to_string(),
            encoder: Arc::new(encoder),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 文本的 token 数
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder.encode_ordinary(text).len()
    }

    /// 一组消息加上回复前缀的 token 总数
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| MESSAGE_OVERHEAD + self.count_text(&m.content))
            .sum::<usize>()
            + REPLY_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_unsupported_model_is_rejected() {
        let err = Tokenizer::for_model("llama-3-70b").unwrap_err();
        assert!(matches!(err, NanoError::UnsupportedModel { ref model, .. } if model == "llama-3-70b"));
    }

    #[test]
    fn test_empty_history_counts_reply_overhead_only() {
        let tokenizer = Tokenizer::for_model("claude-2").unwrap();
        assert_eq!(tokenizer.count_messages(&[]), REPLY_OVERHEAD);
    }

    #[test]
    fn test_count_messages_adds_overhead_per_message() {
        let tokenizer = Tokenizer::for_model("claude-3-opus-20240229").unwrap();
        let messages = vec![
            Message { role: Role::User, content: "Hello there".into() },
            Message { role: Role::Assistant, content: String::new() },
        ];
        let expected = tokenizer.count_text("Hello there") + 2 * MESSAGE_OVERHEAD + REPLY_OVERHEAD;
        assert_eq!(tokenizer.count_messages(&messages), expected);
        assert!(tokenizer.count_text("Hello there") > 0);
    }
}
