//! 对话历史管理模块
use crate::types::{Message, Role};
use crate::utils::message;
use std::collections::HashMap;

/// 按对话 ID 划分的消息历史
///
/// 每个 ID 对应一段按时间排序的消息序列，只存在于内存中
#[derive(Debug, Clone, Default)]
pub struct Conversations {
    inner: HashMap<String, Vec<Message>>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将对话重置为空序列
    pub fn reset(&mut self, id: &str) {
        self.inner.insert(id.to_string(), Vec::new());
    }

    /// 追加一条消息
    ///
    /// 对话不存在或 `preserve_history` 为 `false` 时先重置
    pub fn append(&mut self, id: &str, role: Role, content: &str, preserve_history: bool) {
        self.entry(id, preserve_history).push(message(role, content));
    }

    /// 取得对话的可变引用，必要时先重置
    pub(crate) fn entry(&mut self, id: &str, preserve_history: bool) -> &mut Vec<Message> {
        if !preserve_history || !self.inner.contains_key(id) {
            self.reset(id);
        }
        self.inner.entry(id.to_string()).or_default()
    }

    /// 对话的只读视图，不存在时返回空切片
    pub fn get(&self, id: &str) -> &[Message] {
        self.inner.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// 删除下标为 1 的消息，保留第一条
    ///
    /// 只剩一条或没有消息时返回 `false`
    pub(crate) fn drop_second(&mut self, id: &str) -> bool {
        match self.inner.get_mut(id) {
            Some(messages) if messages.len() > 1 => {
                messages.remove(1);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_call_order() {
        let mut convos = Conversations::new();
        for i in 0..5 {
            convos.append("a", Role::User, &format!("m{}", i), true);
        }
        let history = convos.get("a");
        assert_eq!(history.len(), 5);
        for (i, msg) in history.iter().enumerate() {
            assert_eq!(msg.content, format!("m{}", i));
        }
    }

    #[test]
    fn test_append_without_history_resets_first() {
        let mut convos = Conversations::new();
        convos.append("a", Role::User, "first", true);
        convos.append("a", Role::Assistant, "second", true);
        convos.append("a", Role::User, "fresh", false);
        assert_eq!(convos.get("a"), &[message(Role::User, "fresh")]);
    }

    #[test]
    fn test_ids_are_independent() {
        let mut convos = Conversations::new();
        convos.append("a", Role::User, "hello", true);
        convos.append("b", Role::User, "bonjour", true);
        convos.reset("a");
        assert!(convos.get("a").is_empty());
        assert!(convos.contains("a"));
        assert_eq!(convos.get("b").len(), 1);
        assert!(convos.get("missing").is_empty());
        assert!(!convos.contains("missing"));
    }

    #[test]
    fn test_drop_second_keeps_first_message() {
        let mut convos = Conversations::new();
        convos.append("a", Role::User, "one", true);
        convos.append("a", Role::Assistant, "two", true);
        convos.append("a", Role::User, "three", true);
        assert!(convos.drop_second("a"));
        assert_eq!(convos.get("a")[0].content, "one");
        assert_eq!(convos.get("a")[1].content, "three");
        assert!(convos.drop_second("a"));
        assert!(!convos.drop_second("a"));
        assert_eq!(convos.get("a").len(), 1);
    }
}
