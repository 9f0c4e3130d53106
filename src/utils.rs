//! 工具函数模块
use crate::types::{Message, Role};

/// 创建消息的便捷函数
///
/// # 参数
///
/// * `role` - 消息角色
/// * `content` - 消息内容
pub fn message(role: Role, content: &str) -> Message {
    Message {
        role,
        content: content.to_string(),
    }
}

/// 选出本次请求要发送的消息
///
/// 携带历史时发送完整对话，否则只发送以用户身份提交的提示本身
pub(crate) fn outgoing_messages(history: &[Message], prompt: &str, preserve_history: bool) -> Vec<Message> {
    if preserve_history {
        history.to_vec()
    } else {
        vec![message(Role::User, prompt)]
    }
}
