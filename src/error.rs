//! 错误处理模块

use thiserror::Error;

/// nanoconvo 的统一错误类型
///
/// 所有错误都会立即向上传播，库内部不做任何重试
#[derive(Debug, Error)]
pub enum NanoError {
    /// HTTP 请求相关错误
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON处理错误: {0}")]
    Json(String),

    /// 服务端返回了非成功状态码
    #[error("请求失败: {status} {reason} {body}")]
    RequestFailed {
        /// HTTP 状态码
        status: u16,
        /// 状态码对应的原因短语
        reason: String,
        /// 原始响应体
        body: String,
    },

    /// 当前模型不在 token 计数支持列表中
    #[error("不支持的模型: {model}，可选模型: {supported}")]
    UnsupportedModel {
        /// 配置的模型名称
        model: String,
        /// 支持的模型列表
        supported: String,
    },

    /// 无法识别的流式帧
    #[error("帧解析错误: {0}")]
    Frame(String),

    /// 分词器加载失败
    #[error("分词器错误: {0}")]
    Tokenizer(String),

    /// 请求参数无效
    #[error("请求参数无效: {0}")]
    InvalidRequest(String),

    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),

    /// UTF8转换错误
    #[error("UTF8转换错误: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// nanoconvo 的 Result 类型别名
pub type Result<T> = std::result::Result<T, NanoError>;

impl From<serde_json::Error> for NanoError {
    fn from(e: serde_json::Error) -> Self {
        NanoError::Json(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for NanoError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        NanoError::Utf8(e.utf8_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_display_carries_all_fields() {
        let err = NanoError::RequestFailed {
            status: 529,
            reason: "Overloaded".into(),
            body: "{\"type\":\"error\"}".into(),
        };
        let text = err.to_string();
        assert!(text.contains("529"));
        assert!(text.contains("Overloaded"));
        assert!(text.contains("{\"type\":\"error\"}"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert!(matches!(NanoError::from(parse), NanoError::Json(_)));
    }
}
