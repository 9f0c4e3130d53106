//! 配置模块
use crate::error::{NanoError, Result};
use crate::types::Role;
use std::env;
use std::time::Duration;

// ===============================================================================================
// 配置模块
// ===============================================================================================

/// 默认模型
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
/// 默认接口地址
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// `anthropic-version` 请求头的取值
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
/// 单次请求默认的最大生成 token 数
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// 对话客户端配置
///
/// 构造之后不可变，单次调用的覆盖项通过 [`AskOptions`] 传入
#[derive(Debug, Clone)]
pub struct Config {
    /// API 密钥
    pub(crate) api_key: String,
    /// 实例默认模型
    pub(crate) model: String,
    /// 外部（环境变量）提供的模型覆盖，只在构造时读取一次
    pub(crate) env_model: Option<String>,
    /// 系统提示词
    pub(crate) system_prompt: String,
    /// 温度参数
    pub(crate) temperature: f32,
    /// Top-p 参数
    pub(crate) top_p: f32,
    /// 接口完整地址
    pub(crate) api_url: String,
    /// `anthropic-version` 请求头
    pub(crate) api_version: String,
    /// 请求超时时间，默认不设置
    pub(crate) timeout: Option<Duration>,
    /// 截断对话时允许的最大 token 数
    pub(crate) truncate_limit: usize,
    /// 连接池空闲超时时间
    pub(crate) pool_idle_timeout: Duration,
    /// TCP Keepalive
    pub(crate) tcp_keepalive: Duration,
    /// TCP Nodelay
    pub(crate) tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            env_model: None,
            system_prompt:
                "You are ChatGPT, a large language model trained by OpenAI. Respond conversationally"
                    .into(),
            temperature: 0.5,
            top_p: 0.7,
            api_url: DEFAULT_API_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            timeout: None,
            truncate_limit: 3500,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

/// 生成 builder 方法的宏
///
/// 自动生成 `with_field_name` 形式的 builder 方法
macro_rules! config_builder {
    ($field:ident, $type:ty) => {
        paste::paste! {
            #[doc = "设置 `"]
            #[doc = stringify!($field)]
            #[doc = "`"]
            pub fn [<with_ $field>](mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        }
    };
    ($field:ident, $type:ty, option) => {
        paste::paste! {
            #[doc = "设置 `"]
            #[doc = stringify!($field)]
            #[doc = "`"]
            pub fn [<with_ $field>](mut self, $field: $type) -> Self {
                self.$field = Some($field);
                self
            }
        }
    };
}

impl Config {
    pub fn api_key(&self) -> &str { &self.api_key }
    pub fn model(&self) -> &str { &self.model }
    pub fn env_model(&self) -> Option<&str> { self.env_model.as_deref() }
    pub fn system_prompt(&self) -> &str { &self.system_prompt }
    pub fn temperature(&self) -> f32 { self.temperature }
    pub fn top_p(&self) -> f32 { self.top_p }
    pub fn api_url(&self) -> &str { &self.api_url }
    pub fn api_version(&self) -> &str { &self.api_version }
    pub fn timeout(&self) -> Option<Duration> { self.timeout }
    pub fn truncate_limit(&self) -> usize { self.truncate_limit }

    /// 从环境变量和 `.env` 文件加载配置
    ///
    /// 环境变量会覆盖 `.env` 文件中的设置。读取的变量：
    ///
    /// * `CLAUDE_API_KEY` - 必填
    /// * `GPT_ENGINE` - 实例默认模型
    /// * `MODEL_NAME` - 外部模型覆盖，优先级高于 `GPT_ENGINE`
    /// * `API_URL` - 接口地址
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_key = non_empty_var("CLAUDE_API_KEY")
            .ok_or_else(|| NanoError::Config("CLAUDE_API_KEY not found".into()))?;

        let defaults = Config::default();
        Ok(Config {
            api_key,
            model: non_empty_var("GPT_ENGINE").unwrap_or(defaults.model.clone()),
            env_model: non_empty_var("MODEL_NAME"),
            api_url: non_empty_var("API_URL").unwrap_or(defaults.api_url.clone()),
            ..defaults
        })
    }

    // 使用宏生成 builder 方法
    config_builder!(api_key, String);
    config_builder!(model, String);
    config_builder!(env_model, String, option);
    config_builder!(system_prompt, String);
    config_builder!(temperature, f32);
    config_builder!(top_p, f32);
    config_builder!(api_url, String);
    config_builder!(api_version, String);
    config_builder!(timeout, Duration, option);
    config_builder!(truncate_limit, usize);
    config_builder!(pool_idle_timeout, Duration);
    config_builder!(tcp_keepalive, Duration);
    config_builder!(tcp_nodelay, bool);
}

/// 空字符串视为未设置
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// 按优先级解析本次请求使用的模型
///
/// 调用方覆盖 > 外部（环境）配置 > 实例默认值
pub fn resolve_model<'a>(
    call_override: Option<&'a str>,
    external: Option<&'a str>,
    instance_default: &'a str,
) -> &'a str {
    call_override.or(external).unwrap_or(instance_default)
}

// ===============================================================================================
// 单次调用参数
// ===============================================================================================

/// `stream_reply` 的单次调用参数
///
/// 未设置的采样参数、密钥与超时沿用 [`Config`] 中的值
#[derive(Debug, Clone)]
pub struct AskOptions {
    /// 提示消息的角色
    pub(crate) role: Role,
    /// 模型覆盖
    pub(crate) model: Option<String>,
    /// 是否携带历史消息
    pub(crate) preserve_history: bool,
    /// 最大生成 token 数
    pub(crate) max_tokens: u32,
    pub(crate) api_key: Option<String>,
    pub(crate) temperature: Option<f32>,
    pub(crate) top_p: Option<f32>,
    pub(crate) timeout: Option<Duration>,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            role: Role::User,
            model: None,
            preserve_history: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
            temperature: None,
            top_p: None,
            timeout: None,
        }
    }
}

impl AskOptions {
    config_builder!(role, Role);
    config_builder!(model, String, option);
    config_builder!(preserve_history, bool);
    config_builder!(max_tokens, u32);
    config_builder!(api_key, String, option);
    config_builder!(temperature, f32, option);
    config_builder!(top_p, f32, option);
    config_builder!(timeout, Duration, option);
}
