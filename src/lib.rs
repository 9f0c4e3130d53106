//! # nanoconvo - 轻量级流式对话客户端
//!
//! nanoconvo 封装了 Claude Messages API 的流式接口：
//! 在内存中按对话 ID 维护消息历史，发起流式请求，并在文本到达时逐块产出。
//!
//! ## 主要特性
//!
//! - 🔄 **流式响应**：基于 `futures::Stream` 的拉取式回复流，读一块解析一块。
//! - 🗂️ **多对话**：调用方自定义对话 ID，各自独立维护历史。
//! - 🧮 **Token 计数**：基于 `tiktoken-rs`，可选地按上限截断对话。
//! - 🔧 **分层配置**：单次调用覆盖 > 环境变量 > 实例默认值。
//! - 🛡️ **错误处理**：结构化的错误类型，失败的请求携带状态码、原因与响应体。
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use nanoconvo::{AskOptions, Config, ConversationClient};
//! use nanoconvo::error::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // 从环境变量加载配置 (需要设置 CLAUDE_API_KEY)
//!     let config = Config::from_env()?;
//!     let mut client = ConversationClient::new(config)?;
//!
//!     let mut reply = client.stream_reply("default", "hi", AskOptions::default()).await?;
//!     while let Some(chunk) = reply.next().await {
//!         print!("{}", chunk?);
//!     }
//!     drop(reply);
//!
//!     println!("\n{} messages", client.history("default").len());
//!     Ok(())
//! }
//! ```

// 模块定义
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod stream;
pub mod tokenizer;
pub mod types;
pub mod utils;

pub use client::ConversationClient;
pub use config::{AskOptions, Config};
pub use error::{NanoError, Result};
pub use stream::ReplyStream;
pub use types::{Message, Role};
pub use utils::message;
