//! # 流式对话示例
//!
//! 这个示例展示了如何使用 nanoconvo 的流式功能：
//! - 从环境变量加载配置
//! - 创建 ConversationClient 实例
//! - 发送流式请求并实时输出回复
//! - 查看写回后的对话历史
//!
//! 运行方式：`cargo run --example ask_stream -- "你好"`

use futures::StreamExt;
use nanoconvo::error::Result;
use nanoconvo::{AskOptions, Config, ConversationClient};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 从环境变量加载配置 (需要设置 CLAUDE_API_KEY)
    let config = Config::from_env()?;
    let mut client = ConversationClient::new(config)?;

    let prompt = std::env::args().nth(1).unwrap_or_else(|| "hi".to_string());

    let mut reply = client
        .stream_reply("default", &prompt, AskOptions::default())
        .await?;
    while let Some(chunk) = reply.next().await {
        print!("{}", chunk?);
        std::io::stdout().flush().ok();
    }
    println!();
    drop(reply);

    for msg in client.history("default") {
        println!("[{:?}] {}", msg.role, msg.content);
    }
    if let Ok(tokens) = client.count_tokens("default") {
        println!("total tokens: {}", tokens);
    }

    Ok(())
}
