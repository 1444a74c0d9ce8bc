//! HR Agent 命令行入口
//!
//! 每行标准输入作为一个回合发送到同一线程，答案写到标准输出；日志写标准错误。
//! 用法：hr-agent [--thread <id>] [--config <path>]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use hr_agent::{agent::build_runner, config::load_config, observability};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "hr-agent", version, about = "员工档案问答：每行标准输入作为一个回合")]
struct Cli {
    /// 会话线程 ID（默认随机生成）
    #[arg(short, long)]
    thread: Option<String>,
    /// 额外的配置文件，覆盖 config/default.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let thread_id = cli
        .thread
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let cfg = load_config(cli.config).context("Failed to load config")?;
    let runner = build_runner(&cfg).await.context("Failed to build agent")?;
    tracing::info!(thread_id = %thread_id, "ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let answer = match runner.run_conversation_turn(&thread_id, &line).await {
            Ok(answer) => answer,
            Err(e) => format!("[{}] {}", e.code(), e.message()),
        };
        stdout.write_all(answer.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    let (prompt, completion, total) = runner.token_usage();
    tracing::info!(prompt, completion, total, "session token usage");
    Ok(())
}
