//! 规则编辑器命令行
//!
//! 从标准输入读取编辑命令，每次变更后把规则列表的 JSON 快照输出到标准输出；
//! 日志写入标准错误。

use anyhow::{Context, Result};
use clap::Parser;
use rule_editor::shell::{HELP, spawn_line_reader};
use rule_editor::{Reply, RuleOptions, RuleStore, RuleTester, Shell};
use rule_editor_shared::config::AppConfig;
use rule_editor_shared::observability;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rule-editor")]
#[command(about = "Interactive editor for json-rules-engine rule lists", long_about = None)]
struct Cli {
    /// 初始规则列表 JSON
    #[arg(long, conflicts_with = "file")]
    value: Option<String>,

    /// 从文件读取初始规则列表 JSON
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load("rule-editor").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    observability::init(&config.observability)?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        "Starting rule editor..."
    );

    let initial_value = match (&cli.value, &cli.file) {
        (Some(value), _) => Some(value.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, None) => None,
    };

    let show_rule_tester = config.editor.show_rule_tester;
    let options = RuleOptions::from(config.editor);
    let tester = show_rule_tester.then(|| RuleTester::new(&options.facts));

    let mut store = RuleStore::new(options, initial_value.as_deref());
    info!(rules = store.len(), "Rule store initialized");
    store.subscribe(|snapshot| println!("{}", snapshot));

    let mut shell = Shell::new(store, tester);
    println!("{}", HELP);

    tokio::select! {
        _ = run_loop(&mut shell) => {}
        _ = shutdown_signal() => {}
    }

    info!("Rule editor stopped");
    Ok(())
}

/// 逐行读取并执行命令，直到 `quit` 或输入结束
///
/// 标准输入在独立线程上读取，Ctrl+C 时进程可以立即退出。
async fn run_loop(shell: &mut Shell) {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));

    while let Some(line) = lines.recv().await {
        match shell.handle_line(&line).await {
            Ok(Reply::Text(text)) if !text.is_empty() => println!("{}", text),
            Ok(Reply::Quit) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(command = %line.trim(), error = %e, "Command failed");
                eprintln!("error: {}", e);
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
