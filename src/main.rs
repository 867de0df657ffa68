use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use jar_api_guard::cli::{self, Command};
use jar_api_guard::ApiConfig;

/// Jar Public API Guard
///
/// 对比 jar 的公共 API 与参考 dump，并检查编译期依赖泄漏
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 输出 JSON 格式 (默认输出人类可读格式)
    #[arg(long, global = true)]
    json: bool,

    /// 项目根目录
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// 配置文件 (默认 <project>/api.properties)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志 (stdout 只输出命令结果)
    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("invalid log level '{}'", args.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = match &args.config {
        Some(path) => ApiConfig::load(path, &args.project),
        None => ApiConfig::discover(&args.project),
    }
    .context("loading configuration")?;

    cli::handle_command(args.command, &config, args.json)
}
