//! CLI 模式处理器
//!
//! 提供命令行接口，默认输出人类可读格式
//! 使用 --json 参数可输出 JSON 格式

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::{json, Value};

use crate::archive::ClassArchive;
use crate::check::{check_modules, dump_module};
use crate::config::ApiConfig;
use crate::error::ApiCheckError;
use crate::leak::{LeakReport, LeakScanner};
use crate::target::{discover_modules, ModuleTarget};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// ✅ 公共 API 检查 - 对比参考文件并扫描泄漏
    Check {
        /// 模块名 (可重复，默认检查全部已发现模块)
        #[arg(short, long = "module")]
        modules: Vec<String>,
    },

    /// 📄 输出模块的公共 API dump
    Dump {
        /// 模块名
        #[arg(short, long)]
        module: String,
    },

    /// 🔬 扫描单个 jar 中的禁用签名
    Scan {
        /// jar 路径
        #[arg(short, long)]
        jar: PathBuf,

        /// 禁用签名 (默认取配置 leak.signature)
        #[arg(long)]
        signature: Option<String>,
    },

    /// 📦 列出已发现的模块
    Modules,

    /// ⚙️ 显示当前配置
    Status,
}

/// Command result plus whether the process should exit successfully
struct Output {
    value: Value,
    success: bool,
}

impl Output {
    fn ok(value: Value) -> Self {
        Self { value, success: true }
    }
}

/// 处理 CLI 命令
///
/// json_output: 是否输出 JSON 格式（默认 false，输出人类可读格式）
pub fn handle_command(cmd: Command, config: &ApiConfig, json_output: bool) -> Result<()> {
    let result = match cmd {
        Command::Check { modules } => run_check(config, &modules, json_output),
        Command::Dump { module } => run_dump(config, &module, json_output),
        Command::Scan { jar, signature } => run_scan(config, jar, signature, json_output),
        Command::Modules => run_modules(config, json_output),
        Command::Status => run_status(config, json_output),
    };

    // 输出结果
    match result {
        Ok(output) => {
            if json_output {
                let wrapped = json!({
                    "success": output.success,
                    "data": output.value
                });
                println!("{}", serde_json::to_string_pretty(&wrapped)?);
            } else {
                print_value(&output.value);
            }
            if !output.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            if json_output {
                let wrapped = json!({
                    "success": false,
                    "error": format!("{e:#}")
                });
                println!("{}", serde_json::to_string_pretty(&wrapped)?);
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 打印 Value，字符串原样输出
fn print_value(value: &Value) {
    match value {
        Value::String(s) if s.ends_with('\n') => print!("{s}"),
        Value::String(s) => println!("{s}"),
        _ => println!("{}", serde_json::to_string_pretty(value).unwrap_or_default()),
    }
}

/// Pick targets by module name or `root/module`; empty selection means all
fn select_targets(config: &ApiConfig, names: &[String]) -> Result<Vec<ModuleTarget>> {
    let discovered = discover_modules(config);
    if names.is_empty() {
        return Ok(discovered);
    }

    names
        .iter()
        .map(|name| {
            discovered
                .iter()
                .find(|t| &t.module == name || &t.to_string() == name)
                .cloned()
                .with_context(|| format!("Unknown module: {name}"))
        })
        .collect()
}

fn error_json(e: &ApiCheckError) -> Value {
    json!({ "kind": e.kind(), "message": e.to_string() })
}

fn run_check(config: &ApiConfig, names: &[String], json_output: bool) -> Result<Output> {
    let targets = select_targets(config, names)?;
    if targets.is_empty() {
        bail!("No modules found under {}", config.project_dir.display());
    }

    let results = check_modules(config, &targets);
    let failed = results
        .iter()
        .filter(|(_, r)| !matches!(r, Ok(report) if report.is_success()))
        .count();

    let value = if json_output {
        let modules: Vec<Value> = results
            .iter()
            .map(|(target, result)| match result {
                Ok(report) => match report.ensure_clean() {
                    Ok(()) => json!({ "module": target, "success": true, "report": report }),
                    Err(e) => json!({
                        "module": target,
                        "success": false,
                        "report": report,
                        "error": error_json(&e)
                    }),
                },
                Err(e) => json!({ "module": target, "success": false, "error": error_json(e) }),
            })
            .collect();
        json!({ "checked": results.len(), "failed": failed, "modules": modules })
    } else {
        let mut lines = Vec::with_capacity(results.len() + 1);
        for (target, result) in &results {
            let outcome = result
                .as_ref()
                .map_err(|e| e.to_string())
                .and_then(|report| report.ensure_clean().map(|_| report).map_err(|e| e.to_string()));
            match outcome {
                Ok(report) => lines.push(format!(
                    "✅ {target}: {} classes, {} members",
                    report.classes, report.members
                )),
                Err(message) => lines.push(format!("❌ {target}: {message}")),
            }
        }
        lines.push(format!("\n{} module(s) checked, {} failed", results.len(), failed));
        json!(lines.join("\n"))
    };

    Ok(Output {
        value,
        success: failed == 0,
    })
}

fn run_dump(config: &ApiConfig, name: &str, json_output: bool) -> Result<Output> {
    let target = select_targets(config, &[name.to_string()])?.remove(0);
    let dump = dump_module(config, &target).with_context(|| format!("Cannot dump {target}"))?;

    if json_output {
        Ok(Output::ok(json!({ "module": target, "dump": dump })))
    } else {
        Ok(Output::ok(json!(dump)))
    }
}

fn run_scan(
    config: &ApiConfig,
    jar: PathBuf,
    signature: Option<String>,
    json_output: bool,
) -> Result<Output> {
    let signature = signature.unwrap_or_else(|| config.leak_signature.clone());
    if signature.is_empty() {
        bail!("Signature must not be empty");
    }

    let mut archive = ClassArchive::open(&jar)?;
    let units = archive.read_units()?;
    let report = LeakScanner::new(signature.as_bytes()).scan(
        units
            .iter()
            .map(|u| (u.name.as_str(), u.bytes.as_slice())),
    );
    let success = report.is_clean();

    let value = if json_output {
        json!({
            "archive": jar,
            "signature": signature,
            "scanned": units.len(),
            "report": report
        })
    } else {
        match &report {
            LeakReport::Clean => json!(format!(
                "✅ {}: {} units, no reference to {signature}",
                jar.display(),
                units.len()
            )),
            LeakReport::Leak(found) => json!(format!(
                "❌ {}: {} unit(s) reference {signature}\n{}",
                jar.display(),
                found.len(),
                found.join("\n")
            )),
        }
    };

    Ok(Output { value, success })
}

fn run_modules(config: &ApiConfig, json_output: bool) -> Result<Output> {
    let targets = discover_modules(config);
    if json_output {
        return Ok(Output::ok(json!(targets)));
    }
    let lines: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    Ok(Output::ok(json!(lines.join("\n"))))
}

fn run_status(config: &ApiConfig, json_output: bool) -> Result<Output> {
    let version = env!("CARGO_PKG_VERSION");
    if json_output {
        return Ok(Output::ok(json!({
            "version": version,
            "config": config
        })));
    }

    let internal = if config.internal_packages.is_empty() {
        "-".to_string()
    } else {
        config.internal_packages.join(" ")
    };
    Ok(Output::ok(json!(format!(
        "Jar API Guard v{version}\n\
        Project: {}\n\
        Module roots: {} (marker: {})\n\
        Internal packages: {internal}\n\
        Reference dir: {}\n\
        Leak signature: {}\n\
        Honor module exports: {}",
        config.project_dir.display(),
        config.module_roots.join(" "),
        config.module_marker,
        config.resolved_reference_dir().display(),
        config.leak_signature,
        config.honor_module_exports
    ))))
}
