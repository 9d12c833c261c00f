use std::env;
use std::path::PathBuf;

use clap::Parser;
use prefab_config::{AppConfig, ConfigError, WorkflowConfig};
use prefab_frontend::DemoOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 预制管段区域编码工具（控制台演示）。
#[derive(Debug, Parser)]
#[command(name = "prefab-app", version, about)]
struct Cli {
    /// 配置文件路径，缺省时自动发现
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON 文档路径，缺省时使用示例文档或内置演示
    #[arg(long, value_name = "PATH")]
    document: Option<PathBuf>,

    /// 标签文本，例如 "prefab 5.5.5"
    #[arg(long, value_name = "TEXT")]
    label: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let (config, issues) = load_configuration(cli.config);
    init_logging(&config);
    for issue in &issues {
        warn!("{issue}");
    }
    info!(
        tolerance = config.workflow.tolerance,
        placeholder = %config.workflow.label_placeholder,
        "启动预制编码应用"
    );

    let options = DemoOptions {
        document: cli.document,
        label: cli.label,
    };
    if let Err(err) = prefab_frontend::run_cli_demo(&config, &options) {
        error!(error = %err, "执行 CLI 演示失败");
        eprintln!("错误: {err}");
        std::process::exit(1);
    }
}

/// 加载配置：`--config` 优先，其次 `PREFAB_CONFIG`，最后自动发现 `./config/default.toml`。
/// 日志尚未初始化，问题以文本形式返回，由调用方在初始化后输出。
fn load_configuration(override_path: Option<PathBuf>) -> (AppConfig, Vec<String>) {
    let mut issues = Vec::new();
    let explicit = override_path.or_else(|| env::var_os("PREFAB_CONFIG").map(PathBuf::from));
    let loaded = match &explicit {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    let mut config = loaded.unwrap_or_else(|err| {
        let origin = match &err {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                path.display().to_string()
            }
            ConfigError::Context { .. } => "./config/default.toml".to_string(),
        };
        issues.push(format!("加载配置 {origin} 失败，使用内建默认值: {err}"));
        AppConfig::default()
    });
    issues.extend(repair_workflow(&mut config.workflow));
    (config, issues)
}

/// 修正无法使用的 `[workflow]` 取值，返回每项修正的说明。
fn repair_workflow(workflow: &mut WorkflowConfig) -> Vec<String> {
    let defaults = WorkflowConfig::default();
    let mut repaired = Vec::new();
    if !workflow.tolerance.is_finite() || workflow.tolerance <= 0.0 {
        repaired.push(format!(
            "workflow.tolerance = {} 无效，改用 {}",
            workflow.tolerance, defaults.tolerance
        ));
        workflow.tolerance = defaults.tolerance;
    }
    if workflow.label_placeholder.trim().is_empty() {
        repaired.push(format!(
            "workflow.label_placeholder 为空，改用 \"{}\"",
            defaults.label_placeholder
        ));
        workflow.label_placeholder = defaults.label_placeholder;
    }
    if workflow.boundary_prompt.trim().is_empty() {
        workflow.boundary_prompt = defaults.boundary_prompt;
    }
    repaired
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_workflow_values_are_repaired() {
        let mut workflow = WorkflowConfig {
            tolerance: -1.0,
            label_placeholder: "  ".to_string(),
            boundary_prompt: String::new(),
        };
        let repaired = repair_workflow(&mut workflow);
        assert_eq!(repaired.len(), 2);
        assert_eq!(workflow.tolerance, WorkflowConfig::default().tolerance);
        assert_eq!(workflow.label_placeholder, "prefab 5.5.5");
        assert_eq!(workflow.boundary_prompt, "Select boundary lines");
    }

    #[test]
    fn valid_workflow_is_left_alone() {
        let mut workflow = WorkflowConfig::default();
        workflow.tolerance = 0.5;
        assert!(repair_workflow(&mut workflow).is_empty());
        assert_eq!(workflow.tolerance, 0.5);
    }

    #[test]
    fn missing_explicit_file_falls_back_with_issue() {
        let dir = tempfile::tempdir().unwrap();
        let (config, issues) = load_configuration(Some(dir.path().join("absent.toml")));
        assert_eq!(config.logging.level, "info");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("absent.toml"));
    }
}
