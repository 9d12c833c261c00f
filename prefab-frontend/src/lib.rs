pub mod cli;
pub mod errors;
pub mod loader;

use std::path::PathBuf;

use errors::FrontendError;
use prefab_config::AppConfig;
use prefab_engine::session::{AttributeNames, CategoryNames, SessionSettings, ToggleRule};
use prefab_engine::workflow::WorkflowOptions;
use tracing::info;

/// 命令行传入的演示参数。
#[derive(Debug, Clone, Default)]
pub struct DemoOptions {
    pub document: Option<PathBuf>,
    pub label: Option<String>,
}

/// 启动 CLI 演示或返回错误。
pub fn run_cli_demo(config: &AppConfig, options: &DemoOptions) -> Result<(), FrontendError> {
    info!(
        document = ?options.document,
        label = ?options.label,
        "启动 CLI 演示前端"
    );
    cli::run_demo(config, options)
}

/// 由配置生成引擎会话设置。
pub fn session_settings(config: &AppConfig) -> SessionSettings {
    let categories = &config.categories;
    let attributes = &config.attributes;
    SessionSettings {
        tolerance: config.workflow.tolerance,
        categories: CategoryNames {
            conduit: categories.conduit.clone(),
            fitting: categories.fitting.clone(),
            marker: categories.marker.clone(),
            label: categories.label.clone(),
            boundary: categories.boundary.clone(),
        },
        attributes: AttributeNames {
            code: attributes.code.clone(),
            diameter: attributes.diameter.clone(),
            length: attributes.length.clone(),
            size: attributes.size.clone(),
            article_number: attributes.article_number.clone(),
            warning: attributes.warning.clone(),
            feature_flag: attributes.feature_flag.clone(),
        },
        toggles: config
            .toggles
            .iter()
            .map(|rule| ToggleRule::new(&rule.marker, &rule.keyword, &rule.feature))
            .collect(),
    }
}

pub fn workflow_options(config: &AppConfig) -> WorkflowOptions {
    WorkflowOptions {
        boundary_prompt: config.workflow.boundary_prompt.clone(),
        label_placeholder: config.workflow.label_placeholder.clone(),
    }
}
