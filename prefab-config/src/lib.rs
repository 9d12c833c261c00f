use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub attributes: AttributeConfig,
    #[serde(default = "AppConfig::default_toggles")]
    pub toggles: Vec<ToggleConfig>,
    #[serde(default)]
    pub frontend: FrontendConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            workflow: WorkflowConfig::default(),
            categories: CategoryConfig::default(),
            attributes: AttributeConfig::default(),
            toggles: Self::default_toggles(),
            frontend: FrontendConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `PREFAB_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("PREFAB_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    fn default_toggles() -> Vec<ToggleConfig> {
        vec![
            ToggleConfig {
                marker: "var. dn/od".to_string(),
                keyword: "multibocht".to_string(),
                feature: "2x45°".to_string(),
            },
            ToggleConfig {
                marker: "var. dn/od".to_string(),
                keyword: "liggend".to_string(),
                feature: "switch_excentriciteit".to_string(),
            },
        ]
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// 端点重合判定容差。
    #[serde(default = "WorkflowConfig::default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "WorkflowConfig::default_label_placeholder")]
    pub label_placeholder: String,
    #[serde(default = "WorkflowConfig::default_boundary_prompt")]
    pub boundary_prompt: String,
}

impl WorkflowConfig {
    fn default_tolerance() -> f64 {
        1e-6
    }

    fn default_label_placeholder() -> String {
        "prefab 5.5.5".to_string()
    }

    fn default_boundary_prompt() -> String {
        "Select boundary lines".to_string()
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            label_placeholder: Self::default_label_placeholder(),
            boundary_prompt: Self::default_boundary_prompt(),
        }
    }
}

/// 宿主类别名称。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub conduit: String,
    pub fitting: String,
    pub marker: String,
    pub label: String,
    pub boundary: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            conduit: "Pipes".to_string(),
            fitting: "Pipe Fittings".to_string(),
            marker: "Pipe Tags".to_string(),
            label: "Text Notes".to_string(),
            boundary: "Lines".to_string(),
        }
    }
}

/// 参数名称；`diameter` 按顺序尝试。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    pub code: String,
    pub diameter: Vec<String>,
    pub length: String,
    pub size: String,
    pub article_number: String,
    pub warning: String,
    pub feature_flag: String,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            code: "Comments".to_string(),
            diameter: vec![
                "Outside Diameter".to_string(),
                "Diameter".to_string(),
                "Nominal Diameter".to_string(),
            ],
            length: "Length".to_string(),
            size: "Size".to_string(),
            article_number: "GEB_Article_Number".to_string(),
            warning: "waarschuwing".to_string(),
            feature_flag: "2x45°".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToggleConfig {
    pub marker: String,
    pub keyword: String,
    pub feature: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendConfig {
    /// JSON 格式的示例文档；缺省时使用内置演示文档。
    #[serde(default)]
    pub sample_document: Option<PathBuf>,
    /// 控制台表格使用的标签文本；缺省时沿用占位文本。
    #[serde(default)]
    pub label_text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
