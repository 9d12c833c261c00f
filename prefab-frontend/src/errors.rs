use std::path::PathBuf;

use prefab_engine::errors::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取文档 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析文档 {path:?} 失败: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("工作流执行失败: {0}")]
    Engine(#[from] EngineError),
}
