use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use prefab_config::AppConfig;
use prefab_core::document::{Document, ViewId};
use prefab_engine::demo::{DemoEntities, populate_demo};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 内置演示文档使用的视图。
pub const DEMO_VIEW: ViewId = ViewId::new(1);

/// JSON 文档文件：活动视图 + 实体仓库。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    #[serde(default = "DocumentFile::default_view")]
    pub active_view: ViewId,
    pub document: Document,
}

impl DocumentFile {
    fn default_view() -> ViewId {
        DEMO_VIEW
    }
}

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Json(PathBuf),
    Demo,
}

#[derive(Debug)]
pub struct LoadedDocument {
    pub document: Document,
    pub view: ViewId,
    pub source: DocumentSource,
    pub demo_entities: Option<DemoEntities>,
}

impl LoadedDocument {
    pub fn demo() -> Self {
        let mut document = Document::new();
        let demo_entities = populate_demo(&mut document, DEMO_VIEW);
        Self {
            document,
            view: DEMO_VIEW,
            source: DocumentSource::Demo,
            demo_entities: Some(demo_entities),
        }
    }
}

/// 从 JSON 文件加载文档。
pub fn load_document(path: &Path) -> Result<LoadedDocument, FrontendError> {
    let content = fs::read_to_string(path).map_err(|source| FrontendError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DocumentFile =
        serde_json::from_str(&content).map_err(|source| FrontendError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        path = %path.display(),
        entities = file.document.entities().count(),
        "从 JSON 加载文档成功"
    );
    Ok(LoadedDocument {
        document: file.document,
        view: file.active_view,
        source: DocumentSource::Json(path.to_path_buf()),
        demo_entities: None,
    })
}

/// 选择文档来源：显式路径失败时返回错误；
/// 否则依次尝试环境变量 `PREFAB_SAMPLE_DOCUMENT` 与配置中的 `sample_document`，
/// 加载失败则回退到内置演示文档。
pub fn load_document_or_demo(
    explicit: Option<&Path>,
    config: &AppConfig,
) -> Result<LoadedDocument, FrontendError> {
    if let Some(path) = explicit {
        return load_document(path);
    }

    let candidate = env::var_os("PREFAB_SAMPLE_DOCUMENT")
        .map(PathBuf::from)
        .or_else(|| config.frontend.sample_document.clone());
    if let Some(path) = candidate {
        match load_document(&path) {
            Ok(loaded) => return Ok(loaded),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载示例文档失败，回退到内置演示");
            }
        }
    }
    Ok(LoadedDocument::demo())
}
