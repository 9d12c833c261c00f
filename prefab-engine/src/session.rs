use prefab_core::document::ViewId;

use crate::model::DocumentModel;

/// 边界拼接与点重合判定的默认容差（与宿主内部单位一致）。
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// 宿主类别名称到角色的映射。
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNames {
    pub conduit: String,
    pub fitting: String,
    pub marker: String,
    pub label: String,
    pub boundary: String,
}

impl Default for CategoryNames {
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

/// 读取的参数名。`diameter` 按顺序尝试，命中第一个即止。
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNames {
    pub code: String,
    pub diameter: Vec<String>,
    pub length: String,
    pub size: String,
    pub article_number: String,
    pub warning: String,
    pub feature_flag: String,
}

impl Default for AttributeNames {
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

/// 管件切换规则：名称包含 `marker`，且名称或族名包含 `keyword` 时，行上提供 `feature` 开关。
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleRule {
    pub marker: String,
    pub keyword: String,
    pub feature: String,
}

impl ToggleRule {
    pub fn new(
        marker: impl Into<String>,
        keyword: impl Into<String>,
        feature: impl Into<String>,
    ) -> Self {
        Self {
            marker: marker.into(),
            keyword: keyword.into(),
            feature: feature.into(),
        }
    }

    pub fn matches(&self, name: &str, family: Option<&str>) -> bool {
        let name = name.to_lowercase();
        let marker = self.marker.to_lowercase();
        let keyword = self.keyword.to_lowercase();
        if !name.contains(&marker) {
            return false;
        }
        name.contains(&keyword)
            || family.is_some_and(|family| family.to_lowercase().contains(&keyword))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub tolerance: f64,
    pub categories: CategoryNames,
    pub attributes: AttributeNames,
    pub toggles: Vec<ToggleRule>,
}

impl SessionSettings {
    pub fn default_toggles() -> Vec<ToggleRule> {
        vec![
            ToggleRule::new("var. dn/od", "multibocht", "2x45°"),
            ToggleRule::new("var. dn/od", "liggend", "switch_excentriciteit"),
        ]
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            categories: CategoryNames::default(),
            attributes: AttributeNames::default(),
            toggles: Self::default_toggles(),
        }
    }
}

/// 一次工作流调用的显式上下文：文档句柄、活动视图与容差设置。
pub struct Session<'a> {
    pub document: &'a mut dyn DocumentModel,
    pub view: ViewId,
    pub settings: SessionSettings,
}

impl<'a> Session<'a> {
    pub fn new(document: &'a mut dyn DocumentModel, view: ViewId, settings: SessionSettings) -> Self {
        Self {
            document,
            view,
            settings,
        }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.settings.tolerance
    }
}
