use std::collections::{HashMap, HashSet};

use prefab_core::document::EntityId;
use tracing::{debug, info};

use crate::region::RegionResult;
use crate::session::{CategoryNames, Session};

/// 实体在编码流程中的角色。未识别的类别一律为 `Ignored`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    PrimaryConduit,
    ConduitFitting,
    ConduitMarker,
    Label,
    Ignored,
}

impl Role {
    pub fn from_category(category: &str, names: &CategoryNames) -> Self {
        if category == names.conduit {
            Role::PrimaryConduit
        } else if category == names.fitting {
            Role::ConduitFitting
        } else if category == names.marker {
            Role::ConduitMarker
        } else if category == names.label {
            Role::Label
        } else {
            Role::Ignored
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Role::PrimaryConduit => "管道",
            Role::ConduitFitting => "管件",
            Role::ConduitMarker => "标记",
            Role::Label => "标签",
            Role::Ignored => "忽略",
        }
    }
}

/// 标记状态：仅管道区分已标记/未标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagStatus {
    Untagged,
    Tagged,
    NotApplicable,
}

/// 分类后的规范化记录，所有缺失参数都退化为空字符串。
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub role: Role,
    pub name: String,
    pub default_code: String,
    pub outside_diameter: String,
    pub length: String,
    pub size: String,
    pub article_number: String,
    pub warning: String,
    pub feature_flag: Option<bool>,
    pub tag_status: TagStatus,
    pub host: Option<EntityId>,
    pub toggle: Option<String>,
}

impl EntityRecord {
    fn blank(id: EntityId, role: Role, name: String) -> Self {
        Self {
            id,
            role,
            name,
            default_code: String::new(),
            outside_diameter: String::new(),
            length: String::new(),
            size: String::new(),
            article_number: String::new(),
            warning: String::new(),
            feature_flag: None,
            tag_status: TagStatus::NotApplicable,
            host: None,
            toggle: None,
        }
    }

    #[inline]
    pub fn has_warning(&self) -> bool {
        !self.warning.trim().is_empty()
    }
}

/// 读取文本形式的参数；缺失时返回空字符串。
pub fn text_attribute(session: &Session<'_>, id: EntityId, name: &str) -> String {
    session
        .document
        .attribute(id, name)
        .map(|value| value.display_string())
        .unwrap_or_default()
}

/// 读取布尔参数；缺失或类型不符时为 `None`。
pub fn flag_attribute(session: &Session<'_>, id: EntityId, name: &str) -> Option<bool> {
    session
        .document
        .attribute(id, name)
        .and_then(|value| value.as_flag())
}

fn diameter_attribute(session: &Session<'_>, id: EntityId) -> String {
    session
        .settings
        .attributes
        .diameter
        .iter()
        .find_map(|name| session.document.attribute(id, name))
        .map(|value| value.display_string())
        .unwrap_or_default()
}

/// 根据类别名称判定角色。
pub fn role_of(session: &Session<'_>, id: EntityId) -> Role {
    session
        .document
        .category(id)
        .map(|category| Role::from_category(&category, &session.settings.categories))
        .unwrap_or(Role::Ignored)
}

/// 反向扫描文档中的全部标记，建立 宿主 -> 标记 的索引（按文档顺序）。
pub fn marker_index(session: &Session<'_>) -> HashMap<EntityId, Vec<EntityId>> {
    let mut index: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
    for marker in session
        .document
        .entities_with_category(&session.settings.categories.marker)
    {
        if let Some(host) = session.document.marker_host(marker) {
            index.entry(host).or_default().push(marker);
        }
    }
    index
}

/// 查找记录了指定宿主的第一个标记。
pub fn find_marker_for_host(session: &Session<'_>, host: EntityId) -> Option<EntityId> {
    session
        .document
        .entities_with_category(&session.settings.categories.marker)
        .into_iter()
        .find(|marker| session.document.marker_host(*marker) == Some(host))
}

fn conduit_record(session: &Session<'_>, id: EntityId, tagged: bool) -> EntityRecord {
    let attributes = &session.settings.attributes;
    let mut record = EntityRecord::blank(
        id,
        Role::PrimaryConduit,
        session.document.name(id).unwrap_or_default(),
    );
    record.default_code = text_attribute(session, id, &attributes.code);
    record.outside_diameter = diameter_attribute(session, id);
    record.length = text_attribute(session, id, &attributes.length);
    record.size = text_attribute(session, id, &attributes.size);
    record.article_number = text_attribute(session, id, &attributes.article_number);
    record.tag_status = if tagged {
        TagStatus::Tagged
    } else {
        TagStatus::Untagged
    };
    record
}

fn fitting_record(session: &Session<'_>, id: EntityId) -> EntityRecord {
    let attributes = &session.settings.attributes;
    let name = session.document.name(id).unwrap_or_default();
    let family = session.document.family(id);
    let toggle = session
        .settings
        .toggles
        .iter()
        .find(|rule| rule.matches(&name, family.as_deref()))
        .map(|rule| rule.feature.clone());

    let mut record = EntityRecord::blank(id, Role::ConduitFitting, name);
    record.default_code = text_attribute(session, id, &attributes.code);
    record.outside_diameter = diameter_attribute(session, id);
    record.length = text_attribute(session, id, &attributes.length);
    record.size = text_attribute(session, id, &attributes.size);
    record.article_number = text_attribute(session, id, &attributes.article_number);
    record.warning = text_attribute(session, id, &attributes.warning);
    record.feature_flag = flag_attribute(session, id, &attributes.feature_flag);
    record.toggle = toggle;
    record
}

/// 标记行：自身编码为空时沿用宿主编码，直径/长度总是取自宿主。
fn marker_record(session: &Session<'_>, id: EntityId) -> EntityRecord {
    let attributes = &session.settings.attributes;
    let mut record = EntityRecord::blank(
        id,
        Role::ConduitMarker,
        session.document.name(id).unwrap_or_default(),
    );
    record.tag_status = TagStatus::Tagged;
    record.default_code = text_attribute(session, id, &attributes.code);

    let host = session
        .document
        .marker_host(id)
        .filter(|host| session.document.contains(*host));
    if let Some(host) = host {
        if record.default_code.is_empty() {
            record.default_code = text_attribute(session, host, &attributes.code);
        }
        record.outside_diameter = diameter_attribute(session, host);
        record.length = text_attribute(session, host, &attributes.length);
    } else {
        debug!(marker = id.get(), "标记的宿主无法解析，作为孤立标记保留");
    }
    record.host = session.document.marker_host(id);
    record
}

fn label_record(session: &Session<'_>, id: EntityId) -> EntityRecord {
    let mut record = EntityRecord::blank(
        id,
        Role::Label,
        session.document.name(id).unwrap_or_default(),
    );
    record.default_code = text_attribute(session, id, &session.settings.attributes.code);
    record
}

/// 将区域实体分类为规范化记录。
///
/// 先收集文档中宿主位于区域内的全部标记（无论标记本身是否在区域内），
/// 再按区域顺序处理其余实体；同一标记只出现一次。
pub fn classify_region(session: &Session<'_>, region: &RegionResult) -> Vec<EntityRecord> {
    let conduits: HashSet<EntityId> = region
        .members()
        .iter()
        .copied()
        .filter(|id| role_of(session, *id) == Role::PrimaryConduit)
        .collect();
    let markers_by_host = marker_index(session);

    let mut records = Vec::new();
    let mut emitted: HashSet<EntityId> = HashSet::new();

    for marker in session
        .document
        .entities_with_category(&session.settings.categories.marker)
    {
        let hosted_inside = session
            .document
            .marker_host(marker)
            .is_some_and(|host| conduits.contains(&host));
        if hosted_inside && emitted.insert(marker) {
            records.push(marker_record(session, marker));
        }
    }

    for id in region.members().iter().copied() {
        let role = role_of(session, id);
        let record = match role {
            Role::PrimaryConduit => {
                let tagged = markers_by_host
                    .get(&id)
                    .is_some_and(|markers| !markers.is_empty());
                conduit_record(session, id, tagged)
            }
            Role::ConduitFitting => fitting_record(session, id),
            Role::ConduitMarker => {
                if !emitted.insert(id) {
                    continue;
                }
                marker_record(session, id)
            }
            Role::Label => label_record(session, id),
            Role::Ignored => {
                debug!(entity = id.get(), "类别不在处理范围内，忽略");
                continue;
            }
        };
        records.push(record);
    }

    info!(
        region = region.len(),
        records = records.len(),
        "区域实体分类完成"
    );
    records
}
