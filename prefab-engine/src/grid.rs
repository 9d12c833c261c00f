use prefab_core::document::EntityId;

use crate::classify::{EntityRecord, Role, TagStatus};
use crate::codes::CodeAssignment;

/// 行的种类，与状态一起决定可用的动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    UntaggedConduit,
    TaggedConduit,
    Marker,
    ToggleFitting,
    Passive,
}

/// 可编辑表格中的一行：编码可写，状态由标记关联推导，其余字段只读。
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub record: EntityRecord,
    pub new_code: String,
    pub status: TagStatus,
}

impl GridRow {
    pub fn from_record(record: EntityRecord) -> Self {
        Self {
            new_code: record.default_code.clone(),
            status: record.tag_status,
            record,
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.record.id
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.record.role
    }

    pub fn kind(&self) -> RowKind {
        match (self.record.role, self.status) {
            (Role::PrimaryConduit, TagStatus::Tagged) => RowKind::TaggedConduit,
            (Role::PrimaryConduit, _) => RowKind::UntaggedConduit,
            (Role::ConduitMarker, _) => RowKind::Marker,
            (Role::ConduitFitting, _) if self.record.toggle.is_some() => RowKind::ToggleFitting,
            _ => RowKind::Passive,
        }
    }

    /// 行按钮上显示的文字；无动作的行为 `None`。
    pub fn action_label(&self) -> Option<String> {
        match self.kind() {
            RowKind::UntaggedConduit => Some("Add/Place Tag".to_string()),
            RowKind::TaggedConduit | RowKind::Marker => Some("Remove Tag".to_string()),
            RowKind::ToggleFitting => self
                .record
                .toggle
                .as_ref()
                .map(|feature| format!("Flip {feature}")),
            RowKind::Passive => None,
        }
    }
}

/// 行集合，保持插入顺序。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<GridRow>,
}

impl Grid {
    pub fn from_records(records: Vec<EntityRecord>) -> Self {
        Self {
            rows: records.into_iter().map(GridRow::from_record).collect(),
        }
    }

    #[inline]
    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: EntityId) -> Option<&GridRow> {
        self.rows.iter().find(|row| row.id() == id)
    }

    pub fn row_mut(&mut self, id: EntityId) -> Option<&mut GridRow> {
        self.rows.iter_mut().find(|row| row.id() == id)
    }

    pub fn push(&mut self, row: GridRow) {
        self.rows.push(row);
    }

    /// 删除该实体对应的全部行，返回删除的行数。
    pub fn remove(&mut self, id: EntityId) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| row.id() != id);
        before - self.rows.len()
    }

    pub fn set_code(&mut self, id: EntityId, code: impl Into<String>) -> bool {
        match self.row_mut(id) {
            Some(row) => {
                row.new_code = code.into();
                true
            }
            None => false,
        }
    }

    pub fn ids_with_role(&self, role: Role) -> Vec<EntityId> {
        self.rows
            .iter()
            .filter(|row| row.role() == role)
            .map(GridRow::id)
            .collect()
    }

    /// 用计算结果覆盖对应行的编码；未出现在结果中的行保持不变。
    pub fn apply_codes(&mut self, assignment: &CodeAssignment) {
        for (id, code) in &assignment.codes {
            self.set_code(*id, code.clone());
        }
    }
}
