//! 区域编码工作流：选择边界 -> 区域筛选 -> 分类 -> 表格编辑 -> 提交编码。
//!
//! 外部协作者（选择提示、可编辑表格、通知）通过 trait 接入，
//! 表格在打开期间通过 [`GridEditor`] 驱动标记动作与编码计算。

use std::collections::{HashMap, HashSet};

use prefab_core::document::{AttrValue, EntityId};
use prefab_core::geometry::Segment;
use tracing::{debug, info, warn};

use crate::boundary::resolve_boundary;
use crate::classify::{Role, classify_region};
use crate::codes::{CodeAssignment, assign_codes, conduit_positions, label_anchor, parse_base_code};
use crate::command::{ADD_TAG, ActionContext, ActionTable, BatchReport, CLICK};
use crate::errors::EngineError;
use crate::fittings::fix_fittings;
use crate::grid::{Grid, GridRow};
use crate::model::run_scoped;
use crate::region::{RegionResult, filter_region};
use crate::session::Session;
use crate::tags::{Outcome, TagReconciler};

pub trait SelectionPrompt {
    /// 返回用户选中的线段；取消时为 `None`。
    fn pick_segments(&mut self, prompt: &str) -> Option<Vec<Segment>>;
}

pub trait Notifier {
    fn show(&mut self, message: &str);
}

pub trait EditableTable {
    fn open(&mut self, editor: &mut GridEditor<'_, '_>) -> TableOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOutcome {
    pub confirmed: bool,
}

impl TableOutcome {
    pub fn confirmed() -> Self {
        Self { confirmed: true }
    }

    pub fn cancelled() -> Self {
        Self { confirmed: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub base: String,
    pub written: usize,
    pub skipped: usize,
    pub label: Option<EntityId>,
    pub label_created: bool,
    pub rows: Vec<GridRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Cancelled,
    Committed(CommitReport),
}

/// 表格打开期间的编辑状态。
pub struct GridEditor<'s, 'd> {
    session: &'s mut Session<'d>,
    grid: Grid,
    tags: TagReconciler,
    actions: ActionTable,
    region: RegionResult,
    label_text: String,
    placed_label: Option<EntityId>,
}

impl<'s, 'd> GridEditor<'s, 'd> {
    pub fn new(
        session: &'s mut Session<'d>,
        region: RegionResult,
        grid: Grid,
        label_text: impl Into<String>,
    ) -> Self {
        let tags = TagReconciler::from_grid(&grid);
        Self {
            session,
            grid,
            tags,
            actions: ActionTable::new(),
            region,
            label_text: label_text.into(),
            placed_label: None,
        }
    }

    #[inline]
    pub fn rows(&self) -> &[GridRow] {
        self.grid.rows()
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn tags(&self) -> &TagReconciler {
        &self.tags
    }

    #[inline]
    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    #[inline]
    pub fn region(&self) -> &RegionResult {
        &self.region
    }

    #[inline]
    pub fn session(&self) -> &Session<'d> {
        &*self.session
    }

    pub fn label_text(&self) -> &str {
        &self.label_text
    }

    pub fn set_label_text(&mut self, text: impl Into<String>) {
        self.label_text = text.into();
    }

    #[inline]
    pub fn placed_label(&self) -> Option<EntityId> {
        self.placed_label
    }

    /// 手工修改一行的编码。
    pub fn edit_code(&mut self, row: EntityId, code: impl Into<String>) -> bool {
        self.grid.set_code(row, code)
    }

    pub fn invoke(&mut self, action: &str, row: EntityId) -> Result<Outcome, EngineError> {
        let mut context = ActionContext::new(&mut *self.session, &mut self.grid, &mut self.tags);
        self.actions.dispatch(action, row, &mut context)
    }

    pub fn invoke_batch(&mut self, action: &str, rows: &[EntityId]) -> BatchReport {
        let mut context = ActionContext::new(&mut *self.session, &mut self.grid, &mut self.tags);
        self.actions.dispatch_batch(action, rows, &mut context)
    }

    /// 点击行按钮：被点击的行属于多选集合时作用于整个集合，否则只作用于该行。
    pub fn click(&mut self, row: EntityId, selection: &[EntityId]) -> BatchReport {
        if selection.len() > 1 && selection.contains(&row) {
            self.invoke_batch(CLICK, selection)
        } else {
            self.invoke_batch(CLICK, &[row])
        }
    }

    /// 对全部管道行执行按钮动作：未标记的添加，已标记的删除。
    pub fn bulk_toggle_tags(&mut self) -> BatchReport {
        let conduits = self.grid.ids_with_role(Role::PrimaryConduit);
        self.invoke_batch(CLICK, &conduits)
    }

    /// 为全部未标记的管道添加标记。
    pub fn tag_untagged(&mut self) -> BatchReport {
        let conduits = self.grid.ids_with_role(Role::PrimaryConduit);
        self.invoke_batch(ADD_TAG, &conduits)
    }

    fn compute_codes(&self, base: &str) -> CodeAssignment {
        let conduits = self.grid.ids_with_role(Role::PrimaryConduit);
        let positions = conduit_positions(&*self.session, &conduits);
        let fittings = self.grid.ids_with_role(Role::ConduitFitting);
        let markers = self.grid.ids_with_role(Role::ConduitMarker);
        assign_codes(base, &positions, &fittings, &markers)
    }

    /// 解析标签文本中的基础编码并填入各行；解析失败时表格保持不变。
    pub fn auto_fill(&mut self) -> Result<CodeAssignment, EngineError> {
        let base = parse_base_code(&self.label_text)?;
        let assignment = self.compute_codes(&base);
        self.grid.apply_codes(&assignment);
        info!(base = %assignment.base, rows = assignment.codes.len(), "编码已自动填充");
        Ok(assignment)
    }

    /// 在区域最小角点放置标签。
    pub fn place_label(&mut self) -> Result<EntityId, EngineError> {
        let text = self.label_text.trim().to_string();
        if text.is_empty() {
            return Err(EngineError::EmptyLabel);
        }
        let label = self.create_label(&text)?;
        self.placed_label = Some(label);
        Ok(label)
    }

    fn create_label(&mut self, text: &str) -> Result<EntityId, EngineError> {
        let anchor = label_anchor(&*self.session, &self.region).ok_or(EngineError::EmptyRegion)?;
        let view = self.session.view;
        let category = self.session.settings.categories.label.clone();
        let label = run_scoped(&mut *self.session.document, "Place label", |document| {
            document.create_label(view, &category, anchor, text)
        })?;
        info!(label = label.get(), text, "标签已放置");
        Ok(label)
    }

    pub fn fix_fittings(&mut self) -> BatchReport {
        fix_fittings(&mut *self.session, &mut self.grid)
    }

    /// 行对应的实体，用于宿主侧高亮；实体已被删除时为 `None`。
    pub fn selection_target(&self, row: EntityId) -> Option<EntityId> {
        self.grid
            .row(row)
            .map(GridRow::id)
            .filter(|id| self.session.document.contains(*id))
    }

    fn check_duplicates(&self, base: &str) -> Result<(), EngineError> {
        let document = &*self.session.document;
        let categories = &self.session.settings.categories;

        let mut seen: HashMap<&str, EntityId> = HashMap::new();
        for row in self.grid.rows() {
            if row.role() != Role::PrimaryConduit || row.new_code.is_empty() {
                continue;
            }
            if let Some(first) = seen.insert(row.new_code.as_str(), row.id()) {
                return Err(EngineError::DuplicateIdentifier {
                    code: row.new_code.clone(),
                    entity: first.get(),
                });
            }
        }

        let row_codes: HashSet<&str> = self
            .grid
            .rows()
            .iter()
            .filter(|row| matches!(row.role(), Role::PrimaryConduit | Role::ConduitMarker))
            .filter(|row| !row.new_code.is_empty())
            .map(|row| row.new_code.as_str())
            .collect();
        for conduit in document.entities_with_category(&categories.conduit) {
            if self.grid.row(conduit).is_some() {
                continue;
            }
            let Some(code) = document
                .attribute(conduit, &self.session.settings.attributes.code)
                .map(|value| value.display_string())
            else {
                continue;
            };
            if row_codes.contains(code.as_str()) {
                return Err(EngineError::DuplicateIdentifier {
                    code,
                    entity: conduit.get(),
                });
            }
        }

        for label in document.entities_with_category(&categories.label) {
            if self.grid.row(label).is_some() || Some(label) == self.placed_label {
                continue;
            }
            let existing = document
                .name(label)
                .and_then(|text| parse_base_code(&text).ok());
            if existing.as_deref() == Some(base) {
                return Err(EngineError::DuplicateIdentifier {
                    code: base.to_string(),
                    entity: label.get(),
                });
            }
        }
        Ok(())
    }

    /// 提交编码。阻止提交的错误（基础编码无法解析、编码重复）不修改文档。
    pub fn commit(&mut self) -> Result<CommitReport, EngineError> {
        let base = parse_base_code(&self.label_text)?;
        if self.placed_label.is_none() {
            let assignment = self.compute_codes(&base);
            self.grid.apply_codes(&assignment);
        } else {
            for fitting in self.grid.ids_with_role(Role::ConduitFitting) {
                self.grid.set_code(fitting, base.clone());
            }
        }
        self.check_duplicates(&base)?;

        let code_attribute = self.session.settings.attributes.code.clone();
        let targets: Vec<(EntityId, String)> = self
            .grid
            .rows()
            .iter()
            .filter(|row| {
                matches!(
                    row.role(),
                    Role::PrimaryConduit | Role::ConduitFitting | Role::ConduitMarker
                )
            })
            .map(|row| (row.id(), row.new_code.clone()))
            .collect();
        let (written, skipped) = run_scoped(&mut *self.session.document, "Update codes", |document| {
            let mut written = 0;
            let mut skipped = 0;
            for (id, code) in &targets {
                if !document.contains(*id) || document.is_read_only(*id) {
                    debug!(entity = id.get(), "实体不存在或只读，跳过写入");
                    skipped += 1;
                    continue;
                }
                document.set_attribute(*id, &code_attribute, AttrValue::Text(code.clone()))?;
                written += 1;
            }
            Ok((written, skipped))
        })?;

        let mut label_created = false;
        if self.placed_label.is_none() {
            let text = self.label_text.trim().to_string();
            match self.create_label(&text) {
                Ok(label) => {
                    self.placed_label = Some(label);
                    label_created = true;
                }
                Err(err) => warn!(error = %err, "无法在区域角点放置标签"),
            }
        }

        info!(base = %base, written, skipped, "编码已写回文档");
        Ok(CommitReport {
            base,
            written,
            skipped,
            label: self.placed_label,
            label_created,
            rows: self.grid.rows().to_vec(),
        })
    }
}

/// 工作流的用户可见文本。
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOptions {
    pub boundary_prompt: String,
    pub label_placeholder: String,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            boundary_prompt: "Select boundary lines".to_string(),
            label_placeholder: "prefab 5.5.5".to_string(),
        }
    }
}

pub struct RegionWorkflow<'c> {
    prompt: &'c mut dyn SelectionPrompt,
    table: &'c mut dyn EditableTable,
    notifier: &'c mut dyn Notifier,
    options: WorkflowOptions,
}

impl<'c> RegionWorkflow<'c> {
    pub fn new(
        prompt: &'c mut dyn SelectionPrompt,
        table: &'c mut dyn EditableTable,
        notifier: &'c mut dyn Notifier,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            prompt,
            table,
            notifier,
            options,
        }
    }

    /// 选择边界并收集、分类区域内实体；不修改文档。
    pub fn gather(&mut self, session: &Session<'_>) -> Result<(RegionResult, Grid), EngineError> {
        let segments = self
            .prompt
            .pick_segments(&self.options.boundary_prompt)
            .filter(|segments| !segments.is_empty())
            .ok_or(EngineError::SelectionCancelled)?;
        let polygon = resolve_boundary(&segments, session.tolerance())?;
        let region = filter_region(session, &polygon);
        let records = classify_region(session, &region);
        if records.is_empty() {
            return Err(EngineError::EmptyRegion);
        }
        Ok((region, Grid::from_records(records)))
    }

    pub fn run(&mut self, session: &mut Session<'_>) -> Result<WorkflowOutcome, EngineError> {
        let (region, grid) = match self.gather(session) {
            Ok(gathered) => gathered,
            Err(EngineError::SelectionCancelled) => {
                self.notifier.show("已取消选择，未做任何修改。");
                return Ok(WorkflowOutcome::Cancelled);
            }
            Err(err) => {
                self.notifier.show(&format!("无法建立区域: {err}"));
                return Err(err);
            }
        };
        info!(rows = grid.len(), "打开编码表格");

        let mut editor = GridEditor::new(session, region, grid, self.options.label_placeholder.clone());
        loop {
            let outcome = self.table.open(&mut editor);
            if !outcome.confirmed {
                self.notifier.show("已取消，编码未写入。");
                return Ok(WorkflowOutcome::Cancelled);
            }
            match editor.commit() {
                Ok(report) => {
                    self.notifier.show(&format!(
                        "编码 {} 已写入 {} 个实体（跳过 {} 个）。",
                        report.base, report.written, report.skipped
                    ));
                    return Ok(WorkflowOutcome::Committed(report));
                }
                Err(err) if err.root_cause().is_user_correctable() => {
                    warn!(error = %err, "提交被阻止，重新打开表格");
                    self.notifier.show(&format!("无法提交: {err}"));
                }
                Err(err) => {
                    self.notifier.show(&format!("提交失败: {err}"));
                    return Err(err);
                }
            }
        }
    }
}
