use std::collections::{HashMap, HashSet};

use prefab_core::document::EntityId;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::grid::{Grid, RowKind};
use crate::session::Session;
use crate::tags::{Outcome, TagReconciler};

/// 动作名称。`click` 对应行按钮，按行的种类路由到具体动作。
pub const ADD_TAG: &str = "add_tag";
pub const REMOVE_TAG: &str = "remove_tag";
pub const TOGGLE: &str = "toggle";
pub const CLICK: &str = "click";

pub trait RowActionHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn kinds(&self) -> &'static [RowKind];
    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError>;
}

pub struct ActionContext<'s, 'd> {
    pub session: &'s mut Session<'d>,
    pub grid: &'s mut Grid,
    pub tags: &'s mut TagReconciler,
}

impl<'s, 'd> ActionContext<'s, 'd> {
    pub fn new(
        session: &'s mut Session<'d>,
        grid: &'s mut Grid,
        tags: &'s mut TagReconciler,
    ) -> Self {
        Self {
            session,
            grid,
            tags,
        }
    }
}

/// 批量动作的汇总：失败的行不影响其他行。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub updated: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub failures: Vec<(EntityId, EngineError)>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!("updated {}, skipped {}", self.updated, self.skipped)
    }
}

/// (动作名称, 行种类) -> 处理器 的分派表。
pub struct ActionTable {
    handlers: HashMap<(&'static str, RowKind), Box<dyn RowActionHandler>>,
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionTable {
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };
        table.register(AddTagAction);
        table.register(RemoveTagAction);
        table.register(RemoveMarkerAction);
        table.register(ToggleFeatureAction);
        table.register(Click(AddTagAction));
        table.register(Click(RemoveTagAction));
        table.register(Click(RemoveMarkerAction));
        table.register(Click(ToggleFeatureAction));
        table
    }

    /// 按处理器声明的每个行种类注册；同键的旧处理器被替换。
    pub fn register<H: RowActionHandler + Clone + 'static>(&mut self, handler: H) {
        for kind in handler.kinds() {
            self.handlers
                .insert((handler.name(), *kind), Box::new(handler.clone()));
        }
    }

    pub fn handles(&self, name: &str, kind: RowKind) -> bool {
        self.handlers
            .keys()
            .any(|(registered, registered_kind)| *registered == name && *registered_kind == kind)
    }

    /// 行种类可用的动作名称（排序后）。
    pub fn available_actions(&self, kind: RowKind) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .handlers
            .keys()
            .filter(|(_, registered_kind)| *registered_kind == kind)
            .map(|(name, _)| *name)
            .collect();
        names.sort_unstable();
        names
    }

    /// 对单行执行动作。行状态下无对应处理器时视为无操作。
    pub fn dispatch(
        &self,
        name: &str,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        let kind = context
            .grid
            .row(row)
            .map(|row| row.kind())
            .ok_or(EngineError::EntityNotFound(row.get()))?;
        let handler = self
            .handlers
            .iter()
            .find(|((registered, registered_kind), _)| *registered == name && *registered_kind == kind)
            .map(|(_, handler)| handler);
        match handler {
            Some(handler) => handler.execute(row, context),
            None => {
                debug!(action = name, row = row.get(), ?kind, "该行状态下动作无效");
                Ok(Outcome::Unchanged)
            }
        }
    }

    /// 对选中的每一行独立执行动作（重复选择只执行一次），出错的行计入 `skipped` 后继续。
    pub fn dispatch_batch(
        &self,
        name: &str,
        rows: &[EntityId],
        context: &mut ActionContext<'_, '_>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut seen = HashSet::new();
        for row in rows.iter().copied() {
            if !seen.insert(row) {
                continue;
            }
            if context.grid.row(row).is_none() {
                debug!(action = name, row = row.get(), "行已不存在");
                report.unchanged += 1;
                continue;
            }
            match self.dispatch(name, row, context) {
                Ok(Outcome::Applied) => report.updated += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    warn!(action = name, row = row.get(), error = %err, "批量动作跳过该行");
                    report.skipped += 1;
                    report.failures.push((row, err));
                }
            }
        }
        info!(
            action = name,
            updated = report.updated,
            skipped = report.skipped,
            unchanged = report.unchanged,
            "批量动作完成"
        );
        report
    }
}

#[derive(Clone)]
struct AddTagAction;

impl RowActionHandler for AddTagAction {
    fn name(&self) -> &'static str {
        ADD_TAG
    }

    fn kinds(&self) -> &'static [RowKind] {
        &[RowKind::UntaggedConduit]
    }

    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        context.tags.add_tag(context.session, context.grid, row)
    }
}

#[derive(Clone)]
struct RemoveTagAction;

impl RowActionHandler for RemoveTagAction {
    fn name(&self) -> &'static str {
        REMOVE_TAG
    }

    fn kinds(&self) -> &'static [RowKind] {
        &[RowKind::TaggedConduit]
    }

    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        context.tags.remove_tag(context.session, context.grid, row)
    }
}

#[derive(Clone)]
struct RemoveMarkerAction;

impl RowActionHandler for RemoveMarkerAction {
    fn name(&self) -> &'static str {
        REMOVE_TAG
    }

    fn kinds(&self) -> &'static [RowKind] {
        &[RowKind::Marker]
    }

    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        context.tags.remove_marker(context.session, context.grid, row)
    }
}

#[derive(Clone)]
struct ToggleFeatureAction;

impl RowActionHandler for ToggleFeatureAction {
    fn name(&self) -> &'static str {
        TOGGLE
    }

    fn kinds(&self) -> &'static [RowKind] {
        &[RowKind::ToggleFitting]
    }

    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        let Some(feature) = context
            .grid
            .row(row)
            .and_then(|row| row.record.toggle.clone())
        else {
            return Ok(Outcome::Unchanged);
        };
        context
            .tags
            .toggle_feature(context.session, context.grid, row, &feature)
    }
}

/// 行按钮：沿用内部动作的行种类与行为，只改名为 `click`。
#[derive(Clone)]
struct Click<H>(H);

impl<H: RowActionHandler> RowActionHandler for Click<H> {
    fn name(&self) -> &'static str {
        CLICK
    }

    fn kinds(&self) -> &'static [RowKind] {
        self.0.kinds()
    }

    fn execute(
        &self,
        row: EntityId,
        context: &mut ActionContext<'_, '_>,
    ) -> Result<Outcome, EngineError> {
        self.0.execute(row, context)
    }
}
