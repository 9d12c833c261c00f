use prefab_config::AppConfig;
use prefab_core::document::{Document, ViewId};
use prefab_core::geometry::Segment;
use prefab_engine::grid::GridRow;
use prefab_engine::session::Session;
use prefab_engine::workflow::{
    EditableTable, GridEditor, Notifier, RegionWorkflow, SelectionPrompt, TableOutcome,
    WorkflowOutcome,
};
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{DocumentSource, load_document_or_demo};
use crate::{DemoOptions, session_settings, workflow_options};

/// 把视图中所有边界类别的线段作为用户选择。
pub struct BoundaryLinesPrompt {
    segments: Vec<Segment>,
}

impl BoundaryLinesPrompt {
    pub fn collect(document: &Document, view: ViewId, category: &str) -> Self {
        let segments = document
            .entities_in_view(view)
            .filter(|(_, entity)| entity.category == category)
            .filter_map(|(_, entity)| entity.curve)
            .collect();
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl SelectionPrompt for BoundaryLinesPrompt {
    fn pick_segments(&mut self, prompt: &str) -> Option<Vec<Segment>> {
        println!("{prompt}: 自动选取 {} 条边界线", self.segments.len());
        Some(self.segments.clone())
    }
}

#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show(&mut self, message: &str) {
        info!(message, "工作流通知");
        println!("[通知] {message}");
    }
}

/// 非交互表格：补全标记、修正管件、自动编号后直接确认。
/// 提交被阻止时无法人工修正，第二次打开即取消。
pub struct ConsoleTable {
    label: Option<String>,
    opened: usize,
}

impl ConsoleTable {
    pub fn new(label: Option<String>) -> Self {
        Self { label, opened: 0 }
    }
}

impl EditableTable for ConsoleTable {
    fn open(&mut self, editor: &mut GridEditor<'_, '_>) -> TableOutcome {
        self.opened += 1;
        if self.opened > 1 {
            warn!(opened = self.opened, "控制台表格无法修正被阻止的提交");
            println!("表格重新打开，控制台模式下放弃提交。");
            return TableOutcome::cancelled();
        }

        if let Some(label) = &self.label {
            editor.set_label_text(label.clone());
        }
        println!("标签文本: {}", editor.label_text());

        let tagged = editor.tag_untagged();
        println!("补全标记: {}", tagged.summary());
        let fixed = editor.fix_fittings();
        println!("修正管件: {}", fixed.summary());
        match editor.auto_fill() {
            Ok(assignment) => println!("自动编号: 基础编码 {}", assignment.base),
            Err(err) => println!("自动编号失败: {err}"),
        }

        println!("编码表格（{} 行）：", editor.rows().len());
        for row in editor.rows() {
            println!("{}", format_row(row));
        }
        TableOutcome::confirmed()
    }
}

fn format_row(row: &GridRow) -> String {
    let record = &row.record;
    let mut line = format!(
        "  - #{} {} {:<28} 编码={:<10} 状态={:?}",
        record.id.get(),
        record.role.describe(),
        record.name,
        row.new_code,
        row.status
    );
    if !record.outside_diameter.is_empty() {
        line.push_str(&format!(" 外径={}", record.outside_diameter));
    }
    if !record.length.is_empty() {
        line.push_str(&format!(" 长度={}", record.length));
    }
    if let Some(flag) = record.feature_flag {
        line.push_str(&format!(" 2x45°={flag}"));
    }
    if record.has_warning() {
        line.push_str(&format!(" 警告={}", record.warning));
    }
    if let Some(action) = row.action_label() {
        line.push_str(&format!(" [{action}]"));
    }
    line
}

/// 控制台演示：加载文档，自动选择边界并运行编码工作流，打印提交结果。
pub fn run_demo(config: &AppConfig, options: &DemoOptions) -> Result<(), FrontendError> {
    let mut loaded = load_document_or_demo(options.document.as_deref(), config)?;
    println!("预制编码 CLI 演示");
    match &loaded.source {
        DocumentSource::Json(path) => println!("已从 JSON 加载文档：{}", path.display()),
        DocumentSource::Demo => {
            if let Some(ids) = &loaded.demo_entities {
                println!("已构建内置示例文档：");
                println!("  - 边界线 {} 条", ids.boundary.len());
                println!("  - 管道 ID = {:?}", ids.pipes.iter().map(|id| id.get()).collect::<Vec<_>>());
                println!("  - 区域外已编号管道 ID = {}", ids.outside_pipe.get());
            }
        }
    }

    let settings = session_settings(config);
    let mut prompt =
        BoundaryLinesPrompt::collect(&loaded.document, loaded.view, &settings.categories.boundary);
    info!(segments = prompt.len(), view = loaded.view.get(), "收集边界线");
    let label = options
        .label
        .clone()
        .or_else(|| config.frontend.label_text.clone());
    let mut table = ConsoleTable::new(label);
    let mut notifier = ConsoleNotifier;

    let outcome = {
        let mut session = Session::new(&mut loaded.document, loaded.view, settings);
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            workflow_options(config),
        );
        workflow.run(&mut session)?
    };

    match outcome {
        WorkflowOutcome::Cancelled => println!("工作流已取消。"),
        WorkflowOutcome::Committed(report) => {
            println!(
                "已提交：基础编码 {}，写入 {} 个实体，跳过 {} 个",
                report.base, report.written, report.skipped
            );
            if let Some(label) = report.label {
                let state = if report.label_created { "新建" } else { "沿用" };
                println!("标签 #{} ({state})", label.get());
            }
            for row in &report.rows {
                println!("{}", format_row(row));
            }
        }
    }
    Ok(())
}
