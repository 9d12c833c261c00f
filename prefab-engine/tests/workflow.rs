use prefab_core::document::{AttrValue, Document, Entity, EntityId, ViewId};
use prefab_core::geometry::{Point3, Segment};
use prefab_engine::classify::{Role, TagStatus};
use prefab_engine::demo::{DemoEntities, populate_demo};
use prefab_engine::errors::EngineError;
use prefab_engine::model::DocumentModel;
use prefab_engine::session::{Session, SessionSettings};
use prefab_engine::workflow::{
    EditableTable, GridEditor, Notifier, RegionWorkflow, SelectionPrompt, TableOutcome,
    WorkflowOptions, WorkflowOutcome,
};

const VIEW: ViewId = ViewId::new(1);

struct FixedPrompt {
    segments: Option<Vec<Segment>>,
    prompts: Vec<String>,
}

impl FixedPrompt {
    fn new(segments: Option<Vec<Segment>>) -> Self {
        Self {
            segments,
            prompts: Vec::new(),
        }
    }
}

impl SelectionPrompt for FixedPrompt {
    fn pick_segments(&mut self, prompt: &str) -> Option<Vec<Segment>> {
        self.prompts.push(prompt.to_string());
        self.segments.clone()
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Vec<String>,
}

impl Notifier for RecordingNotifier {
    fn show(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

struct ScriptedTable<F> {
    opened: usize,
    script: F,
}

impl<F> ScriptedTable<F>
where
    F: FnMut(usize, &mut GridEditor<'_, '_>) -> TableOutcome,
{
    fn new(script: F) -> Self {
        Self { opened: 0, script }
    }
}

impl<F> EditableTable for ScriptedTable<F>
where
    F: FnMut(usize, &mut GridEditor<'_, '_>) -> TableOutcome,
{
    fn open(&mut self, editor: &mut GridEditor<'_, '_>) -> TableOutcome {
        let call = self.opened;
        self.opened += 1;
        (self.script)(call, editor)
    }
}

fn boundary_segments(document: &Document) -> Vec<Segment> {
    document
        .entities_with_category("Lines")
        .filter_map(|(_, entity)| entity.curve)
        .collect()
}

fn demo() -> (Document, DemoEntities) {
    let mut document = Document::new();
    let ids = populate_demo(&mut document, VIEW);
    (document, ids)
}

fn comments(document: &Document, id: EntityId) -> Option<String> {
    DocumentModel::attribute(document, id, "Comments").and_then(|value| value.as_text().map(str::to_string))
}

#[test]
fn demo_region_is_coded_tagged_and_labelled() {
    let (mut document, ids) = demo();
    let mut prompt = FixedPrompt::new(Some(boundary_segments(&document)));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, editor| {
        let report = editor.tag_untagged();
        assert_eq!(report.updated, 2);
        editor.auto_fill().expect("placeholder parses");
        TableOutcome::confirmed()
    });

    let outcome = {
        let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            WorkflowOptions::default(),
        );
        workflow.run(&mut session).expect("workflow succeeds")
    };

    let WorkflowOutcome::Committed(report) = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_eq!(report.base, "5.5.5");
    assert!(report.label_created);
    assert_eq!(prompt.prompts, vec!["Select boundary lines".to_string()]);
    assert_eq!(notifier.messages.len(), 1);

    // 管道按中心 X 坐标排序编号：20 -> .1, 40 -> .2, 65 -> .3
    assert_eq!(comments(&document, ids.pipes[1]).as_deref(), Some("5.5.5.1"));
    assert_eq!(comments(&document, ids.pipes[2]).as_deref(), Some("5.5.5.2"));
    assert_eq!(comments(&document, ids.pipes[0]).as_deref(), Some("5.5.5.3"));
    for fitting in [ids.tee, ids.bend, ids.reducer] {
        assert_eq!(comments(&document, fitting).as_deref(), Some("5.5.5"));
    }
    assert_eq!(comments(&document, ids.outside_pipe).as_deref(), Some("9.9.9.1"));
    assert_eq!(comments(&document, ids.wall), None);

    let markers: Vec<EntityId> = document
        .entities_with_category("Pipe Tags")
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(markers.len(), 3);
    assert!(
        report
            .rows
            .iter()
            .filter(|row| row.role() == Role::PrimaryConduit)
            .all(|row| row.status == TagStatus::Tagged)
    );
    assert!(report.rows.iter().all(|row| row.id() != ids.wall));

    let label = report.label.expect("label placed");
    assert_eq!(
        DocumentModel::name(&document, label).as_deref(),
        Some("prefab 5.5.5")
    );
}

#[test]
fn cancelled_selection_changes_nothing() {
    let (mut document, _) = demo();
    let before = document.entities().count();
    let mut prompt = FixedPrompt::new(None);
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, _| {
        panic!("table must not open");
    });

    let outcome = {
        let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            WorkflowOptions::default(),
        );
        workflow.run(&mut session).unwrap()
    };
    assert_eq!(outcome, WorkflowOutcome::Cancelled);
    assert_eq!(document.entities().count(), before);
    assert_eq!(notifier.messages.len(), 1);
}

#[test]
fn open_boundary_is_reported() {
    let (mut document, _) = demo();
    let mut segments = boundary_segments(&document);
    segments.pop();
    let mut prompt = FixedPrompt::new(Some(segments));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, _| TableOutcome::confirmed());

    let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
    let mut workflow = RegionWorkflow::new(
        &mut prompt,
        &mut table,
        &mut notifier,
        WorkflowOptions::default(),
    );
    let err = workflow.run(&mut session).unwrap_err();
    assert!(matches!(err, EngineError::OpenBoundary { total: 3, .. }));
    drop(workflow);
    assert_eq!(table.opened, 0);
    assert_eq!(notifier.messages.len(), 1);
}

#[test]
fn region_without_relevant_entities_is_empty() {
    let (mut document, _) = demo();
    let p = |x: f64, y: f64| Point3::new(x, y, 0.0);
    let far = vec![
        Segment::new(p(1000.0, 1000.0), p(1010.0, 1000.0)),
        Segment::new(p(1010.0, 1000.0), p(1010.0, 1010.0)),
        Segment::new(p(1010.0, 1010.0), p(1000.0, 1000.0)),
    ];
    let mut prompt = FixedPrompt::new(Some(far));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, _| TableOutcome::confirmed());
    let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
    let mut workflow = RegionWorkflow::new(
        &mut prompt,
        &mut table,
        &mut notifier,
        WorkflowOptions::default(),
    );
    assert_eq!(workflow.run(&mut session), Err(EngineError::EmptyRegion));
}

#[test]
fn blocked_commit_reopens_table_until_corrected() {
    let (mut document, ids) = demo();
    let mut prompt = FixedPrompt::new(Some(boundary_segments(&document)));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|call, editor| {
        match call {
            0 => editor.set_label_text("prefab"),
            // 区域外的管道已使用 9.9.9.1
            1 => editor.set_label_text("prefab 9.9.9"),
            _ => editor.set_label_text("prefab 6.1"),
        }
        TableOutcome::confirmed()
    });

    let outcome = {
        let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            WorkflowOptions::default(),
        );
        workflow.run(&mut session).unwrap()
    };

    assert_eq!(table.opened, 3);
    assert_eq!(notifier.messages.len(), 3);
    let WorkflowOutcome::Committed(report) = outcome else {
        panic!("expected commit");
    };
    assert_eq!(report.base, "6.1");
    assert_eq!(comments(&document, ids.pipes[1]).as_deref(), Some("6.1.1"));
    let labels = document.entities_with_category("Text Notes").count();
    assert_eq!(labels, 1);
}

#[test]
fn cancelled_table_writes_no_codes() {
    let (mut document, ids) = demo();
    let mut prompt = FixedPrompt::new(Some(boundary_segments(&document)));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, editor| {
        editor.auto_fill().unwrap();
        TableOutcome::cancelled()
    });

    let outcome = {
        let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            WorkflowOptions::default(),
        );
        workflow.run(&mut session).unwrap()
    };
    assert_eq!(outcome, WorkflowOutcome::Cancelled);
    assert_eq!(comments(&document, ids.pipes[0]), None);
    assert_eq!(document.entities_with_category("Text Notes").count(), 0);
}

#[test]
fn fitting_fix_up_and_feature_toggle_inside_editor() {
    let (mut document, ids) = demo();
    let mut prompt = FixedPrompt::new(Some(boundary_segments(&document)));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(|_, editor| {
        let tee = editor
            .rows()
            .iter()
            .find(|row| row.record.toggle.as_deref() == Some("switch_excentriciteit"))
            .map(|row| row.id())
            .expect("tee row has a toggle");
        let report = editor.click(tee, &[]);
        assert_eq!(report.updated, 1);

        let report = editor.fix_fittings();
        assert_eq!(report.updated, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.skipped, 0);
        TableOutcome::confirmed()
    });

    {
        let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
        let mut workflow = RegionWorkflow::new(
            &mut prompt,
            &mut table,
            &mut notifier,
            WorkflowOptions::default(),
        );
        workflow.run(&mut session).unwrap();
    }

    let flag = |id, name: &str| DocumentModel::attribute(&document, id, name);
    assert_eq!(flag(ids.bend, "2x45°"), Some(AttrValue::Flag(false)));
    assert_eq!(flag(ids.reducer, "reducer_eccentric"), Some(AttrValue::Flag(true)));
    assert_eq!(flag(ids.reducer, "switch_excentriciteit"), Some(AttrValue::Flag(false)));
    // 三通先被切换为 true，修正批次不处理非异径管的偏心开关。
    assert_eq!(flag(ids.tee, "switch_excentriciteit"), Some(AttrValue::Flag(true)));
}

#[test]
fn add_then_remove_round_trip_restores_rows() {
    let mut document = Document::new();
    document.register_tag_category("Pipes", "Pipe Tags");
    let pipe = document.add_entity(
        Entity::new("Pipes", "buis")
            .with_bounds(prefab_core::geometry::Bounds3D::new(
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(3.0, 3.0, 0.0),
            ))
            .in_view(VIEW),
    );
    let p = |x: f64, y: f64| Point3::new(x, y, 0.0);
    let square = vec![
        Segment::new(p(0.0, 0.0), p(10.0, 0.0)),
        Segment::new(p(10.0, 10.0), p(10.0, 0.0)),
        Segment::new(p(0.0, 10.0), p(10.0, 10.0)),
        Segment::new(p(0.0, 0.0), p(0.0, 10.0)),
    ];
    let mut prompt = FixedPrompt::new(Some(square));
    let mut notifier = RecordingNotifier::default();
    let mut table = ScriptedTable::new(move |_, editor| {
        let rows_before = editor.rows().len();
        editor.invoke("add_tag", pipe).unwrap();
        assert_eq!(editor.rows().len(), rows_before + 1);
        editor.invoke("remove_tag", pipe).unwrap();
        assert_eq!(editor.rows().len(), rows_before);
        assert_eq!(editor.grid().row(pipe).unwrap().status, TagStatus::Untagged);
        assert!(editor.tags().links().is_empty());
        TableOutcome::cancelled()
    });

    let mut session = Session::new(&mut document, VIEW, SessionSettings::default());
    let mut workflow = RegionWorkflow::new(
        &mut prompt,
        &mut table,
        &mut notifier,
        WorkflowOptions::default(),
    );
    assert_eq!(workflow.run(&mut session), Ok(WorkflowOutcome::Cancelled));
    drop(workflow);
    drop(session);
    assert_eq!(document.entities_with_category("Pipe Tags").count(), 0);
}
