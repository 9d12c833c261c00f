use prefab_core::document::{AttrValue, EntityId};
use tracing::{debug, info, warn};

use crate::classify::{Role, flag_attribute, text_attribute};
use crate::command::BatchReport;
use crate::errors::EngineError;
use crate::grid::Grid;
use crate::model::{DocumentModel, run_scoped};
use crate::session::Session;

/// 同心异径管的修正参数及目标值。
pub const REDUCER_FLAGS: [(&str, bool); 4] = [
    ("kort_verloop (kleinste)", true),
    ("kort_verloop (grootste)", true),
    ("reducer_eccentric", true),
    ("switch_excentriciteit", false),
];

fn has_concentric_warning(warning: &str) -> bool {
    warning.to_lowercase().contains("concentric")
}

/// 在单个事务中修正一个管件，返回实际改写的参数数。
fn fix_one(
    document: &mut dyn DocumentModel,
    fitting: EntityId,
    concentric: bool,
    feature_flag: &str,
) -> Result<usize, EngineError> {
    let mut changed = 0;
    let exposes_reducer = REDUCER_FLAGS
        .iter()
        .any(|(name, _)| document.attribute(fitting, name).is_some());
    if concentric && exposes_reducer {
        for (name, target) in REDUCER_FLAGS {
            let current = document
                .attribute(fitting, name)
                .and_then(|value| value.as_flag());
            if let Some(current) = current {
                if current != target {
                    document.set_attribute(fitting, name, AttrValue::Flag(target))?;
                    changed += 1;
                }
            }
        }
    }
    let bend = document
        .attribute(fitting, feature_flag)
        .and_then(|value| value.as_flag());
    if bend == Some(true) {
        document.set_attribute(fitting, feature_flag, AttrValue::Flag(false))?;
        changed += 1;
    }
    Ok(changed)
}

/// 批量修正表格中的全部管件：同心异径警告的管件改为偏心，并关闭 2x45° 开关。
/// 每个管件独立提交；失败的管件回滚并计入 `skipped`。完成后从文档刷新行。
pub fn fix_fittings(session: &mut Session<'_>, grid: &mut Grid) -> BatchReport {
    let mut report = BatchReport::default();
    let feature_flag = session.settings.attributes.feature_flag.clone();
    let warning_name = session.settings.attributes.warning.clone();

    for fitting in grid.ids_with_role(Role::ConduitFitting) {
        if !session.document.contains(fitting) {
            debug!(entity = fitting.get(), "管件已不存在");
            report.unchanged += 1;
            continue;
        }
        let concentric = session
            .document
            .attribute(fitting, &warning_name)
            .and_then(|value| value.as_text().map(has_concentric_warning))
            .unwrap_or(false);

        let result = run_scoped(&mut *session.document, "Fix fitting", |document| {
            fix_one(document, fitting, concentric, &feature_flag)
        });
        match result {
            Ok(0) => report.unchanged += 1,
            Ok(changed) => {
                debug!(entity = fitting.get(), changed, "管件已修正");
                report.updated += 1;
            }
            Err(err) => {
                warn!(entity = fitting.get(), error = %err, "管件修正失败，已跳过");
                report.skipped += 1;
                report.failures.push((fitting, err));
            }
        }

        let flag = flag_attribute(session, fitting, &feature_flag);
        let warning = text_attribute(session, fitting, &warning_name);
        if let Some(row) = grid.row_mut(fitting) {
            row.record.feature_flag = flag;
            row.record.warning = warning;
        }
    }

    info!(
        updated = report.updated,
        skipped = report.skipped,
        unchanged = report.unchanged,
        "管件修正完成"
    );
    report
}
