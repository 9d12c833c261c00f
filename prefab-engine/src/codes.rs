use std::cmp::Ordering;

use once_cell::sync::Lazy;
use prefab_core::document::EntityId;
use prefab_core::geometry::{Point2, Point3};
use regex::Regex;
use tracing::debug;

use crate::errors::EngineError;
use crate::region::{RegionResult, region_bounds};
use crate::session::Session;

static BASE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9.]*[0-9][0-9.]*").expect("valid base code pattern"));

/// 从标签文本中提取基础编码：第一段至少含一个数字的 数字/点 连续串，
/// 去掉首尾多余的点。`"prefab 5.5.5"` -> `"5.5.5"`。
pub fn parse_base_code(label: &str) -> Result<String, EngineError> {
    BASE_PATTERN
        .find(label)
        .map(|found| found.as_str().trim_matches('.').to_string())
        .ok_or_else(|| EngineError::UnparsableBase(label.to_string()))
}

/// 一次编码计算的结果，按 实体 -> 编码 记录。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeAssignment {
    pub base: String,
    pub codes: Vec<(EntityId, String)>,
}

impl CodeAssignment {
    pub fn code_for(&self, id: EntityId) -> Option<&str> {
        self.codes
            .iter()
            .find(|(entity, _)| *entity == id)
            .map(|(_, code)| code.as_str())
    }
}

fn by_position(a: &Point2, b: &Point2) -> Ordering {
    a.x()
        .total_cmp(&b.x())
        .then_with(|| a.y().total_cmp(&b.y()))
}

/// 计算编码：
/// - 管件一律取基础编码；
/// - 管道按 (X, Y) 升序稳定排序，第 i 个（从 1 开始）取 `base.i`；
/// - 既有标记按顺序镜像同一排名管道的编码，多出的标记不分配。
pub fn assign_codes(
    base: &str,
    conduits: &[(EntityId, Point2)],
    fittings: &[EntityId],
    markers: &[EntityId],
) -> CodeAssignment {
    let mut ordered: Vec<&(EntityId, Point2)> = conduits.iter().collect();
    ordered.sort_by(|(_, a), (_, b)| by_position(a, b));

    let mut codes = Vec::with_capacity(conduits.len() + fittings.len() + markers.len());
    for fitting in fittings {
        codes.push((*fitting, base.to_string()));
    }

    let conduit_codes: Vec<(EntityId, String)> = ordered
        .iter()
        .enumerate()
        .map(|(index, (id, _))| (*id, format!("{base}.{}", index + 1)))
        .collect();
    for (marker, (_, code)) in markers.iter().zip(conduit_codes.iter()) {
        codes.push((*marker, code.clone()));
    }
    if markers.len() > conduit_codes.len() {
        debug!(
            markers = markers.len(),
            conduits = conduit_codes.len(),
            "标记数量多于管道，多余标记不分配编码"
        );
    }
    codes.extend(conduit_codes);

    CodeAssignment {
        base: base.to_string(),
        codes,
    }
}

/// 管道的二维位置取包围盒中心；无包围盒时退化为原点。
pub fn conduit_positions(session: &Session<'_>, conduits: &[EntityId]) -> Vec<(EntityId, Point2)> {
    conduits
        .iter()
        .map(|id| {
            let position = session
                .document
                .bounding_box(*id, session.view)
                .filter(|bounds| !bounds.is_empty())
                .map(|bounds| bounds.center().to_xy())
                .unwrap_or_else(|| Point2::new(0.0, 0.0));
            (*id, position)
        })
        .collect()
}

/// 新标签的放置位置：区域内全部实体包围盒并集的最小角点。
pub fn label_anchor(session: &Session<'_>, region: &RegionResult) -> Option<Point3> {
    region_bounds(session, region).map(|bounds| bounds.min())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn base_code_is_first_digit_dot_run() {
        assert_eq!(parse_base_code("prefab 5.5.5").unwrap(), "5.5.5");
        assert_eq!(parse_base_code("5.1.1").unwrap(), "5.1.1");
        assert_eq!(parse_base_code("prefab 12.3 (rev 4)").unwrap(), "12.3");
        assert_eq!(parse_base_code("v. 7.2.").unwrap(), "7.2");
    }

    #[test]
    fn text_without_digits_is_unparsable() {
        assert_eq!(
            parse_base_code("prefab"),
            Err(EngineError::UnparsableBase("prefab".to_string()))
        );
        assert!(parse_base_code("...").is_err());
        assert!(parse_base_code("").is_err());
    }

    #[test]
    fn conduits_are_numbered_by_x_then_y() {
        let conduits = vec![
            (id(1), Point2::new(10.0, 0.0)),
            (id(2), Point2::new(0.0, 0.0)),
            (id(3), Point2::new(5.0, 0.0)),
        ];
        let assignment = assign_codes("5.1.1", &conduits, &[id(9)], &[]);
        assert_eq!(assignment.code_for(id(2)), Some("5.1.1.1"));
        assert_eq!(assignment.code_for(id(3)), Some("5.1.1.2"));
        assert_eq!(assignment.code_for(id(1)), Some("5.1.1.3"));
        assert_eq!(assignment.code_for(id(9)), Some("5.1.1"));
    }

    #[test]
    fn equal_x_sorts_by_y_and_ties_stay_stable() {
        let conduits = vec![
            (id(1), Point2::new(0.0, 5.0)),
            (id(2), Point2::new(0.0, 1.0)),
            (id(3), Point2::new(0.0, 1.0)),
        ];
        let assignment = assign_codes("2", &conduits, &[], &[]);
        assert_eq!(assignment.code_for(id(2)), Some("2.1"));
        assert_eq!(assignment.code_for(id(3)), Some("2.2"));
        assert_eq!(assignment.code_for(id(1)), Some("2.3"));
    }

    #[test]
    fn markers_mirror_conduit_rank() {
        let conduits = vec![(id(1), Point2::new(3.0, 0.0)), (id(2), Point2::new(1.0, 0.0))];
        let assignment = assign_codes("4.4", &conduits, &[], &[id(7), id(8), id(9)]);
        assert_eq!(assignment.code_for(id(7)), Some("4.4.1"));
        assert_eq!(assignment.code_for(id(8)), Some("4.4.2"));
        assert_eq!(assignment.code_for(id(9)), None);
    }
}
