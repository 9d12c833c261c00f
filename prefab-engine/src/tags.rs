//! 宿主与标记的一致性维护。
//!
//! 每根管道只有 `Untagged` / `Tagged` 两种状态；所有变更都在独立的事务中完成，
//! 表格行与关联表只在文档操作成功后更新。

use std::collections::HashMap;

use prefab_core::document::{AttrValue, EntityId};
use tracing::{debug, info};

use crate::classify::{EntityRecord, Role, TagStatus, find_marker_for_host};
use crate::errors::EngineError;
use crate::grid::{Grid, GridRow};
use crate::model::run_scoped;
use crate::session::Session;

/// 宿主与标记的一对一关联。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagLink {
    pub host: EntityId,
    pub marker: EntityId,
}

/// 单个动作的结果：实际生效，或因状态不符而无操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct TagReconciler {
    links: HashMap<EntityId, EntityId>,
}

impl TagReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据初始表格建立关联：每个已标记宿主关联其第一条标记行。
    pub fn from_grid(grid: &Grid) -> Self {
        let mut reconciler = Self::new();
        for row in grid.rows() {
            if row.role() != Role::ConduitMarker {
                continue;
            }
            let Some(host) = row.record.host else {
                continue;
            };
            let host_tagged = grid
                .row(host)
                .is_some_and(|host_row| host_row.status == TagStatus::Tagged);
            if host_tagged && !reconciler.links.contains_key(&host) {
                reconciler.links.insert(host, row.id());
            }
        }
        debug!(links = reconciler.links.len(), "标记关联已建立");
        reconciler
    }

    pub fn link_for_host(&self, host: EntityId) -> Option<TagLink> {
        self.links
            .get(&host)
            .map(|marker| TagLink { host, marker: *marker })
    }

    pub fn link_for_marker(&self, marker: EntityId) -> Option<TagLink> {
        self.links
            .iter()
            .find(|(_, linked)| **linked == marker)
            .map(|(host, _)| TagLink {
                host: *host,
                marker,
            })
    }

    pub fn links(&self) -> Vec<TagLink> {
        let mut links: Vec<TagLink> = self
            .links
            .iter()
            .map(|(host, marker)| TagLink {
                host: *host,
                marker: *marker,
            })
            .collect();
        links.sort_by_key(|link| link.host);
        links
    }

    /// 在宿主包围盒中心创建标记，并插入镜像宿主信息的标记行。
    pub fn add_tag(
        &mut self,
        session: &mut Session<'_>,
        grid: &mut Grid,
        host: EntityId,
    ) -> Result<Outcome, EngineError> {
        let host_row = grid
            .row(host)
            .filter(|row| row.role() == Role::PrimaryConduit)
            .ok_or(EngineError::EntityNotFound(host.get()))?;
        if host_row.status == TagStatus::Tagged {
            return Ok(Outcome::Unchanged);
        }
        if !session.document.contains(host) {
            return Err(EngineError::EntityNotFound(host.get()));
        }
        let position = session
            .document
            .bounding_box(host, session.view)
            .filter(|bounds| !bounds.is_empty())
            .map(|bounds| bounds.center())
            .ok_or(EngineError::NotTaggable(host.get()))?;

        let view = session.view;
        let marker = run_scoped(&mut *session.document, "Add tag", |document| {
            document.create_marker(view, host, position)
        })?;

        let mirrored = mirror_row(grid, host, marker);
        self.links.insert(host, marker);
        if let Some(row) = grid.row_mut(host) {
            row.status = TagStatus::Tagged;
        }
        grid.push(mirrored);
        info!(host = host.get(), marker = marker.get(), "已添加标记");
        Ok(Outcome::Applied)
    }

    /// 删除宿主的标记。关联未缓存或已失效时，反向扫描文档中的标记。
    ///
    /// 宿主已从文档中消失时返回 `EntityNotFound`，并移除宿主行及其失效的标记行。
    pub fn remove_tag(
        &mut self,
        session: &mut Session<'_>,
        grid: &mut Grid,
        host: EntityId,
    ) -> Result<Outcome, EngineError> {
        let host_row = grid
            .row(host)
            .filter(|row| row.role() == Role::PrimaryConduit)
            .ok_or(EngineError::EntityNotFound(host.get()))?;
        let tagged = host_row.status == TagStatus::Tagged;

        if !session.document.contains(host) {
            self.links.remove(&host);
            let pruned = prune_vanished_markers(session, grid, host);
            grid.remove(host);
            debug!(host = host.get(), pruned, "宿主已被删除，移除其表格行");
            return Err(EngineError::EntityNotFound(host.get()));
        }
        if !tagged {
            return Ok(Outcome::Unchanged);
        }

        let linked = self.links.get(&host).copied();
        let marker = linked
            .filter(|marker| session.document.contains(*marker))
            .or_else(|| find_marker_for_host(session, host));

        if let Some(marker) = marker {
            run_scoped(&mut *session.document, "Remove tag", |document| {
                document.delete_entity(marker)
            })?;
            grid.remove(marker);
            info!(host = host.get(), marker = marker.get(), "已删除标记");
        } else {
            debug!(host = host.get(), "宿主已无标记，仅重置状态");
        }
        if let Some(linked) = linked.filter(|linked| !session.document.contains(*linked)) {
            grid.remove(linked);
        }
        prune_vanished_markers(session, grid, host);
        self.links.remove(&host);
        self.settle_host(session, grid, host);
        Ok(Outcome::Applied)
    }

    /// 直接在标记行上删除：解析其宿主并将宿主行恢复为未标记。
    pub fn remove_marker(
        &mut self,
        session: &mut Session<'_>,
        grid: &mut Grid,
        marker: EntityId,
    ) -> Result<Outcome, EngineError> {
        let row = grid
            .row(marker)
            .filter(|row| row.role() == Role::ConduitMarker)
            .ok_or(EngineError::EntityNotFound(marker.get()))?;
        let host = self
            .link_for_marker(marker)
            .map(|link| link.host)
            .or_else(|| session.document.marker_host(marker))
            .or(row.record.host);

        if session.document.contains(marker) {
            run_scoped(&mut *session.document, "Remove tag", |document| {
                document.delete_entity(marker)
            })?;
        }
        grid.remove(marker);
        info!(marker = marker.get(), host = ?host.map(EntityId::get), "已删除标记行");

        if let Some(host) = host {
            let linked = self.links.get(&host).copied();
            if linked.is_none_or(|linked| linked == marker) {
                self.links.remove(&host);
                self.settle_host(session, grid, host);
            }
        }
        Ok(Outcome::Applied)
    }

    /// 翻转管件的布尔特性；管件不具备该特性时无操作。
    pub fn toggle_feature(
        &mut self,
        session: &mut Session<'_>,
        grid: &mut Grid,
        fitting: EntityId,
        feature: &str,
    ) -> Result<Outcome, EngineError> {
        if grid.row(fitting).is_none() {
            return Err(EngineError::EntityNotFound(fitting.get()));
        }
        if !session.document.contains(fitting) {
            return Err(EngineError::EntityNotFound(fitting.get()));
        }
        let Some(current) = session
            .document
            .attribute(fitting, feature)
            .and_then(|value| value.as_flag())
        else {
            debug!(entity = fitting.get(), feature, "管件没有该开关参数");
            return Ok(Outcome::Unchanged);
        };

        let description = format!("Flip {feature}");
        run_scoped(&mut *session.document, &description, |document| {
            document.set_attribute(fitting, feature, AttrValue::Flag(!current))
        })?;

        if feature == session.settings.attributes.feature_flag {
            if let Some(row) = grid.row_mut(fitting) {
                row.record.feature_flag = Some(!current);
            }
        }
        info!(entity = fitting.get(), feature, value = !current, "已切换管件特性");
        Ok(Outcome::Applied)
    }

    /// 宿主的标记被移除后，若文档中仍有其他标记则改为关联它，否则恢复为未标记。
    fn settle_host(&mut self, session: &Session<'_>, grid: &mut Grid, host: EntityId) {
        let remaining = if session.document.contains(host) {
            find_marker_for_host(session, host)
        } else {
            None
        };
        match remaining {
            Some(other) => {
                self.links.insert(host, other);
                debug!(host = host.get(), marker = other.get(), "宿主仍有其他标记");
            }
            None => {
                if let Some(row) = grid.row_mut(host) {
                    row.status = TagStatus::Untagged;
                }
            }
        }
    }
}

/// 移除宿主名下实体已不存在的标记行，返回移除的行数。
fn prune_vanished_markers(session: &Session<'_>, grid: &mut Grid, host: EntityId) -> usize {
    let vanished: Vec<EntityId> = grid
        .rows()
        .iter()
        .filter(|row| row.role() == Role::ConduitMarker && row.record.host == Some(host))
        .map(GridRow::id)
        .filter(|marker| !session.document.contains(*marker))
        .collect();
    vanished.iter().map(|marker| grid.remove(*marker)).sum()
}

fn mirror_row(grid: &Grid, host: EntityId, marker: EntityId) -> GridRow {
    let (code, diameter, length) = grid
        .row(host)
        .map(|row| {
            (
                row.new_code.clone(),
                row.record.outside_diameter.clone(),
                row.record.length.clone(),
            )
        })
        .unwrap_or_default();
    let record = EntityRecord {
        id: marker,
        role: Role::ConduitMarker,
        name: "Tag".to_string(),
        default_code: code,
        outside_diameter: diameter,
        length,
        size: String::new(),
        article_number: String::new(),
        warning: String::new(),
        feature_flag: None,
        tag_status: TagStatus::Tagged,
        host: Some(host),
        toggle: None,
    };
    GridRow::from_record(record)
}

#[cfg(test)]
mod tests {
    use prefab_core::document::{Document, Entity, ViewId};
    use prefab_core::geometry::{Bounds3D, Point3};

    use super::*;
    use crate::classify::classify_region;
    use crate::model::DocumentModel;
    use crate::region::RegionResult;
    use crate::session::SessionSettings;

    const VIEW: ViewId = ViewId::new(1);

    fn pipe(x: f64) -> Entity {
        Entity::new("Pipes", "buis")
            .with_attribute("Outside Diameter", AttrValue::Number(110.0))
            .with_attribute("Length", AttrValue::Number(2000.0))
            .with_bounds(Bounds3D::new(
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 10.0, 2.0, 0.0),
            ))
            .in_view(VIEW)
    }

    fn setup(doc: &mut Document) -> (Vec<EntityId>, RegionResult) {
        doc.register_tag_category("Pipes", "Pipe Tags");
        let ids: Vec<EntityId> = (0..3).map(|i| doc.add_entity(pipe(i as f64 * 20.0))).collect();
        let region = RegionResult::new(ids.clone());
        (ids, region)
    }

    #[test]
    fn add_then_remove_restores_untagged_state() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::from_grid(&grid);
        let host = ids[1];
        let rows_before = grid.len();

        assert_eq!(tags.add_tag(&mut session, &mut grid, host).unwrap(), Outcome::Applied);
        assert_eq!(grid.len(), rows_before + 1);
        assert_eq!(grid.row(host).unwrap().status, TagStatus::Tagged);
        let link = tags.link_for_host(host).expect("link");
        let marker_row = grid.row(link.marker).expect("marker row");
        assert_eq!(marker_row.record.outside_diameter, "110 mm");
        assert_eq!(marker_row.record.host, Some(host));
        let centre = session
            .document
            .bounding_box(link.marker, VIEW)
            .unwrap()
            .center();
        assert!(centre.approx_eq(Point3::new(25.0, 1.0, 0.0), 1e-9));

        assert_eq!(tags.add_tag(&mut session, &mut grid, host).unwrap(), Outcome::Unchanged);

        assert_eq!(tags.remove_tag(&mut session, &mut grid, host).unwrap(), Outcome::Applied);
        assert_eq!(grid.len(), rows_before);
        assert_eq!(grid.row(host).unwrap().status, TagStatus::Untagged);
        assert!(!session.document.contains(link.marker));
        assert!(tags.link_for_host(host).is_none());

        assert_eq!(tags.remove_tag(&mut session, &mut grid, host).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn remove_tag_finds_uncached_marker_by_reverse_lookup() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let marker = doc
            .create_marker(VIEW, ids[0], Point3::new(5.0, 1.0, 0.0))
            .unwrap();
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::new();

        assert_eq!(grid.row(ids[0]).unwrap().status, TagStatus::Tagged);
        tags.remove_tag(&mut session, &mut grid, ids[0]).unwrap();
        assert!(!session.document.contains(marker));
        assert!(grid.row(marker).is_none());
        assert_eq!(grid.row(ids[0]).unwrap().status, TagStatus::Untagged);
    }

    #[test]
    fn remove_tag_drops_row_of_externally_deleted_marker() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::from_grid(&grid);
        let rows_before = grid.len();

        tags.add_tag(&mut session, &mut grid, ids[0]).unwrap();
        let marker = tags.link_for_host(ids[0]).unwrap().marker;
        session.document.delete_entity(marker).unwrap();

        assert_eq!(tags.remove_tag(&mut session, &mut grid, ids[0]).unwrap(), Outcome::Applied);
        assert_eq!(grid.len(), rows_before);
        assert!(grid.row(marker).is_none());
        assert!(grid.rows().iter().all(|row| session.document.contains(row.id())));
        assert_eq!(grid.row(ids[0]).unwrap().status, TagStatus::Untagged);
        assert!(tags.links().is_empty());
    }

    #[test]
    fn remove_tag_on_deleted_host_fails_and_prunes_rows() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::from_grid(&grid);

        tags.add_tag(&mut session, &mut grid, ids[1]).unwrap();
        let marker = tags.link_for_host(ids[1]).unwrap().marker;
        session.document.delete_entity(ids[1]).unwrap();
        assert!(!session.document.contains(marker));

        let err = tags.remove_tag(&mut session, &mut grid, ids[1]).unwrap_err();
        assert_eq!(err, EngineError::EntityNotFound(ids[1].get()));
        assert!(grid.row(ids[1]).is_none());
        assert!(grid.row(marker).is_none());
        assert_eq!(grid.len(), 2);
        assert!(tags.link_for_host(ids[1]).is_none());
    }

    #[test]
    fn removing_marker_row_resets_its_host() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::from_grid(&grid);

        tags.add_tag(&mut session, &mut grid, ids[2]).unwrap();
        let marker = tags.link_for_host(ids[2]).unwrap().marker;
        assert_eq!(tags.link_for_marker(marker).map(|link| link.host), Some(ids[2]));

        tags.remove_marker(&mut session, &mut grid, marker).unwrap();
        assert!(grid.row(marker).is_none());
        assert_eq!(grid.row(ids[2]).unwrap().status, TagStatus::Untagged);
        assert!(tags.links().is_empty());
    }

    #[test]
    fn add_tag_on_deleted_host_fails_without_changes() {
        let mut doc = Document::new();
        let (ids, region) = setup(&mut doc);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::from_grid(&grid);

        session.document.delete_entity(ids[0]).unwrap();
        let err = tags.add_tag(&mut session, &mut grid, ids[0]).unwrap_err();
        assert_eq!(err, EngineError::EntityNotFound(ids[0].get()));
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.row(ids[0]).unwrap().status, TagStatus::Untagged);
    }

    #[test]
    fn toggle_flips_flag_and_ignores_missing_feature() {
        let mut doc = Document::new();
        let fitting = doc.add_entity(
            Entity::new("Pipe Fittings", "Multibocht - Var. DN/OD")
                .with_attribute("2x45°", AttrValue::Flag(true))
                .with_bounds(Bounds3D::new(Point3::origin(), Point3::new(1.0, 1.0, 0.0)))
                .in_view(VIEW),
        );
        let region = RegionResult::new(vec![fitting]);
        let mut session = Session::new(&mut doc, VIEW, SessionSettings::default());
        let mut grid = Grid::from_records(classify_region(&session, &region));
        let mut tags = TagReconciler::new();

        let outcome = tags
            .toggle_feature(&mut session, &mut grid, fitting, "2x45°")
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(
            session.document.attribute(fitting, "2x45°"),
            Some(AttrValue::Flag(false))
        );
        assert_eq!(grid.row(fitting).unwrap().record.feature_flag, Some(false));

        let outcome = tags
            .toggle_feature(&mut session, &mut grid, fitting, "switch_excentriciteit")
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
    }
}
