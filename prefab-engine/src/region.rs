use prefab_core::document::EntityId;
use prefab_core::geometry::{Bounds3D, Point2, Polygon};
use tracing::{debug, info};

use crate::session::Session;

/// 区域筛选结果，保持源集合中的插入顺序。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionResult {
    members: Vec<EntityId>,
}

impl RegionResult {
    pub fn new(members: Vec<EntityId>) -> Self {
        Self { members }
    }

    #[inline]
    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }
}

/// 偶奇规则射线法（沿 +X 方向），只使用顶点的 XY 分量。
/// 恰好落在边上的点归属不确定。
pub fn point_in_polygon(point: Point2, polygon: &Polygon) -> bool {
    let (x, y) = (point.x(), point.y());
    let mut inside = false;
    for (a, b) in polygon.edges() {
        let (xi, yi) = (a.x(), a.y());
        let (xj, yj) = (b.x(), b.y());
        if (yi > y) != (yj > y) {
            let crossing = xi + (xj - xi) * (y - yi) / (yj - yi);
            if x < crossing {
                inside = !inside;
            }
        }
    }
    inside
}

/// 对 `(实体, 包围盒)` 序列执行包含判定；缺少可用包围盒的实体直接排除。
pub fn select_inside<I>(polygon: &Polygon, entities: I) -> Vec<EntityId>
where
    I: IntoIterator<Item = (EntityId, Option<Bounds3D>)>,
{
    entities
        .into_iter()
        .filter_map(|(id, bounds)| {
            let bounds = bounds.filter(|bounds| !bounds.is_empty() && bounds.is_finite())?;
            let center = bounds.center().to_xy();
            let inside = point_in_polygon(center, polygon);
            debug!(
                entity = id.get(),
                x = center.x(),
                y = center.y(),
                inside,
                "区域包含判定"
            );
            inside.then_some(id)
        })
        .collect()
}

/// 收集活动视图中包围盒中心位于多边形内部的实体。
pub fn filter_region(session: &Session<'_>, polygon: &Polygon) -> RegionResult {
    let view = session.view;
    let document = &*session.document;
    let candidates = document
        .entities_in_view(view)
        .into_iter()
        .map(|id| (id, document.bounding_box(id, view)));
    let members = select_inside(polygon, candidates);
    info!(count = members.len(), "区域内实体收集完成");
    RegionResult::new(members)
}

/// 区域内所有实体包围盒的并集。
pub fn region_bounds(session: &Session<'_>, region: &RegionResult) -> Option<Bounds3D> {
    let mut bounds = Bounds3D::empty();
    let mut has = false;
    for id in region.members() {
        if let Some(entity_bounds) = session.document.bounding_box(*id, session.view) {
            if entity_bounds.is_finite() {
                bounds.include_bounds(&entity_bounds);
                has = true;
            }
        }
    }
    if has { Some(bounds) } else { None }
}
