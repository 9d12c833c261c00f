pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，用于平面内的排序与包含判定。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    /// 三维点，宿主文档中的所有坐标都以三维形式给出。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn origin() -> Self {
            Self(DVec3::ZERO)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        /// 投影到 XY 平面。
        #[inline]
        pub fn to_xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        /// 逐轴比较，三个分量的差值都小于 `tolerance` 时视为重合。
        #[inline]
        pub fn approx_eq(self, other: Point3, tolerance: f64) -> bool {
            let delta = (self.0 - other.0).abs();
            delta.x < tolerance && delta.y < tolerance && delta.z < tolerance
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 有向线段，起点与终点的顺序来自宿主曲线，边界拼接时不依赖该顺序。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Segment {
        pub start: Point3,
        pub end: Point3,
    }

    impl Segment {
        #[inline]
        pub fn new(start: Point3, end: Point3) -> Self {
            Self { start, end }
        }

        /// 若 `point` 与任一端点重合，返回另一端点。起点优先。
        pub fn opposite_end(&self, point: Point3, tolerance: f64) -> Option<Point3> {
            if point.approx_eq(self.start, tolerance) {
                Some(self.end)
            } else if point.approx_eq(self.end, tolerance) {
                Some(self.start)
            } else {
                None
            }
        }
    }

    /// 隐式闭合的多边形：最后一个顶点与第一个顶点相连。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polygon {
        vertices: Vec<Point3>,
    }

    impl Polygon {
        /// 校验顶点序列：非空，且相邻顶点（含首尾）在容差外互不重合。
        pub fn from_vertices(vertices: Vec<Point3>, tolerance: f64) -> Option<Self> {
            if vertices.is_empty() {
                return None;
            }
            let count = vertices.len();
            if count > 1 {
                for index in 0..count {
                    let current = vertices[index];
                    let next = vertices[(index + 1) % count];
                    if current.approx_eq(next, tolerance) {
                        return None;
                    }
                }
            }
            Some(Self { vertices })
        }

        #[inline]
        pub fn vertices(&self) -> &[Point3] {
            &self.vertices
        }

        #[inline]
        pub fn vertex_count(&self) -> usize {
            self.vertices.len()
        }

        /// 依次返回每条边，最后一条边回到首顶点。
        pub fn edges(&self) -> impl Iterator<Item = (Point3, Point3)> + '_ {
            let count = self.vertices.len();
            (0..count).map(move |index| (self.vertices[index], self.vertices[(index + 1) % count]))
        }
    }

    /// 轴对齐包围盒，用于实体中心与区域范围估算。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds3D {
        min: Point3,
        max: Point3,
    }

    impl Bounds3D {
        /// 以任意两个角点构造，自动按分量取最小/最大值。
        #[inline]
        pub fn new(a: Point3, b: Point3) -> Self {
            Self {
                min: Point3(a.0.min(b.0)),
                max: Point3(a.0.max(b.0)),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
                max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y() || self.min.z() > self.max.z()
        }

        /// 所有分量有限时才可用于中心计算。
        #[inline]
        pub fn is_finite(&self) -> bool {
            self.min.0.is_finite() && self.max.0.is_finite()
        }

        #[inline]
        pub fn min(&self) -> Point3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point3 {
            self.max
        }

        pub fn include_point(&mut self, point: Point3) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point3(self.min.0.min(point.0));
            self.max = Point3(self.max.0.max(point.0));
        }

        pub fn include_bounds(&mut self, other: &Bounds3D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point3 {
            debug_assert!(!self.is_empty());
            Point3((self.min.0 + self.max.0) * 0.5)
        }
    }
}

pub mod document {
    use std::collections::{BTreeMap, HashMap};

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds3D, Point3, Segment};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub const fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ViewId(u64);

    impl ViewId {
        #[inline]
        pub const fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 实体参数值。数值参数统一以毫米存储。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum AttrValue {
        Text(String),
        Number(f64),
        Flag(bool),
    }

    impl AttrValue {
        #[inline]
        pub fn as_text(&self) -> Option<&str> {
            match self {
                AttrValue::Text(text) => Some(text),
                _ => None,
            }
        }

        #[inline]
        pub fn as_flag(&self) -> Option<bool> {
            match self {
                AttrValue::Flag(flag) => Some(*flag),
                _ => None,
            }
        }

        #[inline]
        pub fn as_number(&self) -> Option<f64> {
            match self {
                AttrValue::Number(value) => Some(*value),
                _ => None,
            }
        }

        /// 表格展示用的文本形式：数值取整并附带 `mm`，布尔值为 `Yes`/`No`。
        pub fn display_string(&self) -> String {
            match self {
                AttrValue::Text(text) => text.clone(),
                AttrValue::Number(value) => format!("{} mm", value.round() as i64),
                AttrValue::Flag(true) => "Yes".to_string(),
                AttrValue::Flag(false) => "No".to_string(),
            }
        }
    }

    /// 文档中的通用实体。类别与名称保持宿主给出的自由文本。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Entity {
        pub category: String,
        pub name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub family: Option<String>,
        #[serde(default)]
        pub attributes: BTreeMap<String, AttrValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub bounds: Option<Bounds3D>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub curve: Option<Segment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub host: Option<EntityId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub view: Option<ViewId>,
        #[serde(default)]
        pub read_only: bool,
    }

    impl Entity {
        pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
            Self {
                category: category.into(),
                name: name.into(),
                family: None,
                attributes: BTreeMap::new(),
                bounds: None,
                curve: None,
                host: None,
                view: None,
                read_only: false,
            }
        }

        pub fn with_family(mut self, family: impl Into<String>) -> Self {
            self.family = Some(family.into());
            self
        }

        pub fn with_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
            self.attributes.insert(name.into(), value);
            self
        }

        pub fn with_bounds(mut self, bounds: Bounds3D) -> Self {
            self.bounds = Some(bounds);
            self
        }

        pub fn with_curve(mut self, curve: Segment) -> Self {
            self.curve = Some(curve);
            self
        }

        pub fn with_host(mut self, host: EntityId) -> Self {
            self.host = Some(host);
            self
        }

        pub fn in_view(mut self, view: ViewId) -> Self {
            self.view = Some(view);
            self
        }

        pub fn read_only(mut self) -> Self {
            self.read_only = true;
            self
        }

        /// 显式包围盒优先；线类实体退化为端点范围。
        pub fn bounds(&self) -> Option<Bounds3D> {
            if let Some(bounds) = self.bounds {
                return Some(bounds);
            }
            self.curve
                .map(|curve| Bounds3D::new(curve.start, curve.end))
        }

        /// 实体是否在指定视图中可见：未归属视图的模型实体对所有视图可见。
        #[inline]
        pub fn visible_in(&self, view: ViewId) -> bool {
            self.view.is_none_or(|owner| owner == view)
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Checkpoint {
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
    }

    /// 实体仓库（arena），外部只通过 `EntityId` 引用实体。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        #[serde(default)]
        tag_categories: HashMap<String, String>,
        #[serde(skip)]
        checkpoints: Vec<Checkpoint>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        /// 登记宿主类别对应的标记类别，例如 `Pipes` -> `Pipe Tags`。
        pub fn register_tag_category(
            &mut self,
            host_category: impl Into<String>,
            tag_category: impl Into<String>,
        ) {
            self.tag_categories
                .insert(host_category.into(), tag_category.into());
        }

        #[inline]
        pub fn tag_category_for(&self, host_category: &str) -> Option<&str> {
            self.tag_categories
                .get(host_category)
                .map(|name| name.as_str())
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        /// 便捷方法：在视图中添加一条边界线。
        pub fn add_line(
            &mut self,
            view: ViewId,
            start: Point3,
            end: Point3,
            category: impl Into<String>,
        ) -> EntityId {
            let entity = Entity::new(category, "Detail Line")
                .with_curve(Segment::new(start, end))
                .in_view(view);
            self.add_entity(entity)
        }

        pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
            let index = self
                .entities
                .iter()
                .position(|(entity_id, _)| *entity_id == id)?;
            Some(self.entities.remove(index).1)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn entities_in_view(&self, view: ViewId) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities
                .iter()
                .filter(move |(_, entity)| entity.visible_in(view))
        }

        pub fn entities_with_category<'a>(
            &'a self,
            category: &'a str,
        ) -> impl Iterator<Item = &'a (EntityId, Entity)> + 'a {
            self.entities
                .iter()
                .filter(move |(_, entity)| entity.category == category)
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        #[inline]
        pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
            self.entities
                .iter_mut()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        #[inline]
        pub fn entity_bounds(&self, id: EntityId) -> Option<Bounds3D> {
            self.entity(id).and_then(Entity::bounds)
        }

        /// 记录当前实体状态，供作用域回滚使用。可嵌套。
        pub fn checkpoint(&mut self) {
            self.checkpoints.push(Checkpoint {
                entities: self.entities.clone(),
                next_entity_id: self.next_entity_id,
            });
        }

        /// 丢弃最近一次检查点（提交）。
        pub fn release_checkpoint(&mut self) -> bool {
            self.checkpoints.pop().is_some()
        }

        /// 恢复到最近一次检查点（回滚）。没有检查点时返回 `false`。
        pub fn restore_checkpoint(&mut self) -> bool {
            match self.checkpoints.pop() {
                Some(checkpoint) => {
                    self.entities = checkpoint.entities;
                    self.next_entity_id = checkpoint.next_entity_id;
                    true
                }
                None => false,
            }
        }

        #[inline]
        pub fn checkpoint_depth(&self) -> usize {
            self.checkpoints.len()
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
