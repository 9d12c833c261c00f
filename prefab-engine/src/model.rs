//! 文档模型契约：核心组件只通过 `EntityId` 访问宿主实体，
//! 每次使用时重新解析，不跨动作持有实体引用。

use prefab_core::document::{AttrValue, Document, Entity, EntityId, ViewId};
use prefab_core::geometry::{Bounds3D, Point3, Segment};
use tracing::{debug, warn};

use crate::errors::EngineError;

pub trait DocumentModel {
    fn entities_in_view(&self, view: ViewId) -> Vec<EntityId>;
    fn entities_with_category(&self, category: &str) -> Vec<EntityId>;
    fn contains(&self, id: EntityId) -> bool;
    fn category(&self, id: EntityId) -> Option<String>;
    fn name(&self, id: EntityId) -> Option<String>;
    fn family(&self, id: EntityId) -> Option<String>;
    fn bounding_box(&self, id: EntityId, view: ViewId) -> Option<Bounds3D>;
    fn curve(&self, id: EntityId) -> Option<Segment>;
    fn attribute(&self, id: EntityId, name: &str) -> Option<AttrValue>;
    fn is_read_only(&self, id: EntityId) -> bool;
    /// 标记实体记录的宿主 ID。
    fn marker_host(&self, marker: EntityId) -> Option<EntityId>;

    fn set_attribute(
        &mut self,
        id: EntityId,
        name: &str,
        value: AttrValue,
    ) -> Result<(), EngineError>;
    fn create_marker(
        &mut self,
        view: ViewId,
        host: EntityId,
        position: Point3,
    ) -> Result<EntityId, EngineError>;
    /// 在视图中放置文字标签，标签文本即实体名称。
    fn create_label(
        &mut self,
        view: ViewId,
        category: &str,
        position: Point3,
        text: &str,
    ) -> Result<EntityId, EngineError>;
    fn delete_entity(&mut self, id: EntityId) -> Result<(), EngineError>;

    fn begin_scope(&mut self, description: &str);
    fn commit_scope(&mut self);
    fn rollback_scope(&mut self);
}

/// 以事务方式执行 `body`：成功则提交，失败则整体回滚并包装为 `TransactionFailure`。
pub fn run_scoped<T>(
    document: &mut dyn DocumentModel,
    description: &str,
    body: impl FnOnce(&mut dyn DocumentModel) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    document.begin_scope(description);
    match body(&mut *document) {
        Ok(value) => {
            document.commit_scope();
            debug!(description, "事务已提交");
            Ok(value)
        }
        Err(err) => {
            document.rollback_scope();
            warn!(description, error = %err, "事务失败，已回滚");
            Err(EngineError::TransactionFailure {
                description: description.to_string(),
                source: Box::new(err),
            })
        }
    }
}

impl DocumentModel for Document {
    fn entities_in_view(&self, view: ViewId) -> Vec<EntityId> {
        Document::entities_in_view(self, view)
            .map(|(id, _)| *id)
            .collect()
    }

    fn entities_with_category(&self, category: &str) -> Vec<EntityId> {
        Document::entities_with_category(self, category)
            .map(|(id, _)| *id)
            .collect()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.entity(id).is_some()
    }

    fn category(&self, id: EntityId) -> Option<String> {
        self.entity(id).map(|entity| entity.category.clone())
    }

    fn name(&self, id: EntityId) -> Option<String> {
        self.entity(id).map(|entity| entity.name.clone())
    }

    fn family(&self, id: EntityId) -> Option<String> {
        self.entity(id).and_then(|entity| entity.family.clone())
    }

    fn bounding_box(&self, id: EntityId, view: ViewId) -> Option<Bounds3D> {
        let entity = self.entity(id)?;
        if !entity.visible_in(view) {
            return None;
        }
        entity.bounds()
    }

    fn curve(&self, id: EntityId) -> Option<Segment> {
        self.entity(id).and_then(|entity| entity.curve)
    }

    fn attribute(&self, id: EntityId, name: &str) -> Option<AttrValue> {
        self.entity(id)
            .and_then(|entity| entity.attributes.get(name).cloned())
    }

    fn is_read_only(&self, id: EntityId) -> bool {
        self.entity(id).is_some_and(|entity| entity.read_only)
    }

    fn marker_host(&self, marker: EntityId) -> Option<EntityId> {
        self.entity(marker).and_then(|entity| entity.host)
    }

    fn set_attribute(
        &mut self,
        id: EntityId,
        name: &str,
        value: AttrValue,
    ) -> Result<(), EngineError> {
        let entity = self
            .entity_mut(id)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        if entity.read_only {
            return Err(EngineError::EntityReadOnly(id.get()));
        }
        entity.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn create_marker(
        &mut self,
        view: ViewId,
        host: EntityId,
        position: Point3,
    ) -> Result<EntityId, EngineError> {
        let host_entity = self
            .entity(host)
            .ok_or(EngineError::EntityNotFound(host.get()))?;
        let tag_category = self
            .tag_category_for(&host_entity.category)
            .ok_or(EngineError::NotTaggable(host.get()))?
            .to_string();
        let marker = Entity::new(tag_category, "Tag")
            .with_bounds(Bounds3D::new(position, position))
            .with_host(host)
            .in_view(view);
        Ok(self.add_entity(marker))
    }

    fn create_label(
        &mut self,
        view: ViewId,
        category: &str,
        position: Point3,
        text: &str,
    ) -> Result<EntityId, EngineError> {
        let label = Entity::new(category, text)
            .with_bounds(Bounds3D::new(position, position))
            .in_view(view);
        Ok(self.add_entity(label))
    }

    fn delete_entity(&mut self, id: EntityId) -> Result<(), EngineError> {
        let entity = self
            .entity(id)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        if entity.read_only {
            return Err(EngineError::EntityReadOnly(id.get()));
        }
        self.remove_entity(id);
        // 宿主被删除时，其标记一并删除。
        let dependents: Vec<EntityId> = self
            .entities()
            .filter(|(_, entity)| entity.host == Some(id))
            .map(|(dependent, _)| *dependent)
            .collect();
        for dependent in dependents {
            self.remove_entity(dependent);
        }
        Ok(())
    }

    fn begin_scope(&mut self, description: &str) {
        debug!(description, depth = self.checkpoint_depth(), "开始事务");
        self.checkpoint();
    }

    fn commit_scope(&mut self) {
        self.release_checkpoint();
    }

    fn rollback_scope(&mut self) {
        self.restore_checkpoint();
    }
}
