use prefab_core::document::{AttrValue, Document, Entity, EntityId, ViewId};
use prefab_core::geometry::{Bounds3D, Point3};
use tracing::debug;

/// 演示文档中各实体的 ID。
#[derive(Debug, Clone)]
pub struct DemoEntities {
    pub boundary: Vec<EntityId>,
    pub pipes: Vec<EntityId>,
    pub marker: EntityId,
    pub tee: EntityId,
    pub bend: EntityId,
    pub reducer: EntityId,
    pub outside_pipe: EntityId,
    pub wall: EntityId,
}

fn boxed(min: (f64, f64), max: (f64, f64)) -> Bounds3D {
    Bounds3D::new(
        Point3::new(min.0, min.1, 0.0),
        Point3::new(max.0, max.1, 0.0),
    )
}

fn pipe(view: ViewId, min: (f64, f64), max: (f64, f64), length: f64) -> Entity {
    Entity::new("Pipes", "PE 100 SDR11")
        .with_attribute("Outside Diameter", AttrValue::Number(110.0))
        .with_attribute("Length", AttrValue::Number(length))
        .with_attribute("Size", AttrValue::Text("110 mm".into()))
        .with_bounds(boxed(min, max))
        .in_view(view)
}

/// 在视图中生成一个 100x100 的方形区域：边界线顺序打乱且有一条反向，
/// 区域内三根管道、三个管件、一个已有标记和一面墙，区域外一根已编号的管道。
pub fn populate_demo(document: &mut Document, view: ViewId) -> DemoEntities {
    document.register_tag_category("Pipes", "Pipe Tags");

    let corner = |x: f64, y: f64| Point3::new(x, y, 0.0);
    let boundary = vec![
        document.add_line(view, corner(100.0, 100.0), corner(0.0, 100.0), "Lines"),
        document.add_line(view, corner(0.0, 0.0), corner(100.0, 0.0), "Lines"),
        document.add_line(view, corner(0.0, 0.0), corner(0.0, 100.0), "Lines"),
        document.add_line(view, corner(100.0, 0.0), corner(100.0, 100.0), "Lines"),
    ];

    let pipes = vec![
        document.add_entity(pipe(view, (55.0, 48.0), (75.0, 52.0), 20000.0)),
        document.add_entity(pipe(view, (15.0, 48.0), (25.0, 52.0), 10000.0)),
        document.add_entity(pipe(view, (35.0, 28.0), (45.0, 72.0), 44000.0)),
    ];
    let marker = document.add_entity(
        Entity::new("Pipe Tags", "Tag")
            .with_host(pipes[1])
            .with_bounds(boxed((20.0, 55.0), (20.0, 55.0)))
            .in_view(view),
    );

    let tee = document.add_entity(
        Entity::new("Pipe Fittings", "Liggend - Var. DN/OD")
            .with_family("NLRS_52_PIF_UN_PE multi T-stuk_geb")
            .with_attribute("Nominal Diameter", AttrValue::Number(110.0))
            .with_attribute("GEB_Article_Number", AttrValue::Text("367.775.16.1".into()))
            .with_attribute("switch_excentriciteit", AttrValue::Flag(false))
            .with_bounds(boxed((28.0, 48.0), (32.0, 52.0)))
            .in_view(view),
    );
    let bend = document.add_entity(
        Entity::new("Pipe Fittings", "Multibocht - Var. DN/OD")
            .with_family("NLRS_52_PIF_UN_PE multibocht_geb")
            .with_attribute("Nominal Diameter", AttrValue::Number(110.0))
            .with_attribute("2x45°", AttrValue::Flag(true))
            .with_bounds(boxed((48.0, 48.0), (52.0, 52.0)))
            .in_view(view),
    );
    let reducer = document.add_entity(
        Entity::new("Pipe Fittings", "Verloop 110x90")
            .with_attribute("Nominal Diameter", AttrValue::Number(90.0))
            .with_attribute("waarschuwing", AttrValue::Text("Concentric reducer, check slope".into()))
            .with_attribute("kort_verloop (kleinste)", AttrValue::Flag(false))
            .with_attribute("kort_verloop (grootste)", AttrValue::Flag(false))
            .with_attribute("reducer_eccentric", AttrValue::Flag(false))
            .with_attribute("switch_excentriciteit", AttrValue::Flag(true))
            .with_bounds(boxed((78.0, 48.0), (82.0, 52.0)))
            .in_view(view),
    );

    let outside_pipe = document.add_entity(
        pipe(view, (140.0, 48.0), (160.0, 52.0), 20000.0)
            .with_attribute("Comments", AttrValue::Text("9.9.9.1".into())),
    );
    let wall = document.add_entity(
        Entity::new("Walls", "Basic Wall")
            .with_bounds(boxed((10.0, 80.0), (90.0, 85.0)))
            .in_view(view),
    );

    let ids = DemoEntities {
        boundary,
        pipes,
        marker,
        tee,
        bend,
        reducer,
        outside_pipe,
        wall,
    };
    debug!(
        boundary = ids.boundary.len(),
        pipes = ids.pipes.len(),
        marker = ids.marker.get(),
        outside_pipe = ids.outside_pipe.get(),
        "已创建演示实体"
    );
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentModel;

    #[test]
    fn demo_document_has_shuffled_boundary_and_outside_pipe() {
        let view = ViewId::new(1);
        let mut document = Document::new();
        let ids = populate_demo(&mut document, view);
        assert_eq!(ids.boundary.len(), 4);
        assert_eq!(ids.pipes.len(), 3);
        assert_eq!(document.marker_host(ids.marker), Some(ids.pipes[1]));
        assert_eq!(
            DocumentModel::attribute(&document, ids.outside_pipe, "Comments"),
            Some(AttrValue::Text("9.9.9.1".into()))
        );
        assert_eq!(document.tag_category_for("Pipes"), Some("Pipe Tags"));
    }
}
