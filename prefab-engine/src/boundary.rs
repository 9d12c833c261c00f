use prefab_core::geometry::{Point3, Polygon, Segment};
use tracing::debug;

use crate::errors::EngineError;

/// 将无序线段拼接为闭合多边形。
///
/// 以第一条线段为种子，反复在剩余线段池中查找与链尾重合（容差内）的端点，
/// 追加其另一端点并移除该线段。多条线段同时匹配时取池中第一条，
/// 因此分叉输入的结果依赖输入顺序，也不校验多边形是否自交。
///
/// 线段池必须被完全消耗且链尾回到链首，否则返回 `OpenBoundary`。
pub fn resolve_boundary(segments: &[Segment], tolerance: f64) -> Result<Polygon, EngineError> {
    let total = segments.len();
    let Some((seed, rest)) = segments.split_first() else {
        return Err(EngineError::OpenBoundary { chained: 0, total });
    };

    let mut pool: Vec<Segment> = rest.to_vec();
    let mut chain: Vec<Point3> = vec![seed.start, seed.end];

    while let Some(last) = chain.last().copied() {
        let matched = pool
            .iter()
            .enumerate()
            .find_map(|(index, segment)| {
                segment
                    .opposite_end(last, tolerance)
                    .map(|next| (index, next))
            });
        let Some((index, next)) = matched else {
            break;
        };
        chain.push(next);
        pool.remove(index);
    }

    let chained = total - pool.len();
    if !pool.is_empty() {
        debug!(chained, total, "边界线段未被完全消耗");
        return Err(EngineError::OpenBoundary { chained, total });
    }

    let first = chain[0];
    let closes = chain
        .last()
        .is_some_and(|last| last.approx_eq(first, tolerance));
    if !closes {
        debug!(chained, total, "边界链首尾未闭合");
        return Err(EngineError::OpenBoundary { chained, total });
    }
    chain.pop();

    Polygon::from_vertices(chain, tolerance).ok_or(EngineError::OpenBoundary { chained, total })
}
