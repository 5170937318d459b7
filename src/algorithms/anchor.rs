//! 基站（锚点）定义和拓扑

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};

/// 基站标识
pub type AnchorId = u32;

/// 单个固定基站
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    /// X 坐标（米）
    pub x: f64,
    /// Y 坐标（米）
    pub y: f64,
}

impl Anchor {
    pub fn new(id: AnchorId, x: f64, y: f64) -> Self {
        Anchor { id, x, y }
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 到另一基站的欧几里得距离
    pub fn distance_to(&self, other: &Anchor) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// 基站拓扑，启动后不可变，按基站 ID 升序存放
#[derive(Clone, Debug, Default)]
pub struct AnchorTopology {
    anchors: BTreeMap<AnchorId, Anchor>,
}

impl AnchorTopology {
    /// 从基站列表创建拓扑，重复 ID 或非有限坐标视为配置错误
    pub fn from_anchors(anchors: impl IntoIterator<Item = Anchor>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for anchor in anchors {
            if !anchor.x.is_finite() || !anchor.y.is_finite() {
                return Err(LocatorError::Config(format!(
                    "基站 {} 坐标无效: ({}, {})",
                    anchor.id, anchor.x, anchor.y
                )));
            }
            if map.insert(anchor.id, anchor).is_some() {
                return Err(LocatorError::Config(format!("基站 ID 重复: {}", anchor.id)));
            }
        }
        Ok(AnchorTopology { anchors: map })
    }

    pub fn get(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.get(&id)
    }

    pub fn contains(&self, id: AnchorId) -> bool {
        self.anchors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// 按 ID 升序迭代
    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_distance() {
        let a1 = Anchor::new(1, 0.0, 0.0);
        let a2 = Anchor::new(2, 3.0, 4.0);
        assert_eq!(a1.distance_to(&a2), 5.0);
    }

    #[test]
    fn test_topology_sorted_by_id() {
        let topology = AnchorTopology::from_anchors(vec![
            Anchor::new(4, 0.0, 5.0),
            Anchor::new(1, 0.0, 0.0),
            Anchor::new(3, 10.0, 5.0),
        ])
        .unwrap();
        let ids: Vec<_> = topology.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(topology.contains(3));
        assert!(!topology.contains(2));
    }

    #[test]
    fn test_topology_rejects_duplicates_and_nan() {
        assert!(
            AnchorTopology::from_anchors(vec![Anchor::new(1, 0.0, 0.0), Anchor::new(1, 1.0, 1.0)])
                .is_err()
        );
        assert!(AnchorTopology::from_anchors(vec![Anchor::new(1, f64::NAN, 0.0)]).is_err());
    }
}
