//! 二维三边定位
//!
//! 选点规则：在已知距离的基站中按 ID 升序取前三个，其余基站只参与残差统计。
//! 把基站 1 的圆方程分别从基站 2、3 的圆方程中减去，得到 2x2 线性方程组，
//! 用克莱姆法则求解。行列式为零（或绝对值小于 epsilon）即几何退化，返回 `None`。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithms::anchor::{Anchor, AnchorId, AnchorTopology};

/// 默认退化判定阈值
pub const DEFAULT_DEGENERACY_EPSILON: f64 = 1e-10;

/// 二维坐标点（米）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// 点集的算术平均，空集返回 `None`
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Point> {
        let mut count = 0usize;
        let mut sum = Point::new(0.0, 0.0);
        for p in points {
            sum.x += p.x;
            sum.y += p.y;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Point::new(sum.x / count as f64, sum.y / count as f64))
    }
}

impl From<&Anchor> for Point {
    fn from(anchor: &Anchor) -> Self {
        Point::new(anchor.x, anchor.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// 一次成功的定位解
#[derive(Clone, Debug, PartialEq)]
pub struct Fix {
    pub point: Point,
    /// 参与求解的三个基站（升序）
    pub anchors: [AnchorId; 3],
    /// 与所有已知基站距离的均方根残差（米）
    pub residual: f64,
}

/// 三边定位求解器
#[derive(Clone, Copy, Debug)]
pub struct Trilateration {
    pub epsilon: f64,
}

impl Trilateration {
    pub fn new(epsilon: f64) -> Self {
        Trilateration { epsilon }
    }

    /// 按 ID 升序选出前三个拓扑中已知的基站
    pub fn select_anchors(
        topology: &AnchorTopology,
        distances: &BTreeMap<AnchorId, f64>,
    ) -> Option<[(Anchor, f64); 3]> {
        let mut selected = distances
            .iter()
            .filter_map(|(id, d)| topology.get(*id).map(|anchor| (*anchor, *d)));
        Some([selected.next()?, selected.next()?, selected.next()?])
    }

    /// 求解定位，基站不足或几何退化时返回 `None`
    pub fn solve(
        &self,
        topology: &AnchorTopology,
        distances: &BTreeMap<AnchorId, f64>,
    ) -> Option<Fix> {
        let [(a1, r1), (a2, r2), (a3, r3)] = Self::select_anchors(topology, distances)?;
        let point = trilaterate(
            (Point::from(&a1), r1),
            (Point::from(&a2), r2),
            (Point::from(&a3), r3),
            self.epsilon,
        )?;

        let residual = rms_residual(topology, distances, &point);
        Some(Fix {
            point,
            anchors: [a1.id, a2.id, a3.id],
            residual,
        })
    }
}

impl Default for Trilateration {
    fn default() -> Self {
        Trilateration::new(DEFAULT_DEGENERACY_EPSILON)
    }
}

/// 三圆求交（线性化 + 克莱姆法则）
pub fn trilaterate(
    (p1, r1): (Point, f64),
    (p2, r2): (Point, f64),
    (p3, r3): (Point, f64),
    epsilon: f64,
) -> Option<Point> {
    let a = 2.0 * (p2.x - p1.x);
    let b = 2.0 * (p2.y - p1.y);
    let c = r1 * r1 - r2 * r2 + (p2.x * p2.x - p1.x * p1.x) + (p2.y * p2.y - p1.y * p1.y);
    let d = 2.0 * (p3.x - p1.x);
    let e = 2.0 * (p3.y - p1.y);
    let f = r1 * r1 - r3 * r3 + (p3.x * p3.x - p1.x * p1.x) + (p3.y * p3.y - p1.y * p1.y);

    let den = a * e - b * d;
    if den == 0.0 || den.abs() < epsilon {
        return None;
    }

    let x = (c * e - b * f) / den;
    let y = (a * f - c * d) / den;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(Point::new(x, y))
}

fn rms_residual(topology: &AnchorTopology, distances: &BTreeMap<AnchorId, f64>, point: &Point) -> f64 {
    let mut sum_error = 0.0;
    let mut count = 0usize;
    for (id, distance) in distances {
        if let Some(anchor) = topology.get(*id) {
            let error = point.distance_to(&Point::from(anchor)) - distance;
            sum_error += error * error;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_error / count as f64).sqrt()
}
