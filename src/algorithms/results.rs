//! 定位输出事件
//!
//! 每条被处理的观测产生且仅产生一个事件，序列化格式由下游决定。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::algorithms::trilateration::{Fix, Point};

/// 无定位结果的原因
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum NoFixReason {
    /// 已知基站不足 3 个
    InsufficientAnchors { known: usize },
    /// 基站共线或重合
    DegenerateGeometry,
}

/// 定位结果事件
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Outcome {
    Accepted {
        beacon: String,
        x: f64,
        y: f64,
        residual: f64,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        beacon: String,
        x: f64,
        y: f64,
        /// 与历史平均点的距离（米）
        deviation: f64,
        timestamp: DateTime<Utc>,
    },
    NoFix {
        beacon: String,
        #[serde(flatten)]
        reason: NoFixReason,
        timestamp: DateTime<Utc>,
    },
}

impl Outcome {
    pub fn accepted(beacon: &str, fix: &Fix, timestamp: DateTime<Utc>) -> Self {
        Outcome::Accepted {
            beacon: beacon.to_string(),
            x: fix.point.x,
            y: fix.point.y,
            residual: fix.residual,
            timestamp,
        }
    }

    pub fn rejected(beacon: &str, fix: &Fix, deviation: f64, timestamp: DateTime<Utc>) -> Self {
        Outcome::Rejected {
            beacon: beacon.to_string(),
            x: fix.point.x,
            y: fix.point.y,
            deviation,
            timestamp,
        }
    }

    pub fn no_fix(beacon: &str, reason: NoFixReason, timestamp: DateTime<Utc>) -> Self {
        Outcome::NoFix {
            beacon: beacon.to_string(),
            reason,
            timestamp,
        }
    }

    pub fn beacon(&self) -> &str {
        match self {
            Outcome::Accepted { beacon, .. }
            | Outcome::Rejected { beacon, .. }
            | Outcome::NoFix { beacon, .. } => beacon,
        }
    }

    /// 定位点（无结果时为 `None`）
    pub fn point(&self) -> Option<Point> {
        match self {
            Outcome::Accepted { x, y, .. } | Outcome::Rejected { x, y, .. } => Some(Point::new(*x, *y)),
            Outcome::NoFix { .. } => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Outcome::Accepted { timestamp, .. }
            | Outcome::Rejected { timestamp, .. }
            | Outcome::NoFix { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Accepted { beacon, x, y, .. } => {
                write!(f, "信标 {} 位置: x={:.2}, y={:.2}", beacon, x, y)
            }
            Outcome::Rejected { beacon, x, y, deviation, .. } => write!(
                f,
                "信标 {} 异常位置被拒绝: x={:.2}, y={:.2} (偏离 {:.2} m)",
                beacon, x, y, deviation
            ),
            Outcome::NoFix { beacon, reason, .. } => match reason {
                NoFixReason::InsufficientAnchors { known } => {
                    write!(f, "信标 {} 暂无定位: 仅 {} 个基站", beacon, known)
                }
                NoFixReason::DegenerateGeometry => write!(f, "信标 {} 暂无定位: 基站几何退化", beacon),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_620_000_000_000).unwrap()
    }

    #[test]
    fn test_serialize_tagged() {
        let fix = Fix {
            point: Point::new(1.5, 2.25),
            anchors: [1, 2, 3],
            residual: 0.1,
        };
        let json = serde_json::to_value(Outcome::accepted("aa:bb", &fix, ts())).unwrap();
        assert_eq!(json["type"], "accepted");
        assert_eq!(json["beacon"], "aa:bb");
        assert_eq!(json["x"], 1.5);

        let json = serde_json::to_value(Outcome::no_fix(
            "aa:bb",
            NoFixReason::InsufficientAnchors { known: 2 },
            ts(),
        ))
        .unwrap();
        assert_eq!(json["type"], "no_fix");
        assert_eq!(json["reason"], "insufficient_anchors");
        assert_eq!(json["known"], 2);
    }

    #[test]
    fn test_accessors() {
        let outcome = Outcome::no_fix("b1", NoFixReason::DegenerateGeometry, ts());
        assert_eq!(outcome.beacon(), "b1");
        assert_eq!(outcome.point(), None);
        assert!(!outcome.is_accepted());
        assert_eq!(outcome.timestamp(), ts());
    }
}
