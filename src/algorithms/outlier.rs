//! 位置异常值剔除
//!
//! 历史未满时无条件接受；历史满后，候选点到历史平均点的距离超过阈值即拒绝，
//! 拒绝时历史保持不变。

use std::collections::VecDeque;

use crate::algorithms::trilateration::Point;
use crate::error::{LocatorError, Result};

/// 异常值判定结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuardDecision {
    /// 预热阶段，未做判定
    WarmUp,
    /// 与历史平均点距离在阈值以内
    Accepted { deviation: f64 },
    /// 与历史平均点距离超过阈值
    Rejected { deviation: f64 },
}

impl GuardDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, GuardDecision::Rejected { .. })
    }
}

/// 单个信标的位置历史守卫
#[derive(Clone, Debug)]
pub struct OutlierGuard {
    history: VecDeque<Point>,
    capacity: usize,
    threshold: f64,
}

impl OutlierGuard {
    pub fn new(capacity: usize, threshold: f64) -> Result<Self> {
        if capacity == 0 {
            return Err(LocatorError::Config("位置历史长度必须大于 0".to_string()));
        }
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(LocatorError::Config(format!(
                "异常值阈值必须为正数: {}",
                threshold
            )));
        }
        Ok(OutlierGuard {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            threshold,
        })
    }

    /// 判定候选点，接受时写入历史
    pub fn check_and_update(&mut self, candidate: Point) -> GuardDecision {
        let decision = if self.history.len() >= self.capacity {
            let deviation = self
                .centroid()
                .map(|mean| candidate.distance_to(&mean))
                .unwrap_or(0.0);
            if deviation > self.threshold {
                return GuardDecision::Rejected { deviation };
            }
            self.history.pop_front();
            GuardDecision::Accepted { deviation }
        } else {
            GuardDecision::WarmUp
        };

        self.history.push_back(candidate);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        decision
    }

    /// 当前历史的平均点
    pub fn centroid(&self) -> Option<Point> {
        Point::centroid(self.history.iter())
    }

    pub fn history(&self) -> impl Iterator<Item = &Point> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_warm(&self) -> bool {
        self.history.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_up_accepts_anything() {
        let mut guard = OutlierGuard::new(3, 1.0).unwrap();
        assert_eq!(guard.check_and_update(Point::new(0.0, 0.0)), GuardDecision::WarmUp);
        assert_eq!(guard.check_and_update(Point::new(100.0, 0.0)), GuardDecision::WarmUp);
        assert_eq!(guard.check_and_update(Point::new(-50.0, 9.0)), GuardDecision::WarmUp);
        assert!(guard.is_warm());
    }

    #[test]
    fn test_rejection_leaves_history_unchanged() {
        let mut guard = OutlierGuard::new(3, 1.0).unwrap();
        for p in [Point::new(1.0, 1.0), Point::new(1.2, 1.0), Point::new(1.1, 1.3)] {
            guard.check_and_update(p);
        }
        let before: Vec<_> = guard.history().copied().collect();
        let decision = guard.check_and_update(Point::new(5.0, 5.0));
        assert!(!decision.is_accepted());
        let after: Vec<_> = guard.history().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_accepted_point_evicts_oldest() {
        let mut guard = OutlierGuard::new(3, 1.0).unwrap();
        for p in [Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(0.0, 0.5)] {
            guard.check_and_update(p);
        }
        let decision = guard.check_and_update(Point::new(0.3, 0.3));
        assert!(matches!(decision, GuardDecision::Accepted { .. }));
        let history: Vec<_> = guard.history().copied().collect();
        assert_eq!(
            history,
            vec![Point::new(0.5, 0.0), Point::new(0.0, 0.5), Point::new(0.3, 0.3)]
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut guard = OutlierGuard::new(1, 1.0).unwrap();
        guard.check_and_update(Point::new(0.0, 0.0));
        assert!(guard.check_and_update(Point::new(1.0, 0.0)).is_accepted());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(OutlierGuard::new(0, 1.0).is_err());
        assert!(OutlierGuard::new(3, 0.0).is_err());
        assert!(OutlierGuard::new(3, f64::NAN).is_err());
    }
}
