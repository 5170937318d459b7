//! RSSI 到距离转换模型
//!
//! 对数距离路径损耗模型: d = 10 ^ ((P0 - RSSI) / (10 * n))，单位为米

use std::fmt;

use crate::error::{LocatorError, Result};

/// 对数距离路径损耗模型
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathLossModel {
    /// 1 米处的参考功率 (dBm)
    pub reference_power: f64,
    /// 路径损耗指数 n（自由空间通常为 2）
    pub exponent: f64,
}

impl PathLossModel {
    /// 创建模型，参数不合法时返回配置错误
    pub fn new(reference_power: f64, exponent: f64) -> Result<Self> {
        if !reference_power.is_finite() {
            return Err(LocatorError::Config(format!(
                "参考功率必须为有限值: {}",
                reference_power
            )));
        }
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(LocatorError::Config(format!(
                "路径损耗指数必须为正数: {}",
                exponent
            )));
        }
        Ok(PathLossModel {
            reference_power,
            exponent,
        })
    }

    /// 根据（滤波后的）RSSI 计算距离（米）
    pub fn distance(&self, rssi: f64) -> f64 {
        rssi_to_distance(rssi, self.reference_power, self.exponent)
    }

    /// 根据距离反算 RSSI
    pub fn distance_to_rssi(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        self.reference_power - 10.0 * self.exponent * distance.log10()
    }

    /// 获取模型描述
    pub fn description(&self) -> String {
        format!(
            "对数距离模型 - P0={:.2} dBm, n={:.2}",
            self.reference_power, self.exponent
        )
    }
}

impl Default for PathLossModel {
    fn default() -> Self {
        PathLossModel {
            reference_power: -59.0,
            exponent: 2.0,
        }
    }
}

impl fmt::Display for PathLossModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// 无状态的 RSSI 转距离函数
///
/// 调用方需保证 `path_loss_exponent > 0`，否则结果可能为非有限值。
pub fn rssi_to_distance(rssi: f64, reference_power: f64, path_loss_exponent: f64) -> f64 {
    let exponent = (reference_power - rssi) / (10.0 * path_loss_exponent);
    10_f64.powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reference_power_is_one_meter() {
        let model = PathLossModel::new(-59.0, 2.0).unwrap();
        assert_eq!(model.distance(-59.0), 1.0);
    }

    #[test]
    fn test_ten_n_decibels_is_ten_meters() {
        for n in [1.5, 2.0, 2.7, 4.0] {
            let d = rssi_to_distance(-59.0 - 10.0 * n, -59.0, n);
            assert_abs_diff_eq!(d, 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_distance_decreases_with_rssi() {
        let model = PathLossModel::default();
        let mut last = f64::INFINITY;
        for rssi in (-100..=-30).map(f64::from) {
            let d = model.distance(rssi);
            assert!(d < last);
            last = d;
        }
    }

    #[test]
    fn test_distance_to_rssi_inverse() {
        let model = PathLossModel::new(-62.0, 2.4).unwrap();
        let rssi = model.distance_to_rssi(3.5);
        assert_abs_diff_eq!(model.distance(rssi), 3.5, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_exponent_rejected() {
        assert!(PathLossModel::new(-59.0, 0.0).is_err());
        assert!(PathLossModel::new(-59.0, -2.0).is_err());
        assert!(PathLossModel::new(-59.0, f64::NAN).is_err());
        assert!(PathLossModel::new(f64::INFINITY, 2.0).is_err());
    }
}
