//! 配置加载与校验
//!
//! 配置在启动时读取一次，任何不合法参数都在处理第一条观测之前报错。

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::algorithms::{Anchor, AnchorTopology, FilterChain, OutlierGuard, PathLossModel};
use crate::error::{LocatorError, Result};

/// 默认的 MQTT 主题格式，例如 `esp32_2/rssi`
pub const DEFAULT_TOPIC_PATTERN: &str = r"^esp32_(\d+)/rssi$";

/// 路径损耗参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLossConfig {
    /// 1 米处参考功率 (dBm)
    pub reference_power: f64,
    pub exponent: f64,
}

impl Default for PathLossConfig {
    fn default() -> Self {
        PathLossConfig {
            reference_power: -59.0,
            exponent: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovingAverageConfig {
    pub enabled: bool,
    pub window: usize,
}

impl Default for MovingAverageConfig {
    fn default() -> Self {
        MovingAverageConfig {
            enabled: true,
            window: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub enabled: bool,
    /// 测量噪声 R
    pub measurement_noise: f64,
    /// 过程噪声 Q
    pub process_noise: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        KalmanConfig {
            enabled: true,
            measurement_noise: 0.5,
            process_noise: 0.2,
        }
    }
}

/// 滤波链参数
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub moving_average: MovingAverageConfig,
    pub kalman: KalmanConfig,
}

/// 异常值剔除参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub history_len: usize,
    /// 拒绝阈值（米）
    pub threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        OutlierConfig {
            history_len: 5,
            threshold: 1.0,
        }
    }
}

/// RSSI 聚合方式
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// 滑动平均 + 卡尔曼（按开关）
    #[default]
    FilterChain,
    /// 仅对原始 RSSI 做窗口平均
    WindowedAverage { window: usize },
}

/// 完整配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub anchors: Vec<Anchor>,
    pub path_loss: PathLossConfig,
    pub filter: FilterConfig,
    pub outlier: OutlierConfig,
    /// 需要忽略的信标 ID（精确匹配，区分大小写）
    pub deny_list: Vec<String>,
    /// 注册表最多保留的信标数量，`None` 表示不限
    pub max_beacons: Option<usize>,
    pub distance_mode: DistanceMode,
    /// 从主题中提取基站 ID 的正则（需要一个捕获组）
    pub topic_pattern: Option<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig {
            anchors: vec![
                Anchor::new(1, 0.0, 0.0),
                Anchor::new(2, 10.0, 0.0),
                Anchor::new(3, 10.0, 5.0),
                Anchor::new(4, 0.0, 5.0),
            ],
            path_loss: PathLossConfig::default(),
            filter: FilterConfig::default(),
            outlier: OutlierConfig::default(),
            deny_list: Vec::new(),
            max_beacons: None,
            distance_mode: DistanceMode::default(),
            topic_pattern: Some(DEFAULT_TOPIC_PATTERN.to_string()),
        }
    }
}

impl LocatorConfig {
    /// 从 JSON 文本解析并校验
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: LocatorConfig = serde_json::from_str(text)
            .map_err(|e| LocatorError::Config(format!("配置解析失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// 校验所有参数
    pub fn validate(&self) -> Result<()> {
        let topology = self.topology()?;
        if topology.len() < 3 {
            return Err(LocatorError::Config(format!(
                "至少需要 3 个基站，当前 {} 个",
                topology.len()
            )));
        }
        self.path_loss_model()?;
        self.new_filter_chain()?;
        self.new_outlier_guard()?;
        if self.max_beacons == Some(0) {
            return Err(LocatorError::Config("max_beacons 必须大于 0".to_string()));
        }
        if self.deny_list.iter().any(|id| id.is_empty()) {
            return Err(LocatorError::Config("deny_list 中存在空 ID".to_string()));
        }
        self.topic_regex()?;
        Ok(())
    }

    pub fn topology(&self) -> Result<AnchorTopology> {
        AnchorTopology::from_anchors(self.anchors.iter().copied())
    }

    pub fn path_loss_model(&self) -> Result<PathLossModel> {
        PathLossModel::new(self.path_loss.reference_power, self.path_loss.exponent)
    }

    /// 按配置创建一条新的滤波链
    pub fn new_filter_chain(&self) -> Result<FilterChain> {
        match &self.distance_mode {
            DistanceMode::FilterChain => {
                let ma = &self.filter.moving_average;
                let kf = &self.filter.kalman;
                FilterChain::standard(
                    ma.enabled.then_some(ma.window),
                    kf.enabled.then_some((kf.measurement_noise, kf.process_noise)),
                )
            }
            DistanceMode::WindowedAverage { window } => FilterChain::windowed_average(*window),
        }
    }

    pub fn new_outlier_guard(&self) -> Result<OutlierGuard> {
        OutlierGuard::new(self.outlier.history_len, self.outlier.threshold)
    }

    /// 编译主题正则，要求至少一个捕获组
    pub fn topic_regex(&self) -> Result<Option<Regex>> {
        let Some(pattern) = &self.topic_pattern else {
            return Ok(None);
        };
        let regex = Regex::new(pattern)?;
        if regex.captures_len() < 2 {
            return Err(LocatorError::Config(format!(
                "主题正则缺少捕获组: {}",
                pattern
            )));
        }
        Ok(Some(regex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LocatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.topology().unwrap().len(), 4);
    }

    #[test]
    fn test_shipped_config_file() {
        let config = LocatorConfig::from_json_str(include_str!("../config/default.json")).unwrap();
        assert_eq!(config.max_beacons, Some(1024));
        assert_eq!(config.distance_mode, DistanceMode::FilterChain);
        assert_eq!(config.anchors, LocatorConfig::default().anchors);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LocatorConfig::from_json_str(
            r#"{ "outlier": { "threshold": 2.5 }, "deny_list": ["5b:76:29:38:17:6f"] }"#,
        )
        .unwrap();
        assert_eq!(config.outlier.threshold, 2.5);
        assert_eq!(config.outlier.history_len, 5);
        assert_eq!(config.filter.moving_average.window, 5);
        assert_eq!(config.deny_list.len(), 1);
    }

    #[test]
    fn test_windowed_average_mode_parses() {
        let config = LocatorConfig::from_json_str(
            r#"{ "distance_mode": { "windowed_average": { "window": 7 } } }"#,
        )
        .unwrap();
        assert_eq!(config.distance_mode, DistanceMode::WindowedAverage { window: 7 });
        assert_eq!(config.new_filter_chain().unwrap().stages().len(), 1);
    }

    #[test]
    fn test_configuration_faults() {
        let cases = [
            r#"{ "path_loss": { "exponent": 0.0 } }"#,
            r#"{ "path_loss": { "exponent": -1.5 } }"#,
            r#"{ "filter": { "moving_average": { "window": 0 } } }"#,
            r#"{ "filter": { "kalman": { "measurement_noise": 0.0 } } }"#,
            r#"{ "outlier": { "history_len": 0 } }"#,
            r#"{ "outlier": { "threshold": -1.0 } }"#,
            r#"{ "anchors": [ {"id": 1, "x": 0, "y": 0}, {"id": 2, "x": 1, "y": 0} ] }"#,
            r#"{ "anchors": [ {"id": 1, "x": 0, "y": 0}, {"id": 1, "x": 1, "y": 0}, {"id": 3, "x": 0, "y": 1} ] }"#,
            r#"{ "max_beacons": 0 }"#,
            r#"{ "topic_pattern": "^esp32_\\d+/rssi$" }"#,
            r#"{ "topic_pattern": "(" }"#,
            r#"{ "distance_mode": { "windowed_average": { "window": 0 } } }"#,
        ];
        for case in cases {
            assert!(LocatorConfig::from_json_str(case).is_err(), "应当拒绝: {}", case);
        }
    }

    #[test]
    fn test_disabled_kalman_ignores_its_parameters() {
        let config = LocatorConfig::from_json_str(
            r#"{ "filter": { "kalman": { "enabled": false, "process_noise": 0.0 } } }"#,
        )
        .unwrap();
        assert!(!config.filter.kalman.enabled);
    }
}
