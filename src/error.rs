//! 错误类型定义
//!
//! 配置错误在启动时一次性暴露；观测错误只影响当前这一条观测。

use thiserror::Error;

/// 定位流水线的错误类型
#[derive(Debug, Error)]
pub enum LocatorError {
    /// 配置错误（启动时致命）
    #[error("配置错误: {0}")]
    Config(String),

    /// 观测数据格式错误，丢弃该条观测
    #[error("观测数据无效: {0}")]
    MalformedObservation(String),

    /// 滤波器或距离模型产生了非有限值
    #[error("{stage} 产生非有限值: {value}")]
    NonFinite { stage: &'static str, value: f64 },

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("正则表达式错误: {0}")]
    Pattern(#[from] regex::Error),
}

impl LocatorError {
    /// 是否为单条观测级别的错误（可丢弃后继续）
    pub fn is_observation_local(&self) -> bool {
        matches!(
            self,
            LocatorError::MalformedObservation(_) | LocatorError::NonFinite { .. } | LocatorError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LocatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_local_classification() {
        assert!(LocatorError::MalformedObservation("x".into()).is_observation_local());
        assert!(LocatorError::NonFinite { stage: "kalman", value: f64::NAN }.is_observation_local());
        assert!(!LocatorError::Config("x".into()).is_observation_local());
    }
}
