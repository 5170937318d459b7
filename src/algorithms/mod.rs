//! 定位算法模块
//!
//! 流水线的叶子组件：
//! - RSSI 转距离模型
//! - 滤波链（滑动平均、一维卡尔曼）
//! - 二维三边定位
//! - 位置异常值剔除

pub mod anchor;
pub mod filters;
pub mod outlier;
pub mod results;
pub mod rssi_model;
pub mod trilateration;

pub use anchor::*;
pub use filters::*;
pub use outlier::*;
pub use results::*;
pub use rssi_model::*;
pub use trilateration::*;
