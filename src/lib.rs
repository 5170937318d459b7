//! 基于 RSSI 的信标二维定位
//!
//! 固定基站上报信标的 RSSI，经滤波、路径损耗模型、三边定位和异常值剔除后输出位置事件。

pub mod algorithms;
pub mod config;
pub mod error;
pub mod ingress;
pub mod positioning;
pub mod registry;

pub use algorithms::{
    Anchor, AnchorId, AnchorTopology, FilterChain, NoFixReason, OutlierGuard, Outcome, PathLossModel,
    Point, Trilateration,
};
pub use config::LocatorConfig;
pub use error::{LocatorError, Result};
pub use ingress::{Observation, ObservationDecoder};
pub use positioning::{run_positioning_task, PipelineStats, PositioningEngine};
pub use registry::BeaconRegistry;
