//! 实时定位流水线
//!
//! 观测 -> 滤波链 -> 距离模型 -> 信标距离表 -> (>= 3 个基站) 三边定位 -> 异常值剔除 -> 事件
//!
//! 观测严格按到达顺序逐条处理。单条观测出错只丢弃该条，不影响其他信标的状态。

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::algorithms::{
    AnchorTopology, FilterChain, GuardDecision, NoFixReason, OutlierGuard, Outcome, PathLossModel,
    Trilateration,
};
use crate::config::LocatorConfig;
use crate::error::{LocatorError, Result};
use crate::ingress::Observation;
use crate::registry::BeaconRegistry;

/// 流水线计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    /// 在忽略列表中的观测
    pub ignored: u64,
    /// 因数据无效或数值错误被丢弃的观测
    pub dropped: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub no_fix: u64,
}

/// 定位引擎
#[derive(Debug)]
pub struct PositioningEngine {
    config: LocatorConfig,
    topology: AnchorTopology,
    model: PathLossModel,
    solver: Trilateration,
    registry: BeaconRegistry,
    chain_template: FilterChain,
    guard_template: OutlierGuard,
    stats: PipelineStats,
}

impl PositioningEngine {
    /// 按配置创建引擎，配置无效时直接报错
    pub fn new(config: LocatorConfig) -> Result<Self> {
        config.validate()?;
        let topology = config.topology()?;
        let model = config.path_loss_model()?;
        let chain_template = config.new_filter_chain()?;
        let guard_template = config.new_outlier_guard()?;
        let registry = BeaconRegistry::new(config.deny_list.iter().cloned(), config.max_beacons);

        info!(
            "定位引擎初始化: {} 个基站, {}, 模式 {:?}",
            topology.len(),
            model,
            config.distance_mode
        );

        Ok(PositioningEngine {
            config,
            topology,
            model,
            solver: Trilateration::default(),
            registry,
            chain_template,
            guard_template,
            stats: PipelineStats::default(),
        })
    }

    /// 处理一条观测
    ///
    /// - `Ok(Some(_))`: 产生一个事件
    /// - `Ok(None)`: 信标在忽略列表中
    /// - `Err(_)`: 观测被丢弃，状态未改变
    pub fn process(&mut self, observation: &Observation) -> Result<Option<Outcome>> {
        let beacon_id = observation.beacon_id.as_str();
        if self.registry.is_denied(beacon_id) {
            debug!("忽略信标: {}", beacon_id);
            return Ok(None);
        }

        let timestamp = observation.validate()?;
        if !self.topology.contains(observation.anchor_id) {
            return Err(LocatorError::MalformedObservation(format!(
                "未知基站: {}",
                observation.anchor_id
            )));
        }

        // 在副本上试算，数值异常时不写回任何状态
        let chain = self
            .registry
            .chain(beacon_id, observation.anchor_id)
            .unwrap_or(&self.chain_template);
        let (staged, trace) = chain.try_apply(observation.rssi)?;
        let distance = self.model.distance(trace.output);
        if !distance.is_finite() {
            return Err(LocatorError::NonFinite {
                stage: "distance_model",
                value: distance,
            });
        }

        debug!(
            "{}",
            json!({
                "beacon": beacon_id,
                "anchor": observation.anchor_id,
                "timestamp": observation.timestamp_ms,
                "rawRssi": trace.raw,
                "movingAverageRssi": trace.moving_average,
                "kalmanFilteredRssi": trace.kalman,
                "computedDistance": distance,
            })
        );

        let guard_template = &self.guard_template;
        let state = self.registry.commit(
            beacon_id,
            observation.anchor_id,
            staged,
            distance,
            || guard_template.clone(),
        );

        let known = state.anchor_count();
        if known < 3 {
            return Ok(Some(Outcome::no_fix(
                beacon_id,
                NoFixReason::InsufficientAnchors { known },
                timestamp,
            )));
        }

        let Some(fix) = self.solver.solve(&self.topology, &state.distances) else {
            return Ok(Some(Outcome::no_fix(
                beacon_id,
                NoFixReason::DegenerateGeometry,
                timestamp,
            )));
        };

        let outcome = match state.guard.check_and_update(fix.point) {
            GuardDecision::Rejected { deviation } => {
                Outcome::rejected(beacon_id, &fix, deviation, timestamp)
            }
            GuardDecision::WarmUp | GuardDecision::Accepted { .. } => {
                Outcome::accepted(beacon_id, &fix, timestamp)
            }
        };
        Ok(Some(outcome))
    }

    /// 处理一条观测并记录日志和计数，错误不会向上传播
    pub fn handle(&mut self, observation: &Observation) -> Option<Outcome> {
        self.stats.processed += 1;
        match self.process(observation) {
            Ok(Some(outcome)) => {
                match &outcome {
                    Outcome::Accepted { .. } => {
                        self.stats.accepted += 1;
                        info!("{}", outcome);
                    }
                    Outcome::Rejected { .. } => {
                        self.stats.rejected += 1;
                        warn!("{}", outcome);
                    }
                    Outcome::NoFix { .. } => {
                        self.stats.no_fix += 1;
                        debug!("{}", outcome);
                    }
                }
                Some(outcome)
            }
            Ok(None) => {
                self.stats.ignored += 1;
                None
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!(
                    "丢弃观测 (信标 {}, 基站 {}): {}",
                    observation.beacon_id, observation.anchor_id, e
                );
                None
            }
        }
    }

    /// 按顺序回放一批观测
    pub fn replay<'a>(&mut self, observations: impl IntoIterator<Item = &'a Observation>) -> Vec<Outcome> {
        observations
            .into_iter()
            .filter_map(|observation| self.handle(observation))
            .collect()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn registry(&self) -> &BeaconRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &AnchorTopology {
        &self.topology
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }
}

/// 定位任务：从通道逐条读取观测，事件写入输出通道
///
/// 输入通道关闭后返回引擎（含统计信息）；输出通道关闭时提前结束。
pub async fn run_positioning_task(
    mut engine: PositioningEngine,
    mut observations: mpsc::Receiver<Observation>,
    outcomes: mpsc::Sender<Outcome>,
) -> PositioningEngine {
    info!("定位任务启动");

    while let Some(observation) = observations.recv().await {
        if let Some(outcome) = engine.handle(&observation) {
            if outcomes.send(outcome).await.is_err() {
                warn!("输出通道已关闭，定位任务退出");
                break;
            }
        }
    }

    info!("定位任务结束: {:?}", engine.stats());
    engine
}
