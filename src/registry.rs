//! 信标状态注册表
//!
//! 滤波链按 (信标, 基站) 组合键存放在一张表里；每个信标另有距离表和位置守卫。
//! 状态在首次观测时惰性创建。可选容量上限：超出时淘汰最久未更新的信标。

use std::collections::{BTreeMap, HashMap, HashSet};

use log::info;

use crate::algorithms::{AnchorId, FilterChain, OutlierGuard};

/// 单个信标的状态
#[derive(Clone, Debug)]
pub struct BeaconState {
    /// 基站 ID -> 最新距离（米），按 ID 升序
    pub distances: BTreeMap<AnchorId, f64>,
    pub guard: OutlierGuard,
    last_touch: u64,
}

impl BeaconState {
    pub fn new(guard: OutlierGuard) -> Self {
        BeaconState {
            distances: BTreeMap::new(),
            guard,
            last_touch: 0,
        }
    }

    pub fn anchor_count(&self) -> usize {
        self.distances.len()
    }
}

/// 信标状态注册表
#[derive(Debug)]
pub struct BeaconRegistry {
    chains: HashMap<(String, AnchorId), FilterChain>,
    beacons: HashMap<String, BeaconState>,
    deny_list: HashSet<String>,
    max_beacons: Option<usize>,
    sequence: u64,
    evicted: u64,
}

impl BeaconRegistry {
    pub fn new(deny_list: impl IntoIterator<Item = String>, max_beacons: Option<usize>) -> Self {
        BeaconRegistry {
            chains: HashMap::new(),
            beacons: HashMap::new(),
            deny_list: deny_list.into_iter().collect(),
            max_beacons,
            sequence: 0,
            evicted: 0,
        }
    }

    /// 信标是否在忽略列表中（精确匹配，区分大小写）
    pub fn is_denied(&self, beacon_id: &str) -> bool {
        self.deny_list.contains(beacon_id)
    }

    pub fn chain(&self, beacon_id: &str, anchor_id: AnchorId) -> Option<&FilterChain> {
        self.chains.get(&(beacon_id.to_string(), anchor_id))
    }

    pub fn beacon(&self, beacon_id: &str) -> Option<&BeaconState> {
        self.beacons.get(beacon_id)
    }

    /// 提交一次成功的观测：写回滤波链、更新距离，返回信标状态
    ///
    /// 信标不存在时用 `new_guard` 创建（插入前按需淘汰）。
    pub fn commit(
        &mut self,
        beacon_id: &str,
        anchor_id: AnchorId,
        chain: FilterChain,
        distance: f64,
        new_guard: impl FnOnce() -> OutlierGuard,
    ) -> &mut BeaconState {
        self.sequence += 1;
        if !self.beacons.contains_key(beacon_id) {
            self.make_room();
            info!("注册新信标: {}", beacon_id);
        }
        self.chains.insert((beacon_id.to_string(), anchor_id), chain);

        let sequence = self.sequence;
        let state = self
            .beacons
            .entry(beacon_id.to_string())
            .or_insert_with(|| BeaconState::new(new_guard()));
        state.last_touch = sequence;
        state.distances.insert(anchor_id, distance);
        state
    }

    /// 移除信标及其所有滤波链
    pub fn remove(&mut self, beacon_id: &str) -> Option<BeaconState> {
        self.chains.retain(|(id, _), _| id != beacon_id);
        self.beacons.remove(beacon_id)
    }

    fn make_room(&mut self) {
        let Some(max) = self.max_beacons else {
            return;
        };
        while self.beacons.len() >= max {
            let oldest = self
                .beacons
                .iter()
                .min_by_key(|(_, state)| state.last_touch)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    info!("注册表已满，淘汰信标: {}", id);
                    self.remove(&id);
                    self.evicted += 1;
                }
                None => break,
            }
        }
    }

    /// 已注册的信标数量
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// 已注册的信标 ID（升序）
    pub fn beacon_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.beacons.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
