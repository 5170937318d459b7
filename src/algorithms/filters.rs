//! RSSI 滤波链
//!
//! 每个 (信标, 基站) 对拥有一条滤波链：先滑动平均，再一维卡尔曼。
//! 被禁用的环节是恒等环节，输入原样输出。

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::{LocatorError, Result};

/// 滑动平均滤波器
#[derive(Clone, Debug)]
pub struct MovingAverageFilter {
    window: VecDeque<f64>,
    window_size: usize,
}

impl MovingAverageFilter {
    /// 创建窗口大小为 `window_size` 的滤波器
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(LocatorError::Config("滑动平均窗口必须大于 0".to_string()));
        }
        Ok(MovingAverageFilter {
            window: VecDeque::with_capacity(window_size + 1),
            window_size,
        })
    }

    /// 加入新样本，返回窗口内样本的算术平均
    pub fn update(&mut self, sample: f64) -> f64 {
        self.window.push_back(sample);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

/// 一维卡尔曼滤波器（稳态，无控制输入）
#[derive(Clone, Debug)]
pub struct KalmanFilter1D {
    /// 测量噪声协方差 R
    pub r: f64,
    /// 过程噪声协方差 Q
    pub q: f64,
    /// 估计协方差 P
    pub p: f64,
    /// 当前估计值 x
    pub value: f64,
}

impl KalmanFilter1D {
    /// 创建滤波器，初始 x = 0, P = 1
    pub fn new(r: f64, q: f64) -> Result<Self> {
        if !r.is_finite() || r <= 0.0 || !q.is_finite() || q <= 0.0 {
            return Err(LocatorError::Config(format!(
                "卡尔曼噪声参数必须为正数: R={}, Q={}",
                r, q
            )));
        }
        Ok(KalmanFilter1D {
            r,
            q,
            p: 1.0,
            value: 0.0,
        })
    }

    /// 更新滤波器
    pub fn update(&mut self, measurement: f64) -> f64 {
        // 预测
        let p_prior = self.p + self.q;

        // 卡尔曼增益
        let k = p_prior / (p_prior + self.r);

        // 更新
        self.value = self.value + k * (measurement - self.value);
        self.p = (1.0 - k) * p_prior;

        self.value
    }
}

/// 滤波链中的一个环节
#[derive(Clone, Debug)]
pub enum FilterStage {
    /// 被禁用的环节
    Identity,
    MovingAverage(MovingAverageFilter),
    Kalman(KalmanFilter1D),
}

impl FilterStage {
    pub fn update(&mut self, input: f64) -> f64 {
        match self {
            FilterStage::Identity => input,
            FilterStage::MovingAverage(filter) => filter.update(input),
            FilterStage::Kalman(filter) => filter.update(input),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::Identity => "identity",
            FilterStage::MovingAverage(_) => "moving_average",
            FilterStage::Kalman(_) => "kalman",
        }
    }
}

/// 一次滤波过程中各环节的中间值，用于诊断日志
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainTrace {
    pub raw: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moving_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kalman: Option<f64>,
    pub output: f64,
}

/// 有序滤波链
#[derive(Clone, Debug)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new(stages: Vec<FilterStage>) -> Self {
        FilterChain { stages }
    }

    /// 标准链：滑动平均 -> 卡尔曼，`None` 表示该环节禁用
    pub fn standard(moving_average: Option<usize>, kalman: Option<(f64, f64)>) -> Result<Self> {
        let ma_stage = match moving_average {
            Some(window) => FilterStage::MovingAverage(MovingAverageFilter::new(window)?),
            None => FilterStage::Identity,
        };
        let kalman_stage = match kalman {
            Some((r, q)) => FilterStage::Kalman(KalmanFilter1D::new(r, q)?),
            None => FilterStage::Identity,
        };
        Ok(FilterChain::new(vec![ma_stage, kalman_stage]))
    }

    /// 备用模式：仅对原始 RSSI 做窗口平均，不经过卡尔曼
    pub fn windowed_average(window: usize) -> Result<Self> {
        Ok(FilterChain::new(vec![FilterStage::MovingAverage(
            MovingAverageFilter::new(window)?,
        )]))
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// 按顺序通过所有环节
    pub fn apply(&mut self, sample: f64) -> f64 {
        self.apply_traced(sample).output
    }

    /// 按顺序通过所有环节并记录中间值
    pub fn apply_traced(&mut self, sample: f64) -> ChainTrace {
        let mut trace = ChainTrace {
            raw: sample,
            moving_average: None,
            kalman: None,
            output: sample,
        };
        let mut value = sample;
        for stage in &mut self.stages {
            value = stage.update(value);
            match stage {
                FilterStage::MovingAverage(_) => trace.moving_average = Some(value),
                FilterStage::Kalman(_) => trace.kalman = Some(value),
                FilterStage::Identity => {}
            }
        }
        trace.output = value;
        trace
    }

    /// 在副本上试算，只有结果为有限值时才提交状态
    ///
    /// 返回提交后的链状态副本和诊断信息，调用方负责写回。
    pub fn try_apply(&self, sample: f64) -> Result<(FilterChain, ChainTrace)> {
        let mut staged = self.clone();
        let trace = staged.apply_traced(sample);
        if !trace.output.is_finite() {
            return Err(LocatorError::NonFinite {
                stage: "filter_chain",
                value: trace.output,
            });
        }
        Ok((staged, trace))
    }
}
