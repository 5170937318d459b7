//! 观测数据定义与消息解码
//!
//! 上游消息格式（JSON）:
//! `{ "mac": "AA:BB:CC:DD:EE:FF", "rssi": -65, "timestamp": 1620000000000, "major": 0, "minor": 0, "esp": 2 }`
//!
//! 当消息缺少 `esp` 字段时，从主题（如 `esp32_2/rssi`）中提取基站 ID。

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::algorithms::AnchorId;
use crate::error::{LocatorError, Result};

/// 单条 RSSI 观测
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 信标标识（不透明字符串，区分大小写）
    pub beacon_id: String,
    pub anchor_id: AnchorId,
    /// RSSI (dBm)
    pub rssi: f64,
    /// 时间戳（毫秒，Unix 纪元）
    pub timestamp_ms: i64,
}

impl Observation {
    pub fn new(beacon_id: impl Into<String>, anchor_id: AnchorId, rssi: f64, timestamp_ms: i64) -> Self {
        Observation {
            beacon_id: beacon_id.into(),
            anchor_id,
            rssi,
            timestamp_ms,
        }
    }

    /// 时间戳转为 UTC 时间
    pub fn observed_at(&self) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms).ok_or_else(|| {
            LocatorError::MalformedObservation(format!("时间戳超出范围: {}", self.timestamp_ms))
        })
    }

    /// 字段级校验（不涉及拓扑）
    pub fn validate(&self) -> Result<DateTime<Utc>> {
        if self.beacon_id.is_empty() {
            return Err(LocatorError::MalformedObservation("信标 ID 为空".to_string()));
        }
        if !self.rssi.is_finite() {
            return Err(LocatorError::MalformedObservation(format!(
                "RSSI 无效: {}",
                self.rssi
            )));
        }
        self.observed_at()
    }
}

/// 上游原始消息
#[derive(Clone, Debug, Deserialize)]
pub struct ObservationMessage {
    pub mac: String,
    pub rssi: f64,
    pub timestamp: i64,
    /// 上报基站编号
    #[serde(default)]
    pub esp: Option<AnchorId>,
}

/// 带主题的消息封装，用于按行回放
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum MessageLine {
    Envelope {
        topic: String,
        payload: ObservationMessage,
    },
    Bare(ObservationMessage),
}

/// 消息解码器
#[derive(Clone, Debug, Default)]
pub struct ObservationDecoder {
    topic_pattern: Option<Regex>,
}

impl ObservationDecoder {
    pub fn new(topic_pattern: Option<Regex>) -> Self {
        ObservationDecoder { topic_pattern }
    }

    /// 从主题中提取基站 ID
    pub fn anchor_from_topic(&self, topic: &str) -> Option<AnchorId> {
        let captures = self.topic_pattern.as_ref()?.captures(topic)?;
        captures.get(1)?.as_str().parse().ok()
    }

    /// 解码单条消息
    pub fn decode(&self, topic: Option<&str>, payload: &str) -> Result<Observation> {
        let message: ObservationMessage = serde_json::from_str(payload)
            .map_err(|e| LocatorError::MalformedObservation(format!("消息解析失败: {}", e)))?;
        self.build_observation(topic, message)
    }

    /// 解码一行回放数据：`{"topic": ..., "payload": {...}}` 或直接是消息体
    pub fn decode_line(&self, line: &str) -> Result<Observation> {
        let parsed: MessageLine = serde_json::from_str(line)
            .map_err(|e| LocatorError::MalformedObservation(format!("消息解析失败: {}", e)))?;
        match parsed {
            MessageLine::Envelope { topic, payload } => self.build_observation(Some(&topic), payload),
            MessageLine::Bare(message) => self.build_observation(None, message),
        }
    }

    fn build_observation(&self, topic: Option<&str>, message: ObservationMessage) -> Result<Observation> {
        let anchor_id = match message.esp {
            Some(id) => id,
            None => topic
                .and_then(|t| self.anchor_from_topic(t))
                .ok_or_else(|| {
                    LocatorError::MalformedObservation(format!(
                        "无法确定基站 ID (topic: {:?})",
                        topic
                    ))
                })?,
        };
        let observation = Observation::new(message.mac, anchor_id, message.rssi, message.timestamp);
        observation.validate()?;
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOPIC_PATTERN;

    fn decoder() -> ObservationDecoder {
        ObservationDecoder::new(Some(Regex::new(DEFAULT_TOPIC_PATTERN).unwrap()))
    }

    #[test]
    fn test_decode_reference_message() {
        let obs = decoder()
            .decode(
                None,
                r#"{"mac":"aa:bb:cc:dd:ee:ff","rssi":-65,"timestamp":1620000000000,"major":0,"minor":0,"esp":2}"#,
            )
            .unwrap();
        assert_eq!(obs, Observation::new("aa:bb:cc:dd:ee:ff", 2, -65.0, 1_620_000_000_000));
    }

    #[test]
    fn test_anchor_from_topic() {
        let d = decoder();
        assert_eq!(d.anchor_from_topic("esp32_3/rssi"), Some(3));
        assert_eq!(d.anchor_from_topic("esp32_x/rssi"), None);
        let obs = d
            .decode_line(r#"{"topic":"esp32_4/rssi","payload":{"mac":"b1","rssi":-70.5,"timestamp":5}}"#)
            .unwrap();
        assert_eq!(obs.anchor_id, 4);
        assert_eq!(obs.rssi, -70.5);
    }

    #[test]
    fn test_payload_anchor_wins_over_topic() {
        let obs = decoder()
            .decode(Some("esp32_4/rssi"), r#"{"mac":"b1","rssi":-70,"timestamp":5,"esp":1}"#)
            .unwrap();
        assert_eq!(obs.anchor_id, 1);
    }

    #[test]
    fn test_malformed_messages() {
        let d = decoder();
        for line in [
            "not json",
            r#"{"rssi":-70,"timestamp":5,"esp":1}"#,
            r#"{"mac":"b1","rssi":"strong","timestamp":5,"esp":1}"#,
            r#"{"mac":"b1","rssi":-70,"timestamp":5}"#,
            r#"{"mac":"","rssi":-70,"timestamp":5,"esp":1}"#,
            r#"{"mac":"b1","rssi":-70,"timestamp":9223372036854775807,"esp":1}"#,
        ] {
            let err = d.decode_line(line).unwrap_err();
            assert!(err.is_observation_local(), "{}", line);
        }
    }
}
