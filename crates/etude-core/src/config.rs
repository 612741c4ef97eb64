use crate::capture::CaptureConfig;
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Engine tuning. Every field is optional in the JSON form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub debounce_window_ms: f64,
    pub lookahead_s: f64,
    pub lead_in_s: f64,
    pub tick_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub tempo_bpm: u32,
    pub quantize_subdivision: u32,
    pub ppq: u16,
    pub hit_window_ms: f64,
    pub default_velocity: u8,
    pub default_duration_s: f64,
    pub ring_capacity: usize,
    pub sample_rate_hz: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 5.0,
            lookahead_s: 0.6,
            lead_in_s: 0.05,
            tick_interval_ms: 60,
            frame_interval_ms: 16,
            tempo_bpm: 120,
            quantize_subdivision: 16,
            ppq: 480,
            hit_window_ms: 150.0,
            default_velocity: 90,
            default_duration_s: 0.6,
            ring_capacity: 2048,
            sample_rate_hz: 48_000,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            lookahead_s: self.lookahead_s,
            lead_in_s: self.lead_in_s,
            default_velocity: self.default_velocity,
            default_duration_s: self.default_duration_s,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            debounce_window_ms: self.debounce_window_ms,
            tempo_bpm: self.tempo_bpm,
            quantize_subdivision: self.quantize_subdivision,
        }
    }
}
