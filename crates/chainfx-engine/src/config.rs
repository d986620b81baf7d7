use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::order::{ChainOrder, EffectKind, DEFAULT_QUEUE_CAPACITY};
use crate::processor::DEFAULT_MAX_SUB_BLOCK;
use crate::smoothing::DEFAULT_RAMP_MS;

/// Device selection plus chain setup. Every field has a default, so a JSON
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub input_name: Option<String>,       // match by substring (case-insensitive)
    pub output_name: Option<String>,
    pub input_index: Option<usize>,       // explicit index from device list
    pub output_index: Option<usize>,
    pub sample_rate: Option<u32>,         // e.g., 48000
    pub block_size: Option<u32>,          // frames per buffer (if backend supports)
    pub max_sub_block: usize,
    pub smoothing_ms: f64,
    pub order_queue_capacity: usize,
    pub order: ChainOrder,
    pub bypass: Vec<EffectKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_name: None,
            output_name: None,
            input_index: None,
            output_index: None,
            sample_rate: None,
            block_size: None,
            max_sub_block: DEFAULT_MAX_SUB_BLOCK,
            smoothing_ms: DEFAULT_RAMP_MS,
            order_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            order: ChainOrder::default(),
            bypass: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_sub_block == 0 {
            return Err(EngineError::InvalidConfig("max_sub_block must be at least 1".into()));
        }
        if !(self.smoothing_ms.is_finite() && self.smoothing_ms >= 0.0) {
            return Err(EngineError::InvalidConfig(format!("smoothing_ms must be >= 0, got {}", self.smoothing_ms)));
        }
        if self.order_queue_capacity == 0 {
            return Err(EngineError::InvalidConfig("order_queue_capacity must be at least 1".into()));
        }
        self.order.validate()?;
        Ok(())
    }
}
