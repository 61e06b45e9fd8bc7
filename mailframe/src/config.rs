//! Pipeline tuning knobs.
//!
//! Every threshold the normalization passes rely on lives here. The defaults
//! match what the shipped page uses; hosts can override any subset from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Id of the element that wraps the injected email markup.
pub const DEFAULT_CONTAINER_ID: &str = "mailframe-container";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between the last state change and the pipeline run.
    pub content_debounce_ms: u64,
    /// Delay between the last height trigger and the height report.
    pub height_debounce_ms: u64,
    /// Overflow allowed after font re-inflation before table text is shrunk.
    pub overflow_tolerance_px: f32,
    /// URL-like link text longer than this gets break opportunities.
    pub long_url_min_chars: usize,
    /// Longest run of URL characters left without a break opportunity.
    pub long_url_chunk_chars: usize,
    /// Images no larger than this in both dimensions count as tracking pixels.
    pub tracking_pixel_max_px: f32,
    /// Horizontal padding of the container in preview mode (text-only mail).
    pub preview_padding: String,
    pub container_id: String,
    /// Base URL relative links are resolved against.
    pub base_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            content_debounce_ms: 300,
            height_debounce_ms: 300,
            overflow_tolerance_px: 20.0,
            long_url_min_chars: 40,
            long_url_chunk_chars: 20,
            tracking_pixel_max_px: 1.0,
            preview_padding: "2ex".to_string(),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            base_url: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a (possibly partial) JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    pub fn height_debounce(&self) -> Duration {
        Duration::from_millis(self.height_debounce_ms)
    }
}
