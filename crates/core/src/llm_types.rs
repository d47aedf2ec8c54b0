//! LLM request types

use serde::{Deserialize, Serialize};

/// Sampling parameters for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_new_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_new_tokens: 128,
        }
    }
}

impl GenerationConfig {
    pub fn new(temperature: f32, max_new_tokens: u32) -> Self {
        Self {
            temperature: temperature.clamp(0.0, 2.0),
            max_new_tokens,
        }
    }
}
