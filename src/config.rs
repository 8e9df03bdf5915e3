//! Build and traversal settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Error, Result};

/// Largest supported wide-node arity.
pub const MAX_ARITY: usize = 8;

/// Largest supported ray packet (lanes share one `u64` active mask).
pub const MAX_PACKET_SIZE: usize = 64;

/// Rule for picking which frontier member to expand during collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseHeuristic {
    /// First internal node in frontier order.
    #[default]
    FirstFound,
    /// Internal node with the largest bounding-box surface area (ties: first).
    LargestArea,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhConfig {
    /// Wide-node arity K.
    pub arity: usize,
    /// Absolute expansion applied to leaf bounds before half packing.
    pub bound_epsilon: f32,
    /// Traversal stack capacity; deeper pushes are dropped.
    pub max_stack_depth: usize,
    /// Rays per packet.
    pub packet_size: usize,
    pub collapse_heuristic: CollapseHeuristic,
    /// Grow buffers on rebuild instead of failing with `CapacityExceeded`.
    pub auto_grow: bool,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            arity: 4,
            bound_epsilon: 5e-4,
            max_stack_depth: 64,
            packet_size: 4,
            collapse_heuristic: CollapseHeuristic::FirstFound,
            auto_grow: true,
        }
    }
}

impl BvhConfig {
    /// Check every field is in range.
    pub fn validate(&self) -> Result<()> {
        if !(2..=MAX_ARITY).contains(&self.arity) {
            return Err(Error::config(format!(
                "arity {} outside 2..={}",
                self.arity, MAX_ARITY
            )));
        }
        if !self.bound_epsilon.is_finite() || self.bound_epsilon < 0.0 {
            return Err(Error::config(format!(
                "bound_epsilon {} must be finite and non-negative",
                self.bound_epsilon
            )));
        }
        if self.max_stack_depth == 0 {
            return Err(Error::config("max_stack_depth must be at least 1"));
        }
        if !(1..=MAX_PACKET_SIZE).contains(&self.packet_size) {
            return Err(Error::config(format!(
                "packet_size {} outside 1..={}",
                self.packet_size, MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = BvhConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.arity, 4);
        assert_eq!(c.packet_size, 4);
    }

    #[test]
    fn test_partial_json() {
        let c = BvhConfig::from_json_str(r#"{ "arity": 8, "collapse_heuristic": "largest_area" }"#).unwrap();
        assert_eq!(c.arity, 8);
        assert_eq!(c.collapse_heuristic, CollapseHeuristic::LargestArea);
        assert_eq!(c.max_stack_depth, 64);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(BvhConfig::from_json_str(r#"{ "arity": 1 }"#).is_err());
        assert!(BvhConfig::from_json_str(r#"{ "arity": 9 }"#).is_err());
        assert!(BvhConfig::from_json_str(r#"{ "packet_size": 0 }"#).is_err());
        assert!(BvhConfig::from_json_str(r#"{ "packet_size": 65 }"#).is_err());
        assert!(BvhConfig::from_json_str(r#"{ "max_stack_depth": 0 }"#).is_err());
        assert!(BvhConfig::from_json_str(r#"{ "bound_epsilon": -1.0 }"#).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bvh.json");
        let c = BvhConfig {
            arity: 6,
            ..Default::default()
        };
        c.save(&path).unwrap();
        assert_eq!(BvhConfig::load(&path).unwrap(), c);
    }
}
