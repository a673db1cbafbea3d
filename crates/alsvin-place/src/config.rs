//! Configuration of the A* placer.

use serde::{Deserialize, Serialize};

/// Tuning knobs of the A* placer.
///
/// Missing keys default silently; unknown keys are reported by the caller
/// that parses the combined configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacerConfig {
    /// Restrict candidate sites to a window around the nearest site.
    pub use_window: bool,
    /// Minimum window width in sites.
    pub window_min_width: usize,
    /// Height/width ratio of the window.
    pub window_ratio: f64,
    /// Windows grow until `options ≥ window_share × jobs`.
    pub window_share: f64,
    /// Weight of the deepening term of the heuristic.
    pub deepening_factor: f64,
    /// Constant added to the per-group deviation in the deepening term.
    pub deepening_value: f64,
    /// Weight of next-layer lookahead costs.
    pub lookahead_factor: f64,
    /// Distance discount granted to a reused atom staying in place.
    pub reuse_level: f64,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            use_window: true,
            window_min_width: 8,
            window_ratio: 1.0,
            window_share: 0.6,
            deepening_factor: 0.8,
            deepening_value: 0.2,
            lookahead_factor: 0.2,
            reuse_level: 5.0,
        }
    }
}

impl PlacerConfig {
    /// The window height derived from width and ratio.
    pub fn window_min_height(&self) -> usize {
        (self.window_ratio * self.window_min_width as f64).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let config = PlacerConfig::default();
        assert!(config.use_window);
        assert_eq!(config.window_min_height(), 8);
    }

    #[test]
    fn missing_keys_default() {
        let config: PlacerConfig = serde_json::from_str(r#"{"window_min_width": 4}"#).unwrap();
        assert_eq!(config.window_min_width, 4);
        assert_eq!(config.window_share, 0.6);
    }
}
