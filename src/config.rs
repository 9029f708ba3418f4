//! Engine configuration
//!
//! Everything an engine instance needs besides physics: layout extent,
//! integrator choice and numeric limits. Each engine owns its own
//! [`EngineConfig`]; there is no process-wide state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::integrator::IntegratorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width and height of the layout area; gravity pulls toward its center
    pub dimensions: [f32; 2],
    pub integrator: IntegratorKind,
    /// Global speed of the fixed integrator
    pub global_speed: f32,
    /// Upper bound on a node's displacement in one step
    pub max_step: f32,
    /// How much swinging the adaptive integrator tolerates
    pub jitter_tolerance: f32,
    /// Distances below this are clamped before dividing
    pub min_distance: f32,
    /// Nodes per tile of the all-pairs pass
    pub tile_size: u32,
    /// Number of steps needed to visit every tile once
    pub tiles_per_iteration: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimensions: [1.0, 1.0],
            integrator: IntegratorKind::Adaptive,
            global_speed: 1.0,
            max_step: 10.0,
            jitter_tolerance: 1.0,
            min_distance: 0.01,
            tile_size: 256,
            tiles_per_iteration: 1,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a `.yaml`, `.yml` or `.json` file
    pub fn from_path(path: &Path) -> LayoutResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&text)
                .map_err(|e| LayoutError::Config(format!("{}: {e}", path.display())))?,
            Some("json") => serde_json::from_str(&text)
                .map_err(|e| LayoutError::Config(format!("{}: {e}", path.display())))?,
            other => {
                return Err(LayoutError::Config(format!(
                    "unsupported config format {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the kernels cannot work with
    pub fn validate(&self) -> LayoutResult<()> {
        let positive = [
            ("dimensions[0]", self.dimensions[0]),
            ("dimensions[1]", self.dimensions[1]),
            ("global_speed", self.global_speed),
            ("max_step", self.max_step),
            ("jitter_tolerance", self.jitter_tolerance),
            ("min_distance", self.min_distance),
        ];
        if let Some((name, value)) = positive
            .iter()
            .find(|(_, v)| !(v.is_finite() && *v > 0.0))
        {
            return Err(LayoutError::Config(format!(
                "{name} must be a positive number, got {value}"
            )));
        }
        if self.tile_size == 0 {
            return Err(LayoutError::Config("tile_size must be at least 1".into()));
        }
        if self.tiles_per_iteration == 0 {
            return Err(LayoutError::Config(
                "tiles_per_iteration must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
