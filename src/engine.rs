//! Public layout engine
//!
//! [`LayoutEngine`] is what the surrounding application talks to: it binds
//! points and topology, accepts physics updates, advances the simulation one
//! step per [`LayoutEngine::tick`], and exposes the current buffers with
//! their version counters between steps.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info};

use crate::buffers::BufferName;
use crate::config::EngineConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::forceatlas2::ForceAtlas2;
use crate::legacy::ForceAtlas;
use crate::physics::{EdgeFlags, PhysicsConfig, PhysicsUpdate};
use crate::simulator::{LayoutAlgorithm, Simulator, TickReport};
use crate::substrate::{ComputeSubstrate, HostBuffer};
use crate::topology::Topology;

/// Available layout algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    ForceAtlas2,
    /// Legacy two-kernel ForceAtlas
    ForceAtlas,
}

impl Algorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::ForceAtlas2 => "forceatlas2",
            Algorithm::ForceAtlas => "forceatlas",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forceatlas2" | "fa2" => Ok(Algorithm::ForceAtlas2),
            "forceatlas" | "legacy" => Ok(Algorithm::ForceAtlas),
            other => Err(LayoutError::Config(format!("unknown algorithm: {other}"))),
        }
    }
}

/// A force-directed layout engine over a compute substrate
pub struct LayoutEngine<S: ComputeSubstrate> {
    sim: Simulator<S>,
    algorithm: Box<dyn LayoutAlgorithm<S>>,
    physics: PhysicsConfig,
}

impl<S: ComputeSubstrate> fmt::Debug for LayoutEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("algorithm", &self.algorithm.name())
            .field("substrate", &self.sim.substrate().name())
            .field("num_points", &self.sim.num_points())
            .field("steps_completed", &self.sim.steps_completed())
            .field("physics", &self.physics)
            .finish()
    }
}

impl<S: ComputeSubstrate> LayoutEngine<S> {
    /// Create a ForceAtlas2 engine
    pub fn new(substrate: S, config: EngineConfig) -> LayoutResult<Self> {
        Self::with_algorithm(substrate, config, Algorithm::ForceAtlas2)
    }

    pub fn with_algorithm(
        substrate: S,
        config: EngineConfig,
        algorithm: Algorithm,
    ) -> LayoutResult<Self> {
        let mut sim = Simulator::new(substrate, config)?;
        let mut algorithm: Box<dyn LayoutAlgorithm<S>> = match algorithm {
            Algorithm::ForceAtlas2 => Box::new(ForceAtlas2::new(&mut sim)?),
            Algorithm::ForceAtlas => Box::new(ForceAtlas::new(&mut sim)?),
        };
        let physics = PhysicsConfig::default();
        algorithm.set_physics(&physics);
        info!(
            algorithm = algorithm.name(),
            substrate = sim.substrate().name(),
            "layout engine created"
        );
        Ok(Self {
            sim,
            algorithm,
            physics,
        })
    }

    /// Upload node positions
    pub fn set_points(&mut self, positions: &[[f32; 2]]) -> LayoutResult<()> {
        self.sim.set_points(positions)?;
        self.algorithm.reset();
        Ok(())
    }

    /// Bind the graph topology; degrees and edge lists are computed once here
    pub fn set_edges(&mut self, topology: Topology) -> LayoutResult<()> {
        self.sim.set_topology(topology)?;
        self.algorithm.set_edges(&mut self.sim)
    }

    /// Merge a physics update; takes effect from the next pass on
    pub fn set_physics(&mut self, update: &PhysicsUpdate) {
        if self.physics.apply(update) {
            self.algorithm.set_physics(&self.physics);
        } else {
            debug!("physics update changed nothing");
        }
    }

    /// Merge a physics update given as a JSON object, ignoring unknown keys.
    /// Returns the ignored keys.
    pub fn set_physics_json(&mut self, value: &Value) -> LayoutResult<Vec<String>> {
        let (update, ignored) = PhysicsUpdate::from_json(value)?;
        self.set_physics(&update);
        Ok(ignored)
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    /// Flag word handed to the edge pass
    pub fn edge_flags(&self) -> EdgeFlags {
        self.physics.flags
    }

    /// Run one simulation step.
    ///
    /// On error the step is discarded: positions are not swapped and the
    /// step count does not advance.
    pub fn tick(&mut self, step_number: u32) -> LayoutResult<TickReport> {
        self.algorithm.tick(&mut self.sim, step_number)
    }

    pub fn steps_completed(&self) -> u64 {
        self.sim.steps_completed()
    }

    pub fn num_points(&self) -> usize {
        self.sim.num_points()
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn config(&self) -> &EngineConfig {
        self.sim.config()
    }

    /// Write counter of a buffer, `None` before it is allocated
    pub fn version_of(&self, name: BufferName) -> Option<u64> {
        self.sim.version_of(name)
    }

    /// Read an externally visible buffer
    pub fn read(&mut self, name: BufferName) -> LayoutResult<HostBuffer> {
        if !name.is_exposed() {
            return Err(LayoutError::NotExposed(name));
        }
        self.sim.read(name)
    }

    /// Current positions, one `[x, y]` per node
    pub fn cur_points(&mut self) -> LayoutResult<Vec<[f32; 2]>> {
        if self.sim.num_points() == 0 {
            return Err(LayoutError::NoPoints);
        }
        let flat = self.sim.read_f32(BufferName::CurPoints)?;
        Ok(flat
            .chunks_exact(2)
            .take(self.sim.num_points())
            .map(|p| [p[0], p[1]])
            .collect())
    }

    pub fn substrate(&self) -> &S {
        self.sim.substrate()
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        self.sim.substrate_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuSubstrate;
    use crate::physics::EdgeFlag;
    use serde_json::json;

    fn engine() -> LayoutEngine<CpuSubstrate> {
        LayoutEngine::new(CpuSubstrate::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn algorithm_parses_names() {
        assert_eq!("forceatlas2".parse::<Algorithm>().unwrap(), Algorithm::ForceAtlas2);
        assert_eq!("ForceAtlas".parse::<Algorithm>().unwrap(), Algorithm::ForceAtlas);
        assert!("yifanhu".parse::<Algorithm>().is_err());
    }

    #[test]
    fn internal_buffers_are_not_readable() {
        let mut engine = engine();
        engine.set_points(&[[0.2, 0.2], [0.8, 0.8]]).unwrap();
        assert!(matches!(
            engine.read(BufferName::NextPoints),
            Err(LayoutError::NotExposed(BufferName::NextPoints))
        ));
        assert!(engine.read(BufferName::Swings).is_ok());
    }

    #[test]
    fn tick_without_points_fails() {
        let mut engine = engine();
        assert!(matches!(engine.tick(0), Err(LayoutError::NoPoints)));
        assert!(matches!(engine.cur_points(), Err(LayoutError::NoPoints)));
    }

    #[test]
    fn physics_json_reports_ignored_keys() {
        let mut engine = engine();
        let ignored = engine
            .set_physics_json(&json!({"linLog": true, "theta": 0.5}))
            .unwrap();
        assert_eq!(ignored, vec!["theta".to_string()]);
        assert!(engine.edge_flags().contains(EdgeFlag::LinLog));
    }

    #[test]
    fn cur_points_round_trip() {
        let mut engine = engine();
        let points = [[0.25, 0.75], [0.5, 0.5]];
        engine.set_points(&points).unwrap();
        assert_eq!(engine.cur_points().unwrap(), points.to_vec());
    }
}
