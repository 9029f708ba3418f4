//! Global speed control for the integrate pass
//!
//! The adaptive integrator follows the ForceAtlas2 speed heuristic: the
//! layout as a whole may only move as fast as its mass-weighted swinging
//! allows, relative to the useful traction it carries. The fixed integrator
//! keeps a constant global speed and is kept as a fallback.

use serde::{Deserialize, Serialize};

use crate::kernels::math;

/// Integration formula used by the integrate pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    /// Per-node adaptive speed under an adaptive global speed (`faIntegrate2`)
    #[default]
    Adaptive,
    /// Constant global speed (`faIntegrate`)
    Fixed,
}

const INITIAL_SPEED: f32 = 1.0;
const INITIAL_EFFICIENCY: f32 = 1.0;
const MIN_EFFICIENCY: f32 = 0.05;
const MAX_SPEED: f32 = 1000.0;
const MAX_RISE: f32 = 0.5;
const MAX_JITTER_TOLERANCE: f32 = 10.0;

/// Degree-weighted swing and traction summed over all nodes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub swinging: f32,
    pub traction: f32,
}

impl Totals {
    /// Sum `mass * swing` and `mass * traction` over every node
    pub fn collect(swings: &[f32], tractions: &[f32], degrees: &[u32]) -> Self {
        swings
            .iter()
            .zip(tractions)
            .zip(degrees)
            .fold(Self::default(), |acc, ((s, t), d)| {
                let mass = math::mass(*d);
                Self {
                    swinging: acc.swinging + mass * s,
                    traction: acc.traction + mass * t,
                }
            })
    }
}

/// Adaptive global speed state carried across steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSpeed {
    speed: f32,
    efficiency: f32,
    jitter_tolerance: f32,
}

impl AdaptiveSpeed {
    pub fn new(jitter_tolerance: f32) -> Self {
        Self {
            speed: INITIAL_SPEED,
            efficiency: INITIAL_EFFICIENCY,
            jitter_tolerance,
        }
    }

    /// Current global speed
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn efficiency(&self) -> f32 {
        self.efficiency
    }

    /// Forget the speed history (new points or new topology)
    pub fn reset(&mut self) {
        self.speed = INITIAL_SPEED;
        self.efficiency = INITIAL_EFFICIENCY;
    }

    /// Fold this step's totals into the global speed and return it
    pub fn update(&mut self, totals: Totals, num_points: usize) -> f32 {
        if num_points == 0 || totals.swinging <= 0.0 || !totals.swinging.is_finite() {
            return self.speed;
        }
        let n = num_points as f32;

        let estimated = 0.05 * n.sqrt();
        let min_jt = estimated.sqrt();
        let mut jt = self.jitter_tolerance
            * min_jt.max(MAX_JITTER_TOLERANCE.min(estimated * totals.traction / (n * n)));

        if totals.traction > 0.0 && totals.swinging / totals.traction > 2.0 {
            if self.efficiency > MIN_EFFICIENCY {
                self.efficiency *= 0.5;
            }
            jt = jt.max(self.jitter_tolerance);
        }

        let target = jt * self.efficiency * totals.traction / totals.swinging;

        if totals.swinging > jt * totals.traction {
            if self.efficiency > MIN_EFFICIENCY {
                self.efficiency *= 0.7;
            }
        } else if self.speed < MAX_SPEED {
            self.efficiency *= 1.3;
        }

        self.speed += (target - self.speed).min(MAX_RISE * self.speed);
        self.speed
    }
}

impl Default for AdaptiveSpeed {
    fn default() -> Self {
        Self::new(1.0)
    }
}
