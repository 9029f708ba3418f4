//! Legacy ForceAtlas layout
//!
//! The older two-kernel formulation: the point kernel moves nodes directly by
//! repulsion and gravity, then the edge kernel pulls edge ends together once
//! per direction. There is no swing tracking; a cooling factor shrinks the
//! moves over the first steps instead.

use crate::buffers::BufferName;
use crate::error::{LayoutError, LayoutResult, Pass};
use crate::kernels::math::legacy_alpha;
use crate::kernels::{
    FORCE_ATLAS_EDGES, FORCE_ATLAS_POINTS, Kernel, LegacyEdgesArgs, LegacyPointsArgs,
};
use crate::physics::PhysicsConfig;
use crate::simulator::{LayoutAlgorithm, Simulator, TickReport};
use crate::substrate::ComputeSubstrate;

/// Scratch slot between the forward and backward edge kernels
const SCRATCH: BufferName = BufferName::PartialForces1;

#[derive(Debug)]
pub struct ForceAtlas {
    points: Kernel,
    edges: Kernel,
    physics: PhysicsConfig,
}

impl ForceAtlas {
    pub fn new<S: ComputeSubstrate>(sim: &mut Simulator<S>) -> LayoutResult<Self> {
        Ok(Self {
            points: sim.declare(&FORCE_ATLAS_POINTS)?,
            edges: sim.declare(&FORCE_ATLAS_EDGES)?,
            physics: PhysicsConfig::default(),
        })
    }

    fn edge_pass<S: ComputeSubstrate>(
        &self,
        sim: &mut Simulator<S>,
        step_number: u32,
        forward: bool,
        num_work_items: usize,
    ) -> LayoutResult<()> {
        let (edges, weights, items, input, output) = if forward {
            (
                BufferName::ForwardsEdges,
                BufferName::ForwardsWeights,
                BufferName::ForwardsWorkItems,
                BufferName::NextPoints,
                SCRATCH,
            )
        } else {
            (
                BufferName::BackwardsEdges,
                BufferName::BackwardsWeights,
                BufferName::BackwardsWorkItems,
                SCRATCH,
                BufferName::NextPoints,
            )
        };
        let args = LegacyEdgesArgs {
            edge_influence: self.physics.edge_influence,
            alpha: legacy_alpha(step_number),
            min_distance: sim.config().min_distance,
            num_points: sim.num_points() as u32,
            num_work_items: num_work_items as u32,
            step_number,
            edges: sim.handle(edges)?,
            weights: sim.handle(weights)?,
            work_list: sim.handle(items)?,
            input_points: sim.handle(input)?,
            output_points: sim.handle(output)?,
        };
        sim.run(&self.edges, args, num_work_items)
            .map_err(|source| LayoutError::PassFailed {
                pass: Pass::EdgeForces,
                source,
            })?;
        sim.mark_written(&[output])
    }
}

impl<S: ComputeSubstrate> LayoutAlgorithm<S> for ForceAtlas {
    fn name(&self) -> &'static str {
        "forceatlas"
    }

    fn set_physics(&mut self, physics: &PhysicsConfig) {
        self.physics = *physics;
    }

    fn set_edges(&mut self, _sim: &mut Simulator<S>) -> LayoutResult<()> {
        Ok(())
    }

    fn tick(&mut self, sim: &mut Simulator<S>, step_number: u32) -> LayoutResult<TickReport> {
        let n = sim.num_points();
        if n == 0 {
            return Err(LayoutError::NoPoints);
        }
        let config = sim.config().clone();
        let args = LegacyPointsArgs {
            scaling_ratio: self.physics.scaling_ratio,
            gravity: self.physics.gravity,
            alpha: legacy_alpha(step_number),
            num_points: n as u32,
            tile_size: config.tile_size,
            min_distance: config.min_distance,
            width: config.dimensions[0],
            height: config.dimensions[1],
            step_number,
            input_positions: sim.handle(BufferName::CurPoints)?,
            point_degrees: sim.handle(BufferName::Degrees)?,
            output_positions: sim.handle(BufferName::NextPoints)?,
        };
        sim.run(&self.points, args, n)
            .map_err(|source| LayoutError::PassFailed {
                pass: Pass::PointForces,
                source,
            })?;
        sim.mark_written(&[BufferName::NextPoints])?;
        let mut kernels = vec![self.points.name()];

        let (forward_items, backward_items) = sim
            .topology()
            .map(|t| (t.forwards().num_work_items(), t.backwards().num_work_items()))
            .unwrap_or((0, 0));
        if forward_items > 0 {
            self.edge_pass(sim, step_number, true, forward_items)?;
            self.edge_pass(sim, step_number, false, backward_items)?;
            kernels.extend([self.edges.name(); 2]);
        }

        sim.swap(BufferName::CurPoints, BufferName::NextPoints)?;
        let steps_completed = sim.complete_step();
        Ok(TickReport {
            step_number,
            steps_completed,
            global_speed: None,
            kernels,
        })
    }
}
