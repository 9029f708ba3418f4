//! ForceAtlas2 tick scheduler
//!
//! One call to [`ForceAtlas2::tick`] walks the pass state machine
//!
//! ```text
//! Idle -> PointForces -> EdgeForcesForward -> EdgeForcesBackward
//!      -> SwingsTractions -> Integrate -> Swap -> Idle
//! ```
//!
//! Each state launches its kernel, waits for completion and marks the output
//! buffers written before the next state is entered. Graphs without edges go
//! straight from `PointForces` to `SwingsTractions`, and the point pass then
//! writes the step's final forces itself.
//!
//! Forces flow through the accumulators as
//! `partialForces1 -> partialForces2 -> curForces`: the forward edge pass adds
//! attraction keyed by edge source on top of the point forces, the backward
//! pass adds the mirrored contribution keyed by edge target.

use std::fmt;

use tracing::{debug, trace};

use crate::buffers::BufferName;
use crate::error::{LayoutError, LayoutResult, Pass, SubstrateError};
use crate::integrator::{AdaptiveSpeed, IntegratorKind, Totals};
use crate::kernels::{
    EdgeForcesArgs, FA_EDGE_FORCES, FA_INTEGRATE, FA_INTEGRATE2, FA_POINT_FORCES,
    FA_SWINGS_TRACTIONS, Integrate2Args, IntegrateArgs, Kernel, PointForcesArgs,
    SwingsTractionsArgs,
};
use crate::physics::PhysicsConfig;
use crate::simulator::{LayoutAlgorithm, Simulator, TickReport};
use crate::substrate::ComputeSubstrate;

/// States of one simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickState {
    Idle,
    PointForces,
    EdgeForcesForward,
    EdgeForcesBackward,
    SwingsTractions,
    Integrate,
    Swap,
}

impl TickState {
    /// State entered once this one has completed
    pub fn next(self, has_edges: bool) -> TickState {
        match self {
            TickState::Idle => TickState::PointForces,
            TickState::PointForces if has_edges => TickState::EdgeForcesForward,
            TickState::PointForces => TickState::SwingsTractions,
            TickState::EdgeForcesForward => TickState::EdgeForcesBackward,
            TickState::EdgeForcesBackward => TickState::SwingsTractions,
            TickState::SwingsTractions => TickState::Integrate,
            TickState::Integrate => TickState::Swap,
            TickState::Swap => TickState::Idle,
        }
    }

    /// The compute pass a failure in this state is reported as
    pub fn pass(self) -> Option<Pass> {
        match self {
            TickState::PointForces => Some(Pass::PointForces),
            TickState::EdgeForcesForward | TickState::EdgeForcesBackward => Some(Pass::EdgeForces),
            TickState::SwingsTractions => Some(Pass::SwingsTractions),
            TickState::Integrate => Some(Pass::Integrate),
            TickState::Idle | TickState::Swap => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TickState::Idle => "idle",
            TickState::PointForces => "point-forces",
            TickState::EdgeForcesForward => "edge-forces-forward",
            TickState::EdgeForcesBackward => "edge-forces-backward",
            TickState::SwingsTractions => "swings-tractions",
            TickState::Integrate => "integrate",
            TickState::Swap => "swap",
        }
    }
}

impl fmt::Display for TickState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kernels declared by one ForceAtlas2 instance
#[derive(Debug, Clone, Copy)]
struct Kernels {
    point_forces: Kernel,
    edge_forces: Kernel,
    swings_tractions: Kernel,
    integrate: Kernel,
    integrate2: Kernel,
}

/// The ForceAtlas2 layout algorithm
#[derive(Debug)]
pub struct ForceAtlas2 {
    kernels: Kernels,
    physics: PhysicsConfig,
    speed: AdaptiveSpeed,
    trace: Vec<TickState>,
}

/// Direction of an edge pass
#[derive(Debug, Clone, Copy)]
struct EdgePass {
    edges: BufferName,
    weights: BufferName,
    work_items: BufferName,
    partial: BufferName,
    output: BufferName,
}

const FORWARD: EdgePass = EdgePass {
    edges: BufferName::ForwardsEdges,
    weights: BufferName::ForwardsWeights,
    work_items: BufferName::ForwardsWorkItems,
    partial: BufferName::PartialForces1,
    output: BufferName::PartialForces2,
};

const BACKWARD: EdgePass = EdgePass {
    edges: BufferName::BackwardsEdges,
    weights: BufferName::BackwardsWeights,
    work_items: BufferName::BackwardsWorkItems,
    partial: BufferName::PartialForces2,
    output: BufferName::CurForces,
};

impl ForceAtlas2 {
    /// Declare the ForceAtlas2 kernels on the simulator's substrate
    pub fn new<S: ComputeSubstrate>(sim: &mut Simulator<S>) -> LayoutResult<Self> {
        let kernels = Kernels {
            point_forces: sim.declare(&FA_POINT_FORCES)?,
            edge_forces: sim.declare(&FA_EDGE_FORCES)?,
            swings_tractions: sim.declare(&FA_SWINGS_TRACTIONS)?,
            integrate: sim.declare(&FA_INTEGRATE)?,
            integrate2: sim.declare(&FA_INTEGRATE2)?,
        };
        Ok(Self {
            kernels,
            physics: PhysicsConfig::default(),
            speed: AdaptiveSpeed::new(sim.config().jitter_tolerance),
            trace: Vec::new(),
        })
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    /// States visited by the last tick, ending in `Idle` when it completed
    pub fn trace(&self) -> &[TickState] {
        &self.trace
    }

    /// Adaptive global speed after the last tick
    pub fn global_speed(&self) -> f32 {
        self.speed.speed()
    }

    fn point_forces<S: ComputeSubstrate>(
        &self,
        sim: &mut Simulator<S>,
        step_number: u32,
        output: BufferName,
    ) -> LayoutResult<()> {
        let config = sim.config().clone();
        let n = sim.num_points();
        let args = PointForcesArgs {
            prevent_overlap: self.physics.prevent_overlap,
            strong_gravity: self.physics.strong_gravity,
            scaling_ratio: self.physics.scaling_ratio,
            gravity: self.physics.gravity,
            num_points: n as u32,
            tile_size: config.tile_size,
            tiles_per_iteration: config.tiles_per_iteration,
            min_distance: config.min_distance,
            width: config.dimensions[0],
            height: config.dimensions[1],
            step_number,
            input_positions: sim.handle(BufferName::CurPoints)?,
            point_degrees: sim.handle(BufferName::Degrees)?,
            point_forces: sim.handle(output)?,
        };
        sim.run(&self.kernels.point_forces, args, n)
            .map_err(failed(Pass::PointForces))?;
        sim.mark_written(&[output])
    }

    fn edge_forces<S: ComputeSubstrate>(
        &self,
        sim: &mut Simulator<S>,
        step_number: u32,
        direction: EdgePass,
        num_work_items: usize,
    ) -> LayoutResult<()> {
        let args = EdgeForcesArgs {
            edge_influence: self.physics.edge_influence,
            flags: self.physics.flags,
            min_distance: sim.config().min_distance,
            num_points: sim.num_points() as u32,
            num_work_items: num_work_items as u32,
            step_number,
            edges: sim.handle(direction.edges)?,
            weights: sim.handle(direction.weights)?,
            work_list: sim.handle(direction.work_items)?,
            input_points: sim.handle(BufferName::CurPoints)?,
            point_degrees: sim.handle(BufferName::Degrees)?,
            partial_forces: sim.handle(direction.partial)?,
            output_forces: sim.handle(direction.output)?,
        };
        sim.run(&self.kernels.edge_forces, args, num_work_items)
            .map_err(failed(Pass::EdgeForces))?;
        sim.mark_written(&[direction.output])
    }

    fn swings_tractions<S: ComputeSubstrate>(&self, sim: &mut Simulator<S>) -> LayoutResult<()> {
        let n = sim.num_points();
        let args = SwingsTractionsArgs {
            num_points: n as u32,
            prev_forces: sim.handle(BufferName::PrevForces)?,
            cur_forces: sim.handle(BufferName::CurForces)?,
            swings: sim.handle(BufferName::Swings)?,
            tractions: sim.handle(BufferName::Tractions)?,
        };
        sim.run(&self.kernels.swings_tractions, args, n)
            .map_err(failed(Pass::SwingsTractions))?;
        sim.mark_written(&[BufferName::Swings, BufferName::Tractions])
    }

    /// Fold the swing and traction totals into a copy of the speed state.
    /// The copy is committed only once the step has been swapped in.
    fn next_speed<S: ComputeSubstrate>(
        &self,
        sim: &mut Simulator<S>,
    ) -> LayoutResult<AdaptiveSpeed> {
        let reduce = |sim: &mut Simulator<S>| -> LayoutResult<Totals> {
            let swings = sim.read_f32(BufferName::Swings)?;
            let tractions = sim.read_f32(BufferName::Tractions)?;
            let degrees = sim.read_u32(BufferName::Degrees)?;
            Ok(Totals::collect(&swings, &tractions, &degrees))
        };
        let totals = reduce(sim).map_err(|e| match e {
            LayoutError::Substrate(source) => LayoutError::PassFailed {
                pass: Pass::SwingsTractions,
                source,
            },
            other => other,
        })?;
        let mut next = self.speed;
        let speed = next.update(totals, sim.num_points());
        debug!(
            swinging = totals.swinging,
            traction = totals.traction,
            speed,
            "global speed"
        );
        Ok(next)
    }

    fn integrate<S: ComputeSubstrate>(
        &self,
        sim: &mut Simulator<S>,
        g_speed: f32,
    ) -> LayoutResult<()> {
        let n = sim.num_points();
        let max_step = sim.config().max_step;
        let integrator = sim.config().integrator;
        let result = match integrator {
            IntegratorKind::Fixed => {
                let args = IntegrateArgs {
                    num_points: n as u32,
                    g_speed,
                    max_step,
                    input_positions: sim.handle(BufferName::CurPoints)?,
                    cur_forces: sim.handle(BufferName::CurForces)?,
                    swings: sim.handle(BufferName::Swings)?,
                    output_positions: sim.handle(BufferName::NextPoints)?,
                };
                sim.run(&self.kernels.integrate, args, n)
            }
            IntegratorKind::Adaptive => {
                let args = Integrate2Args {
                    num_points: n as u32,
                    g_speed,
                    max_step,
                    input_positions: sim.handle(BufferName::CurPoints)?,
                    point_degrees: sim.handle(BufferName::Degrees)?,
                    cur_forces: sim.handle(BufferName::CurForces)?,
                    swings: sim.handle(BufferName::Swings)?,
                    tractions: sim.handle(BufferName::Tractions)?,
                    output_positions: sim.handle(BufferName::NextPoints)?,
                };
                sim.run(&self.kernels.integrate2, args, n)
            }
        };
        result.map_err(failed(Pass::Integrate))?;
        sim.mark_written(&[BufferName::NextPoints])
    }

    /// Publish the step: next positions become current, and this step's
    /// forces become the reference for the next swing
    fn swap<S: ComputeSubstrate>(&self, sim: &mut Simulator<S>) -> LayoutResult<()> {
        // The copy can fail on the substrate; the handle swap cannot
        sim.copy(BufferName::CurForces, BufferName::PrevForces)?;
        sim.swap(BufferName::CurPoints, BufferName::NextPoints)
    }
}

fn failed(pass: Pass) -> impl FnOnce(SubstrateError) -> LayoutError {
    move |source| LayoutError::PassFailed { pass, source }
}

impl<S: ComputeSubstrate> LayoutAlgorithm<S> for ForceAtlas2 {
    fn name(&self) -> &'static str {
        "forceatlas2"
    }

    fn set_physics(&mut self, physics: &PhysicsConfig) {
        self.physics = *physics;
    }

    fn set_edges(&mut self, _sim: &mut Simulator<S>) -> LayoutResult<()> {
        self.speed.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.speed.reset();
    }

    fn tick(&mut self, sim: &mut Simulator<S>, step_number: u32) -> LayoutResult<TickReport> {
        if sim.num_points() == 0 {
            return Err(LayoutError::NoPoints);
        }
        let (forward_items, backward_items) = match sim.topology() {
            Some(t) => (
                t.forwards().num_work_items(),
                t.backwards().num_work_items(),
            ),
            None => (0, 0),
        };
        let has_edges = forward_items > 0;
        let integrator = sim.config().integrator;
        let fixed_speed = sim.config().global_speed;

        self.trace.clear();
        self.trace.push(TickState::Idle);
        let mut kernels = Vec::new();
        let mut g_speed = None;
        let mut pending_speed = None;
        let mut state = TickState::Idle;

        loop {
            state = state.next(has_edges);
            trace!(step_number, state = %state, "entering state");
            self.trace.push(state);

            match state {
                TickState::Idle => break,
                TickState::PointForces => {
                    let output = if has_edges {
                        BufferName::PartialForces1
                    } else {
                        BufferName::CurForces
                    };
                    self.point_forces(sim, step_number, output)?;
                    kernels.push(self.kernels.point_forces.name());
                }
                TickState::EdgeForcesForward => {
                    self.edge_forces(sim, step_number, FORWARD, forward_items)?;
                    kernels.push(self.kernels.edge_forces.name());
                }
                TickState::EdgeForcesBackward => {
                    self.edge_forces(sim, step_number, BACKWARD, backward_items)?;
                    kernels.push(self.kernels.edge_forces.name());
                }
                TickState::SwingsTractions => {
                    self.swings_tractions(sim)?;
                    kernels.push(self.kernels.swings_tractions.name());
                    g_speed = Some(match integrator {
                        IntegratorKind::Adaptive => {
                            let next = self.next_speed(sim)?;
                            pending_speed = Some(next);
                            next.speed()
                        }
                        IntegratorKind::Fixed => fixed_speed,
                    });
                }
                TickState::Integrate => {
                    self.integrate(sim, g_speed.unwrap_or(fixed_speed))?;
                    kernels.push(match integrator {
                        IntegratorKind::Adaptive => self.kernels.integrate2.name(),
                        IntegratorKind::Fixed => self.kernels.integrate.name(),
                    });
                }
                TickState::Swap => self.swap(sim)?,
            }
        }

        if let Some(next) = pending_speed {
            self.speed = next;
        }
        let steps_completed = sim.complete_step();
        Ok(TickReport {
            step_number,
            steps_completed,
            global_speed: g_speed,
            kernels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::cpu::CpuSubstrate;
    use crate::kernels::KernelName;
    use crate::topology::{Edge, Topology};

    fn trace_string(fa2: &ForceAtlas2) -> String {
        fa2.trace()
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn path_simulator() -> Simulator<CpuSubstrate> {
        let mut sim = Simulator::new(CpuSubstrate::new(), EngineConfig::default()).unwrap();
        sim.set_points(&[[0.1, 0.1], [0.5, 0.9], [0.9, 0.2]]).unwrap();
        sim.set_topology(Topology::new(3, &[Edge::new(0, 1), Edge::new(1, 2)]).unwrap())
            .unwrap();
        sim
    }

    #[test]
    fn tick_walks_every_pass_in_order() {
        let mut sim = path_simulator();
        let mut fa2 = ForceAtlas2::new(&mut sim).unwrap();
        let report = fa2.tick(&mut sim, 0).unwrap();

        insta::assert_snapshot!(trace_string(&fa2), @"idle -> point-forces -> edge-forces-forward -> edge-forces-backward -> swings-tractions -> integrate -> swap -> idle");
        assert_eq!(
            report.kernels,
            vec![
                KernelName::FaPointForces,
                KernelName::FaEdgeForces,
                KernelName::FaEdgeForces,
                KernelName::FaSwingsTractions,
                KernelName::FaIntegrate2,
            ]
        );
        assert_eq!(report.steps_completed, 1);
    }

    #[test]
    fn edgeless_tick_skips_edge_passes() {
        let mut sim = Simulator::new(CpuSubstrate::new(), EngineConfig::default()).unwrap();
        sim.set_points(&[[0.2, 0.2], [0.8, 0.8]]).unwrap();
        let mut fa2 = ForceAtlas2::new(&mut sim).unwrap();
        fa2.tick(&mut sim, 0).unwrap();

        insta::assert_snapshot!(trace_string(&fa2), @"idle -> point-forces -> swings-tractions -> integrate -> swap -> idle");
    }

    #[test]
    fn fixed_integrator_uses_configured_speed() {
        let config = EngineConfig {
            integrator: IntegratorKind::Fixed,
            global_speed: 0.5,
            ..EngineConfig::default()
        };
        let mut sim = Simulator::new(CpuSubstrate::new(), config).unwrap();
        sim.set_points(&[[0.2, 0.2], [0.8, 0.8]]).unwrap();
        let mut fa2 = ForceAtlas2::new(&mut sim).unwrap();
        let report = fa2.tick(&mut sim, 0).unwrap();

        assert_eq!(report.global_speed, Some(0.5));
        assert_eq!(report.kernels.last(), Some(&KernelName::FaIntegrate));
    }

    #[test]
    fn forces_are_kept_as_previous_after_swap() {
        let mut sim = path_simulator();
        let mut fa2 = ForceAtlas2::new(&mut sim).unwrap();
        fa2.tick(&mut sim, 0).unwrap();

        let cur = sim.read_f32(BufferName::CurForces).unwrap();
        let prev = sim.read_f32(BufferName::PrevForces).unwrap();
        assert_eq!(cur, prev);
        assert!(cur.iter().any(|f| *f != 0.0));
    }

    #[test]
    fn state_machine_returns_to_idle() {
        for has_edges in [true, false] {
            let mut state = TickState::Idle.next(has_edges);
            let mut hops = 1;
            while state != TickState::Idle {
                state = state.next(has_edges);
                hops += 1;
            }
            assert_eq!(hops, if has_edges { 7 } else { 5 });
        }
        assert_eq!(TickState::Swap.pass(), None);
        assert_eq!(
            TickState::EdgeForcesBackward.pass(),
            Some(Pass::EdgeForces)
        );
    }
}
