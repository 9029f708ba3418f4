//! Engine state shared by the layout algorithms
//!
//! A [`Simulator`] owns the substrate, the buffer registry and the bound
//! topology. Algorithms borrow it mutably for the duration of one tick, so
//! nothing outside the engine can observe buffers mid-step.

use tracing::{info, warn};

use crate::buffers::{BufferHandle, BufferName, BufferRegistry};
use crate::config::EngineConfig;
use crate::error::{LayoutError, LayoutResult, SubstrateError};
use crate::kernels::{Kernel, KernelArgs, KernelDecl, KernelName};
use crate::physics::PhysicsConfig;
use crate::substrate::{BufferData, ComputeSubstrate, HostBuffer};
use crate::topology::Topology;

/// Buffers sized by the number of points, with their per-element stride
const POINT_BUFFERS: [(BufferName, usize); 8] = [
    (BufferName::CurPoints, 2),
    (BufferName::NextPoints, 2),
    (BufferName::PartialForces1, 2),
    (BufferName::PartialForces2, 2),
    (BufferName::CurForces, 2),
    (BufferName::PrevForces, 2),
    (BufferName::Swings, 1),
    (BufferName::Tractions, 1),
];

/// Outcome of one successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Step number the caller passed to `tick`
    pub step_number: u32,
    /// Completed steps after this tick
    pub steps_completed: u64,
    /// Global speed used by the integrate pass, if the algorithm has one
    pub global_speed: Option<f32>,
    /// Kernels launched, in order
    pub kernels: Vec<KernelName>,
}

/// A layout algorithm driven one step at a time
pub trait LayoutAlgorithm<S: ComputeSubstrate> {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Replace the physics used from the next pass on
    fn set_physics(&mut self, physics: &PhysicsConfig);

    /// React to a newly bound topology
    fn set_edges(&mut self, sim: &mut Simulator<S>) -> LayoutResult<()>;

    /// React to newly uploaded positions
    fn reset(&mut self) {}

    /// Run every pass of one step
    fn tick(&mut self, sim: &mut Simulator<S>, step_number: u32) -> LayoutResult<TickReport>;
}

/// Substrate, buffers and topology of one engine
#[derive(Debug)]
pub struct Simulator<S> {
    substrate: S,
    registry: BufferRegistry,
    config: EngineConfig,
    topology: Option<Topology>,
    num_points: usize,
    steps_completed: u64,
}

impl<S: ComputeSubstrate> Simulator<S> {
    pub fn new(substrate: S, config: EngineConfig) -> LayoutResult<Self> {
        config.validate()?;
        Ok(Self {
            substrate,
            registry: BufferRegistry::new(),
            config,
            topology: None,
            num_points: 0,
            steps_completed: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub(crate) fn complete_step(&mut self) -> u64 {
        self.steps_completed += 1;
        self.steps_completed
    }

    /// Upload positions, one `[x, y]` per node.
    ///
    /// Changing the number of points reallocates every per-node buffer and
    /// drops a topology that no longer fits. Previous forces are cleared, so
    /// the next swing is measured from rest.
    pub fn set_points(&mut self, positions: &[[f32; 2]]) -> LayoutResult<()> {
        let n = positions.len();
        if n == 0 {
            return Err(LayoutError::NoPoints);
        }

        if n != self.num_points || !self.registry.contains(BufferName::CurPoints) {
            for (name, stride) in POINT_BUFFERS {
                self.registry.allocate(&mut self.substrate, name, n, stride)?;
            }
            self.num_points = n;
        }

        if self.topology.as_ref().map(Topology::num_points) != Some(n) {
            if self.topology.is_some() {
                warn!(num_points = n, "point count changed, dropping bound topology");
            }
            self.bind_topology(Topology::new(n, &[])?)?;
        }

        let flat: Vec<f32> = positions.iter().flatten().copied().collect();
        self.registry
            .write(&mut self.substrate, BufferName::CurPoints, BufferData::F32(&flat))?;
        self.registry.write(
            &mut self.substrate,
            BufferName::PrevForces,
            BufferData::F32(&vec![0.0; 2 * n]),
        )?;
        Ok(())
    }

    /// Bind a topology over the current points
    pub fn set_topology(&mut self, topology: Topology) -> LayoutResult<()> {
        if self.num_points == 0 {
            return Err(LayoutError::NoPoints);
        }
        if topology.num_points() != self.num_points {
            return Err(LayoutError::Topology(format!(
                "topology covers {} points but {} are set",
                topology.num_points(),
                self.num_points
            )));
        }
        self.bind_topology(topology)
    }

    fn bind_topology(&mut self, topology: Topology) -> LayoutResult<()> {
        let n = topology.num_points();
        let ne = topology.num_edges();
        let forwards = topology.forwards();
        let backwards = topology.backwards();

        let uploads: [(BufferName, usize, usize, BufferData<'_>); 3] = [
            (BufferName::Degrees, n, 1, BufferData::U32(topology.degrees())),
            (BufferName::ForwardsDegrees, n, 1, BufferData::U32(forwards.degrees())),
            (BufferName::BackwardsDegrees, n, 1, BufferData::U32(backwards.degrees())),
        ];
        for (name, count, stride, data) in uploads {
            self.registry.allocate(&mut self.substrate, name, count, stride)?;
            self.registry.write(&mut self.substrate, name, data)?;
        }

        let directions = [
            (
                BufferName::ForwardsEdges,
                BufferName::ForwardsWeights,
                BufferName::ForwardsWorkItems,
                forwards,
            ),
            (
                BufferName::BackwardsEdges,
                BufferName::BackwardsWeights,
                BufferName::BackwardsWorkItems,
                backwards,
            ),
        ];
        for (edges, weights, items, dir) in directions {
            self.registry.allocate(&mut self.substrate, edges, ne, 2)?;
            self.registry
                .write(&mut self.substrate, edges, BufferData::U32(&dir.flat_edges()))?;
            self.registry.allocate(&mut self.substrate, weights, ne, 1)?;
            self.registry
                .write(&mut self.substrate, weights, BufferData::F32(dir.weights()))?;
            self.registry
                .allocate(&mut self.substrate, items, dir.num_work_items(), 2)?;
            self.registry.write(
                &mut self.substrate,
                items,
                BufferData::U32(&dir.flat_work_items()),
            )?;
        }

        info!(
            num_points = n,
            num_edges = ne,
            forward_work_items = forwards.num_work_items(),
            backward_work_items = backwards.num_work_items(),
            "topology bound"
        );
        self.topology = Some(topology);
        Ok(())
    }

    /// Declare a kernel on this engine's substrate
    pub fn declare(&mut self, decl: &'static KernelDecl) -> LayoutResult<Kernel> {
        Ok(Kernel::declare(&mut self.substrate, decl)?)
    }

    /// Launch a declared kernel and wait for it
    pub fn run(
        &mut self,
        kernel: &Kernel,
        args: impl Into<KernelArgs>,
        global_work_size: usize,
    ) -> Result<(), SubstrateError> {
        kernel.exec(&mut self.substrate, args, global_work_size)
    }

    pub fn handle(&self, name: BufferName) -> LayoutResult<BufferHandle> {
        self.registry.handle(name)
    }

    pub fn version_of(&self, name: BufferName) -> Option<u64> {
        self.registry.version_of(name)
    }

    pub fn mark_written(&mut self, names: &[BufferName]) -> LayoutResult<()> {
        self.registry.mark_written(names)
    }

    pub fn copy(&mut self, src: BufferName, dst: BufferName) -> LayoutResult<()> {
        self.registry.copy(&mut self.substrate, src, dst)
    }

    pub fn swap(&mut self, a: BufferName, b: BufferName) -> LayoutResult<()> {
        self.registry.swap(a, b)
    }

    /// Read any engine buffer back to the host
    pub fn read(&mut self, name: BufferName) -> LayoutResult<HostBuffer> {
        self.registry.read(&mut self.substrate, name)
    }

    pub fn read_f32(&mut self, name: BufferName) -> LayoutResult<Vec<f32>> {
        let handle = self.handle(name)?;
        Ok(self.read(name)?.into_f32(handle)?)
    }

    pub fn read_u32(&mut self, name: BufferName) -> LayoutResult<Vec<u32>> {
        let handle = self.handle(name)?;
        Ok(self.read(name)?.into_u32(handle)?)
    }
}
