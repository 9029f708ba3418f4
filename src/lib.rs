//! atlas-layout - ForceAtlas2 force-directed graph layout over pluggable compute substrates.
//!
//! The engine keeps node positions and per-node forces in substrate buffers and advances
//! them one simulation step per [`LayoutEngine::tick`]: repulsion and gravity per node,
//! attraction along edges, swing/traction measurement, then an adaptive-speed integration
//! into the alternate position slot. Kernels run on the host with rayon
//! ([`cpu::CpuSubstrate`]) or, with the `gpu` feature, as wgpu compute shaders.

pub mod buffers;
pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod forceatlas2;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod integrator;
pub mod kernels;
pub mod legacy;
pub mod physics;
pub mod simulator;
pub mod substrate;
pub mod topology;

pub use buffers::BufferName;
pub use config::EngineConfig;
pub use cpu::CpuSubstrate;
pub use engine::{Algorithm, LayoutEngine};
pub use error::{LayoutError, LayoutResult, Pass, SubstrateError};
pub use integrator::IntegratorKind;
pub use physics::{EdgeFlag, EdgeFlags, PhysicsConfig, PhysicsUpdate};
pub use simulator::{LayoutAlgorithm, TickReport};
pub use substrate::ComputeSubstrate;
pub use topology::{Edge, Topology};
