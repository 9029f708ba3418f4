//! GPU compute substrate (wgpu)
//!
//! Runs the same kernels as [`crate::cpu::CpuSubstrate`] as WGSL compute
//! shaders, one invocation per node or per work item, 256 threads per
//! workgroup.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas_layout::gpu::GpuSubstrate;
//! use atlas_layout::{EngineConfig, LayoutEngine};
//!
//! let mut engine = LayoutEngine::new(GpuSubstrate::new()?, EngineConfig::default())?;
//! engine.set_points(&[[0.2, 0.3], [0.7, 0.6]])?;
//! engine.tick(0)?;
//! let positions = engine.cur_points()?;
//! ```

mod shaders;
mod substrate;
mod types;

pub use shaders::{entry_point, source};
pub use substrate::GpuSubstrate;
pub use types::{KernelParams, OPTION_PREVENT_OVERLAP, OPTION_STRONG_GRAVITY, WORKGROUP_SIZE};
