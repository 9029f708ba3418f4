//! Kernel declarations and stage wrappers
//!
//! Each compute pass of the layout is a named kernel with a fixed argument
//! list. A [`Kernel`] is the engine-side handle to a declared kernel: it checks
//! that a launch carries arguments for the right kernel, submits it, and waits
//! for the completion signal before returning.

mod args;
pub mod math;

use std::fmt;

use tracing::debug;

use crate::error::SubstrateError;
use crate::substrate::{ComputeSubstrate, Launch};

pub use args::{
    EdgeForcesArgs, Integrate2Args, IntegrateArgs, KernelArgs, LegacyEdgesArgs, LegacyPointsArgs,
    PointForcesArgs, SwingsTractionsArgs,
};

/// Kernels known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelName {
    FaPointForces,
    FaEdgeForces,
    FaSwingsTractions,
    FaIntegrate,
    FaIntegrate2,
    ForceAtlasPoints,
    ForceAtlasEdges,
}

impl KernelName {
    pub const fn as_str(self) -> &'static str {
        match self {
            KernelName::FaPointForces => "faPointForces",
            KernelName::FaEdgeForces => "faEdgeForces",
            KernelName::FaSwingsTractions => "faSwingsTractions",
            KernelName::FaIntegrate => "faIntegrate",
            KernelName::FaIntegrate2 => "faIntegrate2",
            KernelName::ForceAtlasPoints => "forceAtlasPoints",
            KernelName::ForceAtlasEdges => "forceAtlasEdges",
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a kernel argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Float,
    Uint,
    /// Compile-time switch
    Define,
    Buffer,
}

/// Name and type of one kernel argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
}

const fn arg(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec { name, ty }
}

/// Declaration handed to a substrate before a kernel can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelDecl {
    pub name: KernelName,
    pub args: &'static [ArgSpec],
    /// Source module the kernel lives in
    pub source_module: &'static str,
}

const FA2_MODULE: &str = "forceAtlas2Fast";
const LEGACY_MODULE: &str = "forceAtlas";

pub const FA_POINT_FORCES: KernelDecl = KernelDecl {
    name: KernelName::FaPointForces,
    args: &[
        arg("preventOverlap", ArgType::Define),
        arg("strongGravity", ArgType::Define),
        arg("scalingRatio", ArgType::Float),
        arg("gravity", ArgType::Float),
        arg("numPoints", ArgType::Uint),
        arg("tileSize", ArgType::Uint),
        arg("tilesPerIteration", ArgType::Uint),
        arg("minDistance", ArgType::Float),
        arg("width", ArgType::Float),
        arg("height", ArgType::Float),
        arg("stepNumber", ArgType::Uint),
        arg("inputPositions", ArgType::Buffer),
        arg("pointDegrees", ArgType::Buffer),
        arg("pointForces", ArgType::Buffer),
    ],
    source_module: FA2_MODULE,
};

pub const FA_EDGE_FORCES: KernelDecl = KernelDecl {
    name: KernelName::FaEdgeForces,
    args: &[
        arg("edgeInfluence", ArgType::Uint),
        arg("flags", ArgType::Uint),
        arg("minDistance", ArgType::Float),
        arg("numPoints", ArgType::Uint),
        arg("numWorkItems", ArgType::Uint),
        arg("stepNumber", ArgType::Uint),
        arg("edges", ArgType::Buffer),
        arg("weights", ArgType::Buffer),
        arg("workList", ArgType::Buffer),
        arg("inputPoints", ArgType::Buffer),
        arg("pointDegrees", ArgType::Buffer),
        arg("partialForces", ArgType::Buffer),
        arg("outputForces", ArgType::Buffer),
    ],
    source_module: FA2_MODULE,
};

pub const FA_SWINGS_TRACTIONS: KernelDecl = KernelDecl {
    name: KernelName::FaSwingsTractions,
    args: &[
        arg("numPoints", ArgType::Uint),
        arg("prevForces", ArgType::Buffer),
        arg("curForces", ArgType::Buffer),
        arg("swings", ArgType::Buffer),
        arg("tractions", ArgType::Buffer),
    ],
    source_module: FA2_MODULE,
};

pub const FA_INTEGRATE: KernelDecl = KernelDecl {
    name: KernelName::FaIntegrate,
    args: &[
        arg("numPoints", ArgType::Uint),
        arg("gSpeed", ArgType::Float),
        arg("maxStep", ArgType::Float),
        arg("inputPositions", ArgType::Buffer),
        arg("curForces", ArgType::Buffer),
        arg("swings", ArgType::Buffer),
        arg("outputPositions", ArgType::Buffer),
    ],
    source_module: FA2_MODULE,
};

pub const FA_INTEGRATE2: KernelDecl = KernelDecl {
    name: KernelName::FaIntegrate2,
    args: &[
        arg("numPoints", ArgType::Uint),
        arg("gSpeed", ArgType::Float),
        arg("maxStep", ArgType::Float),
        arg("inputPositions", ArgType::Buffer),
        arg("pointDegrees", ArgType::Buffer),
        arg("curForces", ArgType::Buffer),
        arg("swings", ArgType::Buffer),
        arg("tractions", ArgType::Buffer),
        arg("outputPositions", ArgType::Buffer),
    ],
    source_module: FA2_MODULE,
};

pub const FORCE_ATLAS_POINTS: KernelDecl = KernelDecl {
    name: KernelName::ForceAtlasPoints,
    args: &[
        arg("scalingRatio", ArgType::Float),
        arg("gravity", ArgType::Float),
        arg("alpha", ArgType::Float),
        arg("numPoints", ArgType::Uint),
        arg("tileSize", ArgType::Uint),
        arg("minDistance", ArgType::Float),
        arg("width", ArgType::Float),
        arg("height", ArgType::Float),
        arg("stepNumber", ArgType::Uint),
        arg("inputPositions", ArgType::Buffer),
        arg("pointDegrees", ArgType::Buffer),
        arg("outputPositions", ArgType::Buffer),
    ],
    source_module: LEGACY_MODULE,
};

pub const FORCE_ATLAS_EDGES: KernelDecl = KernelDecl {
    name: KernelName::ForceAtlasEdges,
    args: &[
        arg("edgeInfluence", ArgType::Uint),
        arg("alpha", ArgType::Float),
        arg("minDistance", ArgType::Float),
        arg("numPoints", ArgType::Uint),
        arg("numWorkItems", ArgType::Uint),
        arg("stepNumber", ArgType::Uint),
        arg("edges", ArgType::Buffer),
        arg("weights", ArgType::Buffer),
        arg("workList", ArgType::Buffer),
        arg("inputPoints", ArgType::Buffer),
        arg("outputPoints", ArgType::Buffer),
    ],
    source_module: LEGACY_MODULE,
};

/// A kernel declared on a substrate
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    decl: &'static KernelDecl,
}

impl Kernel {
    /// Declare `decl` on the substrate
    pub fn declare<S: ComputeSubstrate + ?Sized>(
        substrate: &mut S,
        decl: &'static KernelDecl,
    ) -> Result<Self, SubstrateError> {
        debug!(
            kernel = %decl.name,
            module = decl.source_module,
            num_args = decl.args.len(),
            "declaring kernel"
        );
        substrate.declare_kernel(decl)?;
        Ok(Self { decl })
    }

    pub fn name(&self) -> KernelName {
        self.decl.name
    }

    /// Launch the kernel over `global_work_size` units and wait for it
    pub fn exec<S: ComputeSubstrate + ?Sized>(
        &self,
        substrate: &mut S,
        args: impl Into<KernelArgs>,
        global_work_size: usize,
    ) -> Result<(), SubstrateError> {
        let args = args.into();
        if args.kernel() != self.decl.name {
            return Err(SubstrateError::ArgumentMismatch {
                kernel: self.decl.name,
                args: args.kernel(),
            });
        }
        let resources = args.buffers();
        debug!(kernel = %self.decl.name, global_work_size, "running kernel");
        let completion = substrate.execute(Launch {
            kernel: self.decl.name,
            args: &args,
            global_work_size,
            resources: &resources,
        })?;
        substrate.wait(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_list_buffer_args_last() {
        for decl in [
            FA_POINT_FORCES,
            FA_EDGE_FORCES,
            FA_SWINGS_TRACTIONS,
            FA_INTEGRATE,
            FA_INTEGRATE2,
            FORCE_ATLAS_POINTS,
            FORCE_ATLAS_EDGES,
        ] {
            let first_buffer = decl
                .args
                .iter()
                .position(|a| a.ty == ArgType::Buffer)
                .unwrap();
            assert!(
                decl.args[first_buffer..]
                    .iter()
                    .all(|a| a.ty == ArgType::Buffer),
                "{} mixes scalar and buffer args",
                decl.name
            );
        }
    }

    #[test]
    fn kernel_names_match_module_symbols() {
        assert_eq!(KernelName::FaPointForces.to_string(), "faPointForces");
        assert_eq!(KernelName::ForceAtlasEdges.to_string(), "forceAtlasEdges");
    }
}
