//! Typed argument blocks, one per kernel

use crate::buffers::BufferHandle;
use crate::physics::EdgeFlags;

use super::KernelName;

/// Arguments of `faPointForces`: all-pairs repulsion plus gravity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointForcesArgs {
    pub prevent_overlap: bool,
    pub strong_gravity: bool,
    pub scaling_ratio: f32,
    pub gravity: f32,
    pub num_points: u32,
    pub tile_size: u32,
    pub tiles_per_iteration: u32,
    pub min_distance: f32,
    pub width: f32,
    pub height: f32,
    pub step_number: u32,
    pub input_positions: BufferHandle,
    pub point_degrees: BufferHandle,
    pub point_forces: BufferHandle,
}

/// Arguments of `faEdgeForces`: attraction along one edge direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeForcesArgs {
    pub edge_influence: u32,
    pub flags: EdgeFlags,
    pub min_distance: f32,
    pub num_points: u32,
    pub num_work_items: u32,
    pub step_number: u32,
    pub edges: BufferHandle,
    pub weights: BufferHandle,
    pub work_list: BufferHandle,
    pub input_points: BufferHandle,
    pub point_degrees: BufferHandle,
    pub partial_forces: BufferHandle,
    pub output_forces: BufferHandle,
}

/// Arguments of `faSwingsTractions`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingsTractionsArgs {
    pub num_points: u32,
    pub prev_forces: BufferHandle,
    pub cur_forces: BufferHandle,
    pub swings: BufferHandle,
    pub tractions: BufferHandle,
}

/// Arguments of `faIntegrate`: fixed global speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrateArgs {
    pub num_points: u32,
    pub g_speed: f32,
    pub max_step: f32,
    pub input_positions: BufferHandle,
    pub cur_forces: BufferHandle,
    pub swings: BufferHandle,
    pub output_positions: BufferHandle,
}

/// Arguments of `faIntegrate2`: adaptive global speed and per-node mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrate2Args {
    pub num_points: u32,
    pub g_speed: f32,
    pub max_step: f32,
    pub input_positions: BufferHandle,
    pub point_degrees: BufferHandle,
    pub cur_forces: BufferHandle,
    pub swings: BufferHandle,
    pub tractions: BufferHandle,
    pub output_positions: BufferHandle,
}

/// Arguments of the legacy `forceAtlasPoints` kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyPointsArgs {
    pub scaling_ratio: f32,
    pub gravity: f32,
    pub alpha: f32,
    pub num_points: u32,
    pub tile_size: u32,
    pub min_distance: f32,
    pub width: f32,
    pub height: f32,
    pub step_number: u32,
    pub input_positions: BufferHandle,
    pub point_degrees: BufferHandle,
    pub output_positions: BufferHandle,
}

/// Arguments of the legacy `forceAtlasEdges` kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyEdgesArgs {
    pub edge_influence: u32,
    pub alpha: f32,
    pub min_distance: f32,
    pub num_points: u32,
    pub num_work_items: u32,
    pub step_number: u32,
    pub edges: BufferHandle,
    pub weights: BufferHandle,
    pub work_list: BufferHandle,
    pub input_points: BufferHandle,
    pub output_points: BufferHandle,
}

/// Argument block of any kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArgs {
    PointForces(PointForcesArgs),
    EdgeForces(EdgeForcesArgs),
    SwingsTractions(SwingsTractionsArgs),
    Integrate(IntegrateArgs),
    Integrate2(Integrate2Args),
    LegacyPoints(LegacyPointsArgs),
    LegacyEdges(LegacyEdgesArgs),
}

impl KernelArgs {
    /// The kernel these arguments belong to
    pub fn kernel(&self) -> KernelName {
        match self {
            KernelArgs::PointForces(_) => KernelName::FaPointForces,
            KernelArgs::EdgeForces(_) => KernelName::FaEdgeForces,
            KernelArgs::SwingsTractions(_) => KernelName::FaSwingsTractions,
            KernelArgs::Integrate(_) => KernelName::FaIntegrate,
            KernelArgs::Integrate2(_) => KernelName::FaIntegrate2,
            KernelArgs::LegacyPoints(_) => KernelName::ForceAtlasPoints,
            KernelArgs::LegacyEdges(_) => KernelName::ForceAtlasEdges,
        }
    }

    /// Every buffer the launch touches, inputs first and outputs last
    pub fn buffers(&self) -> Vec<BufferHandle> {
        match *self {
            KernelArgs::PointForces(a) => {
                vec![a.input_positions, a.point_degrees, a.point_forces]
            }
            KernelArgs::EdgeForces(a) => vec![
                a.edges,
                a.weights,
                a.work_list,
                a.input_points,
                a.point_degrees,
                a.partial_forces,
                a.output_forces,
            ],
            KernelArgs::SwingsTractions(a) => {
                vec![a.prev_forces, a.cur_forces, a.swings, a.tractions]
            }
            KernelArgs::Integrate(a) => vec![
                a.input_positions,
                a.cur_forces,
                a.swings,
                a.output_positions,
            ],
            KernelArgs::Integrate2(a) => vec![
                a.input_positions,
                a.point_degrees,
                a.cur_forces,
                a.swings,
                a.tractions,
                a.output_positions,
            ],
            KernelArgs::LegacyPoints(a) => {
                vec![a.input_positions, a.point_degrees, a.output_positions]
            }
            KernelArgs::LegacyEdges(a) => vec![
                a.edges,
                a.weights,
                a.work_list,
                a.input_points,
                a.output_points,
            ],
        }
    }
}

macro_rules! impl_from_args {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for KernelArgs {
                fn from(args: $ty) -> Self {
                    KernelArgs::$variant(args)
                }
            }
        )*
    };
}

impl_from_args! {
    PointForcesArgs => PointForces,
    EdgeForcesArgs => EdgeForces,
    SwingsTractionsArgs => SwingsTractions,
    IntegrateArgs => Integrate,
    Integrate2Args => Integrate2,
    LegacyPointsArgs => LegacyPoints,
    LegacyEdgesArgs => LegacyEdges,
}
