//! Uniform block shared by every layout shader
//!
//! One `#[repr(C)]` struct carries the scalar arguments of whichever kernel is
//! launched; fields a kernel does not use stay zero. The layout matches the
//! `Params` struct in the WGSL sources.

use bytemuck::{Pod, Zeroable};

use crate::kernels::KernelArgs;

/// `options` bit: repulsion falls off as 1/d²
pub const OPTION_PREVENT_OVERLAP: u32 = 1 << 0;

/// `options` bit: gravity grows linearly with distance
pub const OPTION_STRONG_GRAVITY: u32 = 1 << 1;

/// Threads per workgroup in every layout shader
pub const WORKGROUP_SIZE: u32 = 256;

/// Scalar kernel arguments as uploaded to the uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub num_points: u32,
    pub num_work_items: u32,
    pub step_number: u32,
    /// Edge flag word (dissuadeHubs, linLog)
    pub flags: u32,
    pub tile_size: u32,
    pub tiles_per_iteration: u32,
    pub edge_influence: u32,
    /// Point pass switches (`OPTION_*`)
    pub options: u32,
    pub scaling_ratio: f32,
    pub gravity: f32,
    pub min_distance: f32,
    pub g_speed: f32,
    pub max_step: f32,
    pub alpha: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&KernelArgs> for KernelParams {
    fn from(args: &KernelArgs) -> Self {
        match *args {
            KernelArgs::PointForces(a) => {
                let mut options = 0;
                if a.prevent_overlap {
                    options |= OPTION_PREVENT_OVERLAP;
                }
                if a.strong_gravity {
                    options |= OPTION_STRONG_GRAVITY;
                }
                Self {
                    num_points: a.num_points,
                    step_number: a.step_number,
                    tile_size: a.tile_size,
                    tiles_per_iteration: a.tiles_per_iteration,
                    options,
                    scaling_ratio: a.scaling_ratio,
                    gravity: a.gravity,
                    min_distance: a.min_distance,
                    width: a.width,
                    height: a.height,
                    ..Self::default()
                }
            }
            KernelArgs::EdgeForces(a) => Self {
                num_points: a.num_points,
                num_work_items: a.num_work_items,
                step_number: a.step_number,
                flags: a.flags.bits(),
                edge_influence: a.edge_influence,
                min_distance: a.min_distance,
                ..Self::default()
            },
            KernelArgs::SwingsTractions(a) => Self {
                num_points: a.num_points,
                ..Self::default()
            },
            KernelArgs::Integrate(a) => Self {
                num_points: a.num_points,
                g_speed: a.g_speed,
                max_step: a.max_step,
                ..Self::default()
            },
            KernelArgs::Integrate2(a) => Self {
                num_points: a.num_points,
                g_speed: a.g_speed,
                max_step: a.max_step,
                ..Self::default()
            },
            KernelArgs::LegacyPoints(a) => Self {
                num_points: a.num_points,
                step_number: a.step_number,
                tile_size: a.tile_size,
                tiles_per_iteration: 1,
                scaling_ratio: a.scaling_ratio,
                gravity: a.gravity,
                alpha: a.alpha,
                min_distance: a.min_distance,
                width: a.width,
                height: a.height,
                ..Self::default()
            },
            KernelArgs::LegacyEdges(a) => Self {
                num_points: a.num_points,
                num_work_items: a.num_work_items,
                step_number: a.step_number,
                edge_influence: a.edge_influence,
                alpha: a.alpha,
                min_distance: a.min_distance,
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferHandle;
    use crate::kernels::PointForcesArgs;

    #[test]
    fn params_are_one_uniform_block() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 64);
    }

    #[test]
    fn point_switches_pack_into_options() {
        let args = KernelArgs::PointForces(PointForcesArgs {
            prevent_overlap: true,
            strong_gravity: false,
            scaling_ratio: 2.0,
            gravity: 1.0,
            num_points: 10,
            tile_size: 256,
            tiles_per_iteration: 1,
            min_distance: 0.01,
            width: 1.0,
            height: 1.0,
            step_number: 3,
            input_positions: BufferHandle(0),
            point_degrees: BufferHandle(1),
            point_forces: BufferHandle(2),
        });
        let params = KernelParams::from(&args);
        assert_eq!(params.options, OPTION_PREVENT_OVERLAP);
        assert_eq!(params.num_points, 10);
        assert_eq!(params.step_number, 3);
    }
}
