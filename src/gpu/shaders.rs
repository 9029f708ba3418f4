//! WGSL compute shaders for the layout kernels
//!
//! Every kernel is compiled from the shared [`COMMON`] prelude followed by its
//! own bindings and entry point. Binding 0 is always the `Params` uniform;
//! storage buffers follow in the order of the kernel's declared buffer
//! arguments, with the outputs last.

use crate::kernels::KernelName;

/// Uniform layout and force helpers shared by all kernels
pub const COMMON: &str = r#"
struct Params {
    num_points: u32,
    num_work_items: u32,
    step_number: u32,
    flags: u32,
    tile_size: u32,
    tiles_per_iteration: u32,
    edge_influence: u32,
    options: u32,
    scaling_ratio: f32,
    gravity: f32,
    min_distance: f32,
    g_speed: f32,
    max_step: f32,
    alpha: f32,
    width: f32,
    height: f32,
}

@group(0) @binding(0) var<uniform> params: Params;

const PREVENT_OVERLAP: u32 = 1u;
const STRONG_GRAVITY: u32 = 2u;
const DISSUADE_HUBS: u32 = 1u;
const LIN_LOG: u32 = 2u;
const TAU: f32 = 6.2831853;
const GRAVITY_SOFTENING_RADIUS: f32 = 1.0;
const LEGACY_REPULSION: f32 = 0.001;
const LEGACY_GRAVITY: f32 = 0.2;
const LEGACY_SPRING: f32 = 0.1;

fn hash(v: u32) -> u32 {
    var x = v;
    x ^= x >> 16u;
    x *= 0x7feb352du;
    x ^= x >> 15u;
    x *= 0x846ca68bu;
    x ^= x >> 16u;
    return x;
}

// Antisymmetric in (i, j) so coincident nodes separate
fn jitter(i: u32, j: u32, len: f32) -> vec2<f32> {
    var lo = i;
    var hi = j;
    var dir = 1.0;
    if (j < i) {
        lo = j;
        hi = i;
        dir = -1.0;
    }
    let h = hash((lo * 0x9e3779b9u) ^ hash(hi));
    let angle = f32(h) / 4294967295.0 * TAU;
    return vec2<f32>(cos(angle), sin(angle)) * len * dir;
}

fn repulsion(pi: vec2<f32>, pj: vec2<f32>, mi: f32, mj: f32, i: u32, j: u32,
             kr: f32, prevent_overlap: bool, min_distance: f32) -> vec2<f32> {
    var delta = pi - pj;
    var d = length(delta);
    if (d < min_distance) {
        delta = jitter(i, j, min_distance);
        d = min_distance;
    }
    let k = kr * mi * mj;
    if (prevent_overlap) {
        return delta * (k / (d * d * d));
    }
    return delta * (k / (d * d));
}

fn gravity_pull(p: vec2<f32>, center: vec2<f32>, mass: f32, g: f32, strong: bool) -> vec2<f32> {
    let delta = center - p;
    if (strong) {
        return delta * (g * mass);
    }
    let d = max(length(delta), GRAVITY_SOFTENING_RADIUS);
    return delta * (g * mass / d);
}

fn weight_factor(w: f32, edge_influence: u32) -> f32 {
    var f = 1.0;
    for (var k = 0u; k < edge_influence; k++) {
        f *= w;
    }
    return f;
}

fn attraction(ps: vec2<f32>, pt: vec2<f32>, source_mass: f32, weight: f32,
              edge_influence: u32, flags: u32, min_distance: f32) -> vec2<f32> {
    let delta = pt - ps;
    let d = length(delta);
    if (d < min_distance) {
        return vec2<f32>(0.0, 0.0);
    }
    var factor = weight_factor(weight, edge_influence);
    if ((flags & LIN_LOG) != 0u) {
        factor *= log(1.0 + d) / d;
    }
    if ((flags & DISSUADE_HUBS) != 0u) {
        factor /= source_mass;
    }
    return delta * factor;
}
"#;

/// All-pairs repulsion plus gravity, one invocation per node
pub const FA_POINT_FORCES: &str = r#"
@group(0) @binding(1) var<storage, read> input_positions: array<f32>;
@group(0) @binding(2) var<storage, read> point_degrees: array<u32>;
@group(0) @binding(3) var<storage, read_write> point_forces: array<f32>;

@compute @workgroup_size(256)
fn fa_point_forces(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    let n = params.num_points;
    if (i >= n) {
        return;
    }

    let pi = vec2<f32>(input_positions[2u * i], input_positions[2u * i + 1u]);
    let mi = f32(point_degrees[i]) + 1.0;
    let tile_size = max(params.tile_size, 1u);
    let every = max(params.tiles_per_iteration, 1u);
    let num_tiles = (n + tile_size - 1u) / tile_size;
    let prevent_overlap = (params.options & PREVENT_OVERLAP) != 0u;

    var acc = vec2<f32>(0.0, 0.0);
    for (var t = params.step_number % every; t < num_tiles; t += every) {
        let end = min((t + 1u) * tile_size, n);
        for (var j = t * tile_size; j < end; j++) {
            if (j == i) {
                continue;
            }
            let pj = vec2<f32>(input_positions[2u * j], input_positions[2u * j + 1u]);
            let mj = f32(point_degrees[j]) + 1.0;
            acc += repulsion(pi, pj, mi, mj, i, j, params.scaling_ratio, prevent_overlap,
                             params.min_distance);
        }
    }

    let center = vec2<f32>(params.width, params.height) * 0.5;
    let strong = (params.options & STRONG_GRAVITY) != 0u;
    let f = acc * f32(every) + gravity_pull(pi, center, mi, params.gravity, strong);
    point_forces[2u * i] = f.x;
    point_forces[2u * i + 1u] = f.y;
}
"#;

/// Attraction along one edge direction, one invocation per work item.
/// The output already holds the partial forces when the shader runs.
pub const FA_EDGE_FORCES: &str = r#"
@group(0) @binding(1) var<storage, read> edges: array<u32>;
@group(0) @binding(2) var<storage, read> weights: array<f32>;
@group(0) @binding(3) var<storage, read> work_list: array<u32>;
@group(0) @binding(4) var<storage, read> input_points: array<f32>;
@group(0) @binding(5) var<storage, read> point_degrees: array<u32>;
@group(0) @binding(6) var<storage, read> partial_forces: array<f32>;
@group(0) @binding(7) var<storage, read_write> output_forces: array<f32>;

@compute @workgroup_size(256)
fn fa_edge_forces(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let w = global_id.x;
    if (w >= params.num_work_items) {
        return;
    }

    let first = work_list[2u * w];
    let count = work_list[2u * w + 1u];
    let src = edges[2u * first];
    let ps = vec2<f32>(input_points[2u * src], input_points[2u * src + 1u]);
    let ms = f32(point_degrees[src]) + 1.0;

    var acc = vec2<f32>(0.0, 0.0);
    for (var e = first; e < first + count; e++) {
        let dst = edges[2u * e + 1u];
        let pt = vec2<f32>(input_points[2u * dst], input_points[2u * dst + 1u]);
        acc += attraction(ps, pt, ms, weights[e], params.edge_influence, params.flags,
                          params.min_distance);
    }

    output_forces[2u * src] += acc.x;
    output_forces[2u * src + 1u] += acc.y;
}
"#;

pub const FA_SWINGS_TRACTIONS: &str = r#"
@group(0) @binding(1) var<storage, read> prev_forces: array<f32>;
@group(0) @binding(2) var<storage, read> cur_forces: array<f32>;
@group(0) @binding(3) var<storage, read_write> swings: array<f32>;
@group(0) @binding(4) var<storage, read_write> tractions: array<f32>;

@compute @workgroup_size(256)
fn fa_swings_tractions(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.num_points) {
        return;
    }
    let prev = vec2<f32>(prev_forces[2u * i], prev_forces[2u * i + 1u]);
    let cur = vec2<f32>(cur_forces[2u * i], cur_forces[2u * i + 1u]);
    swings[i] = length(cur - prev);
    tractions[i] = length(cur + prev) / 2.0;
}
"#;

pub const FA_INTEGRATE: &str = r#"
@group(0) @binding(1) var<storage, read> input_positions: array<f32>;
@group(0) @binding(2) var<storage, read> cur_forces: array<f32>;
@group(0) @binding(3) var<storage, read> swings: array<f32>;
@group(0) @binding(4) var<storage, read_write> output_positions: array<f32>;

@compute @workgroup_size(256)
fn fa_integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.num_points) {
        return;
    }
    let p = vec2<f32>(input_positions[2u * i], input_positions[2u * i + 1u]);
    let f = vec2<f32>(cur_forces[2u * i], cur_forces[2u * i + 1u]);
    let g = params.g_speed;
    let factor = min(g / (1.0 + sqrt(g * swings[i])), params.max_step);
    let next = p + f * factor;
    output_positions[2u * i] = next.x;
    output_positions[2u * i + 1u] = next.y;
}
"#;

pub const FA_INTEGRATE2: &str = r#"
@group(0) @binding(1) var<storage, read> input_positions: array<f32>;
@group(0) @binding(2) var<storage, read> point_degrees: array<u32>;
@group(0) @binding(3) var<storage, read> cur_forces: array<f32>;
@group(0) @binding(4) var<storage, read> swings: array<f32>;
@group(0) @binding(5) var<storage, read> tractions: array<f32>;
@group(0) @binding(6) var<storage, read_write> output_positions: array<f32>;

@compute @workgroup_size(256)
fn fa_integrate2(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.num_points) {
        return;
    }
    let p = vec2<f32>(input_positions[2u * i], input_positions[2u * i + 1u]);
    let f = vec2<f32>(cur_forces[2u * i], cur_forces[2u * i + 1u]);
    let mass = f32(point_degrees[i]) + 1.0;
    let g = params.g_speed;

    var factor = g / (1.0 + sqrt(g * mass * swings[i]));
    let magnitude = length(f);
    if (magnitude * factor > params.max_step) {
        factor = params.max_step / magnitude;
    }
    let next = p + f * factor;
    output_positions[2u * i] = next.x;
    output_positions[2u * i + 1u] = next.y;
}
"#;

pub const FORCE_ATLAS_POINTS: &str = r#"
@group(0) @binding(1) var<storage, read> input_positions: array<f32>;
@group(0) @binding(2) var<storage, read> point_degrees: array<u32>;
@group(0) @binding(3) var<storage, read_write> output_positions: array<f32>;

@compute @workgroup_size(256)
fn force_atlas_points(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    let n = params.num_points;
    if (i >= n) {
        return;
    }

    let pi = vec2<f32>(input_positions[2u * i], input_positions[2u * i + 1u]);
    let mi = f32(point_degrees[i]) + 1.0;
    let kr = params.scaling_ratio * LEGACY_REPULSION;

    var acc = vec2<f32>(0.0, 0.0);
    for (var j = 0u; j < n; j++) {
        if (j == i) {
            continue;
        }
        let pj = vec2<f32>(input_positions[2u * j], input_positions[2u * j + 1u]);
        let mj = f32(point_degrees[j]) + 1.0;
        acc += repulsion(pi, pj, mi, mj, i, j, kr, false, params.min_distance);
    }

    let center = vec2<f32>(params.width, params.height) * 0.5;
    let delta = acc + gravity_pull(pi, center, 1.0, params.gravity * LEGACY_GRAVITY, true);
    let next = pi + delta * params.alpha;
    output_positions[2u * i] = next.x;
    output_positions[2u * i + 1u] = next.y;
}
"#;

/// The output already holds the input positions when the shader runs
pub const FORCE_ATLAS_EDGES: &str = r#"
@group(0) @binding(1) var<storage, read> edges: array<u32>;
@group(0) @binding(2) var<storage, read> weights: array<f32>;
@group(0) @binding(3) var<storage, read> work_list: array<u32>;
@group(0) @binding(4) var<storage, read> input_points: array<f32>;
@group(0) @binding(5) var<storage, read_write> output_points: array<f32>;

@compute @workgroup_size(256)
fn force_atlas_edges(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let w = global_id.x;
    if (w >= params.num_work_items) {
        return;
    }

    let first = work_list[2u * w];
    let count = work_list[2u * w + 1u];
    let src = edges[2u * first];
    let ps = vec2<f32>(input_points[2u * src], input_points[2u * src + 1u]);

    var acc = vec2<f32>(0.0, 0.0);
    for (var e = first; e < first + count; e++) {
        let dst = edges[2u * e + 1u];
        let pt = vec2<f32>(input_points[2u * dst], input_points[2u * dst + 1u]);
        acc += attraction(ps, pt, 1.0, weights[e], params.edge_influence, 0u,
                          params.min_distance);
    }

    let k = params.alpha * LEGACY_SPRING;
    output_points[2u * src] += acc.x * k;
    output_points[2u * src + 1u] += acc.y * k;
}
"#;

/// Full WGSL source of a kernel
pub fn source(kernel: KernelName) -> String {
    let body = match kernel {
        KernelName::FaPointForces => FA_POINT_FORCES,
        KernelName::FaEdgeForces => FA_EDGE_FORCES,
        KernelName::FaSwingsTractions => FA_SWINGS_TRACTIONS,
        KernelName::FaIntegrate => FA_INTEGRATE,
        KernelName::FaIntegrate2 => FA_INTEGRATE2,
        KernelName::ForceAtlasPoints => FORCE_ATLAS_POINTS,
        KernelName::ForceAtlasEdges => FORCE_ATLAS_EDGES,
    };
    format!("{COMMON}\n{body}")
}

/// Shader entry point of a kernel
pub fn entry_point(kernel: KernelName) -> &'static str {
    match kernel {
        KernelName::FaPointForces => "fa_point_forces",
        KernelName::FaEdgeForces => "fa_edge_forces",
        KernelName::FaSwingsTractions => "fa_swings_tractions",
        KernelName::FaIntegrate => "fa_integrate",
        KernelName::FaIntegrate2 => "fa_integrate2",
        KernelName::ForceAtlasPoints => "force_atlas_points",
        KernelName::ForceAtlasEdges => "force_atlas_edges",
    }
}

/// Number of trailing storage bindings the kernel writes
pub fn output_count(kernel: KernelName) -> usize {
    match kernel {
        KernelName::FaSwingsTractions => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [KernelName; 7] = [
        KernelName::FaPointForces,
        KernelName::FaEdgeForces,
        KernelName::FaSwingsTractions,
        KernelName::FaIntegrate,
        KernelName::FaIntegrate2,
        KernelName::ForceAtlasPoints,
        KernelName::ForceAtlasEdges,
    ];

    #[test]
    fn every_kernel_has_its_entry_point() {
        for kernel in ALL {
            let src = source(kernel);
            assert!(src.contains("struct Params"));
            assert!(
                src.contains(&format!("fn {}(", entry_point(kernel))),
                "{kernel} source lacks its entry point"
            );
        }
    }

    #[test]
    fn outputs_are_read_write() {
        for kernel in ALL {
            let src = source(kernel);
            assert_eq!(
                src.matches("read_write").count(),
                output_count(kernel),
                "{kernel}"
            );
        }
    }
}
