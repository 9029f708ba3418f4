//! Per-node and per-edge force math shared by the host kernels
//!
//! Every function here is pure and works on one node or one edge, so the
//! substrates can run them massively in parallel. The WGSL shaders in the
//! `gpu` module implement the same formulas.

use crate::physics::{EdgeFlag, EdgeFlags};

/// A 2-D vector as stored in position and force buffers
pub type Vec2 = [f32; 2];

/// Distance below which gravity is softened to a linear pull
pub const GRAVITY_SOFTENING_RADIUS: f32 = 1.0;

/// Repulsion coefficient of the legacy point kernel
pub const LEGACY_REPULSION: f32 = 0.001;

/// Gravity coefficient of the legacy point kernel
pub const LEGACY_GRAVITY: f32 = 0.2;

/// Spring coefficient of the legacy edge kernel
pub const LEGACY_SPRING: f32 = 0.1;

#[inline]
pub fn add(a: Vec2, b: Vec2) -> Vec2 {
    [a[0] + b[0], a[1] + b[1]]
}

#[inline]
pub fn sub(a: Vec2, b: Vec2) -> Vec2 {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
pub fn scale(a: Vec2, k: f32) -> Vec2 {
    [a[0] * k, a[1] * k]
}

#[inline]
pub fn length(a: Vec2) -> f32 {
    (a[0] * a[0] + a[1] * a[1]).sqrt()
}

/// Read the `i`-th vector out of an interleaved buffer
/// Layout mass of a node with combined degree `degree`
#[inline]
pub fn mass(degree: u32) -> f32 {
    degree as f32 + 1.0
}

/// Center of a `width` x `height` layout area
#[inline]
pub fn center(width: f32, height: f32) -> Vec2 {
    [width / 2.0, height / 2.0]
}

#[inline]
pub fn load(buf: &[f32], i: usize) -> Vec2 {
    [buf[2 * i], buf[2 * i + 1]]
}

/// Integer hash used to pick jitter directions (lowbias32)
#[inline]
pub fn hash(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Deterministic offset of length `len` separating coincident nodes `i` and `j`.
///
/// `jitter(i, j) == -jitter(j, i)`, so the two nodes are pushed apart.
pub fn jitter(i: u32, j: u32, len: f32) -> Vec2 {
    let (lo, hi, sign) = if i < j { (i, j, 1.0) } else { (j, i, -1.0) };
    let h = hash(lo.wrapping_mul(0x9e37_79b9) ^ hash(hi));
    let angle = (h as f32 / u32::MAX as f32) * std::f32::consts::TAU;
    [angle.cos() * len * sign, angle.sin() * len * sign]
}

/// Displacement from `from` to `to`, replaced by a jitter vector when the two
/// points are closer than `min_distance`. Returns the vector and its length,
/// never less than `min_distance`.
#[inline]
pub fn separation(to: Vec2, from: Vec2, i: u32, j: u32, min_distance: f32) -> (Vec2, f32) {
    let delta = sub(to, from);
    let d = length(delta);
    if d < min_distance {
        (jitter(i, j, min_distance), min_distance)
    } else {
        (delta, d)
    }
}

/// Repulsive force on node `i` from node `j`
#[allow(clippy::too_many_arguments)]
pub fn repulsion(
    pi: Vec2,
    pj: Vec2,
    mass_i: f32,
    mass_j: f32,
    i: u32,
    j: u32,
    scaling_ratio: f32,
    prevent_overlap: bool,
    min_distance: f32,
) -> Vec2 {
    let (delta, d) = separation(pi, pj, i, j, min_distance);
    let k = scaling_ratio * mass_i * mass_j;
    // |F| = k / d, or k / d² to keep nodes from overlapping
    let factor = if prevent_overlap {
        k / (d * d * d)
    } else {
        k / (d * d)
    };
    scale(delta, factor)
}

/// Pull of node at `p` toward `center`
pub fn gravity(p: Vec2, center: Vec2, mass: f32, gravity: f32, strong: bool) -> Vec2 {
    let delta = sub(center, p);
    if strong {
        scale(delta, gravity * mass)
    } else {
        let d = length(delta).max(GRAVITY_SOFTENING_RADIUS);
        scale(delta, gravity * mass / d)
    }
}

/// `weight^edge_influence`
#[inline]
pub fn edge_weight_factor(weight: f32, edge_influence: u32) -> f32 {
    let mut f = 1.0;
    for _ in 0..edge_influence {
        f *= weight;
    }
    f
}

/// Attraction of an edge's source at `ps` toward its target at `pt`
pub fn attraction(
    ps: Vec2,
    pt: Vec2,
    source_mass: f32,
    weight: f32,
    edge_influence: u32,
    flags: EdgeFlags,
    min_distance: f32,
) -> Vec2 {
    let delta = sub(pt, ps);
    let d = length(delta);
    if d < min_distance {
        return [0.0, 0.0];
    }
    let mut factor = edge_weight_factor(weight, edge_influence);
    if flags.contains(EdgeFlag::LinLog) {
        factor *= (1.0 + d).ln() / d;
    }
    if flags.contains(EdgeFlag::DissuadeHubs) {
        factor /= source_mass;
    }
    scale(delta, factor)
}

/// Swing (force change) and traction (mean force) of one node
#[inline]
pub fn swing_traction(prev: Vec2, cur: Vec2) -> (f32, f32) {
    (length(sub(cur, prev)), length(add(cur, prev)) / 2.0)
}

/// Fixed-speed integration step
pub fn fixed_step(p: Vec2, force: Vec2, swing: f32, g_speed: f32, max_step: f32) -> Vec2 {
    let factor = (g_speed / (1.0 + (g_speed * swing).sqrt())).min(max_step);
    add(p, scale(force, factor))
}

/// Adaptive integration step: local speed shrinks with the node's
/// mass-weighted swing and the displacement is bounded by `max_step`
pub fn adaptive_step(
    p: Vec2,
    force: Vec2,
    swing: f32,
    mass: f32,
    g_speed: f32,
    max_step: f32,
) -> Vec2 {
    let mut factor = g_speed / (1.0 + (g_speed * mass * swing).sqrt());
    let magnitude = length(force);
    if magnitude * factor > max_step {
        factor = max_step / magnitude;
    }
    add(p, scale(force, factor))
}

/// Cooling factor of the legacy kernels
pub fn legacy_alpha(step: u32) -> f32 {
    1.0 / (step as f32 / 2.0).clamp(1.0, 30.0)
}

/// Visit the tiles of the all-pairs pass that are active this step
///
/// Returns the scale applied to their contributions so that skipping tiles
/// keeps the expected repulsion unchanged.
pub fn active_tiles(
    num_points: usize,
    tile_size: usize,
    tiles_per_iteration: usize,
    step: u32,
) -> (impl Iterator<Item = std::ops::Range<usize>>, f32) {
    let tile_size = tile_size.max(1);
    let every = tiles_per_iteration.max(1);
    let num_tiles = num_points.div_ceil(tile_size);
    let phase = step as usize % every;
    let tiles = (0..num_tiles)
        .filter(move |t| t % every == phase)
        .map(move |t| t * tile_size..((t + 1) * tile_size).min(num_points));
    (tiles, every as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn jitter_is_antisymmetric_with_requested_length() {
        for (i, j) in [(0, 1), (5, 2), (17, 400)] {
            let a = jitter(i, j, 0.01);
            let b = jitter(j, i, 0.01);
            assert!(approx(a[0], -b[0]) && approx(a[1], -b[1]));
            assert!(approx(length(a), 0.01));
        }
    }

    #[test]
    fn repulsion_of_coincident_nodes_is_finite_and_opposite() {
        let p = [0.5, 0.5];
        let f01 = repulsion(p, p, 1.0, 1.0, 0, 1, 1.0, false, 0.01);
        let f10 = repulsion(p, p, 1.0, 1.0, 1, 0, 1.0, false, 0.01);
        assert!(f01.iter().all(|v| v.is_finite()));
        assert!(length(f01) > 0.0);
        assert!(approx(f01[0], -f10[0]) && approx(f01[1], -f10[1]));
    }

    #[test]
    fn repulsion_magnitude_follows_distance_law() {
        let f = repulsion([2.0, 0.0], [0.0, 0.0], 2.0, 3.0, 0, 1, 1.0, false, 0.01);
        assert!(approx(f[0], 3.0) && approx(f[1], 0.0));
        let f = repulsion([2.0, 0.0], [0.0, 0.0], 2.0, 3.0, 0, 1, 1.0, true, 0.01);
        assert!(approx(f[0], 1.5));
    }

    #[test]
    fn gravity_is_softened_near_center() {
        let far = gravity([4.0, 0.5], [0.0, 0.5], 1.0, 1.0, false);
        assert!(approx(far[0], -1.0));
        let near = gravity([0.25, 0.5], [0.0, 0.5], 2.0, 1.0, false);
        assert!(approx(near[0], -0.5));
        let strong = gravity([4.0, 0.5], [0.0, 0.5], 1.0, 1.0, true);
        assert!(approx(strong[0], -4.0));
    }

    #[test]
    fn attraction_variants() {
        let ps = [0.0, 0.0];
        let pt = [3.0, 4.0];
        let linear = attraction(ps, pt, 2.0, 1.0, 0, EdgeFlags::empty(), 0.01);
        assert!(approx(linear[0], 3.0) && approx(linear[1], 4.0));

        let hubs = EdgeFlags::empty().with(EdgeFlag::DissuadeHubs, true);
        let damped = attraction(ps, pt, 2.0, 1.0, 0, hubs, 0.01);
        assert!(approx(damped[0], 1.5));

        let log = EdgeFlags::empty().with(EdgeFlag::LinLog, true);
        let f = attraction(ps, pt, 2.0, 1.0, 0, log, 0.01);
        assert!(approx(length(f), 6.0_f32.ln()));

        let weighted = attraction(ps, pt, 2.0, 2.0, 2, EdgeFlags::empty(), 0.01);
        assert!(approx(weighted[0], 12.0));

        let self_loop = attraction(ps, ps, 2.0, 1.0, 0, log, 0.01);
        assert_eq!(self_loop, [0.0, 0.0]);
    }

    #[test]
    fn swing_and_traction() {
        let (swing, traction) = swing_traction([1.0, 0.0], [-1.0, 0.0]);
        assert!(approx(swing, 2.0) && approx(traction, 0.0));
        let (swing, traction) = swing_traction([1.0, 0.0], [1.0, 0.0]);
        assert!(approx(swing, 0.0) && approx(traction, 1.0));
    }

    #[test]
    fn steps_are_bounded() {
        let p = fixed_step([0.0, 0.0], [100.0, 0.0], 0.0, 1.0, 0.5);
        assert!(approx(p[0], 50.0));
        let p = adaptive_step([0.0, 0.0], [100.0, 0.0], 0.0, 1.0, 1.0, 10.0);
        assert!(approx(p[0], 10.0));
        let p = adaptive_step([1.0, 1.0], [0.0, 0.0], 3.0, 1.0, 1.0, 10.0);
        assert_eq!(p, [1.0, 1.0]);
    }

    #[test]
    fn legacy_alpha_cools_and_saturates() {
        assert_eq!(legacy_alpha(0), 1.0);
        assert_eq!(legacy_alpha(2), 1.0);
        assert!(approx(legacy_alpha(10), 0.2));
        assert!(approx(legacy_alpha(1000), 1.0 / 30.0));
    }

    #[test]
    fn tiles_rotate_with_step() {
        let (tiles, weight) = active_tiles(10, 4, 1, 3);
        assert_eq!(tiles.collect::<Vec<_>>(), vec![0..4, 4..8, 8..10]);
        assert_eq!(weight, 1.0);

        let (tiles, weight) = active_tiles(10, 4, 2, 3);
        assert_eq!(tiles.collect::<Vec<_>>(), vec![4..8]);
        assert_eq!(weight, 2.0);
    }
}
