//! Host compute substrate
//!
//! Runs every layout kernel on the CPU. Each launch is data-parallel over
//! nodes or work items through rayon; launches complete synchronously, so a
//! [`Completion`] is already signaled when `execute` returns.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::buffers::{BufferHandle, ElementKind};
use crate::error::SubstrateError;
use crate::kernels::math::{self, Vec2};
use crate::kernels::{
    EdgeForcesArgs, Integrate2Args, IntegrateArgs, KernelArgs, KernelDecl, KernelName,
    LegacyEdgesArgs, LegacyPointsArgs, PointForcesArgs, SwingsTractionsArgs,
};
use crate::physics::EdgeFlags;
use crate::substrate::{BufferData, BufferDesc, ComputeSubstrate, Completion, HostBuffer, Launch};

/// CPU substrate backed by host vectors
#[derive(Debug, Default)]
pub struct CpuSubstrate {
    buffers: HashMap<BufferHandle, HostBuffer>,
    declared: HashSet<KernelName>,
    submitted: u64,
}

impl CpuSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&HostBuffer, SubstrateError> {
        self.buffers
            .get(&handle)
            .ok_or(SubstrateError::MissingBuffer(handle))
    }

    fn f32s(&self, handle: BufferHandle, required: usize) -> Result<&[f32], SubstrateError> {
        match self.buffer(handle)? {
            HostBuffer::F32(d) => check_len(handle, d, required),
            HostBuffer::U32(_) => Err(SubstrateError::ElementKind {
                handle,
                expected: ElementKind::F32,
                actual: ElementKind::U32,
            }),
        }
    }

    fn u32s(&self, handle: BufferHandle, required: usize) -> Result<&[u32], SubstrateError> {
        match self.buffer(handle)? {
            HostBuffer::U32(d) => check_len(handle, d, required),
            HostBuffer::F32(_) => Err(SubstrateError::ElementKind {
                handle,
                expected: ElementKind::U32,
                actual: ElementKind::F32,
            }),
        }
    }

    fn take_f32(&mut self, handle: BufferHandle) -> Result<Vec<f32>, SubstrateError> {
        match self.buffers.remove(&handle) {
            Some(HostBuffer::F32(d)) => Ok(d),
            Some(other) => {
                self.buffers.insert(handle, other);
                Err(SubstrateError::ElementKind {
                    handle,
                    expected: ElementKind::F32,
                    actual: ElementKind::U32,
                })
            }
            None => Err(SubstrateError::MissingBuffer(handle)),
        }
    }

    /// Detach an output buffer, let `f` fill it while inputs stay borrowed,
    /// then put it back whatever the outcome.
    fn with_output<F>(
        &mut self,
        handle: BufferHandle,
        required: usize,
        f: F,
    ) -> Result<(), SubstrateError>
    where
        F: FnOnce(&Self, &mut [f32]) -> Result<(), SubstrateError>,
    {
        let mut out = self.take_f32(handle)?;
        let result = if out.len() < required {
            Err(SubstrateError::TooSmall {
                handle,
                required,
                actual: out.len(),
            })
        } else {
            f(self, &mut out[..required])
        };
        self.buffers.insert(handle, HostBuffer::F32(out));
        result
    }

    fn point_forces(&mut self, a: PointForcesArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.point_forces, 2 * n, |this, out| {
            let pos = this.f32s(a.input_positions, 2 * n)?;
            let deg = this.u32s(a.point_degrees, n)?;
            let center = math::center(a.width, a.height);

            out.par_chunks_mut(2).enumerate().for_each(|(i, f)| {
                let pi = math::load(pos, i);
                let mi = math::mass(deg[i]);
                let (tiles, weight) = math::active_tiles(
                    n,
                    a.tile_size as usize,
                    a.tiles_per_iteration as usize,
                    a.step_number,
                );
                let mut acc: Vec2 = [0.0, 0.0];
                for tile in tiles {
                    for j in tile {
                        if j == i {
                            continue;
                        }
                        let push = math::repulsion(
                            pi,
                            math::load(pos, j),
                            mi,
                            math::mass(deg[j]),
                            i as u32,
                            j as u32,
                            a.scaling_ratio,
                            a.prevent_overlap,
                            a.min_distance,
                        );
                        acc = math::add(acc, push);
                    }
                }
                let acc = math::add(
                    math::scale(acc, weight),
                    math::gravity(pi, center, mi, a.gravity, a.strong_gravity),
                );
                f.copy_from_slice(&acc);
            });
            Ok(())
        })
    }

    fn edge_forces(&mut self, a: EdgeForcesArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.output_forces, 2 * n, |this, out| {
            let partial = this.f32s(a.partial_forces, 2 * n)?;
            out.copy_from_slice(&partial[..2 * n]);

            let pos = this.f32s(a.input_points, 2 * n)?;
            let deg = this.u32s(a.point_degrees, n)?;
            let sums = this.attraction_sums(
                a.edges,
                a.weights,
                a.work_list,
                a.num_work_items as usize,
                n,
                |ps, pt, src, weight| {
                    math::attraction(
                        ps,
                        pt,
                        math::mass(deg[src]),
                        weight,
                        a.edge_influence,
                        a.flags,
                        a.min_distance,
                    )
                },
                pos,
            )?;
            for (src, f) in sums {
                out[2 * src] += f[0];
                out[2 * src + 1] += f[1];
            }
            Ok(())
        })
    }

    /// Sum the attraction of every work item onto its source node.
    ///
    /// Work items own distinct source nodes, so the results can be added
    /// into the output without conflicts.
    #[allow(clippy::too_many_arguments)]
    fn attraction_sums<F>(
        &self,
        edges: BufferHandle,
        weights: BufferHandle,
        work_list: BufferHandle,
        num_work_items: usize,
        num_points: usize,
        force: F,
        pos: &[f32],
    ) -> Result<Vec<(usize, Vec2)>, SubstrateError>
    where
        F: Fn(Vec2, Vec2, usize, f32) -> Vec2 + Sync,
    {
        let work = self.u32s(work_list, 2 * num_work_items)?;
        let edge_list = self.u32s(edges, 0)?;
        let weight_list = self.f32s(weights, 0)?;
        let num_edges = weight_list.len().min(edge_list.len() / 2);

        (0..num_work_items)
            .into_par_iter()
            .map(|w| {
                let first = work[2 * w] as usize;
                let end = first + work[2 * w + 1] as usize;
                if end > num_edges {
                    return Err(SubstrateError::OutOfBounds {
                        handle: edges,
                        index: end,
                        len: num_edges,
                    });
                }
                let src = edge_list[2 * first] as usize;
                if src >= num_points {
                    return Err(SubstrateError::OutOfBounds {
                        handle: edges,
                        index: src,
                        len: num_points,
                    });
                }
                let ps = math::load(pos, src);
                let mut acc: Vec2 = [0.0, 0.0];
                for e in first..end {
                    let dst = edge_list[2 * e + 1] as usize;
                    if dst >= num_points {
                        return Err(SubstrateError::OutOfBounds {
                            handle: edges,
                            index: dst,
                            len: num_points,
                        });
                    }
                    acc = math::add(acc, force(ps, math::load(pos, dst), src, weight_list[e]));
                }
                Ok((src, acc))
            })
            .collect()
    }

    fn swings_tractions(&mut self, a: SwingsTractionsArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        let mut tractions = self.take_f32(a.tractions)?;
        let result = if tractions.len() < n {
            Err(SubstrateError::TooSmall {
                handle: a.tractions,
                required: n,
                actual: tractions.len(),
            })
        } else {
            self.with_output(a.swings, n, |this, swings| {
                let prev = this.f32s(a.prev_forces, 2 * n)?;
                let cur = this.f32s(a.cur_forces, 2 * n)?;
                swings
                    .par_iter_mut()
                    .zip(tractions[..n].par_iter_mut())
                    .enumerate()
                    .for_each(|(i, (swing, traction))| {
                        (*swing, *traction) =
                            math::swing_traction(math::load(prev, i), math::load(cur, i));
                    });
                Ok(())
            })
        };
        self.buffers.insert(a.tractions, HostBuffer::F32(tractions));
        result
    }

    fn integrate(&mut self, a: IntegrateArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.output_positions, 2 * n, |this, out| {
            let pos = this.f32s(a.input_positions, 2 * n)?;
            let forces = this.f32s(a.cur_forces, 2 * n)?;
            let swings = this.f32s(a.swings, n)?;
            out.par_chunks_mut(2).enumerate().for_each(|(i, p)| {
                let next = math::fixed_step(
                    math::load(pos, i),
                    math::load(forces, i),
                    swings[i],
                    a.g_speed,
                    a.max_step,
                );
                p.copy_from_slice(&next);
            });
            Ok(())
        })
    }

    fn integrate2(&mut self, a: Integrate2Args) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.output_positions, 2 * n, |this, out| {
            let pos = this.f32s(a.input_positions, 2 * n)?;
            let deg = this.u32s(a.point_degrees, n)?;
            let forces = this.f32s(a.cur_forces, 2 * n)?;
            let swings = this.f32s(a.swings, n)?;
            // Tractions only feed the global speed, which arrives in g_speed
            this.f32s(a.tractions, n)?;
            out.par_chunks_mut(2).enumerate().for_each(|(i, p)| {
                let next = math::adaptive_step(
                    math::load(pos, i),
                    math::load(forces, i),
                    swings[i],
                    math::mass(deg[i]),
                    a.g_speed,
                    a.max_step,
                );
                p.copy_from_slice(&next);
            });
            Ok(())
        })
    }

    fn legacy_points(&mut self, a: LegacyPointsArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.output_positions, 2 * n, |this, out| {
            let pos = this.f32s(a.input_positions, 2 * n)?;
            let deg = this.u32s(a.point_degrees, n)?;
            let center = math::center(a.width, a.height);
            let kr = a.scaling_ratio * math::LEGACY_REPULSION;
            let kg = a.gravity * math::LEGACY_GRAVITY;

            out.par_chunks_mut(2).enumerate().for_each(|(i, p)| {
                let pi = math::load(pos, i);
                let mi = math::mass(deg[i]);
                let (tiles, _) = math::active_tiles(n, a.tile_size as usize, 1, a.step_number);
                let mut acc: Vec2 = [0.0, 0.0];
                for tile in tiles {
                    for j in tile.filter(|&j| j != i) {
                        acc = math::add(
                            acc,
                            math::repulsion(
                                pi,
                                math::load(pos, j),
                                mi,
                                math::mass(deg[j]),
                                i as u32,
                                j as u32,
                                kr,
                                false,
                                a.min_distance,
                            ),
                        );
                    }
                }
                let delta = math::add(acc, math::gravity(pi, center, 1.0, kg, true));
                p.copy_from_slice(&math::add(pi, math::scale(delta, a.alpha)));
            });
            Ok(())
        })
    }

    fn legacy_edges(&mut self, a: LegacyEdgesArgs) -> Result<(), SubstrateError> {
        let n = a.num_points as usize;
        self.with_output(a.output_points, 2 * n, |this, out| {
            let pos = this.f32s(a.input_points, 2 * n)?;
            out.copy_from_slice(&pos[..2 * n]);

            let sums = this.attraction_sums(
                a.edges,
                a.weights,
                a.work_list,
                a.num_work_items as usize,
                n,
                |ps, pt, _, weight| {
                    math::attraction(
                        ps,
                        pt,
                        1.0,
                        weight,
                        a.edge_influence,
                        EdgeFlags::empty(),
                        a.min_distance,
                    )
                },
                pos,
            )?;
            let k = a.alpha * math::LEGACY_SPRING;
            for (src, f) in sums {
                out[2 * src] += f[0] * k;
                out[2 * src + 1] += f[1] * k;
            }
            Ok(())
        })
    }
}

fn check_len<T>(handle: BufferHandle, data: &[T], required: usize) -> Result<&[T], SubstrateError> {
    if data.len() < required {
        Err(SubstrateError::TooSmall {
            handle,
            required,
            actual: data.len(),
        })
    } else {
        Ok(data)
    }
}

impl ComputeSubstrate for CpuSubstrate {
    fn name(&self) -> &str {
        "cpu"
    }

    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        desc: BufferDesc,
    ) -> Result<(), SubstrateError> {
        self.buffers
            .insert(handle, HostBuffer::zeroed(desc.kind, desc.len));
        Ok(())
    }

    fn release_buffer(&mut self, handle: BufferHandle) {
        self.buffers.remove(&handle);
    }

    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        data: BufferData<'_>,
    ) -> Result<(), SubstrateError> {
        let buffer = self
            .buffers
            .get_mut(&handle)
            .ok_or(SubstrateError::MissingBuffer(handle))?;
        if buffer.len() < data.len() {
            return Err(SubstrateError::TooSmall {
                handle,
                required: data.len(),
                actual: buffer.len(),
            });
        }
        match (buffer, data) {
            (HostBuffer::F32(dst), BufferData::F32(src)) => dst[..src.len()].copy_from_slice(src),
            (HostBuffer::U32(dst), BufferData::U32(src)) => dst[..src.len()].copy_from_slice(src),
            (buffer, data) => {
                return Err(SubstrateError::ElementKind {
                    handle,
                    expected: buffer.kind(),
                    actual: data.kind(),
                });
            }
        }
        Ok(())
    }

    fn read_buffer(&mut self, handle: BufferHandle) -> Result<HostBuffer, SubstrateError> {
        self.buffer(handle).cloned()
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> Result<Completion, SubstrateError> {
        let data = self.buffer(src)?.clone();
        let target = self.buffer(dst)?;
        if target.kind() != data.kind() {
            return Err(SubstrateError::ElementKind {
                handle: dst,
                expected: target.kind(),
                actual: data.kind(),
            });
        }
        if target.len() < data.len() {
            return Err(SubstrateError::TooSmall {
                handle: dst,
                required: data.len(),
                actual: target.len(),
            });
        }
        match &data {
            HostBuffer::F32(d) => self.write_buffer(dst, BufferData::F32(d))?,
            HostBuffer::U32(d) => self.write_buffer(dst, BufferData::U32(d))?,
        }
        self.submitted += 1;
        Ok(Completion::new("copy", self.submitted))
    }

    fn declare_kernel(&mut self, decl: &KernelDecl) -> Result<(), SubstrateError> {
        self.declared.insert(decl.name);
        Ok(())
    }

    fn execute(&mut self, launch: Launch<'_>) -> Result<Completion, SubstrateError> {
        if !self.declared.contains(&launch.kernel) {
            return Err(SubstrateError::UndeclaredKernel(launch.kernel));
        }
        if launch.args.kernel() != launch.kernel {
            return Err(SubstrateError::ArgumentMismatch {
                kernel: launch.kernel,
                args: launch.args.kernel(),
            });
        }
        if let Some(missing) = launch
            .resources
            .iter()
            .find(|h| !self.buffers.contains_key(h))
        {
            return Err(SubstrateError::MissingBuffer(*missing));
        }

        match *launch.args {
            KernelArgs::PointForces(a) => self.point_forces(a)?,
            KernelArgs::EdgeForces(a) => self.edge_forces(a)?,
            KernelArgs::SwingsTractions(a) => self.swings_tractions(a)?,
            KernelArgs::Integrate(a) => self.integrate(a)?,
            KernelArgs::Integrate2(a) => self.integrate2(a)?,
            KernelArgs::LegacyPoints(a) => self.legacy_points(a)?,
            KernelArgs::LegacyEdges(a) => self.legacy_edges(a)?,
        }

        self.submitted += 1;
        Ok(Completion::new(launch.kernel.as_str(), self.submitted))
    }

    fn wait(&mut self, completion: Completion) -> Result<(), SubstrateError> {
        if completion.ticket() > self.submitted {
            return Err(SubstrateError::Device(format!(
                "completion {} for {} was never submitted",
                completion.ticket(),
                completion.label()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{FA_EDGE_FORCES, FA_POINT_FORCES, FA_SWINGS_TRACTIONS, Kernel};

    fn buffer(cpu: &mut CpuSubstrate, id: u32, data: BufferData<'_>) -> BufferHandle {
        let handle = BufferHandle(id);
        cpu.create_buffer(
            handle,
            BufferDesc {
                label: "test",
                kind: data.kind(),
                len: data.len(),
            },
        )
        .unwrap();
        cpu.write_buffer(handle, data).unwrap();
        handle
    }

    #[test]
    fn undeclared_kernels_are_rejected() {
        let mut cpu = CpuSubstrate::new();
        let args = KernelArgs::SwingsTractions(SwingsTractionsArgs {
            num_points: 0,
            prev_forces: BufferHandle(0),
            cur_forces: BufferHandle(1),
            swings: BufferHandle(2),
            tractions: BufferHandle(3),
        });
        let err = cpu
            .execute(Launch {
                kernel: KernelName::FaSwingsTractions,
                args: &args,
                global_work_size: 0,
                resources: &[],
            })
            .unwrap_err();
        assert!(matches!(err, SubstrateError::UndeclaredKernel(_)));
    }

    #[test]
    fn swings_and_tractions_per_node() {
        let mut cpu = CpuSubstrate::new();
        let prev = buffer(&mut cpu, 0, BufferData::F32(&[1.0, 0.0, 0.0, 2.0]));
        let cur = buffer(&mut cpu, 1, BufferData::F32(&[-1.0, 0.0, 0.0, 2.0]));
        let swings = buffer(&mut cpu, 2, BufferData::F32(&[0.0; 2]));
        let tractions = buffer(&mut cpu, 3, BufferData::F32(&[0.0; 2]));

        let kernel = Kernel::declare(&mut cpu, &FA_SWINGS_TRACTIONS).unwrap();
        kernel
            .exec(
                &mut cpu,
                SwingsTractionsArgs {
                    num_points: 2,
                    prev_forces: prev,
                    cur_forces: cur,
                    swings,
                    tractions,
                },
                2,
            )
            .unwrap();

        assert_eq!(cpu.read_f32(swings).unwrap(), vec![2.0, 0.0]);
        assert_eq!(cpu.read_f32(tractions).unwrap(), vec![0.0, 2.0]);
    }

    #[test]
    fn point_forces_push_pairs_apart() {
        let mut cpu = CpuSubstrate::new();
        let pos = buffer(&mut cpu, 0, BufferData::F32(&[0.0, 0.5, 1.0, 0.5]));
        let deg = buffer(&mut cpu, 1, BufferData::U32(&[0, 0]));
        let out = buffer(&mut cpu, 2, BufferData::F32(&[0.0; 4]));

        let kernel = Kernel::declare(&mut cpu, &FA_POINT_FORCES).unwrap();
        kernel
            .exec(
                &mut cpu,
                PointForcesArgs {
                    prevent_overlap: false,
                    strong_gravity: false,
                    scaling_ratio: 1.0,
                    gravity: 0.0,
                    num_points: 2,
                    tile_size: 256,
                    tiles_per_iteration: 1,
                    min_distance: 0.01,
                    width: 1.0,
                    height: 1.0,
                    step_number: 0,
                    input_positions: pos,
                    point_degrees: deg,
                    point_forces: out,
                },
                2,
            )
            .unwrap();

        let f = cpu.read_f32(out).unwrap();
        assert_eq!(f, vec![-1.0, 0.0, 1.0, 0.0]);
    }

    fn tiled_point_forces(tile_size: u32, tiles_per_iteration: u32, step_number: u32) -> Vec<f32> {
        let mut cpu = CpuSubstrate::new();
        let pos = buffer(
            &mut cpu,
            0,
            BufferData::F32(&[0.1, 0.2, 0.9, 0.3, 0.4, 0.8, 0.6, 0.5]),
        );
        let deg = buffer(&mut cpu, 1, BufferData::U32(&[1, 2, 0, 3]));
        let out = buffer(&mut cpu, 2, BufferData::F32(&[0.0; 8]));

        let kernel = Kernel::declare(&mut cpu, &FA_POINT_FORCES).unwrap();
        kernel
            .exec(
                &mut cpu,
                PointForcesArgs {
                    prevent_overlap: false,
                    strong_gravity: false,
                    scaling_ratio: 1.0,
                    gravity: 1.0,
                    num_points: 4,
                    tile_size,
                    tiles_per_iteration,
                    min_distance: 0.01,
                    width: 1.0,
                    height: 1.0,
                    step_number,
                    input_positions: pos,
                    point_degrees: deg,
                    point_forces: out,
                },
                4,
            )
            .unwrap();
        cpu.read_f32(out).unwrap()
    }

    #[test]
    fn rotating_tiles_average_to_the_full_pass() {
        let full = tiled_point_forces(2, 1, 0);
        let even = tiled_point_forces(2, 2, 0);
        let odd = tiled_point_forces(2, 2, 1);

        assert_ne!(even, full);
        assert_ne!(odd, full);
        for i in 0..full.len() {
            let mean = (even[i] + odd[i]) / 2.0;
            assert!(
                (mean - full[i]).abs() < 1e-4 * full[i].abs().max(1.0),
                "component {i}: {mean} vs {}",
                full[i]
            );
        }
        // One tile per step and the phase wraps around
        assert_eq!(tiled_point_forces(2, 2, 2), even);
        assert_eq!(tiled_point_forces(2, 1, 0), tiled_point_forces(256, 1, 0));
    }

    #[test]
    fn edge_forces_accumulate_on_top_of_partial() {
        let mut cpu = CpuSubstrate::new();
        // 0 -> 1, 0 -> 2; node 1 has no outgoing edges
        let edges = buffer(&mut cpu, 0, BufferData::U32(&[0, 1, 0, 2]));
        let weights = buffer(&mut cpu, 1, BufferData::F32(&[1.0, 1.0]));
        let work = buffer(&mut cpu, 2, BufferData::U32(&[0, 2]));
        let pos = buffer(
            &mut cpu,
            3,
            BufferData::F32(&[0.0, 0.0, 1.0, 0.0, 0.0, 2.0]),
        );
        let deg = buffer(&mut cpu, 4, BufferData::U32(&[2, 1, 1]));
        let partial = buffer(&mut cpu, 5, BufferData::F32(&[0.5, 0.5, 7.0, 7.0, 0.0, 0.0]));
        let out = buffer(&mut cpu, 6, BufferData::F32(&[0.0; 6]));

        let kernel = Kernel::declare(&mut cpu, &FA_EDGE_FORCES).unwrap();
        kernel
            .exec(
                &mut cpu,
                EdgeForcesArgs {
                    edge_influence: 0,
                    flags: EdgeFlags::empty(),
                    min_distance: 0.01,
                    num_points: 3,
                    num_work_items: 1,
                    step_number: 0,
                    edges,
                    weights,
                    work_list: work,
                    input_points: pos,
                    point_degrees: deg,
                    partial_forces: partial,
                    output_forces: out,
                },
                1,
            )
            .unwrap();

        assert_eq!(
            cpu.read_f32(out).unwrap(),
            vec![1.5, 2.5, 7.0, 7.0, 0.0, 0.0]
        );
    }

    #[test]
    fn out_of_range_work_items_fail_cleanly() {
        let mut cpu = CpuSubstrate::new();
        let edges = buffer(&mut cpu, 0, BufferData::U32(&[0, 1]));
        let weights = buffer(&mut cpu, 1, BufferData::F32(&[1.0]));
        let work = buffer(&mut cpu, 2, BufferData::U32(&[0, 5]));
        let pos = buffer(&mut cpu, 3, BufferData::F32(&[0.0; 4]));
        let deg = buffer(&mut cpu, 4, BufferData::U32(&[1, 1]));
        let partial = buffer(&mut cpu, 5, BufferData::F32(&[0.0; 4]));
        let out = buffer(&mut cpu, 6, BufferData::F32(&[0.0; 4]));

        let kernel = Kernel::declare(&mut cpu, &FA_EDGE_FORCES).unwrap();
        let err = kernel
            .exec(
                &mut cpu,
                EdgeForcesArgs {
                    edge_influence: 0,
                    flags: EdgeFlags::empty(),
                    min_distance: 0.01,
                    num_points: 2,
                    num_work_items: 1,
                    step_number: 0,
                    edges,
                    weights,
                    work_list: work,
                    input_points: pos,
                    point_degrees: deg,
                    partial_forces: partial,
                    output_forces: out,
                },
                1,
            )
            .unwrap_err();

        assert!(matches!(err, SubstrateError::OutOfBounds { .. }));
        // Output buffer is still owned by the substrate
        assert_eq!(cpu.read_f32(out).unwrap().len(), 4);
    }
}
