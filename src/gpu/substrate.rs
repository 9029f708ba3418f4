//! wgpu compute substrate
//!
//! Buffers live in device storage, each declared kernel becomes a compute
//! pipeline with an explicit bind group layout, and completions are wgpu
//! submission indices.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use wgpu::util::DeviceExt;

use super::shaders;
use super::types::{KernelParams, WORKGROUP_SIZE};
use crate::buffers::{BufferHandle, ElementKind};
use crate::error::SubstrateError;
use crate::kernels::{ArgType, KernelArgs, KernelDecl, KernelName};
use crate::substrate::{BufferData, BufferDesc, ComputeSubstrate, Completion, HostBuffer, Launch};

/// Smallest buffer wgpu accepts as a storage binding
const MIN_BUFFER_SIZE: u64 = 16;

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    kind: ElementKind,
    len: usize,
}

impl DeviceBuffer {
    fn byte_len(&self) -> u64 {
        (self.len * self.kind.size()) as u64
    }
}

struct Pipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Compute substrate running the layout kernels as WGSL compute shaders
pub struct GpuSubstrate {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: HashMap<BufferHandle, DeviceBuffer>,
    pipelines: HashMap<KernelName, Pipeline>,
    submissions: HashMap<u64, wgpu::SubmissionIndex>,
    next_ticket: u64,
}

impl std::fmt::Debug for GpuSubstrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSubstrate")
            .field("buffers", &self.buffers.len())
            .field("pipelines", &self.pipelines.len())
            .field("pending", &self.submissions.len())
            .finish()
    }
}

impl GpuSubstrate {
    /// Open the default high-performance adapter
    pub fn new() -> Result<Self, SubstrateError> {
        let (device, queue) = pollster::block_on(Self::create_device())?;
        Ok(Self::with_device(Arc::new(device), Arc::new(queue)))
    }

    /// Use an existing device and queue
    pub fn with_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            submissions: HashMap::new(),
            next_ticket: 0,
        }
    }

    async fn create_device() -> Result<(wgpu::Device, wgpu::Queue), SubstrateError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| SubstrateError::Device("no suitable GPU adapter".to_string()))?;

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| SubstrateError::Device(e.to_string()))
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&DeviceBuffer, SubstrateError> {
        self.buffers
            .get(&handle)
            .ok_or(SubstrateError::MissingBuffer(handle))
    }

    fn submit(&mut self, label: &'static str, encoder: wgpu::CommandEncoder) -> Completion {
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.next_ticket += 1;
        self.submissions.insert(self.next_ticket, index);
        Completion::new(label, self.next_ticket)
    }

    /// Run `f` inside a validation error scope and report what it caught
    fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, SubstrateError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(SubstrateError::Device(err.to_string())),
            None => Ok(value),
        }
    }

    /// Copy the first `bytes` of `src` into `dst` inside `encoder`
    fn encode_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> Result<(), SubstrateError> {
        let from = self.buffer(src)?;
        let to = self.buffer(dst)?;
        if from.kind != to.kind {
            return Err(SubstrateError::ElementKind {
                handle: dst,
                expected: to.kind,
                actual: from.kind,
            });
        }
        if from.len > to.len {
            return Err(SubstrateError::TooSmall {
                handle: dst,
                required: from.len,
                actual: to.len,
            });
        }
        if from.len > 0 {
            encoder.copy_buffer_to_buffer(&from.buffer, 0, &to.buffer, 0, from.byte_len());
        }
        Ok(())
    }
}

/// Buffer a kernel expects to be pre-filled before its dispatch
fn seed_copy(args: &KernelArgs) -> Option<(BufferHandle, BufferHandle)> {
    match args {
        KernelArgs::EdgeForces(a) => Some((a.partial_forces, a.output_forces)),
        KernelArgs::LegacyEdges(a) => Some((a.input_points, a.output_points)),
        _ => None,
    }
}

fn bind_group_layout(device: &wgpu::Device, decl: &KernelDecl) -> wgpu::BindGroupLayout {
    let buffers = decl
        .args
        .iter()
        .filter(|a| a.ty == ArgType::Buffer)
        .count();
    let first_output = buffers - shaders::output_count(decl.name);

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    entries.extend((0..buffers).map(|i| wgpu::BindGroupLayoutEntry {
        binding: i as u32 + 1,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage {
                read_only: i < first_output,
            },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }));

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(decl.name.as_str()),
        entries: &entries,
    })
}

impl ComputeSubstrate for GpuSubstrate {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        desc: BufferDesc,
    ) -> Result<(), SubstrateError> {
        let size = ((desc.len * desc.kind.size()) as u64).max(MIN_BUFFER_SIZE);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        self.buffers.insert(
            handle,
            DeviceBuffer {
                buffer,
                kind: desc.kind,
                len: desc.len,
            },
        );
        Ok(())
    }

    fn release_buffer(&mut self, handle: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&handle) {
            buf.buffer.destroy();
        }
    }

    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        data: BufferData<'_>,
    ) -> Result<(), SubstrateError> {
        let buf = self.buffer(handle)?;
        if buf.kind != data.kind() {
            return Err(SubstrateError::ElementKind {
                handle,
                expected: buf.kind,
                actual: data.kind(),
            });
        }
        if buf.len < data.len() {
            return Err(SubstrateError::TooSmall {
                handle,
                required: data.len(),
                actual: buf.len,
            });
        }
        let bytes: &[u8] = match data {
            BufferData::F32(d) => bytemuck::cast_slice(d),
            BufferData::U32(d) => bytemuck::cast_slice(d),
        };
        if !bytes.is_empty() {
            self.queue.write_buffer(&buf.buffer, 0, bytes);
        }
        Ok(())
    }

    fn read_buffer(&mut self, handle: BufferHandle) -> Result<HostBuffer, SubstrateError> {
        let buf = self.buffer(handle)?;
        if buf.len == 0 {
            return Ok(HostBuffer::zeroed(buf.kind, 0));
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: buf.byte_len(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&buf.buffer, 0, &staging, 0, buf.byte_len());
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| SubstrateError::Device(e.to_string()))?
            .map_err(|e| SubstrateError::Device(e.to_string()))?;

        let data = slice.get_mapped_range();
        let out = match buf.kind {
            ElementKind::F32 => HostBuffer::F32(bytemuck::cast_slice(&data).to_vec()),
            ElementKind::U32 => HostBuffer::U32(bytemuck::cast_slice(&data).to_vec()),
        };
        drop(data);
        staging.unmap();
        Ok(out)
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> Result<Completion, SubstrateError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Copy Encoder"),
            });
        self.encode_copy(&mut encoder, src, dst)?;
        Ok(self.submit("copy", encoder))
    }

    fn declare_kernel(&mut self, decl: &KernelDecl) -> Result<(), SubstrateError> {
        if self.pipelines.contains_key(&decl.name) {
            return Ok(());
        }
        debug!(kernel = %decl.name, "compiling compute pipeline");
        let source = shaders::source(decl.name);
        let pipeline = self.validated(|device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(decl.name.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            let layout = bind_group_layout(device, decl);
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(decl.name.as_str()),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(decl.name.as_str()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(shaders::entry_point(decl.name)),
                compilation_options: Default::default(),
                cache: None,
            });
            Pipeline { pipeline, layout }
        })?;
        self.pipelines.insert(decl.name, pipeline);
        Ok(())
    }

    fn execute(&mut self, launch: Launch<'_>) -> Result<Completion, SubstrateError> {
        let pipeline = self
            .pipelines
            .get(&launch.kernel)
            .ok_or(SubstrateError::UndeclaredKernel(launch.kernel))?;
        if launch.args.kernel() != launch.kernel {
            return Err(SubstrateError::ArgumentMismatch {
                kernel: launch.kernel,
                args: launch.args.kernel(),
            });
        }
        let resources = launch
            .resources
            .iter()
            .map(|h| self.buffer(*h).map(|b| &b.buffer))
            .collect::<Result<Vec<_>, _>>()?;

        let params = KernelParams::from(launch.args);
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Kernel Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform.as_entire_binding(),
        }];
        entries.extend(resources.iter().enumerate().map(|(i, buffer)| {
            wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: buffer.as_entire_binding(),
            }
        }));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(launch.kernel.as_str()),
            });
        if let Some((src, dst)) = seed_copy(launch.args) {
            self.encode_copy(&mut encoder, src, dst)?;
        }

        let workgroups = (launch.global_work_size as u32).div_ceil(WORKGROUP_SIZE);
        self.validated(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(launch.kernel.as_str()),
                layout: &pipeline.layout,
                entries: &entries,
            });
            if workgroups > 0 {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(launch.kernel.as_str()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }
        })?;

        Ok(self.submit(launch.kernel.as_str(), encoder))
    }

    fn wait(&mut self, completion: Completion) -> Result<(), SubstrateError> {
        let index = self.submissions.remove(&completion.ticket()).ok_or_else(|| {
            SubstrateError::Device(format!(
                "completion {} for {} is unknown or already waited on",
                completion.ticket(),
                completion.label()
            ))
        })?;
        let _ = self
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        Ok(())
    }
}
