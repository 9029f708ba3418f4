//! Compute substrate contract
//!
//! The layout engine never computes forces itself. It declares named kernels,
//! fills in their typed arguments, and asks a substrate to execute them over a
//! global work size. A substrate owns the storage behind every
//! [`BufferHandle`] and signals pass completion through a [`Completion`] token
//! that the engine waits on before issuing the next pass.
//!
//! Two substrates ship with the crate: [`crate::cpu::CpuSubstrate`] (rayon on
//! the host) and, with the `gpu` feature, `crate::gpu::GpuSubstrate` (wgpu
//! compute shaders).

use crate::buffers::{BufferHandle, ElementKind};
use crate::error::SubstrateError;
use crate::kernels::{KernelArgs, KernelDecl, KernelName};

/// Shape of a buffer to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label
    pub label: &'static str,
    /// Element type
    pub kind: ElementKind,
    /// Number of scalars
    pub len: usize,
}

/// Borrowed host data to upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferData<'a> {
    F32(&'a [f32]),
    U32(&'a [u32]),
}

impl BufferData<'_> {
    pub fn kind(&self) -> ElementKind {
        match self {
            BufferData::F32(_) => ElementKind::F32,
            BufferData::U32(_) => ElementKind::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BufferData::F32(d) => d.len(),
            BufferData::U32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned host copy of a buffer
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    F32(Vec<f32>),
    U32(Vec<u32>),
}

impl HostBuffer {
    /// Zero-filled buffer of the given shape
    pub fn zeroed(kind: ElementKind, len: usize) -> Self {
        match kind {
            ElementKind::F32 => HostBuffer::F32(vec![0.0; len]),
            ElementKind::U32 => HostBuffer::U32(vec![0; len]),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            HostBuffer::F32(_) => ElementKind::F32,
            HostBuffer::U32(_) => ElementKind::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostBuffer::F32(d) => d.len(),
            HostBuffer::U32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the contents as `f32`, failing on a type mismatch
    pub fn into_f32(self, handle: BufferHandle) -> Result<Vec<f32>, SubstrateError> {
        match self {
            HostBuffer::F32(d) => Ok(d),
            HostBuffer::U32(_) => Err(SubstrateError::ElementKind {
                handle,
                expected: ElementKind::F32,
                actual: ElementKind::U32,
            }),
        }
    }

    /// Take the contents as `u32`, failing on a type mismatch
    pub fn into_u32(self, handle: BufferHandle) -> Result<Vec<u32>, SubstrateError> {
        match self {
            HostBuffer::U32(d) => Ok(d),
            HostBuffer::F32(_) => Err(SubstrateError::ElementKind {
                handle,
                expected: ElementKind::U32,
                actual: ElementKind::F32,
            }),
        }
    }
}

/// One kernel launch
#[derive(Debug, Clone, Copy)]
pub struct Launch<'a> {
    /// Kernel to run
    pub kernel: KernelName,
    /// Typed argument values
    pub args: &'a KernelArgs,
    /// Number of parallel units (nodes or work items)
    pub global_work_size: usize,
    /// Buffers the launch reads or writes; all must exist before it runs
    pub resources: &'a [BufferHandle],
}

/// Completion signal for submitted work
#[must_use = "a completion must be waited on before reading the written buffers"]
#[derive(Debug, PartialEq, Eq)]
pub struct Completion {
    pub(crate) label: &'static str,
    pub(crate) ticket: u64,
}

impl Completion {
    /// Create a completion for submission number `ticket`
    pub fn new(label: &'static str, ticket: u64) -> Self {
        Self { label, ticket }
    }

    /// What the completion belongs to (kernel name or "copy")
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Monotonic submission number within a substrate
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// A compute backend able to run the layout kernels
pub trait ComputeSubstrate {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Create a zero-initialized buffer under `handle`
    fn create_buffer(&mut self, handle: BufferHandle, desc: BufferDesc)
    -> Result<(), SubstrateError>;

    /// Drop the storage behind `handle`; unknown handles are ignored
    fn release_buffer(&mut self, handle: BufferHandle);

    /// Overwrite the start of a buffer with host data
    fn write_buffer(&mut self, handle: BufferHandle, data: BufferData<'_>)
    -> Result<(), SubstrateError>;

    /// Read a whole buffer back to the host
    fn read_buffer(&mut self, handle: BufferHandle) -> Result<HostBuffer, SubstrateError>;

    /// Copy `src` into `dst` on the device
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> Result<Completion, SubstrateError>;

    /// Make a kernel available for execution
    fn declare_kernel(&mut self, decl: &KernelDecl) -> Result<(), SubstrateError>;

    /// Submit a kernel launch
    fn execute(&mut self, launch: Launch<'_>) -> Result<Completion, SubstrateError>;

    /// Block until the submitted work behind `completion` has finished
    fn wait(&mut self, completion: Completion) -> Result<(), SubstrateError>;

    /// Read a buffer as `f32` scalars
    fn read_f32(&mut self, handle: BufferHandle) -> Result<Vec<f32>, SubstrateError> {
        self.read_buffer(handle)?.into_f32(handle)
    }

    /// Read a buffer as `u32` scalars
    fn read_u32(&mut self, handle: BufferHandle) -> Result<Vec<u32>, SubstrateError> {
        self.read_buffer(handle)?.into_u32(handle)
    }
}

impl<S: ComputeSubstrate + ?Sized> ComputeSubstrate for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create_buffer(
        &mut self,
        handle: BufferHandle,
        desc: BufferDesc,
    ) -> Result<(), SubstrateError> {
        (**self).create_buffer(handle, desc)
    }

    fn release_buffer(&mut self, handle: BufferHandle) {
        (**self).release_buffer(handle)
    }

    fn write_buffer(
        &mut self,
        handle: BufferHandle,
        data: BufferData<'_>,
    ) -> Result<(), SubstrateError> {
        (**self).write_buffer(handle, data)
    }

    fn read_buffer(&mut self, handle: BufferHandle) -> Result<HostBuffer, SubstrateError> {
        (**self).read_buffer(handle)
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
    ) -> Result<Completion, SubstrateError> {
        (**self).copy_buffer(src, dst)
    }

    fn declare_kernel(&mut self, decl: &KernelDecl) -> Result<(), SubstrateError> {
        (**self).declare_kernel(decl)
    }

    fn execute(&mut self, launch: Launch<'_>) -> Result<Completion, SubstrateError> {
        (**self).execute(launch)
    }

    fn wait(&mut self, completion: Completion) -> Result<(), SubstrateError> {
        (**self).wait(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_buffer_type_checks() {
        let handle = BufferHandle(7);
        let buf = HostBuffer::zeroed(ElementKind::U32, 3);
        assert_eq!(buf.len(), 3);
        assert!(matches!(
            buf.clone().into_f32(handle),
            Err(SubstrateError::ElementKind { .. })
        ));
        assert_eq!(buf.into_u32(handle).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn buffer_data_reports_shape() {
        let data = [1.0_f32, 2.0];
        let view = BufferData::F32(&data);
        assert_eq!(view.kind(), ElementKind::F32);
        assert_eq!(view.len(), 2);
        assert!(!view.is_empty());
    }
}
