//! Named buffer registry with version counters
//!
//! Every numeric array the engine works with (positions, degrees, forces,
//! swings, tractions, edge lists, work items) is registered here under a
//! [`BufferName`]. The registry maps each logical name to the physical
//! [`BufferHandle`] the substrate stores the data under, and tracks a write
//! counter per name so downstream readers can detect fresh data.
//!
//! Double-buffered quantities (points and forces) are two logical names whose
//! handles are exchanged by [`BufferRegistry::swap`], so "next" data becomes
//! "current" without a device copy.

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::error::{LayoutError, LayoutResult};
use crate::substrate::{BufferData, BufferDesc, ComputeSubstrate, HostBuffer};

/// Element type stored in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    U32,
}

impl ElementKind {
    /// Size of one element in bytes
    pub const fn size(self) -> usize {
        4
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::F32 => f.write_str("f32"),
            ElementKind::U32 => f.write_str("u32"),
        }
    }
}

/// Physical buffer slot inside a substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Logical buffers owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferName {
    /// Positions read during a step (x, y per node)
    CurPoints,
    /// Positions written during a step
    NextPoints,
    /// Combined degree per node
    Degrees,
    /// Out-degree per node
    ForwardsDegrees,
    /// In-degree per node
    BackwardsDegrees,
    /// Source/target pairs ordered by source
    ForwardsEdges,
    /// Target/source pairs ordered by target
    BackwardsEdges,
    ForwardsWeights,
    BackwardsWeights,
    /// (first edge, edge count) per work item, forward direction
    ForwardsWorkItems,
    /// (first edge, edge count) per work item, backward direction
    BackwardsWorkItems,
    /// Point pass output
    PartialForces1,
    /// Forward edge pass output
    PartialForces2,
    /// Final force of the current step
    CurForces,
    /// Final force of the previous step
    PrevForces,
    Swings,
    Tractions,
}

impl BufferName {
    /// Name as used in logs and version reports
    pub const fn as_str(self) -> &'static str {
        match self {
            BufferName::CurPoints => "curPoints",
            BufferName::NextPoints => "nextPoints",
            BufferName::Degrees => "degrees",
            BufferName::ForwardsDegrees => "forwardsDegrees",
            BufferName::BackwardsDegrees => "backwardsDegrees",
            BufferName::ForwardsEdges => "forwardsEdges",
            BufferName::BackwardsEdges => "backwardsEdges",
            BufferName::ForwardsWeights => "forwardsWeights",
            BufferName::BackwardsWeights => "backwardsWeights",
            BufferName::ForwardsWorkItems => "forwardsWorkItems",
            BufferName::BackwardsWorkItems => "backwardsWorkItems",
            BufferName::PartialForces1 => "partialForces1",
            BufferName::PartialForces2 => "partialForces2",
            BufferName::CurForces => "curForces",
            BufferName::PrevForces => "prevForces",
            BufferName::Swings => "swings",
            BufferName::Tractions => "tractions",
        }
    }

    /// Element type the buffer is allocated with
    pub const fn element_kind(self) -> ElementKind {
        match self {
            BufferName::Degrees
            | BufferName::ForwardsDegrees
            | BufferName::BackwardsDegrees
            | BufferName::ForwardsEdges
            | BufferName::BackwardsEdges
            | BufferName::ForwardsWorkItems
            | BufferName::BackwardsWorkItems => ElementKind::U32,
            _ => ElementKind::F32,
        }
    }

    /// Whether consumers outside the engine may read this buffer between steps
    pub const fn is_exposed(self) -> bool {
        !matches!(
            self,
            BufferName::NextPoints | BufferName::PartialForces1 | BufferName::PartialForces2
        )
    }
}

impl fmt::Display for BufferName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: BufferHandle,
    element_count: usize,
    element_stride: usize,
    version: u64,
}

impl Entry {
    fn len(&self) -> usize {
        self.element_count * self.element_stride
    }
}

/// Registry of engine buffers
#[derive(Debug, Default)]
pub struct BufferRegistry {
    entries: BTreeMap<BufferName, Entry>,
    next_handle: u32,
}

impl BufferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-initialized buffer of `element_count` elements of
    /// `element_stride` scalars each.
    ///
    /// A fresh name starts at version 0. Reallocating an existing name
    /// releases the old storage and advances the version instead, so readers
    /// holding the old version still observe a change.
    pub fn allocate<S: ComputeSubstrate + ?Sized>(
        &mut self,
        substrate: &mut S,
        name: BufferName,
        element_count: usize,
        element_stride: usize,
    ) -> LayoutResult<BufferHandle> {
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;

        substrate.create_buffer(
            handle,
            BufferDesc {
                label: name.as_str(),
                kind: name.element_kind(),
                len: element_count * element_stride,
            },
        )?;

        let version = match self.entries.get(&name) {
            Some(old) => {
                substrate.release_buffer(old.handle);
                old.version + 1
            }
            None => 0,
        };

        trace!(buffer = %name, %handle, element_count, element_stride, version, "allocated buffer");
        self.entries.insert(
            name,
            Entry {
                handle,
                element_count,
                element_stride,
                version,
            },
        );
        Ok(handle)
    }

    /// Whether a buffer has been allocated under `name`
    pub fn contains(&self, name: BufferName) -> bool {
        self.entries.contains_key(&name)
    }

    /// Physical handle currently bound to `name`
    pub fn handle(&self, name: BufferName) -> LayoutResult<BufferHandle> {
        self.entry(name).map(|e| e.handle)
    }

    /// Write counter of `name`, or `None` if it was never allocated
    pub fn version_of(&self, name: BufferName) -> Option<u64> {
        self.entries.get(&name).map(|e| e.version)
    }

    /// Number of elements (not scalars) in `name`
    pub fn element_count(&self, name: BufferName) -> LayoutResult<usize> {
        self.entry(name).map(|e| e.element_count)
    }

    /// Advance the write counter of every listed buffer.
    ///
    /// Either all names are bumped or, if one is unknown, none are.
    pub fn mark_written(&mut self, names: &[BufferName]) -> LayoutResult<()> {
        if let Some(missing) = names.iter().find(|n| !self.entries.contains_key(n)) {
            return Err(LayoutError::UnknownBuffer(*missing));
        }
        for name in names {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.version += 1;
                trace!(buffer = %name, version = entry.version, "buffer written");
            }
        }
        Ok(())
    }

    /// Device-side copy of `src` into `dst`; bumps `dst`
    pub fn copy<S: ComputeSubstrate + ?Sized>(
        &mut self,
        substrate: &mut S,
        src: BufferName,
        dst: BufferName,
    ) -> LayoutResult<()> {
        let from = self.entry(src)?;
        let to = self.entry(dst)?;
        if from.len() != to.len() {
            return Err(LayoutError::Config(format!(
                "cannot copy {src} ({} scalars) into {dst} ({} scalars)",
                from.len(),
                to.len()
            )));
        }
        let completion = substrate.copy_buffer(from.handle, to.handle)?;
        substrate.wait(completion)?;
        self.mark_written(&[dst])
    }

    /// Exchange the storage behind two same-shaped buffers; bumps both
    pub fn swap(&mut self, a: BufferName, b: BufferName) -> LayoutResult<()> {
        let ea = self.entry(a)?;
        let eb = self.entry(b)?;
        if ea.len() != eb.len() {
            return Err(LayoutError::Config(format!(
                "cannot swap {a} and {b}: shapes differ"
            )));
        }
        if let Some(entry) = self.entries.get_mut(&a) {
            entry.handle = eb.handle;
        }
        if let Some(entry) = self.entries.get_mut(&b) {
            entry.handle = ea.handle;
        }
        self.mark_written(&[a, b])
    }

    /// Upload host data into `name`; bumps its version
    pub fn write<S: ComputeSubstrate + ?Sized>(
        &mut self,
        substrate: &mut S,
        name: BufferName,
        data: BufferData<'_>,
    ) -> LayoutResult<()> {
        let handle = self.handle(name)?;
        substrate.write_buffer(handle, data)?;
        self.mark_written(&[name])
    }

    /// Read the full contents of `name` back to the host
    pub fn read<S: ComputeSubstrate + ?Sized>(
        &self,
        substrate: &mut S,
        name: BufferName,
    ) -> LayoutResult<HostBuffer> {
        let handle = self.handle(name)?;
        Ok(substrate.read_buffer(handle)?)
    }

    fn entry(&self, name: BufferName) -> LayoutResult<Entry> {
        self.entries
            .get(&name)
            .copied()
            .ok_or(LayoutError::UnknownBuffer(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuSubstrate;

    #[test]
    fn allocate_starts_at_version_zero_and_zeroed() {
        let mut cpu = CpuSubstrate::new();
        let mut registry = BufferRegistry::new();
        registry
            .allocate(&mut cpu, BufferName::Swings, 4, 1)
            .unwrap();

        assert_eq!(registry.version_of(BufferName::Swings), Some(0));
        assert_eq!(registry.version_of(BufferName::Tractions), None);
        let data = registry.read(&mut cpu, BufferName::Swings).unwrap();
        assert_eq!(data, HostBuffer::F32(vec![0.0; 4]));
    }

    #[test]
    fn mark_written_is_all_or_nothing() {
        let mut cpu = CpuSubstrate::new();
        let mut registry = BufferRegistry::new();
        registry.allocate(&mut cpu, BufferName::Swings, 2, 1).unwrap();

        let err = registry
            .mark_written(&[BufferName::Swings, BufferName::Tractions])
            .unwrap_err();
        assert!(matches!(err, LayoutError::UnknownBuffer(BufferName::Tractions)));
        assert_eq!(registry.version_of(BufferName::Swings), Some(0));

        registry.mark_written(&[BufferName::Swings]).unwrap();
        assert_eq!(registry.version_of(BufferName::Swings), Some(1));
    }

    #[test]
    fn copy_moves_data_and_bumps_destination_only() {
        let mut cpu = CpuSubstrate::new();
        let mut registry = BufferRegistry::new();
        registry.allocate(&mut cpu, BufferName::CurForces, 2, 2).unwrap();
        registry.allocate(&mut cpu, BufferName::PrevForces, 2, 2).unwrap();
        registry
            .write(
                &mut cpu,
                BufferName::CurForces,
                BufferData::F32(&[1.0, 2.0, 3.0, 4.0]),
            )
            .unwrap();

        registry
            .copy(&mut cpu, BufferName::CurForces, BufferName::PrevForces)
            .unwrap();

        assert_eq!(registry.version_of(BufferName::CurForces), Some(1));
        assert_eq!(registry.version_of(BufferName::PrevForces), Some(1));
        let prev = registry.read(&mut cpu, BufferName::PrevForces).unwrap();
        assert_eq!(prev, HostBuffer::F32(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn swap_exchanges_handles() {
        let mut cpu = CpuSubstrate::new();
        let mut registry = BufferRegistry::new();
        let cur = registry.allocate(&mut cpu, BufferName::CurPoints, 1, 2).unwrap();
        let next = registry.allocate(&mut cpu, BufferName::NextPoints, 1, 2).unwrap();

        registry
            .swap(BufferName::CurPoints, BufferName::NextPoints)
            .unwrap();

        assert_eq!(registry.handle(BufferName::CurPoints).unwrap(), next);
        assert_eq!(registry.handle(BufferName::NextPoints).unwrap(), cur);
        assert_eq!(registry.version_of(BufferName::CurPoints), Some(1));
    }

    #[test]
    fn reallocation_keeps_versions_increasing() {
        let mut cpu = CpuSubstrate::new();
        let mut registry = BufferRegistry::new();
        registry.allocate(&mut cpu, BufferName::Degrees, 3, 1).unwrap();
        registry.mark_written(&[BufferName::Degrees]).unwrap();
        registry.allocate(&mut cpu, BufferName::Degrees, 5, 1).unwrap();

        assert_eq!(registry.version_of(BufferName::Degrees), Some(2));
        assert_eq!(registry.element_count(BufferName::Degrees).unwrap(), 5);
    }

    #[test]
    fn next_points_are_not_exposed() {
        assert!(BufferName::CurPoints.is_exposed());
        assert!(!BufferName::NextPoints.is_exposed());
        assert!(!BufferName::PartialForces2.is_exposed());
    }
}
