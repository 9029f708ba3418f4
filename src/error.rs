//! Error taxonomy for the layout engine
//!
//! Substrate faults are reported as [`SubstrateError`]. The engine wraps them in
//! [`LayoutError::PassFailed`] when they happen inside a compute pass, so callers
//! can tell which stage of the step broke and decide whether to retry the step.

use std::fmt;

use thiserror::Error;

use crate::buffers::{BufferHandle, BufferName, ElementKind};
use crate::kernels::KernelName;

/// The compute passes of a ForceAtlas2 step, as reported in failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    PointForces,
    EdgeForces,
    SwingsTractions,
    Integrate,
}

impl Pass {
    /// Stable label used in logs and error messages
    pub const fn label(self) -> &'static str {
        match self {
            Pass::PointForces => "point-forces",
            Pass::EdgeForces => "edge-forces",
            Pass::SwingsTractions => "swings-tractions",
            Pass::Integrate => "integrate",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors raised by a compute substrate
#[derive(Error, Debug)]
pub enum SubstrateError {
    /// A kernel or copy referenced a buffer the substrate does not hold
    #[error("buffer {0} has not been allocated")]
    MissingBuffer(BufferHandle),

    /// A buffer was accessed with the wrong element type
    #[error("buffer {handle} holds {actual} elements, expected {expected}")]
    ElementKind {
        handle: BufferHandle,
        expected: ElementKind,
        actual: ElementKind,
    },

    /// A buffer is smaller than the kernel or upload requires
    #[error("buffer {handle} holds {actual} elements, {required} required")]
    TooSmall {
        handle: BufferHandle,
        required: usize,
        actual: usize,
    },

    /// An edge or work item points outside the buffers it indexes
    #[error("index {index} out of bounds for buffer {handle} of {len} elements")]
    OutOfBounds {
        handle: BufferHandle,
        index: usize,
        len: usize,
    },

    /// A kernel was launched before being declared
    #[error("kernel {0} has not been declared")]
    UndeclaredKernel(KernelName),

    /// A kernel was launched with arguments belonging to another kernel
    #[error("kernel {kernel} launched with arguments for {args}")]
    ArgumentMismatch { kernel: KernelName, args: KernelName },

    /// The substrate does not implement the kernel
    #[error("kernel {0} is not supported by this substrate")]
    UnsupportedKernel(KernelName),

    /// A device-level fault (adapter loss, mapping failure, ...)
    #[error("device error: {0}")]
    Device(String),
}

/// Errors surfaced by the layout engine
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A compute pass failed; the step was discarded and buffers were not swapped
    #[error("{pass} pass failed: {source}")]
    PassFailed {
        pass: Pass,
        #[source]
        source: SubstrateError,
    },

    /// The topology is inconsistent with the bound points
    #[error("invalid topology: {0}")]
    Topology(String),

    /// A named buffer was requested before it was allocated
    #[error("buffer {0} is not allocated")]
    UnknownBuffer(BufferName),

    /// A buffer that is never externally visible was requested
    #[error("buffer {0} is engine-internal and cannot be read between steps")]
    NotExposed(BufferName),

    /// Points were not uploaded before the operation
    #[error("no points have been set")]
    NoPoints,

    /// The configuration could not be loaded or is out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A substrate fault outside of a compute pass (upload, copy, readback)
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// An I/O error occurred while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayoutError {
    /// The pass that failed, if this is a pass failure
    pub fn failed_pass(&self) -> Option<Pass> {
        match self {
            LayoutError::PassFailed { pass, .. } => Some(*pass),
            _ => None,
        }
    }
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_failure_names_the_pass() {
        let err = LayoutError::PassFailed {
            pass: Pass::SwingsTractions,
            source: SubstrateError::Device("lost".to_string()),
        };
        assert_eq!(err.failed_pass(), Some(Pass::SwingsTractions));
        assert_eq!(
            err.to_string(),
            "swings-tractions pass failed: device error: lost"
        );
    }

    #[test]
    fn non_pass_errors_have_no_pass() {
        let err = LayoutError::Topology("edge 3 -> 9 out of range".to_string());
        assert_eq!(err.failed_pass(), None);
    }
}
