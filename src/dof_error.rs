//! DofSieveError: Unified error type for dof-sieve public APIs
//!
//! Every fallible operation in the crate returns this error. Variants fall into
//! three groups: precondition violations (bad index, order out of range, wrong
//! update sequence), consistency failures (constraint resolution could not
//! finalize every DOF, mismatched topology) and text-format errors.

use crate::topology::cell_type::CellType;
use thiserror::Error;

/// Unified error type for dof-sieve operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DofSieveError {
    /// An entity, element or DOF index is out of range.
    #[error("{kind} index {index} out of range (len = {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },
    /// A polynomial order is outside the representable range.
    #[error("order {order} outside supported range [{min}, {max}]")]
    OrderOutOfRange { order: u32, min: u8, max: u8 },
    /// The basis catalog or a reference transform does not support a geometry.
    #[error("unsupported geometry {geometry:?}: {context}")]
    UnsupportedGeometry {
        geometry: CellType,
        context: &'static str,
    },
    /// The mesh sequence number does not match the expected update step.
    #[error("mesh sequence {found} is not exactly one step past {expected_from}")]
    UpdateSequence { expected_from: u64, found: u64 },
    /// Mesh topology and element orders changed within a single update.
    #[error("cannot update the space when both the mesh and element orders changed")]
    MeshAndOrdersChanged,
    /// The space is older than the mesh it is attached to.
    #[error("space built for mesh sequence {space} but mesh is at {mesh}; call update()")]
    StaleSpace { space: u64, mesh: u64 },
    /// Two spaces that must share vdim/ordering/mesh lineage do not.
    #[error("incompatible spaces: {0}")]
    IncompatibleSpaces(String),
    /// The mesh carries no coarse-to-fine transforms for the requested operation.
    #[error("mesh has no {0} transforms")]
    MissingTransforms(&'static str),
    /// A vector or matrix has the wrong size.
    #[error("size mismatch for {what}: expected {expected}, found {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Constraint resolution stopped before every DOF was finalized.
    #[error(
        "constraint resolution finalized {finalized} of {ndofs} DOFs; \
         the mesh has inconsistent master/slave closure or orientations"
    )]
    UnresolvedDofs { finalized: usize, ndofs: usize },
    /// No variant of an entity carries the requested number of DOFs / order.
    #[error("{entity} {index} has no DOF variant of order {order}")]
    MissingDofs {
        entity: &'static str,
        index: usize,
        order: u8,
    },
    /// The mesh topology violates an assumed invariant.
    #[error("inconsistent mesh: {0}")]
    InconsistentMesh(String),
    /// A small dense matrix that must be invertible is singular.
    #[error("singular local matrix: {0}")]
    SingularLocalMatrix(String),
    /// Requested operation is not available for this configuration.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// Malformed header in the persisted text format.
    #[error("invalid header: expected `{expected}`, found `{found}`")]
    InvalidHeader { expected: String, found: String },
    /// Malformed content in the persisted text format.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    /// I/O failure while reading or writing the text format.
    #[error("I/O error: {0}")]
    Io(String),
    /// Invariant validation failed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<std::io::Error> for DofSieveError {
    fn from(err: std::io::Error) -> Self {
        DofSieveError::Io(err.to_string())
    }
}

impl From<std::fmt::Error> for DofSieveError {
    fn from(err: std::fmt::Error) -> Self {
        DofSieveError::Io(err.to_string())
    }
}

impl DofSieveError {
    /// Convenience constructor for [`DofSieveError::IndexOutOfRange`].
    pub(crate) fn out_of_range(kind: &'static str, index: usize, len: usize) -> Self {
        DofSieveError::IndexOutOfRange { kind, index, len }
    }
}
