//! MeshError: unified error type for surface-mesh public APIs.
//!
//! Every runtime-checked contract violation in the crate maps to a named
//! variant here, so callers can match on failures instead of parsing panic
//! messages. Programming errors (mismatched downcasts, poisoned internal
//! state) still panic; everything reachable from valid user input returns
//! `Result<_, MeshError>`.

use thiserror::Error;

/// Unified error type for surface-mesh operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    /// Lookup of an attribute name or id that is not registered.
    #[error("Attribute does not exist: {0}")]
    AttributeDoesNotExist(String),
    /// Creation under a name that is already taken.
    #[error("Attribute already exists: {0}")]
    AttributeAlreadyExists(String),
    /// A `$`-prefixed name was used without the force policy.
    #[error("Attribute name is reserved: {0}")]
    ReservedAttributeName(String),
    /// A `$`-prefixed name that is not one of the known reserved attributes.
    #[error("Unknown reserved attribute name: {0}")]
    UnknownReservedAttribute(String),
    /// Channel count incompatible with the declared usage.
    #[error(
        "Attribute usage {usage:?} requires {expected} channels for a {dim}-dimensional mesh, got {actual}"
    )]
    UsageChannelMismatch {
        usage: crate::attribute::AttributeUsage,
        dim: usize,
        expected: &'static str,
        actual: usize,
    },
    /// An element-index usage on a value type other than the mesh index type.
    #[error("Attribute usage {0:?} requires the mesh index type")]
    IndexUsageTypeMismatch(crate::attribute::AttributeUsage),
    /// Initial value buffer length is not a multiple of the channel count, or
    /// does not match the element count.
    #[error("Attribute value buffer has length {len}, expected {expected}")]
    WrongValueArrayLength { len: usize, expected: usize },
    /// Initial index buffer length does not match the corner count.
    #[error("Attribute index buffer has length {len}, expected {expected}")]
    WrongIndexArrayLength { len: usize, expected: usize },
    /// Initial indices supplied for a non-indexed attribute.
    #[error("Index buffer provided for a non-indexed attribute")]
    IndexBufferOnNonIndexed,
    /// Importing an attribute from a mesh whose element counts differ.
    #[error("{element:?} element count mismatch: mesh has {expected}, source has {actual}")]
    ElementCountMismatch {
        element: crate::attribute::AttributeElement,
        expected: usize,
        actual: usize,
    },
    /// A wrapped external buffer is too small for the requested span.
    #[error("Wrapped buffer holds {len} entries, need at least {needed}")]
    WrappedBufferTooSmall { len: usize, needed: usize },
    /// Write access to a read-only external wrap under the error policy.
    #[error("Attribute is read-only")]
    ReadOnlyAttribute,
    /// Growing an externally backed attribute under the error policy.
    #[error("Cannot grow an attribute pointing to external data")]
    GrowExternalBuffer,
    /// Exporting an externally backed attribute under the error policy.
    #[error("Cannot export an attribute pointing to external data")]
    ExportExternalBuffer,
    /// A uniform-arity query on a mesh with hybrid facet storage.
    #[error("Mesh has hybrid facet storage; facets do not share a uniform size")]
    HybridStorage,
    /// A facet with zero corners.
    #[error("Facets must have at least one vertex")]
    EmptyFacet,
    /// Vertex coordinate buffer length not divisible by the mesh dimension.
    #[error("Vertex buffer has length {len}, not a multiple of dimension {dim}")]
    WrongVertexArrayLength { len: usize, dim: usize },
    /// User edge array with an odd number of entries.
    #[error("Edge vertex array has odd length {0}")]
    UserEdgeArrayOddLength(usize),
    /// User edge ordering with the wrong number of edges.
    #[error("Incorrect number of edges: expected {expected}, got {actual}")]
    WrongUserEdgeCount { expected: usize, actual: usize },
    /// User edge ordering naming an edge that is not in the mesh.
    #[error("Mismatched edge vertices: ({v0}, {v1}) is not an edge of the mesh")]
    MismatchedEdgeVertices { v0: u64, v1: u64 },
    /// A removal list that is not sorted in increasing order.
    #[error("Removal indices must be sorted in strictly increasing order")]
    RemovalIndicesNotSorted,
    /// An element index outside the valid range.
    #[error("{kind} index {index} out of bounds ({count} elements)")]
    ElementIndexOutOfBounds {
        kind: &'static str,
        index: usize,
        count: usize,
    },
    /// Mesh dimension of zero.
    #[error("Mesh dimension must be positive")]
    InvalidDimension,
    /// Structural facet mutation while edge connectivity is initialized.
    #[error("Cannot modify facet indices while edge connectivity is initialized")]
    ModifyFacetsWithEdges,
    /// Adding facets with unset corner vertices while edges are initialized.
    #[error("Cannot add facets without indices while edge connectivity is initialized")]
    FacetsWithoutIndicesWithEdges,
    /// An invariant violation reported by `validate_invariants`.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}
