//! # surface-mesh
//!
//! surface-mesh is a polygonal surface mesh container with attribute-managed
//! storage, designed as a backbone for geometry processing pipelines. All mesh
//! data, including vertex positions and the facet index buffer, lives in named
//! attributes that can be created, wrapped around caller-owned buffers, shared
//! copy-on-write between meshes, and exported back without copies.
//!
//! ## Features
//! - Regular and hybrid facet storage: uniform-arity meshes use implicit
//!   corner offsets and transparently switch to explicit offsets when a facet
//!   of a different size is inserted
//! - Typed and type-erased attribute access over ten scalar types, with
//!   per-element, per-corner-indexed and free-standing value channels
//! - Optional edge and connectivity information (corner chains around every
//!   edge and vertex), kept up to date across facet insertion and removal
//! - Element removal with attribute compaction, index rewriting and
//!   connectivity repair
//! - External buffer wraps with explicit growth, write and export policies
//!
//! ## Determinism
//!
//! Attribute iteration is ordered by name, and edge ids are assigned in a
//! deterministic order (sorted vertex pairs on initialization, first-seen on
//! incremental updates), so identical inputs produce identical meshes.
//!
//! ## Usage
//! Add `surface-mesh` as a dependency in your `Cargo.toml` and enable
//! features as needed:
//!
//! ```toml
//! [dependencies]
//! surface-mesh = "0.1"
//! # Optional features:
//! # features = ["rayon", "check-invariants"]
//! ```

pub mod attribute;
pub mod debug_invariants;
pub mod mesh;
pub mod mesh_error;
pub(crate) mod parallel;

pub use debug_invariants::DebugInvariants;
pub use mesh_error::MeshError;

/// A convenient prelude importing the most-used types.
pub mod prelude {
    pub use crate::attribute::{
        invalid_index, is_invalid, Attribute, AttributeCreatePolicy, AttributeDeletePolicy,
        AttributeElement, AttributeExportPolicy, AttributeGrowthPolicy, AttributeId,
        AttributeUsage, AttributeValue, AttributeValueType, AttributeWritePolicy, ExternalBuffer,
        IndexValue, IndexedAttribute, Scalar,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh::SurfaceMesh;
    pub use crate::mesh_error::MeshError;
}
