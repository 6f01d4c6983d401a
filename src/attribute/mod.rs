//! Typed per-element attributes and their type-erased registry.
//!
//! An attribute is a strided buffer of one of ten primitive scalar types,
//! tagged with the mesh element it decorates and a semantic usage. Attributes
//! are stored type-erased in an [`AttributeManager`] and shared copy-on-write
//! between meshes.

pub mod attribute;
pub mod erased;
pub mod indexed;
pub mod manager;
pub mod value;

pub use attribute::{Attribute, AttributeStorage, ExternalBuffer};
pub use erased::ErasedAttribute;
pub use indexed::IndexedAttribute;
pub use manager::{AttributeManager, AttributeSlot};
pub use value::{invalid_index, is_invalid, AttributeValue, AttributeValueType, IndexValue, Scalar};

use serde::{Deserialize, Serialize};

/// Stable handle to an attribute within one mesh. Ids are reused after
/// deletion and are not portable across meshes.
pub type AttributeId = u32;

/// Mesh element a per-element attribute is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeElement {
    /// One row per vertex.
    Vertex,
    /// One row per facet.
    Facet,
    /// One row per edge.
    Edge,
    /// One row per corner (facet-vertex incidence).
    Corner,
    /// Rows unrelated to any element count; never auto-resized.
    Value,
    /// Value rows addressed indirectly through a per-corner index buffer.
    Indexed,
}

/// Semantic tag constraining channel count and value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeUsage {
    /// Unconstrained multi-channel data.
    Vector,
    /// Exactly one channel.
    Scalar,
    /// Vertex position; channel count must equal the mesh dimension.
    Position,
    /// Surface normal; `dim` or `dim + 1` channels.
    Normal,
    /// Tangent vector; `dim` or `dim + 1` channels.
    Tangent,
    /// Bitangent vector; `dim` or `dim + 1` channels.
    Bitangent,
    /// Color; 1 to 4 channels.
    Color,
    /// Texture coordinates; exactly two channels.
    UV,
    /// Values are vertex indices; value type must be the mesh index type.
    VertexIndex,
    /// Values are facet indices; value type must be the mesh index type.
    FacetIndex,
    /// Values are corner indices; value type must be the mesh index type.
    CornerIndex,
    /// Values are edge indices; value type must be the mesh index type.
    EdgeIndex,
}

impl AttributeUsage {
    /// True for the four usages whose values are element indices and must be
    /// rewritten when the mesh reindexes elements.
    pub fn is_element_index(self) -> bool {
        matches!(
            self,
            AttributeUsage::VertexIndex
                | AttributeUsage::FacetIndex
                | AttributeUsage::CornerIndex
                | AttributeUsage::EdgeIndex
        )
    }
}

/// Whether creating a `$`-prefixed attribute name is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeCreatePolicy {
    #[default]
    ErrorIfReserved,
    Force,
}

/// Whether deleting a reserved attribute is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeDeletePolicy {
    #[default]
    ErrorIfReserved,
    Force,
}

/// How to grow an attribute whose storage is externally owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeGrowthPolicy {
    /// Fail instead of touching external storage.
    #[default]
    ErrorIfExternal,
    /// Grow in place while the external buffer has spare capacity, fail beyond.
    AllowWithinCapacity,
    /// Copy to internal storage, with a warning.
    WarnAndCopy,
    /// Copy to internal storage silently.
    SilentCopy,
}

/// How to hand out mutable access to a read-only external wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeWritePolicy {
    #[default]
    ErrorIfReadOnly,
    /// Copy to internal storage, with a warning.
    WarnAndCopy,
    /// Copy to internal storage silently.
    SilentCopy,
}

/// What to do with external storage when an attribute is exported from the
/// mesh back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeExportPolicy {
    /// Copy external storage so the exported attribute owns its data.
    #[default]
    CopyIfExternal,
    /// Keep the shared external buffer in the exported attribute.
    KeepExternalPtr,
    /// Fail if the attribute is externally backed.
    ErrorIfExternal,
}
