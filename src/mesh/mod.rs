//! Polymorphic surface mesh container.
//!
//! A [`SurfaceMesh`] is a set of vertices and polygonal facets whose entire
//! state, including the vertex positions and the facet index buffer, lives in
//! named attributes. Facet storage is regular (uniform arity, implicit corner
//! offsets) until a facet of a different size is inserted, at which point the
//! mesh transparently switches to hybrid storage with explicit offsets.
//!
//! Reserved attributes carry the `$` name prefix and hold the mesh structure
//! itself; user code can read them freely but needs explicit force policies
//! to create or delete them.

pub mod edges;
pub mod removal;

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use num_traits::AsPrimitive;

use crate::attribute::value::{invalid_index, is_invalid};
use crate::attribute::{
    Attribute, AttributeCreatePolicy, AttributeDeletePolicy, AttributeElement,
    AttributeExportPolicy, AttributeId, AttributeManager, AttributeUsage, AttributeValue,
    ErasedAttribute, ExternalBuffer, IndexValue, IndexedAttribute, Scalar,
};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;

/// The nine reserved attributes holding mesh structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedAttr {
    VertexToPosition,
    CornerToVertex,
    FacetToFirstCorner,
    CornerToFacet,
    CornerToEdge,
    EdgeToFirstCorner,
    VertexToFirstCorner,
    NextCornerAroundEdge,
    NextCornerAroundVertex,
}

impl ReservedAttr {
    pub const ALL: [ReservedAttr; 9] = [
        ReservedAttr::VertexToPosition,
        ReservedAttr::CornerToVertex,
        ReservedAttr::FacetToFirstCorner,
        ReservedAttr::CornerToFacet,
        ReservedAttr::CornerToEdge,
        ReservedAttr::EdgeToFirstCorner,
        ReservedAttr::VertexToFirstCorner,
        ReservedAttr::NextCornerAroundEdge,
        ReservedAttr::NextCornerAroundVertex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReservedAttr::VertexToPosition => "$vertex_to_position",
            ReservedAttr::CornerToVertex => "$corner_to_vertex",
            ReservedAttr::FacetToFirstCorner => "$facet_to_first_corner",
            ReservedAttr::CornerToFacet => "$corner_to_facet",
            ReservedAttr::CornerToEdge => "$corner_to_edge",
            ReservedAttr::EdgeToFirstCorner => "$edge_to_first_corner",
            ReservedAttr::VertexToFirstCorner => "$vertex_to_first_corner",
            ReservedAttr::NextCornerAroundEdge => "$next_corner_around_edge",
            ReservedAttr::NextCornerAroundVertex => "$next_corner_around_vertex",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Reserved attributes defaulting to zero rather than the invalid marker.
    fn defaults_to_zero(self) -> bool {
        matches!(
            self,
            ReservedAttr::VertexToPosition | ReservedAttr::CornerToVertex
        )
    }
}

#[derive(Debug, Clone, Default)]
struct ReservedIds([Option<AttributeId>; 9]);

impl ReservedIds {
    fn get(&self, r: ReservedAttr) -> Option<AttributeId> {
        self.0[r as usize]
    }
    fn set(&mut self, r: ReservedAttr, id: AttributeId) {
        self.0[r as usize] = Some(id);
    }
    fn clear(&mut self, r: ReservedAttr) {
        self.0[r as usize] = None;
    }
}

/// A surface mesh of polygonal facets with attribute-managed storage.
///
/// `S` is the coordinate scalar, `I` the index type; the largest `I` value is
/// reserved as the invalid marker. Element ids and counts are `usize` at the
/// API surface, stored index values use `I`.
#[derive(Debug, Clone)]
pub struct SurfaceMesh<S: Scalar = f64, I: IndexValue = u32> {
    dimension: usize,
    vertex_per_facet: usize,
    num_vertices: usize,
    num_facets: usize,
    num_corners: usize,
    num_edges: usize,
    attributes: AttributeManager<I>,
    reserved_ids: ReservedIds,
    _scalar: PhantomData<S>,
}

impl<S: Scalar, I: IndexValue> SurfaceMesh<S, I> {
    /// New empty mesh of the given dimension.
    pub fn new(dimension: usize) -> Result<Self, MeshError> {
        if dimension == 0 {
            return Err(MeshError::InvalidDimension);
        }
        let mut mesh = Self::bare(dimension);
        mesh.create_attribute_internal::<S>(
            ReservedAttr::VertexToPosition.name(),
            AttributeElement::Vertex,
            AttributeUsage::Position,
            dimension,
        )?;
        mesh.create_attribute_internal::<I>(
            ReservedAttr::CornerToVertex.name(),
            AttributeElement::Corner,
            AttributeUsage::VertexIndex,
            1,
        )?;
        Ok(mesh)
    }

    fn bare(dimension: usize) -> Self {
        Self {
            dimension,
            vertex_per_facet: 0,
            num_vertices: 0,
            num_facets: 0,
            num_corners: 0,
            num_edges: 0,
            attributes: AttributeManager::new(),
            reserved_ids: ReservedIds::default(),
            _scalar: PhantomData,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_facets(&self) -> usize {
        self.num_facets
    }

    pub fn num_corners(&self) -> usize {
        self.num_corners
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// A mesh is regular while it has no explicit facet offset table. An
    /// empty mesh that went through hybrid storage stays hybrid until
    /// [`compress_if_regular`](Self::compress_if_regular).
    pub fn is_regular(&self) -> bool {
        self.reserved_ids.get(ReservedAttr::FacetToFirstCorner).is_none()
    }

    pub fn is_hybrid(&self) -> bool {
        !self.is_regular()
    }

    pub fn is_triangle_mesh(&self) -> bool {
        self.is_regular() && (self.num_corners == 0 || self.vertex_per_facet == 3)
    }

    pub fn is_quad_mesh(&self) -> bool {
        self.is_regular() && (self.num_corners == 0 || self.vertex_per_facet == 4)
    }

    /// Uniform facet arity. Fails on hybrid storage.
    pub fn vertex_per_facet(&self) -> Result<usize, MeshError> {
        if self.is_regular() {
            Ok(self.vertex_per_facet)
        } else {
            Err(MeshError::HybridStorage)
        }
    }

    pub fn has_edges(&self) -> bool {
        self.reserved_ids.get(ReservedAttr::EdgeToFirstCorner).is_some()
    }

    // ---------------------------------------------------------------------
    // Attribute surface
    // ---------------------------------------------------------------------

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    pub fn get_attribute_id(&self, name: &str) -> Result<AttributeId, MeshError> {
        self.attributes.get_id(name)
    }

    pub fn get_attribute_name(&self, id: AttributeId) -> Result<&str, MeshError> {
        self.attributes
            .get_name(id)
            .ok_or_else(|| MeshError::AttributeDoesNotExist(format!("id {id}")))
    }

    /// Erased view of an attribute, for metadata queries.
    pub fn erased_attribute(&self, id: AttributeId) -> Result<&ErasedAttribute<I>, MeshError> {
        self.attributes
            .read(id)
            .ok_or_else(|| MeshError::AttributeDoesNotExist(format!("id {id}")))
    }

    pub fn is_attribute_indexed(&self, id: AttributeId) -> Result<bool, MeshError> {
        Ok(self.erased_attribute(id)?.is_indexed())
    }

    pub fn is_attribute_type<V: AttributeValue>(&self, id: AttributeId) -> Result<bool, MeshError> {
        Ok(self.erased_attribute(id)?.value_type() == V::VALUE_TYPE)
    }

    /// Typed read access. The value type must match; a mismatch is a
    /// programming error and panics.
    pub fn attribute<V: AttributeValue>(&self, id: AttributeId) -> Result<&Attribute<V>, MeshError> {
        let erased = self.erased_attribute(id)?;
        Ok(V::as_flat(erased).expect("attribute value type mismatch"))
    }

    /// Typed write access; copies the attribute first when its handle is
    /// shared with another mesh.
    pub fn attribute_mut<V: AttributeValue>(
        &mut self,
        id: AttributeId,
    ) -> Result<&mut Attribute<V>, MeshError> {
        let erased = self
            .attributes
            .write(id)
            .ok_or_else(|| MeshError::AttributeDoesNotExist(format!("id {id}")))?;
        Ok(V::as_flat_mut(erased).expect("attribute value type mismatch"))
    }

    pub fn indexed_attribute<V: AttributeValue>(
        &self,
        id: AttributeId,
    ) -> Result<&IndexedAttribute<V, I>, MeshError> {
        let erased = self.erased_attribute(id)?;
        Ok(V::as_indexed(erased).expect("attribute value type mismatch"))
    }

    pub fn indexed_attribute_mut<V: AttributeValue>(
        &mut self,
        id: AttributeId,
    ) -> Result<&mut IndexedAttribute<V, I>, MeshError> {
        let erased = self
            .attributes
            .write(id)
            .ok_or_else(|| MeshError::AttributeDoesNotExist(format!("id {id}")))?;
        Ok(V::as_indexed_mut(erased).expect("attribute value type mismatch"))
    }

    pub fn attribute_by_name<V: AttributeValue>(
        &self,
        name: &str,
    ) -> Result<&Attribute<V>, MeshError> {
        let id = self.get_attribute_id(name)?;
        self.attribute(id)
    }

    pub fn attribute_by_name_mut<V: AttributeValue>(
        &mut self,
        name: &str,
    ) -> Result<&mut Attribute<V>, MeshError> {
        let id = self.get_attribute_id(name)?;
        self.attribute_mut(id)
    }

    /// Create an empty attribute, sized to the current element count.
    pub fn create_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
    ) -> Result<AttributeId, MeshError> {
        self.create_attribute_with_policy::<V>(
            name,
            element,
            usage,
            num_channels,
            AttributeCreatePolicy::default(),
        )
    }

    pub fn create_attribute_with_policy<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
        policy: AttributeCreatePolicy,
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(name, policy)?;
        self.check_attribute_usage::<V>(usage, num_channels)?;
        if element == AttributeElement::Indexed {
            self.create_indexed_attribute_internal::<V>(name, usage, num_channels, &[], &[])
        } else {
            self.create_attribute_internal::<V>(name, element, usage, num_channels)
        }
    }

    /// Create an attribute initialized from flat buffers. `initial_values`
    /// must be empty or cover every element; `initial_indices` is only valid
    /// for indexed attributes and must be empty or cover every corner.
    pub fn create_attribute_from<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
        initial_values: &[V],
        initial_indices: &[I],
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(name, AttributeCreatePolicy::default())?;
        self.check_attribute_usage::<V>(usage, num_channels)?;
        if element == AttributeElement::Indexed {
            return self.create_indexed_attribute_internal::<V>(
                name,
                usage,
                num_channels,
                initial_values,
                initial_indices,
            );
        }
        if !initial_indices.is_empty() {
            return Err(MeshError::IndexBufferOnNonIndexed);
        }
        let count = self.num_elements_for(element);
        let id = self.create_attribute_internal::<V>(name, element, usage, num_channels)?;
        if !initial_values.is_empty() {
            let expected = if element == AttributeElement::Value {
                if initial_values.len() % num_channels != 0 {
                    return Err(MeshError::WrongValueArrayLength {
                        len: initial_values.len(),
                        expected: (initial_values.len() / num_channels + 1) * num_channels,
                    });
                }
                initial_values.len()
            } else {
                count * num_channels
            };
            if initial_values.len() != expected {
                return Err(MeshError::WrongValueArrayLength {
                    len: initial_values.len(),
                    expected,
                });
            }
            let attr = self.attribute_mut::<V>(id)?;
            if element == AttributeElement::Value {
                attr.insert_elements(initial_values)?;
            } else {
                attr.as_slice_mut()?.copy_from_slice(initial_values);
            }
        }
        Ok(id)
    }

    /// Import an attribute from another mesh under `name`, sharing storage
    /// copy-on-write. The meshes must agree on the element count of the
    /// source attribute's element kind.
    pub fn create_attribute_from_mesh<S2: Scalar>(
        &mut self,
        name: &str,
        source: &SurfaceMesh<S2, I>,
        source_name: &str,
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(name, AttributeCreatePolicy::default())?;
        let src_id = source.get_attribute_id(source_name)?;
        let erased = source.erased_attribute(src_id)?;
        let element = erased.element();
        let expected = self.num_elements_for(element);
        let actual = source.num_elements_for(element);
        if expected != actual {
            return Err(MeshError::ElementCountMismatch {
                element,
                expected,
                actual,
            });
        }
        let handle = source.attributes.copy_ptr(src_id).expect("registered id");
        self.attributes.insert(name, handle)
    }

    pub fn create_indexed_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        usage: AttributeUsage,
        num_channels: usize,
    ) -> Result<AttributeId, MeshError> {
        self.create_attribute::<V>(name, AttributeElement::Indexed, usage, num_channels)
    }

    /// Register an attribute under a new name, sharing storage copy-on-write.
    pub fn duplicate_attribute(
        &mut self,
        src_name: &str,
        new_name: &str,
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(new_name, AttributeCreatePolicy::default())?;
        let id = self.get_attribute_id(src_name)?;
        let handle = self.attributes.copy_ptr(id).expect("registered id");
        self.attributes.insert(new_name, handle)
    }

    pub fn rename_attribute(&mut self, old_name: &str, new_name: &str) -> Result<(), MeshError> {
        if old_name.starts_with('$') {
            return Err(MeshError::ReservedAttributeName(old_name.to_string()));
        }
        check_attribute_name(new_name, AttributeCreatePolicy::default())?;
        self.attributes.rename(old_name, new_name)
    }

    pub fn delete_attribute(&mut self, name: &str) -> Result<(), MeshError> {
        self.delete_attribute_with_policy(name, AttributeDeletePolicy::default())
    }

    pub fn delete_attribute_with_policy(
        &mut self,
        name: &str,
        policy: AttributeDeletePolicy,
    ) -> Result<(), MeshError> {
        if name.starts_with('$') {
            if policy == AttributeDeletePolicy::ErrorIfReserved {
                return Err(MeshError::ReservedAttributeName(name.to_string()));
            }
            match ReservedAttr::from_name(name) {
                Some(r) => self.reserved_ids.clear(r),
                None => return Err(MeshError::UnknownReservedAttribute(name.to_string())),
            }
        }
        self.attributes.remove(name).map(drop)
    }

    /// Remove an attribute and hand its storage back to the caller.
    pub fn delete_and_export_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        delete_policy: AttributeDeletePolicy,
        export_policy: AttributeExportPolicy,
    ) -> Result<Attribute<V>, MeshError> {
        let handle = self.take_attribute_handle(name, delete_policy)?;
        let mut attr =
            V::into_flat(AttributeManager::unwrap_handle(handle)).expect("attribute value type mismatch");
        attr.apply_export_policy(export_policy)?;
        Ok(attr)
    }

    pub fn delete_and_export_indexed_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        delete_policy: AttributeDeletePolicy,
        export_policy: AttributeExportPolicy,
    ) -> Result<IndexedAttribute<V, I>, MeshError> {
        let handle = self.take_attribute_handle(name, delete_policy)?;
        let mut attr = V::into_indexed(AttributeManager::unwrap_handle(handle))
            .expect("attribute value type mismatch");
        attr.values_mut().apply_export_policy(export_policy)?;
        attr.indices_mut().apply_export_policy(export_policy)?;
        Ok(attr)
    }

    fn take_attribute_handle(
        &mut self,
        name: &str,
        policy: AttributeDeletePolicy,
    ) -> Result<Arc<ErasedAttribute<I>>, MeshError> {
        if name.starts_with('$') {
            if policy == AttributeDeletePolicy::ErrorIfReserved {
                return Err(MeshError::ReservedAttributeName(name.to_string()));
            }
            match ReservedAttr::from_name(name) {
                Some(r) => self.reserved_ids.clear(r),
                None => return Err(MeshError::UnknownReservedAttribute(name.to_string())),
            }
        }
        self.attributes.remove(name)
    }

    /// Sequential attribute iteration in name order.
    pub fn seq_foreach_attribute_id<F: FnMut(AttributeId)>(&self, f: F) {
        self.attributes.seq_foreach_id(f);
    }

    /// Parallel attribute iteration, unspecified order.
    pub fn par_foreach_attribute_id<F>(&self, f: F)
    where
        F: Fn(AttributeId) + Send + Sync,
    {
        self.attributes.par_foreach_id(f);
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.names()
    }

    // ---------------------------------------------------------------------
    // External wraps
    // ---------------------------------------------------------------------

    /// Create an attribute backed by a caller-owned buffer.
    pub fn wrap_as_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
        buffer: ExternalBuffer<V>,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_attribute_internal(name, element, usage, num_channels, buffer, false)
    }

    /// Like [`wrap_as_attribute`](Self::wrap_as_attribute), but writes are
    /// gated by the attribute's write policy.
    pub fn wrap_as_const_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
        buffer: ExternalBuffer<V>,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_attribute_internal(name, element, usage, num_channels, buffer, true)
    }

    fn wrap_as_attribute_internal<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
        buffer: ExternalBuffer<V>,
        read_only: bool,
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(name, AttributeCreatePolicy::default())?;
        self.check_attribute_usage::<V>(usage, num_channels)?;
        debug_assert!(element != AttributeElement::Indexed);
        let count = if element == AttributeElement::Value {
            buffer.len() / num_channels
        } else {
            self.num_elements_for(element)
        };
        let mut attr = Attribute::<V>::new(element, usage, num_channels);
        if read_only {
            attr.wrap_const(buffer, count)?;
        } else {
            attr.wrap(buffer, count)?;
        }
        self.attributes.insert(name, Arc::new(V::erase(attr)))
    }

    /// Create an indexed attribute wrapping caller-owned value and index
    /// buffers. The index buffer must cover every corner.
    pub fn wrap_as_indexed_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        usage: AttributeUsage,
        num_channels: usize,
        values: ExternalBuffer<V>,
        indices: ExternalBuffer<I>,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_indexed_attribute_internal(name, usage, num_channels, values, indices, false)
    }

    pub fn wrap_as_const_indexed_attribute<V: AttributeValue>(
        &mut self,
        name: &str,
        usage: AttributeUsage,
        num_channels: usize,
        values: ExternalBuffer<V>,
        indices: ExternalBuffer<I>,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_indexed_attribute_internal(name, usage, num_channels, values, indices, true)
    }

    fn wrap_as_indexed_attribute_internal<V: AttributeValue>(
        &mut self,
        name: &str,
        usage: AttributeUsage,
        num_channels: usize,
        values: ExternalBuffer<V>,
        indices: ExternalBuffer<I>,
        read_only: bool,
    ) -> Result<AttributeId, MeshError> {
        check_attribute_name(name, AttributeCreatePolicy::default())?;
        self.check_attribute_usage::<V>(usage, num_channels)?;
        let num_values = values.len() / num_channels;
        let mut attr = IndexedAttribute::<V, I>::new(usage, num_channels);
        if read_only {
            attr.values_mut().wrap_const(values, num_values)?;
            attr.indices_mut().wrap_const(indices, self.num_corners)?;
        } else {
            attr.values_mut().wrap(values, num_values)?;
            attr.indices_mut().wrap(indices, self.num_corners)?;
        }
        self.attributes.insert(name, Arc::new(V::erase_indexed(attr)))
    }

    /// Replace vertex storage with a caller-owned coordinate buffer and set
    /// the vertex count.
    pub fn wrap_as_vertices(
        &mut self,
        buffer: ExternalBuffer<S>,
        num_vertices: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_vertices_internal(buffer, num_vertices, false)
    }

    pub fn wrap_as_const_vertices(
        &mut self,
        buffer: ExternalBuffer<S>,
        num_vertices: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_vertices_internal(buffer, num_vertices, true)
    }

    fn wrap_as_vertices_internal(
        &mut self,
        buffer: ExternalBuffer<S>,
        num_vertices: usize,
        read_only: bool,
    ) -> Result<AttributeId, MeshError> {
        let id = self
            .reserved_ids
            .get(ReservedAttr::VertexToPosition)
            .expect("position attribute missing");
        {
            let attr = self.positions_mut();
            attr.clear();
            if read_only {
                attr.wrap_const(buffer, num_vertices)?;
            } else {
                attr.wrap(buffer, num_vertices)?;
            }
        }
        self.num_vertices = num_vertices;
        self.resize_elements_internal(AttributeElement::Vertex, num_vertices)?;
        Ok(id)
    }

    /// Replace facet storage with a caller-owned index buffer of uniform
    /// arity. Existing hybrid offsets are dropped. Refused while edge
    /// connectivity is initialized.
    pub fn wrap_as_facets(
        &mut self,
        buffer: ExternalBuffer<I>,
        num_facets: usize,
        vertex_per_facet: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_facets_internal(buffer, num_facets, vertex_per_facet, false)
    }

    pub fn wrap_as_const_facets(
        &mut self,
        buffer: ExternalBuffer<I>,
        num_facets: usize,
        vertex_per_facet: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_facets_internal(buffer, num_facets, vertex_per_facet, true)
    }

    fn wrap_as_facets_internal(
        &mut self,
        buffer: ExternalBuffer<I>,
        num_facets: usize,
        vertex_per_facet: usize,
        read_only: bool,
    ) -> Result<AttributeId, MeshError> {
        if vertex_per_facet == 0 {
            return Err(MeshError::EmptyFacet);
        }
        if self.has_edges() {
            return Err(MeshError::ModifyFacetsWithEdges);
        }
        if self.is_hybrid() {
            self.delete_attribute_with_policy(
                ReservedAttr::FacetToFirstCorner.name(),
                AttributeDeletePolicy::Force,
            )?;
            self.delete_attribute_with_policy(
                ReservedAttr::CornerToFacet.name(),
                AttributeDeletePolicy::Force,
            )?;
        }
        let id = self
            .reserved_ids
            .get(ReservedAttr::CornerToVertex)
            .expect("corner_to_vertex attribute missing");
        let num_corners = num_facets * vertex_per_facet;
        {
            let attr = self.reserved_attr_mut(ReservedAttr::CornerToVertex);
            attr.clear();
            if read_only {
                attr.wrap_const(buffer, num_corners)?;
            } else {
                attr.wrap(buffer, num_corners)?;
            }
        }
        self.vertex_per_facet = vertex_per_facet;
        self.num_facets = num_facets;
        self.num_corners = num_corners;
        self.resize_elements_internal(AttributeElement::Facet, num_facets)?;
        self.resize_elements_internal(AttributeElement::Corner, num_corners)?;
        Ok(id)
    }

    /// Replace facet storage with caller-owned hybrid buffers: per-facet
    /// first-corner offsets plus a flat corner index buffer.
    pub fn wrap_as_hybrid_facets(
        &mut self,
        offsets: ExternalBuffer<I>,
        num_facets: usize,
        facets: ExternalBuffer<I>,
        num_corners: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_hybrid_facets_internal(offsets, num_facets, facets, num_corners, false)
    }

    pub fn wrap_as_const_hybrid_facets(
        &mut self,
        offsets: ExternalBuffer<I>,
        num_facets: usize,
        facets: ExternalBuffer<I>,
        num_corners: usize,
    ) -> Result<AttributeId, MeshError> {
        self.wrap_as_hybrid_facets_internal(offsets, num_facets, facets, num_corners, true)
    }

    fn wrap_as_hybrid_facets_internal(
        &mut self,
        offsets: ExternalBuffer<I>,
        num_facets: usize,
        facets: ExternalBuffer<I>,
        num_corners: usize,
        read_only: bool,
    ) -> Result<AttributeId, MeshError> {
        if self.has_edges() {
            return Err(MeshError::ModifyFacetsWithEdges);
        }
        if self.is_regular() {
            self.create_attribute_internal::<I>(
                ReservedAttr::FacetToFirstCorner.name(),
                AttributeElement::Facet,
                AttributeUsage::CornerIndex,
                1,
            )?;
            self.create_attribute_internal::<I>(
                ReservedAttr::CornerToFacet.name(),
                AttributeElement::Corner,
                AttributeUsage::FacetIndex,
                1,
            )?;
        }
        {
            let attr = self.reserved_attr_mut(ReservedAttr::FacetToFirstCorner);
            attr.clear();
            if read_only {
                attr.wrap_const(offsets, num_facets)?;
            } else {
                attr.wrap(offsets, num_facets)?;
            }
        }
        let id = self
            .reserved_ids
            .get(ReservedAttr::CornerToVertex)
            .expect("corner_to_vertex attribute missing");
        {
            let attr = self.reserved_attr_mut(ReservedAttr::CornerToVertex);
            attr.clear();
            if read_only {
                attr.wrap_const(facets, num_corners)?;
            } else {
                attr.wrap(facets, num_corners)?;
            }
        }
        self.vertex_per_facet = 0;
        self.num_facets = num_facets;
        self.num_corners = num_corners;
        self.resize_elements_internal(AttributeElement::Facet, num_facets)?;
        self.resize_elements_internal(AttributeElement::Corner, num_corners)?;
        self.compute_corner_to_facet_internal(0, num_facets)?;
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Vertex and facet insertion
    // ---------------------------------------------------------------------

    pub fn add_vertex(&mut self, coords: &[S]) -> Result<(), MeshError> {
        if coords.len() != self.dimension {
            return Err(MeshError::WrongVertexArrayLength {
                len: coords.len(),
                dim: self.dimension,
            });
        }
        let old = self.num_vertices;
        self.resize_vertices_internal(old + 1)?;
        let dim = self.dimension;
        self.positions_mut().as_slice_mut()?[old * dim..].copy_from_slice(coords);
        Ok(())
    }

    /// Append `count` vertices at the attribute default position.
    pub fn add_vertices(&mut self, count: usize) -> Result<(), MeshError> {
        self.resize_vertices_internal(self.num_vertices + count)
    }

    /// Append vertices from a flat coordinate buffer.
    pub fn add_vertices_from(&mut self, coords: &[S]) -> Result<(), MeshError> {
        let dim = self.dimension;
        if coords.len() % dim != 0 {
            return Err(MeshError::WrongVertexArrayLength {
                len: coords.len(),
                dim,
            });
        }
        let old = self.num_vertices;
        self.resize_vertices_internal(old + coords.len() / dim)?;
        self.positions_mut().as_slice_mut()?[old * dim..].copy_from_slice(coords);
        Ok(())
    }

    /// Append vertices, filling each coordinate row through a callback.
    pub fn add_vertices_with<F>(&mut self, count: usize, mut f: F) -> Result<(), MeshError>
    where
        F: FnMut(usize, &mut [S]),
    {
        let old = self.num_vertices;
        self.resize_vertices_internal(old + count)?;
        let dim = self.dimension;
        let data = &mut self.positions_mut().as_slice_mut()?[old * dim..];
        for (i, row) in data.chunks_exact_mut(dim).enumerate() {
            f(i, row);
        }
        Ok(())
    }

    pub fn add_triangle(&mut self, v0: I, v1: I, v2: I) -> Result<(), MeshError> {
        self.add_polygon(&[v0, v1, v2])
    }

    pub fn add_quad(&mut self, v0: I, v1: I, v2: I, v3: I) -> Result<(), MeshError> {
        self.add_polygon(&[v0, v1, v2, v3])
    }

    /// Append one facet from its vertex indices.
    pub fn add_polygon(&mut self, facet_indices: &[I]) -> Result<(), MeshError> {
        if facet_indices.is_empty() {
            return Err(MeshError::EmptyFacet);
        }
        let size = facet_indices.len();
        let (begin, end) = self.reserve_uniform_indices(1, size)?;
        self.reserved_slice_mut(ReservedAttr::CornerToVertex)?[begin..end]
            .copy_from_slice(facet_indices);
        self.update_edges_last_internal(1)
    }

    /// Append `num_facets` facets of uniform arity. `facet_indices` must be
    /// empty (corners default to vertex 0) or cover every new corner; empty
    /// indices are refused while edges are initialized.
    pub fn add_polygons(
        &mut self,
        num_facets: usize,
        facet_size: usize,
        facet_indices: &[I],
    ) -> Result<(), MeshError> {
        if facet_size == 0 {
            return Err(MeshError::EmptyFacet);
        }
        if facet_indices.is_empty() && self.has_edges() {
            return Err(MeshError::FacetsWithoutIndicesWithEdges);
        }
        let (begin, end) = self.reserve_uniform_indices(num_facets, facet_size)?;
        if !facet_indices.is_empty() {
            if facet_indices.len() != end - begin {
                return Err(MeshError::WrongIndexArrayLength {
                    len: facet_indices.len(),
                    expected: end - begin,
                });
            }
            self.reserved_slice_mut(ReservedAttr::CornerToVertex)?[begin..end]
                .copy_from_slice(facet_indices);
        }
        self.update_edges_last_internal(num_facets)
    }

    pub fn add_triangles(&mut self, num_facets: usize, facet_indices: &[I]) -> Result<(), MeshError> {
        self.add_polygons(num_facets, 3, facet_indices)
    }

    pub fn add_quads(&mut self, num_facets: usize, facet_indices: &[I]) -> Result<(), MeshError> {
        self.add_polygons(num_facets, 4, facet_indices)
    }

    /// Append one facet, filling its corner row through a callback.
    pub fn add_polygon_with<F>(&mut self, facet_size: usize, mut f: F) -> Result<(), MeshError>
    where
        F: FnMut(&mut [I]),
    {
        self.add_polygons_with(1, facet_size, |_, row| f(row))
    }

    /// Append facets of uniform arity, filling each corner row through a
    /// callback.
    pub fn add_polygons_with<F>(
        &mut self,
        num_facets: usize,
        facet_size: usize,
        mut f: F,
    ) -> Result<(), MeshError>
    where
        F: FnMut(usize, &mut [I]),
    {
        if facet_size == 0 {
            return Err(MeshError::EmptyFacet);
        }
        let (begin, end) = self.reserve_uniform_indices(num_facets, facet_size)?;
        let data = &mut self.reserved_slice_mut(ReservedAttr::CornerToVertex)?[begin..end];
        for (i, row) in data.chunks_exact_mut(facet_size).enumerate() {
            f(i, row);
        }
        self.update_edges_last_internal(num_facets)
    }

    /// Append facets of varying sizes from a flat index buffer.
    pub fn add_hybrid(
        &mut self,
        facet_sizes: &[usize],
        facet_indices: &[I],
    ) -> Result<(), MeshError> {
        if facet_indices.is_empty() && self.has_edges() {
            return Err(MeshError::FacetsWithoutIndicesWithEdges);
        }
        let (begin, end) =
            self.reserve_indices_internal(facet_sizes.len(), |i| facet_sizes[i])?;
        if !facet_indices.is_empty() {
            if facet_indices.len() != end - begin {
                return Err(MeshError::WrongIndexArrayLength {
                    len: facet_indices.len(),
                    expected: end - begin,
                });
            }
            self.reserved_slice_mut(ReservedAttr::CornerToVertex)?[begin..end]
                .copy_from_slice(facet_indices);
        }
        self.update_edges_last_internal(facet_sizes.len())
    }

    /// Append facets of varying sizes, filling each corner row through a
    /// callback.
    pub fn add_hybrid_with<F>(&mut self, facet_sizes: &[usize], mut f: F) -> Result<(), MeshError>
    where
        F: FnMut(usize, &mut [I]),
    {
        let (begin, end) =
            self.reserve_indices_internal(facet_sizes.len(), |i| facet_sizes[i])?;
        let data = &mut self.reserved_slice_mut(ReservedAttr::CornerToVertex)?[begin..end];
        let mut offset = 0;
        for (i, &size) in facet_sizes.iter().enumerate() {
            f(i, &mut data[offset..offset + size]);
            offset += size;
        }
        self.update_edges_last_internal(facet_sizes.len())
    }

    // ---------------------------------------------------------------------
    // Element accessors
    // ---------------------------------------------------------------------

    /// Vertex position attribute.
    pub fn positions(&self) -> &Attribute<S> {
        let id = self
            .reserved_ids
            .get(ReservedAttr::VertexToPosition)
            .expect("position attribute missing");
        S::as_flat(self.attributes.read(id).expect("reserved attribute slot"))
            .expect("position attribute has scalar type")
    }

    pub fn positions_mut(&mut self) -> &mut Attribute<S> {
        let id = self
            .reserved_ids
            .get(ReservedAttr::VertexToPosition)
            .expect("position attribute missing");
        S::as_flat_mut(self.attributes.write(id).expect("reserved attribute slot"))
            .expect("position attribute has scalar type")
    }

    pub fn position(&self, v: usize) -> &[S] {
        self.positions().row(v)
    }

    pub fn position_mut(&mut self, v: usize) -> Result<&mut [S], MeshError> {
        self.positions_mut().row_mut(v)
    }

    /// Per-corner vertex index attribute.
    pub fn corner_to_vertex(&self) -> &Attribute<I> {
        self.reserved_attr(ReservedAttr::CornerToVertex)
    }

    /// Mutable facet index buffer. Refused while edge connectivity is
    /// initialized, since rewriting vertices would invalidate the chains.
    pub fn corner_to_vertex_mut(&mut self) -> Result<&mut Attribute<I>, MeshError> {
        if self.has_edges() {
            return Err(MeshError::ModifyFacetsWithEdges);
        }
        Ok(self.reserved_attr_mut(ReservedAttr::CornerToVertex))
    }

    pub fn facet_size(&self, f: usize) -> usize {
        self.facet_corner_end(f) - self.facet_corner_begin(f)
    }

    pub fn facet_corner_begin(&self, f: usize) -> usize {
        if self.is_regular() {
            f * self.vertex_per_facet
        } else {
            self.reserved_slice(ReservedAttr::FacetToFirstCorner)[f].to_usize()
        }
    }

    pub fn facet_corner_end(&self, f: usize) -> usize {
        if self.is_regular() {
            (f + 1) * self.vertex_per_facet
        } else if f + 1 == self.num_facets {
            self.num_corners
        } else {
            self.reserved_slice(ReservedAttr::FacetToFirstCorner)[f + 1].to_usize()
        }
    }

    /// Vertex id stored at a corner, or `None` for an unset/invalid entry.
    pub fn corner_vertex(&self, c: usize) -> Option<usize> {
        let v = self.reserved_slice(ReservedAttr::CornerToVertex)[c];
        (!is_invalid(v)).then(|| v.to_usize())
    }

    pub fn corner_facet(&self, c: usize) -> usize {
        if self.is_regular() {
            c / self.vertex_per_facet
        } else {
            self.reserved_slice(ReservedAttr::CornerToFacet)[c].to_usize()
        }
    }

    pub fn facet_vertices(&self, f: usize) -> &[I] {
        let begin = self.facet_corner_begin(f);
        let end = self.facet_corner_end(f);
        &self.corner_to_vertex().as_slice()[begin..end]
    }

    pub fn facet_vertex(&self, f: usize, lv: usize) -> I {
        self.reserved_slice(ReservedAttr::CornerToVertex)[self.facet_corner_begin(f) + lv]
    }

    // ---------------------------------------------------------------------
    // Stripped copies
    // ---------------------------------------------------------------------

    /// Copy of the mesh structure only: counts plus the reserved attributes,
    /// possibly converted to other scalar/index types. Attribute storage is
    /// shared copy-on-write when the types match. User attributes are not
    /// carried over.
    pub fn stripped_copy<S2, I2>(&self) -> Result<SurfaceMesh<S2, I2>, MeshError>
    where
        S2: Scalar,
        I2: IndexValue,
        S: AsPrimitive<S2>,
        I: AsPrimitive<I2>,
    {
        let mut mesh = SurfaceMesh::<S2, I2>::bare(self.dimension);
        mesh.vertex_per_facet = self.vertex_per_facet;
        mesh.num_vertices = self.num_vertices;
        mesh.num_facets = self.num_facets;
        mesh.num_corners = self.num_corners;
        mesh.num_edges = self.num_edges;
        for r in ReservedAttr::ALL {
            let Some(id) = self.reserved_ids.get(r) else {
                continue;
            };
            let handle = self.attributes.copy_ptr(id).expect("reserved attribute slot");
            let new_handle: Arc<ErasedAttribute<I2>> = match share_erased::<I, I2>(&handle) {
                Some(shared)
                    if r != ReservedAttr::VertexToPosition
                        || S::VALUE_TYPE == S2::VALUE_TYPE =>
                {
                    shared
                }
                _ => {
                    if r == ReservedAttr::VertexToPosition {
                        let attr =
                            S::as_flat(&handle).expect("position attribute has scalar type");
                        Arc::new(S2::erase(attr.cast_copy::<S2>()))
                    } else {
                        let attr =
                            I::as_flat(&handle).expect("connectivity attribute has index type");
                        Arc::new(I2::erase(cast_index_attribute::<I, I2>(attr)?))
                    }
                }
            };
            let new_id = mesh.attributes.insert(r.name(), new_handle)?;
            mesh.reserved_ids.set(r, new_id);
        }
        Ok(mesh)
    }

    /// Consuming variant of [`stripped_copy`](Self::stripped_copy); reserved
    /// attribute handles become uniquely owned by the new mesh.
    pub fn stripped_move<S2, I2>(self) -> Result<SurfaceMesh<S2, I2>, MeshError>
    where
        S2: Scalar,
        I2: IndexValue,
        S: AsPrimitive<S2>,
        I: AsPrimitive<I2>,
    {
        self.stripped_copy()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    pub(crate) fn reserved_id(&self, r: ReservedAttr) -> Option<AttributeId> {
        self.reserved_ids.get(r)
    }

    pub(crate) fn attribute_ids(&self) -> Vec<AttributeId> {
        self.attributes.ids().collect()
    }

    pub(crate) fn attribute_read(&self, id: AttributeId) -> Option<&ErasedAttribute<I>> {
        self.attributes.read(id)
    }

    pub(crate) fn attribute_write(&mut self, id: AttributeId) -> Option<&mut ErasedAttribute<I>> {
        self.attributes.write(id)
    }

    pub(crate) fn set_vertex_per_facet(&mut self, vertex_per_facet: usize) {
        self.vertex_per_facet = vertex_per_facet;
    }

    pub(crate) fn reserved_attr(&self, r: ReservedAttr) -> &Attribute<I> {
        let id = self
            .reserved_ids
            .get(r)
            .expect("reserved attribute not initialized");
        I::as_flat(self.attributes.read(id).expect("reserved attribute slot"))
            .expect("reserved attribute has index type")
    }

    pub(crate) fn reserved_attr_mut(&mut self, r: ReservedAttr) -> &mut Attribute<I> {
        let id = self
            .reserved_ids
            .get(r)
            .expect("reserved attribute not initialized");
        I::as_flat_mut(self.attributes.write(id).expect("reserved attribute slot"))
            .expect("reserved attribute has index type")
    }

    pub(crate) fn reserved_slice(&self, r: ReservedAttr) -> &[I] {
        self.reserved_attr(r).as_slice()
    }

    pub(crate) fn reserved_slice_mut(&mut self, r: ReservedAttr) -> Result<&mut [I], MeshError> {
        self.reserved_attr_mut(r).as_slice_mut()
    }

    /// Copy a reserved index attribute out into an owned buffer. Chain
    /// updates read and write several of these at once, which exclusive
    /// borrows cannot express directly.
    pub(crate) fn copy_reserved(&self, r: ReservedAttr) -> Vec<I> {
        self.reserved_slice(r).to_vec()
    }

    pub(crate) fn store_reserved(&mut self, r: ReservedAttr, data: &[I]) -> Result<(), MeshError> {
        self.reserved_slice_mut(r)?.copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn num_elements_for(&self, element: AttributeElement) -> usize {
        match element {
            AttributeElement::Vertex => self.num_vertices,
            AttributeElement::Facet => self.num_facets,
            AttributeElement::Corner | AttributeElement::Indexed => self.num_corners,
            AttributeElement::Edge => self.num_edges,
            AttributeElement::Value => 0,
        }
    }

    /// Resize every attribute attached to `element`. Indexed attributes
    /// follow the corner count.
    pub(crate) fn resize_elements_internal(
        &mut self,
        element: AttributeElement,
        count: usize,
    ) -> Result<(), MeshError> {
        let ids: Vec<AttributeId> = self.attributes.ids().collect();
        for id in ids {
            let kind = self
                .attributes
                .read(id)
                .expect("registered id")
                .element();
            let matches = kind == element
                || (element == AttributeElement::Corner && kind == AttributeElement::Indexed);
            if matches {
                self.attributes
                    .write(id)
                    .expect("registered id")
                    .resize_elements(count)?;
            }
        }
        Ok(())
    }

    pub(crate) fn resize_vertices_internal(&mut self, count: usize) -> Result<(), MeshError> {
        self.num_vertices = count;
        self.resize_elements_internal(AttributeElement::Vertex, count)
    }

    pub(crate) fn resize_facets_internal(&mut self, count: usize) -> Result<(), MeshError> {
        self.num_facets = count;
        self.resize_elements_internal(AttributeElement::Facet, count)
    }

    pub(crate) fn resize_corners_internal(&mut self, count: usize) -> Result<(), MeshError> {
        self.num_corners = count;
        self.resize_elements_internal(AttributeElement::Corner, count)
    }

    pub(crate) fn resize_edges_internal(&mut self, count: usize) -> Result<(), MeshError> {
        self.num_edges = count;
        self.resize_elements_internal(AttributeElement::Edge, count)
    }

    pub(crate) fn create_attribute_internal<V: AttributeValue>(
        &mut self,
        name: &str,
        element: AttributeElement,
        usage: AttributeUsage,
        num_channels: usize,
    ) -> Result<AttributeId, MeshError> {
        let mut attr = Attribute::<V>::new(element, usage, num_channels);
        if let Some(r) = ReservedAttr::from_name(name) {
            if !r.defaults_to_zero() {
                attr.set_default_value(V::sentinel());
            }
        }
        attr.resize_elements(self.num_elements_for(element))?;
        let id = self.attributes.insert(name, Arc::new(V::erase(attr)))?;
        if let Some(r) = ReservedAttr::from_name(name) {
            self.reserved_ids.set(r, id);
        }
        Ok(id)
    }

    fn create_indexed_attribute_internal<V: AttributeValue>(
        &mut self,
        name: &str,
        usage: AttributeUsage,
        num_channels: usize,
        initial_values: &[V],
        initial_indices: &[I],
    ) -> Result<AttributeId, MeshError> {
        if initial_values.len() % num_channels != 0 {
            return Err(MeshError::WrongValueArrayLength {
                len: initial_values.len(),
                expected: (initial_values.len() / num_channels + 1) * num_channels,
            });
        }
        if !initial_indices.is_empty() && initial_indices.len() != self.num_corners {
            return Err(MeshError::WrongIndexArrayLength {
                len: initial_indices.len(),
                expected: self.num_corners,
            });
        }
        let mut attr = IndexedAttribute::<V, I>::new(usage, num_channels);
        attr.values_mut().insert_elements(initial_values)?;
        if initial_indices.is_empty() {
            attr.indices_mut().resize_elements(self.num_corners)?;
        } else {
            attr.indices_mut().insert_elements(initial_indices)?;
        }
        self.attributes.insert(name, Arc::new(V::erase_indexed(attr)))
    }

    fn check_attribute_usage<V: AttributeValue>(
        &self,
        usage: AttributeUsage,
        num_channels: usize,
    ) -> Result<(), MeshError> {
        let dim = self.dimension;
        let expected: Option<&'static str> = match usage {
            AttributeUsage::Position => (num_channels != dim).then_some("dim"),
            AttributeUsage::Normal | AttributeUsage::Tangent | AttributeUsage::Bitangent => {
                (num_channels != dim && num_channels != dim + 1).then_some("dim or dim+1")
            }
            AttributeUsage::UV => (num_channels != 2).then_some("2"),
            AttributeUsage::Scalar => (num_channels != 1).then_some("1"),
            AttributeUsage::Color => (!(1..=4).contains(&num_channels)).then_some("1 to 4"),
            AttributeUsage::Vector => (num_channels == 0).then_some("at least 1"),
            AttributeUsage::VertexIndex
            | AttributeUsage::FacetIndex
            | AttributeUsage::CornerIndex
            | AttributeUsage::EdgeIndex => {
                if V::VALUE_TYPE != I::VALUE_TYPE {
                    return Err(MeshError::IndexUsageTypeMismatch(usage));
                }
                None
            }
        };
        match expected {
            Some(expected) => Err(MeshError::UsageChannelMismatch {
                usage,
                dim,
                expected,
                actual: num_channels,
            }),
            None => Ok(()),
        }
    }

    fn reserve_uniform_indices(
        &mut self,
        num_facets: usize,
        facet_size: usize,
    ) -> Result<(usize, usize), MeshError> {
        if self.is_regular()
            && (self.vertex_per_facet == 0 || self.vertex_per_facet == facet_size)
        {
            // Fast path, no offset bookkeeping needed.
            let total_facets = self.num_facets + num_facets;
            let old_corners = self.num_corners;
            self.resize_facets_internal(total_facets)?;
            self.vertex_per_facet = facet_size;
            self.resize_corners_internal(total_facets * facet_size)?;
            Ok((old_corners, self.num_corners))
        } else {
            self.reserve_indices_internal(num_facets, |_| facet_size)
        }
    }

    /// Grow facet and corner storage for `num_facets` new facets, switching
    /// to hybrid storage on the first arity mismatch. Returns the new corner
    /// range.
    pub(crate) fn reserve_indices_internal<F>(
        &mut self,
        num_facets: usize,
        facet_size: F,
    ) -> Result<(usize, usize), MeshError>
    where
        F: Fn(usize) -> usize,
    {
        let old_num_corners = self.num_corners;
        let old_num_facets = self.num_facets;
        let was_regular = self.is_regular();

        let mut last_offset = old_num_corners;
        self.resize_facets_internal(old_num_facets + num_facets)?;
        if self.is_regular() {
            let mut hybrid = false;
            for i in 0..num_facets {
                let size = facet_size(i);
                if size == 0 {
                    return Err(MeshError::EmptyFacet);
                }
                if hybrid {
                    self.reserved_slice_mut(ReservedAttr::FacetToFirstCorner)?
                        [old_num_facets + i] = I::from_usize(last_offset);
                }
                last_offset += size;
                if old_num_facets == 0 && i == 0 {
                    self.vertex_per_facet = size;
                }
                if !hybrid && self.vertex_per_facet != 0 && self.vertex_per_facet != size {
                    // Arity mismatch: switch to hybrid storage, retroactively
                    // filling offsets for all facets processed so far.
                    self.create_attribute_internal::<I>(
                        ReservedAttr::FacetToFirstCorner.name(),
                        AttributeElement::Facet,
                        AttributeUsage::CornerIndex,
                        1,
                    )?;
                    self.create_attribute_internal::<I>(
                        ReservedAttr::CornerToFacet.name(),
                        AttributeElement::Corner,
                        AttributeUsage::FacetIndex,
                        1,
                    )?;
                    let vpf = self.vertex_per_facet;
                    let offsets = self.reserved_slice_mut(ReservedAttr::FacetToFirstCorner)?;
                    for (j, slot) in offsets[..=old_num_facets + i].iter_mut().enumerate() {
                        *slot = I::from_usize(j * vpf);
                    }
                    self.vertex_per_facet = 0;
                    hybrid = true;
                }
            }
        } else {
            let mut offsets = Vec::with_capacity(num_facets);
            for i in 0..num_facets {
                let size = facet_size(i);
                if size == 0 {
                    return Err(MeshError::EmptyFacet);
                }
                offsets.push(I::from_usize(last_offset));
                last_offset += size;
            }
            self.reserved_slice_mut(ReservedAttr::FacetToFirstCorner)?[old_num_facets..]
                .copy_from_slice(&offsets);
        }
        self.resize_corners_internal(last_offset)?;
        if self.is_hybrid() {
            // After a regular-to-hybrid switch the corner_to_facet attribute
            // is fresh and must cover all corners, not just the new ones.
            let begin = if was_regular { 0 } else { old_num_facets };
            self.compute_corner_to_facet_internal(begin, self.num_facets)?;
        }
        Ok((old_num_corners, last_offset))
    }

    pub(crate) fn compute_corner_to_facet_internal(
        &mut self,
        facet_begin: usize,
        facet_end: usize,
    ) -> Result<(), MeshError> {
        let ranges: Vec<(usize, usize)> = (facet_begin..facet_end)
            .map(|f| (self.facet_corner_begin(f), self.facet_corner_end(f)))
            .collect();
        let data = self.reserved_slice_mut(ReservedAttr::CornerToFacet)?;
        for (f, (begin, end)) in (facet_begin..).zip(ranges) {
            for slot in &mut data[begin..end] {
                *slot = I::from_usize(f);
            }
        }
        Ok(())
    }
}

fn check_attribute_name(name: &str, policy: AttributeCreatePolicy) -> Result<(), MeshError> {
    if !name.starts_with('$') {
        return Ok(());
    }
    match policy {
        AttributeCreatePolicy::ErrorIfReserved => {
            Err(MeshError::ReservedAttributeName(name.to_string()))
        }
        AttributeCreatePolicy::Force => {
            if ReservedAttr::from_name(name).is_some() {
                Ok(())
            } else {
                Err(MeshError::UnknownReservedAttribute(name.to_string()))
            }
        }
    }
}

/// Reinterpret an erased handle under another index type when the runtime
/// types match.
fn share_erased<I: IndexValue, J: IndexValue>(
    handle: &Arc<ErasedAttribute<I>>,
) -> Option<Arc<ErasedAttribute<J>>> {
    let cloned = Arc::clone(handle);
    let any: Arc<dyn Any + Send + Sync> = cloned;
    any.downcast::<ErasedAttribute<J>>().ok()
}

/// Convert an index-valued attribute to another index type, remapping the
/// invalid marker. A plain numeric cast would turn a narrow sentinel into an
/// ordinary value of the wider type.
fn cast_index_attribute<I, J>(attr: &Attribute<I>) -> Result<Attribute<J>, MeshError>
where
    I: IndexValue + AsPrimitive<J>,
    J: IndexValue,
{
    let remap = |v: I| {
        if is_invalid(v) {
            invalid_index::<J>()
        } else {
            v.as_()
        }
    };
    let mut out = Attribute::<J>::new(attr.element(), attr.usage(), attr.num_channels());
    out.set_default_value(remap(attr.default_value()));
    let data: Vec<J> = attr.as_slice().iter().map(|&v| remap(v)).collect();
    out.insert_elements(&data)?;
    Ok(out)
}

impl<S: Scalar, I: IndexValue> DebugInvariants for SurfaceMesh<S, I> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "SurfaceMesh");
    }

    fn validate_invariants(&self) -> Result<(), MeshError> {
        let fail = |msg: String| Err(MeshError::InvariantViolation(msg));
        if self.positions().num_elements() != self.num_vertices {
            return fail(format!(
                "position attribute holds {} rows, mesh has {} vertices",
                self.positions().num_elements(),
                self.num_vertices
            ));
        }
        let c2v = self.reserved_slice(ReservedAttr::CornerToVertex);
        if c2v.len() != self.num_corners {
            return fail(format!(
                "corner_to_vertex holds {} entries, mesh has {} corners",
                c2v.len(),
                self.num_corners
            ));
        }
        for (c, &v) in c2v.iter().enumerate() {
            if !is_invalid(v) && v.to_usize() >= self.num_vertices {
                return fail(format!("corner {c} references missing vertex"));
            }
        }
        if self.is_regular() {
            if self.num_corners != self.num_facets * self.vertex_per_facet {
                return fail("regular corner count does not match facets * arity".to_string());
            }
        } else {
            let offsets = self.reserved_slice(ReservedAttr::FacetToFirstCorner);
            let mut prev = 0;
            for (f, &off) in offsets.iter().enumerate() {
                let off = off.to_usize();
                if off > self.num_corners || (f > 0 && off <= prev) {
                    return fail(format!("facet {f} has a non-monotonic corner offset"));
                }
                prev = off;
            }
        }
        if self.has_edges() {
            let c2e = self.reserved_slice(ReservedAttr::CornerToEdge);
            for (c, &e) in c2e.iter().enumerate() {
                if is_invalid(e) || e.to_usize() >= self.num_edges {
                    return fail(format!("corner {c} has no valid edge"));
                }
            }
            let heads = self.reserved_slice(ReservedAttr::EdgeToFirstCorner);
            for (e, &c) in heads.iter().enumerate() {
                if is_invalid(c) {
                    return fail(format!("edge {e} has no incident corner"));
                }
                if c2e[c.to_usize()].to_usize() != e {
                    return fail(format!("edge {e} head corner points at another edge"));
                }
            }
        }
        Ok(())
    }
}

// Meshes move freely across threads; attribute handles are `Arc`-shared.
static_assertions::assert_impl_all!(SurfaceMesh: Send, Sync, Clone);
static_assertions::assert_impl_all!(SurfaceMesh<f32, u64>: Send, Sync, Clone);
