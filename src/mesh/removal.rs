//! Element removal and reindexing.
//!
//! Removal compacts the surviving elements in order. Every pass follows the
//! same two-step scheme: first rewrite stored element indices through an
//! old-to-new mapping (discarded elements map to the invalid marker), then
//! move the per-element attribute rows into their compacted positions.
//! Corners go first so that the connectivity chains can be repaired while
//! old corner ids are still addressable, then edges, then facets.

use super::{ReservedAttr, SurfaceMesh};
use crate::attribute::value::{invalid_index, is_invalid};
use crate::attribute::{AttributeDeletePolicy, AttributeElement, AttributeUsage};
use crate::attribute::{AttributeId, IndexValue, Scalar};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;

impl<S: Scalar, I: IndexValue> SurfaceMesh<S, I> {
    /// Remove the listed vertices, given in strictly increasing order. Facets
    /// using a removed vertex are removed as well.
    pub fn remove_vertices(&mut self, vertices: &[usize]) -> Result<(), MeshError> {
        let (mapping, new_count) =
            build_mapping_from_list::<I>(vertices, self.num_vertices(), "vertex")?;
        if new_count == self.num_vertices() {
            return Ok(());
        }
        self.remove_vertices_mapped(&mapping, new_count)
    }

    /// Remove every vertex for which the predicate returns true.
    pub fn remove_vertices_if<P>(&mut self, mut should_remove: P) -> Result<(), MeshError>
    where
        P: FnMut(usize) -> bool,
    {
        let (mapping, new_count) =
            build_mapping_from_predicate::<I, _>(self.num_vertices(), |v| should_remove(v));
        if new_count == self.num_vertices() {
            return Ok(());
        }
        self.remove_vertices_mapped(&mapping, new_count)
    }

    /// Remove the listed facets, given in strictly increasing order. Vertices
    /// are kept even when they lose their last facet.
    pub fn remove_facets(&mut self, facets: &[usize]) -> Result<(), MeshError> {
        let (mapping, new_count) =
            build_mapping_from_list::<I>(facets, self.num_facets(), "facet")?;
        if new_count == self.num_facets() {
            return Ok(());
        }
        self.remove_facets_mapped(&mapping, new_count)
    }

    /// Remove every facet for which the predicate returns true.
    pub fn remove_facets_if<P>(&mut self, mut should_remove: P) -> Result<(), MeshError>
    where
        P: FnMut(usize) -> bool,
    {
        let (mapping, new_count) =
            build_mapping_from_predicate::<I, _>(self.num_facets(), |f| should_remove(f));
        if new_count == self.num_facets() {
            return Ok(());
        }
        self.remove_facets_mapped(&mapping, new_count)
    }

    /// Remove all vertices and, transitively, all facets.
    pub fn clear_vertices(&mut self) -> Result<(), MeshError> {
        self.resize_vertices_internal(0)?;
        self.clear_facets()?;
        self.clear_element_index(AttributeUsage::VertexIndex)
    }

    /// Remove all facets, corners and edges; vertices are kept.
    pub fn clear_facets(&mut self) -> Result<(), MeshError> {
        self.resize_facets_internal(0)?;
        self.resize_corners_internal(0)?;
        self.resize_edges_internal(0)?;
        if self.is_regular() {
            self.set_vertex_per_facet(0);
        }
        self.clear_element_index(AttributeUsage::FacetIndex)?;
        self.clear_element_index(AttributeUsage::CornerIndex)?;
        self.clear_element_index(AttributeUsage::EdgeIndex)
    }

    /// Switch a hybrid mesh back to regular storage when all facets share
    /// the same size. No-op otherwise.
    pub fn compress_if_regular(&mut self) -> Result<(), MeshError> {
        if self.is_regular() {
            return Ok(());
        }
        let num_facets = self.num_facets();
        let size = if num_facets > 0 { self.facet_size(0) } else { 0 };
        for f in 1..num_facets {
            if self.facet_size(f) != size {
                return Ok(());
            }
        }
        self.delete_attribute_with_policy(
            ReservedAttr::FacetToFirstCorner.name(),
            AttributeDeletePolicy::Force,
        )?;
        self.delete_attribute_with_policy(
            ReservedAttr::CornerToFacet.name(),
            AttributeDeletePolicy::Force,
        )?;
        self.set_vertex_per_facet(size);
        Ok(())
    }

    /// Release excess capacity of every attribute buffer.
    pub fn shrink_to_fit(&mut self) {
        let ids: Vec<AttributeId> = self.attribute_ids();
        for id in ids {
            if let Some(attr) = self.attribute_write(id) {
                attr.shrink_to_fit();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn remove_vertices_mapped(
        &mut self,
        old_to_new: &[I],
        new_num_vertices: usize,
    ) -> Result<(), MeshError> {
        self.update_element_index(AttributeUsage::VertexIndex, old_to_new)?;
        self.remap_element_rows(AttributeElement::Vertex, old_to_new, new_num_vertices)?;
        self.resize_vertices_internal(new_num_vertices)?;
        // Corners of removed vertices were just rewritten to the invalid
        // marker; any facet touching one goes too.
        let doomed: Vec<bool> = (0..self.num_facets())
            .map(|f| self.facet_vertices(f).iter().copied().any(is_invalid))
            .collect();
        self.remove_facets_if(|f| doomed[f])?;
        self.debug_assert_invariants();
        Ok(())
    }

    fn remove_facets_mapped(
        &mut self,
        old_to_new: &[I],
        new_num_facets: usize,
    ) -> Result<(), MeshError> {
        let old_num_facets = self.num_facets();
        let old_num_corners = self.num_corners();

        // Corner mapping follows the kept facets in order.
        let mut corner_map = vec![invalid_index::<I>(); old_num_corners];
        let mut new_num_corners = 0;
        if self.is_regular() {
            let vpf = self.vertex_per_facet().expect("regular storage");
            for (f, &nf) in old_to_new.iter().enumerate() {
                if is_invalid(nf) {
                    continue;
                }
                let nf = nf.to_usize();
                for k in 0..vpf {
                    corner_map[f * vpf + k] = I::from_usize(nf * vpf + k);
                }
            }
            new_num_corners = new_num_facets * vpf;
        } else {
            for f in 0..old_num_facets {
                if is_invalid(old_to_new[f]) {
                    continue;
                }
                for c in self.facet_corner_begin(f)..self.facet_corner_end(f) {
                    corner_map[c] = I::from_usize(new_num_corners);
                    new_num_corners += 1;
                }
            }
        }

        // Chains must be repaired before corner ids are rewritten: walking
        // past discarded corners needs the old chain entries.
        if self.has_edges() {
            self.repair_chain(
                ReservedAttr::VertexToFirstCorner,
                ReservedAttr::NextCornerAroundVertex,
                &corner_map,
            )?;
            self.repair_chain(
                ReservedAttr::EdgeToFirstCorner,
                ReservedAttr::NextCornerAroundEdge,
                &corner_map,
            )?;
        }
        self.update_element_index(AttributeUsage::CornerIndex, &corner_map)?;
        self.remap_element_rows(AttributeElement::Corner, &corner_map, new_num_corners)?;
        self.resize_corners_internal(new_num_corners)?;

        // An edge whose repaired chain head came up empty has no surviving
        // incident corner and is dropped.
        if self.has_edges() {
            let heads = self.copy_reserved(ReservedAttr::EdgeToFirstCorner);
            let mut edge_map = vec![invalid_index::<I>(); heads.len()];
            let mut new_num_edges = 0;
            for (e, &head) in heads.iter().enumerate() {
                if !is_invalid(head) {
                    edge_map[e] = I::from_usize(new_num_edges);
                    new_num_edges += 1;
                }
            }
            self.update_element_index(AttributeUsage::EdgeIndex, &edge_map)?;
            self.remap_element_rows(AttributeElement::Edge, &edge_map, new_num_edges)?;
            self.resize_edges_internal(new_num_edges)?;
        }

        self.update_element_index(AttributeUsage::FacetIndex, old_to_new)?;
        self.remap_element_rows(AttributeElement::Facet, old_to_new, new_num_facets)?;
        self.resize_facets_internal(new_num_facets)?;

        log::debug!(
            "removed facets; {} facets, {} corners, {} edges remain",
            self.num_facets(),
            self.num_corners(),
            self.num_edges()
        );
        self.debug_assert_invariants();
        Ok(())
    }

    /// Redirect a chain's heads and next links past discarded corners. Both
    /// buffers still hold old corner ids afterwards; the index rewrite pass
    /// maps them to new ids.
    fn repair_chain(
        &mut self,
        head: ReservedAttr,
        next: ReservedAttr,
        corner_map: &[I],
    ) -> Result<(), MeshError> {
        let old_next = self.copy_reserved(next);
        let next_valid = |mut c: I| {
            while !is_invalid(c) && is_invalid(corner_map[c.to_usize()]) {
                c = old_next[c.to_usize()];
            }
            c
        };
        let mut heads = self.copy_reserved(head);
        for h in heads.iter_mut() {
            // Invalid heads stay invalid (isolated vertices).
            if !is_invalid(*h) {
                *h = next_valid(*h);
            }
        }
        self.store_reserved(head, &heads)?;
        let mut new_next = old_next.clone();
        for (c, n) in new_next.iter_mut().enumerate() {
            if !is_invalid(corner_map[c]) {
                *n = next_valid(*n);
            }
        }
        self.store_reserved(next, &new_next)?;
        Ok(())
    }

    /// Rewrite the stored indices of every attribute with the given
    /// element-index usage and the mesh index type. Invalid entries are
    /// preserved.
    pub(crate) fn update_element_index(
        &mut self,
        usage: AttributeUsage,
        old_to_new: &[I],
    ) -> Result<(), MeshError> {
        debug_assert!(usage.is_element_index());
        let kind = match usage {
            AttributeUsage::VertexIndex => "vertex",
            AttributeUsage::FacetIndex => "facet",
            AttributeUsage::CornerIndex => "corner",
            _ => "edge",
        };
        let count = old_to_new.len();
        let ids: Vec<AttributeId> = self.attribute_ids();
        for id in ids {
            let attr = self.attribute_read(id).expect("registered id");
            if attr.usage() != usage || attr.value_type() != I::VALUE_TYPE {
                continue;
            }
            self.attribute_write(id)
                .expect("registered id")
                .map_index_values(|v| {
                    if is_invalid(v) {
                        Ok(v)
                    } else if v.to_usize() >= count {
                        Err(MeshError::ElementIndexOutOfBounds {
                            kind,
                            index: v.to_usize(),
                            count,
                        })
                    } else {
                        Ok(old_to_new[v.to_usize()])
                    }
                })?;
        }
        Ok(())
    }

    /// Fill the stored indices of every attribute with the given usage with
    /// the attribute default value.
    pub(crate) fn clear_element_index(&mut self, usage: AttributeUsage) -> Result<(), MeshError> {
        debug_assert!(usage.is_element_index());
        let ids: Vec<AttributeId> = self.attribute_ids();
        for id in ids {
            let attr = self.attribute_read(id).expect("registered id");
            if attr.usage() != usage || attr.value_type() != I::VALUE_TYPE {
                continue;
            }
            self.attribute_write(id)
                .expect("registered id")
                .reset_index_values()?;
        }
        Ok(())
    }

    /// Compact the rows of every attribute attached to `element` according
    /// to the mapping, then truncate to `new_count`.
    pub(crate) fn remap_element_rows(
        &mut self,
        element: AttributeElement,
        old_to_new: &[I],
        new_count: usize,
    ) -> Result<(), MeshError> {
        let ids: Vec<AttributeId> = self.attribute_ids();
        for id in ids {
            let kind = self.attribute_read(id).expect("registered id").element();
            let matches = kind == element
                || (element == AttributeElement::Corner && kind == AttributeElement::Indexed);
            if matches {
                self.attribute_write(id)
                    .expect("registered id")
                    .apply_element_mapping(old_to_new, new_count)?;
            }
        }
        Ok(())
    }
}

fn build_mapping_from_list<I: IndexValue>(
    list: &[usize],
    count: usize,
    kind: &'static str,
) -> Result<(Vec<I>, usize), MeshError> {
    let mut remove = vec![false; count];
    let mut prev = None;
    for &index in list {
        if index >= count {
            return Err(MeshError::ElementIndexOutOfBounds { kind, index, count });
        }
        if prev.is_some_and(|p| index <= p) {
            return Err(MeshError::RemovalIndicesNotSorted);
        }
        prev = Some(index);
        remove[index] = true;
    }
    Ok(compact_mapping(&remove))
}

fn build_mapping_from_predicate<I: IndexValue, P: FnMut(usize) -> bool>(
    count: usize,
    mut should_remove: P,
) -> (Vec<I>, usize) {
    let remove: Vec<bool> = (0..count).map(|i| should_remove(i)).collect();
    compact_mapping(&remove)
}

fn compact_mapping<I: IndexValue>(remove: &[bool]) -> (Vec<I>, usize) {
    let mut mapping = Vec::with_capacity(remove.len());
    let mut kept = 0;
    for &r in remove {
        if r {
            mapping.push(invalid_index::<I>());
        } else {
            mapping.push(I::from_usize(kept));
            kept += 1;
        }
    }
    (mapping, kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(n: usize) -> SurfaceMesh<f64, u32> {
        // n quads in a row over 2(n+1) vertices.
        let mut mesh = SurfaceMesh::<f64, u32>::new(2).unwrap();
        for i in 0..=n {
            mesh.add_vertex(&[i as f64, 0.0]).unwrap();
            mesh.add_vertex(&[i as f64, 1.0]).unwrap();
        }
        for i in 0..n as u32 {
            mesh.add_quad(2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1).unwrap();
        }
        mesh
    }

    #[test]
    fn removal_list_is_validated() {
        let mut mesh = strip(3);
        assert!(matches!(
            mesh.remove_facets(&[1, 1]),
            Err(MeshError::RemovalIndicesNotSorted)
        ));
        assert!(matches!(
            mesh.remove_facets(&[2, 1]),
            Err(MeshError::RemovalIndicesNotSorted)
        ));
        assert!(matches!(
            mesh.remove_facets(&[3]),
            Err(MeshError::ElementIndexOutOfBounds { .. })
        ));
        assert_eq!(mesh.num_facets(), 3);
        mesh.remove_facets(&[]).unwrap();
        assert_eq!(mesh.num_facets(), 3);
    }

    #[test]
    fn out_of_range_stored_index_is_reported() {
        let mut mesh = strip(2);
        let id = mesh
            .create_attribute::<u32>(
                "anchor",
                AttributeElement::Facet,
                AttributeUsage::VertexIndex,
                1,
            )
            .unwrap();
        mesh.attribute_mut::<u32>(id).unwrap().as_slice_mut().unwrap()[0] = 1000;
        assert!(matches!(
            mesh.remove_vertices(&[0]),
            Err(MeshError::ElementIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn remove_facets_compacts_attributes() {
        let mut mesh = strip(3);
        mesh.create_attribute_from::<f64>(
            "area",
            AttributeElement::Facet,
            AttributeUsage::Scalar,
            1,
            &[10.0, 11.0, 12.0],
            &[],
        )
        .unwrap();
        mesh.remove_facets(&[1]).unwrap();
        assert_eq!(mesh.num_facets(), 2);
        assert_eq!(mesh.num_corners(), 8);
        assert_eq!(mesh.facet_vertices(0), &[0, 2, 3, 1]);
        assert_eq!(mesh.facet_vertices(1), &[4, 6, 7, 5]);
        let area = mesh.attribute_by_name::<f64>("area").unwrap();
        assert_eq!(area.as_slice(), &[10.0, 12.0]);
    }

    #[test]
    fn remove_vertices_cascades_to_facets() {
        let mut mesh = strip(3);
        mesh.remove_vertices(&[0]).unwrap();
        // Vertex 0 belonged only to the first quad.
        assert_eq!(mesh.num_vertices(), 7);
        assert_eq!(mesh.num_facets(), 2);
        assert_eq!(mesh.facet_vertices(0), &[1, 3, 4, 2]);
        assert_eq!(mesh.position(0), &[0.0, 1.0]);
        assert_eq!(mesh.position(1), &[1.0, 0.0]);
    }

    #[test]
    fn remove_vertices_if_predicate() {
        let mut mesh = strip(2);
        let xs: Vec<f64> = (0..mesh.num_vertices())
            .map(|v| mesh.position(v)[0])
            .collect();
        mesh.remove_vertices_if(|v| xs[v] > 1.5).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_facets(), 1);
    }

    #[test]
    fn removal_repairs_edge_connectivity() {
        let mut mesh = strip(3);
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.num_edges(), 10);
        mesh.remove_facets(&[1]).unwrap();
        // The middle quad's two side edges were shared and survive; its top
        // and bottom edges are gone.
        assert_eq!(mesh.num_edges(), 8);
        for f in 0..mesh.num_facets() {
            for lv in 0..4 {
                let e = mesh.get_edge(f, lv);
                let (a, b) = mesh.get_edge_vertices(e).unwrap();
                let verts = mesh.facet_vertices(f);
                assert!(verts.contains(&a) && verts.contains(&b));
            }
        }
        let side = mesh.find_edge_from_vertices(2, 3).unwrap();
        assert!(mesh.is_boundary_edge(side));
        assert_eq!(mesh.count_num_corners_around_edge(side), 1);
    }

    #[test]
    fn remove_all_facets_around_vertex_keeps_vertex() {
        let mut mesh = strip(2);
        mesh.initialize_edges().unwrap();
        mesh.remove_facets(&[0, 1]).unwrap();
        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(mesh.num_facets(), 0);
        assert_eq!(mesh.num_edges(), 0);
        assert_eq!(mesh.get_first_corner_around_vertex(0), None);
    }

    #[test]
    fn hybrid_removal_rebuilds_offsets() {
        let mut mesh = SurfaceMesh::<f64, u32>::new(2).unwrap();
        mesh.add_vertices(6).unwrap();
        mesh.add_triangle(0, 1, 2).unwrap();
        mesh.add_quad(0, 2, 4, 5).unwrap();
        mesh.add_triangle(2, 3, 4).unwrap();
        assert!(mesh.is_hybrid());
        mesh.remove_facets(&[1]).unwrap();
        assert_eq!(mesh.num_facets(), 2);
        assert_eq!(mesh.num_corners(), 6);
        assert_eq!(mesh.facet_vertices(0), &[0, 1, 2]);
        assert_eq!(mesh.facet_vertices(1), &[2, 3, 4]);
        assert_eq!(mesh.corner_facet(5), 1);
        // All facets are triangles now, so the mesh can be compacted.
        mesh.compress_if_regular().unwrap();
        assert!(mesh.is_regular());
        assert_eq!(mesh.vertex_per_facet().unwrap(), 3);
        assert_eq!(mesh.facet_vertices(1), &[2, 3, 4]);
    }

    #[test]
    fn clear_facets_keeps_vertices() {
        let mut mesh = strip(2);
        mesh.initialize_edges().unwrap();
        mesh.clear_facets().unwrap();
        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(mesh.num_facets(), 0);
        assert_eq!(mesh.num_corners(), 0);
        assert_eq!(mesh.num_edges(), 0);
        // Edge connectivity stays initialized and tracks new facets.
        assert!(mesh.has_edges());
        mesh.add_triangle(0, 1, 2).unwrap();
        assert_eq!(mesh.num_edges(), 3);
    }

    #[test]
    fn clear_vertices_empties_the_mesh() {
        let mut mesh = strip(2);
        mesh.clear_vertices().unwrap();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_facets(), 0);
        assert_eq!(mesh.num_corners(), 0);
    }

    #[test]
    fn indexed_attribute_rows_follow_corners() {
        let mut mesh = strip(3);
        let indices: Vec<u32> = (0..12).collect();
        let values: Vec<f64> = (0..24).map(|i| i as f64).collect();
        mesh.create_attribute_from::<f64>(
            "uv",
            AttributeElement::Indexed,
            AttributeUsage::UV,
            2,
            &values,
            &indices,
        )
        .unwrap();
        mesh.remove_facets(&[0]).unwrap();
        let uv = mesh.indexed_attribute::<f64>(mesh.get_attribute_id("uv").unwrap()).unwrap();
        assert_eq!(uv.indices().num_elements(), 8);
        assert_eq!(uv.indices().as_slice(), &[4, 5, 6, 7, 8, 9, 10, 11]);
        // Values are untouched, only the per-corner rows moved.
        assert_eq!(uv.values().num_elements(), 12);
    }
}
