//! Edge connectivity.
//!
//! Edges are unoriented vertex pairs, discovered from facet corners. The
//! incidence maps are intrusive singly-linked lists threaded through corner
//! attributes: every edge and every vertex stores a first corner, every
//! corner stores the next corner around its edge and around its vertex. A
//! corner `c` with vertex `v` represents the facet-local edge from `v` to the
//! vertex of the next corner in the same facet.
//!
//! Connectivity is optional. Once initialized it is kept up to date by facet
//! insertion and removal; structural facet edits that cannot be tracked are
//! refused while it exists.

use itertools::Itertools;

use super::{ReservedAttr, SurfaceMesh};
use crate::attribute::value::is_invalid;
use crate::attribute::{AttributeDeletePolicy, AttributeElement, AttributeUsage};
use crate::attribute::{IndexValue, Scalar};
use crate::mesh_error::MeshError;
use crate::parallel;

const EDGE_ATTRS: [ReservedAttr; 5] = [
    ReservedAttr::CornerToEdge,
    ReservedAttr::EdgeToFirstCorner,
    ReservedAttr::VertexToFirstCorner,
    ReservedAttr::NextCornerAroundEdge,
    ReservedAttr::NextCornerAroundVertex,
];

/// Canonical (smaller, larger) vertex pair of an unoriented edge.
fn edge_key<I: IndexValue>(a: I, b: I) -> (I, I) {
    if a <= b { (a, b) } else { (b, a) }
}

impl<S: Scalar, I: IndexValue> SurfaceMesh<S, I> {
    /// Build edge and connectivity information. Edge ids are assigned in
    /// order of first appearance over sorted vertex pairs; no-op with a
    /// warning if edges are already initialized.
    pub fn initialize_edges(&mut self) -> Result<(), MeshError> {
        if self.has_edges() {
            log::warn!("edges are already initialized; ignoring request");
            return Ok(());
        }
        self.create_edge_attributes()?;
        self.update_edges_range_internal(0, self.num_facets(), None)
    }

    /// Build edge information with a caller-chosen edge ordering, given as a
    /// flat `[v0, v1, v0, v1, ...]` buffer covering every mesh edge exactly
    /// once. If edges are already initialized the ordering cannot be applied
    /// and is ignored with a warning.
    pub fn initialize_edges_with_ordering(&mut self, user_edges: &[I]) -> Result<(), MeshError> {
        if self.has_edges() {
            log::warn!("edges are already initialized; ignoring user-provided edge ordering");
            return Ok(());
        }
        if user_edges.len() % 2 != 0 {
            return Err(MeshError::UserEdgeArrayOddLength(user_edges.len()));
        }
        self.create_edge_attributes()?;
        let result = self.update_edges_range_internal(0, self.num_facets(), Some(user_edges));
        if result.is_err() {
            // Roll back to the uninitialized state rather than keeping a
            // partially built connectivity.
            self.clear_edges()?;
        }
        result
    }

    /// Drop all edge and connectivity information.
    pub fn clear_edges(&mut self) -> Result<(), MeshError> {
        for r in EDGE_ATTRS {
            if self.reserved_id(r).is_some() {
                self.delete_attribute_with_policy(r.name(), AttributeDeletePolicy::Force)?;
            }
        }
        self.resize_edges_internal(0)
    }

    fn create_edge_attributes(&mut self) -> Result<(), MeshError> {
        self.create_attribute_internal::<I>(
            ReservedAttr::CornerToEdge.name(),
            AttributeElement::Corner,
            AttributeUsage::EdgeIndex,
            1,
        )?;
        self.create_attribute_internal::<I>(
            ReservedAttr::EdgeToFirstCorner.name(),
            AttributeElement::Edge,
            AttributeUsage::CornerIndex,
            1,
        )?;
        self.create_attribute_internal::<I>(
            ReservedAttr::VertexToFirstCorner.name(),
            AttributeElement::Vertex,
            AttributeUsage::CornerIndex,
            1,
        )?;
        self.create_attribute_internal::<I>(
            ReservedAttr::NextCornerAroundEdge.name(),
            AttributeElement::Corner,
            AttributeUsage::CornerIndex,
            1,
        )?;
        self.create_attribute_internal::<I>(
            ReservedAttr::NextCornerAroundVertex.name(),
            AttributeElement::Corner,
            AttributeUsage::CornerIndex,
            1,
        )?;
        Ok(())
    }

    /// Register the edges of the last `count` facets. No-op without edge
    /// information.
    pub(crate) fn update_edges_last_internal(&mut self, count: usize) -> Result<(), MeshError> {
        if !self.has_edges() {
            return Ok(());
        }
        let end = self.num_facets();
        self.update_edges_range_internal(end - count, end, None)
    }

    /// Assign edge ids to every corner of the facet range and thread the new
    /// corners into the incidence chains. When the range covers the whole
    /// mesh every edge is new; otherwise each candidate is first looked up in
    /// the existing connectivity.
    pub(crate) fn update_edges_range_internal(
        &mut self,
        facet_begin: usize,
        facet_end: usize,
        user_edges: Option<&[I]>,
    ) -> Result<(), MeshError> {
        let whole_mesh = facet_begin == 0 && facet_end == self.num_facets();
        debug_assert!(user_edges.is_none() || whole_mesh);

        // Candidate edges keyed by vertex pair; `corner` disambiguates
        // nothing, it records where the edge id must be written.
        let mut candidates: Vec<((I, I), I)> = Vec::new();
        let mut known: Vec<(usize, I)> = Vec::new();
        for f in facet_begin..facet_end {
            let begin = self.facet_corner_begin(f);
            let end = self.facet_corner_end(f);
            for c in begin..end {
                let cn = if c + 1 == end { begin } else { c + 1 };
                let v0 = self.reserved_slice(ReservedAttr::CornerToVertex)[c];
                let v1 = self.reserved_slice(ReservedAttr::CornerToVertex)[cn];
                let key = edge_key(v0, v1);
                if !whole_mesh {
                    if let Some(e) = self.find_matching_edge(key) {
                        known.push((c, e));
                        continue;
                    }
                }
                candidates.push((key, I::from_usize(c)));
            }
        }
        parallel::sort_unstable_by_key(&mut candidates, |&(key, _)| key);

        let num_runs = candidates.iter().map(|&(key, _)| key).dedup().count();

        // A user ordering names every edge exactly once; sort it by the same
        // key and walk the runs in lockstep.
        let user_sorted: Option<Vec<((I, I), usize)>> = match user_edges {
            Some(pairs) => {
                let count = pairs.len() / 2;
                if count != num_runs {
                    return Err(MeshError::WrongUserEdgeCount {
                        expected: num_runs,
                        actual: count,
                    });
                }
                let mut sorted: Vec<((I, I), usize)> = (0..count)
                    .map(|i| (edge_key(pairs[2 * i], pairs[2 * i + 1]), i))
                    .collect();
                parallel::sort_unstable_by_key(&mut sorted, |&(key, _)| key);
                Some(sorted)
            }
            None => None,
        };

        let old_num_edges = self.num_edges();
        let mut corner_to_edge = self.copy_reserved(ReservedAttr::CornerToEdge);
        for (c, e) in known {
            corner_to_edge[c] = e;
        }
        let mut new_edge_count = 0;
        for (key, run) in &candidates.iter().chunk_by(|&&(key, _)| key) {
            let edge_id = match &user_sorted {
                Some(user) => {
                    let (user_key, user_index) = user[new_edge_count];
                    if user_key != key {
                        return Err(MeshError::MismatchedEdgeVertices {
                            v0: user_key.0.as_(),
                            v1: user_key.1.as_(),
                        });
                    }
                    user_index
                }
                None => old_num_edges + new_edge_count,
            };
            for &(_, corner) in run {
                corner_to_edge[corner.to_usize()] = I::from_usize(edge_id);
            }
            new_edge_count += 1;
        }
        self.store_reserved(ReservedAttr::CornerToEdge, &corner_to_edge)?;
        self.resize_edges_internal(old_num_edges + new_edge_count)?;

        // Thread the new corners into the per-edge and per-vertex chains.
        // Prepending keeps existing chain tails intact.
        let corner_to_vertex = self.copy_reserved(ReservedAttr::CornerToVertex);
        let mut edge_head = self.copy_reserved(ReservedAttr::EdgeToFirstCorner);
        let mut vertex_head = self.copy_reserved(ReservedAttr::VertexToFirstCorner);
        let mut next_around_edge = self.copy_reserved(ReservedAttr::NextCornerAroundEdge);
        let mut next_around_vertex = self.copy_reserved(ReservedAttr::NextCornerAroundVertex);
        for f in facet_begin..facet_end {
            for c in self.facet_corner_begin(f)..self.facet_corner_end(f) {
                let e = corner_to_edge[c].to_usize();
                next_around_edge[c] = edge_head[e];
                edge_head[e] = I::from_usize(c);
                let v = corner_to_vertex[c].to_usize();
                next_around_vertex[c] = vertex_head[v];
                vertex_head[v] = I::from_usize(c);
            }
        }
        self.store_reserved(ReservedAttr::EdgeToFirstCorner, &edge_head)?;
        self.store_reserved(ReservedAttr::VertexToFirstCorner, &vertex_head)?;
        self.store_reserved(ReservedAttr::NextCornerAroundEdge, &next_around_edge)?;
        self.store_reserved(ReservedAttr::NextCornerAroundVertex, &next_around_vertex)?;
        Ok(())
    }

    /// Existing edge with the given canonical vertex pair, if any. Only the
    /// already-threaded chains are consulted.
    fn find_matching_edge(&self, key: (I, I)) -> Option<I> {
        let v = key.0.to_usize();
        if v >= self.num_vertices() {
            return None;
        }
        let mut found = None;
        self.foreach_edge_around_vertex_with_duplicates(v, |e| {
            if found.is_none() {
                if let Ok((a, b)) = self.get_edge_vertices(e) {
                    if edge_key(a, b) == key {
                        found = Some(I::from_usize(e));
                    }
                }
            }
        });
        found
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Edge of the `lv`-th facet-local edge of facet `f`.
    pub fn get_edge(&self, f: usize, lv: usize) -> usize {
        debug_assert!(lv < self.facet_size(f));
        self.get_corner_edge(self.facet_corner_begin(f) + lv)
    }

    /// Edge represented by a corner.
    pub fn get_corner_edge(&self, c: usize) -> usize {
        self.reserved_slice(ReservedAttr::CornerToEdge)[c].to_usize()
    }

    /// Endpoints of an edge, read from its first incident corner.
    pub fn get_edge_vertices(&self, e: usize) -> Result<(I, I), MeshError> {
        let c = self.reserved_slice(ReservedAttr::EdgeToFirstCorner)[e];
        if is_invalid(c) {
            return Err(MeshError::InvariantViolation(format!(
                "edge {e} has no incident corner"
            )));
        }
        let c = c.to_usize();
        let f = self.corner_facet(c);
        let begin = self.facet_corner_begin(f);
        let end = self.facet_corner_end(f);
        let cn = if c + 1 == end { begin } else { c + 1 };
        let c2v = self.reserved_slice(ReservedAttr::CornerToVertex);
        Ok((c2v[c], c2v[cn]))
    }

    /// Edge joining two vertices, if present.
    pub fn find_edge_from_vertices(&self, v0: usize, v1: usize) -> Option<usize> {
        let key = edge_key(I::from_usize(v0), I::from_usize(v1));
        let mut found = None;
        self.foreach_edge_around_vertex_with_duplicates(v0, |e| {
            if found.is_none() {
                if let Ok((a, b)) = self.get_edge_vertices(e) {
                    if edge_key(a, b) == key {
                        found = Some(e);
                    }
                }
            }
        });
        found
    }

    pub fn get_first_corner_around_edge(&self, e: usize) -> Option<usize> {
        let c = self.reserved_slice(ReservedAttr::EdgeToFirstCorner)[e];
        (!is_invalid(c)).then(|| c.to_usize())
    }

    pub fn get_next_corner_around_edge(&self, c: usize) -> Option<usize> {
        let n = self.reserved_slice(ReservedAttr::NextCornerAroundEdge)[c];
        (!is_invalid(n)).then(|| n.to_usize())
    }

    pub fn get_first_corner_around_vertex(&self, v: usize) -> Option<usize> {
        let c = self.reserved_slice(ReservedAttr::VertexToFirstCorner)[v];
        (!is_invalid(c)).then(|| c.to_usize())
    }

    pub fn get_next_corner_around_vertex(&self, c: usize) -> Option<usize> {
        let n = self.reserved_slice(ReservedAttr::NextCornerAroundVertex)[c];
        (!is_invalid(n)).then(|| n.to_usize())
    }

    /// An edge is a boundary edge when exactly one corner is incident to it.
    pub fn is_boundary_edge(&self, e: usize) -> bool {
        let c = self.reserved_slice(ReservedAttr::EdgeToFirstCorner)[e];
        debug_assert!(!is_invalid(c));
        is_invalid(self.reserved_slice(ReservedAttr::NextCornerAroundEdge)[c.to_usize()])
    }

    pub fn count_num_corners_around_edge(&self, e: usize) -> usize {
        let mut n = 0;
        self.foreach_corner_around_edge(e, |_| n += 1);
        n
    }

    pub fn count_num_corners_around_vertex(&self, v: usize) -> usize {
        let mut n = 0;
        self.foreach_corner_around_vertex(v, |_| n += 1);
        n
    }

    pub fn get_one_corner_around_edge(&self, e: usize) -> Option<usize> {
        self.get_first_corner_around_edge(e)
    }

    pub fn get_one_corner_around_vertex(&self, v: usize) -> Option<usize> {
        self.get_first_corner_around_vertex(v)
    }

    pub fn get_one_facet_around_edge(&self, e: usize) -> Option<usize> {
        self.get_first_corner_around_edge(e)
            .map(|c| self.corner_facet(c))
    }

    pub fn foreach_corner_around_edge<F: FnMut(usize)>(&self, e: usize, mut f: F) {
        let mut cur = self.get_first_corner_around_edge(e);
        while let Some(c) = cur {
            f(c);
            cur = self.get_next_corner_around_edge(c);
        }
    }

    /// Visit the corners whose own vertex is `v`. Corners pointing at `v`
    /// from the other end of an edge are not included.
    pub fn foreach_corner_around_vertex<F: FnMut(usize)>(&self, v: usize, mut f: F) {
        let mut cur = self.get_first_corner_around_vertex(v);
        while let Some(c) = cur {
            f(c);
            cur = self.get_next_corner_around_vertex(c);
        }
    }

    /// Visit the facets incident to an edge, once per incident corner.
    pub fn foreach_facet_around_edge<F: FnMut(usize)>(&self, e: usize, mut f: F) {
        self.foreach_corner_around_edge(e, |c| f(self.corner_facet(c)));
    }

    /// Visit the facets incident to a vertex, once per incident corner.
    pub fn foreach_facet_around_vertex<F: FnMut(usize)>(&self, v: usize, mut f: F) {
        self.foreach_corner_around_vertex(v, |c| f(self.corner_facet(c)));
    }

    /// Visit every edge incident to a vertex. Each corner around the vertex
    /// contributes its own edge and the preceding facet-local edge, so
    /// interior edges are reported once per incident facet.
    pub fn foreach_edge_around_vertex_with_duplicates<F: FnMut(usize)>(&self, v: usize, mut f: F) {
        self.foreach_corner_around_vertex(v, |c| {
            let facet = self.corner_facet(c);
            let begin = self.facet_corner_begin(facet);
            let end = self.facet_corner_end(facet);
            let prev = if c == begin { end - 1 } else { c - 1 };
            let c2e = self.reserved_slice(ReservedAttr::CornerToEdge);
            let e = c2e[c];
            let e_prev = c2e[prev];
            if !is_invalid(e) {
                f(e.to_usize());
            }
            if !is_invalid(e_prev) {
                f(e_prev.to_usize());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> SurfaceMesh<f64, u32> {
        // 3---2
        // | \ |
        // 0---1
        let mut mesh = SurfaceMesh::<f64, u32>::new(2).unwrap();
        mesh.add_vertices_from(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0])
            .unwrap();
        mesh.add_triangle(0, 1, 3).unwrap();
        mesh.add_triangle(1, 2, 3).unwrap();
        mesh
    }

    #[test]
    fn edge_count_and_boundary() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.num_edges(), 5);
        let interior = mesh.find_edge_from_vertices(1, 3).unwrap();
        assert!(!mesh.is_boundary_edge(interior));
        assert_eq!(mesh.count_num_corners_around_edge(interior), 2);
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            let e = mesh.find_edge_from_vertices(a, b).unwrap();
            assert!(mesh.is_boundary_edge(e));
            assert_eq!(mesh.count_num_corners_around_edge(e), 1);
        }
        assert!(mesh.find_edge_from_vertices(0, 2).is_none());
    }

    #[test]
    fn edge_ids_are_first_seen_over_sorted_pairs() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        // Keys sorted lexicographically: (0,1) (0,3) (1,2) (1,3) (2,3).
        assert_eq!(mesh.find_edge_from_vertices(0, 1), Some(0));
        assert_eq!(mesh.find_edge_from_vertices(0, 3), Some(1));
        assert_eq!(mesh.find_edge_from_vertices(1, 2), Some(2));
        assert_eq!(mesh.find_edge_from_vertices(1, 3), Some(3));
        assert_eq!(mesh.find_edge_from_vertices(2, 3), Some(4));
    }

    #[test]
    fn user_edge_ordering() {
        let mut mesh = two_triangles();
        let ordering: [u32; 10] = [1, 3, 0, 1, 1, 2, 2, 3, 0, 3];
        mesh.initialize_edges_with_ordering(&ordering).unwrap();
        assert_eq!(mesh.num_edges(), 5);
        assert_eq!(mesh.find_edge_from_vertices(1, 3), Some(0));
        assert_eq!(mesh.find_edge_from_vertices(0, 1), Some(1));
        assert_eq!(mesh.find_edge_from_vertices(1, 2), Some(2));
        assert_eq!(mesh.find_edge_from_vertices(2, 3), Some(3));
        assert_eq!(mesh.find_edge_from_vertices(0, 3), Some(4));
    }

    #[test]
    fn user_edge_ordering_is_validated() {
        let mut mesh = two_triangles();
        assert!(matches!(
            mesh.initialize_edges_with_ordering(&[0, 1, 2]),
            Err(MeshError::UserEdgeArrayOddLength(3))
        ));
        assert!(matches!(
            mesh.initialize_edges_with_ordering(&[0, 1, 1, 2]),
            Err(MeshError::WrongUserEdgeCount {
                expected: 5,
                actual: 2
            })
        ));
        assert!(matches!(
            mesh.initialize_edges_with_ordering(&[1, 3, 0, 1, 1, 2, 2, 3, 0, 2]),
            Err(MeshError::MismatchedEdgeVertices { .. })
        ));
        // Failed attempts roll back completely.
        assert!(!mesh.has_edges());
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.num_edges(), 5);
    }

    #[test]
    fn incremental_update_reuses_existing_edges() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.num_edges(), 5);
        mesh.add_vertex(&[2.0, 0.0]).unwrap();
        mesh.add_triangle(1, 4, 2).unwrap();
        // Edge (1,2) is shared with the second triangle; two edges are new.
        assert_eq!(mesh.num_edges(), 7);
        let shared = mesh.find_edge_from_vertices(1, 2).unwrap();
        assert_eq!(mesh.count_num_corners_around_edge(shared), 2);
        assert!(!mesh.is_boundary_edge(shared));
        assert!(mesh.is_boundary_edge(mesh.find_edge_from_vertices(1, 4).unwrap()));
    }

    #[test]
    fn corners_around_vertex_cover_incident_facets() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.count_num_corners_around_vertex(1), 2);
        assert_eq!(mesh.count_num_corners_around_vertex(2), 1);
        let mut facets = Vec::new();
        mesh.foreach_facet_around_vertex(3, |f| facets.push(f));
        facets.sort_unstable();
        assert_eq!(facets, vec![0, 1]);
    }

    #[test]
    fn edges_around_vertex_with_duplicates() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        let mut edges = Vec::new();
        mesh.foreach_edge_around_vertex_with_duplicates(1, |e| edges.push(e));
        // Two corners, two edges each; the shared diagonal shows up twice.
        assert_eq!(edges.len(), 4);
        edges.sort_unstable();
        edges.dedup();
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn clear_edges_removes_connectivity() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        mesh.clear_edges().unwrap();
        assert!(!mesh.has_edges());
        assert_eq!(mesh.num_edges(), 0);
        assert!(!mesh.has_attribute("$corner_to_edge"));
        // Re-initialization starts from scratch.
        mesh.initialize_edges().unwrap();
        assert_eq!(mesh.num_edges(), 5);
    }

    #[test]
    fn facets_without_indices_are_refused_with_edges() {
        let mut mesh = two_triangles();
        mesh.initialize_edges().unwrap();
        assert!(matches!(
            mesh.add_polygons(1, 3, &[]),
            Err(MeshError::FacetsWithoutIndicesWithEdges)
        ));
        assert!(matches!(
            mesh.corner_to_vertex_mut(),
            Err(MeshError::ModifyFacetsWithEdges)
        ));
    }

}
