use std::collections::BTreeSet;

use proptest::prelude::*;
use surface_mesh::prelude::*;

const NUM_VERTICES: usize = 16;

fn build(facets: &[Vec<u32>]) -> SurfaceMesh<f64, u32> {
    let mut mesh = SurfaceMesh::new(3).unwrap();
    mesh.add_vertices_with(NUM_VERTICES, |v, p| {
        p[0] = v as f64;
        p[1] = 0.0;
        p[2] = 0.0;
    })
    .unwrap();
    for facet in facets {
        mesh.add_polygon(facet).unwrap();
    }
    mesh
}

/// Unoriented vertex pairs spanned by the mesh facets.
fn expected_edge_keys(mesh: &SurfaceMesh<f64, u32>) -> BTreeSet<(u32, u32)> {
    let mut keys = BTreeSet::new();
    for f in 0..mesh.num_facets() {
        let verts = mesh.facet_vertices(f).to_vec();
        for i in 0..verts.len() {
            let a = verts[i];
            let b = verts[(i + 1) % verts.len()];
            keys.insert((a.min(b), a.max(b)));
        }
    }
    keys
}

fn check_connectivity(mesh: &SurfaceMesh<f64, u32>) {
    mesh.validate_invariants().unwrap();
    let keys = expected_edge_keys(mesh);
    assert_eq!(mesh.num_edges(), keys.len());
    for &(a, b) in &keys {
        assert!(mesh.find_edge_from_vertices(a as usize, b as usize).is_some());
    }
    let mut corner_total = 0;
    for e in 0..mesh.num_edges() {
        corner_total += mesh.count_num_corners_around_edge(e);
    }
    assert_eq!(corner_total, mesh.num_corners());
}

fn facet_strategy() -> impl Strategy<Value = Vec<Vec<u32>>> {
    prop::collection::vec(
        prop::collection::vec(0..NUM_VERTICES as u32, 3..=5),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn edges_match_facet_graph(facets in facet_strategy()) {
        let mut mesh = build(&facets);
        mesh.initialize_edges().unwrap();
        check_connectivity(&mesh);
    }

    #[test]
    fn incremental_edges_match_batch(facets in facet_strategy()) {
        let mut incremental = SurfaceMesh::<f64, u32>::new(3).unwrap();
        incremental.add_vertices(NUM_VERTICES).unwrap();
        incremental.initialize_edges().unwrap();
        for facet in &facets {
            incremental.add_polygon(facet).unwrap();
        }
        let mut batch = build(&facets);
        batch.initialize_edges().unwrap();
        prop_assert_eq!(incremental.num_edges(), batch.num_edges());
        check_connectivity(&incremental);
    }

    #[test]
    fn facet_removal_preserves_survivors(
        facets in facet_strategy(),
        mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let mut mesh = build(&facets);
        mesh.initialize_edges().unwrap();
        let kept: Vec<Vec<u32>> = facets
            .iter()
            .enumerate()
            .filter(|(f, _)| !mask[*f])
            .map(|(_, facet)| facet.clone())
            .collect();
        mesh.remove_facets_if(|f| mask[f]).unwrap();
        prop_assert_eq!(mesh.num_facets(), kept.len());
        for (f, facet) in kept.iter().enumerate() {
            prop_assert_eq!(mesh.facet_vertices(f), facet.as_slice());
        }
        check_connectivity(&mesh);
    }

    #[test]
    fn vertex_removal_cascades(
        facets in facet_strategy(),
        mask in prop::collection::vec(any::<bool>(), NUM_VERTICES),
    ) {
        let mut mesh = build(&facets);
        let mut new_ids = vec![u32::MAX; NUM_VERTICES];
        let mut next = 0u32;
        for (v, &removed) in mask.iter().enumerate() {
            if !removed {
                new_ids[v] = next;
                next += 1;
            }
        }
        let kept: Vec<Vec<u32>> = facets
            .iter()
            .filter(|facet| facet.iter().all(|&v| !mask[v as usize]))
            .map(|facet| facet.iter().map(|&v| new_ids[v as usize]).collect())
            .collect();
        mesh.remove_vertices_if(|v| mask[v]).unwrap();
        prop_assert_eq!(mesh.num_vertices(), next as usize);
        prop_assert_eq!(mesh.num_facets(), kept.len());
        for (f, facet) in kept.iter().enumerate() {
            prop_assert_eq!(mesh.facet_vertices(f), facet.as_slice());
        }
        mesh.validate_invariants().unwrap();
    }
}
