use std::sync::Arc;

use surface_mesh::prelude::*;

fn quad_grid(rows: usize, cols: usize) -> SurfaceMesh<f64, u32> {
    let mut mesh = SurfaceMesh::new(3).unwrap();
    mesh.add_vertices_with((rows + 1) * (cols + 1), |v, p| {
        p[0] = (v % (cols + 1)) as f64;
        p[1] = (v / (cols + 1)) as f64;
        p[2] = 0.0;
    })
    .unwrap();
    for r in 0..rows {
        for c in 0..cols {
            let v = (r * (cols + 1) + c) as u32;
            let w = cols as u32 + 1;
            mesh.add_quad(v, v + 1, v + w + 1, v + w).unwrap();
        }
    }
    mesh
}

#[test]
fn build_regular_grid() {
    let mesh = quad_grid(2, 3);
    assert_eq!(mesh.num_vertices(), 12);
    assert_eq!(mesh.num_facets(), 6);
    assert_eq!(mesh.num_corners(), 24);
    assert!(mesh.is_regular());
    assert!(mesh.is_quad_mesh());
    assert!(!mesh.is_triangle_mesh());
    assert_eq!(mesh.vertex_per_facet().unwrap(), 4);
    assert_eq!(mesh.position(5), &[1.0, 1.0, 0.0]);
    mesh.debug_assert_invariants();
}

#[test]
fn hybrid_storage_round_trip() {
    let mut mesh = quad_grid(1, 2);
    mesh.add_triangle(0, 1, 4).unwrap();
    assert!(mesh.is_hybrid());
    assert!(mesh.vertex_per_facet().is_err());
    assert_eq!(mesh.facet_size(1), 4);
    assert_eq!(mesh.facet_size(2), 3);
    // Removing the triangle leaves only quads, which can be compacted.
    mesh.remove_facets(&[2]).unwrap();
    mesh.compress_if_regular().unwrap();
    assert!(mesh.is_regular());
    assert_eq!(mesh.vertex_per_facet().unwrap(), 4);
    mesh.debug_assert_invariants();
}

#[test]
fn add_hybrid_batch() {
    let mut mesh = SurfaceMesh::<f64, u32>::new(3).unwrap();
    mesh.add_vertices(6).unwrap();
    mesh.add_hybrid(&[3, 4, 4], &[0, 1, 2, 0, 2, 4, 5, 1, 2, 3, 4])
        .unwrap();
    assert_eq!(mesh.num_facets(), 3);
    assert_eq!(mesh.num_corners(), 11);
    assert_eq!(mesh.facet_vertices(1), &[0, 2, 4, 5]);
    assert_eq!(mesh.facet_vertices(2), &[1, 2, 3, 4]);
    assert!(mesh.is_hybrid());
}

#[test]
fn vertex_and_facet_attributes() {
    let mut mesh = quad_grid(1, 1);
    let weight = mesh
        .create_attribute_from::<f64>(
            "weight",
            AttributeElement::Vertex,
            AttributeUsage::Scalar,
            1,
            &[1.0, 2.0, 3.0, 4.0],
            &[],
        )
        .unwrap();
    assert_eq!(mesh.attribute::<f64>(weight).unwrap().get(2, 0), 3.0);

    // New vertices pick up the default value.
    mesh.attribute_mut::<f64>(weight).unwrap().set_default_value(-1.0);
    mesh.add_vertex(&[5.0, 5.0, 0.0]).unwrap();
    assert_eq!(mesh.attribute::<f64>(weight).unwrap().get(4, 0), -1.0);

    mesh.duplicate_attribute("weight", "weight2").unwrap();
    mesh.rename_attribute("weight2", "mass").unwrap();
    assert!(mesh.has_attribute("mass"));
    assert!(!mesh.has_attribute("weight2"));
    mesh.delete_attribute("mass").unwrap();
    assert!(!mesh.has_attribute("mass"));
}

#[test]
fn indexed_attribute_access() {
    let mut mesh = quad_grid(1, 1);
    let id = mesh
        .create_attribute_from::<f32>(
            "uv",
            AttributeElement::Indexed,
            AttributeUsage::UV,
            2,
            &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            &[0, 1, 2, 3],
        )
        .unwrap();
    assert!(mesh.is_attribute_indexed(id).unwrap());
    let uv = mesh.indexed_attribute::<f32>(id).unwrap();
    assert_eq!(uv.values().num_elements(), 4);
    assert_eq!(uv.indices().num_elements(), 4);
    assert_eq!(uv.values().row(2), &[1.0, 1.0]);
}

#[test]
fn value_attribute_is_not_resized() {
    let mut mesh = quad_grid(1, 1);
    mesh.create_attribute_from::<u8>(
        "palette",
        AttributeElement::Value,
        AttributeUsage::Color,
        3,
        &[255, 0, 0, 0, 255, 0],
        &[],
    )
    .unwrap();
    mesh.add_vertex(&[9.0, 9.0, 0.0]).unwrap();
    let palette = mesh.attribute_by_name::<u8>("palette").unwrap();
    assert_eq!(palette.num_elements(), 2);
}

#[test]
fn wrapped_vertex_and_facet_buffers() {
    let positions = Arc::new(vec![
        0.0f64, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
    ]);
    let facets = Arc::new(vec![0u32, 1, 2, 0, 2, 3]);
    let mut mesh = SurfaceMesh::<f64, u32>::new(3).unwrap();
    mesh.wrap_as_vertices(positions.clone(), 4).unwrap();
    mesh.wrap_as_facets(facets.clone(), 2, 3).unwrap();
    assert_eq!(mesh.num_vertices(), 4);
    assert_eq!(mesh.num_facets(), 2);
    assert_eq!(mesh.facet_vertices(1), &[0, 2, 3]);
    assert!(mesh.positions().is_external());

    // Writing through the mesh detaches from the shared buffer.
    mesh.position_mut(0).unwrap()[0] = 7.0;
    assert_eq!(positions[0], 0.0);
    assert_eq!(mesh.position(0)[0], 7.0);
    mesh.debug_assert_invariants();
}

#[test]
fn const_wrap_refuses_writes() {
    let positions = Arc::new(vec![0.0f64, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    let mut mesh = SurfaceMesh::<f64, u32>::new(3).unwrap();
    mesh.wrap_as_const_vertices(positions, 3).unwrap();
    assert!(mesh.positions().is_read_only());
    assert!(matches!(
        mesh.position_mut(0),
        Err(MeshError::ReadOnlyAttribute)
    ));
}

#[test]
fn wrapped_hybrid_facet_buffers() {
    let offsets = Arc::new(vec![0u32, 3]);
    let facets = Arc::new(vec![0u32, 1, 2, 0, 2, 3, 4]);
    let mut mesh = SurfaceMesh::<f64, u32>::new(2).unwrap();
    mesh.add_vertices(5).unwrap();
    mesh.wrap_as_hybrid_facets(offsets, 2, facets, 7).unwrap();
    assert!(mesh.is_hybrid());
    assert_eq!(mesh.facet_vertices(0), &[0, 1, 2]);
    assert_eq!(mesh.facet_vertices(1), &[0, 2, 3, 4]);
    assert_eq!(mesh.corner_facet(4), 1);
}

#[test]
fn delete_and_export_attribute() {
    let mut mesh = quad_grid(1, 1);
    mesh.create_attribute_from::<f64>(
        "weight",
        AttributeElement::Vertex,
        AttributeUsage::Scalar,
        1,
        &[1.0, 2.0, 3.0, 4.0],
        &[],
    )
    .unwrap();
    let exported = mesh
        .delete_and_export_attribute::<f64>(
            "weight",
            AttributeDeletePolicy::ErrorIfReserved,
            AttributeExportPolicy::CopyIfExternal,
        )
        .unwrap();
    assert!(!mesh.has_attribute("weight"));
    assert_eq!(exported.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn duplicate_attribute_copies_on_write() {
    let mut mesh = quad_grid(1, 1);
    mesh.create_attribute_from::<f64>(
        "a",
        AttributeElement::Vertex,
        AttributeUsage::Scalar,
        1,
        &[1.0, 2.0, 3.0, 4.0],
        &[],
    )
    .unwrap();
    mesh.duplicate_attribute("a", "b").unwrap();
    mesh.attribute_by_name_mut::<f64>("b").unwrap().as_slice_mut().unwrap()[0] = 9.0;
    assert_eq!(mesh.attribute_by_name::<f64>("a").unwrap().get(0, 0), 1.0);
    assert_eq!(mesh.attribute_by_name::<f64>("b").unwrap().get(0, 0), 9.0);
}

#[test]
fn import_attribute_from_other_mesh() {
    let mut source = quad_grid(1, 1);
    source
        .create_attribute_from::<f64>(
            "weight",
            AttributeElement::Vertex,
            AttributeUsage::Scalar,
            1,
            &[1.0, 2.0, 3.0, 4.0],
            &[],
        )
        .unwrap();

    let mut mesh = quad_grid(1, 1);
    let id = mesh
        .create_attribute_from_mesh("weight", &source, "weight")
        .unwrap();
    assert_eq!(mesh.attribute::<f64>(id).unwrap().get(2, 0), 3.0);

    // Imported storage is shared copy-on-write.
    mesh.attribute_mut::<f64>(id).unwrap().as_slice_mut().unwrap()[2] = 9.0;
    assert_eq!(mesh.attribute::<f64>(id).unwrap().get(2, 0), 9.0);
    assert_eq!(
        source.attribute_by_name::<f64>("weight").unwrap().get(2, 0),
        3.0
    );

    // Element counts must agree.
    let mut small = SurfaceMesh::<f64, u32>::new(3).unwrap();
    small.add_vertices(2).unwrap();
    assert!(matches!(
        small.create_attribute_from_mesh("weight", &source, "weight"),
        Err(MeshError::ElementCountMismatch { .. })
    ));
}

#[test]
fn mesh_clone_copies_attributes_on_write() {
    let mut mesh = quad_grid(1, 2);
    mesh.create_attribute_from::<f64>(
        "w",
        AttributeElement::Facet,
        AttributeUsage::Scalar,
        1,
        &[1.0, 2.0],
        &[],
    )
    .unwrap();

    let mut copy = mesh.clone();
    copy.position_mut(0).unwrap()[0] = -5.0;
    copy.attribute_by_name_mut::<f64>("w").unwrap().as_slice_mut().unwrap()[1] = 7.0;
    assert_eq!(mesh.position(0)[0], 0.0);
    assert_eq!(mesh.attribute_by_name::<f64>("w").unwrap().get(1, 0), 2.0);

    mesh.position_mut(1).unwrap()[1] = 4.0;
    assert_eq!(copy.position(1)[1], 0.0);
    assert_eq!(copy.position(0)[0], -5.0);
    assert_eq!(copy.attribute_by_name::<f64>("w").unwrap().get(1, 0), 7.0);
}

#[test]
fn stripped_copy_conversions() {
    let mut mesh = quad_grid(2, 2);
    mesh.initialize_edges().unwrap();
    mesh.create_attribute::<f64>("w", AttributeElement::Vertex, AttributeUsage::Scalar, 1)
        .unwrap();

    let copy: SurfaceMesh<f32, u64> = mesh.stripped_copy().unwrap();
    assert_eq!(copy.num_vertices(), mesh.num_vertices());
    assert_eq!(copy.num_facets(), mesh.num_facets());
    assert_eq!(copy.num_edges(), mesh.num_edges());
    assert!(!copy.has_attribute("w"));
    assert!(copy.has_edges());
    for f in 0..copy.num_facets() {
        let expected: Vec<u64> = mesh.facet_vertices(f).iter().map(|&v| v as u64).collect();
        assert_eq!(copy.facet_vertices(f), expected.as_slice());
    }
    copy.debug_assert_invariants();

    // Same-type copies share storage until written.
    let same: SurfaceMesh<f64, u32> = mesh.stripped_copy().unwrap();
    assert_eq!(same.position(4), mesh.position(4));
}

#[test]
fn attribute_iteration_is_name_ordered() {
    let mut mesh = SurfaceMesh::<f64, u32>::new(3).unwrap();
    mesh.create_attribute::<f64>("zeta", AttributeElement::Vertex, AttributeUsage::Scalar, 1)
        .unwrap();
    mesh.create_attribute::<f64>("alpha", AttributeElement::Vertex, AttributeUsage::Scalar, 1)
        .unwrap();
    let names: Vec<&str> = mesh.attribute_names().collect();
    assert_eq!(
        names,
        vec!["$corner_to_vertex", "$vertex_to_position", "alpha", "zeta"]
    );
    let mut seen = Vec::new();
    mesh.seq_foreach_attribute_id(|id| seen.push(id));
    assert_eq!(seen.len(), 4);
}
