mod util;

use std::collections::BTreeSet;
use std::sync::Arc;

use dof_sieve::prelude::*;
use dof_sieve::space::ordering::decode;
use dof_sieve::topology::generation::{hex_mesh, interval_mesh, quad_mesh, triangle_mesh};
use util::*;

fn dof_set(dofs: &[i64]) -> BTreeSet<usize> {
    dofs.iter().map(|&d| decode(d)).collect()
}

#[test]
fn uniform_counts_match_the_nodal_lattice() {
    assert_eq!(h1_space(interval_mesh(3, 0.0, 1.0).unwrap(), 4).ndofs(), 13);
    assert_eq!(h1_space(quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap(), 2).ndofs(), 15);
    assert_eq!(h1_space(triangle_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap(), 3).ndofs(), 49);
    assert_eq!(
        h1_space(hex_mesh(2, 1, 1, [0.0; 3], [2.0, 1.0, 1.0]).unwrap(), 3).ndofs(),
        112
    );
}

#[test]
fn layout_blocks_are_vertices_edges_faces_interiors() {
    let s = h1_space(hex_mesh(2, 1, 1, [0.0; 3], [2.0, 1.0, 1.0]).unwrap(), 3);
    let layout = s.layout();
    assert_eq!(layout.num_vertex_dofs(), 12);
    assert_eq!(layout.num_edge_dofs(), 20 * 2);
    assert_eq!(layout.num_face_dofs(), 11 * 4);
    assert_eq!(layout.num_interior_dofs(), 2 * 8);
    assert_eq!(layout.ndofs(), s.ndofs());
    assert_eq!(s.vertex_dofs(0).unwrap(), vec![0i64]);
    assert_eq!(s.element_interior_dofs(1).unwrap(), (104..112).collect::<Vec<i64>>());
}

#[test]
fn hex_neighbours_share_exactly_the_common_face_closure() {
    let s = h1_space(hex_mesh(2, 1, 1, [0.0; 3], [2.0, 1.0, 1.0]).unwrap(), 3);
    let a = dof_set(s.element_dofs(0).unwrap());
    let b = dof_set(s.element_dofs(1).unwrap());
    assert_eq!(a.len(), 64);
    assert_eq!(b.len(), 64);
    // 4 vertices, 4 edges with 2 DOFs each, 4 face-interior DOFs
    assert_eq!(a.intersection(&b).count(), 16);
}

#[test]
fn shared_dofs_sit_at_the_same_physical_node() {
    let f = |x: &[f64]| x[0] + 10.0 * x[1] + 100.0 * x.get(2).copied().unwrap_or(0.0);
    // nodal_values panics on any disagreement between elements
    nodal_values(&h1_space(triangle_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap(), 3), f);
    nodal_values(&h1_space(quad_mesh(3, 2, [0.0, 0.0], [3.0, 2.0]).unwrap(), 4), f);
    nodal_values(&h1_space(hex_mesh(2, 2, 1, [0.0; 3], [2.0, 2.0, 1.0]).unwrap(), 2), f);
}

#[test]
fn every_dof_belongs_to_some_element() {
    let s = h1_space(quad_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap(), 3);
    for d in 0..s.ndofs() {
        let (elem, local) = s.dof_element(d).unwrap().expect("dof without element");
        assert_eq!(decode(s.element_dofs(elem).unwrap()[local]), d);
    }
}

#[test]
fn boundary_elements_see_their_entity_closure() {
    let s = h1_space(quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap(), 2);
    let mesh = s.mesh().clone();
    assert_eq!(mesh.num_boundary_elements(), 6);
    for bel in 0..mesh.num_boundary_elements() {
        let dofs = s.boundary_element_dofs(bel).unwrap();
        assert_eq!(dofs.len(), 3);
        let entity = mesh.boundary_entity(bel);
        assert_eq!(entity.kind, EntityKind::Edge);
        let elem = dof_set(s.element_dofs(entity.element).unwrap());
        assert!(dof_set(&dofs).is_subset(&elem));
    }
}

#[test]
fn vector_dofs_follow_the_ordering() {
    let mesh = Arc::new(quad_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap());
    let byc = h1_space_with(mesh.clone(), 1, SpaceOptions::default().with_vdim(2));
    let byn = h1_space_with(
        mesh,
        1,
        SpaceOptions::default().with_vdim(2).with_ordering(Ordering::ComponentMajor),
    );
    assert_eq!(byc.vsize(), 8);
    assert_eq!(byc.dof_to_vdof(3, 1), 7);
    assert_eq!(byn.dof_to_vdof(3, 1), 7);
    assert_eq!(byc.dof_to_vdof(1, 1), 5);
    assert_eq!(byn.dof_to_vdof(1, 1), 3);
    assert_eq!(byc.dof_to_vdof(-2, 1), -6);
    assert_eq!(byn.vdof_to_dof(3).unwrap(), (1, 1));
    assert_eq!(byc.vdof_to_dof(5).unwrap(), (1, 1));
    assert!(byc.vdof_to_dof(8).is_err());

    let v = byn.element_vdofs(0).unwrap();
    assert_eq!(v.len(), 8);
    assert_eq!(&v[4..], &byn.dofs_to_vdofs(byn.element_dofs(0).unwrap())[4..]);
}

#[test]
fn out_of_range_queries_fail() {
    let s = h1_space(quad_mesh(1, 1, [0.0, 0.0], [1.0, 1.0]).unwrap(), 2);
    assert!(matches!(s.element_dofs(1), Err(DofSieveError::IndexOutOfRange { .. })));
    assert!(s.vertex_dofs(4).is_err());
    assert!(s.boundary_element_dofs(4).is_err());
    assert!(s.edge_interior_dofs(0, 1).unwrap().is_none());
}
