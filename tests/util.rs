#![allow(dead_code)]
use std::sync::Arc;

use dof_sieve::basis::{BasisCatalog, FiniteElement, LagrangeCollection};
use dof_sieve::space::ordering::decode;
use dof_sieve::space::{FiniteElementSpace, SpaceOptions};
use dof_sieve::topology::{InMemoryMesh, MeshTopology};

pub type Space = FiniteElementSpace<InMemoryMesh, LagrangeCollection>;

/// Scalar Lagrange space of uniform `order` on `mesh`.
pub fn h1_space(mesh: InMemoryMesh, order: u8) -> Space {
    h1_space_with(Arc::new(mesh), order, SpaceOptions::default())
}

pub fn h1_space_with(mesh: Arc<InMemoryMesh>, order: u8, options: SpaceOptions) -> Space {
    let dim = mesh.dimension();
    FiniteElementSpace::new(mesh, Arc::new(LagrangeCollection::new(order, dim).unwrap()), options)
        .unwrap()
}

/// Values of `f` at the nodes of every DOF, read through the element DOF
/// lists. Panics when two elements disagree on the position of a shared DOF.
pub fn nodal_values(space: &Space, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mesh = space.mesh();
    let mut values: Vec<Option<f64>> = vec![None; space.ndofs()];
    for elem in 0..mesh.num_elements() {
        let order = space.element_order(elem).unwrap();
        let fe = space
            .catalog()
            .element(mesh.element_geometry(elem), order)
            .unwrap();
        let dofs = space.element_dofs(elem).unwrap();
        assert_eq!(dofs.len(), fe.num_dofs(), "element {elem} row length");
        for (&d, node) in dofs.iter().zip(fe.nodes()) {
            let v = f(&mesh.map_to_physical(elem, node));
            let slot = &mut values[decode(d)];
            match slot {
                Some(prev) => assert!(
                    (*prev - v).abs() < 1e-10,
                    "dof {} seen at two positions from element {elem}: {prev} vs {v}",
                    decode(d)
                ),
                None => *slot = Some(v),
            }
        }
    }
    values.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

/// Assert two vectors agree entrywise within `tol`.
pub fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len(), "length mismatch");
    for (i, (a, b)) in got.iter().zip(want).enumerate() {
        assert!((a - b).abs() <= tol, "entry {i}: got {a}, want {b}");
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A deterministic, non-polynomial test vector.
pub fn wiggle(n: usize) -> Vec<f64> {
    (0..n).map(|i| (1.0 + i as f64).sin()).collect()
}
