mod util;

use std::sync::Arc;

use dof_sieve::prelude::*;
use dof_sieve::topology::generation::quad_mesh;
use util::*;

#[test]
fn scatter_of_ones_counts_element_multiplicity() {
    let mesh = Arc::new(quad_mesh(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap());
    for ordering in [Ordering::ComponentMajor, Ordering::NodeMajor] {
        let s = h1_space_with(
            mesh.clone(),
            2,
            SpaceOptions::default().with_vdim(2).with_ordering(ordering),
        );
        let er = ElementRestriction::new(&s).unwrap();
        assert_eq!(er.num_elements(), 4);
        assert_eq!(er.height(), 4 * 2 * 9);
        let mut counts = vec![0.0; s.vsize()];
        er.apply_transpose(&vec![1.0; er.height()], &mut counts).unwrap();
        // the center vertex sits in all four elements, for both components
        let center = s.dof_to_vdof(4, 0) as usize;
        assert_eq!(counts[center], 4.0);
        assert_eq!(counts[s.dof_to_vdof(4, 1) as usize], 4.0);
        assert_eq!(counts.iter().sum::<f64>(), er.height() as f64);
    }
}

#[test]
fn gathered_blocks_hold_nodal_values_per_component() {
    let mesh = Arc::new(quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap());
    let scalar = h1_space_with(mesh.clone(), 2, SpaceOptions::default());
    let v = h1_space_with(mesh, 2, SpaceOptions::default().with_vdim(2));
    let f = nodal_values(&scalar, |x| x[0] + 2.0 * x[1]);
    // component 1 carries 10 * f
    let g: Vec<f64> = f.iter().copied().chain(f.iter().map(|x| 10.0 * x)).collect();
    let er = ElementRestriction::new(&v).unwrap();
    let e = er.apply_vec(&g).unwrap();
    let block = &e[er.element_block(1).unwrap()];
    let dofs = scalar.element_dofs(1).unwrap();
    for (i, &d) in dofs.iter().enumerate() {
        assert_eq!(block[i], f[d as usize]);
        assert_eq!(block[dofs.len() + i], 10.0 * f[d as usize]);
    }
    assert!(er.element_block(2).is_err());
}
