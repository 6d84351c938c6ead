mod util;

use std::sync::Arc;

use dof_sieve::prelude::*;
use dof_sieve::space::FormatVersion;
use dof_sieve::space::io::{SpaceHeader, load, save};
use dof_sieve::topology::generation::quad_mesh;
use util::*;

fn mesh() -> Arc<InMemoryMesh> {
    Arc::new(quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0]).unwrap())
}

#[test]
fn uniform_space_round_trips_in_the_short_format() {
    let s = h1_space_with(
        mesh(),
        3,
        SpaceOptions::default().with_vdim(3).with_ordering(Ordering::ComponentMajor),
    );
    let mut buf = Vec::new();
    save(&s, &mut buf).unwrap();
    let text = String::from_utf8(buf.clone()).unwrap();
    assert_eq!(
        text,
        "FiniteElementSpace\nFiniteElementCollection: H1_2D_P3\nVDim: 3\nOrdering: 1\n"
    );

    let back: Space = load(s.mesh().clone(), buf.as_slice()).unwrap();
    assert_eq!(back.vdim(), 3);
    assert_eq!(back.ordering(), Ordering::ComponentMajor);
    assert_eq!(back.ndofs(), s.ndofs());
    assert!(!back.is_variable_order());
}

#[test]
fn variable_order_space_round_trips_in_the_long_format() {
    let catalog = Arc::new(LagrangeCollection::new(2, 2).unwrap());
    let s = FiniteElementSpace::with_element_orders(mesh(), catalog, SpaceOptions::default(), vec![2, 4])
        .unwrap();
    let header = SpaceHeader::from_space(&s);
    assert_eq!(header.version, FormatVersion::V1_0);

    let mut buf = Vec::new();
    save(&s, &mut buf).unwrap();
    let text = String::from_utf8(buf.clone()).unwrap();
    assert!(text.starts_with("MFEM FiniteElementSpace v1.0\n"));
    assert!(text.contains("element_orders\n2\n2\n4\n"));
    assert!(text.ends_with("End: MFEM FiniteElementSpace v1.0\n"));

    let back: Space = load(s.mesh().clone(), buf.as_slice()).unwrap();
    assert_eq!(back.element_orders(), &[2u8, 4]);
    assert_eq!(back.ndofs(), s.ndofs());
    assert_eq!(back.element_dofs(1).unwrap(), s.element_dofs(1).unwrap());
}

#[test]
fn nurbs_sections_parse_but_do_not_load() {
    let text = "MFEM FiniteElementSpace v1.0\n\
                FiniteElementCollection: H1_2D_P2\n\
                VDim: 1\n\
                Ordering: 0\n\
                NURBS_order\n2\n\
                End: MFEM FiniteElementSpace v1.0\n";
    let header: SpaceHeader = text.parse().unwrap();
    assert_eq!(header.nurbs.order, Some(2));
    let err = load::<_, LagrangeCollection, _>(mesh(), text.as_bytes()).unwrap_err();
    assert!(matches!(err, DofSieveError::Unsupported(_)));
}

#[test]
fn unknown_collections_and_wrong_order_counts_fail() {
    let bad_collection = "FiniteElementSpace\nFiniteElementCollection: L2_2D_P1\nVDim: 1\nOrdering: 0\n";
    assert!(load::<_, LagrangeCollection, _>(mesh(), bad_collection.as_bytes()).is_err());

    let wrong_count = "MFEM FiniteElementSpace v1.0\n\
                       FiniteElementCollection: H1_2D_P1\n\
                       VDim: 1\n\
                       Ordering: 0\n\
                       element_orders\n3\n1\n1\n1\n\
                       End: MFEM FiniteElementSpace v1.0\n";
    let err = load::<_, LagrangeCollection, _>(mesh(), wrong_count.as_bytes()).unwrap_err();
    assert!(matches!(err, DofSieveError::SizeMismatch { .. }));
}
