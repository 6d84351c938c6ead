#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dof-sieve
//!
//! dof-sieve assigns and manages the degrees of freedom (DOFs) of finite
//! element spaces on possibly non-conforming, variable-order, adaptively
//! refined meshes, and builds the operators that make such a discretization
//! behave like a single conforming space.
//!
//! ## Features
//! - Entity DOF tables for vertices, edges, faces and element interiors, with
//!   several order variants per entity in variable-order (hp) spaces
//! - On-demand, orientation-aware DOF lookups for entities, elements and
//!   boundary elements
//! - Hanging-node and variable-order constraint resolution into the
//!   conforming prolongation `P` and restriction `R`
//! - Refinement, derefinement and grid transfer operators, matrix-free or
//!   assembled
//! - A reference in-memory mesh with local refinement and a nodal Lagrange
//!   basis catalog to drive it all
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! dof-sieve = "0.3"
//! # Optional features:
//! # features = ["rayon", "check-invariants"]
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use dof_sieve::prelude::*;
//! use dof_sieve::topology::generation::quad_mesh;
//! use dof_sieve::topology::refine::refine;
//!
//! let coarse = quad_mesh(2, 1, [0.0, 0.0], [2.0, 1.0])?;
//! let fine = Arc::new(refine(&coarse, &[1])?);
//! let space = FiniteElementSpace::new(
//!     fine,
//!     Arc::new(LagrangeCollection::new(2, 2)?),
//!     SpaceOptions::default(),
//! )?;
//! assert!(space.true_vsize()? < space.vsize());
//! # Ok::<(), DofSieveError>(())
//! ```
//!
//! ## Determinism
//!
//! DOF numbering depends only on the mesh entity numbering and the element
//! orders; constraint resolution visits DOFs in index order, so `P` and `R`
//! are reproducible bit for bit. With the `rayon` feature only the local
//! transfer matrices are computed in parallel, each independently.

pub mod basis;
pub mod debug_invariants;
pub mod dof_error;
pub mod linalg;
pub mod space;
pub mod topology;
pub mod transfer;

pub use debug_invariants::DebugInvariants;
pub use dof_error::DofSieveError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::basis::{BasisCatalog, FiniteElement, LagrangeCollection};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dof_error::DofSieveError;
    pub use crate::linalg::{IdentityOperator, LinearOperator, ProductOperator};
    pub use crate::space::element_restriction::ElementRestriction;
    pub use crate::space::fespace::{FiniteElementSpace, OperatorKind, SpaceOptions};
    pub use crate::space::ordering::Ordering;
    pub use crate::space::orders::OrderMask;
    pub use crate::topology::cell_type::CellType;
    pub use crate::topology::in_memory::InMemoryMesh;
    pub use crate::topology::mesh::{EntityKind, MeshOperation, MeshTopology};
    pub use crate::topology::orientation::Orientation;
    pub use crate::transfer::{DerefinementOperator, InterpolationGridTransfer, RefinementOperator};
}
