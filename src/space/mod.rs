//! The finite element space and the DOF machinery behind it.
//!
//! Bottom-up: signed DOF encoding and vector layouts ([`ordering`]), order
//! masks ([`orders`]), the allocator ([`dof_table`]), on-demand lookups
//! ([`locator`]), the constraint resolver ([`conforming`]) and the space
//! tying them to a mesh across updates ([`fespace`]).

pub mod cache;
pub mod conforming;
pub mod dof_table;
pub mod element_restriction;
pub mod fespace;
pub mod io;
pub mod locator;
pub mod ordering;
pub mod orders;

pub use cache::{InvalidateCache, VersionedCache};
pub use conforming::{ConformingOperators, resolve};
pub use dof_table::{DofLayout, ElementDofTable, EntityDofLayout, VariantTable};
pub use element_restriction::ElementRestriction;
pub use fespace::{FiniteElementSpace, OperatorKind, SpaceOptions};
pub use io::{FormatVersion, NurbsMetadata, SpaceHeader};
pub use locator::{DofLocator, EntityDofs, IGNORED_DOF};
pub use ordering::Ordering;
pub use orders::{EntityOrders, MAX_ORDER, OrderMask};
