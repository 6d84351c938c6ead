//! Operators moving finite element functions between two versions of a mesh.
//!
//! All operators work on frozen [`SpaceSnapshot`]s of the spaces involved,
//! so a space can be updated in place while the operator mapping its old
//! DOFs to its new ones is being built.

pub mod derefinement;
pub mod grid_transfer;
pub mod local;
pub mod refinement;

use crate::dof_error::DofSieveError;
use crate::space::dof_table::ElementDofTable;
use crate::space::ordering::{Ordering, decode_signed, dof_to_vdof};
use crate::topology::cell_type::CellType;

pub use derefinement::{DerefinementOperator, derefinement_matrix};
pub use grid_transfer::InterpolationGridTransfer;
pub use refinement::RefinementOperator;

/// Element DOFs, geometries and orders of a space at one mesh sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct SpaceSnapshot {
    pub table: ElementDofTable,
    pub geometries: Vec<CellType>,
    pub orders: Vec<u8>,
    pub ndofs: usize,
    pub vdim: usize,
    pub ordering: Ordering,
}

impl SpaceSnapshot {
    pub fn num_elements(&self) -> usize {
        self.geometries.len()
    }

    pub fn vsize(&self) -> usize {
        self.vdim * self.ndofs
    }

    /// `(index, sign)` of the component-`c` vdofs of element `elem`.
    pub(crate) fn signed_vdofs(
        &self,
        elem: usize,
        component: usize,
    ) -> Result<Vec<(usize, f64)>, DofSieveError> {
        Ok(self
            .table
            .row(elem)?
            .iter()
            .map(|&d| decode_signed(dof_to_vdof(d, component, self.ndofs, self.vdim, self.ordering)))
            .collect())
    }

    /// Check that `fine` can be related to `self` by an element embedding.
    pub(crate) fn check_compatible(&self, fine: &SpaceSnapshot) -> Result<(), DofSieveError> {
        if self.vdim != fine.vdim || self.ordering != fine.ordering {
            return Err(DofSieveError::IncompatibleSpaces(format!(
                "vdim/ordering {}/{:?} vs {}/{:?}",
                self.vdim, self.ordering, fine.vdim, fine.ordering
            )));
        }
        Ok(())
    }
}
