//! Gather/scatter between global vectors and per-element blocks.
//!
//! The E-vector stores element after element; each element block holds
//! `vdim` runs of the element's DOFs, one per component. Gathering applies
//! the orientation sign of each DOF, scattering adds the contributions of
//! all elements sharing a DOF.

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::linalg::{LinearOperator, check_sizes};
use crate::space::dof_table::ElementDofTable;
use crate::space::fespace::FiniteElementSpace;
use crate::space::ordering::{Ordering, decode_signed, dof_to_vdof};
use crate::topology::mesh::MeshTopology;

#[derive(Clone, Debug)]
pub struct ElementRestriction {
    table: ElementDofTable,
    ndofs: usize,
    vdim: usize,
    ordering: Ordering,
    /// Start of each element block in the E-vector, plus the total length.
    offsets: Vec<usize>,
}

impl ElementRestriction {
    pub fn new<M: MeshTopology, C: BasisCatalog>(
        space: &FiniteElementSpace<M, C>,
    ) -> Result<Self, DofSieveError> {
        let table = space.element_table()?.clone();
        let vdim = space.vdim();
        let mut offsets = Vec::with_capacity(table.num_rows() + 1);
        let mut total = 0;
        offsets.push(0);
        for row in table.rows() {
            total += vdim * row.len();
            offsets.push(total);
        }
        Ok(Self {
            table,
            ndofs: space.ndofs(),
            vdim,
            ordering: space.ordering(),
            offsets,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.table.num_rows()
    }

    /// E-vector range of element `elem`.
    pub fn element_block(&self, elem: usize) -> Result<std::ops::Range<usize>, DofSieveError> {
        if elem >= self.num_elements() {
            return Err(DofSieveError::out_of_range("element", elem, self.num_elements()));
        }
        Ok(self.offsets[elem]..self.offsets[elem + 1])
    }

    fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        for (elem, row) in self.table.rows().enumerate() {
            let start = self.offsets[elem];
            for c in 0..self.vdim {
                for (i, &d) in row.iter().enumerate() {
                    let (vdof, sign) =
                        decode_signed(dof_to_vdof(d, c, self.ndofs, self.vdim, self.ordering));
                    f(start + c * row.len() + i, vdof, sign);
                }
            }
        }
    }
}

impl LinearOperator for ElementRestriction {
    fn height(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn width(&self) -> usize {
        self.vdim * self.ndofs
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.height(), self.width(), x, y)?;
        self.for_each_entry(|e, l, sign| y[e] = sign * x[l]);
        Ok(())
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.width(), self.height(), x, y)?;
        y.fill(0.0);
        self.for_each_entry(|e, l, sign| y[l] += sign * x[e]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::basis::LagrangeCollection;
    use crate::space::fespace::SpaceOptions;
    use crate::topology::generation::interval_mesh;

    #[test]
    fn gather_and_scatter_on_an_interval() {
        let mesh = Arc::new(interval_mesh(2, 0.0, 1.0).unwrap());
        let space = FiniteElementSpace::new(
            mesh,
            Arc::new(LagrangeCollection::new(1, 1).unwrap()),
            SpaceOptions::default().with_vdim(2),
        )
        .unwrap();
        let er = ElementRestriction::new(&space).unwrap();
        assert_eq!(er.height(), 8);
        assert_eq!(er.width(), 6);
        assert_eq!(er.element_block(1).unwrap(), 4..8);

        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let e = er.apply_vec(&x).unwrap();
        // node-major: [v0 v1 v2 | w0 w1 w2]
        assert_eq!(e, vec![0.0, 1.0, 3.0, 4.0, 1.0, 2.0, 4.0, 5.0]);

        let mut back = vec![0.0; 6];
        er.apply_transpose(&vec![1.0; 8], &mut back).unwrap();
        assert_eq!(back, vec![1.0, 2.0, 1.0, 1.0, 2.0, 1.0]);
    }
}
