//! Transfer between a space on a coarse mesh and a space on its refinement.

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::linalg::{LinearOperator, ProductOperator};
use crate::space::fespace::{FiniteElementSpace, OperatorKind};
use crate::topology::mesh::{MeshOperation, MeshTopology};
use crate::topology::transforms::CoarseFineTransforms;
use crate::transfer::derefinement::DerefinementOperator;
use crate::transfer::refinement::RefinementOperator;

/// Grid transfer by interpolation (coarse to fine) and local L2 projection
/// (fine to coarse).
///
/// The fine space must live on the mesh produced by one refinement of the
/// coarse space's mesh.
#[derive(Debug)]
pub struct InterpolationGridTransfer<'a, M, C> {
    coarse: &'a FiniteElementSpace<M, C>,
    fine: &'a FiniteElementSpace<M, C>,
}

impl<'a, M, C> InterpolationGridTransfer<'a, M, C>
where
    M: MeshTopology,
    C: BasisCatalog,
{
    pub fn new(
        coarse: &'a FiniteElementSpace<M, C>,
        fine: &'a FiniteElementSpace<M, C>,
    ) -> Result<Self, DofSieveError> {
        if coarse.vdim() != fine.vdim() || coarse.ordering() != fine.ordering() {
            return Err(DofSieveError::IncompatibleSpaces(format!(
                "vdim/ordering {}/{:?} vs {}/{:?}",
                coarse.vdim(),
                coarse.ordering(),
                fine.vdim(),
                fine.ordering()
            )));
        }
        let fine_mesh = fine.mesh();
        if fine_mesh.last_operation() != MeshOperation::Refine
            || fine.sequence() != coarse.sequence() + 1
        {
            return Err(DofSieveError::UpdateSequence {
                expected_from: coarse.sequence(),
                found: fine.sequence(),
            });
        }
        Ok(Self { coarse, fine })
    }

    fn transforms(&self) -> Result<&'a CoarseFineTransforms, DofSieveError> {
        let fine: &'a FiniteElementSpace<M, C> = self.fine;
        fine.mesh()
            .refinement_transforms()
            .ok_or(DofSieveError::MissingTransforms("refinement"))
    }

    /// Interpolation `coarse vsize → fine vsize`.
    pub fn forward_operator(&self) -> Result<Box<dyn LinearOperator>, DofSieveError> {
        let op = RefinementOperator::new(
            &**self.fine.catalog(),
            self.coarse.snapshot()?,
            self.fine.snapshot()?,
            self.transforms()?,
        )?;
        let op: Box<dyn LinearOperator> = match self.fine.options().operator_kind {
            OperatorKind::MatrixFree => Box::new(op),
            OperatorKind::Assembled => Box::new(op.assemble()?),
        };
        Ok(op)
    }

    /// Local L2 projection `fine vsize → coarse vsize`.
    pub fn backward_operator(&self) -> Result<Box<dyn LinearOperator>, DofSieveError> {
        Ok(Box::new(DerefinementOperator::new(
            &**self.coarse.catalog(),
            self.fine.snapshot()?,
            self.coarse.snapshot()?,
            self.transforms()?,
        )?))
    }

    /// Interpolation between true DOFs: `R_fine · F · P_coarse`, where a
    /// missing `R` or `P` is the identity.
    pub fn true_forward_operator(&self) -> Result<Box<dyn LinearOperator>, DofSieveError> {
        let forward = self.forward_operator()?;
        let r = self.fine.conforming_restriction()?.cloned();
        let p = self.coarse.conforming_prolongation()?.cloned();
        if r.is_none() && p.is_none() {
            return Ok(forward);
        }
        let mut factors: Vec<Box<dyn LinearOperator>> = Vec::with_capacity(3);
        if let Some(r) = r {
            factors.push(Box::new(r));
        }
        factors.push(forward);
        if let Some(p) = p {
            factors.push(Box::new(p));
        }
        Ok(Box::new(ProductOperator::new(factors)?))
    }
}
