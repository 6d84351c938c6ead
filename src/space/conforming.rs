//! Conforming constraints of non-conforming and variable-order spaces.
//!
//! Slave DOFs are expressed as linear combinations of master DOFs in a
//! dependency matrix, which is then resolved into the conforming
//! prolongation `P` (local DOFs × true DOFs), the selector `R` (true DOFs ×
//! local DOFs) and, for variable-order spaces, the operator `Q` that reads
//! true DOFs from their highest-order representation.

use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;

use crate::basis::{BasisCatalog, FiniteElement};
use crate::dof_error::DofSieveError;
use crate::linalg::SparseRows;
use crate::linalg::sparse::make_vdim_matrix;
use crate::space::locator::{DofLocator, EntityDofs, IGNORED_DOF};
use crate::space::ordering::{Ordering, decode_signed};
use crate::topology::cell_type::CellType;
use crate::topology::mesh::{EntityKind, MeshTopology};
use crate::topology::nonconforming::SlaveEntity;
use crate::topology::point_matrix::PointMatrix;

/// Interpolation weights at or below this magnitude are dropped.
pub const DEPENDENCY_THRESHOLD: f64 = 1e-12;

/// Tolerance of the "edge midpoint strictly inside the master face" test.
const INTERIOR_EPS: f64 = 1e-14;

/// Conforming operators of a space, expanded to `vdim` components.
///
/// `None` stands for the identity: a space without constraints has no
/// `P`/`R`, and `Q` only exists for variable-order spaces.
#[derive(Clone, Debug, Default)]
pub struct ConformingOperators {
    pub prolongation: Option<CsrMatrix<f64>>,
    pub restriction: Option<CsrMatrix<f64>>,
    pub variant_interpolation: Option<CsrMatrix<f64>>,
    /// Number of scalar true DOFs.
    pub num_true_dofs: usize,
    /// Number of finalization passes of the last build.
    pub passes: usize,
}

impl ConformingOperators {
    fn identity(ndofs: usize) -> Self {
        Self {
            num_true_dofs: ndofs,
            ..Default::default()
        }
    }
}

/// Add one dependency row per slave DOF (from row `skip` on) of the
/// interpolation `interp` (`slave dofs × master dofs`). Rows that already
/// carry dependencies are left alone.
pub(crate) fn add_dependencies(
    deps: &mut SparseRows,
    master_dofs: &[i64],
    slave_dofs: &[i64],
    interp: &DMatrix<f64>,
    skip: usize,
) {
    for (i, &sdof) in slave_dofs.iter().enumerate().skip(skip) {
        if sdof == IGNORED_DOF {
            continue;
        }
        let (s, s_sign) = decode_signed(sdof);
        if !deps.row_is_empty(s) {
            continue;
        }
        for (j, &mdof) in master_dofs.iter().enumerate() {
            let coef = interp[(i, j)];
            if coef.abs() <= DEPENDENCY_THRESHOLD {
                continue;
            }
            let (m, m_sign) = decode_signed(mdof);
            if m != s {
                deps.add(s, m, coef * m_sign * s_sign);
            }
        }
    }
}

/// Whether reference point `x` lies strictly inside `geometry`.
fn strictly_inside(geometry: CellType, x: &[f64]) -> bool {
    let lower = x.iter().all(|&xi| xi > INTERIOR_EPS);
    let upper = if geometry.is_simplex() {
        x.iter().sum::<f64>() < 1.0 - INTERIOR_EPS
    } else {
        x.iter().all(|&xi| xi < 1.0 - INTERIOR_EPS)
    };
    lower && upper
}

/// Builds the dependency matrices of one space and resolves them.
pub(crate) struct ConstraintBuilder<'a, M: ?Sized, C> {
    mesh: &'a M,
    catalog: &'a C,
    locator: DofLocator<'a, M, C>,
    ndofs: usize,
    variable_order: bool,
}

impl<'a, M, C> ConstraintBuilder<'a, M, C>
where
    M: MeshTopology + ?Sized,
    C: BasisCatalog,
{
    pub(crate) fn new(
        mesh: &'a M,
        catalog: &'a C,
        locator: DofLocator<'a, M, C>,
        variable_order: bool,
    ) -> Self {
        Self {
            mesh,
            catalog,
            ndofs: locator.layout().ndofs(),
            locator,
            variable_order,
        }
    }

    fn transfer(
        &self,
        slave_geometry: CellType,
        slave_order: u8,
        master_geometry: CellType,
        master_order: u8,
        pm: &PointMatrix,
    ) -> Result<DMatrix<f64>, DofSieveError> {
        let slave_fe = self.catalog.element(slave_geometry, slave_order)?;
        let master_fe = self.catalog.element(master_geometry, master_order)?;
        Ok(slave_fe.transfer_matrix(&*master_fe, pm))
    }

    /// Dependencies of variable-order slave face edges lying inside the master face.
    fn add_edge_face_dependencies(
        &self,
        deps: &mut SparseRows,
        master: &EntityDofs,
        master_geometry: CellType,
        slave_face: usize,
        pm: &PointMatrix,
    ) -> Result<(), DofSieveError> {
        let vertices = self.mesh.face_vertices(slave_face);
        let face_geometry = self.mesh.face_geometry(slave_face);
        for (local, &(edge, _)) in self.mesh.face_edges(slave_face).iter().enumerate() {
            let [mut a, mut b] = face_geometry.edge_vertices()[local];
            if vertices[a] > vertices[b] {
                std::mem::swap(&mut a, &mut b);
            }
            let edge_pm = pm.edge(a, b)?;
            let mid = edge_pm.map(&[0.5]);
            if !strictly_inside(master_geometry, &mid) {
                continue;
            }
            let Some(slave) = self.locator.entity_dofs(EntityKind::Edge, edge, 0)? else {
                continue;
            };
            let interp = self.transfer(
                CellType::Segment,
                slave.order,
                master_geometry,
                master.order,
                &edge_pm,
            )?;
            add_dependencies(deps, &master.dofs, &slave.dofs, &interp, 0);
        }
        Ok(())
    }

    /// Dependency matrix and, for variable order, the lowest-from-highest
    /// variant matrix of every multi-variant master.
    pub(crate) fn dependencies(&self) -> Result<(SparseRows, Option<SparseRows>), DofSieveError> {
        let mut deps = SparseRows::new(self.ndofs, self.ndofs);
        let mut highest = self
            .variable_order
            .then(|| SparseRows::new(self.ndofs, self.ndofs));
        let dim = self.mesh.dimension();

        for kind in [EntityKind::Face, EntityKind::Edge] {
            let entity_dim = if kind == EntityKind::Face { 2 } else { 1 };
            if entity_dim >= dim {
                continue;
            }
            let Some(list) = self.mesh.nc_list(kind) else {
                continue;
            };
            for master in list.masters() {
                let Some(mdofs) = self.locator.entity_dofs(kind, master.index, 0)? else {
                    log::warn!("{} master {} owns no DOFs", kind.name(), master.index);
                    continue;
                };
                if mdofs.dofs.is_empty() {
                    continue;
                }
                for slave in &master.slaves {
                    let sdofs = match slave.entity {
                        SlaveEntity::Regular(s) => self.locator.entity_dofs(kind, s, 0)?,
                        SlaveEntity::DegenerateEdge(e) => {
                            self.locator.degenerate_face_dofs(e, master.geometry, 0)?
                        }
                    };
                    let Some(sdofs) = sdofs.filter(|s| !s.dofs.is_empty()) else {
                        break;
                    };
                    let pm = list.point_matrix(slave)?;
                    let interp =
                        self.transfer(slave.geometry, sdofs.order, master.geometry, mdofs.order, pm)?;
                    let skip = match (self.variable_order, kind, slave.entity) {
                        (true, EntityKind::Face, SlaveEntity::Regular(_)) => sdofs.inherited(),
                        _ => 0,
                    };
                    add_dependencies(&mut deps, &mdofs.dofs, &sdofs.dofs, &interp, skip);
                    if skip > 0 {
                        if let SlaveEntity::Regular(face) = slave.entity {
                            self.add_edge_face_dependencies(&mut deps, &mdofs, master.geometry, face, pm)?;
                        }
                    }
                }

                if let Some(sped) = highest.as_mut() {
                    let nvar = self.locator.num_variants(kind, master.index);
                    if nvar > 1 {
                        let Some(hdofs) = self.locator.entity_dofs(kind, master.index, nvar - 1)? else {
                            continue;
                        };
                        let interp = self.transfer(
                            master.geometry,
                            mdofs.order,
                            master.geometry,
                            hdofs.order,
                            &PointMatrix::identity(master.geometry),
                        )?;
                        add_dependencies(sped, &hdofs.dofs, &mdofs.dofs, &interp, mdofs.inherited());
                    }
                }
            }
        }

        if self.variable_order {
            self.add_minimum_order_rule(&mut deps)?;
        }
        Ok((deps, highest))
    }

    /// Every variant above the lowest of an edge/face depends on the lowest.
    fn add_minimum_order_rule(&self, deps: &mut SparseRows) -> Result<(), DofSieveError> {
        let dim = self.mesh.dimension();
        for (kind, entity_dim) in [(EntityKind::Edge, 1), (EntityKind::Face, 2)] {
            if entity_dim >= dim {
                continue;
            }
            for index in 0..self.mesh.num_entities(kind) {
                let nvar = self.locator.num_variants(kind, index);
                if nvar < 2 {
                    continue;
                }
                let geometry = match kind {
                    EntityKind::Face => self.mesh.face_geometry(index),
                    _ => CellType::Segment,
                };
                let Some(lowest) = self.locator.entity_dofs(kind, index, 0)? else {
                    continue;
                };
                let identity = PointMatrix::identity(geometry);
                for v in 1..nvar {
                    let Some(higher) = self.locator.entity_dofs(kind, index, v)? else {
                        break;
                    };
                    let interp = self.transfer(geometry, higher.order, geometry, lowest.order, &identity)?;
                    add_dependencies(deps, &lowest.dofs, &higher.dofs, &interp, 0);
                }
            }
        }
        Ok(())
    }

    /// Resolve the dependencies into conforming operators.
    pub(crate) fn build(&self, vdim: usize, ordering: Ordering) -> Result<ConformingOperators, DofSieveError> {
        let (deps, highest) = self.dependencies()?;
        let ops = resolve(&deps, highest.as_ref())?;
        Ok(ConformingOperators {
            prolongation: ops.prolongation.map(|p| make_vdim_matrix(&p, vdim, ordering)),
            restriction: ops.restriction.map(|r| make_vdim_matrix(&r, vdim, ordering)),
            variant_interpolation: ops
                .variant_interpolation
                .map(|q| make_vdim_matrix(&q, vdim, ordering)),
            num_true_dofs: ops.num_true_dofs,
            passes: ops.passes,
        })
    }
}

/// Turn a dependency matrix into scalar `P`, `R` and (with `highest`) `Q`.
///
/// True DOFs are those with an empty dependency row. Every other DOF is
/// finalized once all of its masters are, pass after pass; a DOF still open
/// when a pass makes no progress means the dependency graph has a cycle or
/// an unresolvable master.
pub fn resolve(
    deps: &SparseRows,
    highest: Option<&SparseRows>,
) -> Result<ConformingOperators, DofSieveError> {
    let ndofs = deps.nrows();
    let mut true_index = vec![None; ndofs];
    let mut n_true = 0usize;
    for (dof, slot) in true_index.iter_mut().enumerate() {
        if deps.row_is_empty(dof) {
            *slot = Some(n_true);
            n_true += 1;
        }
    }
    if n_true == ndofs {
        log::debug!("conforming build: all {ndofs} DOFs are true DOFs");
        return Ok(ConformingOperators::identity(ndofs));
    }

    let mut p_rows = SparseRows::new(ndofs, n_true);
    let mut finalized = vec![false; ndofs];
    let mut n_finalized = 0usize;
    for (dof, t) in true_index.iter().enumerate() {
        if let Some(t) = *t {
            p_rows.set_row(dof, vec![(t, 1.0)]);
            finalized[dof] = true;
            n_finalized += 1;
        }
    }

    let mut passes = 0usize;
    loop {
        let mut progress = false;
        for dof in 0..ndofs {
            if finalized[dof] || !deps.row(dof).iter().all(|&(m, _)| finalized[m]) {
                continue;
            }
            let mut row = SparseRows::new(1, n_true);
            for &(m, coef) in deps.row(dof) {
                for &(t, v) in p_rows.row(m) {
                    row.add(0, t, coef * v);
                }
            }
            p_rows.set_row(dof, row.row(0).to_vec());
            finalized[dof] = true;
            n_finalized += 1;
            progress = true;
        }
        passes += 1;
        if !progress {
            break;
        }
    }
    if n_finalized != ndofs {
        return Err(DofSieveError::UnresolvedDofs {
            finalized: n_finalized,
            ndofs,
        });
    }

    let mut r_rows = SparseRows::new(n_true, ndofs);
    let mut q_rows = highest.map(|_| SparseRows::new(n_true, ndofs));
    for (dof, t) in true_index.iter().enumerate() {
        let Some(t) = *t else {
            continue;
        };
        r_rows.add(t, dof, 1.0);
        if let (Some(q), Some(h)) = (q_rows.as_mut(), highest) {
            if h.row_is_empty(dof) {
                q.add(t, dof, 1.0);
            } else {
                for &(col, v) in h.row(dof) {
                    q.add(t, col, v);
                }
            }
        }
    }
    log::debug!(
        "conforming build: {n_true} true DOFs of {ndofs}, {} dependencies, {passes} passes",
        deps.num_nonzeros()
    );
    Ok(ConformingOperators {
        prolongation: Some(p_rows.to_csr()),
        restriction: Some(r_rows.to_csr()),
        variant_interpolation: q_rows.map(|q| q.to_csr()),
        num_true_dofs: n_true,
        passes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_resolve_transitively() {
        // 2 = 0.5 * (0 + 1); 3 = 2
        let mut deps = SparseRows::new(4, 4);
        deps.add(3, 2, 1.0);
        deps.add(2, 0, 0.5);
        deps.add(2, 1, 0.5);
        let ops = resolve(&deps, None).unwrap();
        assert_eq!(ops.num_true_dofs, 2);
        let p = ops.prolongation.unwrap();
        let dense: Vec<_> = p.triplet_iter().map(|(i, j, &v)| (i, j, v)).collect();
        assert_eq!(dense, vec![(0, 0, 1.0), (1, 1, 1.0), (2, 0, 0.5), (2, 1, 0.5), (3, 0, 0.5), (3, 1, 0.5)]);
        assert!(ops.passes >= 2);
    }

    #[test]
    fn cycles_are_fatal() {
        let mut deps = SparseRows::new(3, 3);
        deps.add(1, 2, 1.0);
        deps.add(2, 1, 1.0);
        assert_eq!(
            resolve(&deps, None).unwrap_err(),
            DofSieveError::UnresolvedDofs {
                finalized: 1,
                ndofs: 3
            }
        );
    }

    #[test]
    fn no_dependencies_means_identity() {
        let ops = resolve(&SparseRows::new(5, 5), None).unwrap();
        assert!(ops.prolongation.is_none() && ops.restriction.is_none());
        assert_eq!(ops.num_true_dofs, 5);
    }

    #[test]
    fn dependencies_skip_self_small_and_ignored() {
        let mut deps = SparseRows::new(4, 4);
        let interp = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.5, 0.5, 1e-13, 1.0]);
        add_dependencies(&mut deps, &[0, -2], &[0, 3, IGNORED_DOF], &interp, 0);
        assert!(deps.row_is_empty(0));
        assert_eq!(deps.row(3), &[(0, 0.5), (1, -0.5)]);
    }
}
