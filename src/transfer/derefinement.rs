//! Maps from a refined space back to the space on the coarser mesh.
//!
//! [`derefinement_matrix`] reads each coarse nodal value off one fine element
//! containing the node; it is exact for functions of the coarse space and is
//! what a space uses after derefinement. [`DerefinementOperator`] is the
//! local L2 projection used as the backward grid transfer.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::linalg::{LinearOperator, SparseRows, check_sizes};
use crate::space::conforming::DEPENDENCY_THRESHOLD;
use crate::space::ordering::decode;
use crate::topology::transforms::CoarseFineTransforms;
use crate::transfer::SpaceSnapshot;
use crate::transfer::local::{LocalKey, l2_projections, restriction_matrices};
use crate::transfer::refinement::check_embeddings;

/// Algebraic derefinement `coarse vdofs × fine vdofs`.
///
/// `transforms` embeds the elements of `fine` in those of `coarse`. Every
/// coarse vdof must lie inside at least one of its element's children.
pub fn derefinement_matrix<C: BasisCatalog>(
    catalog: &C,
    fine: &SpaceSnapshot,
    coarse: &SpaceSnapshot,
    transforms: &CoarseFineTransforms,
) -> Result<CsrMatrix<f64>, DofSieveError> {
    check_embeddings(coarse, fine, transforms.embeddings())?;
    let c2f = transforms.coarse_to_fine(coarse.num_elements())?;

    let mut local = HashMap::new();
    let mut rows = SparseRows::new(coarse.vsize(), fine.vsize());
    let mut set = vec![false; coarse.vsize()];
    for (ce, kids) in c2f.fine.iter().enumerate() {
        for &k in kids {
            let emb = transforms.embedding(k)?;
            let key: LocalKey = (emb.geometry, coarse.orders[ce], fine.orders[k]);
            let lrs = match local.entry(key) {
                Entry::Occupied(o) => o.into_mut(),
                Entry::Vacant(v) => {
                    v.insert(restriction_matrices(catalog, key, transforms.point_matrices(emb.geometry))?)
                }
            };
            let lr = lrs
                .get(emb.matrix)
                .ok_or_else(|| DofSieveError::out_of_range("reference transform", emb.matrix, lrs.len()))?;
            for c in 0..coarse.vdim {
                let cv = coarse.signed_vdofs(ce, c)?;
                let fv = fine.signed_vdofs(k, c)?;
                for (i, &(ci, cs)) in cv.iter().enumerate() {
                    if !lr.valid.get(i).copied().unwrap_or(false) || set[ci] {
                        continue;
                    }
                    set[ci] = true;
                    for (j, &(fj, fs)) in fv.iter().enumerate() {
                        let v = lr.matrix[(i, j)];
                        if v.abs() > DEPENDENCY_THRESHOLD {
                            rows.add(ci, fj, cs * fs * v);
                        }
                    }
                }
            }
        }
    }
    if let Some(missing) = set.iter().position(|s| !s) {
        return Err(DofSieveError::InconsistentMesh(format!(
            "coarse vdof {missing} is not inside any fine element"
        )));
    }
    log::debug!(
        "derefinement matrix: {} -> {} vdofs, {} nonzeros",
        fine.vsize(),
        coarse.vsize(),
        rows.num_nonzeros()
    );
    Ok(rows.to_csr())
}

/// Local L2 projection of fine functions onto the coarse space.
///
/// Each coarse element projects the union of its children; a coarse DOF
/// shared by several coarse elements takes the value from the last of them.
#[derive(Debug)]
pub struct DerefinementOperator {
    fine: SpaceSnapshot,
    coarse: SpaceSnapshot,
    children: Vec<Vec<usize>>,
    /// Index into `projections` per coarse element.
    kinds: Vec<usize>,
    /// Per kind, one `coarse dofs × fine dofs` matrix per child.
    projections: Vec<Vec<DMatrix<f64>>>,
    /// Coarse element writing each scalar coarse DOF.
    owner: Vec<usize>,
}

impl DerefinementOperator {
    pub fn new<C: BasisCatalog>(
        catalog: &C,
        fine: SpaceSnapshot,
        coarse: SpaceSnapshot,
        transforms: &CoarseFineTransforms,
    ) -> Result<Self, DofSieveError> {
        check_embeddings(&coarse, &fine, transforms.embeddings())?;
        let c2f = transforms.coarse_to_fine(coarse.num_elements())?;

        let mut lookup: HashMap<(usize, u8, Vec<u8>), usize> = HashMap::new();
        let mut projections = Vec::new();
        let mut kinds = Vec::with_capacity(coarse.num_elements());
        for (ce, kids) in c2f.fine.iter().enumerate() {
            let child_orders: Vec<u8> = kids.iter().map(|&k| fine.orders[k]).collect();
            let key = (c2f.ref_type[ce], coarse.orders[ce], child_orders);
            if let Some(&kind) = lookup.get(&key) {
                kinds.push(kind);
                continue;
            }
            let pms = kids
                .iter()
                .map(|&k| {
                    let emb = transforms.embedding(k)?;
                    Ok((fine.orders[k], transforms.point_matrix(emb)?))
                })
                .collect::<Result<Vec<_>, DofSieveError>>()?;
            let geometry = coarse.geometries[ce];
            projections.push(l2_projections(catalog, geometry, coarse.orders[ce], &pms)?);
            lookup.insert(key, projections.len() - 1);
            kinds.push(projections.len() - 1);
        }

        let mut owner = vec![usize::MAX; coarse.ndofs];
        for (ce, row) in coarse.table.rows().enumerate() {
            for &d in row {
                owner[decode(d)] = ce;
            }
        }
        if let Some(d) = owner.iter().position(|&o| o == usize::MAX) {
            return Err(DofSieveError::InconsistentMesh(format!(
                "coarse DOF {d} belongs to no element"
            )));
        }
        log::debug!(
            "L2 derefinement operator: {} coarse elements, {} projection kinds",
            coarse.num_elements(),
            projections.len()
        );
        Ok(Self {
            fine,
            coarse,
            children: c2f.fine,
            kinds,
            projections,
            owner,
        })
    }

    fn owns(&self, ce: usize, row: &[i64], i: usize) -> bool {
        self.owner[decode(row[i])] == ce
    }
}

impl LinearOperator for DerefinementOperator {
    fn height(&self) -> usize {
        self.coarse.vsize()
    }

    fn width(&self) -> usize {
        self.fine.vsize()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.height(), self.width(), x, y)?;
        y.fill(0.0);
        for (ce, kids) in self.children.iter().enumerate() {
            let mats = &self.projections[self.kinds[ce]];
            let row = self.coarse.table.row(ce)?;
            for c in 0..self.coarse.vdim {
                let cv = self.coarse.signed_vdofs(ce, c)?;
                let mut acc = DVector::<f64>::zeros(cv.len());
                for (lr, &k) in mats.iter().zip(kids) {
                    let fv = self.fine.signed_vdofs(k, c)?;
                    let sub = DVector::from_iterator(fv.len(), fv.iter().map(|&(j, s)| s * x[j]));
                    acc += lr * sub;
                }
                for (i, &(ci, cs)) in cv.iter().enumerate() {
                    if self.owns(ce, row, i) {
                        y[ci] = cs * acc[i];
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.width(), self.height(), x, y)?;
        y.fill(0.0);
        for (ce, kids) in self.children.iter().enumerate() {
            let mats = &self.projections[self.kinds[ce]];
            let row = self.coarse.table.row(ce)?;
            for c in 0..self.coarse.vdim {
                let cv = self.coarse.signed_vdofs(ce, c)?;
                let sub = DVector::from_iterator(
                    cv.len(),
                    cv.iter()
                        .enumerate()
                        .map(|(i, &(ci, cs))| if self.owns(ce, row, i) { cs * x[ci] } else { 0.0 }),
                );
                for (lr, &k) in mats.iter().zip(kids) {
                    let fv = self.fine.signed_vdofs(k, c)?;
                    let out = lr.tr_mul(&sub);
                    for (&(fj, fs), v) in fv.iter().zip(out.iter()) {
                        y[fj] += fs * v;
                    }
                }
            }
        }
        Ok(())
    }
}
