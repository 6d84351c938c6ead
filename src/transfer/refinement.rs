//! Interpolation of coarse functions onto a refined mesh.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::basis::BasisCatalog;
use crate::dof_error::DofSieveError;
use crate::linalg::{LinearOperator, SparseRows, check_sizes};
use crate::space::conforming::DEPENDENCY_THRESHOLD;
use crate::topology::transforms::{CoarseFineTransforms, Embedding};
use crate::transfer::SpaceSnapshot;
use crate::transfer::local::{LocalKey, LocalMatrices};

/// Check that `embeddings` relate the elements of `coarse` and `fine`.
pub(crate) fn check_embeddings(
    coarse: &SpaceSnapshot,
    fine: &SpaceSnapshot,
    embeddings: &[Embedding],
) -> Result<(), DofSieveError> {
    coarse.check_compatible(fine)?;
    if embeddings.len() != fine.num_elements() {
        return Err(DofSieveError::SizeMismatch {
            what: "element embeddings",
            expected: fine.num_elements(),
            found: embeddings.len(),
        });
    }
    for (k, emb) in embeddings.iter().enumerate() {
        let parent = *coarse
            .geometries
            .get(emb.parent)
            .ok_or_else(|| DofSieveError::out_of_range("coarse element", emb.parent, coarse.num_elements()))?;
        if parent != emb.geometry || fine.geometries[k] != emb.geometry {
            return Err(DofSieveError::InconsistentMesh(format!(
                "fine element {k} ({:?}) embedded in coarse element {} ({parent:?}) as {:?}",
                fine.geometries[k], emb.parent, emb.geometry
            )));
        }
    }
    Ok(())
}

/// Matrix-free prolongation from a coarse space to the space on its
/// refinement.
///
/// Every fine element interpolates its parent's local DOFs through the local
/// matrix of its reference transform. A fine DOF shared by several fine
/// elements takes the value computed by the first of them, both in
/// [`LinearOperator::apply`] and in its transpose, so the two stay exact
/// transposes of each other.
#[derive(Debug)]
pub struct RefinementOperator {
    coarse: SpaceSnapshot,
    fine: SpaceSnapshot,
    embeddings: Vec<Embedding>,
    keys: Vec<LocalKey>,
    local: LocalMatrices,
}

impl RefinementOperator {
    pub fn new<C: BasisCatalog>(
        catalog: &C,
        coarse: SpaceSnapshot,
        fine: SpaceSnapshot,
        transforms: &CoarseFineTransforms,
    ) -> Result<Self, DofSieveError> {
        let embeddings = transforms.embeddings().to_vec();
        check_embeddings(&coarse, &fine, &embeddings)?;
        let keys: Vec<LocalKey> = embeddings
            .iter()
            .enumerate()
            .map(|(k, emb)| (emb.geometry, coarse.orders[emb.parent], fine.orders[k]))
            .collect();
        let local = LocalMatrices::interpolation(catalog, keys.iter().copied(), |g| {
            transforms.point_matrices(g)
        })?;
        log::debug!(
            "refinement operator: {} -> {} vdofs, {} local matrix families",
            coarse.vsize(),
            fine.vsize(),
            local.len()
        );
        Ok(Self {
            coarse,
            fine,
            embeddings,
            keys,
            local,
        })
    }

    /// Visit every fine element and component with its local matrix and the
    /// signed vdofs on both sides.
    fn for_each_block(
        &self,
        mut f: impl FnMut(&nalgebra::DMatrix<f64>, &[(usize, f64)], &[(usize, f64)]),
    ) -> Result<(), DofSieveError> {
        for (k, emb) in self.embeddings.iter().enumerate() {
            let lp = self.local.get(self.keys[k], emb.matrix)?;
            for c in 0..self.fine.vdim {
                let cv = self.coarse.signed_vdofs(emb.parent, c)?;
                let fv = self.fine.signed_vdofs(k, c)?;
                if lp.nrows() != fv.len() || lp.ncols() != cv.len() {
                    return Err(DofSieveError::SizeMismatch {
                        what: "local interpolation",
                        expected: fv.len() * cv.len(),
                        found: lp.nrows() * lp.ncols(),
                    });
                }
                f(lp, &cv, &fv);
            }
        }
        Ok(())
    }

    /// The same map as an explicit sparse matrix.
    pub fn assemble(&self) -> Result<CsrMatrix<f64>, DofSieveError> {
        let mut rows = SparseRows::new(self.fine.vsize(), self.coarse.vsize());
        let mut processed = vec![false; self.fine.vsize()];
        self.for_each_block(|lp, cv, fv| {
            for (i, &(fi, fs)) in fv.iter().enumerate() {
                if processed[fi] {
                    continue;
                }
                processed[fi] = true;
                for (j, &(cj, cs)) in cv.iter().enumerate() {
                    let v = lp[(i, j)];
                    if v.abs() > DEPENDENCY_THRESHOLD {
                        rows.add(fi, cj, fs * cs * v);
                    }
                }
            }
        })?;
        Ok(rows.to_csr())
    }
}

impl LinearOperator for RefinementOperator {
    fn height(&self) -> usize {
        self.fine.vsize()
    }

    fn width(&self) -> usize {
        self.coarse.vsize()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.height(), self.width(), x, y)?;
        y.fill(0.0);
        let mut processed = vec![false; self.fine.vsize()];
        self.for_each_block(|lp, cv, fv| {
            let sub = DVector::from_iterator(cv.len(), cv.iter().map(|&(j, s)| s * x[j]));
            let out = lp * sub;
            for (&(fi, fs), v) in fv.iter().zip(out.iter()) {
                if !processed[fi] {
                    processed[fi] = true;
                    y[fi] = fs * v;
                }
            }
        })
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.width(), self.height(), x, y)?;
        y.fill(0.0);
        let mut processed = vec![false; self.fine.vsize()];
        self.for_each_block(|lp, cv, fv| {
            let sub = DVector::from_iterator(
                fv.len(),
                fv.iter().map(|&(fi, fs)| if processed[fi] { 0.0 } else { fs * x[fi] }),
            );
            for &(fi, _) in fv {
                processed[fi] = true;
            }
            let out = lp.tr_mul(&sub);
            for (&(cj, cs), v) in cv.iter().zip(out.iter()) {
                y[cj] += cs * v;
            }
        })
    }
}
