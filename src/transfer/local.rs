//! Element-local transfer matrices, computed once per reference transform.
//!
//! A refinement step uses only a handful of distinct reference transforms per
//! geometry, so local matrices are keyed by geometry, coarse order and fine
//! order and computed for every transform of that geometry at once. With the
//! `rayon` feature the per-transform work runs in parallel.

use std::collections::HashMap;

use nalgebra::DMatrix;

use crate::basis::{BasisCatalog, FiniteElement, LocalRestriction, QuadratureRule};
use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::point_matrix::PointMatrix;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Geometry, coarse order and fine order of a family of local matrices.
pub type LocalKey = (CellType, u8, u8);

fn map_transforms<T, F>(pms: &[PointMatrix], f: F) -> Result<Vec<T>, DofSieveError>
where
    T: Send,
    F: Fn(&PointMatrix) -> Result<T, DofSieveError> + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        pms.par_iter().map(f).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        pms.iter().map(f).collect()
    }
}

/// Interpolation matrices (`fine dofs × coarse dofs`) of every transform in `pms`.
pub fn interpolation_matrices<C: BasisCatalog>(
    catalog: &C,
    (geometry, coarse_order, fine_order): LocalKey,
    pms: &[PointMatrix],
) -> Result<Vec<DMatrix<f64>>, DofSieveError> {
    let coarse = catalog.element(geometry, coarse_order)?;
    let fine = catalog.element(geometry, fine_order)?;
    map_transforms(pms, |pm| Ok(fine.transfer_matrix(&*coarse, pm)))
}

/// Nodal restrictions (`coarse dofs × fine dofs`) of every transform in `pms`.
pub fn restriction_matrices<C: BasisCatalog>(
    catalog: &C,
    (geometry, coarse_order, fine_order): LocalKey,
    pms: &[PointMatrix],
) -> Result<Vec<LocalRestriction>, DofSieveError> {
    let coarse = catalog.element(geometry, coarse_order)?;
    let fine = catalog.element(geometry, fine_order)?;
    map_transforms(pms, |pm| Ok(coarse.local_restriction(&*fine, pm)))
}

/// `∫ φ_i(pm(ξ)) ψ_j(ξ) |J(ξ)| dξ` over the fine reference cell, with `φ`
/// the coarse basis and `ψ` the fine one (`coarse dofs × fine dofs`).
pub fn mixed_mass_matrix<F: FiniteElement>(
    coarse: &F,
    fine: &F,
    pm: &PointMatrix,
) -> Result<DMatrix<f64>, DofSieveError> {
    let degree = coarse.order() as usize + fine.order() as usize;
    let rule = QuadratureRule::for_cell(fine.geometry(), degree / 2 + 2)?;
    let mut m = DMatrix::zeros(coarse.num_dofs(), fine.num_dofs());
    for (x, w) in rule.points.iter().zip(&rule.weights) {
        let psi = fine.shape(x);
        let phi = coarse.shape(&pm.map(x));
        let scale = w * pm.jacobian_determinant(x);
        for (i, p) in phi.iter().enumerate() {
            for (j, q) in psi.iter().enumerate() {
                m[(i, j)] += scale * p * q;
            }
        }
    }
    Ok(m)
}

/// Local L2 projections `M_c^{-1} · M_mixed(child)` of a coarse element onto
/// each of its children, given as `(fine order, point matrix)` pairs.
pub fn l2_projections<C: BasisCatalog>(
    catalog: &C,
    geometry: CellType,
    coarse_order: u8,
    children: &[(u8, &PointMatrix)],
) -> Result<Vec<DMatrix<f64>>, DofSieveError> {
    let coarse = catalog.element(geometry, coarse_order)?;
    let mass = coarse.mass_matrix(&PointMatrix::identity(geometry))?;
    let inverse = mass.try_inverse().ok_or_else(|| {
        DofSieveError::SingularLocalMatrix(format!("mass matrix of {geometry:?} P{coarse_order}"))
    })?;
    children
        .iter()
        .map(|&(fine_order, pm)| {
            let fine = catalog.element(geometry, fine_order)?;
            Ok(&inverse * mixed_mass_matrix(&*coarse, &*fine, pm)?)
        })
        .collect()
}

/// Interpolation matrices grouped by [`LocalKey`], indexed by transform.
#[derive(Debug, Default)]
pub struct LocalMatrices {
    by_key: HashMap<LocalKey, Vec<DMatrix<f64>>>,
}

impl LocalMatrices {
    /// Compute the interpolation matrices of every key in `keys`, using the
    /// point matrices `pms(geometry)`.
    pub fn interpolation<'p, C: BasisCatalog>(
        catalog: &C,
        keys: impl IntoIterator<Item = LocalKey>,
        pms: impl Fn(CellType) -> &'p [PointMatrix],
    ) -> Result<Self, DofSieveError> {
        let mut by_key = HashMap::new();
        for key in keys {
            if by_key.contains_key(&key) {
                continue;
            }
            let mats = interpolation_matrices(catalog, key, pms(key.0))?;
            by_key.insert(key, mats);
        }
        log::trace!("computed local interpolation for {} keys", by_key.len());
        Ok(Self { by_key })
    }

    pub fn get(&self, key: LocalKey, transform: usize) -> Result<&DMatrix<f64>, DofSieveError> {
        let mats = self
            .by_key
            .get(&key)
            .ok_or(DofSieveError::UnsupportedGeometry {
                geometry: key.0,
                context: "local transfer matrix",
            })?;
        mats.get(transform)
            .ok_or_else(|| DofSieveError::out_of_range("reference transform", transform, mats.len()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::LagrangeCollection;

    fn halves() -> Vec<PointMatrix> {
        vec![
            PointMatrix::new(CellType::Segment, vec![vec![0.0], vec![0.5]]).unwrap(),
            PointMatrix::new(CellType::Segment, vec![vec![0.5], vec![1.0]]).unwrap(),
        ]
    }

    #[test]
    fn linear_interpolation_on_halves() {
        let c = LagrangeCollection::new(1, 1).unwrap();
        let mats = interpolation_matrices(&c, (CellType::Segment, 1, 1), &halves()).unwrap();
        // left child: nodes 0 and 0.5 of the parent
        assert!((mats[0][(0, 0)] - 1.0).abs() < 1e-12);
        assert!((mats[0][(1, 0)] - 0.5).abs() < 1e-12);
        assert!((mats[0][(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn projections_of_children_reproduce_coarse_functions() {
        let c = LagrangeCollection::new(2, 1).unwrap();
        let pms = halves();
        let children: Vec<(u8, &PointMatrix)> = pms.iter().map(|pm| (2, pm)).collect();
        let proj = l2_projections(&c, CellType::Segment, 2, &children).unwrap();
        let interp = interpolation_matrices(&c, (CellType::Segment, 2, 2), &pms).unwrap();
        // R_0 P_0 + R_1 P_1 = I: a coarse function survives refine-then-project
        let sum = &proj[0] * &interp[0] + &proj[1] * &interp[1];
        let id = DMatrix::<f64>::identity(3, 3);
        assert!((sum - id).abs().max() < 1e-10);
    }

    #[test]
    fn cached_lookup_reports_missing_keys() {
        let c = LagrangeCollection::new(1, 1).unwrap();
        let pms = halves();
        let local = LocalMatrices::interpolation(&c, [(CellType::Segment, 1, 1)], |_| &pms[..]).unwrap();
        assert_eq!(local.len(), 1);
        assert!(local.get((CellType::Segment, 1, 1), 1).is_ok());
        assert!(local.get((CellType::Segment, 1, 1), 2).is_err());
        assert!(local.get((CellType::Quadrilateral, 1, 1), 0).is_err());
    }
}
