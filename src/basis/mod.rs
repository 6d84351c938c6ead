//! The basis catalog consumed by a finite element space.
//!
//! A [`BasisCatalog`] knows, per geometry and polynomial order, how many DOFs
//! an entity owns, how an entity's DOFs are permuted when seen from a cell
//! with a given orientation, and how to build the local [`FiniteElement`]
//! used for transfer, restriction and mass matrices.

pub mod lagrange;
pub mod quadrature;

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;
use crate::topology::orientation::Orientation;
use crate::topology::point_matrix::PointMatrix;

pub use lagrange::{LagrangeCollection, LagrangeElement};
pub use quadrature::QuadratureRule;

/// Local DOF values at coarse nodes reconstructed from one fine element.
#[derive(Clone, Debug)]
pub struct LocalRestriction {
    /// `coarse dofs × fine dofs`; rows with `valid[i] == false` are zero.
    pub matrix: DMatrix<f64>,
    /// Whether coarse node `i` lies inside the fine element.
    pub valid: Vec<bool>,
}

pub trait FiniteElement: Send + Sync {
    fn geometry(&self) -> CellType;
    fn order(&self) -> u8;
    fn num_dofs(&self) -> usize;

    /// Reference coordinates of the nodes, in local DOF order.
    fn nodes(&self) -> &[Vec<f64>];

    /// Values of all shape functions at reference point `x`.
    fn shape(&self, x: &[f64]) -> Vec<f64>;

    /// Matrix mapping `master` DOFs to this element's DOFs when this element
    /// sits at `pm` inside the master reference domain (`self dofs × master dofs`).
    fn transfer_matrix(&self, master: &Self, pm: &PointMatrix) -> DMatrix<f64>
    where
        Self: Sized,
    {
        let rows: Vec<Vec<f64>> = self
            .nodes()
            .iter()
            .map(|x| master.shape(&pm.map(x)))
            .collect();
        DMatrix::from_fn(self.num_dofs(), master.num_dofs(), |i, j| rows[i][j])
    }

    /// Interpolation from a coarse element to the fine element at `pm` (same basis).
    fn local_interpolation(&self, pm: &PointMatrix) -> DMatrix<f64>
    where
        Self: Sized,
    {
        self.transfer_matrix(self, pm)
    }

    /// Coarse nodal values recovered from `fine` placed at `pm` inside this
    /// (coarse) element: each coarse node inside the fine element is
    /// evaluated from the fine basis.
    fn local_restriction(&self, fine: &Self, pm: &PointMatrix) -> LocalRestriction
    where
        Self: Sized,
    {
        let (nc, nf) = (self.num_dofs(), fine.num_dofs());
        let mut matrix = DMatrix::zeros(nc, nf);
        let mut valid = vec![false; nc];
        for (i, x) in self.nodes().iter().enumerate() {
            let Some(xi) = pm.inverse_map(x) else {
                continue;
            };
            if !fine.geometry().contains_reference_point(&xi, 1e-10) {
                continue;
            }
            for (j, v) in fine.shape(&xi).into_iter().enumerate() {
                matrix[(i, j)] = v;
            }
            valid[i] = true;
        }
        LocalRestriction { matrix, valid }
    }

    /// Mass matrix of this element placed at `pm` inside the coarse
    /// reference domain, integrated in coarse reference measure.
    fn mass_matrix(&self, pm: &PointMatrix) -> Result<DMatrix<f64>, DofSieveError> {
        let rule = QuadratureRule::for_cell(self.geometry(), self.order() as usize + 2)?;
        let n = self.num_dofs();
        let mut m = DMatrix::zeros(n, n);
        for (x, w) in rule.points.iter().zip(&rule.weights) {
            let phi = self.shape(x);
            let scale = w * pm.jacobian_determinant(x);
            for i in 0..n {
                for j in 0..n {
                    m[(i, j)] += scale * phi[i] * phi[j];
                }
            }
        }
        Ok(m)
    }
}

pub trait BasisCatalog: Send + Sync + Sized {
    type Element: FiniteElement;

    /// Collection name as written to the text format.
    fn name(&self) -> String;

    /// Rebuild a catalog from [`BasisCatalog::name`].
    fn from_name(name: &str) -> Result<Self, DofSieveError>;

    /// Order used when the space carries no per-element orders.
    fn default_order(&self) -> u8;

    /// Number of DOFs owned by the interior of an entity of `geometry`.
    fn num_dofs(&self, geometry: CellType, order: u8) -> usize;

    /// For each DOF of an entity seen from a cell with `orientation`, the
    /// (signed) index into the entity's canonical DOF block.
    fn dof_ordering(&self, geometry: CellType, order: u8, orientation: Orientation) -> Vec<i64>;

    fn element(&self, geometry: CellType, order: u8) -> Result<Arc<Self::Element>, DofSieveError>;
}
