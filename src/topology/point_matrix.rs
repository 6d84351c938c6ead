//! Point matrices: the position of a slave/fine cell inside the reference
//! domain of its master/coarse cell.
//!
//! Column `k` (here: `points[k]`) holds the master reference coordinates of
//! the slave's local vertex `k`. The map from slave reference coordinates to
//! master reference coordinates is the (multi)linear vertex interpolant of
//! those points.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::dof_error::DofSieveError;
use crate::topology::cell_type::CellType;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointMatrix {
    geometry: CellType,
    points: Vec<Vec<f64>>,
}

impl PointMatrix {
    /// Build a point matrix for a slave of `geometry` with one point per slave vertex.
    pub fn new(geometry: CellType, points: Vec<Vec<f64>>) -> Result<Self, DofSieveError> {
        if points.len() != geometry.num_vertices() {
            return Err(DofSieveError::SizeMismatch {
                what: "point matrix columns",
                expected: geometry.num_vertices(),
                found: points.len(),
            });
        }
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if points.iter().any(|p| p.len() != dim) {
            return Err(DofSieveError::InconsistentMesh(
                "point matrix columns have different dimensions".into(),
            ));
        }
        Ok(Self { geometry, points })
    }

    /// The trivial embedding of a cell in itself.
    pub fn identity(geometry: CellType) -> Self {
        Self {
            geometry,
            points: geometry
                .reference_vertices()
                .iter()
                .map(|v| v.to_vec())
                .collect(),
        }
    }

    pub fn geometry(&self) -> CellType {
        self.geometry
    }

    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    /// Dimension of the master reference domain.
    pub fn master_dimension(&self) -> usize {
        self.points.first().map(Vec::len).unwrap_or(0)
    }

    /// Map slave reference coordinates into master reference coordinates.
    pub fn map(&self, x: &[f64]) -> Vec<f64> {
        let phi = self.geometry.vertex_shape(x);
        let mut y = vec![0.0; self.master_dimension()];
        for (w, p) in phi.iter().zip(&self.points) {
            for (yd, pd) in y.iter_mut().zip(p) {
                *yd += w * pd;
            }
        }
        y
    }

    /// Jacobian `d(master)/d(slave)` at slave coordinates `x`.
    pub fn jacobian(&self, x: &[f64]) -> DMatrix<f64> {
        let grads = self.geometry.vertex_shape_grad(x);
        let mdim = self.master_dimension();
        let sdim = self.geometry.dimension();
        DMatrix::from_fn(mdim, sdim, |r, c| {
            grads
                .iter()
                .zip(&self.points)
                .map(|(g, p)| g[c] * p[r])
                .sum()
        })
    }

    /// Volume scaling of the map at `x`; zero for degenerate maps.
    pub fn jacobian_determinant(&self, x: &[f64]) -> f64 {
        let j = self.jacobian(x);
        if j.is_square() {
            j.determinant().abs()
        } else {
            (j.transpose() * &j).determinant().abs().sqrt()
        }
    }

    /// Slave coordinates of master point `y`, found by Newton iteration.
    /// Returns `None` when the map is singular or the iteration does not converge.
    pub fn inverse_map(&self, y: &[f64]) -> Option<Vec<f64>> {
        let sdim = self.geometry.dimension();
        if sdim != self.master_dimension() {
            return None;
        }
        let mut x = DVector::from_vec(self.geometry.center());
        for _ in 0..32 {
            let fx = self.map(x.as_slice());
            let r = DVector::from_fn(sdim, |i, _| y[i] - fx[i]);
            if r.norm() < 1e-14 {
                return Some(x.iter().copied().collect());
            }
            let dx = self.jacobian(x.as_slice()).lu().solve(&r)?;
            x += dx;
        }
        let fx = self.map(x.as_slice());
        let err: f64 = fx.iter().zip(y).map(|(a, b)| (a - b).abs()).sum();
        (err < 1e-10).then(|| x.iter().copied().collect())
    }

    /// Point matrix of the segment joining two of this matrix's vertices.
    pub fn edge(&self, a: usize, b: usize) -> Result<PointMatrix, DofSieveError> {
        let pa = self
            .points
            .get(a)
            .ok_or_else(|| DofSieveError::out_of_range("point matrix vertex", a, self.points.len()))?;
        let pb = self
            .points
            .get(b)
            .ok_or_else(|| DofSieveError::out_of_range("point matrix vertex", b, self.points.len()))?;
        PointMatrix::new(CellType::Segment, vec![pa.clone(), pb.clone()])
    }
}
